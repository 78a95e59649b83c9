//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between HTTP clients and the API server.
//! Domain types stay serde-free; everything on the wire is converted here.

use chrono::{DateTime, Utc};
use companion_core::{
    AffectAnalysis, DepressionAnalysis, DepressionRecord, DepressionReport, EmotionBreakdown,
    EmotionEstimate, Recommendation, RiskSummary,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::session::{ChatMode, StartedSession, TurnReply};

//=========================================================================================
// Payloads Sent FROM the Client TO the Server
//=========================================================================================

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChatModeDto {
    /// Typed chat. Starts background camera capture when a camera is configured.
    #[default]
    Text,
    /// Voice chat. No background capture.
    Audio,
}

impl From<ChatModeDto> for ChatMode {
    fn from(mode: ChatModeDto) -> Self {
        match mode {
            ChatModeDto::Text => ChatMode::Text,
            ChatModeDto::Audio => ChatMode::Audio,
        }
    }
}

#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub mode: ChatModeDto,
}

/// A typed chat turn, optionally with a base64-encoded camera frame.
#[derive(Deserialize, Debug, ToSchema)]
pub struct SendMessageRequest {
    pub message: String,
    #[serde(default)]
    pub image_base64: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct AnalyzeTextRequest {
    pub text: String,
}

//=========================================================================================
// Payloads Sent FROM the Server TO the Client
//=========================================================================================

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct EmotionDto {
    pub label: String,
    pub score: f64,
}

impl From<&EmotionEstimate> for EmotionDto {
    fn from(estimate: &EmotionEstimate) -> Self {
        Self {
            label: estimate.label.as_str().to_string(),
            score: estimate.score,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct DepressionDto {
    pub depression_score: f64,
    pub depression_level: String,
}

impl From<&DepressionAnalysis> for DepressionDto {
    fn from(analysis: &DepressionAnalysis) -> Self {
        Self {
            depression_score: analysis.depression_score,
            depression_level: analysis.depression_level.as_str().to_string(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct StartSessionResponse {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub mode: ChatModeDto,
    pub welcome: String,
}

impl StartSessionResponse {
    pub fn new(started: StartedSession, user_id: Uuid, mode: ChatModeDto) -> Self {
        Self {
            session_id: started.session_id,
            user_id,
            mode,
            welcome: started.welcome,
        }
    }
}

/// The assistant's reply. The analysis fields are absent when the input was empty.
#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct TurnResponse {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    pub emotion: Option<EmotionDto>,
    pub depression: Option<DepressionDto>,
}

impl From<TurnReply> for TurnResponse {
    fn from(turn: TurnReply) -> Self {
        Self {
            reply: turn.reply,
            transcript: turn.transcript,
            emotion: turn.analysis.as_ref().map(|a| EmotionDto::from(&a.fused)),
            depression: turn.analysis.as_ref().map(|a| DepressionDto::from(&a.depression)),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct AnalysisResponse {
    pub emotion: EmotionDto,
    pub depression: DepressionDto,
}

impl From<&AffectAnalysis> for AnalysisResponse {
    fn from(analysis: &AffectAnalysis) -> Self {
        Self {
            emotion: EmotionDto::from(&analysis.fused),
            depression: DepressionDto::from(&analysis.depression),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct RiskResponse {
    pub average_score: f64,
    pub level: String,
    pub sample_size: usize,
}

impl From<RiskSummary> for RiskResponse {
    fn from(summary: RiskSummary) -> Self {
        Self {
            average_score: summary.average_score,
            level: summary.level.as_str().to_string(),
            sample_size: summary.sample_size,
        }
    }
}

/// One point of the time-series view.
#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct TrendPoint {
    /// Calendar date of the record, `YYYY-MM-DD` in UTC.
    pub date: String,
    pub score: f64,
    pub level: String,
}

impl From<&DepressionRecord> for TrendPoint {
    fn from(record: &DepressionRecord) -> Self {
        Self {
            date: record.timestamp.format("%Y-%m-%d").to_string(),
            score: record.score,
            level: record.level.as_str().to_string(),
        }
    }
}

/// Most recent first.
#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct TrendResponse {
    pub points: Vec<TrendPoint>,
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct EmotionBreakdownDto {
    /// Display name, e.g. `Sadness`.
    pub emotion: String,
    pub count: usize,
    pub average_confidence: f64,
}

impl From<&EmotionBreakdown> for EmotionBreakdownDto {
    fn from(breakdown: &EmotionBreakdown) -> Self {
        Self {
            emotion: breakdown.label.display_name(),
            count: breakdown.count,
            average_confidence: breakdown.average_confidence,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct RecommendationDto {
    pub title: String,
    pub text: String,
    pub icon: String,
}

impl From<&Recommendation> for RecommendationDto {
    fn from(recommendation: &Recommendation) -> Self {
        Self {
            title: recommendation.title.to_string(),
            text: recommendation.text.to_string(),
            icon: recommendation.icon.to_string(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct ReportResponse {
    pub depression_score: f64,
    pub level: String,
    pub emotions: Vec<EmotionBreakdownDto>,
    pub summary: String,
    pub emotion_analysis: String,
    pub recommendations: Vec<RecommendationDto>,
    pub generated_at: DateTime<Utc>,
}

impl From<&DepressionReport> for ReportResponse {
    fn from(report: &DepressionReport) -> Self {
        Self {
            depression_score: report.depression_score,
            level: report.level.as_str().to_string(),
            emotions: report.emotions.iter().map(EmotionBreakdownDto::from).collect(),
            summary: report.summary.to_string(),
            emotion_analysis: report.emotion_analysis.clone(),
            recommendations: report
                .recommendations
                .iter()
                .map(RecommendationDto::from)
                .collect(),
            generated_at: report.generated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use companion_core::{DepressionLevel, EmotionLabel};

    #[test]
    fn start_request_defaults_to_text_mode() {
        let request: StartSessionRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.mode, ChatModeDto::Text);
        let request: StartSessionRequest = serde_json::from_str(r#"{"mode": "audio"}"#).unwrap();
        assert_eq!(ChatMode::from(request.mode), ChatMode::Audio);
    }

    #[test]
    fn trend_point_uses_calendar_date() {
        let record = DepressionRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap(),
            score: 0.42,
            level: DepressionLevel::Moderate,
        };
        let json = serde_json::to_value(TrendPoint::from(&record)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"date": "2024-03-09", "score": 0.42, "level": "moderate"})
        );
    }

    #[test]
    fn empty_turn_serializes_null_analysis() {
        let response = TurnResponse::from(TurnReply {
            reply: "I didn't catch that.".to_string(),
            transcript: None,
            analysis: None,
        });
        let json = serde_json::to_value(response).unwrap();
        assert!(json["emotion"].is_null());
        assert!(json["depression"].is_null());
        assert!(json.get("transcript").is_none());
    }

    #[test]
    fn breakdown_uses_display_names() {
        let dto = EmotionBreakdownDto::from(&EmotionBreakdown {
            label: EmotionLabel::Sadness,
            count: 2,
            average_confidence: 0.85,
        });
        assert_eq!(dto.emotion, "Sadness");
    }
}
