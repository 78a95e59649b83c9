//! crates/companion_core/src/domain.rs
//!
//! Defines the pure, core data structures for the affect and risk engine.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Emotions
//=========================================================================================

/// The fixed emotion vocabulary shared by every modality classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EmotionLabel {
    Joy,
    Sadness,
    Anger,
    Fear,
    Disgust,
    Surprise,
    Neutral,
    Unknown,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 8] = [
        EmotionLabel::Joy,
        EmotionLabel::Sadness,
        EmotionLabel::Anger,
        EmotionLabel::Fear,
        EmotionLabel::Disgust,
        EmotionLabel::Surprise,
        EmotionLabel::Neutral,
        EmotionLabel::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Joy => "joy",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Unknown => "unknown",
        }
    }

    /// Title-cased name used in reports ("Sadness").
    pub fn display_name(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Maps a raw classifier label onto the vocabulary. Classifiers in the wild
    /// emit synonyms ("happy", "sad", "angry"); anything unrecognised is `Unknown`.
    pub fn from_classifier_label(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "joy" | "happy" | "happiness" | "love" => EmotionLabel::Joy,
            "sadness" | "sad" => EmotionLabel::Sadness,
            "anger" | "angry" => EmotionLabel::Anger,
            "fear" | "fearful" | "scared" => EmotionLabel::Fear,
            "disgust" | "disgusted" => EmotionLabel::Disgust,
            "surprise" | "surprised" => EmotionLabel::Surprise,
            "neutral" | "calm" => EmotionLabel::Neutral,
            _ => EmotionLabel::Unknown,
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(EmotionLabel::from_classifier_label(s))
    }
}

/// A single classification result: a label plus a confidence in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionEstimate {
    pub label: EmotionLabel,
    pub score: f64,
}

impl EmotionEstimate {
    /// Builds an estimate, clamping the score into [0, 1]. NaN becomes 0.
    pub fn new(label: EmotionLabel, score: f64) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        Self { label, score }
    }

    /// The sentinel produced when a modality is unavailable or fails.
    pub fn unknown() -> Self {
        Self {
            label: EmotionLabel::Unknown,
            score: 0.0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.label == EmotionLabel::Unknown
    }
}

/// The output of fusion has the same shape as a single estimate.
pub type FusedEmotion = EmotionEstimate;

//=========================================================================================
// Depression Risk
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DepressionLevel {
    Low,
    Moderate,
    High,
}

impl DepressionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepressionLevel::Low => "low",
            DepressionLevel::Moderate => "moderate",
            DepressionLevel::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" => Some(DepressionLevel::Low),
            "moderate" => Some(DepressionLevel::Moderate),
            "high" => Some(DepressionLevel::High),
            _ => None,
        }
    }
}

impl fmt::Display for DepressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of scoring one fused emotion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepressionAnalysis {
    pub depression_score: f64,
    pub depression_level: DepressionLevel,
}

/// One appended point on a user's risk trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct DepressionRecord {
    pub timestamp: DateTime<Utc>,
    pub score: f64,
    pub level: DepressionLevel,
}

/// Where an analyzed input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    Text,
    Image,
    Audio,
    Chat,
    ChatImage,
    BackgroundImage,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Text => "text",
            EventSource::Image => "image",
            EventSource::Audio => "audio",
            EventSource::Chat => "chat",
            EventSource::ChatImage => "chat_image",
            EventSource::BackgroundImage => "background_image",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "text" => Some(EventSource::Text),
            "image" => Some(EventSource::Image),
            "audio" => Some(EventSource::Audio),
            "chat" => Some(EventSource::Chat),
            "chat_image" => Some(EventSource::ChatImage),
            "background_image" => Some(EventSource::BackgroundImage),
            _ => None,
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analyzed input, kept for later reporting. Never mutated once appended.
///
/// `raw_emotion` is the estimate that drove `depression_score`; for single-modality
/// inputs this is the classifier output itself.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionalEvent {
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    pub raw_emotion: EmotionEstimate,
    pub depression_score: f64,
}

/// Metadata for an analyzed image (uploads, chat snapshots, background captures).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    pub byte_len: usize,
    pub emotion: EmotionEstimate,
    pub analysis: DepressionAnalysis,
}

//=========================================================================================
// Conversation
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The affect/risk context handed to response generation alongside the history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplyContext {
    pub dominant_label: EmotionLabel,
    pub confidence: f64,
    pub risk_level: DepressionLevel,
    pub risk_score: f64,
}

//=========================================================================================
// Reports
//=========================================================================================

/// Per-emotion aggregate inside a report.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionBreakdown {
    pub label: EmotionLabel,
    pub count: usize,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub title: &'static str,
    pub text: &'static str,
    pub icon: &'static str,
}

/// Derived, on-demand aggregate over a user's recent emotional events.
#[derive(Debug, Clone, PartialEq)]
pub struct DepressionReport {
    pub depression_score: f64,
    pub level: DepressionLevel,
    pub emotions: Vec<EmotionBreakdown>,
    pub summary: &'static str,
    pub emotion_analysis: String,
    pub recommendations: Vec<Recommendation>,
    pub generated_at: DateTime<Utc>,
}

/// The short-window risk badge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskSummary {
    pub average_score: f64,
    pub level: DepressionLevel,
    pub sample_size: usize,
}
