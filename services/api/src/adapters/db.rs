//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `PersistenceSink` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Every table is append-only; reads return the newest rows first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use companion_core::domain::{
    DepressionLevel, DepressionRecord, DepressionReport, EmotionEstimate, EmotionLabel,
    EmotionalEvent, EventSource, ImageRecord,
};
use companion_core::ports::{PersistenceSink, PortError, PortResult};
use serde_json::json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `PersistenceSink` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn parse_level(raw: &str) -> PortResult<DepressionLevel> {
    DepressionLevel::parse(raw)
        .ok_or_else(|| PortError::Unexpected(format!("Unknown depression level '{}'", raw)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct EventRecord {
    occurred_at: DateTime<Utc>,
    source: String,
    emotion: String,
    confidence: f64,
    depression_score: f64,
}
impl EventRecord {
    fn to_domain(self) -> PortResult<EmotionalEvent> {
        let source = EventSource::parse(&self.source)
            .ok_or_else(|| PortError::Unexpected(format!("Unknown event source '{}'", self.source)))?;
        let label = EmotionLabel::from_classifier_label(&self.emotion);
        Ok(EmotionalEvent {
            timestamp: self.occurred_at,
            source,
            raw_emotion: EmotionEstimate::new(label, self.confidence),
            depression_score: self.depression_score,
        })
    }
}

#[derive(FromRow)]
struct ScoreRecord {
    recorded_at: DateTime<Utc>,
    score: f64,
    level: String,
}
impl ScoreRecord {
    fn to_domain(self) -> PortResult<DepressionRecord> {
        Ok(DepressionRecord {
            timestamp: self.recorded_at,
            score: self.score,
            level: parse_level(&self.level)?,
        })
    }
}

//=========================================================================================
// `PersistenceSink` Trait Implementation
//=========================================================================================

#[async_trait]
impl PersistenceSink for DbAdapter {
    async fn persist_event(&self, user_id: Uuid, event: &EmotionalEvent) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO emotional_events (user_id, occurred_at, source, emotion, confidence, depression_score)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user_id)
        .bind(event.timestamp)
        .bind(event.source.as_str())
        .bind(event.raw_emotion.label.as_str())
        .bind(event.raw_emotion.score)
        .bind(event.depression_score)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn persist_score(&self, user_id: Uuid, record: &DepressionRecord) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO depression_scores (user_id, recorded_at, score, level) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(record.timestamp)
        .bind(record.score)
        .bind(record.level.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn persist_image_metadata(&self, user_id: Uuid, record: &ImageRecord) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO activity_images
                (id, user_id, captured_at, source, byte_len, emotion, confidence, depression_score, depression_level)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id)
        .bind(user_id)
        .bind(record.timestamp)
        .bind(record.source.as_str())
        .bind(record.byte_len as i64)
        .bind(record.emotion.label.as_str())
        .bind(record.emotion.score)
        .bind(record.analysis.depression_score)
        .bind(record.analysis.depression_level.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn archive_report(&self, user_id: Uuid, report: &DepressionReport) -> PortResult<()> {
        let emotions = json!(report
            .emotions
            .iter()
            .map(|e| json!({
                "emotion": e.label.as_str(),
                "count": e.count,
                "average_confidence": e.average_confidence,
            }))
            .collect::<Vec<_>>());
        let recommendations = json!(report
            .recommendations
            .iter()
            .map(|r| json!({ "title": r.title, "text": r.text, "icon": r.icon }))
            .collect::<Vec<_>>());

        sqlx::query(
            "INSERT INTO depression_reports
                (user_id, generated_at, depression_score, level, summary, emotion_analysis, emotions, recommendations)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(user_id)
        .bind(report.generated_at)
        .bind(report.depression_score)
        .bind(report.level.as_str())
        .bind(report.summary)
        .bind(&report.emotion_analysis)
        .bind(emotions.to_string())
        .bind(recommendations.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn read_recent_events(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> PortResult<Vec<EmotionalEvent>> {
        let records = sqlx::query_as::<_, EventRecord>(
            "SELECT occurred_at, source, emotion, confidence, depression_score
             FROM emotional_events WHERE user_id = $1
             ORDER BY occurred_at DESC, seq DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        records.into_iter().map(EventRecord::to_domain).collect()
    }

    async fn read_recent_scores(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> PortResult<Vec<DepressionRecord>> {
        let records = sqlx::query_as::<_, ScoreRecord>(
            "SELECT recorded_at, score, level
             FROM depression_scores WHERE user_id = $1
             ORDER BY recorded_at DESC, seq DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        records.into_iter().map(ScoreRecord::to_domain).collect()
    }
}
