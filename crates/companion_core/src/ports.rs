//! crates/companion_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the engine's collaborators.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to stay independent of specific model backends, databases or capture hardware.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    ConversationTurn, DepressionRecord, DepressionReport, EmotionEstimate, EmotionalEvent,
    ImageRecord, ReplyContext,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (models, database, devices).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The collaborator is not configured, not loadable, or unreachable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Modality Classifiers
//=========================================================================================

#[async_trait]
pub trait TextEmotionClassifier: Send + Sync {
    /// Classifies the dominant emotion expressed in a piece of text.
    async fn classify_text(&self, text: &str) -> PortResult<EmotionEstimate>;
}

#[async_trait]
pub trait ImageEmotionClassifier: Send + Sync {
    /// Classifies the facial emotion visible in an encoded image.
    async fn classify_image(&self, image: &[u8]) -> PortResult<EmotionEstimate>;
}

#[async_trait]
pub trait SpeechToTextService: Send + Sync {
    /// Transcribes a slice of audio data into text.
    async fn transcribe_audio(&self, audio_data: &[u8]) -> PortResult<String>;
}

//=========================================================================================
// Response Generation
//=========================================================================================

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Produces the assistant's next reply from the recent history and affect context.
    async fn generate_reply(
        &self,
        history: &[ConversationTurn],
        context: &ReplyContext,
    ) -> PortResult<String>;
}

//=========================================================================================
// Persistence Sink
//=========================================================================================

/// Append-only store keyed by user.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn persist_event(&self, user_id: Uuid, event: &EmotionalEvent) -> PortResult<()>;

    async fn persist_score(&self, user_id: Uuid, record: &DepressionRecord) -> PortResult<()>;

    async fn persist_image_metadata(&self, user_id: Uuid, record: &ImageRecord) -> PortResult<()>;

    async fn archive_report(&self, user_id: Uuid, report: &DepressionReport) -> PortResult<()>;

    /// Most recent events first; ties on timestamp resolve newest insertion first.
    async fn read_recent_events(&self, user_id: Uuid, limit: usize)
        -> PortResult<Vec<EmotionalEvent>>;

    /// Most recent depression records first.
    async fn read_recent_scores(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> PortResult<Vec<DepressionRecord>>;
}

//=========================================================================================
// Capture Device
//=========================================================================================

/// An exclusive, open handle to a frame source such as a camera.
#[async_trait]
pub trait CaptureDevice: Send {
    /// Reads one encoded frame. An error here is transient; the caller may retry.
    async fn read_frame(&mut self) -> PortResult<Vec<u8>>;

    /// Releases the underlying device. Must be safe to call more than once.
    fn release(&mut self);
}

#[async_trait]
pub trait CaptureDeviceFactory: Send + Sync {
    /// Opens the device. An error here is an unrecoverable setup failure.
    async fn open(&self) -> PortResult<Box<dyn CaptureDevice>>;
}
