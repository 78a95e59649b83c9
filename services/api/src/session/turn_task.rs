//! services/api/src/session/turn_task.rs
//!
//! This module contains the foreground turn pipeline: classify the user's input,
//! fuse, score, persist, generate a reply and enhance it.

use crate::error::SessionError;
use crate::session::state::ChatSession;
use companion_core::responder::{enhance_reply, CLARIFICATION_REPLY, TROUBLE_REPLY};
use companion_core::{AffectAnalysis, ConversationTurn, EventSource, ModalityEstimates};
use std::time::Instant;
use tracing::{info, warn};

/// One user input. Either form may carry a camera frame taken alongside it.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnInput {
    Text {
        message: String,
        image: Option<Vec<u8>>,
    },
    Audio {
        audio: Vec<u8>,
        image: Option<Vec<u8>>,
    },
}

impl TurnInput {
    pub fn text(message: impl Into<String>) -> Self {
        TurnInput::Text {
            message: message.into(),
            image: None,
        }
    }
}

/// What a turn hands back to the caller. `analysis` is `None` when the input was empty.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    pub reply: String,
    pub transcript: Option<String>,
    pub analysis: Option<AffectAnalysis>,
}

impl TurnReply {
    fn clarification() -> Self {
        Self {
            reply: CLARIFICATION_REPLY.to_string(),
            transcript: None,
            analysis: None,
        }
    }
}

impl ChatSession {
    /// Processes one foreground turn. Only reply-generation failures are absorbed here;
    /// classification and persistence failures already degrade inside the analyzer.
    pub async fn submit_turn(&mut self, input: TurnInput) -> Result<TurnReply, SessionError> {
        self.ensure_active()?;
        self.touch();
        let start_time = Instant::now();
        let analyzer = self.services.analyzer.clone();

        let (user_text, transcript, source, mut estimates, image) = match input {
            TurnInput::Text { message, image } => {
                let message = message.trim().to_string();
                if message.is_empty() {
                    return Ok(TurnReply::clarification());
                }
                let estimates = ModalityEstimates {
                    text: Some(analyzer.classify_text(&message).await),
                    ..Default::default()
                };
                (message, None, EventSource::Chat, estimates, image)
            }
            TurnInput::Audio { audio, image } => {
                let classification = analyzer.transcribe_and_classify_audio(&audio).await;
                let Some(transcript) = classification.transcript else {
                    info!("Audio turn in session {} produced no transcript.", self.id);
                    return Ok(TurnReply::clarification());
                };
                let estimates = ModalityEstimates {
                    audio: Some(classification.emotion),
                    ..Default::default()
                };
                (transcript.clone(), Some(transcript), EventSource::Audio, estimates, image)
            }
        };

        self.push_turn(ConversationTurn::user(user_text));

        if let Some(image) = &image {
            estimates.image = Some(analyzer.classify_image(image).await);
        }
        let analysis = analyzer.evaluate(estimates);
        analyzer
            .record(self.user_id, source, &analysis, image.as_ref().map(Vec::len))
            .await;

        let recent = self.recent_history();
        let reply = match self
            .services
            .responder
            .generate_reply(&recent, &analysis.reply_context())
            .await
        {
            Ok(reply) => {
                self.push_turn(ConversationTurn::assistant(reply.clone()));
                enhance_reply(&reply, &analysis.fused, &analysis.depression)
            }
            Err(e) => {
                warn!("Reply generation failed for session {}: {}", self.id, e);
                TROUBLE_REPLY.to_string()
            }
        };

        info!(
            "Session {} turn: {} ({:.2}) → risk {} ({:.2}) in {:?}",
            self.id,
            analysis.fused.label,
            analysis.fused.score,
            analysis.depression.depression_level,
            analysis.depression.depression_score,
            start_time.elapsed()
        );

        Ok(TurnReply {
            reply,
            transcript,
            analysis: Some(analysis),
        })
    }
}
