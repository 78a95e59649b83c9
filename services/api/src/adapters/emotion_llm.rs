//! services/api/src/adapters/emotion_llm.rs
//!
//! This module contains the emotion classifiers backed by an OpenAI-compatible model.
//! It implements the `TextEmotionClassifier` and `ImageEmotionClassifier` ports.
//! Text is sent as a chat message; images go through the vision input as a data URL.

const TEXT_INSTRUCTIONS: &str = r#"You classify the dominant emotion expressed in a short message.
Choose exactly one of: joy, sadness, anger, fear, surprise, disgust, neutral.
Respond with a single JSON object and nothing else, for example:
{"emotion": "sadness", "confidence": 0.82}
"confidence" is a number between 0 and 1."#;

const IMAGE_INSTRUCTIONS: &str = r#"You classify the facial expression of the most prominent face in a photo.
Choose exactly one of: joy, sadness, anger, fear, surprise, disgust, neutral.
If there is no visible face, answer with "unknown" and confidence 0.
Respond with a single JSON object and nothing else, for example:
{"emotion": "neutral", "confidence": 0.64}"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use companion_core::{
    domain::{EmotionEstimate, EmotionLabel},
    ports::{ImageEmotionClassifier, PortError, PortResult, TextEmotionClassifier},
};
use regex::Regex;
use serde::Deserialize;

/// The JSON object the model is asked to produce.
#[derive(Debug, Deserialize)]
struct ClassifierVerdict {
    emotion: String,
    #[serde(default)]
    confidence: f64,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that classifies text and images using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiEmotionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmotionAdapter {
    /// Creates a new `OpenAiEmotionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> PortResult<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .temperature(0.0)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PortError::Unexpected("Classifier returned no content.".to_string()))
    }

    /// Pulls the first JSON object out of the model output and maps it onto the label set.
    fn parse_verdict(raw: &str) -> PortResult<EmotionEstimate> {
        let object_regex =
            Regex::new(r"(?s)\{.*?\}").map_err(|e| PortError::Unexpected(e.to_string()))?;
        let object = object_regex
            .find(raw)
            .ok_or_else(|| PortError::Unexpected(format!("No JSON verdict in: {}", raw)))?;
        let verdict: ClassifierVerdict = serde_json::from_str(object.as_str())
            .map_err(|e| PortError::Unexpected(format!("Malformed verdict: {}", e)))?;

        let label = EmotionLabel::from_classifier_label(&verdict.emotion);
        if label == EmotionLabel::Unknown {
            return Ok(EmotionEstimate::unknown());
        }
        Ok(EmotionEstimate::new(label, verdict.confidence))
    }

    /// Builds a `data:` URL, sniffing PNG and falling back to JPEG.
    fn image_data_url(image: &[u8]) -> String {
        let mime = if image.starts_with(&[0x89, b'P', b'N', b'G']) {
            "image/png"
        } else {
            "image/jpeg"
        };
        format!("data:{};base64,{}", mime, STANDARD.encode(image))
    }
}

//=========================================================================================
// Classifier Trait Implementations
//=========================================================================================

#[async_trait]
impl TextEmotionClassifier for OpenAiEmotionAdapter {
    async fn classify_text(&self, text: &str) -> PortResult<EmotionEstimate> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(TEXT_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(text)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];
        let raw = self.complete(messages).await?;
        Self::parse_verdict(&raw)
    }
}

#[async_trait]
impl ImageEmotionClassifier for OpenAiEmotionAdapter {
    async fn classify_image(&self, image: &[u8]) -> PortResult<EmotionEstimate> {
        if image.is_empty() {
            return Err(PortError::Unexpected("Empty image payload.".to_string()));
        }

        let image_part: ChatCompletionRequestUserMessageContentPart =
            ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(
                    ImageUrlArgs::default()
                        .url(Self::image_data_url(image))
                        .detail(ImageDetail::Low)
                        .build()
                        .map_err(|e| PortError::Unexpected(e.to_string()))?,
                )
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into();
        let text_part: ChatCompletionRequestUserMessageContentPart =
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text("What emotion does this face show?")
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into();

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(IMAGE_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(vec![text_part, image_part])
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];
        let raw = self.complete(messages).await?;
        Self::parse_verdict(&raw)
    }
}
