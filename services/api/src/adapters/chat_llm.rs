//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the conversational LLM.
//! It implements the `ReplyGenerator` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = r#"You are a warm, supportive well-being companion having a conversation with the user.

Style:
- Sound like a caring friend, not a clinician or a textbook.
- Keep replies to a few sentences. Ask at most one gentle follow-up question.
- Reflect the user's feelings back before offering suggestions.
- Never diagnose, never mention scores or risk levels, and never claim to be a therapist.
- If the user mentions self-harm or being unsafe, encourage them to contact a crisis line or a trusted person right away.

You will receive a short EMOTIONAL CONTEXT block describing how the user seems to feel right now.
Use it to choose your tone. Do not quote it back to the user."#;

const CONTEXT_TEMPLATE: &str = r#"EMOTIONAL CONTEXT:
- dominant emotion: {emotion} (confidence {confidence})
- overall mood risk: {risk} (score {risk_score})"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use companion_core::{
    domain::{ConversationTurn, ReplyContext, Role},
    ports::{PortError, PortResult, ReplyGenerator},
};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ReplyGenerator` using an OpenAI-compatible chat model.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatAdapter {
    /// Creates a new `OpenAiChatAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn context_block(context: &ReplyContext) -> String {
        CONTEXT_TEMPLATE
            .replace("{emotion}", context.dominant_label.as_str())
            .replace("{confidence}", &format!("{:.2}", context.confidence))
            .replace("{risk_score}", &format!("{:.2}", context.risk_score))
            .replace("{risk}", context.risk_level.as_str())
    }

    fn build_messages(
        history: &[ConversationTurn],
        context: &ReplyContext,
    ) -> PortResult<Vec<ChatCompletionRequestMessage>> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 2);
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(Self::context_block(context))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );

        for turn in history {
            let message: ChatCompletionRequestMessage = match turn.role {
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.as_str())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content.as_str())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into(),
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(turn.content.as_str())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into(),
            };
            messages.push(message);
        }
        Ok(messages)
    }
}

//=========================================================================================
// `ReplyGenerator` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReplyGenerator for OpenAiChatAdapter {
    async fn generate_reply(
        &self,
        history: &[ConversationTurn],
        context: &ReplyContext,
    ) -> PortResult<String> {
        let messages = Self::build_messages(history, context)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        debug!("Chat model produced {} characters.", reply.len());
        if reply.is_empty() {
            return Err(PortError::Unexpected(
                "Chat model returned no content.".to_string(),
            ));
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_core::domain::{DepressionLevel, EmotionLabel};

    #[test]
    fn context_block_describes_the_current_mood() {
        let block = OpenAiChatAdapter::context_block(&ReplyContext {
            dominant_label: EmotionLabel::Sadness,
            confidence: 0.834,
            risk_level: DepressionLevel::High,
            risk_score: 0.67,
        });
        assert!(block.contains("dominant emotion: sadness (confidence 0.83)"));
        assert!(block.contains("overall mood risk: high (score 0.67)"));
    }

    #[test]
    fn history_follows_the_two_system_messages() {
        let history = vec![
            ConversationTurn::user("hi"),
            ConversationTurn::assistant("hello there"),
            ConversationTurn::user("I'm tired"),
        ];
        let context = ReplyContext {
            dominant_label: EmotionLabel::Neutral,
            confidence: 0.5,
            risk_level: DepressionLevel::Low,
            risk_score: 0.1,
        };
        let messages = OpenAiChatAdapter::build_messages(&history, &context).unwrap();
        assert_eq!(messages.len(), 5);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[3], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(messages[4], ChatCompletionRequestMessage::User(_)));
    }
}
