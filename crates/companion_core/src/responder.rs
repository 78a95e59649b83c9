//! crates/companion_core/src/responder.rs
//!
//! The deterministic, rule-based side of response generation: welcome messages,
//! the keyword/emotion fallback responder, the reply-generator fallback chain and
//! the response enhancement addenda appended after every generated reply.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::domain::{
    ConversationTurn, DepressionAnalysis, DepressionLevel, EmotionLabel, FusedEmotion,
    ReplyContext, Role,
};
use crate::ports::{PortResult, ReplyGenerator};
use crate::random::{choose, RandomSource};

//=========================================================================================
// Canned Replies
//=========================================================================================

pub const CLARIFICATION_REPLY: &str = "I didn't catch that. Could you please say something?";

pub const TROUBLE_REPLY: &str = "I'm having trouble connecting right now. Could you try again?";

pub const WELCOME_MESSAGES: [&str; 4] = [
    "Hi there! I'm your companion, here to chat, listen, and support you. How are you feeling today?",
    "Hello! This is a safe space for you to share your thoughts and feelings. How's your day going so far?",
    "Welcome! I'm your friendly well-being companion, and I'm all ears if you'd like to talk about anything on your mind today.",
    "Hi! Think of me as a supportive friend who's here to listen without judgment. What's on your mind today?",
];

/// Picks one of the four welcome variants.
pub fn welcome_message(random: &dyn RandomSource) -> &'static str {
    choose(random, &WELCOME_MESSAGES)
}

//=========================================================================================
// Response Enhancement
//=========================================================================================

const HIGH_RISK_ADDENDUM: &str = "\n\nIf you're feeling overwhelmed, remember that help is available. Consider talking to a trusted friend, family member, or mental health professional. You don't have to face these feelings alone.";
const MODERATE_RISK_ADDENDUM: &str = "\n\nRemember that it's okay to have difficult days. Taking small steps to care for yourself can make a difference. Perhaps try a short walk outside or connect with someone you trust.";
const SADNESS_ADDENDUM: &str = "\n\nWhen feelings of sadness are present, it can help to engage your senses. Maybe try listening to a favorite uplifting song, enjoying a warm drink, or stepping outside for some fresh air.";
const FEAR_ADDENDUM: &str = "\n\nWhen anxiety or fear feels strong, grounding techniques can help. Try the 5-4-3-2-1 technique: notice 5 things you see, 4 things you can touch, 3 things you hear, 2 things you smell, and 1 thing you taste.";
const ANGER_ADDENDUM: &str = "\n\nWhen strong emotions like frustration arise, taking a moment for some deep breaths can help create space between feelings and reactions. Breathing in for 4 counts and out for 6 can be especially calming.";
const JOY_ADDENDUM: &str = "\n\nIt's wonderful to experience these positive feelings. Taking a moment to savor and appreciate them can help extend their benefits.";

const RISK_ADDENDUM_HIGH_SCORE: f64 = 0.7;
const RISK_ADDENDUM_MODERATE_SCORE: f64 = 0.4;
const EMOTION_ADDENDUM_CONFIDENCE: f64 = 0.7;

/// Appends the risk-tier and emotion-specific addenda. The two rules are independent.
pub fn enhance_reply(reply: &str, fused: &FusedEmotion, analysis: &DepressionAnalysis) -> String {
    let mut enhanced = reply.to_string();

    match analysis.depression_level {
        DepressionLevel::High if analysis.depression_score > RISK_ADDENDUM_HIGH_SCORE => {
            enhanced.push_str(HIGH_RISK_ADDENDUM);
        }
        DepressionLevel::Moderate if analysis.depression_score > RISK_ADDENDUM_MODERATE_SCORE => {
            enhanced.push_str(MODERATE_RISK_ADDENDUM);
        }
        _ => {}
    }

    if fused.score > EMOTION_ADDENDUM_CONFIDENCE {
        let addendum = match fused.label {
            EmotionLabel::Sadness => Some(SADNESS_ADDENDUM),
            EmotionLabel::Fear => Some(FEAR_ADDENDUM),
            EmotionLabel::Anger => Some(ANGER_ADDENDUM),
            EmotionLabel::Joy => Some(JOY_ADDENDUM),
            _ => None,
        };
        if let Some(addendum) = addendum {
            enhanced.push_str(addendum);
        }
    }

    enhanced
}

//=========================================================================================
// Rule-based Responder
//=========================================================================================

const GREETING_REPLIES: [&str; 4] = [
    "Hello! It's so nice to connect with you today. How are you feeling?",
    "Hi there! I'm here to chat and support you. How's your day going?",
    "Hey! Thanks for reaching out. I'm here to listen and support you. How are you doing today?",
    "Hello! I'm glad you're here. How are you feeling today? I'm here to listen and chat.",
];

const GRATITUDE_REPLIES: [&str; 4] = [
    "You're very welcome. I'm glad I could help. Is there anything else on your mind you'd like to talk about?",
    "I'm happy I could be here for you. Remember, I'm always available when you need someone to talk to.",
    "It means a lot to hear that. I'm here to support you anytime you need. How else are you feeling today?",
    "You're welcome! Your wellbeing matters, and I'm glad to be part of your journey. Is there anything else you'd like to discuss?",
];

const IDENTITY_REPLIES: [&str; 3] = [
    "I'm your well-being companion, an AI designed to provide emotional support and help you keep an eye on how you're doing. I'm here to listen in a judgment-free space.",
    "Think of me as a supportive friend who's always here to listen. I offer emotional support, help you track your wellbeing, and share gentle guidance when it's useful.",
    "I'm a companion focused on mental health support. I listen, respond with empathy, and help you notice how your mood changes over time.",
];

const HELP_REPLIES: [&str; 4] = [
    "I'm here to help. Feel free to share what's on your mind, and we can work through it together. For serious concerns, it's important to reach out to a mental health professional.",
    "I'm listening and ready to support you. Would you like to talk about what's troubling you? Sometimes just expressing our thoughts can help us see things more clearly.",
    "You're not alone, and I'm here to support you. Share as much or as little as you're comfortable with. What kind of help are you looking for today?",
    "I'm here to support you in any way I can. Would it help to talk through what you're experiencing? A mental health professional can also provide specialized care.",
];

const SADNESS_REPLIES: [&str; 5] = [
    "I'm sorry to hear you're feeling down. Emotions come and go, and difficult moments will pass. Would it help to talk about what's causing these feelings?",
    "It sounds like you're going through a tough time. Sharing your feelings can help lighten the burden. What's been on your mind lately?",
    "I notice a sense of sadness in your message. It's okay to feel this way, and acknowledging it is an important step. Would you like to explore some gentle activities that might lift your mood?",
    "I hear that you're feeling sad. Many people experience these feelings; it's part of being human. Is there something specific that triggered them?",
    "When we're sad it can feel like it will last forever, but emotions do shift. Would it help to talk about what might bring you some comfort right now?",
];

const ANGER_REPLIES: [&str; 4] = [
    "I notice there's some frustration in your message. A few deep breaths can help clear your mind. Would you like to talk more about what's bothering you?",
    "It seems like you're feeling frustrated. That's a natural emotion when facing challenges. What's triggering these feelings right now?",
    "I can sense some anger in your words. Writing down exactly what's upsetting you can help process it. Would you like to share more about the situation?",
    "Anger is a completely valid emotion, and it often points toward something that needs attention. What do you think yours might be telling you?",
];

const FEAR_REPLIES: [&str; 4] = [
    "It sounds like you might be experiencing some anxiety. You're not alone; many people go through similar feelings. Is something specific causing concern right now?",
    "I notice some worry in your message. Anxiety is sometimes our mind's way of trying to protect us. Can you identify what feels threatening or uncertain?",
    "Feeling anxious or worried is something many of us experience. It can help to break what feels overwhelming into smaller pieces. Would you like to talk it through?",
    "I hear that you're feeling fearful. These emotions are uncomfortable, but they're normal responses to stress or uncertainty. Shall we explore some calming techniques together?",
];

const JOY_REPLIES: [&str; 4] = [
    "It's wonderful to see you in good spirits! Moments like these are a great chance to reflect on what brings you happiness.",
    "I'm glad to hear you're feeling positive! What's contributed to your good mood today?",
    "It's great to see your upbeat message! Savoring positive emotions can help extend their benefits.",
    "I'm happy to hear you're feeling good! Is there something specific that brought you joy today?",
];

const GENERAL_REPLIES: [&str; 4] = [
    "Thank you for sharing that with me. I'm here to listen and support you. Would you like to tell me more about what's on your mind?",
    "I appreciate you reaching out. Sometimes having someone to talk to makes a difference. How else have you been feeling lately?",
    "I'm here to support you. Share whatever you're comfortable with, and we can explore it together. What matters most to you right now?",
    "I'm listening and I care about what you're going through. Is there something specific you'd like to focus on today?",
];

const GREETING_WORDS: [&str; 4] = ["hello", "hi", "hey", "greetings"];
const GRATITUDE_WORDS: [&str; 3] = ["thanks", "thank you", "appreciate"];
const IDENTITY_PHRASES: [&str; 2] = ["who are you", "what are you"];
const HELP_WORDS: [&str; 3] = ["help", "assist", "support"];
const FEELING_MARKERS: [&str; 5] = ["i feel", "feeling", "felt", "i am", "i'm"];
const SAD_WORDS: [&str; 5] = ["sad", "down", "depressed", "unhappy", "miserable"];
const ANGRY_WORDS: [&str; 5] = ["angry", "mad", "frustrated", "annoyed", "irritated"];
const ANXIOUS_WORDS: [&str; 5] = ["scared", "afraid", "anxious", "nervous", "worried"];
const HAPPY_WORDS: [&str; 5] = ["happy", "good", "great", "wonderful", "fantastic"];

/// What the user's last message is doing, in the order the rules are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    Gratitude,
    Identity,
    HelpRequest,
    /// An explicit "I feel ..." statement or, failing that, the detected emotion.
    Emotional(EmotionLabel),
    General,
}

/// Lowercased words joined by single spaces and padded, so keyword checks are
/// whole-word (`"hi"` does not match "this").
fn normalize(message: &str) -> String {
    let lowered = message.to_lowercase().replace('\u{2019}', "'");
    let words: Vec<&str> = lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .collect();
    format!(" {} ", words.join(" "))
}

fn mentions(normalized: &str, keywords: &[&str]) -> bool {
    keywords
        .iter()
        .any(|k| normalized.contains(&format!(" {k} ")))
}

/// Checks keyword rules first, then falls back to the detected emotion.
pub fn detect_intent(message: &str, detected: EmotionLabel) -> Intent {
    let text = normalize(message);

    if mentions(&text, &GREETING_WORDS) {
        return Intent::Greeting;
    }
    if mentions(&text, &GRATITUDE_WORDS) {
        return Intent::Gratitude;
    }
    if mentions(&text, &IDENTITY_PHRASES) {
        return Intent::Identity;
    }
    if mentions(&text, &HELP_WORDS) {
        return Intent::HelpRequest;
    }
    if mentions(&text, &FEELING_MARKERS) {
        let stated = [
            (SAD_WORDS.as_slice(), EmotionLabel::Sadness),
            (ANGRY_WORDS.as_slice(), EmotionLabel::Anger),
            (ANXIOUS_WORDS.as_slice(), EmotionLabel::Fear),
            (HAPPY_WORDS.as_slice(), EmotionLabel::Joy),
        ]
        .into_iter()
        .find(|(words, _)| mentions(&text, words));
        if let Some((_, label)) = stated {
            return Intent::Emotional(label);
        }
    }

    match detected {
        EmotionLabel::Sadness | EmotionLabel::Anger | EmotionLabel::Fear | EmotionLabel::Joy => {
            Intent::Emotional(detected)
        }
        _ => Intent::General,
    }
}

/// Local fallback responder. Pure apart from the injected random source.
pub struct RuleBasedResponder {
    random: Arc<dyn RandomSource>,
}

impl RuleBasedResponder {
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }

    pub fn respond(&self, message: &str, context: &ReplyContext) -> &'static str {
        let pool: &[&'static str] = match detect_intent(message, context.dominant_label) {
            Intent::Greeting => &GREETING_REPLIES,
            Intent::Gratitude => &GRATITUDE_REPLIES,
            Intent::Identity => &IDENTITY_REPLIES,
            Intent::HelpRequest => &HELP_REPLIES,
            Intent::Emotional(EmotionLabel::Sadness) => &SADNESS_REPLIES,
            Intent::Emotional(EmotionLabel::Anger) => &ANGER_REPLIES,
            Intent::Emotional(EmotionLabel::Fear) => &FEAR_REPLIES,
            Intent::Emotional(EmotionLabel::Joy) => &JOY_REPLIES,
            Intent::Emotional(_) | Intent::General => &GENERAL_REPLIES,
        };
        choose(self.random.as_ref(), pool)
    }
}

#[async_trait]
impl ReplyGenerator for RuleBasedResponder {
    async fn generate_reply(
        &self,
        history: &[ConversationTurn],
        context: &ReplyContext,
    ) -> PortResult<String> {
        let last_user_message = history
            .iter()
            .rev()
            .find(|turn| turn.role == Role::User)
            .map(|turn| turn.content.as_str())
            .unwrap_or_default();
        Ok(self.respond(last_user_message, context).to_string())
    }
}

//=========================================================================================
// Fallback Chain
//=========================================================================================

/// Tries the primary backend and falls back to the local responder when it fails.
pub struct FallbackReplyGenerator {
    primary: Option<Arc<dyn ReplyGenerator>>,
    fallback: Arc<dyn ReplyGenerator>,
}

impl FallbackReplyGenerator {
    pub fn new(primary: Option<Arc<dyn ReplyGenerator>>, fallback: Arc<dyn ReplyGenerator>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl ReplyGenerator for FallbackReplyGenerator {
    async fn generate_reply(
        &self,
        history: &[ConversationTurn],
        context: &ReplyContext,
    ) -> PortResult<String> {
        if let Some(primary) = &self.primary {
            match primary.generate_reply(history, context).await {
                Ok(reply) if !reply.trim().is_empty() => return Ok(reply),
                Ok(_) => warn!("Reply backend returned an empty reply; using rule-based responder."),
                Err(e) => warn!("Reply backend failed ({}); using rule-based responder.", e),
            }
        }
        self.fallback.generate_reply(history, context).await
    }
}
