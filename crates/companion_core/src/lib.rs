pub mod analysis;
pub mod domain;
pub mod fusion;
pub mod ports;
pub mod random;
pub mod report;
pub mod responder;
pub mod scoring;

pub use analysis::{AffectAnalysis, AffectAnalyzer, AudioClassification, Classifiers, ModalityEstimates};
pub use domain::{
    ConversationTurn, DepressionAnalysis, DepressionLevel, DepressionRecord, DepressionReport,
    EmotionBreakdown, EmotionEstimate, EmotionLabel, EmotionalEvent, EventSource, FusedEmotion,
    ImageRecord, Recommendation, ReplyContext, RiskSummary, Role,
};
pub use fusion::fuse;
pub use ports::{
    CaptureDevice, CaptureDeviceFactory, ImageEmotionClassifier, PersistenceSink, PortError,
    PortResult, ReplyGenerator, SpeechToTextService, TextEmotionClassifier,
};
pub use random::{FixedIndex, RandomSource, StdRandom};
pub use responder::{FallbackReplyGenerator, RuleBasedResponder};
pub use scoring::{PolicyError, ScoringPolicy};
