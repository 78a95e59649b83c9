//! services/api/src/session/mod.rs
//!
//! The Chat Session Manager: per-conversation state machines, the foreground turn
//! pipeline, the background capture worker and the registry that owns them all.

pub mod capture_task;
pub mod registry;
pub mod state;
pub mod turn_task;

pub use capture_task::CaptureExit;
pub use registry::{SessionRegistry, StartedSession};
pub use state::{ChatMode, ChatSession, SessionMode, SessionServices};
pub use turn_task::{TurnInput, TurnReply};

/// Hand-written collaborators shared by the session tests.
#[cfg(test)]
pub(crate) mod test_support {
    use crate::adapters::InMemorySink;
    use crate::config::SessionSettings;
    use crate::session::state::{ChatSession, SessionServices};
    use async_trait::async_trait;
    use companion_core::{
        AffectAnalyzer, CaptureDevice, CaptureDeviceFactory, Classifiers, ConversationTurn,
        EmotionEstimate, EmotionLabel, FixedIndex, ImageEmotionClassifier, PortError, PortResult,
        ReplyContext, ReplyGenerator, ScoringPolicy, SpeechToTextService, TextEmotionClassifier,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use uuid::Uuid;

    pub const SCRIPTED_REPLY: &str = "That sounds like a lot. Tell me more?";

    //-------------------------------------------------------------------------------------
    // Classifiers
    //-------------------------------------------------------------------------------------

    struct FixedText(EmotionEstimate);

    #[async_trait]
    impl TextEmotionClassifier for FixedText {
        async fn classify_text(&self, _text: &str) -> PortResult<EmotionEstimate> {
            Ok(self.0)
        }
    }

    struct FixedImage(EmotionEstimate);

    #[async_trait]
    impl ImageEmotionClassifier for FixedImage {
        async fn classify_image(&self, _image: &[u8]) -> PortResult<EmotionEstimate> {
            Ok(self.0)
        }
    }

    struct FixedTranscript(Option<&'static str>);

    #[async_trait]
    impl SpeechToTextService for FixedTranscript {
        async fn transcribe_audio(&self, _audio: &[u8]) -> PortResult<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| PortError::Unavailable("no speech".to_string()))
        }
    }

    //-------------------------------------------------------------------------------------
    // Reply Generator
    //-------------------------------------------------------------------------------------

    #[derive(Default)]
    struct ScriptState {
        fail: bool,
        calls: AtomicUsize,
        last_history: Mutex<Vec<ConversationTurn>>,
    }

    /// Answers every turn with `SCRIPTED_REPLY`, or fails every call.
    #[derive(Clone, Default)]
    pub struct ScriptedReplies(Arc<ScriptState>);

    impl ScriptedReplies {
        pub fn failing() -> Self {
            Self(Arc::new(ScriptState {
                fail: true,
                ..Default::default()
            }))
        }

        pub fn calls(&self) -> usize {
            self.0.calls.load(Ordering::SeqCst)
        }

        pub fn last_history(&self) -> Vec<ConversationTurn> {
            self.0.last_history.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReplyGenerator for ScriptedReplies {
        async fn generate_reply(
            &self,
            history: &[ConversationTurn],
            _context: &ReplyContext,
        ) -> PortResult<String> {
            self.0.calls.fetch_add(1, Ordering::SeqCst);
            *self.0.last_history.lock().unwrap() = history.to_vec();
            if self.0.fail {
                Err(PortError::Unavailable("backend down".to_string()))
            } else {
                Ok(SCRIPTED_REPLY.to_string())
            }
        }
    }

    //-------------------------------------------------------------------------------------
    // Capture Device
    //-------------------------------------------------------------------------------------

    /// Counts what the capture loop does with the camera.
    #[derive(Clone, Default)]
    pub struct CameraSpy {
        pub opens: Arc<AtomicUsize>,
        pub releases: Arc<AtomicUsize>,
        pub reads: Arc<AtomicUsize>,
        pub frames_served: Arc<AtomicUsize>,
        fail_reads: usize,
        fail_open: bool,
    }

    impl CameraSpy {
        /// The first `n` reads fail.
        pub fn failing_reads(n: usize) -> Self {
            Self {
                fail_reads: n,
                ..Default::default()
            }
        }

        /// The device can never be opened.
        pub fn broken() -> Self {
            Self {
                fail_open: true,
                ..Default::default()
            }
        }

        pub fn factory(&self) -> SpyFactory {
            SpyFactory(self.clone())
        }
    }

    pub struct SpyFactory(CameraSpy);

    #[async_trait]
    impl CaptureDeviceFactory for SpyFactory {
        async fn open(&self) -> PortResult<Box<dyn CaptureDevice>> {
            if self.0.fail_open {
                return Err(PortError::Unavailable("no camera".to_string()));
            }
            self.0.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(SpyDevice {
                spy: self.0.clone(),
                released: false,
            }))
        }
    }

    struct SpyDevice {
        spy: CameraSpy,
        released: bool,
    }

    #[async_trait]
    impl CaptureDevice for SpyDevice {
        async fn read_frame(&mut self) -> PortResult<Vec<u8>> {
            let read = self.spy.reads.fetch_add(1, Ordering::SeqCst) + 1;
            if read <= self.spy.fail_reads {
                return Err(PortError::Unexpected("frame dropped".to_string()));
            }
            self.spy.frames_served.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0xFF, 0xD8, 0xFF, 0xE0])
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.spy.releases.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    //-------------------------------------------------------------------------------------
    // Harness
    //-------------------------------------------------------------------------------------

    /// Builds sessions wired to fixed classifiers, scripted replies and an in-memory sink.
    pub struct Harness {
        pub sink: Arc<InMemorySink>,
        pub user_id: Uuid,
        pub settings: SessionSettings,
        pub text_estimate: EmotionEstimate,
        pub image_estimate: EmotionEstimate,
        pub transcript: Option<&'static str>,
        pub replies: ScriptedReplies,
        pub camera: Option<CameraSpy>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self {
                sink: Arc::new(InMemorySink::new()),
                user_id: Uuid::new_v4(),
                settings: SessionSettings {
                    capture_interval: Duration::from_millis(10),
                    capture_retry_delay: Duration::from_millis(5),
                    history_window: 5,
                    history_capacity: 50,
                    idle_timeout: Duration::from_secs(60),
                },
                text_estimate: EmotionEstimate::new(EmotionLabel::Neutral, 0.6),
                image_estimate: EmotionEstimate::new(EmotionLabel::Surprise, 0.5),
                transcript: Some("hello there"),
                replies: ScriptedReplies::default(),
                camera: None,
            }
        }

        pub fn with_camera(mut self, spy: CameraSpy) -> Self {
            self.camera = Some(spy);
            self
        }

        pub fn analyzer(&self) -> Arc<AffectAnalyzer> {
            let classifiers = Classifiers {
                text: Some(Arc::new(FixedText(self.text_estimate))),
                image: Some(Arc::new(FixedImage(self.image_estimate))),
                speech: Some(Arc::new(FixedTranscript(self.transcript))),
            };
            Arc::new(AffectAnalyzer::new(
                classifiers,
                self.sink.clone(),
                ScoringPolicy::default(),
            ))
        }

        pub fn services(&self) -> SessionServices {
            SessionServices {
                analyzer: self.analyzer(),
                responder: Arc::new(self.replies.clone()),
                random: Arc::new(FixedIndex(0)),
                capture: self
                    .camera
                    .as_ref()
                    .map(|spy| Arc::new(spy.factory()) as Arc<dyn CaptureDeviceFactory>),
                settings: self.settings.clone(),
            }
        }

        pub fn session(&self) -> ChatSession {
            ChatSession::new(Uuid::new_v4(), self.user_id, self.services())
        }
    }

    /// Polls `condition` for up to two seconds.
    pub async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met in time");
    }
}
