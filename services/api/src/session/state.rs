//! services/api/src/session/state.rs
//!
//! Defines the shared session services and the per-session state machine.
//!
//! A session moves `Idle → Active → Ended`. Only text-mode sessions own a background
//! capture task, and at most one of them at a time.

use crate::config::SessionSettings;
use crate::error::SessionError;
use crate::session::capture_task::{capture_loop, CaptureExit};
use companion_core::responder::welcome_message;
use companion_core::{
    AffectAnalysis, AffectAnalyzer, CaptureDeviceFactory, ConversationTurn, EventSource,
    RandomSource, ReplyGenerator,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

//=========================================================================================
// SessionServices (Shared Across All Sessions)
//=========================================================================================

/// Collaborators every session uses, created once at startup.
#[derive(Clone)]
pub struct SessionServices {
    pub analyzer: Arc<AffectAnalyzer>,
    pub responder: Arc<dyn ReplyGenerator>,
    pub random: Arc<dyn RandomSource>,
    /// `None` disables background capture entirely.
    pub capture: Option<Arc<dyn CaptureDeviceFactory>>,
    pub settings: SessionSettings,
}

//=========================================================================================
// ChatSession (Specific to One Conversation)
//=========================================================================================

/// How the user talks to the companion. Only `Text` sessions run background capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Text,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Idle,
    Active,
    Ended,
}

/// The running background capture task and the token that stops it.
struct CaptureHandle {
    token: CancellationToken,
    handle: JoinHandle<CaptureExit>,
}

pub struct ChatSession {
    pub(crate) id: Uuid,
    pub(crate) user_id: Uuid,
    pub(crate) mode: SessionMode,
    pub(crate) chat_mode: Option<ChatMode>,
    pub(crate) history: VecDeque<ConversationTurn>,
    pub(crate) last_active: Instant,
    pub(crate) services: SessionServices,
    capture: Option<CaptureHandle>,
}

impl ChatSession {
    pub fn new(id: Uuid, user_id: Uuid, services: SessionServices) -> Self {
        Self {
            id,
            user_id,
            mode: SessionMode::Idle,
            chat_mode: None,
            history: VecDeque::new(),
            last_active: Instant::now(),
            services,
            capture: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn chat_mode(&self) -> Option<ChatMode> {
        self.chat_mode
    }

    pub fn history(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.history.iter()
    }

    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    pub(crate) fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Appends a turn, dropping the oldest ones beyond the configured capacity.
    pub(crate) fn push_turn(&mut self, turn: ConversationTurn) {
        self.history.push_back(turn);
        while self.history.len() > self.services.settings.history_capacity {
            self.history.pop_front();
        }
    }

    /// The most recent turns handed to reply generation.
    pub(crate) fn recent_history(&self) -> Vec<ConversationTurn> {
        let window = self.services.settings.history_window;
        let skip = self.history.len().saturating_sub(window);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub(crate) fn ensure_active(&self) -> Result<(), SessionError> {
        if self.mode == SessionMode::Active {
            Ok(())
        } else {
            Err(SessionError::NotActive(self.id))
        }
    }

    //-------------------------------------------------------------------------------------
    // Lifecycle
    //-------------------------------------------------------------------------------------

    /// `Idle → Active`. Resets history to a single welcome turn and returns it.
    pub fn start(&mut self, chat_mode: ChatMode) -> Result<String, SessionError> {
        if self.mode != SessionMode::Idle {
            return Err(SessionError::InvalidTransition {
                from: self.mode,
                action: "start",
            });
        }

        let welcome = welcome_message(self.services.random.as_ref()).to_string();
        self.history.clear();
        self.push_turn(ConversationTurn::assistant(welcome.clone()));
        self.mode = SessionMode::Active;
        self.chat_mode = Some(chat_mode);
        self.touch();
        info!("Session {} started for user {} in {:?} mode.", self.id, self.user_id, chat_mode);

        if chat_mode == ChatMode::Text {
            self.start_background_capture();
        }
        Ok(welcome)
    }

    /// `Active → Ended`. Stops capture and discards history. No-op in any other mode.
    pub async fn end(&mut self) {
        if self.mode != SessionMode::Active {
            return;
        }
        self.stop_background_capture().await;
        self.history.clear();
        self.mode = SessionMode::Ended;
        info!("Session {} ended.", self.id);
    }

    //-------------------------------------------------------------------------------------
    // Background Capture
    //-------------------------------------------------------------------------------------

    pub fn is_capturing(&self) -> bool {
        self.capture
            .as_ref()
            .is_some_and(|capture| !capture.handle.is_finished())
    }

    /// Spawns the capture loop unless one is already running. Returns whether a task was spawned.
    pub fn start_background_capture(&mut self) -> bool {
        if self.mode != SessionMode::Active || self.is_capturing() {
            return false;
        }
        let Some(factory) = self.services.capture.clone() else {
            return false;
        };

        let token = CancellationToken::new();
        let handle = tokio::spawn(capture_loop(
            self.services.analyzer.clone(),
            factory,
            self.user_id,
            self.services.settings.capture_interval,
            self.services.settings.capture_retry_delay,
            token.clone(),
        ));
        self.capture = Some(CaptureHandle { token, handle });
        true
    }

    /// Cancels the capture loop and waits for it to release its device.
    ///
    /// The loop only checks the token between captures, so the wait is bounded by one
    /// capture interval; past that the task is aborted, which still drops its device guard.
    pub async fn stop_background_capture(&mut self) {
        let Some(CaptureHandle { token, mut handle }) = self.capture.take() else {
            return;
        };
        token.cancel();

        let grace = self.services.settings.capture_interval;
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(exit)) => debug!("Capture task for session {} exited: {:?}", self.id, exit),
            Ok(Err(e)) => warn!("Capture task for session {} panicked: {}", self.id, e),
            Err(_) => {
                warn!("Capture task for session {} did not stop in time; aborting.", self.id);
                handle.abort();
                let _ = handle.await;
            }
        }
    }

    //-------------------------------------------------------------------------------------
    // In-Session Images
    //-------------------------------------------------------------------------------------

    /// Analyzes a snapshot taken during the conversation. History is left untouched.
    pub async fn analyze_image(&mut self, image: &[u8]) -> Result<AffectAnalysis, SessionError> {
        self.ensure_active()?;
        self.touch();
        Ok(self
            .services
            .analyzer
            .analyze_image(self.user_id, image, EventSource::ChatImage)
            .await)
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::*;
    use companion_core::responder::WELCOME_MESSAGES;
    use companion_core::{PersistenceSink, Role};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn text_session_greets_and_starts_capture() {
        let spy = CameraSpy::default();
        let harness = Harness::new().with_camera(spy.clone());
        let mut session = harness.session();

        let welcome = session.start(ChatMode::Text).unwrap();
        assert_eq!(welcome, WELCOME_MESSAGES[0]);
        assert_eq!(session.mode(), SessionMode::Active);
        let history: Vec<_> = session.history().collect();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::Assistant);
        assert!(session.is_capturing());
        assert!(!session.start_background_capture());

        wait_until(|| spy.opens.load(Ordering::SeqCst) == 1).await;
        session.end().await;
        assert_eq!(spy.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn audio_session_runs_without_capture() {
        let spy = CameraSpy::default();
        let harness = Harness::new().with_camera(spy.clone());
        let mut session = harness.session();

        session.start(ChatMode::Audio).unwrap();
        assert!(!session.is_capturing());
        session.end().await;
        assert_eq!(spy.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_is_only_valid_from_idle() {
        let harness = Harness::new();
        let mut session = harness.session();
        session.start(ChatMode::Audio).unwrap();
        assert_eq!(
            session.start(ChatMode::Text),
            Err(SessionError::InvalidTransition {
                from: SessionMode::Active,
                action: "start",
            })
        );

        session.end().await;
        assert!(matches!(
            session.start(ChatMode::Text),
            Err(SessionError::InvalidTransition { from: SessionMode::Ended, .. })
        ));
    }

    #[tokio::test]
    async fn end_is_idempotent_and_releases_the_camera() {
        let spy = CameraSpy::default();
        let harness = Harness::new().with_camera(spy.clone());
        let mut session = harness.session();

        // Ending an idle session is a no-op.
        session.end().await;
        assert_eq!(session.mode(), SessionMode::Idle);

        session.start(ChatMode::Text).unwrap();
        wait_until(|| spy.opens.load(Ordering::SeqCst) == 1).await;

        session.end().await;
        session.end().await;
        assert_eq!(session.mode(), SessionMode::Ended);
        assert!(!session.is_capturing());
        assert_eq!(session.history().count(), 0);
        assert_eq!(spy.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn chat_snapshot_is_recorded_without_touching_history() {
        let harness = Harness::new();
        let mut session = harness.session();
        let id = session.id();
        assert_eq!(
            session.analyze_image(&[1, 2]).await,
            Err(SessionError::NotActive(id))
        );

        session.start(ChatMode::Audio).unwrap();
        let analysis = session.analyze_image(&[1, 2, 3]).await.unwrap();
        assert_eq!(analysis.fused, harness.image_estimate);
        assert_eq!(session.history().count(), 1);

        let events = harness.sink.read_recent_events(harness.user_id, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, EventSource::ChatImage);
        assert_eq!(harness.sink.image_count(harness.user_id), 1);
    }

    #[tokio::test]
    async fn history_is_bounded_by_capacity() {
        let mut harness = Harness::new();
        harness.settings.history_window = 2;
        harness.settings.history_capacity = 3;
        let mut session = harness.session();
        session.start(ChatMode::Audio).unwrap();
        for i in 0..5 {
            session.push_turn(ConversationTurn::user(format!("turn {}", i)));
        }
        let contents: Vec<&str> = session.history().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["turn 2", "turn 3", "turn 4"]);
        let recent: Vec<String> = session.recent_history().into_iter().map(|t| t.content).collect();
        assert_eq!(recent, vec!["turn 3", "turn 4"]);
    }
}
