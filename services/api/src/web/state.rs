//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every HTTP handler.

use crate::session::SessionRegistry;
use companion_core::AffectAnalyzer;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Direct access to the affect pipeline for the session-less endpoints.
    pub analyzer: Arc<AffectAnalyzer>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self {
            analyzer: sessions.services().analyzer.clone(),
            sessions,
        }
    }
}
