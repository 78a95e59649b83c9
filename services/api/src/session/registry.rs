//! services/api/src/session/registry.rs
//!
//! The session registry: every live `ChatSession` keyed by its id.
//!
//! Each session sits behind its own `tokio::sync::Mutex`, so one session's turns run
//! strictly one after another while different sessions proceed in parallel. The map
//! lock is held only long enough to look up, insert or remove an entry.
//!
//! Ended sessions leave a tombstone for one idle timeout, so ending twice succeeds and
//! a late turn reads as "not active" rather than "not found".

use crate::error::SessionError;
use crate::session::state::{ChatMode, ChatSession, SessionServices};
use crate::session::turn_task::{TurnInput, TurnReply};
use companion_core::AffectAnalysis;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(10);
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

struct SessionEntry {
    user_id: Uuid,
    session: Arc<Mutex<ChatSession>>,
}

struct EndedEntry {
    user_id: Uuid,
    ended_at: Instant,
}

/// The result of starting a session.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedSession {
    pub session_id: Uuid,
    pub welcome: String,
}

pub struct SessionRegistry {
    services: SessionServices,
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
    ended: RwLock<HashMap<Uuid, EndedEntry>>,
}

impl SessionRegistry {
    pub fn new(services: SessionServices) -> Self {
        Self {
            services,
            sessions: RwLock::new(HashMap::new()),
            ended: RwLock::new(HashMap::new()),
        }
    }

    pub fn services(&self) -> &SessionServices {
        &self.services
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Creates, starts and registers a new session for `user_id`.
    pub async fn start_session(
        &self,
        user_id: Uuid,
        chat_mode: ChatMode,
    ) -> Result<StartedSession, SessionError> {
        let session_id = Uuid::new_v4();
        let mut session = ChatSession::new(session_id, user_id, self.services.clone());
        let welcome = session.start(chat_mode)?;

        self.sessions.write().await.insert(
            session_id,
            SessionEntry {
                user_id,
                session: Arc::new(Mutex::new(session)),
            },
        );
        Ok(StartedSession {
            session_id,
            welcome,
        })
    }

    /// Looks up a session owned by `user_id`. Another user's session reads as missing.
    async fn get(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Arc<Mutex<ChatSession>>, SessionError> {
        {
            let sessions = self.sessions.read().await;
            if let Some(entry) = sessions.get(&session_id) {
                if entry.user_id == user_id {
                    return Ok(entry.session.clone());
                }
                return Err(SessionError::NotFound(session_id));
            }
        }
        if self.was_ended_by(session_id, user_id).await {
            Err(SessionError::NotActive(session_id))
        } else {
            Err(SessionError::NotFound(session_id))
        }
    }

    async fn was_ended_by(&self, session_id: Uuid, user_id: Uuid) -> bool {
        self.ended
            .read()
            .await
            .get(&session_id)
            .is_some_and(|ended| ended.user_id == user_id)
    }

    async fn mark_ended(&self, session_id: Uuid, user_id: Uuid) {
        self.ended.write().await.insert(
            session_id,
            EndedEntry {
                user_id,
                ended_at: Instant::now(),
            },
        );
    }

    pub async fn submit_turn(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        input: TurnInput,
    ) -> Result<TurnReply, SessionError> {
        let session = self.get(session_id, user_id).await?;
        let mut session = session.lock().await;
        session.submit_turn(input).await
    }

    pub async fn analyze_image(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        image: &[u8],
    ) -> Result<AffectAnalysis, SessionError> {
        let session = self.get(session_id, user_id).await?;
        let mut session = session.lock().await;
        session.analyze_image(image).await
    }

    /// Removes the session and ends it, waiting for any in-flight turn to finish first.
    /// Ending a session that was already ended is a no-op.
    pub async fn end_session(&self, session_id: Uuid, user_id: Uuid) -> Result<(), SessionError> {
        let entry = {
            let mut sessions = self.sessions.write().await;
            let owned = sessions
                .get(&session_id)
                .is_some_and(|entry| entry.user_id == user_id);
            if owned {
                self.mark_ended(session_id, user_id).await;
                sessions.remove(&session_id)
            } else {
                None
            }
        };
        let Some(entry) = entry else {
            if self.was_ended_by(session_id, user_id).await {
                return Ok(());
            }
            return Err(SessionError::NotFound(session_id));
        };
        entry.session.lock().await.end().await;
        Ok(())
    }

    //-------------------------------------------------------------------------------------
    // Idle Eviction & Shutdown
    //-------------------------------------------------------------------------------------

    /// Ends every session idle for longer than the configured timeout.
    /// A session in the middle of a turn is busy, not idle, and is skipped.
    pub async fn evict_idle(&self) -> usize {
        let timeout = self.services.settings.idle_timeout;
        self.ended
            .write()
            .await
            .retain(|_, ended| ended.ended_at.elapsed() <= timeout);

        let expired: Vec<Uuid> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, entry)| {
                    entry
                        .session
                        .try_lock()
                        .map(|session| session.last_active().elapsed() > timeout)
                        .unwrap_or(false)
                })
                .map(|(id, _)| *id)
                .collect()
        };
        if expired.is_empty() {
            return 0;
        }

        let evicted: Vec<SessionEntry> = {
            let mut sessions = self.sessions.write().await;
            let mut evicted = Vec::with_capacity(expired.len());
            for id in &expired {
                if let Some(entry) = sessions.remove(id) {
                    self.mark_ended(*id, entry.user_id).await;
                    evicted.push(entry);
                }
            }
            evicted
        };
        for entry in &evicted {
            let mut session = entry.session.lock().await;
            info!("Evicting idle session {}.", session.id());
            session.end().await;
        }
        evicted.len()
    }

    /// Runs `evict_idle` periodically until `cancellation_token` fires.
    pub fn spawn_sweeper(self: Arc<Self>, cancellation_token: CancellationToken) -> JoinHandle<()> {
        let period = (self.services.settings.idle_timeout / 2).clamp(MIN_SWEEP_PERIOD, MAX_SWEEP_PERIOD);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = self.evict_idle().await;
                        if evicted > 0 {
                            info!("Session sweeper evicted {} idle session(s).", evicted);
                        }
                    }
                    _ = cancellation_token.cancelled() => {
                        info!("Session sweeper shutting down.");
                        break;
                    }
                }
            }
        })
    }

    /// Ends every registered session concurrently. Used on process exit.
    pub async fn shutdown(&self) {
        let drained: Vec<SessionEntry> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, entry)| entry).collect()
        };
        info!("Shutting down {} session(s).", drained.len());
        join_all(drained.iter().map(|entry| async move {
            entry.session.lock().await.end().await;
        }))
        .await;
    }
}
