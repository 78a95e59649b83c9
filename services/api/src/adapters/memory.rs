//! services/api/src/adapters/memory.rs
//!
//! A process-local `PersistenceSink` used when no database is configured.
//! Data lives only as long as the process.

use async_trait::async_trait;
use companion_core::domain::{
    DepressionRecord, DepressionReport, EmotionalEvent, ImageRecord,
};
use companion_core::ports::{PersistenceSink, PortError, PortResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct UserLog {
    events: Vec<EmotionalEvent>,
    scores: Vec<DepressionRecord>,
    images: Vec<ImageRecord>,
    reports: Vec<DepressionReport>,
}

/// Per-user append-only vectors behind a single lock.
#[derive(Default)]
pub struct InMemorySink {
    users: Mutex<HashMap<Uuid, UserLog>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> PortResult<MutexGuard<'_, HashMap<Uuid, UserLog>>> {
        self.users
            .lock()
            .map_err(|_| PortError::Unexpected("In-memory store lock poisoned".to_string()))
    }

    pub fn image_count(&self, user_id: Uuid) -> usize {
        self.lock()
            .map(|users| users.get(&user_id).map_or(0, |log| log.images.len()))
            .unwrap_or(0)
    }

    pub fn report_count(&self, user_id: Uuid) -> usize {
        self.lock()
            .map(|users| users.get(&user_id).map_or(0, |log| log.reports.len()))
            .unwrap_or(0)
    }
}

/// Newest first. Appends arrive in order, so reversing the log suffices.
fn newest_first<T: Clone>(items: &[T], limit: usize) -> Vec<T> {
    items.iter().rev().take(limit).cloned().collect()
}

#[async_trait]
impl PersistenceSink for InMemorySink {
    async fn persist_event(&self, user_id: Uuid, event: &EmotionalEvent) -> PortResult<()> {
        self.lock()?.entry(user_id).or_default().events.push(event.clone());
        Ok(())
    }

    async fn persist_score(&self, user_id: Uuid, record: &DepressionRecord) -> PortResult<()> {
        self.lock()?.entry(user_id).or_default().scores.push(record.clone());
        Ok(())
    }

    async fn persist_image_metadata(&self, user_id: Uuid, record: &ImageRecord) -> PortResult<()> {
        self.lock()?.entry(user_id).or_default().images.push(record.clone());
        Ok(())
    }

    async fn archive_report(&self, user_id: Uuid, report: &DepressionReport) -> PortResult<()> {
        self.lock()?.entry(user_id).or_default().reports.push(report.clone());
        Ok(())
    }

    async fn read_recent_events(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> PortResult<Vec<EmotionalEvent>> {
        Ok(self
            .lock()?
            .get(&user_id)
            .map(|log| newest_first(&log.events, limit))
            .unwrap_or_default())
    }

    async fn read_recent_scores(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> PortResult<Vec<DepressionRecord>> {
        Ok(self
            .lock()?
            .get(&user_id)
            .map(|log| newest_first(&log.scores, limit))
            .unwrap_or_default())
    }
}
