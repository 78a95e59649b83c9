//! services/api/src/session/capture_task.rs
//!
//! This module contains the background capture "worker": while a text-mode session is
//! active it periodically reads a camera frame and feeds it through the affect pipeline
//! as a `background_image` event.

use companion_core::{AffectAnalyzer, CaptureDevice, CaptureDeviceFactory, EventSource};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Why the capture loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureExit {
    /// The session asked the loop to stop.
    Cancelled,
    /// The device could not be opened; the session carries on in foreground-only mode.
    SetupFailed,
}

/// Owns the open device and releases it on every exit path, including abort.
struct DeviceGuard(Box<dyn CaptureDevice>);

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// The long-running capture task for one session.
///
/// Cancellation is observed between captures only; a frame that is already being read
/// or analyzed is finished first.
pub async fn capture_loop(
    analyzer: Arc<AffectAnalyzer>,
    factory: Arc<dyn CaptureDeviceFactory>,
    user_id: Uuid,
    interval: Duration,
    retry_delay: Duration,
    cancellation_token: CancellationToken,
) -> CaptureExit {
    let device = tokio::select! {
        _ = cancellation_token.cancelled() => return CaptureExit::Cancelled,
        opened = factory.open() => opened,
    };
    let mut device = match device {
        Ok(device) => DeviceGuard(device),
        Err(e) => {
            error!("Could not open capture device for user {}: {}. Continuing without background capture.", user_id, e);
            return CaptureExit::SetupFailed;
        }
    };
    info!("Background capture started for user {}.", user_id);

    loop {
        if cancellation_token.is_cancelled() {
            break;
        }

        let delay = match device.0.read_frame().await {
            Ok(frame) => {
                let analysis = analyzer
                    .analyze_image(user_id, &frame, EventSource::BackgroundImage)
                    .await;
                debug!(
                    "Background frame for user {}: {} ({:.2}), risk {}",
                    user_id,
                    analysis.fused.label,
                    analysis.fused.score,
                    analysis.depression.depression_level
                );
                interval
            }
            Err(e) => {
                warn!("Background capture read failed for user {}: {}. Retrying.", user_id, e);
                retry_delay
            }
        };

        tokio::select! {
            _ = cancellation_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!("Background capture stopped for user {}.", user_id);
    CaptureExit::Cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::*;
    use companion_core::PersistenceSink;
    use std::sync::atomic::Ordering;

    fn spawn_loop(
        harness: &Harness,
        spy: &CameraSpy,
        token: &CancellationToken,
    ) -> tokio::task::JoinHandle<CaptureExit> {
        tokio::spawn(capture_loop(
            harness.analyzer(),
            Arc::new(spy.factory()),
            harness.user_id,
            Duration::from_millis(10),
            Duration::from_millis(5),
            token.clone(),
        ))
    }

    #[tokio::test]
    async fn frames_become_background_events() {
        let harness = Harness::new();
        let spy = CameraSpy::default();
        let token = CancellationToken::new();
        let handle = spawn_loop(&harness, &spy, &token);

        wait_until(|| spy.frames_served.load(Ordering::SeqCst) >= 3).await;
        token.cancel();
        assert_eq!(handle.await.unwrap(), CaptureExit::Cancelled);

        let events = harness.sink.read_recent_events(harness.user_id, 50).await.unwrap();
        assert!(events.len() >= 3);
        assert!(events.iter().all(|e| e.source == EventSource::BackgroundImage));
        assert_eq!(events[0].raw_emotion, harness.image_estimate);
        assert_eq!(spy.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_read_failures_are_retried() {
        let harness = Harness::new();
        let spy = CameraSpy::failing_reads(2);
        let token = CancellationToken::new();
        let handle = spawn_loop(&harness, &spy, &token);

        wait_until(|| spy.frames_served.load(Ordering::SeqCst) >= 1).await;
        token.cancel();
        handle.await.unwrap();

        assert!(spy.reads.load(Ordering::SeqCst) >= 3);
        assert_eq!(spy.opens.load(Ordering::SeqCst), 1);
        assert_eq!(spy.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn setup_failure_ends_the_loop_without_events() {
        let harness = Harness::new();
        let spy = CameraSpy::broken();
        let token = CancellationToken::new();

        let exit = spawn_loop(&harness, &spy, &token).await.unwrap();
        assert_eq!(exit, CaptureExit::SetupFailed);
        assert_eq!(spy.releases.load(Ordering::SeqCst), 0);
        assert!(harness
            .sink
            .read_recent_events(harness.user_id, 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn aborting_the_task_still_releases_the_device() {
        let harness = Harness::new();
        let spy = CameraSpy::default();
        let token = CancellationToken::new();
        let handle = spawn_loop(&harness, &spy, &token);

        wait_until(|| spy.opens.load(Ordering::SeqCst) == 1).await;
        handle.abort();
        let _ = handle.await;
        assert_eq!(spy.releases.load(Ordering::SeqCst), 1);
    }
}
