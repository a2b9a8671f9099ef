//! One start → finish cycle and the resources it owns.

use crate::capability::CaptureStrategy;
use crate::strategy::ActiveCapture;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A capture session. Dropping it cancels in-flight work, aborts its timers
/// and releases the microphone and recognizer.
pub(crate) struct CaptureSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub started: Instant,
    pub strategy: CaptureStrategy,
    /// Present while recording; taken when processing begins.
    pub capture: Option<ActiveCapture>,
    cancel: CancellationToken,
    timers: Vec<JoinHandle<()>>,
}

impl CaptureSession {
    pub fn new(strategy: CaptureStrategy, capture: ActiveCapture) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            started: Instant::now(),
            strategy,
            capture: Some(capture),
            cancel: CancellationToken::new(),
            timers: Vec::new(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn add_timer(&mut self, timer: JoinHandle<()>) {
        self.timers.push(timer);
    }

    pub fn stop_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.stop_timers();
        log::debug!("Recorder: released session {}", self.id);
    }
}
