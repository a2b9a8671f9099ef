//! Recording session controller.
//!
//! Owns the `idle → recording → processing → idle | error` state machine, the
//! per-session timers and every capture resource. All state lives behind one
//! `std::sync::Mutex` that is never held across an `.await`; observer
//! callbacks are always invoked after the lock is released.
//!
//! Each start and each reset bumps a generation counter. Background tasks
//! carry the generation they were spawned for and drop their work when it no
//! longer matches, which is how late permission grants, late network results
//! and late recognizer reports are discarded.

mod session;

use crate::audio::encoding::EncodedAudio;
use crate::capability::CaptureStrategy;
use crate::config::RecorderConfig;
use crate::error::ClassifiedError;
use crate::platform::Platform;
use crate::recognizer::BackupRecognizer;
use crate::strategy::primary::{self, classify_remote, resolve_outcome};
use crate::strategy::{ActiveCapture, FailureHook, PrimaryCapture, RecognizerOnlyCapture};
use crate::stt::{TranscriptionClient, TranscriptionResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use session::CaptureSession;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Controller state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    /// Ready to start recording
    Idle,
    /// Microphone or recognizer is live
    Recording,
    /// Capture has stopped and the transcript is being resolved
    Processing,
    /// The last session failed; returns to idle on its own shortly
    Error,
}

impl RecordingState {
    /// Check if this state allows starting a new recording
    pub fn can_start_recording(&self) -> bool {
        matches!(self, RecordingState::Idle)
    }

    /// Check if this state allows stopping a recording
    pub fn can_stop_recording(&self) -> bool {
        matches!(self, RecordingState::Recording)
    }
}

/// Receives session outcomes.
///
/// `on_transcription` fires exactly once per successful session and
/// `on_error` at most once per failed session.
pub trait SessionObserver: Send + Sync {
    fn on_transcription(&self, result: &TranscriptionResult);
    fn on_error(&self, error: &ClassifiedError);
}

/// Serializable view of the controller for UI publishers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: RecordingState,
    pub elapsed_seconds: u64,
    pub max_duration_seconds: u64,
    pub strategy: Option<CaptureStrategy>,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<ClassifiedError>,
}

struct Inner {
    state: RecordingState,
    generation: u64,
    /// A microphone permission prompt is pending.
    acquiring: bool,
    session: Option<CaptureSession>,
    elapsed_secs: u64,
    last_error: Option<ClassifiedError>,
    error_reset: Option<JoinHandle<()>>,
}

impl Inner {
    fn cancel_error_reset(&mut self) {
        if let Some(task) = self.error_reset.take() {
            task.abort();
        }
    }
}

struct Shared {
    inner: Mutex<Inner>,
    config: RecorderConfig,
    platform: Platform,
    transcriber: Arc<dyn TranscriptionClient>,
    observer: Arc<dyn SessionObserver>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Work taken out of the lock when recording stops.
enum Pending {
    Remote {
        capture: PrimaryCapture,
        cancel: CancellationToken,
        recorded_secs: f64,
    },
    Recognizer {
        capture: RecognizerOnlyCapture,
        cancel: CancellationToken,
        recorded_secs: f64,
    },
}

/// Cheap to clone; all clones drive the same state machine.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(
        config: RecorderConfig,
        platform: Platform,
        transcriber: Arc<dyn TranscriptionClient>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        log::debug!("Recorder: created with {:?}", platform);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: RecordingState::Idle,
                    generation: 0,
                    acquiring: false,
                    session: None,
                    elapsed_secs: 0,
                    last_error: None,
                    error_reset: None,
                }),
                config,
                platform,
                transcriber,
                observer,
            }),
        }
    }

    /// Begin a capture session.
    ///
    /// A no-op unless idle. Capability and permission failures are reported
    /// through `on_error` before this returns and leave the controller idle.
    /// Suspends while the platform shows its microphone permission prompt.
    pub async fn start(&self) {
        let (generation, strategy) = {
            let mut inner = self.shared.lock();
            if !inner.state.can_start_recording() || inner.acquiring {
                log::debug!(
                    "Recorder: start ignored (state: {:?}, acquiring: {})",
                    inner.state,
                    inner.acquiring
                );
                return;
            }

            match self.shared.platform.capabilities().require_strategy() {
                Ok(strategy) => {
                    inner.generation += 1;
                    inner.acquiring = true;
                    inner.last_error = None;
                    inner.elapsed_secs = 0;
                    (inner.generation, strategy)
                }
                Err(error) => {
                    log::warn!("Recorder: cannot start: {}", error);
                    inner.last_error = Some(error.clone());
                    drop(inner);
                    self.shared.observer.on_error(&error);
                    return;
                }
            }
        };

        log::info!("Recorder: starting session with {:?}", strategy);
        match strategy {
            CaptureStrategy::PrimaryEncoder => self.begin_primary(generation).await,
            CaptureStrategy::RecognizerOnly => self.begin_recognizer_only(generation),
            CaptureStrategy::Unsupported => {
                self.report_start_failure(generation, ClassifiedError::Unsupported)
            }
        }
    }

    async fn begin_primary(&self, generation: u64) {
        let Some(source) = self.shared.platform.audio.clone() else {
            self.report_start_failure(generation, ClassifiedError::Unsupported);
            return;
        };

        let (mime_type, mut stream) = match primary::acquire(source.as_ref(), &self.shared.config).await
        {
            Ok(acquired) => acquired,
            Err(error) => {
                self.report_start_failure(generation, error);
                return;
            }
        };

        if !self.is_current_acquisition(generation) {
            log::info!("Recorder: releasing microphone granted after reset");
            stream.device.stop();
            return;
        }

        let config = &self.shared.config;
        let backup = self.shared.platform.recognizer.clone().map(|recognizer| {
            BackupRecognizer::start(
                recognizer,
                config.recognizer_options(),
                config.max_backup_restarts,
            )
        });

        let capture = PrimaryCapture::new(stream, mime_type, backup);
        self.enter_recording(
            generation,
            CaptureStrategy::PrimaryEncoder,
            ActiveCapture::Primary(capture),
        );
    }

    fn begin_recognizer_only(&self, generation: u64) {
        let Some(recognizer) = self.shared.platform.recognizer.clone() else {
            self.report_start_failure(generation, ClassifiedError::Unsupported);
            return;
        };

        let options = self.shared.config.recognizer_options();
        match RecognizerOnlyCapture::start(
            recognizer.as_ref(),
            &options,
            self.failure_hook(generation),
        ) {
            Ok(capture) => self.enter_recording(
                generation,
                CaptureStrategy::RecognizerOnly,
                ActiveCapture::RecognizerOnly(capture),
            ),
            Err(error) => self.report_start_failure(generation, error),
        }
    }

    fn failure_hook(&self, generation: u64) -> FailureHook {
        let weak = Arc::downgrade(&self.shared);
        Box::new(move |error| {
            if let Some(shared) = weak.upgrade() {
                SessionController { shared }.fail_session(generation, error);
            }
        })
    }

    fn is_current_acquisition(&self, generation: u64) -> bool {
        let inner = self.shared.lock();
        inner.generation == generation && inner.acquiring
    }

    fn report_start_failure(&self, generation: u64, error: ClassifiedError) {
        {
            let mut inner = self.shared.lock();
            if inner.generation != generation || !inner.acquiring {
                log::debug!("Recorder: dropping start failure from stale session: {}", error);
                return;
            }
            inner.acquiring = false;
            inner.last_error = Some(error.clone());
        }
        log::warn!("Recorder: failed to start: {}", error);
        self.shared.observer.on_error(&error);
    }

    fn enter_recording(&self, generation: u64, strategy: CaptureStrategy, capture: ActiveCapture) {
        let mut inner = self.shared.lock();
        if inner.generation != generation || !inner.acquiring {
            drop(inner);
            log::info!("Recorder: session was reset before it began, releasing capture");
            drop(capture);
            return;
        }

        let mut session = CaptureSession::new(strategy, capture);
        let config = &self.shared.config;

        session.add_timer(tokio::spawn(run_ticker(
            Arc::downgrade(&self.shared),
            generation,
            session.started,
            config.tick_interval(),
        )));
        match session.started.checked_add(config.max_duration()) {
            Some(deadline) => session.add_timer(tokio::spawn(run_max_duration(
                Arc::downgrade(&self.shared),
                generation,
                deadline,
            ))),
            None => log::warn!(
                "Recorder: max duration of {}s is out of range, no automatic stop",
                config.max_duration_secs
            ),
        }

        log::info!("Recorder: recording (session {})", session.id);
        inner.acquiring = false;
        inner.state = RecordingState::Recording;
        inner.elapsed_secs = 0;
        inner.session = Some(session);
    }

    /// Stop recording and resolve the transcript.
    ///
    /// Idempotent when not recording. Resolves once the outcome has been
    /// delivered to the observer or the session was reset.
    pub async fn stop(&self) {
        self.finish_recording(None).await;
    }

    async fn finish_recording(&self, expected_generation: Option<u64>) {
        let (generation, pending) = {
            let mut inner = self.shared.lock();
            if !inner.state.can_stop_recording() {
                log::debug!("Recorder: stop ignored (state: {:?})", inner.state);
                return;
            }
            let generation = inner.generation;
            if expected_generation.is_some_and(|expected| expected != generation) {
                return;
            }
            let Some(session) = inner.session.as_mut() else {
                return;
            };

            session.stop_timers();
            let elapsed = session.elapsed();
            let capture = session.capture.take();
            let cancel = session.cancel_token();
            inner.elapsed_secs = elapsed.as_secs();

            if elapsed < self.shared.config.min_duration() {
                log::info!("Recorder: recording too short ({:?})", elapsed);
                let session = self.enter_error(&mut inner, ClassifiedError::TooShort);
                drop(inner);
                drop(capture);
                drop(session);
                self.shared.observer.on_error(&ClassifiedError::TooShort);
                return;
            }

            let recorded_secs = elapsed.as_secs_f64();
            let pending = match capture {
                Some(ActiveCapture::Primary(capture)) => Pending::Remote {
                    capture,
                    cancel,
                    recorded_secs,
                },
                Some(ActiveCapture::RecognizerOnly(capture)) => Pending::Recognizer {
                    capture,
                    cancel,
                    recorded_secs,
                },
                None => {
                    let error = ClassifiedError::Unknown("capture already released".into());
                    let session = self.enter_error(&mut inner, error.clone());
                    drop(inner);
                    drop(session);
                    self.shared.observer.on_error(&error);
                    return;
                }
            };

            inner.state = RecordingState::Processing;
            log::info!("Recorder: processing {:.1}s recording", recorded_secs);
            (generation, pending)
        };

        let outcome = match pending {
            Pending::Remote {
                capture,
                cancel,
                recorded_secs,
            } => {
                let (audio, backup) = capture.finish();
                let remote = match audio {
                    Ok(audio) if !audio.is_empty() => {
                        match self.transcribe_remote(&audio, &cancel, recorded_secs).await {
                            Some(remote) => remote,
                            None => return,
                        }
                    }
                    Ok(_) => {
                        log::warn!("Recorder: no audio was captured");
                        Err(ClassifiedError::EmptyResult)
                    }
                    Err(error) => Err(error),
                };
                resolve_outcome(remote, &backup, recorded_secs)
            }
            Pending::Recognizer {
                capture,
                cancel,
                recorded_secs,
            } => {
                let grace = self.shared.config.recognizer_finalize_timeout();
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => return,

                    result = capture.finish(grace) => {
                        result.map(|text| TranscriptionResult::from_text(&text, Some(recorded_secs)))
                    }
                }
            }
        };

        self.resolve(generation, outcome);
    }

    /// Upload the recording. `None` when the session was cancelled meanwhile.
    async fn transcribe_remote(
        &self,
        audio: &EncodedAudio,
        cancel: &CancellationToken,
        recorded_secs: f64,
    ) -> Option<Result<TranscriptionResult, ClassifiedError>> {
        let timeout = self.shared.config.transcription_timeout();
        log::info!(
            "Recorder: transcribing {} bytes with {}",
            audio.len(),
            self.shared.transcriber.name()
        );

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                log::info!("Recorder: transcription cancelled");
                None
            }

            _ = tokio::time::sleep(timeout) => {
                log::warn!("Recorder: transcription timed out after {:?}", timeout);
                Some(Err(ClassifiedError::NetworkFailure(format!(
                    "Transcription timed out after {}s",
                    timeout.as_secs()
                ))))
            }

            result = self.shared.transcriber.transcribe(audio) => {
                Some(classify_remote(result, recorded_secs))
            }
        }
    }

    fn resolve(&self, generation: u64, outcome: Result<TranscriptionResult, ClassifiedError>) {
        let mut inner = self.shared.lock();
        if inner.generation != generation || inner.state != RecordingState::Processing {
            log::debug!("Recorder: discarding outcome of stale session");
            return;
        }

        match outcome {
            Ok(result) => {
                let session = inner.session.take();
                inner.state = RecordingState::Idle;
                drop(inner);
                drop(session);
                log::info!("Recorder: transcription ready ({} chars)", result.text.len());
                self.shared.observer.on_transcription(&result);
            }
            Err(error) => {
                let session = self.enter_error(&mut inner, error.clone());
                drop(inner);
                drop(session);
                self.shared.observer.on_error(&error);
            }
        }
    }

    /// Move to the error state and schedule the return to idle.
    ///
    /// Returns the session so the caller can release it after unlocking.
    fn enter_error(&self, inner: &mut Inner, error: ClassifiedError) -> Option<CaptureSession> {
        log::error!("Recorder error: {}", error);
        let session = inner.session.take();
        inner.state = RecordingState::Error;
        inner.last_error = Some(error);
        inner.cancel_error_reset();
        inner.error_reset = Some(tokio::spawn(run_error_reset(
            Arc::downgrade(&self.shared),
            inner.generation,
            self.shared.config.error_reset_delay(),
        )));
        session
    }

    /// End the session because its only transcript source failed.
    fn fail_session(&self, generation: u64, error: ClassifiedError) {
        let mut inner = self.shared.lock();
        if inner.generation != generation {
            return;
        }
        let live = matches!(
            inner.state,
            RecordingState::Recording | RecordingState::Processing
        );
        if !live && !inner.acquiring {
            return;
        }
        inner.acquiring = false;
        let session = self.enter_error(&mut inner, error.clone());
        drop(inner);
        drop(session);
        self.shared.observer.on_error(&error);
    }

    /// Force the controller back to idle from any state, releasing every
    /// resource and discarding in-flight results.
    pub fn reset(&self) {
        let session = {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            inner.acquiring = false;
            inner.cancel_error_reset();
            inner.state = RecordingState::Idle;
            inner.elapsed_secs = 0;
            inner.last_error = None;
            inner.session.take()
        };
        if session.is_some() {
            log::info!("Recorder: reset, session released");
        }
        drop(session);
    }

    pub fn state(&self) -> RecordingState {
        self.shared.lock().state
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Recording
    }

    pub fn is_processing(&self) -> bool {
        self.state() == RecordingState::Processing
    }

    /// Whole seconds recorded, refreshed once per tick.
    pub fn elapsed_seconds(&self) -> u64 {
        self.shared.lock().elapsed_secs
    }

    pub fn last_error(&self) -> Option<ClassifiedError> {
        self.shared.lock().last_error.clone()
    }

    pub fn status(&self) -> SessionStatus {
        let inner = self.shared.lock();
        let session = inner.session.as_ref();
        SessionStatus {
            state: inner.state,
            elapsed_seconds: inner.elapsed_secs,
            max_duration_seconds: self.shared.config.max_duration_secs,
            strategy: session.map(|s| s.strategy),
            session_id: session.map(|s| s.id),
            started_at: session.map(|s| s.started_at),
            last_error: inner.last_error.clone(),
        }
    }
}

async fn run_ticker(shared: Weak<Shared>, generation: u64, started: Instant, tick: Duration) {
    let mut interval = tokio::time::interval_at(started + tick, tick);
    loop {
        interval.tick().await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let mut inner = shared.lock();
        if inner.generation != generation || inner.state != RecordingState::Recording {
            return;
        }
        inner.elapsed_secs = started.elapsed().as_secs();
        if let Some(capture) = inner.session.as_mut().and_then(|s| s.capture.as_mut()) {
            capture.collect_chunks();
        }
    }
}

async fn run_max_duration(shared: Weak<Shared>, generation: u64, deadline: Instant) {
    tokio::time::sleep_until(deadline).await;
    let Some(shared) = shared.upgrade() else {
        return;
    };
    log::info!("Recorder: maximum duration reached, stopping");
    let controller = SessionController { shared };
    // Stopping aborts this timer, so the stop runs on its own task.
    tokio::spawn(async move {
        controller.finish_recording(Some(generation)).await;
    });
}

async fn run_error_reset(shared: Weak<Shared>, generation: u64, delay: Duration) {
    tokio::time::sleep(delay).await;
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut inner = shared.lock();
    if inner.generation == generation && inner.state == RecordingState::Error {
        inner.state = RecordingState::Idle;
        inner.elapsed_secs = 0;
        inner.error_reset = None;
        log::info!("Recorder: recovered from error");
    }
}
