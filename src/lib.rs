//! Bounded voice-memo capture and transcription.
//!
//! A [`VoiceRecorder`] records at most one memo at a time from the platform
//! microphone, transcribes it remotely with an on-device recognizer as
//! backup (or uses the recognizer alone where encoded capture is not
//! possible) and reports either the text or a [`ClassifiedError`].

pub mod audio;
pub mod capability;
pub mod config;
pub mod controller;
pub mod error;
pub mod platform;
pub mod recognizer;
pub mod recorder;
pub mod strategy;
pub mod stt;


pub use capability::{select_strategy, CapabilityFlags, CaptureStrategy};
pub use config::{RecorderConfig, SttConfig, SttProviderKind};
pub use controller::{RecordingState, SessionController, SessionObserver, SessionStatus};
pub use error::ClassifiedError;
pub use platform::Platform;
pub use recorder::{RecorderCallbacks, VoiceRecorder};
pub use stt::{TranscriptionClient, TranscriptionResult};
