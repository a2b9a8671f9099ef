//! Microphone capture abstraction for the primary encoder strategy.
//!
//! The platform layer supplies an [`AudioSource`]. Opening it may suspend on a
//! permission prompt; once granted, encoded chunks arrive on a channel until
//! the returned [`CaptureDevice`] is stopped.

pub mod encoding;

#[cfg(feature = "native-capture")]
pub mod cpal_source;

use crate::error::ClassifiedError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Errors that can occur while acquiring the microphone
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("No input device available")]
    NoInputDevice,

    #[error("Failed to open input stream: {0}")]
    Stream(String),
}

impl From<DeviceError> for ClassifiedError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::PermissionDenied => ClassifiedError::PermissionDenied,
            DeviceError::NoInputDevice => ClassifiedError::NoDevice,
            DeviceError::Stream(msg) => ClassifiedError::Unknown(msg),
        }
    }
}

/// Layout of raw 16-bit little-endian PCM chunks.
///
/// Sources that cannot produce a container format report this so the chunks
/// can be wrapped into a WAV file at stop time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmLayout {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Parameters for opening a capture stream.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Negotiated encoding.
    pub mime_type: String,
    /// Approximate interval between emitted chunks.
    pub chunk_interval: Duration,
}

/// A live capture stream.
pub struct CaptureStream {
    /// Encoded chunks in capture order. Closed once the device stops.
    pub chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    pub device: Box<dyn CaptureDevice>,
    /// Set when chunks are raw PCM rather than the negotiated container.
    pub pcm: Option<PcmLayout>,
}

/// Handle to an open microphone.
pub trait CaptureDevice: Send {
    /// Stop capturing and release the microphone.
    ///
    /// Buffered audio must be pushed to the chunk channel before this returns.
    /// Calling `stop` more than once is a no-op.
    fn stop(&mut self);
}

/// A platform microphone that can record encoded audio.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Whether the encoder explicitly supports `mime_type`.
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Acquire the microphone and start emitting chunks.
    ///
    /// Suspends until the user grants or denies access.
    async fn open(&self, request: CaptureRequest) -> Result<CaptureStream, DeviceError>;

    /// Get the name of this source
    fn name(&self) -> &'static str;
}
