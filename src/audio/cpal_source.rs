//! Native microphone source built on cpal.
//!
//! cpal streams are not `Send`, so each capture runs on a dedicated thread
//! that owns the stream, converts samples to 16-bit PCM and flushes them as
//! one chunk per chunk interval. The source only produces `audio/wav`; the
//! chunks are wrapped into a WAV file when the session stops.

use super::encoding::base_mime;
use super::{AudioSource, CaptureDevice, CaptureRequest, CaptureStream, DeviceError, PcmLayout};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{mpsc as tokio_mpsc, oneshot};

/// Commands sent to the audio capture thread
enum CaptureCommand {
    Stop,
}

/// cpal-backed microphone
#[derive(Debug, Clone, Default)]
pub struct CpalAudioSource {
    /// When set, the first input device with exactly this name is used,
    /// falling back to the system default if not found.
    device_name: Option<String>,
}

impl CpalAudioSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device_name(device_name: Option<String>) -> Self {
        Self {
            device_name: device_name.filter(|n| !n.trim().is_empty()),
        }
    }
}

#[async_trait]
impl AudioSource for CpalAudioSource {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        base_mime(mime_type) == "audio/wav"
    }

    async fn open(&self, request: CaptureRequest) -> Result<CaptureStream, DeviceError> {
        if !self.is_type_supported(&request.mime_type) {
            log::warn!(
                "Recorder: {} cannot encode {}, recording WAV instead",
                self.name(),
                request.mime_type
            );
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (chunk_tx, chunk_rx) = tokio_mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel();
        let device_name = self.device_name.clone();
        let chunk_interval = request.chunk_interval;

        let thread_handle = thread::spawn(move || {
            run_capture_thread(device_name, chunk_interval, chunk_tx, command_rx, ready_tx)
        });

        let layout = match ready_rx.await {
            Ok(result) => result?,
            Err(_) => {
                let _ = thread_handle.join();
                return Err(DeviceError::Stream("capture thread exited".to_string()));
            }
        };

        Ok(CaptureStream {
            chunks: chunk_rx,
            device: Box::new(CpalCaptureDevice {
                command_tx: Some(command_tx),
                thread_handle: Some(thread_handle),
            }),
            pcm: Some(layout),
        })
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}

/// Handle to a running capture thread
struct CpalCaptureDevice {
    command_tx: Option<mpsc::Sender<CaptureCommand>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CaptureDevice for CpalCaptureDevice {
    fn stop(&mut self) {
        if let Some(tx) = self.command_tx.take() {
            log::info!("Stopping audio capture");
            // Ignore error if thread already stopped
            let _ = tx.send(CaptureCommand::Stop);
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpalCaptureDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

fn find_device(device_name: Option<&str>) -> Result<cpal::Device, DeviceError> {
    let host = cpal::default_host();

    if let Some(wanted) = device_name {
        let found = host.input_devices().ok().and_then(|mut devices| {
            devices.find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
        });
        match found {
            Some(device) => return Ok(device),
            None => log::warn!("Input device '{}' not found, using default", wanted),
        }
    }

    host.default_input_device()
        .ok_or(DeviceError::NoInputDevice)
}

fn map_build_error(err: cpal::BuildStreamError) -> DeviceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => DeviceError::NoInputDevice,
        other => DeviceError::Stream(other.to_string()),
    }
}

/// Convert buffered samples to little-endian bytes and send them as a chunk.
fn flush(pending: &Mutex<Vec<i16>>, chunk_tx: &tokio_mpsc::UnboundedSender<Vec<u8>>) {
    let samples = std::mem::take(&mut *pending.lock().unwrap_or_else(PoisonError::into_inner));
    if samples.is_empty() {
        return;
    }
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let _ = chunk_tx.send(bytes);
}

/// Run the audio capture in a dedicated thread
fn run_capture_thread(
    device_name: Option<String>,
    chunk_interval: Duration,
    chunk_tx: tokio_mpsc::UnboundedSender<Vec<u8>>,
    command_rx: mpsc::Receiver<CaptureCommand>,
    ready_tx: oneshot::Sender<Result<PcmLayout, DeviceError>>,
) {
    use cpal::Sample;

    let setup = || -> Result<(cpal::Stream, PcmLayout, Arc<Mutex<Vec<i16>>>), DeviceError> {
        let device = find_device(device_name.as_deref())?;
        let config = device
            .default_input_config()
            .map_err(|e| DeviceError::Stream(format!("Failed to get device config: {}", e)))?;

        let layout = PcmLayout {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };
        log::info!(
            "Audio config: {} Hz, {} channels, {:?}",
            layout.sample_rate,
            layout.channels,
            config.sample_format()
        );

        let pending = Arc::new(Mutex::new(Vec::<i16>::new()));
        let sample_format = config.sample_format();
        let stream_config: cpal::StreamConfig = config.into();
        let err_fn = |err: cpal::StreamError| {
            log::error!("Audio stream error: {}", err);
        };

        let stream = match sample_format {
            SampleFormat::F32 => {
                let pending = pending.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if let Ok(mut buf) = pending.lock() {
                            buf.extend(data.iter().map(|&s| s.to_sample::<i16>()));
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let pending = pending.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        if let Ok(mut buf) = pending.lock() {
                            buf.extend_from_slice(data);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::U16 => {
                let pending = pending.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        if let Ok(mut buf) = pending.lock() {
                            buf.extend(data.iter().map(|&s| s.to_sample::<i16>()));
                        }
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(DeviceError::Stream(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        }
        .map_err(map_build_error)?;

        stream
            .play()
            .map_err(|e| DeviceError::Stream(format!("Failed to start audio stream: {}", e)))?;

        Ok((stream, layout, pending))
    };

    let (stream, layout, pending) = match setup() {
        Ok(parts) => parts,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if ready_tx.send(Ok(layout)).is_err() {
        // Nobody is waiting for this capture any more.
        return;
    }
    log::info!("Audio capture started");

    loop {
        match command_rx.recv_timeout(chunk_interval) {
            Ok(CaptureCommand::Stop) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => flush(&pending, &chunk_tx),
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    // Stop the stream before the last flush so nothing is appended after it.
    drop(stream);
    flush(&pending, &chunk_tx);
}

/// Get the list of available input devices
pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.input_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_wav_is_supported() {
        let source = CpalAudioSource::new();
        assert!(source.is_type_supported("audio/wav"));
        assert!(!source.is_type_supported("audio/webm;codecs=opus"));
        assert!(!source.is_type_supported("audio/mp4"));
    }

    #[test]
    fn test_blank_device_name_means_default() {
        let source = CpalAudioSource::with_device_name(Some("  ".to_string()));
        assert!(source.device_name.is_none());
    }

    #[test]
    fn test_flush_encodes_little_endian() {
        let pending = Mutex::new(vec![1i16, -2]);
        let (tx, mut rx) = tokio_mpsc::unbounded_channel();

        flush(&pending, &tx);
        flush(&pending, &tx);

        assert_eq!(rx.try_recv().unwrap(), vec![0x01, 0x00, 0xFE, 0xFF]);
        assert!(rx.try_recv().is_err());
    }
}
