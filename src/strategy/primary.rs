//! Primary encoder strategy.
//!
//! Records encoded audio in roughly one-second chunks and, at stop time,
//! hands the concatenated payload to the remote transcription client. A
//! backup recognizer runs alongside; the two never affect each other.

use crate::audio::encoding::{base_mime, select_mime_type, ChunkBuffer, EncodedAudio, WAV_MIME};
use crate::audio::{AudioSource, CaptureDevice, CaptureRequest, CaptureStream, PcmLayout};
use crate::config::RecorderConfig;
use crate::error::ClassifiedError;
use crate::recognizer::BackupRecognizer;
use crate::stt::{SttError, TranscriptionResult};
use tokio::sync::mpsc;

/// Negotiate an encoding and acquire the microphone.
///
/// Suspends while the platform shows its permission prompt.
pub async fn acquire(
    source: &dyn AudioSource,
    config: &RecorderConfig,
) -> Result<(String, CaptureStream), ClassifiedError> {
    let mime_type = select_mime_type(&config.mime_priority, source);
    log::info!(
        "Recorder: opening {} with encoding {}",
        source.name(),
        mime_type
    );

    let stream = source
        .open(CaptureRequest {
            mime_type: mime_type.clone(),
            chunk_interval: config.chunk_interval(),
        })
        .await
        .map_err(|e| {
            log::warn!("Recorder: failed to acquire microphone: {}", e);
            ClassifiedError::from(e)
        })?;

    // Sources that deliver raw PCM are wrapped as WAV at stop time.
    if stream.pcm.is_some() && base_mime(&mime_type) != WAV_MIME {
        log::info!("Recorder: {} delivers PCM, uploading as {}", source.name(), WAV_MIME);
        return Ok((WAV_MIME.to_string(), stream));
    }

    Ok((mime_type, stream))
}

/// A primary-strategy recording in progress.
pub struct PrimaryCapture {
    device: Option<Box<dyn CaptureDevice>>,
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    buffer: ChunkBuffer,
    mime_type: String,
    pcm: Option<PcmLayout>,
    backup: Option<BackupRecognizer>,
}

impl PrimaryCapture {
    pub fn new(stream: CaptureStream, mime_type: String, backup: Option<BackupRecognizer>) -> Self {
        Self {
            device: Some(stream.device),
            chunks: stream.chunks,
            buffer: ChunkBuffer::new(),
            mime_type,
            pcm: stream.pcm,
            backup,
        }
    }

    /// Drain delivered chunks into the buffer. Returns how many were taken.
    pub fn collect(&mut self) -> usize {
        let mut taken = 0;
        while let Ok(chunk) = self.chunks.try_recv() {
            self.buffer.push(chunk);
            taken += 1;
        }
        taken
    }

    /// Stop the microphone and the backup recognizer.
    ///
    /// Returns the assembled audio and whatever the backup recognizer heard.
    pub fn finish(mut self) -> (Result<EncodedAudio, ClassifiedError>, String) {
        if let Some(mut device) = self.device.take() {
            device.stop();
        }
        self.collect();
        self.chunks.close();

        let backup = self
            .backup
            .take()
            .map(BackupRecognizer::stop)
            .unwrap_or_default();

        let buffer = std::mem::take(&mut self.buffer);
        log::info!(
            "Recorder: captured {} chunks, {} bytes",
            buffer.len(),
            buffer.total_bytes()
        );

        let audio = buffer
            .into_audio(&self.mime_type, self.pcm)
            .map_err(|e| ClassifiedError::Unknown(e.to_string()));

        (audio, backup)
    }
}

impl Drop for PrimaryCapture {
    fn drop(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.stop();
        }
        // BackupRecognizer stops itself on drop.
    }
}

/// Map the remote client's answer, filling in the recorded duration when the
/// service does not report one.
pub fn classify_remote(
    result: Result<TranscriptionResult, SttError>,
    recorded_secs: f64,
) -> Result<TranscriptionResult, ClassifiedError> {
    match result {
        Ok(mut result) => {
            if result.duration_seconds.is_none() {
                result.duration_seconds = Some(recorded_secs);
            }
            Ok(result)
        }
        Err(e) => {
            log::warn!("Recorder: remote transcription failed: {}", e);
            Err(e.classify())
        }
    }
}

/// Choose the session outcome: a non-empty remote transcript, else the
/// backup transcript, else the remote failure.
pub fn resolve_outcome(
    remote: Result<TranscriptionResult, ClassifiedError>,
    backup: &str,
    recorded_secs: f64,
) -> Result<TranscriptionResult, ClassifiedError> {
    let failure = match remote {
        Ok(result) if !result.is_empty => return Ok(result),
        Ok(_) => ClassifiedError::EmptyResult,
        Err(e) => e,
    };

    let backup = backup.trim();
    if backup.is_empty() {
        return Err(failure);
    }

    log::info!(
        "Recorder: remote path unavailable ({}), using backup transcript",
        failure.code()
    );
    Ok(TranscriptionResult::from_text(backup, Some(recorded_secs)))
}
