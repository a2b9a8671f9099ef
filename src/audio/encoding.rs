//! Encoding negotiation and chunk assembly.

use super::{AudioSource, PcmLayout};
use hound::{WavSpec, WavWriter};
use std::io::Cursor;

/// Encoder MIME types in order of preference.
pub const DEFAULT_MIME_PRIORITY: &[&str] = &[
    "audio/webm;codecs=opus",
    "audio/webm",
    "audio/mp4",
    "audio/ogg;codecs=opus",
    "audio/wav",
];

/// What raw PCM recordings are uploaded as.
pub const WAV_MIME: &str = "audio/wav";

/// Errors that can occur while assembling the upload payload
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Failed to encode audio: {0}")]
    Wav(#[from] hound::Error),
}

/// The MIME type without parameters, lowercased (`audio/webm;codecs=opus` → `audio/webm`).
pub fn base_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Pick the first candidate the source explicitly supports.
///
/// Falls back to the first candidate when none report support, and to the
/// built-in priority list when `candidates` is empty.
pub fn select_mime_type(candidates: &[String], source: &dyn AudioSource) -> String {
    let candidates: Vec<&str> = if candidates.iter().any(|c| !c.trim().is_empty()) {
        candidates
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect()
    } else {
        DEFAULT_MIME_PRIORITY.to_vec()
    };

    candidates
        .iter()
        .find(|candidate| source.is_type_supported(candidate))
        .or_else(|| candidates.first())
        .map(|m| m.to_string())
        .unwrap_or_else(|| DEFAULT_MIME_PRIORITY[0].to_string())
}

/// Upload file name for a MIME type.
pub fn file_name_for(mime_type: &str) -> String {
    let ext = match base_mime(mime_type).as_str() {
        "audio/webm" => "webm",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
        "audio/mpeg" => "mp3",
        _ => "bin",
    };
    format!("recording.{}", ext)
}

/// Ordered chunks of one capture session.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<Vec<u8>>,
    total_bytes: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are dropped.
    pub fn push(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.total_bytes += chunk.len();
        self.chunks.push(chunk);
    }

    /// Number of non-empty chunks received
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Concatenate all chunks into a single payload.
    ///
    /// Raw PCM chunks are always wrapped in a WAV header and labelled
    /// `audio/wav`, whatever encoding was requested.
    pub fn into_audio(
        self,
        mime_type: &str,
        pcm: Option<PcmLayout>,
    ) -> Result<EncodedAudio, EncodeError> {
        let mut bytes = Vec::with_capacity(self.total_bytes);
        for chunk in self.chunks {
            bytes.extend_from_slice(&chunk);
        }

        let Some(layout) = pcm else {
            return Ok(EncodedAudio {
                bytes,
                mime_type: mime_type.to_string(),
            });
        };

        let bytes = if bytes.is_empty() {
            bytes
        } else {
            pcm16_to_wav(&bytes, layout)?
        };
        Ok(EncodedAudio {
            bytes,
            mime_type: WAV_MIME.to_string(),
        })
    }
}

/// The assembled recording, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl EncodedAudio {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn file_name(&self) -> String {
        file_name_for(&self.mime_type)
    }
}

/// Wrap interleaved 16-bit little-endian PCM in a WAV container.
fn pcm16_to_wav(pcm: &[u8], layout: PcmLayout) -> Result<Vec<u8>, EncodeError> {
    let spec = WavSpec {
        channels: layout.channels.max(1),
        sample_rate: layout.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        // A trailing odd byte cannot form a sample.
        for pair in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fakes::FakeAudioSource;

    fn owned(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_prefers_first_supported() {
        let source = FakeAudioSource::supporting(&["audio/mp4", "audio/webm"]);
        let picked = select_mime_type(&owned(DEFAULT_MIME_PRIORITY), &source);
        assert_eq!(picked, "audio/webm");
    }

    #[test]
    fn test_select_falls_back_to_first_entry() {
        let source = FakeAudioSource::supporting(&[]);
        let picked = select_mime_type(&owned(&["audio/ogg;codecs=opus", "audio/wav"]), &source);
        assert_eq!(picked, "audio/ogg;codecs=opus");
    }

    #[test]
    fn test_select_with_empty_list_uses_defaults() {
        let source = FakeAudioSource::supporting(&["audio/wav"]);
        assert_eq!(select_mime_type(&[], &source), "audio/wav");
    }

    #[test]
    fn test_base_mime_and_file_names() {
        assert_eq!(base_mime("audio/webm;codecs=opus"), "audio/webm");
        assert_eq!(base_mime(" Audio/WAV "), "audio/wav");
        assert_eq!(file_name_for("audio/webm;codecs=opus"), "recording.webm");
        assert_eq!(file_name_for("audio/mp4"), "recording.m4a");
        assert_eq!(file_name_for("audio/ogg;codecs=opus"), "recording.ogg");
        assert_eq!(file_name_for("application/octet-stream"), "recording.bin");
    }

    #[test]
    fn test_chunks_concatenate_in_order() {
        let mut buffer = ChunkBuffer::new();
        buffer.push(b"one-".to_vec());
        buffer.push(Vec::new());
        buffer.push(b"two".to_vec());

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.total_bytes(), 7);

        let audio = buffer.into_audio("audio/webm", None).unwrap();
        assert_eq!(audio.bytes, b"one-two");
        assert_eq!(audio.file_name(), "recording.webm");
    }

    #[test]
    fn test_pcm_chunks_wrapped_as_wav() {
        let mut buffer = ChunkBuffer::new();
        // 1600 silent mono samples, split across two chunks
        buffer.push(vec![0u8; 1600]);
        buffer.push(vec![0u8; 1600]);

        let layout = PcmLayout {
            sample_rate: 16000,
            channels: 1,
        };
        let audio = buffer.into_audio("audio/wav", Some(layout)).unwrap();

        assert_eq!(&audio.bytes[0..4], b"RIFF");
        assert_eq!(&audio.bytes[8..12], b"WAVE");
        // 44 byte header + 3200 bytes of samples
        assert_eq!(audio.len(), 44 + 3200);
    }

    #[test]
    fn test_pcm_is_wav_whatever_was_requested() {
        let mut buffer = ChunkBuffer::new();
        buffer.push(vec![0u8; 20]);

        let layout = PcmLayout {
            sample_rate: 16000,
            channels: 1,
        };
        let audio = buffer.into_audio("audio/webm", Some(layout)).unwrap();

        assert_eq!(audio.mime_type, "audio/wav");
        assert_eq!(audio.file_name(), "recording.wav");
        assert_eq!(&audio.bytes[0..4], b"RIFF");
    }

    #[test]
    fn test_empty_buffer_yields_empty_audio() {
        let layout = PcmLayout {
            sample_rate: 16000,
            channels: 1,
        };
        let audio = ChunkBuffer::new().into_audio("audio/wav", Some(layout)).unwrap();
        assert!(audio.is_empty());
    }
}
