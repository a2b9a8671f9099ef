//! What the embedding platform provides.

use crate::audio::AudioSource;
use crate::capability::CapabilityFlags;
use crate::recognizer::SpeechRecognizer;
use std::fmt;
use std::sync::Arc;

/// Platform services handed to the controller by the embedder.
///
/// An absent audio source means the platform cannot encode audio; an absent
/// recognizer means it has no on-device speech recognition.
#[derive(Clone, Default)]
pub struct Platform {
    pub secure_context: bool,
    pub audio: Option<Arc<dyn AudioSource>>,
    pub recognizer: Option<Arc<dyn SpeechRecognizer>>,
}

impl Platform {
    pub fn new(secure_context: bool) -> Self {
        Self {
            secure_context,
            ..Default::default()
        }
    }

    pub fn with_audio(mut self, audio: Arc<dyn AudioSource>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn capabilities(&self) -> CapabilityFlags {
        CapabilityFlags {
            encoder_capable: self.audio.is_some(),
            secure_context: self.secure_context,
            recognizer_capable: self.recognizer.is_some(),
        }
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("secure_context", &self.secure_context)
            .field("audio", &self.audio.as_ref().map(|a| a.name()))
            .field("recognizer", &self.recognizer.as_ref().map(|r| r.name()))
            .finish()
    }
}
