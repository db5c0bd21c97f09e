//! Speech capabilities
//!
//! Speech-to-text and text-to-speech are narrow contracts supplied by the
//! host. Both are optional; [`UnsupportedRecognizer`] and
//! [`UnsupportedSynthesizer`] stand in when the platform lacks them.
//! Platform callbacks are translated into [`RecognitionEvent`] and
//! [`SynthesisEvent`] values and fed back to the application state.

/// Language requested from speech recognition
pub const RECOGNITION_LANG: &str = "en-US";

pub const RECOGNITION_UNSUPPORTED_NOTICE: &str =
    "Speech recognition is not supported in this browser. Please use Chrome, Edge, or Safari.";
pub const RECOGNITION_START_NOTICE: &str = "Error starting voice recognition. Please try again.";
pub const SYNTHESIS_UNSUPPORTED_NOTICE: &str =
    "Text-to-speech is not supported in this browser. Please use Chrome, Firefox, Safari, or Edge.";

/// Voice-name fragments that usually mark a higher quality voice
const PREFERRED_VOICE_MARKERS: [&str; 5] = ["Natural", "Enhanced", "Premium", "Neural", "Google"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("speech capability not supported")]
    Unsupported,
    #[error("failed to start speech recognition: {0}")]
    Start(String),
}

impl SpeechError {
    pub fn notice(&self) -> &'static str {
        match self {
            SpeechError::Unsupported => RECOGNITION_UNSUPPORTED_NOTICE,
            SpeechError::Start(_) => RECOGNITION_START_NOTICE,
        }
    }
}

/// Failure reported by an active recognition session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    PermissionDenied,
    NoSpeech,
    Other(String),
}

impl RecognitionError {
    /// Map a Web Speech error code
    pub fn from_code(code: &str) -> Self {
        match code {
            "not-allowed" => RecognitionError::PermissionDenied,
            "no-speech" => RecognitionError::NoSpeech,
            other => RecognitionError::Other(other.to_string()),
        }
    }

    pub fn notice(&self) -> String {
        match self {
            RecognitionError::PermissionDenied => {
                "Microphone access denied. Please allow microphone access and try again.".to_string()
            }
            RecognitionError::NoSpeech => "No speech detected. Please try again.".to_string(),
            RecognitionError::Other(code) => format!("Voice recognition error: {}", code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Started,
    Transcript(String),
    Failed(RecognitionError),
    Ended,
}

/// Single-utterance, non-continuous speech-to-text
pub trait SpeechRecognizer {
    fn is_supported(&self) -> bool;
    fn start(&self) -> Result<(), SpeechError>;
    fn stop(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    pub name: String,
    pub lang: String,
    pub local_service: bool,
}

/// Pick a natural-sounding voice, or `None` for the platform default
pub fn preferred_voice(voices: &[VoiceInfo]) -> Option<&VoiceInfo> {
    voices.iter().find(|voice| {
        PREFERRED_VOICE_MARKERS
            .iter()
            .any(|marker| voice.name.contains(marker))
            || (!voice.local_service && voice.lang.starts_with("en"))
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// Name of the voice to use
    pub voice: Option<String>,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rate: 0.9,
            pitch: 1.0,
            volume: 0.8,
            voice: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Started,
    Ended,
    Failed(String),
}

pub trait SpeechSynthesizer {
    fn is_supported(&self) -> bool;
    fn is_speaking(&self) -> bool;
    fn cancel(&self);
    fn voices(&self) -> Vec<VoiceInfo>;
    fn speak(&self, utterance: Utterance);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Speech in progress was cancelled; nothing new was started
    Stopped,
    Started,
    NothingToSay,
    Unsupported,
}

/// Stop speech in progress, or start speaking `text`
pub fn speak_toggle<T: SpeechSynthesizer + ?Sized>(synth: &T, text: &str) -> SpeakOutcome {
    if synth.is_speaking() {
        synth.cancel();
        log::debug!("Speech cancelled");
        return SpeakOutcome::Stopped;
    }

    if text.trim().is_empty() {
        log::debug!("No text to speak");
        return SpeakOutcome::NothingToSay;
    }

    if !synth.is_supported() {
        return SpeakOutcome::Unsupported;
    }

    let mut utterance = Utterance::new(text);
    let voices = synth.voices();
    if let Some(voice) = preferred_voice(&voices) {
        log::debug!("Using voice: {}", voice.name);
        utterance.voice = Some(voice.name.clone());
    }
    synth.speak(utterance);
    SpeakOutcome::Started
}

/// Recognizer for hosts without speech-to-text
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedRecognizer;

impl SpeechRecognizer for UnsupportedRecognizer {
    fn is_supported(&self) -> bool {
        false
    }

    fn start(&self) -> Result<(), SpeechError> {
        Err(SpeechError::Unsupported)
    }

    fn stop(&self) {}
}

/// Synthesizer for hosts without text-to-speech
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedSynthesizer;

impl SpeechSynthesizer for UnsupportedSynthesizer {
    fn is_supported(&self) -> bool {
        false
    }

    fn is_speaking(&self) -> bool {
        false
    }

    fn cancel(&self) {}

    fn voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }

    fn speak(&self, _utterance: Utterance) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::{Cell, RefCell};

    use super::*;

    /// Synthesizer that records what it was asked to say
    #[derive(Debug, Default)]
    pub struct RecordingSynthesizer {
        pub speaking: Cell<bool>,
        pub cancelled: Cell<usize>,
        pub spoken: RefCell<Vec<Utterance>>,
        pub voices: Vec<VoiceInfo>,
    }

    impl SpeechSynthesizer for RecordingSynthesizer {
        fn is_supported(&self) -> bool {
            true
        }

        fn is_speaking(&self) -> bool {
            self.speaking.get()
        }

        fn cancel(&self) {
            self.cancelled.set(self.cancelled.get() + 1);
            self.speaking.set(false);
        }

        fn voices(&self) -> Vec<VoiceInfo> {
            self.voices.clone()
        }

        fn speak(&self, utterance: Utterance) {
            self.speaking.set(true);
            self.spoken.borrow_mut().push(utterance);
        }
    }

    /// Recognizer that counts start and stop requests
    #[derive(Debug, Default)]
    pub struct RecordingRecognizer {
        pub started: Cell<usize>,
        pub stopped: Cell<usize>,
        pub fail_start: bool,
    }

    impl SpeechRecognizer for RecordingRecognizer {
        fn is_supported(&self) -> bool {
            true
        }

        fn start(&self) -> Result<(), SpeechError> {
            if self.fail_start {
                return Err(SpeechError::Start("already started".into()));
            }
            self.started.set(self.started.get() + 1);
            Ok(())
        }

        fn stop(&self) {
            self.stopped.set(self.stopped.get() + 1);
        }
    }
}
