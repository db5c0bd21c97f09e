//! Web Speech API providers

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Array, Function, Reflect};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    SpeechRecognition, SpeechRecognitionEvent, SpeechSynthesis, SpeechSynthesisUtterance,
    SpeechSynthesisVoice,
};

use flowchat_core::speech::{
    RecognitionError, RecognitionEvent, SpeechError, SynthesisEvent, Utterance, VoiceInfo,
    RECOGNITION_LANG,
};
use flowchat_core::{SpeechRecognizer, SpeechSynthesizer};

/// Read the `error` code carried by speech error events
fn error_code(event: &JsValue) -> String {
    Reflect::get(event, &JsValue::from_str("error"))
        .ok()
        .and_then(|value| value.as_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn event_handler<F>(handler: F) -> Closure<dyn FnMut(JsValue)>
where
    F: FnMut(JsValue) + 'static,
{
    Closure::wrap(Box::new(handler) as Box<dyn FnMut(JsValue)>)
}

/// Speech-to-text via `SpeechRecognition` or its `webkit` prefixed form
pub struct WebSpeechRecognizer {
    recognition: SpeechRecognition,
    _handlers: Vec<Closure<dyn FnMut(JsValue)>>,
}

impl WebSpeechRecognizer {
    /// `None` when the browser has no recognition API
    pub fn new<F>(on_event: F) -> Result<Option<Self>, JsValue>
    where
        F: Fn(RecognitionEvent) + 'static,
    {
        let window = crate::window()?;
        let constructor = ["SpeechRecognition", "webkitSpeechRecognition"]
            .iter()
            .filter_map(|name| Reflect::get(&window, &JsValue::from_str(name)).ok())
            .find(|value| value.is_function());
        let Some(constructor) = constructor else {
            log::info!("Speech recognition not supported");
            return Ok(None);
        };

        let constructor: Function = constructor.unchecked_into();
        let recognition: SpeechRecognition =
            Reflect::construct(&constructor, &Array::new())?.unchecked_into();
        recognition.set_continuous(false);
        recognition.set_interim_results(false);
        recognition.set_lang(RECOGNITION_LANG);

        let on_event = Rc::new(on_event);

        let onstart = {
            let on_event = on_event.clone();
            event_handler(move |_| on_event(RecognitionEvent::Started))
        };
        let onresult = {
            let on_event = on_event.clone();
            event_handler(move |event| {
                let event: SpeechRecognitionEvent = event.unchecked_into();
                if let Some(transcript) = first_transcript(&event) {
                    on_event(RecognitionEvent::Transcript(transcript));
                }
            })
        };
        let onerror = {
            let on_event = on_event.clone();
            event_handler(move |event| {
                let code = error_code(&event);
                on_event(RecognitionEvent::Failed(RecognitionError::from_code(&code)));
            })
        };
        let onend = event_handler(move |_| on_event(RecognitionEvent::Ended));

        recognition.set_onstart(Some(onstart.as_ref().unchecked_ref()));
        recognition.set_onresult(Some(onresult.as_ref().unchecked_ref()));
        recognition.set_onerror(Some(onerror.as_ref().unchecked_ref()));
        recognition.set_onend(Some(onend.as_ref().unchecked_ref()));

        Ok(Some(Self {
            recognition,
            _handlers: vec![onstart, onresult, onerror, onend],
        }))
    }
}

fn first_transcript(event: &SpeechRecognitionEvent) -> Option<String> {
    let result = event.results()?.get(0)?;
    let alternative = result.get(0)?;
    Some(alternative.transcript())
}

impl SpeechRecognizer for WebSpeechRecognizer {
    fn is_supported(&self) -> bool {
        true
    }

    fn start(&self) -> Result<(), SpeechError> {
        self.recognition
            .start()
            .map_err(|e| SpeechError::Start(format!("{:?}", e)))
    }

    fn stop(&self) {
        self.recognition.stop();
    }
}

/// Handlers attached to the utterance being spoken
struct ActiveUtterance {
    utterance: SpeechSynthesisUtterance,
    _handlers: Vec<Closure<dyn FnMut(JsValue)>>,
}

impl ActiveUtterance {
    fn detach(&self) {
        self.utterance.set_onstart(None);
        self.utterance.set_onend(None);
        self.utterance.set_onerror(None);
    }
}

/// Text-to-speech via `window.speechSynthesis`
pub struct WebSpeechSynthesizer {
    synthesis: SpeechSynthesis,
    on_event: Rc<dyn Fn(SynthesisEvent)>,
    voices: Rc<RefCell<Vec<SpeechSynthesisVoice>>>,
    active: RefCell<Option<ActiveUtterance>>,
    _voices_changed: Closure<dyn FnMut(JsValue)>,
}

impl WebSpeechSynthesizer {
    /// `None` when the browser has no synthesis API
    pub fn new<F>(on_event: F) -> Result<Option<Self>, JsValue>
    where
        F: Fn(SynthesisEvent) + 'static,
    {
        let window = crate::window()?;
        if !Reflect::has(&window, &JsValue::from_str("speechSynthesis"))? {
            log::info!("Text-to-speech not supported");
            return Ok(None);
        }
        let synthesis = window.speech_synthesis()?;

        // Some browsers list no voices until `voiceschanged` fires.
        let voices = Rc::new(RefCell::new(platform_voices(&synthesis)));
        let voices_changed = {
            let voices = voices.clone();
            let synthesis = synthesis.clone();
            event_handler(move |_| {
                let loaded = platform_voices(&synthesis);
                log::debug!("Loaded {} voices", loaded.len());
                *voices.borrow_mut() = loaded;
            })
        };
        synthesis.set_onvoiceschanged(Some(voices_changed.as_ref().unchecked_ref()));

        Ok(Some(Self {
            synthesis,
            on_event: Rc::new(on_event),
            voices,
            active: RefCell::new(None),
            _voices_changed: voices_changed,
        }))
    }
}

fn platform_voices(synthesis: &SpeechSynthesis) -> Vec<SpeechSynthesisVoice> {
    synthesis
        .get_voices()
        .iter()
        .map(|voice| voice.unchecked_into::<SpeechSynthesisVoice>())
        .collect()
}

impl SpeechSynthesizer for WebSpeechSynthesizer {
    fn is_supported(&self) -> bool {
        true
    }

    fn is_speaking(&self) -> bool {
        self.synthesis.speaking()
    }

    fn cancel(&self) {
        self.synthesis.cancel();
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        self.voices
            .borrow()
            .iter()
            .map(|voice| VoiceInfo {
                name: voice.name(),
                lang: voice.lang(),
                local_service: voice.local_service(),
            })
            .collect()
    }

    fn speak(&self, utterance: Utterance) {
        let spoken = match SpeechSynthesisUtterance::new_with_text(&utterance.text) {
            Ok(spoken) => spoken,
            Err(e) => {
                log::error!("Failed to create utterance: {:?}", e);
                return;
            }
        };
        spoken.set_rate(utterance.rate);
        spoken.set_pitch(utterance.pitch);
        spoken.set_volume(utterance.volume);

        if let Some(name) = &utterance.voice {
            let voices = self.voices.borrow();
            let voice = voices.iter().find(|v| &v.name() == name);
            spoken.set_voice(voice);
        }

        let onstart = {
            let on_event = self.on_event.clone();
            event_handler(move |_| on_event(SynthesisEvent::Started))
        };
        let onend = {
            let on_event = self.on_event.clone();
            event_handler(move |_| on_event(SynthesisEvent::Ended))
        };
        let onerror = {
            let on_event = self.on_event.clone();
            event_handler(move |event| on_event(SynthesisEvent::Failed(error_code(&event))))
        };

        spoken.set_onstart(Some(onstart.as_ref().unchecked_ref()));
        spoken.set_onend(Some(onend.as_ref().unchecked_ref()));
        spoken.set_onerror(Some(onerror.as_ref().unchecked_ref()));

        // The previous utterance must not call into handlers dropped here.
        let previous = self.active.replace(Some(ActiveUtterance {
            utterance: spoken.clone(),
            _handlers: vec![onstart, onend, onerror],
        }));
        if let Some(previous) = previous {
            previous.detach();
        }

        self.synthesis.speak(&spoken);
    }
}
