//! Chat application state
//!
//! [`ChatApp`] owns everything the browser page used to keep in globals:
//! the session store, settings, the outstanding request, speech button
//! state and the notice waiting to be shown. Hosts forward user actions and
//! platform events to it, then re-render from [`ChatApp::view`].
//!
//! Sending is split in two so the host can release its borrow of the app
//! while the network request is in flight:
//!
//! 1. [`ChatApp::submit`] records the user turn and returns a
//!    [`PendingCompletion`]
//! 2. [`PendingCompletion::dispatch`] runs the request
//! 3. [`ChatApp::settle`] records the reply and persists
//!
//! [`ChatApp::send`] does all three for hosts that can hold the app across
//! an await point.

use flowchat_types::{Role, Settings};

use crate::clock::{Clock, SystemClock};
use crate::completion::{self, CompletionClient, CompletionError, CompletionRequest};
use crate::config::{self, ApiStatus, SettingsForm};
use crate::speech::{
    self, RecognitionEvent, SpeakOutcome, SpeechRecognizer, SpeechSynthesizer, SynthesisEvent,
};
use crate::storage::{KeyValueStore, StorageError};
use crate::store::SessionStore;
use crate::view::{self, ButtonView, ConversationListView, MessageLogView, RenderContext};

/// Read aloud when there is no assistant reply to speak
pub const WELCOME_SPEECH: &str = "Welcome! I am WindowsFlowAgent. I can help you with automating tasks such as playing videos on streaming platforms, opening applications like Outlook, and clicking icons to automate workflows. Just tell me what you'd like me to do!";

/// Asked before settings are reset
pub const RESET_CONFIRMATION: &str =
    "Are you sure you want to reset all settings? This will clear your API configuration.";

/// Asked before a conversation is deleted
pub const DELETE_CONFIRMATION: &str =
    "Are you sure you want to delete this chat? This action cannot be undone.";

pub const DEFAULT_TAB: &str = "web";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("message is empty")]
    Empty,
    #[error("a reply is still pending")]
    Busy,
}

/// A submitted prompt awaiting its completion
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCompletion {
    conversation_id: String,
    request: Result<CompletionRequest, CompletionError>,
}

impl PendingCompletion {
    /// Conversation the reply belongs to, fixed at submit time
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// The request, or the configuration error that prevented building it
    pub fn request(&self) -> Result<&CompletionRequest, &CompletionError> {
        self.request.as_ref()
    }

    pub async fn dispatch<T: CompletionClient + ?Sized>(
        &self,
        client: &T,
    ) -> Result<String, CompletionError> {
        match &self.request {
            Ok(request) => client.complete(request).await,
            Err(e) => Err(e.clone()),
        }
    }
}

/// Everything a host needs to draw the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppView {
    pub conversations: ConversationListView,
    /// `None` shows the welcome screen
    pub log: Option<MessageLogView>,
    pub mic: ButtonView,
    pub audio: ButtonView,
    pub api_status: ApiStatus,
    pub active_tab: String,
    pub active_nav: Option<String>,
    pub busy: bool,
}

pub struct ChatApp<S, C = SystemClock> {
    store: SessionStore<S, C>,
    settings: Settings,
    pending: Option<String>,
    transcript: Option<String>,
    listening: bool,
    speaking: bool,
    active_tab: String,
    active_nav: Option<String>,
    notice: Option<String>,
}

impl<S: KeyValueStore, C: Clock> ChatApp<S, C> {
    /// Load settings and the session from `storage`
    pub fn open(storage: S, clock: C) -> Self {
        let settings = config::load_settings(&storage);
        let store = SessionStore::open(storage, clock);
        log::info!(
            "Chat app ready: {} conversations, API {}",
            store.session().len(),
            ApiStatus::of(&settings).label()
        );

        Self {
            store,
            settings,
            pending: None,
            transcript: None,
            listening: false,
            speaking: false,
            active_tab: DEFAULT_TAB.to_string(),
            active_nav: None,
            notice: None,
        }
    }

    pub fn store(&self) -> &SessionStore<S, C> {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// True while a completion request is outstanding
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Record a user turn and prepare its completion request.
    ///
    /// Starts a conversation when none is current. Only one request may be
    /// outstanding at a time.
    pub fn submit(&mut self, text: &str) -> Result<PendingCompletion, SubmitError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::Empty);
        }
        if let Some(id) = &self.pending {
            log::warn!("Ignoring message while conversation {} awaits a reply", id);
            return Err(SubmitError::Busy);
        }

        let conversation_id = match self.store.session().current_id().map(str::to_string) {
            Some(id) => {
                self.store.append_turn(&id, Role::User, text, false);
                // Failures are logged by the store.
                let _ = self.store.persist();
                id
            }
            None => self.store.start_conversation(text).id().to_string(),
        };

        let history = self
            .store
            .get(&conversation_id)
            .map(|conversation| conversation.turns())
            .unwrap_or_default();
        let request = completion::build_request(&self.settings, text, history);
        if let Err(e) = &request {
            log::warn!("Completion request not built: {}", e);
        }

        self.pending = Some(conversation_id.clone());
        Ok(PendingCompletion {
            conversation_id,
            request,
        })
    }

    /// Record the outcome of a completion and persist.
    ///
    /// Failures become error-flagged assistant turns. A reply for a
    /// conversation deleted in the meantime is dropped.
    pub fn settle(&mut self, pending: PendingCompletion, result: Result<String, CompletionError>) {
        if self.pending.as_deref() == Some(pending.conversation_id.as_str()) {
            self.pending = None;
        }

        let (text, is_error) = match result {
            Ok(reply) => (reply, false),
            Err(e) => {
                log::error!("Completion failed: {}", e);
                (e.error_reply(), true)
            }
        };

        if !self
            .store
            .append_turn(&pending.conversation_id, Role::Assistant, &text, is_error)
        {
            log::warn!(
                "Dropping reply for deleted conversation {}",
                pending.conversation_id
            );
        }
        let _ = self.store.persist();
    }

    /// Submit, dispatch and settle in one step
    pub async fn send<T: CompletionClient + ?Sized>(
        &mut self,
        text: &str,
        client: &T,
    ) -> Result<(), SubmitError> {
        let pending = self.submit(text)?;
        let result = pending.dispatch(client).await;
        self.settle(pending, result);
        Ok(())
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub fn settings_form(&self) -> SettingsForm {
        SettingsForm::from_settings(&self.settings)
    }

    pub fn save_settings(&mut self, form: &SettingsForm) -> Result<(), StorageError> {
        self.settings = form.parse(&self.settings);
        log::info!("Settings saved, API {}", self.api_status().label());
        config::save_settings(self.store.storage(), &self.settings)
    }

    pub fn reset_settings(&mut self) -> Result<(), StorageError> {
        self.settings = Settings::default();
        log::info!("Settings reset to defaults");
        config::save_settings(self.store.storage(), &self.settings)
    }

    pub fn api_status(&self) -> ApiStatus {
        ApiStatus::of(&self.settings)
    }

    // ========================================================================
    // Speech
    // ========================================================================

    /// Start listening, or stop when already listening
    pub fn toggle_microphone<R: SpeechRecognizer + ?Sized>(&mut self, recognizer: &R) {
        if !recognizer.is_supported() {
            self.notify(speech::RECOGNITION_UNSUPPORTED_NOTICE);
            return;
        }

        if self.listening {
            log::debug!("Stopping voice recognition");
            recognizer.stop();
        } else if let Err(e) = recognizer.start() {
            log::error!("Error starting voice recognition: {}", e);
            self.notify(e.notice());
        } else {
            log::debug!("Starting voice recognition");
        }
    }

    pub fn on_recognition(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => self.listening = true,
            RecognitionEvent::Transcript(text) => {
                log::debug!("Voice recognition result: {}", text);
                self.transcript = Some(text);
            }
            RecognitionEvent::Failed(e) => {
                log::error!("Voice recognition error: {:?}", e);
                self.listening = false;
                self.notify(&e.notice());
            }
            RecognitionEvent::Ended => self.listening = false,
        }
    }

    /// Recognized text to place in the message input, once
    pub fn take_transcript(&mut self) -> Option<String> {
        self.transcript.take()
    }

    /// Read the latest assistant reply aloud, or the welcome text
    pub fn toggle_audio<T: SpeechSynthesizer + ?Sized>(&mut self, synth: &T) -> SpeakOutcome {
        let text = self
            .store
            .last_assistant_reply()
            .unwrap_or_else(|| WELCOME_SPEECH.to_string());
        self.speak_text(synth, &text)
    }

    /// Read turn `index` of the current conversation aloud
    pub fn speak_turn<T: SpeechSynthesizer + ?Sized>(
        &mut self,
        synth: &T,
        index: usize,
    ) -> SpeakOutcome {
        let text = self
            .store
            .current()
            .and_then(|conversation| conversation.turns().get(index))
            .map(|turn| view::speakable_text(&turn.content))
            .unwrap_or_default();
        self.speak_text(synth, &text)
    }

    pub fn speak_text<T: SpeechSynthesizer + ?Sized>(
        &mut self,
        synth: &T,
        text: &str,
    ) -> SpeakOutcome {
        let outcome = speech::speak_toggle(synth, text);
        match outcome {
            SpeakOutcome::Stopped => self.speaking = false,
            SpeakOutcome::Unsupported => self.notify(speech::SYNTHESIS_UNSUPPORTED_NOTICE),
            SpeakOutcome::Started | SpeakOutcome::NothingToSay => {}
        }
        outcome
    }

    pub fn on_speech_state(&mut self, event: SynthesisEvent) {
        match event {
            SynthesisEvent::Started => self.speaking = true,
            SynthesisEvent::Ended => self.speaking = false,
            SynthesisEvent::Failed(error) => {
                log::error!("Speech error: {}", error);
                self.speaking = false;
            }
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub fn switch_tab(&mut self, tab: &str) {
        log::debug!("Switched to {} tab", tab);
        self.active_tab = tab.to_string();
    }

    pub fn select_nav(&mut self, item: &str) {
        log::debug!("Navigation to: {}", item);
        self.active_nav = Some(item.to_string());
    }

    /// Back to the welcome screen; the next message starts a conversation
    pub fn new_chat(&mut self) {
        self.store.clear_selection();
    }

    pub fn select_conversation(&mut self, id: &str) -> bool {
        self.store.select_conversation(id)
    }

    pub fn delete_conversation(&mut self, id: &str) -> bool {
        self.store.delete_conversation(id).is_some()
    }

    /// Periodic and visibility-loss save
    pub fn autosave(&self) {
        let _ = self.store.persist();
    }

    // ========================================================================
    // Notices and rendering
    // ========================================================================

    fn notify(&mut self, message: &str) {
        log::warn!("{}", message);
        self.notice = Some(message.to_string());
    }

    /// Message the host should show the user, once
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    pub fn view(&self, ctx: &RenderContext) -> AppView {
        let session = self.store.session();
        let log = session.current().map(|conversation| {
            let typing = self.pending.as_deref() == Some(conversation.id());
            view::message_log(conversation, typing, ctx)
        });

        AppView {
            conversations: view::conversation_list(session, ctx),
            log,
            mic: view::mic_button(self.listening),
            audio: view::audio_button(self.speaking),
            api_status: self.api_status(),
            active_tab: self.active_tab.clone(),
            active_nav: self.active_nav.clone(),
            busy: self.is_busy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::speech::testing::{RecordingRecognizer, RecordingSynthesizer};
    use crate::speech::{RecognitionError, UnsupportedRecognizer};
    use crate::storage::MemoryStore;
    use crate::store::load_session;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use flowchat_types::RequestShape;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    type TestApp = ChatApp<Rc<MemoryStore>, Rc<ManualClock>>;

    fn app() -> TestApp {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        ChatApp::open(Rc::new(MemoryStore::new()), Rc::new(ManualClock::new(start)))
    }

    fn ctx() -> RenderContext {
        RenderContext::utc(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap())
    }

    /// Client answering every request with a fixed result
    struct ScriptedClient {
        reply: Result<String, CompletionError>,
        seen: RefCell<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn failing(error: CompletionError) -> Self {
            Self {
                reply: Err(error),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    #[async_trait(?Send)]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
            self.seen.borrow_mut().push(request.clone());
            self.reply.clone()
        }
    }

    #[tokio::test]
    async fn test_send_starts_conversation_and_records_reply() {
        let mut app = app();
        let client = ScriptedClient::ok("Hi there");

        app.send("  Hello  ", &client).await.unwrap();

        let conversation = app.store().current().unwrap();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.turns()[0].content, "Hello");
        assert_eq!(conversation.turns()[1].content, "Hi there");
        assert!(!app.is_busy());

        let persisted = load_session(app.store().storage());
        assert_eq!(&persisted, app.store().session());
        assert_eq!(
            client.seen.borrow()[0].url,
            "http://127.0.0.1:8000/assistant/Hello"
        );
    }

    #[test]
    fn test_empty_message_is_rejected() {
        let mut app = app();
        assert_eq!(app.submit("   ").unwrap_err(), SubmitError::Empty);
        assert!(app.store().session().is_empty());
    }

    #[test]
    fn test_second_submit_while_pending_is_busy() {
        let mut app = app();
        let pending = app.submit("first").unwrap();
        assert!(app.is_busy());
        assert_eq!(app.submit("second").unwrap_err(), SubmitError::Busy);

        let view = app.view(&ctx());
        assert!(view.log.unwrap().typing);

        app.settle(pending, Ok("done".into()));
        assert!(!app.is_busy());
        assert!(app.submit("second").is_ok());
    }

    #[tokio::test]
    async fn test_failure_becomes_error_turn() {
        let mut app = app();
        let client = ScriptedClient::failing(CompletionError::Status {
            code: 500,
            text: "Internal Server Error".into(),
        });

        app.send("Hello", &client).await.unwrap();

        assert!(!app.is_busy());
        assert!(!app.view(&ctx()).log.unwrap().typing);
        let last = app.store().current().unwrap().last_turn().unwrap().clone();
        assert!(last.is_error);
        assert_eq!(
            last.content,
            "I apologize, but I encountered an error: API request failed: 500 Internal Server Error. Please check your API settings and try again."
        );
    }

    #[tokio::test]
    async fn test_unconfigured_json_body_fails_without_request() {
        let mut app = app();
        app.settings.request_shape = RequestShape::JsonBody;
        let client = ScriptedClient::ok("unused");

        app.send("Hello", &client).await.unwrap();

        assert!(client.seen.borrow().is_empty());
        assert!(!app.view(&ctx()).log.unwrap().typing);
        let last = app.store().current().unwrap().last_turn().unwrap();
        assert!(last.is_error);
        assert!(last.content.contains("API endpoint not configured"));
    }

    #[test]
    fn test_delete_asks_before_removing() {
        assert_eq!(
            DELETE_CONFIRMATION,
            "Are you sure you want to delete this chat? This action cannot be undone."
        );

        let mut app = app();
        let pending = app.submit("Hello").unwrap();
        let id = pending.conversation_id().to_string();
        app.settle(pending, Ok("Hi".into()));

        // Declining leaves the conversation alone; the host only calls
        // delete after the user agrees.
        assert!(app.store().get(&id).is_some());
        assert!(app.delete_conversation(&id));
        assert!(app.store().get(&id).is_none());
    }

    #[test]
    fn test_reply_for_deleted_conversation_is_dropped() {
        let mut app = app();
        let pending = app.submit("Hello").unwrap();
        let id = pending.conversation_id().to_string();
        assert!(app.delete_conversation(&id));

        app.settle(pending, Ok("late".into()));
        assert!(app.store().session().is_empty());
        assert!(!app.is_busy());
    }

    #[test]
    fn test_reply_lands_in_submitting_conversation_after_switch() {
        let mut app = app();
        let first = app.submit("first").unwrap();
        let first_id = first.conversation_id().to_string();
        app.settle(first, Ok("one".into()));

        let pending = app.submit("again").unwrap();
        app.new_chat();
        app.settle(pending, Ok("two".into()));

        assert!(app.store().current().is_none());
        let conversation = app.store().get(&first_id).unwrap();
        assert_eq!(conversation.last_turn().unwrap().content, "two");
    }

    #[test]
    fn test_settings_save_and_reset() {
        let mut app = app();
        assert_eq!(app.api_status(), ApiStatus::NotConfigured);

        let form = SettingsForm {
            api_url: " http://localhost:8000/assistant ".into(),
            max_tokens: "abc".into(),
            ..SettingsForm::default()
        };
        app.save_settings(&form).unwrap();
        assert_eq!(app.api_status(), ApiStatus::Ready);
        assert_eq!(app.settings().max_tokens, 1000);
        assert_eq!(config::load_settings(app.store().storage()), *app.settings());

        app.reset_settings().unwrap();
        assert_eq!(*app.settings(), Settings::default());
    }

    #[test]
    fn test_microphone_flow() {
        let mut app = app();
        let recognizer = RecordingRecognizer::default();

        app.toggle_microphone(&recognizer);
        assert_eq!(recognizer.started.get(), 1);
        app.on_recognition(RecognitionEvent::Started);
        assert!(app.view(&ctx()).mic.active);

        app.on_recognition(RecognitionEvent::Transcript("play a video".into()));
        app.toggle_microphone(&recognizer);
        assert_eq!(recognizer.stopped.get(), 1);
        app.on_recognition(RecognitionEvent::Ended);

        assert_eq!(app.take_transcript().as_deref(), Some("play a video"));
        assert_eq!(app.take_transcript(), None);
        assert!(!app.view(&ctx()).mic.active);
    }

    #[test]
    fn test_microphone_notices() {
        let mut app = app();
        app.toggle_microphone(&UnsupportedRecognizer);
        assert_eq!(
            app.take_notice().as_deref(),
            Some(speech::RECOGNITION_UNSUPPORTED_NOTICE)
        );

        let broken = RecordingRecognizer {
            fail_start: true,
            ..Default::default()
        };
        app.toggle_microphone(&broken);
        assert_eq!(
            app.take_notice().as_deref(),
            Some(speech::RECOGNITION_START_NOTICE)
        );

        app.on_recognition(RecognitionEvent::Failed(RecognitionError::NoSpeech));
        assert_eq!(
            app.take_notice().as_deref(),
            Some("No speech detected. Please try again.")
        );
    }

    #[test]
    fn test_audio_reads_last_reply_or_welcome() {
        let mut app = app();
        let synth = RecordingSynthesizer::default();

        assert_eq!(app.toggle_audio(&synth), SpeakOutcome::Started);
        assert_eq!(synth.spoken.borrow()[0].text, WELCOME_SPEECH);

        // Toggling while speaking only stops.
        assert_eq!(app.toggle_audio(&synth), SpeakOutcome::Stopped);
        assert_eq!(synth.spoken.borrow().len(), 1);

        let pending = app.submit("Hello").unwrap();
        app.settle(pending, Ok("**Sure**, done".into()));
        assert_eq!(app.toggle_audio(&synth), SpeakOutcome::Started);
        assert_eq!(synth.spoken.borrow()[1].text, "Sure, done");
    }

    #[test]
    fn test_speak_turn_and_speech_state() {
        let mut app = app();
        let synth = RecordingSynthesizer::default();
        let pending = app.submit("Hello").unwrap();
        app.settle(pending, Ok("Hi there".into()));

        assert_eq!(app.speak_turn(&synth, 1), SpeakOutcome::Started);
        app.on_speech_state(SynthesisEvent::Started);
        assert!(app.view(&ctx()).audio.active);
        app.on_speech_state(SynthesisEvent::Ended);
        assert!(!app.view(&ctx()).audio.active);

        synth.speaking.set(false);
        assert_eq!(app.speak_turn(&synth, 9), SpeakOutcome::NothingToSay);
    }

    #[test]
    fn test_navigation_and_view() {
        let mut app = app();
        let pending = app.submit("Hello").unwrap();
        app.settle(pending, Ok("Hi there".into()));

        app.switch_tab("work");
        app.select_nav("Conversations");
        let view = app.view(&ctx());
        assert_eq!(view.active_tab, "work");
        assert_eq!(view.active_nav.as_deref(), Some("Conversations"));
        assert_eq!(view.conversations.items[0].preview, "Copilot: Hi there");
        assert!(view.log.is_some());

        app.new_chat();
        assert!(app.view(&ctx()).log.is_none());
        app.autosave();
        assert_eq!(
            load_session(app.store().storage()).current_id(),
            None
        );
    }
}
