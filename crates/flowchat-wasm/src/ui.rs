//! Page wiring
//!
//! Every handler mutates the shared [`ChatApp`] and then redraws the page
//! regions from [`ChatApp::view`]. Platform speech callbacks are deferred to
//! the next task so they never run while a handler holds the app.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::Utc;
use gloo_timers::callback::Interval;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::spawn_local;
use web_sys::{Document, Element, HtmlInputElement, KeyboardEvent};

use flowchat_core::app::{DELETE_CONFIRMATION, RESET_CONFIRMATION};
use flowchat_core::speech::{UnsupportedRecognizer, UnsupportedSynthesizer};
use flowchat_core::view::{markup, ButtonView};
use flowchat_core::{
    ChatApp, RenderContext, SettingsForm, SpeechRecognizer, SpeechSynthesizer, SubmitError,
    SystemClock,
};

use crate::dom;
use crate::fetch::FetchCompletionClient;
use crate::speech::{WebSpeechRecognizer, WebSpeechSynthesizer};
use crate::storage::LocalStorage;

/// Periodic save interval
const AUTOSAVE_INTERVAL_MS: u32 = 30_000;

type App = ChatApp<LocalStorage, SystemClock>;

#[derive(Clone)]
pub struct ChatUi {
    document: Document,
    app: Rc<RefCell<App>>,
    recognizer: Rc<dyn SpeechRecognizer>,
    synthesizer: Rc<dyn SpeechSynthesizer>,
    client: FetchCompletionClient,
}

impl ChatUi {
    pub fn new() -> Result<Self, JsValue> {
        let document = crate::document()?;
        let storage = LocalStorage::open().map_err(|e| JsValue::from_str(&e.to_string()))?;
        let app = Rc::new(RefCell::new(ChatApp::open(storage, SystemClock)));

        let recognizer: Rc<dyn SpeechRecognizer> = {
            let app = app.clone();
            let document = document.clone();
            match WebSpeechRecognizer::new(move |event| {
                let app = app.clone();
                let document = document.clone();
                spawn_local(async move {
                    app.borrow_mut().on_recognition(event);
                    redraw(&document, &app);
                });
            })? {
                Some(recognizer) => Rc::new(recognizer),
                None => Rc::new(UnsupportedRecognizer),
            }
        };

        let synthesizer: Rc<dyn SpeechSynthesizer> = {
            let app = app.clone();
            let document = document.clone();
            match WebSpeechSynthesizer::new(move |event| {
                let app = app.clone();
                let document = document.clone();
                spawn_local(async move {
                    app.borrow_mut().on_speech_state(event);
                    redraw(&document, &app);
                });
            })? {
                Some(synthesizer) => Rc::new(synthesizer),
                None => Rc::new(UnsupportedSynthesizer),
            }
        };

        Ok(Self {
            document,
            app,
            recognizer,
            synthesizer,
            client: FetchCompletionClient,
        })
    }

    pub fn start(self) -> Result<(), JsValue> {
        self.bind_message_input()?;
        self.bind_sidebar()?;
        self.bind_chat_region()?;
        self.bind_speech_buttons()?;
        self.bind_tabs()?;
        self.bind_settings()?;
        self.start_autosave()?;
        render(&self.document, &self.app)
    }

    fn redraw(&self) {
        redraw(&self.document, &self.app);
    }

    fn bind_message_input(&self) -> Result<(), JsValue> {
        let input = dom::get_input_by_id(&self.document, "messageInput")?;
        let ui = self.clone();
        let target = input.clone();

        dom::add_listener(&input, "keydown", move |event| {
            let is_enter = event
                .dyn_ref::<KeyboardEvent>()
                .map(|key| key.key() == "Enter")
                .unwrap_or(false);
            if is_enter {
                event.prevent_default();
                ui.send(&target);
            }
        })
    }

    fn send(&self, input: &HtmlInputElement) {
        let text = input.value();
        let pending = match self.app.borrow_mut().submit(&text) {
            Ok(pending) => pending,
            Err(SubmitError::Empty) => return,
            Err(e) => {
                log::warn!("Message not sent: {}", e);
                return;
            }
        };
        input.set_value("");
        self.redraw();

        let ui = self.clone();
        spawn_local(async move {
            let result = pending.dispatch(&ui.client).await;
            ui.app.borrow_mut().settle(pending, result);
            ui.redraw();
        });
    }

    fn bind_sidebar(&self) -> Result<(), JsValue> {
        let new_chat = dom::get_element_by_id(&self.document, "newChatBtn")?;
        let ui = self.clone();
        dom::add_click_listener(&new_chat, move |_| {
            ui.app.borrow_mut().new_chat();
            ui.redraw();
        })?;

        let list = dom::get_element_by_id(&self.document, "conversationsList")?;
        let ui = self.clone();
        dom::add_click_listener(&list, move |event| {
            if let Some((_, id)) = dom::closest_with_attribute(&event, "data-delete-id") {
                event.stop_propagation();
                if !confirm(DELETE_CONFIRMATION) {
                    return;
                }
                ui.app.borrow_mut().delete_conversation(&id);
            } else if let Some((_, id)) = dom::closest_with_attribute(&event, "data-chat-id") {
                ui.app.borrow_mut().select_conversation(&id);
            } else {
                return;
            }
            ui.redraw();
        })?;

        for item in dom::query_all(&self.document, ".nav-item")? {
            let label = nav_label(&item);
            let ui = self.clone();
            dom::add_click_listener(&item, move |_| {
                ui.app.borrow_mut().select_nav(&label);
                ui.redraw();
            })?;
        }

        Ok(())
    }

    fn bind_chat_region(&self) -> Result<(), JsValue> {
        let region = dom::get_element_by_id(&self.document, "chatRegion")?;
        let ui = self.clone();

        dom::add_click_listener(&region, move |event| {
            let Some((_, index)) = dom::closest_with_attribute(&event, "data-speak-index") else {
                return;
            };
            let Ok(index) = index.parse::<usize>() else {
                log::warn!("Bad speak index: {}", index);
                return;
            };
            ui.app.borrow_mut().speak_turn(&*ui.synthesizer, index);
            ui.redraw();
        })
    }

    fn bind_speech_buttons(&self) -> Result<(), JsValue> {
        let mic = dom::get_element_by_id(&self.document, "micBtn")?;
        let ui = self.clone();
        dom::add_click_listener(&mic, move |_| {
            ui.app.borrow_mut().toggle_microphone(&*ui.recognizer);
            ui.redraw();
        })?;

        let audio = dom::get_element_by_id(&self.document, "audioBtn")?;
        let ui = self.clone();
        dom::add_click_listener(&audio, move |_| {
            ui.app.borrow_mut().toggle_audio(&*ui.synthesizer);
            ui.redraw();
        })
    }

    fn bind_tabs(&self) -> Result<(), JsValue> {
        for tab in dom::query_all(&self.document, ".tab-btn")? {
            let Some(name) = tab.get_attribute("data-tab") else {
                continue;
            };
            let ui = self.clone();
            dom::add_click_listener(&tab, move |_| {
                ui.app.borrow_mut().switch_tab(&name);
                ui.redraw();
            })?;
        }
        Ok(())
    }

    fn bind_settings(&self) -> Result<(), JsValue> {
        let open = dom::get_element_by_id(&self.document, "settingsBtn")?;
        let ui = self.clone();
        dom::add_click_listener(&open, move |_| {
            if let Err(e) = ui.open_settings() {
                log::error!("Failed to open settings: {:?}", e);
            }
        })?;

        let save = dom::get_element_by_id(&self.document, "saveSettingsBtn")?;
        let ui = self.clone();
        dom::add_click_listener(&save, move |_| {
            if let Err(e) = ui.save_settings() {
                log::error!("Failed to save settings: {:?}", e);
            }
        })?;

        let reset = dom::get_element_by_id(&self.document, "resetSettingsBtn")?;
        let ui = self.clone();
        dom::add_click_listener(&reset, move |_| {
            if let Err(e) = ui.reset_settings() {
                log::error!("Failed to reset settings: {:?}", e);
            }
        })?;

        let close = dom::get_element_by_id(&self.document, "closeSettingsBtn")?;
        let ui = self.clone();
        dom::add_click_listener(&close, move |_| ui.close_settings())?;

        // Clicking the overlay outside the dialog closes it.
        let modal = dom::get_element_by_id(&self.document, "settingsModal")?;
        let ui = self.clone();
        dom::add_click_listener(&modal, move |event| {
            let on_overlay = event
                .target()
                .and_then(|target| target.dyn_into::<Element>().ok())
                .map(|element| element.id() == "settingsModal")
                .unwrap_or(false);
            if on_overlay {
                ui.close_settings();
            }
        })
    }

    fn fill_settings_form(&self, form: &SettingsForm) -> Result<(), JsValue> {
        dom::get_input_by_id(&self.document, "apiUrl")?.set_value(&form.api_url);
        dom::get_input_by_id(&self.document, "apiKey")?.set_value(&form.api_key);
        dom::get_input_by_id(&self.document, "maxTokens")?.set_value(&form.max_tokens);
        if let (Some(select), Some(shape)) = (
            dom::find_select_by_id(&self.document, "requestShape"),
            form.request_shape.as_deref(),
        ) {
            select.set_value(shape);
        }
        Ok(())
    }

    fn open_settings(&self) -> Result<(), JsValue> {
        let form = self.app.borrow().settings_form();
        self.fill_settings_form(&form)?;
        let modal = dom::get_element_by_id(&self.document, "settingsModal")?;
        dom::set_class(&modal, "active", true);
        Ok(())
    }

    fn close_settings(&self) {
        if let Some(modal) = self.document.get_element_by_id("settingsModal") {
            dom::set_class(&modal, "active", false);
        }
    }

    fn save_settings(&self) -> Result<(), JsValue> {
        let form = SettingsForm {
            api_url: dom::get_input_by_id(&self.document, "apiUrl")?.value(),
            api_key: dom::get_input_by_id(&self.document, "apiKey")?.value(),
            max_tokens: dom::get_input_by_id(&self.document, "maxTokens")?.value(),
            request_shape: dom::find_select_by_id(&self.document, "requestShape")
                .map(|select| select.value()),
        };

        let saved = self.app.borrow_mut().save_settings(&form);
        if let Err(e) = saved {
            crate::window()?.alert_with_message(&format!("Settings were not saved: {}", e))?;
        }
        self.close_settings();
        self.redraw();
        Ok(())
    }

    fn reset_settings(&self) -> Result<(), JsValue> {
        if !confirm(RESET_CONFIRMATION) {
            return Ok(());
        }

        let reset = self.app.borrow_mut().reset_settings();
        if let Err(e) = reset {
            log::error!("Failed to persist reset settings: {}", e);
        }
        let form = self.app.borrow().settings_form();
        self.fill_settings_form(&form)?;
        self.redraw();
        Ok(())
    }

    fn start_autosave(&self) -> Result<(), JsValue> {
        let app = self.app.clone();
        Interval::new(AUTOSAVE_INTERVAL_MS, move || {
            if let Ok(app) = app.try_borrow() {
                app.autosave();
            }
        })
        .forget();

        let app = self.app.clone();
        let document = self.document.clone();
        dom::add_listener(&self.document, "visibilitychange", move |_| {
            if document.hidden() {
                log::debug!("Page hidden, saving");
                app.borrow().autosave();
            }
        })
    }
}

/// Ask the user; a dialog that cannot be shown counts as "no"
fn confirm(message: &str) -> bool {
    match crate::window().and_then(|window| window.confirm_with_message(message)) {
        Ok(answer) => answer,
        Err(e) => {
            log::error!("Confirmation dialog failed: {:?}", e);
            false
        }
    }
}

fn nav_label(item: &Element) -> String {
    item.query_selector("span")
        .ok()
        .flatten()
        .and_then(|span| span.text_content())
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn redraw(document: &Document, app: &RefCell<App>) {
    if let Err(e) = render(document, app) {
        log::error!("Render failed: {:?}", e);
    }
}

fn render_button(document: &Document, id: &str, button: &ButtonView) -> Result<(), JsValue> {
    let element = dom::get_element_by_id(document, id)?;
    dom::set_class(&element, button.active_class, button.active);
    element.set_attribute("title", button.title)?;
    element.set_inner_html(&markup::button_icon_html(button));
    Ok(())
}

fn render(document: &Document, app: &RefCell<App>) -> Result<(), JsValue> {
    let (transcript, notice) = {
        let mut app = app.borrow_mut();
        (app.take_transcript(), app.take_notice())
    };

    let view = app.borrow().view(&RenderContext::local(Utc::now()));

    let list = dom::get_element_by_id(document, "conversationsList")?;
    list.set_inner_html(&markup::conversation_list_html(&view.conversations));

    let region = dom::get_element_by_id(document, "chatRegion")?;
    match &view.log {
        Some(log) => {
            region.set_inner_html(&markup::message_log_html(log));
            if let Some(messages) = document.get_element_by_id("chatMessages") {
                dom::scroll_to_bottom(&messages);
            }
        }
        None => region.set_inner_html(&markup::welcome_html()),
    }

    render_button(document, "micBtn", &view.mic)?;
    render_button(document, "audioBtn", &view.audio)?;

    let status = dom::get_element_by_id(document, "apiStatus")?;
    status.set_text_content(Some(view.api_status.label()));
    status.set_class_name(view.api_status.class_name());

    for tab in dom::query_all(document, ".tab-btn")? {
        let active = tab.get_attribute("data-tab").as_deref() == Some(view.active_tab.as_str());
        dom::set_class(&tab, "active", active);
    }
    if let Some(active_nav) = &view.active_nav {
        for item in dom::query_all(document, ".nav-item")? {
            dom::set_class(&item, "active", &nav_label(&item) == active_nav);
        }
    }

    if let Some(transcript) = transcript {
        let input = dom::get_input_by_id(document, "messageInput")?;
        input.set_value(&transcript);
        input.focus()?;
    }
    if let Some(notice) = notice {
        crate::window()?.alert_with_message(&notice)?;
    }

    Ok(())
}
