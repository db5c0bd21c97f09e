//! Browser host for flowchat
//!
//! Binds [`flowchat_core::ChatApp`] to the page: `localStorage` for
//! persistence, `fetch` for completions, the Web Speech API for voice input
//! and read-aloud. All state lives in the core crate; this crate only
//! forwards events and redraws.

use wasm_bindgen::prelude::*;
use web_sys::{Document, Window};

mod dom;
mod fetch;
mod speech;
mod storage;
mod ui;

pub use fetch::FetchCompletionClient;
pub use speech::{WebSpeechRecognizer, WebSpeechSynthesizer};
pub use storage::LocalStorage;

/// Initialize the WASM application
/// This sets up panic hooks and logging
#[wasm_bindgen(start)]
pub fn init() {
    // Set panic hook for better error messages
    console_error_panic_hook::set_once();

    // Initialize logging
    wasm_logger::init(wasm_logger::Config::default());

    log::info!("flowchat WASM initialized");
}

/// Load the saved session and wire up the page
#[wasm_bindgen]
pub fn start_app() -> Result<(), JsValue> {
    log::info!("Starting chat app");
    ui::ChatUi::new()?.start()
}

/// Get the window object
fn window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("No window object"))
}

/// Get the document object
fn document() -> Result<Document, JsValue> {
    window()?
        .document()
        .ok_or_else(|| JsValue::from_str("No document object"))
}
