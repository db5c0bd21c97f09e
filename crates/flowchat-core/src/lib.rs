//! # flowchat-core
//!
//! Platform-independent core of the flowchat client:
//!
//! - **Session Store**: conversations and the current selection, synchronized
//!   with a string-valued key-value store
//! - **View Renderer**: pure functions from state to view models and markup
//! - **Completion Client**: request building and response interpretation for
//!   the remote assistant endpoint
//! - **Speech**: narrow contracts for speech-to-text and text-to-speech
//!   capabilities, with unsupported fallbacks
//! - **ChatApp**: the application state value tying the pieces together
//!
//! Browser bindings live in `flowchat-wasm`; everything here runs natively
//! and is tested without a browser.
//!
//! ## Example
//!
//! ```rust,no_run
//! use flowchat_core::{ChatApp, MemoryStore, SystemClock};
//! use flowchat_core::completion::HttpCompletionClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = ChatApp::open(MemoryStore::new(), SystemClock);
//!     let client = HttpCompletionClient::new();
//!
//!     if let Err(e) = app.send("Hello", &client).await {
//!         eprintln!("message not sent: {}", e);
//!     }
//!
//!     let conversation = app.store().session().current().unwrap();
//!     println!("{} turns", conversation.len());
//! }
//! ```

pub mod app;
pub mod clock;
pub mod completion;
pub mod config;
pub mod speech;
pub mod storage;
pub mod store;
pub mod view;

// Re-export commonly used types
pub use app::{AppView, ChatApp, PendingCompletion, SubmitError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use completion::{CompletionClient, CompletionError, CompletionRequest};
pub use config::{ApiStatus, SettingsForm};
pub use speech::{SpeakOutcome, SpeechRecognizer, SpeechSynthesizer};
pub use storage::{KeyValueStore, MemoryStore, StorageError};
pub use store::SessionStore;
pub use view::RenderContext;

pub use flowchat_types::{Conversation, RequestShape, Role, Session, Settings, Turn};
