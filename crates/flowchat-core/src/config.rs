//! Client settings persistence
//!
//! Settings live under their own storage key with an independent lifecycle
//! from the session. Persisted fields overlay the defaults; unreadable
//! settings fall back to defaults.

use flowchat_types::{RequestShape, Settings, DEFAULT_MAX_TOKENS, SETTINGS_KEY};

use crate::storage::{self, KeyValueStore, StorageError};

/// Load settings from storage, falling back to defaults
pub fn load_settings<S: KeyValueStore + ?Sized>(storage: &S) -> Settings {
    let raw = match storage.get(SETTINGS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Settings::default(),
        Err(e) => {
            log::warn!("Could not read settings, using defaults: {}", e);
            return Settings::default();
        }
    };

    match Settings::from_json(&raw) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Discarding malformed settings: {}", e);
            Settings::default()
        }
    }
}

pub fn save_settings<S: KeyValueStore + ?Sized>(
    storage: &S,
    settings: &Settings,
) -> Result<(), StorageError> {
    storage::write_json(storage, SETTINGS_KEY, settings)
}

/// Raw values from the settings form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsForm {
    pub api_url: String,
    pub api_key: String,
    pub max_tokens: String,
    pub request_shape: Option<String>,
}

impl SettingsForm {
    /// Form pre-filled from current settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            api_url: settings.api_url.clone(),
            api_key: settings.api_key.clone(),
            max_tokens: settings.max_tokens.to_string(),
            request_shape: Some(request_shape_name(settings.request_shape).to_string()),
        }
    }

    /// Trim text fields; an unparsable or zero limit becomes the default.
    ///
    /// The whole limit must be a positive integer, so `"12abc"` and `"-5"`
    /// also fall back rather than keeping a leading number.
    pub fn parse(&self, current: &Settings) -> Settings {
        let max_tokens = self
            .max_tokens
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let request_shape = self
            .request_shape
            .as_deref()
            .and_then(parse_request_shape)
            .unwrap_or(current.request_shape);

        Settings {
            api_url: self.api_url.trim().to_string(),
            api_key: self.api_key.trim().to_string(),
            max_tokens,
            request_shape,
        }
    }
}

pub fn request_shape_name(shape: RequestShape) -> &'static str {
    match shape {
        RequestShape::Path => "path",
        RequestShape::JsonBody => "jsonBody",
    }
}

pub fn parse_request_shape(s: &str) -> Option<RequestShape> {
    match s.trim().to_lowercase().as_str() {
        "path" | "get" => Some(RequestShape::Path),
        "jsonbody" | "json" | "post" => Some(RequestShape::JsonBody),
        _ => None,
    }
}

/// Endpoint status shown next to the settings button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStatus {
    Ready,
    NotConfigured,
}

impl ApiStatus {
    pub fn of(settings: &Settings) -> Self {
        if settings.is_configured() {
            ApiStatus::Ready
        } else {
            ApiStatus::NotConfigured
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ApiStatus::Ready => "Ready",
            ApiStatus::NotConfigured => "Not configured",
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ApiStatus::Ready => "api-status connected",
            ApiStatus::NotConfigured => "api-status error",
        }
    }
}
