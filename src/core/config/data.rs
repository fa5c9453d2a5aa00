use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::endpoint::DEFAULT_CHAT_PATH;
use crate::api::{DEFAULT_DEVELOPER_MESSAGE, DEFAULT_MODEL};
use crate::core::accumulator::DEFAULT_REVEAL_DELAY;
use crate::core::controller::{
    AmbientSettings, ControllerSettings, ConversationMode, VerificationPolicy,
    DEFAULT_FALLBACK_MESSAGE,
};
use crate::core::verifier::DEFAULT_VERIFY_TIMEOUT;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_KEEP_LAST: usize = 6;
pub const DEFAULT_PRUNE_DELAY: Duration = Duration::from_secs(30);

pub const API_KEY_ENV: &str = "DRIFTCHAT_API_KEY";
pub const BASE_URL_ENV: &str = "DRIFTCHAT_BASE_URL";

/// Housekeeping for kiosk-style displays. Present in the file means enabled.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct AmbientConfig {
    /// Number of newest messages that stay on screen
    pub keep_last: Option<usize>,
    /// How long faded messages linger before they are removed
    pub prune_delay_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Root of the completion service, e.g. "http://localhost:8000"
    pub base_url: Option<String>,
    /// Path of the chat endpoint relative to `base_url`
    pub chat_path: Option<String>,
    pub model: Option<String>,
    /// Instructions sent ahead of every user message
    pub developer_message: Option<String>,
    pub mode: Option<ConversationMode>,
    pub verification: Option<VerificationPolicy>,
    /// Replay finished replies at a steady per-character pace
    pub reveal: Option<bool>,
    pub reveal_delay_ms: Option<u64>,
    pub verify_timeout_ms: Option<u64>,
    /// Shown in place of a reply when an exchange fails
    pub fallback_message: Option<String>,
    pub ambient: Option<AmbientConfig>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn chat_path(&self) -> &str {
        self.chat_path.as_deref().unwrap_or(DEFAULT_CHAT_PATH)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn developer_message(&self) -> &str {
        self.developer_message
            .as_deref()
            .unwrap_or(DEFAULT_DEVELOPER_MESSAGE)
    }

    pub fn fallback_message(&self) -> &str {
        self.fallback_message
            .as_deref()
            .unwrap_or(DEFAULT_FALLBACK_MESSAGE)
    }

    pub fn reveal_delay(&self) -> Duration {
        self.reveal_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REVEAL_DELAY)
    }

    pub fn verify_timeout(&self) -> Duration {
        self.verify_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_VERIFY_TIMEOUT)
    }

    pub fn ambient_settings(&self) -> Option<AmbientSettings> {
        self.ambient.as_ref().map(|ambient| AmbientSettings {
            keep_last: ambient.keep_last.unwrap_or(DEFAULT_KEEP_LAST),
            prune_delay: ambient
                .prune_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_PRUNE_DELAY),
        })
    }

    /// Overrides file values with environment variables. `lookup` is
    /// `std::env::var(..).ok()` outside of tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|value| !value.trim().is_empty()) {
            self.base_url = Some(base_url);
        }
    }

    pub fn to_settings(&self) -> ControllerSettings {
        ControllerSettings {
            model: self.model().to_string(),
            developer_message: self.developer_message().to_string(),
            mode: self.mode.unwrap_or_default(),
            verification: self.verification.unwrap_or_default(),
            reveal: self.reveal.unwrap_or(false),
            reveal_delay: self.reveal_delay(),
            fallback_message: self.fallback_message().to_string(),
            ambient: self.ambient_settings(),
        }
    }
}
