use std::env;
use std::time::Duration;

use crate::registration::autosave::{DEFAULT_DEBOUNCE, DEFAULT_IDLE_TIMEOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Settings read once from the environment at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub port: u16,
    /// GraphQL endpoint; the in-memory backend is used when unset
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub document_store_url: Option<String>,
    pub autosave_debounce: Duration,
    /// Open drafts without edits for this long have their autosave closed
    pub autosave_idle_timeout: Duration,
    pub log_format: LogFormat,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            api_url: None,
            api_token: None,
            document_store_url: None,
            autosave_debounce: DEFAULT_DEBOUNCE,
            autosave_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            log_format: LogFormat::Json,
        }
    }
}

impl PortalConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Unparseable values fall back to the defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            port: non_empty("PORT")
                .and_then(|port| port.parse().ok())
                .unwrap_or(defaults.port),
            api_url: non_empty("PORTAL_API_URL"),
            api_token: non_empty("PORTAL_API_TOKEN"),
            document_store_url: non_empty("DOCUMENT_STORE_URL"),
            autosave_debounce: non_empty("AUTOSAVE_DEBOUNCE_MS")
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.autosave_debounce),
            autosave_idle_timeout: non_empty("AUTOSAVE_IDLE_SECS")
                .and_then(|secs| secs.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.autosave_idle_timeout),
            log_format: match non_empty("LOG_FORMAT").as_deref() {
                Some("pretty") => LogFormat::Pretty,
                _ => LogFormat::Json,
            },
        }
    }
}
