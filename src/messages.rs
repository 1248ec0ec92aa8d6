//! User-visible strings written into log and terminal views.
//!
//! Defaults are English. A config file may replace any of them and may map
//! server close reasons to translated text.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Localizable message table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    /// Written when a log stream starts connecting.
    pub log_connecting: String,
    /// Written when a log stream opens.
    pub log_connected: String,
    /// Written when a log stream closes.
    pub log_disconnected: String,
    /// Written when a log stream reports a transport error.
    pub log_unexpected_close: String,
    /// Written (then the socket closed) when a non-binary message arrives.
    pub invalid_data: String,
    /// Written before a fresh terminal socket is opened.
    pub term_connecting: String,
    /// Written when the terminal socket closes.
    pub term_closed: String,
    /// Written when a parked terminal socket turned out to be dead.
    pub term_resume_failed: String,
    /// Shown when the terminal is mounted with nobody signed in.
    pub refresh_page: String,
    /// Close reason (as sent by the server) to display text.
    pub translations: HashMap<String, String>,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            log_connecting: "Connecting to log stream....".to_string(),
            log_connected: "Connected to log stream.".to_string(),
            log_disconnected: "Disconnected from log stream.".to_string(),
            log_unexpected_close: "unexpected socket close".to_string(),
            invalid_data: "Invalid data type received.\r\n".to_string(),
            term_connecting: "Connecting to xterm server...\r\n".to_string(),
            term_closed: "Connection closed.\r\n".to_string(),
            term_resume_failed: "Resume session failed...\r\n".to_string(),
            refresh_page: "Please Refresh Page.".to_string(),
            translations: HashMap::new(),
        }
    }
}

impl Messages {
    /// Display text for a server close reason. Unknown reasons pass through.
    pub fn translate<'a>(&'a self, reason: &'a str) -> &'a str {
        self.translations.get(reason).map_or(reason, String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_falls_back_to_reason() {
        let mut messages = Messages::default();
        messages
            .translations
            .insert("session expired".into(), "Sitzung abgelaufen".into());
        assert_eq!(messages.translate("session expired"), "Sitzung abgelaufen");
        assert_eq!(messages.translate("kicked"), "kicked");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let messages: Messages =
            serde_json::from_str(r#"{"term_closed":"Bye.\r\n"}"#).expect("valid json");
        assert_eq!(messages.term_closed, "Bye.\r\n");
        assert_eq!(messages.log_connected, "Connected to log stream.");
    }
}
