use crate::core::config::data::Config;
use crate::core::controller::{ConversationMode, VerificationPolicy};

impl Config {
    /// Renders the effective configuration, defaults filled in.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = vec![
            format!("  base-url: {}", self.base_url()),
            format!("  chat-path: {}", self.chat_path()),
            format!("  model: {}", self.model()),
            format!("  developer-message: {}", self.developer_message()),
        ];
        lines.push(match self.mode.unwrap_or_default() {
            ConversationMode::Chat => "  mode: chat".to_string(),
            ConversationMode::SingleTurn => "  mode: single-turn".to_string(),
        });
        lines.push(match self.verification.unwrap_or_default() {
            VerificationPolicy::Required => "  verification: required".to_string(),
            VerificationPolicy::Implicit => "  verification: implicit".to_string(),
        });
        match self.reveal.unwrap_or(false) {
            true => lines.push(format!(
                "  reveal: on ({} ms per character)",
                self.reveal_delay().as_millis()
            )),
            false => lines.push("  reveal: off".to_string()),
        }
        lines.push(format!(
            "  verify-timeout: {} ms",
            self.verify_timeout().as_millis()
        ));
        lines.push(format!("  fallback-message: {}", self.fallback_message()));
        match self.ambient_settings() {
            Some(ambient) => lines.push(format!(
                "  ambient: keep last {}, prune after {} ms",
                ambient.keep_last,
                ambient.prune_delay.as_millis()
            )),
            None => lines.push("  ambient: off".to_string()),
        }
        lines
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        for line in self.describe() {
            println!("{line}");
        }
    }
}
