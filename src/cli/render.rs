//! Plain-terminal rendering of conversation state.
//!
//! Terminals can only append, so replies are printed as deltas: whatever
//! became visible since the last change notification.

use std::io::{self, Write};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::controller::{ConversationState, ExchangePhase};
use crate::core::message::Role;

/// Tracks how much of the in-flight reply has been printed. The first output
/// of a reply is preceded by the speaker's name.
#[derive(Debug, Default)]
pub struct ReplyPrinter {
    reveal: bool,
    shown: String,
    started: bool,
}

impl ReplyPrinter {
    pub fn new(reveal: bool) -> Self {
        Self {
            reveal,
            shown: String::new(),
            started: false,
        }
    }

    /// True once any part of the reply has been printed.
    pub fn has_output(&self) -> bool {
        self.started
    }

    /// Text that became visible in `state` since the previous call.
    pub fn advance(&mut self, state: &ConversationState) -> Option<String> {
        let visible = match state.phase {
            ExchangePhase::Streaming if !self.reveal => state.live_text.as_str(),
            ExchangePhase::Revealing => state.revealed_text.as_str(),
            _ => return None,
        };
        self.catch_up(visible)
    }

    /// Whatever is left of the committed reply. Output that does not match
    /// the committed text (a partial reply replaced by the fallback notice)
    /// is ended with a line break first.
    pub fn finish(&mut self, committed: &str) -> Option<String> {
        if committed.starts_with(self.shown.as_str()) {
            return self.catch_up(committed);
        }
        self.shown = committed.to_string();
        Some(format!("\n{committed}"))
    }

    fn catch_up(&mut self, visible: &str) -> Option<String> {
        let delta = visible.strip_prefix(self.shown.as_str())?;
        if delta.is_empty() {
            return None;
        }
        let delta = delta.to_string();
        self.shown.push_str(&delta);
        if self.started {
            return Some(delta);
        }
        self.started = true;
        Some(format!("{}: {delta}", Role::Assistant.display_name()))
    }
}

/// Prints reply deltas from `rx` to stdout until `stop` fires.
pub async fn render_live(
    mut rx: watch::Receiver<ConversationState>,
    mut printer: ReplyPrinter,
    stop: CancellationToken,
) -> io::Result<ReplyPrinter> {
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => return Ok(printer),
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(printer);
                }
                let delta = printer.advance(&rx.borrow_and_update());
                if let Some(delta) = delta {
                    let mut stdout = io::stdout().lock();
                    stdout.write_all(delta.as_bytes())?;
                    stdout.flush()?;
                }
            }
        }
    }
}
