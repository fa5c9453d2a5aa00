use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use unicode_segmentation::UnicodeSegmentation;

use crate::core::observe::SharedState;

pub const DEFAULT_REVEAL_DELAY: Duration = Duration::from_millis(50);

/// State that carries the two text views maintained by a
/// [`ResponseAccumulator`].
pub trait ResponseView {
    fn live_text(&self) -> &str;
    fn revealed_text(&self) -> &str;
    fn live_text_mut(&mut self) -> &mut String;
    fn revealed_text_mut(&mut self) -> &mut String;
}

/// Minimal standalone view, for callers that only need the response text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseBuffer {
    pub live_text: String,
    pub revealed_text: String,
}

impl ResponseView for ResponseBuffer {
    fn live_text(&self) -> &str {
        &self.live_text
    }

    fn revealed_text(&self) -> &str {
        &self.revealed_text
    }

    fn live_text_mut(&mut self) -> &mut String {
        &mut self.live_text
    }

    fn revealed_text_mut(&mut self) -> &mut String {
        &mut self.revealed_text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// Every prefix was shown; the revealed text equals the input.
    Completed,
    /// A newer reveal started, or the reveal was cancelled, before the end.
    Cancelled,
}

/// Collects streamed fragments and paces their re-display.
///
/// `append` grows the live text immediately. `reveal` replays a finished
/// text one grapheme at a time. Each reveal is tagged with an epoch; a step
/// only lands while its epoch is still current, so a superseded reveal can
/// never overwrite the newer one.
pub struct ResponseAccumulator<V> {
    state: SharedState<V>,
    reveal_delay: Duration,
    reveal_epoch: Arc<AtomicU64>,
    active_reveal: Mutex<Option<CancellationToken>>,
}

impl<V: ResponseView> ResponseAccumulator<V> {
    pub fn new(state: SharedState<V>) -> Self {
        Self::with_reveal_delay(state, DEFAULT_REVEAL_DELAY)
    }

    pub fn with_reveal_delay(state: SharedState<V>, reveal_delay: Duration) -> Self {
        Self {
            state,
            reveal_delay,
            reveal_epoch: Arc::new(AtomicU64::new(0)),
            active_reveal: Mutex::new(None),
        }
    }

    pub fn reveal_delay(&self) -> Duration {
        self.reveal_delay
    }

    pub fn append(&self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        self.state
            .update(|view| view.live_text_mut().push_str(fragment));
    }

    pub fn live_text(&self) -> String {
        self.state.read(|view| view.live_text().to_string())
    }

    pub fn revealed_text(&self) -> String {
        self.state.read(|view| view.revealed_text().to_string())
    }

    /// Removes and returns the accumulated live text.
    pub fn take(&self) -> String {
        let mut taken = String::new();
        self.state
            .update(|view| taken = std::mem::take(view.live_text_mut()));
        taken
    }

    /// Stops any reveal in progress and empties both views.
    pub fn clear(&self) {
        self.cancel_reveal();
        self.state.update(|view| {
            view.live_text_mut().clear();
            view.revealed_text_mut().clear();
        });
    }

    /// Replays `full_text` into the revealed view, one grapheme per step with
    /// `reveal_delay` before each step.
    pub async fn reveal(&self, full_text: &str) -> RevealOutcome {
        let (epoch, token) = self.begin_reveal();

        for (start, grapheme) in full_text.grapheme_indices(true) {
            tokio::select! {
                biased;
                _ = token.cancelled() => return RevealOutcome::Cancelled,
                _ = tokio::time::sleep(self.reveal_delay) => {}
            }

            let prefix = &full_text[..start + grapheme.len()];
            let applied = self.state.update_if(|view| {
                if self.reveal_epoch.load(Ordering::SeqCst) != epoch {
                    return false;
                }
                let revealed = view.revealed_text_mut();
                revealed.clear();
                revealed.push_str(prefix);
                true
            });
            if !applied {
                return RevealOutcome::Cancelled;
            }
        }

        self.finish_reveal(&token);
        RevealOutcome::Completed
    }

    /// Invalidates the current reveal; its remaining steps become no-ops.
    pub fn cancel_reveal(&self) {
        self.state.update_if(|_| {
            self.reveal_epoch.fetch_add(1, Ordering::SeqCst);
            false
        });
        let active = self
            .active_reveal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = active {
            token.cancel();
        }
    }

    fn begin_reveal(&self) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let previous = self
            .active_reveal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let mut epoch = 0;
        self.state.update(|view| {
            view.revealed_text_mut().clear();
            epoch = self.reveal_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        });
        (epoch, token)
    }

    fn finish_reveal(&self, token: &CancellationToken) {
        let mut active = self
            .active_reveal
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|current| current == token) {
            active.take();
        }
    }
}

impl<V> Drop for ResponseAccumulator<V> {
    fn drop(&mut self) {
        self.reveal_epoch.fetch_add(1, Ordering::SeqCst);
        let active = self
            .active_reveal
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = active {
            token.cancel();
        }
    }
}
