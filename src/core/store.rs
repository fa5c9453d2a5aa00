use chrono::Local;

use crate::core::message::Message;

/// Ordered transcript of a conversation.
///
/// A plain container: no network access and no timers. The conversation
/// controller is the only writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationStore {
    messages: Vec<Message>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn replace_all(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages = messages.into_iter().collect();
    }

    /// Marks every message matching `predicate` to fade. Messages that are
    /// already marked keep their original marker. Returns how many messages
    /// were newly marked.
    pub fn mark_fade_after<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(usize, &Message) -> bool,
    {
        let now = Local::now();
        let mut marked = 0;
        for (index, message) in self.messages.iter_mut().enumerate() {
            if message.fade_after.is_none() && predicate(index, message) {
                message.fade_after = Some(now);
                marked += 1;
            }
        }
        marked
    }

    /// Drops all but the newest `n` messages. Returns how many were removed.
    pub fn prune_to_last(&mut self, n: usize) -> usize {
        let excess = self.messages.len().saturating_sub(n);
        if excess > 0 {
            self.messages.drain(..excess);
        }
        excess
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }
}

impl<'a> IntoIterator for &'a ConversationStore {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
