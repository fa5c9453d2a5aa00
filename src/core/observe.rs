//! Observable state cells.
//!
//! Each piece of session state lives behind a [`SharedState`]. Writers mutate
//! it through [`SharedState::update`], which notifies every current subscriber
//! before returning, so a renderer never sees a half-applied change.

use std::sync::Arc;

use tokio::sync::watch;

pub struct SharedState<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for SharedState<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> SharedState<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Applies `mutate` and notifies subscribers.
    pub fn update(&self, mutate: impl FnOnce(&mut T)) {
        self.tx.send_modify(mutate);
    }

    /// Applies `mutate` and notifies subscribers only when it returns `true`.
    /// The closure runs under the state lock, so checks made inside it cannot
    /// race with other writers.
    pub fn update_if(&self, mutate: impl FnOnce(&mut T) -> bool) -> bool {
        self.tx.send_if_modified(mutate)
    }

    pub fn read<R>(&self, inspect: impl FnOnce(&T) -> R) -> R {
        inspect(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone> SharedState<T> {
    pub fn snapshot(&self) -> T {
        self.tx.borrow().clone()
    }
}

impl<T: Default> Default for SharedState<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
