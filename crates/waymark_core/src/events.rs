//! Multicast listener lists.
//!
//! Listeners are called in registration order. A listener that returns an
//! error or panics is logged and counted; the remaining listeners still run
//! and the emitter carries on.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use thiserror::Error;

/// Handle returned by [`Listeners::subscribe`].
pub type ListenerId = u64;

/// Error a listener may report back to the emitter.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listener could not handle the event.
    #[error("listener rejected event: {0}")]
    Rejected(String),
}

type Callback<E> = Box<dyn FnMut(&E) -> Result<(), ListenerError>>;

/// Ordered set of event callbacks.
pub struct Listeners<E> {
    next_id: ListenerId,
    entries: Vec<(ListenerId, Callback<E>)>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<E> fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish()
    }
}

impl<E: fmt::Debug> Listeners<E> {
    /// Create an empty listener list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&E) -> Result<(), ListenerError> + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, Box::new(listener)));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deliver one event to every listener. Returns the number of failures.
    pub fn emit(&mut self, event: &E) -> usize {
        let mut failures = 0;
        for (id, listener) in &mut self.entries {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    tracing::warn!(listener = *id, ?event, %err, "Listener failed");
                }
                Err(_) => {
                    failures += 1;
                    tracing::warn!(listener = *id, ?event, "Listener panicked");
                }
            }
        }
        failures
    }

    /// Deliver a batch of events in order. Returns the total number of failures.
    pub fn emit_all(&mut self, events: &[E]) -> usize {
        events.iter().map(|event| self.emit(event)).sum()
    }
}
