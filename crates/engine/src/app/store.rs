use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;
use tracing::trace;

/// Keyed state held by a [`Store`]. Iteration order is key order.
pub type State<V> = BTreeMap<String, V>;

pub type ListenerError = Box<dyn StdError + Send + Sync + 'static>;

type Listener<V> = Box<dyn FnMut(&State<V>, &State<V>) -> Result<(), ListenerError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscription#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store listener {subscription} failed: {source}")]
    Listener {
        subscription: Subscription,
        #[source]
        source: ListenerError,
    },
}

/// Shared state container with synchronous change notification.
///
/// Reads hand out copies, so mutating a read result never touches the
/// store. Writes merge at the top level only: a key present in a partial
/// replaces the whole entry under that key.
pub struct Store<V> {
    state: State<V>,
    listeners: Vec<(Subscription, Listener<V>)>,
    next_subscription: u64,
}

impl<V: Clone> Store<V> {
    pub fn new(initial: State<V>) -> Self {
        Self {
            state: initial,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn get(&self) -> State<V> {
        self.state.clone()
    }

    pub fn get_entry(&self, key: &str) -> Option<V> {
        self.state.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Merges `partial` into the state. Listeners see `(previous, next)`
    /// before the commit; the first listener error aborts the write and
    /// skips the remaining listeners.
    pub fn set(&mut self, partial: State<V>) -> Result<(), StoreError> {
        let mut next = self.state.clone();
        let changed_keys = partial.len();
        next.extend(partial);

        for (subscription, listener) in &mut self.listeners {
            listener(&self.state, &next).map_err(|source| StoreError::Listener {
                subscription: *subscription,
                source,
            })?;
        }

        self.state = next;
        trace!(
            changed_keys,
            entry_count = self.state.len(),
            "store_committed"
        );
        Ok(())
    }

    pub fn set_entry(&mut self, key: impl Into<String>, value: V) -> Result<(), StoreError> {
        let mut partial = State::new();
        partial.insert(key.into(), value);
        self.set(partial)
    }

    pub fn subscribe<F>(&mut self, listener: F) -> Subscription
    where
        F: FnMut(&State<V>, &State<V>) -> Result<(), ListenerError> + 'static,
    {
        let subscription = Subscription(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((subscription, Box::new(listener)));
        subscription
    }

    /// Returns false when the subscription was already removed.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(id, _)| *id != subscription);
        before != self.listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Hard reset: replaces everything, notifies nobody.
    pub fn clear(&mut self, new_state: State<V>) {
        self.state = new_state;
    }
}

impl<V: Clone> Default for Store<V> {
    fn default() -> Self {
        Self::new(State::new())
    }
}

impl<V: fmt::Debug> fmt::Debug for Store<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.state)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
