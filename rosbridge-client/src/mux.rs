//! Named-channel event multiplexer.
//!
//! Maps a channel name (topic name, operation id, or a fixed system event)
//! to an ordered list of listeners. There is no listener-count limit.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle identifying one registration, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registration<T> {
    id: ListenerId,
    once: bool,
    callback: Callback<T>,
}

/// Multiplexes many named channels over one listener registry.
pub struct ChannelMultiplexer<T> {
    channels: Mutex<HashMap<String, Vec<Registration<T>>>>,
    next_id: AtomicU64,
}

impl<T> ChannelMultiplexer<T> {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a listener invoked on every emit on `channel`.
    pub fn on<F>(&self, channel: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(channel.into(), false, Arc::new(callback))
    }

    /// Registers a listener removed after its first invocation.
    pub fn once<F>(&self, channel: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(channel.into(), true, Arc::new(callback))
    }

    fn register(&self, channel: String, once: bool, callback: Callback<T>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.channels
            .lock()
            .entry(channel)
            .or_default()
            .push(Registration { id, once, callback });
        id
    }

    /// Removes a listener. Returns whether it was registered on `channel`.
    pub fn off(&self, channel: &str, id: ListenerId) -> bool {
        let mut channels = self.channels.lock();
        let Some(registrations) = channels.get_mut(channel) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        let removed = registrations.len() != before;
        if registrations.is_empty() {
            channels.remove(channel);
        }
        removed
    }

    /// Removes every listener on `channel`.
    pub fn remove_all(&self, channel: &str) {
        self.channels.lock().remove(channel);
    }

    /// Delivers `payload` to the listeners on `channel` in registration order.
    ///
    /// Once-listeners are unregistered before any listener runs, and the
    /// registry lock is not held while listeners run, so they may register,
    /// remove or emit freely. Returns the number of listeners invoked.
    pub fn emit(&self, channel: &str, payload: &T) -> usize {
        let callbacks: Vec<Callback<T>> = {
            let mut channels = self.channels.lock();
            let Some(registrations) = channels.get_mut(channel) else {
                return 0;
            };
            let callbacks = registrations.iter().map(|r| r.callback.clone()).collect();
            registrations.retain(|r| !r.once);
            if registrations.is_empty() {
                channels.remove(channel);
            }
            callbacks
        };

        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }

    /// Number of listeners registered on `channel`.
    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels.lock().get(channel).map_or(0, Vec::len)
    }

    /// Returns whether `id` is still registered on `channel`.
    pub fn contains(&self, channel: &str, id: ListenerId) -> bool {
        self.channels
            .lock()
            .get(channel)
            .is_some_and(|regs| regs.iter().any(|r| r.id == id))
    }
}

impl<T> Default for ChannelMultiplexer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ChannelMultiplexer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.channels.lock();
        f.debug_struct("ChannelMultiplexer")
            .field("channels", &channels.len())
            .finish()
    }
}
