//! Message-available subscribers.

/// Handle returned by [`Subscribers::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked once per drained message.
pub type MessageCallback = Box<dyn FnMut(&str)>;

/// Ordered list of message callbacks.
///
/// Callbacks are not `Send`: they only ever run on the polling thread.
#[derive(Default)]
pub struct Subscribers {
    next_id: u64,
    entries: Vec<(SubscriptionId, MessageCallback)>,
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Subscribers {
    /// Register a callback. Callbacks fire in registration order.
    pub fn subscribe(&mut self, callback: MessageCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, callback));
        id
    }

    /// Remove a callback. Returns `false` if `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    /// Deliver `message` to every callback.
    pub fn notify(&mut self, message: &str) {
        for (_, callback) in &mut self.entries {
            callback(message);
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
