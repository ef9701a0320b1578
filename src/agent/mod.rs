//! Shared agent machinery: config gating, the message queue, and the
//! per-tick drain that notifies subscribers.
//!
//! # Architecture
//!
//! ```text
//! worker threads ──push──► MessageQueue ──drain on tick──► Subscribers
//!  (socket I/O)              (Arc<Mutex>)    (host thread)   (view, tests)
//! ```
//!
//! An agent is driven entirely by the host calling [`Agent::tick`]. The
//! first tick after the [`ConfigGate`] opens hands the config to the
//! concrete role via [`Agent::on_config_ready`]; every tick after that
//! drains the queue. Callbacks run synchronously inside `tick`, so
//! subscriber code is single-threaded.

pub mod queue;
pub mod subscribers;

pub use queue::MessageQueue;
pub use subscribers::{MessageCallback, SubscriptionId, Subscribers};

use crate::config::{ConfigGate, IpConfig};

/// State common to every agent role.
#[derive(Debug)]
pub struct AgentBase {
    gate: ConfigGate,
    loaded: bool,
    queue: MessageQueue,
    subscribers: Subscribers,
}

impl AgentBase {
    /// Create a base waiting on `gate`.
    pub fn new(gate: ConfigGate) -> Self {
        Self {
            gate,
            loaded: false,
            queue: MessageQueue::new(),
            subscribers: Subscribers::default(),
        }
    }

    /// Whether the config has been handed to this agent.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// The agent's message queue.
    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Returns the config exactly once: on the first call after the gate
    /// opens. Marks the agent loaded.
    fn take_ready_config(&mut self) -> Option<IpConfig> {
        if self.loaded {
            return None;
        }
        let config = self.gate.get()?.clone();
        self.loaded = true;
        Some(config)
    }

    /// Register a message callback.
    pub fn subscribe(&mut self, callback: MessageCallback) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    /// Remove a message callback.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Drain the queue and notify subscribers once per message, in queue
    /// order. Returns the number of messages delivered.
    ///
    /// Does nothing until the config is loaded.
    pub fn check_queue(&mut self) -> usize {
        if !self.loaded || self.queue.is_empty() {
            return 0;
        }
        let messages = self.queue.drain();
        for message in &messages {
            self.subscribers.notify(message);
        }
        messages.len()
    }
}

/// A messaging role (client or server) driven by the host tick.
pub trait Agent {
    /// Short role label for logs.
    fn role(&self) -> &'static str;

    /// Shared state.
    fn base(&self) -> &AgentBase;

    /// Shared state, mutably.
    fn base_mut(&mut self) -> &mut AgentBase;

    /// Called once, on the polling thread, when the config becomes available.
    fn on_config_ready(&mut self, config: &IpConfig);

    /// Stop background activity. Idempotent.
    fn shutdown(&mut self) {}

    /// One polling step: pick up the config if it just became ready, then
    /// drain the queue. Returns the number of messages delivered.
    fn tick(&mut self) -> usize {
        if let Some(config) = self.base_mut().take_ready_config() {
            self.on_config_ready(&config);
        }
        self.base_mut().check_queue()
    }

    /// Whether the config has been loaded.
    fn is_loaded(&self) -> bool {
        self.base().is_loaded()
    }

    /// Register a message callback.
    fn subscribe(&mut self, callback: impl FnMut(&str) + 'static) -> SubscriptionId
    where
        Self: Sized,
    {
        self.base_mut().subscribe(Box::new(callback))
    }

    /// Remove a message callback.
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.base_mut().unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Minimal role that records when it was configured.
    struct Probe {
        base: AgentBase,
        configured_with: Option<String>,
    }

    impl Probe {
        fn new(gate: ConfigGate) -> Self {
            Self {
                base: AgentBase::new(gate),
                configured_with: None,
            }
        }
    }

    impl Agent for Probe {
        fn role(&self) -> &'static str {
            "probe"
        }

        fn base(&self) -> &AgentBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut AgentBase {
            &mut self.base
        }

        fn on_config_ready(&mut self, config: &IpConfig) {
            self.configured_with = Some(config.name.clone());
        }
    }

    fn recorder(agent: &mut Probe) -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        agent.subscribe(move |m| sink.borrow_mut().push(m.to_string()));
        seen
    }

    #[test]
    fn test_no_notification_before_config_ready() {
        let gate = ConfigGate::new();
        let mut agent = Probe::new(gate.clone());
        let seen = recorder(&mut agent);

        agent.base().queue().push("early");
        assert_eq!(agent.tick(), 0);
        assert!(seen.borrow().is_empty());
        assert!(!agent.is_loaded());

        gate.publish(IpConfig {
            name: "Late".to_string(),
            ..IpConfig::default()
        })
        .unwrap();
        assert_eq!(agent.tick(), 1);
        assert_eq!(*seen.borrow(), vec!["early"]);
        assert_eq!(agent.configured_with.as_deref(), Some("Late"));
    }

    #[test]
    fn test_on_config_ready_runs_once() {
        let mut agent = Probe::new(ConfigGate::ready(IpConfig::default()).unwrap());
        agent.tick();
        agent.configured_with = None;
        agent.tick();
        assert!(agent.configured_with.is_none());
    }

    #[test]
    fn test_drain_is_idempotent() {
        let mut agent = Probe::new(ConfigGate::ready(IpConfig::default()).unwrap());
        let seen = recorder(&mut agent);

        agent.base().queue().push("a");
        agent.base().queue().push("b");
        assert_eq!(agent.tick(), 2);
        assert_eq!(agent.tick(), 0);
        assert_eq!(*seen.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn test_every_subscriber_sees_every_message() {
        let mut agent = Probe::new(ConfigGate::ready(IpConfig::default()).unwrap());
        let first = recorder(&mut agent);
        let second = recorder(&mut agent);

        agent.base().queue().push("x");
        agent.tick();
        assert_eq!(*first.borrow(), vec!["x"]);
        assert_eq!(*second.borrow(), vec!["x"]);
    }

    #[test]
    fn test_unsubscribed_callback_stops_receiving() {
        let mut agent = Probe::new(ConfigGate::ready(IpConfig::default()).unwrap());
        let seen = Rc::new(RefCell::new(0usize));
        let counter = Rc::clone(&seen);
        let id = agent.subscribe(move |_| *counter.borrow_mut() += 1);

        agent.base().queue().push("one");
        agent.tick();
        assert!(agent.unsubscribe(id));
        agent.base().queue().push("two");
        agent.tick();

        assert_eq!(*seen.borrow(), 1);
    }
}
