//! tcpchat - threaded TCP messaging core.
//!
//! A fire-and-forget TCP client, a multi-worker TCP server, and a
//! thread-safe message queue that hands everything received (or sent) to a
//! single-threaded consumer on each host tick.
//!
//! # Architecture
//!
//! - **Config** - [`IpConfig`] loaded once, published through a [`ConfigGate`]
//! - **Agent** - shared tick logic: config gating, queue drain, subscribers
//! - **Client** - one short-lived connection per message on a bounded pool
//! - **Server** - one listener, `expected_clients` accept-loop workers
//!
//! # Modules
//!
//! - [`agent`] - [`Agent`] trait, message queue, subscribers
//! - [`socket`] - TCP client and server agents
//! - [`config`] - configuration loading and the readiness gate
//! - [`message`] - `<origin>#<body>` convention
//! - [`view`] - console rendering of traffic
//! - [`runner`] - host tick loop

pub mod agent;
pub mod config;
pub mod constants;
pub mod message;
pub mod runner;
pub mod socket;
pub mod view;

// Re-export commonly used types
pub use agent::{Agent, MessageQueue, SubscriptionId};
pub use config::{ClientConfig, ConfigGate, ConnectionConfig, IpConfig, ServerConfig};
pub use message::ParsedMessage;
pub use socket::{TcpClientAgent, TcpServerAgent, WorkerState};
pub use view::LogView;
