//! TCP client and server agents.
//!
//! # Architecture
//!
//! ```text
//! Client process                            Server process
//! ┌───────────────────────┐                ┌──────────────────────────┐
//! │ TcpClientAgent        │                │ TcpServerAgent           │
//! │  enqueue_message()    │  one TCP conn  │  TcpListener             │
//! │  SendPool (N threads) │───per message─►│  AcceptWorker × expected │
//! │  echo → MessageQueue  │                │  chunks → MessageQueue   │
//! └──────────┬────────────┘                └────────────┬─────────────┘
//!            │ tick()                                   │ tick()
//!            ▼                                          ▼
//!       subscribers                                subscribers
//! ```
//!
//! # Wire Protocol
//!
//! Raw UTF-8 bytes, no length prefix, no delimiter, no handshake. A
//! client writes one message per connection and closes. The server pushes
//! whatever each read yields (decoded by [`codec`]) as one message, so
//! boundaries are only reliable for short messages on a fresh connection.

pub mod client;
pub mod codec;
pub mod pool;
pub mod server;
pub mod worker;

pub use client::TcpClientAgent;
pub use server::TcpServerAgent;
pub use worker::WorkerState;
