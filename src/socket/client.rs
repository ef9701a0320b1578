//! TCP client agent that only sends.
//!
//! Every [`TcpClientAgent::enqueue_message`] call is an independent job on
//! the [`SendPool`]: resolve, connect with the configured timeout, write
//! the message once, close. There is no persistent connection and no
//! retry. A successfully written message is pushed onto the agent's own
//! queue so subscribers can echo what was sent.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use super::pool::SendPool;
use crate::agent::{Agent, AgentBase, MessageQueue};
use crate::config::{ClientConfig, ConfigGate, ConnectionConfig, IpConfig};
use crate::message;

/// Client agent: fire-and-forget sends over short-lived connections.
#[derive(Debug)]
pub struct TcpClientAgent {
    base: AgentBase,
    runtime: Option<ClientRuntime>,
}

#[derive(Debug)]
struct ClientRuntime {
    config: Arc<ClientConfig>,
    pool: SendPool,
}

impl TcpClientAgent {
    /// Create a client waiting on `gate`.
    pub fn new(gate: ConfigGate) -> Self {
        Self {
            base: AgentBase::new(gate),
            runtime: None,
        }
    }

    /// Resolved client settings, once loaded.
    pub fn config(&self) -> Option<&ClientConfig> {
        self.runtime.as_ref().map(|rt| rt.config.as_ref())
    }

    /// Queue `text` for delivery to the configured server.
    ///
    /// Rejected with a warning (returning `false`) if the config is not
    /// loaded yet or `text` is empty; no connection is attempted then.
    /// Delivery failures happen later on a pool thread and are only logged.
    pub fn enqueue_message(&self, text: &str) -> bool {
        if !self.base.is_loaded() {
            log::warn!("[Client] Could not enqueue any message because data is not loaded yet");
            return false;
        }
        if text.is_empty() {
            log::warn!("[Client] Could not enqueue any message because it is empty");
            return false;
        }
        let Some(runtime) = self.runtime.as_ref() else {
            log::warn!(
                "[Client] Could not enqueue any message because the send pool is not running"
            );
            return false;
        };

        let config = Arc::clone(&runtime.config);
        let queue = self.base.queue().clone();
        let text = text.to_string();
        if !runtime.pool.execute(move || deliver(&config, &text, &queue)) {
            log::warn!("[Client] Could not enqueue any message because the client is shut down");
            return false;
        }
        true
    }
}

impl Agent for TcpClientAgent {
    fn role(&self) -> &'static str {
        "client"
    }

    fn base(&self) -> &AgentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AgentBase {
        &mut self.base
    }

    fn on_config_ready(&mut self, config: &IpConfig) {
        let client = config.client_config();
        log::info!(
            "[Client] {} client data has been loaded (id {})",
            client.endpoint,
            client.identifier
        );

        match SendPool::new("tcp-send", client.max_concurrent_sends) {
            Ok(pool) => {
                self.runtime = Some(ClientRuntime {
                    config: Arc::new(client),
                    pool,
                });
            }
            Err(e) => log::error!(
                "[Client] '{}' could not start send workers: {e:#}",
                client.endpoint.name
            ),
        }
    }

    fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.pool.shutdown();
        }
    }
}

/// Pool job: send once, echo on success, log on failure.
fn deliver(config: &ClientConfig, text: &str, queue: &MessageQueue) {
    match send_once(config, text) {
        Ok(sent) => {
            log::debug!("[Client] '{}' sent {} byte(s)", config.endpoint.name, sent.len());
            queue.push(sent);
        }
        Err(e) => {
            log::error!("[Client] '{}' could not send message: {e:#}", config.endpoint.name);
        }
    }
}

/// Open a connection, write one message, close it.
///
/// Returns the message as written (including any `<name>#` prefix).
pub fn send_once(config: &ClientConfig, text: &str) -> Result<String> {
    let mut stream = connect(&config.endpoint, config.timeout)?;

    let message = if config.send_contact {
        message::compose(&config.endpoint.name, text)
    } else {
        text.to_string()
    };

    stream
        .write_all(message.as_bytes())
        .with_context(|| format!("Failed to write to {}", config.endpoint))?;
    stream.flush()?;
    // Half-close so the server reads EOF right away.
    let _ = stream.shutdown(Shutdown::Write);
    Ok(message)
}

/// Connect to the first reachable address `endpoint` resolves to.
fn connect(endpoint: &ConnectionConfig, timeout: Duration) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (endpoint.address.as_str(), endpoint.port)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve {}", endpoint.address))?
        .collect();
    if addrs.is_empty() {
        bail!("{} resolved to no addresses", endpoint.address);
    }

    connect_any(&addrs, timeout).with_context(|| {
        format!("Failed to connect to {} within {}s", endpoint, timeout.as_secs())
    })
}

/// Try `addrs` in order, sharing one `timeout` across all attempts.
fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    let deadline = Instant::now() + timeout;
    let mut last_err = io::Error::from(io::ErrorKind::TimedOut);

    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::from(io::ErrorKind::TimedOut));
        }
        match TcpStream::connect_timeout(addr, remaining) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}
