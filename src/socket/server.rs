//! TCP server agent that receives messages from many clients.
//!
//! Once the config is ready the agent binds a [`TcpListener`] and spawns
//! `expected_clients` accept-loop workers sharing it. Every decoded chunk
//! lands in the agent's [`MessageQueue`] and is delivered on the next tick.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};

use super::worker::{AcceptWorker, WorkerSlots, WorkerState};
use crate::agent::{Agent, AgentBase, MessageQueue};
use crate::config::{ConfigGate, IpConfig, ServerConfig};
use crate::constants::SHUTDOWN_WAKE_TIMEOUT;

/// Server agent: listens and queues everything it receives.
///
/// If binding fails the agent logs a warning and stays inert; ticking it
/// is still safe. Dropping the agent shuts the listener down.
#[derive(Debug)]
pub struct TcpServerAgent {
    base: AgentBase,
    config: Option<ServerConfig>,
    runtime: Option<ServerRuntime>,
}

/// Listener and workers of a running server.
#[derive(Debug)]
struct ServerRuntime {
    name: String,
    /// Our own listener handle; workers hold clones.
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    slots: Arc<WorkerSlots>,
    /// Workers run detached; handles are only polled for liveness.
    handles: Vec<JoinHandle<()>>,
}

impl TcpServerAgent {
    /// Create a server waiting on `gate`.
    pub fn new(gate: ConfigGate) -> Self {
        Self {
            base: AgentBase::new(gate),
            config: None,
            runtime: None,
        }
    }

    /// Resolved server settings, once loaded.
    pub fn config(&self) -> Option<&ServerConfig> {
        self.config.as_ref()
    }

    /// Whether the listener is up.
    pub fn is_listening(&self) -> bool {
        self.runtime
            .as_ref()
            .is_some_and(|rt| !rt.stop.load(Ordering::SeqCst))
    }

    /// Bound address (useful when the OS picked the interface).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.runtime.as_ref().map(|rt| rt.local_addr)
    }

    /// State of every worker, by index.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.runtime
            .as_ref()
            .map(|rt| rt.slots.snapshot())
            .unwrap_or_default()
    }

    /// Number of worker threads still running.
    pub fn active_workers(&self) -> usize {
        self.runtime.as_ref().map_or(0, |rt| {
            rt.handles.iter().filter(|handle| !handle.is_finished()).count()
        })
    }

    fn start(config: &ServerConfig, queue: &MessageQueue) -> Result<ServerRuntime> {
        let endpoint = &config.endpoint;
        let listener = TcpListener::bind((endpoint.address.as_str(), endpoint.port))
            .with_context(|| format!("Failed to bind {}:{}", endpoint.address, endpoint.port))?;
        let local_addr = listener.local_addr()?;

        let mut runtime = ServerRuntime {
            name: endpoint.name.clone(),
            listener: None,
            local_addr,
            stop: Arc::new(AtomicBool::new(false)),
            slots: Arc::new(WorkerSlots::new(config.expected_clients)),
            handles: Vec::with_capacity(config.expected_clients),
        };

        // On early return, dropping `runtime` stops any worker already spawned.
        for index in 0..config.expected_clients {
            let worker = AcceptWorker {
                index,
                server_name: endpoint.name.clone(),
                listener: listener.try_clone().context("Failed to clone listener")?,
                queue: queue.clone(),
                stop: Arc::clone(&runtime.stop),
                slots: Arc::clone(&runtime.slots),
            };
            runtime.handles.push(worker.spawn()?);
        }
        runtime.listener = Some(listener);

        log::info!(
            "[Server] Opened {} thread(s) on '{}'",
            config.expected_clients,
            endpoint.name
        );
        Ok(runtime)
    }
}

impl Agent for TcpServerAgent {
    fn role(&self) -> &'static str {
        "server"
    }

    fn base(&self) -> &AgentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AgentBase {
        &mut self.base
    }

    fn on_config_ready(&mut self, config: &IpConfig) {
        let server = config.server_config();
        log::info!("[Server] {} server data has been loaded", server.endpoint);

        match Self::start(&server, self.base.queue()) {
            Ok(runtime) => {
                log::info!(
                    "[Server] '{}' is listening for incoming messages on {}",
                    server.endpoint.name,
                    runtime.local_addr
                );
                self.runtime = Some(runtime);
            }
            Err(e) => {
                log::warn!("[Server] '{}' could not start listening: {e:#}", server.endpoint.name);
            }
        }
        self.config = Some(server);
    }

    fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.stop();
        }
    }
}

impl Drop for TcpServerAgent {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ServerRuntime {
    /// Set the stop flag and unblock every worker parked in `accept`.
    ///
    /// Each wake-up connection releases one blocked `accept`; the worker
    /// sees the flag, drops the connection and exits. Connections left over
    /// in the backlog are discarded with the listener. Workers busy reading
    /// exit when their peer closes. Nothing is joined.
    fn stop(&mut self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }

        // A worker seen as Reading here may still loop back into accept
        // before it observes the flag, so every live worker gets a wake-up.
        let wake_addr = wake_address(self.local_addr);
        let alive = self
            .slots
            .snapshot()
            .into_iter()
            .filter(|state| state.is_alive())
            .count();
        for _ in 0..alive {
            if let Err(e) = TcpStream::connect_timeout(&wake_addr, SHUTDOWN_WAKE_TIMEOUT) {
                log::debug!("[Server] '{}' wake-up connect failed: {e}", self.name);
                break;
            }
        }

        drop(self.listener.take());
        log::info!("[Server] '{}' stopped listening", self.name);
    }
}

impl Drop for ServerRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Address to connect to in order to reach our own listener.
fn wake_address(local: SocketAddr) -> SocketAddr {
    let ip = match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, local.port())
}
