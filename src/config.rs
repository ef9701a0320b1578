//! Configuration loading and the config readiness gate.
//!
//! [`IpConfig`] is the record read once at startup from `ipconfig.json`.
//! Agents never read it directly: the host publishes it into a
//! [`ConfigGate`], and each agent polls the gate on its tick and resolves
//! the role-specific [`ClientConfig`] or [`ServerConfig`] from it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_CLIENT_ADDRESS, DEFAULT_CLIENT_IDENTIFIER,
    DEFAULT_CLIENT_PORT, DEFAULT_MAX_CONCURRENT_SENDS, DEFAULT_NAME, DEFAULT_SERVER_ADDRESS,
    DEFAULT_SERVER_CLIENT_COUNT, DEFAULT_SERVER_PORT, DEFAULT_TIMEOUT_SECS,
};

/// Connection configuration as stored on disk.
///
/// Legacy PascalCase keys (`ServerIp`, `ServerAmount`, `ClientMac`, ...)
/// are accepted as aliases so older config files keep loading.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct IpConfig {
    /// Name of this endpoint, used as the `<name>#` prefix on sends.
    #[serde(alias = "Name")]
    pub name: String,
    /// Address the server binds to.
    #[serde(alias = "ServerIp")]
    pub server_address: String,
    /// Port the server listens on.
    #[serde(alias = "ServerPort")]
    pub server_port: u16,
    /// Number of concurrent accept-loop workers on the server.
    #[serde(alias = "ServerAmount")]
    pub server_client_count: usize,
    /// Address the client connects to.
    #[serde(alias = "ClientIp")]
    pub client_address: String,
    /// Port the client connects to.
    #[serde(alias = "ClientPort")]
    pub client_port: u16,
    /// Free-form client identifier (logged, not sent).
    #[serde(alias = "ClientMac")]
    pub client_identifier: String,
    /// Client connect timeout in seconds.
    #[serde(alias = "Timeout")]
    pub timeout_seconds: u64,
    /// Whether client sends carry the `<name>#` prefix.
    pub send_contact: bool,
    /// Number of client send workers.
    pub max_concurrent_sends: usize,
}

impl Default for IpConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            server_client_count: DEFAULT_SERVER_CLIENT_COUNT,
            client_address: DEFAULT_CLIENT_ADDRESS.to_string(),
            client_port: DEFAULT_CLIENT_PORT,
            client_identifier: DEFAULT_CLIENT_IDENTIFIER.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            send_contact: true,
            max_concurrent_sends: DEFAULT_MAX_CONCURRENT_SENDS,
        }
    }
}

impl IpConfig {
    /// Default config file location.
    ///
    /// Priority:
    /// 1. `TCPCHAT_CONFIG` env var
    /// 2. `<platform config dir>/tcpchat/ipconfig.json`
    /// 3. `ipconfig.json` in the working directory
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("TCPCHAT_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
    }

    /// Load, apply environment overrides, and validate.
    ///
    /// Every failure here is fatal to the caller: no agent can run
    /// without a config.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from JSON text without validating it.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Write this config as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `TCPCHAT_*` overrides from an arbitrary lookup.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("TCPCHAT_NAME") {
            self.name = name;
        }
        if let Some(address) = lookup("TCPCHAT_SERVER_ADDRESS") {
            self.server_address = address;
        }
        if let Some(address) = lookup("TCPCHAT_CLIENT_ADDRESS") {
            self.client_address = address;
        }
        if let Some(port) = parse_override(&lookup, "TCPCHAT_SERVER_PORT") {
            self.server_port = port;
        }
        if let Some(port) = parse_override(&lookup, "TCPCHAT_CLIENT_PORT") {
            self.client_port = port;
        }
        if let Some(timeout) = parse_override(&lookup, "TCPCHAT_TIMEOUT") {
            self.timeout_seconds = timeout;
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.server_address.trim().is_empty(), "serverAddress must not be empty");
        ensure!(!self.client_address.trim().is_empty(), "clientAddress must not be empty");
        ensure!(self.server_port != 0, "serverPort must be in 1..=65535");
        ensure!(self.client_port != 0, "clientPort must be in 1..=65535");
        ensure!(self.server_client_count >= 1, "serverClientCount must be at least 1");
        ensure!(self.timeout_seconds >= 1, "timeoutSeconds must be at least 1");
        ensure!(self.max_concurrent_sends >= 1, "maxConcurrentSends must be at least 1");
        Ok(())
    }

    /// Settings for the client role.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: ConnectionConfig {
                name: self.name.clone(),
                address: self.client_address.clone(),
                port: self.client_port,
            },
            identifier: self.client_identifier.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
            send_contact: self.send_contact,
            max_concurrent_sends: self.max_concurrent_sends,
        }
    }

    /// Settings for the server role.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            endpoint: ConnectionConfig {
                name: self.name.clone(),
                address: self.server_address.clone(),
                port: self.server_port,
            },
            expected_clients: self.server_client_count,
        }
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("[Config] Ignoring {key}={raw:?}: not a valid value");
            None
        }
    }
}

/// Endpoint identity shared by both roles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Endpoint name.
    pub name: String,
    /// IPv4 address or hostname.
    pub address: String,
    /// TCP port.
    pub port: u16,
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' [{}, {}]", self.name, self.address, self.port)
    }
}

/// Client role settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Where to connect.
    pub endpoint: ConnectionConfig,
    /// Client identifier.
    pub identifier: String,
    /// Connect timeout.
    pub timeout: Duration,
    /// Prefix outgoing messages with `<name>#`.
    pub send_contact: bool,
    /// Send pool size.
    pub max_concurrent_sends: usize,
}

/// Server role settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Where to listen.
    pub endpoint: ConnectionConfig,
    /// Number of accept-loop workers.
    pub expected_clients: usize,
}

/// Write-once, cloneable handle to the loaded [`IpConfig`].
///
/// Replaces a process-global loader: the host creates one gate, hands a
/// clone to each agent, and publishes the config once it is loaded.
/// Agents only ever poll it, so the tick loop never blocks on loading.
#[derive(Clone, Debug, Default)]
pub struct ConfigGate {
    inner: Arc<OnceLock<IpConfig>>,
}

impl ConfigGate {
    /// Create an empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a gate that is already open with a validated `config`.
    pub fn ready(config: IpConfig) -> Result<Self> {
        let gate = Self::new();
        gate.publish(config)?;
        Ok(gate)
    }

    /// Validate and publish the config.
    ///
    /// Fails if `config` is out of range or a config was already published.
    pub fn publish(&self, config: IpConfig) -> Result<()> {
        config.validate().context("Refusing to publish invalid config")?;
        if self.inner.set(config).is_err() {
            bail!("Config has already been published");
        }
        Ok(())
    }

    /// The published config, if any.
    pub fn get(&self) -> Option<&IpConfig> {
        self.inner.get()
    }

    /// Whether a config has been published.
    pub fn is_ready(&self) -> bool {
        self.inner.get().is_some()
    }

    /// Load `path` on a background thread and publish the result.
    ///
    /// The returned handle yields the load error, if any; the host is
    /// expected to treat it as fatal.
    pub fn spawn_loader(&self, path: PathBuf) -> Result<JoinHandle<Result<()>>> {
        let gate = self.clone();
        let handle = std::thread::Builder::new()
            .name("config-loader".to_string())
            .spawn(move || {
                let config = IpConfig::load(&path)?;
                log::info!("[Config] Loaded {}", path.display());
                gate.publish(config)
            })
            .context("Failed to spawn config loader thread")?;
        Ok(handle)
    }
}
