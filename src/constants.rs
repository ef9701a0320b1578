//! Application-wide constants for tcpchat.
//!
//! Defaults for the connection config plus the tunables the socket
//! workers and the host loop use. Grouped by domain.

use std::time::Duration;

// ============================================================================
// Config defaults
// ============================================================================

/// Agent name used when the config file does not provide one.
pub const DEFAULT_NAME: &str = "Local";

/// Address the server binds to by default.
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1";

/// Port the server listens on by default.
pub const DEFAULT_SERVER_PORT: u16 = 3333;

/// Number of accept-loop workers the server spawns by default.
pub const DEFAULT_SERVER_CLIENT_COUNT: usize = 3;

/// Address the client connects to by default.
pub const DEFAULT_CLIENT_ADDRESS: &str = "127.0.0.1";

/// Port the client connects to by default.
pub const DEFAULT_CLIENT_PORT: u16 = 5555;

/// Client identifier used when none is configured.
pub const DEFAULT_CLIENT_IDENTIFIER: &str = "A1B2C3D4E5F6";

/// Connect timeout in seconds for client sends.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3;

/// Size of the client send pool.
pub const DEFAULT_MAX_CONCURRENT_SENDS: usize = 8;

/// File name of the config file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "ipconfig.json";

/// Directory name under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "tcpchat";

// ============================================================================
// Wire
// ============================================================================

/// Separator between the sender name and the message body.
pub const ORIGIN_SEPARATOR: char = '#';

/// Origin reported for messages that carry no `<name>#` prefix.
pub const UNKNOWN_ORIGIN: &str = "Unknown";

/// Read buffer size for server workers.
///
/// Each successful read becomes at most one queued chunk, so this also
/// caps the size of a single delivered message.
pub const READ_BUFFER_SIZE: usize = 1024;

// ============================================================================
// Host loop & shutdown
// ============================================================================

/// Host tick interval (approximately 60 ticks per second).
pub const TICK_INTERVAL: Duration = Duration::from_millis(16);

/// Timeout for the wake-up connections opened during server shutdown.
pub const SHUTDOWN_WAKE_TIMEOUT: Duration = Duration::from_millis(250);
