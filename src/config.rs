//! Compile-time tunables, each overridable by an environment variable for local
//! testing against a pseudo-terminal instead of the real module.

use std::time::Duration;

/// Default device node for the BLE module's UART.
pub const DEVICE_PATH: &str = "/dev/hm11";

/// TCP port the fan-out server listens on.
pub const TCP_PORT: u16 = 9000;

/// Listen backlog for the TCP acceptor.
pub const LISTEN_BACKLOG: u32 = 10;

/// Maximum number of concurrently registered subscriber sessions. The
/// original thread-per-connection server had no such bound; this caps the
/// registry so a connection flood fails a single accept with a resource-
/// exhaustion error instead of growing the session map without limit.
pub const MAX_SUBSCRIBERS: usize = 64;

/// Cadence at which the scavenger drains the UART for fresh notifications.
pub const SCAVENGE_INTERVAL: Duration = Duration::from_secs(2);

/// Cadence at which the reaper sweeps finished sessions.
pub const REAP_INTERVAL: Duration = Duration::from_secs(5);

/// Per-byte timeout used by the bounded-wait response primitive.
pub const PER_BYTE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Maximum window drained per scavenge cycle.
pub const SCAVENGE_WINDOW: usize = 512;

/// Sentinel byte prefixing a notification payload byte.
pub const NOTIFICATION_SENTINEL: u8 = 0x16;

/// MAC address of the heart-rate peripheral the module connects to on startup.
pub const HEART_RATE_MAC: &str = "0C8CDC32BDEC";

/// Characteristic handle subscribed to for notifications.
pub const HEART_RATE_CHARACTERISTIC: &str = "0026";

/// UART baud rate the HM-11 module is configured for.
pub const BAUD_RATE: u32 = 9600;

/// Resolves the device node path, honoring `HM11_DEVICE_PATH` if set.
pub fn device_path() -> String {
    std::env::var("HM11_DEVICE_PATH").unwrap_or_else(|_| DEVICE_PATH.to_string())
}

/// Resolves the TCP port, honoring `HM11_TCP_PORT` if set.
pub fn tcp_port() -> u16 {
    std::env::var("HM11_TCP_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(TCP_PORT)
}
