//! Application-wide constants and compile-time configuration.
//!
//! All timing parameters, target names, and GATT identifiers live here
//! so they can be tuned in one place.

// Peers

/// Number of peripheral slots the central drives concurrently.
pub const MAX_PEERS: usize = 3;

/// Shortened Local Name AD type.
pub const SHORT_NAME_AD_TYPE: u8 = 0x08;

/// Longest name a legacy advertisement can carry (31 bytes minus the
/// AD length and type bytes).
pub const MAX_NAME_LEN: usize = 29;

/// Short names we connect to. Index `n` is assigned to slot `n`.
pub const TARGET_NAMES: [&str; MAX_PEERS] = ["Server1", "Server2", "Server3"];

// Scanner

/// Scan interval (0.625 ms units). 320 = 200 ms.
pub const SCAN_INTERVAL: u16 = 320;

/// Scan window (0.625 ms units). 160 = 100 ms.
pub const SCAN_WINDOW: u16 = 160;

// Connection

/// Default connection interval range (1.25 ms units).
pub const CONN_INTERVAL_MIN: u16 = 80;
pub const CONN_INTERVAL_MAX: u16 = 80;

/// Peripheral latency (connection events the peripheral may skip).
pub const CONN_PERIPHERAL_LATENCY: u16 = 0;

/// Supervision timeout (10 ms units).
pub const CONN_TIMEOUT: u16 = 100;

/// Connection event length bounds.
pub const CONN_MIN_CE_LENGTH: u16 = 0;
pub const CONN_MAX_CE_LENGTH: u16 = 0xffff;

// GATT

/// Primary service exposed by every peer.
pub const SERVICE_UUID: u16 = 0x00ff;

/// LED control characteristic.
pub const LED_CONTROL_UUID: u16 = 0xff01;

/// Fan control characteristic.
pub const FAN_CONTROL_UUID: u16 = 0xff02;

// Broadcast

/// Short name carried in our own advertisement.
pub const BROADCAST_NAME: &[u8] = b"Sillab";

/// Advertising interval range (0.625 ms units). 160 = 100 ms.
pub const ADV_INTERVAL_MIN: u32 = 160;
pub const ADV_INTERVAL_MAX: u32 = 160;

/// Bluetooth SIG company identifier used in the manufacturer trailer.
pub const COMPANY_ID: u16 = 0x02ff;

// Radio adapter (embedded binary)

/// Give up on a connection attempt after this many seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// How often open links are checked for a silent drop (milliseconds).
pub const LINK_SWEEP_INTERVAL_MS: u64 = 500;

/// Largest characteristic value kept from a read.
pub const MAX_VALUE_LEN: usize = 20;
