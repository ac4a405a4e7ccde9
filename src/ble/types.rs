//! Plain data types shared between the sequencer and the BLE stack.

use core::fmt::Write;

use heapless::String;

use crate::config;

/// Length of a rendered address: `XX:XX:XX:XX:XX:XX`.
pub const ADDRESS_TEXT_LEN: usize = 17;

/// Connection handle assigned by the stack when a connection is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkHandle(pub u8);

/// Link handles a stack has handed out and not yet seen closed.
///
/// Allocation walks forward from the last handle given out and skips any
/// still held, so a handle only comes back after its link closed.
#[derive(Clone, Debug)]
pub struct LinkPool {
    held: [u32; 8],
    next: u8,
}

impl LinkPool {
    pub const fn new(first: u8) -> Self {
        Self {
            held: [0; 8],
            next: first,
        }
    }

    /// Handle the next [`allocate`](Self::allocate) would return.
    pub fn peek(&self) -> Option<LinkHandle> {
        (0..=u8::MAX)
            .map(|offset| self.next.wrapping_add(offset))
            .find(|&h| !self.is_held(LinkHandle(h)))
            .map(LinkHandle)
    }

    /// `None` once all 256 handles are held.
    pub fn allocate(&mut self) -> Option<LinkHandle> {
        let link = self.peek()?;
        self.held[usize::from(link.0 / 32)] |= 1 << (link.0 % 32);
        self.next = link.0.wrapping_add(1);
        Some(link)
    }

    pub fn release(&mut self, link: LinkHandle) {
        self.held[usize::from(link.0 / 32)] &= !(1 << (link.0 % 32));
    }

    pub fn is_held(&self, link: LinkHandle) -> bool {
        self.held[usize::from(link.0 / 32)] & (1 << (link.0 % 32)) != 0
    }
}

/// GATT attribute (characteristic value) handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttrHandle(pub u16);

/// Opaque reference to a discovered primary service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceRef(pub u32);

/// Advertising set handle allocated by the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvSetHandle(pub u8);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressKind {
    Public,
    RandomStatic,
    RandomPrivateResolvable,
    RandomPrivateNonResolvable,
}

impl AddressKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AddressKind::Public => "public device",
            AddressKind::RandomStatic => "static random",
            AddressKind::RandomPrivateResolvable => "resolvable private",
            AddressKind::RandomPrivateNonResolvable => "non-resolvable private",
        }
    }
}

/// BLE device address. `bytes` are stored least significant byte first,
/// as they appear on air.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address {
    pub kind: AddressKind,
    pub bytes: [u8; 6],
}

impl Address {
    pub const fn new(kind: AddressKind, bytes: [u8; 6]) -> Self {
        Self { kind, bytes }
    }

    /// Render as `XX:XX:XX:XX:XX:XX`, most significant byte first.
    pub fn to_text(&self) -> String<ADDRESS_TEXT_LEN> {
        let b = &self.bytes;
        let mut s = String::new();
        // 17 bytes always fit.
        let _ = write!(
            &mut s,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        );
        s
    }
}

/// Decode a 16-bit UUID from its little-endian wire form.
/// Longer (128-bit) UUIDs are not used by our peers and yield `None`.
pub fn uuid16_from_le(bytes: &[u8]) -> Option<u16> {
    match bytes {
        [lo, hi] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanMode {
    Passive,
    Active,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phy {
    Le1M,
    Coded,
}

/// Scanner parameters. Interval and window are in 0.625 ms units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanParams {
    pub mode: ScanMode,
    pub interval: u16,
    pub window: u16,
    pub phy: Phy,
}

impl ScanParams {
    pub const fn default_passive() -> Self {
        Self {
            mode: ScanMode::Passive,
            interval: config::SCAN_INTERVAL,
            window: config::SCAN_WINDOW,
            phy: Phy::Le1M,
        }
    }
}

/// Default connection timing applied to every connection we open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnParams {
    pub interval_min: u16,
    pub interval_max: u16,
    pub latency: u16,
    pub timeout: u16,
    pub min_ce_length: u16,
    pub max_ce_length: u16,
}

impl ConnParams {
    pub const fn from_config() -> Self {
        Self {
            interval_min: config::CONN_INTERVAL_MIN,
            interval_max: config::CONN_INTERVAL_MAX,
            latency: config::CONN_PERIPHERAL_LATENCY,
            timeout: config::CONN_TIMEOUT,
            min_ce_length: config::CONN_MIN_CE_LENGTH,
            max_ce_length: config::CONN_MAX_CE_LENGTH,
        }
    }
}

/// Advertising timing. Intervals in 0.625 ms units; zero duration and
/// zero max events mean "advertise until stopped".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvTiming {
    pub interval_min: u32,
    pub interval_max: u32,
    pub duration: u16,
    pub max_events: u8,
}

impl AdvTiming {
    pub const fn from_config() -> Self {
        Self {
            interval_min: config::ADV_INTERVAL_MIN,
            interval_max: config::ADV_INTERVAL_MAX,
            duration: 0,
            max_events: 0,
        }
    }
}

/// Stack firmware version reported in the boot event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StackVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub build: u16,
}
