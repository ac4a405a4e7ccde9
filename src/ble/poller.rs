//! Poll scheduler - per-slot round-robin reads of the two monitored
//! characteristics.
//!
//! Each slot carries its own [`NextRead`] toggle, so the read cadence of
//! one peer never shifts another's.

use crate::ble::registry::PeerSlot;
use crate::ble::types::{uuid16_from_le, AttrHandle};
use crate::config::{FAN_CONTROL_UUID, LED_CONTROL_UUID};

/// Monitored characteristic kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Attribute {
    Led,
    Fan,
}

impl Attribute {
    /// Classify a discovered characteristic by its UUID bytes.
    pub fn from_uuid(uuid: &[u8]) -> Option<Self> {
        match uuid16_from_le(uuid)? {
            LED_CONTROL_UUID => Some(Attribute::Led),
            FAN_CONTROL_UUID => Some(Attribute::Fan),
            _ => None,
        }
    }
}

/// Which characteristic the slot reads next.
pub type NextRead = Attribute;

impl NextRead {
    pub fn toggled(self) -> Self {
        match self {
            Attribute::Led => Attribute::Fan,
            Attribute::Fan => Attribute::Led,
        }
    }
}

/// Store a discovered characteristic handle. Returns the kind recorded,
/// or `None` for characteristics we don't monitor.
pub fn record_handle(slot: &mut PeerSlot, handle: AttrHandle, uuid: &[u8]) -> Option<Attribute> {
    let attr = Attribute::from_uuid(uuid)?;
    match attr {
        Attribute::Led => slot.led_handle = Some(handle),
        Attribute::Fan => slot.fan_handle = Some(handle),
    }
    Some(attr)
}

/// Handle to read for the slot's current toggle position.
pub fn next_request(slot: &PeerSlot) -> Option<(Attribute, AttrHandle)> {
    let attr = slot.next_read;
    let handle = match attr {
        Attribute::Led => slot.led_handle,
        Attribute::Fan => slot.fan_handle,
    }?;
    Some((attr, handle))
}

/// A read finished; move the slot to the other characteristic.
pub fn advance(slot: &mut PeerSlot) {
    slot.next_read = slot.next_read.toggled();
}

/// Store a received value. Returns which attribute it belonged to, or
/// `None` if the handle isn't one of the slot's monitored handles or the
/// payload is empty.
pub fn record_value(slot: &mut PeerSlot, handle: AttrHandle, value: &[u8]) -> Option<Attribute> {
    let byte = *value.first()?;
    if slot.led_handle == Some(handle) {
        slot.led_value = byte;
        Some(Attribute::Led)
    } else if slot.fan_handle == Some(handle) {
        slot.fan_value = byte;
        Some(Attribute::Fan)
    } else {
        None
    }
}
