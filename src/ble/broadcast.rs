//! Broadcast composer - republishes the polled peer state in our own
//! non-connectable advertisement.
//!
//! Payload layout (30 bytes, fits a legacy advertisement):
//! ```text
//! [0..3)   Flags AD                 02 01 06
//! [3..11)  Shortened Local Name AD  07 08 'S' 'i' 'l' 'l' 'a' 'b'
//! [11..26) 3 x peer summary         tag 'L' led 'F' fan   (tag = '1'..'3')
//! [26..30) Manufacturer data AD     03 FF <company id LE>
//! ```

use crate::ble::registry::PeerRegistry;
use crate::ble::stack::BleStack;
use crate::ble::types::{AdvSetHandle, AdvTiming};
use crate::config::{BROADCAST_NAME, COMPANY_ID, MAX_PEERS};
use crate::error::{Command, Error, StackError};

const FLAGS_AD: [u8; 3] = [0x02, 0x01, 0x06];
const SHORT_NAME_AD_TYPE: u8 = 0x08;
const MANUFACTURER_AD_TYPE: u8 = 0xff;

/// Bytes per peer summary block.
pub const PEER_BLOCK_LEN: usize = 5;

const NAME_AD_LEN: usize = 2 + BROADCAST_NAME.len();
const TRAILER_LEN: usize = 4;

/// Offset of the first peer block.
pub const PEER_BLOCKS_OFFSET: usize = FLAGS_AD.len() + NAME_AD_LEN;

/// Total payload length.
pub const BROADCAST_PAYLOAD_LEN: usize =
    PEER_BLOCKS_OFFSET + MAX_PEERS * PEER_BLOCK_LEN + TRAILER_LEN;

pub type BroadcastPayload = [u8; BROADCAST_PAYLOAD_LEN];

/// Render a polled value as one printable digit. Values above 9 saturate.
pub fn digit(value: u8) -> u8 {
    b'0' + value.min(9)
}

/// Serialise the registry's current values. Pure function of the
/// registry's values, so unchanged values give identical bytes.
pub fn compose(registry: &PeerRegistry) -> BroadcastPayload {
    let mut out = [0u8; BROADCAST_PAYLOAD_LEN];
    let mut pos = 0;

    out[pos..pos + FLAGS_AD.len()].copy_from_slice(&FLAGS_AD);
    pos += FLAGS_AD.len();

    out[pos] = (1 + BROADCAST_NAME.len()) as u8;
    out[pos + 1] = SHORT_NAME_AD_TYPE;
    out[pos + 2..pos + NAME_AD_LEN].copy_from_slice(BROADCAST_NAME);
    pos += NAME_AD_LEN;

    for slot in registry.slots() {
        out[pos..pos + PEER_BLOCK_LEN].copy_from_slice(&[
            b'1' + slot.slot_id as u8,
            b'L',
            digit(slot.led_value),
            b'F',
            digit(slot.fan_value),
        ]);
        pos += PEER_BLOCK_LEN;
    }

    let company = COMPANY_ID.to_le_bytes();
    out[pos..].copy_from_slice(&[0x03, MANUFACTURER_AD_TYPE, company[0], company[1]]);
    out
}

/// Owns the advertising set and the last payload handed to the stack.
pub struct Broadcaster {
    set: Option<AdvSetHandle>,
    last: Option<BroadcastPayload>,
}

impl Broadcaster {
    pub const fn new() -> Self {
        Self {
            set: None,
            last: None,
        }
    }

    pub fn set_handle(&self) -> Option<AdvSetHandle> {
        self.set
    }

    pub fn last_payload(&self) -> Option<&BroadcastPayload> {
        self.last.as_ref()
    }

    /// Allocate the advertising set. Called once at boot.
    pub fn create<S: BleStack>(&mut self, stack: &mut S) -> Result<AdvSetHandle, Error> {
        let set = stack
            .create_advertising_set()
            .map_err(|e| Error::stack(Command::CreateAdvertisingSet, e))?;
        self.set = Some(set);
        Ok(set)
    }

    /// Compose and hand the payload to the stack, then (re)issue timing
    /// and start. The stack accepts these while already advertising.
    pub fn publish<S: BleStack>(
        &mut self,
        stack: &mut S,
        registry: &PeerRegistry,
    ) -> Result<(), Error> {
        let set = self
            .set
            .ok_or(Error::stack(Command::SetAdvertisingData, StackError::InvalidState))?;
        let payload = compose(registry);
        stack
            .set_advertising_data(set, &payload)
            .map_err(|e| Error::stack(Command::SetAdvertisingData, e))?;
        self.last = Some(payload);
        stack
            .set_advertising_timing(set, &AdvTiming::from_config())
            .map_err(|e| Error::stack(Command::SetAdvertisingTiming, e))?;
        stack
            .start_advertising(set)
            .map_err(|e| Error::stack(Command::StartAdvertising, e))?;
        Ok(())
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_fits_legacy_advertisement() {
        assert_eq!(BROADCAST_PAYLOAD_LEN, 30);
        assert!(BROADCAST_PAYLOAD_LEN <= 31);
        assert_eq!(PEER_BLOCKS_OFFSET, 11);
    }

    #[test]
    fn initial_payload_layout() {
        let payload = compose(&PeerRegistry::new());
        assert_eq!(&payload[..3], &[0x02, 0x01, 0x06]);
        assert_eq!(&payload[3..11], b"\x07\x08Sillab");
        assert_eq!(&payload[11..16], b"1L0F0");
        assert_eq!(&payload[16..21], b"2L0F0");
        assert_eq!(&payload[21..26], b"3L0F0");
        assert_eq!(&payload[26..], &[0x03, 0xff, 0xff, 0x02]);
    }

    #[test]
    fn values_render_as_digits() {
        let mut reg = PeerRegistry::new();
        reg.get_mut(0).unwrap().led_value = 1;
        reg.get_mut(2).unwrap().fan_value = 2;
        reg.get_mut(1).unwrap().fan_value = 200;

        let payload = compose(&reg);
        assert_eq!(&payload[11..16], b"1L1F0");
        assert_eq!(&payload[16..21], b"2L0F9");
        assert_eq!(&payload[21..26], b"3L0F2");
    }

    #[test]
    fn compose_is_idempotent() {
        let mut reg = PeerRegistry::new();
        reg.get_mut(1).unwrap().led_value = 1;
        assert_eq!(compose(&reg), compose(&reg));
    }

    #[test]
    fn digit_saturates() {
        assert_eq!(digit(0), b'0');
        assert_eq!(digit(9), b'9');
        assert_eq!(digit(10), b'9');
    }
}
