//! Advertisement data parsing and the target allow-list filter.
//!
//! Advertisement payloads are a sequence of AD structures:
//! `[len][type][len - 1 bytes of data]`. The walker below stops at the
//! first structure whose declared length runs past the buffer, so a
//! malformed report can never cause an out-of-bounds read.

use crate::ble::types::Address;
use crate::config::{MAX_NAME_LEN, SHORT_NAME_AD_TYPE, TARGET_NAMES};

/// Iterator over the `(ad_type, data)` pairs of an advertisement payload.
#[derive(Clone)]
pub struct AdStructures<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AdStructures<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.pos;
        let len = *self.data.get(i)? as usize;
        if len == 0 || i + len >= self.data.len() {
            // Zero length terminates the significant part; an overlong
            // length means the rest of the report can't be trusted.
            self.pos = self.data.len();
            return None;
        }
        let ad_type = self.data[i + 1];
        let payload = &self.data[i + 2..i + 1 + len];
        self.pos = i + len + 1;
        Some((ad_type, payload))
    }
}

/// Decode a name field. Oversized or non-UTF-8 names are rejected.
fn decode_name(bytes: &[u8]) -> Option<&str> {
    if bytes.len() > MAX_NAME_LEN {
        return None;
    }
    core::str::from_utf8(bytes).ok()
}

/// Iterate every Shortened Local Name carried by the report.
pub fn short_names(data: &[u8]) -> impl Iterator<Item = &str> {
    AdStructures::new(data)
        .filter(|(ad_type, _)| *ad_type == SHORT_NAME_AD_TYPE)
        .filter_map(|(_, bytes)| decode_name(bytes))
}

/// Slot index whose target name is exactly `name`.
pub fn target_slot(name: &str) -> Option<usize> {
    TARGET_NAMES.iter().position(|target| *target == name)
}

/// A report from one of our target peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TargetMatch {
    /// Slot assigned to this peer (`Server1` -> 0, `Server2` -> 1, ...).
    pub slot: usize,
    pub address: Address,
}

/// Check an advertisement against the allow-list. Returns the first
/// short name that exactly matches a target.
pub fn match_target(address: &Address, data: &[u8]) -> Option<TargetMatch> {
    short_names(data)
        .find_map(target_slot)
        .map(|slot| TargetMatch {
            slot,
            address: *address,
        })
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::types::AddressKind;

    const ADDR: Address = Address::new(AddressKind::Public, [1, 2, 3, 4, 5, 6]);

    #[test]
    fn walks_all_ad_structures() {
        let ad_data = [
            0x02, 0x01, 0x06, // Flags
            0x03, 0x03, 0xFF, 0x00, // 16-bit UUID 0x00FF
        ];
        let mut it = AdStructures::new(&ad_data);
        assert_eq!(it.next(), Some((0x01, &[0x06][..])));
        assert_eq!(it.next(), Some((0x03, &[0xFF, 0x00][..])));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn matches_each_target_to_its_slot() {
        for (slot, name) in TARGET_NAMES.iter().enumerate() {
            let mut ad_data = [0u8; 9];
            ad_data[0] = 0x08;
            ad_data[1] = SHORT_NAME_AD_TYPE;
            ad_data[2..].copy_from_slice(name.as_bytes());
            let found = match_target(&ADDR, &ad_data).unwrap();
            assert_eq!(found.slot, slot);
            assert_eq!(found.address, ADDR);
        }
    }

    #[test]
    fn match_after_flags_and_uuid_list() {
        // Same layout as the peripheral firmware advertises.
        let ad_data = [
            0x02, 0x01, 0x06, //
            0x08, 0x08, b'S', b'e', b'r', b'v', b'e', b'r', b'2', //
            0x03, 0x03, 0xFF, 0x00,
        ];
        assert_eq!(match_target(&ADDR, &ad_data).map(|m| m.slot), Some(1));
    }

    #[test]
    fn continues_past_non_matching_short_name() {
        let ad_data = [
            0x05, 0x08, b'L', b'a', b'm', b'p', //
            0x08, 0x08, b'S', b'e', b'r', b'v', b'e', b'r', b'3',
        ];
        assert_eq!(match_target(&ADDR, &ad_data).map(|m| m.slot), Some(2));
    }

    #[test]
    fn prefixes_and_suffixes_do_not_match() {
        let prefix = [0x07, 0x08, b'S', b'e', b'r', b'v', b'e', b'r'];
        assert!(match_target(&ADDR, &prefix).is_none());

        let suffix = [0x09, 0x08, b'S', b'e', b'r', b'v', b'e', b'r', b'1', b'0'];
        assert!(match_target(&ADDR, &suffix).is_none());
    }

    #[test]
    fn complete_local_name_is_not_a_short_name() {
        let ad_data = [0x08, 0x09, b'S', b'e', b'r', b'v', b'e', b'r', b'1'];
        assert!(match_target(&ADDR, &ad_data).is_none());
    }

    #[test]
    fn overlong_length_stops_scanning() {
        // Declared length 0x20 runs past the buffer.
        let ad_data = [0x20, 0x08, b'S', b'e', b'r', b'v', b'e', b'r', b'1'];
        assert!(match_target(&ADDR, &ad_data).is_none());
    }

    #[test]
    fn malformed_tail_does_not_hide_earlier_match() {
        let ad_data = [
            0x08, 0x08, b'S', b'e', b'r', b'v', b'e', b'r', b'1', //
            0x7F, 0x08, b'X',
        ];
        assert_eq!(match_target(&ADDR, &ad_data).map(|m| m.slot), Some(0));
    }

    #[test]
    fn zero_length_and_empty_reports() {
        assert!(match_target(&ADDR, &[]).is_none());
        assert!(match_target(&ADDR, &[0x00]).is_none());
        assert!(match_target(&ADDR, &[0x00, 0x08, b'S']).is_none());
    }

    #[test]
    fn invalid_utf8_name_is_skipped() {
        let ad_data = [
            0x03, 0x08, 0xFF, 0xFE, //
            0x08, 0x08, b'S', b'e', b'r', b'v', b'e', b'r', b'1',
        ];
        assert_eq!(match_target(&ADDR, &ad_data).map(|m| m.slot), Some(0));
    }

    #[test]
    fn lone_type_byte_yields_empty_name() {
        let ad_data = [0x01, 0x08];
        assert_eq!(short_names(&ad_data).next(), Some(""));
        assert!(match_target(&ADDR, &ad_data).is_none());
    }
}
