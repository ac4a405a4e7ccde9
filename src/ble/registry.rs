//! Peer registry - fixed table of connection slots.
//!
//! Slot `n` always tracks target peer `n`. Slots are never added or
//! removed; a disconnect only resets their mutable fields.

use heapless::String;

use crate::ble::poller::NextRead;
use crate::ble::types::{Address, AttrHandle, LinkHandle, ServiceRef, ADDRESS_TEXT_LEN};
use crate::config::{MAX_NAME_LEN, MAX_PEERS, TARGET_NAMES};
use crate::error::Error;

/// Link lifecycle of a single slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkStatus {
    Disconnected,
    /// `open_connection` accepted, waiting for the link to open.
    Connecting,
    /// Link open, discovery not started yet.
    Connected,
    /// Service or characteristic discovery running.
    Discovering,
    /// Steady-state value reads.
    Polling,
}

impl LinkStatus {
    /// Counted as a live peer.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            LinkStatus::Connected | LinkStatus::Discovering | LinkStatus::Polling
        )
    }
}

/// GATT procedure the slot is waiting on. A `ProcedureCompleted` event
/// is routed by this, so completions for different slots never mix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Procedure {
    Idle,
    ServiceDiscovery,
    CharacteristicDiscovery,
    Read,
}

/// One peer relationship.
#[derive(Clone, Debug)]
pub struct PeerSlot {
    pub slot_id: usize,
    pub link: Option<LinkHandle>,
    pub address: Option<Address>,
    pub display_name: String<MAX_NAME_LEN>,
    pub address_text: String<ADDRESS_TEXT_LEN>,
    pub service: Option<ServiceRef>,
    pub led_handle: Option<AttrHandle>,
    pub fan_handle: Option<AttrHandle>,
    pub led_value: u8,
    pub fan_value: u8,
    pub status: LinkStatus,
    pub procedure: Procedure,
    pub next_read: NextRead,
}

impl PeerSlot {
    pub const fn empty(slot_id: usize) -> Self {
        Self {
            slot_id,
            link: None,
            address: None,
            display_name: String::new(),
            address_text: String::new(),
            service: None,
            led_handle: None,
            fan_handle: None,
            led_value: 0,
            fan_value: 0,
            status: LinkStatus::Disconnected,
            procedure: Procedure::Idle,
            next_read: NextRead::Led,
        }
    }

    /// Both monitored characteristics have been discovered.
    pub fn poll_ready(&self) -> bool {
        self.led_handle.is_some() && self.fan_handle.is_some()
    }

    /// Drop everything tied to the current link. Identity and the last
    /// polled values survive.
    pub fn reset(&mut self) {
        self.link = None;
        self.address = None;
        self.display_name.clear();
        self.address_text.clear();
        self.service = None;
        self.led_handle = None;
        self.fan_handle = None;
        self.status = LinkStatus::Disconnected;
        self.procedure = Procedure::Idle;
        self.next_read = NextRead::Led;
    }
}

pub struct PeerRegistry {
    slots: [PeerSlot; MAX_PEERS],
}

impl PeerRegistry {
    pub const fn new() -> Self {
        Self {
            slots: [PeerSlot::empty(0), PeerSlot::empty(1), PeerSlot::empty(2)],
        }
    }

    pub fn slots(&self) -> &[PeerSlot; MAX_PEERS] {
        &self.slots
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [PeerSlot; MAX_PEERS] {
        &mut self.slots
    }

    pub fn get(&self, slot: usize) -> Option<&PeerSlot> {
        self.slots.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut PeerSlot> {
        self.slots.get_mut(slot)
    }

    /// Slot currently holding `link`.
    pub fn slot_of(&self, link: LinkHandle) -> Option<usize> {
        self.slots.iter().position(|s| s.link == Some(link))
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.status.is_live()).count()
    }

    /// A connection attempt is outstanding on some slot.
    pub fn connect_pending(&self) -> bool {
        self.slots
            .iter()
            .any(|s| s.status == LinkStatus::Connecting)
    }

    /// Record an accepted `open_connection` for `slot`.
    pub fn begin_connect(
        &mut self,
        slot: usize,
        link: LinkHandle,
        address: Address,
    ) -> Result<(), Error> {
        if slot >= MAX_PEERS {
            return Err(Error::SlotOutOfRange);
        }
        if self.slot_of(link).is_some() {
            return Err(Error::DuplicateLink);
        }
        let s = &mut self.slots[slot];
        s.reset();
        s.link = Some(link);
        s.address = Some(address);
        s.status = LinkStatus::Connecting;
        Ok(())
    }

    /// The link for `slot` is open. Fills in the human-readable fields.
    pub fn mark_connected(&mut self, slot: usize, address: Address) -> Result<(), Error> {
        let s = self.slots.get_mut(slot).ok_or(Error::SlotOutOfRange)?;
        s.status = LinkStatus::Connected;
        s.address = Some(address);
        s.display_name.clear();
        // Target names are far shorter than the capacity.
        let _ = s.display_name.push_str(TARGET_NAMES[slot]);
        s.address_text = address.to_text();
        Ok(())
    }

    /// Reset `slot`. Returns whether it was counted as live.
    pub fn release(&mut self, slot: usize) -> bool {
        match self.slots.get_mut(slot) {
            Some(s) => {
                let was_live = s.status.is_live();
                s.reset();
                was_live
            }
            None => false,
        }
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::types::AddressKind;

    const ADDR: Address = Address::new(AddressKind::Public, [6, 5, 4, 3, 2, 1]);

    #[test]
    fn slots_start_disconnected_with_stable_ids() {
        let reg = PeerRegistry::new();
        for (i, slot) in reg.slots().iter().enumerate() {
            assert_eq!(slot.slot_id, i);
            assert_eq!(slot.status, LinkStatus::Disconnected);
            assert!(slot.link.is_none());
            assert_eq!(slot.led_value, 0);
        }
        assert_eq!(reg.live_count(), 0);
        assert!(!reg.connect_pending());
    }

    #[test]
    fn connect_then_open_counts_as_live() {
        let mut reg = PeerRegistry::new();
        reg.begin_connect(1, LinkHandle(7), ADDR).unwrap();
        assert!(reg.connect_pending());
        assert_eq!(reg.live_count(), 0);
        assert_eq!(reg.slot_of(LinkHandle(7)), Some(1));

        reg.mark_connected(1, ADDR).unwrap();
        let slot = reg.get(1).unwrap();
        assert_eq!(slot.status, LinkStatus::Connected);
        assert_eq!(slot.display_name.as_str(), "Server2");
        assert_eq!(slot.address_text.as_str(), "01:02:03:04:05:06");
        assert_eq!(reg.live_count(), 1);
        assert!(!reg.connect_pending());
    }

    #[test]
    fn link_handle_is_unique_across_slots() {
        let mut reg = PeerRegistry::new();
        reg.begin_connect(0, LinkHandle(1), ADDR).unwrap();
        assert_eq!(
            reg.begin_connect(2, LinkHandle(1), ADDR),
            Err(Error::DuplicateLink)
        );
        assert_eq!(
            reg.begin_connect(3, LinkHandle(2), ADDR),
            Err(Error::SlotOutOfRange)
        );
    }

    #[test]
    fn release_keeps_identity_and_values() {
        let mut reg = PeerRegistry::new();
        reg.begin_connect(2, LinkHandle(3), ADDR).unwrap();
        reg.mark_connected(2, ADDR).unwrap();
        {
            let s = reg.get_mut(2).unwrap();
            s.led_handle = Some(AttrHandle(0x10));
            s.fan_handle = Some(AttrHandle(0x12));
            s.led_value = 1;
            s.next_read = NextRead::Fan;
        }

        assert!(reg.release(2));
        let s = reg.get(2).unwrap();
        assert_eq!(s.slot_id, 2);
        assert_eq!(s.status, LinkStatus::Disconnected);
        assert!(s.link.is_none() && s.led_handle.is_none() && s.fan_handle.is_none());
        assert_eq!(s.next_read, NextRead::Led);
        assert_eq!(s.led_value, 1);
        assert!(s.display_name.is_empty());
        assert_eq!(reg.slot_of(LinkHandle(3)), None);

        // Releasing a slot that was never live is not counted.
        assert!(!reg.release(0));
        assert!(!reg.release(9));
    }
}
