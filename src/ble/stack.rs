//! Boundary to the BLE protocol stack.
//!
//! The sequencer never talks to the radio directly. It issues
//! fire-and-forget commands through [`BleStack`] and receives the
//! outcomes later as [`StackEvent`]s, one at a time, in arrival order.

use crate::ble::types::{
    AdvSetHandle, AdvTiming, Address, AttrHandle, ConnParams, LinkHandle, Phy, ScanParams,
    ServiceRef, StackVersion,
};
use crate::error::StackError;

/// Commands the central issues to the BLE stack.
///
/// Every method returns as soon as the stack has accepted (or rejected)
/// the command. Results of accepted commands arrive as events.
pub trait BleStack {
    /// Identity address of this node.
    fn identity_address(&mut self) -> Result<Address, StackError>;

    fn start_scan(&mut self, params: &ScanParams) -> Result<(), StackError>;

    fn stop_scan(&mut self) -> Result<(), StackError>;

    fn set_default_connection_params(&mut self, params: &ConnParams) -> Result<(), StackError>;

    /// Start connecting to `address`. The returned handle identifies the
    /// link in the later `LinkOpened` / `LinkClosed` events.
    fn open_connection(&mut self, address: &Address, phy: Phy) -> Result<LinkHandle, StackError>;

    fn discover_primary_services_by_uuid(
        &mut self,
        link: LinkHandle,
        uuid: u16,
    ) -> Result<(), StackError>;

    fn discover_characteristics(
        &mut self,
        link: LinkHandle,
        service: ServiceRef,
    ) -> Result<(), StackError>;

    fn read_characteristic_value(
        &mut self,
        link: LinkHandle,
        characteristic: AttrHandle,
    ) -> Result<(), StackError>;

    fn create_advertising_set(&mut self) -> Result<AdvSetHandle, StackError>;

    /// Replace the legacy advertising payload. Accepted while advertising.
    fn set_advertising_data(&mut self, set: AdvSetHandle, data: &[u8]) -> Result<(), StackError>;

    fn set_advertising_timing(
        &mut self,
        set: AdvSetHandle,
        timing: &AdvTiming,
    ) -> Result<(), StackError>;

    /// Start non-connectable advertising. Accepted while already advertising.
    fn start_advertising(&mut self, set: AdvSetHandle) -> Result<(), StackError>;

    fn stop_advertising(&mut self, set: AdvSetHandle) -> Result<(), StackError>;
}

/// Events delivered by the BLE stack. Payload slices borrow the stack's
/// event buffer and are only valid while the event is being handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackEvent<'a> {
    /// The stack is up; no command may be issued before this.
    Boot(StackVersion),

    /// Legacy advertisement received while scanning.
    AdvertisementReport {
        address: Address,
        rssi: i8,
        data: &'a [u8],
    },

    /// A connection started with `open_connection` is established.
    LinkOpened { link: LinkHandle, address: Address },

    /// A link closed, or an open attempt failed.
    LinkClosed { link: LinkHandle, reason: u16 },

    /// A primary service matched a service discovery request.
    ServiceDiscovered {
        link: LinkHandle,
        service: ServiceRef,
        uuid: &'a [u8],
    },

    /// A characteristic was found during characteristic discovery.
    CharacteristicDiscovered {
        link: LinkHandle,
        characteristic: AttrHandle,
        uuid: &'a [u8],
    },

    /// Result of a read request.
    CharacteristicValue {
        link: LinkHandle,
        characteristic: AttrHandle,
        value: &'a [u8],
    },

    /// A GATT procedure (discovery or read) on `link` finished.
    ProcedureCompleted {
        link: LinkHandle,
        result: Result<(), StackError>,
    },
}
