//! Recording [`BleStack`] used by tests to script command results and
//! inspect what the sequencer issued.

use heapless::Vec;

use crate::ble::stack::{BleStack, StackEvent};
use crate::ble::types::{
    AdvSetHandle, AdvTiming, Address, AddressKind, AttrHandle, ConnParams, LinkHandle, LinkPool,
    Phy, ScanParams, ServiceRef,
};
use crate::error::{Command, StackError};

/// Commands captured by [`FakeStack`], in issue order. Rejected commands
/// are recorded too.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Issued {
    IdentityAddress,
    StartScan(ScanParams),
    StopScan,
    SetConnectionParams(ConnParams),
    OpenConnection(Address),
    DiscoverServices(LinkHandle, u16),
    DiscoverCharacteristics(LinkHandle, ServiceRef),
    Read(LinkHandle, AttrHandle),
    CreateAdvertisingSet,
    SetAdvertisingData(AdvSetHandle, Vec<u8, 31>),
    SetAdvertisingTiming(AdvSetHandle, AdvTiming),
    StartAdvertising(AdvSetHandle),
    StopAdvertising(AdvSetHandle),
}

pub struct FakeStack {
    issued: Vec<Issued, 128>,
    failures: Vec<(Command, StackError), 8>,
    links: LinkPool,
    forced_link: Option<LinkHandle>,
    pub identity: Address,
}

impl FakeStack {
    pub fn new() -> Self {
        Self {
            issued: Vec::new(),
            failures: Vec::new(),
            links: LinkPool::new(1),
            forced_link: None,
            identity: Address::new(AddressKind::RandomStatic, [0x11, 0x22, 0x33, 0x44, 0x55, 0xc6]),
        }
    }

    /// Reject the next `op` with `err`. Several failures may be queued;
    /// each is consumed by the first matching command.
    pub fn fail_next(&mut self, op: Command, err: StackError) {
        let _ = self.failures.push((op, err));
    }

    pub fn issued(&self) -> &[Issued] {
        &self.issued
    }

    pub fn clear(&mut self) {
        self.issued.clear();
    }

    /// Handle the next accepted `open_connection` will return, `None` when
    /// every handle is held.
    pub fn peek_link(&self) -> Option<LinkHandle> {
        self.forced_link.or_else(|| self.links.peek())
    }

    /// Hand out `link` on the next accepted `open_connection`, held or not.
    pub fn reuse_link_next(&mut self, link: LinkHandle) {
        self.forced_link = Some(link);
    }

    /// Free `link` the way the radio does once the link is gone, and build
    /// the matching event.
    pub fn close_link(&mut self, link: LinkHandle, reason: u16) -> StackEvent<'static> {
        self.links.release(link);
        StackEvent::LinkClosed { link, reason }
    }

    pub fn count(&self, pred: impl Fn(&Issued) -> bool) -> usize {
        self.issued.iter().filter(|i| pred(i)).count()
    }

    fn record(&mut self, op: Command, issued: Issued) -> Result<(), StackError> {
        let _ = self.issued.push(issued);
        match self.failures.iter().position(|(f, _)| *f == op) {
            Some(i) => Err(self.failures.remove(i).1),
            None => Ok(()),
        }
    }
}

impl Default for FakeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl BleStack for FakeStack {
    fn identity_address(&mut self) -> Result<Address, StackError> {
        self.record(Command::IdentityAddress, Issued::IdentityAddress)?;
        Ok(self.identity)
    }

    fn start_scan(&mut self, params: &ScanParams) -> Result<(), StackError> {
        self.record(Command::StartScan, Issued::StartScan(*params))
    }

    fn stop_scan(&mut self) -> Result<(), StackError> {
        self.record(Command::StopScan, Issued::StopScan)
    }

    fn set_default_connection_params(&mut self, params: &ConnParams) -> Result<(), StackError> {
        self.record(
            Command::SetConnectionParameters,
            Issued::SetConnectionParams(*params),
        )
    }

    fn open_connection(&mut self, address: &Address, _phy: Phy) -> Result<LinkHandle, StackError> {
        self.record(Command::OpenConnection, Issued::OpenConnection(*address))?;
        match self.forced_link.take() {
            Some(link) => Ok(link),
            None => self.links.allocate().ok_or(StackError::NoResources),
        }
    }

    fn discover_primary_services_by_uuid(
        &mut self,
        link: LinkHandle,
        uuid: u16,
    ) -> Result<(), StackError> {
        self.record(Command::DiscoverServices, Issued::DiscoverServices(link, uuid))
    }

    fn discover_characteristics(
        &mut self,
        link: LinkHandle,
        service: ServiceRef,
    ) -> Result<(), StackError> {
        self.record(
            Command::DiscoverCharacteristics,
            Issued::DiscoverCharacteristics(link, service),
        )
    }

    fn read_characteristic_value(
        &mut self,
        link: LinkHandle,
        characteristic: AttrHandle,
    ) -> Result<(), StackError> {
        self.record(Command::ReadValue, Issued::Read(link, characteristic))
    }

    fn create_advertising_set(&mut self) -> Result<AdvSetHandle, StackError> {
        self.record(Command::CreateAdvertisingSet, Issued::CreateAdvertisingSet)?;
        Ok(AdvSetHandle(0))
    }

    fn set_advertising_data(&mut self, set: AdvSetHandle, data: &[u8]) -> Result<(), StackError> {
        let payload = Vec::from_slice(data).map_err(|_| StackError::Raw(0x0c))?;
        self.record(
            Command::SetAdvertisingData,
            Issued::SetAdvertisingData(set, payload),
        )
    }

    fn set_advertising_timing(
        &mut self,
        set: AdvSetHandle,
        timing: &AdvTiming,
    ) -> Result<(), StackError> {
        self.record(
            Command::SetAdvertisingTiming,
            Issued::SetAdvertisingTiming(set, *timing),
        )
    }

    fn start_advertising(&mut self, set: AdvSetHandle) -> Result<(), StackError> {
        self.record(Command::StartAdvertising, Issued::StartAdvertising(set))
    }

    fn stop_advertising(&mut self, set: AdvSetHandle) -> Result<(), StackError> {
        self.record(Command::StopAdvertising, Issued::StopAdvertising(set))
    }
}
