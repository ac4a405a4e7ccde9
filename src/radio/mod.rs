//! SoftDevice adapter for the sequencer.
//!
//! [`SoftdeviceStack`] turns each `BleStack` command into a message for
//! one of the radio tasks and returns at once:
//!
//! 1. **GAP task** ([`gap`]) - scanning and connection establishment.
//!    Both share the scanner, so they are served from one queue in order.
//! 2. **GATT task** ([`gatt`]) - owns the open links, runs discovery and
//!    reads, and notices links that dropped.
//! 3. **Advertiser task** ([`advertiser`]) - keeps our broadcast on air.
//!
//! Outcomes come back through [`EVENTS`] as owned [`RadioEvent`]s, which
//! the sequencer task lends out as `StackEvent`s one at a time.

pub mod advertiser;
pub mod gap;
pub mod gatt;

use defmt::Format;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use heapless::Vec;
use nrf_softdevice::ble::{self as sd_ble, AddressType};
use nrf_softdevice::{raw, Softdevice};

use trio_central::ble::types::{
    AdvSetHandle, AdvTiming, Address, AddressKind, AttrHandle, ConnParams, LinkHandle, LinkPool,
    Phy, ScanParams, ServiceRef, StackVersion,
};
use trio_central::config::MAX_VALUE_LEN;
use trio_central::{BleStack, StackError, StackEvent};

use advertiser::AdvRequest;
use gap::GapCommand;
use gatt::GattCommand;

/// Largest legacy advertising payload.
pub const LEGACY_ADV_LEN: usize = 31;

const EVENT_QUEUE_DEPTH: usize = 16;

/// Radio tasks -> sequencer task.
pub static EVENTS: Channel<CriticalSectionRawMutex, RadioEvent, EVENT_QUEUE_DEPTH> =
    Channel::new();

/// Sequencer -> GAP task.
pub static GAP_COMMANDS: Channel<CriticalSectionRawMutex, GapCommand, 4> = Channel::new();

/// Sequencer -> GATT task.
pub static GATT_COMMANDS: Channel<CriticalSectionRawMutex, GattCommand, 8> = Channel::new();

/// Latest advertising request. Only the newest one matters.
pub static ADVERTISING: Signal<CriticalSectionRawMutex, AdvRequest> = Signal::new();

/// Owned form of [`StackEvent`], so it can cross a channel.
#[derive(Clone, Format)]
pub enum RadioEvent {
    Boot(StackVersion),
    Report {
        address: Address,
        rssi: i8,
        data: Vec<u8, LEGACY_ADV_LEN>,
    },
    LinkOpened {
        link: LinkHandle,
        address: Address,
    },
    LinkClosed {
        link: LinkHandle,
        reason: u16,
    },
    ServiceDiscovered {
        link: LinkHandle,
        service: ServiceRef,
        uuid: [u8; 2],
    },
    CharacteristicDiscovered {
        link: LinkHandle,
        characteristic: AttrHandle,
        uuid: [u8; 2],
    },
    CharacteristicValue {
        link: LinkHandle,
        characteristic: AttrHandle,
        value: Vec<u8, MAX_VALUE_LEN>,
    },
    ProcedureCompleted {
        link: LinkHandle,
        result: Result<(), StackError>,
    },
}

impl RadioEvent {
    pub fn as_stack_event(&self) -> StackEvent<'_> {
        match self {
            RadioEvent::Boot(version) => StackEvent::Boot(*version),
            RadioEvent::Report {
                address,
                rssi,
                data,
            } => StackEvent::AdvertisementReport {
                address: *address,
                rssi: *rssi,
                data,
            },
            RadioEvent::LinkOpened { link, address } => StackEvent::LinkOpened {
                link: *link,
                address: *address,
            },
            RadioEvent::LinkClosed { link, reason } => StackEvent::LinkClosed {
                link: *link,
                reason: *reason,
            },
            RadioEvent::ServiceDiscovered {
                link,
                service,
                uuid,
            } => StackEvent::ServiceDiscovered {
                link: *link,
                service: *service,
                uuid,
            },
            RadioEvent::CharacteristicDiscovered {
                link,
                characteristic,
                uuid,
            } => StackEvent::CharacteristicDiscovered {
                link: *link,
                characteristic: *characteristic,
                uuid,
            },
            RadioEvent::CharacteristicValue {
                link,
                characteristic,
                value,
            } => StackEvent::CharacteristicValue {
                link: *link,
                characteristic: *characteristic,
                value,
            },
            RadioEvent::ProcedureCompleted { link, result } => StackEvent::ProcedureCompleted {
                link: *link,
                result: *result,
            },
        }
    }
}

pub fn to_sd_address(address: &Address) -> sd_ble::Address {
    let kind = match address.kind {
        AddressKind::Public => AddressType::Public,
        AddressKind::RandomStatic => AddressType::RandomStatic,
        AddressKind::RandomPrivateResolvable => AddressType::RandomPrivateResolvable,
        AddressKind::RandomPrivateNonResolvable => AddressType::RandomPrivateNonResolvable,
    };
    sd_ble::Address::new(kind, address.bytes)
}

pub fn from_sd_address(address: &sd_ble::Address) -> Address {
    let kind = match address.address_type() {
        AddressType::Public => AddressKind::Public,
        AddressType::RandomStatic => AddressKind::RandomStatic,
        AddressType::RandomPrivateResolvable => AddressKind::RandomPrivateResolvable,
        _ => AddressKind::RandomPrivateNonResolvable,
    };
    Address::new(kind, address.bytes())
}

/// Version reported by the SoftDevice's link layer.
pub fn stack_version() -> StackVersion {
    let mut version = raw::ble_version_t {
        version_number: 0,
        company_id: 0,
        subversion_number: 0,
    };
    // SAFETY: the SoftDevice is enabled and `version` outlives the call.
    let ret = unsafe { raw::sd_ble_version_get(&mut version) };
    if ret != raw::NRF_SUCCESS {
        defmt::warn!("sd_ble_version_get failed: {}", ret);
    }
    StackVersion {
        major: u16::from(version.version_number),
        minor: 0,
        patch: 0,
        build: version.subversion_number,
    }
}

/// [`BleStack`] backed by the radio tasks.
pub struct SoftdeviceStack {
    sd: &'static Softdevice,
    conn_params: ConnParams,
    links: LinkPool,
    adv_set: Option<AdvSetHandle>,
    adv_data: Vec<u8, LEGACY_ADV_LEN>,
    adv_timing: AdvTiming,
}

impl SoftdeviceStack {
    pub fn new(sd: &'static Softdevice) -> Self {
        Self {
            sd,
            conn_params: ConnParams::from_config(),
            links: LinkPool::new(0),
            adv_set: None,
            adv_data: Vec::new(),
            adv_timing: AdvTiming::from_config(),
        }
    }

    fn gap(&self, cmd: GapCommand) -> Result<(), StackError> {
        GAP_COMMANDS.try_send(cmd).map_err(|_| StackError::Busy)
    }

    fn gatt(&self, cmd: GattCommand) -> Result<(), StackError> {
        GATT_COMMANDS.try_send(cmd).map_err(|_| StackError::Busy)
    }

    /// Return the handle of a closed link to the pool. Call once the
    /// sequencer has seen the event.
    pub fn link_event(&mut self, event: &RadioEvent) {
        if let RadioEvent::LinkClosed { link, .. } = *event {
            self.links.release(link);
        }
    }

    fn check_set(&self, set: AdvSetHandle) -> Result<(), StackError> {
        match self.adv_set {
            Some(own) if own == set => Ok(()),
            _ => Err(StackError::InvalidHandle),
        }
    }
}

impl BleStack for SoftdeviceStack {
    fn identity_address(&mut self) -> Result<Address, StackError> {
        Ok(from_sd_address(&sd_ble::get_address(self.sd)))
    }

    fn start_scan(&mut self, params: &ScanParams) -> Result<(), StackError> {
        self.gap(GapCommand::StartScan(*params))
    }

    fn stop_scan(&mut self) -> Result<(), StackError> {
        self.gap(GapCommand::StopScan)
    }

    fn set_default_connection_params(&mut self, params: &ConnParams) -> Result<(), StackError> {
        self.conn_params = *params;
        Ok(())
    }

    fn open_connection(&mut self, address: &Address, phy: Phy) -> Result<LinkHandle, StackError> {
        let link = self.links.allocate().ok_or(StackError::NoResources)?;
        let connect = GapCommand::Connect {
            link,
            address: *address,
            phy,
            params: self.conn_params,
        };
        if let Err(e) = self.gap(connect) {
            self.links.release(link);
            return Err(e);
        }
        Ok(link)
    }

    fn discover_primary_services_by_uuid(
        &mut self,
        link: LinkHandle,
        uuid: u16,
    ) -> Result<(), StackError> {
        self.gatt(GattCommand::DiscoverServices { link, uuid })
    }

    fn discover_characteristics(
        &mut self,
        link: LinkHandle,
        service: ServiceRef,
    ) -> Result<(), StackError> {
        self.gatt(GattCommand::DiscoverCharacteristics { link, service })
    }

    fn read_characteristic_value(
        &mut self,
        link: LinkHandle,
        characteristic: AttrHandle,
    ) -> Result<(), StackError> {
        self.gatt(GattCommand::Read {
            link,
            characteristic,
        })
    }

    fn create_advertising_set(&mut self) -> Result<AdvSetHandle, StackError> {
        if self.adv_set.is_some() {
            return Err(StackError::NoResources);
        }
        let set = AdvSetHandle(0);
        self.adv_set = Some(set);
        Ok(set)
    }

    fn set_advertising_data(&mut self, set: AdvSetHandle, data: &[u8]) -> Result<(), StackError> {
        self.check_set(set)?;
        self.adv_data =
            Vec::from_slice(data).map_err(|_| StackError::Raw(raw::NRF_ERROR_DATA_SIZE))?;
        Ok(())
    }

    fn set_advertising_timing(
        &mut self,
        set: AdvSetHandle,
        timing: &AdvTiming,
    ) -> Result<(), StackError> {
        self.check_set(set)?;
        self.adv_timing = *timing;
        Ok(())
    }

    fn start_advertising(&mut self, set: AdvSetHandle) -> Result<(), StackError> {
        self.check_set(set)?;
        ADVERTISING.signal(AdvRequest::Start {
            data: self.adv_data.clone(),
            timing: self.adv_timing,
        });
        Ok(())
    }

    fn stop_advertising(&mut self, set: AdvSetHandle) -> Result<(), StackError> {
        self.check_set(set)?;
        ADVERTISING.signal(AdvRequest::Stop);
        Ok(())
    }
}
