//! BLE GATT task - discovery and reads on the open links.
//!
//! The SoftDevice client discovers the service and both characteristics
//! in one pass, so the characteristic step replays handles found during
//! the service step. The service reference handed out is the link handle.

use defmt::{debug, info, warn, Format};
use embassy_futures::select::{select3, Either3};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Ticker};
use heapless::Vec;
use nrf_softdevice::ble::gatt_client::{self, DiscoverError, ReadError};
use nrf_softdevice::ble::Connection;

use trio_central::ble::types::{AttrHandle, LinkHandle, ServiceRef};
use trio_central::config::{
    FAN_CONTROL_UUID, LED_CONTROL_UUID, LINK_SWEEP_INTERVAL_MS, MAX_PEERS, MAX_VALUE_LEN,
    SERVICE_UUID,
};
use trio_central::StackError;

use super::{RadioEvent, EVENTS, GATT_COMMANDS};

/// Reason reported for links found dropped by the sweep. The SoftDevice
/// wrapper does not surface the HCI reason.
const REASON_UNREPORTED: u16 = 0;

/// Links handed over by the GAP task once established.
pub static NEW_LINKS: Channel<CriticalSectionRawMutex, (LinkHandle, Connection), MAX_PEERS> =
    Channel::new();

/// GATT client for the peers' control service.
#[nrf_softdevice::gatt_client(uuid = "00ff")]
pub struct ControlServiceClient {
    #[characteristic(uuid = "ff01", read)]
    pub led: u8,

    #[characteristic(uuid = "ff02", read)]
    pub fan: u8,
}

#[derive(Clone, Copy, Format)]
pub enum GattCommand {
    DiscoverServices {
        link: LinkHandle,
        uuid: u16,
    },
    DiscoverCharacteristics {
        link: LinkHandle,
        service: ServiceRef,
    },
    Read {
        link: LinkHandle,
        characteristic: AttrHandle,
    },
}

impl GattCommand {
    fn link(&self) -> LinkHandle {
        match *self {
            GattCommand::DiscoverServices { link, .. }
            | GattCommand::DiscoverCharacteristics { link, .. }
            | GattCommand::Read { link, .. } => link,
        }
    }
}

struct Link {
    handle: LinkHandle,
    conn: Connection,
    /// Characteristic handles found during service discovery.
    handles: Option<(u16, u16)>,
}

#[embassy_executor::task]
pub async fn gatt_task() -> ! {
    let mut links: Vec<Link, MAX_PEERS> = Vec::new();
    let mut sweep = Ticker::every(Duration::from_millis(LINK_SWEEP_INTERVAL_MS));

    loop {
        match select3(NEW_LINKS.receive(), GATT_COMMANDS.receive(), sweep.next()).await {
            Either3::First((handle, conn)) => {
                let link = Link {
                    handle,
                    conn,
                    handles: None,
                };
                if let Err(rejected) = links.push(link) {
                    warn!("Link {}: no room, disconnecting", handle.0);
                    let _ = rejected.conn.disconnect();
                    EVENTS
                        .send(RadioEvent::LinkClosed {
                            link: handle,
                            reason: REASON_UNREPORTED,
                        })
                        .await;
                }
            }
            Either3::Second(cmd) => run(&mut links, cmd).await,
            Either3::Third(()) => sweep_closed(&mut links).await,
        }
    }
}

async fn run(links: &mut Vec<Link, MAX_PEERS>, cmd: GattCommand) {
    let link = cmd.link();
    let Some(index) = links.iter().position(|l| l.handle == link) else {
        debug!("Link {}: {} for a closed link", link.0, cmd);
        complete(link, Err(StackError::InvalidHandle)).await;
        return;
    };

    let result = match cmd {
        GattCommand::DiscoverServices { uuid, .. } => {
            discover_services(&mut links[index], uuid).await
        }
        GattCommand::DiscoverCharacteristics { .. } => {
            replay_characteristics(&links[index]).await;
            Ok(())
        }
        GattCommand::Read { characteristic, .. } => {
            read(&links[index], characteristic).await
        }
    };

    match result {
        Err(StackError::NotConnected) => close(links, index).await,
        result => complete(link, result).await,
    }
}

async fn discover_services(link: &mut Link, uuid: u16) -> Result<(), StackError> {
    if uuid != SERVICE_UUID {
        return Ok(());
    }
    match gatt_client::discover::<ControlServiceClient>(&link.conn).await {
        Ok(client) => {
            link.handles = Some((client.led_value_handle, client.fan_value_handle));
            announce_service(link.handle).await;
            Ok(())
        }
        Err(DiscoverError::ServiceNotFound) => Ok(()),
        Err(DiscoverError::ServiceIncomplete) => {
            warn!("Link {}: service lacks a monitored characteristic", link.handle.0);
            announce_service(link.handle).await;
            Ok(())
        }
        Err(DiscoverError::Disconnected) => Err(StackError::NotConnected),
        Err(_) => Err(StackError::InvalidState),
    }
}

async fn announce_service(link: LinkHandle) {
    EVENTS
        .send(RadioEvent::ServiceDiscovered {
            link,
            service: ServiceRef(u32::from(link.0)),
            uuid: SERVICE_UUID.to_le_bytes(),
        })
        .await;
}

async fn replay_characteristics(link: &Link) {
    let Some((led, fan)) = link.handles else {
        return;
    };
    for (handle, uuid) in [(led, LED_CONTROL_UUID), (fan, FAN_CONTROL_UUID)] {
        EVENTS
            .send(RadioEvent::CharacteristicDiscovered {
                link: link.handle,
                characteristic: AttrHandle(handle),
                uuid: uuid.to_le_bytes(),
            })
            .await;
    }
}

async fn read(link: &Link, characteristic: AttrHandle) -> Result<(), StackError> {
    let mut buf = [0u8; MAX_VALUE_LEN];
    match gatt_client::read(&link.conn, characteristic.0, &mut buf).await {
        Ok(len) => {
            let value = Vec::from_slice(&buf[..len.min(MAX_VALUE_LEN)]).unwrap_or_default();
            EVENTS
                .send(RadioEvent::CharacteristicValue {
                    link: link.handle,
                    characteristic,
                    value,
                })
                .await;
            Ok(())
        }
        Err(ReadError::Disconnected) => Err(StackError::NotConnected),
        Err(_) => Err(StackError::InvalidState),
    }
}

async fn complete(link: LinkHandle, result: Result<(), StackError>) {
    EVENTS
        .send(RadioEvent::ProcedureCompleted { link, result })
        .await;
}

async fn close(links: &mut Vec<Link, MAX_PEERS>, index: usize) {
    let link = links.swap_remove(index);
    info!("Link {}: closed", link.handle.0);
    EVENTS
        .send(RadioEvent::LinkClosed {
            link: link.handle,
            reason: REASON_UNREPORTED,
        })
        .await;
}

async fn sweep_closed(links: &mut Vec<Link, MAX_PEERS>) {
    while let Some(index) = links.iter().position(|l| l.conn.handle().is_none()) {
        close(links, index).await;
    }
}
