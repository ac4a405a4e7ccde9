//! BLE GAP task - scanning and connection establishment.
//!
//! Reports are forwarded to the sequencer as they arrive. A connection
//! attempt is whitelisted to the one peer the sequencer chose and ends in
//! either `LinkOpened` or `LinkClosed`.

use defmt::{debug, info, trace, warn, Format};
use embassy_futures::select::{select, Either};
use embassy_time::{with_timeout, Duration};
use heapless::Vec;
use nrf_softdevice::ble::{self as sd_ble, central, PhySet};
use nrf_softdevice::{raw, Softdevice};

use trio_central::ble::types::{Address, ConnParams, LinkHandle, Phy, ScanMode, ScanParams};
use trio_central::config::{CONNECT_TIMEOUT_SECS, SCAN_INTERVAL, SCAN_WINDOW};

use super::gatt::NEW_LINKS;
use super::{from_sd_address, to_sd_address, RadioEvent, EVENTS, GAP_COMMANDS};

/// HCI "Connection Failed to be Established".
const CONNECTION_FAILED: u16 = 0x3e;

#[derive(Clone, Copy, Format)]
pub enum GapCommand {
    StartScan(ScanParams),
    StopScan,
    Connect {
        link: LinkHandle,
        address: Address,
        phy: Phy,
        params: ConnParams,
    },
}

fn phy_set(phy: Phy) -> PhySet {
    match phy {
        Phy::Le1M => PhySet::M1,
        Phy::Coded => PhySet::Coded,
    }
}

#[embassy_executor::task]
pub async fn gap_task(sd: &'static Softdevice) -> ! {
    let mut pending: Option<GapCommand> = None;

    loop {
        let cmd = match pending.take() {
            Some(cmd) => cmd,
            None => GAP_COMMANDS.receive().await,
        };

        match cmd {
            GapCommand::StartScan(params) => {
                // The next command (normally StopScan) cancels the scan.
                match select(scan(sd, &params), GAP_COMMANDS.receive()).await {
                    Either::First(()) => {}
                    Either::Second(next) => pending = Some(next),
                }
            }
            GapCommand::StopScan => debug!("Scanner idle"),
            GapCommand::Connect {
                link,
                address,
                phy,
                params,
            } => connect(sd, link, &address, phy, &params).await,
        }
    }
}

async fn scan(sd: &Softdevice, params: &ScanParams) {
    let config = central::ScanConfig {
        active: params.mode == ScanMode::Active,
        interval: u32::from(params.interval),
        window: u32::from(params.window),
        phys: phy_set(params.phy),
        ..Default::default()
    };

    let result = central::scan(sd, &config, |report| {
        // SAFETY: the SoftDevice keeps the report buffer alive for the
        // duration of this callback.
        let data =
            unsafe { core::slice::from_raw_parts(report.data.p_data, report.data.len as usize) };
        let Ok(data) = Vec::from_slice(data) else {
            return None;
        };
        let event = RadioEvent::Report {
            address: from_sd_address(&sd_ble::Address::from_raw(report.peer_addr)),
            rssi: report.rssi,
            data,
        };
        if EVENTS.try_send(event).is_err() {
            trace!("Event queue full, report dropped");
        }
        None::<()>
    })
    .await;

    if result.is_err() {
        warn!("BLE scan ended with error");
    }
}

async fn connect(
    sd: &'static Softdevice,
    link: LinkHandle,
    address: &Address,
    phy: Phy,
    params: &ConnParams,
) {
    info!("Link {}: connecting to {}", link.0, address.to_text().as_str());

    let peer = to_sd_address(address);
    let whitelist = [&peer];
    let config = central::ConnectConfig {
        scan_config: central::ScanConfig {
            whitelist: Some(&whitelist),
            interval: u32::from(SCAN_INTERVAL),
            window: u32::from(SCAN_WINDOW),
            phys: phy_set(phy),
            ..Default::default()
        },
        conn_params: raw::ble_gap_conn_params_t {
            min_conn_interval: params.interval_min,
            max_conn_interval: params.interval_max,
            slave_latency: params.latency,
            conn_sup_timeout: params.timeout,
        },
        ..Default::default()
    };

    let attempt = with_timeout(
        Duration::from_secs(CONNECT_TIMEOUT_SECS),
        central::connect(sd, &config),
    )
    .await;

    let event = match attempt {
        Ok(Ok(conn)) => {
            let address = from_sd_address(&conn.peer_address());
            // The GATT task must own the link before the sequencer can
            // issue anything on it.
            NEW_LINKS.send((link, conn)).await;
            RadioEvent::LinkOpened { link, address }
        }
        Ok(Err(_)) => {
            warn!("Link {}: connect failed", link.0);
            RadioEvent::LinkClosed {
                link,
                reason: CONNECTION_FAILED,
            }
        }
        Err(_) => {
            warn!("Link {}: connect timed out", link.0);
            RadioEvent::LinkClosed {
                link,
                reason: CONNECTION_FAILED,
            }
        }
    };
    EVENTS.send(event).await;
}
