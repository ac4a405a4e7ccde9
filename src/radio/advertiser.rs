//! Advertiser task - keeps the broadcast payload on air.
//!
//! Every request replaces the running advertisement, so a payload update
//! restarts advertising with the new bytes.

use defmt::{debug, warn, Format};
use embassy_futures::select::{select, Either};
use heapless::Vec;
use nrf_softdevice::ble::peripheral;
use nrf_softdevice::Softdevice;

use trio_central::ble::types::AdvTiming;

use super::{ADVERTISING, LEGACY_ADV_LEN};

#[derive(Clone, Format)]
pub enum AdvRequest {
    Start {
        data: Vec<u8, LEGACY_ADV_LEN>,
        timing: AdvTiming,
    },
    Stop,
}

#[embassy_executor::task]
pub async fn advertiser_task(sd: &'static Softdevice) -> ! {
    let mut request = ADVERTISING.wait().await;

    loop {
        request = match request {
            AdvRequest::Stop => {
                debug!("Advertising stopped");
                ADVERTISING.wait().await
            }
            AdvRequest::Start { data, timing } => {
                let adv =
                    peripheral::NonconnectableAdvertisement::NonscannableUndirected { adv_data: &data };
                let config = peripheral::Config {
                    interval: timing.interval_min,
                    timeout: (timing.duration != 0).then_some(timing.duration),
                    max_events: (timing.max_events != 0).then_some(timing.max_events),
                    ..Default::default()
                };

                match select(peripheral::advertise(sd, adv, &config), ADVERTISING.wait()).await {
                    Either::First(Ok(())) => ADVERTISING.wait().await,
                    Either::First(Err(_)) => {
                        warn!("Advertising failed");
                        ADVERTISING.wait().await
                    }
                    Either::Second(next) => next,
                }
            }
        };
    }
}
