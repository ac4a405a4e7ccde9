//! trio-central - firmware entry point.
//!
//! Brings up the SoftDevice, spawns the radio tasks and runs the
//! sequencer over the events they produce. All decisions are made by
//! [`trio_central::Sequencer`]; this binary only moves bytes.

#![no_std]
#![no_main]

mod radio;

use core::mem;

use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::interrupt::Priority;
use nrf_softdevice::{raw, Softdevice};
use {defmt_rtt as _, panic_probe as _};

use trio_central::config::{BROADCAST_NAME, MAX_PEERS};
use trio_central::Sequencer;

use radio::{RadioEvent, SoftdeviceStack, EVENTS};

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn sequencer_task(sd: &'static Softdevice) -> ! {
    let mut stack = SoftdeviceStack::new(sd);
    let mut sequencer = Sequencer::new();

    loop {
        let event = EVENTS.receive().await;
        sequencer.handle_event(&mut stack, &event.as_stack_event());
        stack.link_event(&event);
    }
}

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: MAX_PEERS as u8,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 23 }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 0,
            central_role_count: MAX_PEERS as u8,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: BROADCAST_NAME.as_ptr() as _,
            current_len: BROADCAST_NAME.len() as u16,
            max_len: BROADCAST_NAME.len() as u16,
            // SAFETY: all-zero is "no access", the name is never written.
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("trio-central starting");

    // The SoftDevice reserves interrupt priorities 0, 1 and 4.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let _p = embassy_nrf::init(config);

    let sd: &'static Softdevice = Softdevice::enable(&softdevice_config());

    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(radio::gap::gap_task(sd)));
    unwrap!(spawner.spawn(radio::gatt::gatt_task()));
    unwrap!(spawner.spawn(radio::advertiser::advertiser_task(sd)));
    unwrap!(spawner.spawn(sequencer_task(sd)));

    EVENTS.send(RadioEvent::Boot(radio::stack_version())).await;
}
