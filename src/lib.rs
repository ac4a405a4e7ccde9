//! trio-central: BLE central that links three fixed peripherals, polls
//! their LED and fan characteristics, and rebroadcasts the values.
//!
//! All protocol logic lives here and runs on the host as well as on the
//! target: `cargo test` exercises it against [`ble::fake::FakeStack`].
//!
//! Note: The embedded binary (`src/main.rs`, feature `embedded`) adapts
//! the nRF SoftDevice to [`ble::stack::BleStack`] and feeds its events
//! into a [`Sequencer`].

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod ble;
pub mod config;
pub mod error;

pub use ble::sequencer::{Phase, Sequencer};
pub use ble::stack::{BleStack, StackEvent};
pub use error::{Error, StackError};
