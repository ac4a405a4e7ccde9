//! Bluetooth Low Energy subsystem.
//!
//! The device runs in **Central** role against three fixed peers and
//! rebroadcasts what it reads from them:
//!
//! 1. **Advertisement filter** ([`adv_parser`]) - picks our peers out of
//!    scan reports by their shortened local name.
//! 2. **Peer registry** ([`registry`]) - one slot per peer, holding the
//!    link and discovery state plus the last polled values.
//! 3. **Sequencer** ([`sequencer`]) - the event-driven state machine that
//!    scans, connects, discovers and polls.
//! 4. **Poller** ([`poller`]) - per-slot round-robin over the LED and fan
//!    characteristics.
//! 5. **Broadcaster** ([`broadcast`]) - encodes the values into our own
//!    non-connectable advertisement.
//!
//! The radio itself sits behind the [`stack::BleStack`] trait; the
//! embedded binary provides the SoftDevice implementation and tests use
//! [`fake::FakeStack`].

pub mod adv_parser;
pub mod broadcast;
pub mod fake;
pub mod poller;
pub mod registry;
pub mod sequencer;
pub mod stack;
pub mod types;
