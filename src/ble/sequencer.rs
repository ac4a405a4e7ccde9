//! Connection & discovery sequencer.
//!
//! Drives the three peer links from scanning through connection,
//! service/characteristic discovery, and steady-state polling:
//!
//! ```text
//! Boot -> Scanning -> Connecting -> (repeat until 3 linked)
//!      -> ServicesDiscovering -> AttributesDiscovering -> Polling
//! ```
//!
//! Any link loss drops back to `Scanning` while fewer than three peers
//! are linked. The scanner is a shared resource: it is stopped before any
//! connection attempt and only restarted when no attempt is outstanding.
//!
//! Events are handled one at a time to completion. Command rejections
//! are logged and recovered from here; they never escape `handle_event`.

use crate::ble::adv_parser;
use crate::ble::broadcast::Broadcaster;
use crate::ble::poller;
use crate::ble::registry::{LinkStatus, PeerRegistry, PeerSlot, Procedure};
use crate::ble::stack::{BleStack, StackEvent};
use crate::ble::types::{
    uuid16_from_le, Address, AttrHandle, ConnParams, LinkHandle, Phy, ScanParams, ServiceRef,
    StackVersion,
};
use crate::config::{MAX_PEERS, SERVICE_UUID, TARGET_NAMES};
use crate::error::{Command, StackError};

/// Process-wide phase of the sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Nothing to drive: before boot, or the scanner could not start.
    Idle,
    Scanning,
    Connecting,
    ServicesDiscovering,
    AttributesDiscovering,
    Polling,
}

pub struct Sequencer {
    phase: Phase,
    live: usize,
    scanning: bool,
    registry: PeerRegistry,
    broadcaster: Broadcaster,
}

impl Sequencer {
    pub const fn new() -> Self {
        Self {
            phase: Phase::Idle,
            live: 0,
            scanning: false,
            registry: PeerRegistry::new(),
            broadcaster: Broadcaster::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Peers with an open link (connected, discovering or polling).
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Whether we currently hold the scanner.
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Process one stack event to completion.
    pub fn handle_event<S: BleStack>(&mut self, stack: &mut S, event: &StackEvent<'_>) {
        match *event {
            StackEvent::Boot(version) => self.on_boot(stack, version),
            StackEvent::AdvertisementReport {
                address,
                rssi,
                data,
            } => self.on_report(stack, &address, rssi, data),
            StackEvent::LinkOpened { link, address } => self.on_link_opened(stack, link, address),
            StackEvent::LinkClosed { link, reason } => self.on_link_closed(stack, link, reason),
            StackEvent::ServiceDiscovered {
                link,
                service,
                uuid,
            } => self.on_service(link, service, uuid),
            StackEvent::CharacteristicDiscovered {
                link,
                characteristic,
                uuid,
            } => self.on_characteristic(link, characteristic, uuid),
            StackEvent::CharacteristicValue {
                link,
                characteristic,
                value,
            } => self.on_value(stack, link, characteristic, value),
            StackEvent::ProcedureCompleted { link, result } => {
                self.on_procedure_completed(stack, link, result)
            }
        }

        debug_assert_eq!(self.live, self.registry.live_count());
        debug_assert!(self.live <= MAX_PEERS);
    }

    // ═══════════════════════════════════════════════════════════════
    // Event handlers
    // ═══════════════════════════════════════════════════════════════

    fn on_boot<S: BleStack>(&mut self, stack: &mut S, version: StackVersion) {
        // A boot also follows a stack reset, which drops every link.
        *self = Self::new();

        info!(
            "BLE stack booted: v{}.{}.{}-b{}",
            version.major,
            version.minor,
            version.patch,
            version.build
        );

        match stack.identity_address() {
            Ok(addr) => info!(
                "Bluetooth {} address: {}",
                addr.kind.as_str(),
                addr.to_text().as_str()
            ),
            Err(e) => log_failure(Command::IdentityAddress, None, e),
        }

        if let Err(e) = stack.set_default_connection_params(&ConnParams::from_config()) {
            log_failure(Command::SetConnectionParameters, None, e);
        }

        match self.broadcaster.create(stack) {
            Ok(_) => self.publish_summary(stack),
            Err(e) => error!("Broadcast unavailable: {}", e),
        }

        self.resume_scanning(stack);
        self.settle_phase();
    }

    fn on_report<S: BleStack>(&mut self, stack: &mut S, address: &Address, rssi: i8, data: &[u8]) {
        if !self.scanning {
            trace!("Report ignored, scanner not held");
            return;
        }
        let Some(found) = adv_parser::match_target(address, data) else {
            return;
        };
        let slot = found.slot;
        if self.slot(slot).status != LinkStatus::Disconnected {
            debug!("{} already claimed by slot {}", TARGET_NAMES[slot], slot);
            return;
        }

        info!("Found {} (RSSI {}), connecting", TARGET_NAMES[slot], rssi);
        self.release_scanner(stack);

        match stack.open_connection(&found.address, Phy::Le1M) {
            Ok(link) => {
                // The stack is connecting regardless, so the scanner stays
                // released until that link closes.
                if let Err(e) = self.registry.begin_connect(slot, link, found.address) {
                    error!("Slot {} can't take link {}: {}", slot, link.0, e);
                }
            }
            Err(e) => {
                log_failure(Command::OpenConnection, Some(slot), e);
                self.resume_scanning(stack);
            }
        }
        self.settle_phase();
    }

    fn on_link_opened<S: BleStack>(&mut self, stack: &mut S, link: LinkHandle, address: Address) {
        let Some(slot) = self.registry.slot_of(link) else {
            warn!("Link {} opened for an untracked peer", link.0);
            return;
        };
        if self.slot(slot).status != LinkStatus::Connecting {
            warn!("Link {} reported open twice", link.0);
            return;
        }
        if let Err(e) = self.registry.mark_connected(slot, address) {
            error!("Slot {}: {}", slot, e);
            return;
        }
        self.live += 1;
        info!(
            "Connected to {} at {} ({} of {})",
            self.slot(slot).display_name.as_str(),
            self.slot(slot).address_text.as_str(),
            self.live,
            MAX_PEERS
        );

        if self.live < MAX_PEERS {
            info!("Continue scanning");
            self.resume_scanning(stack);
        } else {
            self.release_scanner(stack);
            self.discover_services(stack);
        }
        self.settle_phase();
    }

    fn on_link_closed<S: BleStack>(&mut self, stack: &mut S, link: LinkHandle, reason: u16) {
        let Some(slot) = self.registry.slot_of(link) else {
            debug!("Link {} closed (untracked)", link.0);
            self.resume_scanning(stack);
            self.settle_phase();
            return;
        };
        if self.slot(slot).status == LinkStatus::Connecting {
            warn!(
                "Could not connect to {} (reason {:#x})",
                TARGET_NAMES[slot],
                reason
            );
        } else {
            info!(
                "{} disconnected (reason {:#x})",
                TARGET_NAMES[slot],
                reason
            );
        }
        self.drop_slot(slot);
        self.resume_scanning(stack);
        self.settle_phase();
    }

    fn on_service(&mut self, link: LinkHandle, service: ServiceRef, uuid: &[u8]) {
        let Some(slot) = self.registry.slot_of(link) else {
            warn!("Service for untracked link {}", link.0);
            return;
        };
        let s = self.slot_mut(slot);
        if s.procedure != Procedure::ServiceDiscovery {
            warn!("Slot {}: service reported outside discovery", slot);
            return;
        }
        if uuid16_from_le(uuid) != Some(SERVICE_UUID) {
            debug!("Slot {}: ignoring service {=[u8]:x}", slot, uuid);
            return;
        }
        s.service = Some(service);
        info!("Slot {}: service found, discovering characteristics...", slot);
    }

    fn on_characteristic(&mut self, link: LinkHandle, handle: AttrHandle, uuid: &[u8]) {
        let Some(slot) = self.registry.slot_of(link) else {
            warn!("Characteristic for untracked link {}", link.0);
            return;
        };
        let s = self.slot_mut(slot);
        if s.procedure != Procedure::CharacteristicDiscovery {
            warn!("Slot {}: characteristic reported outside discovery", slot);
            return;
        }
        match poller::record_handle(s, handle, uuid) {
            Some(attr) => {
                debug!("Slot {}: saved {} at handle {}", slot, attr, handle.0);
                if s.poll_ready() {
                    info!("Slot {}: characteristics ready", slot);
                }
            }
            None => debug!("Slot {}: ignoring characteristic {=[u8]:x}", slot, uuid),
        }
    }

    fn on_value<S: BleStack>(
        &mut self,
        stack: &mut S,
        link: LinkHandle,
        handle: AttrHandle,
        value: &[u8],
    ) {
        let Some(slot) = self.registry.slot_of(link) else {
            warn!("Value from untracked link {}", link.0);
            return;
        };
        let s = self.slot_mut(slot);
        match poller::record_value(s, handle, value) {
            Some(attr) => {
                debug!("Slot {}: {} = {}", slot, attr, value[0]);
                log_slot(s);
                self.publish_summary(stack);
            }
            None => warn!(
                "Slot {}: value for untracked handle {} ({} bytes)",
                slot,
                handle.0,
                value.len()
            ),
        }
    }

    fn on_procedure_completed<S: BleStack>(
        &mut self,
        stack: &mut S,
        link: LinkHandle,
        result: Result<(), StackError>,
    ) {
        let Some(slot) = self.registry.slot_of(link) else {
            debug!("Procedure completed on untracked link {}", link.0);
            return;
        };
        let s = self.slot_mut(slot);
        let procedure = s.procedure;
        s.procedure = Procedure::Idle;

        match procedure {
            Procedure::Idle => debug!("Slot {}: completion with nothing pending", slot),
            Procedure::ServiceDiscovery => self.after_service_discovery(stack, slot, result),
            Procedure::CharacteristicDiscovery => {
                self.after_characteristic_discovery(stack, slot, result)
            }
            Procedure::Read => {
                if let Err(e) = result {
                    warn!("Slot {}: read failed: {}", slot, e);
                }
                poller::advance(self.slot_mut(slot));
                self.issue_read(stack, slot);
            }
        }
        self.settle_phase();
    }

    // ═══════════════════════════════════════════════════════════════
    // Per-slot steps
    // ═══════════════════════════════════════════════════════════════

    /// All peers are linked: ask each newly connected slot for the
    /// service, in ascending slot order. A dropped peer only releases its
    /// own slot; the remaining slots still get their request.
    fn discover_services<S: BleStack>(&mut self, stack: &mut S) {
        let mut released = false;
        for slot in 0..MAX_PEERS {
            let s = self.slot(slot);
            if s.status != LinkStatus::Connected {
                continue;
            }
            let Some(link) = s.link else {
                continue;
            };
            match stack.discover_primary_services_by_uuid(link, SERVICE_UUID) {
                Ok(()) => {
                    let s = self.slot_mut(slot);
                    s.status = LinkStatus::Discovering;
                    s.procedure = Procedure::ServiceDiscovery;
                }
                Err(e) => released |= self.command_failed(slot, Command::DiscoverServices, e),
            }
        }
        if released {
            self.resume_scanning(stack);
        }
    }

    fn after_service_discovery<S: BleStack>(
        &mut self,
        stack: &mut S,
        slot: usize,
        result: Result<(), StackError>,
    ) {
        if let Err(e) = result {
            if self.command_failed(slot, Command::DiscoverServices, e) {
                self.resume_scanning(stack);
            }
            return;
        }
        let s = self.slot(slot);
        let (Some(link), Some(service)) = (s.link, s.service) else {
            warn!("Slot {}: service {:#x} not found", slot, SERVICE_UUID);
            return;
        };
        match stack.discover_characteristics(link, service) {
            Ok(()) => self.slot_mut(slot).procedure = Procedure::CharacteristicDiscovery,
            Err(e) => {
                if self.command_failed(slot, Command::DiscoverCharacteristics, e) {
                    self.resume_scanning(stack);
                }
            }
        }
    }

    fn after_characteristic_discovery<S: BleStack>(
        &mut self,
        stack: &mut S,
        slot: usize,
        result: Result<(), StackError>,
    ) {
        if let Err(e) = result {
            if self.command_failed(slot, Command::DiscoverCharacteristics, e) {
                self.resume_scanning(stack);
            }
            return;
        }
        if !self.slot(slot).poll_ready() {
            warn!("Slot {}: monitored characteristics missing", slot);
            return;
        }
        self.issue_read(stack, slot);
    }

    /// Read the slot's current toggle position.
    fn issue_read<S: BleStack>(&mut self, stack: &mut S, slot: usize) {
        let s = self.slot(slot);
        let (Some(link), Some((attr, handle))) = (s.link, poller::next_request(s)) else {
            return;
        };
        match stack.read_characteristic_value(link, handle) {
            Ok(()) => {
                trace!("Slot {}: reading {}", slot, attr);
                let s = self.slot_mut(slot);
                s.status = LinkStatus::Polling;
                s.procedure = Procedure::Read;
            }
            Err(e) => {
                if self.command_failed(slot, Command::ReadValue, e) {
                    self.resume_scanning(stack);
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Shared resources
    // ═══════════════════════════════════════════════════════════════

    /// Start scanning if a peer is missing and the radio is free.
    fn resume_scanning<S: BleStack>(&mut self, stack: &mut S) {
        if self.scanning || self.live >= MAX_PEERS || self.registry.connect_pending() {
            return;
        }
        match stack.start_scan(&ScanParams::default_passive()) {
            Ok(()) => {
                self.scanning = true;
                debug!("Scanning ({} of {} linked)", self.live, MAX_PEERS);
            }
            Err(e) => log_failure(Command::StartScan, None, e),
        }
    }

    fn release_scanner<S: BleStack>(&mut self, stack: &mut S) {
        if !self.scanning {
            return;
        }
        self.scanning = false;
        if let Err(e) = stack.stop_scan() {
            log_failure(Command::StopScan, None, e);
        }
    }

    fn publish_summary<S: BleStack>(&mut self, stack: &mut S) {
        if let Err(e) = self.broadcaster.publish(stack, &self.registry) {
            error!("Broadcast update failed: {}", e);
        }
    }

    /// Handle a rejected per-slot command. Transient failures (peer gone)
    /// release the slot and return `true`; anything else parks the slot.
    fn command_failed(&mut self, slot: usize, op: Command, err: StackError) -> bool {
        if err.is_transient() {
            warn!(
                "{} failed on slot {} ({}), dropping client",
                op.as_str(),
                slot,
                err
            );
            self.drop_slot(slot);
            true
        } else {
            log_failure(op, Some(slot), err);
            false
        }
    }

    fn drop_slot(&mut self, slot: usize) {
        if self.registry.release(slot) {
            self.live = self.live.saturating_sub(1);
        }
    }

    /// Derive the phase from the scanner and the least advanced live slot.
    fn settle_phase(&mut self) {
        self.phase = if self.scanning {
            Phase::Scanning
        } else if self.registry.connect_pending() {
            Phase::Connecting
        } else {
            self.registry
                .slots()
                .iter()
                .filter(|s| s.status.is_live())
                .map(slot_phase)
                .min_by_key(|p| phase_rank(*p))
                .unwrap_or(Phase::Idle)
        };
    }

    fn slot(&self, slot: usize) -> &PeerSlot {
        &self.registry.slots()[slot]
    }

    fn slot_mut(&mut self, slot: usize) -> &mut PeerSlot {
        &mut self.registry.slots_mut()[slot]
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

fn slot_phase(slot: &PeerSlot) -> Phase {
    match (slot.status, slot.procedure) {
        (LinkStatus::Polling, _) => Phase::Polling,
        (LinkStatus::Discovering, Procedure::CharacteristicDiscovery) => {
            Phase::AttributesDiscovering
        }
        (LinkStatus::Discovering, _) if slot.service.is_some() => Phase::AttributesDiscovering,
        _ => Phase::ServicesDiscovering,
    }
}

fn phase_rank(phase: Phase) -> u8 {
    match phase {
        Phase::Idle => 0,
        Phase::Scanning => 1,
        Phase::Connecting => 2,
        Phase::ServicesDiscovering => 3,
        Phase::AttributesDiscovering => 4,
        Phase::Polling => 5,
    }
}

fn log_failure(op: Command, slot: Option<usize>, err: StackError) {
    match slot {
        Some(slot) => error!("{} failed on slot {}: {}", op.as_str(), slot, err),
        None => error!("{} failed: {}", op.as_str(), err),
    }
}

fn log_slot(slot: &PeerSlot) {
    debug!(
        "Status from connection {}: name={} address={} status={} led={} fan={}",
        slot.slot_id + 1,
        slot.display_name.as_str(),
        slot.address_text.as_str(),
        slot.status,
        slot.led_value,
        slot.fan_value
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
