//! Integration tests for trio-central host-testable logic.

use trio_central::ble::broadcast::{compose, BROADCAST_PAYLOAD_LEN, PEER_BLOCKS_OFFSET};
use trio_central::ble::fake::{FakeStack, Issued};
use trio_central::ble::registry::LinkStatus;
use trio_central::ble::types::{
    Address, AddressKind, AttrHandle, LinkHandle, ServiceRef, StackVersion,
};
use trio_central::config::{MAX_PEERS, SERVICE_UUID, TARGET_NAMES};
use trio_central::error::Command;
use trio_central::{Phase, Sequencer, StackError, StackEvent};

const LED: AttrHandle = AttrHandle(0x000b);
const FAN: AttrHandle = AttrHandle(0x000e);

struct Harness {
    seq: Sequencer,
    stack: FakeStack,
}

impl Harness {
    fn booted() -> Self {
        let mut h = Harness {
            seq: Sequencer::new(),
            stack: FakeStack::new(),
        };
        h.event(StackEvent::Boot(StackVersion {
            major: 8,
            minor: 1,
            patch: 0,
            build: 7,
        }));
        h
    }

    fn event(&mut self, event: StackEvent<'_>) {
        self.seq.handle_event(&mut self.stack, &event);
    }

    fn address(slot: usize) -> Address {
        Address::new(
            AddressKind::RandomStatic,
            [0xa0 + slot as u8, 0x11, 0x22, 0x33, 0x44, 0xd5],
        )
    }

    /// Advertisement with flags, a UUID list and the short name.
    fn advertise(&mut self, slot: usize) -> LinkHandle {
        let name = TARGET_NAMES[slot].as_bytes();
        let mut ad = vec![0x02, 0x01, 0x06, 0x03, 0x03, 0xff, 0x00];
        ad.push(name.len() as u8 + 1);
        ad.push(0x08);
        ad.extend_from_slice(name);

        let link = self.stack.peek_link().unwrap();
        self.event(StackEvent::AdvertisementReport {
            address: Self::address(slot),
            rssi: -48,
            data: &ad,
        });
        link
    }

    fn open(&mut self, slot: usize) -> LinkHandle {
        let link = self.advertise(slot);
        self.event(StackEvent::LinkOpened {
            link,
            address: Self::address(slot),
        });
        link
    }

    fn done(&mut self, link: LinkHandle) {
        self.event(StackEvent::ProcedureCompleted {
            link,
            result: Ok(()),
        });
    }

    fn discover(&mut self, link: LinkHandle) {
        self.event(StackEvent::ServiceDiscovered {
            link,
            service: ServiceRef(0x0000_000a),
            uuid: &SERVICE_UUID.to_le_bytes(),
        });
        self.done(link);
        self.event(StackEvent::CharacteristicDiscovered {
            link,
            characteristic: AttrHandle(0x0002),
            uuid: &[0x00, 0x2a],
        });
        self.event(StackEvent::CharacteristicDiscovered {
            link,
            characteristic: LED,
            uuid: &[0x01, 0xff],
        });
        self.event(StackEvent::CharacteristicDiscovered {
            link,
            characteristic: FAN,
            uuid: &[0x02, 0xff],
        });
        self.done(link);
    }

    fn value(&mut self, link: LinkHandle, characteristic: AttrHandle, value: u8) {
        self.event(StackEvent::CharacteristicValue {
            link,
            characteristic,
            value: &[value],
        });
        self.done(link);
    }

    fn payload_blocks(&self) -> &[u8] {
        let payload = self
            .seq
            .broadcaster()
            .last_payload()
            .expect("payload published");
        &payload[PEER_BLOCKS_OFFSET..PEER_BLOCKS_OFFSET + 15]
    }
}

#[test]
fn three_peers_end_to_end() {
    let mut h = Harness::booted();
    assert_eq!(h.payload_blocks(), b"1L0F02L0F03L0F0");

    // Peers show up out of order.
    let l3 = h.open(2);
    let l1 = h.open(0);
    assert_eq!(h.seq.phase(), Phase::Scanning);
    let l2 = h.open(1);
    assert_eq!(h.seq.live_count(), MAX_PEERS);
    assert_eq!(h.seq.phase(), Phase::ServicesDiscovering);

    for link in [l1, l2, l3] {
        h.discover(link);
    }
    assert_eq!(h.seq.phase(), Phase::Polling);

    // Each peer is read LED first, then fan.
    h.value(l1, LED, 1);
    h.value(l1, FAN, 0);
    h.value(l2, LED, 0);
    h.value(l2, FAN, 3);
    h.value(l3, LED, 1);
    h.value(l3, FAN, 1);
    assert_eq!(h.payload_blocks(), b"1L1F02L0F33L1F1");

    let reads: Vec<_> = h
        .stack
        .issued()
        .iter()
        .filter_map(|i| match i {
            Issued::Read(link, handle) if *link == l2 => Some(*handle),
            _ => None,
        })
        .collect();
    assert_eq!(reads, [LED, FAN, LED]);
}

#[test]
fn lost_peer_reconnects_and_keeps_last_values() {
    let mut h = Harness::booted();
    let links = [h.open(0), h.open(1), h.open(2)];
    for link in links {
        h.discover(link);
    }
    h.value(links[1], LED, 1);

    h.event(StackEvent::LinkClosed {
        link: links[1],
        reason: 0x0008,
    });
    assert_eq!(h.seq.live_count(), 2);
    assert_eq!(h.seq.phase(), Phase::Scanning);
    assert!(h.seq.is_scanning());
    assert_eq!(h.seq.registry().slots()[1].status, LinkStatus::Disconnected);

    // The broadcast still reports the last value read.
    assert_eq!(&compose(h.seq.registry())[16..21], b"2L1F0");

    // Server1 is already linked, so its advertisement is ignored.
    let before = h.stack.issued().len();
    h.advertise(0);
    assert_eq!(h.stack.issued().len(), before);

    let relinked = h.open(1);
    assert_ne!(relinked, links[1]);
    assert!(!h.seq.is_scanning());
    assert_eq!(
        h.stack.issued().last(),
        Some(&Issued::DiscoverServices(relinked, SERVICE_UUID))
    );
    h.discover(relinked);
    assert_eq!(h.seq.phase(), Phase::Polling);
}

#[test]
fn stack_rejections_never_stall_the_central() {
    let mut h = Harness::booted();
    h.stack.fail_next(Command::OpenConnection, StackError::Busy);

    // The first attempt is rejected, the retry on the next report works.
    h.advertise(0);
    assert!(h.seq.is_scanning());
    let link = h.open(0);
    assert_eq!(h.seq.registry().slots()[0].link, Some(link));
    assert_eq!(h.seq.live_count(), 1);
}

#[test]
fn published_payload_tracks_registry() {
    let mut h = Harness::booted();
    let links = [h.open(0), h.open(1), h.open(2)];
    h.discover(links[2]);
    h.value(links[2], LED, 12);

    let payload = h.seq.broadcaster().last_payload().expect("payload published");
    assert_eq!(payload.len(), BROADCAST_PAYLOAD_LEN);
    assert_eq!(payload, &compose(h.seq.registry()));
    // Out-of-range values saturate at '9'.
    assert_eq!(&payload[21..26], b"3L9F0");
    assert_eq!(&payload[26..], &[0x03, 0xff, 0xff, 0x02]);

    let updates = h
        .stack
        .count(|i| matches!(i, Issued::SetAdvertisingData(..)));
    assert_eq!(updates, 2);
}
