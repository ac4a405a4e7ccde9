//! Unified error types for trio-central.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

/// Status reported by the BLE stack for a rejected command or a failed
/// GATT procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackError {
    /// The connection handle is no longer valid (peer dropped).
    InvalidHandle,
    /// The link is not (or no longer) connected.
    NotConnected,
    /// Command not allowed in the stack's current state.
    InvalidState,
    /// Another procedure is already running on this resource.
    Busy,
    /// The stack ran out of connection or advertising resources.
    NoResources,
    /// Any other raw status code.
    Raw(u32),
}

impl StackError {
    /// Failures caused by a peer that dropped between two commands.
    /// These are recovered locally by releasing the slot and scanning again.
    pub fn is_transient(self) -> bool {
        matches!(self, StackError::InvalidHandle | StackError::NotConnected)
    }
}

/// Outbound stack operations, used as logging context for failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    StartScan,
    StopScan,
    SetConnectionParameters,
    OpenConnection,
    DiscoverServices,
    DiscoverCharacteristics,
    ReadValue,
    CreateAdvertisingSet,
    SetAdvertisingData,
    SetAdvertisingTiming,
    StartAdvertising,
    StopAdvertising,
    IdentityAddress,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::StartScan => "start scan",
            Command::StopScan => "stop scan",
            Command::SetConnectionParameters => "set connection parameters",
            Command::OpenConnection => "open connection",
            Command::DiscoverServices => "discover services",
            Command::DiscoverCharacteristics => "discover characteristics",
            Command::ReadValue => "read value",
            Command::CreateAdvertisingSet => "create advertising set",
            Command::SetAdvertisingData => "set advertising data",
            Command::SetAdvertisingTiming => "set advertising timing",
            Command::StartAdvertising => "start advertising",
            Command::StopAdvertising => "stop advertising",
            Command::IdentityAddress => "read identity address",
        }
    }
}

/// Top-level error type used across the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The BLE stack rejected a command.
    Stack { op: Command, err: StackError },

    /// A link handle is already held by another slot.
    DuplicateLink,

    /// Slot index outside `0..MAX_PEERS`.
    SlotOutOfRange,
}

impl Error {
    pub fn stack(op: Command, err: StackError) -> Self {
        Error::Stack { op, err }
    }
}
