//! Data model shared across the protocol engine and command surface (§3).

use std::time::Duration;

/// The closed set of AT command kinds the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Echo,
    MacRead,
    MacWrite,
    ConnectLast,
    ConnectMac,
    Discover,
    ServiceProbe,
    ServiceFetch,
    CharacteristicProbe,
    CharacteristicFetch,
    NotifyOn,
    NotifyOff,
    Passive,
    SetName,
    Reset,
    SetRole,
    Sleep,
    ReadLatestNotified,
}

/// How the engine waits for and bounds a response (§3).
#[derive(Debug, Clone, Copy)]
pub enum ResponseDiscipline {
    /// Wait indefinitely for exactly `n` bytes.
    FixedLenBlocking(usize),
    /// Wait without timeout until `min` bytes are in hand, then keep accepting
    /// up to `max` bytes with a per-byte timeout; stop early on timeout.
    BoundedMin {
        min: usize,
        max: usize,
        per_byte_timeout: Duration,
    },
    /// A 56-`*`-delimited bulk response made of `unit_len`-ish records.
    DelimiterFramed { unit_len: usize },
}

/// Echo classification (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoState {
    Idle = 0,
    PeerLost = 1,
    WokenFromSleep = 2,
}

/// Connect classification (§3). The 9-byte `"OK+CONN"` short form is treated as
/// `Connected`, per the specification's resolution of the source ambiguity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectResult {
    Connected,
    NoSuchDevice,
    ConnectFailed,
}

/// Subscribe/unsubscribe classification (§3): the module can answer with a
/// well-formed failure (no such characteristic) as well as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyResult {
    Subscribed,
    NoSuchDevice,
}

/// Which enumeration kind a pending probe/fetch buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumerationKind {
    Service,
    Characteristic,
}

impl EnumerationKind {
    pub const fn unit_len(self) -> usize {
        match self {
            EnumerationKind::Service => 26,
            EnumerationKind::Characteristic => 36,
        }
    }
}

/// The BLE role the module takes when set via `AT+ROLE<d>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Peripheral = 0,
    Controller = 1,
}

impl Role {
    pub const fn digit(self) -> u8 {
        match self {
            Role::Peripheral => b'0',
            Role::Controller => b'1',
        }
    }
}
