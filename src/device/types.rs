use uuid::Uuid;

use crate::codec::measurement::HeartRateReading;

/// A peripheral seen during a scan. Two handles are the same device when
/// their identifiers match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub identifier: String,
    pub display_name: Option<String>,
}

impl DeviceHandle {
    pub fn new(identifier: impl Into<String>, display_name: Option<String>) -> Self {
        DeviceHandle {
            identifier: identifier.into(),
            display_name,
        }
    }
}

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "{} ({})", name, self.identifier),
            None => write!(f, "unnamed device ({})", self.identifier),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanObservation {
    pub device: DeviceHandle,
    pub first_seen_order: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    // in discovery order
    pub characteristics: Vec<CharacteristicInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioOperation {
    Scan,
    Connect,
    Disconnect,
    DiscoverServices,
    SetNotify,
    Write,
}

/// Everything the radio reports back, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    DeviceDiscovered(DeviceHandle),
    Connected,
    Disconnected,
    ServicesFound(Vec<ServiceInfo>),
    NotifyEnabled,
    CharacteristicChanged { uuid: Uuid, value: Vec<u8> },
    Error { operation: RadioOperation, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ConnectFailed,
    DiscoveryFailed,
    ServiceNotFound,
    SubscribeFailed,
    UserRequested,
    LinkLost,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            DisconnectReason::ConnectFailed => "connect failed",
            DisconnectReason::DiscoveryFailed => "service discovery failed",
            DisconnectReason::ServiceNotFound => "heart rate service not found",
            DisconnectReason::SubscribeFailed => "enabling notifications failed",
            DisconnectReason::UserRequested => "user requested",
            DisconnectReason::LinkLost => "link lost",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Discovering,
    Subscribing,
    Streaming,
    Disconnecting,
    Disconnected(DisconnectReason),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Disconnected(_))
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Discovering => write!(f, "Discovering"),
            SessionState::Subscribing => write!(f, "Subscribing"),
            SessionState::Streaming => write!(f, "Streaming"),
            SessionState::Disconnecting => write!(f, "Disconnecting"),
            SessionState::Disconnected(reason) => write!(f, "Disconnected ({})", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChange(SessionState),
    Reading(HeartRateReading),
    // a configuration write the radio reported as failed; the session keeps streaming
    WriteFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Found(DeviceHandle),
    Complete,
}
