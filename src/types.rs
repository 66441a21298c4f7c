//! Common types, enums, and error definitions for the band protocol

use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for band operations
pub type Result<T> = std::result::Result<T, BandError>;

/// Error types for band communication
#[derive(Error, Debug)]
pub enum BandError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid key length: expected 16 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Timed out waiting for device reply")]
    Timeout,

    #[error("Device rejected authentication: {0}")]
    AuthFailed(AuthStatus),

    #[error("A request is already in flight")]
    RequestInFlight,

    #[error("Device disconnected")]
    Disconnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Address of a device endpoint (a GATT characteristic UUID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId(pub Uuid);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared secret used for the authentication handshake
///
/// The secret is borrowed by the session for the duration of one `auth` call
/// and is not retained afterwards. `reset` requests that the key be
/// (re)registered with the device before the challenge exchange; the device
/// persists the key, so this is normally only needed on first pairing.
#[derive(Clone)]
pub struct Key {
    secret: Vec<u8>,
    pub reset: bool,
}

impl Key {
    pub fn new(secret: impl Into<Vec<u8>>, reset: bool) -> Self {
        Self {
            secret: secret.into(),
            reset,
        }
    }

    /// Raw key material
    pub fn material(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the secret itself
        f.debug_struct("Key")
            .field("len", &self.secret.len())
            .field("reset", &self.reset)
            .finish()
    }
}

/// Final status of an authentication handshake, as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// Challenge response accepted
    Authenticated,
    /// Challenge response did not match the registered key
    KeyMismatch,
    /// Device aborted the key exchange
    Aborted,
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStatus::Authenticated => write!(f, "authenticated"),
            AuthStatus::KeyMismatch => write!(f, "key mismatch"),
            AuthStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Alert kinds understood by the band's ring command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertKind {
    Single = 1,
    Continuous = 2,
    Invisible = 3,
    Like = 0xFE,
}

impl AlertKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AlertKind::Single),
            2 => Some(AlertKind::Continuous),
            3 => Some(AlertKind::Invisible),
            0xFE => Some(AlertKind::Like),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// A single alarm slot on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alarm {
    /// Slot index, 0-based; the device exposes a fixed number of slots
    pub index: u8,
    pub hour: u8,
    pub minute: u8,
    /// Repeat mask, one bit per weekday (bit 0 = Monday); `REPEAT_ONCE`
    /// fires the alarm a single time
    pub repeat_days: u8,
    pub enabled: bool,
}

impl Alarm {
    pub const REPEAT_ONCE: u8 = 0x80;
    pub const REPEAT_WEEKDAYS: u8 = 0x1F;
    pub const REPEAT_EVERY_DAY: u8 = 0x7F;
}

/// Battery charge status byte reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryStatus {
    Normal,
    Charging,
}

/// Battery report
///
/// Recent firmwares append the dates the band last powered off and last
/// charged; older payloads carry only the level, so everything past it is
/// optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatteryInfo {
    /// Charge level, 0-100
    pub level: u8,
    pub status: Option<BatteryStatus>,
    pub last_off: Option<NaiveDate>,
    pub last_charge: Option<NaiveDate>,
}

/// Device-initiated event not correlated to any pending request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The physical button on the band was pressed
    ButtonPress,
    /// Anything the codec does not recognize; kept raw for callers that
    /// understand vendor extensions
    Unknown { endpoint: EndpointId, data: Vec<u8> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_kind_conversion() {
        assert_eq!(AlertKind::from_u8(1).unwrap(), AlertKind::Single);
        assert_eq!(AlertKind::from_u8(0xFE).unwrap(), AlertKind::Like);
        assert!(AlertKind::from_u8(0x42).is_none());
    }

    #[test]
    fn test_alert_kind_to_u8() {
        assert_eq!(AlertKind::Single.to_u8(), 1);
        assert_eq!(AlertKind::Like.to_u8(), 0xFE);
    }

    #[test]
    fn test_key_debug_redacts_secret() {
        let key = Key::new(vec![0xAA; 16], true);
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("AA"));
        assert!(!rendered.contains("170"));
    }
}
