//! Mi Band BLE Session Protocol
//!
//! This library implements the band's device-session protocol: an
//! authenticated, framed command/notification exchange over the write and
//! notify channels of a connected GATT device. Connecting and scanning are
//! the caller's job; the engine drives everything from `write` and
//! `subscribe` primitives.
//!
//! # Modules
//!
//! - `codec`: binary encoding/decoding of commands and notifications
//! - `crypto`: challenge-response computation for the auth handshake
//! - `session`: authentication state machine and handshake sequencing
//! - `dispatcher`: notification demultiplexing and request correlation
//! - `device`: the high-level `Band` facade
//! - `transport`: transport trait plus the bundled BlueZ adapter
//! - `config`: endpoint addresses, vendor op codes, timing
//! - `types`: common types and error definitions

pub mod codec;
pub mod config;
pub mod crypto;
pub mod device;
pub mod dispatcher;
pub mod session;
pub mod transport;
pub mod types;

pub use codec::{Command, Notification};
pub use config::{OpCodeTable, ProtocolConfig};
pub use device::Band;
pub use dispatcher::NotificationDispatcher;
pub use session::{AuthState, Session};
pub use transport::{BluerTransport, EndpointTransport, NotificationSink};
pub use types::{
    Alarm, AlertKind, AuthStatus, BandError, BatteryInfo, BatteryStatus, DeviceEvent, EndpointId,
    Key, Result,
};
