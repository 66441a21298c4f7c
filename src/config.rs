//! Protocol configuration: endpoint addresses, vendor op codes, and timing
//!
//! Exact endpoint UUIDs and op-code values differ between firmware revisions,
//! so everything the wire protocol hard-codes lives here rather than in the
//! codec or state machine. The defaults target the Mi Band 2 lineage.

use crate::types::EndpointId;
use std::time::Duration;
use uuid::Uuid;

/// Vendor op codes and status bytes
///
/// Auth commands are framed as `[op, flags, body...]` and auth replies as
/// `[reply_prefix, op, status, payload...]`. Command-endpoint frames are
/// `[op, body...]`, acknowledged on the notify endpoint as
/// `[ack_tag, op, status]`.
#[derive(Debug, Clone)]
pub struct OpCodeTable {
    /// Register the shared key with the device
    pub auth_key_exchange: u8,

    /// Ask the device for a random challenge
    pub auth_request_challenge: u8,

    /// Submit the encrypted challenge response
    pub auth_submit_response: u8,

    /// Second byte of every auth command
    pub auth_flags: u8,

    /// First byte of every reply on the auth endpoint
    pub auth_reply_prefix: u8,

    /// Status byte: step accepted
    pub status_success: u8,

    /// Status byte: device aborted the key exchange
    pub status_aborted: u8,

    /// Status byte: challenge response did not match the stored key
    pub status_key_mismatch: u8,

    /// Ring/vibrate the band
    pub alert: u8,

    /// Set the device clock
    pub set_time: u8,

    /// Configure an alarm slot
    pub set_alarm: u8,

    /// Request a battery report
    pub battery_request: u8,

    /// Notify-endpoint tag of a battery report
    pub battery_report: u8,

    /// Notify-endpoint tag of a command acknowledgement
    pub command_ack: u8,

    /// Notify-endpoint tag of a button-press event
    pub button_event: u8,
}

impl Default for OpCodeTable {
    fn default() -> Self {
        Self {
            auth_key_exchange: 0x01,
            auth_request_challenge: 0x02,
            auth_submit_response: 0x03,
            auth_flags: 0x00,
            auth_reply_prefix: 0x10,
            status_success: 0x01,
            status_aborted: 0x02,
            status_key_mismatch: 0x04,
            alert: 0x05,
            set_time: 0x0A,
            set_alarm: 0x02,
            battery_request: 0x09,
            battery_report: 0x06,
            command_ack: 0x10,
            button_event: 0x07,
        }
    }
}

/// Configuration for one protocol variant
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Endpoint carrying the authentication handshake (write + notify)
    pub auth_endpoint: EndpointId,

    /// Endpoint all non-auth commands are written to
    pub command_endpoint: EndpointId,

    /// Endpoint command replies and unsolicited events arrive on
    pub notify_endpoint: EndpointId,

    /// Vendor op codes and status bytes
    pub op_codes: OpCodeTable,

    /// How long to wait for the reply to any single request
    pub response_timeout: Duration,

    /// Number of alarm slots the device exposes
    pub alarm_slots: u8,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            auth_endpoint: EndpointId(Uuid::from_u128(0x00000009_0000_3512_2118_0009af100700)),
            command_endpoint: EndpointId(Uuid::from_u128(0x00000003_0000_3512_2118_0009af100700)),
            notify_endpoint: EndpointId(Uuid::from_u128(0x00000004_0000_3512_2118_0009af100700)),
            op_codes: OpCodeTable::default(),
            response_timeout: Duration::from_secs(10),
            alarm_slots: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints_are_distinct() {
        let config = ProtocolConfig::default();
        assert_ne!(config.auth_endpoint, config.command_endpoint);
        assert_ne!(config.auth_endpoint, config.notify_endpoint);
        assert_ne!(config.command_endpoint, config.notify_endpoint);
    }

    #[test]
    fn test_default_auth_ops() {
        let ops = OpCodeTable::default();
        assert_eq!(ops.auth_key_exchange, 0x01);
        assert_eq!(ops.auth_request_challenge, 0x02);
        assert_eq!(ops.auth_submit_response, 0x03);
        assert_eq!(ops.auth_reply_prefix, 0x10);
    }
}
