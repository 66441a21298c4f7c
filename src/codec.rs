//! Command and notification codec
//!
//! Pure binary encoding and decoding of the band's wire frames. No I/O
//! happens here: `encode` turns a typed [`Command`] into the bytes written to
//! an endpoint, `decode` classifies the bytes arriving on a notify endpoint
//! into a [`Notification`]. All multi-byte integers are little-endian.
//!
//! Decoding never fails: frames with an unrecognized tag are classified as
//! `Unsolicited(DeviceEvent::Unknown)` so vendor extensions cannot crash the
//! dispatcher.

use crate::config::ProtocolConfig;
use crate::types::{
    Alarm, AlertKind, BandError, BatteryInfo, BatteryStatus, DeviceEvent, EndpointId, Result,
};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Length of the date/time wire record
pub const DATETIME_LEN: usize = 11;

/// Flag bit marking an alarm slot as enabled
const ALARM_FLAG_ENABLED: u8 = 0x80;

/// A command to be written to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register the shared key with the device (first-pairing step)
    AuthKeyExchange { key: [u8; 16] },
    /// Ask the device for a random challenge
    RequestChallenge,
    /// Submit the encrypted challenge response
    SubmitResponse { response: [u8; 16] },
    /// Ring/vibrate the band
    Alert { kind: AlertKind },
    /// Set the device clock
    SetTime { time: NaiveDateTime },
    /// Configure an alarm slot
    SetAlarm { alarm: Alarm },
    /// Request a battery report
    BatteryRequest,
}

/// A classified frame received from a notify endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Reply to an authentication handshake step
    AuthReply { op: u8, status: u8, payload: Vec<u8> },
    /// Battery report
    BatteryReply(BatteryInfo),
    /// Acknowledgement of a command-endpoint write
    Ack { op: u8, status: u8 },
    /// Device-initiated event, or anything unrecognized
    Unsolicited(DeviceEvent),
}

/// Encode a command into its wire frame
///
/// Range constraints are validated before any bytes are produced; violations
/// are `InvalidArgument` and leave no partial state.
pub fn encode(command: &Command, config: &ProtocolConfig) -> Result<Vec<u8>> {
    let ops = &config.op_codes;

    match command {
        Command::AuthKeyExchange { key } => {
            let mut frame = Vec::with_capacity(2 + key.len());
            frame.push(ops.auth_key_exchange);
            frame.push(ops.auth_flags);
            frame.extend_from_slice(key);
            Ok(frame)
        }
        Command::RequestChallenge => Ok(vec![ops.auth_request_challenge, ops.auth_flags]),
        Command::SubmitResponse { response } => {
            let mut frame = Vec::with_capacity(2 + response.len());
            frame.push(ops.auth_submit_response);
            frame.push(ops.auth_flags);
            frame.extend_from_slice(response);
            Ok(frame)
        }
        Command::Alert { kind } => Ok(vec![ops.alert, kind.to_u8()]),
        Command::SetTime { time } => {
            let mut frame = Vec::with_capacity(1 + DATETIME_LEN);
            frame.push(ops.set_time);
            frame.extend_from_slice(&encode_datetime(time)?);
            Ok(frame)
        }
        Command::SetAlarm { alarm } => {
            let mut frame = Vec::with_capacity(5);
            frame.push(ops.set_alarm);
            frame.extend_from_slice(&encode_alarm(alarm, config.alarm_slots)?);
            Ok(frame)
        }
        Command::BatteryRequest => Ok(vec![ops.battery_request]),
    }
}

/// Classify a frame received on `endpoint`
pub fn decode(endpoint: EndpointId, data: &[u8], config: &ProtocolConfig) -> Notification {
    let ops = &config.op_codes;

    if endpoint == config.auth_endpoint {
        if data.len() >= 3 && data[0] == ops.auth_reply_prefix {
            return Notification::AuthReply {
                op: data[1],
                status: data[2],
                payload: data[3..].to_vec(),
            };
        }
    } else if endpoint == config.notify_endpoint && !data.is_empty() {
        let tag = data[0];
        if tag == ops.battery_report && data.len() >= 2 {
            if let Ok(info) = decode_battery(&data[1..]) {
                return Notification::BatteryReply(info);
            }
        } else if tag == ops.command_ack && data.len() >= 3 {
            return Notification::Ack {
                op: data[1],
                status: data[2],
            };
        } else if tag == ops.button_event {
            return Notification::Unsolicited(DeviceEvent::ButtonPress);
        }
    }

    Notification::Unsolicited(DeviceEvent::Unknown {
        endpoint,
        data: data.to_vec(),
    })
}

/// Encode a calendar timestamp as the device's fixed date/time record
///
/// Layout: year (u16 LE), month, day, hour, minute, second, day-of-week
/// (Monday = 0), then fractional-second, reserved, and UTC-offset bytes.
/// The trailing three bytes are write-only on this device and encoded as
/// zero.
pub fn encode_datetime(time: &NaiveDateTime) -> Result<[u8; DATETIME_LEN]> {
    let year = time.year();
    if !(0..=u16::MAX as i32).contains(&year) {
        return Err(BandError::InvalidArgument(format!(
            "year {} does not fit the wire record",
            year
        )));
    }

    let mut record = [0u8; DATETIME_LEN];
    record[0..2].copy_from_slice(&(year as u16).to_le_bytes());
    record[2] = time.month() as u8;
    record[3] = time.day() as u8;
    record[4] = time.hour() as u8;
    record[5] = time.minute() as u8;
    record[6] = time.second() as u8;
    record[7] = time.weekday().num_days_from_monday() as u8;
    // record[8..11]: fractional second, reserved, UTC offset
    Ok(record)
}

/// Decode the device's date/time record back into a calendar timestamp
///
/// The day-of-week and trailing bytes are redundant and ignored.
pub fn decode_datetime(data: &[u8]) -> Result<NaiveDateTime> {
    if data.len() < 8 {
        return Err(BandError::Protocol(format!(
            "date/time record too short: {} bytes",
            data.len()
        )));
    }

    let year = u16::from_le_bytes([data[0], data[1]]) as i32;
    let date = NaiveDate::from_ymd_opt(year, data[2] as u32, data[3] as u32);
    let time = date.and_then(|d| d.and_hms_opt(data[4] as u32, data[5] as u32, data[6] as u32));

    time.ok_or_else(|| {
        BandError::Protocol(format!(
            "invalid date/time record: {:02X?}",
            &data[..DATETIME_LEN.min(data.len())]
        ))
    })
}

/// Encode an alarm slot body: `[flags | index, hour, minute, repeat_days]`
pub fn encode_alarm(alarm: &Alarm, slots: u8) -> Result<[u8; 4]> {
    if alarm.index >= slots {
        return Err(BandError::InvalidArgument(format!(
            "alarm slot {} out of range (device has {})",
            alarm.index, slots
        )));
    }
    if alarm.hour > 23 {
        return Err(BandError::InvalidArgument(format!(
            "alarm hour {} out of range",
            alarm.hour
        )));
    }
    if alarm.minute > 59 {
        return Err(BandError::InvalidArgument(format!(
            "alarm minute {} out of range",
            alarm.minute
        )));
    }

    let flags = if alarm.enabled { ALARM_FLAG_ENABLED } else { 0 };
    Ok([
        flags | alarm.index,
        alarm.hour,
        alarm.minute,
        alarm.repeat_days,
    ])
}

/// Decode a battery report payload (the bytes after the report tag)
///
/// The level byte is mandatory; the status byte and the last-power-off /
/// last-charge date records are firmware-dependent extras.
pub fn decode_battery(payload: &[u8]) -> Result<BatteryInfo> {
    let level = *payload
        .first()
        .ok_or_else(|| BandError::Protocol("empty battery payload".to_string()))?;

    let status = payload.get(1).map(|&b| {
        if b == 0 {
            BatteryStatus::Normal
        } else {
            BatteryStatus::Charging
        }
    });

    Ok(BatteryInfo {
        level,
        status,
        last_off: payload.get(2..9).and_then(decode_date),
        last_charge: payload.get(10..17).and_then(decode_date),
    })
}

fn decode_date(record: &[u8]) -> Option<NaiveDate> {
    if record.len() < 4 {
        return None;
    }
    let year = u16::from_le_bytes([record[0], record[1]]) as i32;
    NaiveDate::from_ymd_opt(year, record[2] as u32, record[3] as u32)
}
