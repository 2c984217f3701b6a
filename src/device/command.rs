// src/device/command.rs
//
// Parses payloads on `<bridge>/<device>/state/set/<field>` into an encoded
// write-holding-register frame, per spec §4.3's command ingestion table.
// Grounded on `original_source/lesyd.py`'s `process_command` (~lines
// 927-987): parse/range failures are reported as `CommandParseError` so the
// caller can log them at debug, but the engine never NACKs over MQTT.

use crate::error::CommandParseError;
use crate::modbus::codec::encode_write_holding_register;
use crate::modbus::registers::*;

use super::state::Led;

fn parse_bool(payload: &str) -> Result<bool, CommandParseError> {
    match payload.to_ascii_lowercase().as_str() {
        "on" | "1" | "t" | "true" => Ok(true),
        "off" | "0" | "f" | "false" => Ok(false),
        _ => Err(CommandParseError::BadPayload {
            payload: payload.to_string(),
            expected: "bool",
        }),
    }
}

fn parse_int_range(payload: &str, min: i64, max: i64) -> Result<i64, CommandParseError> {
    let v: i64 = payload
        .parse()
        .map_err(|_| CommandParseError::BadPayload {
            payload: payload.to_string(),
            expected: "integer",
        })?;
    if v < min || v > max {
        return Err(CommandParseError::OutOfRange {
            value: v as f64,
            min: min as f64,
            max: max as f64,
        });
    }
    Ok(v)
}

fn parse_float_range(payload: &str, min: f64, max: f64) -> Result<f64, CommandParseError> {
    let v: f64 = payload
        .parse()
        .map_err(|_| CommandParseError::BadPayload {
            payload: payload.to_string(),
            expected: "real",
        })?;
    if v < min || v > max {
        return Err(CommandParseError::OutOfRange { value: v, min, max });
    }
    Ok(v)
}

/// Parse a command for `field` with raw UTF-8 `payload` and, on success,
/// return the MODBUS write-holding-register frame to enqueue.
pub fn parse_command(field: &str, payload: &[u8]) -> Result<Vec<u8>, CommandParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| CommandParseError::BadPayload {
        payload: String::from_utf8_lossy(payload).into_owned(),
        expected: "utf-8 text",
    })?;

    let (index, value) = match field {
        "ac_output" => (HREG_AC_OUTPUT, parse_bool(text)? as u16),
        "dc_output" => (HREG_DC_OUTPUT, parse_bool(text)? as u16),
        "usb_output" => (HREG_USB_OUTPUT, parse_bool(text)? as u16),
        "ac_silent_charging" => (HREG_AC_SILENT_CHARGING, parse_bool(text)? as u16),
        "key_sound" => (HREG_KEY_SOUND, parse_bool(text)? as u16),
        "led" => {
            let led = Led::parse(text).ok_or_else(|| CommandParseError::BadPayload {
                payload: text.to_string(),
                expected: "led name (Off/On/SOS/Flash)",
            })?;
            (HREG_LED, led as u16)
        }
        "ac_charging_booking" => (
            HREG_AC_CHARGING_BOOKING,
            parse_int_range(text, 0, MAX_AC_CHARGING_BOOKING)? as u16,
        ),
        "dc_max_charging_current" => (
            HREG_DC_MAX_CHARGING_CURRENT,
            parse_int_range(text, MIN_DC_MAX_CHARGING_CURRENT, MAX_DC_MAX_CHARGING_CURRENT)? as u16,
        ),
        "discharge_lower_limit" => {
            let v = parse_float_range(
                text,
                MIN_DISCHARGE_LOWER_LIMIT as f64 / 10.0,
                MAX_DISCHARGE_LOWER_LIMIT as f64 / 10.0,
            )?;
            (HREG_DISCHARGE_LOWER_LIMIT, (v * 10.0).round() as u16)
        }
        "ac_charging_upper_limit" => {
            let v = parse_float_range(
                text,
                MIN_AC_CHARGING_UPPER_LIMIT as f64 / 10.0,
                MAX_AC_CHARGING_UPPER_LIMIT as f64 / 10.0,
            )?;
            (HREG_AC_CHARGING_UPPER_LIMIT, (v * 10.0).round() as u16)
        }
        other => return Err(CommandParseError::UnknownField(other.to_string())),
    };

    Ok(encode_write_holding_register(index as u16, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::codec::{parse_response, ModbusResponse};

    #[test]
    fn ac_output_on_encodes_write_to_holding_26() {
        let frame = parse_command("ac_output", b"on").unwrap();
        match parse_response(&frame).unwrap() {
            ModbusResponse::WriteEcho { index, value } => {
                assert_eq!(index as usize, HREG_AC_OUTPUT);
                assert_eq!(value, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn led_is_case_insensitive() {
        let frame = parse_command("led", b"sos").unwrap();
        match parse_response(&frame).unwrap() {
            ModbusResponse::WriteEcho { index, value } => {
                assert_eq!(index as usize, HREG_LED);
                assert_eq!(value, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn out_of_range_booking_is_rejected() {
        let err = parse_command("ac_charging_booking", b"1440").unwrap_err();
        assert!(matches!(err, CommandParseError::OutOfRange { .. }));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = parse_command("not_a_field", b"1").unwrap_err();
        assert!(matches!(err, CommandParseError::UnknownField(_)));
    }

    #[test]
    fn discharge_lower_limit_scales_by_ten() {
        let frame = parse_command("discharge_lower_limit", b"12.3").unwrap();
        match parse_response(&frame).unwrap() {
            ModbusResponse::WriteEcho { index, value } => {
                assert_eq!(index as usize, HREG_DISCHARGE_LOWER_LIMIT);
                assert_eq!(value, 123);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
