// src/modbus/codec.rs
//
// Framing for the sydpower MODBUS-over-MQTT dialect. Wire format: 1 byte
// unit id (fixed 0x11), 1 byte function code, function-specific body, 2
// byte CRC-16/MODBUS transmitted high byte then low byte — see spec §4.1.
//
// The CRC-16/MODBUS algorithm is the same one already used for generic
// Modbus-RTU-over-serial framing in the teacher's checksums.rs; this
// dialect's byte order (hi, lo) is confirmed against the original's
// compute_crc/append_crc and differs from the little-endian order a
// standard Modbus RTU frame would use.

use thiserror::Error;

use crate::checksums::crc16_modbus_checksum;

pub const MODBUS_CHANNEL: u8 = 0x11;

pub const FUNC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FUNC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FUNC_WRITE_HOLDING_REGISTER: u8 = 0x06;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModbusError {
    #[error("frame too short or truncated")]
    MalformedFrame,
    #[error("CRC mismatch")]
    BadCrc,
    #[error("unexpected unit id {0:#04x}, expected {MODBUS_CHANNEL:#04x}")]
    BadChannel(u8),
    #[error("unsupported function code {0:#04x}")]
    UnknownFunction(u8),
    #[error("read response covers start={start} count={count}, expected start=0 count=80")]
    PartialBank { start: u16, count: u16 },
}

/// A decoded, CRC-verified, channel-verified response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusResponse {
    /// Function 0x03 or 0x04 full-bank read: 80 register values.
    ReadBank {
        function: u8,
        values: Vec<u16>,
    },
    /// Function 0x06 write echo.
    WriteEcho { index: u16, value: u16 },
    /// Exception response (function | 0x80) — current policy is to ignore.
    Exception { function: u8 },
}

fn append_word(buf: &mut Vec<u8>, value: u16) {
    buf.push((value >> 8) as u8);
    buf.push((value & 0xFF) as u8);
}

fn append_crc(buf: &mut Vec<u8>) {
    let crc = crc16_modbus_checksum(buf);
    buf.push((crc >> 8) as u8);
    buf.push((crc & 0xFF) as u8);
}

fn get_word(buf: &[u8], index: usize) -> Result<u16, ModbusError> {
    let hi = *buf.get(index).ok_or(ModbusError::MalformedFrame)?;
    let lo = *buf.get(index + 1).ok_or(ModbusError::MalformedFrame)?;
    Ok(((hi as u16) << 8) | lo as u16)
}

/// Build a "Read Holding Registers" (0x03) request frame.
pub fn encode_read_holding_registers(start: u16, count: u16) -> Vec<u8> {
    let mut msg = Vec::with_capacity(8);
    msg.push(MODBUS_CHANNEL);
    msg.push(FUNC_READ_HOLDING_REGISTERS);
    append_word(&mut msg, start);
    append_word(&mut msg, count);
    append_crc(&mut msg);
    msg
}

/// Build a "Read Input Registers" (0x04) request frame.
pub fn encode_read_input_registers(start: u16, count: u16) -> Vec<u8> {
    let mut msg = Vec::with_capacity(8);
    msg.push(MODBUS_CHANNEL);
    msg.push(FUNC_READ_INPUT_REGISTERS);
    append_word(&mut msg, start);
    append_word(&mut msg, count);
    append_crc(&mut msg);
    msg
}

/// Build a "Write Single Holding Register" (0x06) request frame.
pub fn encode_write_holding_register(index: u16, value: u16) -> Vec<u8> {
    let mut msg = Vec::with_capacity(8);
    msg.push(MODBUS_CHANNEL);
    msg.push(FUNC_WRITE_HOLDING_REGISTER);
    append_word(&mut msg, index);
    append_word(&mut msg, value);
    append_crc(&mut msg);
    msg
}

/// Verify the trailing CRC of a frame (last 2 bytes, hi then lo).
fn check_crc(buf: &[u8]) -> bool {
    if buf.len() < 2 {
        return false;
    }
    let data = &buf[..buf.len() - 2];
    let crc = crc16_modbus_checksum(data);
    let expected_hi = (crc >> 8) as u8;
    let expected_lo = (crc & 0xFF) as u8;
    buf[buf.len() - 2] == expected_hi && buf[buf.len() - 1] == expected_lo
}

/// Parse and validate a response frame per spec §4.1.
///
/// Returns `Ok(ModbusResponse::Exception)` for exception responses (the
/// caller's policy is to ignore these); returns `Err` for malformed frames,
/// bad CRC, wrong channel, unknown function, or a read response that is not
/// a full 80-register bank starting at 0.
pub fn parse_response(frame: &[u8]) -> Result<ModbusResponse, ModbusError> {
    if frame.len() < 4 {
        return Err(ModbusError::MalformedFrame);
    }
    if !check_crc(frame) {
        return Err(ModbusError::BadCrc);
    }

    let unit_id = frame[0];
    if unit_id != MODBUS_CHANNEL {
        return Err(ModbusError::BadChannel(unit_id));
    }

    let function = frame[1];
    if function & 0x80 != 0 {
        return Ok(ModbusResponse::Exception {
            function: function & 0x7F,
        });
    }

    match function {
        FUNC_READ_HOLDING_REGISTERS | FUNC_READ_INPUT_REGISTERS => {
            let start = get_word(frame, 2)?;
            let count = get_word(frame, 4)?;
            if start != 0 || count as usize != crate::modbus::registers::COUNT_IREG {
                return Err(ModbusError::PartialBank { start, count });
            }
            let body_end = frame.len() - 2;
            let expected_len = 6 + (count as usize) * 2;
            if frame.len() < expected_len {
                return Err(ModbusError::MalformedFrame);
            }
            let mut values = Vec::with_capacity(count as usize);
            for i in 0..count as usize {
                values.push(get_word(frame, 6 + i * 2)?);
            }
            debug_assert_eq!(6 + (count as usize) * 2, body_end + 2);
            Ok(ModbusResponse::ReadBank { function, values })
        }
        FUNC_WRITE_HOLDING_REGISTER => {
            let index = get_word(frame, 2)?;
            let value = get_word(frame, 4)?;
            Ok(ModbusResponse::WriteEcho { index, value })
        }
        other => Err(ModbusError::UnknownFunction(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_roundtrip_read_holding() {
        for start in [0u16, 5, 80] {
            for count in [0u16, 1, 80] {
                let frame = encode_read_holding_registers(start, count);
                assert!(check_crc(&frame));
            }
        }
    }

    #[test]
    fn crc_roundtrip_write() {
        for index in [0u16, 26, 67] {
            for value in [0u16, 1, 1000] {
                let frame = encode_write_holding_register(index, value);
                assert!(check_crc(&frame));
                match parse_response(&frame).unwrap() {
                    ModbusResponse::WriteEcho { index: i, value: v } => {
                        assert_eq!(i, index);
                        assert_eq!(v, value);
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
        }
    }

    #[test]
    fn full_bank_roundtrip() {
        let request = encode_read_input_registers(0, 80);
        assert_eq!(request[0], MODBUS_CHANNEL);
        assert_eq!(request[1], FUNC_READ_INPUT_REGISTERS);

        // Build a synthetic response: start=0, count=80, 80 values, crc.
        let mut resp = vec![MODBUS_CHANNEL, FUNC_READ_INPUT_REGISTERS];
        append_word(&mut resp, 0);
        append_word(&mut resp, 80);
        for i in 0..80u16 {
            append_word(&mut resp, i);
        }
        append_crc(&mut resp);

        match parse_response(&resp).unwrap() {
            ModbusResponse::ReadBank { function, values } => {
                assert_eq!(function, FUNC_READ_INPUT_REGISTERS);
                assert_eq!(values.len(), 80);
                assert_eq!(values[5], 5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn partial_bank_is_rejected() {
        let mut resp = vec![MODBUS_CHANNEL, FUNC_READ_HOLDING_REGISTERS];
        append_word(&mut resp, 0);
        append_word(&mut resp, 10);
        for i in 0..10u16 {
            append_word(&mut resp, i);
        }
        append_crc(&mut resp);
        assert_eq!(
            parse_response(&resp),
            Err(ModbusError::PartialBank { start: 0, count: 10 })
        );
    }

    #[test]
    fn bad_crc_is_rejected() {
        let mut frame = encode_write_holding_register(1, 2);
        *frame.last_mut().unwrap() ^= 0xFF;
        assert_eq!(parse_response(&frame), Err(ModbusError::BadCrc));
    }

    #[test]
    fn bad_channel_is_rejected() {
        let mut frame = encode_write_holding_register(1, 2);
        frame[0] = 0x01;
        // Recompute CRC over the mutated header so only the channel differs.
        let len = frame.len();
        let data = frame[..len - 2].to_vec();
        let crc = crc16_modbus_checksum(&data);
        frame[len - 2] = (crc >> 8) as u8;
        frame[len - 1] = (crc & 0xFF) as u8;
        assert_eq!(parse_response(&frame), Err(ModbusError::BadChannel(0x01)));
    }

    #[test]
    fn exception_response_is_ignored_not_errored() {
        let mut frame = vec![MODBUS_CHANNEL, FUNC_READ_HOLDING_REGISTERS | 0x80, 0x02];
        append_crc(&mut frame);
        assert_eq!(
            parse_response(&frame),
            Ok(ModbusResponse::Exception {
                function: FUNC_READ_HOLDING_REGISTERS
            })
        );
    }

    #[test]
    fn unknown_function_is_rejected() {
        let mut frame = vec![MODBUS_CHANNEL, 0x10, 0x00, 0x00];
        append_crc(&mut frame);
        assert_eq!(parse_response(&frame), Err(ModbusError::UnknownFunction(0x10)));
    }

    #[test]
    fn short_buffer_is_malformed() {
        assert_eq!(parse_response(&[0x11, 0x03]), Err(ModbusError::MalformedFrame));
    }
}
