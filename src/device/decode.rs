// src/device/decode.rs
//
// Decoding of the two 80-word register banks into `DeviceState` mutations,
// the `ac_charging_rate` -> `ac_charging_level` derivation, and the
// optimistic write-echo acceptance/validation table. Grounded on
// `original_source/lesyd.py`'s `process_sydpower_response` (holding/input
// decode, ~lines 747-826) and its write-echo validation (~lines 839-890).

use crate::modbus::registers::*;

use super::state::{DeviceState, Led};

/// Apply `ac_charging_rate -> ac_charging_level` per spec §4.3: clamps an
/// out-of-range rate to the last configured level. `rate == 0` is also
/// out-of-range (the original's `levels[min(value-1, len-1)]` wraps to the
/// last index for `value == 0`, since `value-1` goes negative) and must not
/// be treated as selecting the first level.
pub fn apply_charging_level(state: &mut DeviceState, rate: u16, levels: &[u32]) {
    if levels.is_empty() {
        return;
    }
    let idx = match rate.checked_sub(1) {
        Some(r) => (r as usize).min(levels.len() - 1),
        None => levels.len() - 1,
    };
    state.ac_charging_level = Some(levels[idx]);
}

/// Decode a full 80-word holding-register bank (function 0x03).
///
/// `data[HREG_AC_CHARGING_BOOKING]` (index 63) feeds `key_sound`, not
/// `data[HREG_KEY_SOUND]` (index 56) as that constant's name would suggest.
/// This reproduces a known oddity in the source this dialect was reverse
/// engineered from; it is deliberate, not a bug in this port — see
/// DESIGN.md.
pub fn decode_holding_bank(data: &[u16], state: &mut DeviceState, ac_charging_levels: &[u32]) {
    debug_assert_eq!(data.len(), COUNT_HREG);

    state.ac_silent_charging = Some(data[HREG_AC_SILENT_CHARGING] != 0);
    state.ac_output = Some(data[HREG_AC_OUTPUT] != 0);
    state.dc_output = Some(data[HREG_DC_OUTPUT] != 0);
    state.usb_output = Some(data[HREG_USB_OUTPUT] != 0);
    state.dc_max_charging_current = Some(data[HREG_DC_MAX_CHARGING_CURRENT]);
    state.ac_charging_booking = Some(data[HREG_AC_CHARGING_BOOKING] as u32);
    state.key_sound = Some(data[HREG_AC_CHARGING_BOOKING] != 0);
    state.ac_charging_rate = Some(data[HREG_AC_CHARGING_RATE]);

    state.discharge_lower_limit = Some(data[HREG_DISCHARGE_LOWER_LIMIT] as f64 / 10.0);
    state.ac_charging_upper_limit = Some(data[HREG_AC_CHARGING_UPPER_LIMIT] as f64 / 10.0);

    apply_charging_level(state, data[HREG_AC_CHARGING_RATE], ac_charging_levels);
}

/// Decode a full 80-word input-register bank (function 0x04).
pub fn decode_input_bank(
    data: &[u16],
    state: &mut DeviceState,
    ac_charging_levels: &[u32],
    guess_ac_input_power: bool,
) {
    debug_assert_eq!(data.len(), COUNT_IREG);

    state.state_of_charge = Some(data[IREG_STATE_OF_CHARGE] as f64 / 10.0);

    let status_bits = data[IREG_STATUS_BITS];
    state.ac_output = Some(status_bits & STATUS_BIT_AC != 0);
    state.dc_output = Some(status_bits & STATUS_BIT_DC != 0);
    state.usb_output = Some(status_bits & STATUS_BIT_USB != 0);

    state.total_input_power = Some(data[IREG_TOTAL_INPUT_POWER] as i64);
    state.charging_power =
        Some(data[IREG_AC_CHARGING_POWER] as i64 + data[IREG_DC_CHARGING_POWER] as i64);
    state.ac_charging_power = Some(data[IREG_AC_CHARGING_POWER] as i64);
    state.dc_charging_power = Some(data[IREG_DC_CHARGING_POWER] as i64);

    if guess_ac_input_power {
        let guess = data[IREG_TOTAL_INPUT_POWER] as i64 - data[IREG_DC_CHARGING_POWER] as i64;
        state.ac_input_power = Some(guess.max(0));
    }

    state.ac_output_power = Some(data[IREG_AC_OUTPUT_POWER] as i64);
    state.ac_charging_booking = Some(data[IREG_AC_CHARGING_BOOKING] as u32);
    state.ac_charging_rate = Some(data[IREG_AC_CHARGING_RATE]);

    let usb_total: u32 = [
        IREG_USB_OUTPUT_POWER_1,
        IREG_USB_OUTPUT_POWER_2,
        IREG_USB_OUTPUT_POWER_3,
        IREG_USB_OUTPUT_POWER_4,
        IREG_USB_OUTPUT_POWER_5,
        IREG_USB_OUTPUT_POWER_6,
    ]
    .iter()
    .map(|&i| data[i] as u32)
    .sum();
    state.usb_output_power = Some(usb_total as f64 / 10.0);

    state.dc_output_power =
        Some((data[IREG_LED_POWER] as f64 + data[IREG_DC_OUTPUT_POWER_1] as f64) / 10.0);

    state.led = Some(Led::from_low_bits(data[IREG_LED_STATE]));

    apply_charging_level(state, data[IREG_AC_CHARGING_RATE], ac_charging_levels);
}

/// Outcome of validating a function-0x06 write echo against the register's
/// acceptable range (spec §6's "validation for write echo" column).
pub enum WriteEcho {
    /// The echoed value was valid; local state was updated.
    Applied,
    /// The echo referenced a register we don't track; no-op, not an error.
    UnknownRegister,
    /// The echoed value failed validation: caller should force a re-read.
    Invalid,
}

/// Apply (or reject) an optimistic write-echo per spec §4.3/§6.
pub fn apply_write_echo(
    index: u16,
    value: u16,
    state: &mut DeviceState,
    ac_charging_levels: &[u32],
) -> WriteEcho {
    match index as usize {
        HREG_AC_SILENT_CHARGING => {
            if value == 0 || value == 1 {
                state.ac_silent_charging = Some(value != 0);
                WriteEcho::Applied
            } else {
                WriteEcho::Invalid
            }
        }
        HREG_AC_OUTPUT => {
            if value == 0 || value == 1 {
                state.ac_output = Some(value != 0);
                WriteEcho::Applied
            } else {
                WriteEcho::Invalid
            }
        }
        HREG_DC_OUTPUT => {
            if value == 0 || value == 1 {
                state.dc_output = Some(value != 0);
                WriteEcho::Applied
            } else {
                WriteEcho::Invalid
            }
        }
        HREG_USB_OUTPUT => {
            if value == 0 || value == 1 {
                state.usb_output = Some(value != 0);
                WriteEcho::Applied
            } else {
                WriteEcho::Invalid
            }
        }
        HREG_KEY_SOUND => {
            if value == 0 || value == 1 {
                state.key_sound = Some(value != 0);
                WriteEcho::Applied
            } else {
                WriteEcho::Invalid
            }
        }
        HREG_LED => {
            if (value as usize) < 4 {
                state.led = Some(Led::from_low_bits(value));
                WriteEcho::Applied
            } else {
                WriteEcho::Invalid
            }
        }
        HREG_AC_CHARGING_BOOKING => {
            if (value as i64) <= MAX_AC_CHARGING_BOOKING {
                state.ac_charging_booking = Some(value as u32);
                WriteEcho::Applied
            } else {
                WriteEcho::Invalid
            }
        }
        HREG_DISCHARGE_LOWER_LIMIT => {
            let v = value as i64;
            if (MIN_DISCHARGE_LOWER_LIMIT..=MAX_DISCHARGE_LOWER_LIMIT).contains(&v) {
                state.discharge_lower_limit = Some(value as f64 / 10.0);
                WriteEcho::Applied
            } else {
                WriteEcho::Invalid
            }
        }
        HREG_AC_CHARGING_UPPER_LIMIT => {
            let v = value as i64;
            if (MIN_AC_CHARGING_UPPER_LIMIT..=MAX_AC_CHARGING_UPPER_LIMIT).contains(&v) {
                state.ac_charging_upper_limit = Some(value as f64 / 10.0);
                WriteEcho::Applied
            } else {
                WriteEcho::Invalid
            }
        }
        HREG_DC_MAX_CHARGING_CURRENT => {
            let v = value as i64;
            if (MIN_DC_MAX_CHARGING_CURRENT..=MAX_DC_MAX_CHARGING_CURRENT).contains(&v) {
                state.dc_max_charging_current = Some(value);
                WriteEcho::Applied
            } else {
                WriteEcho::Invalid
            }
        }
        HREG_AC_CHARGING_RATE => {
            state.ac_charging_rate = Some(value);
            apply_charging_level(state, value, ac_charging_levels);
            WriteEcho::Applied
        }
        _ => WriteEcho::UnknownRegister,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(len: usize) -> Vec<u16> {
        vec![0u16; len]
    }

    #[test]
    fn scenario_cold_start_full_poll() {
        let mut data = bank(COUNT_IREG);
        data[IREG_STATE_OF_CHARGE] = 732;
        data[IREG_STATUS_BITS] = 0b1110_0000_0000;
        data[IREG_TOTAL_INPUT_POWER] = 150;
        data[IREG_DC_CHARGING_POWER] = 50;

        let mut state = DeviceState::default();
        decode_input_bank(&data, &mut state, &[], true);

        assert_eq!(state.state_of_charge, Some(73.2));
        assert_eq!(state.ac_output, Some(true));
        assert_eq!(state.dc_output, Some(true));
        assert_eq!(state.usb_output, Some(true));
        assert_eq!(state.ac_input_power, Some(100));
    }

    #[test]
    fn scenario_level_derivation() {
        let levels = vec![300, 500, 700, 900, 1100];
        let mut data = bank(COUNT_HREG);
        data[HREG_AC_CHARGING_RATE] = 4;
        let mut state = DeviceState::default();
        decode_holding_bank(&data, &mut state, &levels);
        assert_eq!(state.ac_charging_level, Some(900));

        data[HREG_AC_CHARGING_RATE] = 9;
        let mut state = DeviceState::default();
        decode_holding_bank(&data, &mut state, &levels);
        assert_eq!(state.ac_charging_level, Some(1100));

        data[HREG_AC_CHARGING_RATE] = 0;
        let mut state = DeviceState::default();
        decode_holding_bank(&data, &mut state, &levels);
        assert_eq!(state.ac_charging_level, Some(1100));
    }

    #[test]
    fn key_sound_reads_booking_index_not_its_own_register() {
        let mut data = bank(COUNT_HREG);
        data[HREG_AC_CHARGING_BOOKING] = 1;
        data[HREG_KEY_SOUND] = 0;
        let mut state = DeviceState::default();
        decode_holding_bank(&data, &mut state, &[]);
        assert_eq!(state.key_sound, Some(true));
    }

    #[test]
    fn scenario_optimistic_writeback() {
        let mut state = DeviceState::default();
        let outcome = apply_write_echo(HREG_AC_OUTPUT as u16, 1, &mut state, &[]);
        assert!(matches!(outcome, WriteEcho::Applied));
        assert_eq!(state.ac_output, Some(true));
    }

    #[test]
    fn scenario_invalid_echo_is_rejected() {
        let mut state = DeviceState::default();
        let outcome = apply_write_echo(HREG_DISCHARGE_LOWER_LIMIT as u16, 700, &mut state, &[]);
        assert!(matches!(outcome, WriteEcho::Invalid));
        assert_eq!(state.discharge_lower_limit, None);
    }

    #[test]
    fn dc_output_power_sums_led_and_dc1() {
        let mut data = bank(COUNT_IREG);
        data[IREG_LED_POWER] = 20;
        data[IREG_DC_OUTPUT_POWER_1] = 30;
        let mut state = DeviceState::default();
        decode_input_bank(&data, &mut state, &[], false);
        assert_eq!(state.dc_output_power, Some(5.0));
    }
}
