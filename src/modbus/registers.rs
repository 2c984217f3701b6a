// src/modbus/registers.rs
//
// Register map constants for the sydpower MODBUS dialect. Indices and names
// carried over from original_source/lesyd.py (IREG_*/HREG_*); see spec §6.

pub const COUNT_IREG: usize = 80;
pub const COUNT_HREG: usize = 80;

pub const IREG_AC_CHARGING_RATE: usize = 2;
pub const IREG_AC_CHARGING_POWER: usize = 3;
pub const IREG_DC_CHARGING_POWER: usize = 4;
pub const IREG_TOTAL_INPUT_POWER: usize = 6;
pub const IREG_DC_OUTPUT_POWER_1: usize = 9;
pub const IREG_LED_POWER: usize = 15;
pub const IREG_AC_OUTPUT_POWER: usize = 20;
pub const IREG_LED_STATE: usize = 25;
pub const IREG_USB_OUTPUT_POWER_1: usize = 30;
pub const IREG_USB_OUTPUT_POWER_2: usize = 31;
pub const IREG_USB_OUTPUT_POWER_3: usize = 34;
pub const IREG_USB_OUTPUT_POWER_4: usize = 35;
pub const IREG_USB_OUTPUT_POWER_5: usize = 36;
pub const IREG_USB_OUTPUT_POWER_6: usize = 37;
pub const IREG_STATUS_BITS: usize = 41;
pub const IREG_STATE_OF_CHARGE: usize = 56;
pub const IREG_AC_CHARGING_BOOKING: usize = 57;

pub const HREG_AC_CHARGING_RATE: usize = 13;
pub const HREG_DC_MAX_CHARGING_CURRENT: usize = 20;
pub const HREG_USB_OUTPUT: usize = 24;
pub const HREG_DC_OUTPUT: usize = 25;
pub const HREG_AC_OUTPUT: usize = 26;
pub const HREG_LED: usize = 27;
#[allow(dead_code)] // documents the name the decode *should* use; see key_sound oddity
pub const HREG_KEY_SOUND: usize = 56;
pub const HREG_AC_SILENT_CHARGING: usize = 57;
pub const HREG_AC_CHARGING_BOOKING: usize = 63;
pub const HREG_DISCHARGE_LOWER_LIMIT: usize = 66;
pub const HREG_AC_CHARGING_UPPER_LIMIT: usize = 67;

pub const STATUS_BIT_USB: u16 = 1 << 9;
pub const STATUS_BIT_DC: u16 = 1 << 10;
pub const STATUS_BIT_AC: u16 = 1 << 11;

pub const MAX_AC_CHARGING_BOOKING: i64 = 24 * 60 - 1;
pub const MIN_DISCHARGE_LOWER_LIMIT: i64 = 0;
pub const MAX_DISCHARGE_LOWER_LIMIT: i64 = 500;
pub const MIN_AC_CHARGING_UPPER_LIMIT: i64 = 600;
pub const MAX_AC_CHARGING_UPPER_LIMIT: i64 = 1000;
pub const MIN_DC_MAX_CHARGING_CURRENT: i64 = 1;
pub const MAX_DC_MAX_CHARGING_CURRENT: i64 = 20;
