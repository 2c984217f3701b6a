// src/device/state.rs
//
// The canonical observable state of one device (spec §3). Fields are typed
// `Option<T>`: `None` means either "excluded/disabled" (permanently absent)
// or "not yet known" (will eventually be populated) — `FieldMask` tells
// these two cases apart so publication (§4.4) can gate on "all enabled
// fields populated at least once" without ever emitting a JSON `null`.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

/// All field names the state record can carry, per spec §3's table.
pub const ALL_FIELDS: &[&str] = &[
    "state_of_charge",
    "ac_output",
    "dc_output",
    "usb_output",
    "ac_silent_charging",
    "key_sound",
    "led",
    "ac_charging_booking",
    "ac_charging_rate",
    "ac_charging_level",
    "dc_max_charging_current",
    "discharge_lower_limit",
    "ac_charging_upper_limit",
    "ac_output_power",
    "ac_charging_power",
    "dc_charging_power",
    "total_input_power",
    "ac_input_power",
    "charging_power",
    "usb_output_power",
    "dc_output_power",
];

/// Which fields are enabled for a given device: everything in `ALL_FIELDS`
/// minus the configured `exclude` set, minus `ac_input_power` unless
/// `guess_ac_input_power` is set, minus `ac_charging_level` unless
/// `ac_charging_levels` is configured.
#[derive(Debug, Clone)]
pub struct FieldMask {
    enabled: BTreeSet<&'static str>,
}

impl FieldMask {
    pub fn new(exclude: &[String], guess_ac_input_power: bool, has_charging_levels: bool) -> Self {
        let mut enabled: BTreeSet<&'static str> = ALL_FIELDS.iter().copied().collect();
        for name in exclude {
            enabled.remove(name.as_str());
        }
        if !guess_ac_input_power {
            enabled.remove("ac_input_power");
        }
        if !has_charging_levels {
            enabled.remove("ac_charging_level");
        }
        FieldMask { enabled }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.enabled.contains(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.enabled.iter().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Led {
    Off,
    On,
    SOS,
    Flash,
}

impl Led {
    /// Decode the low 2 bits of the LED-state input register (spec §4.3).
    pub fn from_low_bits(word: u16) -> Led {
        match word & 0x3 {
            0 => Led::Off,
            1 => Led::On,
            2 => Led::SOS,
            _ => Led::Flash,
        }
    }

    pub fn parse(s: &str) -> Option<Led> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Some(Led::Off),
            "on" => Some(Led::On),
            "sos" => Some(Led::SOS),
            "flash" => Some(Led::Flash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    pub state_of_charge: Option<f64>,
    pub ac_output: Option<bool>,
    pub dc_output: Option<bool>,
    pub usb_output: Option<bool>,
    pub ac_silent_charging: Option<bool>,
    pub key_sound: Option<bool>,
    pub led: Option<Led>,
    pub ac_charging_booking: Option<u32>,
    pub ac_charging_rate: Option<u16>,
    pub ac_charging_level: Option<u32>,
    pub dc_max_charging_current: Option<u16>,
    pub discharge_lower_limit: Option<f64>,
    pub ac_charging_upper_limit: Option<f64>,
    pub ac_output_power: Option<i64>,
    pub ac_charging_power: Option<i64>,
    pub dc_charging_power: Option<i64>,
    pub total_input_power: Option<i64>,
    pub ac_input_power: Option<i64>,
    pub charging_power: Option<i64>,
    pub usb_output_power: Option<f64>,
    pub dc_output_power: Option<f64>,
}

impl DeviceState {
    fn field_value(&self, field: &str) -> Option<Value> {
        match field {
            "state_of_charge" => self.state_of_charge.map(round1).map(Value::from),
            "ac_output" => self.ac_output.map(Value::from),
            "dc_output" => self.dc_output.map(Value::from),
            "usb_output" => self.usb_output.map(Value::from),
            "ac_silent_charging" => self.ac_silent_charging.map(Value::from),
            "key_sound" => self.key_sound.map(Value::from),
            "led" => self
                .led
                .map(|l| serde_json::to_value(l).expect("Led serializes")),
            "ac_charging_booking" => self.ac_charging_booking.map(Value::from),
            "ac_charging_rate" => self.ac_charging_rate.map(Value::from),
            "ac_charging_level" => self.ac_charging_level.map(Value::from),
            "dc_max_charging_current" => self.dc_max_charging_current.map(Value::from),
            "discharge_lower_limit" => self.discharge_lower_limit.map(round1).map(Value::from),
            "ac_charging_upper_limit" => self.ac_charging_upper_limit.map(round1).map(Value::from),
            "ac_output_power" => self.ac_output_power.map(Value::from),
            "ac_charging_power" => self.ac_charging_power.map(Value::from),
            "dc_charging_power" => self.dc_charging_power.map(Value::from),
            "total_input_power" => self.total_input_power.map(Value::from),
            "ac_input_power" => self.ac_input_power.map(Value::from),
            "charging_power" => self.charging_power.map(Value::from),
            "usb_output_power" => self.usb_output_power.map(round1).map(Value::from),
            "dc_output_power" => self.dc_output_power.map(round1).map(Value::from),
            _ => None,
        }
    }

    /// True once every field enabled by `mask` has been populated at least
    /// once (spec I2 / §4.4's first-publication gate).
    pub fn is_fully_populated(&self, mask: &FieldMask) -> bool {
        mask.iter().all(|field| self.field_value(field).is_some())
    }

    /// The published-field subset as JSON with lexicographically sorted
    /// keys. Relies on `serde_json::Map` being `BTreeMap`-backed (the
    /// `preserve_order` feature is not enabled) rather than sorting by hand.
    pub fn to_json(&self, mask: &FieldMask) -> Value {
        let mut map = Map::new();
        for field in mask.iter() {
            if let Some(value) = self.field_value(field) {
                map.insert(field.to_string(), value);
            }
        }
        Value::Object(map)
    }

    /// Structural equality restricted to the enabled field subset (spec §9:
    /// "state changed?" compares by value, and absent optional fields must
    /// not be mistaken for a difference).
    pub fn equals_on_mask(&self, other: &DeviceState, mask: &FieldMask) -> bool {
        mask.iter()
            .all(|field| self.field_value(field) == other.field_value(field))
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_field_never_serializes() {
        let mask = FieldMask::new(&["ac_output".to_string()], false, false);
        let mut state = DeviceState::default();
        state.ac_output = Some(true);
        let json = state.to_json(&mask);
        assert!(json.get("ac_output").is_none());
    }

    #[test]
    fn optional_fields_gated_by_config() {
        let mask = FieldMask::new(&[], false, false);
        assert!(!mask.contains("ac_input_power"));
        assert!(!mask.contains("ac_charging_level"));

        let mask = FieldMask::new(&[], true, true);
        assert!(mask.contains("ac_input_power"));
        assert!(mask.contains("ac_charging_level"));
    }

    #[test]
    fn fully_populated_requires_every_enabled_field() {
        let mask = FieldMask::new(&[], false, false);
        let mut state = DeviceState::default();
        assert!(!state.is_fully_populated(&mask));
        for field in mask.iter() {
            apply_dummy(&mut state, field);
        }
        assert!(state.is_fully_populated(&mask));
    }

    fn apply_dummy(state: &mut DeviceState, field: &str) {
        match field {
            "state_of_charge" => state.state_of_charge = Some(50.0),
            "ac_output" => state.ac_output = Some(true),
            "dc_output" => state.dc_output = Some(true),
            "usb_output" => state.usb_output = Some(true),
            "ac_silent_charging" => state.ac_silent_charging = Some(true),
            "key_sound" => state.key_sound = Some(true),
            "led" => state.led = Some(Led::Off),
            "ac_charging_booking" => state.ac_charging_booking = Some(0),
            "ac_charging_rate" => state.ac_charging_rate = Some(1),
            "ac_charging_level" => state.ac_charging_level = Some(300),
            "dc_max_charging_current" => state.dc_max_charging_current = Some(10),
            "discharge_lower_limit" => state.discharge_lower_limit = Some(10.0),
            "ac_charging_upper_limit" => state.ac_charging_upper_limit = Some(80.0),
            "ac_output_power" => state.ac_output_power = Some(100),
            "ac_charging_power" => state.ac_charging_power = Some(100),
            "dc_charging_power" => state.dc_charging_power = Some(100),
            "total_input_power" => state.total_input_power = Some(100),
            "ac_input_power" => state.ac_input_power = Some(100),
            "charging_power" => state.charging_power = Some(200),
            "usb_output_power" => state.usb_output_power = Some(1.0),
            "dc_output_power" => state.dc_output_power = Some(1.0),
            other => panic!("unhandled field {other}"),
        }
    }

    #[test]
    fn state_of_charge_rounds_to_one_decimal() {
        let mask = FieldMask::new(&[], false, false);
        let mut state = DeviceState::default();
        state.state_of_charge = Some(73.2000001);
        let json = state.to_json(&mask);
        assert_eq!(json["state_of_charge"], 73.2);
    }
}
