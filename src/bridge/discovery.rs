// src/bridge/discovery.rs
//
// Home-Assistant MQTT discovery document construction — a pure function of
// bridge identity and device metadata (spec §1 "out of scope: layout not
// core" / §6 enumerates its content). Translated from
// `original_source/lesyd.py`'s `homeassistant_discovery` (~lines 228-442).

use serde_json::{json, Map, Value};

use crate::config::DeviceConfig;
use crate::device::state::FieldMask;

const ORIGIN_NAME: &str = "lesyd";
const ORIGIN_SW: &str = "1.0";

struct Component {
    key: &'static str,
    platform: &'static str,
    attrs: Value,
}

fn component_table() -> Vec<Component> {
    vec![
        Component {
            key: "dc_input_power",
            platform: "sensor",
            attrs: json!({}),
        },
        Component {
            key: "state_of_charge",
            platform: "sensor",
            attrs: json!({"name": "State of Charge", "device_class": "battery", "unit_of_measurement": "%"}),
        },
        Component {
            key: "ac_output_power",
            platform: "sensor",
            attrs: json!({"name": "AC Output Power", "device_class": "power", "unit_of_measurement": "W"}),
        },
        Component {
            key: "dc_output_power",
            platform: "sensor",
            attrs: json!({"name": "DC Output Power", "device_class": "power", "unit_of_measurement": "W"}),
        },
        Component {
            key: "dc_charging_power",
            platform: "sensor",
            attrs: json!({"name": "DC Charging Power", "device_class": "power", "unit_of_measurement": "W"}),
        },
        Component {
            key: "usb_output_power",
            platform: "sensor",
            attrs: json!({"name": "USB Output Power", "device_class": "power", "unit_of_measurement": "W"}),
        },
        Component {
            key: "ac_input_power",
            platform: "sensor",
            attrs: json!({"name": "AC Input Power", "device_class": "power", "unit_of_measurement": "W"}),
        },
        Component {
            key: "ac_charging_power",
            platform: "sensor",
            attrs: json!({"name": "AC Charging Power", "device_class": "power", "unit_of_measurement": "W"}),
        },
        Component {
            key: "charging_power",
            platform: "sensor",
            attrs: json!({"name": "Charging Power", "device_class": "power", "unit_of_measurement": "W"}),
        },
        Component {
            key: "total_input_power",
            platform: "sensor",
            attrs: json!({"name": "Total Input Power", "device_class": "power", "unit_of_measurement": "W"}),
        },
        Component {
            key: "ac_charging_rate",
            platform: "sensor",
            attrs: json!({"name": "AC Charging Rate", "entity_category": "diagnostic"}),
        },
        Component {
            key: "ac_charging_level",
            platform: "sensor",
            attrs: json!({
                "name": "AC Charging Level",
                "device_class": "power",
                "unit_of_measurement": "W",
                "entity_category": "diagnostic",
            }),
        },
        Component {
            key: "led",
            platform: "select",
            attrs: json!({"name": "Led", "options": ["Off", "On", "SOS", "Flash"]}),
        },
        Component {
            key: "ac_charging_booking",
            platform: "number",
            attrs: json!({
                "name": "AC Charging Booking",
                "unit_of_measurement": "min",
                "min": 0,
                "max": crate::modbus::registers::MAX_AC_CHARGING_BOOKING,
                "step": 1,
            }),
        },
        Component {
            key: "dc_max_charging_current",
            platform: "number",
            attrs: json!({
                "name": "DC Max Charging Current",
                "unit_of_measurement": "A",
                "min": 1,
                "max": crate::modbus::registers::MAX_DC_MAX_CHARGING_CURRENT,
                "step": 1,
                "entity_category": "config",
            }),
        },
        Component {
            key: "discharge_lower_limit",
            platform: "number",
            attrs: json!({
                "name": "Discharge Lower Limit",
                "unit_of_measurement": "%",
                "min": crate::modbus::registers::MIN_DISCHARGE_LOWER_LIMIT as f64 / 10.0,
                "max": crate::modbus::registers::MAX_DISCHARGE_LOWER_LIMIT as f64 / 10.0,
                "step": 0.1,
                "entity_category": "config",
            }),
        },
        Component {
            key: "ac_charging_upper_limit",
            platform: "number",
            attrs: json!({
                "name": "AC Charging Upper Limit",
                "unit_of_measurement": "%",
                "min": crate::modbus::registers::MIN_AC_CHARGING_UPPER_LIMIT as f64 / 10.0,
                "max": crate::modbus::registers::MAX_AC_CHARGING_UPPER_LIMIT as f64 / 10.0,
                "step": 0.1,
                "entity_category": "config",
            }),
        },
        Component {
            key: "ac_output",
            platform: "switch",
            attrs: json!({"name": "AC Output", "payload_on": true, "payload_off": false}),
        },
        Component {
            key: "usb_output",
            platform: "switch",
            attrs: json!({"name": "USB Output", "payload_on": true, "payload_off": false}),
        },
        Component {
            key: "dc_output",
            platform: "switch",
            attrs: json!({"name": "DC Output", "payload_on": true, "payload_off": false}),
        },
        Component {
            key: "ac_silent_charging",
            platform: "switch",
            attrs: json!({"name": "AC Silent Charging", "icon": "mdi:fan", "payload_on": true, "payload_off": false}),
        },
        Component {
            key: "key_sound",
            platform: "switch",
            attrs: json!({
                "name": "Key Sound",
                "payload_on": true,
                "payload_off": false,
                "entity_category": "config",
            }),
        },
    ]
}

pub fn discovery_topic(ha_prefix: &str, mac_lower: &str) -> String {
    format!("{ha_prefix}/device/lesyd/{mac_lower}/config")
}

/// Build the retained HA discovery document for one device.
pub fn build_discovery(
    bridge_name: &str,
    will_topic: &str,
    device: &DeviceConfig,
    mask: &FieldMask,
) -> Value {
    let unique_id = format!("{bridge_name}_{}", device.mac);
    let topic_status = format!("{bridge_name}/{}/status", device.name);
    let topic_state = format!("{bridge_name}/{}/state", device.name);

    let mut components = Map::new();
    for component in component_table() {
        if mask.contains(component.key) {
            let mut entry = match component.attrs {
                Value::Object(m) => m,
                _ => Map::new(),
            };
            entry.insert("platform".to_string(), Value::String(component.platform.to_string()));
            entry.insert(
                "unique_id".to_string(),
                Value::String(format!("{unique_id}_{}", component.key)),
            );
            entry.insert(
                "object_id".to_string(),
                Value::String(format!("{}_{}", device.name, component.key)),
            );
            entry
                .entry("value_template")
                .or_insert_with(|| Value::String(format!("{{{{ value_json.{} }}}}", component.key)));
            if matches!(component.platform, "switch" | "number" | "select") {
                entry
                    .entry("command_topic")
                    .or_insert_with(|| Value::String(format!("{topic_state}/set/{}", component.key)));
            }
            components.insert(component.key.to_string(), Value::Object(entry));
        } else {
            components.insert(
                component.key.to_string(),
                json!({ "platform": component.platform }),
            );
        }
    }

    json!({
        "device": {
            "identifiers": [unique_id],
            "name": device.name,
            "manufacturer": device.manufacturer,
            "model_id": device.model_id,
            "hw_version": "1.0rev2",
        },
        "origin": {
            "name": ORIGIN_NAME,
            "sw": ORIGIN_SW,
            "url": "https://github.com/",
        },
        "availability": [
            { "topic": will_topic },
            { "topic": topic_status },
        ],
        "availability_mode": "all",
        "components": components,
        "state_topic": topic_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceConfig {
        DeviceConfig {
            mac: "abcdefabcdef".to_string(),
            name: "my_device".to_string(),
            manufacturer: "Fossibot".to_string(),
            model_id: "F2400".to_string(),
            extension1: false,
            extension2: false,
            exclude: vec!["dc_output".to_string()],
            loglevel: "warning".to_string(),
            state_refresh: std::time::Duration::from_secs(30),
            input_refresh: std::time::Duration::from_secs(6),
            holding_refresh: std::time::Duration::from_secs(30),
            ac_charging_levels: vec![],
            guess_ac_input_power: false,
        }
    }

    #[test]
    fn excluded_field_is_a_bare_platform_stub() {
        let mask = FieldMask::new(&["dc_output".to_string()], false, false);
        let doc = build_discovery("lesyd", "lesyd/bridge/status", &device(), &mask);
        let dc = &doc["components"]["dc_output"];
        assert_eq!(dc.as_object().unwrap().len(), 1);
        assert_eq!(dc["platform"], "switch");
    }

    #[test]
    fn enabled_field_carries_unique_id_and_command_topic() {
        let mask = FieldMask::new(&["dc_output".to_string()], false, false);
        let doc = build_discovery("lesyd", "lesyd/bridge/status", &device(), &mask);
        let ac = &doc["components"]["ac_output"];
        assert_eq!(ac["unique_id"], "lesyd_abcdefabcdef_ac_output");
        assert_eq!(ac["command_topic"], "lesyd/my_device/state/set/ac_output");
    }
}
