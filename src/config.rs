// src/config.rs
//
// YAML configuration loading (spec §6's "Configuration surface"), preset
// table, and structural validation standing in for the original's `yamale`
// schema. Struct layout and `#[serde(default = "...")]` field defaults
// follow the teacher's `settings.rs`; validation errors are reported via
// `ConfigError` (spec §7) rather than a generic schema-violation message.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_STATE_REFRESH: u64 = 30;
const DEFAULT_INPUT_REFRESH: u64 = 6;
const DEFAULT_HOLDING_REFRESH: u64 = 30;
const REFRESH_MIN: u64 = 3;
const REFRESH_MAX: u64 = 60;

fn default_lesyd_name() -> String {
    "lesyd".to_string()
}
fn default_loglevel() -> String {
    "warning".to_string()
}
fn default_ha_prefix() -> String {
    "homeassistant".to_string()
}
fn default_hostname() -> String {
    "localhost".to_string()
}
fn default_state_refresh() -> u64 {
    DEFAULT_STATE_REFRESH
}
fn default_input_refresh() -> u64 {
    DEFAULT_INPUT_REFRESH
}
fn default_holding_refresh() -> u64 {
    DEFAULT_HOLDING_REFRESH
}
fn default_manufacturer() -> String {
    "Unknown".to_string()
}
fn default_model_id() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Unix,
    Websocket,
}

impl Default for Transport {
    fn default() -> Self {
        Transport::Tcp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsVersion {
    Default,
    #[serde(rename = "tlsv1.2")]
    Tls12,
    #[serde(rename = "tlsv1.1")]
    Tls11,
    #[serde(rename = "tlsv1")]
    Tls10,
}

impl Default for TlsVersion {
    fn default() -> Self {
        TlsVersion::Default
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    pub ca_certs: Option<String>,
    pub certfile: Option<String>,
    pub keyfile: Option<String>,
    pub keyfile_password: Option<String>,
    #[serde(default)]
    pub version: TlsVersion,
    pub ciphers: Option<String>,
    #[serde(default)]
    pub insecure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttEndpointConfig {
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: Option<TlsConfig>,
}

impl Default for MqttEndpointConfig {
    fn default() -> Self {
        MqttEndpointConfig {
            transport: Transport::Tcp,
            hostname: default_hostname(),
            port: None,
            username: None,
            password: None,
            tls: None,
        }
    }
}

impl MqttEndpointConfig {
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.tls {
            Some(_) => 8883,
            None => 1883,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalSection {
    #[serde(default = "default_lesyd_name")]
    pub lesyd_name: String,
    pub logconfig: Option<String>,
    pub logfile: Option<String>,
    #[serde(default = "default_loglevel")]
    pub loglevel: String,
    #[serde(default)]
    pub ha_discovery: bool,
    #[serde(default = "default_ha_prefix")]
    pub ha_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDeviceConfig {
    pub name: Option<String>,
    pub preset: Option<String>,
    pub manufacturer: Option<String>,
    pub model_id: Option<String>,
    pub extension1: Option<bool>,
    pub extension2: Option<bool>,
    #[serde(default)]
    pub exclude: Vec<String>,
    pub loglevel: Option<String>,
    pub state_refresh: Option<u64>,
    pub input_refresh: Option<u64>,
    pub holding_refresh: Option<u64>,
    pub ac_charging_levels: Option<Vec<i64>>,
    pub guess_ac_input_power: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub global: GlobalSection,
    pub mqtt_client: MqttEndpointConfig,
    pub mqtt_sydpower: Option<MqttEndpointConfig>,
    pub devices: BTreeMap<String, RawDeviceConfig>,
}

/// Default model metadata and `ac_charging_levels` supplied by `preset`.
#[derive(Debug, Clone)]
pub struct Preset {
    pub manufacturer: &'static str,
    pub model_id: &'static str,
    pub ac_charging_levels: &'static [u32],
    pub extension1: bool,
    pub extension2: bool,
}

pub fn presets() -> &'static BTreeMap<&'static str, Preset> {
    use std::sync::OnceLock;
    static PRESETS: OnceLock<BTreeMap<&'static str, Preset>> = OnceLock::new();
    PRESETS.get_or_init(|| {
        let mut m = BTreeMap::new();
        m.insert(
            "F2400-B",
            Preset {
                manufacturer: "Fossibot",
                model_id: "F2400",
                ac_charging_levels: &[300, 500, 700, 900, 1100],
                extension1: false,
                extension2: false,
            },
        );
        m.insert(
            "F3600Pro",
            Preset {
                manufacturer: "Fossibot",
                model_id: "F3600-Pro",
                ac_charging_levels: &[400, 800, 1200, 1600, 2200],
                extension1: true,
                extension2: true,
            },
        );
        m
    })
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub mac: String,
    pub name: String,
    pub manufacturer: String,
    pub model_id: String,
    pub extension1: bool,
    pub extension2: bool,
    pub exclude: Vec<String>,
    pub loglevel: String,
    pub state_refresh: Duration,
    pub input_refresh: Duration,
    pub holding_refresh: Duration,
    pub ac_charging_levels: Vec<u32>,
    pub guess_ac_input_power: bool,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub name: String,
    pub ha_discovery: bool,
    pub ha_prefix: String,
    pub loglevel: String,
    pub logfile: Option<String>,
    pub client: MqttEndpointConfig,
    pub sydpower: MqttEndpointConfig,
    pub devices: Vec<DeviceConfig>,
}

fn is_valid_mac(mac: &str) -> bool {
    mac.len() == 12 && mac.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_range(device: &str, field: &'static str, min: i64, max: i64, value: i64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            device: device.to_string(),
            field,
            min,
            max,
            value,
        });
    }
    Ok(())
}

/// Parse and structurally validate a configuration document.
pub fn parse(text: &str) -> Result<BridgeConfig, ConfigError> {
    let raw: RawConfig = serde_yaml::from_str(text)?;

    if raw.devices.is_empty() {
        return Err(ConfigError::NoDevices);
    }

    let mut devices = Vec::with_capacity(raw.devices.len());
    let mut seen_names = std::collections::HashSet::new();

    for (mac, dev) in &raw.devices {
        if !is_valid_mac(mac) {
            return Err(ConfigError::InvalidMac(mac.clone()));
        }

        let name = dev.name.clone().unwrap_or_else(|| mac.clone());
        if !is_valid_name(&name) {
            return Err(ConfigError::InvalidName(name));
        }
        if name == "bridge" {
            return Err(ConfigError::ReservedName(name));
        }
        if !seen_names.insert(name.clone()) {
            return Err(ConfigError::DuplicateName(name));
        }

        let preset = match &dev.preset {
            Some(preset_name) => Some(
                presets()
                    .get(preset_name.as_str())
                    .ok_or_else(|| ConfigError::UnknownPreset(preset_name.clone(), name.clone()))?,
            ),
            None => None,
        };

        let manufacturer = dev
            .manufacturer
            .clone()
            .or_else(|| preset.map(|p| p.manufacturer.to_string()))
            .unwrap_or_else(default_manufacturer);
        let model_id = dev
            .model_id
            .clone()
            .or_else(|| preset.map(|p| p.model_id.to_string()))
            .unwrap_or_else(default_model_id);
        let extension1 = dev.extension1.unwrap_or_else(|| preset.map_or(false, |p| p.extension1));
        let extension2 = dev.extension2.unwrap_or_else(|| preset.map_or(false, |p| p.extension2));

        let state_refresh = dev.state_refresh.unwrap_or_else(default_state_refresh);
        let input_refresh = dev.input_refresh.unwrap_or_else(default_input_refresh);
        let holding_refresh = dev.holding_refresh.unwrap_or_else(default_holding_refresh);
        check_range(&name, "state_refresh", REFRESH_MIN as i64, REFRESH_MAX as i64, state_refresh as i64)?;
        check_range(&name, "input_refresh", REFRESH_MIN as i64, REFRESH_MAX as i64, input_refresh as i64)?;
        check_range(&name, "holding_refresh", REFRESH_MIN as i64, REFRESH_MAX as i64, holding_refresh as i64)?;

        let ac_charging_levels: Vec<u32> = match &dev.ac_charging_levels {
            Some(levels) => {
                if levels.is_empty() {
                    return Err(ConfigError::EmptyChargingLevels(name.clone()));
                }
                let mut out = Vec::with_capacity(levels.len());
                for &lvl in levels {
                    if lvl < 1 {
                        return Err(ConfigError::EmptyChargingLevels(name.clone()));
                    }
                    out.push(lvl as u32);
                }
                out
            }
            None => preset.map(|p| p.ac_charging_levels.to_vec()).unwrap_or_default(),
        };

        let guess_ac_input_power = dev.guess_ac_input_power.unwrap_or(false);

        devices.push(DeviceConfig {
            mac: mac.clone(),
            name,
            manufacturer,
            model_id,
            extension1,
            extension2,
            exclude: dev.exclude.clone(),
            loglevel: dev.loglevel.clone().unwrap_or_else(|| raw.global.loglevel.clone()),
            state_refresh: Duration::from_secs(state_refresh),
            input_refresh: Duration::from_secs(input_refresh),
            holding_refresh: Duration::from_secs(holding_refresh),
            ac_charging_levels,
            guess_ac_input_power,
        });
    }

    let sydpower = raw.mqtt_sydpower.unwrap_or_else(|| raw.mqtt_client.clone());

    Ok(BridgeConfig {
        name: raw.global.lesyd_name.clone(),
        ha_discovery: raw.global.ha_discovery,
        ha_prefix: raw.global.ha_prefix.clone(),
        loglevel: raw.global.loglevel.clone(),
        logfile: raw.global.logfile.clone(),
        client: raw.mqtt_client,
        sydpower,
        devices,
    })
}

pub fn load_from_path(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&text)
}

/// The first of the original's two sample YAML documents, adapted to this
/// crate's field names (spec §6 supplemental CLI surface).
pub const SAMPLE_CONFIG: &str = r#"global:
    loglevel: INFO   # one of DEBUG, INFO, WARNING, ERROR, CRITICAL

# The client MQTT broker where the bridge publishes state/commands.
mqtt_client:
    hostname: 'mqtt.private' # default is 'localhost'
    port: 1883
    username: 'foobar'
    password: 'mysecret'

# Connection to the broker receiving device messages.
# If omitted, mqtt_client is reused for both roles.
#mqtt_sydpower:
#    hostname: 'mqtt.myhomenetwork'
#    port: 1883

devices:
  'abcdefabcdef':
     name: 'my_f2400'
     preset: 'F2400-B'
     exclude: [dc_output]
     loglevel: DEBUG
  'abcdef123456':
     name: 'my_f3600'
     preset: 'F3600Pro'
"#;

pub fn list_presets_text() -> String {
    let mut out = String::new();
    for (name, preset) in presets() {
        out.push_str(&format!(
            "{name}: manufacturer={} model_id={} ac_charging_levels={:?} extension1={} extension2={}\n",
            preset.manufacturer, preset.model_id, preset.ac_charging_levels, preset.extension1, preset.extension2
        ));
    }
    out
}

pub fn default_logconfig_text() -> String {
    "Default logging: timestamped messages to stderr at the configured \
     --loglevel (default WARNING); pass --logfile to additionally append \
     to a file at DEBUG."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
mqtt_client:
  hostname: localhost
devices:
  abcdefabcdef:
    name: my_device
"#;

    #[test]
    fn parses_minimal_config() {
        let cfg = parse(MINIMAL).unwrap();
        assert_eq!(cfg.devices.len(), 1);
        assert_eq!(cfg.devices[0].name, "my_device");
        assert_eq!(cfg.devices[0].state_refresh, Duration::from_secs(30));
    }

    #[test]
    fn rejects_reserved_device_name() {
        let text = MINIMAL.replace("my_device", "bridge");
        let err = parse(&text).unwrap_err();
        assert!(matches!(err, ConfigError::ReservedName(_)));
    }

    #[test]
    fn rejects_duplicate_names() {
        let text = r#"
mqtt_client:
  hostname: localhost
devices:
  abcdefabcdef:
    name: dup
  abcdef123456:
    name: dup
"#;
        let err = parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName(_)));
    }

    #[test]
    fn rejects_invalid_mac() {
        let text = r#"
mqtt_client:
  hostname: localhost
devices:
  not-a-mac:
    name: d
"#;
        let err = parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMac(_)));
    }

    #[test]
    fn applies_preset_defaults() {
        let text = r#"
mqtt_client:
  hostname: localhost
devices:
  abcdefabcdef:
    preset: F2400-B
"#;
        let cfg = parse(text).unwrap();
        let dev = &cfg.devices[0];
        assert_eq!(dev.manufacturer, "Fossibot");
        assert_eq!(dev.model_id, "F2400");
        assert_eq!(dev.ac_charging_levels, vec![300, 500, 700, 900, 1100]);
    }

    #[test]
    fn rejects_unknown_preset() {
        let text = r#"
mqtt_client:
  hostname: localhost
devices:
  abcdefabcdef:
    preset: NoSuchPreset
"#;
        let err = parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPreset(_, _)));
    }

    #[test]
    fn rejects_out_of_range_refresh() {
        let text = r#"
mqtt_client:
  hostname: localhost
devices:
  abcdefabcdef:
    name: d
    input_refresh: 1
"#;
        let err = parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn sydpower_defaults_to_client_endpoint() {
        let cfg = parse(MINIMAL).unwrap();
        assert_eq!(cfg.sydpower.hostname, cfg.client.hostname);
    }

    #[test]
    fn sample_config_parses() {
        parse(SAMPLE_CONFIG).unwrap();
    }
}
