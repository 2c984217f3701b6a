// src/error.rs
//
// Crate-wide error taxonomy. Only ConfigError is fatal to the process;
// everything else is logged and handled locally by the bridge or a device
// engine (see spec §7).

use thiserror::Error;

use crate::modbus::codec::ModbusError;

/// Configuration-time and startup errors. Fatal: the bridge exits with
/// status 1 without establishing any MQTT connection.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("device name '{0}' is reserved")]
    ReservedName(String),
    #[error("device name '{0}' is used by more than one device")]
    DuplicateName(String),
    #[error("device name '{0}' does not match [0-9A-Za-z_]+")]
    InvalidName(String),
    #[error("device MAC '{0}' is not 12 lowercase hex characters")]
    InvalidMac(String),
    #[error("unknown preset '{0}' referenced by device '{1}'")]
    UnknownPreset(String, String),
    #[error("{field} on device '{device}' must be in {min}..{max}, got {value}")]
    OutOfRange {
        device: String,
        field: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },
    #[error("ac_charging_levels on device '{0}' must be a non-empty list of positive integers")]
    EmptyChargingLevels(String),
    #[error("at least one device must be configured")]
    NoDevices,
}

/// MQTT transport-level failures. Logged; the underlying client handles
/// reconnection, and device state is retained in memory.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: rumqttc::ConnectionError,
    },
    #[error("publish to '{topic}' failed: {source}")]
    Publish {
        topic: String,
        #[source]
        source: rumqttc::ClientError,
    },
    #[error("subscribe to '{topic}' failed: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: rumqttc::ClientError,
    },
}

/// A command payload on `.../state/set/<field>` that could not be parsed or
/// was out of range. Dropped silently per spec §7 (no MQTT echo); logged at
/// debug level only.
#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("payload '{payload}' is not a valid {expected}")]
    BadPayload { payload: String, expected: &'static str },
    #[error("value {value} is out of range {min}..{max}")]
    OutOfRange { value: f64, min: f64, max: f64 },
}

/// Top-level error wrapper so call sites that can fail for more than one
/// reason (e.g. startup) can propagate a single type with `?`.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ModbusError),
}
