// src/lib.rs
//
// Module tree for lesyd, a bidirectional MQTT bridge between a sydpower
// broker (MODBUS-over-MQTT) and a Home-Assistant-friendly client broker.
// `logging` is declared first and `#[macro_use]`d so `tlog!` is visible
// unqualified to every module below; it is also `#[macro_export]`-ed so the
// `lesyd` binary crate can reach it as `lesyd_lib::tlog!`.

#[macro_use]
pub mod logging;

pub mod bridge;
pub mod checksums;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod modbus;
