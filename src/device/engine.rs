// src/device/engine.rs
//
// The per-device protocol engine: request scheduler (spec §4.2), decode and
// writeback (§4.3), and the publication policy (§4.4). `on_tick` is a pure
// function of `&mut self` and the current instant — it never touches an
// MQTT client directly, only returns the effects the bridge event loop
// (§4.5) should carry out. This mirrors the teacher's separation between
// I/O tasks and the logic they drive, but pushed one level further so the
// whole scheduler is unit-testable without any transport.
//
// Grounded on `original_source/lesyd.py`'s `Device.on_tic` (~lines
// 622-695) and `process_sydpower_response`/`process_command`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::CommandParseError;
use crate::modbus::codec::{self, ModbusResponse};
use crate::modbus::registers::COUNT_IREG;

use super::command::parse_command;
use super::decode::{apply_write_echo, decode_holding_bank, decode_input_bank, WriteEcho};
use super::state::{DeviceState, FieldMask};

pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(300);
pub const QUEUE_RELIEF_DEPTH: usize = 10;
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(20);
pub const STATUS_REPUBLISH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
        }
    }
}

/// Effects a tick or message handler wants carried out. The bridge event
/// loop executes these against the live MQTT transports.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEffect {
    /// Publish a MODBUS request frame on `<MAC>/client/request/data`.
    PublishRequest(Vec<u8>),
    /// Publish the device status on `<bridge>/<device>/status`, retained.
    PublishStatus { payload: &'static str, retain: bool },
    /// Publish the device state JSON on `<bridge>/<device>/state`.
    PublishState(String),
}

#[derive(Debug, Clone)]
pub struct DeviceEngineConfig {
    pub input_refresh: Duration,
    pub holding_refresh: Duration,
    pub state_refresh: Duration,
    pub ac_charging_levels: Vec<u32>,
    pub guess_ac_input_power: bool,
    pub field_mask: FieldMask,
}

pub struct DeviceEngine {
    config: DeviceEngineConfig,

    status: DeviceStatus,
    status_confirmed: bool,
    status_time: Option<Instant>,

    last_device_time: Option<Instant>,

    current_request: Option<Vec<u8>>,
    current_request_time: Option<Instant>,
    request_queue: VecDeque<Vec<u8>>,

    input_response_time: Option<Instant>,
    holding_response_time: Option<Instant>,

    state: DeviceState,
    state_last: Option<DeviceState>,
    state_last_time: Option<Instant>,
}

fn margin_ms(now: Instant, last: Option<Instant>, refresh: Duration) -> i64 {
    let elapsed_ms: i64 = match last {
        Some(t) => now.saturating_duration_since(t).as_millis() as i64,
        None => i64::MAX / 2,
    };
    elapsed_ms - refresh.as_millis() as i64
}

impl DeviceEngine {
    pub fn new(config: DeviceEngineConfig) -> Self {
        DeviceEngine {
            config,
            status: DeviceStatus::Offline,
            status_confirmed: false,
            status_time: None,
            last_device_time: None,
            current_request: None,
            current_request_time: None,
            request_queue: VecDeque::new(),
            input_response_time: None,
            holding_response_time: None,
            state: DeviceState::default(),
            state_last: None,
            state_last_time: None,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn queue_len(&self) -> usize {
        self.request_queue.len()
    }

    pub fn current_request_pending(&self) -> bool {
        self.current_request.is_some()
    }

    fn set_status(&mut self, value: DeviceStatus) {
        if value != self.status {
            self.status = value;
            self.status_confirmed = false;
            self.status_time = None;
        }
    }

    /// Queue a write command for field `field` decoded from `payload`.
    /// Parse/range failures are reported, not silently discarded, so the
    /// caller can log them at debug — no MQTT echo is ever sent either way.
    pub fn enqueue_command(&mut self, field: &str, payload: &[u8]) -> Result<(), CommandParseError> {
        let frame = parse_command(field, payload)?;
        self.request_queue.push_back(frame);
        Ok(())
    }

    /// A one-byte liveness signal on the sydpower state topic (spec §4.4).
    pub fn on_liveness_byte(&mut self, now: Instant, payload: &[u8]) {
        self.last_device_time = Some(now);
        if payload.len() == 1 {
            match payload[0] {
                0x30 => self.set_status(DeviceStatus::Offline),
                0x31 => {} // reconnect: no immediate status change
                _ => self.set_status(DeviceStatus::Online),
            }
        } else {
            self.set_status(DeviceStatus::Online);
        }
    }

    /// A MODBUS response frame on either response topic (spec §4.2/§4.3).
    /// Malformed/bad-CRC/wrong-channel/unknown-function frames are
    /// discarded; the caller may want to log the `ModbusError`.
    pub fn on_response(&mut self, now: Instant, raw: &[u8]) -> Result<(), codec::ModbusError> {
        self.set_status(DeviceStatus::Online);
        self.last_device_time = Some(now);

        match codec::parse_response(raw)? {
            ModbusResponse::ReadBank { function, values } => {
                if function == codec::FUNC_READ_HOLDING_REGISTERS {
                    self.holding_response_time = Some(now);
                    decode_holding_bank(&values, &mut self.state, &self.config.ac_charging_levels);
                } else {
                    debug_assert_eq!(values.len(), COUNT_IREG);
                    self.input_response_time = Some(now);
                    decode_input_bank(
                        &values,
                        &mut self.state,
                        &self.config.ac_charging_levels,
                        self.config.guess_ac_input_power,
                    );
                }
            }
            ModbusResponse::WriteEcho { index, value } => {
                match apply_write_echo(index, value, &mut self.state, &self.config.ac_charging_levels)
                {
                    WriteEcho::Applied | WriteEcho::UnknownRegister => {}
                    WriteEcho::Invalid => {
                        // Force an immediate holding re-read (spec §4.3).
                        self.holding_response_time = None;
                    }
                }
            }
            ModbusResponse::Exception { .. } => {}
        }
        Ok(())
    }

    /// The echoed payload arriving back on `<bridge>/<device>/status`
    /// (proof of delivery for the retained status publish).
    pub fn on_status_echo(&mut self, payload: &str) {
        if payload == self.status.as_str() {
            self.status_confirmed = true;
        }
    }

    /// Advance the scheduler and publication policy by one tick.
    ///
    /// `client_connected`/`sydpower_connected` mirror the two transports'
    /// connection state (the bridge owns the transports; the engine only
    /// needs to know whether it may emit effects on each).
    pub fn on_tick(
        &mut self,
        now: Instant,
        client_connected: bool,
        sydpower_connected: bool,
    ) -> Vec<EngineEffect> {
        let mut effects = Vec::new();

        if let Some(last) = self.last_device_time {
            if now.saturating_duration_since(last) >= LIVENESS_TIMEOUT {
                self.set_status(DeviceStatus::Offline);
            }
        } else {
            self.set_status(DeviceStatus::Offline);
        }

        if client_connected {
            if !self.status_confirmed {
                let due = match self.status_time {
                    Some(t) => now.saturating_duration_since(t) >= STATUS_REPUBLISH_INTERVAL,
                    None => true,
                };
                if due {
                    effects.push(EngineEffect::PublishStatus {
                        payload: self.status.as_str(),
                        retain: true,
                    });
                    self.status_time = Some(now);
                }
            }

            let do_publish = match &self.state_last {
                None => self.state.is_fully_populated(&self.config.field_mask),
                Some(last) => {
                    if !self.state.equals_on_mask(last, &self.config.field_mask) {
                        true
                    } else {
                        match self.state_last_time {
                            Some(t) => now.saturating_duration_since(t) >= self.config.state_refresh,
                            None => true,
                        }
                    }
                }
            };

            if do_publish {
                let json = self.state.to_json(&self.config.field_mask);
                let text = serde_json::to_string(&json).expect("state JSON serializes");
                effects.push(EngineEffect::PublishState(text));
                self.state_last = Some(self.state.clone());
                self.state_last_time = Some(now);
            }
        }

        if sydpower_connected {
            if let Some(started) = self.current_request_time {
                if now.saturating_duration_since(started) > REQUEST_TIMEOUT {
                    self.current_request = None;
                    self.current_request_time = None;
                } else if self.request_queue.len() > QUEUE_RELIEF_DEPTH {
                    self.current_request = None;
                    self.current_request_time = None;
                }
            }

            if self.current_request.is_none() {
                let input_margin = margin_ms(now, self.input_response_time, self.config.input_refresh);
                let holding_margin =
                    margin_ms(now, self.holding_response_time, self.config.holding_refresh);

                let frame = if input_margin >= holding_margin.max(0) {
                    self.input_response_time = Some(now);
                    Some(codec::encode_read_input_registers(0, COUNT_IREG as u16))
                } else if holding_margin >= input_margin.max(0) {
                    self.holding_response_time = Some(now);
                    Some(codec::encode_read_holding_registers(0, COUNT_IREG as u16))
                } else {
                    self.request_queue.pop_front()
                };

                if let Some(frame) = frame {
                    self.current_request = Some(frame.clone());
                    self.current_request_time = Some(now);
                    effects.push(EngineEffect::PublishRequest(frame));
                }
            }
        }

        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DeviceEngineConfig {
        DeviceEngineConfig {
            input_refresh: Duration::from_secs(6),
            holding_refresh: Duration::from_secs(30),
            state_refresh: Duration::from_secs(30),
            ac_charging_levels: vec![],
            guess_ac_input_power: false,
            field_mask: FieldMask::new(&[], false, false),
        }
    }

    #[test]
    fn one_in_flight_invariant_holds_across_ticks() {
        let mut engine = DeviceEngine::new(config());
        let t0 = Instant::now();
        let effects = engine.on_tick(t0, true, true);
        assert!(matches!(effects.last(), Some(EngineEffect::PublishRequest(_))));
        assert!(engine.current_request_pending());

        // A second tick immediately after must not dispatch another request.
        let effects = engine.on_tick(t0 + Duration::from_millis(1), true, true);
        assert!(!effects
            .iter()
            .any(|e| matches!(e, EngineEffect::PublishRequest(_))));
    }

    #[test]
    fn overdue_selection_prefers_input_on_tie() {
        let mut engine = DeviceEngine::new(config());
        let t0 = Instant::now();
        let effects = engine.on_tick(t0, true, true);
        match effects.last().unwrap() {
            EngineEffect::PublishRequest(frame) => {
                assert_eq!(frame[1], codec::FUNC_READ_INPUT_REGISTERS);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn holding_selected_once_input_is_fresh() {
        let mut engine = DeviceEngine::new(config());
        let t0 = Instant::now();
        engine.on_tick(t0, true, true); // dispatches input read
        engine
            .on_response(
                t0 + Duration::from_millis(10),
                &codec_response_for(codec::FUNC_READ_INPUT_REGISTERS),
            )
            .unwrap();
        // current_request cleared by the response arriving? No: response
        // doesn't clear current_request in this engine; simulate timeout
        // elapsing so a new selection can run.
        let t1 = t0 + REQUEST_TIMEOUT + Duration::from_millis(1);
        let effects = engine.on_tick(t1, true, true);
        match effects.last().unwrap() {
            EngineEffect::PublishRequest(frame) => {
                assert_eq!(frame[1], codec::FUNC_READ_HOLDING_REGISTERS);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn queued_write_runs_only_when_neither_bank_overdue() {
        let mut engine = DeviceEngine::new(config());
        let t0 = Instant::now();
        // Mark both banks freshly satisfied.
        engine.input_response_time = Some(t0);
        engine.holding_response_time = Some(t0);
        engine.enqueue_command("ac_output", b"on").unwrap();
        let effects = engine.on_tick(t0 + Duration::from_millis(1), true, true);
        match effects.last().unwrap() {
            EngineEffect::PublishRequest(frame) => {
                assert_eq!(frame[1], codec::FUNC_WRITE_HOLDING_REGISTER);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn timeout_abandons_stale_request() {
        let mut engine = DeviceEngine::new(config());
        let t0 = Instant::now();
        engine.on_tick(t0, true, true);
        assert!(engine.current_request_pending());
        let t1 = t0 + REQUEST_TIMEOUT + Duration::from_millis(1);
        engine.on_tick(t1, true, false);
        // sydpower disconnected: no new dispatch, but timeout check happens
        // only when sydpower_connected; re-run connected to confirm reset.
        let effects = engine.on_tick(t1, true, true);
        assert!(matches!(effects.last(), Some(EngineEffect::PublishRequest(_))));
    }

    #[test]
    fn queue_relief_abandons_in_flight_request() {
        let mut engine = DeviceEngine::new(config());
        let t0 = Instant::now();
        engine.input_response_time = Some(t0);
        engine.holding_response_time = Some(t0);
        engine.current_request = Some(vec![0x11, 0x04]);
        engine.current_request_time = Some(t0);
        for _ in 0..12 {
            engine.enqueue_command("key_sound", b"on").unwrap();
        }
        assert!(engine.queue_len() > QUEUE_RELIEF_DEPTH);
        let effects = engine.on_tick(t0 + Duration::from_millis(1), true, true);
        assert!(matches!(effects.last(), Some(EngineEffect::PublishRequest(_))));
    }

    #[test]
    fn status_confirmation_requires_matching_echo() {
        let mut engine = DeviceEngine::new(config());
        engine.status = DeviceStatus::Online;
        engine.status_confirmed = false;
        engine.on_status_echo("offline");
        assert!(!engine.status_confirmed);
        engine.on_status_echo("online");
        assert!(engine.status_confirmed);
    }

    #[test]
    fn state_publication_coalesces_within_refresh_window() {
        let mut engine = DeviceEngine::new(config());
        let t0 = Instant::now();
        let mut input = vec![0u16; COUNT_IREG];
        input[crate::modbus::registers::IREG_STATE_OF_CHARGE] = 500;
        decode_input_bank(&input, &mut engine.state, &[], false);
        let holding = vec![0u16; crate::modbus::registers::COUNT_HREG];
        decode_holding_bank(&holding, &mut engine.state, &[]);
        let effects = engine.on_tick(t0, true, false);
        assert!(effects
            .iter()
            .any(|e| matches!(e, EngineEffect::PublishState(_))));
        let effects = engine.on_tick(t0 + Duration::from_millis(1), true, false);
        assert!(!effects
            .iter()
            .any(|e| matches!(e, EngineEffect::PublishState(_))));
    }

    #[test]
    fn invalid_write_echo_forces_holding_reread() {
        let mut engine = DeviceEngine::new(config());
        let t0 = Instant::now();
        engine.holding_response_time = Some(t0);
        let frame = codec::encode_write_holding_register(
            crate::modbus::registers::HREG_DISCHARGE_LOWER_LIMIT as u16,
            700,
        );
        engine.on_response(t0 + Duration::from_millis(1), &frame).unwrap();
        assert_eq!(engine.holding_response_time, None);
    }

    fn codec_response_for(function: u8) -> Vec<u8> {
        let mut resp = vec![codec::MODBUS_CHANNEL, function];
        let append_word = |buf: &mut Vec<u8>, v: u16| {
            buf.push((v >> 8) as u8);
            buf.push((v & 0xFF) as u8);
        };
        append_word(&mut resp, 0);
        append_word(&mut resp, COUNT_IREG as u16);
        for _ in 0..COUNT_IREG {
            append_word(&mut resp, 0);
        }
        let crc = crate::checksums::crc16_modbus_checksum(&resp);
        resp.push((crc >> 8) as u8);
        resp.push((crc & 0xFF) as u8);
        resp
    }
}
