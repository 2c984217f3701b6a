// src/bridge/mod.rs
//
// The outer event loop that multiplexes two MQTT transports, subscription
// routing, will/birth semantics, and periodic ticks (spec §4.5/§5/§6).
// Grounded on the teacher's `io/mqtt/reader.rs` forwarding pattern and
// `original_source/lesyd.py`'s `main()`/`on_connect`/`on_message` handlers
// (~lines 990-1058), generalized into a single `tokio::sync::mpsc` queue so
// the device engines stay the sole mutators of device state (spec §5 O1).

pub mod discovery;
pub mod events;
pub mod transport;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rumqttc::{AsyncClient, QoS};
use tokio::sync::mpsc;

use crate::config::{BridgeConfig, DeviceConfig};
use crate::device::{DeviceEngine, DeviceEngineConfig, EngineEffect, FieldMask};
use crate::error::TransportError;

pub use events::ShutdownReason;
use events::{BridgeEvent, TransportKind};

const TICK_INTERVAL: Duration = Duration::from_millis(200);
const SHUTDOWN_DRAIN: Duration = Duration::from_millis(200);
const EVENT_QUEUE_CAPACITY: usize = 256;

/// Which sydpower topic a device's incoming message landed on.
#[derive(Debug, Clone, Copy)]
enum SydRoute {
    Response,
    Response04,
    State,
}

struct DeviceTopics {
    request: String,
    response: String,
    response_04: String,
    response_state: String,
    status: String,
    state: String,
    command_prefix: String,
}

impl DeviceTopics {
    fn new(bridge_name: &str, device: &DeviceConfig) -> Self {
        let mac_upper = device.mac.to_ascii_uppercase();
        let state = format!("{bridge_name}/{}/state", device.name);
        DeviceTopics {
            request: format!("{mac_upper}/client/request/data"),
            response: format!("{mac_upper}/device/response/client/data"),
            response_04: format!("{mac_upper}/device/response/client/04"),
            response_state: format!("{mac_upper}/device/response/state"),
            status: format!("{bridge_name}/{}/status", device.name),
            command_prefix: format!("{state}/set/"),
            state,
        }
    }
}

struct DeviceRuntime {
    config: DeviceConfig,
    mask: FieldMask,
    engine: DeviceEngine,
    topics: DeviceTopics,
}

/// Owns both transports, every device's engine, and the routing tables that
/// dispatch incoming MQTT messages to the right one. Construction is
/// infallible; `run` is where the process actually connects.
pub struct Bridge {
    name: String,
    ha_discovery: bool,
    ha_prefix: String,
    client_endpoint: crate::config::MqttEndpointConfig,
    sydpower_endpoint: crate::config::MqttEndpointConfig,
    will_topic: String,
    devices: Vec<DeviceRuntime>,
    syd_routes: HashMap<String, (usize, SydRoute)>,
    status_routes: HashMap<String, usize>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let will_topic = format!("{}/bridge/status", config.name);
        let mut devices = Vec::with_capacity(config.devices.len());
        let mut syd_routes = HashMap::new();
        let mut status_routes = HashMap::new();

        for (idx, device) in config.devices.into_iter().enumerate() {
            let mask = FieldMask::new(
                &device.exclude,
                device.guess_ac_input_power,
                !device.ac_charging_levels.is_empty(),
            );
            let engine = DeviceEngine::new(DeviceEngineConfig {
                input_refresh: device.input_refresh,
                holding_refresh: device.holding_refresh,
                state_refresh: device.state_refresh,
                ac_charging_levels: device.ac_charging_levels.clone(),
                guess_ac_input_power: device.guess_ac_input_power,
                field_mask: mask.clone(),
            });
            let topics = DeviceTopics::new(&config.name, &device);

            syd_routes.insert(topics.response.clone(), (idx, SydRoute::Response));
            syd_routes.insert(topics.response_04.clone(), (idx, SydRoute::Response04));
            syd_routes.insert(topics.response_state.clone(), (idx, SydRoute::State));
            status_routes.insert(topics.status.clone(), idx);

            devices.push(DeviceRuntime {
                config: device,
                mask,
                engine,
                topics,
            });
        }

        Bridge {
            name: config.name,
            ha_discovery: config.ha_discovery,
            ha_prefix: config.ha_prefix,
            client_endpoint: config.client,
            sydpower_endpoint: config.sydpower,
            will_topic,
            devices,
            syd_routes,
            status_routes,
        }
    }

    /// Connect both transports and run the event loop until SIGINT.
    ///
    /// Returns the reason the loop stopped so `main` can pick the right
    /// exit code (spec §6: 0 on clean shutdown, 1 on SIGINT).
    pub async fn run(mut self) -> Result<ShutdownReason, TransportError> {
        let (tx, mut rx) = mpsc::channel::<BridgeEvent>(EVENT_QUEUE_CAPACITY);

        let client_id = format!("lesyd-{}-client", self.name);
        let (client, client_eventloop) = transport::connect_with_will(
            &client_id,
            &self.client_endpoint,
            &self.will_topic,
            "offline",
        );

        let syd_client_id = format!("lesyd-{}-{}", self.name, uuid::Uuid::new_v4());
        let (sydpower, sydpower_eventloop) = transport::connect(&syd_client_id, &self.sydpower_endpoint);

        let client_task = transport::spawn_forwarder(client_eventloop, TransportKind::Client, tx.clone());
        let sydpower_task =
            transport::spawn_forwarder(sydpower_eventloop, TransportKind::Sydpower, tx.clone());

        let ticker_tx = tx.clone();
        let ticker_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                if ticker_tx.send(BridgeEvent::Tick).await.is_err() {
                    break;
                }
            }
        });

        let shutdown_tx = tx.clone();
        let shutdown_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(BridgeEvent::Shutdown).await;
            }
        });

        let mut client_connected = false;
        let mut sydpower_connected = false;
        let mut reason = ShutdownReason::QueueClosed;

        while let Some(event) = rx.recv().await {
            match event {
                BridgeEvent::Shutdown => {
                    tlog!("[bridge] shutdown requested");
                    reason = ShutdownReason::Signal;
                    break;
                }
                BridgeEvent::Connected(TransportKind::Sydpower) => {
                    tlog!("[bridge] sydpower transport connected");
                    sydpower_connected = true;
                    for dev in &self.devices {
                        for topic in [&dev.topics.response, &dev.topics.response_04, &dev.topics.response_state]
                        {
                            if let Err(e) = transport::subscribe(&sydpower, topic).await {
                                tlog!("[bridge] subscribe to {topic} failed: {e}");
                            }
                        }
                    }
                }
                BridgeEvent::Connected(TransportKind::Client) => {
                    tlog!("[bridge] client transport connected");
                    client_connected = true;
                    if let Err(e) = client.publish(&self.will_topic, QoS::AtMostOnce, true, "online").await {
                        tlog!("[bridge] failed to publish bridge status: {e}");
                    }
                    for dev in &self.devices {
                        if let Err(e) = transport::subscribe(&client, &dev.topics.status).await {
                            tlog!("[bridge] subscribe to {} failed: {e}", dev.topics.status);
                        }
                        let command_wildcard = format!("{}+", dev.topics.command_prefix);
                        if let Err(e) = transport::subscribe(&client, &command_wildcard).await {
                            tlog!("[bridge] subscribe to {command_wildcard} failed: {e}");
                        }
                    }
                    if self.ha_discovery {
                        for dev in &self.devices {
                            let doc = discovery::build_discovery(&self.name, &self.will_topic, &dev.config, &dev.mask);
                            let topic = discovery::discovery_topic(&self.ha_prefix, &dev.config.mac);
                            let payload = serde_json::to_vec(&doc).expect("discovery doc serializes");
                            if let Err(e) = client.publish(&topic, QoS::AtMostOnce, true, payload).await {
                                tlog!("[bridge] failed to publish discovery doc for {}: {e}", dev.config.name);
                            }
                        }
                    }
                }
                BridgeEvent::Disconnected(TransportKind::Sydpower) => {
                    tlog!("[bridge] sydpower transport disconnected");
                    sydpower_connected = false;
                }
                BridgeEvent::Disconnected(TransportKind::Client) => {
                    tlog!("[bridge] client transport disconnected");
                    client_connected = false;
                }
                BridgeEvent::ConnectFail(kind, message) => {
                    tlog!(warning, "[bridge] transport {kind:?} error: {message}");
                }
                BridgeEvent::SubAck(_) => {}
                BridgeEvent::Message { transport, topic, payload } => {
                    self.dispatch_message(transport, &topic, &payload, Instant::now());
                }
                BridgeEvent::Tick => {
                    let now = Instant::now();
                    for dev in self.devices.iter_mut() {
                        let effects = dev.engine.on_tick(now, client_connected, sydpower_connected);
                        for effect in effects {
                            execute_effect(&client, &sydpower, &dev.topics, effect).await;
                        }
                    }
                }
            }
        }

        if let Err(e) = client.publish(&self.will_topic, QoS::AtMostOnce, true, "offline").await {
            tlog!("[bridge] failed to publish offline status on shutdown: {e}");
        }
        tokio::time::sleep(SHUTDOWN_DRAIN).await;

        let _ = client.disconnect().await;
        let _ = sydpower.disconnect().await;
        client_task.abort();
        sydpower_task.abort();
        ticker_task.abort();
        shutdown_task.abort();

        Ok(reason)
    }

    fn dispatch_message(&mut self, transport: TransportKind, topic: &str, payload: &[u8], now: Instant) {
        match transport {
            TransportKind::Sydpower => {
                if let Some(&(idx, route)) = self.syd_routes.get(topic) {
                    let dev = &mut self.devices[idx];
                    match route {
                        SydRoute::Response | SydRoute::Response04 => {
                            if let Err(e) = dev.engine.on_response(now, payload) {
                                tlog!(debug, "[{}] discarding malformed response: {e}", dev.config.name);
                            }
                        }
                        SydRoute::State => dev.engine.on_liveness_byte(now, payload),
                    }
                }
            }
            TransportKind::Client => {
                if let Some(&idx) = self.status_routes.get(topic) {
                    let dev = &mut self.devices[idx];
                    dev.engine.on_status_echo(&String::from_utf8_lossy(payload));
                    return;
                }
                for dev in self.devices.iter_mut() {
                    if let Some(field) = topic.strip_prefix(dev.topics.command_prefix.as_str()) {
                        if let Err(e) = dev.engine.enqueue_command(field, payload) {
                            tlog!(debug, "[{}] dropping command on '{field}': {e}", dev.config.name);
                        }
                        return;
                    }
                }
            }
        }
    }
}

async fn execute_effect(
    client: &AsyncClient,
    sydpower: &AsyncClient,
    topics: &DeviceTopics,
    effect: EngineEffect,
) {
    match effect {
        EngineEffect::PublishRequest(frame) => {
            if let Err(e) = sydpower.publish(&topics.request, QoS::AtMostOnce, false, frame).await {
                tlog!("[bridge] publish to {} failed: {e}", topics.request);
            }
        }
        EngineEffect::PublishStatus { payload, retain } => {
            if let Err(e) = client.publish(&topics.status, QoS::AtMostOnce, retain, payload).await {
                tlog!("[bridge] publish to {} failed: {e}", topics.status);
            }
        }
        EngineEffect::PublishState(json) => {
            if let Err(e) = client.publish(&topics.state, QoS::AtMostOnce, false, json).await {
                tlog!("[bridge] publish to {} failed: {e}", topics.state);
            }
        }
    }
}
