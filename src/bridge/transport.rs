// src/bridge/transport.rs
//
// Wraps one `rumqttc` connection: builds `MqttOptions` from a
// `MqttEndpointConfig` and spawns the task that forwards `rumqttc::Event`s
// into the bridge's event queue as `BridgeEvent`s — mirroring the teacher's
// `io/mqtt/reader.rs` poll-with-timeout loop, generalized to drive a shared
// channel instead of emitting to a Tauri frontend.
//
// TLS is accepted in configuration (spec §6) but not wired here: TLS setup
// is explicitly out of scope (spec §1) and is left as a follow-up on the
// `rumqttc::MqttOptions::set_transport` call site below.

use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::config::MqttEndpointConfig;

use super::events::{BridgeEvent, TransportKind};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const POLL_TIMEOUT: Duration = Duration::from_millis(250);
const EVENTLOOP_CAPACITY: usize = 100;

pub fn build_options(client_id: &str, endpoint: &MqttEndpointConfig) -> MqttOptions {
    let mut opts = MqttOptions::new(client_id, endpoint.hostname.clone(), endpoint.effective_port());
    opts.set_keep_alive(KEEP_ALIVE);
    if let (Some(username), Some(password)) = (&endpoint.username, &endpoint.password) {
        opts.set_credentials(username.clone(), password.clone());
    }
    opts
}

pub fn connect(client_id: &str, endpoint: &MqttEndpointConfig) -> (AsyncClient, rumqttc::EventLoop) {
    let opts = build_options(client_id, endpoint);
    AsyncClient::new(opts, EVENTLOOP_CAPACITY)
}

/// Connect with a last-will message — used for the client-broker transport
/// so the broker publishes `offline` on our behalf if the connection drops
/// uncleanly (spec §4.5/§9).
pub fn connect_with_will(
    client_id: &str,
    endpoint: &MqttEndpointConfig,
    will_topic: &str,
    will_payload: &str,
) -> (AsyncClient, rumqttc::EventLoop) {
    let mut opts = build_options(client_id, endpoint);
    opts.set_last_will(LastWill::new(will_topic, will_payload, QoS::AtMostOnce, true));
    AsyncClient::new(opts, EVENTLOOP_CAPACITY)
}

/// Spawn the forwarding task for one transport's event loop. Never touches
/// device state directly — only marshals events into `tx` (spec §5: MQTT
/// callbacks/poll results must do nothing beyond enqueueing).
pub fn spawn_forwarder(
    mut eventloop: rumqttc::EventLoop,
    kind: TransportKind,
    tx: mpsc::Sender<BridgeEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match tokio::time::timeout(POLL_TIMEOUT, eventloop.poll()).await {
                Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                    if tx.send(BridgeEvent::Connected(kind)).await.is_err() {
                        break;
                    }
                }
                Ok(Ok(Event::Incoming(Packet::SubAck(_)))) => {
                    if tx.send(BridgeEvent::SubAck(kind)).await.is_err() {
                        break;
                    }
                }
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    let event = BridgeEvent::Message {
                        transport: kind,
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    };
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                    if tx.send(BridgeEvent::Disconnected(kind)).await.is_err() {
                        break;
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    if tx
                        .send(BridgeEvent::ConnectFail(kind, err.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(_) => {} // poll timeout: loop back around to re-check for shutdown
            }
        }
    })
}

pub async fn subscribe(client: &AsyncClient, topic: &str) -> Result<(), rumqttc::ClientError> {
    client.subscribe(topic, QoS::AtLeastOnce).await
}
