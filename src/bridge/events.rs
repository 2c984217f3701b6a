// src/bridge/events.rs
//
// The bridge's single event queue item type (spec §4.5). Every source —
// MQTT callbacks on either transport, the tick timer, and SIGINT — enqueues
// one of these; nothing mutates device state outside the loop that
// dequeues them.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Client,
    Sydpower,
}

/// Why `Bridge::run` stopped. `main` uses this to pick an exit code: spec
/// §6 requires exit 1 on SIGINT, matching `original_source/lesyd.py`'s
/// `except KeyboardInterrupt: sys.exit(1)`, not the 0 a clean return would
/// otherwise suggest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// `BridgeEvent::Shutdown` was received (SIGINT).
    Signal,
    /// The event queue closed with no signal received (all senders
    /// dropped) — not expected in normal operation.
    QueueClosed,
}

#[derive(Debug)]
pub enum BridgeEvent {
    Connected(TransportKind),
    ConnectFail(TransportKind, String),
    Disconnected(TransportKind),
    SubAck(TransportKind),
    Message {
        transport: TransportKind,
        topic: String,
        payload: Vec<u8>,
    },
    Tick,
    Shutdown,
}
