//! Realtime notification channel.
//!
//! The server pushes "data changed" signals over a websocket; this module
//! keeps that subscription alive (reconnect, heartbeat) and fans typed
//! events out to subscribers. It carries no primary data.

pub mod realtime;

pub use realtime::{
    ChannelStatus, ConnectionState, RealtimeChannel, ReconnectPolicy, SubscriptionId,
};

/// Typed change notification delivered to subscribers.
///
/// Tagged so new kinds can appear on the wire without breaking existing
/// consumers: frames with an unrecognized tag are dropped, not fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    /// The server-side file list changed; consumers should re-fetch.
    ListChanged { payload: serde_json::Value },
}

/// What an inbound text frame turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inbound {
    Event(UpdateEvent),
    /// Liveness acknowledgment for our `"ping"` probe.
    Pong,
    /// Non-JSON noise or an event kind this client does not know.
    Ignored,
}

pub(crate) fn classify_frame(text: &str) -> Inbound {
    if text == "pong" {
        return Inbound::Pong;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return Inbound::Ignored;
    };
    match value.get("event").and_then(|e| e.as_str()) {
        Some("csv_list_updated") => Inbound::Event(UpdateEvent::ListChanged { payload: value }),
        Some(other) => {
            tracing::debug!("ignoring unrecognized event kind: {other}");
            Inbound::Ignored
        }
        None => Inbound::Ignored,
    }
}

// ── Tests ───────────────────────────────────────────────────────────
