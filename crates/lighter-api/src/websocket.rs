//! Notification websocket with auto-reconnect.
//!
//! Connects to the gateway's push channel and streams parsed
//! [`GatewayEvent`]s through a [`tokio::sync::broadcast`] channel.
//! Handles reconnection with exponential backoff + jitter automatically.
//!
//! # Example
//!
//! ```rust,ignore
//! use lighter_api::websocket::{NotificationHandle, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let ws_url = Url::parse("ws://192.168.1.20:443/")?;
//!
//! let handle = NotificationHandle::connect(ws_url, ReconnectConfig::default(), cancel.clone()).await?;
//! let mut rx = handle.subscribe();
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{} {}/{:?}", event.event, event.resource, event.id);
//! }
//!
//! handle.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ── GatewayEvent ─────────────────────────────────────────────────────

/// A parsed message from the gateway notification stream.
///
/// Shape: `{"t": "event", "e": "changed", "r": "lights", "id": "3", "state": {...}}`.
/// Uses `#[serde(flatten)]` to capture all fields beyond the core set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    /// Message type, `"event"` for everything the gateway pushes today.
    #[serde(rename = "t", default)]
    pub message_type: Option<String>,

    /// Event kind: `"changed"`, `"added"`, `"deleted"`, `"scene-called"`.
    #[serde(rename = "e")]
    pub event: String,

    /// Resource collection: `"lights"`, `"groups"`, `"sensors"`, `"scenes"`.
    #[serde(rename = "r")]
    pub resource: String,

    /// Resource identifier (string-encoded integer).
    #[serde(default)]
    pub id: Option<String>,

    /// New state, present when the hardware reported a state change.
    #[serde(default)]
    pub state: Option<Value>,

    /// Attribute changes (name, last seen, ...), not state.
    #[serde(default)]
    pub attr: Option<Value>,

    /// All remaining fields the gateway sends.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GatewayEvent {
    /// `true` for `"changed"` events that carry a new device state.
    ///
    /// Attribute-only changes (renames, last-seen bumps) do not count: they
    /// say nothing about whether a write reached the hardware.
    pub fn is_state_change(&self) -> bool {
        self.event == "changed" && self.state.is_some() && self.id.is_some()
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for websocket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── NotificationHandle ───────────────────────────────────────────────

/// Handle to a running notification stream.
///
/// Call [`shutdown`](Self::shutdown) (or cancel the token passed to
/// [`connect`](Self::connect)) to tear down the background task.
pub struct NotificationHandle {
    event_tx: broadcast::Sender<Arc<GatewayEvent>>,
    connected: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl NotificationHandle {
    /// Connect to the gateway websocket and spawn the reconnection loop.
    ///
    /// Returns immediately once the background task is spawned. The first
    /// connection attempt happens asynchronously; use
    /// [`wait_connected`](Self::wait_connected) to wait for it.
    pub async fn connect(
        ws_url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Result<Self, Error> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (connected_tx, connected) = watch::channel(false);

        let task_tx = event_tx.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            ws_loop(ws_url, task_tx, connected_tx, reconnect, task_cancel).await;
        });

        Ok(Self {
            event_tx,
            connected,
            cancel,
        })
    }

    /// Whether the websocket is currently open.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Wait until the websocket is open.
    ///
    /// Fails once the background loop has exited (cancelled, or out of
    /// reconnection attempts) without the socket being open.
    pub async fn wait_connected(&self) -> Result<(), Error> {
        let mut rx = self.connected.clone();
        rx.wait_for(|open| *open)
            .await
            .map(|_| ())
            .map_err(|_| Error::WebSocketConnect("notification loop stopped".into()))
    }

    /// Get a new receiver for the event stream.
    ///
    /// Multiple consumers can subscribe concurrently. If a consumer falls
    /// behind, it receives [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<GatewayEvent>> {
        self.event_tx.subscribe()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on error, backoff → reconnect.
async fn ws_loop(
    ws_url: Url,
    event_tx: broadcast::Sender<Arc<GatewayEvent>>,
    connected: watch::Sender<bool>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&ws_url, &event_tx, &connected, &cancel) => {
                connected.send_replace(false);
                match result {
                    // Clean disconnect: reset the attempt counter, back off once.
                    Ok(()) => {
                        tracing::info!("websocket disconnected cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "websocket error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "websocket reconnection limit reached, giving up"
                                );
                                break;
                            }
                        }
                    }
                }

                let delay = calculate_backoff(attempt, &reconnect);
                tracing::debug!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                attempt = attempt.saturating_add(1);
            }
        }
    }

    connected.send_replace(false);
    tracing::debug!("websocket loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish a single websocket connection, read messages until it drops.
async fn connect_and_read(
    url: &Url,
    event_tx: &broadcast::Sender<Arc<GatewayEvent>>,
    connected: &watch::Sender<bool>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting to notification websocket");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("notification websocket connected");
    connected.send_replace(true);

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        parse_and_broadcast(&text, event_tx);
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("websocket ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "websocket close frame received"
                            );
                        } else {
                            tracing::info!("websocket close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("websocket stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// Parse a websocket text frame and broadcast the event inside.
fn parse_and_broadcast(text: &str, event_tx: &broadcast::Sender<Arc<GatewayEvent>>) {
    let event: GatewayEvent = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse notification");
            return;
        }
    };

    tracing::trace!(
        event = %event.event,
        resource = %event.resource,
        id = event.id.as_deref().unwrap_or(""),
        "notification received"
    );

    // Ignore send errors -- just means no active subscribers right now
    let _ = event_tx.send(Arc::new(event));
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25%, deterministic in the attempt number.
#[allow(clippy::cast_precision_loss)]
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
    }

    #[test]
    fn deserialize_changed_event() {
        let json = r#"{
            "t": "event",
            "e": "changed",
            "r": "lights",
            "id": "3",
            "uniqueid": "00:11:22:33:44:55:66:77-01",
            "state": { "on": true, "bri": 128, "reachable": true }
        }"#;

        let event: GatewayEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event, "changed");
        assert_eq!(event.resource, "lights");
        assert_eq!(event.id.as_deref(), Some("3"));
        assert_eq!(event.state.as_ref().unwrap()["bri"], 128);
        assert_eq!(event.extra["uniqueid"], "00:11:22:33:44:55:66:77-01");
        assert!(event.is_state_change());
    }

    #[test]
    fn attribute_change_is_not_a_state_change() {
        let event: GatewayEvent = serde_json::from_value(serde_json::json!({
            "t": "event", "e": "changed", "r": "lights", "id": "3",
            "attr": { "lastseen": "2024-01-01T00:00Z" }
        }))
        .unwrap();
        assert!(!event.is_state_change());

        let added: GatewayEvent = serde_json::from_value(serde_json::json!({
            "t": "event", "e": "added", "r": "lights", "id": "9", "state": {}
        }))
        .unwrap();
        assert!(!added.is_state_change());
    }

    #[test]
    fn parse_and_broadcast_event() {
        let (tx, mut rx) = broadcast::channel(16);

        let raw = serde_json::json!({
            "t": "event", "e": "changed", "r": "groups", "id": "1",
            "state": { "all_on": true, "any_on": true }
        });

        parse_and_broadcast(&raw.to_string(), &tx);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.resource, "groups");
        assert_eq!(event.id.as_deref(), Some("1"));
    }

    #[test]
    fn parse_and_broadcast_malformed_json() {
        let (tx, mut rx) = broadcast::channel::<Arc<GatewayEvent>>(16);

        parse_and_broadcast("not json at all", &tx);

        assert!(rx.try_recv().is_err());
    }
}
