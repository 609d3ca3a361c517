// ── Runtime gateway configuration ──
//
// These types describe *how* to talk to a gateway. They carry credential
// data and tuning, but never touch disk: the caller constructs a
// `GatewayConfig` and hands it in.

use std::time::Duration;

use lighter_api::ReconnectConfig;
use secrecy::SecretString;

/// What a cached read does when the gateway cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadPolicy {
    /// Log the failure and hand back the last snapshot (or an empty one).
    /// Reads stay available while the gateway is flaky.
    #[default]
    ServeStale,
    /// Return the failure to the caller.
    Propagate,
}

/// Configuration for talking to a single gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host name or IP address of the gateway.
    pub host: String,
    /// REST API port.
    pub port: u16,
    /// Previously acquired API key.
    pub api_key: Option<SecretString>,
    /// Transition time between two light states, in tenths of a second.
    pub transition_time: u16,
    /// Default budget for [`Gateway::wait_for_changes`](crate::Gateway::wait_for_changes).
    pub ack_timeout: Duration,
    /// HTTP request timeout.
    pub request_timeout: Duration,
    /// Open the notification websocket on `connect()`.
    pub websocket_enabled: bool,
    /// Websocket port; read from the gateway configuration when unset.
    pub websocket_port: Option<u16>,
    /// Device type announced when acquiring an API key.
    pub device_type: String,
    /// Poll interval while waiting for the link button.
    pub link_poll_interval: Duration,
    pub read_policy: ReadPolicy,
    pub reconnect: ReconnectConfig,
}

impl GatewayConfig {
    /// Defaults for the gateway at `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Use a previously acquired API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 80,
            api_key: None,
            transition_time: 0,
            ack_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            websocket_enabled: true,
            websocket_port: None,
            device_type: "lighter".into(),
            link_poll_interval: Duration::from_secs(1),
            read_policy: ReadPolicy::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}
