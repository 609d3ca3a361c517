// ── Core error types ──
//
// User-facing errors from lighter-core. Consumers never see reqwest or
// JSON parse failures directly: the `From<lighter_api::Error>` impl
// translates transport-layer errors into domain-appropriate variants.

use std::time::Duration;

use thiserror::Error;

use crate::sync::PendingChange;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Transport ────────────────────────────────────────────────────
    /// The gateway could not be reached, or answered with a failure status.
    #[error("Gateway request failed{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport { status: Option<u16>, message: String },

    /// The gateway answered in a shape its protocol does not allow.
    #[error("Gateway protocol violation: {message}")]
    ProtocolViolation { message: String },

    // ── Caller input ─────────────────────────────────────────────────
    /// A `/pattern/` selector did not compile.
    #[error("Invalid selector {selector:?}: {source}")]
    InvalidSelector {
        selector: String,
        #[source]
        source: regex::Error,
    },

    /// A state token outside the supported vocabulary.
    #[error("Keyword {token:?} is not recognized when setting the light state")]
    UnrecognizedToken { token: String },

    // ── Selection ────────────────────────────────────────────────────
    /// An operation that needs exactly one match found several.
    #[error("{operation} can only affect one {entity_type} at a time, {count} were selected")]
    AmbiguousSelector {
        operation: &'static str,
        entity_type: &'static str,
        count: usize,
    },

    /// An operation that needs at least one match found none.
    #[error("No {entity_type} matched {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    // ── Synchronization ──────────────────────────────────────────────
    /// Writes were accepted by the gateway but not confirmed by the hardware
    /// within the wait budget.
    #[error("{} change(s) not acknowledged after {timeout:?}", .outstanding.len())]
    AcknowledgementTimeout {
        timeout: Duration,
        outstanding: Vec<PendingChange>,
    },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// HTTP status of a transport failure, if the gateway answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<lighter_api::Error> for CoreError {
    fn from(err: lighter_api::Error) -> Self {
        match err {
            lighter_api::Error::MissingApiKey => CoreError::Config {
                message: "no API key configured -- acquire one first".into(),
            },
            lighter_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid gateway URL: {e}"),
            },
            lighter_api::Error::Http {
                status,
                reason,
                body,
            } => CoreError::Transport {
                status: Some(status),
                message: if body.is_empty() {
                    reason
                } else {
                    format!("{reason}: {body}")
                },
            },
            lighter_api::Error::Transport(e) => CoreError::Transport {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            },
            lighter_api::Error::WebSocketConnect(reason) => CoreError::Transport {
                status: None,
                message: format!("websocket connection failed: {reason}"),
            },
            lighter_api::Error::Deserialization { message, body: _ } => {
                CoreError::ProtocolViolation { message }
            }
            lighter_api::Error::Protocol(message) => CoreError::ProtocolViolation { message },
        }
    }
}
