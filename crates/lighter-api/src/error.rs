use thiserror::Error;

/// Top-level error type for the `lighter-api` crate.
///
/// Covers every failure mode of the gateway surfaces: REST transport,
/// HTTP status handling, payload decoding, and the notification websocket.
/// `lighter-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// An endpoint needing an API key was called before one was configured
    /// or acquired through the link button.
    #[error("No API key configured -- acquire one with the gateway link button first")]
    MissingApiKey,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The gateway answered with a status that is neither success nor
    /// `304 Not Modified`.
    #[error("Gateway returned HTTP {status} ({reason}): {body}")]
    Http {
        status: u16,
        reason: String,
        body: String,
    },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// The gateway answered in a shape its protocol does not allow.
    #[error("Gateway protocol violation: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_names_status_and_reason() {
        let err = Error::Http {
            status: 404,
            reason: "Not Found".into(),
            body: "resource, /lights/9, not available".into(),
        };
        assert_eq!(
            err.to_string(),
            "Gateway returned HTTP 404 (Not Found): resource, /lights/9, not available"
        );
    }
}
