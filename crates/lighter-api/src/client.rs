// Gateway REST client
//
// Wraps `reqwest::Client` with gateway URL construction, conditional GETs,
// and per-field write result decoding. Endpoint groups (lights, groups,
// authentication) are implemented as inherent methods in separate files
// to keep this module focused on transport mechanics.

use std::sync::RwLock;

use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::models::WriteResult;
use crate::transport::TransportConfig;

/// Outcome of a (possibly conditional) `GET`.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    /// `304 Not Modified`: the caller's copy is current. Carries the ETag the
    /// gateway echoed back, if any.
    NotModified { etag: Option<String> },
    /// A full replacement body with its new version token.
    Modified { body: T, etag: Option<String> },
}

/// Raw HTTP client for the gateway REST API.
///
/// URLs have the shape `http://host:port/api/<api_key>/<path>`. The API key
/// is optional at construction so that a fresh installation can acquire
/// one through the link-button flow.
pub struct GatewayClient {
    http: reqwest::Client,
    /// Gateway root, e.g. `http://192.168.1.20:80/`.
    base_url: Url,
    api_key: RwLock<Option<SecretString>>,
}

impl GatewayClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(
        base_url: Url,
        api_key: Option<SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, api_key))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, api_key: Option<SecretString>) -> Self {
        Self {
            http,
            base_url,
            api_key: RwLock::new(api_key),
        }
    }

    /// Build the gateway root URL from a host and port.
    pub fn root_url(host: &str, port: u16) -> Result<Url, Error> {
        Ok(Url::parse(&format!("http://{host}:{port}/"))?)
    }

    /// The gateway root URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Whether an API key is available for resource endpoints.
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .read()
            .expect("api key lock poisoned")
            .is_some()
    }

    /// The API key in use, if any.
    pub fn api_key(&self) -> Option<SecretString> {
        self.api_key.read().expect("api key lock poisoned").clone()
    }

    /// Store an API key (after acquiring one through the link button).
    pub fn set_api_key(&self, key: SecretString) {
        debug!("storing API key");
        *self.api_key.write().expect("api key lock poisoned") = Some(key);
    }

    /// URL of the notification websocket on `port`.
    pub fn websocket_url(&self, port: u16) -> Result<Url, Error> {
        let host = self
            .base_url
            .host_str()
            .ok_or_else(|| Error::Protocol(format!("gateway URL {} has no host", self.base_url)))?;
        Ok(Url::parse(&format!("ws://{host}:{port}/"))?)
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/api/` -- the unauthenticated entry point.
    pub(crate) fn api_root(&self) -> Result<Url, Error> {
        Ok(self.base_url.join("api/")?)
    }

    /// `{base}/api/{key}/{path}`; an empty `path` addresses the key root.
    pub(crate) fn resource_url(&self, path: &str) -> Result<Url, Error> {
        let guard = self.api_key.read().expect("api key lock poisoned");
        let key = guard.as_ref().ok_or(Error::MissingApiKey)?;
        let path = path.trim_start_matches('/');
        let full = if path.is_empty() {
            format!("api/{}", key.expose_secret())
        } else {
            format!("api/{}/{path}", key.expose_secret())
        };
        Ok(self.base_url.join(&full)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// `GET {path}`, conditionally if `etag` is given.
    ///
    /// A `304` answer yields [`Fetched::NotModified`]; any other success
    /// yields the decoded body and its `ETag` header.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        etag: Option<&str>,
    ) -> Result<Fetched<T>, Error> {
        let url = self.resource_url(path)?;
        debug!(conditional = etag.is_some(), "GET {}", redact(&url, path));

        let mut builder = self.http.get(url);
        if let Some(tag) = etag {
            builder = builder.header(IF_NONE_MATCH, tag);
        }
        let resp = builder.send().await?;

        let etag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if resp.status() == StatusCode::NOT_MODIFIED {
            trace!(path, "not modified");
            return Ok(Fetched::NotModified { etag });
        }

        let body = parse_body(resp).await?;
        Ok(Fetched::Modified { body, etag })
    }

    /// Send a PUT request with JSON body and decode the per-field results.
    pub(crate) async fn put(
        &self,
        path: &str,
        body: &(impl Serialize + Sync),
    ) -> Result<Vec<WriteResult>, Error> {
        let url = self.resource_url(path)?;
        debug!("PUT {}", redact(&url, path));
        let resp = self.http.put(url).json(body).send().await?;
        parse_body(resp).await
    }

    /// Send a DELETE request and decode the per-field results.
    pub(crate) async fn delete(&self, path: &str) -> Result<Vec<WriteResult>, Error> {
        let url = self.resource_url(path)?;
        debug!("DELETE {}", redact(&url, path));
        let resp = self.http.delete(url).send().await?;
        parse_body(resp).await
    }
}

/// Log-safe rendering of a resource URL: the API key never reaches logs.
fn redact(url: &Url, path: &str) -> String {
    format!(
        "{}://{}/api/<key>/{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        path.trim_start_matches('/')
    )
}

/// Fail on non-success statuses, then decode the JSON body.
pub(crate) async fn parse_body<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Http {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("unknown").to_owned(),
            body: body.chars().take(200).collect(),
        });
    }

    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.clone(),
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(key: Option<&str>) -> GatewayClient {
        GatewayClient::with_client(
            reqwest::Client::new(),
            GatewayClient::root_url("10.0.0.2", 8080).unwrap(),
            key.map(|k| SecretString::from(k.to_owned())),
        )
    }

    #[test]
    fn resource_url_embeds_api_key() {
        let c = client(Some("ABC123"));
        assert_eq!(
            c.resource_url("lights/3/state").unwrap().as_str(),
            "http://10.0.0.2:8080/api/ABC123/lights/3/state"
        );
        assert_eq!(
            c.resource_url("").unwrap().as_str(),
            "http://10.0.0.2:8080/api/ABC123"
        );
    }

    #[test]
    fn resource_url_requires_api_key() {
        let c = client(None);
        assert!(matches!(c.resource_url("lights"), Err(Error::MissingApiKey)));
        assert_eq!(c.api_root().unwrap().as_str(), "http://10.0.0.2:8080/api/");
    }

    #[test]
    fn set_api_key_enables_resource_urls() {
        let c = client(None);
        assert!(!c.has_api_key());
        c.set_api_key(SecretString::from("NEWKEY".to_owned()));
        assert!(c.has_api_key());
        assert!(c.resource_url("groups").unwrap().as_str().ends_with("/api/NEWKEY/groups"));
    }

    #[test]
    fn websocket_url_reuses_gateway_host() {
        let c = client(Some("k"));
        assert_eq!(c.websocket_url(443).unwrap().as_str(), "ws://10.0.0.2:443/");
    }

    #[test]
    fn redacted_urls_hide_the_key() {
        let c = client(Some("SECRET"));
        let url = c.resource_url("lights").unwrap();
        let shown = redact(&url, "lights");
        assert!(!shown.contains("SECRET"));
        assert_eq!(shown, "http://10.0.0.2/api/<key>/lights");
    }
}
