// Credential endpoints
//
// Link-button key acquisition, gateway configuration reads, and whitelist
// housekeeping.

use std::time::Duration;

use reqwest::StatusCode;
use secrecy::SecretString;
use serde_json::json;
use tracing::{debug, error, info};

use crate::client::{Fetched, GatewayClient, parse_body};
use crate::error::Error;
use crate::models::{BridgeConfig, WriteResult};

impl GatewayClient {
    /// Acquire a new API key and store it on this client.
    ///
    /// `POST /api/` with `{"devicetype": ...}`
    ///
    /// The gateway answers `403 Forbidden` until somebody unlocks it (the
    /// "Authenticate app" button of the gateway web interface). Polls every
    /// `interval` for as long as that takes; any other failure is returned.
    pub async fn acquire_api_key(
        &self,
        device_type: &str,
        interval: Duration,
    ) -> Result<SecretString, Error> {
        let url = self.api_root()?;
        let body = json!({ "devicetype": device_type });

        loop {
            debug!("POST {}", url);
            let resp = self.http().post(url.clone()).json(&body).send().await?;

            if resp.status() == StatusCode::FORBIDDEN {
                error!(
                    gateway = %self.base_url(),
                    "gateway responded 403 (Forbidden) -- link button not pressed; \
                     unlock the gateway from its web interface"
                );
                info!(interval_ms = interval.as_millis(), "waiting before retrying");
                tokio::time::sleep(interval).await;
                continue;
            }

            let results: Vec<WriteResult> = parse_body(resp).await?;
            let key = issued_username(&results)?;
            info!("API key issued by gateway");
            self.set_api_key(key.clone());
            return Ok(key);
        }
    }

    /// Read the gateway configuration.
    ///
    /// `GET /api/{key}/config`
    pub async fn config(&self, etag: Option<&str>) -> Result<Fetched<BridgeConfig>, Error> {
        self.fetch("config", etag).await
    }

    /// Revoke an issued API key.
    ///
    /// `DELETE /api/{key}/config/whitelist/{stale_key}`
    pub async fn delete_whitelist_entry(&self, stale_key: &str) -> Result<Vec<WriteResult>, Error> {
        debug!("deleting whitelist entry");
        self.delete(&format!("config/whitelist/{stale_key}")).await
    }
}

/// Extract `success.username` from a key-acquisition answer.
fn issued_username(results: &[WriteResult]) -> Result<SecretString, Error> {
    for result in results {
        match result {
            WriteResult::Success(fields) => {
                if let Some(name) = fields.get("username").and_then(|v| v.as_str()) {
                    return Ok(SecretString::from(name.to_owned()));
                }
            }
            WriteResult::Error(detail) => {
                return Err(Error::Protocol(format!(
                    "key acquisition rejected ({}): {}",
                    detail.code, detail.description
                )));
            }
        }
    }
    Err(Error::Protocol(
        "key acquisition answer carried no username".into(),
    ))
}
