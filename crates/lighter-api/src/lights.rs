// Light endpoints
//
// Reads go through `GatewayClient::fetch` so callers can make them
// conditional; writes return the gateway's per-field results untouched.

use serde_json::json;
use tracing::debug;

use crate::client::{Fetched, GatewayClient};
use crate::error::Error;
use crate::models::{Lights, StateChange, WriteResult};

impl GatewayClient {
    /// List all lights.
    ///
    /// `GET /api/{key}/lights`
    pub async fn lights(&self, etag: Option<&str>) -> Result<Fetched<Lights>, Error> {
        self.fetch("lights", etag).await
    }

    /// Change the state of one light.
    ///
    /// `PUT /api/{key}/lights/{id}/state`
    pub async fn set_light_state(
        &self,
        id: &str,
        change: &StateChange,
    ) -> Result<Vec<WriteResult>, Error> {
        debug!(light = id, ?change, "setting light state");
        self.put(&format!("lights/{id}/state"), change).await
    }

    /// Rename one light.
    ///
    /// `PUT /api/{key}/lights/{id}` with `{"name": ...}`
    pub async fn set_light_name(&self, id: &str, name: &str) -> Result<Vec<WriteResult>, Error> {
        debug!(light = id, name, "renaming light");
        self.put(&format!("lights/{id}"), &json!({ "name": name })).await
    }
}
