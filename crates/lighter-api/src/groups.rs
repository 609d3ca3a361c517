// Group and scene endpoints

use serde_json::json;
use tracing::debug;

use crate::client::{Fetched, GatewayClient};
use crate::error::Error;
use crate::models::{GroupAttributes, Groups, StateChange, WriteResult};

impl GatewayClient {
    /// List all groups, including their scene references.
    ///
    /// `GET /api/{key}/groups`
    pub async fn groups(&self, etag: Option<&str>) -> Result<Fetched<Groups>, Error> {
        self.fetch("groups", etag).await
    }

    /// Partially update a group. Omitted attributes are left untouched.
    ///
    /// `PUT /api/{key}/groups/{id}`
    pub async fn set_group_attributes(
        &self,
        id: &str,
        attrs: &GroupAttributes,
    ) -> Result<Vec<WriteResult>, Error> {
        debug!(group = id, ?attrs, "updating group attributes");
        self.put(&format!("groups/{id}"), attrs).await
    }

    /// Apply one state change to every light of a group.
    ///
    /// `PUT /api/{key}/groups/{id}/action`
    pub async fn set_group_action(
        &self,
        id: &str,
        change: &StateChange,
    ) -> Result<Vec<WriteResult>, Error> {
        debug!(group = id, ?change, "setting group action");
        self.put(&format!("groups/{id}/action"), change).await
    }

    /// Store the current light states of a group into one of its scenes.
    ///
    /// `PUT /api/{key}/groups/{group}/scenes/{scene}/store`
    pub async fn store_scene(&self, group: &str, scene: &str) -> Result<Vec<WriteResult>, Error> {
        debug!(group, scene, "storing scene");
        self.put(&format!("groups/{group}/scenes/{scene}/store"), &json!({}))
            .await
    }

    /// Recall (apply) a stored scene.
    ///
    /// `PUT /api/{key}/groups/{group}/scenes/{scene}/recall`
    pub async fn recall_scene(&self, group: &str, scene: &str) -> Result<Vec<WriteResult>, Error> {
        debug!(group, scene, "recalling scene");
        self.put(&format!("groups/{group}/scenes/{scene}/recall"), &json!({}))
            .await
    }

    /// Overwrite the stored state of a single light inside a scene.
    ///
    /// `PUT /api/{key}/groups/{group}/scenes/{scene}/lights/{light}/state`
    pub async fn set_scene_light_state(
        &self,
        group: &str,
        scene: &str,
        light: &str,
        change: &StateChange,
    ) -> Result<Vec<WriteResult>, Error> {
        debug!(group, scene, light, ?change, "writing scene light state");
        self.put(
            &format!("groups/{group}/scenes/{scene}/lights/{light}/state"),
            change,
        )
        .await
    }
}
