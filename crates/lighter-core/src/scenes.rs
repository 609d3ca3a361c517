// ── Scene operations ──
//
// Scenes live inside groups on the gateway. Storing needs exactly one group
// and one scene; recalling fans out to every match.

use indexmap::IndexMap;
use tracing::{debug, error, info};

use lighter_api::SceneRef;

use crate::error::CoreError;
use crate::gateway::{Gateway, log_results, members_of};
use crate::selector::Selector;
use crate::translate::CtBounds;

/// A scene together with the group that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneMatch {
    pub group_id: String,
    pub group_name: String,
    pub scene: SceneRef,
}

impl Gateway {
    /// Scenes matching `scene` inside every group matching `group`.
    pub async fn scenes(
        &self,
        group: &Selector,
        scene: &Selector,
    ) -> Result<Vec<SceneMatch>, CoreError> {
        let groups = self.groups(group).await?;
        Ok(groups
            .iter()
            .flat_map(|(gid, g)| {
                scene.select_scenes(&g.scenes).into_iter().map(move |s| SceneMatch {
                    group_id: gid.clone(),
                    group_name: g.name.clone(),
                    scene: s.clone(),
                })
            })
            .collect())
    }

    /// Store the current light states of one group into one of its scenes.
    ///
    /// Returns `None` (after logging) when no group or no scene matched.
    pub async fn store_scene(
        &self,
        group: &Selector,
        scene: &Selector,
    ) -> Result<Option<SceneMatch>, CoreError> {
        let Some(target) = self.single_scene(group, scene).await? else {
            return Ok(None);
        };

        let results = self
            .client()
            .store_scene(&target.group_id, &target.scene.id)
            .await?;
        log_results("scene", &results);
        info!(group = %target.group_name, scene = %target.scene.name, "scene stored");
        Ok(Some(target))
    }

    /// Write a computed state into every light slot of one scene.
    ///
    /// `entries` pairs a sub-selector (evaluated against the group's members)
    /// with tokens. Tokens accumulate per light in entry order, so later
    /// entries override earlier ones. Lights no entry selects are left out.
    pub async fn store_scene2(
        &self,
        group: &Selector,
        scene: &Selector,
        entries: &[(Selector, Vec<String>)],
    ) -> Result<Option<SceneMatch>, CoreError> {
        let Some(target) = self.single_scene(group, scene).await? else {
            return Ok(None);
        };
        let groups = self.cache().groups().await?;
        let lights = self.cache().lights().await?;
        let member_ids = groups
            .get(&target.group_id)
            .map(|g| g.lights.clone())
            .unwrap_or_default();

        let mut tokens_per_light: IndexMap<&String, Vec<&str>> = IndexMap::new();
        for (sub, tokens) in entries {
            for (id, light) in members_of(&member_ids, &lights) {
                if sub.matches(id, &light.name) {
                    tokens_per_light
                        .entry(id)
                        .or_default()
                        .extend(tokens.iter().map(String::as_str));
                }
            }
        }

        let mut slots = Vec::with_capacity(tokens_per_light.len());
        for (id, tokens) in &tokens_per_light {
            let light = &lights[*id];
            let change =
                self.translator()
                    .translate(&light.state, CtBounds::for_light(light), tokens)?;
            slots.push((*id, change));
        }

        for (light_id, change) in &slots {
            let results = self
                .client()
                .set_scene_light_state(&target.group_id, &target.scene.id, light_id, change)
                .await?;
            log_results("scene light", &results);
        }
        info!(
            group = %target.group_name,
            scene = %target.scene.name,
            lights = slots.len(),
            "scene light states written"
        );
        Ok(Some(target))
    }

    /// Recall every matching scene in every matching group.
    pub async fn recall_scene(
        &self,
        group: &Selector,
        scene: &Selector,
    ) -> Result<Vec<SceneMatch>, CoreError> {
        let matches = self.scenes(group, scene).await?;
        if matches.is_empty() {
            return Err(CoreError::NotFound {
                entity_type: "scene",
                identifier: format!("{scene} in group {group}"),
            });
        }

        for m in &matches {
            let results = self.client().recall_scene(&m.group_id, &m.scene.id).await?;
            log_results("scene", &results);
            debug!(group = %m.group_name, scene = %m.scene.name, "scene recalled");
        }
        Ok(matches)
    }

    /// Resolve exactly one group and one of its scenes.
    async fn single_scene(
        &self,
        group: &Selector,
        scene: &Selector,
    ) -> Result<Option<SceneMatch>, CoreError> {
        let groups = self.groups(group).await?;
        if groups.len() > 1 {
            return Err(CoreError::AmbiguousSelector {
                operation: "Scene storage",
                entity_type: "group",
                count: groups.len(),
            });
        }
        let Some((gid, g)) = groups.first() else {
            error!(%group, "no group affected by scene storage");
            return Ok(None);
        };

        let candidates = scene.select_scenes(&g.scenes);
        match candidates.as_slice() {
            [] => {
                error!(%scene, group = %g.name, "no scene affected by scene storage");
                Ok(None)
            }
            [only] => Ok(Some(SceneMatch {
                group_id: gid.clone(),
                group_name: g.name.clone(),
                scene: (*only).clone(),
            })),
            many => Err(CoreError::AmbiguousSelector {
                operation: "Scene storage",
                entity_type: "scene",
                count: many.len(),
            }),
        }
    }
}
