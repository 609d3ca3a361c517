// ── Gateway orchestration ──
//
// `Gateway` composes the transport client, the snapshot cache, the state
// translator and the change synchronizer into the operations callers use:
// resolve selectors against cached state, translate tokens per resource,
// dispatch writes in input order and (optionally) wait for the hardware to
// confirm them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use indexmap::IndexSet;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lighter_api::{
    BridgeConfig, GatewayClient, GroupAttributes, Groups, Light, Lights, NotificationHandle,
    StateChange, TransportConfig, WriteResult,
};

use crate::cache::CacheManager;
use crate::config::GatewayConfig;
use crate::error::CoreError;
use crate::selector::Selector;
use crate::sync::{ChangeSynchronizer, PendingChange, ResourceKind, WaitOutcome};
use crate::translate::{CtBounds, StateTranslator};

/// Format of the whitelist `last use date` field.
const WHITELIST_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ── Gateway ──────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<GatewayInner>`. Reads work right after
/// [`new`](Self::new); call [`connect`](Self::connect) to start the
/// notification listener that acknowledges writes.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    config: GatewayConfig,
    client: Arc<GatewayClient>,
    cache: CacheManager,
    translator: StateTranslator,
    sync: Arc<ChangeSynchronizer>,
    cancel: CancellationToken,
    notifications: Mutex<Option<NotificationHandle>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Gateway {
    /// Build the REST client for `config`. Does not touch the network.
    pub fn new(config: GatewayConfig) -> Result<Self, CoreError> {
        let base_url = GatewayClient::root_url(&config.host, config.port)?;
        let transport = TransportConfig::default().with_timeout(config.request_timeout);
        let client = Arc::new(GatewayClient::new(
            base_url,
            config.api_key.clone(),
            &transport,
        )?);

        Ok(Self {
            inner: Arc::new(GatewayInner {
                cache: CacheManager::new(Arc::clone(&client), config.read_policy),
                translator: StateTranslator::new(config.transition_time),
                sync: Arc::new(ChangeSynchronizer::new(config.ack_timeout)),
                cancel: CancellationToken::new(),
                notifications: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
                client,
                config,
            }),
        })
    }

    pub fn settings(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &Arc<GatewayClient> {
        &self.inner.client
    }

    pub fn cache(&self) -> &CacheManager {
        &self.inner.cache
    }

    pub fn synchronizer(&self) -> &Arc<ChangeSynchronizer> {
        &self.inner.sync
    }

    pub(crate) fn translator(&self) -> &StateTranslator {
        &self.inner.translator
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the notification stream and start acknowledging writes.
    ///
    /// The websocket port comes from the configuration override or, failing
    /// that, from the gateway's own `websocketport`. Returns once the socket
    /// is open, or fails after the request timeout. Calling it again while
    /// connected is a configuration error.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let config = &self.inner.config;
        if !config.websocket_enabled {
            debug!("notification websocket disabled, writes will not be acknowledged");
            return Ok(());
        }
        let mut notifications = self.inner.notifications.lock().await;
        if notifications.is_some() {
            return Err(CoreError::Config {
                message: "notification listener already connected".into(),
            });
        }

        let port = match config.websocket_port {
            Some(port) => port,
            None => self
                .inner
                .cache
                .config()
                .await?
                .websocketport
                .ok_or_else(|| CoreError::Config {
                    message: "gateway does not advertise a websocket port".into(),
                })?,
        };
        let url = self.inner.client.websocket_url(port)?;

        let handle = NotificationHandle::connect(
            url,
            config.reconnect.clone(),
            self.inner.cancel.child_token(),
        )
        .await?;
        let rx = handle.subscribe();

        match tokio::time::timeout(config.request_timeout, handle.wait_connected()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                handle.shutdown();
                return Err(e.into());
            }
            Err(_) => {
                handle.shutdown();
                return Err(CoreError::Transport {
                    status: None,
                    message: format!(
                        "notification websocket did not open within {:?}",
                        config.request_timeout
                    ),
                });
            }
        }

        self.inner
            .task_handles
            .lock()
            .await
            .push(Arc::clone(&self.inner.sync).spawn_listener(rx, self.inner.cancel.clone()));
        *notifications = Some(handle);

        info!(port, "listening for gateway notifications");
        Ok(())
    }

    /// Stop the notification stream and join background tasks.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        if let Some(handle) = self.inner.notifications.lock().await.take() {
            handle.shutdown();
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("gateway shut down");
    }

    // ── Credentials ──────────────────────────────────────────────────

    /// Wait for the gateway to be unlocked and obtain a fresh API key.
    pub async fn acquire_api_key(&self) -> Result<SecretString, CoreError> {
        let config = &self.inner.config;
        Ok(self
            .inner
            .client
            .acquire_api_key(&config.device_type, config.link_poll_interval)
            .await?)
    }

    /// Revoke every issued key (other than ours) unused for more than
    /// `max_idle_days`. Returns the revoked keys.
    pub async fn purge_credentials(&self, max_idle_days: i64) -> Result<Vec<String>, CoreError> {
        let own_key = self
            .inner
            .client
            .api_key()
            .map(|key| key.expose_secret().to_owned());
        let config = self.inner.cache.config().await?;
        let now = Utc::now().naive_utc();

        let mut revoked = Vec::new();
        for (key, entry) in &config.whitelist {
            if own_key.as_deref() == Some(key.as_str()) {
                continue;
            }
            let Some(raw) = entry.last_use_date.as_deref() else {
                debug!(name = ?entry.name, "whitelist entry has no last use date, keeping it");
                continue;
            };
            let last_use = match NaiveDateTime::parse_from_str(raw, WHITELIST_DATE_FORMAT) {
                Ok(t) => t,
                Err(e) => {
                    warn!(name = ?entry.name, raw, error = %e, "unparseable last use date, keeping entry");
                    continue;
                }
            };

            let idle_days = (now - last_use).num_days();
            if idle_days <= max_idle_days {
                continue;
            }

            info!(name = ?entry.name, idle_days, "revoking stale API key");
            let results = self.inner.client.delete_whitelist_entry(key).await?;
            log_results("whitelist entry", &results);
            revoked.push(key.clone());
        }
        Ok(revoked)
    }

    // ── Cached reads ─────────────────────────────────────────────────

    /// Gateway configuration (revalidated).
    pub async fn config(&self) -> Result<Arc<BridgeConfig>, CoreError> {
        self.inner.cache.config().await
    }

    /// Lights matching `selector`, in gateway order.
    pub async fn lights(&self, selector: &Selector) -> Result<Lights, CoreError> {
        let lights = self.inner.cache.lights().await?;
        Ok(selector.select(&lights, "lights"))
    }

    /// Groups matching `selector`, in gateway order.
    pub async fn groups(&self, selector: &Selector) -> Result<Groups, CoreError> {
        let groups = self.inner.cache.groups().await?;
        Ok(selector.select(&groups, "groups"))
    }

    /// Discard cached versions of lights and groups.
    pub async fn refresh_cache(&self) -> Result<(), CoreError> {
        self.inner.cache.refresh_cache().await
    }

    // ── Lights ───────────────────────────────────────────────────────

    /// Identifiers of every light any of `selectors` matches.
    ///
    /// Results follow the order of `selectors` (each contributing its
    /// matches in gateway order); a light matched twice keeps its first
    /// position.
    pub async fn resolve_lights(&self, selectors: &[Selector]) -> Result<Vec<String>, CoreError> {
        let lights = self.inner.cache.lights().await?;
        let mut resolved = IndexSet::new();
        for selector in selectors {
            for (id, light) in lights.iter() {
                if selector.matches(id, &light.name) {
                    resolved.insert(id.clone());
                }
            }
        }
        debug!(
            "{} out of {} lights resolved from {} selector(s)",
            resolved.len(),
            lights.len(),
            selectors.len()
        );
        Ok(resolved.into_iter().collect())
    }

    /// Rename every light matching `selector`. Returns how many were renamed.
    pub async fn set_light_name(&self, selector: &Selector, name: &str) -> Result<usize, CoreError> {
        let affected = self.lights(selector).await?;
        if affected.is_empty() {
            warn!(%selector, "no lights affected by rename");
            return Ok(0);
        }
        for id in affected.keys() {
            let results = self.inner.client.set_light_name(id, name).await?;
            log_results("light", &results);
        }
        Ok(affected.len())
    }

    /// Apply `tokens` to every light matching `selector`.
    ///
    /// Every payload is computed before the first write goes out, so an
    /// unrecognized token leaves all lights untouched. Returns how many
    /// lights were written.
    pub async fn set_light_state<S: AsRef<str> + Sync>(
        &self,
        selector: &Selector,
        tokens: &[S],
    ) -> Result<usize, CoreError> {
        let affected = self.lights(selector).await?;
        if affected.is_empty() {
            warn!(%selector, "no lights affected by state change");
            return Ok(0);
        }
        self.apply_to_lights(&affected, tokens).await
    }

    /// Re-apply a captured light snapshot (as returned by [`lights`](Self::lights)
    /// or [`group_lights`](Self::group_lights)) and wait for the hardware.
    pub async fn restore_light_state(&self, snapshot: &Lights) -> Result<WaitOutcome, CoreError> {
        for (id, light) in snapshot {
            let change = self.inner.translator.restore(&light.state);
            self.dispatch_light(id, &change).await?;
        }
        Ok(self.wait_for_changes(None).await)
    }

    // ── Groups ───────────────────────────────────────────────────────

    /// Partially update every group matching `selector`.
    ///
    /// Only the provided attributes are sent. `lights` is resolved with
    /// [`resolve_lights`](Self::resolve_lights) first. Returns how many
    /// groups were updated.
    pub async fn set_group_attrs(
        &self,
        selector: &Selector,
        name: Option<&str>,
        lights: Option<&[Selector]>,
        hidden: Option<bool>,
    ) -> Result<usize, CoreError> {
        let lights = match lights {
            Some(selectors) => Some(self.resolve_lights(selectors).await?),
            None => None,
        };
        let attrs = GroupAttributes {
            name: name.map(str::to_owned),
            lights,
            hidden,
        };
        if attrs.is_empty() {
            debug!("no group attributes to update");
            return Ok(0);
        }

        let affected = self.groups(selector).await?;
        if affected.is_empty() {
            warn!(%selector, "no groups affected by attribute change");
            return Ok(0);
        }
        for id in affected.keys() {
            let results = self.inner.client.set_group_attributes(id, &attrs).await?;
            log_results("group", &results);
        }
        Ok(affected.len())
    }

    /// Apply `tokens` to every group matching `selector` as a group action.
    ///
    /// Color-temperature bounds are the intersection of the member lights'
    /// ranges.
    pub async fn set_group_state<S: AsRef<str> + Sync>(
        &self,
        selector: &Selector,
        tokens: &[S],
    ) -> Result<usize, CoreError> {
        let affected = self.groups(selector).await?;
        if affected.is_empty() {
            warn!(%selector, "no groups affected by state change");
            return Ok(0);
        }
        let lights = self.inner.cache.lights().await?;

        let mut changes = Vec::with_capacity(affected.len());
        for (id, group) in &affected {
            let members = group.lights.iter().filter_map(|lid| lights.get(lid));
            let bounds = CtBounds::for_group(members);
            changes.push((id, self.inner.translator.translate(&group.action, bounds, tokens)?));
        }

        for (id, change) in &changes {
            let results = self
                .tracked_write(
                    ResourceKind::Groups,
                    id,
                    self.inner.client.set_group_action(id, change),
                )
                .await?;
            log_results("group", &results);
        }
        Ok(changes.len())
    }

    /// Member lights of every group matching `selector`, in group order.
    pub async fn group_lights(&self, selector: &Selector) -> Result<Lights, CoreError> {
        let groups = self.groups(selector).await?;
        let lights = self.inner.cache.lights().await?;

        let mut members = Lights::new();
        for group in groups.values() {
            for (id, light) in members_of(&group.lights, &lights) {
                members.entry(id.clone()).or_insert_with(|| light.clone());
            }
        }
        Ok(members)
    }

    /// Apply per-light token lists inside the groups matching `group`.
    ///
    /// Each entry's selector is evaluated against the group's own members,
    /// never against every gateway light. Entries apply in order.
    pub async fn set_group_lights(
        &self,
        group: &Selector,
        entries: &[(Selector, Vec<String>)],
    ) -> Result<usize, CoreError> {
        let groups = self.groups(group).await?;
        if groups.is_empty() {
            warn!(%group, "no groups affected by state change");
            return Ok(0);
        }
        let lights = self.inner.cache.lights().await?;

        let mut written = 0;
        for (sub, tokens) in entries {
            for g in groups.values() {
                let affected: Lights = members_of(&g.lights, &lights)
                    .filter(|(id, light)| sub.matches(id, &light.name))
                    .map(|(id, light)| (id.clone(), light.clone()))
                    .collect();
                written += self.apply_to_lights(&affected, tokens).await?;
            }
        }
        Ok(written)
    }

    // ── Synchronization ──────────────────────────────────────────────

    /// Wait until every dispatched write is acknowledged, or `timeout`
    /// (the configured default when `None`) elapses.
    pub async fn wait_for_changes(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.inner.sync.wait_for_changes(timeout).await
    }

    /// Writes dispatched but not yet acknowledged.
    pub fn pending_changes(&self) -> Vec<PendingChange> {
        self.inner.sync.pending()
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn apply_to_lights<S: AsRef<str> + Sync>(
        &self,
        lights: &Lights,
        tokens: &[S],
    ) -> Result<usize, CoreError> {
        let mut changes = Vec::with_capacity(lights.len());
        for (id, light) in lights {
            let bounds = CtBounds::for_light(light);
            changes.push((id, self.inner.translator.translate(&light.state, bounds, tokens)?));
        }
        for (id, change) in &changes {
            self.dispatch_light(id, change).await?;
        }
        Ok(changes.len())
    }

    async fn dispatch_light(&self, id: &str, change: &StateChange) -> Result<(), CoreError> {
        let results = self
            .tracked_write(
                ResourceKind::Lights,
                id,
                self.inner.client.set_light_state(id, change),
            )
            .await?;
        log_results("light", &results);
        Ok(())
    }

    /// Register `(kind, id)` as pending, then run `write`.
    ///
    /// A failed write is withdrawn again unless an earlier, accepted write
    /// to the same resource is still outstanding.
    async fn tracked_write<F>(
        &self,
        kind: ResourceKind,
        id: &str,
        write: F,
    ) -> Result<Vec<WriteResult>, CoreError>
    where
        F: Future<Output = Result<Vec<WriteResult>, lighter_api::Error>> + Send,
    {
        let registered = self.inner.sync.register(kind, id);
        match write.await {
            Ok(results) => Ok(results),
            Err(e) => {
                if registered {
                    self.inner.sync.forget(kind, id);
                }
                warn!(%kind, id, error = %e, "write failed, not waiting for it");
                Err(e.into())
            }
        }
    }
}

/// Lights listed in `member_ids` that the gateway knows, in gateway order.
pub(crate) fn members_of<'a>(
    member_ids: &'a [String],
    lights: &'a Lights,
) -> impl Iterator<Item = (&'a String, &'a Light)> + 'a {
    lights
        .iter()
        .filter(move |(id, _)| member_ids.iter().any(|m| m == *id))
}

/// Log per-field write results: accepted fields at debug, rejected at error.
pub(crate) fn log_results(what: &str, results: &[WriteResult]) {
    for result in results {
        match result {
            WriteResult::Success(serde_json::Value::Object(fields)) => {
                for (address, value) in fields {
                    debug!(%address, %value, "{what} updated");
                }
            }
            WriteResult::Success(value) => debug!(%value, "{what} updated"),
            WriteResult::Error(e) => {
                error!(
                    code = e.code,
                    address = %e.address,
                    description = %e.description,
                    "gateway rejected {what} change"
                );
            }
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("pending", &self.inner.sync.pending().len())
            .finish_non_exhaustive()
    }
}
