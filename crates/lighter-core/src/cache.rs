// ── Cached gateway snapshots ──
//
// One versioned snapshot per resource kind. Every read is a conditional
// fetch against the stored ETag; a refresh swaps the whole entry through
// `ArcSwapOption`, so concurrent readers see either the old or the new
// snapshot and never a mix of both.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use lighter_api::{BridgeConfig, Fetched, GatewayClient, Groups, Lights};

use crate::config::ReadPolicy;
use crate::error::CoreError;
use crate::sync::ResourceKind;

/// A snapshot tagged with the version token the gateway issued for it.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub snapshot: Arc<T>,
    pub etag: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Resource collections the cache knows how to fetch and store.
pub trait CachedResource: DeserializeOwned + Default + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn slot(cache: &CacheManager) -> &ArcSwapOption<CacheEntry<Self>>;
}

impl CachedResource for BridgeConfig {
    const KIND: ResourceKind = ResourceKind::Config;

    fn slot(cache: &CacheManager) -> &ArcSwapOption<CacheEntry<Self>> {
        &cache.config
    }
}

impl CachedResource for Lights {
    const KIND: ResourceKind = ResourceKind::Lights;

    fn slot(cache: &CacheManager) -> &ArcSwapOption<CacheEntry<Self>> {
        &cache.lights
    }
}

impl CachedResource for Groups {
    const KIND: ResourceKind = ResourceKind::Groups;

    fn slot(cache: &CacheManager) -> &ArcSwapOption<CacheEntry<Self>> {
        &cache.groups
    }
}

/// Last-known gateway state, refreshed on demand.
pub struct CacheManager {
    client: Arc<GatewayClient>,
    policy: ReadPolicy,
    config: ArcSwapOption<CacheEntry<BridgeConfig>>,
    lights: ArcSwapOption<CacheEntry<Lights>>,
    groups: ArcSwapOption<CacheEntry<Groups>>,
}

impl CacheManager {
    pub fn new(client: Arc<GatewayClient>, policy: ReadPolicy) -> Self {
        Self {
            client,
            policy,
            config: ArcSwapOption::empty(),
            lights: ArcSwapOption::empty(),
            groups: ArcSwapOption::empty(),
        }
    }

    pub async fn config(&self) -> Result<Arc<BridgeConfig>, CoreError> {
        self.get::<BridgeConfig>().await
    }

    pub async fn lights(&self) -> Result<Arc<Lights>, CoreError> {
        self.get::<Lights>().await
    }

    pub async fn groups(&self) -> Result<Arc<Groups>, CoreError> {
        self.get::<Groups>().await
    }

    /// Current snapshot of `T`, revalidated against the gateway.
    ///
    /// Without a cached entry this is a plain `GET`; otherwise the stored
    /// ETag goes out as `If-None-Match` and a `304` keeps the entry as is.
    pub async fn get<T: CachedResource>(&self) -> Result<Arc<T>, CoreError> {
        let slot = T::slot(self);
        let cached = slot.load_full();
        let etag = cached.as_ref().and_then(|entry| entry.etag.clone());

        match self.client.fetch::<T>(T::KIND.as_ref(), etag.as_deref()).await {
            Ok(Fetched::NotModified { etag: echoed }) => {
                let Some(entry) = cached else {
                    return Err(CoreError::ProtocolViolation {
                        message: format!("304 Not Modified for uncached {}", T::KIND),
                    });
                };
                if let Some(echoed) = echoed {
                    if entry.etag.as_deref() != Some(echoed.as_str()) {
                        return Err(CoreError::ProtocolViolation {
                            message: format!(
                                "304 Not Modified for {} carried ETag {echoed:?}, cached {:?}",
                                T::KIND,
                                entry.etag
                            ),
                        });
                    }
                }
                trace!(kind = %T::KIND, "cached snapshot is current");
                Ok(Arc::clone(&entry.snapshot))
            }
            Ok(Fetched::Modified { body, etag }) => Ok(Self::store(slot, body, etag)),
            Err(err) => self.degrade(T::KIND, cached, err.into()),
        }
    }

    /// Unconditionally refetch lights and groups, replacing their ETags.
    /// The configuration entry is left alone.
    pub async fn refresh_cache(&self) -> Result<(), CoreError> {
        self.refetch::<Lights>().await?;
        self.refetch::<Groups>().await?;
        Ok(())
    }

    /// ETag of the cached `kind` entry, if any.
    pub fn cached_etag(&self, kind: ResourceKind) -> Option<String> {
        match kind {
            ResourceKind::Config => self.config.load().as_ref().and_then(|e| e.etag.clone()),
            ResourceKind::Lights => self.lights.load().as_ref().and_then(|e| e.etag.clone()),
            ResourceKind::Groups => self.groups.load().as_ref().and_then(|e| e.etag.clone()),
        }
    }

    async fn refetch<T: CachedResource>(&self) -> Result<Arc<T>, CoreError> {
        let slot = T::slot(self);
        match self.client.fetch::<T>(T::KIND.as_ref(), None).await {
            Ok(Fetched::Modified { body, etag }) => Ok(Self::store(slot, body, etag)),
            Ok(Fetched::NotModified { .. }) => Err(CoreError::ProtocolViolation {
                message: format!("304 Not Modified for unconditional {} request", T::KIND),
            }),
            Err(err) => self.degrade(T::KIND, slot.load_full(), err.into()),
        }
    }

    fn store<T>(slot: &ArcSwapOption<CacheEntry<T>>, body: T, etag: Option<String>) -> Arc<T> {
        let snapshot = Arc::new(body);
        debug!(etag = etag.as_deref().unwrap_or("-"), "cache entry replaced");
        slot.store(Some(Arc::new(CacheEntry {
            snapshot: Arc::clone(&snapshot),
            etag,
            fetched_at: Utc::now(),
        })));
        snapshot
    }

    /// Apply the read policy to a failed fetch. Only transport failures
    /// degrade; protocol violations and configuration errors always surface.
    fn degrade<T: Default>(
        &self,
        kind: ResourceKind,
        cached: Option<Arc<CacheEntry<T>>>,
        err: CoreError,
    ) -> Result<Arc<T>, CoreError> {
        let CoreError::Transport { status, message } = &err else {
            return Err(err);
        };
        if self.policy == ReadPolicy::Propagate {
            return Err(err);
        }

        match cached {
            Some(entry) => {
                warn!(
                    %kind,
                    status = *status,
                    reason = %message,
                    age_secs = (Utc::now() - entry.fetched_at).num_seconds(),
                    "gateway read failed, serving cached snapshot"
                );
                Ok(Arc::clone(&entry.snapshot))
            }
            None => {
                warn!(
                    %kind,
                    status = *status,
                    reason = %message,
                    "gateway read failed and nothing is cached, serving an empty snapshot"
                );
                Ok(Arc::new(T::default()))
            }
        }
    }
}
