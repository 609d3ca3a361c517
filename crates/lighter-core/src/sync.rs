// ── Change synchronization ──
//
// A write is registered as pending *before* it is handed to the transport
// and stays pending until the notification stream reports the hardware
// picked it up, or until the gateway refuses the write. The pending set lives in a `watch` channel: every insert
// and removal is a single `send_modify`, so "the set became empty" is
// observed atomically with the removal that emptied it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use strum::{AsRefStr, Display, EnumString};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lighter_api::GatewayEvent;

use crate::error::CoreError;

/// Resource collections the gateway reports changes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ResourceKind {
    Config,
    Lights,
    Groups,
}

/// A dispatched write awaiting hardware acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingChange {
    pub kind: ResourceKind,
    pub id: String,
}

impl PendingChange {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for PendingChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Result of waiting for outstanding writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every pending change was acknowledged.
    Acknowledged,
    /// The budget ran out; the writes themselves were still accepted.
    TimedOut {
        outstanding: Vec<PendingChange>,
        timeout: Duration,
    },
}

impl WaitOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged)
    }

    /// Turn a timeout into [`CoreError::AcknowledgementTimeout`].
    pub fn into_result(self) -> Result<(), CoreError> {
        match self {
            Self::Acknowledged => Ok(()),
            Self::TimedOut {
                outstanding,
                timeout,
            } => Err(CoreError::AcknowledgementTimeout {
                timeout,
                outstanding,
            }),
        }
    }
}

/// Owns the pending-change set and the wait primitive built on it.
#[derive(Debug)]
pub struct ChangeSynchronizer {
    pending: watch::Sender<HashSet<PendingChange>>,
    default_timeout: Duration,
}

impl ChangeSynchronizer {
    pub fn new(default_timeout: Duration) -> Self {
        let (pending, _) = watch::channel(HashSet::new());
        Self {
            pending,
            default_timeout,
        }
    }

    /// Mark `(kind, id)` as dispatched; returns `false` if it already was.
    pub fn register(&self, kind: ResourceKind, id: &str) -> bool {
        let change = PendingChange::new(kind, id);
        debug!(%change, "registered pending change");
        let mut inserted = false;
        self.pending.send_modify(|pending| {
            inserted = pending.insert(change);
        });
        inserted
    }

    /// Withdraw `(kind, id)` for a write the gateway never accepted.
    pub fn forget(&self, kind: ResourceKind, id: &str) -> bool {
        let change = PendingChange::new(kind, id);
        let removed = self
            .pending
            .send_if_modified(|pending| pending.remove(&change));
        if removed {
            debug!(%change, "pending change withdrawn");
        }
        removed
    }

    /// Remove `(kind, id)`; returns `false` if it was not pending.
    pub fn acknowledge(&self, kind: ResourceKind, id: &str) -> bool {
        let change = PendingChange::new(kind, id);
        let removed = self
            .pending
            .send_if_modified(|pending| pending.remove(&change));
        if removed {
            debug!(%change, "change acknowledged");
        }
        removed
    }

    /// Feed one notification; only `changed` events carrying a new state
    /// count as acknowledgements.
    pub fn handle_event(&self, event: &GatewayEvent) -> bool {
        if !event.is_state_change() {
            return false;
        }
        let Ok(kind) = event.resource.parse::<ResourceKind>() else {
            return false;
        };
        let Some(id) = event.id.as_deref() else {
            return false;
        };
        self.acknowledge(kind, id)
    }

    /// Snapshot of the outstanding changes, sorted for stable reporting.
    pub fn pending(&self) -> Vec<PendingChange> {
        let mut outstanding: Vec<PendingChange> = self.pending.borrow().iter().cloned().collect();
        outstanding.sort_by(|a, b| {
            a.kind
                .as_ref()
                .cmp(b.kind.as_ref())
                .then_with(|| a.id.cmp(&b.id))
        });
        outstanding
    }

    pub fn is_idle(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Wait until every pending change is acknowledged or `timeout`
    /// (the configured default when `None`) elapses.
    ///
    /// Returns immediately when nothing is pending. A timeout does not
    /// cancel anything; the changes stay pending.
    pub async fn wait_for_changes(&self, timeout: Option<Duration>) -> WaitOutcome {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let mut rx = self.pending.subscribe();

        let waited = tokio::time::timeout(timeout, async {
            // The sender lives in `self`, so the channel cannot close here.
            let _ = rx.wait_for(HashSet::is_empty).await;
        })
        .await;

        if waited.is_ok() {
            info!("all changes acknowledged");
            WaitOutcome::Acknowledged
        } else {
            let outstanding = self.pending();
            warn!(
                outstanding = outstanding.len(),
                ?timeout,
                "timed out waiting for changes to be acknowledged"
            );
            WaitOutcome::TimedOut {
                outstanding,
                timeout,
            }
        }
    }

    /// Drain notifications from `rx` into the pending set until `cancel`
    /// fires or the stream closes.
    pub fn spawn_listener(
        self: Arc<Self>,
        mut rx: broadcast::Receiver<Arc<GatewayEvent>>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(event) => {
                            self.handle_event(&event);
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "acknowledgement listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("acknowledgement listener stopped");
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn changed(resource: &str, id: &str) -> GatewayEvent {
        serde_json::from_value(json!({
            "t": "event",
            "e": "changed",
            "r": resource,
            "id": id,
            "state": { "on": true }
        }))
        .unwrap()
    }

    #[test]
    fn resource_kind_round_trips_through_strings() {
        assert_eq!("lights".parse::<ResourceKind>().unwrap(), ResourceKind::Lights);
        assert_eq!(ResourceKind::Groups.to_string(), "groups");
        assert!("sensors".parse::<ResourceKind>().is_err());
    }

    #[tokio::test]
    async fn nothing_pending_returns_immediately() {
        let sync = ChangeSynchronizer::new(Duration::from_secs(5));
        assert!(sync.wait_for_changes(None).await.is_acknowledged());
    }

    #[tokio::test]
    async fn acknowledgement_before_wait_does_not_block() {
        let sync = ChangeSynchronizer::new(Duration::from_secs(5));
        sync.register(ResourceKind::Lights, "3");
        assert!(sync.handle_event(&changed("lights", "3")));
        assert!(sync.wait_for_changes(None).await.is_acknowledged());
    }

    #[tokio::test]
    async fn short_timeout_reports_outstanding_changes() {
        let sync = ChangeSynchronizer::new(Duration::from_secs(5));
        sync.register(ResourceKind::Lights, "3");

        let outcome = sync.wait_for_changes(Some(Duration::from_millis(10))).await;
        assert_eq!(
            outcome,
            WaitOutcome::TimedOut {
                outstanding: vec![PendingChange::new(ResourceKind::Lights, "3")],
                timeout: Duration::from_millis(10),
            }
        );
        // Still pending: a timeout only stops the waiting.
        assert!(!sync.is_idle());
    }

    #[tokio::test]
    async fn timeout_converts_to_error() {
        let sync = ChangeSynchronizer::new(Duration::from_millis(5));
        sync.register(ResourceKind::Groups, "1");
        let err = sync.wait_for_changes(None).await.into_result().unwrap_err();
        assert!(matches!(err, CoreError::AcknowledgementTimeout { outstanding, .. } if outstanding.len() == 1));
    }

    #[test]
    fn unrelated_events_are_ignored() {
        let sync = ChangeSynchronizer::new(Duration::from_secs(1));
        sync.register(ResourceKind::Lights, "3");

        assert!(!sync.handle_event(&changed("lights", "4")));
        assert!(!sync.handle_event(&changed("groups", "3")));
        assert!(!sync.handle_event(&changed("sensors", "3")));

        let attr_only: GatewayEvent = serde_json::from_value(json!({
            "e": "changed", "r": "lights", "id": "3", "attr": { "name": "Desk" }
        }))
        .unwrap();
        assert!(!sync.handle_event(&attr_only));

        let added: GatewayEvent = serde_json::from_value(json!({
            "e": "added", "r": "lights", "id": "3", "state": { "on": true }
        }))
        .unwrap();
        assert!(!sync.handle_event(&added));

        assert_eq!(sync.pending().len(), 1);
    }

    #[tokio::test]
    async fn forgotten_change_no_longer_blocks_waiting() {
        let sync = ChangeSynchronizer::new(Duration::from_millis(50));
        assert!(sync.register(ResourceKind::Lights, "1"));
        assert!(sync.register(ResourceKind::Lights, "2"));
        assert!(!sync.register(ResourceKind::Lights, "2"));

        assert!(sync.forget(ResourceKind::Lights, "1"));
        assert!(!sync.forget(ResourceKind::Lights, "1"));
        assert!(sync.acknowledge(ResourceKind::Lights, "2"));

        assert!(sync.wait_for_changes(None).await.is_acknowledged());
    }

    #[tokio::test]
    async fn listener_drains_pending_set() {
        let sync = Arc::new(ChangeSynchronizer::new(Duration::from_secs(5)));
        let (tx, rx) = broadcast::channel(8);
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&sync).spawn_listener(rx, cancel.clone());

        sync.register(ResourceKind::Lights, "1");
        sync.register(ResourceKind::Groups, "2");
        tx.send(Arc::new(changed("lights", "1"))).unwrap();
        tx.send(Arc::new(changed("groups", "2"))).unwrap();

        assert!(sync.wait_for_changes(None).await.is_acknowledged());
        cancel.cancel();
        handle.await.unwrap();
    }
}
