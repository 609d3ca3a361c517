// lighter-core: Selectors, cached state, token translation and write acknowledgement on top of lighter-api.

pub mod cache;
pub mod config;
mod convert;
pub mod error;
pub mod gateway;
pub mod scenes;
pub mod selector;
pub mod sync;
pub mod translate;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::{CacheEntry, CacheManager};
pub use config::{GatewayConfig, ReadPolicy};
pub use error::CoreError;
pub use gateway::Gateway;
pub use scenes::SceneMatch;
pub use selector::{Named, Selector};
pub use sync::{ChangeSynchronizer, PendingChange, ResourceKind, WaitOutcome};
pub use translate::{CtBounds, StateTranslator};

// Wire types callers see through the gateway API.
pub use lighter_api::{BridgeConfig, ColorMode, Group, Groups, Light, LightState, Lights, SceneRef};
