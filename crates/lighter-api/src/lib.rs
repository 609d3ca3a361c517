// lighter-api: Async Rust client for a deCONZ-style lighting gateway (REST + websocket)

mod auth;
pub mod client;
pub mod error;
mod groups;
mod lights;
pub mod models;
pub mod transport;
pub mod websocket;

pub use client::{Fetched, GatewayClient};
pub use error::Error;
pub use models::{
    ApiErrorDetail, BridgeConfig, ColorMode, Group, GroupAttributes, GroupState, Groups, Light,
    LightState, Lights, SceneRef, StateChange, WhitelistEntry, WriteResult,
};
pub use transport::TransportConfig;
pub use websocket::{GatewayEvent, NotificationHandle, ReconnectConfig};
