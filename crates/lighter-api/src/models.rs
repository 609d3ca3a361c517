// Gateway wire models
//
// Loosely-typed where the gateway varies by firmware: every resource keeps
// unknown fields in `extra` so nothing is silently dropped when a snapshot
// is captured and later re-applied.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lights keyed by their string-encoded integer identifier, in gateway order.
pub type Lights = IndexMap<String, Light>;

/// Groups keyed by their string-encoded integer identifier, in gateway order.
pub type Groups = IndexMap<String, Group>;

// ── Color mode ───────────────────────────────────────────────────────

/// The color representation a light (or group action) is currently using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Color temperature, in mired.
    Ct,
    /// Hue and saturation.
    Hs,
    /// CIE xy chromaticity.
    Xy,
    /// Anything newer firmware reports that we do not translate into.
    #[serde(other)]
    Other,
}

// ── Lights ───────────────────────────────────────────────────────────

/// Reported state of a light, or the last action of a group.
///
/// Fields absent from the gateway payload stay `None`; a light without a
/// `colormode` is a plain on/off device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LightState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sat: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colormode: Option<ColorMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reachable: Option<bool>,
}

/// A light (or switchable plug) known to the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub name: String,

    /// Device class, e.g. `"Color temperature light"` or `"On/Off plug-in unit"`.
    #[serde(rename = "type", default)]
    pub light_type: String,

    #[serde(default)]
    pub state: LightState,

    /// Lowest accepted color temperature, in mired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctmin: Option<u16>,

    /// Highest accepted color temperature, in mired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctmax: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modelid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturername: Option<String>,

    /// All remaining fields the gateway sends.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Groups & scenes ──────────────────────────────────────────────────

/// Aggregated on/off summary of a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupState {
    #[serde(default)]
    pub all_on: bool,
    #[serde(default)]
    pub any_on: bool,
}

/// Scene reference as listed inside a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneRef {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lightcount: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transitiontime: Option<u32>,
}

/// A group of lights, owning zero or more scenes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,

    /// Member light identifiers.
    #[serde(default)]
    pub lights: Vec<String>,

    #[serde(default)]
    pub hidden: bool,

    /// Last action applied to the whole group; carries the group color mode.
    #[serde(default)]
    pub action: LightState,

    #[serde(default)]
    pub state: GroupState,

    #[serde(default)]
    pub scenes: Vec<SceneRef>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub group_type: Option<String>,

    /// All remaining fields the gateway sends.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Gateway configuration ────────────────────────────────────────────

/// One issued API credential, as listed in the gateway whitelist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    #[serde(default)]
    pub name: Option<String>,

    /// Naive UTC timestamp, e.g. `"2020-03-01T18:04:11"`.
    #[serde(rename = "last use date", default)]
    pub last_use_date: Option<String>,

    #[serde(rename = "create date", default)]
    pub create_date: Option<String>,
}

/// Gateway configuration (`GET /api/<key>/config`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub apiversion: Option<String>,

    #[serde(default)]
    pub swversion: Option<String>,

    /// Port of the notification websocket.
    #[serde(default)]
    pub websocketport: Option<u16>,

    #[serde(default)]
    pub whitelist: IndexMap<String, WhitelistEntry>,

    /// All remaining fields the gateway sends.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Write payloads ───────────────────────────────────────────────────

/// State change sent to a light, a group action, or a scene light slot.
///
/// Only populated fields are serialized, so the gateway leaves everything
/// else untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sat: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    /// Tenths of a second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transitiontime: Option<u16>,
}

/// Partial group update; `None` fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lights: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

impl GroupAttributes {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.lights.is_none() && self.hidden.is_none()
    }
}

// ── Write responses ──────────────────────────────────────────────────

/// Error detail the gateway attaches to a rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(rename = "type")]
    pub code: i64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub description: String,
}

/// One entry of the per-field result array returned by writes.
///
/// `{"success": {"/lights/1/state/on": true}}` or
/// `{"error": {"type": 7, "address": "...", "description": "..."}}`.
/// Deletions answer with a bare string: `{"success": "/... deleted."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteResult {
    Success(Value),
    Error(ApiErrorDetail),
}
