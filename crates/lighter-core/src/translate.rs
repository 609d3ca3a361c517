// ── State translation ──
//
// Turns human vocabulary ("on", "60%", "natural", "alert") into a
// `StateChange` a particular light or group can actually apply, given its
// reported color mode and advertised color-temperature range.

use tracing::{debug, warn};

use lighter_api::{ColorMode, Light, LightState, StateChange};

use crate::convert::{kelvin_to_hue_sat, kelvin_to_mired, kelvin_to_xy};
use crate::error::CoreError;

/// Named color temperatures, in Kelvin.
const PRESETS: &[(&str, u32)] = &[
    ("candle", 2000),
    ("warm", 2700),
    ("warm+", 3000),
    ("soft", 3500),
    ("natural", 3700),
    ("cool", 4000),
    ("day-", 5000),
    ("day", 6500),
];

const ALERT_SELECT: &str = "lselect";

// ── Color-temperature bounds ─────────────────────────────────────────

/// Inclusive mired range a resource accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtBounds {
    pub min: u16,
    pub max: u16,
}

impl CtBounds {
    /// Assumed for lights that do not advertise a range.
    pub const LIGHT_DEFAULT: Self = Self { min: 153, max: 500 };
    /// Assumed for groups whose members advertise nothing usable.
    pub const GROUP_DEFAULT: Self = Self { min: 250, max: 454 };

    pub fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    /// Advertised range of `light`, falling back to [`Self::LIGHT_DEFAULT`].
    pub fn for_light(light: &Light) -> Self {
        match (light.ctmin, light.ctmax) {
            (Some(min), Some(max)) if min <= max => Self { min, max },
            _ => Self::LIGHT_DEFAULT,
        }
    }

    /// Intersection of the ranges the `members` advertise.
    pub fn for_group<'a>(members: impl IntoIterator<Item = &'a Light>) -> Self {
        let mut bounds: Option<Self> = None;
        for light in members {
            let (Some(min), Some(max)) = (light.ctmin, light.ctmax) else {
                continue;
            };
            bounds = Some(match bounds {
                None => Self { min, max },
                Some(acc) => Self {
                    min: acc.min.max(min),
                    max: acc.max.min(max),
                },
            });
        }
        match bounds {
            Some(b) if b.min <= b.max => b,
            _ => Self::GROUP_DEFAULT,
        }
    }

    fn clamp(self, mired: u16) -> u16 {
        if mired < self.min {
            warn!(
                requested = mired,
                minimum = self.min,
                "cannot set color temperature below the device minimum"
            );
            self.min
        } else if mired > self.max {
            warn!(
                requested = mired,
                maximum = self.max,
                "cannot set color temperature above the device maximum"
            );
            self.max
        } else {
            mired
        }
    }
}

// ── Tokens ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    On,
    Off,
    Brightness(u8),
    Kelvin(u32),
    Alert,
}

fn parse_token(raw: &str) -> Result<Token, CoreError> {
    let unrecognized = || CoreError::UnrecognizedToken {
        token: raw.to_owned(),
    };

    match raw {
        "on" => return Ok(Token::On),
        "off" | "0" | "0%" => return Ok(Token::Off),
        "alert" => return Ok(Token::Alert),
        _ => {}
    }

    if let Some(&(_, kelvin)) = PRESETS.iter().find(|(name, _)| *name == raw) {
        return Ok(Token::Kelvin(kelvin));
    }

    if let Some(percent) = raw.strip_suffix('%') {
        let percent: u32 = percent.parse().map_err(|_| unrecognized())?;
        if percent > 100 {
            return Err(unrecognized());
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bri = (255.0 * f64::from(percent) / 100.0).round() as u8;
        return Ok(Token::Brightness(bri));
    }

    if let Some(kelvin) = raw.strip_suffix(['k', 'K']) {
        return match kelvin.parse::<u32>() {
            Ok(k) if k > 0 => Ok(Token::Kelvin(k)),
            _ => Err(unrecognized()),
        };
    }

    Err(unrecognized())
}

/// What the caller asked for once every token is consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Intent {
    on: bool,
    bri: Option<u8>,
    kelvin: Option<u32>,
    alert: bool,
}

impl Intent {
    fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Self, CoreError> {
        let mut intent = Self {
            on: true,
            bri: None,
            kelvin: None,
            alert: false,
        };
        for token in tokens {
            match parse_token(token.as_ref())? {
                Token::On => intent.on = true,
                Token::Off => intent.on = false,
                Token::Brightness(bri) => intent.bri = Some(bri),
                Token::Kelvin(kelvin) => intent.kelvin = Some(kelvin),
                Token::Alert => intent.alert = true,
            }
        }
        Ok(intent)
    }
}

// ── Translator ───────────────────────────────────────────────────────

/// Computes per-resource payloads from token lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateTranslator {
    /// Tenths of a second, attached to every color-capable payload.
    pub transition_time: u16,
}

impl StateTranslator {
    pub fn new(transition_time: u16) -> Self {
        Self { transition_time }
    }

    /// Translate `tokens` for a resource currently in `current`.
    ///
    /// A resource without a `colormode` is a plain switch and only ever
    /// receives `{on}`. Otherwise switching a lit resource off is encoded as
    /// brightness zero, and a requested temperature is converted into the
    /// representation the resource is currently using.
    pub fn translate<S: AsRef<str>>(
        &self,
        current: &LightState,
        bounds: CtBounds,
        tokens: &[S],
    ) -> Result<StateChange, CoreError> {
        let intent = Intent::from_tokens(tokens)?;

        let Some(mode) = current.colormode else {
            return Ok(StateChange {
                on: Some(intent.on),
                ..StateChange::default()
            });
        };

        let mut change = StateChange {
            on: Some(intent.on),
            bri: intent.bri,
            transitiontime: Some(self.transition_time),
            ..StateChange::default()
        };

        if current.on == Some(true) && !intent.on {
            change.on = None;
            change.bri = Some(0);
        }

        if intent.alert {
            change.alert = Some(ALERT_SELECT.to_owned());
        }

        if let Some(kelvin) = intent.kelvin {
            match mode {
                ColorMode::Ct => change.ct = Some(bounds.clamp(kelvin_to_mired(kelvin))),
                ColorMode::Hs => {
                    let (hue, sat) = kelvin_to_hue_sat(kelvin);
                    change.hue = Some(hue);
                    change.sat = Some(sat);
                }
                ColorMode::Xy => change.xy = Some(kelvin_to_xy(kelvin)),
                ColorMode::Other => {
                    warn!(kelvin, "color mode cannot represent a temperature, ignoring it");
                }
            }
        }

        debug!(?change, "translated light state");
        Ok(change)
    }

    /// Payload that re-applies a captured state.
    ///
    /// Read-only fields (`alert`, `reachable`, `effect`, `colormode`) are
    /// dropped, and only the color fields of the recorded mode are kept.
    pub fn restore(&self, captured: &LightState) -> StateChange {
        let mut change = StateChange {
            on: captured.on,
            bri: captured.bri,
            transitiontime: Some(self.transition_time),
            ..StateChange::default()
        };
        match captured.colormode {
            Some(ColorMode::Ct) => change.ct = captured.ct,
            Some(ColorMode::Hs) => {
                change.hue = captured.hue;
                change.sat = captured.sat;
            }
            Some(ColorMode::Xy) => change.xy = captured.xy,
            Some(ColorMode::Other) | None => {}
        }
        change
    }
}
