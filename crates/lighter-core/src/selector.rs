// ── Identifier resolution ──
//
// A `Selector` is parsed once from whatever the user typed and then only
// ever asked `matches(id, name)`. Literal integers address the gateway's
// string-encoded identifiers, plain strings match names case-insensitively,
// and `/.../` strings are case-insensitive patterns anchored at the start
// of the name.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use tracing::debug;

use lighter_api::{Group, Light, SceneRef};

use crate::error::CoreError;

/// A resolved matching strategy for lights, groups or scenes.
#[derive(Debug, Clone, Default)]
pub enum Selector {
    /// Matches everything.
    #[default]
    All,
    /// Matches the resource whose identifier equals this integer.
    Id(u64),
    /// Matches names equal to this (lower-cased) value, ignoring case.
    Name(String),
    /// Matches names the pattern matches from their first character.
    Pattern {
        source: String,
        regex: Regex,
    },
}

impl Selector {
    /// Resolve an optional raw identifier; `None` selects everything.
    pub fn resolve(raw: Option<&str>) -> Result<Self, CoreError> {
        raw.map_or(Ok(Self::All), str::parse)
    }

    /// `true` if a resource with this identifier and name is selected.
    pub fn matches(&self, id: &str, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Id(wanted) => id.trim().parse::<u64>().is_ok_and(|id| id == *wanted),
            Self::Name(wanted) => name.to_lowercase() == *wanted,
            Self::Pattern { regex, .. } => regex.is_match(name),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Keep the entries of `items` this selector matches, in their order.
    ///
    /// `what` names the collection in the debug log ("lights", "groups").
    pub fn select<T: Clone>(&self, items: &IndexMap<String, T>, what: &str) -> IndexMap<String, T>
    where
        T: Named,
    {
        let selected: IndexMap<String, T> = items
            .iter()
            .filter(|(id, item)| self.matches(id, item.name()))
            .map(|(id, item)| (id.clone(), item.clone()))
            .collect();
        debug!(
            selector = %self,
            "{} out of {} {what} selected",
            selected.len(),
            items.len()
        );
        selected
    }

    /// Keep the scenes this selector matches, in their order.
    pub fn select_scenes<'a>(&self, scenes: &'a [SceneRef]) -> Vec<&'a SceneRef> {
        let selected: Vec<&SceneRef> = scenes
            .iter()
            .filter(|scene| self.matches(&scene.id, &scene.name))
            .collect();
        debug!(
            selector = %self,
            "{} out of {} scenes selected",
            selected.len(),
            scenes.len()
        );
        selected
    }
}

impl FromStr for Selector {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = raw.trim().parse::<u64>() {
            return Ok(Self::Id(id));
        }

        if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
            let source = &raw[1..raw.len() - 1];
            let regex = RegexBuilder::new(&format!("^(?:{source})"))
                .case_insensitive(true)
                .build()
                .map_err(|e| CoreError::InvalidSelector {
                    selector: raw.to_owned(),
                    source: e,
                })?;
            return Ok(Self::Pattern {
                source: source.to_owned(),
                regex,
            });
        }

        Ok(Self::Name(raw.to_lowercase()))
    }
}

impl From<u64> for Selector {
    fn from(id: u64) -> Self {
        Self::Id(id)
    }
}

impl From<u32> for Selector {
    fn from(id: u32) -> Self {
        Self::Id(u64::from(id))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name:?}"),
            Self::Pattern { source, .. } => write!(f, "/{source}/"),
        }
    }
}

// ── Named resources ──────────────────────────────────────────────────

/// Anything a selector can match by name.
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for Light {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Group {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lights(names: &[(&str, &str)]) -> IndexMap<String, Light> {
        names
            .iter()
            .map(|(id, name)| {
                (
                    (*id).to_owned(),
                    Light {
                        name: (*name).to_owned(),
                        ..Light::default()
                    },
                )
            })
            .collect()
    }

    #[test]
    fn integer_strings_become_ids() {
        assert!(matches!("5".parse::<Selector>().unwrap(), Selector::Id(5)));
        assert!(matches!(Selector::from(7_u32), Selector::Id(7)));
    }

    #[test]
    fn none_selects_everything() {
        let selector = Selector::resolve(None).unwrap();
        assert!(selector.is_all());
        assert!(selector.matches("1", "anything"));
    }

    #[test]
    fn names_match_case_insensitively() {
        let selector: Selector = "Office".parse().unwrap();
        assert!(selector.matches("1", "office"));
        assert!(selector.matches("2", "OFFICE"));
        assert!(!selector.matches("3", "Office 2"));
    }

    #[test]
    fn ids_compare_numerically() {
        let selector: Selector = "5".parse().unwrap();
        assert!(selector.matches("5", "Desk"));
        assert!(selector.matches("05", "Desk"));
        assert!(!selector.matches("50", "Desk"));
        assert!(!selector.matches("not-a-number", "5"));
    }

    #[test]
    fn patterns_match_from_the_start() {
        let selector: Selector = "/abc/".parse().unwrap();
        assert!(selector.matches("1", "abcdef"));
        assert!(selector.matches("1", "ABCdef"));
        assert!(!selector.matches("1", "xabc"));
    }

    #[test]
    fn alternation_is_anchored_as_a_whole() {
        let selector: Selector = "/desk|hall/".parse().unwrap();
        assert!(selector.matches("1", "Hall light"));
        assert!(!selector.matches("1", "big hall"));
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        let err = "/[unclosed/".parse::<Selector>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidSelector { selector, .. } if selector == "/[unclosed/"));
    }

    #[test]
    fn lone_slash_is_a_name() {
        assert!(matches!("/".parse::<Selector>().unwrap(), Selector::Name(n) if n == "/"));
    }

    #[test]
    fn select_preserves_collection_order() {
        let all = lights(&[("9", "Desk"), ("2", "Hall"), ("4", "Desk lamp")]);
        let selected = "/desk/".parse::<Selector>().unwrap().select(&all, "lights");
        let ids: Vec<&str> = selected.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["9", "4"]);
    }

    #[test]
    fn select_scenes_by_name() {
        let scenes = vec![
            SceneRef {
                id: "1".into(),
                name: "Relax".into(),
                ..SceneRef::default()
            },
            SceneRef {
                id: "2".into(),
                name: "Bright".into(),
                ..SceneRef::default()
            },
        ];
        let selected = "relax".parse::<Selector>().unwrap().select_scenes(&scenes);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "1");
    }
}
