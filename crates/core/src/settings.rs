//! Settings cascade: N-way override merge of sparse configuration layers.
//!
//! Layers are applied from lowest to highest priority (global defaults,
//! selected template, series, episode, extras). A key explicitly marked
//! [`Setting::Unset`] never overwrites a lower layer; `false`, `0` and `""`
//! are ordinary values and always do.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Layer types
// ---------------------------------------------------------------------------

/// One entry of a configuration layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    /// The layer deliberately does not specify this attribute.
    Unset,
    /// An explicit value, including falsy ones.
    Value(Value),
}

impl Setting {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Unset => None,
            Self::Value(v) => Some(v),
        }
    }
}

impl From<Value> for Setting {
    /// JSON `null` is the wire representation of "unset".
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Unset,
            other => Self::Value(other),
        }
    }
}

/// Where a layer came from, in ascending priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerSource {
    GlobalDefaults,
    Template,
    Series,
    Episode,
    Extras,
}

impl LayerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GlobalDefaults => "global_defaults",
            Self::Template => "template",
            Self::Series => "series",
            Self::Episode => "episode",
            Self::Extras => "extras",
        }
    }
}

/// A sparse, immutable set of attribute overrides.
///
/// Built with the consuming `with` / `unset` builders or from a JSON object;
/// there is no way to mutate a layer once it is handed to [`merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    source: LayerSource,
    entries: BTreeMap<String, Setting>,
}

impl ConfigLayer {
    pub fn new(source: LayerSource) -> Self {
        Self {
            source,
            entries: BTreeMap::new(),
        }
    }

    /// Set `key` to an explicit value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .insert(key.into(), Setting::Value(value.into()));
        self
    }

    /// Mark `key` as explicitly unset in this layer.
    pub fn unset(mut self, key: impl Into<String>) -> Self {
        self.entries.insert(key.into(), Setting::Unset);
        self
    }

    /// Build a layer from a JSON object. `null` members become [`Setting::Unset`].
    pub fn from_json(source: LayerSource, json: &Value) -> Result<Self, CoreError> {
        match json {
            Value::Null => Ok(Self::new(source)),
            Value::Object(obj) => Ok(Self::from_map(source, obj)),
            other => Err(CoreError::Validation(format!(
                "{} layer must be a JSON object, got {other}",
                source.as_str()
            ))),
        }
    }

    pub fn from_map(source: LayerSource, obj: &Map<String, Value>) -> Self {
        let entries = obj
            .iter()
            .map(|(k, v)| (k.clone(), Setting::from(v.clone())))
            .collect();
        Self { source, entries }
    }

    pub fn source(&self) -> LayerSource {
        self.source
    }

    pub fn get(&self, key: &str) -> Option<&Setting> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Setting)> {
        self.entries.iter()
    }

    /// Keys this layer actually sets (unset entries excluded).
    pub fn values(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries
            .iter()
            .filter_map(|(k, s)| s.as_value().map(|v| (k, v)))
    }
}

// ---------------------------------------------------------------------------
// Effective configuration
// ---------------------------------------------------------------------------

/// Flat result of merging an ordered list of layers. Contains no unset entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectiveConfig {
    values: BTreeMap<String, Value>,
}

impl EffectiveConfig {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Booleans, accepting the strings `"true"`/`"false"` as written by
    /// form-based editors.
    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(Value::as_object)
    }

    pub fn require(&self, key: &str) -> Result<&Value, CoreError> {
        self.get(key)
            .ok_or_else(|| CoreError::UnresolvedAttribute(key.to_string()))
    }

    pub fn require_str(&self, key: &str) -> Result<&str, CoreError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| wrong_type(key, "a string"))
    }

    pub fn require_bool(&self, key: &str) -> Result<bool, CoreError> {
        self.require(key)?;
        self.bool(key).ok_or_else(|| wrong_type(key, "a boolean"))
    }

    pub fn require_int(&self, key: &str) -> Result<i64, CoreError> {
        self.require(key)?;
        self.int(key).ok_or_else(|| wrong_type(key, "an integer"))
    }

    pub fn require_float(&self, key: &str) -> Result<f64, CoreError> {
        self.require(key)?;
        self.float(key).ok_or_else(|| wrong_type(key, "a number"))
    }

    // -- Optional attributes: absent means `default`, wrong type is an error --

    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, CoreError> {
        if self.contains(key) {
            self.require_str(key)
        } else {
            Ok(default)
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, CoreError> {
        if self.contains(key) {
            self.require_bool(key)
        } else {
            Ok(default)
        }
    }

    pub fn int_or(&self, key: &str, default: i64) -> Result<i64, CoreError> {
        if self.contains(key) {
            self.require_int(key)
        } else {
            Ok(default)
        }
    }

    pub fn float_or(&self, key: &str, default: f64) -> Result<f64, CoreError> {
        if self.contains(key) {
            self.require_float(key)
        } else {
            Ok(default)
        }
    }

    /// Turn a merge result back into a layer, e.g. to cache resolved defaults.
    pub fn into_layer(self, source: LayerSource) -> ConfigLayer {
        ConfigLayer {
            source,
            entries: self
                .values
                .into_iter()
                .map(|(k, v)| (k, Setting::Value(v)))
                .collect(),
        }
    }
}

fn wrong_type(key: &str, expected: &str) -> CoreError {
    CoreError::Validation(format!("Attribute '{key}' must be {expected}"))
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge `layers` from lowest to highest priority.
pub fn merge(layers: &[ConfigLayer]) -> EffectiveConfig {
    merge_traced(layers).0
}

/// Merge and also report which layer supplied each winning value.
pub fn merge_traced(layers: &[ConfigLayer]) -> (EffectiveConfig, BTreeMap<String, LayerSource>) {
    let mut values = BTreeMap::new();
    let mut origins = BTreeMap::new();

    for layer in layers {
        for (key, value) in layer.values() {
            values.insert(key.clone(), value.clone());
            origins.insert(key.clone(), layer.source);
        }
    }

    (EffectiveConfig { values }, origins)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
