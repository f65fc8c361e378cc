//! Keyword-style estimator options.
//!
//! Backends are configured with string-keyed maps that are merged by
//! precedence. Every constructor declares the keys it accepts via
//! [`Params::ensure_known`], so a misspelled or backend-specific option
//! reaching the wrong backend fails loudly instead of being ignored.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(v) => write!(f, "{v}"),
        }
    }
}

impl ParamValue {
    /// Parse a command-line literal: booleans, then integers, then floats,
    /// falling back to a string.
    pub fn parse_literal(raw: &str) -> Self {
        match raw {
            "true" => return ParamValue::Bool(true),
            "false" => return ParamValue::Bool(false),
            _ => {}
        }
        if let Ok(v) = raw.parse::<i64>() {
            return ParamValue::Int(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            return ParamValue::Float(v);
        }
        ParamValue::Str(raw.to_string())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) -> Option<ParamValue> {
        self.0.insert(key.to_string(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge `layers` left to right; a key in a later layer replaces the
    /// same key from any earlier one.
    pub fn merged<'a>(layers: impl IntoIterator<Item = &'a Params>) -> Params {
        let mut merged = Params::new();
        for layer in layers {
            merged
                .0
                .extend(layer.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }

    /// Reject keys the estimator does not understand.
    pub fn ensure_known(&self, estimator: &str, accepted: &[&str]) -> Result<()> {
        let unknown: Vec<&str> = self
            .0
            .keys()
            .map(String::as_str)
            .filter(|key| !accepted.contains(key))
            .collect();
        if !unknown.is_empty() {
            bail!(
                "{estimator} got unexpected option(s) {}; accepted: {}",
                unknown.join(", "),
                accepted.join(", ")
            );
        }
        Ok(())
    }

    pub fn get_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.get(key) {
            None => Ok(default),
            Some(ParamValue::Float(v)) => Ok(*v),
            Some(ParamValue::Int(v)) => Ok(*v as f64),
            Some(other) => Err(type_error(key, "a number", other)),
        }
    }

    pub fn get_i64(&self, key: &str, default: i64) -> Result<i64> {
        match self.get(key) {
            None => Ok(default),
            Some(ParamValue::Int(v)) => Ok(*v),
            Some(other) => Err(type_error(key, "an integer", other)),
        }
    }

    pub fn get_usize(&self, key: &str, default: usize) -> Result<usize> {
        match self.get(key) {
            None => Ok(default),
            Some(ParamValue::Int(v)) if *v >= 0 => Ok(*v as usize),
            Some(other) => Err(type_error(key, "a non-negative integer", other)),
        }
    }

    pub fn get_opt_usize(&self, key: &str) -> Result<Option<usize>> {
        if self.contains(key) {
            self.get_usize(key, 0).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(ParamValue::Bool(v)) => Ok(*v),
            Some(other) => Err(type_error(key, "a boolean", other)),
        }
    }

    pub fn get_str<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str> {
        match self.get(key) {
            None => Ok(default),
            Some(ParamValue::Str(v)) => Ok(v.as_str()),
            Some(other) => Err(type_error(key, "a string", other)),
        }
    }

    /// Fetch a string option restricted to `choices`.
    pub fn get_choice<'a>(&'a self, key: &str, default: &'a str, choices: &[&str]) -> Result<&'a str> {
        let value = self.get_str(key, default)?;
        if !choices.contains(&value) {
            bail!(
                "invalid value {value:?} for option {key}; expected one of {}",
                choices.join(", ")
            );
        }
        Ok(value)
    }

    pub fn get_seed(&self, key: &str, default: u64) -> Result<u64> {
        Ok(self.get_i64(key, default as i64)? as u64)
    }
}

impl FromIterator<(String, ParamValue)> for Params {
    fn from_iter<T: IntoIterator<Item = (String, ParamValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn type_error(key: &str, expected: &str, found: &ParamValue) -> anyhow::Error {
    anyhow!("option {key} must be {expected}, got {found:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_win() {
        let shared = Params::new().with("a", 1).with("b", 2);
        let backend = Params::new().with("b", 3);
        let overrides = Params::new().with("b", 4);

        let merged = Params::merged([&shared, &backend, &overrides]);
        assert_eq!(merged.get("a"), Some(&ParamValue::Int(1)));
        assert_eq!(merged.get("b"), Some(&ParamValue::Int(4)));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn unknown_keys_are_reported() {
        let params = Params::new().with("n_clusters", 3).with("n_jobs", -1);
        let err = params
            .ensure_known("KMeans", &["n_clusters", "max_iter"])
            .unwrap_err();
        assert!(err.to_string().contains("n_jobs"));
    }

    #[test]
    fn typed_getters_validate() {
        let params = Params::new()
            .with("alpha", 1)
            .with("init", "random")
            .with("max_iter", -5);
        assert_eq!(params.get_f64("alpha", 0.0).unwrap(), 1.0);
        assert!(params.get_usize("max_iter", 10).is_err());
        assert!(params.get_bool("init", false).is_err());
        assert_eq!(params.get_usize("missing", 7).unwrap(), 7);
        assert!(params.get_choice("init", "random", &["k-means++"]).is_err());
    }

    #[test]
    fn literals_parse_to_narrowest_type() {
        assert_eq!(ParamValue::parse_literal("true"), ParamValue::Bool(true));
        assert_eq!(ParamValue::parse_literal("12"), ParamValue::Int(12));
        assert_eq!(ParamValue::parse_literal("0.5"), ParamValue::Float(0.5));
        assert_eq!(
            ParamValue::parse_literal("auto"),
            ParamValue::Str("auto".into())
        );
    }

    #[test]
    fn serializes_as_plain_json_object() {
        let params = Params::new().with("eps", 3).with("algorithm", "brute");
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"algorithm":"brute","eps":3}"#);
        let parsed: Params = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, params);
    }
}
