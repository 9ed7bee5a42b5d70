//! Raw field values coming from the front-end or a config section.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigResult};

/// A single form value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
        }
    }

    fn from_toml(value: &toml::Value) -> Option<Self> {
        match value {
            toml::Value::String(s) => Some(FieldValue::Text(s.clone())),
            toml::Value::Integer(i) => Some(FieldValue::Int(*i)),
            toml::Value::Float(f) => Some(FieldValue::Float(*f)),
            toml::Value::Boolean(b) => Some(FieldValue::Bool(*b)),
            _ => None,
        }
    }

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(FieldValue::Text(s.clone())),
            serde_json::Value::Bool(b) => Some(FieldValue::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(FieldValue::Int)
                .or_else(|| n.as_f64().map(FieldValue::Float)),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Named form values for one driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldValues {
    values: BTreeMap<String, FieldValue>,
}

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed values from a driver's config section.
    ///
    /// Arrays, tables and datetimes have no form counterpart and are skipped.
    pub fn from_section(section: &toml::Table) -> Self {
        let values = section
            .iter()
            .filter_map(|(key, value)| match FieldValue::from_toml(value) {
                Some(v) => Some((key.clone(), v)),
                None => {
                    tracing::debug!("Skipping non-scalar config key '{}'", key);
                    None
                }
            })
            .collect();
        Self { values }
    }

    /// Seed values from a JSON object sent by a front-end.
    pub fn from_json(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        let values = object
            .iter()
            .filter_map(|(key, value)| FieldValue::from_json(value).map(|v| (key.clone(), v)))
            .collect();
        Self { values }
    }

    /// Set a value (builder pattern).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Check whether every name in `names` has a value.
    pub fn covers(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.contains(name))
    }

    /// Overlay `other` on top of these values; `other` wins on conflicts.
    pub fn overlay(mut self, other: FieldValues) -> Self {
        self.values.extend(other.values);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Typed access to [`FieldValues`] for one config section.
///
/// Every accessor fails with an error naming the section and field.
pub(crate) struct FieldReader<'a> {
    section: &'static str,
    values: &'a FieldValues,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(section: &'static str, values: &'a FieldValues) -> Self {
        Self { section, values }
    }

    fn require(&self, field: &str) -> ConfigResult<&'a FieldValue> {
        self.values
            .get(field)
            .ok_or_else(|| ConfigError::missing_field(self.section, field))
    }

    fn invalid(&self, field: &str, expected: &'static str, found: &FieldValue) -> ConfigError {
        ConfigError::invalid_field(self.section, field, expected, found.type_name())
    }

    /// Text value; may be empty.
    pub(crate) fn text(&self, field: &str) -> ConfigResult<String> {
        match self.require(field)? {
            FieldValue::Text(s) => Ok(s.clone()),
            other => Err(self.invalid(field, "text", other)),
        }
    }

    /// Text value that must not be blank. Blank counts as missing.
    pub(crate) fn non_empty_text(&self, field: &str) -> ConfigResult<String> {
        let value = self.text(field)?;
        if value.trim().is_empty() {
            return Err(ConfigError::missing_field(self.section, field));
        }
        Ok(value)
    }

    pub(crate) fn int(&self, field: &str) -> ConfigResult<i64> {
        match self.require(field)? {
            FieldValue::Int(i) => Ok(*i),
            other => Err(self.invalid(field, "integer", other)),
        }
    }

    /// Float value; integers are widened.
    pub(crate) fn float(&self, field: &str) -> ConfigResult<f64> {
        match self.require(field)? {
            FieldValue::Float(f) => Ok(*f),
            FieldValue::Int(i) => Ok(*i as f64),
            other => Err(self.invalid(field, "float", other)),
        }
    }

    /// Toggle value. Config files store some toggles as 0/1.
    pub(crate) fn flag(&self, field: &str) -> ConfigResult<bool> {
        match self.require(field)? {
            FieldValue::Bool(b) => Ok(*b),
            FieldValue::Int(0) => Ok(false),
            FieldValue::Int(1) => Ok(true),
            other => Err(self.invalid(field, "bool", other)),
        }
    }
}
