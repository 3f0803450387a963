//! Query normalization.
//!
//! Produces a canonical [`NormalizedQuery`] from raw parameters so that
//! semantically identical requests yield byte-identical cache keys.
//! `sort` keeps its order because it is meaningful; `include` and every
//! `fields[...]` entry are lexically sorted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query::canonical::stable_stringify;
use crate::query::params::{ParamValue, RawParams};

/// Normalized representation of one parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NormalizedValue {
    /// Scalar pass-through value.
    Text(String),
    /// Split list value.
    List(Vec<String>),
}

impl NormalizedValue {
    fn to_json(&self) -> Value {
        match self {
            NormalizedValue::Text(text) => Value::String(text.clone()),
            NormalizedValue::List(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

/// Canonical, key-sorted query mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedQuery(BTreeMap<String, NormalizedValue>);

impl NormalizedQuery {
    /// Raw filter expression, when present.
    pub fn filter(&self) -> Option<&str> {
        match self.0.get("filter") {
            Some(NormalizedValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Sort keys in request order.
    pub fn sort(&self) -> &[String] {
        self.list("sort")
    }

    /// Sorted include paths.
    pub fn include(&self) -> &[String] {
        self.list("include")
    }

    /// Sorted sparse fieldsets keyed by resource type.
    pub fn sparse_fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().filter_map(|(key, value)| {
            let resource = key.strip_prefix("fields[")?.strip_suffix(']')?;
            match value {
                NormalizedValue::List(items) => Some((resource, items.as_slice())),
                NormalizedValue::Text(_) => None,
            }
        })
    }

    /// Sparse fieldset requested for one resource type.
    pub fn sparse_fields_for(&self, resource: &str) -> Option<&[String]> {
        self.sparse_fields()
            .find(|(name, _)| *name == resource)
            .map(|(_, items)| items)
    }

    /// Looks up any parameter by its normalized key.
    pub fn get(&self, key: &str) -> Option<&NormalizedValue> {
        self.0.get(key)
    }

    /// Iterates all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &NormalizedValue)> {
        self.0.iter()
    }

    /// JSON form of the query.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .0
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect();
        Value::Object(map)
    }

    /// Canonical encoding used as `normalized_query_key`.
    pub fn cache_key(&self) -> String {
        stable_stringify(&self.to_json())
    }

    fn list(&self, key: &str) -> &[String] {
        match self.0.get(key) {
            Some(NormalizedValue::List(items)) => items,
            _ => &[],
        }
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect()
}

fn sorted(mut items: Vec<String>) -> Vec<String> {
    items.sort();
    items
}

fn is_list_key(key: &str) -> bool {
    key == "include" || key.starts_with("fields[")
}

/// Normalizes raw parameters into their canonical form.
pub fn normalize_query(params: &RawParams) -> NormalizedQuery {
    let mut out = BTreeMap::new();
    for (key, value) in params {
        let normalized = match value {
            ParamValue::Many(values) if key == "sort" => NormalizedValue::List(
                values
                    .iter()
                    .map(|item| item.trim().to_owned())
                    .filter(|item| !item.is_empty())
                    .collect(),
            ),
            ParamValue::Many(values) => NormalizedValue::List(sorted(values.clone())),
            ParamValue::Single(text) if key == "sort" => NormalizedValue::List(split_list(text)),
            ParamValue::Single(text) if is_list_key(key) => {
                NormalizedValue::List(sorted(split_list(text)))
            }
            ParamValue::Single(text) => NormalizedValue::Text(text.clone()),
        };
        out.insert(key.clone(), normalized);
    }
    NormalizedQuery(out)
}
