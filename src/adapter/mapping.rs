//! Resource mapping documents.
//!
//! A [`MappingDocument`] is what callers write; [`PreparedMapping`] is the
//! validated, quoted form every compile function works on. Preparation is
//! pure and the prepared value is immutable, so one instance can be shared
//! across threads and compilations.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::error::{AdapterError, AdapterResult};

/// The single supported dialect profile.
pub const DIALECT_PROFILE: &str = "postgresql-v1-core";

/// Adapter-side budgets, independent of the compiler limits.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AdapterLimits {
    /// Filter clauses per statement.
    pub max_predicates: usize,
    /// Projected columns.
    pub max_selected_columns: usize,
    /// ORDER BY keys.
    pub max_order_by_keys: usize,
    /// Fragments combined by one assemble call.
    pub max_fragment_count: usize,
    /// Text length of one fragment.
    pub max_fragment_text_length: usize,
    /// Values carried by one fragment.
    pub max_fragment_values: usize,
    /// Final statement length.
    pub max_sql_text_length: usize,
    /// Final bound value count.
    pub max_bound_values: usize,
}

impl Default for AdapterLimits {
    fn default() -> Self {
        Self {
            max_predicates: 200,
            max_selected_columns: 100,
            max_order_by_keys: 25,
            max_fragment_count: 8,
            max_fragment_text_length: 100_000,
            max_fragment_values: 10_000,
            max_sql_text_length: 250_000,
            max_bound_values: 50_000,
        }
    }
}

impl AdapterLimits {
    fn resolve(raw: &BTreeMap<String, Value>) -> AdapterResult<Self> {
        let mut limits = Self::default();
        let slots: [(&str, &mut usize); 8] = [
            ("max_predicates", &mut limits.max_predicates),
            ("max_selected_columns", &mut limits.max_selected_columns),
            ("max_order_by_keys", &mut limits.max_order_by_keys),
            ("max_fragment_count", &mut limits.max_fragment_count),
            ("max_fragment_text_length", &mut limits.max_fragment_text_length),
            ("max_fragment_values", &mut limits.max_fragment_values),
            ("max_sql_text_length", &mut limits.max_sql_text_length),
            ("max_bound_values", &mut limits.max_bound_values),
        ];
        for (key, slot) in slots {
            let Some(value) = raw.get(key) else {
                continue;
            };
            *slot = value
                .as_u64()
                .filter(|number| *number > 0)
                .and_then(|number| usize::try_from(number).ok())
                .ok_or_else(|| AdapterError::InvalidMappingShape {
                    path: format!("limits.{key}"),
                    reason: "limit must be a positive integer",
                })?;
        }
        Ok(limits)
    }
}

/// Resource section of a mapping document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceDocument {
    /// Table identifier, optionally schema-qualified.
    #[serde(default)]
    pub table: Option<String>,
    /// JSON:API resource type, used to find `fields[<type>]`.
    #[serde(rename = "type", default)]
    pub resource_type: Option<String>,
}

/// One field entry of a mapping document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FieldDocument {
    /// `column` or `expression`.
    #[serde(default)]
    pub kind: Option<String>,
    /// Column identifier for `column` fields.
    #[serde(default)]
    pub column: Option<String>,
    /// SQL text for `expression` fields.
    #[serde(default)]
    pub sql: Option<String>,
    /// Must be `true` for `expression` fields.
    #[serde(default)]
    pub trusted: Option<bool>,
    /// Stable identifier reported in fragment metadata.
    #[serde(default)]
    pub expression_id: Option<String>,
}

/// Caller-authored mapping document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MappingDocument {
    /// Optional mapping version.
    #[serde(default)]
    pub version: Option<String>,
    /// Optional content hash.
    #[serde(default)]
    pub hash: Option<String>,
    /// Requested dialect profile; defaults to [`DIALECT_PROFILE`].
    #[serde(default)]
    pub dialect_profile: Option<String>,
    /// Resource identity.
    #[serde(default)]
    pub resource: Option<ResourceDocument>,
    /// Field mappings keyed by plan field name.
    #[serde(default)]
    pub fields: Option<BTreeMap<String, FieldDocument>>,
    /// Projection used when the plan has no sparse fieldset.
    #[serde(default)]
    pub default_select: Option<Value>,
    /// Limit overrides.
    #[serde(default)]
    pub limits: Option<BTreeMap<String, Value>>,
}

/// Physical SQL for one field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldSql {
    /// Quoted column identifier.
    Column {
        /// Quoted SQL text.
        sql: String,
    },
    /// Trusted SQL expression.
    Expression {
        /// Trimmed SQL text.
        sql: String,
        /// Identifier reported in fragment metadata.
        expression_id: Option<String>,
    },
}

impl FieldSql {
    /// SQL text to splice in.
    pub fn sql(&self) -> &str {
        match self {
            FieldSql::Column { sql } | FieldSql::Expression { sql, .. } => sql,
        }
    }

    /// Expression id, for expression fields that declare one.
    pub fn expression_id(&self) -> Option<&str> {
        match self {
            FieldSql::Column { .. } => None,
            FieldSql::Expression { expression_id, .. } => expression_id.as_deref(),
        }
    }
}

/// Validated mapping.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PreparedMapping {
    version: String,
    hash: String,
    table: String,
    resource_type: String,
    fields: BTreeMap<String, FieldSql>,
    default_select: Option<Vec<String>>,
    limits: AdapterLimits,
}

impl PreparedMapping {
    /// Mapping version, empty when not supplied.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Mapping hash, empty when not supplied.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Quoted table identifier.
    pub fn table_sql(&self) -> &str {
        &self.table
    }

    /// Resource type.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Field lookup.
    pub fn field(&self, name: &str) -> Option<&FieldSql> {
        self.fields.get(name)
    }

    /// Default projection: `default_select`, else every mapped field.
    pub fn default_projection(&self) -> Vec<String> {
        match &self.default_select {
            Some(list) => list.clone(),
            None => self.fields.keys().cloned().collect(),
        }
    }

    /// Resolved limits.
    pub fn limits(&self) -> &AdapterLimits {
        &self.limits
    }
}

/// Anything that can yield a prepared mapping.
///
/// A [`PreparedMapping`] yields itself without copying, so re-preparing is a
/// no-op.
pub trait MappingSource {
    /// Returns the prepared form.
    fn prepared(&self) -> AdapterResult<Cow<'_, PreparedMapping>>;
}

impl MappingSource for PreparedMapping {
    fn prepared(&self) -> AdapterResult<Cow<'_, PreparedMapping>> {
        Ok(Cow::Borrowed(self))
    }
}

impl MappingSource for MappingDocument {
    fn prepared(&self) -> AdapterResult<Cow<'_, PreparedMapping>> {
        prepare_mapping(self).map(Cow::Owned)
    }
}

impl MappingSource for Value {
    fn prepared(&self) -> AdapterResult<Cow<'_, PreparedMapping>> {
        prepare_mapping_json(self).map(Cow::Owned)
    }
}

/// Returns the prepared form of any mapping source.
pub fn ensure_prepared_mapping<M: MappingSource + ?Sized>(
    mapping: &M,
) -> AdapterResult<Cow<'_, PreparedMapping>> {
    mapping.prepared()
}

/// Quoted table identifier for `assemble_select_sql`.
pub fn get_table_sql<M: MappingSource + ?Sized>(mapping: &M) -> AdapterResult<String> {
    Ok(mapping.prepared()?.table_sql().to_owned())
}

fn identifier_segment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"))
}

fn shape(path: impl Into<String>, reason: &'static str) -> AdapterError {
    AdapterError::InvalidMappingShape {
        path: path.into(),
        reason,
    }
}

/// Quotes a validated identifier per dotted segment.
pub fn quote_identifier(path: &str, identifier: &str) -> AdapterResult<String> {
    if identifier.is_empty() {
        return Err(shape(path, "identifier must be a non-empty string"));
    }
    let segments: Vec<&str> = identifier.split('.').collect();
    if segments
        .iter()
        .any(|segment| !identifier_segment().is_match(segment))
    {
        return Err(shape(path, "identifier contains unsupported characters"));
    }
    Ok(segments
        .iter()
        .map(|segment| format!("\"{segment}\""))
        .collect::<Vec<_>>()
        .join("."))
}

fn prepare_field(name: &str, doc: &FieldDocument) -> AdapterResult<FieldSql> {
    let path = format!("fields.{name}");
    if !identifier_segment().is_match(name) {
        return Err(shape(path, "field name contains unsupported characters"));
    }
    match doc.kind.as_deref() {
        Some("column") => {
            let column = doc.column.as_deref().unwrap_or_default();
            Ok(FieldSql::Column {
                sql: quote_identifier(&format!("{path}.column"), column)?,
            })
        }
        Some("expression") => {
            if doc.trusted != Some(true) {
                return Err(shape(path, "expression mappings require trusted=true"));
            }
            let sql = doc.sql.as_deref().map(str::trim).unwrap_or_default();
            if sql.is_empty() {
                return Err(shape(path, "expression mapping requires sql text"));
            }
            let expression_id = doc
                .expression_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_owned);
            Ok(FieldSql::Expression {
                sql: sql.to_owned(),
                expression_id,
            })
        }
        _ => Err(shape(path, "field mapping kind is not supported")),
    }
}

/// Validates a mapping document.
pub fn prepare_mapping(doc: &MappingDocument) -> AdapterResult<PreparedMapping> {
    let profile = doc
        .dialect_profile
        .as_deref()
        .map(str::trim)
        .unwrap_or(DIALECT_PROFILE);
    if profile != DIALECT_PROFILE {
        return Err(AdapterError::FeatureNotSupported {
            feature: "dialect_profile",
        });
    }

    let resource = doc
        .resource
        .as_ref()
        .ok_or_else(|| shape("resource", "resource mapping is required"))?;
    let table = quote_identifier(
        "resource.table",
        resource.table.as_deref().unwrap_or_default(),
    )?;
    let resource_type = resource
        .resource_type
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if resource_type.is_empty() {
        return Err(shape("resource.type", "resource type is required"));
    }

    let raw_fields = doc
        .fields
        .as_ref()
        .ok_or_else(|| shape("fields", "fields mapping is required"))?;
    if raw_fields.is_empty() {
        return Err(shape("fields", "fields mapping must not be empty"));
    }
    let fields = raw_fields
        .iter()
        .map(|(name, field)| Ok((name.clone(), prepare_field(name, field)?)))
        .collect::<AdapterResult<BTreeMap<_, _>>>()?;

    let default_select = match &doc.default_select {
        None => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect(),
        ),
        Some(_) => return Err(shape("default_select", "default_select must be an array")),
    };

    let limits = match &doc.limits {
        Some(raw) => AdapterLimits::resolve(raw)?,
        None => AdapterLimits::default(),
    };

    Ok(PreparedMapping {
        version: doc.version.clone().unwrap_or_default(),
        hash: doc.hash.clone().unwrap_or_default(),
        table,
        resource_type: resource_type.to_owned(),
        fields,
        default_select,
        limits,
    })
}

/// Decodes and validates a JSON mapping document.
pub fn prepare_mapping_json(value: &Value) -> AdapterResult<PreparedMapping> {
    if !value.is_object() {
        return Err(shape("mapping", "mapping must be an object"));
    }
    let doc: MappingDocument = serde_json::from_value(value.clone())
        .map_err(|_| shape("mapping", "mapping document has an invalid shape"))?;
    prepare_mapping(&doc)
}
