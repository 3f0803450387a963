//! Policy and context documents.
//!
//! Both are supplied by the host per compilation and treated as read-only.
//! Decoding is lenient where the pipeline has a fallback (unknown field
//! types, missing sections, limits) so that validation failures surface as
//! catalog error codes instead of decode failures.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CompileError, Result};

/// Policy version used when the document omits one.
pub const DEFAULT_POLICY_VERSION: &str = "v0";
/// Binding key used when the security predicate omits one.
pub const DEFAULT_BOUND_PARAMETER_KEY: &str = "tenant_scope";

/// Query policy for one resource.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Policy {
    /// Policy version, part of every cache key.
    #[serde(default)]
    pub version: Option<String>,
    /// Filterable field schema keyed by field name.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
    /// Allowlists for include/sort/sparse fieldsets.
    #[serde(default)]
    pub query_dimensions: QueryDimensions,
    /// Raw limit overrides, resolved by [`crate::query::limits::Limits::resolve`].
    #[serde(default)]
    pub limits: BTreeMap<String, Value>,
    /// Optional artifact hardening switches.
    #[serde(default)]
    pub security: Option<SecurityPolicy>,
}

impl Policy {
    /// Version string with the default applied.
    pub fn version(&self) -> &str {
        self.version
            .as_deref()
            .filter(|version| !version.is_empty())
            .unwrap_or(DEFAULT_POLICY_VERSION)
    }

    /// Hardening settings, defaulted when absent.
    pub fn security(&self) -> SecurityPolicy {
        self.security.clone().unwrap_or_default()
    }
}

/// Declared scalar types.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    /// Signed 64-bit integer.
    Int,
    /// Finite double.
    Float,
    /// `true` / `false`.
    Bool,
    /// Calendar date `YYYY-MM-DD`.
    Date,
    /// ISO-8601 timestamp with offset.
    Datetime,
    /// RFC 4122 UUID, versions 1 to 5.
    Uuid,
    /// One of `enum_values`.
    Enum,
    /// Free text.
    String,
}

impl ScalarType {
    /// Parses the policy spelling of a type.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "int" => ScalarType::Int,
            "float" => ScalarType::Float,
            "bool" => ScalarType::Bool,
            "date" => ScalarType::Date,
            "datetime" => ScalarType::Datetime,
            "uuid" => ScalarType::Uuid,
            "enum" => ScalarType::Enum,
            "string" => ScalarType::String,
            _ => return None,
        })
    }

    /// Policy spelling of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Int => "int",
            ScalarType::Float => "float",
            ScalarType::Bool => "bool",
            ScalarType::Date => "date",
            ScalarType::Datetime => "datetime",
            ScalarType::Uuid => "uuid",
            ScalarType::Enum => "enum",
            ScalarType::String => "string",
        }
    }
}

/// Schema entry for one field.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FieldDef {
    /// Declared type name; unknown names fail type checking.
    #[serde(rename = "type", default)]
    pub field_type: String,
    /// Field may appear in filters.
    #[serde(default)]
    pub filterable: bool,
    /// Field may appear in sparse fieldsets.
    #[serde(default)]
    pub selectable: bool,
    /// Field may appear in sort keys.
    #[serde(default)]
    pub sortable: bool,
    /// Field is explicitly marked sensitive.
    #[serde(default)]
    pub sensitive: bool,
    /// Allowed operator tokens.
    #[serde(default)]
    pub operators: Vec<String>,
    /// Allowed values for `enum` fields.
    #[serde(default)]
    pub enum_values: Vec<String>,
    /// Wildcard matching settings.
    #[serde(default)]
    pub wildcard: Option<WildcardPolicy>,
    /// Any other keys, kept for artifact validation.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl FieldDef {
    /// Declared type, if recognized.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        ScalarType::parse(&self.field_type)
    }

    /// Whether `operator` appears in the allowed list.
    pub fn allows_operator(&self, operator: &str) -> bool {
        self.operators.iter().any(|allowed| allowed == operator)
    }
}

/// Wildcard settings for a string field.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WildcardPolicy {
    /// Master switch; wildcards are rejected unless true.
    #[serde(default)]
    pub enabled: bool,
    /// Allowed modes (`contains`, `starts_with`, `ends_with`); empty allows all.
    #[serde(default)]
    pub modes: Vec<String>,
    /// Match case-sensitively (default true).
    #[serde(default)]
    pub case_sensitive: Option<bool>,
    /// Minimum length of the non-wildcard part.
    #[serde(default)]
    pub min_value_length: Option<usize>,
    /// Maximum length of the non-wildcard part.
    #[serde(default)]
    pub max_value_length: Option<usize>,
}

/// Include/sort/sparse-field allowlists.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryDimensions {
    /// Includable relationship paths.
    #[serde(default)]
    pub include_allowlist: Vec<String>,
    /// Sortable field names (without `-`).
    #[serde(default)]
    pub sortable_fields: Vec<String>,
    /// Selectable fields per resource type.
    #[serde(default)]
    pub fields_allowlist: BTreeMap<String, Vec<String>>,
}

/// Artifact hardening switches.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// Scan field definitions for write flags and sensitive exposure.
    #[serde(default)]
    pub validate_artifacts: bool,
    /// Report `unknown_field` as `field_not_allowed`.
    #[serde(default)]
    pub hardened_mode: bool,
    /// Name patterns treated as sensitive; empty uses the defaults.
    #[serde(default)]
    pub sensitive_field_deny_patterns: Vec<String>,
    /// Match field names against the deny patterns (default true).
    #[serde(default)]
    pub use_name_heuristics: Option<bool>,
}

/// Caller-supplied compilation context.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompileContext {
    /// Whether a tenant context was established upstream.
    #[serde(default)]
    pub tenant_context_present: bool,
    /// Mandatory row-level security predicate.
    #[serde(default)]
    pub security_predicate: Option<SecurityPredicateSpec>,
    /// Opaque hash of the caller's auth context.
    #[serde(default)]
    pub auth_context_hash: Option<String>,
}

/// Security predicate as supplied by the caller; may be incomplete.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SecurityPredicateSpec {
    /// Column-level field the predicate constrains.
    #[serde(default)]
    pub field: Option<String>,
    /// Comparison operator token.
    #[serde(default)]
    pub operator: Option<String>,
    /// Key the adapter resolves the bound value from.
    #[serde(default)]
    pub bound_parameter_key: Option<String>,
}

/// Validated security predicate. Only obtainable through
/// [`SecurityPredicate::from_context`] inside the compiler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPredicate {
    /// Constrained field.
    pub field: String,
    /// Comparison operator token.
    pub operator: String,
    /// Binding key for the adapter.
    pub bound_parameter_key: String,
}

impl SecurityPredicate {
    /// Extracts the predicate, failing closed when `field` or `operator` is missing.
    pub fn from_context(context: &CompileContext) -> Result<Self> {
        let spec = context
            .security_predicate
            .as_ref()
            .ok_or(CompileError::SecurityPredicateRequired)?;
        let non_empty = |value: &Option<String>| value.clone().filter(|text| !text.is_empty());
        let field = non_empty(&spec.field).ok_or(CompileError::SecurityPredicateRequired)?;
        let operator = non_empty(&spec.operator).ok_or(CompileError::SecurityPredicateRequired)?;
        let bound_parameter_key = non_empty(&spec.bound_parameter_key)
            .unwrap_or_else(|| DEFAULT_BOUND_PARAMETER_KEY.to_owned());
        Ok(Self {
            field,
            operator,
            bound_parameter_key,
        })
    }
}
