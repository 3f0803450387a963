//! Type checking and strict literal coercion.
//!
//! Each flattened clause is resolved against the policy schema and every
//! literal is parsed with a non-permissive grammar for the declared type.
//! Successful literals are emitted in canonical string form.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime};
use uuid::{Uuid, Variant};

use crate::error::{CompileError, Result};
use crate::query::ast::{FilterClause, Operator};
use crate::query::policy::{FieldDef, Policy, ScalarType, WildcardPolicy};
use crate::query::security::hardened_field_errors;

/// Typed literal. Numbers, dates and UUIDs are carried as canonical strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypedValue {
    /// `null` literal (only with `==` / `!=`).
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Any other literal in canonical text form.
    Text(String),
}

impl TypedValue {
    /// JSON form used for bound parameters.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            TypedValue::Null => serde_json::Value::Null,
            TypedValue::Bool(flag) => serde_json::Value::Bool(*flag),
            TypedValue::Text(text) => serde_json::Value::String(text.clone()),
        }
    }
}

/// Wildcard placement.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WildcardMode {
    /// `*x*`
    Contains,
    /// `x*`
    StartsWith,
    /// `*x`
    EndsWith,
}

impl WildcardMode {
    /// Policy spelling of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            WildcardMode::Contains => "contains",
            WildcardMode::StartsWith => "starts_with",
            WildcardMode::EndsWith => "ends_with",
        }
    }
}

/// Resolved wildcard match for a clause.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildcardMatch {
    /// Placement of the wildcard.
    pub mode: WildcardMode,
    /// Literal part without `*`.
    pub value: String,
    /// Case-sensitive comparison.
    pub case_sensitive: bool,
}

/// Clause after type checking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedClause {
    /// Field name.
    pub field: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Coerced values.
    pub values: Vec<TypedValue>,
    /// Declared field type.
    pub expected_type: ScalarType,
    /// True when any datetime literal carried a non-`Z` offset.
    pub normalized_from_timezone: bool,
    /// Present for wildcard matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wildcard: Option<WildcardMatch>,
}

/// Named parameter group for one clause.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Synthetic key (`p1`, `p2`, ...).
    pub key: String,
    /// Index into the clause list.
    pub clause_index: usize,
    /// Field the values belong to.
    pub field: String,
    /// Bound values.
    pub values: Vec<TypedValue>,
}

/// Output of [`type_check`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypedFilter {
    /// Typed clauses in source order.
    pub clauses: Vec<TypedClause>,
    /// One binding group per clause.
    pub bindings: Vec<Binding>,
}

/// Type checks every clause against the policy schema.
pub fn type_check(clauses: &[FilterClause], policy: &Policy) -> Result<TypedFilter> {
    let hardened = hardened_field_errors(policy);
    let mut out = TypedFilter::default();
    for (index, clause) in clauses.iter().enumerate() {
        let typed = check_clause(clause, policy, hardened)?;
        out.bindings.push(Binding {
            key: format!("p{}", index + 1),
            clause_index: index,
            field: typed.field.clone(),
            values: typed.values.clone(),
        });
        out.clauses.push(typed);
    }
    Ok(out)
}

fn check_clause(clause: &FilterClause, policy: &Policy, hardened: bool) -> Result<TypedClause> {
    let field = clause.field.as_str();
    let def = policy.fields.get(field).ok_or_else(|| {
        if hardened {
            CompileError::FieldNotAllowed {
                field: field.to_owned(),
            }
        } else {
            CompileError::UnknownField {
                field: field.to_owned(),
            }
        }
    })?;
    if !def.filterable {
        return Err(CompileError::FieldNotAllowed {
            field: field.to_owned(),
        });
    }
    if !def.allows_operator(clause.operator.as_str()) {
        return Err(CompileError::OperatorNotAllowed {
            field: field.to_owned(),
            operator: clause.operator.as_str().to_owned(),
        });
    }
    let scalar = def
        .scalar_type()
        .ok_or_else(|| CompileError::ValueTypeMismatch {
            field: field.to_owned(),
            expected: def.field_type.clone(),
        })?;

    let mut typed = TypedClause {
        field: field.to_owned(),
        operator: clause.operator,
        values: Vec::with_capacity(clause.raw_values.len()),
        expected_type: scalar,
        normalized_from_timezone: false,
        wildcard: None,
    };
    for raw in &clause.raw_values {
        if raw == "null" {
            if !matches!(clause.operator, Operator::Eq | Operator::Ne) {
                return Err(mismatch(field, scalar));
            }
            typed.values.push(TypedValue::Null);
            continue;
        }
        if !is_quoted(raw) && raw.contains('*') {
            let wildcard = resolve_wildcard(field, clause.operator, scalar, def, raw)?;
            typed.values.push(TypedValue::Text(wildcard.value.clone()));
            typed.wildcard = Some(wildcard);
            continue;
        }
        let coerced = coerce(scalar, strip_quotes(raw), def).ok_or_else(|| mismatch(field, scalar))?;
        typed.normalized_from_timezone |= coerced.normalized_from_timezone;
        typed.values.push(coerced.value);
    }
    Ok(typed)
}

fn mismatch(field: &str, scalar: ScalarType) -> CompileError {
    CompileError::ValueTypeMismatch {
        field: field.to_owned(),
        expected: scalar.as_str().to_owned(),
    }
}

fn is_quoted(raw: &str) -> bool {
    raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')))
}

/// Removes one pair of matching single or double quotes.
pub fn strip_quotes(raw: &str) -> &str {
    if is_quoted(raw) {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}

fn resolve_wildcard(
    field: &str,
    operator: Operator,
    scalar: ScalarType,
    def: &FieldDef,
    raw: &str,
) -> Result<WildcardMatch> {
    if operator != Operator::Eq {
        return Err(CompileError::WildcardOperatorNotAllowed {
            field: field.to_owned(),
        });
    }
    if scalar != ScalarType::String {
        return Err(CompileError::WildcardTypeNotSupported {
            field: field.to_owned(),
        });
    }
    let policy = match def.wildcard.as_ref() {
        Some(policy) if policy.enabled => policy,
        _ => {
            return Err(CompileError::WildcardNotAllowed {
                field: field.to_owned(),
            })
        }
    };
    let invalid = || CompileError::InvalidWildcardPattern {
        field: field.to_owned(),
    };
    let (mode, value) = split_wildcard(raw).ok_or_else(invalid)?;
    if !mode_allowed(policy, mode) {
        return Err(CompileError::WildcardNotAllowed {
            field: field.to_owned(),
        });
    }
    let length = value.chars().count();
    if policy.min_value_length.is_some_and(|min| length < min)
        || policy.max_value_length.is_some_and(|max| length > max)
    {
        return Err(invalid());
    }
    Ok(WildcardMatch {
        mode,
        value: value.to_owned(),
        case_sensitive: policy.case_sensitive.unwrap_or(true),
    })
}

fn mode_allowed(policy: &WildcardPolicy, mode: WildcardMode) -> bool {
    policy.modes.is_empty() || policy.modes.iter().any(|allowed| allowed == mode.as_str())
}

fn split_wildcard(raw: &str) -> Option<(WildcardMode, &str)> {
    let leading = raw.strip_prefix('*');
    let (mode, inner) = match leading {
        Some(rest) => match rest.strip_suffix('*') {
            Some(inner) => (WildcardMode::Contains, inner),
            None => (WildcardMode::EndsWith, rest),
        },
        None => (WildcardMode::StartsWith, raw.strip_suffix('*')?),
    };
    if inner.is_empty() || inner.contains('*') {
        return None;
    }
    Some((mode, inner))
}

struct Coerced {
    value: TypedValue,
    normalized_from_timezone: bool,
}

impl From<TypedValue> for Coerced {
    fn from(value: TypedValue) -> Self {
        Self {
            value,
            normalized_from_timezone: false,
        }
    }
}

fn coerce(scalar: ScalarType, value: &str, def: &FieldDef) -> Option<Coerced> {
    match scalar {
        ScalarType::String => Some(TypedValue::Text(value.to_owned()).into()),
        ScalarType::Int => parse_int(value).map(|v| TypedValue::Text(v).into()),
        ScalarType::Float => parse_float(value).map(|v| TypedValue::Text(v).into()),
        ScalarType::Bool => parse_bool(value).map(|v| TypedValue::Bool(v).into()),
        ScalarType::Date => parse_date(value).map(|v| TypedValue::Text(v).into()),
        ScalarType::Datetime => parse_datetime(value).map(|(v, normalized)| Coerced {
            value: TypedValue::Text(v),
            normalized_from_timezone: normalized,
        }),
        ScalarType::Uuid => parse_uuid(value).map(|v| TypedValue::Text(v).into()),
        ScalarType::Enum => def
            .enum_values
            .iter()
            .any(|allowed| allowed == value)
            .then(|| TypedValue::Text(value.to_owned()).into()),
    }
}

fn int_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?(0|[1-9][0-9]*)$").expect("int pattern"))
}

fn float_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").expect("float pattern"))
}

fn date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("date pattern"))
}

fn datetime_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}(\.[0-9]{1,3})?(Z|[+-][0-9]{2}:[0-9]{2})$",
        )
        .expect("datetime pattern")
    })
}

/// Signed 64-bit integer without leading zeros.
pub fn parse_int(value: &str) -> Option<String> {
    if !int_pattern().is_match(value) {
        return None;
    }
    value.parse::<i64>().ok().map(|number| number.to_string())
}

/// Plain decimal without exponent, finite. The text is kept as sent so no
/// precision is lost before binding.
pub fn parse_float(value: &str) -> Option<String> {
    if !float_pattern().is_match(value) {
        return None;
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .map(|_| value.to_owned())
}

/// Exactly `true` or `false`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Calendar date `YYYY-MM-DD`.
pub fn parse_date(value: &str) -> Option<String> {
    if !date_pattern().is_match(value) {
        return None;
    }
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|_| value.to_owned())
}

/// ISO-8601 timestamp with a mandatory offset, normalized to UTC with
/// millisecond precision. The flag reports whether the offset was not `Z`.
pub fn parse_datetime(value: &str) -> Option<(String, bool)> {
    if !datetime_pattern().is_match(value) {
        return None;
    }
    // Rfc3339 folds `:60` into the previous second; leap seconds are rejected.
    if value.get(17..19) == Some("60") {
        return None;
    }
    let parsed = OffsetDateTime::parse(value, &Rfc3339).ok()?;
    let local = PrimitiveDateTime::new(parsed.date(), parsed.time());
    let utc = local.checked_sub(Duration::seconds(i64::from(
        parsed.offset().whole_seconds(),
    )))?;
    let text = utc
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))
        .ok()?;
    Some((text, !value.ends_with('Z')))
}

/// Hyphenated RFC 4122 UUID, versions 1 to 5, lowercased.
pub fn parse_uuid(value: &str) -> Option<String> {
    if value.len() != 36 {
        return None;
    }
    let uuid = Uuid::try_parse(value).ok()?;
    let version_ok = matches!(uuid.get_version_num(), 1..=5);
    (version_ok && uuid.get_variant() == Variant::RFC4122)
        .then(|| uuid.hyphenated().to_string())
}
