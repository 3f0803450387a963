#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Compiler error taxonomy.
//!
//! Every failure raised by the query pipeline is a [`CompileError`]. Each
//! variant maps onto exactly one [`ErrorCode`] from a closed catalog, and the
//! wire envelope ([`ErrorObject`]) is derived from the variant alone. Detail
//! strings are fixed templates that may interpolate a field or parameter name
//! and numeric limits, never literal values or internal state.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Convenience alias for compiler results.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Stable machine-readable compiler error codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Query string is malformed or exceeds a surface limit.
    InvalidQueryString,
    /// Filter expression does not follow the supported grammar.
    InvalidFilterSyntax,
    /// A size or complexity budget was exceeded.
    FilterComplexityExceeded,
    /// Filter references a field the policy does not declare.
    UnknownField,
    /// Field exists but may not be used this way.
    FieldNotAllowed,
    /// Operator is not in the field's allowed operator list.
    OperatorNotAllowed,
    /// Literal does not parse as the field's declared type.
    ValueTypeMismatch,
    /// Wildcard used on a field that does not enable it.
    WildcardNotAllowed,
    /// Wildcard used with an operator other than `==`.
    WildcardOperatorNotAllowed,
    /// Wildcard used on a non-string field.
    WildcardTypeNotSupported,
    /// Wildcard placement is not one of the supported shapes.
    InvalidWildcardPattern,
    /// Membership operator with an empty list.
    EmptyInListNotAllowed,
    /// Sort key is not in the sortable allowlist.
    SortNotAllowed,
    /// Include path is not in the include allowlist.
    IncludeNotAllowed,
    /// Sparse fieldset selects a field outside the allowlist.
    FieldsNotAllowed,
    /// Pagination parameter is malformed or out of range.
    PageParameterInvalid,
    /// Context carries no usable security predicate.
    SecurityPredicateRequired,
    /// Unexpected failure inside the compiler.
    InternalError,
}

impl ErrorCode {
    /// Every code in catalog order.
    pub const ALL: [ErrorCode; 18] = [
        ErrorCode::InvalidQueryString,
        ErrorCode::InvalidFilterSyntax,
        ErrorCode::FilterComplexityExceeded,
        ErrorCode::UnknownField,
        ErrorCode::FieldNotAllowed,
        ErrorCode::OperatorNotAllowed,
        ErrorCode::ValueTypeMismatch,
        ErrorCode::WildcardNotAllowed,
        ErrorCode::WildcardOperatorNotAllowed,
        ErrorCode::WildcardTypeNotSupported,
        ErrorCode::InvalidWildcardPattern,
        ErrorCode::EmptyInListNotAllowed,
        ErrorCode::SortNotAllowed,
        ErrorCode::IncludeNotAllowed,
        ErrorCode::FieldsNotAllowed,
        ErrorCode::PageParameterInvalid,
        ErrorCode::SecurityPredicateRequired,
        ErrorCode::InternalError,
    ];

    /// Snake-case wire form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidQueryString => "invalid_query_string",
            ErrorCode::InvalidFilterSyntax => "invalid_filter_syntax",
            ErrorCode::FilterComplexityExceeded => "filter_complexity_exceeded",
            ErrorCode::UnknownField => "unknown_field",
            ErrorCode::FieldNotAllowed => "field_not_allowed",
            ErrorCode::OperatorNotAllowed => "operator_not_allowed",
            ErrorCode::ValueTypeMismatch => "value_type_mismatch",
            ErrorCode::WildcardNotAllowed => "wildcard_not_allowed",
            ErrorCode::WildcardOperatorNotAllowed => "wildcard_operator_not_allowed",
            ErrorCode::WildcardTypeNotSupported => "wildcard_type_not_supported",
            ErrorCode::InvalidWildcardPattern => "invalid_wildcard_pattern",
            ErrorCode::EmptyInListNotAllowed => "empty_in_list_not_allowed",
            ErrorCode::SortNotAllowed => "sort_not_allowed",
            ErrorCode::IncludeNotAllowed => "include_not_allowed",
            ErrorCode::FieldsNotAllowed => "fields_not_allowed",
            ErrorCode::PageParameterInvalid => "page_parameter_invalid",
            ErrorCode::SecurityPredicateRequired => "security_predicate_required",
            ErrorCode::InternalError => "internal_error",
        }
    }

    /// HTTP-style status. Misconfiguration codes are 5xx, request errors 4xx.
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::SecurityPredicateRequired | ErrorCode::InternalError => 500,
            _ => 400,
        }
    }

    /// Short human-readable title.
    pub fn title(&self) -> &'static str {
        match self {
            ErrorCode::InvalidQueryString => "Invalid query string",
            ErrorCode::InvalidFilterSyntax => "Invalid filter syntax",
            ErrorCode::FilterComplexityExceeded => "Filter complexity exceeded",
            ErrorCode::UnknownField => "Unknown field",
            ErrorCode::FieldNotAllowed => "Field not allowed",
            ErrorCode::OperatorNotAllowed => "Operator not allowed",
            ErrorCode::ValueTypeMismatch => "Value type mismatch",
            ErrorCode::WildcardNotAllowed => "Wildcard not allowed",
            ErrorCode::WildcardOperatorNotAllowed => "Wildcard operator not allowed",
            ErrorCode::WildcardTypeNotSupported => "Wildcard type not supported",
            ErrorCode::InvalidWildcardPattern => "Invalid wildcard pattern",
            ErrorCode::EmptyInListNotAllowed => "Empty in-list is not allowed",
            ErrorCode::SortNotAllowed => "Sort not allowed",
            ErrorCode::IncludeNotAllowed => "Include not allowed",
            ErrorCode::FieldsNotAllowed => "Fields not allowed",
            ErrorCode::PageParameterInvalid => "Invalid page parameter",
            ErrorCode::SecurityPredicateRequired => "Security predicate required",
            ErrorCode::InternalError => "Internal compilation error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured errors emitted by the query compiler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Percent-encoding could not be decoded.
    #[error("malformed percent-encoding in query parameter '{parameter}'")]
    MalformedEncoding { parameter: String },
    /// A query-string surface limit was exceeded.
    #[error("{limit} exceeded: limit {max}, got {actual}")]
    QueryLimit {
        parameter: String,
        limit: &'static str,
        max: usize,
        actual: usize,
    },
    /// A parameter occurred more than once.
    #[error("duplicate parameter is not allowed: {parameter}")]
    DuplicateParameter { parameter: String },
    /// The filter expression does not follow the grammar.
    #[error("invalid filter expression: {reason}")]
    FilterSyntax { reason: &'static str },
    /// A filter field used a dotted relationship path.
    #[error("relationship-path filtering is not supported")]
    RelationshipPath,
    /// A size or complexity budget was exceeded.
    #[error("{limit} exceeded: limit {max}, got {actual}")]
    ComplexityExceeded {
        parameter: String,
        limit: &'static str,
        max: u64,
        actual: u64,
    },
    /// The wall-clock compile budget was exceeded.
    #[error("compilation exceeded max_compile_ms {max_ms}")]
    CompileBudgetExceeded { max_ms: u64, elapsed_ms: u64 },
    /// Filter field is not declared by the policy.
    #[error("unknown field '{field}'")]
    UnknownField { field: String },
    /// Field is declared but may not be filtered.
    #[error("field '{field}' is not allowed")]
    FieldNotAllowed { field: String },
    /// Policy artifact carries a write-policy flag.
    #[error("write-policy flag is not allowed in query policy: {field}.{key}")]
    WriteFlagInPolicy { field: String, key: String },
    /// Policy artifact exposes a sensitive field.
    #[error("sensitive field exposure is blocked by policy validation: {field}")]
    SensitiveFieldExposed { field: String },
    /// Operator is not allowed for this field.
    #[error("operator '{operator}' is not allowed on field '{field}'")]
    OperatorNotAllowed { field: String, operator: String },
    /// Literal does not match the declared type.
    #[error("value for field '{field}' does not match type {expected}")]
    ValueTypeMismatch { field: String, expected: String },
    /// Wildcard used on a field that does not enable it.
    #[error("wildcard matching is not enabled for field '{field}'")]
    WildcardNotAllowed { field: String },
    /// Wildcard used with the wrong operator.
    #[error("wildcard values require == on field '{field}'")]
    WildcardOperatorNotAllowed { field: String },
    /// Wildcard used on a non-string field.
    #[error("wildcard values are only supported on string field '{field}'")]
    WildcardTypeNotSupported { field: String },
    /// Wildcard placement is unsupported.
    #[error("wildcard pattern for field '{field}' must be *x*, x* or *x")]
    InvalidWildcardPattern { field: String },
    /// Membership list was empty.
    #[error("empty =in=() or =out=() is not allowed")]
    EmptyInList { field: String },
    /// Sort key is outside the allowlist.
    #[error("sort field '{field}' is not allowed")]
    SortNotAllowed { field: String },
    /// Include path is outside the allowlist.
    #[error("include path '{path}' is not allowed")]
    IncludeNotAllowed { path: String },
    /// Sparse field selection is outside the allowlist.
    #[error("field '{field}' is not allowed for resource '{resource}'")]
    FieldsNotAllowed { resource: String, field: String },
    /// Pagination parameter is invalid.
    #[error("{parameter} must be a positive integer within configured limits")]
    PageParameterInvalid { parameter: String },
    /// Security predicate missing or incomplete.
    #[error("mandatory security predicate is missing in context")]
    SecurityPredicateRequired,
    /// A plan document failed the shape check.
    #[error("invalid plan: {reason}")]
    InvalidPlan { reason: &'static str },
    /// The compile input document does not have the expected shape.
    #[error("compile input is malformed")]
    MalformedInput,
    /// Unexpected failure.
    #[error("unexpected compiler failure")]
    Internal,
}

impl CompileError {
    /// Catalog code for the variant.
    pub fn code(&self) -> ErrorCode {
        match self {
            CompileError::MalformedEncoding { .. }
            | CompileError::QueryLimit { .. }
            | CompileError::DuplicateParameter { .. }
            | CompileError::InvalidPlan { .. } => ErrorCode::InvalidQueryString,
            CompileError::FilterSyntax { .. } | CompileError::RelationshipPath => {
                ErrorCode::InvalidFilterSyntax
            }
            CompileError::ComplexityExceeded { .. } | CompileError::CompileBudgetExceeded { .. } => {
                ErrorCode::FilterComplexityExceeded
            }
            CompileError::UnknownField { .. } => ErrorCode::UnknownField,
            CompileError::FieldNotAllowed { .. }
            | CompileError::WriteFlagInPolicy { .. }
            | CompileError::SensitiveFieldExposed { .. } => ErrorCode::FieldNotAllowed,
            CompileError::OperatorNotAllowed { .. } => ErrorCode::OperatorNotAllowed,
            CompileError::ValueTypeMismatch { .. } => ErrorCode::ValueTypeMismatch,
            CompileError::WildcardNotAllowed { .. } => ErrorCode::WildcardNotAllowed,
            CompileError::WildcardOperatorNotAllowed { .. } => {
                ErrorCode::WildcardOperatorNotAllowed
            }
            CompileError::WildcardTypeNotSupported { .. } => ErrorCode::WildcardTypeNotSupported,
            CompileError::InvalidWildcardPattern { .. } => ErrorCode::InvalidWildcardPattern,
            CompileError::EmptyInList { .. } => ErrorCode::EmptyInListNotAllowed,
            CompileError::SortNotAllowed { .. } => ErrorCode::SortNotAllowed,
            CompileError::IncludeNotAllowed { .. } => ErrorCode::IncludeNotAllowed,
            CompileError::FieldsNotAllowed { .. } => ErrorCode::FieldsNotAllowed,
            CompileError::PageParameterInvalid { .. } => ErrorCode::PageParameterInvalid,
            CompileError::SecurityPredicateRequired => ErrorCode::SecurityPredicateRequired,
            CompileError::MalformedInput | CompileError::Internal => ErrorCode::InternalError,
        }
    }

    /// Query parameter (or input section) the error points at.
    pub fn parameter(&self) -> Option<&str> {
        match self {
            CompileError::MalformedEncoding { parameter }
            | CompileError::QueryLimit { parameter, .. }
            | CompileError::DuplicateParameter { parameter }
            | CompileError::ComplexityExceeded { parameter, .. }
            | CompileError::PageParameterInvalid { parameter } => Some(parameter),
            CompileError::FilterSyntax { .. }
            | CompileError::RelationshipPath
            | CompileError::UnknownField { .. }
            | CompileError::FieldNotAllowed { .. }
            | CompileError::OperatorNotAllowed { .. }
            | CompileError::ValueTypeMismatch { .. }
            | CompileError::WildcardNotAllowed { .. }
            | CompileError::WildcardOperatorNotAllowed { .. }
            | CompileError::WildcardTypeNotSupported { .. }
            | CompileError::InvalidWildcardPattern { .. }
            | CompileError::EmptyInList { .. } => Some("filter"),
            CompileError::CompileBudgetExceeded { .. } => Some("query"),
            CompileError::InvalidPlan { .. } => Some("plan"),
            CompileError::WriteFlagInPolicy { .. } | CompileError::SensitiveFieldExposed { .. } => {
                Some("policy")
            }
            CompileError::SortNotAllowed { .. } => Some("sort"),
            CompileError::IncludeNotAllowed { .. } => Some("include"),
            CompileError::FieldsNotAllowed { .. } => None,
            CompileError::SecurityPredicateRequired => Some("context"),
            CompileError::MalformedInput | CompileError::Internal => None,
        }
    }

    /// Structured metadata attached to the envelope.
    pub fn meta(&self) -> Option<Value> {
        match self {
            CompileError::QueryLimit { limit, actual, .. } => {
                Some(json!({ "limit": limit, "count": actual }))
            }
            CompileError::ComplexityExceeded { limit, actual, .. } => {
                Some(json!({ "limit": limit, "count": actual }))
            }
            CompileError::CompileBudgetExceeded { elapsed_ms, .. } => {
                Some(json!({ "limit": "max_compile_ms", "elapsed_ms": elapsed_ms }))
            }
            CompileError::DuplicateParameter { parameter } => {
                Some(json!({ "duplicate_parameter": parameter }))
            }
            CompileError::WriteFlagInPolicy { field, key } => {
                Some(json!({ "field": field, "key": key }))
            }
            CompileError::SensitiveFieldExposed { field } => {
                Some(json!({ "field": field, "category": "sensitive_field" }))
            }
            CompileError::UnknownField { field }
            | CompileError::FieldNotAllowed { field }
            | CompileError::OperatorNotAllowed { field, .. }
            | CompileError::ValueTypeMismatch { field, .. }
            | CompileError::WildcardNotAllowed { field }
            | CompileError::WildcardOperatorNotAllowed { field }
            | CompileError::WildcardTypeNotSupported { field }
            | CompileError::InvalidWildcardPattern { field }
            | CompileError::EmptyInList { field }
            | CompileError::SortNotAllowed { field } => Some(json!({ "field": field })),
            _ => None,
        }
    }

    /// Converts the error into its wire envelope.
    pub fn to_object(&self) -> ErrorObject {
        let code = self.code();
        let parameter = match self {
            CompileError::FieldsNotAllowed { resource, .. } => Some(format!("fields[{resource}]")),
            other => other.parameter().map(str::to_owned),
        };
        ErrorObject {
            code: code.as_str().to_owned(),
            status: code.status().to_string(),
            title: code.title().to_owned(),
            detail: Some(self.to_string()),
            source: parameter.map(|parameter| ErrorSource { parameter }),
            meta: self.meta().and_then(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            }),
        }
    }
}

/// Location of the offending input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSource {
    /// Query parameter or input section name.
    pub parameter: String,
}

/// JSON:API-style error envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Stable machine-readable code.
    pub code: String,
    /// Three-digit status rendered as a string.
    pub status: String,
    /// Catalog title.
    pub title: String,
    /// Template-based detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Offending parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
    /// Structured metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}
