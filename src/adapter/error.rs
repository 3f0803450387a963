#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Adapter error taxonomy.
//!
//! Shaped like the compiler catalog: one closed [`AdapterErrorCode`] enum,
//! template-only detail strings and the shared [`ErrorObject`] envelope.
//! Detail never carries SQL text or bound values.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::error::ErrorObject;

/// Convenience alias for adapter results.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Stable adapter error codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorCode {
    /// Input is not a query plan.
    PgInvalidPlanShape,
    /// Mapping document is malformed.
    PgInvalidMappingShape,
    /// Plan references a field with no mapping.
    PgMappingMissing,
    /// Operator has no SQL translation here.
    PgOperatorNotSupported,
    /// Plan or mapping asks for an unsupported feature.
    PgFeatureNotSupported,
    /// Security predicate or its binding is missing.
    PgSecurityPredicateRequired,
    /// SQL fragment failed validation.
    PgFragmentInvalid,
    /// An adapter limit was exceeded.
    PgLimitsExceeded,
}

impl AdapterErrorCode {
    /// Every code in catalog order.
    pub const ALL: [AdapterErrorCode; 8] = [
        AdapterErrorCode::PgInvalidPlanShape,
        AdapterErrorCode::PgInvalidMappingShape,
        AdapterErrorCode::PgMappingMissing,
        AdapterErrorCode::PgOperatorNotSupported,
        AdapterErrorCode::PgFeatureNotSupported,
        AdapterErrorCode::PgSecurityPredicateRequired,
        AdapterErrorCode::PgFragmentInvalid,
        AdapterErrorCode::PgLimitsExceeded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterErrorCode::PgInvalidPlanShape => "pg_invalid_plan_shape",
            AdapterErrorCode::PgInvalidMappingShape => "pg_invalid_mapping_shape",
            AdapterErrorCode::PgMappingMissing => "pg_mapping_missing",
            AdapterErrorCode::PgOperatorNotSupported => "pg_operator_not_supported",
            AdapterErrorCode::PgFeatureNotSupported => "pg_feature_not_supported",
            AdapterErrorCode::PgSecurityPredicateRequired => "pg_security_predicate_required",
            AdapterErrorCode::PgFragmentInvalid => "pg_fragment_invalid",
            AdapterErrorCode::PgLimitsExceeded => "pg_limits_exceeded",
        }
    }

    /// Mapping and security problems are integration bugs (5xx).
    pub fn status(&self) -> u16 {
        match self {
            AdapterErrorCode::PgInvalidMappingShape
            | AdapterErrorCode::PgMappingMissing
            | AdapterErrorCode::PgSecurityPredicateRequired => 500,
            _ => 400,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AdapterErrorCode::PgInvalidPlanShape => "Invalid query plan shape",
            AdapterErrorCode::PgInvalidMappingShape => "Invalid adapter mapping",
            AdapterErrorCode::PgMappingMissing => "Required mapping is missing",
            AdapterErrorCode::PgOperatorNotSupported => "Operator is not supported by adapter",
            AdapterErrorCode::PgFeatureNotSupported => "Feature is not supported by adapter",
            AdapterErrorCode::PgSecurityPredicateRequired => "Security predicate is required",
            AdapterErrorCode::PgFragmentInvalid => "Invalid SQL fragment",
            AdapterErrorCode::PgLimitsExceeded => "Adapter limits exceeded",
        }
    }
}

impl fmt::Display for AdapterErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the PostgreSQL adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("input is not a valid query plan: {reason}")]
    InvalidPlanShape { reason: &'static str },
    #[error("invalid mapping at '{path}': {reason}")]
    InvalidMappingShape { path: String, reason: &'static str },
    #[error("no mapping for field '{field}' used in {purpose}")]
    MappingMissing { field: String, purpose: &'static str },
    #[error("{reason}")]
    OperatorNotSupported { reason: &'static str },
    #[error("{feature} is not supported by this adapter")]
    FeatureNotSupported { feature: &'static str },
    #[error("security predicate is required: {reason}")]
    SecurityPredicateRequired { reason: &'static str },
    #[error("fragment '{fragment}' is invalid: {reason}")]
    FragmentInvalid {
        fragment: String,
        reason: &'static str,
    },
    #[error("{limit} exceeded: limit {max}, got {actual}")]
    LimitsExceeded {
        limit: &'static str,
        max: usize,
        actual: usize,
    },
}

impl AdapterError {
    pub fn code(&self) -> AdapterErrorCode {
        match self {
            AdapterError::InvalidPlanShape { .. } => AdapterErrorCode::PgInvalidPlanShape,
            AdapterError::InvalidMappingShape { .. } => AdapterErrorCode::PgInvalidMappingShape,
            AdapterError::MappingMissing { .. } => AdapterErrorCode::PgMappingMissing,
            AdapterError::OperatorNotSupported { .. } => AdapterErrorCode::PgOperatorNotSupported,
            AdapterError::FeatureNotSupported { .. } => AdapterErrorCode::PgFeatureNotSupported,
            AdapterError::SecurityPredicateRequired { .. } => {
                AdapterErrorCode::PgSecurityPredicateRequired
            }
            AdapterError::FragmentInvalid { .. } => AdapterErrorCode::PgFragmentInvalid,
            AdapterError::LimitsExceeded { .. } => AdapterErrorCode::PgLimitsExceeded,
        }
    }

    pub fn meta(&self) -> Option<Value> {
        match self {
            AdapterError::InvalidMappingShape { path, .. } => Some(json!({ "path": path })),
            AdapterError::MappingMissing { field, purpose } => {
                Some(json!({ "field": field, "purpose": purpose }))
            }
            AdapterError::FeatureNotSupported { feature } => Some(json!({ "feature": feature })),
            AdapterError::FragmentInvalid { fragment, .. } => {
                Some(json!({ "fragment": fragment }))
            }
            AdapterError::LimitsExceeded { limit, actual, .. } => {
                Some(json!({ "limit": limit, "count": actual }))
            }
            _ => None,
        }
    }

    /// Converts the error into the shared wire envelope.
    pub fn to_object(&self) -> ErrorObject {
        let code = self.code();
        ErrorObject {
            code: code.as_str().to_owned(),
            status: code.status().to_string(),
            title: code.title().to_owned(),
            detail: Some(self.to_string()),
            source: None,
            meta: self.meta().and_then(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            }),
        }
    }
}

pub(crate) fn limit_check(limit: &'static str, max: usize, actual: usize) -> AdapterResult<()> {
    if actual > max {
        return Err(AdapterError::LimitsExceeded { limit, max, actual });
    }
    Ok(())
}
