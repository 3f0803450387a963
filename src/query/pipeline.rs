#![forbid(unsafe_code)]

//! Compilation entry points.
//!
//! [`CompileInput`] is the typed boundary; every stage after it works on
//! validated structures. Checks run in a fixed order and the first failure
//! wins.

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CompileError, ErrorObject, Result};
use crate::query::allowlist::{
    enforce_fields_allowlist, enforce_include_allowlist, enforce_sort_allowlist,
};
use crate::query::filter::parse_filter;
use crate::query::limits::{
    enforce_dimension_limits, enforce_filter_limits, enforce_no_duplicates,
    enforce_non_empty_in_lists, enforce_parameter_surface, enforce_root_field_scope,
    enforce_string_limits, Limits,
};
use crate::query::normalize::normalize_query;
use crate::query::page::parse_page;
use crate::query::params::{parse_query_string, RawParams};
use crate::query::plan::{PlanParts, QueryPlan};
use crate::query::policy::{CompileContext, Policy, SecurityPredicate};
use crate::query::security::validate_policy_artifacts;
use crate::query::types::type_check;

/// Everything one compilation needs.
///
/// When `query` is present it is used as-is and `raw_query` is ignored.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompileInput {
    /// Raw, percent-encoded query string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_query: Option<String>,
    /// Pre-parsed parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<RawParams>,
    /// Query policy.
    #[serde(default)]
    pub policy: Policy,
    /// Caller context.
    #[serde(default)]
    pub context: CompileContext,
}

impl CompileInput {
    /// Decodes an input document.
    pub fn from_json(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|_| CompileError::MalformedInput)
    }
}

/// Result envelope of [`compile_request_safe`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SafeOutcome {
    /// Whether compilation succeeded.
    pub ok: bool,
    /// Plan on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<QueryPlan>,
    /// Errors on failure; exactly one entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorObject>,
}

impl SafeOutcome {
    fn success(plan: QueryPlan) -> Self {
        Self {
            ok: true,
            plan: Some(plan),
            errors: Vec::new(),
        }
    }

    fn failure(err: &CompileError) -> Self {
        Self {
            ok: false,
            plan: None,
            errors: vec![err.to_object()],
        }
    }
}

/// Compiles one request into a [`QueryPlan`].
pub fn compile_request(input: &CompileInput) -> Result<QueryPlan> {
    let started = Instant::now();
    debug!(
        raw = input.raw_query.is_some() && input.query.is_none(),
        "query.compile.start"
    );
    match run(input, started) {
        Ok(plan) => {
            debug!(
                clauses = plan.filter.clauses.len(),
                ast_depth = plan.meta.filter_complexity.ast_depth,
                ast_nodes = plan.meta.filter_complexity.ast_nodes,
                elapsed_us = started.elapsed().as_micros() as u64,
                "query.compile.done"
            );
            Ok(plan)
        }
        Err(err) => {
            debug!(code = %err.code(), "query.compile.rejected");
            Err(err)
        }
    }
}

/// Like [`compile_request`], but never fails: errors and panics become an
/// error envelope.
pub fn compile_request_safe(input: &CompileInput) -> SafeOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| compile_request(input))) {
        Ok(Ok(plan)) => SafeOutcome::success(plan),
        Ok(Err(err)) => SafeOutcome::failure(&err),
        Err(_) => {
            warn!("query.compile.panicked");
            SafeOutcome::failure(&CompileError::Internal)
        }
    }
}

/// Decodes a JSON input document and compiles it safely.
pub fn compile_json_safe(input: &Value) -> SafeOutcome {
    match CompileInput::from_json(input) {
        Ok(input) => compile_request_safe(&input),
        Err(err) => SafeOutcome::failure(&err),
    }
}

fn run(input: &CompileInput, started: Instant) -> Result<QueryPlan> {
    let predicate = SecurityPredicate::from_context(&input.context)?;
    validate_policy_artifacts(&input.policy)?;
    let limits = Limits::resolve(&input.policy.limits);

    let params = match (&input.query, &input.raw_query) {
        (Some(query), _) => query.clone(),
        (None, raw) => {
            let raw = raw.as_deref().unwrap_or_default();
            enforce_string_limits(raw, &limits)?;
            parse_query_string(raw)?
        }
    };
    enforce_parameter_surface(&params, &limits)?;
    enforce_no_duplicates(&params)?;

    let query = normalize_query(&params);

    let parsed = parse_filter(query.filter().unwrap_or_default())?;
    enforce_root_field_scope(&parsed.clauses)?;
    enforce_non_empty_in_lists(&parsed.clauses)?;
    enforce_filter_limits(&parsed.clauses, parsed.complexity, &limits)?;
    if parsed.root.as_ref().is_some_and(|root| root.has_disjunction()) {
        // OR connectives are flattened into the conjunction below.
        warn!(
            clauses = parsed.clauses.len(),
            "query.filter.disjunction_flattened"
        );
    }

    let dims = &input.policy.query_dimensions;
    enforce_dimension_limits(&query, &limits)?;
    enforce_include_allowlist(query.include(), dims)?;
    enforce_sort_allowlist(query.sort(), dims)?;
    enforce_fields_allowlist(&query, dims)?;

    let page = parse_page(&query, &limits)?;
    let filter = type_check(&parsed.clauses, &input.policy)?;

    let plan = QueryPlan::build(
        PlanParts {
            policy_version: input.policy.version(),
            context: &input.context,
            query,
            filter,
            complexity: parsed.complexity,
            page,
        },
        predicate,
    );

    if let Some(max_ms) = limits.max_compile_ms {
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if elapsed_ms > max_ms {
            return Err(CompileError::CompileBudgetExceeded { max_ms, elapsed_ms });
        }
    }
    Ok(plan)
}
