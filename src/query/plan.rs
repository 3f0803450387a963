//! The compiled query plan and its cache keys.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{CompileError, Result};
use crate::query::ast::FilterComplexity;
use crate::query::canonical::stable_stringify;
use crate::query::normalize::NormalizedQuery;
use crate::query::page::Page;
use crate::query::policy::{CompileContext, SecurityPredicate};
use crate::query::types::{Binding, TypedClause, TypedFilter};

/// Filter dialect tag carried by every plan.
pub const FILTER_DIALECT: &str = "rsql-fiql";

/// Plan discriminator; only `query_plan` exists.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    /// A compiled read query.
    QueryPlan,
}

/// Filter section of a plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSection {
    /// Filter text as received, empty when absent.
    pub expression: String,
    /// Always [`FILTER_DIALECT`].
    pub dialect: String,
    /// Typed clauses, implicitly conjoined.
    pub clauses: Vec<TypedClause>,
}

/// Security section of a plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSecurity {
    /// Mandatory row-level predicate.
    pub predicate: SecurityPredicate,
}

/// Plan metadata and cache keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanMeta {
    /// Policy version the plan was compiled under.
    pub policy_version: String,
    /// Copied from the context.
    pub tenant_context_present: bool,
    /// Always true.
    pub normalized: bool,
    /// Filter AST metrics.
    pub filter_complexity: FilterComplexity,
    /// Canonical encoding of the normalized query.
    pub normalized_query_key: String,
    /// Canonical encoding of the security-relevant context subset.
    pub context_fingerprint: String,
    /// Key callers may memoize the plan under.
    pub plan_cache_key: String,
}

/// Validated, typed, backend-agnostic query plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Always [`PlanKind::QueryPlan`].
    pub kind: PlanKind,
    /// Policy version.
    pub policy_version: String,
    /// Whether a tenant context was established.
    pub tenant_context_present: bool,
    /// Normalized query parameters.
    pub normalized_query: NormalizedQuery,
    /// Typed filter.
    pub filter: FilterSection,
    /// Per-clause bind groups.
    pub bindings: Vec<Binding>,
    /// Sorted include paths.
    pub include: Vec<String>,
    /// Sort keys in request order.
    pub sort: Vec<String>,
    /// Pagination.
    pub page: Page,
    /// Security predicate.
    pub security: PlanSecurity,
    /// Metadata.
    pub meta: PlanMeta,
}

/// Validated pieces a plan is built from.
#[derive(Debug)]
pub struct PlanParts<'a> {
    /// Policy version.
    pub policy_version: &'a str,
    /// Caller context.
    pub context: &'a CompileContext,
    /// Normalized query.
    pub query: NormalizedQuery,
    /// Type-checked filter.
    pub filter: TypedFilter,
    /// Filter metrics.
    pub complexity: FilterComplexity,
    /// Validated page parameters.
    pub page: Page,
}

impl QueryPlan {
    /// Assembles the plan and derives its cache keys.
    ///
    /// Taking a [`SecurityPredicate`] by value makes it impossible to build a
    /// plan without one.
    pub fn build(parts: PlanParts<'_>, predicate: SecurityPredicate) -> Self {
        let PlanParts {
            policy_version,
            context,
            query,
            filter,
            complexity,
            page,
        } = parts;
        let normalized_query_key = query.cache_key();
        let context_fingerprint = context_fingerprint(context);
        let plan_cache_key =
            plan_cache_key(policy_version, &context_fingerprint, &normalized_query_key);
        let tenant_context_present = context.tenant_context_present;

        Self {
            kind: PlanKind::QueryPlan,
            policy_version: policy_version.to_owned(),
            tenant_context_present,
            filter: FilterSection {
                expression: query.filter().unwrap_or_default().to_owned(),
                dialect: FILTER_DIALECT.to_owned(),
                clauses: filter.clauses,
            },
            bindings: filter.bindings,
            include: query.include().to_vec(),
            sort: query.sort().to_vec(),
            page,
            security: PlanSecurity { predicate },
            meta: PlanMeta {
                policy_version: policy_version.to_owned(),
                tenant_context_present,
                normalized: true,
                filter_complexity: complexity,
                normalized_query_key,
                context_fingerprint,
                plan_cache_key,
            },
            normalized_query: query,
        }
    }
}

/// Fingerprint of the security-relevant part of the context.
///
/// Only the tenant flag, the predicate shape and the auth hash participate;
/// any other context data never reaches a cache key.
pub fn context_fingerprint(context: &CompileContext) -> String {
    let predicate = context.security_predicate.clone().unwrap_or_default();
    let text = |value: Option<String>| value.unwrap_or_default();
    stable_stringify(&json!({
        "tenant_context_present": context.tenant_context_present,
        "security_predicate": {
            "field": text(predicate.field),
            "operator": text(predicate.operator),
            "bound_parameter_key": text(predicate.bound_parameter_key),
        },
        "auth_context_hash": text(context.auth_context_hash.clone()),
    }))
}

/// Canonical encoding of the `(policy version, fingerprint, query key)` tuple.
pub fn plan_cache_key(
    policy_version: &str,
    context_fingerprint: &str,
    normalized_query_key: &str,
) -> String {
    stable_stringify(&json!([
        policy_version,
        context_fingerprint,
        normalized_query_key
    ]))
}

/// Minimal shape check for a plan document.
pub fn validate_plan(plan: &Value) -> Result<()> {
    let Some(object) = plan.as_object() else {
        return Err(CompileError::InvalidPlan {
            reason: "plan must be an object",
        });
    };
    if object.get("kind").and_then(Value::as_str) != Some("query_plan") {
        return Err(CompileError::InvalidPlan {
            reason: "plan kind must be query_plan",
        });
    }
    if !object.get("meta").is_some_and(Value::is_object) {
        return Err(CompileError::InvalidPlan {
            reason: "plan meta object is required",
        });
    }
    Ok(())
}
