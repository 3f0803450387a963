#![forbid(unsafe_code)]

//! Query compilation pipeline.
//!
//! Turns an untrusted JSON:API query string into a validated, typed
//! [`QueryPlan`]. Stages run leaf to root: parameter parsing, normalization,
//! filter parsing, limit and allowlist enforcement, type checking and plan
//! assembly.

/// Filter syntax tree and complexity metrics.
pub mod ast;

/// Include, sort and sparse-fieldset allowlists.
pub mod allowlist;

/// Canonical JSON encoding for cache keys.
pub mod canonical;

/// RSQL/FIQL filter parser.
///
/// Explicit cursor with a hard nesting guard; clauses are flattened.
pub mod filter;

/// Size and complexity budgets.
pub mod limits;

/// Query normalization.
pub mod normalize;

/// Pagination parameters.
pub mod page;

/// Query-string parsing and percent-decoding.
pub mod params;

/// Compilation entry points.
pub mod pipeline;

/// Compiled plan and cache keys.
pub mod plan;

/// Policy and context documents.
pub mod policy;

/// Policy artifact hygiene and hardened mode.
pub mod security;

/// Strict literal coercion and wildcard resolution.
pub mod types;

pub use pipeline::{
    compile_json_safe, compile_request, compile_request_safe, CompileInput, SafeOutcome,
};
pub use plan::{context_fingerprint, plan_cache_key, validate_plan, QueryPlan};
pub use policy::{CompileContext, Policy};
