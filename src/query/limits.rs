//! Size and complexity budgets.
//!
//! Each check is independent and fails fast with the first violation. Limits
//! come from the policy's `limits` map; absent, non-integer or non-positive
//! values fall back to the defaults below.

use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use serde_json::Value;

use crate::error::{CompileError, Result};
use crate::query::ast::{FilterClause, FilterComplexity};
use crate::query::normalize::NormalizedQuery;
use crate::query::params::{pair_count, RawParams};

/// Resolved budgets for one compilation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Limits {
    /// Raw query string length in characters.
    pub max_raw_query_length: usize,
    /// Decoded query string length in characters.
    pub max_decoded_query_length: usize,
    /// Distinct parameter names.
    pub max_param_count: usize,
    /// Key/value pairs including repeats.
    pub max_key_value_pairs: usize,
    /// Length of any single decoded parameter value.
    pub max_parameter_value_length: usize,
    /// Length of any single filter literal.
    pub max_filter_literal_length: usize,
    /// Number of include paths.
    pub max_include_paths: usize,
    /// Length of one include path.
    pub max_include_path_length: usize,
    /// Number of sort keys.
    pub max_sort_keys: usize,
    /// Length of one sort key.
    pub max_sort_key_length: usize,
    /// Fields in one sparse fieldset.
    pub max_sparse_fields: usize,
    /// Length of one sparse field name.
    pub max_sparse_field_length: usize,
    /// Filter AST depth.
    pub max_ast_depth: usize,
    /// Filter AST node count.
    pub max_ast_nodes: usize,
    /// Items in one membership list.
    pub max_in_list_items: usize,
    /// Largest accepted `page[size]`.
    pub max_page_size: u64,
    /// Largest accepted `page[number]`.
    pub max_page_number: u64,
    /// Post-hoc wall-clock budget; disabled when `None`.
    pub max_compile_ms: Option<u64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_raw_query_length: 4096,
            max_decoded_query_length: 4096,
            max_param_count: 32,
            max_key_value_pairs: 64,
            max_parameter_value_length: 2048,
            max_filter_literal_length: 256,
            max_include_paths: 10,
            max_include_path_length: 128,
            max_sort_keys: 8,
            max_sort_key_length: 64,
            max_sparse_fields: 25,
            max_sparse_field_length: 64,
            max_ast_depth: 8,
            max_ast_nodes: 64,
            max_in_list_items: 50,
            max_page_size: 100,
            max_page_number: 10_000,
            max_compile_ms: None,
        }
    }
}

fn positive(raw: &BTreeMap<String, Value>, key: &str) -> Option<u64> {
    raw.get(key).and_then(Value::as_u64).filter(|value| *value > 0)
}

impl Limits {
    /// Resolves raw overrides against the defaults.
    pub fn resolve(raw: &BTreeMap<String, Value>) -> Self {
        let defaults = Self::default();
        let size = |key: &str, fallback: usize| {
            positive(raw, key)
                .and_then(|value| usize::try_from(value).ok())
                .unwrap_or(fallback)
        };
        Self {
            max_raw_query_length: size("max_raw_query_length", defaults.max_raw_query_length),
            max_decoded_query_length: size(
                "max_decoded_query_length",
                defaults.max_decoded_query_length,
            ),
            max_param_count: size("max_param_count", defaults.max_param_count),
            max_key_value_pairs: size("max_key_value_pairs", defaults.max_key_value_pairs),
            max_parameter_value_length: size(
                "max_parameter_value_length",
                defaults.max_parameter_value_length,
            ),
            max_filter_literal_length: size(
                "max_filter_literal_length",
                defaults.max_filter_literal_length,
            ),
            max_include_paths: size("max_include_paths", defaults.max_include_paths),
            max_include_path_length: size(
                "max_include_path_length",
                defaults.max_include_path_length,
            ),
            max_sort_keys: size("max_sort_keys", defaults.max_sort_keys),
            max_sort_key_length: size("max_sort_key_length", defaults.max_sort_key_length),
            max_sparse_fields: size("max_sparse_fields", defaults.max_sparse_fields),
            max_sparse_field_length: size(
                "max_sparse_field_length",
                defaults.max_sparse_field_length,
            ),
            max_ast_depth: size("max_ast_depth", defaults.max_ast_depth),
            max_ast_nodes: size("max_ast_nodes", defaults.max_ast_nodes),
            max_in_list_items: size("max_in_list_items", defaults.max_in_list_items),
            max_page_size: positive(raw, "max_page_size").unwrap_or(defaults.max_page_size),
            max_page_number: positive(raw, "max_page_number").unwrap_or(defaults.max_page_number),
            max_compile_ms: positive(raw, "max_compile_ms"),
        }
    }
}

fn query_limit(parameter: &str, limit: &'static str, max: usize, actual: usize) -> Result<()> {
    if actual > max {
        return Err(CompileError::QueryLimit {
            parameter: parameter.to_owned(),
            limit,
            max,
            actual,
        });
    }
    Ok(())
}

fn complexity_limit(parameter: &str, limit: &'static str, max: usize, actual: usize) -> Result<()> {
    if actual > max {
        return Err(CompileError::ComplexityExceeded {
            parameter: parameter.to_owned(),
            limit,
            max: max as u64,
            actual: actual as u64,
        });
    }
    Ok(())
}

/// Checks raw and decoded query string length.
///
/// Malformed encodings are left for the parser to report.
pub fn enforce_string_limits(raw_query: &str, limits: &Limits) -> Result<()> {
    query_limit(
        "query",
        "max_raw_query_length",
        limits.max_raw_query_length,
        raw_query.chars().count(),
    )?;
    let spaced = raw_query.replace('+', " ");
    if let Ok(decoded) = percent_decode_str(&spaced).decode_utf8() {
        query_limit(
            "query",
            "max_decoded_query_length",
            limits.max_decoded_query_length,
            decoded.chars().count(),
        )?;
    }
    Ok(())
}

/// Checks parameter count, pair count and per-value length.
pub fn enforce_parameter_surface(params: &RawParams, limits: &Limits) -> Result<()> {
    query_limit("query", "max_param_count", limits.max_param_count, params.len())?;
    query_limit(
        "query",
        "max_key_value_pairs",
        limits.max_key_value_pairs,
        pair_count(params),
    )?;
    for (key, value) in params {
        for item in value.values() {
            query_limit(
                key,
                "max_parameter_value_length",
                limits.max_parameter_value_length,
                item.chars().count(),
            )?;
        }
    }
    Ok(())
}

/// Rejects any parameter that occurred more than once.
pub fn enforce_no_duplicates(params: &RawParams) -> Result<()> {
    match params.iter().find(|(_, value)| value.values().len() > 1) {
        Some((key, _)) => Err(CompileError::DuplicateParameter {
            parameter: key.clone(),
        }),
        None => Ok(()),
    }
}

/// Rejects dotted relationship paths in filter fields.
pub fn enforce_root_field_scope(clauses: &[FilterClause]) -> Result<()> {
    if clauses.iter().any(|clause| clause.field.contains('.')) {
        return Err(CompileError::RelationshipPath);
    }
    Ok(())
}

/// Rejects empty `=in=()` / `=out=()` lists.
pub fn enforce_non_empty_in_lists(clauses: &[FilterClause]) -> Result<()> {
    match clauses
        .iter()
        .find(|clause| clause.operator.is_membership() && clause.raw_values.is_empty())
    {
        Some(clause) => Err(CompileError::EmptyInList {
            field: clause.field.clone(),
        }),
        None => Ok(()),
    }
}

/// Checks literal length, AST metrics and membership list size.
pub fn enforce_filter_limits(
    clauses: &[FilterClause],
    complexity: FilterComplexity,
    limits: &Limits,
) -> Result<()> {
    for clause in clauses {
        for value in &clause.raw_values {
            complexity_limit(
                "filter",
                "max_filter_literal_length",
                limits.max_filter_literal_length,
                value.chars().count(),
            )?;
        }
    }
    complexity_limit(
        "filter",
        "max_ast_depth",
        limits.max_ast_depth,
        complexity.ast_depth,
    )?;
    complexity_limit(
        "filter",
        "max_ast_nodes",
        limits.max_ast_nodes,
        complexity.ast_nodes,
    )?;
    for clause in clauses.iter().filter(|clause| clause.operator.is_membership()) {
        complexity_limit(
            "filter",
            "max_in_list_items",
            limits.max_in_list_items,
            clause.raw_values.len(),
        )?;
    }
    Ok(())
}

/// Checks include, sort and sparse-fieldset sizes.
pub fn enforce_dimension_limits(query: &NormalizedQuery, limits: &Limits) -> Result<()> {
    let include = query.include();
    complexity_limit(
        "include",
        "max_include_paths",
        limits.max_include_paths,
        include.len(),
    )?;
    for path in include {
        complexity_limit(
            "include",
            "max_include_path_length",
            limits.max_include_path_length,
            path.chars().count(),
        )?;
    }

    let sort = query.sort();
    complexity_limit("sort", "max_sort_keys", limits.max_sort_keys, sort.len())?;
    for key in sort {
        complexity_limit(
            "sort",
            "max_sort_key_length",
            limits.max_sort_key_length,
            key.chars().count(),
        )?;
    }

    for (resource, fields) in query.sparse_fields() {
        let parameter = format!("fields[{resource}]");
        complexity_limit(
            &parameter,
            "max_sparse_fields",
            limits.max_sparse_fields,
            fields.len(),
        )?;
        for field in fields {
            complexity_limit(
                &parameter,
                "max_sparse_field_length",
                limits.max_sparse_field_length,
                field.chars().count(),
            )?;
        }
    }
    Ok(())
}
