//! Statement assembly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::adapter::compile::{
    compile_limit_offset, compile_order_by, compile_security_predicate, compile_select,
    compile_where,
};
use crate::adapter::error::{limit_check, AdapterError, AdapterResult};
use crate::adapter::mapping::MappingSource;
use crate::adapter::placeholder::{renumber_placeholders, validate_fragment_shape, SqlFragment};
use crate::query::plan::QueryPlan;

/// Fragments for one `SELECT`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssembleInput {
    /// Quoted table, must equal the mapping's table.
    pub table: String,
    /// Projection list.
    pub select: SqlFragment,
    /// User filter.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<SqlFragment>,
    /// Row-level security predicate; required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SqlFragment>,
    /// ORDER BY clause.
    #[serde(rename = "orderBy", default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<SqlFragment>,
    /// LIMIT/OFFSET clause.
    #[serde(rename = "limitOffset", default, skip_serializing_if = "Option::is_none")]
    pub limit_offset: Option<SqlFragment>,
}

/// Final parameterized statement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlStatement {
    /// SQL text with `$1..$N`.
    pub text: String,
    /// Bound values for `$1..$N`.
    pub values: Vec<Value>,
}

/// Joins fragments into `SELECT .. FROM .. WHERE (..) AND (..) ..` and
/// renumbers placeholders left to right.
pub fn assemble_select_sql<M: MappingSource + ?Sized>(
    input: &AssembleInput,
    mapping: &M,
) -> AdapterResult<SqlStatement> {
    let mapping = mapping.prepared()?;
    let limits = mapping.limits();

    let table = input.table.trim();
    if table.is_empty() {
        return Err(AdapterError::FragmentInvalid {
            fragment: "table".into(),
            reason: "table is required",
        });
    }
    if table != mapping.table_sql() {
        return Err(AdapterError::FragmentInvalid {
            fragment: "table".into(),
            reason: "table must come from the mapping",
        });
    }

    let optional = [
        ("where", input.where_clause.as_ref()),
        ("security", input.security.as_ref()),
        ("orderBy", input.order_by.as_ref()),
        ("limitOffset", input.limit_offset.as_ref()),
    ];
    validate_fragment_shape(&input.select, limits)?;
    for (_, fragment) in optional.iter() {
        if let Some(fragment) = fragment {
            validate_fragment_shape(fragment, limits)?;
        }
    }
    let present = |index: usize| {
        let (label, fragment) = optional[index];
        fragment
            .filter(|fragment| !fragment.is_empty())
            .map(|fragment| (label, fragment))
    };
    if present(1).is_none() {
        return Err(AdapterError::SecurityPredicateRequired {
            reason: "security fragment is required",
        });
    }
    let conditions: Vec<_> = [present(0), present(1)].into_iter().flatten().collect();
    let tails: Vec<_> = [present(2), present(3)].into_iter().flatten().collect();
    limit_check(
        "max_fragment_count",
        limits.max_fragment_count,
        1 + conditions.len() + tails.len(),
    )?;

    let mut values = Vec::new();
    let select = renumber_placeholders("select", &input.select, values.len())?;
    values.extend(select.values);
    let mut text = format!("SELECT {} FROM {table}", select.text);

    let mut parts = Vec::with_capacity(conditions.len());
    for (label, fragment) in conditions {
        let renumbered = renumber_placeholders(label, fragment, values.len())?;
        parts.push(format!("({})", renumbered.text));
        values.extend(renumbered.values);
    }
    text.push_str(" WHERE ");
    text.push_str(&parts.join(" AND "));

    for (label, fragment) in tails {
        let renumbered = renumber_placeholders(label, fragment, values.len())?;
        text.push(' ');
        text.push_str(&renumbered.text);
        values.extend(renumbered.values);
    }

    limit_check("max_bound_values", limits.max_bound_values, values.len())?;
    limit_check(
        "max_sql_text_length",
        limits.max_sql_text_length,
        text.chars().count(),
    )?;
    debug!(
        values = values.len(),
        text_len = text.len(),
        "adapter.assemble.done"
    );
    Ok(SqlStatement { text, values })
}

/// Decodes an assemble input document and assembles it.
pub fn assemble_select_sql_json<M: MappingSource + ?Sized>(
    input: &Value,
    mapping: &M,
) -> AdapterResult<SqlStatement> {
    let input: AssembleInput =
        serde_json::from_value(input.clone()).map_err(|_| AdapterError::FragmentInvalid {
            fragment: "input".into(),
            reason: "assemble input has an invalid shape",
        })?;
    assemble_select_sql(&input, mapping)
}

/// Compiles every fragment of `plan` and assembles the statement.
pub fn compile_select_statement<M: MappingSource + ?Sized>(
    plan: &QueryPlan,
    mapping: &M,
    security_context: &Value,
) -> AdapterResult<SqlStatement> {
    let mapping = mapping.prepared()?;
    let mapping = mapping.as_ref();
    let input = AssembleInput {
        table: mapping.table_sql().to_owned(),
        select: compile_select(plan, mapping)?,
        where_clause: Some(compile_where(plan, mapping)?),
        security: Some(compile_security_predicate(plan, mapping, security_context)?),
        order_by: Some(compile_order_by(plan, mapping)?),
        limit_offset: Some(compile_limit_offset(plan, mapping)?),
    };
    assemble_select_sql(&input, mapping)
}
