//! Plan to SQL fragment compilation.
//!
//! Every function takes a validated [`QueryPlan`] and a mapping and returns
//! a standalone [`SqlFragment`] with locally numbered placeholders. Literal
//! values are always bound, never interpolated.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::adapter::error::{limit_check, AdapterError, AdapterResult};
use crate::adapter::mapping::{FieldSql, MappingSource, PreparedMapping};
use crate::adapter::placeholder::{FragmentMeta, SqlFragment};
use crate::query::ast::Operator;
use crate::query::plan::QueryPlan;
use crate::query::types::{TypedClause, TypedValue, WildcardMode};

/// SQL comparison operator for a comparison token.
pub fn operator_sql(token: &str) -> Option<&'static str> {
    Some(match token {
        "==" => "=",
        "!=" => "<>",
        ">" => ">",
        ">=" => ">=",
        "<" => "<",
        "<=" => "<=",
        _ => return None,
    })
}

/// Decodes a plan document, mapping any shape problem to `pg_invalid_plan_shape`.
pub fn plan_from_json(value: &Value) -> AdapterResult<QueryPlan> {
    if value.get("kind").and_then(Value::as_str) != Some("query_plan") {
        return Err(AdapterError::InvalidPlanShape {
            reason: "input must be a query_plan object",
        });
    }
    serde_json::from_value(value.clone()).map_err(|_| AdapterError::InvalidPlanShape {
        reason: "query plan fields have an invalid shape",
    })
}

fn resolve_field<'m>(
    mapping: &'m PreparedMapping,
    field: &str,
    purpose: &'static str,
) -> AdapterResult<&'m FieldSql> {
    mapping
        .field(field)
        .ok_or_else(|| AdapterError::MappingMissing {
            field: field.to_owned(),
            purpose,
        })
}

#[derive(Default)]
struct Binder {
    values: Vec<Value>,
    expression_ids: BTreeSet<String>,
}

impl Binder {
    fn bind(&mut self, value: Value) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }

    fn note(&mut self, field: &FieldSql) {
        if let Some(id) = field.expression_id() {
            self.expression_ids.insert(id.to_owned());
        }
    }

    fn meta(&self) -> FragmentMeta {
        FragmentMeta {
            expression_ids: self.expression_ids.iter().cloned().collect(),
        }
    }
}

/// Escapes backslash, `%` and `_` so the value only matches literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn wildcard_pattern(mode: WildcardMode, value: &str) -> String {
    let value = escape_like(value);
    match mode {
        WildcardMode::Contains => format!("%{value}%"),
        WildcardMode::StartsWith => format!("{value}%"),
        WildcardMode::EndsWith => format!("%{value}"),
    }
}

fn compile_clause(
    mapping: &PreparedMapping,
    clause: &TypedClause,
    binder: &mut Binder,
) -> AdapterResult<String> {
    let field = resolve_field(mapping, &clause.field, "filter")?;
    binder.note(field);
    let lhs = field.sql();

    if clause.operator.is_membership() {
        if clause.values.is_empty() {
            return Err(AdapterError::InvalidPlanShape {
                reason: "membership operator requires values",
            });
        }
        let tokens: Vec<String> = clause
            .values
            .iter()
            .map(|value| binder.bind(value.to_json()))
            .collect();
        let keyword = if clause.operator == Operator::In {
            "IN"
        } else {
            "NOT IN"
        };
        return Ok(format!("({lhs} {keyword} ({}))", tokens.join(", ")));
    }

    if let Some(wildcard) = &clause.wildcard {
        if clause.operator != Operator::Eq {
            return Err(AdapterError::OperatorNotSupported {
                reason: "wildcard clauses require ==",
            });
        }
        let comparator = if wildcard.case_sensitive {
            "LIKE"
        } else {
            "ILIKE"
        };
        let token = binder.bind(Value::String(wildcard_pattern(
            wildcard.mode,
            &wildcard.value,
        )));
        return Ok(format!("({lhs} {comparator} {token} ESCAPE '\\')"));
    }

    let sql_op = operator_sql(clause.operator.as_str()).ok_or(
        AdapterError::OperatorNotSupported {
            reason: "operator is not supported by adapter",
        },
    )?;
    let [value] = clause.values.as_slice() else {
        return Err(AdapterError::InvalidPlanShape {
            reason: "comparison operator requires exactly one value",
        });
    };
    match (value, clause.operator) {
        (TypedValue::Null, Operator::Eq) => Ok(format!("({lhs} IS NULL)")),
        (TypedValue::Null, Operator::Ne) => Ok(format!("({lhs} IS NOT NULL)")),
        (TypedValue::Null, _) => Err(AdapterError::OperatorNotSupported {
            reason: "null values only support == and !=",
        }),
        (value, _) => {
            let token = binder.bind(value.to_json());
            Ok(format!("({lhs} {sql_op} {token})"))
        }
    }
}

/// Compiles the filter into `(a) AND (b) ...`. Empty filters yield empty text.
pub fn compile_where<M: MappingSource + ?Sized>(
    plan: &QueryPlan,
    mapping: &M,
) -> AdapterResult<SqlFragment> {
    let mapping = mapping.prepared()?;
    let limits = mapping.limits();
    let clauses = &plan.filter.clauses;
    limit_check("max_predicates", limits.max_predicates, clauses.len())?;

    let mut binder = Binder::default();
    let parts = clauses
        .iter()
        .map(|clause| compile_clause(&mapping, clause, &mut binder))
        .collect::<AdapterResult<Vec<_>>>()?;
    limit_check("max_bound_values", limits.max_bound_values, binder.values.len())?;

    Ok(SqlFragment {
        text: parts.join(" AND "),
        meta: Some(binder.meta()),
        values: binder.values,
    })
}

/// Compiles `ORDER BY "a" DESC, "b" ASC`.
pub fn compile_order_by<M: MappingSource + ?Sized>(
    plan: &QueryPlan,
    mapping: &M,
) -> AdapterResult<SqlFragment> {
    let mapping = mapping.prepared()?;
    if plan.sort.is_empty() {
        return Ok(SqlFragment::default());
    }
    limit_check(
        "max_order_by_keys",
        mapping.limits().max_order_by_keys,
        plan.sort.len(),
    )?;
    let terms = plan
        .sort
        .iter()
        .map(|key| {
            let (name, direction) = match key.strip_prefix('-') {
                Some(name) => (name, "DESC"),
                None => (key.as_str(), "ASC"),
            };
            let field = resolve_field(&mapping, name, "sort")?;
            Ok(format!("{} {direction}", field.sql()))
        })
        .collect::<AdapterResult<Vec<_>>>()?;
    Ok(SqlFragment::text_only(format!("ORDER BY {}", terms.join(", "))))
}

/// Compiles `LIMIT $1 OFFSET $2` from the page; empty without a page size.
pub fn compile_limit_offset<M: MappingSource + ?Sized>(
    plan: &QueryPlan,
    mapping: &M,
) -> AdapterResult<SqlFragment> {
    let mapping = mapping.prepared()?;
    let Some(size) = plan.page.size.filter(|size| *size > 0) else {
        return Ok(SqlFragment::default());
    };
    let number = plan.page.number.filter(|number| *number > 0).unwrap_or(1);
    let offset = (number - 1)
        .checked_mul(size)
        .ok_or(AdapterError::InvalidPlanShape {
            reason: "page offset is out of range",
        })?;
    let values = vec![json!(size), json!(offset)];
    limit_check(
        "max_bound_values",
        mapping.limits().max_bound_values,
        values.len(),
    )?;
    Ok(SqlFragment {
        text: "LIMIT $1 OFFSET $2".to_owned(),
        values,
        meta: None,
    })
}

fn resolve_security_value<'a>(context: &'a Value, key: &str) -> Option<&'a Value> {
    let object = context.as_object()?;
    object.get(key).or_else(|| {
        object
            .get("values")
            .and_then(Value::as_object)
            .and_then(|nested| nested.get(key))
    })
}

/// Compiles the mandatory row-level predicate.
///
/// The bound value is looked up in `security_context` under the predicate's
/// `bound_parameter_key`, directly or under `values`.
pub fn compile_security_predicate<M: MappingSource + ?Sized>(
    plan: &QueryPlan,
    mapping: &M,
    security_context: &Value,
) -> AdapterResult<SqlFragment> {
    let mapping = mapping.prepared()?;
    let predicate = &plan.security.predicate;
    if predicate.field.is_empty()
        || predicate.operator.is_empty()
        || predicate.bound_parameter_key.is_empty()
    {
        return Err(AdapterError::SecurityPredicateRequired {
            reason: "security predicate is incomplete",
        });
    }
    let sql_op =
        operator_sql(&predicate.operator).ok_or(AdapterError::OperatorNotSupported {
            reason: "security predicate operator is not supported",
        })?;
    let field = resolve_field(&mapping, &predicate.field, "security_predicate")?;
    let value = resolve_security_value(security_context, &predicate.bound_parameter_key)
        .ok_or(AdapterError::SecurityPredicateRequired {
            reason: "security predicate binding is missing",
        })?;

    let lhs = field.sql();
    if value.is_null() {
        return match predicate.operator.as_str() {
            "==" => Ok(SqlFragment::text_only(format!("({lhs} IS NULL)"))),
            "!=" => Ok(SqlFragment::text_only(format!("({lhs} IS NOT NULL)"))),
            _ => Err(AdapterError::OperatorNotSupported {
                reason: "null security predicate only supports == and !=",
            }),
        };
    }
    Ok(SqlFragment {
        text: format!("({lhs} {sql_op} $1)"),
        values: vec![value.clone()],
        meta: None,
    })
}

/// Compiles the projection list `"col" AS "field", ...`.
///
/// Uses `fields[<resource type>]` from the plan when present, else the
/// mapping's default projection. Include-driven projection is rejected.
pub fn compile_select<M: MappingSource + ?Sized>(
    plan: &QueryPlan,
    mapping: &M,
) -> AdapterResult<SqlFragment> {
    let mapping = mapping.prepared()?;
    if !plan.include.is_empty() {
        return Err(AdapterError::FeatureNotSupported {
            feature: "include_projection",
        });
    }
    let selected: Vec<String> = match plan
        .normalized_query
        .sparse_fields_for(mapping.resource_type())
    {
        Some(fields) if !fields.is_empty() => fields.to_vec(),
        _ => mapping.default_projection(),
    };
    limit_check(
        "max_selected_columns",
        mapping.limits().max_selected_columns,
        selected.len(),
    )?;

    let mut binder = Binder::default();
    let columns = selected
        .iter()
        .map(|name| {
            let field = resolve_field(&mapping, name, "select")?;
            binder.note(field);
            Ok(format!("{} AS \"{name}\"", field.sql()))
        })
        .collect::<AdapterResult<Vec<_>>>()?;

    Ok(SqlFragment {
        text: columns.join(", "),
        values: Vec::new(),
        meta: Some(binder.meta()),
    })
}
