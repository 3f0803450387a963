//! Include, sort and sparse-fieldset allowlists.

use crate::error::{CompileError, Result};
use crate::query::normalize::NormalizedQuery;
use crate::query::policy::QueryDimensions;

/// Every include path must appear in `include_allowlist`.
pub fn enforce_include_allowlist(include: &[String], dims: &QueryDimensions) -> Result<()> {
    match include
        .iter()
        .find(|path| !dims.include_allowlist.contains(path))
    {
        Some(path) => Err(CompileError::IncludeNotAllowed { path: path.clone() }),
        None => Ok(()),
    }
}

/// Every sort key, minus a leading `-`, must appear in `sortable_fields`.
pub fn enforce_sort_allowlist(sort: &[String], dims: &QueryDimensions) -> Result<()> {
    for key in sort {
        let field = key.strip_prefix('-').unwrap_or(key);
        if !dims.sortable_fields.iter().any(|allowed| allowed == field) {
            return Err(CompileError::SortNotAllowed {
                field: field.to_owned(),
            });
        }
    }
    Ok(())
}

/// Every sparse fieldset must name an allowlisted resource and fields.
pub fn enforce_fields_allowlist(query: &NormalizedQuery, dims: &QueryDimensions) -> Result<()> {
    for (resource, fields) in query.sparse_fields() {
        let allowed = dims.fields_allowlist.get(resource);
        for field in fields {
            if !allowed.is_some_and(|list| list.contains(field)) {
                return Err(CompileError::FieldsNotAllowed {
                    resource: resource.to_owned(),
                    field: field.clone(),
                });
            }
        }
    }
    Ok(())
}
