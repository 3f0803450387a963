#![forbid(unsafe_code)]

//! PostgreSQL adapter.
//!
//! Maps a [`crate::query::QueryPlan`] onto a single table through a
//! prepared mapping and emits one parameterized `SELECT`. No connection or
//! execution happens here.

/// Statement assembly and placeholder renumbering across fragments.
pub mod assemble;

/// Plan to fragment compilation.
pub mod compile;

/// Adapter error catalog.
pub mod error;

/// Mapping documents and their prepared form.
///
/// Identifiers are validated and quoted once; expression fields must be
/// explicitly trusted.
pub mod mapping;

/// Fragment type and `$n` renumbering.
pub mod placeholder;

pub use assemble::{
    assemble_select_sql, assemble_select_sql_json, compile_select_statement, AssembleInput,
    SqlStatement,
};
pub use compile::{
    compile_limit_offset, compile_order_by, compile_security_predicate, compile_select,
    compile_where, operator_sql, plan_from_json,
};
pub use error::{AdapterError, AdapterErrorCode, AdapterResult};
pub use mapping::{
    ensure_prepared_mapping, get_table_sql, prepare_mapping, prepare_mapping_json,
    AdapterLimits, MappingDocument, MappingSource, PreparedMapping, DIALECT_PROFILE,
};
pub use placeholder::{renumber_placeholders, SqlFragment};
