//! JSON:API / RSQL query compiler.
//!
//! [`query`] compiles client query strings into validated query plans;
//! [`adapter`] turns plans into parameterized PostgreSQL statements.

#![warn(missing_docs)]

pub mod adapter;
pub mod cli;
pub mod error;
pub mod query;

pub use error::{CompileError, ErrorCode, ErrorObject};
pub use query::{
    compile_json_safe, compile_request, compile_request_safe, validate_plan, CompileInput,
    QueryPlan, SafeOutcome,
};
