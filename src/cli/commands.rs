use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::adapter::{compile_select_statement, plan_from_json, prepare_mapping_json};
use crate::cli::config::ProjectConfig;
use crate::cli::CliError;
use crate::query::{compile_json_safe, compile_request_safe, validate_plan, CompileInput};

/// Options for `compile`.
#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    /// JSON input document with `raw_query`/`query`, `policy` and `context`.
    pub input: Option<PathBuf>,
    /// Ad-hoc raw query compiled against the project config.
    pub query: Option<String>,
    /// Output file; stdout when absent.
    pub out: Option<PathBuf>,
    /// Explicit project config.
    pub config: Option<PathBuf>,
}

/// Options for `sql`.
#[derive(Clone, Debug, Default)]
pub struct SqlOptions {
    /// Plan document, or a compile envelope carrying one under `plan`.
    pub plan: PathBuf,
    /// Mapping document.
    pub mapping: PathBuf,
    /// Security context holding the bound parameter; `{}` when absent.
    pub security_context: Option<PathBuf>,
    /// Output file; stdout when absent.
    pub out: Option<PathBuf>,
}

/// Compiles a request and writes the `{ok, plan | errors}` envelope.
///
/// Compilation failures are reported in the envelope, not as an error.
pub fn run_compile(
    opts: &CompileOptions,
    cwd: &Path,
    stdout: &mut dyn Write,
) -> Result<(), CliError> {
    let outcome = match (&opts.input, &opts.query) {
        (Some(path), None) => {
            let document = read_json(path, "compile input")?;
            compile_json_safe(&document)
        }
        (None, Some(query)) => {
            let loaded = ProjectConfig::load(opts.config.clone(), cwd)?;
            let input = CompileInput {
                raw_query: Some(query.clone()),
                query: None,
                policy: loaded.config.policy_or_default(),
                context: loaded.config.context_or_default(),
            };
            compile_request_safe(&input)
        }
        _ => return Err(CliError::Usage("exactly one of --in or --query is required")),
    };
    info!(ok = outcome.ok, "cli.compile.done");
    emit(&outcome, opts.out.as_deref(), stdout)
}

/// Validates a plan document and prints `ok`.
///
/// Accepts either a bare plan or a compile envelope with a `plan` member.
pub fn run_validate_plan(input: &Path, stdout: &mut dyn Write) -> Result<(), CliError> {
    let document = read_json(input, "plan input")?;
    validate_plan(unwrap_plan(&document))?;
    writeln!(stdout, "ok")?;
    Ok(())
}

/// Compiles a plan and mapping into one parameterized `SELECT`.
pub fn run_sql(opts: &SqlOptions, stdout: &mut dyn Write) -> Result<(), CliError> {
    let document = read_json(&opts.plan, "plan input")?;
    let plan = plan_from_json(unwrap_plan(&document))?;
    let mapping = prepare_mapping_json(&read_json(&opts.mapping, "mapping")?)?;
    let security_context = match &opts.security_context {
        Some(path) => read_json(path, "security context")?,
        None => Value::Object(Default::default()),
    };
    let statement = compile_select_statement(&plan, &mapping, &security_context)?;
    info!(values = statement.values.len(), "cli.sql.done");
    emit(&statement, opts.out.as_deref(), stdout)
}

fn unwrap_plan(document: &Value) -> &Value {
    document.get("plan").unwrap_or(document)
}

fn read_json(path: &Path, label: &str) -> Result<Value, CliError> {
    if !path.exists() {
        return Err(CliError::Message(format!(
            "{label} does not exist: {}",
            path.display()
        )));
    }
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|err| CliError::Message(format!("invalid JSON in {label}: {err}")))
}

fn emit<T: Serialize>(
    value: &T,
    out: Option<&Path>,
    stdout: &mut dyn Write,
) -> Result<(), CliError> {
    let mut rendered = serde_json::to_string_pretty(value)?;
    rendered.push('\n');
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, rendered)?;
        }
        None => stdout.write_all(rendered.as_bytes())?,
    }
    Ok(())
}
