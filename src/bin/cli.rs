//! Binary entry point for the jsonapi-rsql command-line compiler.
#![forbid(unsafe_code)]

use std::error::Error;
use std::io;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use jsonapi_rsql::cli::{run_compile, run_sql, run_validate_plan, CompileOptions, SqlOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "jsonapi-rsql",
    version,
    about = "Compile JSON:API query strings with RSQL filters into query plans",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CompileCmd {
    #[arg(
        long = "in",
        value_name = "FILE",
        help = "JSON input with raw_query or query, policy and context"
    )]
    input: Option<PathBuf>,

    #[arg(
        long,
        value_name = "QUERY",
        help = "Raw query string compiled against the project config"
    )]
    query: Option<String>,

    #[arg(long, value_name = "FILE", help = "Write the result here instead of stdout")]
    out: Option<PathBuf>,

    #[arg(
        long,
        value_name = "FILE",
        env = "JSONAPI_RSQL_CONFIG",
        help = "Project config (defaults to ./project.config.json)"
    )]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SqlCmd {
    #[arg(long = "plan", value_name = "FILE", help = "Plan or compile result")]
    plan: PathBuf,

    #[arg(long, value_name = "FILE", help = "PostgreSQL mapping document")]
    mapping: PathBuf,

    #[arg(
        long,
        value_name = "FILE",
        help = "JSON object holding the security predicate value"
    )]
    security_context: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Write the statement here instead of stdout")]
    out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a request into a plan envelope
    Compile(CompileCmd),
    /// Check that a file holds a structurally valid plan
    ValidatePlan {
        #[arg(long = "in", value_name = "FILE")]
        input: PathBuf,
    },
    /// Compile a plan into a parameterized PostgreSQL SELECT
    Sql(SqlCmd),
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut stdout = io::stdout().lock();

    match cli.command {
        Command::Compile(cmd) => {
            let cwd = std::env::current_dir()?;
            let opts = CompileOptions {
                input: cmd.input,
                query: cmd.query,
                out: cmd.out,
                config: cmd.config,
            };
            run_compile(&opts, &cwd, &mut stdout)?;
        }
        Command::ValidatePlan { input } => {
            run_validate_plan(&input, &mut stdout)?;
        }
        Command::Sql(cmd) => {
            let opts = SqlOptions {
                plan: cmd.plan,
                mapping: cmd.mapping,
                security_context: cmd.security_context,
                out: cmd.out,
            };
            run_sql(&opts, &mut stdout)?;
        }
    }

    Ok(())
}
