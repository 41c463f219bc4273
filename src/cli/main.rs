//! CLI binary entry point for ingest-sql-compile
//!
//! Reads a compile request (JSON or YAML, a file or `-` for stdin) and
//! writes the generated SQL as a JSON list of results.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ingest_sql_compiler::config::CompilerConfig;
use ingest_sql_compiler::dialect::DialectKind;
use ingest_sql_compiler::generator::{CompileRequest, Compiler};

#[derive(Parser)]
#[command(name = "ingest-sql-compile")]
#[command(about = "Compile a declarative ingest request into SQL")]
#[command(version)]
struct Cli {
    /// Request file (.json, .yaml or .yml), or '-' for JSON/YAML on stdin
    request: String,

    /// Target dialect, overriding the configuration
    #[arg(short, long)]
    dialect: Option<DialectKind>,

    /// Fold identifiers to upper case
    #[arg(long)]
    upper_case: bool,

    /// Render batch ids and timestamps as substitution patterns
    #[arg(long)]
    placeholders: bool,

    /// Directory containing ingest-compiler.toml
    #[arg(short, long, default_value = ".")]
    config_dir: PathBuf,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(short, long)]
    pretty: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = CompilerConfig::load(&cli.config_dir).with_context(|| {
        format!("Failed to load configuration from {}", cli.config_dir.display())
    })?;

    let mut dialect = config.dialect();
    if let Some(kind) = cli.dialect {
        dialect = ingest_sql_compiler::Dialect::from_kind(kind)
            .with_upper_case(config.dialect.upper_case);
    }
    if cli.upper_case {
        dialect = dialect.with_upper_case(true);
    }

    let mut options = config.planner_options();
    options.placeholder_mode = cli.placeholders;

    let mut request = read_request(&cli.request)?;
    if request.datasets.metadata.is_none() {
        request.datasets.metadata = Some(config.metadata_dataset());
    }

    let compiler = Compiler::new(dialect, options);
    let results = compiler
        .compile_request(&request)
        .with_context(|| format!("Failed to compile {}", cli.request))?;

    let json = if cli.pretty {
        serde_json::to_string_pretty(&results)
    } else {
        serde_json::to_string(&results)
    }
    .context("Failed to serialize results")?;

    match &cli.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(results = results.len(), output = %path.display(), "Wrote compiled SQL");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json).context("Failed to write to stdout")?;
        }
    }

    Ok(())
}

fn read_request(source: &str) -> Result<CompileRequest> {
    if source == "-" {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("Failed to read request from stdin")?;
        // YAML is a superset of JSON
        return serde_yaml::from_str(&content).context("Failed to parse request from stdin");
    }

    let path = Path::new(source);
    if !path.exists() {
        bail!("Request file not found: {}", path.display());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON request {}", path.display())),
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML request {}", path.display())),
        _ => bail!(
            "Unsupported request format: {} (expected .json, .yaml or .yml)",
            path.display()
        ),
    }
}
