//! Pinpoint CLI
//!
//! The `pinpoint` command exposes change resolution and bisection primitives.
//!
//! ## Commands
//!
//! - `resolve`: Expand an abbreviated commit hash in a registered repository
//! - `deps`: List the dependency pins in a commit's DEPS file
//! - `midpoint`: Compute the change halfway between two changes
//! - `quests`: Show the quest pipeline a request describes
//! - `values`: Read chart values from an output isolate in the local artifact store
//! - `task`: Show the status of a swarming task

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, Level};

use pinpoint_core::quest::{ReadChartJsonValue, ReadGraphJsonValue};
use pinpoint_core::{
    generate_quests, Change, ChangeDict, Dep, DepDict, Quest, Repositories, ServiceConfig,
    Swarming,
};

#[derive(Parser)]
#[command(name = "pinpoint")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bisect performance regressions across commits and DEPS rolls", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Repository registry JSON (`{"name": {"repository_url": ...}}`)
    #[arg(long, global = true, env = "PINPOINT_REPOSITORIES")]
    repositories: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a commit in a registered repository to its full hash
    Resolve {
        /// Repository short name or URL
        repository: String,

        /// Full or abbreviated commit hash
        git_hash: String,
    },

    /// List the dependencies pinned by a commit's DEPS file
    Deps {
        /// Repository short name or URL
        repository: String,

        /// Full or abbreviated commit hash
        git_hash: String,
    },

    /// Compute the midpoint between two changes
    Midpoint {
        /// First change, as change JSON or @path to a JSON file
        #[arg(long)]
        a: String,

        /// Second change, as change JSON or @path to a JSON file
        #[arg(long)]
        b: String,
    },

    /// Generate the quest pipeline for a request
    Quests {
        /// Request fields as a JSON object, or @path to a JSON file
        #[arg(long)]
        request: String,
    },

    /// Read values from a test's output isolate
    Values {
        /// Output isolate digest in the artifact store (PINPOINT_ARTIFACT_DIR)
        isolate: String,

        #[arg(long)]
        chart: String,

        #[arg(long)]
        tir_label: Option<String>,

        /// Trace name (chartjson defaults to "summary")
        #[arg(long)]
        trace: Option<String>,

        /// Read graphjson output instead of chartjson (requires --trace)
        #[arg(long)]
        graphjson: bool,
    },

    /// Show a swarming task's state and output (PINPOINT_SWARMING_SERVER)
    Task {
        task_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    pinpoint_core::init_tracing(cli.json, level);

    let mut config = ServiceConfig::from_env();
    if let Some(path) = cli.repositories {
        config = config.with_repositories(path);
    }

    match cli.command {
        Commands::Resolve {
            repository,
            git_hash,
        } => cmd_resolve(&config, &repository, &git_hash).await,
        Commands::Deps {
            repository,
            git_hash,
        } => cmd_deps(&config, &repository, &git_hash).await,
        Commands::Midpoint { a, b } => cmd_midpoint(&config, &a, &b).await,
        Commands::Quests { request } => cmd_quests(&request),
        Commands::Values {
            isolate,
            chart,
            tir_label,
            trace,
            graphjson,
        } => cmd_values(&config, &isolate, chart, tir_label, trace, graphjson).await,
        Commands::Task { task_id } => cmd_task(&config, &task_id).await,
    }
}

fn repositories(config: &ServiceConfig) -> Result<Repositories> {
    let repos = config
        .repositories()
        .context("Failed to load repository registry")?;
    if repos.registry().is_empty() {
        anyhow::bail!("No repositories registered; pass --repositories or set PINPOINT_REPOSITORIES");
    }
    Ok(repos)
}

/// Inline JSON, or the contents of a file when prefixed with `@`.
fn read_json_arg(arg: &str) -> Result<Value> {
    let text = match arg.strip_prefix('@') {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?
        }
        None => arg.to_string(),
    };
    serde_json::from_str(&text).context("Invalid JSON argument")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolve a commit
async fn cmd_resolve(config: &ServiceConfig, repository: &str, git_hash: &str) -> Result<()> {
    let repos = repositories(config)?;
    let dep = Dep::from_dict(&DepDict::new(repository, git_hash), &repos)
        .await
        .with_context(|| format!("Failed to resolve {repository}@{git_hash}"))?;

    print_json(&dep.as_dict(repos.registry())?)
}

/// List DEPS pins
async fn cmd_deps(config: &ServiceConfig, repository: &str, git_hash: &str) -> Result<()> {
    let repos = repositories(config)?;
    let dep = Dep::from_dict(&DepDict::new(repository, git_hash), &repos).await?;
    let deps = dep.deps(&repos).await.context("Failed to read DEPS")?;

    if deps.is_empty() {
        println!("No dependencies pinned at {dep}");
        return Ok(());
    }
    for pin in &deps {
        println!("{:<30} {}", pin.repository(), pin.git_hash());
    }
    Ok(())
}

/// Compute a midpoint
async fn cmd_midpoint(config: &ServiceConfig, a: &str, b: &str) -> Result<()> {
    let repos = repositories(config)?;
    let dict_a: ChangeDict = serde_json::from_value(read_json_arg(a)?).context("Invalid change A")?;
    let dict_b: ChangeDict = serde_json::from_value(read_json_arg(b)?).context("Invalid change B")?;
    let change_a = Change::from_dict(&dict_a, &repos).await?;
    let change_b = Change::from_dict(&dict_b, &repos).await?;

    info!(a = %change_a, b = %change_b, "computing midpoint");
    match Change::midpoint(&change_a, &change_b, &repos).await? {
        Some(midpoint) => print_json(&midpoint.as_dict(repos.registry())?),
        None => {
            println!("No midpoint: {change_a} and {change_b} are adjacent");
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct QuestsOutput {
    arguments: BTreeMap<String, String>,
    quests: Vec<Quest>,
}

/// Generate quests
fn cmd_quests(request: &str) -> Result<()> {
    let Value::Object(fields) = read_json_arg(request)? else {
        anyhow::bail!("Request must be a JSON object");
    };
    // Non-string values (e.g. a dimensions list) are passed on as JSON text.
    let request: BTreeMap<String, String> = fields
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect();

    let (arguments, quests) = generate_quests(&request)?;
    print_json(&QuestsOutput { arguments, quests })
}

async fn read_values(
    config: &ServiceConfig,
    isolate: &str,
    chart: String,
    tir_label: Option<String>,
    trace: Option<String>,
    graphjson: bool,
) -> Result<Vec<f64>> {
    let store = config
        .isolate_store()
        .context("Failed to open artifact store")?;
    let values = if graphjson {
        let trace = trace.context("--graphjson requires --trace")?;
        ReadGraphJsonValue::new(chart, trace)
            .values(isolate, &store)
            .await?
    } else {
        ReadChartJsonValue::new(chart, tir_label, trace)
            .values(isolate, &store)
            .await?
    };
    Ok(values)
}

/// Read output values
async fn cmd_values(
    config: &ServiceConfig,
    isolate: &str,
    chart: String,
    tir_label: Option<String>,
    trace: Option<String>,
    graphjson: bool,
) -> Result<()> {
    let values = read_values(config, isolate, chart, tir_label, trace, graphjson)
        .await
        .with_context(|| format!("Failed to read values from {isolate}"))?;
    print_json(&values)
}

/// Show a swarming task
async fn cmd_task(config: &ServiceConfig, task_id: &str) -> Result<()> {
    let swarming = config
        .swarming_client()
        .context("Failed to build swarming client")?;
    let result = swarming
        .task_result(task_id)
        .await
        .with_context(|| format!("Failed to fetch task {task_id}"))?;
    print_json(&result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_midpoint() {
        let cli = Cli::try_parse_from([
            "pinpoint",
            "--json",
            "midpoint",
            "--a",
            "{}",
            "--b",
            "@change.json",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Midpoint { .. }));
    }

    #[test]
    fn test_read_json_arg_inline_and_file() {
        assert_eq!(read_json_arg(r#"{"target": "x"}"#).unwrap()["target"], "x");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        std::fs::write(&path, r#"{"chart": "c"}"#).unwrap();
        let value = read_json_arg(&format!("@{}", path.display())).unwrap();
        assert_eq!(value["chart"], "c");
    }

    #[tokio::test]
    async fn test_read_values_from_artifact_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::from_env();
        config.artifact_dir = dir.path().to_path_buf();

        let store = config.isolate_store().unwrap();
        let chartjson = serde_json::json!({
            "charts": {"pcv1-cold@@timeToFirst": {"summary": {"type": "scalar", "value": 42.5}}}
        });
        let file = store.put(chartjson.to_string().as_bytes()).unwrap();
        let manifest = store
            .put_manifest([("chartjson-output.json", file.as_str())])
            .unwrap();

        let values = read_values(
            &config,
            &manifest,
            "timeToFirst".to_string(),
            Some("pcv1-cold".to_string()),
            None,
            false,
        )
        .await
        .unwrap();
        assert_eq!(values, vec![42.5]);

        let err = read_values(&config, &manifest, "timeToFirst".to_string(), None, None, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--trace"));
    }

    #[test]
    fn test_quests_rejects_non_object() {
        assert!(cmd_quests("[1, 2]").is_err());
    }
}
