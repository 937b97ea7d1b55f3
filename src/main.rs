use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use runbook::handler::HandlerRegistry;
use runbook::orchestrator::{EngineConfig, Orchestrator, PlaybookSource, StatusReport};
use runbook::playbook::PlaybookDefinition;
use runbook::storage::PlaybookStore;
use runbook::workflow::{ExecutionMode, ExecutionOptions};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "runbook")]
#[command(version, about = "Run declarative playbooks with conditional, parallel, and retryable steps")]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Storage root for playbooks and workflow history
    #[arg(long, default_value = ".runbook", global = true)]
    storage_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a playbook by stored name or file path
    Run {
        /// Stored playbook name, or a path to a playbook JSON file
        playbook: String,

        /// Parameter as name=value, repeatable; values parse as JSON when possible
        #[arg(short, long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Environment tag exposed to conditions as $env.context
        #[arg(short, long, default_value = "dev")]
        env: String,

        /// Resolve conditions and placeholders but execute nothing
        #[arg(long)]
        dry_run: bool,

        /// Keep going after a failed step
        #[arg(long)]
        continue_on_error: bool,

        /// Treat validation warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Validate a playbook file without executing it
    Validate {
        /// Path to a playbook JSON file
        path: PathBuf,
    },

    /// Store a playbook file for later runs by name
    Save {
        /// Path to a playbook JSON file
        path: PathBuf,
    },

    /// Show one workflow by id, or an overview of recent workflows
    Status {
        /// Workflow id
        id: Option<Uuid>,
    },

    /// Request a cooperative stop of a running workflow
    Stop {
        /// Workflow id
        id: Uuid,
    },

    /// List stored playbooks
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("runbook={default}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let orchestrator = Orchestrator::new(
        PlaybookStore::new(&cli.storage_dir),
        HandlerRegistry::production(),
        EngineConfig::default(),
    );

    match cli.command {
        Commands::Run {
            playbook,
            params,
            env,
            dry_run,
            continue_on_error,
            strict,
        } => {
            let source = playbook_source(&playbook)?;
            let options = ExecutionOptions {
                parameters: parse_params(&params)?,
                mode: if strict {
                    ExecutionMode::Strict
                } else {
                    ExecutionMode::Standard
                },
                environment: env,
                dry_run,
                continue_on_error,
                workflow_id: None,
            };

            let result = orchestrator.run_playbook(source, options).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Validate { path } => {
            let definition = load_definition(&path)?;
            let report = orchestrator.validate_playbook(&definition);
            for warning in &report.warnings {
                println!("warning: {warning}");
            }
            if report.is_valid() {
                println!("{}: valid", definition.name);
                Ok(ExitCode::SUCCESS)
            } else {
                for error in &report.errors {
                    println!("error: {error}");
                }
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::Save { path } => {
            let definition = load_definition(&path)?;
            let report = orchestrator.save_playbook(&definition)?;
            for warning in &report.warnings {
                println!("warning: {warning}");
            }
            println!("saved playbook '{}'", definition.name);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Status { id } => {
            match orchestrator.workflow_status(id)? {
                StatusReport::Instance(instance) => {
                    println!("{}", serde_json::to_string_pretty(&instance)?);
                }
                StatusReport::Summary { active, recent } => {
                    println!("active: {}", active.len());
                    for instance in &active {
                        println!("  {} {} ({})", instance.id, instance.playbook, instance.status);
                    }
                    println!("recent: {}", recent.len());
                    for instance in recent.iter().rev().take(10) {
                        println!("  {} {} ({})", instance.id, instance.playbook, instance.status);
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Stop { id } => {
            orchestrator.stop_workflow(id)?;
            println!("stop requested for {id}");
            Ok(ExitCode::SUCCESS)
        }

        Commands::List => {
            for name in orchestrator.list_playbooks()? {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// A run target naming an existing file is inline; anything else is a
/// stored playbook name
fn playbook_source(target: &str) -> Result<PlaybookSource> {
    let path = Path::new(target);
    if path.exists() {
        Ok(PlaybookSource::Inline(load_definition(path)?))
    } else {
        Ok(PlaybookSource::Stored(target.to_string()))
    }
}

fn load_definition(path: &Path) -> Result<PlaybookDefinition> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading playbook file {}", path.display()))?;
    PlaybookDefinition::from_json(&json)
        .with_context(|| format!("parsing playbook file {}", path.display()))
}

/// Parse repeated `name=value` arguments. Values that parse as JSON keep
/// their type; everything else is a string.
fn parse_params(params: &[String]) -> Result<HashMap<String, Value>> {
    let mut map = HashMap::new();
    for param in params {
        let (name, value) = param
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid parameter '{param}', expected name=value"))?;
        if name.is_empty() {
            return Err(anyhow!("invalid parameter '{param}', empty name"));
        }
        let parsed = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        map.insert(name.to_string(), parsed);
    }
    Ok(map)
}
