use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mswarm_core::config::AppConfig;
use mswarm_core::types::DataMap;
use mswarm_runtime::MRuntime;

#[derive(Parser)]
#[command(name = "mswarm", version, about = "Compile and run M-language agent swarms")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "mswarm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the token stream of an M source file
    Tokens {
        /// Source file, or `-` for stdin
        file: PathBuf,
    },
    /// Validate an M source file without running it
    Check {
        /// Source file, or `-` for stdin
        file: PathBuf,
    },
    /// Compile an M source file and print the compiled swarm as JSON
    Compile {
        /// Source file, or `-` for stdin
        file: PathBuf,
        /// Print a short summary instead of the full spec
        #[arg(long)]
        summary: bool,
    },
    /// Compile and execute an M source file
    Run {
        /// Source file, or `-` for stdin
        file: PathBuf,
        /// Initial data entry; the value is parsed as JSON, else taken as a string
        #[arg(short, long = "data", value_name = "KEY=VALUE")]
        data: Vec<String>,
        /// JSON object file with initial data (merged before --data)
        #[arg(long)]
        data_file: Option<PathBuf>,
    },
    /// Have the configured model design a swarm for a request, then run it
    Orchestrate {
        #[arg(trailing_var_arg = true, required = true)]
        request: Vec<String>,
    },
    /// Print a starter swarm for a task
    Template {
        #[arg(trailing_var_arg = true, required = true)]
        task: Vec<String>,
    },
    /// Print the M language syntax guide
    Guide,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mswarm=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that need no config or runtime
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "mswarm", &mut io::stdout());
            return Ok(());
        }
        Commands::Guide => {
            print!("{}", mswarm_runtime::authoring::LANGUAGE_GUIDE);
            return Ok(());
        }
        Commands::Template { task } => {
            print!("{}", mswarm_runtime::authoring::template(&task.join(" ")));
            return Ok(());
        }
        Commands::Tokens { file } => {
            let source = read_source(file)?;
            for token in mswarm_lang::tokenize(&source)? {
                println!("{:>4}:{:<4} {:<14} {}", token.line, token.column, token.kind.label(), token.text);
            }
            return Ok(());
        }
        _ => {}
    }

    let config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if !cli.config.exists() {
        info!(path = %cli.config.display(), "No config file, using defaults");
    }
    let runtime = MRuntime::from_config(config)?;

    match cli.command {
        Commands::Check { file } => {
            let validation = runtime.validate(&read_source(&file)?);
            println!("{}", serde_json::to_string_pretty(&validation)?);
            if !validation.valid {
                std::process::exit(1);
            }
        }
        Commands::Compile { file, summary } => {
            let spec = runtime.parse_and_compile(&read_source(&file)?)?;
            if summary {
                println!("{}", serde_json::to_string_pretty(&runtime.summarize(&spec))?);
            } else {
                println!("{}", runtime.to_json(&spec)?);
            }
        }
        Commands::Run { file, data, data_file } => {
            let source = read_source(&file)?;
            let initial = initial_data(data_file.as_deref(), &data)?;
            let result = runtime.execute_source(&source, initial).await?;
            println!("{}", result.to_json()?);
            if !result.success {
                warn!(errors = result.errors.len(), "Swarm did not succeed");
                std::process::exit(1);
            }
        }
        Commands::Orchestrate { request } => {
            let run = runtime.orchestrate(&request.join(" ")).await?;
            eprintln!("{}", run.source);
            println!("{}", run.result.to_json()?);
            if !run.result.success {
                std::process::exit(1);
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(runtime.config())?);
        }
        Commands::Tokens { .. }
        | Commands::Template { .. }
        | Commands::Guide
        | Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut source = String::new();
        io::stdin().read_to_string(&mut source)?;
        return Ok(source);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Initial data from an optional JSON file, overridden by `KEY=VALUE` pairs.
fn initial_data(file: Option<&Path>, pairs: &[String]) -> anyhow::Result<DataMap> {
    let mut data = DataMap::new();
    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        match serde_json::from_str(&content)? {
            Value::Object(map) => data.extend(map),
            _ => bail!("{} must contain a JSON object", path.display()),
        }
    }
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("invalid --data entry '{}', expected KEY=VALUE", pair);
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        data.insert(key.trim().to_string(), value);
    }
    Ok(data)
}
