//! dotnest CLI - parallel restore and test-application runner for .NET.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use dotnest::config::{self, Config, DEFAULT_CONFIG_FILE, DEFAULT_CONFIG_TEMPLATE};
use dotnest::discovery::discover_scope;
use dotnest::evaluator::BuildEngineLock;
use dotnest::evaluator::dotnet::DotnetEvaluator;
use dotnest::host::local::LocalHostProvider;
use dotnest::host::{OutputCallback, OutputLine};
use dotnest::module::TestModule;
use dotnest::orchestrator::{Orchestrator, RestoreOrchestrator, RestoreOutcome};
use dotnest::report::ConsoleReporter;
use dotnest::solution::FileSolutionParser;

#[derive(Parser)]
#[command(name = "dotnest")]
#[command(about = "Parallel restore and test-application runner for .NET", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore and run every test application
    Run {
        /// Solution, project, or directory containing one
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        build: BuildArgs,

        /// Override maximum parallel test applications
        #[arg(short, long)]
        parallel: Option<usize>,

        /// Arguments passed through to every test application
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Restore and list test modules without running them
    Collect {
        /// Solution, project, or directory containing one
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        build: BuildArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init,
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Override the number of projects restored at once
    #[arg(long)]
    restore_parallel: Option<usize>,

    /// Build configuration, e.g. Release
    #[arg(long)]
    configuration: Option<String>,

    /// Write a binary build log for every restore
    #[arg(long)]
    diag: bool,
}

impl BuildArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(n) = self.restore_parallel {
            config.build.restore_parallel = n;
        }
        if let Some(configuration) = &self.configuration {
            config
                .build
                .properties
                .insert("Configuration".to_string(), configuration.clone());
        }
        if self.diag {
            config.build.diagnostic_log = true;
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            path,
            build,
            parallel,
            args,
        } => run_session(&cli.config, &path, &build, parallel, args, cli.verbose).await,
        Commands::Collect {
            path,
            build,
            format,
        } => collect_modules(&cli.config, &path, &build, format).await,
        Commands::Validate => validate_config(&cli.config),
        Commands::Init => init_config(&cli.config),
    }
}

fn load_with_overrides(config_path: &Path, build: &BuildArgs) -> Result<Config> {
    let mut config = config::load_config_or_default(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    build.apply(&mut config);
    Ok(config)
}

fn restore_orchestrator(
    config: &Config,
) -> RestoreOrchestrator<DotnetEvaluator, FileSolutionParser> {
    let evaluator = DotnetEvaluator::new(config.build.dotnet_path())
        .with_global_properties(config.build.properties.clone());

    RestoreOrchestrator::new(
        evaluator,
        FileSolutionParser,
        Arc::new(BuildEngineLock::new()),
        config.build.restore_parallelism(),
    )
    .with_diagnostic_log(config.build.diagnostic_log)
}

async fn run_session(
    config_path: &Path,
    path: &Path,
    build: &BuildArgs,
    parallel_override: Option<usize>,
    args: Vec<String>,
    verbose: bool,
) -> Result<()> {
    let mut config = load_with_overrides(config_path, build)?;
    if let Some(parallel) = parallel_override {
        config.dotnest.max_parallel = parallel;
    }

    let scope = discover_scope(path)?;
    info!("Using {}", scope.path().display());

    let mut provider = LocalHostProvider::new(
        config
            .dotnest
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );
    if config.dotnest.stream_output {
        let callback: OutputCallback = Arc::new(|unit, line| match line {
            OutputLine::Stdout(s) => println!("[{}] {}", unit, s),
            OutputLine::Stderr(s) => eprintln!("[{}] {}", unit, s),
        });
        provider = provider.with_output_callback(callback);
    }

    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping test applications");
            ctrl_c_token.cancel();
        }
    });

    let orchestrator = Orchestrator::new(
        restore_orchestrator(&config),
        provider,
        Arc::new(ConsoleReporter::new(verbose)),
        config.dotnest.max_parallel,
    )
    .with_unit_timeout(config.dotnest.unit_timeout())
    .with_args(args)
    .with_cancellation_token(token);

    let outcome = orchestrator.run(&scope).await?;
    std::process::exit(outcome.exit_code());
}

#[derive(serde::Serialize)]
struct CollectOutput<'a> {
    restored: bool,
    modules: &'a [TestModule],
}

async fn collect_modules(
    config_path: &Path,
    path: &Path,
    build: &BuildArgs,
    format: Format,
) -> Result<()> {
    let config = load_with_overrides(config_path, build)?;
    let scope = discover_scope(path)?;
    info!("Using {}", scope.path().display());

    let restore = restore_orchestrator(&config);
    let outcome: RestoreOutcome = tokio::task::spawn_blocking(move || restore.resolve(&scope))
        .await
        .context("Restore workers panicked")??;

    match format {
        Format::Json => {
            let json = serde_json::to_string_pretty(&CollectOutput {
                restored: outcome.restored,
                modules: &outcome.modules,
            })?;
            println!("{}", json);
        }
        Format::Text => {
            println!("Collected {} test modules:", outcome.modules.len());
            for module in &outcome.modules {
                let kind = if module.is_queue_eligible() {
                    "testing platform"
                } else if module.is_test_project {
                    "test project"
                } else {
                    "not a test project"
                };
                println!("  {} [{}]", module.display_name(), kind);
                println!("    {}", module.runnable_path.display());
            }
            if !outcome.restored {
                println!("Restore failed for at least one project.");
            }
        }
    }

    if !outcome.restored {
        std::process::exit(1);
    }
    Ok(())
}

fn validate_config(config_path: &Path) -> Result<()> {
    match config::load_config(config_path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("Settings:");
            println!("  Max parallel: {}", config.dotnest.max_parallel);
            println!("  Unit timeout: {}s", config.dotnest.unit_timeout_secs);
            println!("  Stream output: {}", config.dotnest.stream_output);
            println!("  dotnet: {}", config.build.dotnet_path());
            println!("  Restore parallel: {}", config.build.restore_parallelism());
            println!("  Diagnostic log: {}", config.build.diagnostic_log);
            for (name, value) in &config.build.properties {
                println!("  Property {}: {}", name, value);
            }

            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit manually.",
            path.display()
        );
        std::process::exit(1);
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    println!();
    println!("Edit the configuration as needed, then run:");
    println!("  dotnest run");

    Ok(())
}
