//! flagmerge CLI
//!
//! Entry point for the `flagmerge` command-line tool, run by the deployment
//! job once per feature flag file (or once per directory with `batch`).

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand};
use flagmerge::config::{default_host_config_path, ConfigError, DEFAULT_REPO_CONFIG};
use flagmerge::pipeline::read_source;
use flagmerge::{
    decide, merged_content_hash, BatchRequest, ConfigDocument, ConfigTarget, ContentHash,
    DeletionPolicy, DeployedState, EffectiveConfig, MergeRequest, Pipeline, PipelineError,
};
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flagmerge")]
#[command(
    about = "Merge feature flag files and decide which AppConfig versions to publish",
    version
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to repo config file (default: .flagmerge.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Do not read the host config file
    #[arg(long, global = true)]
    no_host_config: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DeployedArgs {
    /// JSON file with the last published `version_number` and `content_hash`
    #[arg(long, conflicts_with_all = ["deployed_version", "deployed_hash"])]
    deployed_state: Option<PathBuf>,

    /// Last published hosted configuration version number
    #[arg(long)]
    deployed_version: Option<u64>,

    /// Content hash recorded for the last published version
    #[arg(long)]
    deployed_hash: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge one feature flag file and decide whether to publish it
    Merge {
        /// Feature flag source file
        #[arg(long, short = 's')]
        source: PathBuf,

        /// Configuration name
        #[arg(long, short = 'n')]
        name: String,

        /// Environment name
        #[arg(long, short = 'e')]
        environment: String,

        /// Configuration profile name
        #[arg(long, short = 'p')]
        profile: String,

        /// Create the merge base from the source when none exists
        #[arg(long)]
        force_create: bool,

        #[command(flatten)]
        deployed: DeployedArgs,

        /// Deletion policy: never, marker, mirror
        #[arg(long)]
        deletion_policy: Option<DeletionPolicy>,

        /// Also write the report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Merge every feature flag file in a directory
    Batch {
        /// Directory of feature flag files
        #[arg(long, short = 'd')]
        dir: PathBuf,

        /// Environment name
        #[arg(long, short = 'e')]
        environment: String,

        /// Configuration profile name
        #[arg(long, short = 'p')]
        profile: String,

        /// Create merge bases from the sources when none exist
        #[arg(long)]
        force_create: bool,

        /// Directory of `<configuration>.json` deployed states
        #[arg(long)]
        deployed_state_dir: Option<PathBuf>,

        /// Deletion policy: never, marker, mirror
        #[arg(long)]
        deletion_policy: Option<DeletionPolicy>,

        /// Also write the summary to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print the content hash of a feature flag document
    Hash {
        /// Document to hash
        file: PathBuf,
    },

    /// Decide whether a merged document needs publishing, without merging
    Check {
        /// Merged document
        #[arg(long, short = 'm')]
        merged: PathBuf,

        #[command(flatten)]
        deployed: DeployedArgs,
    },

    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    process::exit(code);
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run(cli: Cli) -> Result<i32, PipelineError> {
    let deletion_override = match &cli.command {
        Commands::Merge { deletion_policy, .. } | Commands::Batch { deletion_policy, .. } => {
            *deletion_policy
        }
        _ => None,
    };
    let config = load_config(cli.config.as_deref(), cli.no_host_config, deletion_override)?;
    debug!(sources = config.sources.len(), "configuration loaded");

    match cli.command {
        Commands::Merge {
            source,
            name,
            environment,
            profile,
            force_create,
            deployed,
            report,
            ..
        } => {
            let request = MergeRequest {
                target: ConfigTarget {
                    configuration: name,
                    environment,
                    profile,
                },
                source,
                force_create,
                deployed: resolve_deployed(&deployed)?,
            };
            let report_out = Pipeline::new(config.settings().clone()).run_file(&request)?;
            emit(&report_out.to_json()?, report.as_deref())?;
            Ok(0)
        }

        Commands::Batch {
            dir,
            environment,
            profile,
            force_create,
            deployed_state_dir,
            report,
            ..
        } => {
            let request = BatchRequest {
                dir,
                environment,
                profile,
                force_create,
                deployed_state_dir,
            };
            let summary = Pipeline::new(config.settings().clone()).run_batch(&request)?;
            emit(&summary.to_json()?, report.as_deref())?;

            if summary.is_success() {
                Ok(0)
            } else {
                eprintln!(
                    "{} of {} configurations failed",
                    summary.failed, summary.total
                );
                Ok(1)
            }
        }

        Commands::Hash { file } => {
            let doc = read_source(&file)?;
            println!("{}", hash_document(&file, &doc)?);
            Ok(0)
        }

        Commands::Check { merged, deployed } => {
            let doc = read_source(&merged)?;
            let hash = hash_document(&merged, &doc)?;
            let decision = decide(&hash, resolve_deployed(&deployed)?.as_ref());

            let output = serde_json::json!({
                "content_hash": hash,
                "decision": decision.as_str(),
                "reason": decision.reason(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(0)
        }

        Commands::Config => {
            println!("{}", config.to_json()?);
            Ok(0)
        }
    }
}

fn load_config(
    repo_config: Option<&Path>,
    no_host_config: bool,
    deletion_policy: Option<DeletionPolicy>,
) -> Result<EffectiveConfig, PipelineError> {
    if let Some(path) = repo_config {
        if !path.exists() {
            return Err(ConfigError::IoError(format!(
                "config file not found: {}",
                path.display()
            ))
            .into());
        }
    }
    let repo_config = repo_config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REPO_CONFIG));

    let host_config = if no_host_config {
        None
    } else {
        default_host_config_path()
    };

    let cli_overrides = deletion_policy.map(|policy| {
        serde_json::json!({
            "deletion": { "policy": policy }
        })
    });

    Ok(EffectiveConfig::build(
        host_config.as_deref(),
        Some(repo_config.as_path()),
        cli_overrides,
    )?)
}

fn resolve_deployed(args: &DeployedArgs) -> Result<Option<DeployedState>, PipelineError> {
    if let Some(path) = &args.deployed_state {
        return DeployedState::from_file(path)
            .map(Some)
            .map_err(|source| PipelineError::DeployedState {
                path: path.clone(),
                source,
            });
    }

    if args.deployed_version.is_none() && args.deployed_hash.is_none() {
        return Ok(None);
    }

    let hash = args
        .deployed_hash
        .as_deref()
        .map(|h| {
            ContentHash::from_hex(h)
                .map(|h| h.to_string())
                .map_err(|e| ConfigError::ValidationError(format!("--deployed-hash: {}", e)))
        })
        .transpose()?;

    Ok(Some(DeployedState::new(args.deployed_version, hash)))
}

fn hash_document(path: &Path, doc: &ConfigDocument) -> Result<ContentHash, PipelineError> {
    merged_content_hash(doc).map_err(|source| PipelineError::MalformedSource {
        path: path.to_path_buf(),
        source,
    })
}

fn emit(json: &str, report_path: Option<&Path>) -> Result<(), PipelineError> {
    println!("{}", json);
    if let Some(path) = report_path {
        fs::write(path, json).map_err(|source| PipelineError::WriteReport {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
