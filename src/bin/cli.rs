//! Site Mirror CLI
//!
//! Runs one incremental mirror pass, or prunes objects the site no longer
//! publishes.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aws_config::{BehaviorVersion, SdkConfig};
use clap::{Args, Parser, Subcommand};
use site_mirror::{
    error::{AppError, Result},
    models::{Config, StorageBackend},
    pipeline::{
        AwsBackends, BackendFactory, FeedPoller, Pruner, RunCoordinator, SharedBackends,
        termination_signal,
    },
    services::{CloudWatchSink, MetricsSink, Notifier},
    storage::{LocalStore, ObjectStore, S3Store},
    utils::read_lines,
};
use uuid::Uuid;

/// Site Mirror - static copy of a CMS site in S3
#[derive(Parser, Debug)]
#[command(
    name = "site-mirror",
    version,
    about = "Incrementally mirrors a CMS site into an object store"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "site-mirror.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror new and updated pages (default)
    Mirror(MirrorArgs),

    /// Delete stored objects that are no longer published
    Prune(PruneArgs),

    /// Validate configuration
    Validate,
}

#[derive(Args, Debug, Default)]
struct MirrorArgs {
    /// Write to the S3 bucket instead of the local directory
    #[arg(long)]
    save_s3: bool,

    /// Invalidate CloudFront paths of updated pages
    #[arg(long)]
    invalidate_cloudfront: bool,

    /// Number of concurrent workers
    #[arg(long)]
    workers: Option<usize>,

    /// Send failure notifications
    #[arg(long)]
    notifications: bool,

    /// Publish run stats to CloudWatch
    #[arg(long)]
    publish_stats: bool,

    /// Send a heartbeat metric at the end of the run
    #[arg(long)]
    heartbeat: bool,

    /// Newline-delimited list of static file paths
    #[arg(long)]
    static_files: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PruneArgs {
    /// Prune the S3 bucket instead of the local directory
    #[arg(long)]
    save_s3: bool,

    /// Only log what would be deleted
    #[arg(long)]
    dry_run: bool,

    /// Newline-delimited key prefixes that are never deleted
    #[arg(long)]
    preserve_list: Option<PathBuf>,

    /// Newline-delimited list of static file paths
    #[arg(long)]
    static_files: Option<PathBuf>,
}

/// Initialize logging; every line carries the run id.
fn init_logging(level: &str, run_id: &str) {
    let run_id = run_id.to_string();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(move |buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {} [{}] {}",
                run_id,
                buf.timestamp_seconds(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        Config::load(path)?
    } else {
        Config::default()
    };
    config.apply_env();
    Ok(config)
}

/// Read the static file list. A missing default list means no static files.
async fn static_paths(config: &Config, explicit: Option<&Path>) -> Result<Vec<String>> {
    let path = explicit.unwrap_or_else(|| Path::new(&config.source.static_files));
    if explicit.is_none() && !path.exists() {
        log::warn!("Static file list {} not found, skipping", path.display());
        return Ok(Vec::new());
    }
    read_lines(path).await
}

async fn load_sdk_config() -> SdkConfig {
    aws_config::load_defaults(BehaviorVersion::latest()).await
}

fn open_store(config: &Config, sdk_config: Option<&SdkConfig>) -> Result<Arc<dyn ObjectStore>> {
    match (config.storage.backend, sdk_config) {
        (StorageBackend::S3, Some(sdk_config)) => Ok(Arc::new(S3Store::from_conf(
            sdk_config,
            &config.storage.bucket,
        ))),
        (StorageBackend::S3, None) => Err(AppError::config("S3 backend requires AWS configuration")),
        (StorageBackend::Local, _) => Ok(Arc::new(LocalStore::new(&config.storage.local_root))),
    }
}

async fn mirror(mut config: Config, args: MirrorArgs, run_id: &str) -> Result<()> {
    if args.save_s3 {
        config.storage.backend = StorageBackend::S3;
    }
    config.cdn.enabled |= args.invalidate_cloudfront;
    config.metrics.publish_stats |= args.publish_stats;
    config.metrics.heartbeat |= args.heartbeat;
    if let Some(workers) = args.workers {
        config.crawler.workers = workers;
    }
    config.validate()?;

    let static_paths = static_paths(&config, args.static_files.as_deref()).await?;

    let needs_aws = config.storage.backend == StorageBackend::S3
        || config.cdn.enabled
        || config.metrics.publish_stats
        || config.metrics.heartbeat;
    let sdk_config = if needs_aws {
        Some(load_sdk_config().await)
    } else {
        None
    };

    let factory: Arc<dyn BackendFactory> = match &sdk_config {
        Some(sdk_config) => Arc::new(AwsBackends::new(
            sdk_config.clone(),
            config.storage.clone(),
            config
                .cdn
                .enabled
                .then(|| config.cdn.distribution_id.clone()),
        )),
        None => Arc::new(SharedBackends::new(open_store(&config, None)?)),
    };

    let mut coordinator = RunCoordinator::new(config.clone(), factory)
        .with_static_paths(static_paths)
        .with_run_id(run_id);
    if let Some(sdk_config) = &sdk_config {
        let sink: Arc<dyn MetricsSink> =
            Arc::new(CloudWatchSink::from_conf(sdk_config, &config.metrics.namespace));
        coordinator = coordinator.with_metrics(sink);
    }

    let shutdown = async {
        termination_signal().await;
        log::warn!("Press Ctrl+C again to force quit");
        tokio::spawn(async {
            termination_signal().await;
            log::error!("Force quit requested, exiting immediately");
            std::process::exit(1);
        });
    };

    let report = coordinator.run_until(shutdown).await?;
    if report.aborted {
        log::warn!("Run {} stopped by termination signal", report.run_id);
    }
    match report.error {
        Some(error) => Err(AppError::Run(error)),
        None => Ok(()),
    }
}

async fn prune(mut config: Config, args: PruneArgs) -> Result<()> {
    if args.save_s3 {
        config.storage.backend = StorageBackend::S3;
    }
    config.validate()?;

    let sdk_config = if config.storage.backend == StorageBackend::S3 {
        Some(load_sdk_config().await)
    } else {
        None
    };
    let store = open_store(&config, sdk_config.as_ref())?;

    let preserve_path = args
        .preserve_list
        .or_else(|| config.storage.preserve_list.as_ref().map(PathBuf::from));
    let preserved = match preserve_path {
        Some(path) => read_lines(&path).await?,
        None => Vec::new(),
    };
    let static_paths = static_paths(&config, args.static_files.as_deref()).await?;

    let poller = FeedPoller::new(&config.source)?;
    Pruner::new(&poller, store.as_ref())
        .preserve(preserved)
        .dry_run(args.dry_run)
        .prune(&static_paths)
        .await?;
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let run_id = Uuid::new_v4().to_string();

    let config = load_config(&cli.config)?;
    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    init_logging(level, &run_id);

    log::info!("Site mirror starting with config {}", cli.config.display());

    let command = cli
        .command
        .unwrap_or_else(|| Command::Mirror(MirrorArgs::default()));
    let notifications = match &command {
        Command::Mirror(args) => args.notifications || config.notify.enabled,
        _ => false,
    };
    let notifier = if notifications {
        Some(Notifier::from_config(&config.notify)?)
    } else {
        None
    };

    let result = match command {
        Command::Mirror(args) => mirror(config, args, &run_id).await,
        Command::Prune(args) => prune(config, args).await,
        Command::Validate => {
            config.validate()?;
            log::info!("Config OK");
            Ok(())
        }
    };

    if let Err(e) = &result {
        log::error!("Run {} failed: {}", run_id, e);
        if let Some(notifier) = &notifier {
            notifier.notify(&format!("Run {run_id} failed: {e}")).await;
        }
    } else {
        log::info!("Done!");
    }

    result
}
