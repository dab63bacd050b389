use crate::{
    diff, EngineConfig, FsBlobStore, Metrics, ProgressTracker, RunConfiguration, RunOrchestrator,
    RunRecord, Scene, SceneResult,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pixel-truth")]
#[command(about = "Visual-regression capture and diff engine")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "DevTools endpoint of the remote browser")]
    pub endpoint: Option<String>,

    #[arg(long, help = "Maximum concurrent browser sessions")]
    pub sessions: Option<usize>,

    #[arg(long, help = "Settle delay after navigation, in milliseconds")]
    pub settle: Option<u64>,

    #[arg(long, help = "Run browser sessions with a visible window")]
    pub headful: bool,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture every scene in a configuration and compare against truth
    Run {
        #[arg(short, long, help = "Run configuration file (JSON)")]
        config: PathBuf,

        #[arg(
            short,
            long,
            default_value = "pixel-truth-store",
            help = "Image store directory"
        )]
        store: PathBuf,

        #[arg(long, help = "Prior run record to compare against")]
        truth: Option<PathBuf>,

        #[arg(
            short,
            long,
            default_value = "pixel-truth.results.json",
            help = "Where to write the run record"
        )]
        results: PathBuf,

        #[arg(
            long,
            default_value = "pixel-truth.changes.json",
            help = "Where to write the pending-changes record"
        )]
        changes: PathBuf,
    },

    /// Promote the last run's pending changes to the truth baseline
    Approve {
        #[arg(
            long,
            default_value = "pixel-truth.changes.json",
            help = "Pending-changes record written by a prior run"
        )]
        changes: PathBuf,

        #[arg(
            long,
            default_value = "pixel-truth.truth.json",
            help = "Truth baseline to update"
        )]
        truth: PathBuf,
    },

    /// Render the visual diff between two stored images
    Diff {
        #[arg(long, help = "Digest of the new image")]
        new: String,

        #[arg(long, help = "Digest of the old image")]
        old: String,

        #[arg(
            short,
            long,
            default_value = "pixel-truth-store",
            help = "Image store directory"
        )]
        store: PathBuf,

        #[arg(short, long, help = "Output PNG path")]
        output: PathBuf,
    },

    /// Validate a run configuration file
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },

    /// Write an example configuration file
    Init {
        #[arg(default_value = "pixel-truth.config.json", help = "Destination path")]
        path: PathBuf,
    },
}

/// Titles that differ between a run and its truth
#[derive(Debug, Default)]
pub struct TruthComparison {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl TruthComparison {
    pub fn compare(current: &[SceneResult], truth: &[SceneResult]) -> Self {
        let added = current
            .iter()
            .filter(|c| !truth.iter().any(|t| t.title == c.title))
            .map(|c| c.title.clone())
            .collect();
        let removed = truth
            .iter()
            .filter(|t| !current.iter().any(|c| c.title == t.title))
            .map(|t| t.title.clone())
            .collect();
        let changed = current
            .iter()
            .filter(|c| {
                truth
                    .iter()
                    .any(|t| t.title == c.title && t.image != c.image)
            })
            .map(|c| c.title.clone())
            .collect();

        Self {
            added,
            removed,
            changed,
        }
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

pub struct CliRunner {
    pub engine: EngineConfig,
    pub metrics: Arc<Metrics>,
}

impl CliRunner {
    pub fn new(engine: EngineConfig, metrics: Arc<Metrics>) -> Self {
        Self { engine, metrics }
    }

    pub async fn run(&self, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
        match command {
            Commands::Run {
                config,
                store,
                truth,
                results,
                changes,
            } => self.run_test(config, store, truth, results, changes).await,
            Commands::Approve { changes, truth } => self.approve(changes, truth).await,
            Commands::Diff {
                new,
                old,
                store,
                output,
            } => self.run_diff(new, old, store, output).await,
            Commands::Validate { config } => self.validate(config).await,
            Commands::Init { path } => self.init(path).await,
        }
    }

    async fn run_test(
        &self,
        config_path: PathBuf,
        store_path: PathBuf,
        truth_path: Option<PathBuf>,
        results_path: PathBuf,
        changes_path: PathBuf,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let raw = fs::read_to_string(&config_path).await?;
        let configuration: RunConfiguration = serde_json::from_str(&raw)?;
        configuration.validate()?;

        let store = Arc::new(FsBlobStore::open(&store_path).await?);
        let orchestrator =
            RunOrchestrator::with_metrics(self.engine.clone(), store, self.metrics.clone());

        let tracker = Arc::new(ProgressTracker::new());
        let printer = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
                loop {
                    interval.tick().await;
                    let (completed, total) = (tracker.completed(), tracker.total());
                    if total == 0 {
                        continue;
                    }
                    if completed >= total {
                        break;
                    }
                    println!("Capturing {} of {}", completed + 1, total);
                }
            })
        };

        let record = orchestrator
            .run_with_progress(configuration, tracker)
            .await?;
        printer.abort();

        fs::write(&results_path, serde_json::to_string_pretty(&record)?).await?;
        info!("Run record written to {}", results_path.display());

        if let Some(error) = &record.progress.error {
            return Err(format!("run failed: {error}").into());
        }

        println!(
            "Captured {} scene(s), results saved to {}",
            record.results.len(),
            results_path.display()
        );

        match truth_path {
            Some(path) => {
                self.compare_against_truth(&record, &path, &changes_path)
                    .await
            }
            None => {
                // A truthless first run still leaves its record pending
                // so it can be approved as the initial baseline.
                self.write_changes(&record, &changes_path).await?;
                Ok(())
            }
        }
    }

    async fn compare_against_truth(
        &self,
        record: &RunRecord,
        truth_path: &Path,
        changes_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let raw = fs::read_to_string(truth_path).await?;
        let truth: RunRecord = serde_json::from_str(&raw)?;

        let comparison = TruthComparison::compare(&record.results, &truth.results);
        if comparison.change_count() == 0 {
            println!("No changes found!");
            return Ok(());
        }

        if !comparison.added.is_empty() {
            println!("new: {}", comparison.added.join(", "));
        }
        if !comparison.removed.is_empty() {
            println!("old: {}", comparison.removed.join(", "));
        }
        if !comparison.changed.is_empty() {
            println!("changed: {}", comparison.changed.join(", "));
        }

        self.write_changes(record, changes_path).await?;

        warn!(
            "{} change(s) found against {}",
            comparison.change_count(),
            truth_path.display()
        );
        Err(format!("{} change(s) found", comparison.change_count()).into())
    }

    async fn write_changes(
        &self,
        record: &RunRecord,
        changes_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        fs::write(changes_path, serde_json::to_string_pretty(record)?).await?;
        println!("Pending changes saved to {}", changes_path.display());
        println!("Run pixel-truth approve after reviewing to make them the new truth");
        Ok(())
    }

    async fn approve(
        &self,
        changes_path: PathBuf,
        truth_path: PathBuf,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let raw = match fs::read_to_string(&changes_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(format!(
                    "{} was not found; run pixel-truth run first",
                    changes_path.display()
                )
                .into());
            }
            Err(e) => return Err(e.into()),
        };
        let record: RunRecord = serde_json::from_str(&raw)?;

        fs::write(&truth_path, serde_json::to_string_pretty(&record)?).await?;
        fs::remove_file(&changes_path).await?;

        info!("Truth baseline updated from {}", changes_path.display());
        println!(
            "{} was updated with changes from the last run",
            truth_path.display()
        );
        Ok(())
    }

    async fn run_diff(
        &self,
        new: String,
        old: String,
        store_path: PathBuf,
        output: PathBuf,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let store = FsBlobStore::open(&store_path).await?;
        let bytes = diff::diff_by_digest(&store, &new, &old).await?;
        self.metrics.record_diff();

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&output, &bytes).await?;

        println!("Diff of {new} against {old} written to {}", output.display());
        Ok(())
    }

    async fn validate(&self, config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let raw = fs::read_to_string(&config_path).await?;
        let configuration: RunConfiguration = serde_json::from_str(&raw)?;
        configuration.validate()?;

        println!("Configuration is valid:");
        println!("  Origin: {}", configuration.origin);
        println!("  Widths: {:?}", configuration.widths);
        println!("  Header: {}px", configuration.header);
        println!("  Scenes: {}", configuration.scenes.len());
        println!(
            "  Capture jobs: {}",
            configuration.scenes.len() * configuration.widths.len()
        );

        Ok(())
    }

    async fn init(&self, path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        if fs::metadata(&path).await.is_ok() {
            return Err(format!("{} already exists", path.display()).into());
        }

        let example = RunConfiguration {
            origin: "http://localhost:3000".to_string(),
            widths: vec![320, 1280],
            header: 0,
            mask: vec![],
            scenes: vec![Scene {
                title: "Home".to_string(),
                path: "/".to_string(),
                only: None,
                mask: None,
            }],
        };

        fs::write(&path, serde_json::to_string_pretty(&example)?).await?;
        println!("Example configuration written to {}", path.display());
        Ok(())
    }
}

/// Fold CLI overrides into the engine configuration.
pub fn engine_from_args(args: &Cli) -> EngineConfig {
    let mut engine = EngineConfig::default();
    if let Some(endpoint) = &args.endpoint {
        engine.automation_endpoint = endpoint.clone();
    }
    if let Some(sessions) = args.sessions {
        engine.max_sessions = sessions;
    }
    if let Some(settle) = args.settle {
        engine.settle_delay = std::time::Duration::from_millis(settle);
    }
    if args.headful {
        engine.headless = false;
    }
    engine
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    Ok(())
}
