// src/main.rs

use anyhow::Context;
use clap::Parser;
use github_harvest::{
    deliver, plan_history, plan_selection, AppError, CancellationSignal, CommandLineInput,
    ContentHarvest, ContentKind, ExtractionLedger, FileLedger, GitHubApi, GitHubContentExtractor,
    GitHubHttpClient, HarvestConfig, HarvestReport, HarvestRunner, OutputPlan, OutputReport,
    QuotaPoolClass, RateGovernor, RepoFullName, RepositoryDiscovery, RepositorySelector,
    RestSession, ResultDelivery, SearchSession, Selection, WindowPartitioner,
};
use log::LevelFilter;
use log4rs::{
    append::console::ConsoleAppender,
    append::file::FileAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};
use std::fs;
use std::sync::Arc;

/// Sets up logging configuration.
fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let log_file_path = std::env::temp_dir().join("github_harvest.log");
    if let Some(parent) = log_file_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let pattern = if verbose {
        "{d(%Y-%m-%d %H:%M:%S)} [{l}] - {m}{n}"
    } else {
        "{m}{n}"
    };

    let stdout_appender = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build(&log_file_path)?;

    let config = Config::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(log_level)))
                .build("stdout", Box::new(stdout_appender)),
        )
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Debug)))
                .build("file", Box::new(file_appender)),
        )
        .build(
            Root::builder()
                .appender("stdout")
                .appender("file")
                .build(LevelFilter::Debug),
        )?;

    log4rs::init_config(config)?;
    log::debug!("Logging initialized. Log file: {}", log_file_path.display());
    Ok(())
}

/// Cancels the harvest on Ctrl-C. Work in flight winds down and the ledger
/// keeps every completion recorded so far.
fn cancel_on_interrupt(cancel: CancellationSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping after in-flight work");
            cancel.cancel();
        }
    });
}

/// Executes the three-stage pipeline: discover → harvest → deliver.
async fn execute_pipeline(
    config: &HarvestConfig,
    cancel: CancellationSignal,
) -> Result<(), AppError> {
    let pipeline = GitHubHarvest::connect(config, cancel).await?;
    pipeline.log_quota("before");

    let selection = pipeline.discover().await?;
    pipeline.deliver_selection(&selection)?;

    let report = pipeline
        .harvest(&selection.names(), &config.content)
        .await?;
    pipeline.deliver_history(&config.content).await?;

    pipeline.log_quota("after");
    pipeline.report_completion(&selection, &report);

    if report.interrupted {
        return Err(AppError::Cancelled);
    }
    Ok(())
}

/// Orchestrates selection, extraction and delivery for one request definition.
struct GitHubHarvest<'a> {
    config: &'a HarvestConfig,
    governor: Arc<RateGovernor>,
    partitioner: WindowPartitioner<GitHubHttpClient>,
    rest: RestSession,
    ledger: Arc<FileLedger>,
    runner: HarvestRunner,
}

impl<'a> GitHubHarvest<'a> {
    /// Builds the client, the governor and the ledger once; everything else
    /// borrows them.
    async fn connect(config: &'a HarvestConfig, cancel: CancellationSignal) -> Result<Self, AppError> {
        let client = Arc::new(GitHubHttpClient::new(&config.token)?);
        let api: Arc<dyn GitHubApi> = client.clone();

        let governor = Arc::new(RateGovernor::new(config.quota_threshold));
        if let Err(e) = governor.prime(api.as_ref()).await {
            log::warn!("Could not read current rate limits, assuming full pools: {}", e);
        }

        let session = SearchSession::new(client, Arc::clone(&governor), cancel.clone())
            .with_retry(config.retry.clone())
            .with_workers(config.workers);
        let partitioner = WindowPartitioner::new(session, config.partition.clone())?;

        let rest = RestSession::new(
            api,
            Arc::clone(&governor),
            cancel.clone(),
            config.retry.clone(),
        );

        let ledger = Arc::new(FileLedger::open(config.ledger_dir()).await?);
        let extractor = Arc::new(GitHubContentExtractor::new(rest.clone()));
        let runner = HarvestRunner::new(ledger.clone(), extractor, &config.project_dir, cancel)
            .with_workers(config.workers);

        Ok(Self {
            config,
            governor,
            partitioner,
            rest,
            ledger,
            runner,
        })
    }

    fn log_quota(&self, moment: &str) {
        for class in QuotaPoolClass::ALL {
            let pool = self.governor.snapshot(class);
            log::info!(
                "{} quota {} the run: {}/{} remaining, resets at {}",
                class,
                moment,
                pool.remaining,
                pool.limit,
                pool.reset_at.format("%H:%M:%S")
            );
        }
    }

    fn deliver_plan(&self, plan: OutputPlan) -> Result<OutputReport, AppError> {
        let report = deliver(plan);
        if !report.is_success() {
            return Err(AppError::DeliveryFailed {
                failures: report.failure_messages(),
            });
        }
        Ok(report)
    }

    /// Prints the one-line outcome of the run.
    fn report_completion(&self, selection: &Selection, report: &HarvestReport) {
        for leaf in &selection.lossy_windows {
            eprintln!(
                "⚠️  {} held {} repositories; only {} were reachable.",
                leaf.window, leaf.total_count, leaf.collected
            );
        }
        for failure in &report.failed {
            eprintln!(
                "⚠️  {} of {} failed: {}",
                failure.kind, failure.entity, failure.reason
            );
        }

        let verb = if self.config.dry_run {
            "pending (dry run)"
        } else {
            "extracted"
        };
        let count = if self.config.dry_run {
            report.scope - report.skipped
        } else {
            report.extracted
        };
        println!(
            "✓ {}: {} repositories found, {} pairs {}, {} skipped, {} failed, {} lossy windows → {}",
            self.config.project_name,
            selection.repositories.len(),
            count,
            verb,
            report.skipped,
            report.failed.len(),
            selection.lossy_windows.len(),
            self.config.project_dir.display()
        );
    }
}

#[async_trait::async_trait]
impl RepositoryDiscovery for GitHubHarvest<'_> {
    async fn discover(&self) -> Result<Selection, AppError> {
        RepositorySelector::new(&self.partitioner, &self.rest)
            .select(&self.config.strategy)
            .await
    }
}

#[async_trait::async_trait]
impl ContentHarvest for GitHubHarvest<'_> {
    async fn harvest(
        &self,
        repos: &[RepoFullName],
        kinds: &[ContentKind],
    ) -> Result<HarvestReport, AppError> {
        if self.config.dry_run {
            log::info!("Dry run: recording the scope without extracting");
            return self.runner.survey(repos, kinds).await;
        }
        self.runner.run(repos, kinds).await
    }
}

#[async_trait::async_trait]
impl ResultDelivery for GitHubHarvest<'_> {
    fn deliver_selection(&self, selection: &Selection) -> Result<OutputReport, AppError> {
        let plan = plan_selection(&self.config.project_dir, &self.config.strategy, selection)?;
        self.deliver_plan(plan)
    }

    async fn deliver_history(&self, kinds: &[ContentKind]) -> Result<OutputReport, AppError> {
        let entries = self.ledger.entries().await?;
        self.deliver_plan(plan_history(&self.config.project_dir, &entries, kinds))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CommandLineInput::parse();

    setup_logging(cli.verbose)
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))?;

    let config = HarvestConfig::resolve(cli).context("invalid configuration")?;

    let cancel = CancellationSignal::new();
    cancel_on_interrupt(cancel.clone());

    execute_pipeline(&config, cancel)
        .await
        .with_context(|| format!("harvest of {} did not complete", config.project_name))?;

    Ok(())
}
