//! pdf-audit main entry point
//!
//! This is the command-line interface for the PDF accessibility audit engine.

use anyhow::{bail, Context};
use clap::Parser;
use pdf_audit::config::{load_config_with_hash, AuditOptions, Config};
use pdf_audit::storage::SqliteJobStore;
use pdf_audit::{AuditReport, AuditService, JobState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// pdf-audit: accessibility audits of the PDFs a website publishes
///
/// pdf-audit crawls a site for PDF links, downloads every distinct document,
/// runs the configured validator on each and prints a summary of the
/// verdicts. Jobs and reports are kept in the configured job store.
#[derive(Parser, Debug)]
#[command(name = "pdf-audit")]
#[command(version = "1.0.0")]
#[command(about = "Accessibility audits of a website's PDF documents", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Start URL of the site to audit
    #[arg(value_name = "URL", required_unless_present_any = ["dry_run", "status", "export_report"])]
    url: Option<String>,

    /// Maximum link depth from the start page (overrides config)
    #[arg(long)]
    max_depth: Option<u32>,

    /// Maximum number of page fetches (overrides config)
    #[arg(long)]
    max_pages: Option<u32>,

    /// Validator timeout per file, in seconds (overrides config)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Follow links to other origins
    #[arg(long)]
    allow_offsite: bool,

    /// Write the final report as JSON to this file
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be audited without crawling
    #[arg(long, conflicts_with_all = ["status", "export_report"])]
    dry_run: bool,

    /// Show the stored state of a job and exit
    #[arg(long, value_name = "JOB", conflicts_with_all = ["dry_run", "export_report"])]
    status: Option<Uuid>,

    /// Export the stored report of a job as JSON and exit
    #[arg(long, value_name = "JOB", conflicts_with_all = ["dry_run", "status"])]
    export_report: Option<Uuid>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let options = build_options(&cli, &config);

    if cli.dry_run {
        handle_dry_run(&config, &options, cli.url.as_deref());
        return Ok(());
    }

    if cli.status.is_some() || cli.export_report.is_some() {
        // read-only: another process may still be running these jobs
        let store = SqliteJobStore::open(&config.storage.database_path)
            .context("failed to open job store")?;
        let service = AuditService::with_store(config, Arc::new(store))?;

        return match (cli.status, cli.export_report) {
            (Some(id), _) => handle_status(&service, id),
            (None, Some(id)) => {
                let path = cli
                    .output
                    .unwrap_or_else(|| PathBuf::from(format!("{}.json", id)));
                handle_export_report(&service, id, &path)
            }
            (None, None) => Ok(()),
        };
    }

    let service = AuditService::open(config).context("failed to open audit service")?;
    let url = cli.url.context("a start URL is required")?;
    handle_audit(Arc::new(service), &url, options, cli.output.as_deref()).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pdf_audit=info,warn"),
            1 => EnvFilter::new("pdf_audit=debug,info"),
            2 => EnvFilter::new("pdf_audit=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies command-line overrides to the configured defaults
fn build_options(cli: &Cli, config: &Config) -> AuditOptions {
    let mut options = config.default_options();
    if let Some(depth) = cli.max_depth {
        options.max_depth = depth;
    }
    if let Some(pages) = cli.max_pages {
        options.max_pages = pages;
    }
    if let Some(secs) = cli.timeout {
        options.per_file_timeout = Duration::from_secs(secs);
    }
    if cli.allow_offsite {
        options.same_origin_only = false;
    }
    options
}

/// Handles the --dry-run mode: shows the effective settings
fn handle_dry_run(config: &Config, options: &AuditOptions, url: Option<&str>) {
    println!("=== pdf-audit Dry Run ===\n");

    println!("Audit Options:");
    println!("  Max depth: {}", options.max_depth);
    println!("  Max pages: {}", options.max_pages);
    println!("  Per-file timeout: {}s", options.per_file_timeout.as_secs());
    println!("  Max file size: {} bytes", options.max_file_size);
    println!("  Same origin only: {}", options.same_origin_only);

    println!("\nCrawler:");
    println!("  Concurrent fetches: {}", config.crawler.max_concurrent_fetches);
    println!(
        "  Concurrent validations: {}",
        config.crawler.max_concurrent_validations
    );
    println!("  Politeness delay: {}ms", config.crawler.politeness_delay_ms);
    println!("  Respect robots.txt: {}", config.crawler.respect_robots_txt);
    println!("  Use sitemap: {}", config.crawler.use_sitemap);
    for host in &config.crawler.allowed_hosts {
        println!("  Allowed host: {}", host);
    }

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nValidator:");
    println!("  Command: {} {}", config.validator.command, config.validator.args.join(" "));

    println!("\nStorage:");
    println!("  Work dir: {}", config.storage.work_dir.display());
    println!("  Database: {}", config.storage.database_path.display());
    println!("  Retention: {} days", config.storage.retention_days);

    println!("\n✓ Configuration is valid");
    match url.map(pdf_audit::normalize_url) {
        Some(Ok(url)) => println!("✓ Would audit {}", url),
        Some(Err(e)) => println!("✗ Start URL rejected: {}", e),
        None => {}
    }
}

/// Handles the --status mode
fn handle_status(service: &AuditService, id: Uuid) -> anyhow::Result<()> {
    let job = service.get_status(id)?;

    println!("Job:      {}", job.id);
    println!("Target:   {}", job.target_url);
    println!("State:    {}", job.state);
    println!("Created:  {}", job.created_at.to_rfc3339());
    println!("Updated:  {}", job.updated_at.to_rfc3339());
    println!(
        "Progress: {} pages crawled, {} skipped, {} files found, {} processed",
        job.progress.pages_crawled,
        job.progress.pages_skipped,
        job.progress.files_found,
        job.progress.files_validated
    );
    if let Some(reason) = &job.failure_reason {
        println!("Reason:   {}", reason);
    }
    if let Some(report) = &job.report {
        println!();
        print_report(report);
    }

    Ok(())
}

/// Handles the --export-report mode
fn handle_export_report(service: &AuditService, id: Uuid, path: &Path) -> anyhow::Result<()> {
    let report = service.get_report(id)?;
    report
        .write_json(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("✓ Report exported to: {}", path.display());
    Ok(())
}

/// Handles the main audit operation
async fn handle_audit(
    service: Arc<AuditService>,
    url: &str,
    options: AuditOptions,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let _supervisor = service.spawn_supervisor();

    let id = service.start_audit(url, options)?;
    println!("Job {} started", id);

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    let job = loop {
        tokio::select! {
            job = service.wait(id) => break job?,
            _ = ticker.tick() => {
                let job = service.get_status(id)?;
                tracing::info!(
                    "[{}] pages: {} crawled / {} skipped, files: {}/{}",
                    job.state,
                    job.progress.pages_crawled,
                    job.progress.pages_skipped,
                    job.progress.files_validated,
                    job.progress.files_found
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, cancelling job {}", id);
                service.cancel(id)?;
            }
        }
    };

    match job.state {
        JobState::Complete => {
            let report = service.get_report(id)?;
            print_report(&report);
            if let Some(path) = output {
                report
                    .write_json(path)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("\n✓ Report written to: {}", path.display());
            }
            Ok(())
        }
        state => bail!(
            "job {} ended {}: {}",
            id,
            state,
            job.failure_reason.as_deref().unwrap_or("no reason recorded")
        ),
    }
}

fn print_report(report: &AuditReport) {
    let summary = report.summary();
    println!("=== Audit Report: {} ===", report.target_url);
    if let Some(version) = &report.validator_version {
        println!("Validator: {}", version);
    }
    println!(
        "Files: {}  PASS: {}  FAIL: {}  ERROR: {} (of which TIMEOUT: {})",
        summary.total_files,
        summary.pass_count,
        summary.fail_count,
        summary.error_count,
        summary.timeout_count
    );
    println!("Pass rate: {:.1}%", summary.pass_rate());

    if !report.results.is_empty() {
        println!();
        for result in report.sorted_for_display() {
            let aliases = report.aliases_of(&result.resource_ref);
            print!("  {:<8} {}", result.status.to_string(), result.source_url);
            if result.failed_rules() > 0 {
                print!(" ({} failed rules)", result.failed_rules());
            }
            if !aliases.is_empty() {
                print!(" (+{} aliases)", aliases.len());
            }
            println!();
            if let Some(message) = &result.message {
                println!("           {}", message);
            }
        }
    }

    let failing: Vec<_> = report
        .rule_breakdown
        .iter()
        .filter(|(_, tally)| tally.failed > 0)
        .collect();
    if !failing.is_empty() {
        println!("\nFailing rules:");
        for (rule, tally) in failing {
            println!("  {:<24} {} failed, {} passed", rule, tally.failed, tally.passed);
        }
    }
}
