use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use querywatch_engine::{
    JsonTestStore, ReportResults, SessionKind, SessionRegistry, TestStore, Testcase,
    report_results,
};
use querywatch_logs::FileLogSource;

mod config;

use config::{Config, DEFAULT_CONFIG_PATH};

/// Querywatch - record database query logs and verify that replays produce the same statements
#[derive(Parser, Debug)]
#[command(name = "querywatch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record the statements of a reference run as a new testcase
    Record {
        /// Testcase name
        name: String,

        /// Channel to watch (optional when only one is configured)
        #[arg(long)]
        channel: Option<String>,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,
    },

    /// Replay a testcase and check that its statements reappear
    Verify {
        /// Testcase name
        name: String,

        /// Channel to watch (optional when only one is configured)
        #[arg(long)]
        channel: Option<String>,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,
    },

    /// Show verification results of stored testcases
    Report {
        /// Only report this testcase
        name: Option<String>,

        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored testcases
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run_app(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_app(args: Args) -> Result<()> {
    let config = Config::load(&args.config)?;
    let store: Arc<dyn TestStore> = Arc::new(JsonTestStore::new(&config.tests_dir));

    match args.command {
        Command::Record {
            name,
            channel,
            duration,
        } => {
            let testcase = run_session(
                &config,
                store,
                SessionKind::Recording,
                &name,
                channel.as_deref(),
                duration,
            )
            .await?;
            println!(
                "Recorded {} expectation(s) for '{}'",
                testcase.expectations.len(),
                testcase.name
            );
            Ok(())
        }
        Command::Verify {
            name,
            channel,
            duration,
        } => {
            let testcase = run_session(
                &config,
                store,
                SessionKind::Verification,
                &name,
                channel.as_deref(),
                duration,
            )
            .await?;
            let report = report_results(&testcase);
            print_report(&report);
            if !report.is_success() {
                bail!(
                    "{} of {} expectation(s) unfulfilled",
                    report.unfulfilled.len(),
                    report.expectations
                );
            }
            Ok(())
        }
        Command::Report { name, json } => {
            let testcases = match name {
                Some(name) => vec![store.get(&name)?],
                None => store.all()?,
            };
            let reports: Vec<ReportResults> = testcases.iter().map(report_results).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    print_report(report);
                }
            }
            Ok(())
        }
        Command::List => {
            for testcase in store.all()? {
                print_listing(&testcase);
            }
            Ok(())
        }
    }
}

/// Drive one session until Ctrl-C, the optional duration, or its own failure
async fn run_session(
    config: &Config,
    store: Arc<dyn TestStore>,
    kind: SessionKind,
    name: &str,
    channel_name: Option<&str>,
    duration: Option<u64>,
) -> Result<Testcase> {
    let channel_config = config.channel(channel_name)?;
    let channel = Arc::new(channel_config.to_channel()?);
    let format = channel_config.log_format()?;
    info!(
        channel = %channel.name,
        format = format.name(),
        log = %channel_config.log.display(),
        "opening log"
    );
    let source = FileLogSource::open(&channel_config.log, format, config.poll_interval())
        .await
        .with_context(|| format!("Failed to open log for channel '{}'", channel.name))?;

    let registry = SessionRegistry::new(store);
    match kind {
        SessionKind::Recording => registry.start_recording(name, channel, source)?,
        SessionKind::Verification => registry.start_verification(name, channel, source)?,
    }
    let done = registry
        .completion(name)
        .context("Session ended before it was registered")?;

    info!(test = name, %kind, "press Ctrl-C to stop");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("interrupted");
        }
        _ = wait_for(duration) => info!("duration elapsed"),
        _ = done.cancelled() => {}
    }

    registry
        .stop(name)
        .await
        .with_context(|| format!("{} session for '{}' failed", kind, name))
}

async fn wait_for(duration: Option<u64>) {
    match duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending().await,
    }
}

fn print_report(report: &ReportResults) {
    println!(
        "{}: {}/{} fulfilled, {} verification(s), mean verified {:.2}",
        report.name,
        report.fulfilled,
        report.expectations,
        report.verifications,
        report.verification_mean
    );
    for expectation in &report.unfulfilled {
        println!("  missing    [{}] {}", expectation.pattern, expectation.statement());
    }
    for expectation in &report.additional {
        println!("  additional [{}] {}", expectation.pattern, expectation.statement());
    }
}

fn print_listing(testcase: &Testcase) {
    let last = testcase
        .last_execution
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "{:<30} {:>4} expectation(s) {:>4} verification(s)  last: {}{}",
        testcase.name,
        testcase.expectations.len(),
        testcase.verifications,
        last,
        if testcase.running { "  (running)" } else { "" }
    );
}
