//! Recon CLI
//!
//! Runs one card reconciliation session against the expense application open
//! in the browser. The browser extension connects to the websocket bridge
//! this binary starts; every remote step is evaluated in its active tab.
//!
//! Usage:
//!   recon receipts/*.pdf                 # Match, upload and allocate
//!   recon --dry-run receipts/*.pdf       # Show the plan, touch nothing
//!   recon --profile surface.yaml ...     # Override selectors and delays

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use recon::extension_bridge::{ExtensionBridge, DEFAULT_WS_ADDR};
use recon::platforms::browser::BrowserEngine;
use recon::{
    AllocationGrouper, Page, PdfKeywords, ReceiptIngestor, Session, SessionReport,
    SourceDocument, SurfaceProfile,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "recon")]
#[command(about = "Attach receipts to card transactions and apply account coding")]
struct Cli {
    /// Receipt documents, named like "123.45 USD - Vendor - Description.pdf"
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// YAML surface profile overriding selectors, timeouts and delays
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Address the browser extension connects to
    #[arg(long, env = "RECON_BRIDGE_ADDR", default_value = DEFAULT_WS_ADDR)]
    bridge_addr: String,

    /// Seconds to wait for the browser extension to connect
    #[arg(long, default_value_t = 30)]
    connect_timeout_secs: u64,

    /// Ingest and group only; print the plan without touching the browser
    #[arg(long)]
    dry_run: bool,

    /// Print the final report as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL")
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "❌ FAILURE:".red().bold(), e);
            std::process::exit(2);
        }
    }
}

/// Returns whether the run finished clean.
async fn run(cli: Cli) -> Result<bool> {
    let profile = match &cli.profile {
        Some(path) => SurfaceProfile::from_yaml_file(path)
            .with_context(|| format!("Failed to load profile {}", path.display()))?,
        None => SurfaceProfile::default(),
    };
    let documents: Vec<SourceDocument> = cli.files.iter().map(SourceDocument::new).collect();

    if cli.dry_run {
        return dry_run(&profile, documents).await;
    }

    let bridge = ExtensionBridge::start(&cli.bridge_addr)
        .await
        .with_context(|| format!("Failed to start extension bridge on {}", cli.bridge_addr))?;
    info!("Waiting for the browser extension to connect...");
    bridge
        .wait_for_client(Duration::from_secs(cli.connect_timeout_secs))
        .await
        .context("Browser extension did not connect")?;

    let page = Page::new(Arc::new(BrowserEngine::new(bridge)), profile);
    let keywords = PdfKeywords;
    match Session::new(&page, &keywords).run(documents).await {
        Ok(report) => {
            print_report(&report, cli.json)?;
            Ok(report.is_clean())
        }
        Err(abort) => {
            print_report(&abort.partial, cli.json)?;
            Err(abort.error).context("Reconciliation aborted")
        }
    }
}

async fn dry_run(profile: &SurfaceProfile, documents: Vec<SourceDocument>) -> Result<bool> {
    let batch = ReceiptIngestor::new(&PdfKeywords, profile.default_currency.clone())
        .ingest(documents)
        .await;

    println!("{}", "Receipts:".bold());
    for receipt in &batch.receipts {
        let keywords = receipt
            .account_keywords
            .as_ref()
            .map(|k| k.join(", "))
            .unwrap_or_else(|| "-".into());
        println!("  {} [{}]", receipt.label(), keywords);
    }
    for name in &batch.rejected {
        println!("  {} {}", "rejected:".yellow(), name);
    }

    let grouping = AllocationGrouper::group(&batch.receipts);
    println!("{}", "Allocation groups:".bold());
    for group in grouping.iter() {
        println!("  {} ({} receipts)", group.key().green(), group.members.len());
    }
    for receipt in &grouping.unallocated {
        println!("  {} {}", "no accounting keywords:".yellow(), receipt.label());
    }
    Ok(batch.rejected.is_empty() && !batch.receipts.is_empty())
}

fn print_report(report: &SessionReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!();
    println!("{}", "═".repeat(60));
    if report.is_clean() {
        println!("{} all receipts reconciled", "✅ SUCCESS:".green().bold());
    } else {
        println!("{} reconciliation finished with problems", "⚠️  WARNING:".yellow().bold());
    }
    println!("{}", "═".repeat(60));
    print!("{report}");
    Ok(())
}
