// src/main.rs
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use residency_notifier::clock::{Clock, SystemClock};
use residency_notifier::config::AppConfig;
use residency_notifier::expiry::{days_until_expiry, tiers_for};
use residency_notifier::file_store::FileStore;
use residency_notifier::model::{PersonId, DATE_FORMAT};
use residency_notifier::scheduler::ExpiryScheduler;
use residency_notifier::server::{self, AppState};
use residency_notifier::sweep::ResidenceExpiryService;

#[derive(Parser, Debug)]
#[command(name = "residency-notifier", about = "Residence permit expiry notifications")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daily scheduler and the HTTP hook until Ctrl-C.
    Serve,
    /// Run one sweep over all active people and print the report.
    Sweep,
    /// Re-check a single person, as the HR update path does after an edit.
    Check { person_id: PersonId },
    /// Show the days left and matching tiers for an expiry date.
    Evaluate {
        expiry: NaiveDate,
        /// Evaluate as of this date instead of now.
        #[arg(long)]
        today: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("Loading configuration failed")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Evaluate { expiry, today } => evaluate_date(expiry, today),
        Command::Sweep => {
            let service = build_service(&config)?;
            let report = service.run_sweep().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Check { person_id } => {
            let service = build_service(&config)?;
            let outcome = service.run_sweep_for_person(person_id).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Command::Serve => serve(&config).await,
    }
}

fn build_service(config: &AppConfig) -> Result<Arc<ResidenceExpiryService>> {
    let store = FileStore::open(&config.data_dir)
        .with_context(|| format!("Opening data directory {}", config.data_dir.display()))?;
    Ok(Arc::new(ResidenceExpiryService::new(
        Arc::new(store),
        Arc::new(SystemClock),
    )))
}

fn evaluate_date(expiry: NaiveDate, today: Option<NaiveDate>) -> Result<()> {
    let now = match today {
        Some(date) => date.and_time(chrono::NaiveTime::MIN),
        None => SystemClock.now(),
    };
    let days = days_until_expiry(now, expiry);
    let tiers: Vec<String> = tiers_for(days).iter().map(|t| t.to_string()).collect();
    println!(
        "expiry {}: {} days left, tiers: [{}]",
        expiry.format(DATE_FORMAT),
        days,
        tiers.join(", ")
    );
    if days < 0 {
        warn!("Residence already expired; no tier applies");
    }
    Ok(())
}

async fn serve(config: &AppConfig) -> Result<()> {
    let service = build_service(config)?;

    let mut scheduler = ExpiryScheduler::new(service.clone(), config.sweep_interval());
    scheduler.start();

    let app = server::router(AppState { service });
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Binding {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server failed")?;

    scheduler.stop().await;
    Ok(())
}
