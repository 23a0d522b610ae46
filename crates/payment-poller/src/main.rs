use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payment_poller::auth::Session;
use payment_poller::config::{LogLevel, PollerConfig};
use payment_poller::gmail_client::GmailClient;
use payment_poller::ledger::Ledger;
use payment_poller::runner::{RunMode, Runner};
use payment_poller::sink::CsvSink;

#[derive(Parser)]
#[command(name = "payment-poller")]
#[command(about = "Copy Venmo payment notifications from a Gmail label into a CSV file")]
struct Cli {
    /// Run a single pass and exit instead of polling continuously.
    ///
    /// Without this flag the poller repeats every POLL_INTERVAL seconds
    /// until interrupted with Ctrl+C.
    #[arg(long)]
    once: bool,
}

fn init_tracing(level: LogLevel) {
    // RUST_LOG takes precedence over LOG_LEVEL
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.as_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let config = PollerConfig::from_env();
    init_tracing(
        config
            .as_ref()
            .map(|c| c.log_level)
            .unwrap_or(LogLevel::Info),
    );

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install crypto provider"))?;

    tracing::info!("Payment poller starting");
    let config = config.context("Invalid configuration")?;
    let sink = CsvSink::new(&config.csv_path, config.sink_format);
    tracing::info!(
        "Config: csv={}, format={}, label={}, poll={}s",
        sink.path().display(),
        sink.format().as_str(),
        config.label,
        config.poll_interval.as_secs()
    );

    tracing::info!("Authenticating with Gmail...");
    let session = Session::establish(&config.credentials_path, &config.token_cache_path)
        .await
        .context("Gmail authorization failed")?;
    tracing::info!("Authentication successful");

    let ledger = Ledger::load(&config.ledger_path).context("Failed to load processed ids")?;
    tracing::info!(
        "Loaded {} previously processed message ID(s) from {}",
        ledger.len(),
        ledger.path().display()
    );

    let mut runner = Runner::new(
        GmailClient::new(session),
        ledger,
        sink,
        config.label.clone(),
        config.query.clone(),
    );

    let mode = if cli.once {
        RunMode::Once
    } else {
        tracing::info!(
            "Starting continuous polling (every {}s, Ctrl+C to stop)",
            config.poll_interval.as_secs()
        );
        RunMode::Continuous {
            interval: config.poll_interval,
        }
    };

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let stats = runner.run(mode, shutdown).await?;
    tracing::info!(
        "Done after {} pass(es), {} new payment(s) written. Goodbye!",
        stats.passes,
        stats.written
    );

    Ok(())
}
