//! Lottery agency client.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires SIGTERM to the cancellation token, and runs the
//! submit-then-poll loop against the lottery server.

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use lottery_client::client::Client;
use lottery_client::config::AppConfig;
use lottery_client::net::TcpConnector;
use lottery_client::shutdown;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::from_env()?;
    init_logging(&cfg);
    cfg.log_summary();

    let cancel = CancellationToken::new();
    let listener = shutdown::spawn_signal_listener(cancel.clone(), cfg.client.id);

    let connector = TcpConnector::new(cfg.server.address.clone());
    let mut client = Client::new(cfg.client_config(), connector, cancel);

    let result = client.run_file(cfg.data_file()).await;
    listener.abort();

    let report = result?;
    info!(client_id = cfg.client.id, %report, "Client shut down cleanly");
    Ok(())
}

/// Initialise the `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level; set
/// `CLI_LOG_JSON` for JSON output.
fn init_logging(cfg: &AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lottery_client={}", cfg.log.level)));

    let json_logging = std::env::var("CLI_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}
