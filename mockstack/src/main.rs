//! MockStack - local SQS emulator
//!
//! Serves an in-memory message-queue engine over the SQS JSON and Query
//! protocols on a single port.

mod config;
mod router;

use clap::Parser;
use mockstack_sqs::SqsState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "mockstack")]
#[command(about = "Local emulator for the SQS message-queue API", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "MOCKSTACK_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "MOCKSTACK_HOST")]
    host: Option<String>,

    /// Host name used in generated queue URLs
    #[arg(long, env = "MOCKSTACK_HOSTNAME")]
    hostname: Option<String>,

    /// Account id used in queue URLs and ARNs
    #[arg(long, env = "MOCKSTACK_ACCOUNT_ID")]
    account_id: Option<String>,

    /// Region used in queue ARNs
    #[arg(long, env = "MOCKSTACK_REGION")]
    region: Option<String>,

    /// Configuration file (defaults to ./mockstack.toml when present)
    #[arg(short, long, env = "MOCKSTACK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MOCKSTACK_LOG_LEVEL")]
    log_level: String,
}

impl Args {
    /// Flags given on the command line win over file and environment layers
    fn apply(self, mut config: config::Config) -> config::Config {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(hostname) = self.hostname {
            config.server.hostname = hostname;
        }
        if let Some(account_id) = self.account_id {
            config.sqs.account_id = account_id;
        }
        if let Some(region) = self.region {
            config.sqs.region = region;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("mockstack={},tower_http=debug", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load(args.config.as_deref())?;
    let config = args.apply(config);

    info!("Starting MockStack...");
    info!(
        account_id = %config.sqs.account_id,
        region = %config.sqs.region,
        endpoint = %config.endpoint(),
        requeue_expired_inflight = config.sqs.requeue_expired_inflight,
        "  SQS: enabled"
    );

    let sqs = Arc::new(SqsState::new(config.sqs_config()));
    let app = router::create_router(sqs);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("MockStack stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
