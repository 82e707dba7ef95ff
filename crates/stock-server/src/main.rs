//! Stock snapshot HTTP server

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use stock_snapshot::section::parse_sections;
use stock_snapshot::{SnapshotConfig, SnapshotService, YahooFinanceClient};
use stock_utils::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "stock-server")]
#[command(about = "Serve stock snapshots over HTTP", long_about = None)]
struct Args {
    /// Address to listen on (overrides STOCK_BIND)
    #[arg(short, long)]
    bind: Option<String>,

    /// History period used when a request does not name one
    #[arg(long)]
    history_period: Option<String>,

    /// Comma separated list of sections to include
    #[arg(long)]
    sections: Option<String>,

    /// Timeout for each provider call, in seconds
    #[arg(long)]
    section_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    stock_utils::init_tracing("info,tower_http=debug");

    let args = Args::parse();
    let mut app_config = AppConfig::from_env();
    if let Some(bind) = args.bind {
        app_config.bind_addr = bind;
    }

    let mut builder = SnapshotConfig::builder().with_env();
    if let Some(period) = args.history_period {
        builder = builder.default_history_period(period);
    }
    if let Some(list) = args.sections {
        builder = builder.sections(parse_sections(&list)?);
    }
    if let Some(secs) = args.section_timeout_secs {
        builder = builder.section_timeout(Duration::from_secs(secs));
    }
    let config = builder.build()?;

    let provider = Arc::new(YahooFinanceClient::from_config(&config)?);
    let service = SnapshotService::new(provider, Arc::new(config));
    let app = stock_server::router(service);

    let listener = tokio::net::TcpListener::bind(&app_config.bind_addr).await?;
    info!(
        app = %app_config.app_name,
        environment = %app_config.environment,
        addr = %app_config.bind_addr,
        "Starting stock-server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down");
            }
        })
        .await?;

    Ok(())
}
