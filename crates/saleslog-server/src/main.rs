use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser};
use saleslog_core::cli::{KeyVal, init_tracing};
use saleslog_core::config::Config;
use saleslog_server::{AppState, router, serve};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "saleslog-server", version, about = "REST backend for the sales task log")]
struct ServerCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    rc_overrides: Vec<KeyVal>,

    #[arg(long = "config")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = ServerCli::parse();
    init_tracing(cli.verbose.max(1), cli.quiet)?;

    let mut cfg = Config::load(cli.config.as_deref())?;
    cfg.apply_overrides(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value)));

    let port = cfg.server_port()?;
    let data_dir = cfg.server_data_dir();
    let cors_origin = cfg.cors_origin();
    info!(port, data_dir = %data_dir.display(), cors_origin = %cors_origin, "starting saleslog server");

    let state = Arc::new(AppState::open(&data_dir)?);
    let app = router(state, &cors_origin)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    serve(listener, app, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await
}
