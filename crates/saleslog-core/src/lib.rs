pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod render;
pub mod store;
pub mod task;
pub mod view;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting saleslog CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );
  if let Some(url) = &cli.api {
    cfg.set("api.url", url);
  }

  let api = api::HttpTaskApi::new(
    &cfg.api_url(),
    cfg.api_timeout()?
  )?;
  debug!(
    base_url = api.base_url(),
    "task API client ready"
  );
  let store = store::TaskStore::new(
    Arc::new(api),
    cfg.failure_policy()?
  );
  let renderer =
    render::Renderer::new(&cfg)?;

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  runtime.block_on(commands::dispatch(
    &store,
    &cfg,
    &renderer,
    cli.command.unwrap_or_default()
  ))?;

  info!("done");
  Ok(())
}
