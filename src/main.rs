mod api;
mod app;
mod config;
mod console;
mod error;
mod form;
mod logging;
mod parser;
mod pending;
mod rendemen;
mod serial;
mod ui;

use anyhow::Result;

fn main() -> Result<()> {
    let config = config::Config::from_env();
    let _guard = logging::init(&config)?;
    tracing::info!(api = %config.api_url, "starting");
    app::run(config)
}
