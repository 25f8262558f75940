use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use tracing_subscriber::{fmt, EnvFilter};
use tracing::{info, warn};

use musicroom_server::cli::Args;
use musicroom_server::config::{self, Config};
use musicroom_server::{Commands, DirLibrary, ServerListener, ServerState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let file = match config::find_config_file(args.config.as_deref()) {
        Some(path) => Some(config::load_file(&path)?),
        None => None,
    };
    let config = Config::resolve(file, &args);

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .compact() // use abbreviated log format
        .with_env_filter(filter)
        .with_thread_ids(true) // display thread id where event happens
        .init(); // set as default subscriber

    if config.secret.is_none() {
        warn!("No admin secret configured, nobody can become admin");
    }

    info!("Music directory {}", config.music_dir.display());

    let library = Arc::new(DirLibrary::new(config.music_dir.clone()));
    let listener = ServerListener::bind(&config).await
        .with_context(|| format!("unable to bind {} {}", config.network, config.bind_address()))?;

    let state = Arc::new(ServerState::new(config, library));

    listener.run(state, Commands::standard()).await
        .context("server stopped accepting connections")
}
