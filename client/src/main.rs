use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use tracing_subscriber::{fmt, EnvFilter};

use musicroom_client::client::Client;

const GREETINGS: &str = "$ Welcome to the music room! \n$ Commands: list <clients|admins|playlist|musics>, broadcast <file>, player add <file>, \\quit";

#[derive(Parser, Debug)]
#[command(name = "musicroom-client", about = "Terminal client for the music room server", version)]
struct Args {
    /// Name to register with
    name: String,

    /// Admin secret sent along with the registration
    #[arg(short, long)]
    secret: Option<String>,

    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    address: String,

    /// Directory where broadcast music files are saved
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    fmt()
        .compact() // use abbreviated log format
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_thread_ids(true) // display thread id where event happens
        .init(); // set as default subscriber

    let mut client = Client::setup(&args.address, args.name.clone(), args.out_dir).await
        .with_context(|| format!("unable to connect to {}", args.address))?;

    client.register(args.secret.as_deref()).await
        .with_context(|| format!("unable to register as {}", args.name))?;

    println!("{}", GREETINGS);

    client.run().await.context("client terminated with an error")
}
