use clap::Parser;
use std::path::PathBuf;

use crate::config::NetworkKind;

#[derive(Parser, Debug, Default)]
#[command(
    name = "musicroom-server",
    about = "Music room server: register, list and broadcast music files to every connected client",
    long_about = None,
    version,
)]
pub struct Args {
    /// Address to listen on [default: 0.0.0.0:8080]
    #[arg(short, long)]
    pub address: Option<String>,

    /// Address family to bind [default: tcp]
    #[arg(long, value_enum)]
    pub network: Option<NetworkKind>,

    /// Shared secret that promotes a registering client to admin
    #[arg(short, long)]
    pub secret: Option<String>,

    /// Maximum command line length in bytes [default: 256]
    #[arg(short, long)]
    pub buffer_size: Option<usize>,

    /// Directory holding the music files [default: ./musics]
    #[arg(short, long, value_name = "DIR")]
    pub music_dir: Option<PathBuf>,

    /// Only admins may broadcast
    #[arg(long)]
    pub admin_only_broadcast: bool,

    /// Log filter used when RUST_LOG is unset [default: info]
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to TOML config file (overrides default search: ./musicroom.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}
