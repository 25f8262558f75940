use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_BUFFER_SIZE: usize = 256;
const DEFAULT_MUSIC_DIR: &str = "./musics";
const DEFAULT_LOG_LEVEL: &str = "info";
const CONFIG_FILE: &str = "musicroom.toml";

#[derive(Deserialize, clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    #[default]
    Tcp,
    Tcp4,
    Tcp6,
}

impl NetworkKind {
    pub fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            NetworkKind::Tcp => true,
            NetworkKind::Tcp4 => addr.is_ipv4(),
            NetworkKind::Tcp6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NetworkKind::Tcp => "tcp",
            NetworkKind::Tcp4 => "tcp4",
            NetworkKind::Tcp6 => "tcp6",
        })
    }
}

/// Who may trigger `broadcast`
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastPolicy {
    #[default]
    Anyone,
    Admins,
}

#[derive(Deserialize, Default, Debug)]
pub struct FileConfig {
    pub network: Option<NetworkKind>,
    pub address: Option<String>,
    pub secret: Option<String>,
    pub buffer_size: Option<usize>,
    pub music_dir: Option<PathBuf>,
    pub broadcast_policy: Option<BroadcastPolicy>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub network: NetworkKind,
    pub address: String,
    pub secret: Option<String>,
    pub buffer_size: usize,
    pub music_dir: PathBuf,
    pub broadcast_policy: BroadcastPolicy,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkKind::default(),
            address: DEFAULT_ADDRESS.to_owned(),
            secret: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            music_dir: PathBuf::from(DEFAULT_MUSIC_DIR),
            broadcast_policy: BroadcastPolicy::default(),
            log_level: DEFAULT_LOG_LEVEL.to_owned(),
        }
    }
}

impl Config {
    // CLI flag > TOML file > default
    pub fn resolve(file: Option<FileConfig>, args: &crate::cli::Args) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Config::default();

        let broadcast_policy = if args.admin_only_broadcast {
            BroadcastPolicy::Admins
        } else {
            file.broadcast_policy.unwrap_or(defaults.broadcast_policy)
        };

        Config {
            network: args.network.or(file.network).unwrap_or(defaults.network),
            address: args.address.clone().or(file.address).unwrap_or(defaults.address),
            secret: args.secret.clone().or(file.secret).filter(|s| !s.is_empty()),
            buffer_size: args.buffer_size.or(file.buffer_size).unwrap_or(defaults.buffer_size).max(1),
            music_dir: args.music_dir.clone().or(file.music_dir).unwrap_or(defaults.music_dir),
            broadcast_policy,
            log_level: args.log_level.clone().or(file.log_level).unwrap_or(defaults.log_level),
        }
    }

    // ":8080" style addresses listen on every interface
    pub fn bind_address(&self) -> String {
        if !self.address.starts_with(':') {
            return self.address.clone();
        }

        match self.network {
            NetworkKind::Tcp6 => format!("[::]{}", self.address),
            _ => format!("0.0.0.0{}", self.address),
        }
    }
}

pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_owned());
    }
    let cwd_config = PathBuf::from(CONFIG_FILE);
    if cwd_config.exists() {
        return Some(cwd_config);
    }
    None
}

pub fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_owned(),
        source,
    })?;

    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}
