pub mod cli;
pub mod config;
pub mod error;

// room state
pub mod names;
pub mod playlist;
pub mod library;
pub mod delivery;
pub mod server;

// commands
pub mod commands;
pub mod handlers;

// connections
pub mod server_types;
pub mod server_channel;
pub mod server_listener;
mod client_handler;
mod client_writer;

pub use config::Config;
pub use commands::Commands;
pub use library::DirLibrary;
pub use server::ServerState;
pub use server_listener::ServerListener;
