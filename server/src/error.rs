//! Error types for the music room server

use std::fmt::Write;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::server_types::Connection;

/// Mistakes reported back to the client, the session keeps going
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty input received")]
    EmptyInput,

    #[error("no arguments received")]
    NoArguments,

    #[error("invalid arguments received")]
    InvalidArguments,

    #[error("username already in use")]
    NameInUse,

    #[error("already an admin")]
    AlreadyAdmin,

    #[error("connection already registered as {0}")]
    AlreadyRegistered(String),

    #[error("command not found")]
    CommandNotFound,

    #[error("file not found")]
    FileNotFound,

    #[error("admin privileges required")]
    NotAuthorized,

    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error(transparent)]
    Delivery(#[from] BroadcastError),
}

/// A `CommandError` tied to the connection it came from
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct ClientError {
    conn: Connection,
    kind: CommandError,
}

impl ClientError {
    pub fn new(conn: Connection, kind: CommandError) -> Self {
        Self { conn, kind }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Everything that can end a call into a session.
/// Only `Client` leaves the session running.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("connection closed by peer")]
    Closed,

    #[error("socket i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("music library failed: {0}")]
    Library(#[source] io::Error),

    #[error("unable to queue reply: {0}")]
    Reply(#[source] SendFailure),
}

impl SessionError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SessionError::Client(_))
    }
}

/// Why a frame could not be queued on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendFailure {
    #[error("queue full")]
    Full,

    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub name: String,
    pub reason: SendFailure,
}

/// Aggregate of every recipient a broadcast could not reach
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unable to deliver to {} client(s): {}", .failures.len(), summary(.failures))]
pub struct BroadcastError {
    pub failures: Vec<DeliveryFailure>,
}

fn summary(failures: &[DeliveryFailure]) -> String {
    let mut out = String::new();
    for (i, f) in failures.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{} ({})", f.name, f.reason);
    }
    out
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
