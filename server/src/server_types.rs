use std::net::SocketAddr;

use tokio::sync::mpsc::{self, error::TrySendError};

use musicroom_protocol::Frame;

use crate::error::{ClientError, CommandError, SendFailure, SessionError};
use crate::server::Registration;

// server type definitions

pub type ConnectionId = u64;

// frames queued per connection before sends start failing
pub const WRITE_QUEUE_SIZE: usize = 64;

/// Handle to a live connection, cheap to clone.
/// Frames go through a queue drained by the connection's writer task.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    addr: SocketAddr,
    tx: mpsc::Sender<Frame>,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, tx: mpsc::Sender<Frame>) -> Self {
        Self { id, addr, tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    // never waits, a slow reader gets Full instead of stalling the sender
    pub fn send(&self, frame: Frame) -> Result<(), SendFailure> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendFailure::Full,
            TrySendError::Closed(_) => SendFailure::Closed,
        })
    }
}

/// Per connection state handed to command handlers
#[derive(Debug)]
pub struct Session {
    conn: Connection,
    registration: Option<Registration>,
}

impl Session {
    pub fn new(conn: Connection) -> Self {
        Self { conn, registration: None }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn name(&self) -> Option<&str> {
        self.registration.as_ref().map(|r| r.name())
    }

    pub fn register(&mut self, registration: Registration) {
        self.registration = Some(registration);
    }

    // wrap a protocol mistake so it travels back to this client
    pub fn reject(&self, kind: CommandError) -> SessionError {
        SessionError::Client(ClientError::new(self.conn.clone(), kind))
    }

    pub fn reply(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.conn.send(Frame::line(text)).map_err(SessionError::Reply)
    }
}
