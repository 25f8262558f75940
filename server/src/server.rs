//! Shared server state.
//!
//! One mutex covers the client registry, the admin set and the playlist.
//! Broadcasts only enqueue frames while holding it, sockets are written
//! by each connection's writer task outside the lock.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use musicroom_protocol::Frame;

use crate::config::Config;
use crate::delivery::Delivery;
use crate::error::{BroadcastError, CommandError};
use crate::library::MusicLibrary;
use crate::names::Names;
use crate::playlist::{Playlist, PlaylistEntry};
use crate::server_types::{Connection, ConnectionId};

const USER_JOINED: &str = "joined {}";
const USER_LEFT: &str = "left {}";

#[derive(Debug, Default)]
struct Shared {
    names: Names,
    playlist: Playlist,
}

pub struct ServerState {
    config: Config,
    library: Arc<dyn MusicLibrary>,
    shared: Mutex<Shared>,
}

impl ServerState {
    pub fn new(config: Config, library: Arc<dyn MusicLibrary>) -> Self {
        Self {
            config,
            library,
            shared: Mutex::new(Shared::default()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn library(&self) -> &dyn MusicLibrary {
        self.library.as_ref()
    }

    // Claim a name for a connection. The name is held until the returned
    // registration is dropped.
    pub fn subscribe(self: &Arc<Self>, name: &str, conn: &Connection) -> Result<Registration, CommandError> {
        if !self.shared.lock().names.insert(name, conn.clone()) {
            return Err(CommandError::NameInUse);
        }

        info!("User {} registered from {:?}", name, conn.addr());

        Ok(Registration {
            name: name.to_owned(),
            conn_id: conn.id(),
            state: Arc::clone(self),
        })
    }

    pub fn promote(&self, name: &str) -> Result<(), CommandError> {
        let mut shared = self.shared.lock();

        if !shared.names.contains(name) {
            return Err(CommandError::InvalidArguments);
        }
        if !shared.names.promote(name) {
            return Err(CommandError::AlreadyAdmin);
        }

        info!("User {} promoted to admin", name);
        Ok(())
    }

    // plaintext comparison, an unset secret never matches
    pub fn secret_matches(&self, candidate: &str) -> bool {
        self.config.secret.as_deref().map_or(false, |secret| secret == candidate)
    }

    pub fn is_admin(&self, name: &str) -> bool {
        self.shared.lock().names.is_admin(name)
    }

    pub fn connection_id(&self, name: &str) -> Option<ConnectionId> {
        self.shared.lock().names.get(name).map(|c| c.id())
    }

    pub fn client_names(&self) -> Vec<String> {
        self.shared.lock().names.client_names()
    }

    pub fn admin_names(&self) -> Vec<String> {
        self.shared.lock().names.admin_names()
    }

    pub fn list_clients(&self) -> String {
        self.shared.lock().names.to_list()
    }

    pub fn list_admins(&self) -> String {
        self.shared.lock().names.to_admin_list()
    }

    pub fn list_playlist(&self) -> String {
        self.shared.lock().playlist.to_list()
    }

    pub fn playlist(&self) -> Vec<PlaylistEntry> {
        self.shared.lock().playlist.entries().to_vec()
    }

    pub fn add_music(&self, entry: PlaylistEntry) {
        info!("Adding {} to the playlist", entry.name);
        self.shared.lock().playlist.add(entry);
    }

    pub fn broadcast(&self, frame: Frame) -> Result<usize, BroadcastError> {
        let shared = self.shared.lock();
        Delivery::broadcast(&shared.names, &frame)
    }

    pub fn announce_joined(&self, name: &str) -> Result<usize, BroadcastError> {
        self.broadcast(Frame::line(USER_JOINED.replace("{}", name)))
    }

    // drop the name if this connection still owns it, then tell everyone
    fn release(&self, name: &str, conn_id: ConnectionId) {
        let left = {
            // keep lock scope - mutex guard - small
            let mut shared = self.shared.lock();
            if shared.names.remove(name, conn_id) {
                Some(Delivery::broadcast(&shared.names, &Frame::line(USER_LEFT.replace("{}", name))))
            } else {
                None
            }
        };

        match left {
            Some(Ok(n)) => info!("User {} has left, notified {} client(s)", name, n),
            Some(Err(e)) => info!("User {} has left, {}", name, e),
            None => debug!("Name {} no longer owned by connection {}", name, conn_id),
        }
    }
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

/// Ownership of a registered name.
/// Dropping it removes the name (and any admin entry) from the registry.
pub struct Registration {
    name: String,
    conn_id: ConnectionId,
    state: Arc<ServerState>,
}

impl Registration {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.state.release(&self.name, self.conn_id);
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("conn_id", &self.conn_id)
            .finish()
    }
}
