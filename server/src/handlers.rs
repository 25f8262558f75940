use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use musicroom_protocol::Frame;

use crate::commands::Command;
use crate::config::BroadcastPolicy;
use crate::error::{CommandError, LibraryError, SessionError};
use crate::names::listing;
use crate::playlist::PlaylistEntry;
use crate::server::ServerState;
use crate::server_types::Session;

const MUSICS_MSG: &str = "musics";
const ADDED_MSG: &str = "added {}";

/// `register <name> [secret]`
pub struct Register;

#[async_trait]
impl Command for Register {
    fn keyword(&self) -> &'static str {
        "register"
    }

    async fn run(&self, state: &Arc<ServerState>, session: &mut Session, tokens: &[&str]) -> Result<(), SessionError> {
        if tokens.len() < 2 {
            return Err(session.reject(CommandError::NoArguments));
        }

        let name = tokens[1];
        if name.is_empty() {
            return Err(session.reject(CommandError::InvalidArguments));
        }

        // one name per connection
        if let Some(current) = session.name() {
            let kind = if current == name {
                CommandError::NameInUse
            } else {
                CommandError::AlreadyRegistered(current.to_owned())
            };
            return Err(session.reject(kind));
        }

        let registration = match state.subscribe(name, session.conn()) {
            Ok(r) => r,
            Err(kind) => return Err(session.reject(kind)),
        };
        session.register(registration);

        if tokens.len() > 2 && state.secret_matches(tokens[2]) {
            if let Err(kind) = state.promote(name) {
                return Err(session.reject(kind));
            }
        }

        // the new client is registered by now, so it sees its own join
        if let Err(e) = state.announce_joined(name) {
            debug!("Join of {} not delivered everywhere: {}", name, e);
        }

        Ok(())
    }
}

/// `broadcast <file>`: announce and stream a music file to every client
pub struct Broadcast;

#[async_trait]
impl Command for Broadcast {
    fn keyword(&self) -> &'static str {
        "broadcast"
    }

    fn authorize(&self, state: &ServerState, session: &Session) -> Result<(), CommandError> {
        match state.config().broadcast_policy {
            BroadcastPolicy::Anyone => Ok(()),
            BroadcastPolicy::Admins => match session.name() {
                Some(name) if state.is_admin(name) => Ok(()),
                _ => Err(CommandError::NotAuthorized),
            },
        }
    }

    async fn run(&self, state: &Arc<ServerState>, session: &mut Session, tokens: &[&str]) -> Result<(), SessionError> {
        if tokens.len() < 2 {
            return Err(session.reject(CommandError::NoArguments));
        }

        let name = tokens[1];
        let data = match state.library().read(name).await {
            Ok(data) => data,
            Err(LibraryError::NotFound(_)) => return Err(session.reject(CommandError::FileNotFound)),
            Err(LibraryError::Io(e)) => return Err(SessionError::Library(e)),
        };

        info!("Broadcasting {} ({} bytes) for {:?}", name, data.len(), session.conn().addr());

        // announcement and payload travel as one frame per recipient
        match state.broadcast(Frame::music(name, data)) {
            Ok(n) => {
                debug!("{} delivered to {} client(s)", name, n);
                Ok(())
            },
            Err(e) => Err(session.reject(CommandError::Delivery(e))),
        }
    }
}

/// `list <clients|admins|playlist|musics>`, answered to the caller only
pub struct List;

#[async_trait]
impl Command for List {
    fn keyword(&self) -> &'static str {
        "list"
    }

    async fn run(&self, state: &Arc<ServerState>, session: &mut Session, tokens: &[&str]) -> Result<(), SessionError> {
        if tokens.len() < 2 {
            return Err(session.reject(CommandError::NoArguments));
        }

        let reply = match tokens[1] {
            "clients" => state.list_clients(),
            "admins" => state.list_admins(),
            "playlist" => state.list_playlist(),
            "musics" => {
                let musics = state.library().musics().await.map_err(SessionError::Library)?;
                listing(MUSICS_MSG, musics)
            },
            _ => return Err(session.reject(CommandError::InvalidArguments)),
        };

        session.reply(reply)
    }
}

/// `player add <file>`
pub struct Player;

impl Player {
    async fn add(&self, state: &Arc<ServerState>, session: &mut Session, tokens: &[&str]) -> Result<(), SessionError> {
        if tokens.len() < 3 {
            return Err(session.reject(CommandError::NoArguments));
        }

        let name = tokens[2];
        let musics = state.library().musics().await.map_err(SessionError::Library)?;
        if !musics.iter().any(|m| m == name) {
            return Err(session.reject(CommandError::FileNotFound));
        }

        state.add_music(PlaylistEntry {
            name: name.to_owned(),
            path: state.library().path_of(name),
        });

        session.reply(ADDED_MSG.replace("{}", name))
    }
}

#[async_trait]
impl Command for Player {
    fn keyword(&self) -> &'static str {
        "player"
    }

    async fn run(&self, state: &Arc<ServerState>, session: &mut Session, tokens: &[&str]) -> Result<(), SessionError> {
        if tokens.len() < 2 {
            return Err(session.reject(CommandError::NoArguments));
        }

        match tokens[1] {
            "add" => self.add(state, session, tokens).await,
            _ => Err(session.reject(CommandError::InvalidArguments)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use crate::commands::Commands;
    use crate::config::Config;
    use crate::library::DirLibrary;
    use crate::server_types::Connection;

    struct Room {
        _dir: tempfile::TempDir,
        state: Arc<ServerState>,
        commands: Commands,
    }

    struct Peer {
        session: Session,
        rx: mpsc::Receiver<Frame>,
    }

    impl Room {
        fn new(config: Config) -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("song.mp3"), b"\x49\x44\x33 not really an mp3").unwrap();
            std::fs::write(dir.path().join("intro.mp3"), b"intro").unwrap();
            std::fs::create_dir(dir.path().join("drafts")).unwrap();

            let library = Arc::new(DirLibrary::new(dir.path()));
            let config = Config { music_dir: dir.path().to_owned(), ..config };

            Room {
                _dir: dir,
                state: Arc::new(ServerState::new(config, library)),
                commands: Commands::standard(),
            }
        }

        fn peer(&self, id: u64) -> Peer {
            let (tx, rx) = mpsc::channel(16);
            Peer { session: Session::new(Connection::new(id, "127.0.0.1:5000".parse().unwrap(), tx)), rx }
        }

        async fn run(&self, peer: &mut Peer, line: &str) -> Result<(), SessionError> {
            self.commands.dispatch(&self.state, &mut peer.session, line).await
        }
    }

    impl Peer {
        fn frames(&mut self) -> Vec<Frame> {
            let mut out = vec![];
            while let Ok(f) = self.rx.try_recv() {
                out.push(f);
            }
            out
        }
    }

    fn client_error(result: Result<(), SessionError>) -> String {
        match result {
            Err(SessionError::Client(e)) => e.to_string(),
            other => panic!("expected client error, got {:?}", other),
        }
    }

    fn secret_config() -> Config {
        Config { secret: Some("123".into()), ..Config::default() }
    }

    #[tokio::test]
    async fn register_twice_is_name_in_use_and_keeps_first_connection() {
        let room = Room::new(Config::default());
        let mut a = room.peer(1);
        let mut b = room.peer(2);

        room.run(&mut a, "register alice").await.unwrap();
        assert_eq!(client_error(room.run(&mut b, "register alice").await), "username already in use");
        assert_eq!(client_error(room.run(&mut a, "register alice").await), "username already in use");
        assert_eq!(room.state.connection_id("alice"), Some(1));
        assert_eq!(a.frames(), vec![Frame::line("joined alice")]);
        assert!(b.frames().is_empty());
    }

    #[tokio::test]
    async fn one_name_per_connection() {
        let room = Room::new(Config::default());
        let mut a = room.peer(1);

        room.run(&mut a, "register alice").await.unwrap();
        assert_eq!(
            client_error(room.run(&mut a, "register bob").await),
            "connection already registered as alice"
        );
        assert_eq!(room.state.client_names(), vec!["alice"]);
    }

    #[tokio::test]
    async fn matching_secret_promotes_others_do_not() {
        let room = Room::new(secret_config());
        let mut a = room.peer(1);
        let mut b = room.peer(2);
        let mut c = room.peer(3);

        room.run(&mut a, "register alice 123").await.unwrap();
        room.run(&mut b, "register bob 1234").await.unwrap();
        room.run(&mut c, "register carol").await.unwrap();

        assert_eq!(room.state.admin_names(), vec!["alice"]);
    }

    #[tokio::test]
    async fn no_secret_configured_means_no_admins() {
        let room = Room::new(Config::default());
        let mut a = room.peer(1);

        room.run(&mut a, "register alice ").await.unwrap();
        assert!(room.state.admin_names().is_empty());
    }

    #[tokio::test]
    async fn empty_name_is_invalid() {
        let room = Room::new(Config::default());
        let mut a = room.peer(1);
        assert_eq!(client_error(room.run(&mut a, "register ").await), "invalid arguments received");
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registered_client_including_caller() {
        let room = Room::new(Config::default());
        let mut a = room.peer(1);
        let mut b = room.peer(2);
        let mut lurker = room.peer(3);

        room.run(&mut a, "register alice").await.unwrap();
        room.run(&mut b, "register bob").await.unwrap();
        a.frames();
        b.frames();

        room.run(&mut a, "broadcast song.mp3").await.unwrap();

        let expected = Frame::music("song.mp3", Bytes::from_static(b"\x49\x44\x33 not really an mp3"));
        assert_eq!(a.frames(), vec![expected.clone()]);
        assert_eq!(b.frames(), vec![expected]);
        assert!(lurker.frames().is_empty());
    }

    #[tokio::test]
    async fn broadcast_of_missing_file_sends_nothing() {
        let room = Room::new(Config::default());
        let mut a = room.peer(1);
        room.run(&mut a, "register alice").await.unwrap();
        a.frames();

        for line in ["broadcast missing.mp3", "broadcast drafts", "broadcast ../song.mp3"] {
            assert_eq!(client_error(room.run(&mut a, line).await), "file not found");
        }
        assert!(a.frames().is_empty());
        assert_eq!(room.state.client_names(), vec!["alice"]);
    }

    #[tokio::test]
    async fn unregistered_caller_may_broadcast_by_default() {
        let room = Room::new(Config::default());
        let mut a = room.peer(1);
        let mut dj = room.peer(2);
        room.run(&mut a, "register alice").await.unwrap();
        a.frames();

        room.run(&mut dj, "broadcast intro.mp3").await.unwrap();
        assert_eq!(a.frames(), vec![Frame::music("intro.mp3", Bytes::from_static(b"intro"))]);
        assert!(dj.frames().is_empty());
    }

    #[tokio::test]
    async fn admin_policy_gates_broadcast() {
        let room = Room::new(Config { broadcast_policy: BroadcastPolicy::Admins, ..secret_config() });
        let mut admin = room.peer(1);
        let mut guest = room.peer(2);
        let mut anonymous = room.peer(3);

        room.run(&mut admin, "register alice 123").await.unwrap();
        room.run(&mut guest, "register bob").await.unwrap();

        assert_eq!(client_error(room.run(&mut guest, "broadcast intro.mp3").await), "admin privileges required");
        assert_eq!(client_error(room.run(&mut anonymous, "broadcast intro.mp3").await), "admin privileges required");
        room.run(&mut admin, "broadcast intro.mp3").await.unwrap();
    }

    #[tokio::test]
    async fn failed_recipients_are_reported_to_the_caller() {
        let room = Room::new(Config::default());
        let mut a = room.peer(1);
        let mut b = room.peer(2);
        room.run(&mut a, "register alice").await.unwrap();
        room.run(&mut b, "register bob").await.unwrap();
        a.frames();

        // bob's writer is gone but his session has not ended yet
        let Peer { session: _bob_session, rx } = b;
        drop(rx);

        let msg = client_error(room.run(&mut a, "broadcast intro.mp3").await);
        assert_eq!(msg, "unable to deliver to 1 client(s): bob (connection closed)");
        assert_eq!(a.frames(), vec![Frame::music("intro.mp3", Bytes::from_static(b"intro"))]);
    }

    #[tokio::test]
    async fn list_replies_to_caller_only() {
        let room = Room::new(secret_config());
        let mut a = room.peer(1);
        let mut b = room.peer(2);
        room.run(&mut a, "register zoe 123").await.unwrap();
        room.run(&mut b, "register adam").await.unwrap();
        a.frames();
        b.frames();

        room.run(&mut a, "list clients").await.unwrap();
        room.run(&mut a, "list admins").await.unwrap();
        room.run(&mut a, "list musics").await.unwrap();
        room.run(&mut a, "list playlist").await.unwrap();

        assert_eq!(a.frames(), vec![
            Frame::line("clients adam zoe"),
            Frame::line("admins zoe"),
            Frame::line("musics intro.mp3 song.mp3"),
            Frame::line("playlist"),
        ]);
        assert!(b.frames().is_empty());
        assert_eq!(client_error(room.run(&mut a, "list rooms").await), "invalid arguments received");
    }

    #[tokio::test]
    async fn player_add_allows_duplicates() {
        let room = Room::new(Config::default());
        let mut a = room.peer(1);

        room.run(&mut a, "player add intro.mp3").await.unwrap();
        room.run(&mut a, "player add intro.mp3").await.unwrap();
        room.run(&mut a, "player add song.mp3").await.unwrap();

        let playlist = room.state.playlist();
        assert_eq!(playlist.len(), 3);
        assert_eq!(playlist[0].path, room.state.config().music_dir.join("intro.mp3"));
        assert_eq!(room.state.list_playlist(), "playlist intro.mp3 intro.mp3 song.mp3");
        assert_eq!(a.frames()[0], Frame::line("added intro.mp3"));
    }

    #[tokio::test]
    async fn player_add_rejects_unknown_files_and_subcommands() {
        let room = Room::new(Config::default());
        let mut a = room.peer(1);

        assert_eq!(client_error(room.run(&mut a, "player add nope.mp3").await), "file not found");
        assert_eq!(client_error(room.run(&mut a, "player add drafts").await), "file not found");
        assert_eq!(client_error(room.run(&mut a, "player play intro.mp3").await), "invalid arguments received");
        assert!(room.state.playlist().is_empty());
    }

    #[tokio::test]
    async fn short_commands_are_always_no_arguments() {
        let room = Room::new(Config::default());
        let mut a = room.peer(1);

        for line in ["register", "broadcast", "list", "player", "player add"] {
            assert_eq!(client_error(room.run(&mut a, line).await), "no arguments received", "{}", line);
        }
    }

    #[tokio::test]
    async fn racing_registrations_of_one_name_have_one_winner() {
        let room = Arc::new(Room::new(Config::default()));
        let mut tasks = vec![];

        for id in 0..16 {
            let room = Arc::clone(&room);
            tasks.push(tokio::spawn(async move {
                let mut peer = room.peer(id);
                let won = room.run(&mut peer, "register dj").await.is_ok();
                // keep the winner's registration alive until counted
                (won, peer)
            }));
        }

        let mut peers = vec![];
        for t in tasks {
            peers.push(t.await.unwrap());
        }

        assert_eq!(peers.iter().filter(|(won, _)| *won).count(), 1);
        assert_eq!(room.state.client_names(), vec!["dj"]);
    }

    #[tokio::test]
    async fn distinct_concurrent_registrations_all_succeed() {
        let room = Arc::new(Room::new(Config::default()));
        let mut tasks = vec![];

        for id in 0..8u64 {
            let room = Arc::clone(&room);
            tasks.push(tokio::spawn(async move {
                let mut peer = room.peer(id);
                room.run(&mut peer, &format!("register user{}", id)).await.unwrap();
                peer
            }));
        }

        let mut peers = vec![];
        for t in tasks {
            peers.push(t.await.unwrap());
        }

        let names = room.state.client_names();
        assert_eq!(names.len(), 8);
        assert!(names.contains(&"user0".to_owned()) && names.contains(&"user7".to_owned()));
    }
}
