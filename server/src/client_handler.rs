use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, Sender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_stream::StreamExt; // provides combinator methods like next on top of FramedRead buf read and Stream trait

use tracing::{debug, info, error};

use musicroom_protocol::{Inbound, ServerCodec};

use crate::client_writer::ClientWriter;
use crate::commands::Commands;
use crate::error::{ClientError, CommandError, SessionError};
use crate::server::ServerState;
use crate::server_channel::Failure;
use crate::server_types::{Connection, ConnectionId, Session, WRITE_QUEUE_SIZE};

// Handles server communication from client
// Essentially this models a client actor on the server side
pub struct ClientHandler {
    state: Arc<ServerState>,
    commands: Arc<Commands>,
    session: Session,
    errors: Sender<Failure>,
}

impl ClientHandler {
    pub fn new(state: Arc<ServerState>, commands: Arc<Commands>, conn: Connection, errors: Sender<Failure>) -> Self {
        Self {
            state,
            commands,
            session: Session::new(conn),
            errors,
        }
    }

    // Spawn the writer and the session task for one accepted socket
    pub fn spawn(socket: TcpStream, addr: SocketAddr, id: ConnectionId, state: Arc<ServerState>,
                 commands: Arc<Commands>, errors: Sender<Failure>) -> JoinHandle<()> {
        let (tcp_read, tcp_write) = socket.into_split();
        let (tx, rx) = mpsc::channel(WRITE_QUEUE_SIZE);

        ClientWriter::spawn(id, tcp_write, rx);

        let max_length = state.config().buffer_size;
        let conn = Connection::new(id, addr, tx);

        tokio::spawn(async move {
            let mut h = ClientHandler::new(state, commands, conn, errors);
            let fr = FramedRead::new(tcp_read, ServerCodec::new(max_length));

            let result = h.handle_read(fr).await;

            // dropping the session releases its registered name
            let ClientHandler { session, errors, .. } = h;
            drop(session);

            if let Err(error) = result {
                if errors.send(Failure::new(addr, error)).await.is_err() {
                    error!("Error supervisor is gone, dropping failure for {:?}", addr);
                }
            }
        })
    }

    // Loop to handle ongoing client lines, strictly one at a time.
    // Returns only when the session has to end.
    pub async fn handle_read(&mut self, mut fr: FramedRead<OwnedReadHalf, ServerCodec>) -> Result<(), SessionError> {
        let max_length = fr.decoder().max_length();

        loop {
            let inbound = match fr.next().await {
                Some(Ok(inbound)) => inbound,
                Some(Err(e)) => return Err(SessionError::Io(e)),
                None => return Err(SessionError::Closed),
            };

            debug!("server received: {:?}", inbound);

            let result = match inbound {
                Inbound::Line(line) => self.commands.dispatch(&self.state, &mut self.session, &line).await,
                Inbound::TooLong => Err(self.session.reject(CommandError::LineTooLong(max_length))),
            };

            match result {
                Ok(()) => {},
                Err(SessionError::Client(e)) => self.report(e).await,
                Err(e) => {
                    info!("Session {:?} ending: {}", self.session.conn().addr(), e);
                    return Err(e);
                },
            }
        }
    }

    // hand recoverable errors to the supervisor, which owns reply formatting,
    // and wait for the reply to be queued so replies keep command order
    async fn report(&self, e: ClientError) {
        let peer = e.conn().addr();
        let (queued_tx, queued_rx) = oneshot::channel();
        let failure = Failure { queued: Some(queued_tx), ..Failure::new(peer, SessionError::Client(e)) };

        if self.errors.send(failure).await.is_err() {
            error!("Error supervisor is gone, dropping client error for {:?}", peer);
            return;
        }

        if queued_rx.await.is_err() {
            debug!("Error supervisor dropped client error for {:?}", peer);
        }
    }
}
