use std::net::SocketAddr;

use tokio::sync::mpsc::Receiver;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use musicroom_protocol::Frame;

use crate::error::SessionError;

const ERROR_MSG: &str = "error {}";

/// A session failure on its way to the supervisor
#[derive(Debug)]
pub struct Failure {
    pub peer: SocketAddr,
    pub error: SessionError,
    // fired once any reply has been queued on the connection
    pub queued: Option<oneshot::Sender<()>>,
}

impl Failure {
    pub fn new(peer: SocketAddr, error: SessionError) -> Self {
        Self { peer, error, queued: None }
    }
}

// Single consumer of every session failure. Client errors are answered on
// their origin connection, everything else is logged. It never closes a
// connection itself.
pub struct ErrorSupervisor;

impl ErrorSupervisor {
    pub fn spawn(mut errors_rx: Receiver<Failure>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(failure) = errors_rx.recv().await {
                Self::handle(failure);
            }

            info!("No more failure senders");
        })
    }

    fn handle(failure: Failure) {
        let Failure { peer, error, queued } = failure;

        match error {
            SessionError::Client(e) => {
                let reply = Frame::line(ERROR_MSG.replace("{}", &e.to_string()));
                if let Err(send_err) = e.conn().send(reply) {
                    warn!("Unable to report \"{}\" to {:?}: {}", e, peer, send_err);
                }
            },
            SessionError::Closed => info!("Remote {:?} has closed connection", peer),
            other => warn!("Session {:?} terminated: {}", peer, other),
        }

        if let Some(tx) = queued {
            let _ = tx.send(());
        }
    }
}
