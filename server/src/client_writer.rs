use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use futures::SinkExt; // provides combinator methods like send/send_all on top of FramedWrite buf write and Sink trait

use tracing::{debug, info};

use musicroom_protocol::{Frame, ServerCodec};

use crate::server_types::ConnectionId;

// Sole writer of a connection's socket. Frames arrive through the
// connection queue and are written whole, in queue order.
pub struct ClientWriter;

impl ClientWriter {
    pub fn spawn(id: ConnectionId, tcp_write: OwnedWriteHalf, mut rx: Receiver<Frame>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut fw = FramedWrite::new(tcp_write, ServerCodec::default());

            // ends once every Connection handle is dropped
            while let Some(frame) = rx.recv().await {
                if let Err(e) = fw.send(frame).await {
                    info!("Connection {} write failed: {}", id, e);
                    return;
                }
            }

            debug!("Connection {} writer done", id);
        })
    }
}
