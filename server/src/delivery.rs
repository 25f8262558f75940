use musicroom_protocol::Frame;
use tracing::debug;

use crate::error::{BroadcastError, DeliveryFailure};
use crate::names::Names;

// handles frame delivery to every registered client
pub struct Delivery;

impl Delivery {
    // Queue one copy of the frame on every registered connection.
    // A failing recipient never stops delivery to the rest, failures are
    // collected and returned together. Returns the number of clients reached.
    pub fn broadcast(names: &Names, frame: &Frame) -> Result<usize, BroadcastError> {
        let mut failures = vec![];
        let mut delivered = 0;

        for (name, conn) in names.iter() {
            debug!("Queueing frame for {} ({:?})", name, conn.addr());

            match conn.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(reason) => failures.push(DeliveryFailure { name: name.clone(), reason }),
            }
        }

        if failures.is_empty() {
            Ok(delivered)
        } else {
            failures.sort_by(|a, b| a.name.cmp(&b.name));
            Err(BroadcastError { failures })
        }
    }
}
