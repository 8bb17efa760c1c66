use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use super::userctx::Identity;
use crate::models::SendMessage;

pub type ConnId = Uuid;

/// Result of handing a message to one connection's outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The queue was full; the connection has been told to close.
    Evicted,
    /// The connection's writer is already gone.
    Closed,
}

/// Producer side of a connection's bounded outbound queue.
///
/// Delivery never waits: a full queue evicts the slow consumer instead of
/// stalling whoever is broadcasting.
#[derive(Clone, Debug)]
pub struct Outbound {
    conn_id: ConnId,
    tx: mpsc::Sender<SendMessage>,
    evict: CancellationToken,
}

impl Outbound {
    pub fn deliver(&self, msg: SendMessage) -> Delivery {
        if self.evict.is_cancelled() {
            return Delivery::Evicted;
        }
        match self.tx.try_send(msg) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(msg)) => {
                warn!(
                    "Outbound queue full for connection {} while sending {}; evicting slow consumer",
                    self.conn_id,
                    msg.event()
                );
                self.evict.cancel();
                Delivery::Evicted
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Ask the connection to close without waiting for it
    pub fn close(&self) {
        self.evict.cancel();
    }
}

/// Consumer side of the outbound queue, drained by the socket writer
pub struct OutboundQueue {
    rx: mpsc::Receiver<SendMessage>,
    evict: CancellationToken,
}

impl OutboundQueue {
    pub async fn recv(&mut self) -> Option<SendMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SendMessage> {
        self.rx.try_recv().ok()
    }

    /// Token cancelled when the connection is evicted or closed by the server
    pub fn eviction(&self) -> CancellationToken {
        self.evict.clone()
    }

    pub fn is_evicted(&self) -> bool {
        self.evict.is_cancelled()
    }
}

pub(crate) fn outbound_channel(conn_id: ConnId, capacity: usize) -> (Outbound, OutboundQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let evict = CancellationToken::new();
    (
        Outbound {
            conn_id,
            tx,
            evict: evict.clone(),
        },
        OutboundQueue { rx, evict },
    )
}

/// An authenticated connection.
///
/// Built only by `RoomRegistry::register` from a verified identity; every
/// message handler takes one, so nothing runs for an unauthenticated
/// transport.
#[derive(Debug)]
pub struct Connection {
    id: ConnId,
    identity: Identity,
    outbound: Outbound,
}

impl Connection {
    pub(crate) fn new(id: ConnId, identity: Identity, outbound: Outbound) -> Self {
        Self { id, identity, outbound }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    /// Reply to this connection only
    pub fn send(&self, msg: SendMessage) -> Delivery {
        self.outbound.deliver(msg)
    }
}
