//! Fan-out of state deltas, chat and social notices to connected clients
//!
//! Every connection owns an unbounded outbound queue drained by a single
//! writer task, so delivery order per connection equals enqueue order.
//! Delivery is best-effort and at-most-once: a send to a closed queue is
//! dropped, and a missed delta is superseded by the next one.

use std::collections::{HashMap, VecDeque};

use tokio::sync::mpsc;
use tracing::debug;

use crate::net::protocol::{ChatLine, ServerMessage};
use crate::world::player::ConnectionId;

/// How many chat lines are replayed to late joiners
pub const CHAT_RING_CAPACITY: usize = 32;

/// Items on a connection's outbound queue
#[derive(Debug)]
pub enum Outbound {
    Message(ServerMessage),
    /// Terminal: the writer flushes queued messages, closes the transport
    /// and exits. Enqueued after `Kicked` during revocation.
    Close,
}

pub type OutboundSender = mpsc::UnboundedSender<Outbound>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

pub fn outbound_channel() -> (OutboundSender, OutboundReceiver) {
    mpsc::unbounded_channel()
}

/// Routes server messages to connection outbound queues
#[derive(Debug, Default)]
pub struct BroadcastRouter {
    senders: HashMap<ConnectionId, OutboundSender>,
    chat_ring: VecDeque<ChatLine>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connection_id: ConnectionId, sender: OutboundSender) {
        self.senders.insert(connection_id, sender);
    }

    pub fn unregister(&mut self, connection_id: ConnectionId) {
        self.senders.remove(&connection_id);
    }

    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }

    /// Targeted send. Returns false when the connection has no live queue
    /// (the message is dropped, not queued).
    pub fn unicast(&self, connection_id: ConnectionId, message: ServerMessage) -> bool {
        match self.senders.get(&connection_id) {
            Some(tx) => tx.send(Outbound::Message(message)).is_ok(),
            None => false,
        }
    }

    /// Broadcast to every connection including `connection_id`s own
    pub fn broadcast_all(&self, message: &ServerMessage) {
        for (id, tx) in &self.senders {
            if tx.send(Outbound::Message(message.clone())).is_err() {
                debug!("Dropped broadcast to closed connection {}", id);
            }
        }
    }

    /// Broadcast to every connection except the originator
    pub fn broadcast_except(&self, skip: ConnectionId, message: &ServerMessage) {
        for (id, tx) in &self.senders {
            if *id == skip {
                continue;
            }
            if tx.send(Outbound::Message(message.clone())).is_err() {
                debug!("Dropped broadcast to closed connection {}", id);
            }
        }
    }

    /// Terminate a connection: enqueue the kick notice, then the close
    /// marker, then drop the queue. The per-connection FIFO guarantees the
    /// notice is written before the transport closes.
    pub fn kick(&mut self, connection_id: ConnectionId, message: String) {
        if let Some(tx) = self.senders.remove(&connection_id) {
            let _ = tx.send(Outbound::Message(ServerMessage::Kicked { message }));
            let _ = tx.send(Outbound::Close);
        }
    }

    /// Append a chat line to the bounded replay ring
    pub fn record_chat(&mut self, line: ChatLine) {
        if self.chat_ring.len() == CHAT_RING_CAPACITY {
            self.chat_ring.pop_front();
        }
        self.chat_ring.push_back(line);
    }

    /// Recent chat lines, oldest first
    pub fn recent_chat(&self) -> Vec<ChatLine> {
        self.chat_ring.iter().cloned().collect()
    }
}
