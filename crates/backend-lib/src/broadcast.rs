// ============================
// crates/backend-lib/src/broadcast.rs
// ============================
//! Event fan-out to connections.
//!
//! Every connection registers an unbounded outbound sender here; sends are
//! synchronous, so room handlers can broadcast while holding the room lock
//! without suspending.

use crate::room::RoomRegistry;
use codemeet_common::ServerEvent;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A frame queued for one connection's writer task.
#[derive(Debug)]
pub enum Delivery {
    /// Serialize and send this event
    Event(ServerEvent),
    /// Close the WebSocket (forced disconnect, e.g. `endMeeting`)
    Close,
}

/// Fans out state-changing events to all or a subset of a room's
/// connections.
#[derive(Clone, Default)]
pub struct BroadcastRouter {
    senders: Arc<DashMap<Uuid, mpsc::UnboundedSender<Delivery>>>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound channel
    pub fn register(&self, conn_id: Uuid, tx: mpsc::UnboundedSender<Delivery>) {
        self.senders.insert(conn_id, tx);
    }

    /// Remove a connection's outbound channel
    pub fn unregister(&self, conn_id: &Uuid) {
        self.senders.remove(conn_id);
    }

    /// Send one event to one connection. A send to a vanished connection
    /// is a no-op.
    pub fn send_to(&self, conn_id: &Uuid, event: ServerEvent) {
        if let Some(tx) = self.senders.get(conn_id) {
            let _ = tx.send(Delivery::Event(event));
        }
    }

    /// Send one event to every listed connection
    pub fn broadcast(&self, members: &[Uuid], event: ServerEvent) {
        for conn_id in members {
            if let Some(tx) = self.senders.get(conn_id) {
                let _ = tx.send(Delivery::Event(event.clone()));
            }
        }
    }

    /// Send one event to every listed connection except `skip`
    pub fn broadcast_except(&self, members: &[Uuid], skip: &Uuid, event: ServerEvent) {
        for conn_id in members {
            if conn_id == skip {
                continue;
            }
            if let Some(tx) = self.senders.get(conn_id) {
                let _ = tx.send(Delivery::Event(event.clone()));
            }
        }
    }

    /// Ask a connection's writer task to close the socket
    pub fn close(&self, conn_id: &Uuid) {
        if let Some(tx) = self.senders.get(conn_id) {
            let _ = tx.send(Delivery::Close);
        }
    }

    pub fn is_registered(&self, conn_id: &Uuid) -> bool {
        self.senders.contains_key(conn_id)
    }
}

/// A room-addressed output handle.
///
/// The sandbox holds one of these per run and resolves the room's current
/// membership at every emit, so participants who join mid-run still see
/// output and participants who left stop receiving it. If the room is gone
/// the emit is dropped.
#[derive(Clone)]
pub struct RoomSink {
    registry: RoomRegistry,
    router: BroadcastRouter,
    room_id: String,
}

impl RoomSink {
    pub fn new(registry: RoomRegistry, router: BroadcastRouter, room_id: String) -> Self {
        Self {
            registry,
            router,
            room_id,
        }
    }

    /// Broadcast a `codeOutput` event to the room's current members
    pub fn emit_output(&self, output: String, waiting_for_input: bool) {
        if let Some(members) = self.registry.member_ids(&self.room_id) {
            self.router.broadcast(
                &members,
                ServerEvent::CodeOutput {
                    output,
                    waiting_for_input,
                },
            );
        }
    }
}
