// ============================
// relay-backend-lib/src/rooms.rs
// ============================
//! Transport-level rooms: which live connections receive a community's
//! broadcasts, and the outbound channel of each connection.
//!
//! This table is keyed by connection, while [`crate::registry`] is keyed by
//! participant; the presence coordinator keeps the two in step.
use std::collections::{HashMap, HashSet};

use metrics::counter;
use relay_common::{CommunityId, ParticipantId, ServerEvent};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics::{EVENTS_DELIVERED, EVENTS_DROPPED};

/// Server-assigned identity of one WebSocket connection
pub type ConnectionId = Uuid;

/// Sending half of a connection's outbound queue
pub type Outbound = mpsc::Sender<ServerEvent>;

/// Events buffered per connection before further events to it are dropped
pub const OUTBOUND_CAPACITY: usize = 256;

/// Who receives a [`Delivery`], relative to the connection whose event
/// triggered it
#[derive(Debug, Clone, PartialEq)]
pub enum Audience {
    /// Only the originating connection
    Origin,
    /// Everyone in the community except the originating connection
    Peers(CommunityId),
    /// Everyone in the community, originating connection included
    Community(CommunityId),
}

/// One outbound event and its audience
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub audience: Audience,
    pub event: ServerEvent,
}

impl Delivery {
    pub fn new(audience: Audience, event: ServerEvent) -> Self {
        Self { audience, event }
    }
}

struct Connection {
    participant: ParticipantId,
    outbound: Outbound,
}

#[derive(Default)]
pub struct Rooms {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<CommunityId, HashSet<ConnectionId>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a connection addressable
    pub fn attach(&mut self, connection: ConnectionId, participant: ParticipantId, outbound: Outbound) {
        self.connections.insert(connection, Connection { participant, outbound });
    }

    /// Forget a connection and take it out of every room.
    /// Returns the participant it was registered for.
    pub fn detach(&mut self, connection: ConnectionId) -> Option<ParticipantId> {
        for members in self.rooms.values_mut() {
            members.remove(&connection);
        }
        self.connections.remove(&connection).map(|c| c.participant)
    }

    pub fn participant(&self, connection: ConnectionId) -> Option<&str> {
        self.connections.get(&connection).map(|c| c.participant.as_str())
    }

    pub fn join(&mut self, community_id: &str, connection: ConnectionId) {
        self.rooms
            .entry(community_id.to_string())
            .or_default()
            .insert(connection);
    }

    pub fn leave(&mut self, community_id: &str, connection: ConnectionId) {
        if let Some(members) = self.rooms.get_mut(community_id) {
            members.remove(&connection);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Hand every delivery to the matching outbound queues.
    /// Sends never block: a queue whose connection is gone is skipped, and
    /// an event for a connection whose queue is full is dropped.
    /// Returns the number of events queued.
    pub fn deliver(&self, origin: ConnectionId, deliveries: Vec<Delivery>) -> usize {
        let mut queued = 0;
        for Delivery { audience, event } in deliveries {
            let recipients: Vec<ConnectionId> = match &audience {
                Audience::Origin => vec![origin],
                Audience::Peers(community_id) => self
                    .room_members(community_id)
                    .filter(|connection| *connection != origin)
                    .collect(),
                Audience::Community(community_id) => self.room_members(community_id).collect(),
            };

            for connection in recipients {
                if self.send(connection, event.clone()) {
                    queued += 1;
                }
            }
        }
        counter!(EVENTS_DELIVERED).increment(queued as u64);
        queued
    }

    fn room_members<'a>(&'a self, community_id: &str) -> impl Iterator<Item = ConnectionId> + 'a {
        self.rooms
            .get(community_id)
            .into_iter()
            .flat_map(|members| members.iter().copied())
    }

    fn send(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        let Some(target) = self.connections.get(&connection) else {
            return false;
        };
        match target.outbound.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                counter!(EVENTS_DROPPED).increment(1);
                warn!(%connection, participant = %target.participant, "outbound queue full, dropping event");
                false
            },
            Err(TrySendError::Closed(_)) => {
                debug!(%connection, "outbound queue closed, dropping event");
                false
            },
        }
    }
}
