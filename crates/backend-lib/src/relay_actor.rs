// ============================
// relay-backend-lib/src/relay_actor.rs
// ============================
//! The relay actor: sole owner of membership, polls and rooms.
//!
//! Every connection talks to it through a [`RelayHandle`]. Commands are
//! processed one at a time, so each event's read, mutation and broadcast
//! completes before the next event starts and no locking is needed.
use std::collections::BTreeMap;

use metrics::{counter, gauge};
use relay_common::{ClientEvent, CommunityId, ParticipantId, PollKey};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::FanoutSettings;
use crate::error::AppError;
use crate::metrics::{WS_ACTIVE, WS_CONNECTION};
use crate::polls::{PollSnapshot, PollStore};
use crate::presence;
use crate::registry::MembershipRegistry;
use crate::rooms::{ConnectionId, Outbound, Rooms};
use crate::router::{MessageRouter, Origin};

/// Message sent *into* the actor
#[derive(Debug)]
pub enum RelayMsg {
    Connect {
        connection: ConnectionId,
        participant: ParticipantId,
        outbound: Outbound,
    },
    Event {
        connection: ConnectionId,
        event: ClientEvent,
    },
    Disconnect {
        connection: ConnectionId,
    },
    ActivePolls {
        resp_tx: oneshot::Sender<BTreeMap<PollKey, PollSnapshot>>,
    },
    CommunityUsers {
        resp_tx: oneshot::Sender<BTreeMap<CommunityId, Vec<ParticipantId>>>,
    },
}

/// Handle that connection tasks keep: the actor's command channel
#[derive(Clone, Debug)]
pub struct RelayHandle {
    cmd_tx: mpsc::UnboundedSender<RelayMsg>,
}

impl RelayHandle {
    /// Register a connection and the queue its events are written to
    pub fn connect(
        &self,
        connection: ConnectionId,
        participant: ParticipantId,
        outbound: Outbound,
    ) -> Result<(), AppError> {
        self.cmd_tx.send(RelayMsg::Connect {
            connection,
            participant,
            outbound,
        })?;
        Ok(())
    }

    /// Queue an inbound event; it is handled after everything sent before it
    pub fn dispatch(&self, connection: ConnectionId, event: ClientEvent) -> Result<(), AppError> {
        self.cmd_tx.send(RelayMsg::Event { connection, event })?;
        Ok(())
    }

    pub fn disconnect(&self, connection: ConnectionId) -> Result<(), AppError> {
        self.cmd_tx.send(RelayMsg::Disconnect { connection })?;
        Ok(())
    }

    pub async fn active_polls(&self) -> Result<BTreeMap<PollKey, PollSnapshot>, AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx.send(RelayMsg::ActivePolls { resp_tx })?;
        Ok(resp_rx.await?)
    }

    pub async fn community_users(&self) -> Result<BTreeMap<CommunityId, Vec<ParticipantId>>, AppError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.cmd_tx.send(RelayMsg::CommunityUsers { resp_tx })?;
        Ok(resp_rx.await?)
    }
}

pub struct RelayActor {
    registry: MembershipRegistry,
    polls: PollStore,
    rooms: Rooms,
    router: MessageRouter,
}

impl RelayActor {
    pub fn new(fanout: FanoutSettings) -> Self {
        RelayActor {
            registry: MembershipRegistry::new(),
            polls: PollStore::new(),
            rooms: Rooms::new(),
            router: MessageRouter::new(fanout),
        }
    }

    pub fn connect(&mut self, connection: ConnectionId, participant: ParticipantId, outbound: Outbound) {
        presence::connect(&mut self.rooms, connection, participant, outbound);
        counter!(WS_CONNECTION).increment(1);
        gauge!(WS_ACTIVE).set(self.rooms.connection_count() as f64);
    }

    /// Apply one inbound event and queue the resulting deliveries.
    /// Returns the number of events queued.
    pub fn handle_event(&mut self, connection: ConnectionId, event: ClientEvent) -> usize {
        let Some(participant) = self.rooms.participant(connection).map(str::to_string) else {
            warn!(%connection, "event from unregistered connection dropped");
            return 0;
        };
        let origin = Origin {
            connection,
            participant: &participant,
        };

        let deliveries = match event {
            ClientEvent::JoinCommunity { community_id } => presence::join(
                &mut self.registry,
                &mut self.rooms,
                connection,
                &participant,
                &community_id,
            ),
            ClientEvent::LeaveCommunity { community_id } => presence::leave(
                &mut self.registry,
                &mut self.rooms,
                connection,
                &participant,
                &community_id,
            ),
            ClientEvent::SendMessage { community_id, message } => {
                self.router
                    .send_message(&mut self.polls, origin, &community_id, message)
            },
            ClientEvent::CreatePoll {
                community_id,
                poll_id,
                poll_data,
            } => self
                .router
                .create_poll(&mut self.polls, origin, &community_id, poll_id, poll_data),
            ClientEvent::ShareDocument {
                community_id,
                document_name,
                document_data,
            } => self
                .router
                .share_document(origin, &community_id, document_name, document_data),
        };

        self.rooms.deliver(connection, deliveries)
    }

    /// Drop a connection and notify the communities it was in.
    /// Returns the number of events queued.
    pub fn disconnect(&mut self, connection: ConnectionId) -> usize {
        let deliveries = presence::disconnect(&mut self.registry, &mut self.rooms, connection);
        gauge!(WS_ACTIVE).set(self.rooms.connection_count() as f64);
        self.rooms.deliver(connection, deliveries)
    }

    pub fn registry(&self) -> &MembershipRegistry {
        &self.registry
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RelayMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                RelayMsg::Connect {
                    connection,
                    participant,
                    outbound,
                } => self.connect(connection, participant, outbound),
                RelayMsg::Event { connection, event } => {
                    self.handle_event(connection, event);
                },
                RelayMsg::Disconnect { connection } => {
                    self.disconnect(connection);
                },
                RelayMsg::ActivePolls { resp_tx } => {
                    let _ = resp_tx.send(self.polls.snapshot());
                },
                RelayMsg::CommunityUsers { resp_tx } => {
                    let _ = resp_tx.send(self.registry.snapshot());
                },
            }
        }
        debug!("relay actor stopped");
    }
}

/// Spawn the relay actor and return its handle
pub fn spawn_relay_actor(fanout: FanoutSettings) -> RelayHandle {
    let (cmd_tx, rx_cmd) = mpsc::unbounded_channel();
    let actor = RelayActor::new(fanout);

    tokio::spawn(async move {
        actor.run(rx_cmd).await;
    });

    RelayHandle { cmd_tx }
}
