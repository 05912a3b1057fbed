//! Test utilities shared by the relay integration tests

#![allow(dead_code)]

use relay_backend_lib::config::FanoutSettings;
use relay_backend_lib::relay_actor::{spawn_relay_actor, RelayHandle};
use relay_backend_lib::rooms::{ConnectionId, OUTBOUND_CAPACITY};
use relay_common::{ClientEvent, ServerEvent};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

/// A fake connection: its id plus the queue the relay writes to
pub struct TestClient {
    pub connection: ConnectionId,
    pub participant: String,
    rx: mpsc::Receiver<ServerEvent>,
}

impl TestClient {
    /// Everything queued for this client so far
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn spawn_relay() -> RelayHandle {
    spawn_relay_actor(FanoutSettings::default())
}

pub fn connect(relay: &RelayHandle, participant: &str) -> TestClient {
    let connection = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
    relay
        .connect(connection, participant.to_string(), tx)
        .expect("relay is running");
    TestClient {
        connection,
        participant: participant.to_string(),
        rx,
    }
}

pub fn send(relay: &RelayHandle, client: &TestClient, event: ClientEvent) {
    relay.dispatch(client.connection, event).expect("relay is running");
}

pub fn join(relay: &RelayHandle, client: &TestClient, community: &str) {
    send(
        relay,
        client,
        ClientEvent::JoinCommunity {
            community_id: community.to_string(),
        },
    );
}

/// Wait until the relay has processed every command sent before this call.
///
/// The actor handles commands in order, so answering a query means all
/// earlier events and their deliveries are done.
pub async fn settle(relay: &RelayHandle) {
    relay.community_users().await.expect("relay is running");
}

pub fn message(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

pub fn send_message(relay: &RelayHandle, client: &TestClient, community: &str, body: Value) {
    send(
        relay,
        client,
        ClientEvent::SendMessage {
            community_id: community.to_string(),
            message: message(body),
        },
    );
}

pub fn create_poll(relay: &RelayHandle, client: &TestClient, community: &str, poll_id: &str, options: &[&str]) {
    send(
        relay,
        client,
        ClientEvent::CreatePoll {
            community_id: community.to_string(),
            poll_id: poll_id.into(),
            poll_data: json!({"question": "Which one?", "options": options}).to_string(),
        },
    );
}

pub fn cast_vote(relay: &RelayHandle, client: &TestClient, community: &str, poll_id: &str, option: usize) {
    send_message(
        relay,
        client,
        community,
        json!({
            "type": "cast_vote",
            "pollId": poll_id,
            "option": option,
            "voterId": client.participant,
        }),
    );
}
