// ============================
// relay-backend-lib/src/router.rs
// ============================
//! Message router.
//!
//! Classifies what a connected participant sent, applies poll and vote
//! effects to the [`PollStore`], and decides who receives what:
//!
//! | inbound                | store effect          | fan-out                      |
//! |------------------------|-----------------------|------------------------------|
//! | plain message          | none                  | self/peer split              |
//! | embedded poll message  | `ensure_exists`       | self/peer split              |
//! | `cast_vote` message    | `cast_vote`           | `vote_update` per settings   |
//! | `create_poll`          | `create_or_replace`   | `poll_update` per settings   |
//! | `share_document`       | none                  | `document_shared` per settings |
//!
//! Malformed payloads and rejected votes produce no deliveries.
use metrics::counter;
use relay_common::{
    DocumentShared, MessageKind, OpaqueId, PayloadError, PollDefinition, PollUpdate, ServerEvent,
};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::{Fanout, FanoutSettings};
use crate::metrics::{MESSAGES_RELAYED, PAYLOAD_MALFORMED, POLLS_CREATED, VOTES_ACCEPTED, VOTES_REJECTED};
use crate::polls::{PollStore, VoteRejected};
use crate::rooms::{Audience, ConnectionId, Delivery};

/// Longest content preview written to the log, in characters
const PREVIEW_CHARS: usize = 100;

/// The connection and participant an inbound event came from
#[derive(Debug, Clone, Copy)]
pub struct Origin<'a> {
    pub connection: ConnectionId,
    pub participant: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct MessageRouter {
    fanout: FanoutSettings,
}

impl MessageRouter {
    pub fn new(fanout: FanoutSettings) -> Self {
        Self { fanout }
    }

    /// Handle a `sendMessage` event
    pub fn send_message(
        &self,
        polls: &mut PollStore,
        origin: Origin<'_>,
        community_id: &str,
        message: Map<String, Value>,
    ) -> Vec<Delivery> {
        let kind = message.get("type").and_then(Value::as_str).unwrap_or("unknown");
        info!(
            community_id,
            participant = origin.participant,
            kind,
            preview = %content_preview(&message),
            "message received"
        );

        match MessageKind::classify(&message) {
            Ok(MessageKind::Generic) => {
                counter!(MESSAGES_RELAYED).increment(1);
                split(community_id, ServerEvent::NewMessage(message))
            },
            Ok(MessageKind::Poll { poll_id, definition }) => {
                if polls.ensure_exists(&poll_id, community_id, definition) {
                    counter!(POLLS_CREATED).increment(1);
                    info!(community_id, poll_id = %poll_id, "poll created from message");
                }
                counter!(MESSAGES_RELAYED).increment(1);
                split(community_id, ServerEvent::NewMessage(message))
            },
            Ok(MessageKind::CastVote(cast)) => {
                let voter = cast.voter_id.as_deref().unwrap_or(origin.participant);
                let result = match cast.option.index() {
                    Some(option) => polls.cast_vote(&cast.poll_id, voter, option),
                    None => Err(VoteRejected::InvalidOption {
                        poll: cast.poll_id.key(),
                        option: cast.option.to_string(),
                    }),
                };
                match result {
                    Ok(update) => {
                        counter!(VOTES_ACCEPTED).increment(1);
                        info!(
                            community_id,
                            poll_id = %cast.poll_id,
                            voter,
                            votes = ?update.votes,
                            percentages = ?update.percentages,
                            "broadcasting vote update"
                        );
                        fan_out(self.fanout.votes, community_id, ServerEvent::VoteUpdate(update))
                    },
                    Err(rejected) => {
                        counter!(VOTES_REJECTED).increment(1);
                        match &rejected {
                            VoteRejected::AlreadyVoted { .. } => info!("{rejected}"),
                            _ => debug!("vote ignored: {rejected}"),
                        }
                        Vec::new()
                    },
                }
            },
            Err(err) => malformed(community_id, origin, &err),
        }
    }

    /// Handle a `create_poll` event
    pub fn create_poll(
        &self,
        polls: &mut PollStore,
        origin: Origin<'_>,
        community_id: &str,
        poll_id: OpaqueId,
        poll_data: String,
    ) -> Vec<Delivery> {
        info!(community_id, participant = origin.participant, poll_id = %poll_id, "poll creation received");

        let definition = match PollDefinition::parse(&poll_data) {
            Ok(definition) => definition,
            Err(err) => return malformed(community_id, origin, &PayloadError::InvalidPollData(err)),
        };
        polls.create_or_replace(&poll_id, community_id, definition);
        counter!(POLLS_CREATED).increment(1);
        info!(community_id, poll_id = %poll_id, "poll stored");

        fan_out(
            self.fanout.poll_updates,
            community_id,
            ServerEvent::PollUpdate(PollUpdate {
                poll_id,
                poll_data,
                is_sent: None,
            }),
        )
    }

    /// Handle a `share_document` event
    pub fn share_document(
        &self,
        origin: Origin<'_>,
        community_id: &str,
        document_name: String,
        document_data: Value,
    ) -> Vec<Delivery> {
        info!(
            community_id,
            participant = origin.participant,
            document = %truncate(&document_name),
            "document shared"
        );
        fan_out(
            self.fanout.documents,
            community_id,
            ServerEvent::DocumentShared(DocumentShared {
                document_name,
                document_data,
                is_sent: None,
            }),
        )
    }
}

fn malformed(community_id: &str, origin: Origin<'_>, err: &PayloadError) -> Vec<Delivery> {
    counter!(PAYLOAD_MALFORMED).increment(1);
    warn!(community_id, participant = origin.participant, "dropping event: {err}");
    Vec::new()
}

/// Peer-flagged copy to everyone else, self-flagged copy back to the sender
fn split(community_id: &str, event: ServerEvent) -> Vec<Delivery> {
    vec![
        Delivery::new(Audience::Peers(community_id.to_string()), event.clone().flagged(false)),
        Delivery::new(Audience::Origin, event.flagged(true)),
    ]
}

fn fan_out(fanout: Fanout, community_id: &str, event: ServerEvent) -> Vec<Delivery> {
    match fanout {
        Fanout::Room => vec![Delivery::new(Audience::Community(community_id.to_string()), event)],
        Fanout::Split => split(community_id, event),
    }
}

/// Log-safe preview of a message's `content`
pub fn content_preview(message: &Map<String, Value>) -> String {
    match message.get("content") {
        None | Some(Value::Null) => "No content".to_string(),
        Some(Value::String(content)) => format!("{}...", truncate(content)),
        Some(other) => format!("{}...", truncate(&other.to_string())),
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
