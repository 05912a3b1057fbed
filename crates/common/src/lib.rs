// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between community clients and the relay server.
//! This module defines the WebSocket protocol events and supporting types.
//!
//! Every frame on the wire is a JSON object of the form
//! `{"event": "<name>", "data": { ... }}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Identifier of a community (a named broadcast group)
pub type CommunityId = String;

/// Opaque identifier a client supplies for itself at connection time
pub type ParticipantId = String;

/// Key under which the poll store tracks a poll
pub type PollKey = String;

/// Message `type` tag for polls embedded in a chat message
pub const POLL_MESSAGE: &str = "poll";

/// Message `type` tag for vote casts
pub const CAST_VOTE_MESSAGE: &str = "cast_vote";

/// Field added to relayed messages to mark the sender's own echo
pub const IS_SENT_FIELD: &str = "isSent";

/// A client-chosen identifier that may arrive as a JSON string or number.
///
/// The original JSON form is kept so that echoes carry the id exactly as the
/// client sent it; [`OpaqueId::key`] gives the textual form used for lookups.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum OpaqueId {
    Text(String),
    Number(serde_json::Number),
}

impl OpaqueId {
    /// Textual form, so that `7` and `"7"` address the same poll
    pub fn key(&self) -> PollKey {
        self.to_string()
    }
}

impl fmt::Display for OpaqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpaqueId::Text(text) => f.write_str(text),
            OpaqueId::Number(number) => write!(f, "{number}"),
        }
    }
}

impl From<&str> for OpaqueId {
    fn from(value: &str) -> Self {
        OpaqueId::Text(value.to_string())
    }
}

/// Events sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Join a community and start receiving its broadcasts
    #[serde(rename = "joinCommunity")]
    JoinCommunity { community_id: CommunityId },
    /// Leave a community
    #[serde(rename = "leaveCommunity")]
    LeaveCommunity { community_id: CommunityId },
    /// Send a chat message into a community
    /// # Fields
    /// * `community_id` - Target community
    /// * `message` - Free-form message object; its `type` field selects
    ///   between plain content, an embedded poll and a vote cast
    #[serde(rename = "sendMessage")]
    SendMessage {
        community_id: CommunityId,
        message: Map<String, Value>,
    },
    /// Create (or recreate) a poll
    /// # Fields
    /// * `community_id` - Owning community
    /// * `poll_id` - Client-chosen poll id
    /// * `poll_data` - JSON string encoding a [`PollDefinition`]
    #[serde(rename = "create_poll")]
    CreatePoll {
        community_id: CommunityId,
        poll_id: OpaqueId,
        poll_data: String,
    },
    /// Share a document with a community
    #[serde(rename = "share_document")]
    ShareDocument {
        community_id: CommunityId,
        document_name: String,
        #[serde(default)]
        document_data: Value,
    },
}

/// Events sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Another participant joined one of our communities
    #[serde(rename = "userJoined")]
    UserJoined(PresenceNotice),
    /// Another participant left one of our communities
    #[serde(rename = "userLeft")]
    UserLeft(PresenceNotice),
    /// Relayed chat message, carrying an `isSent` flag
    #[serde(rename = "newMessage")]
    NewMessage(Map<String, Value>),
    /// Fresh tally after an accepted vote
    #[serde(rename = "vote_update")]
    VoteUpdate(VoteUpdate),
    /// Echo of an explicit poll creation
    #[serde(rename = "poll_update")]
    PollUpdate(PollUpdate),
    /// A document shared with the community
    #[serde(rename = "document_shared")]
    DocumentShared(DocumentShared),
}

impl ServerEvent {
    /// Mark this event as the sender's own echo (`true`) or as a peer's
    /// message (`false`). Presence notices carry no flag.
    #[must_use]
    pub fn flagged(self, is_sent: bool) -> Self {
        match self {
            ServerEvent::NewMessage(mut message) => {
                message.insert(IS_SENT_FIELD.to_string(), Value::Bool(is_sent));
                ServerEvent::NewMessage(message)
            },
            ServerEvent::VoteUpdate(mut update) => {
                update.is_sent = Some(is_sent);
                ServerEvent::VoteUpdate(update)
            },
            ServerEvent::PollUpdate(mut update) => {
                update.is_sent = Some(is_sent);
                ServerEvent::PollUpdate(update)
            },
            ServerEvent::DocumentShared(mut shared) => {
                shared.is_sent = Some(is_sent);
                ServerEvent::DocumentShared(shared)
            },
            presence => presence,
        }
    }

    /// The `isSent` flag, if this event carries one
    pub fn is_sent(&self) -> Option<bool> {
        match self {
            ServerEvent::NewMessage(message) => message.get(IS_SENT_FIELD).and_then(Value::as_bool),
            ServerEvent::VoteUpdate(update) => update.is_sent,
            ServerEvent::PollUpdate(update) => update.is_sent,
            ServerEvent::DocumentShared(shared) => shared.is_sent,
            ServerEvent::UserJoined(_) | ServerEvent::UserLeft(_) => None,
        }
    }
}

/// Payload of `userJoined` / `userLeft`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceNotice {
    pub user_id: ParticipantId,
}

/// Derived tally broadcast after every accepted vote
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteUpdate {
    /// Always `"vote_update"`
    #[serde(rename = "type")]
    pub kind: String,
    pub poll_id: OpaqueId,
    /// Vote count per option
    pub votes: Vec<u64>,
    /// Rounded share of the total per option, 0 when nobody voted
    pub percentages: Vec<u64>,
    /// Number of distinct voters so far
    pub total_voters: usize,
    /// Participant whose vote produced this update
    pub voter_id: ParticipantId,
    /// Option index that participant chose
    pub option: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_sent: Option<bool>,
}

/// Payload of `poll_update`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PollUpdate {
    pub poll_id: OpaqueId,
    pub poll_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_sent: Option<bool>,
}

/// Payload of `document_shared`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentShared {
    pub document_name: String,
    pub document_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_sent: Option<bool>,
}

/// Question and option labels of a poll
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PollDefinition {
    pub question: String,
    pub options: Vec<String>,
}

impl PollDefinition {
    /// Parse the JSON string carried in poll messages and creation events
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Vote cast carried inside a `cast_vote` message
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteCast {
    pub poll_id: OpaqueId,
    pub option: VoteChoice,
    #[serde(default)]
    pub voter_id: Option<ParticipantId>,
}

/// Option picked by a vote cast.
///
/// Anything other than a non-negative integer is kept as `Invalid`, so the
/// vote is still recognised as a vote and can be rejected like any other
/// choice outside the poll's options.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum VoteChoice {
    Index(usize),
    Invalid(Value),
}

impl VoteChoice {
    pub fn index(&self) -> Option<usize> {
        match self {
            VoteChoice::Index(index) => Some(*index),
            VoteChoice::Invalid(_) => None,
        }
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteChoice::Index(index) => write!(f, "{index}"),
            VoteChoice::Invalid(value) => write!(f, "{value}"),
        }
    }
}

/// What a `sendMessage` payload asks the server to do
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    /// Poll embedded in a chat message
    Poll {
        poll_id: OpaqueId,
        definition: PollDefinition,
    },
    /// Vote on an existing poll
    CastVote(VoteCast),
    /// Text, image, document or anything else; relayed untouched
    Generic,
}

impl MessageKind {
    /// Classify a raw message object by its `type` tag
    pub fn classify(message: &Map<String, Value>) -> Result<Self, PayloadError> {
        match message.get("type").and_then(Value::as_str) {
            Some(POLL_MESSAGE) => {
                let poll_id = message
                    .get("id")
                    .cloned()
                    .map(serde_json::from_value::<OpaqueId>)
                    .transpose()
                    .map_err(PayloadError::InvalidPollContent)?
                    .ok_or(PayloadError::MissingPollId)?;
                let content = message
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or(PayloadError::MissingPollContent)?;
                let definition =
                    PollDefinition::parse(content).map_err(PayloadError::InvalidPollContent)?;
                Ok(MessageKind::Poll { poll_id, definition })
            },
            Some(CAST_VOTE_MESSAGE) => serde_json::from_value(Value::Object(message.clone()))
                .map(MessageKind::CastVote)
                .map_err(PayloadError::InvalidVote),
            _ => Ok(MessageKind::Generic),
        }
    }
}

/// Structured data inside an event that could not be understood
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("poll message has no id")]
    MissingPollId,

    #[error("poll message has no string content")]
    MissingPollContent,

    #[error("invalid poll content: {0}")]
    InvalidPollContent(#[source] serde_json::Error),

    #[error("invalid vote: {0}")]
    InvalidVote(#[source] serde_json::Error),

    #[error("invalid poll data: {0}")]
    InvalidPollData(#[source] serde_json::Error),
}
