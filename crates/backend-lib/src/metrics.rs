// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";
pub const MESSAGES_RELAYED: &str = "relay.messages";
pub const EVENTS_DELIVERED: &str = "relay.events_delivered";
pub const EVENTS_DROPPED: &str = "relay.events_dropped";
pub const POLLS_CREATED: &str = "poll.created";
pub const VOTES_ACCEPTED: &str = "vote.accepted";
pub const VOTES_REJECTED: &str = "vote.rejected";
pub const PAYLOAD_MALFORMED: &str = "payload.malformed";
