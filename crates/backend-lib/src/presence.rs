// ============================
// relay-backend-lib/src/presence.rs
// ============================
//! Presence coordination: connect, join, leave and disconnect.
//!
//! Keeps the participant-keyed [`MembershipRegistry`] and the
//! connection-keyed [`Rooms`] in step and tells the rest of a community
//! when somebody arrives or goes.
use relay_common::{ParticipantId, PresenceNotice, ServerEvent};
use tracing::info;

use crate::registry::MembershipRegistry;
use crate::rooms::{Audience, ConnectionId, Delivery, Outbound, Rooms};

/// A new connection becomes addressable but belongs to no community yet
pub fn connect(rooms: &mut Rooms, connection: ConnectionId, participant: ParticipantId, outbound: Outbound) {
    info!(%connection, participant = %participant, "user connected");
    rooms.attach(connection, participant, outbound);
}

/// Join a community and announce the arrival to everyone else in it
pub fn join(
    registry: &mut MembershipRegistry,
    rooms: &mut Rooms,
    connection: ConnectionId,
    participant: &str,
    community_id: &str,
) -> Vec<Delivery> {
    rooms.join(community_id, connection);
    registry.join(community_id, participant);
    info!(community_id, participant, "user joined community");

    vec![Delivery::new(
        Audience::Peers(community_id.to_string()),
        ServerEvent::UserJoined(PresenceNotice {
            user_id: participant.to_string(),
        }),
    )]
}

/// Leave a community. Remaining members hear about it only if the
/// participant was actually a member.
pub fn leave(
    registry: &mut MembershipRegistry,
    rooms: &mut Rooms,
    connection: ConnectionId,
    participant: &str,
    community_id: &str,
) -> Vec<Delivery> {
    rooms.leave(community_id, connection);
    if !registry.leave(community_id, participant) {
        return Vec::new();
    }
    info!(community_id, participant, "user left community");

    vec![Delivery::new(
        Audience::Peers(community_id.to_string()),
        ServerEvent::UserLeft(PresenceNotice {
            user_id: participant.to_string(),
        }),
    )]
}

/// Drop the connection and tell every community the participant was in
pub fn disconnect(registry: &mut MembershipRegistry, rooms: &mut Rooms, connection: ConnectionId) -> Vec<Delivery> {
    let Some(participant) = rooms.detach(connection) else {
        return Vec::new();
    };
    info!(%connection, participant = %participant, "user disconnected");

    registry
        .remove_everywhere(&participant)
        .into_iter()
        .map(|community_id| {
            Delivery::new(
                Audience::Community(community_id),
                ServerEvent::UserLeft(PresenceNotice {
                    user_id: participant.clone(),
                }),
            )
        })
        .collect()
}
