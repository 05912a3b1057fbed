// ============================
// relay-backend-lib/src/registry.rs
// ============================
//! Community membership, keyed by participant id rather than connection.
//!
//! Communities are created on first join and never removed; once everybody
//! has left one it simply stays as an empty set.
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use relay_common::{CommunityId, ParticipantId};

#[derive(Debug, Default)]
pub struct MembershipRegistry {
    communities: HashMap<CommunityId, HashSet<ParticipantId>>,
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the participant to the community. Joining twice is a no-op.
    /// Returns whether the participant was newly added.
    pub fn join(&mut self, community_id: &str, participant: &str) -> bool {
        self.communities
            .entry(community_id.to_string())
            .or_default()
            .insert(participant.to_string())
    }

    /// Remove the participant from the community.
    /// Returns whether it was actually a member.
    pub fn leave(&mut self, community_id: &str, participant: &str) -> bool {
        self.communities
            .get_mut(community_id)
            .is_some_and(|members| members.remove(participant))
    }

    /// Remove the participant from every community and return the ids of the
    /// communities it was actually removed from.
    pub fn remove_everywhere(&mut self, participant: &str) -> BTreeSet<CommunityId> {
        self.communities
            .iter_mut()
            .filter_map(|(community_id, members)| {
                members.remove(participant).then(|| community_id.clone())
            })
            .collect()
    }

    /// Current members, sorted. Empty for unknown communities.
    pub fn members_of(&self, community_id: &str) -> Vec<ParticipantId> {
        let mut members: Vec<ParticipantId> = self
            .communities
            .get(community_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    pub fn is_member(&self, community_id: &str, participant: &str) -> bool {
        self.communities
            .get(community_id)
            .is_some_and(|members| members.contains(participant))
    }

    /// Every known community with its sorted members, empty ones included
    pub fn snapshot(&self) -> BTreeMap<CommunityId, Vec<ParticipantId>> {
        self.communities
            .keys()
            .map(|community_id| (community_id.clone(), self.members_of(community_id)))
            .collect()
    }
}
