// ============================
// relay-backend-lib/src/polls.rs
// ============================
//! Poll store.
//!
//! Owns every poll definition together with its vote counts and voter set.
//! Nothing else mutates a tally: votes go through [`PollStore::cast_vote`],
//! which enforces one vote per participant per poll.
use std::collections::{BTreeMap, HashMap, HashSet};

use relay_common::{CommunityId, OpaqueId, ParticipantId, PollDefinition, PollKey, VoteUpdate};
use serde::Serialize;
use thiserror::Error;

use crate::tally;

/// Why a vote was not counted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoteRejected {
    #[error("poll {0} does not exist")]
    UnknownPoll(PollKey),

    #[error("{voter} has already voted in poll {poll}")]
    AlreadyVoted { poll: PollKey, voter: ParticipantId },

    #[error("option {option} is out of range for poll {poll} ({options} options)")]
    OptionOutOfRange {
        poll: PollKey,
        option: usize,
        options: usize,
    },

    #[error("option {option} is not an option index (poll {poll})")]
    InvalidOption { poll: PollKey, option: String },
}

/// A live poll. `votes` always has one entry per option.
#[derive(Debug, Clone)]
pub struct Poll {
    question: String,
    options: Vec<String>,
    votes: Vec<u64>,
    voters: HashSet<ParticipantId>,
    community_id: CommunityId,
}

impl Poll {
    fn new(community_id: CommunityId, definition: PollDefinition) -> Self {
        Self {
            votes: vec![0; definition.options.len()],
            question: definition.question,
            options: definition.options,
            voters: HashSet::new(),
            community_id,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn votes(&self) -> &[u64] {
        &self.votes
    }

    pub fn community_id(&self) -> &str {
        &self.community_id
    }

    pub fn total_voters(&self) -> usize {
        self.voters.len()
    }

    pub fn has_voted(&self, participant: &str) -> bool {
        self.voters.contains(participant)
    }

    fn snapshot(&self) -> PollSnapshot {
        let mut voters: Vec<ParticipantId> = self.voters.iter().cloned().collect();
        voters.sort();
        PollSnapshot {
            question: self.question.clone(),
            options: self.options.clone(),
            votes: self.votes.clone(),
            voters,
            community_id: self.community_id.clone(),
        }
    }
}

/// Read-only view of a poll for the debug endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSnapshot {
    pub question: String,
    pub options: Vec<String>,
    pub votes: Vec<u64>,
    pub voters: Vec<ParticipantId>,
    pub community_id: CommunityId,
}

/// All polls known to this process, keyed by poll id
#[derive(Debug, Default)]
pub struct PollStore {
    polls: HashMap<PollKey, Poll>,
}

impl PollStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the poll, discarding any existing poll with the same id
    /// together with its votes and voters.
    pub fn create_or_replace(
        &mut self,
        poll_id: &OpaqueId,
        community_id: &str,
        definition: PollDefinition,
    ) {
        self.polls
            .insert(poll_id.key(), Poll::new(community_id.to_string(), definition));
    }

    /// Create the poll only if the id is new. Returns whether it was created;
    /// an existing poll keeps its definition and tally.
    pub fn ensure_exists(
        &mut self,
        poll_id: &OpaqueId,
        community_id: &str,
        definition: PollDefinition,
    ) -> bool {
        let key = poll_id.key();
        if self.polls.contains_key(&key) {
            return false;
        }
        self.polls.insert(key, Poll::new(community_id.to_string(), definition));
        true
    }

    /// Record one vote and return the fresh tally.
    ///
    /// A rejected vote leaves the poll untouched.
    pub fn cast_vote(
        &mut self,
        poll_id: &OpaqueId,
        voter: &str,
        option: usize,
    ) -> Result<VoteUpdate, VoteRejected> {
        let key = poll_id.key();
        let poll = self
            .polls
            .get_mut(&key)
            .ok_or_else(|| VoteRejected::UnknownPoll(key.clone()))?;

        if poll.voters.contains(voter) {
            return Err(VoteRejected::AlreadyVoted {
                poll: key,
                voter: voter.to_string(),
            });
        }
        if option >= poll.votes.len() {
            return Err(VoteRejected::OptionOutOfRange {
                poll: key,
                option,
                options: poll.votes.len(),
            });
        }

        poll.voters.insert(voter.to_string());
        poll.votes[option] += 1;

        Ok(VoteUpdate {
            kind: "vote_update".to_string(),
            poll_id: poll_id.clone(),
            votes: poll.votes.clone(),
            percentages: tally::percentages(&poll.votes),
            total_voters: poll.voters.len(),
            voter_id: voter.to_string(),
            option,
            is_sent: None,
        })
    }

    pub fn get(&self, poll_id: &str) -> Option<&Poll> {
        self.polls.get(poll_id)
    }

    pub fn len(&self) -> usize {
        self.polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }

    /// Snapshot of every poll, ordered by id
    pub fn snapshot(&self) -> BTreeMap<PollKey, PollSnapshot> {
        self.polls
            .iter()
            .map(|(id, poll)| (id.clone(), poll.snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(options: &[&str]) -> PollDefinition {
        PollDefinition {
            question: "Where to?".to_string(),
            options: options.iter().map(|o| (*o).to_string()).collect(),
        }
    }

    fn p1() -> OpaqueId {
        OpaqueId::from("p1")
    }

    #[test]
    fn test_create_initializes_tally() {
        let mut store = PollStore::new();
        store.create_or_replace(&p1(), "c1", definition(&["A", "B", "C"]));

        let poll = store.get("p1").unwrap();
        assert_eq!(poll.votes(), &[0, 0, 0]);
        assert_eq!(poll.options().len(), poll.votes().len());
        assert_eq!(poll.total_voters(), 0);
        assert_eq!(poll.community_id(), "c1");
        assert_eq!(poll.question(), "Where to?");
    }

    #[test]
    fn test_cast_vote_returns_tally() {
        let mut store = PollStore::new();
        store.create_or_replace(&p1(), "c1", definition(&["A", "B"]));

        let update = store.cast_vote(&p1(), "x", 0).unwrap();
        assert_eq!(update.kind, "vote_update");
        assert_eq!(update.votes, vec![1, 0]);
        assert_eq!(update.percentages, vec![100, 0]);
        assert_eq!(update.total_voters, 1);
        assert_eq!(update.voter_id, "x");
        assert_eq!(update.option, 0);

        let update = store.cast_vote(&p1(), "y", 1).unwrap();
        assert_eq!(update.votes, vec![1, 1]);
        assert_eq!(update.percentages, vec![50, 50]);
        assert_eq!(update.total_voters, 2);
    }

    #[test]
    fn test_rejected_votes_change_nothing() {
        let mut store = PollStore::new();
        store.create_or_replace(&p1(), "c1", definition(&["A", "B"]));
        store.cast_vote(&p1(), "x", 0).unwrap();

        assert_eq!(
            store.cast_vote(&p1(), "x", 1),
            Err(VoteRejected::AlreadyVoted {
                poll: "p1".to_string(),
                voter: "x".to_string()
            })
        );
        assert!(matches!(
            store.cast_vote(&p1(), "y", 2),
            Err(VoteRejected::OptionOutOfRange { option: 2, options: 2, .. })
        ));
        assert_eq!(
            store.cast_vote(&OpaqueId::from("missing"), "y", 0),
            Err(VoteRejected::UnknownPoll("missing".to_string()))
        );

        let poll = store.get("p1").unwrap();
        assert_eq!(poll.votes(), &[1, 0]);
        assert_eq!(poll.total_voters(), 1);
        assert!(!poll.has_voted("y"));
    }

    #[test]
    fn test_ensure_exists_is_first_writer_wins() {
        let mut store = PollStore::new();
        assert!(store.ensure_exists(&p1(), "c1", definition(&["A", "B"])));
        store.cast_vote(&p1(), "x", 1).unwrap();

        assert!(!store.ensure_exists(&p1(), "c2", definition(&["Other"])));
        let poll = store.get("p1").unwrap();
        assert_eq!(poll.votes(), &[0, 1]);
        assert_eq!(poll.options(), &["A".to_string(), "B".to_string()]);
        assert_eq!(poll.community_id(), "c1");
    }

    #[test]
    fn test_create_or_replace_resets() {
        let mut store = PollStore::new();
        store.create_or_replace(&p1(), "c1", definition(&["A", "B"]));
        store.cast_vote(&p1(), "x", 1).unwrap();

        store.create_or_replace(&p1(), "c1", definition(&["A", "B", "C"]));
        let poll = store.get("p1").unwrap();
        assert_eq!(poll.votes(), &[0, 0, 0]);
        assert!(!poll.has_voted("x"));

        // x may vote again on the recreated poll
        assert!(store.cast_vote(&p1(), "x", 2).is_ok());
    }

    #[test]
    fn test_numeric_and_text_ids_share_a_poll() {
        let mut store = PollStore::new();
        let numeric: OpaqueId = serde_json::from_value(serde_json::json!(17)).unwrap();
        store.create_or_replace(&numeric, "c1", definition(&["A"]));

        let update = store.cast_vote(&OpaqueId::from("17"), "x", 0).unwrap();
        assert_eq!(update.poll_id, OpaqueId::from("17"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_votes_match_voters_under_repeated_casts() {
        let mut store = PollStore::new();
        store.create_or_replace(&p1(), "c1", definition(&["A", "B", "C"]));

        let voters = ["a", "b", "c", "d", "e"];
        for round in 0..4 {
            for (i, voter) in voters.iter().enumerate() {
                let _ = store.cast_vote(&p1(), voter, (i + round) % 4);
                let poll = store.get("p1").unwrap();
                assert_eq!(tally::total_votes(poll.votes()), poll.total_voters() as u64);
            }
        }

        let poll = store.get("p1").unwrap();
        assert!(poll.total_voters() <= voters.len());
    }

    #[test]
    fn test_snapshot_sorts_voters() {
        let mut store = PollStore::new();
        store.create_or_replace(&p1(), "c1", definition(&["A", "B"]));
        store.cast_vote(&p1(), "zed", 0).unwrap();
        store.cast_vote(&p1(), "amy", 1).unwrap();

        let snapshot = store.snapshot();
        let poll = &snapshot["p1"];
        assert_eq!(poll.voters, vec!["amy".to_string(), "zed".to_string()]);
        assert_eq!(poll.votes, vec![1, 1]);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["p1"]["communityId"], "c1");
    }
}
