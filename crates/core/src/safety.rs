//! Stop-flag safety gate and vote quorum bookkeeping (C9).
//!
//! A generalization of the teacher's single-decision HITL approval queue
//! (`hitl/queue.rs`) into multi-agent ballots: any mutation can be gated
//! behind a named vote that passes once `quorum` ballots are cast and the
//! yes share clears `threshold`. The stop flag is a harder gate still —
//! while set, every mutating request is rejected regardless of votes,
//! except `resume` itself. The audit trail the teacher kept as a separate
//! `HitlAudit` list is folded into the project's event log instead: every
//! vote open/cast/close is itself an event.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use swarm_common::{CoreError, CoreResult, StopFlag, Vote, VoteChoice, VoteId};

const DEFAULT_QUORUM: u32 = 1;
const DEFAULT_THRESHOLD: f32 = 0.5;
const DEFAULT_VOTE_MS: u64 = 5 * 60_000;

#[derive(Default)]
pub struct SafetyGate {
    stop_flag: StopFlag,
    votes: HashMap<VoteId, Vote>,
}

impl SafetyGate {
    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop_flag
    }

    pub fn stop(&mut self, reason: String, by: String) -> StopFlag {
        self.stop_flag = StopFlag {
            stopped: true,
            reason: Some(reason),
            by: Some(by),
            ts: Utc::now(),
        };
        self.stop_flag.clone()
    }

    pub fn resume(&mut self, by: String) -> StopFlag {
        self.stop_flag = StopFlag {
            stopped: false,
            reason: None,
            by: Some(by),
            ts: Utc::now(),
        };
        self.stop_flag.clone()
    }

    /// Mutations must call this first; reads, heartbeats, and `resume`
    /// itself bypass it.
    pub fn check_mutation_allowed(&self) -> CoreResult<()> {
        if self.stop_flag.stopped {
            return Err(CoreError::Stopped);
        }
        Ok(())
    }

    pub fn open_vote(
        &mut self,
        kind: String,
        subject: String,
        opened_by: String,
        quorum: Option<u32>,
        threshold: Option<f32>,
        duration_ms: Option<u64>,
    ) -> Vote {
        let id = VoteId::new();
        let now = Utc::now();
        let vote = Vote {
            id,
            subject,
            kind,
            opened_by,
            opened_at: now,
            closes_at: now + Duration::milliseconds(duration_ms.unwrap_or(DEFAULT_VOTE_MS) as i64),
            ballots: HashMap::new(),
            quorum: quorum.unwrap_or(DEFAULT_QUORUM),
            threshold: threshold.unwrap_or(DEFAULT_THRESHOLD),
        };
        self.votes.insert(id, vote.clone());
        vote
    }

    pub fn cast(&mut self, vote_id: VoteId, agent: String, choice: VoteChoice) -> CoreResult<Vote> {
        let vote = self
            .votes
            .get_mut(&vote_id)
            .ok_or_else(|| CoreError::not_found("vote", vote_id.to_string()))?;
        if Utc::now() >= vote.closes_at {
            return Err(CoreError::Precondition(format!(
                "vote {vote_id} has already closed"
            )));
        }
        vote.ballots
            .insert(agent, swarm_common::Ballot { choice, ts: Utc::now() });
        Ok(vote.clone())
    }

    pub fn get(&self, vote_id: VoteId) -> CoreResult<&Vote> {
        self.votes
            .get(&vote_id)
            .ok_or_else(|| CoreError::not_found("vote", vote_id.to_string()))
    }

    pub fn due_votes(&self) -> Vec<VoteId> {
        let now = Utc::now();
        self.votes
            .iter()
            .filter(|(_, v)| v.closes_at <= now)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn close(&mut self, vote_id: VoteId) -> Option<Vote> {
        self.votes.remove(&vote_id)
    }

    pub fn list(&self) -> Vec<Vote> {
        self.votes.values().cloned().collect()
    }

    pub fn restore(&mut self, stop_flag: StopFlag, votes: Vec<Vote>) {
        self.stop_flag = stop_flag;
        for vote in votes {
            self.votes.insert(vote.id, vote);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_blocks_mutations_resume_clears_it() {
        let mut gate = SafetyGate::default();
        assert!(gate.check_mutation_allowed().is_ok());
        gate.stop("pause for review".to_string(), "ada".to_string());
        assert!(matches!(gate.check_mutation_allowed(), Err(CoreError::Stopped)));
        gate.resume("ada".to_string());
        assert!(gate.check_mutation_allowed().is_ok());
    }

    #[test]
    fn vote_passes_once_quorum_and_threshold_are_met() {
        let mut gate = SafetyGate::default();
        let vote = gate.open_vote(
            "merge".to_string(),
            "pr-1".to_string(),
            "ada".to_string(),
            Some(2),
            Some(0.5),
            None,
        );
        gate.cast(vote.id, "ada".to_string(), VoteChoice::Yes).unwrap();
        let still_short = gate.get(vote.id).unwrap();
        assert!(!still_short.has_passed());

        let passed = gate.cast(vote.id, "grace".to_string(), VoteChoice::Yes).unwrap();
        assert!(passed.has_passed());
    }

    #[test]
    fn vote_fails_below_threshold_even_at_quorum() {
        let mut gate = SafetyGate::default();
        let vote = gate.open_vote("merge".to_string(), "pr-1".to_string(), "ada".to_string(), Some(2), Some(0.75), None);
        gate.cast(vote.id, "ada".to_string(), VoteChoice::Yes).unwrap();
        let result = gate.cast(vote.id, "grace".to_string(), VoteChoice::No).unwrap();
        assert!(!result.has_passed());
    }

    #[test]
    fn casting_on_a_closed_vote_fails() {
        let mut gate = SafetyGate::default();
        let vote = gate.open_vote("merge".to_string(), "pr-1".to_string(), "ada".to_string(), None, None, Some(0));
        let err = gate.cast(vote.id, "ada".to_string(), VoteChoice::Yes).unwrap_err();
        assert!(matches!(err, CoreError::Precondition(_)));
    }
}
