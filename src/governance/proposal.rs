//! Proposal data model
//!
//! A proposal is a frozen intent: the operation batch, voting window, and
//! voting power snapshot are immutable after creation. Only the tallies and
//! the three terminal flags ever change, and each flag is set at most once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::traits::{MemberId, ProposalId, SpaceId, Timestamp};

/// One state-changing operation of a proposal's batch.
///
/// The payload is opaque to the engine; decoding it into a display intent is
/// an analytics concern that lives outside the governance core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub target: String,
    pub value: u64,
    #[serde(with = "payload_hex")]
    pub payload: Vec<u8>,
}

mod payload_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A single recorded vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// true = yes, false = no
    pub support: bool,
    /// The voter's power at the proposal's snapshot time
    pub power: u64,
}

/// Terminal/non-terminal condition of a proposal. Exactly one applies at
/// any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalState {
    /// Still open: not executed, not expired, not withdrawn
    Pending,
    /// Operation batch ran successfully
    Executed,
    /// Failed by threshold or by time (also set on administrator veto)
    Expired,
    /// Retracted via the withdrawal path
    Withdrawn,
}

/// Mutable proposal record, owned exclusively by the proposal store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub space_id: SpaceId,
    pub creator: MemberId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// Total eligible voting power captured at creation. Never recomputed,
    /// even if membership changes later.
    pub total_voting_power_at_snapshot: u64,
    pub yes_votes: u64,
    pub no_votes: u64,
    pub operations: Vec<Operation>,
    pub executed: bool,
    pub expired: bool,
    pub withdrawn: bool,
    /// true when the withdrawal was an administrator veto rather than a
    /// creator self-withdrawal (the veto additionally sets `expired`)
    pub withdrawn_by_admin: bool,
    /// One ballot per distinct voter; re-voting is rejected, not overwritten
    pub ballots: BTreeMap<MemberId, Ballot>,
}

impl Proposal {
    pub fn is_terminal(&self) -> bool {
        self.executed || self.expired || self.withdrawn
    }

    pub fn state(&self) -> ProposalState {
        if self.executed {
            ProposalState::Executed
        } else if self.withdrawn {
            ProposalState::Withdrawn
        } else if self.expired {
            ProposalState::Expired
        } else {
            ProposalState::Pending
        }
    }

    pub fn votes_cast(&self) -> u64 {
        self.yes_votes + self.no_votes
    }

    pub fn has_voted(&self, voter: &MemberId) -> bool {
        self.ballots.contains_key(voter)
    }

    /// Yes-voter and no-voter identity lists.
    pub fn voters(&self) -> (Vec<MemberId>, Vec<MemberId>) {
        let mut yes = Vec::new();
        let mut no = Vec::new();
        for (member, ballot) in &self.ballots {
            if ballot.support {
                yes.push(member.clone());
            } else {
                no.push(member.clone());
            }
        }
        (yes, no)
    }

    pub fn view(&self) -> ProposalView {
        ProposalView {
            id: self.id,
            space_id: self.space_id,
            creator: self.creator.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            total_voting_power_at_snapshot: self.total_voting_power_at_snapshot,
            yes_votes: self.yes_votes,
            no_votes: self.no_votes,
            operations: self.operations.clone(),
            executed: self.executed,
            expired: self.expired,
            withdrawn: self.withdrawn,
            withdrawn_by_admin: self.withdrawn_by_admin,
            state: self.state(),
        }
    }
}

/// Creation-time fields; the store assigns the id and initializes tallies
/// and flags.
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub space_id: SpaceId,
    pub creator: MemberId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub total_voting_power_at_snapshot: u64,
    pub operations: Vec<Operation>,
}

/// Read-only projection returned by the inbound API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalView {
    pub id: ProposalId,
    pub space_id: SpaceId,
    pub creator: MemberId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub total_voting_power_at_snapshot: u64,
    pub yes_votes: u64,
    pub no_votes: u64,
    pub operations: Vec<Operation>,
    pub executed: bool,
    pub expired: bool,
    pub withdrawn: bool,
    pub withdrawn_by_admin: bool,
    pub state: ProposalState,
}
