use thiserror::Error;

use crate::ids::VoteId;

/// Protocol-level referendum violations (spec.md §7): always logged and
/// ignored, never propagated to a caller that could act on them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferendumError {
    #[error("duplicate vote_id {0}")]
    DuplicateVoteId(VoteId),

    #[error("response for unknown referendum {0}")]
    UnknownReferendum(VoteId),

    #[error("referendum {0} already decided")]
    NotOngoing(VoteId),

    #[error("responder {responder} is not a participant in referendum {vote_id}")]
    NotAParticipant { vote_id: VoteId, responder: u32 },

    #[error("responder {responder} already voted in referendum {vote_id}")]
    DoubleVote { vote_id: VoteId, responder: u32 },
}
