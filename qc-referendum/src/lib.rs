//! Host and client referendum state machines: vote tallying, the early-
//! termination rule, and the boolean-expression evaluator that answers a
//! question locally.

mod error;
mod eval;
mod ids;
mod manager;

pub use error::ReferendumError;
pub use ids::VoteId;
pub use manager::{ClientReferendum, HostReferendum, ReferendumManager};
