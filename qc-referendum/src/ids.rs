use std::fmt;

use uuid::Uuid;

/// A referendum identifier. Newtype over `uuid::Uuid`, mirroring the
/// teacher's `ids.rs` pattern of wrapping opaque identifiers rather than
/// passing bare `u128`s around. The wire format carries this as a plain
/// 16-byte big-endian integer (spec.md §3); `from_wire`/`to_wire` are the
/// only places that conversion happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoteId(Uuid);

impl VoteId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_wire(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn to_wire(self) -> u128 {
        self.0.as_u128()
    }
}

impl fmt::Display for VoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
