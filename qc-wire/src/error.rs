use thiserror::Error;

/// Wire-format errors. Per spec these never propagate past the listener:
/// callers log and drop the datagram.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("packet too short: {0} bytes")]
    ShortPacket(usize),

    #[error("bad magic: {0:#010x}")]
    BadMagic(u32),

    #[error("checksum mismatch: got {got:#010x}, want {want:#010x}")]
    BadChecksum { got: u32, want: u32 },

    #[error("unknown packet type: {0}")]
    UnknownType(u16),

    #[error("unknown data id: {0}")]
    UnknownDataId(u16),

    #[error("truncated body")]
    Truncated,
}
