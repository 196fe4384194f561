//! Binary serialization for the quorumcast wire protocol: packet headers,
//! CRC32-IEEE checksums, and the application message bodies carried in DATA
//! packets. All integers are big-endian.

mod app;
mod error;
mod packet;

pub use app::{
    decode_app_message, deserialize_hello, deserialize_vote_question, deserialize_vote_response,
    encode_app_message, serialize_hello, serialize_vote_question, serialize_vote_response,
    AppMessage, DataId, VoteAnswer,
};
pub use error::WireError;
pub use packet::{
    compute_checksum, deserialize_packet, serialize_packet, verify_packet, Packet, PacketType,
    HEADER_LEN, MAGIC, MAX_PCKT_SIZE,
};
