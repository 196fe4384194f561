//! The ARQ transport layer: UDP socket handling, the per-peer selective-
//! repeat conversation state machine, the conversation registry, and the
//! receive loop that ties them together with the PING handshake.

mod conversation;
mod dispatcher;
mod listener;
mod socket;
mod table;

pub use conversation::Conversation;
pub use dispatcher::{ApplicationDispatcher, NullDispatcher};
pub use listener::run as run_listener;
pub use socket::{DatagramIo, SendError};
pub use table::{generate_conversation_id, ConversationTable};
