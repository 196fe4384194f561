use std::sync::Arc;

use async_trait::async_trait;
use qc_wire::AppMessage;

use crate::conversation::Conversation;

/// Application-level sink for fully-received DATA packets. Implemented by
/// the referendum manager (`qc-referendum`). `qc-transport` depends only on
/// this trait, never on the referendum manager's concrete type — this is
/// how the conversation↔referendum ownership cycle noted in spec.md §9 is
/// broken: the referendum manager reaches back into conversations through
/// a non-owning `Arc<ConversationTable>` handle, never the other way
/// around.
#[async_trait]
pub trait ApplicationDispatcher: Send + Sync {
    async fn dispatch(&self, conv: Arc<Conversation>, msg: AppMessage);
}

/// A dispatcher that drops everything. Useful for transport-only tests that
/// never exercise application-level behavior.
pub struct NullDispatcher;

#[async_trait]
impl ApplicationDispatcher for NullDispatcher {
    async fn dispatch(&self, _conv: Arc<Conversation>, _msg: AppMessage) {}
}
