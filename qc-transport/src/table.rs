use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::conversation::Conversation;
use crate::dispatcher::ApplicationDispatcher;
use crate::socket::DatagramIo;

/// Generates a non-zero conversation id. `0` is reserved to mean "no id
/// assigned yet" (spec.md §4.3). Does not check for collisions against
/// already-issued ids; see `ConversationTable::issue_conversation_id` for
/// that.
pub fn generate_conversation_id() -> u32 {
    loop {
        let id = rand::random::<u32>();
        if id != 0 {
            return id;
        }
    }
}

/// Process-wide registry of conversations, keyed by `conv_id`, plus this
/// node's own id (spec.md §4.3). `self_conv_id` starts at `0`, meaning
/// "unassigned"; a server assigns its own at startup, a client learns it
/// from the server's PING_RES.
pub struct ConversationTable {
    self_conv_id: AtomicU32,
    conversations: Mutex<HashMap<u32, Arc<Conversation>>>,
    issued_ids: Mutex<HashSet<u32>>,
}

impl ConversationTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            self_conv_id: AtomicU32::new(0),
            conversations: Mutex::new(HashMap::new()),
            issued_ids: Mutex::new(HashSet::new()),
        })
    }

    /// Generates a conversation id to hand to a newly-contacting client,
    /// rerolling until the id is both nonzero and not already issued
    /// (spec.md §4.3: "nonzero and not in the generated-id set, record it").
    pub async fn issue_conversation_id(&self) -> u32 {
        let mut issued = self.issued_ids.lock().await;
        loop {
            let id = generate_conversation_id();
            if issued.insert(id) {
                return id;
            }
        }
    }

    pub fn self_conv_id(&self) -> u32 {
        self.self_conv_id.load(Ordering::SeqCst)
    }

    pub fn has_self_conv_id(&self) -> bool {
        self.self_conv_id() != 0
    }

    /// Sets `self_conv_id` if it hasn't been set already; a no-op otherwise
    /// (spec.md §4.3: "first PING_RES received wins").
    pub fn set_self_conv_id(&self, id: u32) {
        let _ = self.self_conv_id.compare_exchange(0, id, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub async fn get(&self, conv_id: u32) -> Option<Arc<Conversation>> {
        self.conversations.lock().await.get(&conv_id).cloned()
    }

    pub async fn all(&self) -> Vec<Arc<Conversation>> {
        self.conversations.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.conversations.lock().await.len()
    }

    /// Returns the existing conversation for `conv_id`, or creates, spawns,
    /// and registers a new one bound to `peer_addr`.
    pub async fn get_or_create(
        &self,
        conv_id: u32,
        peer_addr: SocketAddr,
        socket: Arc<DatagramIo>,
        dispatcher: Arc<dyn ApplicationDispatcher>,
    ) -> Arc<Conversation> {
        let mut conversations = self.conversations.lock().await;
        if let Some(conv) = conversations.get(&conv_id) {
            return Arc::clone(conv);
        }

        let conv = Conversation::new(conv_id, peer_addr, socket, dispatcher);
        conv.spawn_loop();
        conversations.insert(conv_id, Arc::clone(&conv));
        conv
    }

    pub async fn remove(&self, conv_id: u32) {
        if let Some(conv) = self.conversations.lock().await.remove(&conv_id) {
            conv.close();
        }
    }
}
