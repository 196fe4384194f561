use std::net::SocketAddr;
use std::sync::Arc;

use qc_wire::{Packet, PacketType};
use tracing::{debug, trace, warn};

use crate::dispatcher::ApplicationDispatcher;
use crate::socket::DatagramIo;
use crate::table::ConversationTable;

/// Drives the receive loop for one `DatagramIo` socket: deserializes every
/// inbound datagram, special-cases the PING_REQ/PING_RES handshake used to
/// assign conversation ids (spec.md §4.3), and otherwise routes the packet
/// to its conversation, creating one on first contact.
///
/// Runs until the socket errors. Intended to be spawned as its own task by
/// the node binary; never returns `Ok`.
pub async fn run(
    socket: Arc<DatagramIo>,
    table: Arc<ConversationTable>,
    dispatcher: Arc<dyn ApplicationDispatcher>,
    is_server: bool,
) -> std::io::Result<()> {
    loop {
        let (bytes, addr) = socket.recv().await?;
        let socket = Arc::clone(&socket);
        let table = Arc::clone(&table);
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            handle_datagram(&socket, &table, dispatcher, &bytes, addr, is_server).await;
        });
    }
}

async fn handle_datagram(
    socket: &Arc<DatagramIo>,
    table: &Arc<ConversationTable>,
    dispatcher: Arc<dyn ApplicationDispatcher>,
    bytes: &[u8],
    addr: SocketAddr,
    is_server: bool,
) {
    let pkt = match qc_wire::deserialize_packet(bytes) {
        Ok(pkt) => pkt,
        Err(e) => {
            debug!(%addr, error = %e, "dropping malformed datagram");
            return;
        }
    };

    if pkt.typ == PacketType::PingReq {
        if is_server {
            let id = table.issue_conversation_id().await;
            let reply = Packet::control(id, PacketType::PingRes, 0, 0);
            if let Err(e) = socket.send_to(addr, &reply).await {
                warn!(%addr, error = %e, "failed to answer PING_REQ");
            }
        }
        return;
    }

    if pkt.typ == PacketType::PingRes {
        // Dropped after recording: a reply to our own PING_REQ must never
        // be routed into a conversation, or we'd start one with ourselves.
        table.set_self_conv_id(pkt.conv_id);
        return;
    }

    if !table.has_self_conv_id() {
        trace!(%addr, "dropping packet: no self conversation id assigned yet");
        return;
    }

    let conv = table.get_or_create(pkt.conv_id, addr, Arc::clone(socket), dispatcher).await;
    conv.arq_receive(pkt).await;
}
