use std::net::SocketAddr;
use std::time::Duration;

use qc_transport::{ConversationTable, DatagramIo};
use qc_wire::{Packet, PacketType};
use tokio::time::sleep;
use tracing::info;

/// Client-side conversation-id acquisition and SYN probe (spec.md §4.3),
/// grounded on `original_source/udp/client.go`'s `client_connect`: send
/// PING_REQ once a second until the server assigns a conversation id, then
/// send SYN once a second until a conversation entry exists.
pub async fn connect(socket: &DatagramIo, table: &ConversationTable, peer: SocketAddr) {
    let ping = Packet::control(0, PacketType::PingReq, 0, 0);
    while !table.has_self_conv_id() {
        let _ = socket.send_to(peer, &ping).await;
        sleep(Duration::from_secs(1)).await;
    }
    info!(conv_id = table.self_conv_id(), "obtained conversation id from server");

    let syn = Packet::control(table.self_conv_id(), PacketType::Syn, 0, 0);
    while table.len().await == 0 {
        let _ = socket.send_to(peer, &syn).await;
        sleep(Duration::from_secs(1)).await;
    }
    info!("server acknowledged SYN, conversation established");
}
