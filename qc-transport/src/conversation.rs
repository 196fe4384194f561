use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use qc_wire::{AppMessage, Packet, PacketType, VoteAnswer};
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::dispatcher::ApplicationDispatcher;
use crate::socket::DatagramIo;

/// Selective-repeat window size (spec.md §4.4).
const WINDOW_SIZE: u32 = 5;
/// Cooperative-loop tick: spec.md §4.6 gives "roughly 3-10ms".
const LOOP_DELAY: Duration = Duration::from_millis(10);
/// An unacked packet still inside the window is resent after this much
/// silence, independent of the NAK path.
const RETRANSMIT_AFTER: Duration = Duration::from_millis(1000);

struct OutgoingEntry {
    packet: Packet,
    ack_received: bool,
    last_sent: Option<Instant>,
}

struct SenderWindow {
    outgoing: BTreeMap<u32, OutgoingEntry>,
    window_start: u32,
    next_packet_num: u32,
}

impl Default for SenderWindow {
    fn default() -> Self {
        Self { outgoing: BTreeMap::new(), window_start: 0, next_packet_num: 0 }
    }
}

#[derive(Default)]
struct ReceiverBuffer {
    incoming: BTreeMap<u32, Packet>,
    last_packet_received: Option<u32>,
}

impl ReceiverBuffer {
    fn bump(&mut self, packet_num: u32) {
        self.last_packet_received =
            Some(self.last_packet_received.map_or(packet_num, |last| last.max(packet_num)));
    }
}

/// Per-peer reliable-messaging session (spec.md §4.4-§4.6). A server holds
/// one of these per client it has exchanged a SYN with; a client holds
/// exactly one, for the server.
pub struct Conversation {
    pub conv_id: u32,
    pub peer_addr: SocketAddr,
    socket: Arc<DatagramIo>,
    dispatcher: Arc<dyn ApplicationDispatcher>,
    sender: Mutex<SenderWindow>,
    receiver: Mutex<ReceiverBuffer>,
    peer_features: RwLock<Vec<u16>>,
    closed: AtomicBool,
}

impl Conversation {
    pub fn new(
        conv_id: u32,
        peer_addr: SocketAddr,
        socket: Arc<DatagramIo>,
        dispatcher: Arc<dyn ApplicationDispatcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            conv_id,
            peer_addr,
            socket,
            dispatcher,
            sender: Mutex::new(SenderWindow::default()),
            receiver: Mutex::new(ReceiverBuffer::default()),
            peer_features: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    pub async fn set_peer_features(&self, features: Vec<u16>) {
        *self.peer_features.write().await = features;
    }

    pub async fn peer_features(&self) -> Vec<u16> {
        self.peer_features.read().await.clone()
    }

    /// Spawns the cooperative loop described in spec.md §4.6: application
    /// processing, window transmission, then the retransmission scan, then a
    /// short sleep. `arq_receive` only buffers DATA into `incoming` and
    /// sends control packets immediately; delivery to the application is
    /// entirely driven from here, one message per cycle, which is what
    /// gives lower `packet_num`s priority over higher ones that arrived
    /// earlier (spec.md §5, "Ordering guarantees").
    pub fn spawn_loop(self: &Arc<Self>) {
        let conv = Arc::clone(self);
        tokio::spawn(async move {
            while !conv.is_closed() {
                conv.incoming_processor().await;
                conv.send_window_packets().await;
                conv.check_for_retransmissions().await;
                sleep(LOOP_DELAY).await;
            }
            debug!(conv_id = conv.conv_id, "conversation loop exiting");
        });
    }

    // ---- inbound dispatch (spec.md §4.5) ----

    pub async fn arq_receive(self: &Arc<Self>, pkt: Packet) {
        match pkt.typ {
            PacketType::Data => self.handle_data(pkt).await,
            PacketType::Ack => self.handle_ack(pkt).await,
            PacketType::Nak => self.handle_nak(pkt).await,
            PacketType::Syn => self.send_syn_ack().await,
            PacketType::SynAck => self.send_hello().await,
            other => {
                debug!(conv_id = self.conv_id, ?other, "dropping packet type this conversation does not handle");
            }
        }
    }

    async fn handle_data(self: &Arc<Self>, pkt: Packet) {
        let packet_num = pkt.packet_num;
        self.send_ack(packet_num, pkt.seq_num).await;

        let mut gaps = Vec::new();
        {
            let mut recv = self.receiver.lock().await;
            let last_plus_one = recv.last_packet_received.map_or(0, |l| l + 1);
            if packet_num > last_plus_one {
                gaps.extend(last_plus_one..packet_num);
            }

            if !pkt.is_final || pkt.seq_num > 0 {
                warn!(conv_id = self.conv_id, packet_num, "dropping multi-fragment DATA: fragmentation unsupported");
            } else if recv.incoming.contains_key(&packet_num) {
                trace!(conv_id = self.conv_id, packet_num, "duplicate DATA packet");
            } else {
                recv.incoming.insert(packet_num, pkt);
            }
            recv.bump(packet_num);
        }

        for missing in gaps {
            self.send_nak(missing, 0).await;
        }
    }

    /// Delivers at most one fully-received message to the application per
    /// call, always the lowest `packet_num` currently buffered (spec.md
    /// §4.6 step 1).
    async fn incoming_processor(self: &Arc<Self>) {
        let next = {
            let mut recv = self.receiver.lock().await;
            match recv.incoming.keys().next().copied() {
                Some(key) => recv.incoming.remove(&key),
                None => None,
            }
        };

        if let Some(pkt) = next {
            match qc_wire::decode_app_message(&pkt.body) {
                Ok(msg) => self.dispatcher.dispatch(Arc::clone(self), msg).await,
                Err(e) => warn!(conv_id = self.conv_id, error = %e, "undecodable application message, dropped"),
            }
        }
    }

    async fn handle_ack(&self, pkt: Packet) {
        let mut sender = self.sender.lock().await;
        match sender.outgoing.get_mut(&pkt.packet_num) {
            Some(entry) => entry.ack_received = true,
            None => trace!(conv_id = self.conv_id, packet_num = pkt.packet_num, "ACK for unknown packet, dropped"),
        }
    }

    async fn handle_nak(&self, pkt: Packet) {
        let resend = {
            let sender = self.sender.lock().await;
            match sender.outgoing.get(&pkt.packet_num) {
                Some(entry) if !entry.ack_received => Some(entry.packet.clone()),
                Some(_) => {
                    trace!(conv_id = self.conv_id, packet_num = pkt.packet_num, "NAK for already-acked packet, ignored");
                    None
                }
                None => {
                    trace!(conv_id = self.conv_id, packet_num = pkt.packet_num, "NAK for unknown packet, dropped");
                    None
                }
            }
        };

        if let Some(packet) = resend {
            self.transmit(&packet).await;
            let mut sender = self.sender.lock().await;
            if let Some(entry) = sender.outgoing.get_mut(&pkt.packet_num) {
                entry.last_sent = Some(Instant::now());
            }
        }
    }

    // ---- outbound control packets: sent immediately, outside the window ----

    async fn transmit(&self, pkt: &Packet) {
        if let Err(e) = self.socket.send_to(self.peer_addr, pkt).await {
            warn!(conv_id = self.conv_id, error = %e, "send failed");
        }
    }

    pub async fn send_ack(&self, packet_num: u32, seq_num: u32) {
        self.transmit(&Packet::control(self.conv_id, PacketType::Ack, packet_num, seq_num)).await;
    }

    pub async fn send_nak(&self, packet_num: u32, seq_num: u32) {
        self.transmit(&Packet::control(self.conv_id, PacketType::Nak, packet_num, seq_num)).await;
    }

    pub async fn send_syn(&self) {
        self.transmit(&Packet::control(self.conv_id, PacketType::Syn, 0, 0)).await;
    }

    pub async fn send_syn_ack(&self) {
        self.transmit(&Packet::control(self.conv_id, PacketType::SynAck, 0, 0)).await;
    }

    // ---- outbound DATA packets: enqueued into the window, transmitted by
    // the cooperative loop (spec.md §4.6) ----

    pub async fn send_hello(&self) {
        self.enqueue(AppMessage::Hello { back: false, version: 1, features: Vec::new() }).await;
    }

    pub async fn send_hello_response(&self) {
        self.enqueue(AppMessage::Hello { back: true, version: 1, features: Vec::new() }).await;
    }

    pub async fn send_vote_request(&self, vote_id: u128, question: Vec<u8>) {
        self.enqueue(AppMessage::Vote { broadcast: false, vote_id, question }).await;
    }

    pub async fn send_vote_broadcast(&self, vote_id: u128, question: Vec<u8>) {
        self.enqueue(AppMessage::Vote { broadcast: true, vote_id, question }).await;
    }

    pub async fn send_response(&self, vote_id: u128, answer: VoteAnswer) {
        self.enqueue(AppMessage::Response { result: false, vote_id, answer }).await;
    }

    pub async fn send_result_broadcast(&self, vote_id: u128, answer: VoteAnswer) {
        self.enqueue(AppMessage::Response { result: true, vote_id, answer }).await;
    }

    async fn enqueue(&self, msg: AppMessage) {
        let body = qc_wire::encode_app_message(&msg);
        let mut sender = self.sender.lock().await;
        let packet_num = sender.next_packet_num;
        let pkt = Packet::data(self.conv_id, packet_num, body);

        if qc_wire::serialize_packet(&pkt).is_none() {
            warn!(conv_id = self.conv_id, packet_num, "outbound message exceeds MAX_PCKT_SIZE, dropped");
            return;
        }

        sender.next_packet_num += 1;
        sender.outgoing.insert(packet_num, OutgoingEntry { packet: pkt, ack_received: false, last_sent: None });
    }

    // ---- cooperative loop steps (spec.md §4.6) ----

    async fn send_window_packets(&self) {
        let mut sender = self.sender.lock().await;
        self.move_window(&mut sender);

        let window_start = sender.window_start;
        let to_send: Vec<Packet> = (window_start..window_start + WINDOW_SIZE)
            .filter_map(|n| sender.outgoing.get(&n))
            .filter(|entry| !entry.ack_received)
            .map(|entry| entry.packet.clone())
            .collect();
        drop(sender);

        for pkt in to_send {
            self.transmit(&pkt).await;
        }

        let mut sender = self.sender.lock().await;
        let now = Instant::now();
        for n in window_start..window_start + WINDOW_SIZE {
            if let Some(entry) = sender.outgoing.get_mut(&n) {
                if !entry.ack_received {
                    entry.last_sent = Some(now);
                }
            }
        }
    }

    /// Advances `window_start` past every leading, contiguously-acked entry,
    /// destroying each entry as the window passes it (spec.md §3: "entries
    /// below `window_start` do not exist").
    fn move_window(&self, sender: &mut SenderWindow) {
        loop {
            match sender.outgoing.get(&sender.window_start) {
                Some(entry) if entry.ack_received => {
                    sender.outgoing.remove(&sender.window_start);
                    sender.window_start += 1;
                }
                _ => break,
            }
        }
    }

    async fn check_for_retransmissions(&self) {
        let now = Instant::now();
        let mut sender = self.sender.lock().await;
        let window_start = sender.window_start;
        let stale: Vec<Packet> = (window_start..window_start + WINDOW_SIZE)
            .filter_map(|n| sender.outgoing.get(&n))
            .filter(|entry| {
                !entry.ack_received
                    && entry.last_sent.is_some_and(|t| now.duration_since(t) > RETRANSMIT_AFTER)
            })
            .map(|entry| entry.packet.clone())
            .collect();
        drop(sender);

        for pkt in &stale {
            trace!(conv_id = self.conv_id, packet_num = pkt.packet_num, "retransmitting after silence");
            self.transmit(pkt).await;
        }

        if !stale.is_empty() {
            let mut sender = self.sender.lock().await;
            let now = Instant::now();
            for pkt in &stale {
                if let Some(entry) = sender.outgoing.get_mut(&pkt.packet_num) {
                    entry.last_sent = Some(now);
                }
            }
        }
    }
}
