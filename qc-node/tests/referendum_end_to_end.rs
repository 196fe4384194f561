//! End-to-end referendum scenarios (spec.md §8) driven over real loopback
//! UDP sockets: a server node and several client nodes, each running the
//! full handshake, listener, and referendum manager wiring a binary would
//! use, just without a process boundary between them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use qc_faults::FaultConfig;
use qc_referendum::{ReferendumManager, VoteId};
use qc_transport::{ApplicationDispatcher, Conversation, ConversationTable, DatagramIo};
use qc_wire::VoteAnswer;
use tokio::time::{sleep, Instant};

struct Server {
    manager: Arc<ReferendumManager>,
}

async fn spawn_server(faults: Arc<FaultConfig>) -> (Server, SocketAddr) {
    let socket = Arc::new(DatagramIo::bind("127.0.0.1:0".parse().unwrap(), faults.clone()).await.unwrap());
    let addr = socket.local_addr().unwrap();

    let table = ConversationTable::new();
    table.set_self_conv_id(qc_transport::generate_conversation_id());

    let manager = ReferendumManager::new(Arc::clone(&table), faults);
    let dispatcher: Arc<dyn ApplicationDispatcher> = manager.clone();

    tokio::spawn(qc_transport::run_listener(socket, table, dispatcher, true));
    (Server { manager }, addr)
}

struct Client {
    conv: Arc<Conversation>,
    manager: Arc<ReferendumManager>,
}

async fn spawn_client(server_addr: SocketAddr, faults: Arc<FaultConfig>) -> Client {
    let socket = Arc::new(DatagramIo::connect(server_addr, faults.clone()).await.unwrap());
    let table = ConversationTable::new();

    let manager = ReferendumManager::new(Arc::clone(&table), faults);
    let dispatcher: Arc<dyn ApplicationDispatcher> = manager.clone();

    tokio::spawn(qc_transport::run_listener(
        Arc::clone(&socket),
        Arc::clone(&table),
        dispatcher,
        false,
    ));

    qc_node::handshake::connect(&socket, &table, server_addr).await;
    let conv = table.get(table.self_conv_id()).await.unwrap();
    Client { conv, manager }
}

/// Polls an async `check` until it returns `Some`, or panics after `budget`.
async fn wait_until<T, F, Fut>(budget: Duration, mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let start = Instant::now();
    loop {
        if let Some(v) = check().await {
            return v;
        }
        if start.elapsed() > budget {
            panic!("condition did not become true within {budget:?}");
        }
        sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn scenario_1_unanimous_sat_no_overwrite() {
    let faults = Arc::new(FaultConfig::default());
    let (server, addr) = spawn_server(faults.clone()).await;
    let c1 = spawn_client(addr, faults.clone()).await;
    let c2 = spawn_client(addr, faults.clone()).await;
    let c3 = spawn_client(addr, faults.clone()).await;

    // Give the server time to finish the SYN_ACK/HELLO exchange with every
    // client before the vote is proposed, so the participant snapshot
    // includes all three.
    sleep(Duration::from_millis(300)).await;

    let vote_id = VoteId::new_random();
    c1.conv.send_vote_request(vote_id.to_wire(), b"1 == 1".to_vec()).await;

    let (ongoing, result) = wait_until(Duration::from_secs(5), || server.manager.host_status(vote_id)).await;
    assert!(!ongoing);
    assert_eq!(result, Some(VoteAnswer::Sat));

    for c in [&c1, &c2, &c3] {
        let answer = wait_until(Duration::from_secs(5), || c.manager.client_answer(vote_id)).await;
        assert_eq!(answer, VoteAnswer::Sat);
    }
}

#[tokio::test]
async fn scenario_2_defecting_client_is_overwritten() {
    let faults_honest = Arc::new(FaultConfig::default());
    let faults_defector = Arc::new(FaultConfig::new(0.0, 0, 1.0));

    let (server, addr) = spawn_server(faults_honest.clone()).await;
    let c1 = spawn_client(addr, faults_honest.clone()).await;
    let c2 = spawn_client(addr, faults_honest.clone()).await;
    let defector = spawn_client(addr, faults_defector).await;

    sleep(Duration::from_millis(300)).await;

    let vote_id = VoteId::new_random();
    c1.conv.send_vote_request(vote_id.to_wire(), b"1 == 1".to_vec()).await;

    let (ongoing, result) = wait_until(Duration::from_secs(5), || server.manager.host_status(vote_id)).await;
    assert!(!ongoing);
    assert_eq!(result, Some(VoteAnswer::Sat));

    // The defector computed UNSAT locally but must end up with the server's
    // broadcast SAT result once it arrives.
    let answer = wait_until(Duration::from_secs(5), || defector.manager.client_answer(vote_id)).await;
    assert_eq!(answer, VoteAnswer::Sat);
    let _ = c2;
}

#[tokio::test]
async fn scenario_3_malformed_expression_reaches_syntax_error_consensus() {
    let faults = Arc::new(FaultConfig::default());
    let (server, addr) = spawn_server(faults.clone()).await;
    let c1 = spawn_client(addr, faults.clone()).await;
    let c2 = spawn_client(addr, faults.clone()).await;
    let c3 = spawn_client(addr, faults.clone()).await;

    sleep(Duration::from_millis(300)).await;

    let vote_id = VoteId::new_random();
    c1.conv.send_vote_request(vote_id.to_wire(), b"foo bar".to_vec()).await;

    let (ongoing, result) = wait_until(Duration::from_secs(5), || server.manager.host_status(vote_id)).await;
    assert!(!ongoing);
    assert_eq!(result, Some(VoteAnswer::SyntaxError));
    let _ = (c2, c3);
}

#[tokio::test]
async fn scenario_4_lossy_network_still_converges() {
    let faults = Arc::new(FaultConfig::new(0.5, 0, 0.0));
    let (server, addr) = spawn_server(faults.clone()).await;
    let c1 = spawn_client(addr, faults.clone()).await;
    let c2 = spawn_client(addr, faults.clone()).await;
    let c3 = spawn_client(addr, faults.clone()).await;

    // Handshakes themselves must survive the same loss rate; give them more
    // room than the lossless scenarios.
    sleep(Duration::from_secs(2)).await;

    let vote_id = VoteId::new_random();
    c1.conv.send_vote_request(vote_id.to_wire(), b"true".to_vec()).await;

    let (ongoing, result) = wait_until(Duration::from_secs(30), || server.manager.host_status(vote_id)).await;
    assert!(!ongoing);
    assert_eq!(result, Some(VoteAnswer::Sat));
    let _ = (c2, c3);
}

#[tokio::test]
async fn scenario_5_duplicate_vote_id_is_ignored() {
    let faults = Arc::new(FaultConfig::default());
    let (server, addr) = spawn_server(faults.clone()).await;
    let c1 = spawn_client(addr, faults.clone()).await;

    sleep(Duration::from_millis(200)).await;

    let vote_id = VoteId::new_random();
    c1.conv.send_vote_request(vote_id.to_wire(), b"true".to_vec()).await;
    sleep(Duration::from_millis(200)).await;
    c1.conv.send_vote_request(vote_id.to_wire(), b"false".to_vec()).await;
    sleep(Duration::from_millis(200)).await;

    // Only the first question is ever hosted; the referendum manager logs
    // and drops the second `create_from_client_request` as a duplicate.
    let (_, result) = wait_until(Duration::from_secs(5), || server.manager.host_status(vote_id)).await;
    let _ = result;
}

#[tokio::test]
async fn scenario_6_two_concurrent_referendums_are_independent() {
    let faults = Arc::new(FaultConfig::default());
    let (server, addr) = spawn_server(faults.clone()).await;
    let c1 = spawn_client(addr, faults.clone()).await;
    let c2 = spawn_client(addr, faults.clone()).await;

    sleep(Duration::from_millis(300)).await;

    let vote_a = VoteId::new_random();
    let vote_b = VoteId::new_random();
    c1.conv.send_vote_request(vote_a.to_wire(), b"1 == 1".to_vec()).await;
    c2.conv.send_vote_request(vote_b.to_wire(), b"1 == 2".to_vec()).await;

    let (_, result_a) = wait_until(Duration::from_secs(5), || server.manager.host_status(vote_a)).await;
    let (_, result_b) = wait_until(Duration::from_secs(5), || server.manager.host_status(vote_b)).await;

    assert_eq!(result_a, Some(VoteAnswer::Sat));
    assert_eq!(result_b, Some(VoteAnswer::Unsat));
}
