//! Integration tests for the full transfer path.
//!
//! Each test spins up a client and a server talking over the loopback
//! interface.  Both sides are spawned as separate tokio tasks so they can make
//! progress concurrently without blocking each other.  Where a test needs to
//! misbehave on purpose, one side is a raw [`Socket`] driven by hand.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use drtp::{
    config::Config,
    connection::{ClientSession, ServerSession},
    error::DrtpError,
    packet::Packet,
    receiver::ReceiveStats,
    sender::{chunk_bytes, SendStats},
    simulator::{Simulator, SimulatorConfig},
    socket::{shutdown_channel, Incoming, Socket},
    state::ConnectionState,
    teardown::TeardownOutcome,
    transfer::{receive_file, send_file},
};

/// Bind a socket to an OS-assigned port on loopback.
async fn ephemeral() -> Socket {
    let addr = "127.0.0.1:0".parse().unwrap();
    Socket::bind(addr).await.expect("bind failed")
}

fn fast() -> Config {
    Config::default()
        .with_timeout(Duration::from_millis(60))
        .with_linger(Duration::from_millis(150))
        .with_idle_timeout(Duration::from_secs(5))
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

async fn expect_packet(socket: &Socket) -> (Packet, SocketAddr) {
    match socket.recv_deadline(Some(Duration::from_secs(2))).await.unwrap() {
        Incoming::Packet { packet, from } => (packet, from),
        other => panic!("expected a packet, got {other:?}"),
    }
}

/// Run one client/server pair over loopback and return what the server wrote.
async fn run_pair(
    data: Vec<u8>,
    window: u16,
    simulator: SimulatorConfig,
    config: Config,
) -> (Vec<u8>, SendStats, ReceiveStats, TeardownOutcome) {
    let server_sock = ephemeral().await;
    let server_addr = server_sock.local_addr;
    let server_config = config.clone();

    let server = tokio::spawn(async move {
        let mut session = ServerSession::accept(server_sock, server_config)
            .await
            .expect("accept")
            .with_simulator(Simulator::new(simulator));
        let mut out = Vec::new();
        let stats = session.receive_into(&mut out).await.expect("receive");
        (out, stats)
    });

    let client = tokio::spawn(async move {
        let chunks = chunk_bytes(&data, config.chunk_size);
        let mut session = ClientSession::connect(ephemeral().await, server_addr, window, config)
            .await
            .expect("connect");
        let stats = session.send_chunks(chunks).await.expect("send");
        let outcome = session.close().await.expect("close");
        (stats, outcome)
    });

    let (sr, cr) = tokio::join!(server, client);
    let (out, recv_stats) = sr.unwrap();
    let (send_stats, outcome) = cr.unwrap();
    (out, send_stats, recv_stats, outcome)
}

/// Reserve a free loopback port for a server that binds its own socket.
fn reserve_port() -> SocketAddr {
    let port = std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port)
}

/// Client side of the handshake done by hand.
async fn raw_connect(raw: &Socket, server: SocketAddr, window: u16) {
    raw.send_to(&Packet::syn(window), server).await.unwrap();
    let (reply, _) = expect_packet(raw).await;
    assert!(reply.is_syn_ack());
    raw.send_to(&Packet::ack(0, window.min(reply.header.window)), server)
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Loss-free delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn loss_free_delivery_is_exact() {
    for (len, window) in [(0, 3), (1, 1), (2500, 2), (10_000, 3), (50_000, 15)] {
        let data = sample(len);
        let (out, sent, received, outcome) =
            run_pair(data.clone(), window, SimulatorConfig::default(), fast()).await;
        assert_eq!(out, data, "len {len} window {window}");
        assert_eq!(sent.bytes, len as u64);
        assert_eq!(received.bytes, len as u64);
        assert_eq!(outcome, TeardownOutcome::Closed);
    }
}

#[tokio::test]
async fn three_chunk_file_of_2500_bytes() {
    let data = sample(2500);
    let (out, sent, received, _) =
        run_pair(data.clone(), 2, SimulatorConfig::default(), fast()).await;
    assert_eq!(out, data);
    assert_eq!(sent.chunks, 3);
    assert_eq!(received.delivered, 3);
}

// ---------------------------------------------------------------------------
// Loss and recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn discarded_first_packet_is_retransmitted() {
    let data = sample(20 * 992);
    let (out, sent, received, outcome) =
        run_pair(data.clone(), 5, SimulatorConfig::discard_first(), fast()).await;

    assert_eq!(out, data);
    assert_eq!(received.dropped_by_simulator, 1);
    assert!(sent.timeouts >= 1);
    // One lost packet costs at most a window's worth of extra rounds.
    assert!(sent.timeouts <= 5, "{} timeouts", sent.timeouts);
    assert!(sent.retransmissions <= 5 * sent.timeouts);
    assert_eq!(outcome, TeardownOutcome::Closed);
}

#[tokio::test]
async fn targeted_drops_still_complete() {
    let data = sample(40 * 100);
    let simulator = SimulatorConfig {
        drop_seqs: vec![3, 17, 18, 39],
        ..SimulatorConfig::default()
    };
    let config = fast().with_chunk_size(100);
    let (out, _, received, _) = run_pair(data.clone(), 4, simulator, config).await;
    assert_eq!(out, data);
    assert_eq!(received.dropped_by_simulator, 4);
}

#[tokio::test]
async fn random_loss_completes_byte_exact() {
    let data = sample(60 * 500);
    let simulator = SimulatorConfig {
        loss_rate: 0.2,
        seed: 7,
        ..SimulatorConfig::default()
    };
    let config = fast().with_chunk_size(500);
    let (out, sent, received, _) = run_pair(data.clone(), 6, simulator, config).await;
    assert_eq!(out, data);
    assert!(received.dropped_by_simulator > 0);
    assert!(sent.retransmissions > 0);
}

#[tokio::test]
async fn sequence_numbers_wrap() {
    // More chunks than the 16-bit sequence space holds.
    let data = sample(66_000);
    let config = fast().with_chunk_size(1).with_server_window(64);
    let (out, sent, _, _) = run_pair(data.clone(), 64, SimulatorConfig::default(), config).await;
    assert_eq!(sent.chunks, 66_000);
    assert_eq!(out, data);
}

// ---------------------------------------------------------------------------
// Receiver behaviour against a hand-driven client
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reordered_segments_written_in_order() {
    let server_sock = ephemeral().await;
    let server_addr = server_sock.local_addr;
    let server = tokio::spawn(async move {
        let mut session = ServerSession::accept(server_sock, fast()).await.expect("accept");
        let mut out = Vec::new();
        let stats = session.receive_into(&mut out).await.expect("receive");
        (out, stats)
    });

    let raw = ephemeral().await;
    raw_connect(&raw, server_addr, 4).await;

    let mut acks = Vec::new();
    for (seq, payload) in [(2, b"c"), (1, b"b"), (0, b"a")] {
        raw.send_to(&Packet::data(seq, 4, payload.to_vec()), server_addr)
            .await
            .unwrap();
        let (ack, _) = expect_packet(&raw).await;
        assert!(ack.is_pure_ack());
        acks.push(ack.header.ack);
    }
    assert_eq!(acks, vec![0, 0, 3]);

    raw.send_to(&Packet::fin(4), server_addr).await.unwrap();
    let (fin_ack, _) = expect_packet(&raw).await;
    assert!(fin_ack.is_fin_ack());

    let (out, stats) = server.await.unwrap();
    assert_eq!(out, b"abc");
    assert_eq!(stats.buffered, 2);
}

#[tokio::test]
async fn empty_transfer_survives_lost_final_ack() {
    let server_sock = ephemeral().await;
    let server_addr = server_sock.local_addr;
    let server = tokio::spawn(async move {
        let mut session = ServerSession::accept(server_sock, fast()).await.expect("accept");
        let mut out = Vec::new();
        let stats = session.receive_into(&mut out).await.expect("receive");
        (out, stats, session.state)
    });

    let raw = ephemeral().await;
    raw.send_to(&Packet::syn(3), server_addr).await.unwrap();
    let (reply, _) = expect_packet(&raw).await;
    assert!(reply.is_syn_ack());
    // Final ACK lost; with nothing to send the next packet is FIN.
    raw.send_to(&Packet::fin(3), server_addr).await.unwrap();
    let (fin_ack, _) = expect_packet(&raw).await;
    assert!(fin_ack.is_fin_ack());

    let (out, stats, state) = server.await.unwrap();
    assert!(out.is_empty());
    assert_eq!(stats.bytes, 0);
    assert_eq!(state, ConnectionState::Closed);
}

#[tokio::test]
async fn transfer_time_stops_at_fin() {
    let server_sock = ephemeral().await;
    let server_addr = server_sock.local_addr;
    let linger = Duration::from_millis(600);
    let config = fast().with_linger(linger);
    let server = tokio::spawn(async move {
        let mut session = ServerSession::accept(server_sock, config).await.expect("accept");
        let started = tokio::time::Instant::now();
        session.receive_into(&mut Vec::new()).await.expect("receive");
        (session.transfer_elapsed(), started.elapsed())
    });

    let raw = ephemeral().await;
    raw_connect(&raw, server_addr, 3).await;
    raw.send_to(&Packet::data(0, 3, b"tiny".to_vec()), server_addr)
        .await
        .unwrap();
    let (ack, _) = expect_packet(&raw).await;
    assert_eq!(ack.header.ack, 1);
    raw.send_to(&Packet::fin(3), server_addr).await.unwrap();

    let (transfer, total) = server.await.unwrap();
    let transfer = transfer.expect("FIN was seen");
    assert!(total >= linger);
    assert!(transfer < linger, "transfer time {transfer:?} includes the linger");
}

#[tokio::test]
async fn idle_receiver_times_out_with_partial_output() {
    let server_sock = ephemeral().await;
    let server_addr = server_sock.local_addr;
    let config = fast().with_idle_timeout(Duration::from_millis(200));
    let server = tokio::spawn(async move {
        let mut session = ServerSession::accept(server_sock, config).await.expect("accept");
        let mut out = Vec::new();
        let result = session.receive_into(&mut out).await;
        (out, result)
    });

    let raw = ephemeral().await;
    raw_connect(&raw, server_addr, 3).await;
    raw.send_to(&Packet::data(0, 3, b"partial".to_vec()), server_addr)
        .await
        .unwrap();
    // Then go silent.

    let (out, result) = server.await.unwrap();
    assert_eq!(out, b"partial");
    match result {
        Err(DrtpError::ConnectionTimedOut { bytes_written }) => assert_eq!(bytes_written, 7),
        other => panic!("expected ConnectionTimedOut, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Sender behaviour against a hand-driven server
// ---------------------------------------------------------------------------

#[tokio::test]
async fn nothing_sent_after_fin_ack() {
    let raw = ephemeral().await;
    let raw_addr = raw.local_addr;

    let config = fast().with_timeout(Duration::from_millis(500));

    let client = tokio::spawn(async move {
        let mut session = ClientSession::connect(ephemeral().await, raw_addr, 2, config)
            .await
            .expect("connect");
        session.send_chunks(vec![b"only".to_vec()]).await.expect("send");
        session.close().await.expect("close")
    });

    let (syn, peer) = expect_packet(&raw).await;
    assert!(syn.is_syn());
    raw.send_to(&Packet::syn_ack(15), peer).await.unwrap();
    let (ack, _) = expect_packet(&raw).await;
    assert!(ack.is_pure_ack());
    assert_eq!(ack.header.window, 2);

    let (data, _) = expect_packet(&raw).await;
    assert!(data.is_data());
    assert_eq!(data.payload, b"only");
    raw.send_to(&Packet::ack(1, 2), peer).await.unwrap();

    let (fin, _) = expect_packet(&raw).await;
    assert!(fin.is_fin());
    raw.send_to(&Packet::fin_ack(), peer).await.unwrap();

    assert_eq!(client.await.unwrap(), TeardownOutcome::Closed);
    let after = raw.recv_deadline(Some(Duration::from_millis(300))).await.unwrap();
    assert!(matches!(after, Incoming::TimedOut), "client sent {after:?}");
}

#[tokio::test]
async fn silent_server_exhausts_retransmits() {
    let raw = ephemeral().await;
    let raw_addr = raw.local_addr;
    let config = fast().with_max_retransmits(Some(2));

    let client = tokio::spawn(async move {
        let mut session = ClientSession::connect(ephemeral().await, raw_addr, 3, config)
            .await
            .expect("connect");
        session.send_chunks(vec![b"lost".to_vec()]).await
    });

    let (_, peer) = expect_packet(&raw).await;
    raw.send_to(&Packet::syn_ack(15), peer).await.unwrap();
    // Swallow the ACK and every data packet without replying.

    match client.await.unwrap() {
        Err(DrtpError::RetransmitTimeout { attempts }) => assert_eq!(attempts, 3),
        other => panic!("expected RetransmitTimeout, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_cancels_waiting_server() {
    let (shutdown, signal) = shutdown_channel();
    let server_sock = ephemeral().await.with_shutdown(signal);
    let server = tokio::spawn(async move { ServerSession::accept(server_sock, fast()).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.trigger();

    let result = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("accept still blocked")
        .unwrap();
    assert!(matches!(result, Err(DrtpError::Cancelled)));
}

#[tokio::test]
async fn cancelled_receive_keeps_acknowledged_bytes_on_disk() {
    let dir = std::env::temp_dir().join(format!("drtp-cancel-{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let server_addr = reserve_port();

    let (shutdown, signal) = shutdown_channel();
    let out_dir = dir.clone();
    let server = tokio::spawn(async move {
        receive_file(server_addr, &out_dir, SimulatorConfig::default(), &fast(), signal).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let raw = ephemeral().await;
    raw_connect(&raw, server_addr, 3).await;
    let data = sample(3 * 992);
    for (seq, chunk) in chunk_bytes(&data, 992).into_iter().enumerate() {
        raw.send_to(&Packet::data(seq as u16, 3, chunk), server_addr)
            .await
            .unwrap();
        let (ack, _) = expect_packet(&raw).await;
        assert_eq!(ack.header.ack, seq as u16 + 1);
    }

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("receive still blocked")
        .unwrap();
    assert!(matches!(result, Err(DrtpError::Cancelled)));

    let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
    let entry = entries.next_entry().await.unwrap().expect("output file created");
    assert!(entry.file_name().to_string_lossy().starts_with("received_file_"));
    let written = tokio::fs::read(entry.path()).await.unwrap();
    assert_eq!(written, data);

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

// ---------------------------------------------------------------------------
// File round trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn file_round_trip_with_discard() {
    let dir = std::env::temp_dir().join(format!("drtp-roundtrip-{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let input = dir.join("input.bin");
    let data = sample(7_777);
    tokio::fs::write(&input, &data).await.unwrap();

    let server_addr = reserve_port();

    let out_dir = dir.clone();
    let server = tokio::spawn(async move {
        let (_keep, signal) = shutdown_channel();
        receive_file(server_addr, &out_dir, SimulatorConfig::discard_first(), &fast(), signal).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (_keep, signal) = shutdown_channel();
    let client = send_file(&input, server_addr, 3, &fast(), signal).await.expect("send");
    let server = server.await.unwrap().expect("receive");

    assert_eq!(client.window, 3);
    assert!(client.teardown.is_complete());
    assert_eq!(server.stats.dropped_by_simulator, 1);
    let written = tokio::fs::read(&server.path).await.unwrap();
    assert_eq!(written, data);

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}
