use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use chatmesh::network::hub::Hub;
use chatmesh::network::message::ChatMessage;
use chatmesh::network::peer_link::{LinkState, PeerLink};

/// Loopback connection with the local end registered as a running peer
/// link; the remote `TcpStream` stays in the test's hands.
async fn link_with_remote(hub: &Hub) -> (PeerLink, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (connect, accept) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let local = connect.unwrap();
    let (remote, _) = accept.unwrap();
    let (link, reader) = PeerLink::open(local).unwrap();
    hub.add_peer(link.clone()).await;
    tokio::spawn(link.clone().run_read_loop(reader, hub.clone()));
    (link, remote)
}

async fn wait_for_peer_count(hub: &Hub, expected: usize) {
    for _ in 0..100 {
        if hub.peer_count().await == expected {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "peer count never reached {} (now {})",
        expected,
        hub.peer_count().await
    );
}

fn client_addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{}", port).parse().unwrap()
}

#[tokio::test]
async fn open_yields_active_link() {
    let hub = Hub::new("A", vec![]);
    let (link, _remote) = link_with_remote(&hub).await;
    assert_eq!(link.state(), LinkState::Active);
    assert_eq!(hub.peer_count().await, 1);
}

#[tokio::test]
async fn close_is_idempotent() {
    let hub = Hub::new("A", vec![]);
    let (link, _remote) = link_with_remote(&hub).await;
    link.close();
    assert_eq!(link.state(), LinkState::Closed);
    link.close();
    assert_eq!(link.state(), LinkState::Closed);
    // The read loop notices the close signal and deregisters exactly once.
    wait_for_peer_count(&hub, 0).await;
    hub.remove_peer(&link).await;
    assert_eq!(hub.peer_count().await, 0);
}

#[tokio::test]
async fn send_after_close_is_silent_noop() {
    let hub = Hub::new("A", vec![]);
    let (link, _remote) = link_with_remote(&hub).await;
    link.close();
    link.send("dropped on the floor");
    assert_eq!(link.state(), LinkState::Closed);
}

#[tokio::test]
async fn remote_drop_removes_link_from_hub() {
    let hub = Hub::new("A", vec![]);
    let (link, remote) = link_with_remote(&hub).await;
    assert_eq!(hub.peer_count().await, 1);
    drop(remote); // peer sees end-of-stream
    wait_for_peer_count(&hub, 0).await;
    assert_eq!(link.state(), LinkState::Closed);
    // Subsequent routing no longer touches the dead link and never panics.
    hub.route_from_client("still fine", client_addr(6000)).await;
}

#[tokio::test]
async fn malformed_frame_keeps_link_alive() {
    let hub = Hub::new("B", vec![]);
    let (tx, mut rx) = mpsc::channel::<String>(8);
    hub.add_client(client_addr(6010), tx).await;
    let (_link, mut remote) = link_with_remote(&hub).await;

    remote.write_all(b"this is not a frame\n").await.unwrap();
    let good = ChatMessage::reconstruct("alice", "still here", 9, "A");
    remote
        .write_all(format!("{}\n", good.to_json()).as_bytes())
        .await
        .unwrap();

    // The corrupt frame was dropped, the next well-formed one still routed.
    let frame = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(ChatMessage::from_json(&frame).unwrap(), good);
    assert_eq!(hub.peer_count().await, 1);
}

#[tokio::test]
async fn inbound_frames_route_in_arrival_order() {
    let hub = Hub::new("B", vec![]);
    let (tx, mut rx) = mpsc::channel::<String>(16);
    hub.add_client(client_addr(6020), tx).await;
    let (_link, mut remote) = link_with_remote(&hub).await;

    for i in 0..10u64 {
        let msg = ChatMessage::reconstruct("alice", &format!("m{}", i), i, "A");
        remote
            .write_all(format!("{}\n", msg.to_json()).as_bytes())
            .await
            .unwrap();
    }
    for i in 0..10u64 {
        let frame = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(ChatMessage::from_json(&frame).unwrap().content, format!("m{}", i));
    }
}

#[tokio::test]
async fn read_loop_exits_promptly_on_pre_closed_link() {
    let hub = Hub::new("A", vec![]);
    hub.shutdown().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (connect, accept) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let (link, reader) = PeerLink::open(connect.unwrap()).unwrap();
    let (_remote, _) = accept.unwrap();

    // Registration during shutdown closes the link before its loop runs.
    hub.add_peer(link.clone()).await;
    assert_eq!(link.state(), LinkState::Closed);

    // The remote end stays open and silent; the loop must return anyway
    // instead of parking in the read until the remote hangs up.
    let handle = tokio::spawn(link.clone().run_read_loop(reader, hub.clone()));
    timeout(Duration::from_secs(1), handle)
        .await
        .expect("read loop stuck on an already-closed link")
        .unwrap();
    assert_eq!(link.state(), LinkState::Closed);
}

#[tokio::test]
async fn oversized_frame_is_dropped_and_link_survives() {
    let hub = Hub::new("B", vec![]);
    let (tx, mut rx) = mpsc::channel::<String>(8);
    hub.add_client(client_addr(6040), tx).await;
    let (_link, mut remote) = link_with_remote(&hub).await;

    // One 80 KiB line, well past the per-frame cap.
    let mut huge = vec![b'x'; 80 * 1024];
    huge.push(b'\n');
    remote.write_all(&huge).await.unwrap();
    let good = ChatMessage::reconstruct("alice", "after the flood", 10, "A");
    remote
        .write_all(format!("{}\n", good.to_json()).as_bytes())
        .await
        .unwrap();

    // The oversized line never reaches a client; the next frame does.
    let frame = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(ChatMessage::from_json(&frame).unwrap(), good);
    assert_eq!(hub.peer_count().await, 1);
}

#[tokio::test]
async fn shutdown_closes_all_links_and_is_idempotent() {
    let hub = Hub::new("A", vec![]);
    let (l1, _r1) = link_with_remote(&hub).await;
    let (l2, _r2) = link_with_remote(&hub).await;
    let (tx, _rx) = mpsc::channel::<String>(1);
    hub.add_client(client_addr(6030), tx).await;

    hub.shutdown().await;
    assert_eq!(hub.peer_count().await, 0);
    assert_eq!(hub.client_count().await, 0);
    assert_eq!(l1.state(), LinkState::Closed);
    assert_eq!(l2.state(), LinkState::Closed);

    hub.shutdown().await;
    assert_eq!(hub.peer_count().await, 0);

    // Registrations after shutdown are refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (connect, accept) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let (late, _reader) = PeerLink::open(connect.unwrap()).unwrap();
    drop(accept.unwrap());
    hub.add_peer(late.clone()).await;
    assert_eq!(hub.peer_count().await, 0);
    assert_eq!(late.state(), LinkState::Closed);
}
