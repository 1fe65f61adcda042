use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use chatmesh::network::hub::Hub;
use chatmesh::network::message::ChatMessage;
use chatmesh::network::peer_link::PeerLink;

/// Open a real loopback connection, register the local end with the hub as
/// a peer link (read loop running), and hand back the remote end's reader.
async fn link_pair(hub: &Hub) -> (PeerLink, BufReader<OwnedReadHalf>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (connect, accept) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let local = connect.unwrap();
    let (remote, _) = accept.unwrap();
    let (link, reader) = PeerLink::open(local).unwrap();
    hub.add_peer(link.clone()).await;
    tokio::spawn(link.clone().run_read_loop(reader, hub.clone()));
    let (remote_read, _remote_write) = remote.into_split();
    // Leak the write half so the connection stays open for the test's lifetime
    std::mem::forget(_remote_write);
    (link, BufReader::new(remote_read))
}

async fn recv_frame(reader: &mut BufReader<OwnedReadHalf>) -> ChatMessage {
    let mut line = String::new();
    timeout(Duration::from_secs(2), reader.read_line(&mut line))
        .await
        .expect("timed out waiting for frame")
        .unwrap();
    ChatMessage::from_json(line.trim()).unwrap()
}

async fn assert_no_frame(reader: &mut BufReader<OwnedReadHalf>) {
    let mut line = String::new();
    let res = timeout(Duration::from_millis(200), reader.read_line(&mut line)).await;
    assert!(res.is_err(), "unexpected frame: {}", line.trim());
}

fn client_addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{}", port).parse().unwrap()
}

#[tokio::test]
async fn client_message_reaches_all_clients_and_all_peers() {
    let hub = Hub::new("A", vec![]);
    let (tx1, mut rx1) = mpsc::channel::<String>(8);
    let (tx2, mut rx2) = mpsc::channel::<String>(8);
    let source = client_addr(4001);
    hub.add_client(source, tx1).await;
    hub.add_client(client_addr(4002), tx2).await;
    let (_link, mut remote) = link_pair(&hub).await;

    hub.route_from_client("hi", source).await;

    // Both clients get it, the originator included.
    for rx in [&mut rx1, &mut rx2] {
        let frame = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        let msg = ChatMessage::from_json(&frame).unwrap();
        assert_eq!(msg.origin_node_id, "A");
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.sender, format!("user@{}", source));
    }
    // And every peer, with no exclusion.
    let forwarded = recv_frame(&mut remote).await;
    assert_eq!(forwarded.origin_node_id, "A");
    assert_eq!(forwarded.content, "hi");
}

#[tokio::test]
async fn peer_message_forwards_to_all_links_except_source() {
    let hub = Hub::new("B", vec![]);
    let (tx, mut rx) = mpsc::channel::<String>(8);
    hub.add_client(client_addr(4010), tx).await;
    let (l1, mut r1) = link_pair(&hub).await;
    let (_l2, mut r2) = link_pair(&hub).await;

    let msg = ChatMessage::reconstruct("alice", "hello", 123, "A");
    hub.route_from_peer(msg.clone(), &l1).await;

    let frame = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(ChatMessage::from_json(&frame).unwrap(), msg);
    assert_eq!(recv_frame(&mut r2).await, msg);
    // The sending link must not get the one-hop echo.
    assert_no_frame(&mut r1).await;
}

#[tokio::test]
async fn own_origin_message_is_suppressed_entirely() {
    let hub = Hub::new("A", vec![]);
    let (tx, mut rx) = mpsc::channel::<String>(8);
    hub.add_client(client_addr(4020), tx).await;
    let (l1, mut r1) = link_pair(&hub).await;
    let (_l2, mut r2) = link_pair(&hub).await;

    // Circulated back to its creator: zero broadcasts, zero forwards.
    let msg = ChatMessage::reconstruct("alice", "boomerang", 7, "A");
    hub.route_from_peer(msg, &l1).await;

    assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
    assert_no_frame(&mut r1).await;
    assert_no_frame(&mut r2).await;
}

#[tokio::test]
async fn remove_on_non_member_is_a_noop() {
    let hub = Hub::new("A", vec![]);
    let (link, _remote) = link_pair(&hub).await;
    assert_eq!(hub.peer_count().await, 1);
    hub.remove_peer(&link).await;
    assert_eq!(hub.peer_count().await, 0);
    hub.remove_peer(&link).await;
    assert_eq!(hub.peer_count().await, 0);
    hub.remove_client(&client_addr(4999)).await;
    assert_eq!(hub.client_count().await, 0);
}

#[tokio::test]
async fn routing_survives_concurrent_membership_churn() {
    let hub = Hub::new("A", vec![]);
    let source = client_addr(5000);
    let (tx, mut rx) = mpsc::channel::<String>(64);
    hub.add_client(source, tx).await;

    let churn = {
        let hub = hub.clone();
        tokio::spawn(async move {
            for i in 0..50u16 {
                let addr = client_addr(5100 + i);
                let (tx, _rx) = mpsc::channel::<String>(1);
                hub.add_client(addr, tx).await;
                hub.remove_client(&addr).await;
            }
        })
    };
    for _ in 0..20 {
        hub.route_from_client("churn", source).await;
    }
    churn.await.unwrap();
    // The stable client saw every routed message in order.
    for _ in 0..20 {
        let frame = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(ChatMessage::from_json(&frame).unwrap().content, "churn");
    }
}
