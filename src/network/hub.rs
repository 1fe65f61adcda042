// src/network/hub.rs

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc::Sender;
use tokio::sync::watch;
use tokio::sync::Mutex;

use crate::events::model::LogLevel;
use crate::network::events::{emit_network_event, NetComponent};
use crate::network::message::ChatMessage;
use crate::network::peer_link::PeerLink;

/// The relay core: owns the set of local clients and the set of active peer
/// links, and routes every message arriving from either side to all other
/// destinations.
///
/// Cheap to clone; all clones share the same membership sets. The two sets
/// are the only mutable shared state and are touched from one task per
/// connection, so every mutator is safe under concurrent add/remove/iterate.
#[derive(Clone)]
pub struct Hub {
    node_id: Arc<String>,
    dial_targets: Arc<Vec<String>>,
    peers: Arc<Mutex<HashMap<SocketAddr, PeerLink>>>,
    clients: Arc<Mutex<HashMap<SocketAddr, Sender<String>>>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Hub {
    pub fn new(node_id: &str, dial_targets: Vec<String>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            node_id: Arc::new(node_id.to_string()),
            dial_targets: Arc::new(dial_targets),
            peers: Arc::new(Mutex::new(HashMap::new())),
            clients: Arc::new(Mutex::new(HashMap::new())),
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// This node's identity; stable for the process lifetime.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Configured peer addresses to dial at startup.
    pub fn dial_targets(&self) -> &[String] {
        &self.dial_targets
    }

    /// Signal watched by the acceptors; flips to true exactly once.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Register an established peer link. A link arriving after shutdown has
    /// begun is closed instead of registered.
    pub async fn add_peer(&self, link: PeerLink) {
        if self.is_shutting_down() {
            link.close();
            return;
        }
        let addr = link.addr();
        self.peers.lock().await.insert(addr, link);
        emit_network_event(
            NetComponent::Hub,
            LogLevel::Info,
            "peer_added",
            Some(addr.to_string()),
            None,
            true,
        );
    }

    /// Deregister a peer link. No-op when the link is not a member, so the
    /// closure path and an explicit close may both call it.
    pub async fn remove_peer(&self, link: &PeerLink) {
        if self.peers.lock().await.remove(&link.addr()).is_some() {
            emit_network_event(
                NetComponent::Hub,
                LogLevel::Info,
                "peer_removed",
                Some(link.addr().to_string()),
                None,
                true,
            );
        }
    }

    pub async fn add_client(&self, addr: SocketAddr, sender: Sender<String>) {
        if self.is_shutting_down() {
            return;
        }
        self.clients.lock().await.insert(addr, sender);
        emit_network_event(
            NetComponent::Hub,
            LogLevel::Info,
            "client_added",
            Some(addr.to_string()),
            None,
            true,
        );
    }

    /// No-op when the client is not a member.
    pub async fn remove_client(&self, addr: &SocketAddr) {
        if self.clients.lock().await.remove(addr).is_some() {
            emit_network_event(
                NetComponent::Hub,
                LogLevel::Info,
                "client_removed",
                Some(addr.to_string()),
                None,
                true,
            );
        }
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Route raw text posted by a local client: wrap it in a message tagged
    /// with this node as origin, broadcast to every client (including the
    /// originator), then forward to every peer with no exclusion.
    pub async fn route_from_client(&self, raw_text: &str, source: SocketAddr) {
        let sender = format!("user@{}", source);
        let msg = ChatMessage::new(&sender, raw_text, &self.node_id);
        let frame = msg.to_json();
        emit_network_event(
            NetComponent::Hub,
            LogLevel::Info,
            "client_message",
            Some(source.to_string()),
            Some(msg.to_string()),
            true,
        );
        self.broadcast_to_clients(&frame).await;
        self.forward_to_peers(&frame, None).await;
    }

    /// Route a message received from a peer link.
    ///
    /// Loop suppression: a message whose origin is this node has circulated
    /// full-circle and is discarded without broadcasting or forwarding.
    /// Otherwise every client gets it and every peer except the sending
    /// link. Suppression is keyed on origin identity only, so a mesh with a
    /// cycle longer than the one-hop echo excluded here can still deliver a
    /// message more than once; deployments wanting at-most-once delivery
    /// must keep the peer topology acyclic (star or tree).
    pub async fn route_from_peer(&self, msg: ChatMessage, source: &PeerLink) {
        if msg.origin_node_id == *self.node_id {
            emit_network_event(
                NetComponent::Hub,
                LogLevel::Debug,
                "loop_suppressed",
                Some(source.addr().to_string()),
                Some(format!("origin={}", msg.origin_node_id)),
                false,
            );
            return;
        }
        emit_network_event(
            NetComponent::Hub,
            LogLevel::Info,
            "peer_message",
            Some(source.addr().to_string()),
            Some(msg.to_string()),
            true,
        );
        let frame = msg.to_json();
        self.broadcast_to_clients(&frame).await;
        self.forward_to_peers(&frame, Some(source.addr())).await;
    }

    /// Push one frame to every connected client. A send that fails because
    /// the client is slow or mid-teardown is tolerated as a no-op; partial
    /// delivery to the remaining clients always proceeds.
    async fn broadcast_to_clients(&self, frame: &str) {
        let clients = self.clients.lock().await;
        for (addr, sender) in clients.iter() {
            if let Err(e) = sender.try_send(frame.to_string()) {
                emit_network_event(
                    NetComponent::Hub,
                    LogLevel::Debug,
                    "client_send_dropped",
                    Some(addr.to_string()),
                    Some(e.to_string()),
                    false,
                );
            }
        }
    }

    /// Forward one frame to every peer link except `exclude` (the link the
    /// message arrived on, to prevent the one-hop echo).
    async fn forward_to_peers(&self, frame: &str, exclude: Option<SocketAddr>) {
        let peers = self.peers.lock().await;
        for (addr, link) in peers.iter() {
            if Some(*addr) == exclude {
                continue;
            }
            link.send(frame);
        }
    }

    /// Close every peer link, stop both acceptors and forget all clients.
    /// Idempotent; does not wait for in-flight routing beyond best effort.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let links: Vec<PeerLink> = self.peers.lock().await.drain().map(|(_, l)| l).collect();
        for link in &links {
            link.close();
        }
        self.clients.lock().await.clear();
        emit_network_event(
            NetComponent::Hub,
            LogLevel::Info,
            "shutdown",
            None,
            Some(format!("closed_links={}", links.len())),
            true,
        );
    }
}
