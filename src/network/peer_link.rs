// src/network/peer_link.rs

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::constants::{MAX_FRAME_BYTES, SEND_QUEUE_CAPACITY};
use crate::events::model::LogLevel;
use crate::network::events::{emit_network_event, NetComponent};
use crate::network::hub::Hub;
use crate::network::message::ChatMessage;

/// Lifecycle of one mesh edge. `Closed` is terminal; a link that fails to
/// dial never reaches `Active` because it is never constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Active,
    Closed,
}

/// Buffered read half handed back by [`PeerLink::open`]; the caller feeds it
/// to [`PeerLink::run_read_loop`].
pub type LinkReader = BufReader<OwnedReadHalf>;

/// One bidirectional byte-stream connection to exactly one remote node.
///
/// The Hub holds the only registered copy inside its peer set. Cheap to
/// clone: all clones share the same state, outbound queue and close signal.
/// Outbound frames go through a bounded mpsc queue drained by a dedicated
/// writer task, so `send` never blocks the routing path.
#[derive(Clone)]
pub struct PeerLink {
    addr: SocketAddr,
    state: Arc<Mutex<LinkState>>,
    tx: mpsc::Sender<String>,
    closed_tx: Arc<watch::Sender<bool>>,
}

impl PeerLink {
    /// Wrap an established stream, spawn its writer task and transition to
    /// `Active`. Does not block and does not register the link anywhere;
    /// the caller adds it to the Hub and spawns the read loop.
    pub fn open(stream: TcpStream) -> std::io::Result<(PeerLink, LinkReader)> {
        let addr = stream.peer_addr()?;
        let (read_half, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::channel::<String>(SEND_QUEUE_CAPACITY);
        let (closed_tx, mut closed_rx) = watch::channel(false);

        let link = PeerLink {
            addr,
            state: Arc::new(Mutex::new(LinkState::Connecting)),
            tx,
            closed_tx: Arc::new(closed_tx),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe = rx.recv() => match maybe {
                        Some(frame) => {
                            if let Err(e) = write_half.write_all(frame.as_bytes()).await {
                                emit_network_event(
                                    NetComponent::PeerLink,
                                    LogLevel::Error,
                                    "stream_write_failed",
                                    Some(addr.to_string()),
                                    Some(e.to_string()),
                                    true,
                                );
                                break;
                            }
                            if let Err(e) = write_half.write_all(b"\n").await {
                                emit_network_event(
                                    NetComponent::PeerLink,
                                    LogLevel::Error,
                                    "stream_newline_failed",
                                    Some(addr.to_string()),
                                    Some(e.to_string()),
                                    true,
                                );
                                break;
                            }
                        }
                        None => break,
                    },
                    changed = closed_rx.changed() => {
                        if changed.is_err() || *closed_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            let _ = write_half.shutdown().await;
        });

        *link.state.lock() = LinkState::Active;
        Ok((link, BufReader::new(read_half)))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock()
    }

    /// Queue one framed message for this peer. Silent no-op once the link is
    /// closing or closed, and on backpressure: the link is either about to be
    /// removed or too slow, and neither may stall delivery to other
    /// destinations or surface an error to the router.
    pub fn send(&self, frame: &str) {
        if self.state() == LinkState::Closed {
            return;
        }
        if let Err(e) = self.tx.try_send(frame.to_string()) {
            emit_network_event(
                NetComponent::PeerLink,
                LogLevel::Debug,
                "send_dropped",
                Some(self.addr.to_string()),
                Some(e.to_string()),
                false,
            );
        }
    }

    /// Idempotent: the first call marks the link `Closed` and wakes the
    /// writer task so the stream is released; later calls do nothing.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == LinkState::Closed {
                return;
            }
            *state = LinkState::Closed;
        }
        let _ = self.closed_tx.send(true);
        emit_network_event(
            NetComponent::PeerLink,
            LogLevel::Info,
            "link_closed",
            Some(self.addr.to_string()),
            None,
            true,
        );
    }

    /// Dedicated per-connection read loop. Reads newline-delimited frames
    /// until end-of-stream, I/O error or explicit close; each well-formed
    /// frame is routed synchronously before the next read so delivery order
    /// per peer follows arrival order. A malformed frame is dropped and the
    /// connection stays open. On any exit path the link transitions to
    /// `Closed` exactly once and deregisters itself from the Hub.
    pub async fn run_read_loop(self, mut reader: LinkReader, hub: Hub) {
        let mut closed_rx = self.closed_tx.subscribe();
        // `subscribe` marks the current value as seen; a link closed before
        // this point (e.g. refused during shutdown) would otherwise sit in
        // the read until the remote hangs up.
        if self.state() == LinkState::Closed {
            hub.remove_peer(&self).await;
            return;
        }
        emit_network_event(
            NetComponent::PeerLink,
            LogLevel::Info,
            "read_loop_start",
            Some(self.addr.to_string()),
            None,
            true,
        );
        let mut line = String::new();
        loop {
            line.clear();
            let mut limited = (&mut reader).take(MAX_FRAME_BYTES);
            tokio::select! {
                read = limited.read_line(&mut line) => match read {
                    Ok(0) => {
                        emit_network_event(
                            NetComponent::PeerLink,
                            LogLevel::Info,
                            "peer_disconnected",
                            Some(self.addr.to_string()),
                            None,
                            true,
                        );
                        break;
                    }
                    Ok(n) if n as u64 >= MAX_FRAME_BYTES && !line.ends_with('\n') => {
                        emit_network_event(
                            NetComponent::PeerLink,
                            LogLevel::Warn,
                            "frame_too_long",
                            Some(self.addr.to_string()),
                            Some(format!("dropped {} bytes", n)),
                            true,
                        );
                    }
                    Ok(_) => match ChatMessage::from_json(line.trim()) {
                        Ok(msg) => hub.route_from_peer(msg, &self).await,
                        Err(e) => {
                            emit_network_event(
                                NetComponent::PeerLink,
                                LogLevel::Warn,
                                "message_invalid",
                                Some(self.addr.to_string()),
                                Some(e.to_string()),
                                true,
                            );
                        }
                    },
                    Err(e) => {
                        emit_network_event(
                            NetComponent::PeerLink,
                            LogLevel::Error,
                            "peer_read_error",
                            Some(self.addr.to_string()),
                            Some(e.to_string()),
                            true,
                        );
                        break;
                    }
                },
                _ = closed_rx.changed() => {
                    if *closed_rx.borrow() {
                        break;
                    }
                }
            }
        }
        self.close();
        hub.remove_peer(&self).await;
    }
}
