// src/network/listener.rs

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::constants::{DEFAULT_APP_NAME, MAX_FRAME_BYTES, SEND_QUEUE_CAPACITY};
use crate::events::model::LogLevel;
use crate::network::events::{emit_network_event, NetComponent};
use crate::network::hub::Hub;
use crate::network::peer_link::PeerLink;

/// Bind an acceptor socket. Failing to bind is the one unrecoverable
/// startup error; the caller aborts the process on it.
pub async fn bind(addr: &str) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    emit_network_event(
        NetComponent::Listener,
        LogLevel::Info,
        "listener_bind",
        Some(addr.to_string()),
        None,
        true,
    );
    Ok(listener)
}

/// Accept inbound peer links until the hub shuts down. Every accepted
/// stream becomes an `Active` link registered with the hub, with its read
/// loop on its own task.
pub async fn run_peer_listener(listener: TcpListener, hub: Hub) {
    let mut shutdown = hub.shutdown_signal();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    emit_network_event(
                        NetComponent::Listener,
                        LogLevel::Info,
                        "peer_incoming",
                        Some(peer_addr.to_string()),
                        None,
                        true,
                    );
                    match PeerLink::open(stream) {
                        Ok((link, reader)) => {
                            hub.add_peer(link.clone()).await;
                            tokio::spawn(link.run_read_loop(reader, hub.clone()));
                        }
                        Err(e) => {
                            emit_network_event(
                                NetComponent::Listener,
                                LogLevel::Error,
                                "peer_open_failed",
                                Some(peer_addr.to_string()),
                                Some(e.to_string()),
                                true,
                            );
                        }
                    }
                }
                Err(e) => {
                    emit_network_event(
                        NetComponent::Listener,
                        LogLevel::Error,
                        "accept_failed",
                        None,
                        Some(e.to_string()),
                        true,
                    );
                }
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    emit_network_event(
        NetComponent::Listener,
        LogLevel::Info,
        "peer_listener_stopped",
        None,
        None,
        true,
    );
}

/// Accept local client connections until the hub shuts down.
pub async fn run_client_listener(listener: TcpListener, hub: Hub) {
    let mut shutdown = hub.shutdown_signal();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    emit_network_event(
                        NetComponent::Listener,
                        LogLevel::Info,
                        "client_incoming",
                        Some(peer_addr.to_string()),
                        None,
                        true,
                    );
                    tokio::spawn(handle_client(stream, peer_addr, hub.clone()));
                }
                Err(e) => {
                    emit_network_event(
                        NetComponent::Listener,
                        LogLevel::Error,
                        "accept_failed",
                        None,
                        Some(e.to_string()),
                        true,
                    );
                }
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    emit_network_event(
        NetComponent::Listener,
        LogLevel::Info,
        "client_listener_stopped",
        None,
        None,
        true,
    );
}

/// Per-client connection task: register, greet, then feed every line to the
/// hub in arrival order. Deregisters on every exit path so the membership
/// set never keeps a stale handle.
async fn handle_client(stream: TcpStream, peer_addr: SocketAddr, hub: Hub) {
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<String>(SEND_QUEUE_CAPACITY);

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write_half.write_all(frame.as_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(b"\n").await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let _ = tx.try_send(format!("Welcome to {} {}!", DEFAULT_APP_NAME, hub.node_id()));
    hub.add_client(peer_addr, tx).await;

    let mut reader = BufReader::new(read_half);
    let mut shutdown = hub.shutdown_signal();
    let mut line = String::new();
    loop {
        line.clear();
        let mut limited = (&mut reader).take(MAX_FRAME_BYTES);
        tokio::select! {
            read = limited.read_line(&mut line) => match read {
                Ok(0) => break,
                Ok(n) if n as u64 >= MAX_FRAME_BYTES && !line.ends_with('\n') => {
                    emit_network_event(
                        NetComponent::Listener,
                        LogLevel::Warn,
                        "frame_too_long",
                        Some(peer_addr.to_string()),
                        Some(format!("dropped {} bytes", n)),
                        true,
                    );
                }
                Ok(_) => {
                    let text = line.trim();
                    if !text.is_empty() {
                        hub.route_from_client(text, peer_addr).await;
                    }
                }
                Err(e) => {
                    emit_network_event(
                        NetComponent::Listener,
                        LogLevel::Error,
                        "client_read_error",
                        Some(peer_addr.to_string()),
                        Some(e.to_string()),
                        true,
                    );
                    break;
                }
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    hub.remove_client(&peer_addr).await;
    emit_network_event(
        NetComponent::Listener,
        LogLevel::Info,
        "client_disconnected",
        Some(peer_addr.to_string()),
        None,
        true,
    );
}
