// src/network/dialer.rs

use tokio::net::TcpStream;

use crate::constants::DIAL_DELAY;
use crate::events::model::LogLevel;
use crate::network::events::{emit_network_event, NetComponent};
use crate::network::hub::Hub;
use crate::network::peer_link::PeerLink;

/// Dial every configured peer address, one task per target, after a short
/// fixed delay. Each address gets exactly one attempt: a failed dial is
/// logged and abandoned, and a link lost later is not re-established. The
/// mesh does not self-heal; re-establishing a lost peer requires external
/// intervention (restart).
pub fn connect_to_peers(hub: &Hub) {
    for addr in hub.dial_targets() {
        let addr = addr.clone();
        let hub = hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DIAL_DELAY).await;
            if hub.is_shutting_down() {
                return;
            }
            emit_network_event(
                NetComponent::Dialer,
                LogLevel::Info,
                "dial_start",
                Some(addr.clone()),
                None,
                true,
            );
            match TcpStream::connect(&addr).await {
                Ok(stream) => match PeerLink::open(stream) {
                    Ok((link, reader)) => {
                        emit_network_event(
                            NetComponent::Dialer,
                            LogLevel::Info,
                            "dial_success",
                            Some(addr),
                            None,
                            true,
                        );
                        hub.add_peer(link.clone()).await;
                        tokio::spawn(link.run_read_loop(reader, hub.clone()));
                    }
                    Err(e) => {
                        emit_network_event(
                            NetComponent::Dialer,
                            LogLevel::Warn,
                            "dial_open_failed",
                            Some(addr),
                            Some(e.to_string()),
                            true,
                        );
                    }
                },
                Err(e) => {
                    emit_network_event(
                        NetComponent::Dialer,
                        LogLevel::Warn,
                        "dial_failed",
                        Some(addr),
                        Some(e.to_string()),
                        true,
                    );
                }
            }
        });
    }
}
