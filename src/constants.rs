//! Central place for application-wide constants and default values.

use std::time::Duration;

/// Default application name shown in logs and the client greeting.
pub const DEFAULT_APP_NAME: &str = "ChatMesh";

/// Left padding used to align log lines with those that include emoji prefixes.
/// Keep this to a fixed width matching the emoji prefix you use elsewhere.
pub const ICON_PLACEHOLDER: &str = "   "; // Three spaces for alignment

/// Protocol version for compatibility checks (bump when wire format changes)
pub const PROTOCOL_VERSION: &str = "1";

/// Application / crate version (populated from Cargo.toml via env! macro)
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default port for local client connections.
pub const DEFAULT_CLIENT_PORT: u16 = 8080;

/// Default port for inbound peer links.
pub const DEFAULT_PEER_PORT: u16 = 9080;

/// Delay before each outbound dial at startup. Both ends of a configured
/// edge usually start at the same time; waiting a beat avoids the worst of
/// the simultaneous-connect race.
pub const DIAL_DELAY: Duration = Duration::from_secs(1);

/// Capacity of the per-connection outbound frame queue. Fan-out uses
/// `try_send`, so a receiver that falls this far behind starts losing
/// frames instead of stalling the router.
pub const SEND_QUEUE_CAPACITY: usize = 64;

/// Upper bound on one inbound newline-delimited frame. A sender that never
/// terminates a line cannot grow the read buffer past this; the partial
/// line is dropped and the connection stays open.
pub const MAX_FRAME_BYTES: u64 = 64 * 1024;

/// Human friendly composite version string used in logs.
pub fn full_version() -> String {
    format!("v{} (protocol={})", APP_VERSION, PROTOCOL_VERSION)
}
