pub mod dialer;
pub(crate) mod events;
pub mod hub;
pub mod listener;
pub mod message;
pub mod peer_link;

pub use dialer::connect_to_peers;
pub use hub::Hub;
pub use listener::{bind, run_client_listener, run_peer_listener};
pub use message::{ChatMessage, ProtocolError};
pub use peer_link::{LinkState, PeerLink};
