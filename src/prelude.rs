//! ChatMesh public prelude (curated stable-intent exports).
//! Import with: `use chatmesh::prelude::*;`

pub use crate::config::Config;
pub use crate::network::hub::Hub;
pub use crate::network::message::{ChatMessage, ProtocolError};
pub use crate::network::peer_link::{LinkState, PeerLink};
