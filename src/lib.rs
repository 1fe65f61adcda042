//! # ChatMesh Core Library
//!
//! One node in a federation of chat relays. The node accepts local client
//! connections and exchanges chat messages with a statically configured set
//! of peer nodes so that a message posted anywhere reaches every client on
//! every node, with origin tagging suppressing full-circle re-delivery.
//!
//! ## Design Principles
//! * Async-first: all I/O paths are non-blocking (Tokio), one task per
//!   connection, strictly sequential processing per inbound stream.
//! * The Hub's two membership sets are the only shared mutable state.
//! * Per-connection failures stay inside that connection's lifecycle;
//!   routing never fails because one destination did.
//! * Static mesh: the peer set is supplied at startup, dialed once, and
//!   never self-heals.
//!
//! ## Key Modules
//! * `config` – Runtime configuration & node identity resolution.
//! * `network` – Message model, Hub routing, peer links, listeners, dialer.
//! * `events` – Structured logging/events dispatcher.

pub mod config;
pub mod constants;
pub mod events;
pub mod network;
pub mod prelude; // curated stable-intent re-exports
