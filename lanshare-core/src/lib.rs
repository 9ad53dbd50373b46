//! Peer-presence and resource-coordination engine for a LAN collaboration
//! daemon: tracks who is online across two independent discovery axes,
//! keeps an authoritative shared-resource catalog, and carries the
//! announcement/ACL/revocation protocol layered on top of a single UDP
//! endpoint. File transfer, clipboard, and interactive UI are external
//! collaborators — see [`transfer`] for the one seam this crate exposes.

pub mod announce;
pub mod config;
pub mod credentials;
pub mod demux;
pub mod discovery;
pub mod engine;
pub mod message;
pub mod peer;
pub mod protocol;
pub mod resource;
pub mod transfer;

pub use config::Config;
pub use engine::{Engine, EngineError};
pub use message::{conversation_id, Message, MessageChannel};
pub use peer::{Peer, PeerTable};
pub use protocol::{AccessUpdate, FileSharePacket, Packet};
pub use resource::{ResourceCatalog, SharedResource};
