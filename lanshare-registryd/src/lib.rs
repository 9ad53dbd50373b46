//! Standalone rendezvous server: a stateless peer of the rest of the
//! system, exposing register/unregister/heartbeat/list endpoints so hosts
//! on different subnets can discover each other when link-local broadcast
//! is blocked.

pub mod config;
pub mod server;
pub mod web;

pub use config::RegistryConfig;
pub use server::{RegisteredPeer, RegistryState};
