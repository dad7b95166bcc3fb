//! cbx-client: the cipherbox client surface.
//!
//! The server is an untrusted blob store plus a task queue; everything it
//! holds is ciphertext produced by cbx-crypto. This crate provides:
//!
//! - `RemoteStore` / `NotifyTransport` — the external storage and
//!   notification-channel boundaries (the real HTTP/WebSocket transports
//!   live outside this crate; `MemoryStore` is the in-process reference
//!   implementation used by tests)
//! - capability clients: `AccountClient`, `ItemClient`, `FileClient`,
//!   `TaskClient` (owner side), `WorkerClient` (worker side)
//! - `CbxClient` — explicit composition of the capability clients over one
//!   shared store handle
//! - `bundle` — offline item bundles (produce and import)

pub mod account;
pub mod bundle;
pub mod client;
pub mod file;
pub mod item;
pub mod memory;
pub mod notify;
pub mod store;
pub mod task;
pub mod token;
pub mod worker;

pub use account::{AccountClient, Session};


pub use client::CbxClient;
pub use memory::MemoryStore;
pub use store::RemoteStore;
pub use worker::WorkerClient;
