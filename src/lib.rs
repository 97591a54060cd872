//! # guestrelayd
//!
//! Privileged host-side guest agent daemon. Bridges the host's
//! remote-desktop client, carried over a virtio serial channel, to whichever
//! user-session agent is currently active, over a local per-session stream
//! socket.
//!
//! # Architecture
//!
//! ```text
//! guestrelayd
//!   ├─> Host channel (virtio serial, length-prefixed typed messages)
//!   ├─> Agent listener (unix stream socket, one connection per session)
//!   ├─> Session arbiter (picks the single active agent)
//!   ├─> Clipboard bridge (ownership vector, selection routing)
//!   ├─> File-transfer registry (id -> owning agent)
//!   └─> Tablet sink (synthetic absolute pointer into the guest kernel)
//! ```
//!
//! # Data Flow
//!
//! **Pointer path:** Host -> tablet sink (direct, bypasses agents)
//!
//! **Clipboard/monitors/transfer path:** Host <-> arbiter's active agent

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Clipboard ownership tracking and host/agent clipboard message shapes.
pub mod clipboard;

/// Configuration loading, defaults, and CLI overrides.
pub mod config;

/// Host and agent wire protocols.
pub mod protocol;

/// The daemon context and its event loop.
pub mod server;

/// Connection registry, active-session arbiter, and session-info seam.
pub mod session;

/// The synthetic tablet (pointer) device seam.
pub mod tablet;

/// The file-transfer id -> owning-agent registry.
pub mod transfer;

pub use config::Config;
pub use server::Daemon;
