//! Wire protocols
//!
//! Two independent framings meet at the daemon:
//!
//! - [`host`]: the fixed `{protocol, type, opaque, size}` header used by the
//!   virtio serial channel to the host's remote-desktop client.
//! - [`agent`]: the `{type, arg1, arg2, size}` header used by the local
//!   stream socket to per-session user agents.
//!
//! [`capabilities`] tracks the negotiated capability bitset that governs the
//! clipboard-family selection prefix and the feature set advertised back to
//! the host. [`codec`] contains the byte-swap and size-validation rules
//! shared by both directions of the host channel.

pub mod agent;
pub mod capabilities;
pub mod codec;
pub mod error;
pub mod host;

pub use error::ProtocolError;
