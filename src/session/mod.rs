//! Session data model and arbitration.
//!
//! [`registry`] owns every connected agent's state behind a generational
//! handle. [`arbiter`] recomputes the single active agent and describes the
//! reconciliation a transition requires. [`info`] is the trait seam to the
//! (external, opaque) session-info provider.

pub mod arbiter;
pub mod info;
pub mod registry;

pub use arbiter::{Arbiter, Reconciliation};
pub use info::{LogindSessionInfo, NullSessionInfo, SessionInfoProvider};
pub use registry::{AgentConnection, AgentHandle, AgentRegistry};
