//! The session arbiter: chooses the single active agent and describes the
//! reconciliation that must follow any change (spec §4.5).
//!
//! Kept as a pure decision function over the registry and the session-info
//! provider's answers, returning a [`Reconciliation`] describing what the
//! caller (the event loop) must do, rather than performing I/O itself —
//! this is what spec §9's "coupler as a function, not a chain of callbacks"
//! note asks for, generalized to the whole arbiter.

use tracing::warn;

use super::info::SessionInfoProvider;
use super::registry::{AgentHandle, AgentRegistry};

/// Everything the caller must do, in order, after an active-agent
/// transition, before resuming the event loop (spec §5 atomicity
/// guarantee).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// The agent that is now active (`None` if there is none).
    pub new_active: Option<AgentHandle>,
    /// Send `FILE_XFER_DISABLE` to `new_active` (set when the new active
    /// agent's session is not a human-user session).
    pub disable_file_xfer: bool,
    /// Replay the cached monitors config to `new_active`, if one exists and
    /// a config is cached (the caller checks the cache; this just signals
    /// that a transition happened).
    pub replay_monitors: bool,
    /// Selections to emit `CLIPBOARD_RELEASE` for upstream before clearing
    /// the ownership vector.
    pub released_selections: Vec<u8>,
}

/// Tracks the current active agent and recomputes it on demand.
#[derive(Debug, Default)]
pub struct Arbiter {
    active: Option<AgentHandle>,
}

impl Arbiter {
    pub fn new() -> Self {
        Self { active: None }
    }

    pub fn active(&self) -> Option<AgentHandle> {
        self.active
    }

    /// Recompute the active agent after a connect, a disconnect, or a
    /// session-provider change notification. Returns `None` if the active
    /// agent does not change (spec §4.5 step 4).
    pub async fn recompute(
        &mut self,
        registry: &AgentRegistry,
        provider: Option<&dyn SessionInfoProvider>,
        owned_selections: &[u8],
    ) -> Option<Reconciliation> {
        let candidate = match provider {
            Some(provider) => match provider.active_session().await {
                Some(session) => self.pick_for_session(registry, &session),
                None => None,
            },
            None => self.pick_sole_connected(registry),
        };

        if candidate == self.active {
            return None;
        }
        self.active = candidate;

        let disable_file_xfer = match (candidate, provider) {
            (Some(handle), Some(provider)) => match registry.get(handle).and_then(|c| c.session_id.as_deref()) {
                Some(session) => !provider.is_human_session(session).await,
                None => false,
            },
            _ => false,
        };

        Some(Reconciliation {
            new_active: candidate,
            disable_file_xfer,
            replay_monitors: candidate.is_some(),
            released_selections: owned_selections.to_vec(),
        })
    }

    fn pick_for_session(&self, registry: &AgentRegistry, session: &str) -> Option<AgentHandle> {
        let mut candidates = registry
            .iter()
            .filter(|(_, conn)| conn.session_id.as_deref() == Some(session))
            .map(|(handle, _)| handle);

        let first = candidates.next()?;
        if candidates.next().is_some() {
            warn!(session, "more than one agent in the active session; refusing to pick one");
            return None;
        }
        Some(first)
    }

    fn pick_sole_connected(&self, registry: &AgentRegistry) -> Option<AgentHandle> {
        if registry.len() != 1 {
            return None;
        }
        registry.iter().next().map(|(handle, _)| handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::registry::AgentConnection;
    use async_trait::async_trait;

    struct FixedProvider {
        active: Option<String>,
    }

    #[async_trait]
    impl SessionInfoProvider for FixedProvider {
        async fn active_session(&self) -> Option<String> {
            self.active.clone()
        }
        async fn session_for_pid(&self, _pid: u32) -> Option<String> {
            None
        }
        async fn is_human_session(&self, _session_id: &str) -> bool {
            true
        }
        async fn is_locked(&self, _session_id: &str) -> bool {
            false
        }
        async fn changed(&self) {
            std::future::pending::<()>().await;
        }
    }

    #[tokio::test]
    async fn two_agents_same_session_yields_null_active() {
        let mut registry = AgentRegistry::new();
        registry.insert(AgentConnection::new(Some("S".into())));
        registry.insert(AgentConnection::new(Some("S".into())));
        let provider = FixedProvider {
            active: Some("S".into()),
        };

        let mut arbiter = Arbiter::new();
        let recon = arbiter.recompute(&registry, Some(&provider), &[]).await;
        assert!(recon.is_none() || recon.unwrap().new_active.is_none());
        assert_eq!(arbiter.active(), None);
    }

    #[tokio::test]
    async fn single_matching_agent_becomes_active() {
        let mut registry = AgentRegistry::new();
        let handle = registry.insert(AgentConnection::new(Some("S".into())));
        let provider = FixedProvider {
            active: Some("S".into()),
        };

        let mut arbiter = Arbiter::new();
        let recon = arbiter.recompute(&registry, Some(&provider), &[1]).await.unwrap();
        assert_eq!(recon.new_active, Some(handle));
        assert_eq!(recon.released_selections, vec![1]);
        assert!(recon.replay_monitors);
    }

    #[tokio::test]
    async fn unchanged_active_yields_no_reconciliation() {
        let mut registry = AgentRegistry::new();
        registry.insert(AgentConnection::new(Some("S".into())));
        let provider = FixedProvider {
            active: Some("S".into()),
        };

        let mut arbiter = Arbiter::new();
        arbiter.recompute(&registry, Some(&provider), &[]).await;
        let second = arbiter.recompute(&registry, Some(&provider), &[]).await;
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn fallback_mode_picks_sole_connection() {
        let mut registry = AgentRegistry::new();
        let handle = registry.insert(AgentConnection::new(None));

        let mut arbiter = Arbiter::new();
        let recon = arbiter.recompute(&registry, None, &[]).await.unwrap();
        assert_eq!(recon.new_active, Some(handle));
    }
}
