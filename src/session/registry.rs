//! The connection registry: exclusive owner of every connected agent's
//! state (spec §3, `Agent connection record`).
//!
//! Transfer ids and the active-agent handle need a way to refer to a
//! connection that remains valid (or is detectably stale) across
//! disconnects. Rather than store a raw pointer or index into a `Vec` that
//! can be reused by an unrelated later connection — the bug class the
//! original daemon's pointer-identity transfer table is exposed to — we use
//! a generational handle: index + generation. A stale handle's generation
//! will not match the slot's current generation, so lookups report "not
//! found" instead of aliasing a newer connection (spec §9, Design Notes).

use crate::protocol::agent::ScreenRect;

/// A stable reference to an [`AgentConnection`] in an [`AgentRegistry`].
/// Remains comparable and copyable after the connection it named is
/// removed; such a handle simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentHandle {
    index: u32,
    generation: u32,
}

/// Per-connection state, owned exclusively by the registry (spec §3).
#[derive(Debug, Clone)]
pub struct AgentConnection {
    /// Session id resolved from the peer pid at accept time, or `None` if
    /// no session-info provider is active.
    pub session_id: Option<String>,
    pub width: u32,
    pub height: u32,
    pub screens: Vec<ScreenRect>,
}

impl AgentConnection {
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            session_id,
            width: 0,
            height: 0,
            screens: Vec::new(),
        }
    }

    /// A resolution has been reported and is non-degenerate (spec §4.5
    /// coupler: "non-empty screen list").
    pub fn has_resolution(&self) -> bool {
        !self.screens.is_empty()
    }
}

struct Slot {
    generation: u32,
    connection: Option<AgentConnection>,
}

/// Owns every connected agent's [`AgentConnection`], addressed by
/// [`AgentHandle`].
#[derive(Debug, Default)]
pub struct AgentRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted connection, returning its handle.
    pub fn insert(&mut self, connection: AgentConnection) -> AgentHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.connection = Some(connection);
            AgentHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                connection: Some(connection),
            });
            AgentHandle { index, generation: 0 }
        }
    }

    /// Remove and return a connection. Invalidates `handle` for future
    /// lookups (its generation is retired).
    pub fn remove(&mut self, handle: AgentHandle) -> Option<AgentConnection> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let removed = slot.connection.take();
        if removed.is_some() {
            self.free.push(handle.index);
        }
        removed
    }

    pub fn get(&self, handle: AgentHandle) -> Option<&AgentConnection> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.connection.as_ref()
    }

    pub fn get_mut(&mut self, handle: AgentHandle) -> Option<&mut AgentConnection> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.connection.as_mut()
    }

    /// Is `handle` still valid (i.e. does it name a currently connected
    /// agent)? Used to enforce invariant I4 on the transfer registry.
    pub fn contains(&self, handle: AgentHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgentHandle, &AgentConnection)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.connection.as_ref().map(|c| {
                (
                    AgentHandle {
                        index: i as u32,
                        generation: slot.generation,
                    },
                    c,
                )
            })
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_after_remove_and_reinsert_does_not_resolve() {
        let mut registry = AgentRegistry::new();
        let first = registry.insert(AgentConnection::new(Some("S1".into())));
        registry.remove(first);
        let second = registry.insert(AgentConnection::new(Some("S2".into())));

        assert_eq!(first.index, second.index, "slot must be reused");
        assert!(registry.get(first).is_none(), "stale handle must not resolve");
        assert_eq!(
            registry.get(second).unwrap().session_id.as_deref(),
            Some("S2")
        );
    }

    #[test]
    fn len_tracks_live_connections_across_reuse() {
        let mut registry = AgentRegistry::new();
        let a = registry.insert(AgentConnection::new(None));
        let _b = registry.insert(AgentConnection::new(None));
        assert_eq!(registry.len(), 2);
        registry.remove(a);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn iter_only_yields_live_connections() {
        let mut registry = AgentRegistry::new();
        let a = registry.insert(AgentConnection::new(Some("A".into())));
        let _b = registry.insert(AgentConnection::new(Some("B".into())));
        registry.remove(a);
        let sessions: Vec<_> = registry
            .iter()
            .map(|(_, c)| c.session_id.clone().unwrap())
            .collect();
        assert_eq!(sessions, vec!["B".to_string()]);
    }
}
