//! File-transfer registry: maps a 32-bit transfer id to its owning agent
//! connection (spec §3 `Transfer registry`, §4.6).

use std::collections::HashMap;

use crate::session::AgentHandle;

/// Terminal and non-terminal result codes carried in `FILE_XFER_STATUS`.
/// `CanSendData` is the only non-terminal one; receiving it is what causes
/// an entry to be inserted (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    CanSendData,
    Cancelled,
    Error,
    Success,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::CanSendData)
    }

    /// Map from the wire `result` field. Unrecognized codes are treated as
    /// terminal so a stuck registry entry can never outlive its transfer.
    pub fn from_wire(code: u32) -> Self {
        match code {
            0 => Self::Success,
            2 => Self::CanSendData,
            3 => Self::Cancelled,
            _ => Self::Error,
        }
    }

    pub fn to_wire(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::Error => 1,
            Self::CanSendData => 2,
            Self::Cancelled => 3,
        }
    }
}

/// Owns the id → connection mapping. Invariant I4: every id present maps to
/// a currently connected agent — enforced by removing entries eagerly on
/// disconnect ([`TransferRegistry::cancel_owned_by`]) rather than relying on
/// lazy invalidation.
#[derive(Debug, Default)]
pub struct TransferRegistry {
    owners: HashMap<u32, AgentHandle>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `owner` can accept data for `id` (status `CanSendData`).
    pub fn insert(&mut self, id: u32, owner: AgentHandle) {
        self.owners.insert(id, owner);
    }

    /// A terminal status removes the entry regardless of who reported it.
    pub fn remove(&mut self, id: u32) -> Option<AgentHandle> {
        self.owners.remove(&id)
    }

    pub fn owner(&self, id: u32) -> Option<AgentHandle> {
        self.owners.get(&id).copied()
    }

    /// Apply a freshly observed status: insert on `CanSendData`, remove on
    /// any terminal status (spec §4.4).
    pub fn apply_status(&mut self, id: u32, owner: AgentHandle, status: TransferStatus) {
        if status.is_terminal() {
            self.owners.remove(&id);
        } else {
            self.owners.insert(id, owner);
        }
    }

    /// On agent disconnect: every id owned by `handle` must be cancelled
    /// upstream and purged before the connection record is freed (spec
    /// §4.6, §9 — this must run before the arbiter sees the disconnect, to
    /// avoid referencing freed session state).
    pub fn cancel_owned_by(&mut self, handle: AgentHandle) -> Vec<u32> {
        let ids: Vec<u32> = self
            .owners
            .iter()
            .filter(|(_, owner)| **owner == handle)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.owners.remove(id);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AgentConnection, AgentRegistry};

    #[test]
    fn can_send_data_inserts_then_terminal_status_removes() {
        let mut registry = AgentRegistry::new();
        let agent = registry.insert(AgentConnection::new(None));
        let mut transfers = TransferRegistry::new();

        transfers.apply_status(7, agent, TransferStatus::CanSendData);
        assert_eq!(transfers.owner(7), Some(agent));

        transfers.apply_status(7, agent, TransferStatus::Success);
        assert_eq!(transfers.owner(7), None);
    }

    #[test]
    fn disconnect_cancels_only_that_agents_transfers() {
        let mut registry = AgentRegistry::new();
        let a = registry.insert(AgentConnection::new(None));
        let b = registry.insert(AgentConnection::new(None));
        let mut transfers = TransferRegistry::new();
        transfers.insert(1, a);
        transfers.insert(2, b);

        let cancelled = transfers.cancel_owned_by(a);
        assert_eq!(cancelled, vec![1]);
        assert_eq!(transfers.owner(1), None);
        assert_eq!(transfers.owner(2), Some(b));
    }

    #[test]
    fn unknown_status_code_is_treated_as_terminal() {
        assert!(TransferStatus::from_wire(99).is_terminal());
    }
}
