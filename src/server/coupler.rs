//! The tablet/channel coupler (spec §4.5): keeps the synthetic tablet device
//! and the active-agent clipboard/monitors state in lockstep with the
//! arbiter's notion of the single active agent. Written as a handful of
//! plain async functions operating on [`Daemon`], not a callback chain
//! (spec §9 Design Notes).

use tracing::{info, warn};

use crate::protocol::agent::AgentMessageType;
use crate::protocol::capabilities::CapabilitySet;
use crate::protocol::host::{HostMessage, HostMessageType};
use crate::session::{AgentHandle, Reconciliation};

use super::host_channel::VirtioPortChannel;
use super::Daemon;

impl Daemon {
    /// Recompute the active agent and, if it changed, carry out the full
    /// reconciliation sequence atomically with respect to the rest of the
    /// event loop (spec §5's atomicity guarantee: no other event is processed
    /// mid-reconciliation because this is all one `.await`-chain on the
    /// single-threaded executor).
    pub(crate) async fn reconcile_active(&mut self) {
        let provider = self.session_info.as_deref();
        let owned = self.clipboard_owned.owned_for_release();
        let recon = self.arbiter.recompute(&self.registry, provider, &owned).await;
        if let Some(recon) = recon {
            self.apply_reconciliation(recon).await;
        }
    }

    async fn apply_reconciliation(&mut self, recon: Reconciliation) {
        for selection in &recon.released_selections {
            let msg = HostMessage::ClipboardRelease { selection: *selection };
            if let Err(e) = self.send_host(HostMessageType::ClipboardRelease, 0, &msg).await {
                warn!(error = %e, "failed to announce clipboard release on active-agent change");
            }
        }
        self.clipboard_owned.clear_all();

        match recon.new_active {
            Some(handle) => {
                self.sync_tablet_to(handle).await;
                self.sync_host_channel_to(handle).await;
                if recon.disable_file_xfer {
                    self.send_agent(handle, AgentMessageType::FileXferDisable, 0, 0, &[]).await;
                }
                if recon.replay_monitors {
                    self.replay_monitors_to_active().await;
                }
            }
            None => {
                if !self.config.static_tablet {
                    self.tablet.close();
                }
                self.close_host_channel().await;
            }
        }
    }

    /// Resync the tablet and host channel to whichever agent is currently
    /// active, e.g. after a resolution report from that agent (the screen
    /// list can go from empty to non-empty well after the agent became
    /// active).
    pub(crate) async fn sync_tablet_to_active(&mut self) {
        if let Some(handle) = self.arbiter.active() {
            self.sync_tablet_to(handle).await;
            self.sync_host_channel_to(handle).await;
        }
    }

    /// Re-resolve the host channel against whichever agent is currently
    /// active, without requiring a fresh reconciliation. Used to retry after
    /// a transport-level drop while the active agent hasn't changed.
    pub(crate) async fn sync_host_channel_to_active(&mut self) {
        if let Some(handle) = self.arbiter.active() {
            self.sync_host_channel_to(handle).await;
        }
    }

    /// Open the host channel if `handle` is active with a reported,
    /// non-empty screen list and the channel isn't already open (invariant:
    /// host channel open iff active agent with a non-empty screen list). On
    /// first open, announces capabilities unsolicited with `request=1` (spec
    /// §4.2).
    async fn sync_host_channel_to(&mut self, handle: AgentHandle) {
        let Some(conn) = self.registry.get(handle) else { return };
        if !conn.has_resolution() || self.host_channel.is_some() {
            return;
        }
        match VirtioPortChannel::open(&self.config.virtio_port_path).await {
            Ok(channel) => {
                info!("host channel opened");
                self.host_channel = Some(Box::new(channel));
                let announce = HostMessage::AnnounceCapabilities {
                    request: true,
                    caps: CapabilitySet::ours(),
                };
                if let Err(e) = self.send_host(HostMessageType::AnnounceCapabilities, 0, &announce).await {
                    warn!(error = %e, "failed to send initial capability announcement");
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to open host channel for newly active agent, will retry");
            }
        }
    }

    /// Close the host channel once there is no longer an active agent
    /// (invariant: host channel open iff active agent with a non-empty
    /// screen list).
    async fn close_host_channel(&mut self) {
        if let Some(mut channel) = self.host_channel.take() {
            let _ = channel.flush().await;
            info!("host channel closed, no active agent");
        }
    }

    async fn sync_tablet_to(&mut self, handle: AgentHandle) {
        let Some(conn) = self.registry.get(handle) else { return };
        if !conn.has_resolution() {
            return;
        }
        let (width, height, screens) = (conn.width, conn.height, conn.screens.clone());
        if let Err(e) = self.tablet.open_or_resize(width, height, &screens) {
            warn!(error = %e, "failed to open/resize tablet for newly active agent");
        }
    }
}
