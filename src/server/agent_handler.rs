//! Agent→host routing: what happens to each [`AgentMessage`] that arrives on
//! the per-session agent socket (spec §4.4).

use tracing::{debug, trace, warn};

use crate::protocol::agent::{AgentMessage, AGENT_PROTOCOL_VERSION};
use crate::protocol::host::{HostMessage, HostMessageType};
use crate::session::AgentHandle;
use crate::transfer::TransferStatus;

use super::Daemon;

impl Daemon {
    /// Dispatch one decoded agent message from `handle`.
    pub(crate) async fn on_agent_message(&mut self, handle: AgentHandle, message: AgentMessage) -> anyhow::Result<()> {
        match message {
            AgentMessage::Version(version) => {
                if version != AGENT_PROTOCOL_VERSION {
                    warn!(version, "agent announced unexpected protocol version");
                }
            }

            AgentMessage::GuestXorgResolution { width, height, screens } => {
                if width == 0 && height == 0 {
                    trace!(?handle, "ignoring legacy zero-arg resolution report");
                    return Ok(());
                }
                if let Some(conn) = self.registry.get_mut(handle) {
                    conn.width = width;
                    conn.height = height;
                    conn.screens = screens;
                }
                if self.arbiter.active() == Some(handle) {
                    self.sync_tablet_to_active().await;
                }
            }

            AgentMessage::MonitorsConfig(_bytes) => {
                debug!(?handle, "agent acked monitors config");
            }

            AgentMessage::ClipboardGrab { selection, types } => {
                if !self.is_active(handle) {
                    trace!(?handle, "ignoring clipboard grab from non-active agent");
                    return Ok(());
                }
                let Ok(selection) = u8::try_from(selection) else {
                    return Ok(());
                };
                self.clipboard_owned.grant(selection);
                let msg = HostMessage::ClipboardGrab {
                    selection,
                    types: types_from_bytes(&types),
                };
                self.send_host(HostMessageType::ClipboardGrab, 0, &msg).await?;
            }

            AgentMessage::ClipboardRequest { selection, format } => {
                if !self.is_active(handle) {
                    return Ok(());
                }
                let Ok(selection) = u8::try_from(selection) else {
                    return Ok(());
                };
                let msg = HostMessage::ClipboardRequest { selection, format };
                self.send_host(HostMessageType::ClipboardRequest, 0, &msg).await?;
            }

            AgentMessage::ClipboardData { selection, format, data } => {
                if !self.is_active(handle) {
                    return Ok(());
                }
                let Ok(selection) = u8::try_from(selection) else {
                    return Ok(());
                };
                let data = if self.max_clipboard.exceeds(data.len()) {
                    warn!(len = data.len(), "clipboard payload too large, discarding and sending empty payload upstream");
                    bytes::Bytes::new()
                } else {
                    data
                };
                let msg = HostMessage::ClipboardData { selection, format, data };
                self.send_host(HostMessageType::ClipboardData, 0, &msg).await?;
            }

            AgentMessage::ClipboardRelease { selection } => {
                let Ok(selection) = u8::try_from(selection) else {
                    return Ok(());
                };
                self.clipboard_owned.revoke(selection);
                if self.is_active(handle) {
                    let msg = HostMessage::ClipboardRelease { selection };
                    self.send_host(HostMessageType::ClipboardRelease, 0, &msg).await?;
                }
            }

            AgentMessage::FileXferStart { id, metadata } => {
                let msg = HostMessage::FileXferStart { id, metadata };
                self.send_host(HostMessageType::FileXferStart, 0, &msg).await?;
            }

            AgentMessage::FileXferStatus { id, result } => {
                let status = TransferStatus::from_wire(result);
                self.transfers.apply_status(id, handle, status);
                let msg = HostMessage::FileXferStatus { id, result };
                self.send_host(HostMessageType::FileXferStatus, 0, &msg).await?;
            }

            AgentMessage::FileXferData { id, data } => {
                let msg = HostMessage::FileXferData { id, data };
                self.send_host(HostMessageType::FileXferData, 0, &msg).await?;
            }

            AgentMessage::FileXferDisable => {
                debug!(?handle, "agent reports file transfer disabled");
            }

            AgentMessage::AudioVolumeSync(bytes) => {
                let volume = u16s_from_bytes(&bytes);
                let msg = HostMessage::AudioVolumeSync { mute: false, volume };
                self.send_host(HostMessageType::AudioVolumeSync, 0, &msg).await?;
            }

            AgentMessage::ClientDisconnected => {
                debug!(?handle, "agent reports its own client disconnected");
            }
        }
        Ok(())
    }

    /// Tear down everything owned by a disconnecting agent: cancel its
    /// transfers before freeing the connection record, per spec §9's ordering
    /// fix (free-then-null), then recompute the arbiter.
    pub(crate) async fn on_agent_disconnect(&mut self, handle: AgentHandle) {
        for id in self.transfers.cancel_owned_by(handle) {
            debug!(id, ?handle, "cancelling transfer owned by disconnecting agent");
            let msg = HostMessage::FileXferStatus {
                id,
                result: TransferStatus::Cancelled.to_wire(),
            };
            if let Err(e) = self.send_host(HostMessageType::FileXferStatus, 0, &msg).await {
                warn!(error = %e, id, ?handle, "failed to notify host of cancelled transfer on agent disconnect");
            }
        }
        self.registry.remove(handle);
        self.links.remove(&handle);
        self.reconcile_active().await;
    }

    fn is_active(&self, handle: AgentHandle) -> bool {
        self.arbiter.active() == Some(handle)
    }
}

fn types_from_bytes(bytes: &bytes::Bytes) -> Vec<u32> {
    use bytes::Buf;
    let mut b = bytes.clone();
    let mut out = Vec::with_capacity(b.len() / 4);
    while b.remaining() >= 4 {
        out.push(b.get_u32_ne());
    }
    out
}

fn u16s_from_bytes(bytes: &bytes::Bytes) -> Vec<u16> {
    use bytes::Buf;
    let mut b = bytes.clone();
    let mut out = Vec::with_capacity(b.len() / 2);
    while b.remaining() >= 2 {
        out.push(b.get_u16_ne());
    }
    out
}
