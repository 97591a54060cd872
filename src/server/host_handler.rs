//! Host→agent routing: what happens to each [`HostMessage`] that arrives on
//! the virtio channel (spec §4.3).

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace, warn};

use crate::protocol::agent::{self, AgentMessageType};
use crate::protocol::host::{self, HostMessage, HostMessageType, MonitorRect};
use crate::transfer::TransferStatus;

use super::{CachedMonitors, Daemon};

impl Daemon {
    /// Dispatch one decoded host message. Errors here are transport-level
    /// only (writes to the agent socket or tablet failing); malformed
    /// messages were already rejected by [`crate::protocol::host::validate_header`].
    pub(crate) async fn on_host_message(&mut self, opaque: u32, message: HostMessage) -> anyhow::Result<()> {
        match message {
            HostMessage::MouseState {
                x,
                y,
                buttons,
                display_id,
            } => {
                // The tablet is a synthetic input device fed directly from
                // the host's pointer stream; it is not routed through an
                // agent (spec §3 Tablet device, §4.5 coupler).
                if self.tablet.is_open() {
                    if let Err(e) = self.tablet.send_mouse_state(x, y, buttons, display_id) {
                        warn!(error = %e, "failed to inject mouse state");
                    }
                } else {
                    trace!("dropping mouse state, tablet not open");
                }
            }

            HostMessage::MonitorsConfig { flags, monitors } => {
                if let Err(e) = self.write_display_config(flags, &monitors) {
                    warn!(error = %e, "failed to write display config file");
                }
                self.monitors_config = Some(CachedMonitors { flags, monitors });
                self.replay_monitors_to_active().await;
                let reply = HostMessage::Reply {
                    of_type: HostMessageType::MonitorsConfig as u32,
                    error: host::reply::SUCCESS,
                };
                self.send_host(HostMessageType::Reply, opaque, &reply).await?;
            }

            HostMessage::Reply { of_type, error } => {
                debug!(of_type, error, "host acked our message");
            }

            HostMessage::DisplayConfig { console, width, height } => {
                debug!(console, width, height, "display config from host");
            }

            HostMessage::AnnounceCapabilities { request, caps } => {
                self.host_caps = caps;
                if request {
                    if self.client_connected {
                        self.broadcast_agents(AgentMessageType::ClientDisconnected, 0, 0, &[]).await;
                    }
                    self.client_connected = true;
                    let reply = HostMessage::AnnounceCapabilities {
                        request: false,
                        caps: crate::protocol::capabilities::CapabilitySet::ours(),
                    };
                    self.send_host(HostMessageType::AnnounceCapabilities, opaque, &reply).await?;
                } else {
                    self.client_connected = true;
                }
            }

            HostMessage::ClipboardGrab { selection, types } => {
                let mut body = BytesMut::new();
                for t in &types {
                    body.put_u32_ne(*t);
                }
                self.forward_to_active(AgentMessageType::ClipboardGrab, selection as u32, 0, &body)
                    .await;
            }

            HostMessage::ClipboardRequest { selection, format } => {
                self.forward_to_active(AgentMessageType::ClipboardRequest, selection as u32, format, &[])
                    .await;
            }

            HostMessage::ClipboardData { selection, format, data } => {
                self.forward_to_active(AgentMessageType::ClipboardData, selection as u32, format, &data)
                    .await;
            }

            HostMessage::ClipboardRelease { selection } => {
                self.forward_to_active(AgentMessageType::ClipboardRelease, selection as u32, 0, &[])
                    .await;
            }

            HostMessage::FileXferStart { id, metadata } => {
                let Some(active) = self.arbiter.active() else {
                    let msg = HostMessage::FileXferStatus {
                        id,
                        result: TransferStatus::Cancelled.to_wire(),
                    };
                    self.send_host(HostMessageType::FileXferStatus, 0, &msg).await?;
                    return Ok(());
                };
                let session_id = self.registry.get(active).and_then(|c| c.session_id.clone());
                let locked = match (self.session_info.as_deref(), session_id) {
                    (Some(provider), Some(session_id)) => provider.is_locked(&session_id).await,
                    _ => false,
                };
                if locked {
                    let msg = HostMessage::FileXferStatus {
                        id,
                        result: TransferStatus::Error.to_wire(),
                    };
                    self.send_host(HostMessageType::FileXferStatus, 0, &msg).await?;
                    return Ok(());
                }
                self.send_agent(active, AgentMessageType::FileXferStart, id, 0, &metadata).await;
            }

            HostMessage::FileXferStatus { id, result } => {
                let status = TransferStatus::from_wire(result);
                let owner = self.transfers.owner(id);
                if status.is_terminal() {
                    self.transfers.remove(id);
                }
                match owner {
                    Some(owner) => self.send_agent(owner, AgentMessageType::FileXferStatus, id, result, &[]).await,
                    None => warn!(id, "file-xfer status for unknown transfer id"),
                }
            }

            HostMessage::FileXferData { id, data } => {
                if let Some(owner) = self.transfers.owner(id) {
                    self.send_agent(owner, AgentMessageType::FileXferData, id, 0, &data).await;
                } else {
                    warn!(id, "file-xfer data for unknown transfer id");
                }
            }

            HostMessage::ClientDisconnected => {
                self.client_connected = false;
                self.host_caps = crate::protocol::capabilities::CapabilitySet::empty();
                self.tablet.close();
                self.broadcast_agents(AgentMessageType::ClientDisconnected, 0, 0, &[]).await;
            }

            HostMessage::MaxClipboard { max_bytes } => {
                self.max_clipboard.set(max_bytes);
            }

            HostMessage::AudioVolumeSync { mute, volume } => {
                let mut body = BytesMut::new();
                for v in &volume {
                    body.put_u16_ne(*v);
                }
                self.forward_to_active(AgentMessageType::AudioVolumeSync, mute as u32, 0, &body)
                    .await;
            }
        }
        Ok(())
    }

    /// Replay the cached monitors config to the active agent, if both exist
    /// (spec §4.5 step 5, and called directly on a fresh `MONITORS_CONFIG`).
    pub(crate) async fn replay_monitors_to_active(&mut self) {
        let Some(active) = self.arbiter.active() else { return };
        let Some(cached) = self.monitors_config.clone() else { return };
        let mut body = BytesMut::new();
        body.put_u32_ne(cached.monitors.len() as u32);
        body.put_u32_ne(cached.flags);
        for m in &cached.monitors {
            body.put_u32_ne(m.depth);
            body.put_u32_ne(m.width);
            body.put_u32_ne(m.height);
            body.put_i32_ne(m.x);
            body.put_i32_ne(m.y);
        }
        self.send_agent(active, AgentMessageType::MonitorsConfig, 0, 0, &body).await;
    }

    /// Persist the host's monitor layout to the display-config file (spec
    /// §4.3, §6), so it survives a daemon restart without a fresh
    /// `MONITORS_CONFIG`. A no-op if no path is configured.
    fn write_display_config(&self, flags: u32, monitors: &[MonitorRect]) -> std::io::Result<()> {
        let Some(path) = self.config.display_config_path.as_ref() else {
            return Ok(());
        };
        let mut out = String::new();
        out.push_str(&format!("flags={flags}\n"));
        for (i, m) in monitors.iter().enumerate() {
            out.push_str(&format!(
                "monitor{i}: {}x{}+{}+{} depth={}\n",
                m.width, m.height, m.x, m.y, m.depth
            ));
        }
        std::fs::write(path, out)
    }

    async fn forward_to_active(&mut self, message_type: AgentMessageType, arg1: u32, arg2: u32, body: &[u8]) {
        let Some(active) = self.arbiter.active() else {
            trace!(?message_type, "no active agent, dropping host message");
            return;
        };
        self.send_agent(active, message_type, arg1, arg2, body).await;
    }

    /// Queue a message for delivery to `handle`'s write-side task. Delivery
    /// is asynchronous with respect to this call; the per-connection task
    /// owns the actual socket write.
    pub(crate) async fn send_agent(
        &mut self,
        handle: crate::session::AgentHandle,
        message_type: AgentMessageType,
        arg1: u32,
        arg2: u32,
        body: &[u8],
    ) {
        let Some(link) = self.links.get(&handle) else {
            warn!(?message_type, "target agent link missing");
            return;
        };
        let frame = agent::encode_message(message_type, arg1, arg2, body).freeze();
        if link.send(frame).is_err() {
            warn!(?message_type, "agent write task already gone");
        }
    }

    pub(crate) async fn send_host(
        &mut self,
        message_type: HostMessageType,
        opaque: u32,
        body: &HostMessage,
    ) -> anyhow::Result<()> {
        let Some(channel) = self.host_channel.as_mut() else {
            return Ok(());
        };
        let frame = host::encode_message_with_caps(message_type, opaque, body, self.selection_cap())
            .freeze();
        channel.send(frame).await?;
        channel.flush().await?;
        Ok(())
    }
}
