//! The daemon: owns every piece of shared state as a single context record
//! (spec §9 Design Notes — "global mutable state as a single context record")
//! and drives the cooperative, single-threaded event loop described in
//! spec §4.7 and §5.

mod agent_handler;
pub mod agent_transport;
mod coupler;
pub mod host_channel;
mod host_handler;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clipboard::{MaxClipboard, OwnershipVector};
use crate::config::Config;
use crate::protocol::agent::{self, AgentHeader, AgentMessageType};
use crate::protocol::capabilities::{Capability, CapabilitySet};
use crate::protocol::host::{self, HostHeader, HostMessageType, MonitorRect};
use crate::session::{AgentConnection, AgentHandle, AgentRegistry, Arbiter, LogindSessionInfo, NullSessionInfo, SessionInfoProvider};
use crate::tablet::{FakeTablet, TabletSink};
use crate::transfer::TransferRegistry;

use agent_transport::{AgentListener, UnixAgentTransport};
use host_channel::HostChannel;

/// The last `MONITORS_CONFIG` the host sent, cached so it can be replayed to
/// a newly active agent (spec §3 `Monitors configuration`, §4.5 step 5).
#[derive(Debug, Clone)]
pub(crate) struct CachedMonitors {
    pub flags: u32,
    pub monitors: Vec<MonitorRect>,
}

/// A message bound for the main loop from one agent connection's task.
enum AgentEvent {
    Frame(AgentHandle, AgentHeader, Bytes),
    Closed(AgentHandle),
}

/// The single-threaded daemon context. All fields are private; behavior is
/// implemented across this module and its siblings as inherent methods.
pub struct Daemon {
    config: Config,
    registry: AgentRegistry,
    links: HashMap<AgentHandle, mpsc::UnboundedSender<Bytes>>,
    arbiter: Arbiter,
    host_caps: CapabilitySet,
    monitors_config: Option<CachedMonitors>,
    clipboard_owned: OwnershipVector,
    max_clipboard: MaxClipboard,
    transfers: TransferRegistry,
    tablet: Box<dyn TabletSink>,
    host_channel: Option<Box<dyn HostChannel>>,
    session_info: Option<Box<dyn SessionInfoProvider>>,
    agent_listener: AgentListener,
    client_connected: bool,
    agent_events: (mpsc::UnboundedSender<AgentEvent>, mpsc::UnboundedReceiver<AgentEvent>),
}

impl Daemon {
    /// Build a fresh daemon context. Binds the agent socket and connects to
    /// the session-info provider (falling back to [`NullSessionInfo`] under
    /// `-X` or if `logind` is unreachable); does not yet open the host
    /// channel. The coupler opens it once an active agent with a reported
    /// resolution exists, and closes it again when that ceases to hold
    /// (invariant: host channel open iff active agent with non-empty screen
    /// list).
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let agent_listener = AgentListener::bind(&config.agent_socket_path)?;

        let session_info: Option<Box<dyn SessionInfoProvider>> = if config.disable_session_info {
            None
        } else {
            match LogindSessionInfo::connect().await {
                Ok(provider) => Some(Box::new(provider)),
                Err(e) => {
                    warn!(error = %e, "could not connect to logind, falling back to connect-count arbitration");
                    Some(Box::new(NullSessionInfo))
                }
            }
        };

        let tablet: Box<dyn TabletSink> = Self::build_tablet(&config);

        Ok(Self {
            links: HashMap::new(),
            registry: AgentRegistry::new(),
            arbiter: Arbiter::new(),
            host_caps: CapabilitySet::empty(),
            monitors_config: None,
            clipboard_owned: OwnershipVector::new(),
            max_clipboard: MaxClipboard::unbounded(),
            transfers: TransferRegistry::new(),
            tablet,
            host_channel: None,
            session_info,
            agent_listener,
            client_connected: false,
            agent_events: mpsc::unbounded_channel(),
            config,
        })
    }

    #[cfg(feature = "uinput")]
    fn build_tablet(config: &Config) -> Box<dyn TabletSink> {
        if config.fake_uinput {
            Box::new(FakeTablet::default())
        } else {
            Box::new(crate::tablet::uinput::UinputTablet::new(&config.uinput_device_path))
        }
    }

    #[cfg(not(feature = "uinput"))]
    fn build_tablet(_config: &Config) -> Box<dyn TabletSink> {
        Box::new(FakeTablet::default())
    }

    fn selection_cap(&self) -> bool {
        self.host_caps.has(Capability::ClipboardSelection)
    }

    /// Run the daemon until `quit` is set or (in single-shot mode) the host
    /// channel has opened once and closed.
    pub async fn run(mut self, quit: &'static AtomicBool) -> anyhow::Result<()> {
        loop {
            if quit.load(Ordering::SeqCst) {
                break;
            }

            let session_changed = async {
                match self.session_info.as_deref() {
                    Some(provider) => provider.changed().await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                accepted = self.agent_listener.accept() => {
                    match accepted {
                        Ok((transport, pid)) => self.handle_new_agent(transport, pid).await,
                        Err(e) => warn!(error = %e, "failed to accept agent connection"),
                    }
                }

                Some(event) = self.agent_events.1.recv() => {
                    self.handle_agent_event(event).await;
                }

                host_frame = Self::recv_host(&mut self.host_channel) => {
                    match host_frame {
                        Some(Ok((header, payload))) => self.handle_host_frame(header, payload).await,
                        Some(Err(e)) => {
                            warn!(error = %e, "host channel read error, will reconnect");
                            self.host_channel = None;
                        }
                        None => {
                            debug!("host channel closed (clean EOF), will reconnect");
                            self.host_channel = None;
                            if self.config.one_shot {
                                break;
                            }
                        }
                    }
                }

                _ = session_changed => {
                    self.reconcile_active().await;
                }

                _ = Self::host_reopen_tick(self.host_channel.is_none() && self.arbiter.active().is_some()) => {
                    self.sync_host_channel_to_active().await;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn recv_host(
        channel: &mut Option<Box<dyn HostChannel>>,
    ) -> Option<std::io::Result<(HostHeader, Bytes)>> {
        match channel {
            Some(c) => c.recv().await.transpose(),
            None => std::future::pending().await,
        }
    }

    /// Backoff between host-channel reopen attempts while there is an active
    /// agent but no channel (e.g. after a transport-level read error).
    /// Resolves immediately if `due` is false, so it never wins a `select!`
    /// race when there's nothing to retry.
    async fn host_reopen_tick(due: bool) {
        if due {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        } else {
            std::future::pending::<()>().await;
        }
    }

    /// Send the same message to every currently connected agent link (spec
    /// §4.2, §4.3: `CLIENT_DISCONNECTED` broadcast on capability
    /// (re)announcement and on the host's own client disconnecting).
    pub(crate) async fn broadcast_agents(&mut self, message_type: AgentMessageType, arg1: u32, arg2: u32, body: &[u8]) {
        let frame = agent::encode_message(message_type, arg1, arg2, body).freeze();
        for link in self.links.values() {
            if link.send(frame.clone()).is_err() {
                warn!(?message_type, "agent write task already gone during broadcast");
            }
        }
    }

    async fn handle_new_agent(&mut self, transport: UnixAgentTransport, pid: u32) {
        let session_id = match self.session_info.as_deref() {
            Some(provider) => provider.session_for_pid(pid).await,
            None => None,
        };
        let handle = self.registry.insert(AgentConnection::new(session_id));

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.links.insert(handle, outbound_tx);
        spawn_agent_task(handle, transport, outbound_rx, self.agent_events.0.clone());

        info!(?handle, pid, "agent connected");
        self.reconcile_active().await;
    }

    async fn handle_agent_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Frame(handle, header, body) => {
                match agent::decode_body(header, body) {
                    Ok(message) => {
                        if let Err(e) = self.on_agent_message(handle, message).await {
                            warn!(error = %e, ?handle, "error handling agent message");
                        }
                    }
                    Err(e) => warn!(error = %e, ?handle, "malformed agent message"),
                }
            }
            AgentEvent::Closed(handle) => {
                info!(?handle, "agent disconnected");
                self.on_agent_disconnect(handle).await;
            }
        }
    }

    async fn handle_host_frame(&mut self, header: HostHeader, payload: Bytes) {
        let message_type = match host::validate_header(&header, self.selection_cap()) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "rejected host message header");
                return;
            }
        };
        match host::decode_payload(message_type, self.selection_cap(), payload) {
            Ok(message) => {
                if let Err(e) = self.on_host_message(header.opaque, message).await {
                    warn!(error = %e, "error handling host message");
                }
            }
            Err(e) => warn!(error = %e, "failed to decode host payload"),
        }
    }

    async fn shutdown(mut self) {
        info!("shutting down");
        self.tablet.close();
        if let Some(mut channel) = self.host_channel.take() {
            let _ = channel.flush().await;
        }
        let _ = std::fs::remove_file(&self.config.agent_socket_path);
    }
}

fn spawn_agent_task(
    handle: AgentHandle,
    mut transport: UnixAgentTransport,
    mut outbound_rx: mpsc::UnboundedReceiver<Bytes>,
    events_tx: mpsc::UnboundedSender<AgentEvent>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = transport.recv() => {
                    match frame {
                        Ok(Some((header, body))) => {
                            if events_tx.send(AgentEvent::Frame(handle, header, body)).is_err() {
                                break;
                            }
                        }
                        Ok(None) | Err(_) => {
                            let _ = events_tx.send(AgentEvent::Closed(handle));
                            break;
                        }
                    }
                }
                Some(bytes) = outbound_rx.recv() => {
                    if let Err(e) = transport.send(bytes).await {
                        warn!(error = %e, ?handle, "agent write failed");
                        let _ = events_tx.send(AgentEvent::Closed(handle));
                        break;
                    }
                }
                else => break,
            }
        }
    });
}
