//! The session-info provider: an external collaborator treated as an opaque
//! source of "active session id" and "session id for pid" answers,
//! optionally able to signal changes (spec §1, Out of scope). This module
//! only defines the trait seam and two implementations: a logind-backed one
//! for normal operation, and a null one used under `-X` (spec §6) or when
//! logind is unreachable.

use async_trait::async_trait;
use tracing::{debug, warn};
use zbus::{zvariant::OwnedObjectPath, Connection, MatchRule, MessageStream};

/// Answers questions about host-side user sessions, and can notify the
/// daemon when the answer to "which session is active" changes.
#[async_trait]
pub trait SessionInfoProvider: Send + Sync {
    /// The currently active session id, if the provider has one.
    async fn active_session(&self) -> Option<String>;

    /// Resolve a session id from a connecting agent's peer pid.
    async fn session_for_pid(&self, pid: u32) -> Option<String>;

    /// Is `session_id` an interactive human-user session (as opposed to a
    /// greeter, a background service session, etc.)? Drives the
    /// `FILE_XFER_DISABLE` reconciliation step (spec §4.5).
    async fn is_human_session(&self, session_id: &str) -> bool;

    /// Is `session_id` currently screen-locked? Drives the file-transfer
    /// "session locked" error path (spec §4.3, §7).
    async fn is_locked(&self, session_id: &str) -> bool;

    /// Resolves when the active session may have changed. The event loop
    /// awaits this alongside the transport readiness futures.
    async fn changed(&self);
}

/// Used when no session-info integration is available (CLI flag `-X`, or
/// logind connection failure at startup). The arbiter falls back to
/// connect/disconnect counting (spec §4.5 step 2).
#[derive(Debug, Default)]
pub struct NullSessionInfo;

#[async_trait]
impl SessionInfoProvider for NullSessionInfo {
    async fn active_session(&self) -> Option<String> {
        None
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

#[zbus::proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1"
)]
trait LoginManager {
    fn get_session_by_pid(&self, pid: u32) -> zbus::Result<OwnedObjectPath>;
    fn get_session(&self, session_id: &str) -> zbus::Result<OwnedObjectPath>;
    fn list_sessions(
        &self,
    ) -> zbus::Result<Vec<(String, u32, String, String, OwnedObjectPath)>>;
}

#[zbus::proxy(
    interface = "org.freedesktop.login1.Session",
    default_service = "org.freedesktop.login1"
)]
trait LoginSession {
    #[zbus(property)]
    fn active(&self) -> zbus::Result<bool>;
    #[zbus(property)]
    fn locked_hint(&self) -> zbus::Result<bool>;
    #[zbus(property)]
    fn type_(&self) -> zbus::Result<String>;
    #[zbus(property)]
    fn id(&self) -> zbus::Result<String>;
}

/// Queries `logind` over the system bus for session state, grounded on the
/// same `zbus::{Connection, MatchRule, MessageStream}` pattern the clipboard
/// D-Bus bridge uses for portal signal subscriptions.
pub struct LogindSessionInfo {
    connection: Connection,
}

impl LogindSessionInfo {
    /// Connect to the system bus. Fails (and the caller should fall back to
    /// [`NullSessionInfo`] with a logged warning) if logind is unreachable.
    pub async fn connect() -> zbus::Result<Self> {
        let connection = Connection::system().await?;
        Ok(Self { connection })
    }

    async fn manager(&self) -> zbus::Result<LoginManagerProxy<'_>> {
        LoginManagerProxy::new(&self.connection).await
    }

    async fn session_proxy(&self, session_id: &str) -> zbus::Result<LoginSessionProxy<'_>> {
        let manager = self.manager().await?;
        let path = manager.get_session(session_id).await?;
        LoginSessionProxy::builder(&self.connection)
            .path(path)?
            .build()
            .await
    }
}

#[async_trait]
impl SessionInfoProvider for LogindSessionInfo {
    async fn active_session(&self) -> Option<String> {
        let manager = self.manager().await.ok()?;
        let sessions = manager.list_sessions().await.ok()?;
        for (session_id, _uid, _user, _seat, path) in sessions {
            let proxy = LoginSessionProxy::builder(&self.connection)
                .path(path)
                .ok()?
                .build()
                .await
                .ok()?;
            if proxy.active().await.unwrap_or(false) {
                return Some(session_id);
            }
        }
        None
    }

    async fn session_for_pid(&self, pid: u32) -> Option<String> {
        let manager = self.manager().await.ok()?;
        let path = manager.get_session_by_pid(pid).await.ok()?;
        let proxy = LoginSessionProxy::builder(&self.connection)
            .path(path)
            .ok()?
            .build()
            .await
            .ok()?;
        proxy.id().await.ok()
    }

    async fn is_human_session(&self, session_id: &str) -> bool {
        match self.session_proxy(session_id).await {
            Ok(proxy) => proxy
                .type_()
                .await
                .map(|t| t == "x11" || t == "wayland" || t == "tty")
                .unwrap_or(true),
            Err(e) => {
                warn!(%session_id, error = %e, "could not query session type, assuming human");
                true
            }
        }
    }

    async fn is_locked(&self, session_id: &str) -> bool {
        match self.session_proxy(session_id).await {
            Ok(proxy) => proxy.locked_hint().await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn changed(&self) {
        let rule = match MatchRule::builder()
            .msg_type(zbus::MessageType::Signal)
            .interface("org.freedesktop.DBus.Properties")
            .and_then(|b| b.member("PropertiesChanged"))
            .map(|b| b.build())
        {
            Ok(rule) => rule,
            Err(e) => {
                warn!(error = %e, "failed to build session-change match rule");
                std::future::pending::<()>().await;
                unreachable!();
            }
        };

        let mut stream = match MessageStream::for_match_rule(rule, &self.connection, None).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to subscribe to logind property changes");
                std::future::pending::<()>().await;
                unreachable!();
            }
        };
        use futures_util::StreamExt;
        if let Some(Ok(message)) = stream.next().await {
            debug!(?message, "session-info change signal observed");
        }
    }
}
