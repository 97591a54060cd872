//! Framing and transport for the local per-session-agent stream socket.
//!
//! The low-level framed stream-socket server (accept, read, write,
//! peer-credential retrieval) is an opaque external collaborator per spec
//! §1; [`AgentTransport`] and [`AgentListener`] are the seams. The codec
//! itself uses `tokio_util`, matching [`super::host_channel`].

use std::os::fd::AsRawFd;
use std::os::unix::fs::PermissionsExt;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::protocol::agent::AgentHeader;

/// Frames the agent socket's `{header}{payload}` messages, native byte order.
pub struct AgentFrameCodec;

impl Decoder for AgentFrameCodec {
    type Item = (AgentHeader, Bytes);
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < AgentHeader::WIRE_SIZE {
            return Ok(None);
        }
        let mut peek = [0u8; AgentHeader::WIRE_SIZE];
        peek.copy_from_slice(&src[..AgentHeader::WIRE_SIZE]);
        let header = AgentHeader::from_native_bytes(&peek);
        let total = AgentHeader::WIRE_SIZE + header.size as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        let mut frame = src.split_to(total);
        frame.advance(AgentHeader::WIRE_SIZE);
        Ok(Some((header, frame.freeze())))
    }
}

impl Encoder<Bytes> for AgentFrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// A duplex, message-framed connection to one session agent.
#[async_trait]
pub trait AgentTransport: Send {
    async fn recv(&mut self) -> std::io::Result<Option<(AgentHeader, Bytes)>>;
    async fn send(&mut self, frame: Bytes) -> std::io::Result<()>;
}

/// The real unix-stream-socket-backed transport.
pub struct UnixAgentTransport {
    framed: Framed<UnixStream, AgentFrameCodec>,
}

impl UnixAgentTransport {
    pub fn new(stream: UnixStream) -> Self {
        Self {
            framed: Framed::new(stream, AgentFrameCodec),
        }
    }
}

#[async_trait]
impl AgentTransport for UnixAgentTransport {
    async fn recv(&mut self) -> std::io::Result<Option<(AgentHeader, Bytes)>> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn send(&mut self, frame: Bytes) -> std::io::Result<()> {
        self.framed.send(frame).await
    }
}

/// Binds the agent socket with mode 0666 (spec §6) and accepts connections,
/// resolving each peer's pid via `SO_PEERCRED`.
pub struct AgentListener {
    listener: UnixListener,
}

impl AgentListener {
    pub fn bind(path: &std::path::Path) -> std::io::Result<Self> {
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))?;
        Ok(Self { listener })
    }

    /// Accept one connection, returning its transport and the peer's pid.
    pub async fn accept(&self) -> std::io::Result<(UnixAgentTransport, u32)> {
        let (stream, _addr) = self.listener.accept().await?;
        let pid = peer_pid(&stream)?;
        Ok((UnixAgentTransport::new(stream), pid))
    }
}

/// Query the connecting peer's pid via `getsockopt(SO_PEERCRED)`, following
/// this codebase's convention of calling `libc` directly for device/socket
/// setup rather than reaching for a higher-level wrapper.
fn peer_pid(stream: &UnixStream) -> std::io::Result<u32> {
    let fd = stream.as_raw_fd();
    let mut cred = libc::ucred {
        pid: 0,
        uid: 0,
        gid: 0,
    };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            &mut cred as *mut libc::ucred as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(cred.pid as u32)
}
