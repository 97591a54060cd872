//! Framing and transport for the virtio serial channel to the host.
//!
//! The low-level virtio port reader/writer is an opaque external
//! collaborator per spec §1 ("delivers and accepts length-prefixed typed
//! messages"); [`HostChannel`] is the seam the rest of the daemon programs
//! against. [`HostFrameCodec`] does the framing (header + exactly `size`
//! payload bytes) via `tokio_util::codec`, the idiomatic fit for a
//! length-prefixed stream protocol; byte-order conversion and semantic
//! validation stay in [`crate::protocol::host`].

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use tokio::fs::{File, OpenOptions};
use tokio_util::codec::{Decoder, Encoder, Framed};

use futures_util::{SinkExt, StreamExt};

use crate::protocol::host::HostHeader;

/// Frames the host channel's `{header}{payload}` messages.
pub struct HostFrameCodec;

impl Decoder for HostFrameCodec {
    type Item = (HostHeader, Bytes);
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HostHeader::WIRE_SIZE {
            return Ok(None);
        }
        let mut peek = [0u8; HostHeader::WIRE_SIZE];
        peek.copy_from_slice(&src[..HostHeader::WIRE_SIZE]);
        let header = HostHeader::from_le_bytes(&peek);
        let total = HostHeader::WIRE_SIZE + header.size as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        let mut frame = src.split_to(total);
        frame.advance(HostHeader::WIRE_SIZE);
        Ok(Some((header, frame.freeze())))
    }
}

impl Encoder<Bytes> for HostFrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// A duplex, message-framed connection to the host. Implementations are
/// free to be backed by a real character device, a unix socket in tests, or
/// an in-memory loopback.
#[async_trait]
pub trait HostChannel: Send {
    /// Read the next message, or `None` on clean EOF.
    async fn recv(&mut self) -> std::io::Result<Option<(HostHeader, Bytes)>>;

    /// Write one already-framed (header + payload) message.
    async fn send(&mut self, frame: Bytes) -> std::io::Result<()>;

    /// Flush buffered writes.
    async fn flush(&mut self) -> std::io::Result<()>;
}

/// The real virtio-serial-port-backed channel.
pub struct VirtioPortChannel {
    framed: Framed<File, HostFrameCodec>,
}

impl VirtioPortChannel {
    pub async fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path).await?;
        Ok(Self {
            framed: Framed::new(file, HostFrameCodec),
        })
    }
}

#[async_trait]
impl HostChannel for VirtioPortChannel {
    async fn recv(&mut self) -> std::io::Result<Option<(HostHeader, Bytes)>> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn send(&mut self, frame: Bytes) -> std::io::Result<()> {
        self.framed.send(frame).await
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        SinkExt::<Bytes>::flush(&mut self.framed).await
    }
}
