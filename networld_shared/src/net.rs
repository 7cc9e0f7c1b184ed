//! Networking primitives.
//!
//! Goals:
//! - One frame layout shared by every message kind.
//! - Length-prefixed frames over a reliable TCP stream.
//! - Keep serialization explicit: binary header, JSON payload.
//!
//! Frame layout:
//!
//! ```text
//! ┌──────────┬──────────────┬──────────────────────┐
//! │ kind: u8 │ sender: u64  │ payload (JSON)       │
//! └──────────┴──────────────┴──────────────────────┘
//! ```
//!
//! On a stream each frame is preceded by its `u32` big-endian length.

use anyhow::{bail, ensure, Context};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::SocketAddr;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::{
    ids::PeerId,
    messages::{MessageKind, NetMessage},
};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 3;

/// Size of the fixed frame header.
pub const FRAME_HEADER_LEN: usize = 1 + 8;

/// Frames larger than this are rejected on read.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

bitflags::bitflags! {
    /// Delivery requirements requested from the transport.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SendFlags: u8 {
        const NONE = 0;
        const RELIABLE = 1 << 0;     // Must arrive, may be delayed
        const ORDERED = 1 << 1;      // In order per kind
    }
}

impl Default for SendFlags {
    fn default() -> Self {
        Self::RELIABLE | Self::ORDERED
    }
}

/// One message on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: MessageKind,
    pub sender: PeerId,
    pub payload: Bytes,
}

impl Frame {
    /// Serializes a typed message into a frame.
    pub fn from_message<M: NetMessage>(sender: PeerId, msg: &M) -> anyhow::Result<Self> {
        let payload = serde_json::to_vec(msg)
            .with_context(|| format!("serialize {:?}", M::KIND))?;
        Ok(Self {
            kind: M::KIND,
            sender,
            payload: Bytes::from(payload),
        })
    }

    /// Decodes the payload as `M`, checking the kind first.
    pub fn decode_message<M: NetMessage>(&self) -> anyhow::Result<M> {
        ensure!(
            self.kind == M::KIND,
            "frame kind {:?} does not match {:?}",
            self.kind,
            M::KIND
        );
        serde_json::from_slice(&self.payload).with_context(|| format!("deserialize {:?}", M::KIND))
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + self.payload.len());
        buf.put_u8(self.kind.as_u8());
        buf.put_u64(self.sender.as_u64());
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    pub fn decode(mut buf: Bytes) -> anyhow::Result<Self> {
        ensure!(
            buf.len() >= FRAME_HEADER_LEN,
            "frame too short: {} bytes",
            buf.len()
        );
        let raw_kind = buf.get_u8();
        let kind = MessageKind::from_u8(raw_kind)
            .with_context(|| format!("unknown message kind {raw_kind}"))?;
        let sender = PeerId(buf.get_u64());
        Ok(Self {
            kind,
            sender,
            payload: buf,
        })
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &Frame) -> anyhow::Result<()> {
    let body = frame.encode();
    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.extend_from_slice(&body);
    w.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> anyhow::Result<Frame> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await.context("tcp read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        bail!("frame of {len} bytes exceeds limit");
    }
    let mut body = vec![0u8; len];
    r.read_exact(&mut body).await.context("tcp read payload")?;
    Frame::decode(Bytes::from(body))
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct FrameConn {
    stream: TcpStream,
}

impl FrameConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, frame: &Frame) -> anyhow::Result<()> {
        write_frame(&mut self.stream, frame).await
    }

    pub async fn recv(&mut self) -> anyhow::Result<Frame> {
        read_frame(&mut self.stream).await
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into independently owned read/write halves.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (r, w) = self.stream.into_split();
        (FrameReader { half: r }, FrameWriter { half: w })
    }
}

/// Read half of a [`FrameConn`].
#[derive(Debug)]
pub struct FrameReader {
    half: OwnedReadHalf,
}

impl FrameReader {
    pub async fn recv(&mut self) -> anyhow::Result<Frame> {
        read_frame(&mut self.half).await
    }
}

/// Write half of a [`FrameConn`].
#[derive(Debug)]
pub struct FrameWriter {
    half: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send(&mut self, frame: &Frame) -> anyhow::Result<()> {
        write_frame(&mut self.half, frame).await
    }
}

/// TCP listener handing out [`FrameConn`]s.
pub struct FrameListener {
    listener: TcpListener,
}

impl FrameListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(FrameConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok((FrameConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
