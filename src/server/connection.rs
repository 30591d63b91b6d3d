//! One TCP (optionally TLS-wrapped) connection: stream, read buffer,
//! lifecycle tag, and the pipelined-read bookmark.

use crate::{errors::Error, limits::ConnLimits};
use bytes::Bytes;
use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf},
    net::TcpStream,
    time::sleep,
};
use tokio_rustls::server::TlsStream;

/// Unified transport: plain TCP or a server-side TLS session.
pub enum HttpStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for HttpStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for HttpStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_flush(cx),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Disposition of a connection after serving one request.
///
/// `Pipelined` means leftover request bytes are already buffered;
/// `KeepAlive` means the socket stays open but the buffer is drained.
/// Once `Close`, a connection never becomes reusable again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Close,
    KeepAlive,
    Pipelined,
}

/// Server side of one accepted socket.
///
/// All I/O on a connection happens serially on the reactor it is pinned
/// to, so none of this state is synchronized.
pub struct Connection {
    stream: HttpStream,
    buffer: Box<[u8]>,
    mark_start: usize,
    mark_end: usize,
    lifecycle: Lifecycle,
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
    limits: ConnLimits,
    responded: bool,
}

impl Connection {
    pub(crate) fn new(
        stream: HttpStream,
        remote_addr: SocketAddr,
        local_addr: SocketAddr,
        limits: &ConnLimits,
    ) -> Self {
        Self {
            stream,
            buffer: vec![0; limits.read_buffer_size].into_boxed_slice(),
            mark_start: 0,
            mark_end: 0,
            lifecycle: Lifecycle::Close,
            remote_addr,
            local_addr,
            limits: limits.clone(),
            responded: false,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    /// Saves the span of already-read but unconsumed buffer bytes so the
    /// next request on this connection starts from them.
    pub(crate) fn save_read_position(&mut self, start: usize, end: usize) {
        self.mark_start = start;
        self.mark_end = end;
    }

    pub(crate) fn load_read_position(&self) -> (usize, usize) {
        (self.mark_start, self.mark_end)
    }

    pub(crate) fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Reads up to buffer capacity from the socket, bounded by the read
    /// timeout.
    pub(crate) async fn read_some(&mut self) -> Result<usize, Error> {
        let timeout = self.limits.socket_read_timeout;
        tokio::select! {
            biased;

            result = self.stream.read(&mut self.buffer) => {
                Ok(result.map_err(Error::from_io)?)
            }
            _ = sleep(timeout) => Err(Error::Timeout),
        }
    }

    /// Writes a gather-list of buffers, bounded by the write timeout.
    /// Writes on one connection are serialized by construction: the next
    /// buffer is not issued until the previous one completed.
    pub(crate) async fn write_buffers(&mut self, buffers: &[Bytes]) -> Result<usize, Error> {
        let timeout = self.limits.socket_write_timeout;
        let total = buffers.iter().map(Bytes::len).sum();

        tokio::select! {
            biased;

            result = async {
                for buf in buffers {
                    if !buf.is_empty() {
                        self.stream.write_all(buf).await?;
                    }
                }
                self.stream.flush().await
            } => {
                result.map_err(Error::from_io)?;
                Ok(total)
            }
            _ = sleep(timeout) => Err(Error::Timeout),
        }
    }

    /// Terminal disposition step for one request cycle. Keep-alive and
    /// pipelined connections are rearmed for the next request; anything
    /// else shuts the socket down.
    pub(crate) async fn finish(&mut self) -> bool {
        match self.lifecycle {
            Lifecycle::KeepAlive | Lifecycle::Pipelined => true,
            Lifecycle::Close => {
                let _ = self.stream.shutdown().await;
                false
            }
        }
    }

    pub(crate) fn has_responded(&self) -> bool {
        self.responded
    }

    pub(crate) fn mark_responded(&mut self) {
        self.responded = true;
    }

    pub(crate) fn clear_responded(&mut self) {
        self.responded = false;
    }
}
