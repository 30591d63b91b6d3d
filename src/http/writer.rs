//! Response writer: buffers handler output and emits it either as one
//! monolithic message or as a sequence of HTTP chunks.

use crate::{
    errors::Error,
    http::{
        message::Message,
        types::{HEADER_CONNECTION, HEADER_CONTENT_LENGTH, HEADER_TRANSFER_ENCODING},
    },
    server::connection::{Connection, Lifecycle},
};
use bytes::Bytes;
use std::{io, mem};

/// Serializes one response over a connection.
///
/// Text goes through [`Writer::write`], binary payloads through
/// [`Writer::write_bytes`] (copied) or [`Writer::write_shared`]
/// (zero-copy `Bytes` handle). [`Writer::send`] and
/// [`Writer::send_final_chunk`] consume the writer; a writer that was
/// never sent produces nothing, which the dispatcher turns into a `500`.
pub struct Writer<'a> {
    conn: &'a mut Connection,
    response: Message,
    text: Vec<u8>,
    payload: Vec<Bytes>,
    sending_chunks: bool,
    sent_headers: bool,
}

impl<'a> Writer<'a> {
    /// A writer for the response to `request` on `conn`.
    pub fn new(conn: &'a mut Connection, request: &Message) -> Self {
        Self {
            conn,
            response: Message::response_to(request),
            text: Vec::new(),
            payload: Vec::new(),
            sending_chunks: false,
            sent_headers: false,
        }
    }

    pub fn response(&self) -> &Message {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Message {
        &mut self.response
    }

    /// Appends to the internal text stream.
    pub fn write<T: WriteBuffer>(&mut self, value: T) {
        value.write_to(&mut self.text);
    }

    /// Flushes pending text, then copies `buf` into an owned payload
    /// buffer.
    pub fn write_bytes(&mut self, buf: &[u8]) {
        self.flush_text();
        self.payload.push(Bytes::copy_from_slice(buf));
    }

    /// Flushes pending text, then enqueues `buf` without copying; the
    /// handle keeps the payload alive until the send completes.
    pub fn write_shared(&mut self, buf: Bytes) {
        self.flush_text();
        self.payload.push(buf);
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            self.payload.push(Bytes::from(mem::take(&mut self.text)));
        }
    }

    fn body_len(&self) -> usize {
        self.payload.iter().map(Bytes::len).sum::<usize>() + self.text.len()
    }

    /// Serialized header block: first line, headers, blank line.
    fn head_bytes(&mut self) -> Bytes {
        let mut head = Vec::with_capacity(256);
        head.extend_from_slice(self.response.first_line().as_bytes());
        head.extend_from_slice(b"\r\n");
        for (name, value) in self.response.headers().iter() {
            head.extend_from_slice(name.as_bytes());
            head.extend_from_slice(b": ");
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        head.extend_from_slice(b"\r\n");
        Bytes::from(head)
    }

    fn connection_header_value(&self) -> &'static str {
        if self.conn.lifecycle() == Lifecycle::Close {
            "close"
        } else {
            "Keep-Alive"
        }
    }

    /// Builds the header block and issues one gather-write of headers
    /// plus payload. Bodies implied empty (HEAD, 1xx, 204/205/304) are
    /// suppressed on the wire while `Content-Length` still reflects what
    /// the handler wrote.
    pub async fn send(mut self) -> Result<(), Error> {
        self.flush_text();
        let body_len = self.body_len();

        let connection = self.connection_header_value();
        self.response.change_header(HEADER_CONNECTION, connection);
        if !self.response.suppress_content_length() {
            self.response
                .change_header(HEADER_CONTENT_LENGTH, body_len.to_string());
        }

        let mut buffers = vec![self.head_bytes()];
        if !self.response.is_content_length_implied() {
            buffers.append(&mut self.payload);
        }

        self.conn.write_buffers(&buffers).await?;
        self.conn.mark_responded();
        Ok(())
    }

    /// Sends buffered payload wrapped as a single HTTP chunk. The first
    /// call also emits the headers: with `Transfer-Encoding: chunked`
    /// when the peer supports it, otherwise with a forced
    /// `Connection: close` since the length cannot be known up front.
    pub async fn send_chunk(&mut self) -> Result<(), Error> {
        self.flush_text();
        let mut buffers = Vec::new();

        if !self.sent_headers {
            self.sent_headers = true;
            if self.response.chunks_supported() {
                self.sending_chunks = true;
                self.response.set_chunked(true);
                self.response
                    .change_header(HEADER_TRANSFER_ENCODING, "chunked");
                self.response.headers_mut().remove(HEADER_CONTENT_LENGTH);
                let connection = self.connection_header_value();
                self.response.change_header(HEADER_CONNECTION, connection);
            } else {
                self.conn.set_lifecycle(Lifecycle::Close);
                self.response.set_suppress_content_length(true);
                self.response.headers_mut().remove(HEADER_CONTENT_LENGTH);
                self.response.change_header(HEADER_CONNECTION, "close");
            }
            buffers.push(self.head_bytes());
        }

        let payload = mem::take(&mut self.payload);
        let chunk_len: usize = payload.iter().map(Bytes::len).sum();
        if chunk_len > 0 {
            if self.sending_chunks {
                buffers.push(Bytes::from(format!("{chunk_len:X}\r\n")));
                buffers.extend(payload);
                buffers.push(Bytes::from_static(b"\r\n"));
            } else {
                buffers.extend(payload);
            }
        }

        if !buffers.is_empty() {
            self.conn.write_buffers(&buffers).await?;
        }
        Ok(())
    }

    /// Sends any remaining payload plus the zero-length final chunk,
    /// consuming the writer.
    pub async fn send_final_chunk(mut self) -> Result<(), Error> {
        self.send_chunk().await?;
        if self.sending_chunks {
            self.conn
                .write_buffers(&[Bytes::from_static(b"0\r\n\r\n")])
                .await?;
        }
        self.conn.mark_responded();
        Ok(())
    }
}

impl io::Write for Writer<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.text.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Values writable into the response text stream without intermediate
/// allocation.
pub trait WriteBuffer {
    fn write_to(&self, buffer: &mut Vec<u8>);
}

macro_rules! impl_write_buffer {
    (str => $($t:ty),*) => {
        $(impl WriteBuffer for $t {
            #[inline]
            fn write_to(&self, buffer: &mut Vec<u8>) {
                buffer.extend_from_slice(self.as_bytes());
            }
        })*
    };
    (bytes => $($t:ty),*) => {
        $(impl WriteBuffer for $t {
            #[inline]
            fn write_to(&self, buffer: &mut Vec<u8>) {
                buffer.extend_from_slice(self);
            }
        })*
    };
    (display => $($t:ty),*) => {
        $(impl WriteBuffer for $t {
            #[inline]
            fn write_to(&self, buffer: &mut Vec<u8>) {
                buffer.extend_from_slice(self.to_string().as_bytes());
            }
        })*
    };
}

impl_write_buffer! { str => &str, String }
impl_write_buffer! { bytes => &[u8], Vec<u8> }
impl_write_buffer! { display => u16, u32, u64, usize, i32, i64 }

impl<T: WriteBuffer> WriteBuffer for &T {
    #[inline]
    fn write_to(&self, buffer: &mut Vec<u8>) {
        T::write_to(self, buffer);
    }
}

impl<const N: usize> WriteBuffer for [u8; N] {
    #[inline]
    fn write_to(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(self);
    }
}

impl WriteBuffer for bool {
    #[inline]
    fn write_to(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(if *self { b"true" } else { b"false" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_buffer_impls() {
        let mut buf = Vec::new();
        "text".write_to(&mut buf);
        String::from("-s").write_to(&mut buf);
        b" raw".write_to(&mut buf);
        42usize.write_to(&mut buf);
        true.write_to(&mut buf);
        (&"ref").write_to(&mut buf);

        assert_eq!(buf, b"text-s raw42trueref");
    }
}
