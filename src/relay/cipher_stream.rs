//! Wraps a raw duplex connection with a pair of [`Encryptor`]s so the
//! encrypted leg of a relay can be driven through the same
//! [`AsyncRead`]/[`AsyncWrite`] machinery as the plaintext leg — in
//! particular, through `common::buffer::greedy_copy_bidirectional`,
//! without that function needing to know anything about the cipher
//! framing underneath.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::crypto::kind::CipherKind;
use crate::crypto::Encryptor;

fn to_io_err(e: crate::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

/// A [`tokio::net::TcpStream`]-like connection with Shadowsocks framing
/// layered transparently on top: writes are encrypted before reaching
/// `inner`, reads are decrypted before reaching the caller.
pub struct CipherStream<S> {
    inner: S,
    encryptor: Encryptor,
    decryptor: Encryptor,
    write_out: BytesMut,
    read_raw: Box<[u8; 16 * 1024]>,
    read_plain: BytesMut,
    eof: bool,
}

impl<S> CipherStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(inner: S, kind: CipherKind, master_key: Vec<u8>) -> Self {
        CipherStream {
            inner,
            encryptor: Encryptor::new_encrypt(kind, master_key.clone()),
            decryptor: Encryptor::new_decrypt(kind, master_key),
            write_out: BytesMut::new(),
            read_raw: Box::new([0u8; 16 * 1024]),
            read_plain: BytesMut::new(),
            eof: false,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Escape hatch to the raw transport, bypassing AEAD/stream framing
    /// entirely — used for the anti-probe noise response, which must not
    /// look like a well-formed encrypted chunk.
    pub fn raw_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// The peer's salt/IV recovered so far on the decrypt side, if enough
    /// bytes have arrived to read it. Used to feed the ban registry on a
    /// malformed-header failure without needing the full plaintext.
    pub fn peer_iv(&self) -> Option<&[u8]> {
        self.decryptor.received_iv()
    }

    /// Best-effort: push as much of `write_out` to `inner` as will go
    /// without blocking. Returns `Pending` only if nothing could be
    /// flushed and the buffer is still non-empty.
    fn drain_write_buf(
        inner: &mut S,
        write_out: &mut BytesMut,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<()>> {
        while !write_out.is_empty() {
            match Pin::new(&mut *inner).poll_write(cx, write_out) {
                Poll::Ready(Ok(0)) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "wrote zero bytes to peer",
                    )))
                }
                Poll::Ready(Ok(n)) => write_out.advance(n),
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(()))
    }
}

impl<S> AsyncRead for CipherStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.read_plain.is_empty() {
                let n = buf.remaining().min(this.read_plain.len());
                buf.put_slice(&this.read_plain[..n]);
                this.read_plain.advance(n);
                return Poll::Ready(Ok(()));
            }
            if this.eof {
                return Poll::Ready(Ok(()));
            }

            let mut raw = ReadBuf::new(this.read_raw.as_mut_slice());
            match Pin::new(&mut this.inner).poll_read(cx, &mut raw) {
                Poll::Ready(Ok(())) => {
                    let filled = raw.filled();
                    if filled.is_empty() {
                        this.eof = true;
                        continue;
                    }
                    let mut plain = Vec::new();
                    this.decryptor
                        .decrypt(filled, &mut plain)
                        .map_err(to_io_err)?;
                    this.read_plain.extend_from_slice(&plain);
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<S> AsyncWrite for CipherStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if let Poll::Pending = Self::drain_write_buf(&mut this.inner, &mut this.write_out, cx) {
            return Poll::Pending;
        }

        let mut framed = Vec::new();
        this.encryptor.encrypt(buf, &mut framed).map_err(to_io_err)?;
        this.write_out.extend_from_slice(&framed);

        // Try to push the freshly framed bytes out immediately; if the
        // socket applies backpressure partway through, the remainder
        // stays buffered in `write_out` for the next poll_write/flush.
        let _ = Self::drain_write_buf(&mut this.inner, &mut this.write_out, cx);

        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Self::drain_write_buf(&mut this.inner, &mut this.write_out, cx) {
            Poll::Ready(Ok(())) => Pin::new(&mut this.inner).poll_flush(cx),
            other => other,
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Self::drain_write_buf(&mut this.inner, &mut this.write_out, cx) {
            Poll::Ready(Ok(())) => Pin::new(&mut this.inner).poll_shutdown(cx),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::evp_bytes_to_key;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn roundtrips_through_a_duplex_pipe() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let key = evp_bytes_to_key(b"s3cr3t", 32);

        let mut client = CipherStream::new(client_io, CipherKind::Aes256Gcm, key.clone());
        let mut server = CipherStream::new(server_io, CipherKind::Aes256Gcm, key);

        client.write_all(b"ping").await.unwrap();
        client.flush().await.unwrap();

        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.write_all(b"pong!").await.unwrap();
        server.flush().await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");
    }
}
