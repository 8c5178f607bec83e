//! Server-role TCP relay: accepts an encrypted connection from a
//! Shadowsocks client, recovers the plaintext address header, dials the
//! real destination, and pipes bytes both ways.

use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

use crate::address;
use crate::ban::BanRegistry;
use crate::controller::ByteCounters;
use crate::crypto::kind::CipherKind;
use crate::dns::Resolver;
use crate::relay::cipher_stream::CipherStream;
use crate::relay::stage::Stage;
use crate::{Error, Result};

/// Random noise sent back on a malformed header, so a probe that sends
/// garbage can't distinguish "wrong password" from "connection refused"
/// by response shape alone.
async fn send_noise<S: tokio::io::AsyncWrite + Unpin>(stream: &mut S) {
    use rand::RngCore;
    use tokio::io::AsyncWriteExt;

    let mut rng = rand::thread_rng();
    let len = 16 + (rng.next_u32() % 49) as usize; // 16..=64
    let mut noise = vec![0u8; len];
    rng.fill_bytes(&mut noise);
    let _ = stream.write_all(&noise).await;
}

pub struct ServerOptions {
    pub kind: CipherKind,
    pub master_key: Vec<u8>,
    pub timeout: Duration,
    pub noise_on_malformed_header: bool,
}

/// Drive one accepted connection. `peer_ip` feeds the ban registry's
/// failure bookkeeping on a malformed/unauthenticated header.
pub async fn serve(
    conn: TcpStream,
    peer_ip: IpAddr,
    opts: ServerOptions,
    resolver: Arc<Resolver>,
    ban: Arc<BanRegistry>,
    counters: Arc<ByteCounters>,
) -> Result<()> {
    let mut stage = Stage::Init;
    let mut cipher_stream = CipherStream::new(conn, opts.kind, opts.master_key);

    stage = Stage::Addr;
    let target = match read_address_header(&mut cipher_stream, opts.timeout).await {
        Ok(addr) => addr,
        Err(e) => {
            let iv = cipher_stream.peer_iv().unwrap_or(&[]).to_vec();
            ban.record_failure(peer_ip, &iv);
            if opts.noise_on_malformed_header {
                send_noise(cipher_stream.raw_mut()).await;
            }
            return Err(e);
        }
    };
    debug!(%stage, target = %target, "server relay parsed address header");

    stage = Stage::Dns;
    let target = if target.is_resolved() {
        target
    } else {
        let mut target = target;
        resolver.lookup_into(target.text(), &mut target).await?;
        target
    };

    stage = Stage::Connecting;
    let dest_addr = target
        .to_socket_addr()
        .ok_or_else(|| Error::dns("address has no resolved IP"))?;
    let upstream = tokio::time::timeout(opts.timeout, TcpStream::connect(dest_addr))
        .await
        .map_err(|_| Error::Timeout)??;
    let mut upstream = upstream;

    stage = Stage::Stream;
    let (up, down) =
        crate::common::buffer::greedy_copy_bidirectional(&mut cipher_stream, &mut upstream)
            .await?;
    counters.received.fetch_add(up, Ordering::Relaxed);
    counters.sent.fetch_add(down, Ordering::Relaxed);
    debug!(up, down, "server relay stream closed");
    Ok(())
}

/// Read and parse the Shadowsocks address header off `stream`,
/// accumulating bytes until `address::parse` reports a complete header
/// or the buffer grows unreasonably large (itself treated as malformed).
async fn read_address_header<S>(stream: &mut S, timeout: Duration) -> Result<address::Address>
where
    S: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    const MAX_HEADER_LEN: usize = 2 + 255 + 2; // domain variant, worst case
    let mut buf = Vec::with_capacity(32);
    let mut byte = [0u8; 1];

    loop {
        match address::parse(&buf) {
            Ok((addr, len)) if len > 0 => return Ok(addr),
            Ok(_) => {}
            Err(e) => return Err(e),
        }
        if buf.len() >= MAX_HEADER_LEN {
            return Err(Error::bad_header("address header exceeds maximum length"));
        }
        tokio::time::timeout(timeout, stream.read_exact(&mut byte))
            .await
            .map_err(|_| Error::Timeout)??;
        buf.push(byte[0]);
    }
}
