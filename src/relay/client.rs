//! Client-role TCP relay: speaks SOCKS5 to a local application, speaks
//! the Shadowsocks wire protocol to the remote server. One task per
//! accepted local connection.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::address::{self, Address};
use crate::controller::ByteCounters;
use crate::crypto::kind::CipherKind;
use crate::relay::cipher_stream::CipherStream;
use crate::relay::stage::Stage;
use crate::socks5::{self, Command, ReplyStatus};
use crate::{Error, Result};

/// The CONNECT reply's BND fields are a fixed, meaningless constant per
/// the wire contract — clients don't act on them.
const CONNECT_REPLY_BND_PORT: u16 = 0x1010;

/// Drive one local SOCKS5 connection to completion: negotiate, read the
/// request, and either relay a CONNECT stream or hold a UDP ASSOCIATE
/// control connection open. `udp_local_addr` is the already-bound UDP
/// relay socket whose address is echoed back on UDP ASSOCIATE.
pub async fn serve(
    mut local: TcpStream,
    server_addr: SocketAddr,
    kind: CipherKind,
    master_key: Vec<u8>,
    timeout: Duration,
    udp_local_addr: SocketAddr,
    counters: Arc<ByteCounters>,
) -> Result<()> {
    let mut stage = Stage::Init;

    socks5::negotiate_auth(&mut local).await?;
    stage = Stage::Addr;

    let request = tokio::time::timeout(timeout, socks5::read_request(&mut local))
        .await
        .map_err(|_| Error::Timeout)??;

    match request.command {
        Command::Connect => {
            stage = Stage::Connecting;
            debug!(%stage, target = %request.address, "client relay connecting");
            relay_connect(
                &mut local,
                request.address,
                server_addr,
                kind,
                master_key,
                timeout,
                counters,
            )
            .await
        }
        Command::UdpAssociate => {
            stage = Stage::UdpAssociate;
            debug!(%stage, "client relay holding udp associate control connection");
            // The real forwarding happens in `relay::udp`; this connection
            // just needs to stay open for as long as the association is
            // alive, and its closing tears the association down.
            let bound = Address::from_ip(udp_local_addr.ip(), udp_local_addr.port());
            socks5::write_reply(&mut local, ReplyStatus::Success, &bound).await?;
            let mut sink = [0u8; 1];
            loop {
                match local.read(&mut sink).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
            Ok(())
        }
    }
}

async fn relay_connect(
    local: &mut TcpStream,
    target: Address,
    server_addr: SocketAddr,
    kind: CipherKind,
    master_key: Vec<u8>,
    timeout: Duration,
    counters: Arc<ByteCounters>,
) -> Result<()> {
    let remote = match tokio::time::timeout(timeout, TcpStream::connect(server_addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            socks5::write_reply(
                local,
                ReplyStatus::GeneralFailure,
                &Address::new("0.0.0.0", CONNECT_REPLY_BND_PORT),
            )
            .await
            .ok();
            return Err(e.into());
        }
        Err(_) => {
            socks5::write_reply(
                local,
                ReplyStatus::HostUnreachable,
                &Address::new("0.0.0.0", CONNECT_REPLY_BND_PORT),
            )
            .await
            .ok();
            return Err(Error::Timeout);
        }
    };

    let mut cipher_stream = CipherStream::new(remote, kind, master_key);

    // First thing the server expects on this connection is the target
    // address header, as plaintext fed through the encryptor.
    use tokio::io::AsyncWriteExt;
    cipher_stream.write_all(&address::pack(&target)).await?;

    socks5::write_reply(
        local,
        ReplyStatus::Success,
        &Address::new("0.0.0.0", CONNECT_REPLY_BND_PORT),
    )
    .await?;

    let (up, down) =
        crate::common::buffer::greedy_copy_bidirectional(local, &mut cipher_stream).await?;
    counters.sent.fetch_add(up, Ordering::Relaxed);
    counters.received.fetch_add(down, Ordering::Relaxed);
    debug!(up, down, "client relay stream closed");
    Ok(())
}
