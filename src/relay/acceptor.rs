//! TCP accept loops for both relay roles. Spawns one task per connection
//! off each listener, logging (not propagating) per-connection errors so
//! one bad peer can't take the listener down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::ban::BanRegistry;
use crate::controller::ByteCounters;
use crate::crypto::kind::CipherKind;
use crate::dns::Resolver;
use crate::relay::server::ServerOptions;
use crate::Result;

/// Accept local SOCKS5 connections and relay each as a client-role
/// Shadowsocks stream to `server_addr`.
pub async fn run_client(
    listen_addr: SocketAddr,
    server_addr: SocketAddr,
    kind: CipherKind,
    master_key: Vec<u8>,
    timeout: Duration,
    udp_local_addr: SocketAddr,
    counters: Arc<ByteCounters>,
) -> Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    debug!(%listen_addr, "client acceptor listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        let master_key = master_key.clone();
        let counters = counters.clone();
        tokio::spawn(async move {
            if let Err(e) = crate::relay::client::serve(
                socket,
                server_addr,
                kind,
                master_key,
                timeout,
                udp_local_addr,
                counters,
            )
            .await
            {
                if !e.is_peer_closed() {
                    warn!(%peer, error = %e, "client relay connection ended with error");
                }
            }
        });
    }
}

/// Accept encrypted connections from Shadowsocks clients and relay each
/// as a server-role stream to whatever destination its address header
/// names. Consults `ban` before doing any work, so a banned IP gets
/// nothing back at all rather than a distinguishable error response.
pub async fn run_server(
    listen_addr: SocketAddr,
    kind: CipherKind,
    master_key: Vec<u8>,
    timeout: Duration,
    noise_on_malformed_header: bool,
    resolver: Arc<Resolver>,
    ban: Arc<BanRegistry>,
    counters: Arc<ByteCounters>,
) -> Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    debug!(%listen_addr, "server acceptor listening");

    loop {
        let (socket, peer) = listener.accept().await?;

        if ban.is_banned(&peer.ip()) {
            debug!(%peer, "dropping connection from banned peer");
            drop(socket);
            continue;
        }

        let master_key = master_key.clone();
        let resolver = resolver.clone();
        let ban = ban.clone();
        let counters = counters.clone();
        let opts = ServerOptions {
            kind,
            master_key,
            timeout,
            noise_on_malformed_header,
        };

        tokio::spawn(async move {
            let peer_ip = peer.ip();
            if let Err(e) =
                crate::relay::server::serve(socket, peer_ip, opts, resolver, ban, counters).await
            {
                if !e.is_peer_closed() {
                    warn!(%peer, error = %e, "server relay connection ended with error");
                }
            }
        });
    }
}
