//! UDP relay (C8): one shared listening socket per role, backed by a
//! small per-client association cache of ephemeral upstream sockets —
//! the same "one outbound socket per inbound peer, reply matched back
//! by source association" shape real Shadowsocks UDP relays use for
//! full-cone-ish NAT behavior.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::address::{self, Address};
use crate::ban::BanRegistry;
use crate::crypto::encryptor::{decrypt_packet, encrypt_packet};
use crate::crypto::kind::CipherKind;
use crate::dns::Resolver;
use crate::{Error, Result};

const DATAGRAM_BUFFER: usize = 64 * 1024;

struct Association {
    socket: Arc<UdpSocket>,
    reader: tokio::task::JoinHandle<()>,
}

impl Drop for Association {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// No TTL, no capacity bound: an association's lifetime is tied to its
/// upstream socket's lifetime, not to how many other clients are active, so
/// this is a plain map rather than an LRU — eviction here would silently
/// abort a still-live reader task out from under an active client.
type AssociationCache = Mutex<HashMap<SocketAddr, Association>>;

/// Client-role UDP relay: fronts a local SOCKS5 UDP ASSOCIATE, forwards
/// each datagram to `server_addr` wrapped in Shadowsocks framing.
pub struct ClientUdpRelay {
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    kind: CipherKind,
    master_key: Vec<u8>,
    associations: AssociationCache,
}

impl ClientUdpRelay {
    pub async fn bind(
        listen_addr: SocketAddr,
        server_addr: SocketAddr,
        kind: CipherKind,
        master_key: Vec<u8>,
    ) -> Result<Self> {
        let socket = Arc::new(UdpSocket::bind(listen_addr).await?);
        Ok(ClientUdpRelay {
            socket,
            server_addr,
            kind,
            master_key,
            associations: Mutex::new(HashMap::new()),
        })
    }

    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut buf = vec![0u8; DATAGRAM_BUFFER];
        loop {
            let (n, client_addr) = self.socket.recv_from(&mut buf).await?;
            if let Err(e) = self.handle_from_app(&buf[..n], client_addr).await {
                warn!(error = %e, %client_addr, "client udp relay dropped datagram");
            }
        }
    }

    async fn handle_from_app(&self, datagram: &[u8], client_addr: SocketAddr) -> Result<()> {
        let (target, header_len) = crate::socks5::parse_udp_header(datagram)?;
        let payload = &datagram[header_len..];

        let mut plaintext = address::pack(&target);
        plaintext.extend_from_slice(payload);
        let encrypted = encrypt_packet(self.kind, &self.master_key, &plaintext)?;

        let assoc_socket = self.association_for(client_addr).await?;
        assoc_socket.send(&encrypted).await?;
        Ok(())
    }

    /// Get the ephemeral socket dedicated to `client_addr`, creating it
    /// (and its reply-forwarding task) on first use.
    async fn association_for(&self, client_addr: SocketAddr) -> Result<Arc<UdpSocket>> {
        let mut cache = self.associations.lock().await;
        if let Some(assoc) = cache.get(&client_addr) {
            return Ok(assoc.socket.clone());
        }

        let upstream = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        upstream.connect(self.server_addr).await?;

        let reader = tokio::spawn(forward_replies_to_app(
            upstream.clone(),
            self.socket.clone(),
            client_addr,
            self.kind,
            self.master_key.clone(),
        ));

        let socket = upstream.clone();
        cache.insert(client_addr, Association { socket: upstream, reader });
        Ok(socket)
    }
}

async fn forward_replies_to_app(
    upstream: Arc<UdpSocket>,
    main_socket: Arc<UdpSocket>,
    client_addr: SocketAddr,
    kind: CipherKind,
    master_key: Vec<u8>,
) {
    let mut buf = vec![0u8; DATAGRAM_BUFFER];
    loop {
        let n = match upstream.recv(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, %client_addr, "client udp association reader exiting");
                return;
            }
        };
        let plaintext = match decrypt_packet(kind, &master_key, &buf[..n]) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "dropping undecryptable udp reply");
                continue;
            }
        };
        let (source, header_len) = match address::parse(&plaintext) {
            Ok((addr, len)) if len > 0 => (addr, len),
            _ => {
                warn!("dropping udp reply with malformed address header");
                continue;
            }
        };
        let mut out = crate::socks5::build_udp_header(&source);
        out.extend_from_slice(&plaintext[header_len..]);
        let _ = main_socket.send_to(&out, client_addr).await;
    }
}

/// Server-role UDP relay: receives Shadowsocks-framed datagrams from
/// clients, recovers the embedded address header, and forwards the raw
/// payload to whatever destination it names.
pub struct ServerUdpRelay {
    socket: Arc<UdpSocket>,
    kind: CipherKind,
    master_key: Vec<u8>,
    resolver: Arc<Resolver>,
    ban: Arc<BanRegistry>,
    associations: AssociationCache,
}

impl ServerUdpRelay {
    pub async fn bind(
        listen_addr: SocketAddr,
        kind: CipherKind,
        master_key: Vec<u8>,
        resolver: Arc<Resolver>,
        ban: Arc<BanRegistry>,
    ) -> Result<Self> {
        let socket = Arc::new(UdpSocket::bind(listen_addr).await?);
        Ok(ServerUdpRelay {
            socket,
            kind,
            master_key,
            resolver,
            ban,
            associations: Mutex::new(HashMap::new()),
        })
    }

    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut buf = vec![0u8; DATAGRAM_BUFFER];
        loop {
            let (n, client_addr) = self.socket.recv_from(&mut buf).await?;
            if self.ban.is_banned(&client_addr.ip()) {
                debug!(%client_addr, "server udp relay dropped datagram from banned sender");
                continue;
            }
            if let Err(e) = self.handle_from_client(&buf[..n], client_addr).await {
                warn!(error = %e, %client_addr, "server udp relay dropped datagram");
            }
        }
    }

    async fn handle_from_client(&self, datagram: &[u8], client_addr: SocketAddr) -> Result<()> {
        let iv_len = self.kind.info().iv_len;
        let plaintext = match decrypt_packet(self.kind, &self.master_key, datagram) {
            Ok(p) => p,
            Err(e) => {
                self.ban.record_failure(client_addr.ip(), datagram.get(..iv_len).unwrap_or(datagram));
                return Err(e);
            }
        };
        let (mut target, header_len) = match address::parse(&plaintext) {
            Ok((addr, len)) if len > 0 => (addr, len),
            _ => {
                self.ban.record_failure(client_addr.ip(), &plaintext);
                return Err(Error::bad_header("truncated udp relay header"));
            }
        };
        let payload = &plaintext[header_len..];

        if !target.is_resolved() {
            self.resolver.lookup_into(target.text(), &mut target).await?;
        }
        let dest = target
            .to_socket_addr()
            .ok_or_else(|| Error::dns("address has no resolved IP"))?;

        let upstream = self.association_for(client_addr).await?;
        upstream.send_to(payload, dest).await?;
        Ok(())
    }

    async fn association_for(&self, client_addr: SocketAddr) -> Result<Arc<UdpSocket>> {
        let mut cache = self.associations.lock().await;
        if let Some(assoc) = cache.get(&client_addr) {
            return Ok(assoc.socket.clone());
        }

        let upstream = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        let reader = tokio::spawn(forward_replies_to_client(
            upstream.clone(),
            self.socket.clone(),
            client_addr,
            self.kind,
            self.master_key.clone(),
        ));

        let socket = upstream.clone();
        cache.insert(client_addr, Association { socket: upstream, reader });
        Ok(socket)
    }
}

async fn forward_replies_to_client(
    upstream: Arc<UdpSocket>,
    main_socket: Arc<UdpSocket>,
    client_addr: SocketAddr,
    kind: CipherKind,
    master_key: Vec<u8>,
) {
    let mut buf = vec![0u8; DATAGRAM_BUFFER];
    loop {
        let (n, from) = match upstream.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, %client_addr, "server udp association reader exiting");
                return;
            }
        };
        let source = Address::from_ip(from.ip(), from.port());
        let mut plaintext = address::pack(&source);
        plaintext.extend_from_slice(&buf[..n]);

        let encrypted = match encrypt_packet(kind, &master_key, &plaintext) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "failed to encrypt udp reply");
                continue;
            }
        };
        let _ = main_socket.send_to(&encrypted, client_addr).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_relay_binds_and_creates_associations_lazily() {
        let relay = ClientUdpRelay::bind(
            "127.0.0.1:0".parse().unwrap(),
            "127.0.0.1:1".parse().unwrap(),
            CipherKind::Aes128Gcm,
            vec![0u8; 16],
        )
        .await
        .unwrap();
        assert_eq!(relay.associations.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn malformed_datagram_records_a_ban_failure() {
        let ban = Arc::new(BanRegistry::new());
        let relay = ServerUdpRelay::bind(
            "127.0.0.1:0".parse().unwrap(),
            CipherKind::Aes128Gcm,
            vec![0u8; 16],
            Arc::new(Resolver::new().unwrap()),
            ban.clone(),
        )
        .await
        .unwrap();

        let client_addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert!(relay.handle_from_client(b"not a real packet", client_addr).await.is_err());
        assert!(relay.handle_from_client(b"not a real packet", client_addr).await.is_err());
        assert!(ban.is_banned(&client_addr.ip()));
    }
}
