//! Controller (C10): owns a [`Profile`], the derived server address, the
//! TCP acceptor, and the UDP relay; starts and stops them together and
//! aggregates their byte counters. Compose components in `new`, spawn
//! each as a task in `start`, collect join handles to tear down in
//! `stop`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::ban::BanRegistry;
use crate::dns::Resolver;
use crate::profile::Profile;
use crate::relay::{acceptor, udp};
use crate::{Error, Result};

/// Which side of the protocol this controller runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Byte counters aggregated from every relay this controller owns,
/// exposed as bytes-received/bytes-sent totals.
#[derive(Default)]
pub struct ByteCounters {
    pub received: AtomicU64,
    pub sent: AtomicU64,
}

impl ByteCounters {
    pub fn totals(&self) -> (u64, u64) {
        (
            self.received.load(Ordering::Relaxed),
            self.sent.load(Ordering::Relaxed),
        )
    }
}

pub struct Controller {
    profile: Profile,
    role: Role,
    resolver: Arc<Resolver>,
    ban: Arc<BanRegistry>,
    counters: Arc<ByteCounters>,
    running_tx: watch::Sender<bool>,
    running_rx: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Controller {
    pub fn new(profile: Profile, role: Role) -> Result<Self> {
        let (running_tx, running_rx) = watch::channel(false);
        Ok(Controller {
            profile,
            role,
            resolver: Arc::new(Resolver::new()?),
            ban: Arc::new(BanRegistry::new()),
            counters: Arc::new(ByteCounters::default()),
            running_tx,
            running_rx,
            tasks: Vec::new(),
        })
    }

    /// Observe start/stop transitions without polling.
    pub fn state_changes(&self) -> watch::Receiver<bool> {
        self.running_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        *self.running_rx.borrow()
    }

    pub fn totals(&self) -> (u64, u64) {
        self.counters.totals()
    }

    /// Resolve the server address once at boot (blocking on that one
    /// lookup, non-fatal on failure) and bind both the TCP acceptor and
    /// the UDP relay.
    pub async fn start(&mut self) -> Result<()> {
        let kind = self.profile.cipher_kind()?;
        let master_key =
            crate::crypto::keys::evp_bytes_to_key(self.profile.password.as_bytes(), kind.info().key_len);
        let timeout = Duration::from_secs(self.profile.timeout_secs);

        let server_addr = self.resolve_server_addr().await;

        match self.role {
            Role::Client => self.start_client(kind, master_key, server_addr, timeout).await?,
            Role::Server => self.start_server(kind, master_key, server_addr, timeout).await?,
        }

        self.running_tx.send_replace(true);
        info!(role = ?self.role, "controller started");
        Ok(())
    }

    async fn resolve_server_addr(&self) -> SocketAddr {
        if let Ok(ip) = self.profile.server_address.parse() {
            return SocketAddr::new(ip, self.profile.server_port);
        }
        match self.resolver.resolve(&self.profile.server_address).await {
            Ok(ip) => SocketAddr::new(ip, self.profile.server_port),
            Err(e) => {
                warn!(error = %e, host = %self.profile.server_address, "failed to resolve server address at startup");
                SocketAddr::new(std::net::Ipv4Addr::UNSPECIFIED.into(), self.profile.server_port)
            }
        }
    }

    async fn start_client(
        &mut self,
        kind: crate::crypto::kind::CipherKind,
        master_key: Vec<u8>,
        server_addr: SocketAddr,
        timeout: Duration,
    ) -> Result<()> {
        let local_addr: SocketAddr = format!("{}:{}", self.profile.local_address, self.profile.local_port)
            .parse()
            .map_err(|_| Error::config("invalid local_address/local_port"))?;

        let udp_relay = Arc::new(
            udp::ClientUdpRelay::bind(
                SocketAddr::new(local_addr.ip(), 0),
                server_addr,
                kind,
                master_key.clone(),
            )
            .await?,
        );
        let udp_local_addr = local_addr; // echoed back in the UDP ASSOCIATE reply
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = udp_relay.run().await {
                warn!(error = %e, "client udp relay stopped");
            }
        }));

        let counters = self.counters.clone();
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = acceptor::run_client(
                local_addr,
                server_addr,
                kind,
                master_key,
                timeout,
                udp_local_addr,
                counters,
            )
            .await
            {
                warn!(error = %e, "client tcp acceptor stopped");
            }
        }));
        Ok(())
    }

    async fn start_server(
        &mut self,
        kind: crate::crypto::kind::CipherKind,
        master_key: Vec<u8>,
        server_addr: SocketAddr,
        timeout: Duration,
    ) -> Result<()> {
        let listen_addr = server_addr;

        let udp_relay = Arc::new(
            udp::ServerUdpRelay::bind(
                listen_addr,
                kind,
                master_key.clone(),
                self.resolver.clone(),
                self.ban.clone(),
            )
            .await?,
        );
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = udp_relay.run().await {
                warn!(error = %e, "server udp relay stopped");
            }
        }));

        let resolver = self.resolver.clone();
        let ban = self.ban.clone();
        let counters = self.counters.clone();
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = acceptor::run_server(
                listen_addr,
                kind,
                master_key,
                timeout,
                true,
                resolver,
                ban,
                counters,
            )
            .await
            {
                warn!(error = %e, "server tcp acceptor stopped");
            }
        }));
        Ok(())
    }

    /// Abort every spawned task and mark the controller stopped.
    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.running_tx.send_replace(false);
        info!("controller stopped");
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}
