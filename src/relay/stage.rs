//! Named states a single relayed connection passes through. Purely
//! diagnostic — logged at each transition — but also gives the rest of
//! the module vocabulary for "where did this connection die".

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Addr,
    UdpAssociate,
    Dns,
    Connecting,
    Stream,
    Destroyed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Addr => "addr",
            Stage::UdpAssociate => "udp_associate",
            Stage::Dns => "dns",
            Stage::Connecting => "connecting",
            Stage::Stream => "stream",
            Stage::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}
