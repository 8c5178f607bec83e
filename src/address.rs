//! Shadowsocks address header: category derivation, wire codec, and the
//! per-relay destination Address (text + port + resolved IP list).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::{Error, Result};

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Category of an [`Address`], derived from its text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Ipv4,
    Ipv6,
    Host,
}

/// A Shadowsocks destination address: the text the caller handed us (a
/// domain or a literal IP), its port, and whatever IPs it has resolved to.
///
/// `ip_list` is non-empty iff `text` is a literal IP (trivially resolved)
/// or an asynchronous DNS lookup has completed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    text: String,
    port: u16,
    ip_list: Vec<IpAddr>,
}

impl Address {
    /// Construct from a hostname/IP literal and port. If `text` parses as
    /// a literal IP, `ip_list` is populated immediately.
    pub fn new(text: impl Into<String>, port: u16) -> Self {
        let text = text.into();
        let ip_list = match text.parse::<IpAddr>() {
            Ok(ip) => vec![ip],
            Err(_) => Vec::new(),
        };
        Address {
            text,
            port,
            ip_list,
        }
    }

    /// Construct directly from a resolved IP.
    pub fn from_ip(ip: IpAddr, port: u16) -> Self {
        Address {
            text: ip.to_string(),
            port,
            ip_list: vec![ip],
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn ip_list(&self) -> &[IpAddr] {
        &self.ip_list
    }

    pub fn category(&self) -> Category {
        if self.text.parse::<Ipv4Addr>().is_ok() {
            Category::Ipv4
        } else if self.text.parse::<Ipv6Addr>().is_ok() {
            Category::Ipv6
        } else {
            Category::Host
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.ip_list.is_empty()
    }

    /// First resolved IP, if any.
    pub fn first_ip(&self) -> Option<IpAddr> {
        self.ip_list.first().copied()
    }

    /// Replace the text (and port, if given) of this address; clears the
    /// previously resolved IP list unless the new text is itself a literal
    /// IP.
    pub fn set_address(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.ip_list = match self.text.parse::<IpAddr>() {
            Ok(ip) => vec![ip],
            Err(_) => Vec::new(),
        };
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    /// Atomically install a resolved IP list (called once by the DNS
    /// resolver callback on success).
    pub fn set_ip_address(&mut self, ips: Vec<IpAddr>) {
        self.ip_list = ips;
    }

    pub fn to_socket_addr(&self) -> Option<std::net::SocketAddr> {
        self.first_ip().map(|ip| std::net::SocketAddr::new(ip, self.port))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.category() {
            Category::Ipv6 => write!(f, "[{}]:{}", self.text, self.port),
            _ => write!(f, "{}:{}", self.text, self.port),
        }
    }
}

/// Pack a Shadowsocks header: `ATYP | ADDR | PORT`.
pub fn pack(addr: &Address) -> Vec<u8> {
    let mut out = Vec::with_capacity(addr.text().len() + 7);
    match addr.category() {
        Category::Ipv4 => {
            out.push(ATYP_IPV4);
            let ip: Ipv4Addr = addr.text().parse().expect("category guarantees parse");
            out.extend_from_slice(&ip.octets());
        }
        Category::Ipv6 => {
            out.push(ATYP_IPV6);
            let ip: Ipv6Addr = addr.text().parse().expect("category guarantees parse");
            out.extend_from_slice(&ip.octets());
        }
        Category::Host => {
            out.push(ATYP_DOMAIN);
            let bytes = addr.text().as_bytes();
            out.push(bytes.len() as u8);
            out.extend_from_slice(bytes);
        }
    }
    out.extend_from_slice(&addr.port().to_be_bytes());
    out
}

/// Parse a Shadowsocks header from `buf`.
///
/// Returns `(address, header_len)`. `header_len == 0` is the sentinel for
/// "unparseable because truncated" — callers on the server
/// path treat that as grounds for the ban-registry failure bookkeeping.
/// `BadHeader` is reserved for a structurally invalid ATYP or an explicit
/// length field that overruns the buffer in a way that isn't just "need
/// more bytes" (e.g. ATYP outside {1,3,4}).
pub fn parse(buf: &[u8]) -> Result<(Address, usize)> {
    if buf.is_empty() {
        return Ok((Address::new("0.0.0.0", 0), 0));
    }
    let atyp = buf[0];
    match atyp {
        ATYP_IPV4 => {
            if buf.len() < 7 {
                return Ok((Address::new("0.0.0.0", 0), 0));
            }
            let ip = Ipv4Addr::new(buf[1], buf[2], buf[3], buf[4]);
            let port = u16::from_be_bytes([buf[5], buf[6]]);
            Ok((Address::from_ip(IpAddr::V4(ip), port), 7))
        }
        ATYP_IPV6 => {
            if buf.len() < 19 {
                return Ok((Address::new("0.0.0.0", 0), 0));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[1..17]);
            let ip = Ipv6Addr::from(octets);
            let port = u16::from_be_bytes([buf[17], buf[18]]);
            Ok((Address::from_ip(IpAddr::V6(ip), port), 19))
        }
        ATYP_DOMAIN => {
            if buf.len() < 2 {
                return Ok((Address::new("0.0.0.0", 0), 0));
            }
            let len = buf[1] as usize;
            let header_len = 2 + len + 2;
            if buf.len() < header_len {
                return Ok((Address::new("0.0.0.0", 0), 0));
            }
            let domain = std::str::from_utf8(&buf[2..2 + len])
                .map_err(|e| Error::bad_header(format!("invalid domain utf8: {e}")))?;
            let port = u16::from_be_bytes([buf[header_len - 2], buf[header_len - 1]]);
            Ok((Address::new(domain, port), header_len))
        }
        other => Err(Error::bad_header(format!("unknown ATYP {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_ipv4_matches_spec_example() {
        let addr = Address::new("127.0.0.1", 1080);
        let packed = pack(&addr);
        assert_eq!(packed, vec![0x01, 0x7F, 0x00, 0x00, 0x01, 0x04, 0x38]);
    }

    #[test]
    fn pack_parse_roundtrip_ipv4() {
        let addr = Address::new("192.168.1.1", 443);
        let packed = pack(&addr);
        let (parsed, len) = parse(&packed).unwrap();
        assert_eq!(len, packed.len());
        assert_eq!(parsed.text(), addr.text());
        assert_eq!(parsed.port(), addr.port());
    }

    #[test]
    fn pack_parse_roundtrip_ipv6() {
        let addr = Address::new("::1", 8080);
        let packed = pack(&addr);
        assert_eq!(packed.len(), 19);
        let (parsed, len) = parse(&packed).unwrap();
        assert_eq!(len, 19);
        assert_eq!(parsed.category(), Category::Ipv6);
        assert_eq!(parsed.port(), 8080);
    }

    #[test]
    fn pack_parse_roundtrip_domain() {
        let addr = Address::new("example.com", 443);
        let packed = pack(&addr);
        assert_eq!(packed.len(), 1 + 1 + 11 + 2);
        let (parsed, len) = parse(&packed).unwrap();
        assert_eq!(len, packed.len());
        assert_eq!(parsed.text(), "example.com");
        assert_eq!(parsed.port(), 443);
        assert_eq!(parsed.category(), Category::Host);
    }

    #[test]
    fn parse_truncated_returns_zero_sentinel() {
        let (_, len) = parse(&[0x01, 0x7F, 0x00]).unwrap();
        assert_eq!(len, 0);
    }

    #[test]
    fn parse_truncated_domain_length_returns_zero_sentinel() {
        // claims a 10-byte domain but only 3 bytes follow
        let (_, len) = parse(&[0x03, 10, b'e', b'x', b'a']).unwrap();
        assert_eq!(len, 0);
    }

    #[test]
    fn parse_empty_returns_zero_sentinel() {
        let (_, len) = parse(&[]).unwrap();
        assert_eq!(len, 0);
    }

    #[test]
    fn parse_unknown_atyp_is_bad_header() {
        let err = parse(&[0x7F, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::BadHeader(_)));
    }

    #[test]
    fn category_derivation() {
        assert_eq!(Address::new("10.0.0.1", 1).category(), Category::Ipv4);
        assert_eq!(Address::new("fe80::1", 1).category(), Category::Ipv6);
        assert_eq!(Address::new("example.org", 1).category(), Category::Host);
    }

    #[test]
    fn set_ip_address_marks_resolved() {
        let mut addr = Address::new("example.org", 80);
        assert!(!addr.is_resolved());
        addr.set_ip_address(vec![IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))]);
        assert!(addr.is_resolved());
        assert_eq!(addr.first_ip(), Some(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))));
    }
}
