//! SOCKS5 front-end protocol (RFC 1928/1929): the wire codec between a
//! local application and the client-role relay. Built against
//! [`crate::address::Address`] and trimmed to the subset Shadowsocks
//! clients speak (CONNECT + UDP ASSOCIATE, no BIND).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::address::{self, Address};
use crate::{Error, Result};

const SOCKS5_VERSION: u8 = 0x05;
const AUTH_VERSION: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    NoAuth,
    UsernamePassword,
    NoAcceptable,
}

impl AuthMethod {
    fn to_byte(self) -> u8 {
        match self {
            AuthMethod::NoAuth => 0x00,
            AuthMethod::UsernamePassword => 0x02,
            AuthMethod::NoAcceptable => 0xFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    UdpAssociate,
}

impl Command {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0x01 => Ok(Command::Connect),
            0x03 => Ok(Command::UdpAssociate),
            other => Err(Error::protocol(format!("unsupported SOCKS5 command {other}"))),
        }
    }
}

/// Negotiate the auth method: read the client's greeting, pick `NoAuth`
/// if offered (the only method a Shadowsocks-fronting proxy needs), and
/// reply. Returns an error if the client didn't offer it.
pub async fn negotiate_auth<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS5_VERSION {
        stream.write_all(&[0x00, 0x5B]).await?;
        return Err(Error::protocol(format!("unsupported SOCKS version {}", header[0])));
    }
    let nmethods = header[1] as usize;
    let mut methods = vec![0u8; nmethods];
    stream.read_exact(&mut methods).await?;

    if !methods.contains(&AuthMethod::NoAuth.to_byte()) {
        stream
            .write_all(&[SOCKS5_VERSION, AuthMethod::NoAcceptable.to_byte()])
            .await?;
        return Err(Error::protocol("client did not offer no-auth"));
    }

    stream
        .write_all(&[SOCKS5_VERSION, AuthMethod::NoAuth.to_byte()])
        .await?;
    Ok(())
}

/// A parsed CONNECT/UDP ASSOCIATE request.
#[derive(Debug, Clone)]
pub struct Request {
    pub command: Command,
    pub address: Address,
}

/// Read a SOCKS5 request: `VER CMD RSV ATYP ADDR PORT`.
pub async fn read_request<S>(stream: &mut S) -> Result<Request>
where
    S: AsyncRead + Unpin,
{
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != SOCKS5_VERSION {
        return Err(Error::protocol(format!("unsupported SOCKS version {}", head[0])));
    }
    let command = Command::from_byte(head[1])?;
    let address = read_address(stream).await?;
    Ok(Request { command, address })
}

/// Read just the `ATYP ADDR PORT` portion, shared between the request
/// reply and the UDP relay header.
async fn read_address<S>(stream: &mut S) -> Result<Address>
where
    S: AsyncRead + Unpin,
{
    let atyp = {
        let mut b = [0u8; 1];
        stream.read_exact(&mut b).await?;
        b[0]
    };

    match atyp {
        0x01 => {
            let mut buf = [0u8; 6];
            stream.read_exact(&mut buf).await?;
            let mut header = vec![0x01];
            header.extend_from_slice(&buf);
            Ok(address::parse(&header)?.0)
        }
        0x04 => {
            let mut buf = [0u8; 18];
            stream.read_exact(&mut buf).await?;
            let mut header = vec![0x04];
            header.extend_from_slice(&buf);
            Ok(address::parse(&header)?.0)
        }
        0x03 => {
            let len = {
                let mut b = [0u8; 1];
                stream.read_exact(&mut b).await?;
                b[0] as usize
            };
            let mut rest = vec![0u8; len + 2];
            stream.read_exact(&mut rest).await?;
            let mut header = vec![0x03, len as u8];
            header.extend_from_slice(&rest);
            Ok(address::parse(&header)?.0)
        }
        other => Err(Error::bad_header(format!("unknown SOCKS5 ATYP {other}"))),
    }
}

/// Reply status codes (RFC 1928 §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Success,
    GeneralFailure,
    HostUnreachable,
    ConnectionRefused,
    CommandNotSupported,
}

impl ReplyStatus {
    fn to_byte(self) -> u8 {
        match self {
            ReplyStatus::Success => 0x00,
            ReplyStatus::GeneralFailure => 0x01,
            ReplyStatus::HostUnreachable => 0x04,
            ReplyStatus::ConnectionRefused => 0x05,
            ReplyStatus::CommandNotSupported => 0x07,
        }
    }
}

/// Write a SOCKS5 reply. `bound` is the address the relay ended up
/// listening/connecting on; callers without a meaningful one (errors,
/// or UDP ASSOCIATE before a socket exists) pass an all-zero stand-in.
pub async fn write_reply<S>(stream: &mut S, status: ReplyStatus, bound: &Address) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut out = vec![SOCKS5_VERSION, status.to_byte(), 0x00];
    out.extend_from_slice(&address::pack(bound));
    stream.write_all(&out).await?;
    Ok(())
}

/// UDP relay datagram header: `RSV(2) FRAG(1) ATYP ADDR PORT DATA`.
/// Shadowsocks clients always send FRAG=0; we reject anything else since
/// datagram fragmentation/reassembly is out of scope.
pub fn parse_udp_header(datagram: &[u8]) -> Result<(Address, usize)> {
    if datagram.len() < 4 {
        return Err(Error::bad_header("UDP datagram shorter than header"));
    }
    if datagram[2] != 0 {
        return Err(Error::protocol("fragmented SOCKS5 UDP datagrams are not supported"));
    }
    let (addr, header_len) = address::parse(&datagram[3..])?;
    if header_len == 0 {
        return Err(Error::bad_header("truncated UDP relay header"));
    }
    Ok((addr, 3 + header_len))
}

/// Build a UDP relay header, ready to prepend to the payload before
/// forwarding to the local SOCKS5 client.
pub fn build_udp_header(addr: &Address) -> Vec<u8> {
    let mut out = vec![0x00, 0x00, 0x00];
    out.extend_from_slice(&address::pack(addr));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn negotiate_auth_accepts_no_auth() {
        let mut stream = Builder::new()
            .read(&[0x05, 0x01, 0x00])
            .write(&[0x05, 0x00])
            .build();
        negotiate_auth(&mut stream).await.unwrap();
    }

    #[tokio::test]
    async fn negotiate_auth_rejects_non_socks5_version_with_reject_bytes() {
        let mut stream = Builder::new()
            .read(&[0x04, 0x01])
            .write(&[0x00, 0x5B])
            .build();
        assert!(negotiate_auth(&mut stream).await.is_err());
    }

    #[tokio::test]
    async fn negotiate_auth_rejects_missing_no_auth() {
        let mut stream = Builder::new()
            .read(&[0x05, 0x01, 0x02])
            .write(&[0x05, 0xFF])
            .build();
        assert!(negotiate_auth(&mut stream).await.is_err());
    }

    #[tokio::test]
    async fn read_connect_request_domain() {
        let mut wire = vec![0x05, 0x01, 0x00, 0x03];
        wire.push(b"example.com".len() as u8);
        wire.extend_from_slice(b"example.com");
        wire.extend_from_slice(&443u16.to_be_bytes());

        let mut stream = Cursor::new(wire);
        let req = read_request(&mut stream).await.unwrap();
        assert_eq!(req.command, Command::Connect);
        assert_eq!(req.address.text(), "example.com");
        assert_eq!(req.address.port(), 443);
    }

    #[tokio::test]
    async fn read_udp_associate_request_ipv4() {
        let wire = vec![0x05, 0x03, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
        let mut stream = Cursor::new(wire);
        let req = read_request(&mut stream).await.unwrap();
        assert_eq!(req.command, Command::UdpAssociate);
    }

    #[tokio::test]
    async fn write_reply_roundtrips_bound_address() {
        let bound = Address::new("127.0.0.1", 1080);
        let mut expected = vec![0x05, 0x00, 0x00];
        expected.extend_from_slice(&address::pack(&bound));

        let mut stream = Builder::new().write(&expected).build();
        write_reply(&mut stream, ReplyStatus::Success, &bound).await.unwrap();
    }

    #[test]
    fn udp_header_roundtrip() {
        let addr = Address::new("192.168.1.1", 53);
        let header = build_udp_header(&addr);
        let (parsed, len) = parse_udp_header(&header).unwrap();
        assert_eq!(len, header.len());
        assert_eq!(parsed.text(), "192.168.1.1");
        assert_eq!(parsed.port(), 53);
    }

    #[test]
    fn udp_header_rejects_fragments() {
        let mut header = build_udp_header(&Address::new("10.0.0.1", 80));
        header[2] = 1;
        assert!(parse_udp_header(&header).is_err());
    }
}
