//! RFC 1928 negotiation, restricted to what XEP-0065 uses: no
//! authentication (method 0x00), the CONNECT command, and domain-name
//! destinations carrying the session hash.

use core::fmt;
use std::error::Error as StdError;
use std::io::{self, ErrorKind};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub(crate) const VERSION_BYTE: u8 = 5;
const METHOD_NONE: u8 = 0;
const METHOD_UNACCEPTABLE: u8 = 0xFF;
const CMD_CONNECT: u8 = 1;
const ATYP_IPV4: u8 = 1;
const ATYP_DOMAIN: u8 = 3;
const ATYP_IPV6: u8 = 4;

/// Reply codes of RFC 1928 §6.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksStatus {
    /// Request granted.
    Succeeded = 0,
    /// General SOCKS server failure.
    GeneralFailure = 1,
    /// Connection not allowed by ruleset.
    NotAllowedByRuleset = 2,
    /// Network unreachable.
    NetworkUnreachable = 3,
    /// Host unreachable.
    HostUnreachable = 4,
    /// Connection refused.
    ConnectionRefused = 5,
    /// TTL expired.
    TtlExpired = 6,
    /// Command not supported.
    CommandNotSupported = 7,
    /// Address type not supported.
    AtypNotSupported = 8,
}

impl SocksStatus {
    fn from_u8(value: u8) -> SocksStatus {
        match value {
            0 => SocksStatus::Succeeded,
            1 => SocksStatus::GeneralFailure,
            2 => SocksStatus::NotAllowedByRuleset,
            3 => SocksStatus::NetworkUnreachable,
            4 => SocksStatus::HostUnreachable,
            5 => SocksStatus::ConnectionRefused,
            6 => SocksStatus::TtlExpired,
            7 => SocksStatus::CommandNotSupported,
            _ => SocksStatus::AtypNotSupported,
        }
    }
}

/// Failures during SOCKS5 negotiation. Always transfer-local: the XMPP
/// session is unaffected.
#[derive(Debug)]
pub enum Socks5Error {
    /// Transport error during negotiation.
    Io(io::Error),
    /// The peer spoke something that is not SOCKS version 5.
    BadVersion(u8),
    /// No mutually acceptable authentication method (we only do none).
    NoAcceptableMethod,
    /// The peer asked for a command other than CONNECT.
    BadCommand(u8),
    /// The peer used an address type we do not handle here.
    BadAddressType(u8),
    /// The server answered CONNECT with a non-success status.
    Refused(SocksStatus),
    /// The CONNECT destination did not carry the expected session hash.
    HashMismatch,
}

impl fmt::Display for Socks5Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Socks5Error::Io(e) => write!(fmt, "I/O error: {}", e),
            Socks5Error::BadVersion(v) => write!(fmt, "not SOCKS5 (version byte {})", v),
            Socks5Error::NoAcceptableMethod => write!(fmt, "no acceptable SOCKS5 method"),
            Socks5Error::BadCommand(c) => write!(fmt, "unsupported SOCKS5 command {}", c),
            Socks5Error::BadAddressType(a) => write!(fmt, "unsupported SOCKS5 atyp {}", a),
            Socks5Error::Refused(status) => write!(fmt, "SOCKS5 request refused: {:?}", status),
            Socks5Error::HashMismatch => write!(fmt, "SOCKS5 destination hash mismatch"),
        }
    }
}

impl StdError for Socks5Error {}

impl From<io::Error> for Socks5Error {
    fn from(e: io::Error) -> Socks5Error {
        Socks5Error::Io(e)
    }
}

/// Client side: negotiate method 0x00 and CONNECT to a domain-name
/// destination. XEP-0065 always sends the 40-digit session hash as the
/// domain and port 0.
pub async fn connect<S>(stream: &mut S, dst: &str, port: u16) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    stream
        .write_all(&[VERSION_BYTE, 1, METHOD_NONE])
        .await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    if reply[0] != VERSION_BYTE {
        return Err(Socks5Error::BadVersion(reply[0]));
    }
    if reply[1] != METHOD_NONE {
        return Err(Socks5Error::NoAcceptableMethod);
    }

    let mut request = Vec::with_capacity(7 + dst.len());
    request.extend_from_slice(&[VERSION_BYTE, CMD_CONNECT, 0, ATYP_DOMAIN, dst.len() as u8]);
    request.extend_from_slice(dst.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != VERSION_BYTE {
        return Err(Socks5Error::BadVersion(head[0]));
    }
    let status = SocksStatus::from_u8(head[1]);

    // Drain the bound address even on failure so the stream stays usable.
    match head[3] {
        ATYP_IPV4 => {
            let mut addr = [0u8; 4 + 2];
            stream.read_exact(&mut addr).await?;
        }
        ATYP_IPV6 => {
            let mut addr = [0u8; 16 + 2];
            stream.read_exact(&mut addr).await?;
        }
        ATYP_DOMAIN => {
            let len = stream.read_u8().await? as usize;
            let mut addr = vec![0u8; len + 2];
            stream.read_exact(&mut addr).await?;
        }
        other => return Err(Socks5Error::BadAddressType(other)),
    }

    if status != SocksStatus::Succeeded {
        return Err(Socks5Error::Refused(status));
    }
    Ok(())
}

/// Server side: accept a no-auth CONNECT whose domain-name destination
/// equals `expected_dst`, and acknowledge it by echoing the destination.
/// A destination mismatch is refused before any payload flows.
pub async fn accept<S>(stream: &mut S, expected_dst: &str) -> Result<(), Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let version = stream.read_u8().await?;
    if version != VERSION_BYTE {
        return Err(Socks5Error::BadVersion(version));
    }
    let nmethods = stream.read_u8().await?;
    let mut none_offered = false;
    for _ in 0..nmethods {
        if stream.read_u8().await? == METHOD_NONE {
            none_offered = true;
        }
    }
    if !none_offered {
        stream
            .write_all(&[VERSION_BYTE, METHOD_UNACCEPTABLE])
            .await?;
        return Err(Socks5Error::NoAcceptableMethod);
    }
    stream.write_all(&[VERSION_BYTE, METHOD_NONE]).await?;

    let version = stream.read_u8().await?;
    if version != VERSION_BYTE {
        return Err(Socks5Error::BadVersion(version));
    }
    let command = stream.read_u8().await?;
    if command != CMD_CONNECT {
        reply(stream, SocksStatus::CommandNotSupported, "", 0).await?;
        return Err(Socks5Error::BadCommand(command));
    }
    let _reserved = stream.read_u8().await?;
    let atyp = stream.read_u8().await?;
    if atyp != ATYP_DOMAIN {
        reply(stream, SocksStatus::AtypNotSupported, "", 0).await?;
        return Err(Socks5Error::BadAddressType(atyp));
    }

    let len = stream.read_u8().await? as usize;
    let mut dst = vec![0u8; len];
    stream.read_exact(&mut dst).await?;
    let port = stream.read_u16().await?;

    let dst = match core::str::from_utf8(&dst) {
        Ok(dst) => dst.to_owned(),
        Err(_) => {
            reply(stream, SocksStatus::NotAllowedByRuleset, "", 0).await?;
            return Err(Socks5Error::HashMismatch);
        }
    };
    if dst != expected_dst {
        reply(stream, SocksStatus::NotAllowedByRuleset, "", 0).await?;
        return Err(Socks5Error::HashMismatch);
    }

    reply(stream, SocksStatus::Succeeded, &dst, port).await?;
    Ok(())
}

async fn reply<S>(
    stream: &mut S,
    status: SocksStatus,
    dst: &str,
    port: u16,
) -> Result<(), io::Error>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = Vec::with_capacity(7 + dst.len());
    buf.extend_from_slice(&[VERSION_BYTE, status as u8, 0, ATYP_DOMAIN, dst.len() as u8]);
    buf.extend_from_slice(dst.as_bytes());
    buf.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&buf).await?;
    if status != SocksStatus::Succeeded {
        stream.flush().await?;
    }
    Ok(())
}

/// Map negotiation failures onto a transfer-local I/O error.
impl From<Socks5Error> for io::Error {
    fn from(e: Socks5Error) -> io::Error {
        match e {
            Socks5Error::Io(e) => e,
            other => io::Error::new(ErrorKind::ConnectionRefused, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0c2b681391a4a8df02343e1d93a93fb72dd3b226";

    #[tokio::test]
    async fn connect_against_accept() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let server_task = tokio::spawn(async move { accept(&mut server, HASH).await });
        connect(&mut client, HASH, 0).await.unwrap();
        server_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn accept_rejects_wrong_hash() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let server_task = tokio::spawn(async move { accept(&mut server, HASH).await });
        let client_err = connect(&mut client, "ffffffffffffffffffffffffffffffffffffffff", 0)
            .await
            .unwrap_err();
        assert!(matches!(
            client_err,
            Socks5Error::Refused(SocksStatus::NotAllowedByRuleset)
        ));
        assert!(matches!(
            server_task.await.unwrap().unwrap_err(),
            Socks5Error::HashMismatch
        ));
    }

    #[tokio::test]
    async fn accept_requires_no_auth_method() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let server_task = tokio::spawn(async move { accept(&mut server, HASH).await });
        // Offer only username/password (0x02).
        client.write_all(&[VERSION_BYTE, 1, 2]).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [VERSION_BYTE, METHOD_UNACCEPTABLE]);
        assert!(matches!(
            server_task.await.unwrap().unwrap_err(),
            Socks5Error::NoAcceptableMethod
        ));
    }

    #[tokio::test]
    async fn connect_surfaces_refusal() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut greeting = [0u8; 3];
            server.read_exact(&mut greeting).await.unwrap();
            server.write_all(&[VERSION_BYTE, METHOD_NONE]).await.unwrap();
            let mut head = [0u8; 5];
            server.read_exact(&mut head).await.unwrap();
            let mut rest = vec![0u8; head[4] as usize + 2];
            server.read_exact(&mut rest).await.unwrap();
            // HostUnreachable with an empty domain destination.
            server
                .write_all(&[VERSION_BYTE, 4, 0, ATYP_DOMAIN, 0, 0, 0])
                .await
                .unwrap();
        });
        let err = connect(&mut client, HASH, 0).await.unwrap_err();
        assert!(matches!(
            err,
            Socks5Error::Refused(SocksStatus::HostUnreachable)
        ));
    }
}
