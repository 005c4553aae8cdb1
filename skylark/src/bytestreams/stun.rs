//! A minimal STUN binding-request probe (RFC 5389 subset).
//!
//! One UDP round-trip asking a configured server which address it saw us
//! come from. Only the XOR-MAPPED-ADDRESS / MAPPED-ADDRESS attributes are
//! understood; everything else is skipped.

use core::future::Future;
use core::pin::Pin;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use log::debug;
use rand::{thread_rng, Rng};
use tokio::net::UdpSocket;

use crate::bytestreams::addr::AddressProbe;

const MAGIC_COOKIE: u32 = 0x2112_A442;
const BINDING_REQUEST: u16 = 0x0001;
const BINDING_RESPONSE: u16 = 0x0101;
const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// [`AddressProbe`] asking one STUN server.
pub struct StunProbe {
    server: (String, u16),
}

impl StunProbe {
    /// Probe against `server`.
    pub fn new(host: impl Into<String>, port: u16) -> StunProbe {
        StunProbe {
            server: (host.into(), port),
        }
    }
}

impl AddressProbe for StunProbe {
    fn external_addresses<'x>(
        &'x self,
    ) -> Pin<Box<dyn Future<Output = io::Result<Vec<IpAddr>>> + Send + 'x>> {
        Box::pin(async move {
            let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
            socket
                .connect((self.server.0.as_str(), self.server.1))
                .await?;

            let mut transaction_id = [0u8; 12];
            thread_rng().fill(&mut transaction_id);
            socket.send(&encode_binding_request(&transaction_id)).await?;

            let mut buf = [0u8; 512];
            let len = tokio::time::timeout(QUERY_TIMEOUT, socket.recv(&mut buf))
                .await
                .map_err(|_| {
                    io::Error::new(io::ErrorKind::TimedOut, "STUN server did not answer")
                })??;

            match parse_binding_response(&buf[..len], &transaction_id) {
                Some(addr) => {
                    debug!("STUN says our external address is {}", addr);
                    Ok(vec![addr])
                }
                None => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "unusable STUN response",
                )),
            }
        })
    }
}

fn encode_binding_request(transaction_id: &[u8; 12]) -> [u8; 20] {
    let mut packet = [0u8; 20];
    packet[0..2].copy_from_slice(&BINDING_REQUEST.to_be_bytes());
    // Message length: no attributes.
    packet[2..4].copy_from_slice(&0u16.to_be_bytes());
    packet[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    packet[8..20].copy_from_slice(transaction_id);
    packet
}

fn parse_binding_response(packet: &[u8], transaction_id: &[u8; 12]) -> Option<IpAddr> {
    if packet.len() < 20 {
        return None;
    }
    let message_type = u16::from_be_bytes([packet[0], packet[1]]);
    let length = u16::from_be_bytes([packet[2], packet[3]]) as usize;
    let cookie = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
    if message_type != BINDING_RESPONSE
        || cookie != MAGIC_COOKIE
        || &packet[8..20] != transaction_id
        || packet.len() < 20 + length
    {
        return None;
    }

    let mut attrs = &packet[20..20 + length];
    let mut fallback = None;
    while attrs.len() >= 4 {
        let attr_type = u16::from_be_bytes([attrs[0], attrs[1]]);
        let attr_len = u16::from_be_bytes([attrs[2], attrs[3]]) as usize;
        if attrs.len() < 4 + attr_len {
            return fallback;
        }
        let value = &attrs[4..4 + attr_len];
        match attr_type {
            ATTR_XOR_MAPPED_ADDRESS => {
                if let Some(addr) = parse_address(value, true, transaction_id) {
                    return Some(addr);
                }
            }
            ATTR_MAPPED_ADDRESS => {
                fallback = fallback.or_else(|| parse_address(value, false, transaction_id));
            }
            _ => {}
        }
        // Attributes are 32-bit aligned.
        let advance = 4 + attr_len + ((4 - attr_len % 4) % 4);
        if advance > attrs.len() {
            return fallback;
        }
        attrs = &attrs[advance..];
    }
    fallback
}

fn parse_address(value: &[u8], xored: bool, transaction_id: &[u8; 12]) -> Option<IpAddr> {
    if value.len() < 4 {
        return None;
    }
    match value[1] {
        FAMILY_IPV4 if value.len() >= 8 => {
            let mut octets = [value[4], value[5], value[6], value[7]];
            if xored {
                let magic = MAGIC_COOKIE.to_be_bytes();
                for (octet, m) in octets.iter_mut().zip(magic.iter()) {
                    *octet ^= m;
                }
            }
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        FAMILY_IPV6 if value.len() >= 20 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&value[4..20]);
            if xored {
                let mut key = [0u8; 16];
                key[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
                key[4..].copy_from_slice(transaction_id);
                for (octet, k) in octets.iter_mut().zip(key.iter()) {
                    *octet ^= k;
                }
            }
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_xor_v4(transaction_id: &[u8; 12], ip: Ipv4Addr, port: u16) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&BINDING_RESPONSE.to_be_bytes());
        packet.extend_from_slice(&12u16.to_be_bytes());
        packet.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        packet.extend_from_slice(transaction_id);
        packet.extend_from_slice(&ATTR_XOR_MAPPED_ADDRESS.to_be_bytes());
        packet.extend_from_slice(&8u16.to_be_bytes());
        packet.push(0);
        packet.push(FAMILY_IPV4);
        packet.extend_from_slice(&(port ^ 0x2112).to_be_bytes());
        let magic = MAGIC_COOKIE.to_be_bytes();
        for (octet, m) in ip.octets().iter().zip(magic.iter()) {
            packet.push(octet ^ m);
        }
        packet
    }

    #[test]
    fn xor_mapped_address_round_trip() {
        let transaction_id = [7u8; 12];
        let ip = Ipv4Addr::new(198, 51, 100, 7);
        let packet = response_with_xor_v4(&transaction_id, ip, 34567);
        assert_eq!(
            parse_binding_response(&packet, &transaction_id),
            Some(IpAddr::V4(ip))
        );
    }

    #[test]
    fn wrong_transaction_id_is_ignored() {
        let transaction_id = [7u8; 12];
        let packet =
            response_with_xor_v4(&transaction_id, Ipv4Addr::new(198, 51, 100, 7), 34567);
        assert_eq!(parse_binding_response(&packet, &[8u8; 12]), None);
    }

    #[test]
    fn garbage_is_ignored() {
        assert_eq!(parse_binding_response(b"nonsense", &[0u8; 12]), None);
    }

    #[tokio::test]
    async fn probe_against_local_responder() {
        let responder = UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();
        let server_port = responder.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, peer) = responder.recv_from(&mut buf).await.unwrap();
            assert!(len >= 20);
            let mut transaction_id = [0u8; 12];
            transaction_id.copy_from_slice(&buf[8..20]);
            let reply = response_with_xor_v4(
                &transaction_id,
                Ipv4Addr::new(203, 0, 113, 9),
                peer.port(),
            );
            responder.send_to(&reply, peer).await.unwrap();
        });

        let probe = StunProbe::new("127.0.0.1", server_port);
        let addrs = probe.external_addresses().await.unwrap();
        assert_eq!(addrs, vec!["203.0.113.9".parse::<IpAddr>().unwrap()]);
    }
}
