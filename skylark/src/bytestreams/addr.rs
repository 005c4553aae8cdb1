//! External-address probing and NAT detection.

use core::future::Future;
use core::pin::Pin;
use std::io;
use std::net::{IpAddr, Ipv4Addr};

use log::debug;

/// A source of externally visible addresses: a server "IP check"
/// extension, an injected UPnP gateway, or the built-in STUN probe.
///
/// Probes are consulted in registration order and their answers unioned;
/// a failing probe is skipped, not fatal.
pub trait AddressProbe: Send + Sync {
    /// The addresses under which this machine is reachable from outside.
    fn external_addresses<'x>(
        &'x self,
    ) -> Pin<Box<dyn Future<Output = io::Result<Vec<IpAddr>>> + Send + 'x>>;
}

/// Every operationally-up, non-loopback IPv4 address of this host.
pub(crate) fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            debug!("interface enumeration failed: {}", e);
            return Vec::new();
        }
    };
    interfaces
        .into_iter()
        .filter(|interface| !interface.is_loopback())
        .filter_map(|interface| match interface.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .collect()
}

/// The NAT test of the transfer path: we are behind NAT when every
/// externally visible address is assigned to no local interface.
pub(crate) fn behind_nat(external: &[IpAddr], local: &[Ipv4Addr]) -> bool {
    external.iter().all(|ip| match ip {
        IpAddr::V4(v4) => !local.contains(v4),
        IpAddr::V6(_) => true,
    })
}
