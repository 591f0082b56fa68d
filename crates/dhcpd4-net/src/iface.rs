/*  Interface enumeration: which links exist and what IPv4 address/netmask
 *  each carries. The allocation engine needs a receiving interface's
 *  shared-network when `giaddr` is zero (spec.md §4.4 step 1); this is the
 *  platform call that answers "what subnet am I attached to".
 */
use crate::addr::Ipv4Subnet;
use std::net::Ipv4Addr;

#[derive(Debug, Clone)]
pub struct InterfaceAddr {
    pub name: String,
    pub subnet: Ipv4Subnet,
}

/// Enumerates every configured IPv4 address on the host's interfaces.
/// Backed by `getifaddrs(3)` via `nix` — the usual non-raw-socket way to
/// learn the local topology without parsing `/proc/net/route` by hand.
pub fn local_interface_addrs() -> nix::Result<Vec<InterfaceAddr>> {
    let mut out = Vec::new();
    for ifaddr in nix::ifaddrs::getifaddrs()? {
        let Some(address) = ifaddr.address else {
            continue;
        };
        let Some(sock_addr) = address.as_sockaddr_in() else {
            continue;
        };
        let addr = Ipv4Addr::from(sock_addr.ip());
        let prefixlen = ifaddr
            .netmask
            .and_then(|m| m.as_sockaddr_in().map(|m| m.ip()))
            .map(u32::count_ones)
            .unwrap_or(32) as u8;
        if let Ok(subnet) = Ipv4Subnet::containing(addr, prefixlen) {
            out.push(InterfaceAddr {
                name: ifaddr.interface_name,
                subnet,
            });
        }
    }
    Ok(out)
}

/// Picks the interface (if any) whose subnet contains `addr`; used to map
/// a relay's `giaddr` to the shared network it belongs to, or to resolve
/// the server-identifier for a directly-connected client.
pub fn interface_for(addrs: &[InterfaceAddr], addr: Ipv4Addr) -> Option<&InterfaceAddr> {
    addrs.iter().find(|ia| ia.subnet.contains(addr))
}
