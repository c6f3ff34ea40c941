use crate::range::{AddressRange, RangePolicy};
use anyhow::Result;
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 network.
///
/// For example, an interface IP `192.168.1.42` becomes `192.168.1.0/24`.
/// Duplicates are removed and the result is sorted.
pub fn detect_local_networks() -> Result<Vec<Ipv4Net>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(v4.ip));
        }
    }
    let mut nets: Vec<Ipv4Net> = set.into_iter().collect();
    nets.sort_by_key(|n| u32::from(n.network()));
    Ok(nets)
}

/// Sweep ranges covering the host part of every detected local /24.
pub fn local_sweep_ranges() -> Result<Vec<AddressRange>> {
    let ranges = detect_local_networks()?
        .into_iter()
        .filter_map(|net| AddressRange::from_cidr(net, RangePolicy::Clamp).ok())
        .collect();
    Ok(ranges)
}

/// Convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    // /24 is always a valid prefix.
    Ipv4Net::new(Ipv4Addr::new(o[0], o[1], o[2], 0), 24)
        .unwrap_or_else(|_| Ipv4Net::from(ip).trunc())
}
