//! Address and port range parsing with the scan-size cap applied.
//!
//! Oversized ranges are never passed through silently: under
//! [`RangePolicy::Clamp`] the end is pulled in and `truncated` is set, under
//! [`RangePolicy::Reject`] parsing fails with [`ParseError::RangeTooLarge`].

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Hard cap on the number of addresses a single sweep may probe.
pub const MAX_SCAN_ADDRESSES: u32 = 254;

/// Hard cap on `end - start` for a single port sweep.
pub const MAX_SCAN_PORTS: u16 = 100;

/// What to do with a range that exceeds its cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangePolicy {
    /// Keep the start, move the end down to the cap and flag the truncation.
    #[default]
    Clamp,
    /// Refuse the request.
    Reject,
}

/// Inclusive IPv4 range, already clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    /// The requested end was beyond the cap and has been pulled in.
    pub truncated: bool,
}

impl AddressRange {
    /// Parse two dotted-quad strings into a capped inclusive range.
    pub fn parse(start: &str, end: &str, policy: RangePolicy) -> Result<Self, ParseError> {
        let start = parse_ipv4(start)?;
        let end = parse_ipv4(end)?;
        Self::from_bounds(start, end, policy)
    }

    /// Parse a single target expression: `a.b.c.d`, `a.b.c.d-e.f.g.h` or a CIDR.
    ///
    /// CIDR blocks exclude their network and broadcast addresses unless the
    /// prefix is /31 or /32.
    pub fn parse_target(s: &str, policy: RangePolicy) -> Result<Self, ParseError> {
        let s = s.trim();
        if let Some((a, b)) = s.split_once('-') {
            return Self::parse(a, b, policy);
        }
        if s.contains('/') {
            let net: Ipv4Net = s
                .parse()
                .map_err(|_| ParseError::InvalidFormat(s.to_string()))?;
            return Self::from_cidr(net, policy);
        }
        let ip = parse_ipv4(s)?;
        Self::from_bounds(ip, ip, policy)
    }

    pub fn from_cidr(net: Ipv4Net, policy: RangePolicy) -> Result<Self, ParseError> {
        let network = u32::from(net.network());
        let broadcast = u32::from(net.broadcast());
        let (start, end) = if broadcast - network >= 2 {
            (network + 1, broadcast - 1)
        } else {
            (network, broadcast)
        };
        Self::from_bounds(Ipv4Addr::from(start), Ipv4Addr::from(end), policy)
    }

    pub fn from_bounds(
        start: Ipv4Addr,
        end: Ipv4Addr,
        policy: RangePolicy,
    ) -> Result<Self, ParseError> {
        let (s, e) = (u32::from(start), u32::from(end));
        if s > e {
            return Err(ParseError::Reversed {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        let requested = u64::from(e - s) + 1;
        if requested <= u64::from(MAX_SCAN_ADDRESSES) {
            return Ok(Self {
                start,
                end,
                truncated: false,
            });
        }
        match policy {
            RangePolicy::Reject => Err(ParseError::RangeTooLarge {
                requested,
                max: u64::from(MAX_SCAN_ADDRESSES),
            }),
            RangePolicy::Clamp => Ok(Self {
                start,
                end: Ipv4Addr::from(s + (MAX_SCAN_ADDRESSES - 1)),
                truncated: true,
            }),
        }
    }

    /// Number of addresses in the range, inclusive.
    pub fn count(&self) -> u32 {
        u32::from(self.end) - u32::from(self.start) + 1
    }

    /// Addresses in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> {
        (u32::from(self.start)..=u32::from(self.end)).map(Ipv4Addr::from)
    }
}

/// Inclusive TCP port range, already clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
    pub truncated: bool,
}

impl PortRange {
    /// Build a range from raw bounds. `start` below 1 is raised to 1 and `end`
    /// above 65535 is lowered to 65535 before the cap is applied.
    pub fn new(start: u32, end: u32, policy: RangePolicy) -> Result<Self, ParseError> {
        let start = start.clamp(1, u32::from(u16::MAX));
        let end = end.min(u32::from(u16::MAX));
        if start > end {
            return Err(ParseError::Reversed {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        let max = u32::from(MAX_SCAN_PORTS);
        let (end, truncated) = if end - start > max {
            match policy {
                RangePolicy::Reject => {
                    return Err(ParseError::RangeTooLarge {
                        requested: u64::from(end - start) + 1,
                        max: u64::from(max) + 1,
                    })
                }
                RangePolicy::Clamp => (start + max, true),
            }
        } else {
            (end, false)
        };
        // Both bounds were clamped into u16 range above.
        Ok(Self {
            start: start as u16,
            end: end as u16,
            truncated,
        })
    }

    /// Parse `80` or `20-25`.
    pub fn parse(s: &str, policy: RangePolicy) -> Result<Self, ParseError> {
        let s = s.trim();
        let (a, b) = s.split_once('-').unwrap_or((s, s));
        let start = parse_port_bound(a)?;
        let end = parse_port_bound(b)?;
        Self::new(start, end, policy)
    }

    pub fn count(&self) -> u32 {
        u32::from(self.end) - u32::from(self.start) + 1
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

fn parse_ipv4(s: &str) -> Result<Ipv4Addr, ParseError> {
    s.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| ParseError::InvalidFormat(s.to_string()))
}

fn parse_port_bound(s: &str) -> Result<u32, ParseError> {
    let val: u32 = s
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidFormat(s.to_string()))?;
    if val == 0 || val > 65535 {
        return Err(ParseError::InvalidFormat(format!("port out of range: {val}")));
    }
    Ok(val)
}
