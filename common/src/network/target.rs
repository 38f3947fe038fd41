//! # Scan Targets
//!
//! A target is a comma-separated list of parts, each one of:
//! * a host, `10.0.0.7`
//! * a range, `10.0.0.1-40` or `10.0.0.1-10.0.3.255`
//! * a CIDR block, `10.0.0.0/24`

use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::network::range::{self, IpCollection, Ipv4Range};

/// The ranges a scan walks, in the order they were written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    ranges: Vec<Ipv4Range>,
}

impl Target {
    pub fn ranges(&self) -> &[Ipv4Range] {
        &self.ranges
    }

    pub fn into_collection(self) -> IpCollection {
        let mut collection = IpCollection::new();
        for range in self.ranges {
            collection.add_range(range);
        }
        collection
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ranges: Vec<Ipv4Range> = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| parse_part(part).map_err(|e| format!("bad target part '{part}': {e}")))
            .collect::<Result<_, _>>()?;

        if ranges.is_empty() {
            return Err(format!("invalid target: {s:?}"));
        }
        Ok(Self { ranges })
    }
}

fn parse_part(part: &str) -> Result<Ipv4Range, String> {
    if let Some((ip, prefix)) = part.split_once('/') {
        let ip: Ipv4Addr = ip.parse().map_err(|e| format!("{e}"))?;
        let prefix: u8 = prefix.parse().map_err(|_| format!("prefix {prefix:?}"))?;
        return range::cidr_range(ip, prefix).map_err(|e| e.to_string());
    }

    if let Some((first, last)) = part.split_once('-') {
        let start: Ipv4Addr = first.trim().parse().map_err(|e| format!("{e}"))?;
        let end: Ipv4Addr = range_end(start, last.trim())?;
        if end < start {
            return Err("range ends before it starts".into());
        }
        return Ok(Ipv4Range::new(start, end));
    }

    part.parse::<Ipv4Addr>()
        .map(Ipv4Range::single)
        .map_err(|e| format!("{e}"))
}

/// A short end replaces the trailing octets of `start`, so `10.0.0.1-2.9`
/// means `10.0.0.1-10.0.2.9`.
fn range_end(start: Ipv4Addr, end: &str) -> Result<Ipv4Addr, String> {
    if end.is_empty() {
        return Err("empty range end".into());
    }
    let tail: Vec<u8> = end
        .split('.')
        .map(|octet| octet.parse::<u8>().map_err(|_| format!("octet {octet:?}")))
        .collect::<Result<_, _>>()?;
    if tail.len() > 4 {
        return Err(format!("too many octets in {end:?}"));
    }

    let mut octets: [u8; 4] = start.octets();
    octets[4 - tail.len()..].copy_from_slice(&tail);
    Ok(Ipv4Addr::from(octets))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
