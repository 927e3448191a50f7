//! Client IP allow-list matching.
//!
//! Supports three pattern forms: exact address strings, `*` wildcards
//! (`192.168.*`), and CIDR ranges (`10.0.0.0/24`) matched by bitwise
//! mask comparison over both IPv4 and IPv6.

use std::net::IpAddr;

use anyhow::{Context, Result};

/// One parsed allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpPattern {
    /// Literal string match against the client address.
    Exact(String),
    /// Glob-style pattern where `*` matches any run of characters.
    Wildcard(String),
    /// Address range in CIDR notation.
    Cidr { network: IpAddr, prefix_len: u8 },
}

impl IpPattern {
    /// Parse a configuration entry into a pattern.
    ///
    /// `a.b.c.d/len` parses as CIDR (the prefix length is checked
    /// against the address family), anything containing `*` as a
    /// wildcard, everything else as an exact string.
    pub fn parse(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        anyhow::ensure!(!pattern.is_empty(), "empty allow-list pattern");

        if let Some((addr, len)) = pattern.split_once('/') {
            let network: IpAddr = addr
                .parse()
                .with_context(|| format!("invalid CIDR network address: {addr:?}"))?;
            let prefix_len: u8 = len
                .parse()
                .with_context(|| format!("invalid CIDR prefix length: {len:?}"))?;
            let max = match network {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            };
            anyhow::ensure!(
                prefix_len <= max,
                "CIDR prefix length {prefix_len} exceeds {max} for {addr}"
            );
            return Ok(Self::Cidr {
                network,
                prefix_len,
            });
        }

        if pattern.contains('*') {
            return Ok(Self::Wildcard(pattern.to_string()));
        }

        Ok(Self::Exact(pattern.to_string()))
    }

    /// Whether a client address string matches this pattern.
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == candidate,
            Self::Wildcard(pattern) => wildcard_match(pattern, candidate),
            Self::Cidr {
                network,
                prefix_len,
            } => candidate
                .parse::<IpAddr>()
                .map(|addr| cidr_contains(*network, *prefix_len, addr))
                .unwrap_or(false),
        }
    }
}

/// A parsed allow-list. Empty means "no restriction configured".
#[derive(Debug, Clone, Default)]
pub struct IpAllowList(Vec<IpPattern>);

impl IpAllowList {
    /// Parse all configured patterns; fails on the first invalid entry.
    pub fn parse(patterns: &[String]) -> Result<Self> {
        patterns
            .iter()
            .map(|p| IpPattern::parse(p))
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the client address matches any configured pattern.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.iter().any(|p| p.matches(candidate))
    }
}

/// Bitwise containment check for CIDR ranges.
///
/// Mixed address families never match.
fn cidr_contains(network: IpAddr, prefix_len: u8, addr: IpAddr) -> bool {
    match (network, addr) {
        (IpAddr::V4(net), IpAddr::V4(addr)) => {
            if prefix_len == 0 {
                return true;
            }
            let mask = u32::MAX << (32 - u32::from(prefix_len));
            (u32::from(net) & mask) == (u32::from(addr) & mask)
        }
        (IpAddr::V6(net), IpAddr::V6(addr)) => {
            if prefix_len == 0 {
                return true;
            }
            let mask = u128::MAX << (128 - u32::from(prefix_len));
            (u128::from(net) & mask) == (u128::from(addr) & mask)
        }
        _ => false,
    }
}

/// Glob match where `*` spans any run of characters.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == text;
    }

    let mut rest = text;

    let first = segments[0];
    if !first.is_empty() {
        match rest.strip_prefix(first) {
            Some(r) => rest = r,
            None => return false,
        }
    }

    let last = segments[segments.len() - 1];
    for segment in &segments[1..segments.len() - 1] {
        if segment.is_empty() {
            continue;
        }
        match rest.find(segment) {
            Some(i) => rest = &rest[i + segment.len()..],
            None => return false,
        }
    }

    if last.is_empty() {
        true
    } else {
        rest.ends_with(last) && rest.len() >= last.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let p = IpPattern::parse("203.0.113.5").unwrap();
        assert!(p.matches("203.0.113.5"));
        assert!(!p.matches("203.0.113.6"));
    }

    #[test]
    fn test_cidr_v4_boundary() {
        let p = IpPattern::parse("10.0.0.0/24").unwrap();
        assert!(p.matches("10.0.0.5"));
        assert!(p.matches("10.0.0.255"));
        assert!(!p.matches("10.0.1.5"));
        assert!(!p.matches("11.0.0.5"));
    }

    #[test]
    fn test_cidr_v4_host_route() {
        let p = IpPattern::parse("192.0.2.7/32").unwrap();
        assert!(p.matches("192.0.2.7"));
        assert!(!p.matches("192.0.2.8"));
    }

    #[test]
    fn test_cidr_zero_prefix_matches_all() {
        let p = IpPattern::parse("0.0.0.0/0").unwrap();
        assert!(p.matches("203.0.113.5"));
        assert!(p.matches("10.0.0.1"));
    }

    #[test]
    fn test_cidr_v6() {
        let p = IpPattern::parse("2001:db8::/32").unwrap();
        assert!(p.matches("2001:db8::1"));
        assert!(p.matches("2001:db8:ffff::1"));
        assert!(!p.matches("2001:db9::1"));
    }

    #[test]
    fn test_cidr_family_mismatch() {
        let p = IpPattern::parse("10.0.0.0/8").unwrap();
        assert!(!p.matches("::1"));
    }

    #[test]
    fn test_wildcard_prefix() {
        let p = IpPattern::parse("192.168.*").unwrap();
        assert!(p.matches("192.168.1.1"));
        assert!(p.matches("192.168.255.0"));
        assert!(!p.matches("192.169.1.1"));
    }

    #[test]
    fn test_wildcard_interior() {
        let p = IpPattern::parse("10.*.0.1").unwrap();
        assert!(p.matches("10.5.0.1"));
        assert!(p.matches("10.200.0.1"));
        assert!(!p.matches("10.5.0.2"));
    }

    #[test]
    fn test_unparseable_candidate_never_matches_cidr() {
        let p = IpPattern::parse("10.0.0.0/8").unwrap();
        assert!(!p.matches("unknown"));
    }

    #[test]
    fn test_invalid_patterns_rejected() {
        assert!(IpPattern::parse("").is_err());
        assert!(IpPattern::parse("10.0.0.0/33").is_err());
        assert!(IpPattern::parse("banana/8").is_err());
        assert!(IpPattern::parse("10.0.0.0/abc").is_err());
    }

    #[test]
    fn test_allow_list_any_semantics() {
        let list = IpAllowList::parse(&[
            "127.0.0.1".to_string(),
            "10.0.0.0/24".to_string(),
            "192.168.*".to_string(),
        ])
        .unwrap();
        assert!(list.matches("127.0.0.1"));
        assert!(list.matches("10.0.0.42"));
        assert!(list.matches("192.168.7.7"));
        assert!(!list.matches("8.8.8.8"));
    }

    #[test]
    fn test_empty_allow_list() {
        let list = IpAllowList::parse(&[]).unwrap();
        assert!(list.is_empty());
        assert!(!list.matches("127.0.0.1"));
    }
}
