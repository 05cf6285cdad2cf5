//! CIDR prefix and bare-address list parsing.
//!
//! Thin wrapper over `ipnet` with the two parse modes the session needs:
//! full CIDR notation (prefix length required, used for local prefixes and
//! downstream prefixes) and bare addresses (no prefix length, used for the
//! upstream gateway parameters). Prefixes are kept in input order; the
//! first-parsed and family-qualified accessors are distinct on purpose
//! because callers rely on both shapes.

use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Address family restriction for a parse run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// IPv4 only.
    V4,
    /// IPv6 only.
    V6,
    /// Either family.
    Any,
}

impl Family {
    fn accepts(self, net: &IpNet) -> bool {
        match (self, net) {
            (Family::Any, _) => true,
            (Family::V4, IpNet::V4(_)) => true,
            (Family::V6, IpNet::V6(_)) => true,
            _ => false,
        }
    }
}

/// A validated, ordered list of parsed prefixes.
#[derive(Debug, Clone, Default)]
pub struct PrefixParser {
    prefixes: Vec<IpNet>,
}

impl PrefixParser {
    /// Parse a list of CIDR strings (`addr/len`).
    ///
    /// Every entry must carry an explicit prefix length and match `family`.
    /// Returns the first parse error as text.
    pub fn parse_cidrs(inputs: &[String], family: Family) -> Result<Self, String> {
        let mut prefixes = Vec::with_capacity(inputs.len());
        for input in inputs {
            let net: IpNet = input
                .parse()
                .map_err(|_| format!("Invalid prefix: {input}"))?;
            if !family.accepts(&net) {
                return Err(format!("Wrong address family: {input}"));
            }
            prefixes.push(net);
        }
        Ok(Self { prefixes })
    }

    /// Parse a list of bare addresses (no prefix length).
    ///
    /// Entries are stored as fully-qualified host prefixes (/32 or /128) and
    /// must match `family`. Returns the first parse error as text.
    pub fn parse_addrs(inputs: &[String], family: Family) -> Result<Self, String> {
        let mut prefixes = Vec::with_capacity(inputs.len());
        for input in inputs {
            let addr: IpAddr = input
                .parse()
                .map_err(|_| format!("Invalid address: {input}"))?;
            let net = IpNet::from(addr);
            if !family.accepts(&net) {
                return Err(format!("Wrong address family: {input}"));
            }
            prefixes.push(net);
        }
        Ok(Self { prefixes })
    }

    /// Number of parsed prefixes.
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// Whether no prefixes were parsed.
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// First prefix in parse order, any family.
    pub fn first_prefix(&self) -> Option<IpNet> {
        self.prefixes.first().copied()
    }

    /// First parsed address in parse order, any family.
    pub fn first_addr(&self) -> Option<IpAddr> {
        self.prefixes.first().map(|net| net.addr())
    }

    /// First IPv4 address (family-qualified accessor).
    pub fn first_v4_addr(&self) -> Option<Ipv4Addr> {
        self.prefixes.iter().find_map(|net| match net {
            IpNet::V4(v4) => Some(v4.addr()),
            IpNet::V6(_) => None,
        })
    }

    /// First IPv6 address (family-qualified accessor).
    pub fn first_v6_addr(&self) -> Option<Ipv6Addr> {
        self.prefixes.iter().find_map(|net| match net {
            IpNet::V4(_) => None,
            IpNet::V6(v6) => Some(v6.addr()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(inputs: &[&str]) -> Vec<String> {
        inputs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_cidrs_dual_stack() {
        let parser =
            PrefixParser::parse_cidrs(&strings(&["10.0.0.0/24", "fd00::/64"]), Family::Any)
                .expect("valid prefixes");
        assert_eq!(parser.len(), 2);
        assert_eq!(
            parser.first_prefix(),
            Some("10.0.0.0/24".parse::<IpNet>().unwrap())
        );
    }

    #[test]
    fn test_parse_cidrs_rejects_bare_address() {
        let result = PrefixParser::parse_cidrs(&strings(&["10.0.0.0"]), Family::Any);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Invalid prefix"));
    }

    #[test]
    fn test_parse_cidrs_rejects_wrong_family() {
        let result = PrefixParser::parse_cidrs(&strings(&["fd00::/64"]), Family::V4);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Wrong address family"));
    }

    #[test]
    fn test_parse_addrs_bare_only() {
        let parser = PrefixParser::parse_addrs(&strings(&["192.0.2.1"]), Family::V4)
            .expect("valid address");
        assert_eq!(parser.first_v4_addr(), Some("192.0.2.1".parse().unwrap()));
        assert_eq!(parser.first_v6_addr(), None);

        // CIDR notation is not a bare address.
        assert!(PrefixParser::parse_addrs(&strings(&["192.0.2.1/32"]), Family::V4).is_err());
    }

    #[test]
    fn test_family_qualified_vs_first_parsed() {
        let parser = PrefixParser::parse_addrs(
            &strings(&["198.51.100.1", "2001:db8::1"]),
            Family::Any,
        )
        .expect("valid addresses");
        // First-parsed is the v4 entry; family-qualified v6 skips past it.
        assert_eq!(parser.first_addr(), Some("198.51.100.1".parse().unwrap()));
        assert_eq!(parser.first_v6_addr(), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_empty_input_parses_empty() {
        let parser = PrefixParser::parse_addrs(&[], Family::V6).expect("empty is valid");
        assert!(parser.is_empty());
        assert_eq!(parser.first_addr(), None);
    }
}
