use anyhow::{Context, anyhow, bail};
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// The prefix used for host addresses that are given without one
pub const DEFAULT_HOST_PREFIX: u8 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Cidr {
    pub(crate) address: Ipv4Addr,
    pub(crate) network_prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(address: Ipv4Addr, network_prefix: u8) -> Self {
        Self {
            address,
            network_prefix,
        }
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn network_prefix(&self) -> u8 {
        self.network_prefix
    }
}

impl Display for Ipv4Cidr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.network_prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let base_ip: IpAddr = parts
            .next()
            .ok_or(anyhow!("empty string"))?
            .parse()
            .context("invalid ip address")?;

        let IpAddr::V4(base_ip) = base_ip else {
            bail!("only IPv4 supported at the moment");
        };

        // A missing network prefix falls back to the host address block's prefix
        let network_prefix: u8 = match parts.next() {
            Some(prefix) => prefix
                .parse()
                .context("the provided network prefix is not a valid unsigned integer")?,
            None => DEFAULT_HOST_PREFIX,
        };
        if network_prefix == 0 {
            bail!("network prefix cannot be 0");
        }
        if network_prefix > 32 {
            bail!("network prefix cannot be higher than 32");
        }

        if parts.next().is_some() {
            bail!("address contains trailing characters");
        }

        Ok(Self {
            address: base_ip,
            network_prefix,
        })
    }
}

/// A 48-bit hardware address
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Builds an address from the low 48 bits of `value`, most significant octet first
    pub fn from_u64(value: u64) -> Self {
        let bytes = value.to_be_bytes();
        let mut octets = [0; 6];
        octets.copy_from_slice(&bytes[2..]);
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0; 6];
        let mut parts = s.split(':');
        for (i, octet) in octets.iter_mut().enumerate() {
            let part = parts
                .next()
                .ok_or(anyhow!("expected 6 octets, found {i}"))?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                bail!("octet `{part}` must be two hexadecimal digits");
            }
            *octet = u8::from_str_radix(part, 16)
                .with_context(|| format!("octet `{part}` is not hexadecimal"))?;
        }

        if parts.next().is_some() {
            bail!("hardware address contains more than 6 octets");
        }

        Ok(Self(octets))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cidr_without_prefix_uses_host_block_prefix() {
        let cidr: Ipv4Cidr = "10.0.0.7".parse().unwrap();
        assert_eq!(cidr.address(), Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(cidr.network_prefix(), DEFAULT_HOST_PREFIX);
        assert_eq!(cidr.to_string(), "10.0.0.7/8");
    }

    #[test]
    fn test_cidr_rejects_bad_prefixes() {
        assert!("10.0.0.1/0".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.1/33".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.1/24/1".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.999".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn test_mac_parsing() {
        let mac: MacAddr = "00:1A:2b:3c:4d:5e".parse().unwrap();
        assert_eq!(mac.octets(), [0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]);
        assert_eq!(mac.to_string(), "00:1a:2b:3c:4d:5e");

        assert!("00:11:22:33:44".parse::<MacAddr>().is_err());
        assert!("00:11:22:33:44:55:66".parse::<MacAddr>().is_err());
        assert!("0:11:22:33:44:55".parse::<MacAddr>().is_err());
        assert!("zz:11:22:33:44:55".parse::<MacAddr>().is_err());
        assert!("+f:11:22:33:44:55".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_mac_from_counter() {
        assert_eq!(MacAddr::from_u64(9).to_string(), "00:00:00:00:00:09");
        assert_eq!(MacAddr::from_u64(0x1_02).to_string(), "00:00:00:00:01:02");
    }
}
