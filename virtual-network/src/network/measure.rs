//! Results of reachability and throughput measurements

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct PingOutcome {
    pub target: Arc<str>,
    /// `None` if the probe or its reply was lost
    pub rtt: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct PingRow {
    pub source: Arc<str>,
    pub outcomes: Vec<PingOutcome>,
}

/// The result of probing every ordered pair of a set of hosts once
#[derive(Clone, Debug, Default)]
pub struct PingReport {
    pub rows: Vec<PingRow>,
}

impl PingReport {
    pub fn sent(&self) -> usize {
        self.outcomes().count()
    }

    pub fn received(&self) -> usize {
        self.outcomes().filter(|(_, o)| o.rtt.is_some()).count()
    }

    /// The share of lost probes, rounded down to a whole percent
    pub fn dropped_percent(&self) -> u32 {
        let sent = self.sent();
        if sent == 0 {
            return 0;
        }

        let lost = sent - self.received();
        (100.0 * lost as f64 / sent as f64) as u32
    }

    pub fn outcomes(&self) -> impl Iterator<Item = (&Arc<str>, &PingOutcome)> {
        self.rows
            .iter()
            .flat_map(|row| row.outcomes.iter().map(move |o| (&row.source, o)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum L4Type {
    Tcp,
    /// UDP with the client sending at `offered_mbps`
    Udp { offered_mbps: f64 },
}

impl Display for L4Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            L4Type::Tcp => write!(f, "TCP"),
            L4Type::Udp { .. } => write!(f, "UDP"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct IperfReport {
    pub l4_type: L4Type,
    pub client: Arc<str>,
    pub server: Arc<str>,
    pub server_mbps: f64,
    pub client_mbps: f64,
}

/// Parses an iperf-style bandwidth (e.g. `10M`, `512K`, `1.5G`) into Mbit/s
pub fn parse_bandwidth(s: &str) -> Option<f64> {
    let s = s.trim();
    let (number, bits_per_unit) = match s.char_indices().last()? {
        (i, 'k' | 'K') => (&s[..i], 1e3),
        (i, 'm' | 'M') => (&s[..i], 1e6),
        (i, 'g' | 'G') => (&s[..i], 1e9),
        _ => (s, 1.0),
    };

    let value: f64 = number.parse().ok()?;
    (value.is_finite() && value > 0.0).then(|| value * bits_per_unit / 1e6)
}

/// Renders a rate with three significant digits, the way iperf reports them
pub fn format_rate(mbps: f64) -> String {
    let (value, unit) = if mbps >= 1_000.0 {
        (mbps / 1_000.0, "Gbits/sec")
    } else if mbps >= 1.0 {
        (mbps, "Mbits/sec")
    } else {
        (mbps * 1_000.0, "Kbits/sec")
    };

    if value >= 100.0 {
        format!("{value:.0} {unit}")
    } else if value >= 10.0 {
        format!("{value:.1} {unit}")
    } else {
        format!("{value:.2} {unit}")
    }
}
