//! Topologies that can be selected by name with `--topo`

use clap::{Args, ValueEnum};
use std::net::Ipv4Addr;
use virtual_network::network::addr::Ipv4Cidr;
use virtual_network::network::link::LinkParams;
use virtual_network::network::spec::{
    ControllerSpec, HostSpec, NetworkLinkSpec, NetworkSpec, SwitchSpec,
};

const OPENFLOW_PORT: u16 = 6653;

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BuiltinTopology {
    /// Two hosts behind one switch, plus a controller
    #[default]
    Minimal,
    /// Two hosts connected by a single link
    Direct,
    /// Two hosts without any links
    Justhost,
    /// Three hosts behind one switch
    Threehosts,
    /// Two pairs of hosts joined by a 10 Mbit/s, 200 ms link between two switches
    Latency,
    /// Like `latency`, with a 50 Kbit/s middle link
    Slow,
    /// Like `latency`, with the middle link configured by the `--bw`, `--loss`, `--delay`,
    /// `--queue` and `--ecn` options
    Bottleneck,
}

/// Parameters of the middle link of the `bottleneck` topology
#[derive(Args, Clone, Debug)]
pub struct BottleneckParams {
    /// Bottleneck link bandwidth in Mbit/s
    #[arg(long, default_value_t = 10.0)]
    pub bw: f64,

    /// Bottleneck packet loss, in percent
    #[arg(long, default_value_t = 0.0)]
    pub loss: f64,

    /// Bottleneck propagation delay
    #[arg(long, default_value = "10ms")]
    pub delay: String,

    /// Bottleneck queue length, in packets
    #[arg(long, default_value_t = 20)]
    pub queue: u64,

    /// Mark the bottleneck link as ECN-enabled
    #[arg(long)]
    pub ecn: bool,
}

impl Default for BottleneckParams {
    fn default() -> Self {
        Self {
            bw: 10.0,
            loss: 0.0,
            delay: "10ms".to_string(),
            queue: 20,
            ecn: false,
        }
    }
}

impl BottleneckParams {
    fn link_params(&self) -> LinkParams {
        let mut params = LinkParams {
            bw: Some(self.bw),
            delay: Some(self.delay.clone()),
            loss: Some(self.loss),
            max_queue_size: Some(self.queue),
            ..LinkParams::default()
        };

        if self.ecn {
            params
                .extra
                .insert("enable_ecn".to_string(), "true".to_string());
        }

        params
    }
}

pub fn network_spec(topology: BuiltinTopology, bottleneck: &BottleneckParams) -> NetworkSpec {
    match topology {
        BuiltinTopology::Minimal => NetworkSpec {
            hosts: hosts(&["h1", "h2"]),
            switches: switches(&["s1"]),
            controllers: vec![ControllerSpec {
                name: "c0".to_string(),
                ip: Some(Ipv4Cidr::new(Ipv4Addr::LOCALHOST, 8)),
                port: OPENFLOW_PORT,
            }],
            links: links(&[("h1", "s1"), ("h2", "s1")]),
        },
        BuiltinTopology::Direct => NetworkSpec {
            hosts: numbered_hosts_in_24(2),
            links: links(&[("h1", "h2")]),
            ..NetworkSpec::default()
        },
        BuiltinTopology::Justhost => NetworkSpec {
            hosts: numbered_hosts_in_24(2),
            ..NetworkSpec::default()
        },
        BuiltinTopology::Threehosts => NetworkSpec {
            hosts: hosts(&["h1", "h2", "h3"]),
            switches: switches(&["s1"]),
            links: links(&[("h1", "s1"), ("h2", "s1"), ("h3", "s1")]),
            ..NetworkSpec::default()
        },
        BuiltinTopology::Latency => dumbbell(LinkParams {
            bw: Some(10.0),
            delay: Some("200ms".to_string()),
            ..LinkParams::default()
        }),
        BuiltinTopology::Slow => dumbbell(LinkParams {
            bw: Some(0.05),
            delay: Some("200ms".to_string()),
            ..LinkParams::default()
        }),
        BuiltinTopology::Bottleneck => dumbbell(bottleneck.link_params()),
    }
}

/// Two hosts on each side of a pair of switches, with `middle` shaping the link between them
fn dumbbell(middle: LinkParams) -> NetworkSpec {
    let mut spec = NetworkSpec {
        hosts: hosts(&["lh1", "lh2", "rh1", "rh2"]),
        switches: switches(&["s1", "s2"]),
        controllers: Vec::new(),
        links: links(&[("lh1", "s1"), ("lh2", "s1")]),
    };
    spec.links
        .push(NetworkLinkSpec::new("s1", "s2").with_params(middle));
    spec.links
        .extend(links(&[("s2", "rh1"), ("s2", "rh2")]));

    spec
}

fn hosts(names: &[&str]) -> Vec<HostSpec> {
    names.iter().map(|name| HostSpec::new(name)).collect()
}

/// `h1..=hN` with addresses `10.0.0.i/24`
fn numbered_hosts_in_24(count: u8) -> Vec<HostSpec> {
    (1..=count)
        .map(|i| {
            let mut host = HostSpec::new(&format!("h{i}"));
            host.ip = Some(Ipv4Cidr::new(Ipv4Addr::new(10, 0, 0, i), 24));
            host
        })
        .collect()
}

fn switches(names: &[&str]) -> Vec<SwitchSpec> {
    names.iter().map(|name| SwitchSpec::new(name)).collect()
}

fn links(pairs: &[(&str, &str)]) -> Vec<NetworkLinkSpec> {
    pairs
        .iter()
        .map(|(source, target)| NetworkLinkSpec::new(source, target))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use virtual_network::VirtualNetwork;
    use virtual_network::shell::ProcessShellLauncher;

    fn build(topology: BuiltinTopology, bottleneck: &BottleneckParams) -> VirtualNetwork {
        VirtualNetwork::build(
            network_spec(topology, bottleneck),
            Box::new(ProcessShellLauncher::new("sh")),
            fastrand::Rng::with_seed(0),
        )
        .unwrap()
    }

    #[test]
    fn test_every_builtin_topology_builds() {
        for topology in BuiltinTopology::value_variants() {
            let network = build(*topology, &BottleneckParams::default());
            assert!(network.registry().hosts().count() >= 2, "{topology:?}");
        }
    }

    #[test]
    fn test_direct_hosts_use_slash_24() {
        let network = build(BuiltinTopology::Direct, &BottleneckParams::default());

        let h2 = network.node("h2").unwrap();
        assert_eq!(h2.cidr().unwrap().to_string(), "10.0.0.2/24");
        assert_eq!(network.links().len(), 1);
    }

    #[test]
    fn test_bottleneck_link_follows_options() {
        let bottleneck = BottleneckParams {
            bw: 2.5,
            loss: 1.0,
            delay: "30ms".to_string(),
            queue: 50,
            ecn: true,
        };
        let network = build(BuiltinTopology::Bottleneck, &bottleneck);

        let middle = network
            .links()
            .iter()
            .find(|link| link.connects("s1", "s2"))
            .unwrap();
        assert_eq!(
            middle.params().to_string(),
            "bw=2.5 delay=30ms loss=1 max_queue_size=50 enable_ecn=true"
        );
    }
}
