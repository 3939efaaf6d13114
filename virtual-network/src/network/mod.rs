//! In-memory network model
//!
//! Keeps track of the hosts, switches, controllers and links of an emulated network, runs
//! commands on nodes through their shells, and answers reachability and throughput questions by
//! inspecting the topology graph.

pub mod addr;
mod error;
pub mod event;
pub mod link;
pub mod measure;
pub mod node;
mod path;
pub mod registry;
pub mod spec;

pub use error::NetworkError;

use crate::network::addr::{DEFAULT_HOST_PREFIX, Ipv4Cidr, MacAddr};
use crate::network::event::UpdateLinkStatus;
use crate::network::link::{Endpoint, Link, LinkId, LinkParams};
use crate::network::measure::{IperfReport, L4Type, PingOutcome, PingReport, PingRow};
use crate::network::node::Node;
use crate::network::path::PathMetrics;
use crate::network::registry::Registry;
use crate::network::spec::{ControllerSpec, NetworkSpec};
use crate::shell::{NodeIdentity, ShellLauncher};
use fastrand::Rng;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The subnet hosts get their addresses from, unless configured otherwise
pub const HOST_SUBNET_BASE: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 0);

const DEFAULT_CONTROLLER_ADDR: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

/// Everything needed to add a host at runtime
#[derive(Clone, Debug)]
pub struct HostConfig {
    pub name: String,
    pub ip: Ipv4Cidr,
    pub mac: MacAddr,
}

/// A switch and whether it is forwarding traffic
#[derive(Clone, Debug)]
pub struct SwitchState {
    pub name: Arc<str>,
    pub running: bool,
}

pub struct VirtualNetwork {
    registry: Registry,
    links: Vec<Link>,
    launcher: Box<dyn ShellLauncher>,
    rng: Rng,
}

impl VirtualNetwork {
    /// Realizes `spec`, assigning default addresses to hosts that lack them
    pub fn build(
        spec: NetworkSpec,
        launcher: Box<dyn ShellLauncher>,
        rng: Rng,
    ) -> Result<Self, NetworkError> {
        let mut network = Self {
            registry: Registry::default(),
            links: Vec::new(),
            launcher,
            rng,
        };

        for (i, host) in (1u32..).zip(spec.hosts) {
            let ip = host.ip.unwrap_or_else(|| {
                let address = Ipv4Addr::from(u32::from(HOST_SUBNET_BASE) + i);
                Ipv4Cidr::new(address, DEFAULT_HOST_PREFIX)
            });
            let mac = host.mac.unwrap_or_else(|| MacAddr::from_u64(u64::from(i)));
            network.add_host(HostConfig {
                name: host.name,
                ip,
                mac,
            })?;
        }

        for switch in spec.switches {
            network.add_switch(&switch.name)?;
        }

        for controller in spec.controllers {
            network.add_controller(controller)?;
        }

        for link in spec.links {
            network.add_link(&link.source, &link.target, link.params)?;
        }

        Ok(network)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn node(&self, name: &str) -> Result<&Node, NetworkError> {
        self.registry
            .get(name)
            .ok_or_else(|| NetworkError::UnknownNode(name.to_string()))
    }

    pub fn node_mut(&mut self, name: &str) -> Result<&mut Node, NetworkError> {
        self.registry
            .get_mut(name)
            .ok_or_else(|| NetworkError::UnknownNode(name.to_string()))
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Names of the nodes that are still running a foreground command
    pub fn waiting_nodes(&self) -> Vec<Arc<str>> {
        self.registry
            .iter_sorted()
            .filter(|n| n.waiting())
            .map(|n| n.name().clone())
            .collect()
    }

    pub fn add_host(&mut self, config: HostConfig) -> Result<&Node, NetworkError> {
        let name: Arc<str> = Arc::from(config.name);
        if self.registry.contains(&name) {
            return Err(NetworkError::DuplicateName(name.to_string()));
        }

        let shell = self.launcher.launch(&NodeIdentity {
            name: name.clone(),
            ip: Some(config.ip.address()),
        });
        self.registry
            .insert(Node::host(name.clone(), config.ip, config.mac, shell))?;

        debug!(host = &*name, ip = %config.ip, mac = %config.mac, "added host");
        self.node(&name)
    }

    pub fn add_switch(&mut self, name: &str) -> Result<&Node, NetworkError> {
        if self.registry.contains(name) {
            return Err(NetworkError::DuplicateName(name.to_string()));
        }

        let name: Arc<str> = Arc::from(name);
        let shell = self.launcher.launch(&NodeIdentity {
            name: name.clone(),
            ip: None,
        });
        self.registry.insert(Node::switch(name.clone(), shell))?;

        debug!(switch = &*name, "added switch");
        self.node(&name)
    }

    pub fn add_controller(&mut self, spec: ControllerSpec) -> Result<&Node, NetworkError> {
        if self.registry.contains(&spec.name) {
            return Err(NetworkError::DuplicateName(spec.name));
        }

        let name: Arc<str> = Arc::from(spec.name);
        let ip = spec
            .ip
            .unwrap_or_else(|| Ipv4Cidr::new(DEFAULT_CONTROLLER_ADDR, DEFAULT_HOST_PREFIX));
        let shell = self.launcher.launch(&NodeIdentity {
            name: name.clone(),
            ip: Some(ip.address()),
        });
        self.registry
            .insert(Node::controller(name.clone(), ip, spec.port, shell))?;

        debug!(controller = &*name, %ip, port = spec.port, "added controller");
        self.node(&name)
    }

    /// Connects `a` and `b` with a new link, after validating its parameters
    pub fn add_link(
        &mut self,
        a: &str,
        b: &str,
        params: LinkParams,
    ) -> Result<&Link, NetworkError> {
        let shaping = params.shaping()?;
        for name in [a, b] {
            if !self.registry.contains(name) {
                return Err(NetworkError::UnknownNode(name.to_string()));
            }
        }

        let id = self.links.len();
        let x = self.attach(a, id)?;
        let y = self.attach(b, id)?;
        let link = Link::new(id, [x, y], params, shaping);
        debug!(link = %link, params = %link.params(), "added link");
        self.links.push(link);

        Ok(&self.links[id])
    }

    fn attach(&mut self, name: &str, link: LinkId) -> Result<Endpoint, NetworkError> {
        let node = self.node_mut(name)?;
        let interface = node.attach_interface(link);
        Ok(Endpoint {
            node: node.name().clone(),
            interface,
        })
    }

    /// Brings every link between `a` and `b` up or down, returning how many links were found
    pub fn config_link_status(
        &mut self,
        a: &str,
        b: &str,
        status: UpdateLinkStatus,
    ) -> Result<usize, NetworkError> {
        for name in [a, b] {
            if !self.registry.contains(name) {
                return Err(NetworkError::UnknownNode(name.to_string()));
            }
        }

        let mut updated = 0;
        for link in self.links.iter_mut().filter(|l| l.connects(a, b)) {
            if link.update_status(status) {
                debug!(link = %link, %status, "link status changed");
            }
            updated += 1;
        }

        if updated == 0 {
            return Err(NetworkError::NotConnected(a.to_string(), b.to_string()));
        }

        Ok(updated)
    }

    pub fn start_switch(&mut self, name: &str) -> Result<(), NetworkError> {
        self.set_switch_running(name, true)
    }

    pub fn stop_switch(&mut self, name: &str) -> Result<(), NetworkError> {
        self.set_switch_running(name, false)
    }

    fn set_switch_running(&mut self, name: &str, running: bool) -> Result<(), NetworkError> {
        let node = self.node_mut(name)?;
        if !node.is_switch() {
            return Err(NetworkError::NotASwitch(name.to_string()));
        }

        node.running = running;
        debug!(switch = name, running, "switch state changed");
        Ok(())
    }

    /// Switches and their running state, once they are all ready
    ///
    /// In-memory switches need no controller handshake, so this never has to wait.
    pub fn wait_connected(&self) -> Vec<SwitchState> {
        self.registry
            .switches()
            .map(|s| SwitchState {
                name: s.name().clone(),
                running: s.is_running(),
            })
            .collect()
    }

    /// Sends one probe between every ordered pair of `hosts`
    ///
    /// A probe is lost if the hosts are not connected, if any link on the path drops it (in
    /// either direction) or if its round trip takes longer than `timeout`.
    pub fn ping(
        &mut self,
        hosts: &[Arc<str>],
        timeout: Option<Duration>,
    ) -> Result<PingReport, NetworkError> {
        for host in hosts {
            let node = self.node(host)?;
            if !node.is_host() {
                return Err(NetworkError::NotAHost(host.to_string()));
            }
        }

        let mut report = PingReport::default();
        for source in hosts {
            let mut row = PingRow {
                source: source.clone(),
                outcomes: Vec::new(),
            };

            for target in hosts.iter().filter(|t| *t != source) {
                let rtt = self.probe(source, target, timeout);
                debug!(source = &**source, target = &**target, ?rtt, "ping");
                row.outcomes.push(PingOutcome {
                    target: target.clone(),
                    rtt,
                });
            }

            report.rows.push(row);
        }

        Ok(report)
    }

    fn probe(&mut self, source: &str, target: &str, timeout: Option<Duration>) -> Option<Duration> {
        let path = path::find_path(&self.registry, &self.links, source, target)?;

        // Each link gets a chance to drop the request and then the reply
        for &id in path.iter().chain(path.iter().rev()) {
            let loss_ratio = self.links[id].shaping.loss_ratio;
            if loss_ratio > 0.0 && self.rng.f64() < loss_ratio {
                return None;
            }
        }

        let rtt = PathMetrics::new(&self.links, &path).round_trip;
        match timeout {
            Some(timeout) if rtt > timeout => None,
            _ => Some(rtt),
        }
    }

    /// Estimates the throughput between `client` and `server` from the path's bottleneck
    pub fn iperf(
        &self,
        client: &str,
        server: &str,
        l4_type: L4Type,
    ) -> Result<IperfReport, NetworkError> {
        let client = self.node(client)?.name().clone();
        let server = self.node(server)?.name().clone();
        let path = path::find_path(&self.registry, &self.links, &client, &server)
            .ok_or_else(|| NetworkError::NotConnected(client.to_string(), server.to_string()))?;

        let metrics = PathMetrics::new(&self.links, &path);
        let delivery_ratio = 1.0 - metrics.loss_ratio;
        let (server_mbps, client_mbps) = match l4_type {
            L4Type::Tcp => (
                metrics.bottleneck_mbps * 0.95 * delivery_ratio,
                metrics.bottleneck_mbps * 0.96 * delivery_ratio,
            ),
            L4Type::Udp { offered_mbps } => (
                offered_mbps.min(metrics.bottleneck_mbps) * delivery_ratio,
                offered_mbps,
            ),
        };

        debug!(client = &*client, server = &*server, %l4_type, server_mbps, client_mbps, "iperf");
        Ok(IperfReport {
            l4_type,
            client,
            server,
            server_mbps,
            client_mbps,
        })
    }

    /// Introspects a switch's ports, like `ovs-ofctl` would for a real switch
    pub fn dpctl(&self, switch: &str, args: &[&str]) -> Result<String, NetworkError> {
        let node = self.node(switch)?;
        if !node.is_switch() {
            return Err(NetworkError::NotASwitch(switch.to_string()));
        }

        let mut out = String::new();
        match args.first().copied() {
            Some("show") => {
                let state = if node.is_running() { "running" } else { "stopped" };
                out.push_str(&format!("{switch}: {state}, {} ports\n", node.interfaces().len()));
                for interface in node.interfaces() {
                    out.push_str(&format!(" {}({})\n", interface.port(), interface.name()));
                }
            }
            Some("dump-ports") => {
                out.push_str(&format!("{switch}: {} ports\n", node.interfaces().len()));
                for interface in node.interfaces() {
                    let link = &self.links[interface.link()];
                    let peer = link
                        .peer_of(switch)
                        .map(|p| p.interface.as_str())
                        .unwrap_or("?");
                    out.push_str(&format!(
                        "  port {:>2}: {} -> {peer} ({})\n",
                        interface.port(),
                        interface.name(),
                        link.status_str()
                    ));
                }
            }
            other => {
                return Err(NetworkError::invalid_parameter(
                    "dpctl",
                    other.unwrap_or(""),
                    "supported commands are show and dump-ports",
                ));
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::spec::{HostSpec, NetworkLinkSpec, SwitchSpec};
    use crate::shell::ProcessShellLauncher;
    use bon::builder;

    #[builder]
    fn star_network(
        #[builder(default = 2)] hosts: usize,
        link_params: Option<LinkParams>,
        #[builder(default = 42)] seed: u64,
    ) -> VirtualNetwork {
        let hosts: Vec<_> = (1..=hosts).map(|i| HostSpec::new(&format!("h{i}"))).collect();
        let links = hosts
            .iter()
            .map(|h| {
                NetworkLinkSpec::new(&h.name, "s1")
                    .with_params(link_params.clone().unwrap_or_default())
            })
            .collect();

        let spec = NetworkSpec {
            hosts,
            switches: vec![SwitchSpec::new("s1")],
            controllers: Vec::new(),
            links,
        };

        VirtualNetwork::build(
            spec,
            Box::new(ProcessShellLauncher::new("sh")),
            Rng::with_seed(seed),
        )
        .unwrap()
    }

    fn names(names: &[&str]) -> Vec<Arc<str>> {
        names.iter().map(|n| Arc::from(*n)).collect()
    }

    #[test]
    fn test_build_assigns_default_addresses() {
        let network = star_network().hosts(3).call();

        let h3 = network.node("h3").unwrap();
        assert_eq!(h3.ip(), Some(Ipv4Addr::new(10, 0, 0, 3)));
        assert_eq!(h3.mac().unwrap().to_string(), "00:00:00:00:00:03");
        assert_eq!(h3.interfaces()[0].name(), "h3-eth0");

        let s1 = network.node("s1").unwrap();
        let intfs: Vec<_> = s1.interface_names().collect();
        assert_eq!(intfs, ["s1-eth1", "s1-eth2", "s1-eth3"]);
        assert!(s1.is_running());
    }

    #[test]
    fn test_add_link_rejects_invalid_params_without_mutation() {
        let mut network = star_network().call();
        let params = LinkParams {
            loss: Some(150.0),
            ..LinkParams::default()
        };

        assert!(network.add_link("h1", "h2", params).is_err());
        assert_eq!(network.links().len(), 2);
        assert_eq!(network.node("h1").unwrap().interfaces().len(), 1);

        assert!(matches!(
            network.add_link("h1", "h9", LinkParams::default()),
            Err(NetworkError::UnknownNode(name)) if name == "h9"
        ));
        assert_eq!(network.node("h1").unwrap().interfaces().len(), 1);
    }

    #[test]
    fn test_duplicate_host_is_rejected() {
        let mut network = star_network().call();
        let result = network.add_host(HostConfig {
            name: "s1".to_string(),
            ip: "10.0.0.9".parse().unwrap(),
            mac: MacAddr::from_u64(9),
        });

        assert!(matches!(result, Err(NetworkError::DuplicateName(_))));
        assert!(network.node("s1").unwrap().is_switch());
    }

    #[test]
    fn test_link_down_breaks_reachability() {
        let mut network = star_network().call();
        let hosts = names(&["h1", "h2"]);

        let report = network.ping(&hosts, None).unwrap();
        assert_eq!(report.received(), 2);

        assert_eq!(
            network
                .config_link_status("h1", "s1", UpdateLinkStatus::Down)
                .unwrap(),
            1
        );
        assert_eq!(network.links()[0].status_str(), "DOWN");
        let report = network.ping(&hosts, None).unwrap();
        assert_eq!(report.received(), 0);
        assert_eq!(report.dropped_percent(), 100);

        network
            .config_link_status("s1", "h1", UpdateLinkStatus::Up)
            .unwrap();
        let report = network.ping(&hosts, None).unwrap();
        assert_eq!(report.received(), 2);
    }

    #[test]
    fn test_link_status_requires_existing_link() {
        let mut network = star_network().call();

        assert!(matches!(
            network.config_link_status("h1", "h2", UpdateLinkStatus::Down),
            Err(NetworkError::NotConnected(..))
        ));
        assert!(matches!(
            network.config_link_status("h1", "nope", UpdateLinkStatus::Down),
            Err(NetworkError::UnknownNode(_))
        ));
        assert!(network.links().iter().all(|l| l.is_up()));
    }

    #[test]
    fn test_stopped_switch_does_not_forward() {
        let mut network = star_network().call();
        network.stop_switch("s1").unwrap();

        let report = network.ping(&names(&["h1", "h2"]), None).unwrap();
        assert_eq!(report.received(), 0);
        assert!(matches!(
            network.stop_switch("h1"),
            Err(NetworkError::NotASwitch(_))
        ));

        network.start_switch("s1").unwrap();
        let report = network.ping(&names(&["h1", "h2"]), None).unwrap();
        assert_eq!(report.received(), 2);
    }

    #[test]
    fn test_ping_rtt_follows_link_delays() {
        let params = LinkParams {
            delay: Some("5ms".to_string()),
            ..LinkParams::default()
        };
        let mut network = star_network().link_params(params).call();

        let report = network.ping(&names(&["h1", "h2"]), None).unwrap();
        let (_, outcome) = report.outcomes().next().unwrap();

        // Two links of 5ms each way, plus per-hop overhead
        assert_eq!(outcome.rtt, Some(Duration::from_micros(20_100)));

        let report = network
            .ping(&names(&["h1", "h2"]), Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(report.received(), 0);
    }

    #[test]
    fn test_ping_with_loss_is_deterministic_per_seed() {
        let params = LinkParams {
            loss: Some(50.0),
            ..LinkParams::default()
        };
        let hosts = names(&["h1", "h2", "h3", "h4"]);

        let run = || {
            let mut network = star_network()
                .hosts(4)
                .link_params(params.clone())
                .seed(7)
                .call();
            let report = network.ping(&hosts, None).unwrap();
            report
                .outcomes()
                .map(|(_, o)| o.rtt.is_some())
                .collect::<Vec<_>>()
        };

        let first = run();
        assert_eq!(first, run());
        assert!(first.iter().any(|received| !received));
    }

    #[test]
    fn test_iperf_uses_bottleneck_bandwidth() {
        let params = LinkParams {
            bw: Some(10.0),
            ..LinkParams::default()
        };
        let network = star_network().link_params(params).call();

        let tcp = network.iperf("h1", "h2", L4Type::Tcp).unwrap();
        assert!((tcp.server_mbps - 9.5).abs() < 1e-9);
        assert!((tcp.client_mbps - 9.6).abs() < 1e-9);

        let udp = network
            .iperf("h1", "h2", L4Type::Udp { offered_mbps: 20.0 })
            .unwrap();
        assert!((udp.server_mbps - 10.0).abs() < 1e-9);
        assert!((udp.client_mbps - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_iperf_between_disconnected_hosts_fails() {
        let mut network = star_network().call();
        network
            .add_host(HostConfig {
                name: "h3".to_string(),
                ip: "10.0.0.3".parse().unwrap(),
                mac: MacAddr::from_u64(3),
            })
            .unwrap();

        assert!(matches!(
            network.iperf("h1", "h3", L4Type::Tcp),
            Err(NetworkError::NotConnected(..))
        ));
    }

    #[test]
    fn test_dpctl_dump_ports_lists_peers() {
        let network = star_network().call();

        let output = network.dpctl("s1", &["dump-ports"]).unwrap();
        assert_eq!(
            output,
            "s1: 2 ports\n  port  1: s1-eth1 -> h1-eth0 (UP)\n  port  2: s1-eth2 -> h2-eth0 (UP)\n"
        );
        assert!(network.dpctl("s1", &["del-flows"]).is_err());
        assert!(matches!(
            network.dpctl("h1", &["show"]),
            Err(NetworkError::NotASwitch(_))
        ));
    }
}
