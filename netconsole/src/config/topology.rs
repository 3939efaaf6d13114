//! JSON topology files, as passed through `--topology`

use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use std::collections::BTreeMap;
use virtual_network::network::addr::{Ipv4Cidr, MacAddr};
use virtual_network::network::link::LinkParams;
use virtual_network::network::spec::{
    ControllerSpec, HostSpec, NetworkLinkSpec, NetworkSpec, SwitchSpec,
};

const DEFAULT_CONTROLLER_PORT: u16 = 6653;

#[derive(Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TopologyJson {
    #[serde(default)]
    hosts: Vec<HostJson>,
    #[serde(default)]
    switches: Vec<SwitchJson>,
    #[serde(default)]
    controllers: Vec<ControllerJson>,
    #[serde(default)]
    links: Vec<LinkJson>,
}

#[serde_as]
#[derive(Deserialize, Clone)]
#[serde(deny_unknown_fields)]
struct HostJson {
    name: String,
    /// The host's address, with an optional network prefix (e.g. `10.0.0.1/24`)
    #[serde_as(as = "Option<DisplayFromStr>")]
    ip: Option<Ipv4Cidr>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    mac: Option<MacAddr>,
}

#[derive(Deserialize, Clone)]
#[serde(deny_unknown_fields)]
struct SwitchJson {
    name: String,
}

#[serde_as]
#[derive(Deserialize, Clone)]
#[serde(deny_unknown_fields)]
struct ControllerJson {
    name: String,
    #[serde_as(as = "Option<DisplayFromStr>")]
    ip: Option<Ipv4Cidr>,
    #[serde(default = "default_controller_port")]
    port: u16,
}

fn default_controller_port() -> u16 {
    DEFAULT_CONTROLLER_PORT
}

#[derive(Deserialize, Clone)]
#[serde(deny_unknown_fields)]
struct LinkJson {
    source: String,
    target: String,
    /// The link's bandwidth, in Mbit/s
    #[serde(default)]
    bw: Option<f64>,
    /// The propagation delay of the link (e.g. `10ms`)
    #[serde(default)]
    delay: Option<String>,
    /// The ratio of packets that will be lost, in percent
    #[serde(default)]
    loss: Option<f64>,
    #[serde(default)]
    max_queue_size: Option<u64>,
    /// Flags that are kept with the link but never interpreted
    #[serde(default)]
    extra: BTreeMap<String, String>,
}

impl From<TopologyJson> for NetworkSpec {
    fn from(json: TopologyJson) -> Self {
        let hosts = json
            .hosts
            .into_iter()
            .map(|h| HostSpec {
                name: h.name,
                ip: h.ip,
                mac: h.mac,
            })
            .collect();

        let switches = json
            .switches
            .into_iter()
            .map(|s| SwitchSpec::new(&s.name))
            .collect();

        let controllers = json
            .controllers
            .into_iter()
            .map(|c| ControllerSpec {
                name: c.name,
                ip: c.ip,
                port: c.port,
            })
            .collect();

        let links = json.links.into_iter().map(|l| l.into()).collect();

        Self {
            hosts,
            switches,
            controllers,
            links,
        }
    }
}

impl From<LinkJson> for NetworkLinkSpec {
    fn from(l: LinkJson) -> Self {
        NetworkLinkSpec::new(&l.source, &l.target).with_params(LinkParams {
            bw: l.bw,
            delay: l.delay,
            loss: l.loss,
            max_queue_size: l.max_queue_size,
            extra: l.extra,
        })
    }
}
