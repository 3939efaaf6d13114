use crate::network::addr::{Ipv4Cidr, MacAddr};
use crate::network::link::LinkParams;

/// A static description of a topology, realized by
/// [`VirtualNetwork::build`](crate::network::VirtualNetwork::build)
#[derive(Clone, Debug, Default)]
pub struct NetworkSpec {
    pub hosts: Vec<HostSpec>,
    pub switches: Vec<SwitchSpec>,
    pub controllers: Vec<ControllerSpec>,
    pub links: Vec<NetworkLinkSpec>,
}

#[derive(Clone, Debug)]
pub struct HostSpec {
    pub name: String,
    /// Assigned from `10.0.0.0/8` in declaration order when missing
    pub ip: Option<Ipv4Cidr>,
    /// Assigned from the host's position in declaration order when missing
    pub mac: Option<MacAddr>,
}

#[derive(Clone, Debug)]
pub struct SwitchSpec {
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct ControllerSpec {
    pub name: String,
    pub ip: Option<Ipv4Cidr>,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct NetworkLinkSpec {
    pub source: String,
    pub target: String,
    pub params: LinkParams,
}

impl HostSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ip: None,
            mac: None,
        }
    }
}

impl SwitchSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl NetworkLinkSpec {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            params: LinkParams::default(),
        }
    }

    pub fn with_params(mut self, params: LinkParams) -> Self {
        self.params = params;
        self
    }
}
