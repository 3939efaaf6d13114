use crate::network::NetworkError;
use crate::network::addr::{Ipv4Cidr, MacAddr};
use crate::network::link::LinkId;
use crate::shell::NodeShell;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::debug;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Host,
    Switch,
    Controller,
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Host => write!(f, "Host"),
            NodeKind::Switch => write!(f, "Switch"),
            NodeKind::Controller => write!(f, "Controller"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Interface {
    pub(crate) name: String,
    pub(crate) port: u16,
    pub(crate) ip: Option<Ipv4Addr>,
    pub(crate) mac: Option<MacAddr>,
    pub(crate) link: LinkId,
}

impl Interface {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.ip
    }

    pub fn mac(&self) -> Option<MacAddr> {
        self.mac
    }

    pub fn link(&self) -> LinkId {
        self.link
    }
}

pub struct Node {
    pub(crate) name: Arc<str>,
    pub(crate) kind: NodeKind,
    pub(crate) ip: Option<Ipv4Cidr>,
    pub(crate) mac: Option<MacAddr>,
    pub(crate) interfaces: Vec<Interface>,
    /// Only meaningful for switches
    pub(crate) running: bool,
    /// Only meaningful for controllers
    pub(crate) port: Option<u16>,
    shell: Box<dyn NodeShell>,
}

impl Node {
    pub(crate) fn host(
        name: Arc<str>,
        ip: Ipv4Cidr,
        mac: MacAddr,
        shell: Box<dyn NodeShell>,
    ) -> Self {
        Self {
            name,
            kind: NodeKind::Host,
            ip: Some(ip),
            mac: Some(mac),
            interfaces: Vec::new(),
            running: false,
            port: None,
            shell,
        }
    }

    pub(crate) fn switch(name: Arc<str>, shell: Box<dyn NodeShell>) -> Self {
        Self {
            name,
            kind: NodeKind::Switch,
            ip: None,
            mac: None,
            interfaces: Vec::new(),
            running: true,
            port: None,
            shell,
        }
    }

    pub(crate) fn controller(
        name: Arc<str>,
        ip: Ipv4Cidr,
        port: u16,
        shell: Box<dyn NodeShell>,
    ) -> Self {
        Self {
            name,
            kind: NodeKind::Controller,
            ip: Some(ip),
            mac: None,
            interfaces: Vec::new(),
            running: false,
            port: Some(port),
            shell,
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_host(&self) -> bool {
        self.kind == NodeKind::Host
    }

    pub fn is_switch(&self) -> bool {
        self.kind == NodeKind::Switch
    }

    /// The address other nodes use to reach this one, if it has any
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.ip.map(|cidr| cidr.address())
    }

    pub fn cidr(&self) -> Option<Ipv4Cidr> {
        self.ip
    }

    pub fn mac(&self) -> Option<MacAddr> {
        self.mac
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn interface_names(&self) -> impl Iterator<Item = &str> {
        self.interfaces.iter().map(|i| i.name.as_str())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether a foreground command is still running on this node
    pub fn waiting(&self) -> bool {
        self.shell.waiting()
    }

    /// Starts `cmd` in the background; the node is waiting until its output ends
    pub fn send_cmd(&mut self, cmd: &str) -> Result<(), NetworkError> {
        if self.shell.waiting() {
            return Err(NetworkError::NodeBusy(self.name.to_string()));
        }

        self.shell.send_cmd(cmd)?;
        debug!(node = &*self.name, cmd, pid = self.shell.pid(), "started command");
        Ok(())
    }

    pub fn shell_mut(&mut self) -> &mut dyn NodeShell {
        self.shell.as_mut()
    }

    /// Adds an interface for `link`, returning its name
    pub(crate) fn attach_interface(&mut self, link: LinkId) -> String {
        let first_port = match self.kind {
            NodeKind::Switch => 1,
            NodeKind::Host | NodeKind::Controller => 0,
        };
        let port = self
            .interfaces
            .iter()
            .map(|i| i.port + 1)
            .max()
            .unwrap_or(first_port);

        // The default interface carries the node's own addresses
        let (ip, mac) = if self.interfaces.is_empty() {
            (self.ip(), self.mac)
        } else {
            (None, None)
        };

        let name = format!("{}-eth{port}", self.name);
        self.interfaces.push(Interface {
            name: name.clone(),
            port,
            ip,
            mac,
            link,
        });

        name
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} {}:", self.kind, self.name)?;

        let interfaces: Vec<_> = self
            .interfaces
            .iter()
            .map(|i| match i.ip {
                Some(ip) => format!("{}:{ip}", i.name),
                None => i.name.clone(),
            })
            .collect();

        if self.kind != NodeKind::Controller {
            write!(f, " intfs={}", interfaces.join(","))?;
        }
        if self.kind == NodeKind::Switch {
            write!(f, " running={}", self.running)?;
        }

        if let Some(ip) = self.ip() {
            write!(f, " ip={ip}")?;
        }
        if let Some(mac) = self.mac {
            write!(f, " mac={mac}")?;
        }
        if let Some(port) = self.port {
            write!(f, " port={port}")?;
        }
        if let Some(pid) = self.shell.pid() {
            write!(f, " pid={pid}")?;
        }

        write!(f, ">")
    }
}
