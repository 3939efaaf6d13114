//! Commands that change the topology at runtime

use super::{invalid_value, key_values};
use crate::console::{CommandResult, Console, ConsoleError, Flow};
use std::io::Write;
use std::net::Ipv4Addr;
use std::str::FromStr;
use virtual_network::HostConfig;
use virtual_network::network::HOST_SUBNET_BASE;
use virtual_network::network::addr::{DEFAULT_HOST_PREFIX, Ipv4Cidr, MacAddr};
use virtual_network::network::event::UpdateLinkStatus;
use virtual_network::network::link::LinkParams;
use virtual_network::network::registry::Registry;

const HOST_CLASS: &str = "Host";

/// The parameters of `addhost`, validated but not yet applied
#[derive(Debug, Default, PartialEq)]
struct HostRequest {
    ip: Option<Ipv4Addr>,
    mac: Option<MacAddr>,
}

pub(crate) fn do_addhost(console: &mut Console, args: &str) -> CommandResult {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    let Some((&name, params)) = tokens.split_first() else {
        return Err(ConsoleError::Usage(
            "Usage: addhost hostname [ip=X.X.X.X] [mac=XX:XX:XX:XX:XX:XX]".to_string(),
        ));
    };

    if console.network.registry().contains(name) {
        return Err(ConsoleError::NameCollision(name.to_string()));
    }

    let request = parse_host_request(params)?;
    let ip = match request.ip {
        Some(ip) => ip,
        None => next_free_host_address(console.network.registry())?,
    };
    let mac = request.mac.unwrap_or_else(|| {
        let host_count = console.network.registry().hosts().count() as u64;
        MacAddr::from_u64(host_count + 1)
    });

    console.network.add_host(HostConfig {
        name: name.to_string(),
        ip: Ipv4Cidr::new(ip, DEFAULT_HOST_PREFIX),
        mac,
    })?;

    writeln!(console.output, "Added host {name} with IP {ip} and MAC {mac}")?;
    writeln!(
        console.output,
        "Host {name} is isolated - use \"addlink {name} <switch>\" to connect it"
    )?;

    Ok(Flow::Continue)
}

fn parse_host_request(params: &[&str]) -> Result<HostRequest, ConsoleError> {
    let mut request = HostRequest::default();
    for (key, value) in key_values(params) {
        match key {
            "ip" => {
                if !looks_like_ipv4(value) {
                    return Err(ConsoleError::Validation(format!(
                        "Invalid IP address format: {value}"
                    )));
                }

                let ip = value.parse().map_err(|_| {
                    ConsoleError::Validation(format!("Invalid IP address: {value}"))
                })?;
                request.ip = Some(ip);
            }
            "mac" => {
                let mac = MacAddr::from_str(value).map_err(|_| {
                    ConsoleError::Validation(format!("Invalid MAC address format: {value}"))
                })?;
                request.mac = Some(mac);
            }
            "cls" => {
                if value != HOST_CLASS {
                    return Err(ConsoleError::Validation(format!(
                        "Unknown host class: {value}"
                    )));
                }
            }
            _ => {
                return Err(ConsoleError::Validation(format!(
                    "Unknown parameter: {key}"
                )));
            }
        }
    }

    Ok(request)
}

/// Four dot-separated groups of one to three digits
fn looks_like_ipv4(value: &str) -> bool {
    let groups: Vec<&str> = value.split('.').collect();
    groups.len() == 4
        && groups
            .iter()
            .all(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()))
}

/// The lowest free address in `10.0.0.1..=10.0.0.254`
pub(crate) fn next_free_host_address(registry: &Registry) -> Result<Ipv4Addr, ConsoleError> {
    let [a, b, c, _] = HOST_SUBNET_BASE.octets();
    let taken: Vec<u8> = registry
        .hosts()
        .filter_map(|host| host.ip())
        .filter_map(|ip| match ip.octets() {
            [w, x, y, z] if [w, x, y] == [a, b, c] => Some(z),
            _ => None,
        })
        .collect();

    (1..=254)
        .find(|suffix| !taken.contains(suffix))
        .map(|suffix| Ipv4Addr::new(a, b, c, suffix))
        .ok_or_else(|| {
            ConsoleError::Validation(format!("address block {HOST_SUBNET_BASE}/24 exhausted"))
        })
}

pub(crate) fn do_addlink(console: &mut Console, args: &str) -> CommandResult {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    let [a, b, params @ ..] = tokens.as_slice() else {
        return Err(ConsoleError::Usage(
            "Usage: addlink node1 node2 [parameters]".to_string(),
        ));
    };

    let params = parse_link_params(params)?;
    let link = console.network.add_link(a, b, params)?;
    writeln!(console.output, "Added link {link}")?;

    Ok(Flow::Continue)
}

fn parse_link_params(params: &[&str]) -> Result<LinkParams, ConsoleError> {
    let mut link_params = LinkParams::default();
    for (key, value) in key_values(params) {
        match key {
            "bw" => {
                link_params.bw = Some(value.parse().map_err(|_| invalid_value(key, value))?);
            }
            "loss" => {
                let loss = value.strip_suffix('%').unwrap_or(value);
                link_params.loss = Some(loss.parse().map_err(|_| invalid_value(key, value))?);
            }
            "max_queue_size" => {
                link_params.max_queue_size =
                    Some(value.parse().map_err(|_| invalid_value(key, value))?);
            }
            "delay" => link_params.delay = Some(value.to_string()),
            _ => {
                link_params.extra.insert(key.to_string(), value.to_string());
            }
        }
    }

    Ok(link_params)
}

pub(crate) fn do_link(console: &mut Console, args: &str) -> CommandResult {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    let [a, b, status] = tokens.as_slice() else {
        return Err(ConsoleError::Usage(
            "invalid number of args: link end1 end2 [up down]".to_string(),
        ));
    };

    let status: UpdateLinkStatus = status.parse().map_err(|_| {
        ConsoleError::Usage("invalid type: link end1 end2 [up down]".to_string())
    })?;
    console.network.config_link_status(a, b, status)?;

    Ok(Flow::Continue)
}

pub(crate) fn do_switch(console: &mut Console, args: &str) -> CommandResult {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    let [name, action] = tokens.as_slice() else {
        return Err(ConsoleError::Usage(
            "invalid number of args: switch <switch name> {start, stop}".to_string(),
        ));
    };

    let is_switch = console
        .network
        .registry()
        .get(name)
        .is_some_and(|node| node.is_switch());
    if !is_switch {
        return Err(ConsoleError::Validation(format!("invalid switch: {name}")));
    }

    match *action {
        "start" => console.network.start_switch(name)?,
        "stop" => console.network.stop_switch(name)?,
        _ => {
            return Err(ConsoleError::Usage(
                "invalid command: switch <switch name> {start, stop}".to_string(),
            ));
        }
    }

    Ok(Flow::Continue)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::builtin::{self, BuiltinTopology};
    use crate::console::test_util::{TestConsole, console};
    use virtual_network::network::spec::{HostSpec, NetworkSpec};

    fn minimal() -> TestConsole {
        console(
            builtin::network_spec(BuiltinTopology::Minimal, &Default::default()),
            b"",
        )
    }

    #[test]
    fn test_host_request_validation() {
        assert_eq!(
            parse_host_request(&["ip=10.0.0.7", "mac=00:11:22:33:44:55", "stray", "cls=Host"])
                .unwrap(),
            HostRequest {
                ip: Some(Ipv4Addr::new(10, 0, 0, 7)),
                mac: Some(MacAddr::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55])),
            }
        );

        let error = |params: &[&str]| parse_host_request(params).unwrap_err().to_string();
        assert_eq!(error(&["ip=10.0.0"]), "Invalid IP address format: 10.0.0");
        assert_eq!(error(&["ip=10.0.0.999"]), "Invalid IP address: 10.0.0.999");
        assert_eq!(error(&["mac=00:11:22"]), "Invalid MAC address format: 00:11:22");
        assert_eq!(error(&["cls=Docker"]), "Unknown host class: Docker");
        assert_eq!(error(&["color=blue"]), "Unknown parameter: color");
    }

    #[test]
    fn test_next_free_address_fills_gaps() {
        let mut spec = NetworkSpec::default();
        for (name, ip) in [("a", "10.0.0.1"), ("b", "10.0.0.3"), ("c", "192.168.0.2")] {
            let mut host = HostSpec::new(name);
            host.ip = Some(ip.parse().unwrap());
            spec.hosts.push(host);
        }
        let t = console(spec, b"");

        assert_eq!(
            next_free_host_address(t.console.network().registry()).unwrap(),
            Ipv4Addr::new(10, 0, 0, 2)
        );
    }

    #[test]
    fn test_next_free_address_reports_exhaustion() {
        let mut spec = NetworkSpec::default();
        for i in 1..=254u8 {
            let mut host = HostSpec::new(&format!("h{i}"));
            host.ip = Some(Ipv4Cidr::new(Ipv4Addr::new(10, 0, 0, i), 24));
            spec.hosts.push(host);
        }
        let t = console(spec, b"");

        assert_eq!(
            next_free_host_address(t.console.network().registry())
                .unwrap_err()
                .to_string(),
            "address block 10.0.0.0/24 exhausted"
        );
    }

    #[tokio::test]
    async fn test_addhost_assigns_defaults() {
        let mut t = minimal();

        t.console.onecmd("addhost h3").await;
        assert_eq!(
            t.output.take(),
            "Added host h3 with IP 10.0.0.3 and MAC 00:00:00:00:00:03\n\
             Host h3 is isolated - use \"addlink h3 <switch>\" to connect it\n"
        );

        let h3 = t.console.network().node("h3").unwrap();
        assert!(h3.interfaces().is_empty());
        assert_eq!(h3.ip(), Some(Ipv4Addr::new(10, 0, 0, 3)));
    }

    #[tokio::test]
    async fn test_addhost_failures_leave_registry_untouched() {
        let mut t = minimal();
        let before = t.console.network().registry().len();

        t.console.onecmd("addhost h1").await;
        t.console.onecmd("addhost h9 ip=10.0.0.999").await;
        t.console.onecmd("addhost h9 ip=banana").await;
        t.console.onecmd("addhost").await;

        assert_eq!(
            t.output.take(),
            "Host h1 already exists\n\
             Invalid IP address: 10.0.0.999\n\
             Invalid IP address format: banana\n\
             Usage: addhost hostname [ip=X.X.X.X] [mac=XX:XX:XX:XX:XX:XX]\n"
        );
        assert_eq!(t.console.network().registry().len(), before);
    }

    #[tokio::test]
    async fn test_addlink_passes_parameters_through() {
        let mut t = minimal();
        t.console.onecmd("addhost h3").await;
        t.output.take();

        t.console
            .onecmd("addlink h3 s1 bw=10 delay=5ms loss=1% max_queue_size=100 enable_ecn=1 junk")
            .await;
        assert_eq!(t.output.take(), "Added link h3-eth0<->s1-eth3\n");

        let link = t.console.network().links().last().unwrap();
        let params = link.params();
        assert_eq!(params.bw, Some(10.0));
        assert_eq!(params.delay.as_deref(), Some("5ms"));
        assert_eq!(params.loss, Some(1.0));
        assert_eq!(params.max_queue_size, Some(100));
        assert_eq!(params.extra.get("enable_ecn").map(String::as_str), Some("1"));
        assert_eq!(params.extra.len(), 1);
    }

    #[tokio::test]
    async fn test_addlink_errors() {
        let mut t = minimal();
        let links = t.console.network().links().len();

        t.console.onecmd("addlink h1").await;
        t.console.onecmd("addlink h1 s1 bw=fast").await;
        t.console.onecmd("addlink h1 nowhere").await;

        assert_eq!(
            t.output.take(),
            "Usage: addlink node1 node2 [parameters]\n\
             Invalid value for bw: fast\n\
             node 'nowhere' not in network\n"
        );
        assert_eq!(t.console.network().links().len(), links);
    }

    #[tokio::test]
    async fn test_link_argument_errors_change_nothing() {
        let mut t = minimal();

        t.console.onecmd("link h1 s1").await;
        t.console.onecmd("link h1 s1 sideways").await;
        assert_eq!(
            t.output.take(),
            "invalid number of args: link end1 end2 [up down]\n\
             invalid type: link end1 end2 [up down]\n"
        );
        assert!(t.console.network().links().iter().all(|l| l.is_up()));

        t.console.onecmd("link s1 h1 down").await;
        assert_eq!(t.output.take(), "");
        assert!(!t.console.network().links()[0].is_up());
    }

    #[tokio::test]
    async fn test_switch_start_stop() {
        let mut t = minimal();

        t.console.onecmd("switch s1 stop").await;
        assert!(!t.console.network().node("s1").unwrap().is_running());

        t.console.onecmd("switch h1 stop").await;
        t.console.onecmd("switch s1 reboot").await;
        t.console.onecmd("switch s1").await;
        assert_eq!(
            t.output.take(),
            "invalid switch: h1\n\
             invalid command: switch <switch name> {start, stop}\n\
             invalid number of args: switch <switch name> {start, stop}\n"
        );

        t.console.onecmd("switch s1 start").await;
        assert!(t.console.network().node("s1").unwrap().is_running());
    }
}
