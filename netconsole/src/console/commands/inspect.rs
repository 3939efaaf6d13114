//! Commands that report on the network without changing it

use super::invalid_value;
use crate::console::{CommandResult, Console, ConsoleError, Flow};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use virtual_network::NetworkError;
use virtual_network::network::measure::{self, IperfReport, L4Type, PingReport};

/// What `iperfudp` offers when no bandwidth is given
const DEFAULT_UDP_BANDWIDTH: &str = "10M";

pub(crate) fn do_nodes(console: &mut Console, _args: &str) -> CommandResult {
    let names: Vec<&str> = console
        .network
        .registry()
        .iter_sorted()
        .map(|node| &**node.name())
        .collect();

    writeln!(console.output, "available nodes are: ")?;
    writeln!(console.output, "{}", names.join(" "))?;
    Ok(Flow::Continue)
}

pub(crate) fn do_ports(console: &mut Console, _args: &str) -> CommandResult {
    for switch in console.network.registry().switches() {
        write!(console.output, "{} lo:0 ", switch.name())?;
        for interface in switch.interfaces() {
            write!(console.output, "{}:{} ", interface.name(), interface.port())?;
        }
        writeln!(console.output)?;
    }

    Ok(Flow::Continue)
}

pub(crate) fn do_net(console: &mut Console, _args: &str) -> CommandResult {
    let links = console.network.links();
    for node in console.network.registry().iter_sorted() {
        write!(console.output, "{}", node.name())?;
        if node.is_switch() {
            write!(console.output, " lo: ")?;
        }

        for interface in node.interfaces() {
            let peer = links[interface.link()]
                .peer_of(node.name())
                .map(|peer| peer.interface.as_str())
                .unwrap_or("");
            write!(console.output, " {}:{peer}", interface.name())?;
        }
        writeln!(console.output)?;
    }

    Ok(Flow::Continue)
}

pub(crate) fn do_intfs(console: &mut Console, _args: &str) -> CommandResult {
    for node in console.network.registry().iter_sorted() {
        let mut names: Vec<&str> = node.interface_names().collect();
        if node.is_switch() {
            names.insert(0, "lo");
        }
        writeln!(console.output, "{}: {}", node.name(), names.join(","))?;
    }

    Ok(Flow::Continue)
}

pub(crate) fn do_dump(console: &mut Console, _args: &str) -> CommandResult {
    for node in console.network.registry().iter_sorted() {
        writeln!(console.output, "{node}")?;
    }

    Ok(Flow::Continue)
}

pub(crate) fn do_links(console: &mut Console, _args: &str) -> CommandResult {
    for link in console.network.links() {
        write!(console.output, "{link} ({})", link.status_str())?;
        if !link.params().is_empty() {
            write!(console.output, " {}", link.params())?;
        }
        writeln!(console.output)?;
    }

    Ok(Flow::Continue)
}

fn host_names(console: &Console) -> Vec<Arc<str>> {
    console
        .network
        .registry()
        .hosts()
        .map(|host| host.name().clone())
        .collect()
}

fn first_two_hosts(console: &Console) -> Vec<Arc<str>> {
    let mut hosts = host_names(console);
    hosts.truncate(2);
    hosts
}

fn parse_timeout(args: &str) -> Result<Option<Duration>, ConsoleError> {
    let Some(value) = args.split_whitespace().next() else {
        return Ok(None);
    };

    value
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .map(Some)
        .ok_or_else(|| invalid_value("timeout", value))
}

pub(crate) fn do_pingall(console: &mut Console, args: &str) -> CommandResult {
    let timeout = parse_timeout(args)?;
    let hosts = host_names(console);
    ping(console, &hosts, timeout, false)
}

pub(crate) fn do_pingpair(console: &mut Console, _args: &str) -> CommandResult {
    let hosts = first_two_hosts(console);
    ping(console, &hosts, None, false)
}

pub(crate) fn do_pingallfull(console: &mut Console, _args: &str) -> CommandResult {
    let hosts = host_names(console);
    ping(console, &hosts, None, true)
}

pub(crate) fn do_pingpairfull(console: &mut Console, _args: &str) -> CommandResult {
    let hosts = first_two_hosts(console);
    ping(console, &hosts, None, true)
}

fn ping(
    console: &mut Console,
    hosts: &[Arc<str>],
    timeout: Option<Duration>,
    full: bool,
) -> CommandResult {
    let report = console.network.ping(hosts, timeout)?;
    let out = &mut console.output;

    writeln!(out, "*** Ping: testing ping reachability")?;
    write_rows(out, &report)?;

    if full {
        writeln!(out, "*** Results: ")?;
        for (source, outcome) in report.outcomes() {
            let received = u8::from(outcome.rtt.is_some());
            let ms = outcome.rtt.map_or(0.0, |rtt| rtt.as_secs_f64() * 1e3);
            writeln!(
                out,
                " {source}->{}: 1/{received}, rtt min/avg/max/mdev {ms:.3}/{ms:.3}/{ms:.3}/0.000 ms",
                outcome.target
            )?;
        }
    } else if report.sent() == 0 {
        writeln!(out, "*** Warning: No packets sent")?;
    } else {
        writeln!(
            out,
            "*** Results: {}% dropped ({}/{} received)",
            report.dropped_percent(),
            report.received(),
            report.sent()
        )?;
    }

    Ok(Flow::Continue)
}

fn write_rows(out: &mut dyn Write, report: &PingReport) -> std::io::Result<()> {
    for row in &report.rows {
        write!(out, "{} -> ", row.source)?;
        for outcome in &row.outcomes {
            match outcome.rtt {
                Some(_) => write!(out, "{} ", outcome.target)?,
                None => write!(out, "X ")?,
            }
        }
        writeln!(out)?;
    }

    Ok(())
}

/// Defaults to the first host as client and the last one as server
fn iperf_endpoints(console: &Console, names: &[&str]) -> Result<(String, String), ConsoleError> {
    if let [client, server] = names {
        for name in [client, server] {
            if !console.network.registry().contains(name) {
                return Err(NetworkError::UnknownNode(name.to_string()).into());
            }
        }
        return Ok((client.to_string(), server.to_string()));
    }

    let hosts = host_names(console);
    match (hosts.first(), hosts.last()) {
        (Some(client), Some(server)) if hosts.len() >= 2 => {
            Ok((client.to_string(), server.to_string()))
        }
        _ => Err(ConsoleError::Validation(
            "iperf needs at least two hosts".to_string(),
        )),
    }
}

pub(crate) fn do_iperf(console: &mut Console, args: &str) -> CommandResult {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    if !matches!(tokens.len(), 0 | 2) {
        return Err(ConsoleError::Usage(
            "invalid number of args: iperf src dst".to_string(),
        ));
    }

    let (client, server) = iperf_endpoints(console, &tokens)?;
    iperf(console, &client, &server, L4Type::Tcp, None)
}

pub(crate) fn do_iperfudp(console: &mut Console, args: &str) -> CommandResult {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    let (bw, hosts) = match tokens.as_slice() {
        [] => (DEFAULT_UDP_BANDWIDTH, &[][..]),
        [bw, hosts @ ..] if hosts.len() == 2 => (*bw, hosts),
        _ => {
            return Err(ConsoleError::Usage(
                "invalid number of args: iperfudp bw src dst\nbw examples: 10M".to_string(),
            ));
        }
    };

    let offered_mbps = measure::parse_bandwidth(bw).ok_or_else(|| invalid_value("bw", bw))?;
    let (client, server) = iperf_endpoints(console, hosts)?;
    iperf(
        console,
        &client,
        &server,
        L4Type::Udp { offered_mbps },
        Some(bw),
    )
}

fn iperf(
    console: &mut Console,
    client: &str,
    server: &str,
    l4_type: L4Type,
    offered: Option<&str>,
) -> CommandResult {
    writeln!(
        console.output,
        "*** Iperf: testing {l4_type} bandwidth between {client} and {server} "
    )?;

    let report = console.network.iperf(client, server, l4_type)?;
    writeln!(console.output, "*** Results: {}", format_results(&report, offered))?;
    Ok(Flow::Continue)
}

/// Formats the measured rates as a bracketed list of quoted strings
fn format_results(report: &IperfReport, offered: Option<&str>) -> String {
    let rates = [
        measure::format_rate(report.server_mbps),
        measure::format_rate(report.client_mbps),
    ];
    let quoted: Vec<String> = offered
        .map(str::to_string)
        .into_iter()
        .chain(rates)
        .map(|value| format!("'{value}'"))
        .collect();

    format!("[{}]", quoted.join(", "))
}

pub(crate) fn do_dpctl(console: &mut Console, args: &str) -> CommandResult {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(ConsoleError::Usage(
            "usage: dpctl command [arg1] [arg2] ...".to_string(),
        ));
    }

    let switches: Vec<Arc<str>> = console
        .network
        .registry()
        .switches()
        .map(|switch| switch.name().clone())
        .collect();

    for switch in switches {
        writeln!(console.output, "*** {switch} {}", "-".repeat(72))?;
        let dump = console.network.dpctl(&switch, &tokens)?;
        write!(console.output, "{dump}")?;
    }

    Ok(Flow::Continue)
}

pub(crate) fn do_wait(console: &mut Console, _args: &str) -> CommandResult {
    writeln!(console.output, "*** Waiting for switches to connect")?;

    let states = console.network.wait_connected();
    for state in states.iter().filter(|s| s.running) {
        write!(console.output, "{} ", state.name)?;
    }
    writeln!(console.output)?;

    for state in states.iter().filter(|s| !s.running) {
        writeln!(console.output, "*** {} is stopped and will not connect", state.name)?;
    }

    Ok(Flow::Continue)
}
