use crate::console::commands::{inspect, topology, utility};
use crate::console::{CommandResult, Console};
use futures::future::LocalBoxFuture;
use std::collections::BTreeMap;
use virtual_network::network::registry::Registry;

pub(crate) type SyncHandler = fn(&mut Console, &str) -> CommandResult;
pub(crate) type AsyncHandler = for<'a> fn(&'a mut Console, &'a str) -> LocalBoxFuture<'a, CommandResult>;

#[derive(Clone, Copy)]
pub(crate) enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

pub(crate) struct Command {
    pub(crate) help: &'static str,
    pub(crate) handler: Handler,
}

/// The built-in commands, keyed by the word that invokes them
pub(crate) struct CommandTable {
    commands: BTreeMap<&'static str, Command>,
}

impl CommandTable {
    pub(crate) fn new() -> Self {
        let mut table = Self {
            commands: BTreeMap::new(),
        };

        // Inspection
        table.add_sync("nodes", "List all nodes.", inspect::do_nodes);
        table.add_sync("ports", "Display ports and interfaces for each switch.", inspect::do_ports);
        table.add_sync("net", "List network connections.", inspect::do_net);
        table.add_sync("intfs", "List interfaces.", inspect::do_intfs);
        table.add_sync("dump", "Dump node info.", inspect::do_dump);
        table.add_sync("links", "Report on links.", inspect::do_links);
        table.add_sync("pingall", "Ping between all hosts.\nUsage: pingall [timeout]", inspect::do_pingall);
        table.add_sync("pingpair", "Ping between first two hosts, useful for testing.", inspect::do_pingpair);
        table.add_sync("pingallfull", "Ping between all hosts, returns all ping results.", inspect::do_pingallfull);
        table.add_sync(
            "pingpairfull",
            "Ping between first two hosts, returns all ping results.",
            inspect::do_pingpairfull,
        );
        table.add_sync(
            "iperf",
            "Simple iperf TCP test between two (optionally specified) hosts.\nUsage: iperf node1 node2",
            inspect::do_iperf,
        );
        table.add_sync(
            "iperfudp",
            "Simple iperf UDP test between two (optionally specified) hosts.\nUsage: iperfudp bw node1 node2",
            inspect::do_iperfudp,
        );
        table.add_sync(
            "dpctl",
            "Run dpctl command on all switches.\nUsage: dpctl command [arg1] [arg2] ...",
            inspect::do_dpctl,
        );
        table.add_sync("wait", "Wait until all switches have connected to a controller.", inspect::do_wait);

        // Topology changes
        table.add_sync(
            "addhost",
            "Add a new host to the network.\n\
             Usage: addhost hostname [ip=X.X.X.X] [mac=XX:XX:XX:XX:XX:XX] [cls=Host]\n\
             The new host is isolated until links are added to it.",
            topology::do_addhost,
        );
        table.add_sync(
            "addlink",
            "Add a link between two nodes with custom parameters.\n\
             Usage: addlink node1 node2 [bw=X] [delay=Xms] [loss=X%] [max_queue_size=X]\n\
             Other key=value parameters are kept as they are.",
            topology::do_addlink,
        );
        table.add_sync(
            "link",
            "Bring link(s) between two nodes up or down.\nUsage: link node1 node2 [up/down]",
            topology::do_link,
        );
        table.add_sync(
            "switch",
            "Starts or stops a switch.\nUsage: switch <switch name> {start, stop}",
            topology::do_switch,
        );

        // Console utilities
        table.add_sync("help", "Describe available commands.\nUsage: help [command]", utility::do_help);
        table.add_sync(
            "history",
            "List previously entered commands.\nUsage: history [count]",
            utility::do_history,
        );
        table.add_sync("exit", "Exit.", utility::do_exit);
        table.add_sync("quit", "Exit.", utility::do_exit);
        table.add_async("sh", "Run an external shell command.\nUsage: sh [cmd args]", utility::do_sh);
        table.add_async("time", "Measure time taken for any command.\nUsage: time <command>", utility::do_time);
        table.add_async(
            "noecho",
            "Run an interactive command with echoing turned off.\nUsage: noecho [cmd args]",
            utility::do_noecho,
        );
        table.add_async("source", "Read commands from an input file.\nUsage: source <file>", utility::do_source);

        table
    }

    fn add_sync(&mut self, name: &'static str, help: &'static str, handler: SyncHandler) {
        self.commands.insert(
            name,
            Command {
                help,
                handler: Handler::Sync(handler),
            },
        );
    }

    fn add_async(&mut self, name: &'static str, help: &'static str, handler: AsyncHandler) {
        self.commands.insert(
            name,
            Command {
                help,
                handler: Handler::Async(handler),
            },
        );
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Command> {
        let name = if name == "?" { "help" } else { name };
        self.commands.get(name)
    }

    /// Command names, in alphabetical order
    pub(crate) fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }
}

/// Drops everything from the first `#` onwards
pub(crate) fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(index) => &line[..index],
        None => line,
    }
}

/// Splits a line into its first word and the (trimmed) rest, or `None` for a blank line
pub(crate) fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match line.split_once(char::is_whitespace) {
        Some((word, rest)) => Some((word, rest.trim())),
        None => Some((line, "")),
    }
}

/// Replaces every token naming a node with that node's address
///
/// Tokens are separated by single spaces, so runs of spaces are preserved.
pub(crate) fn substitute_node_names(registry: &Registry, args: &str) -> String {
    args.split(' ')
        .map(|token| match registry.get(token).and_then(|node| node.ip()) {
            Some(ip) => ip.to_string(),
            None => token.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
