use crate::config::cli::CliOpt;
use crate::config::topology::TopologyJson;
use anyhow::Context;
use std::fs;
use std::path::Path;
use virtual_network::network::spec::NetworkSpec;

pub mod builtin;
pub mod cli;
pub mod topology;

/// The topology selected on the command line, with `--topology` taking precedence over `--topo`
pub fn load_network_spec(options: &CliOpt) -> anyhow::Result<NetworkSpec> {
    match &options.topology {
        Some(path) => load_topology_file(path),
        None => Ok(builtin::network_spec(options.topo, &options.bottleneck)),
    }
}

fn load_topology_file(path: &Path) -> anyhow::Result<NetworkSpec> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read topology file {}", path.display()))?;
    let topology: TopologyJson = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse topology file {}", path.display()))?;

    Ok(topology.into())
}
