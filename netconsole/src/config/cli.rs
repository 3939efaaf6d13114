use crate::config::builtin::{BottleneckParams, BuiltinTopology};
use clap::Parser;
use std::path::PathBuf;

/// Interactive console for an emulated network of hosts, switches and links
#[derive(Parser, Debug, Clone)]
pub struct CliOpt {
    /// Path to a JSON file describing the topology (overrides `--topo`)
    #[arg(long)]
    pub topology: Option<PathBuf>,

    /// A built-in topology
    #[arg(long, value_enum, default_value_t = BuiltinTopology::Minimal)]
    pub topo: BuiltinTopology,

    #[command(flatten)]
    pub bottleneck: BottleneckParams,

    /// Run the commands in this file and exit, instead of starting an interactive session
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// The program used to run node commands and `sh`
    #[arg(long, default_value = "sh")]
    pub shell: PathBuf,

    /// The random seed used for the emulated network (governing packet loss)
    #[arg(long, default_value_t = 42)]
    pub network_rng_seed: u64,

    /// Where the session history is kept (defaults to `~/.netconsole_history`)
    #[arg(long)]
    pub history_file: Option<PathBuf>,

    /// Do not load or save the session history
    #[arg(long)]
    pub no_history: bool,
}
