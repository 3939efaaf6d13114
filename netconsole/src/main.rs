use anyhow::Context;
use clap::Parser;
use fastrand::Rng;
use netconsole::config::{self, cli::CliOpt};
use netconsole::console::interrupt::Interrupts;
use netconsole::console::{Console, terminal};
use netconsole::history;
use tracing::info;
use tracing_subscriber::EnvFilter;
use virtual_network::VirtualNetwork;
use virtual_network::shell::ProcessShellLauncher;

fn main() -> anyhow::Result<()> {
    let options = CliOpt::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let record_history = options.script.is_none() && !options.no_history;
    let _history = if record_history {
        options
            .history_file
            .clone()
            .or_else(history::default_path)
            .and_then(|path| history::init(&path))
    } else {
        None
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize tokio")?;

    let result = rt.block_on(run(options, record_history));

    // A pending read on stdin would otherwise keep the runtime from shutting down
    rt.shutdown_background();
    result
}

async fn run(options: CliOpt, record_history: bool) -> anyhow::Result<()> {
    let spec = config::load_network_spec(&options)?;
    let network = VirtualNetwork::build(
        spec,
        Box::new(ProcessShellLauncher::new(options.shell.clone())),
        Rng::with_seed(options.network_rng_seed),
    )
    .context("failed to build the network")?;

    let mut console = Console::new(
        network,
        Box::new(tokio::io::stdin()),
        Box::new(std::io::stdout()),
        Interrupts::from_signals(),
    )
    .with_tty(terminal::is_tty(libc::STDIN_FILENO))
    .with_history(record_history)
    .with_local_shell(&options.shell);

    info!("*** Starting CLI");
    match &options.script {
        Some(script) => console
            .run_script(&script.to_string_lossy())
            .await
            .context("failed to run script")?,
        None => console.run().await.context("console failed")?,
    }

    Ok(())
}
