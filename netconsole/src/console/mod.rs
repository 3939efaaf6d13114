//! The interactive console
//!
//! Reads one line at a time, dispatches built-in commands through the [`CommandTable`] and runs
//! everything else as a command on the named node, relaying its input and output until it
//! finishes.

mod commands;
mod dispatch;
pub mod interrupt;
pub mod session;
pub mod terminal;

use crate::console::dispatch::{CommandTable, Handler};
use crate::console::interrupt::Interrupts;
use crate::history;
use futures::future::LocalBoxFuture;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::warn;
use virtual_network::{NetworkError, VirtualNetwork};

pub const PROMPT: &str = "netconsole> ";

/// How long a leftover node command gets to stop before the console gives up on it
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub type ConsoleInput = BufReader<Box<dyn AsyncRead + Unpin>>;

#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Wrong number or shape of arguments
    #[error("{0}")]
    Usage(String),
    /// Arguments with the right shape but an unacceptable value
    #[error("{0}")]
    Validation(String),
    #[error("Host {0} already exists")]
    NameCollision(String),
    #[error("*** Unknown command: {0}")]
    UnknownCommand(String),
    #[error("error reading file {0}")]
    SourceRead(String),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type CommandResult = Result<Flow, ConsoleError>;

/// Whether the console should keep reading commands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

enum LoopExit {
    Exit,
    Interrupted,
}

pub struct Console {
    network: VirtualNetwork,
    input: ConsoleInput,
    output: Box<dyn Write>,
    interrupts: Interrupts,
    commands: CommandTable,
    tty: bool,
    record_history: bool,
    local_shell: PathBuf,
}

impl Console {
    pub fn new(
        network: VirtualNetwork,
        input: Box<dyn AsyncRead + Unpin>,
        output: Box<dyn Write>,
        interrupts: Interrupts,
    ) -> Self {
        Self {
            network,
            input: BufReader::new(input),
            output,
            interrupts,
            commands: CommandTable::new(),
            tty: false,
            record_history: false,
            local_shell: PathBuf::from("sh"),
        }
    }

    /// Whether the console's input is a terminal, which enables terminal mode changes
    pub fn with_tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    /// Whether interactive lines are added to the session history
    pub fn with_history(mut self, record_history: bool) -> Self {
        self.record_history = record_history;
        self
    }

    /// The program used by `sh` to run local commands
    pub fn with_local_shell(mut self, local_shell: impl Into<PathBuf>) -> Self {
        self.local_shell = local_shell.into();
        self
    }

    pub fn network(&self) -> &VirtualNetwork {
        &self.network
    }

    /// Runs the interactive loop until the operator exits or input ends
    pub async fn run(&mut self) -> io::Result<()> {
        loop {
            self.stop_waiting_nodes().await?;

            match self.cmdloop().await? {
                LoopExit::Exit => break,
                LoopExit::Interrupted => {
                    writeln!(self.output, "\nInterrupt")?;
                    self.output.flush()?;
                }
            }
        }

        Ok(())
    }

    /// Runs the commands in `path` and returns, without an interactive prompt
    pub async fn run_script(&mut self, path: &str) -> io::Result<()> {
        self.onecmd(&format!("source {path}")).await;
        self.output.flush()
    }

    async fn cmdloop(&mut self) -> io::Result<LoopExit> {
        loop {
            write!(self.output, "{PROMPT}")?;
            self.output.flush()?;

            let mut raw = Vec::new();
            tokio::select! {
                biased;
                _ = self.interrupts.recv() => return Ok(LoopExit::Interrupted),
                read = self.input.read_until(b'\n', &mut raw) => match read {
                    Ok(0) => {
                        writeln!(self.output)?;
                        return Ok(LoopExit::Exit);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("failed to read console input: {e}");
                        return Ok(LoopExit::Exit);
                    }
                },
            }

            // Stray bytes that are not UTF-8 must not end the session
            let line = String::from_utf8_lossy(&raw);
            if self.record_history {
                history::record(&line);
            }

            let flow = self.onecmd(&line).await;
            self.interrupts.clear();
            if flow == Flow::Exit {
                return Ok(LoopExit::Exit);
            }
        }
    }

    /// Interrupts every node that still runs a command, waiting a bounded time for each
    async fn stop_waiting_nodes(&mut self) -> io::Result<()> {
        for name in self.network.waiting_nodes() {
            writeln!(self.output, "stopping {name}")?;
            self.output.flush()?;

            let Ok(node) = self.network.node_mut(&name) else {
                continue;
            };

            let shell = node.shell_mut();
            if let Err(e) = shell.send_int() {
                warn!(node = &*name, "failed to interrupt node: {e}");
            }

            let drained = tokio::time::timeout(STOP_TIMEOUT, async {
                while shell.waiting() {
                    if shell.read_output().await.is_err() {
                        break;
                    }
                }
            })
            .await;

            if drained.is_err() {
                warn!(node = &*name, "node did not stop within {STOP_TIMEOUT:?}");
            }
        }

        Ok(())
    }

    /// Interprets one line of input, reporting any error on the console output
    pub fn onecmd<'a>(&'a mut self, line: &'a str) -> LocalBoxFuture<'a, Flow> {
        Box::pin(async move {
            match self.dispatch(line).await {
                Ok(flow) => flow,
                Err(e) => {
                    self.report(&e);
                    Flow::Continue
                }
            }
        })
    }

    async fn dispatch(&mut self, line: &str) -> CommandResult {
        let line = dispatch::strip_comment(line);
        let Some((word, args)) = dispatch::parse_line(line) else {
            return Ok(Flow::Continue);
        };

        match self.commands.get(word).map(|c| c.handler) {
            Some(Handler::Sync(handler)) => handler(self, args),
            Some(Handler::Async(handler)) => handler(self, args).await,
            None => self.run_on_node(line).await,
        }
    }

    /// Runs a `<node> <command>` line, substituting node names with their addresses
    async fn run_on_node(&mut self, line: &str) -> CommandResult {
        let Some((name, args)) = dispatch::parse_line(line) else {
            return Ok(Flow::Continue);
        };

        if !self.network.registry().contains(name) {
            return Err(ConsoleError::UnknownCommand(line.trim().to_string()));
        }

        if args.is_empty() {
            return Err(ConsoleError::Usage(format!(
                "*** Please enter a command for node: {name} <cmd>"
            )));
        }

        let cmd = dispatch::substitute_node_names(self.network.registry(), args);
        let node = self.network.node_mut(name)?;
        node.send_cmd(&cmd)?;

        session::run_session(
            node.shell_mut(),
            &mut self.input,
            self.output.as_mut(),
            &mut self.interrupts,
            self.tty,
        )
        .await;

        Ok(Flow::Continue)
    }

    fn report(&mut self, error: &ConsoleError) {
        let written = writeln!(self.output, "{error}").and_then(|_| self.output.flush());
        if let Err(e) = written {
            warn!("failed to report error ({error}): {e}");
        }
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use crate::console::interrupt::InterruptSender;
    use std::cell::RefCell;
    use std::rc::Rc;
    use virtual_network::network::spec::NetworkSpec;
    use virtual_network::shell::ProcessShellLauncher;

    /// A console output that tests can inspect while the console owns it
    #[derive(Clone, Default)]
    pub(crate) struct SharedOutput(Rc<RefCell<Vec<u8>>>);

    impl SharedOutput {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }

        pub(crate) fn take(&self) -> String {
            let contents = self.contents();
            self.0.borrow_mut().clear();
            contents
        }
    }

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub(crate) struct TestConsole {
        pub(crate) console: Console,
        pub(crate) output: SharedOutput,
        pub(crate) interrupts: InterruptSender,
    }

    pub(crate) fn console(spec: NetworkSpec, input: &'static [u8]) -> TestConsole {
        let network = VirtualNetwork::build(
            spec,
            Box::new(ProcessShellLauncher::new("sh")),
            fastrand::Rng::with_seed(42),
        )
        .unwrap();

        let output = SharedOutput::default();
        let (interrupts, receiver) = Interrupts::channel();
        let console = Console::new(
            network,
            Box::new(input),
            Box::new(output.clone()),
            receiver,
        );

        TestConsole {
            console,
            output,
            interrupts,
        }
    }
}
