//! Command execution on behalf of emulated nodes
//!
//! Every node owns a [`NodeShell`], which runs at most one foreground command at a time. The
//! console only talks to nodes through this trait, so tests can swap in scripted shells.

use futures::future::{self, LocalBoxFuture};
use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::Instant;
use tracing::debug;

const READ_CHUNK_SIZE: usize = 4096;

/// How long output left in the pipe is relayed once the shell itself has exited
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(100);

/// The information a shell needs about the node it belongs to
#[derive(Clone, Debug)]
pub struct NodeIdentity {
    pub name: Arc<str>,
    pub ip: Option<Ipv4Addr>,
}

pub trait NodeShell {
    /// Starts `cmd` without waiting for it to finish
    fn send_cmd(&mut self, cmd: &str) -> io::Result<()>;

    /// Whether a foreground command is still running
    fn waiting(&self) -> bool;

    /// Resolves with the next chunk of output of the running command
    ///
    /// Dropping the future before it resolves loses no output. When the command is done, the
    /// shell stops waiting and an empty chunk is returned. While no command runs, the future
    /// never resolves.
    fn read_output(&mut self) -> LocalBoxFuture<'_, io::Result<Vec<u8>>>;

    /// Forwards `data` to the running command's standard input
    fn write_input<'a>(&'a mut self, data: &'a [u8]) -> LocalBoxFuture<'a, io::Result<()>>;

    /// Signals end of input to the running command
    fn close_input(&mut self);

    /// Interrupts the running command, if any
    fn send_int(&mut self) -> io::Result<()>;

    fn pid(&self) -> Option<u32>;
}

pub trait ShellLauncher {
    fn launch(&self, node: &NodeIdentity) -> Box<dyn NodeShell>;
}

/// Launches a [`ProcessShell`] per node, using `program -c` to run commands
pub struct ProcessShellLauncher {
    program: PathBuf,
}

impl ProcessShellLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ShellLauncher for ProcessShellLauncher {
    fn launch(&self, node: &NodeIdentity) -> Box<dyn NodeShell> {
        Box::new(ProcessShell::new(self.program.clone(), node.clone()))
    }
}

struct RunningCommand {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
    /// Set once the shell has exited; background jobs may still hold the output open, so reads
    /// stop at this deadline
    drain_deadline: Option<Instant>,
}

impl RunningCommand {
    /// Reads the next chunk, returning 0 once the command is done
    async fn read(&mut self, buf: &mut [u8], node: &str) -> io::Result<usize> {
        loop {
            if let Some(deadline) = self.drain_deadline {
                return match tokio::time::timeout_at(deadline, self.stdout.read(buf)).await {
                    Ok(read) => read,
                    Err(_) => Ok(0),
                };
            }

            tokio::select! {
                biased;
                read = self.stdout.read(buf) => return read,
                status = self.child.wait() => {
                    match status {
                        Ok(status) => debug!(node, %status, "shell exited"),
                        Err(e) => debug!(node, "failed to wait for shell: {e}"),
                    }
                    self.drain_deadline = Some(Instant::now() + EXIT_DRAIN_GRACE);
                }
            }
        }
    }
}

/// Runs each command as a local process in its own process group
pub struct ProcessShell {
    program: PathBuf,
    node: NodeIdentity,
    running: Option<RunningCommand>,
}

impl ProcessShell {
    pub fn new(program: PathBuf, node: NodeIdentity) -> Self {
        Self {
            program,
            node,
            running: None,
        }
    }

    fn finish(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        if running.drain_deadline.is_some() {
            return;
        }

        // The output is closed, but the process may linger for a while. Tokio reaps it in the
        // background once it exits.
        match running.child.try_wait() {
            Ok(Some(status)) => debug!(node = &*self.node.name, %status, "command finished"),
            Ok(None) => debug!(node = &*self.node.name, "command closed its output"),
            Err(e) => debug!(node = &*self.node.name, "failed to query command status: {e}"),
        }
    }
}

impl NodeShell for ProcessShell {
    fn send_cmd(&mut self, cmd: &str) -> io::Result<()> {
        let mut command = Command::new(&self.program);
        command
            .arg("-c")
            .arg(format!("exec 2>&1; {cmd}"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .env("NETCONSOLE_NODE", &*self.node.name)
            .process_group(0);
        if let Some(ip) = self.node.ip {
            command.env("NETCONSOLE_IP", ip.to_string());
        }

        let mut child = command.spawn()?;
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("command output was not captured"))?;

        self.running = Some(RunningCommand {
            child,
            stdin,
            stdout,
            drain_deadline: None,
        });

        Ok(())
    }

    fn waiting(&self) -> bool {
        self.running.is_some()
    }

    fn read_output(&mut self) -> LocalBoxFuture<'_, io::Result<Vec<u8>>> {
        Box::pin(async move {
            let Some(running) = self.running.as_mut() else {
                return future::pending().await;
            };

            let mut buf = vec![0; READ_CHUNK_SIZE];
            let read = running.read(&mut buf, &self.node.name).await?;
            if read == 0 {
                self.finish();
                return Ok(Vec::new());
            }

            buf.truncate(read);
            Ok(buf)
        })
    }

    fn write_input<'a>(&'a mut self, data: &'a [u8]) -> LocalBoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let Some(stdin) = self.running.as_mut().and_then(|r| r.stdin.as_mut()) else {
                return Ok(());
            };

            let result = match stdin.write_all(data).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };

            match result {
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    // The command stopped reading; further input goes nowhere
                    self.close_input();
                    Ok(())
                }
                result => result,
            }
        })
    }

    fn close_input(&mut self) {
        if let Some(running) = &mut self.running {
            running.stdin = None;
        }
    }

    fn send_int(&mut self) -> io::Result<()> {
        let Some(pid) = self.pid() else {
            return Ok(());
        };

        let pgid = libc::pid_t::try_from(pid).map_err(io::Error::other)?;

        // SAFETY: kill has no memory safety requirements; a negative pid targets the group
        let result = unsafe { libc::kill(-pgid, libc::SIGINT) };
        if result != 0 {
            let err = io::Error::last_os_error();
            // The group is gone already, so there is nothing left to interrupt
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(err);
            }
        }

        debug!(node = &*self.node.name, pid, "sent SIGINT");
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        self.running
            .as_ref()
            .filter(|r| r.drain_deadline.is_none())
            .and_then(|r| r.child.id())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn shell() -> Box<dyn NodeShell> {
        ProcessShellLauncher::new("sh").launch(&NodeIdentity {
            name: Arc::from("h1"),
            ip: Some(Ipv4Addr::new(10, 0, 0, 1)),
        })
    }

    async fn drain(shell: &mut dyn NodeShell) -> Vec<u8> {
        let mut output = Vec::new();
        while shell.waiting() {
            output.extend(shell.read_output().await.unwrap());
        }
        output
    }

    #[tokio::test]
    async fn test_echo_runs_to_completion() {
        let mut shell = shell();
        assert!(!shell.waiting());

        shell
            .send_cmd("echo $NETCONSOLE_NODE $NETCONSOLE_IP")
            .unwrap();
        assert!(shell.waiting());

        let output = drain(shell.as_mut()).await;
        assert_eq!(output, b"h1 10.0.0.1\n");
        assert!(shell.pid().is_none());
    }

    #[tokio::test]
    async fn test_stderr_is_merged_into_output() {
        let mut shell = shell();
        shell.send_cmd("echo oops >&2").unwrap();

        let output = drain(shell.as_mut()).await;
        assert_eq!(output, b"oops\n");
    }

    #[tokio::test]
    async fn test_input_is_forwarded_until_closed() {
        let mut shell = shell();
        shell.send_cmd("cat").unwrap();

        shell.write_input(b"hello\n").await.unwrap();
        shell.close_input();

        let output = drain(shell.as_mut()).await;
        assert_eq!(output, b"hello\n");
    }

    #[tokio::test]
    async fn test_interrupt_stops_foreground_command() {
        let mut shell = shell();
        shell.send_cmd("sleep 30").unwrap();
        assert!(shell.pid().is_some());

        shell.send_int().unwrap();
        let drained = tokio::time::timeout(Duration::from_secs(10), drain(shell.as_mut())).await;
        assert!(drained.is_ok());
        assert!(!shell.waiting());
    }

    #[tokio::test]
    async fn test_background_jobs_do_not_keep_the_shell_waiting() {
        let mut shell = shell();
        shell.send_cmd("echo started; sleep 5 &").unwrap();

        let drained = tokio::time::timeout(Duration::from_secs(2), drain(shell.as_mut())).await;
        assert_eq!(drained.unwrap(), b"started\n");
        assert!(!shell.waiting());

        shell.send_cmd("echo next").unwrap();
        assert_eq!(drain(shell.as_mut()).await, b"next\n");
    }

    #[tokio::test]
    async fn test_chatty_background_jobs_do_not_keep_the_shell_waiting() {
        let mut shell = shell();
        shell
            .send_cmd("(while true; do echo tick; sleep 0.01; done) &")
            .unwrap();

        let drained = tokio::time::timeout(Duration::from_secs(2), drain(shell.as_mut())).await;
        assert!(drained.is_ok());
        assert!(!shell.waiting());
    }

    #[tokio::test]
    async fn test_output_written_before_exit_is_kept() {
        let mut shell = shell();
        shell.send_cmd("seq 1 2000").unwrap();

        let output = drain(shell.as_mut()).await;
        assert!(output.starts_with(b"1\n2\n"));
        assert!(output.ends_with(b"1999\n2000\n"));
    }

    #[tokio::test]
    async fn test_idle_shell_ignores_interrupts_and_never_yields_output() {
        let mut shell = shell();
        shell.send_int().unwrap();

        let read = tokio::time::timeout(Duration::from_millis(50), shell.read_output()).await;
        assert!(read.is_err());
    }
}
