//! Console utilities: help, history, timing, local commands and batch files

use super::invalid_value;
use crate::console::terminal::TerminalGuard;
use crate::console::{CommandResult, Console, ConsoleError, Flow, PROMPT};
use crate::history;
use futures::future::LocalBoxFuture;
use std::io::{self, Write};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

const HELP_WIDTH: usize = 80;

fn node_help() -> String {
    format!(
        "You may also send a command to a node using:\n\
         \x20 <node> command {{args}}\n\
         For example:\n\
         \x20 {PROMPT}h1 ifconfig\n\
         \n\
         The interpreter automatically substitutes IP addresses\n\
         for node names when a node is the first arg, so commands\n\
         like\n\
         \x20 {PROMPT}h2 ping h3\n\
         should work.\n\
         \n\
         Some character-oriented interactive commands require\n\
         noecho:\n\
         \x20 {PROMPT}noecho h2 vi foo.py\n\n"
    )
}

pub(crate) fn do_help(console: &mut Console, args: &str) -> CommandResult {
    if let Some(topic) = args.split_whitespace().next() {
        match console.commands.get(topic) {
            Some(command) => writeln!(console.output, "{}", command.help)?,
            None => writeln!(console.output, "*** No help on {topic}")?,
        }
        return Ok(Flow::Continue);
    }

    writeln!(console.output)?;
    writeln!(console.output, "Documented commands (type help <topic>):")?;
    writeln!(console.output, "{}", "=".repeat(40))?;

    let mut row = String::new();
    for name in console.commands.names() {
        if !row.is_empty() && row.len() + 2 + name.len() > HELP_WIDTH {
            writeln!(console.output, "{row}")?;
            row.clear();
        }
        if !row.is_empty() {
            row.push_str("  ");
        }
        row.push_str(name);
    }
    writeln!(console.output, "{row}")?;
    writeln!(console.output)?;

    write!(console.output, "{}", node_help())?;
    Ok(Flow::Continue)
}

/// Lists the session history, optionally only its last `count` entries
pub(crate) fn do_history(console: &mut Console, args: &str) -> CommandResult {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    let entries = history::entries();
    let count = match tokens.as_slice() {
        [] => entries.len(),
        [count] => count
            .parse::<usize>()
            .map_err(|_| invalid_value("count", count))?,
        _ => return Err(ConsoleError::Usage("usage: history [count]".to_string())),
    };

    write_history(console.output.as_mut(), &entries, count)?;
    Ok(Flow::Continue)
}

fn write_history(output: &mut dyn Write, entries: &[String], count: usize) -> io::Result<()> {
    let skip = entries.len().saturating_sub(count);
    for (index, entry) in entries.iter().enumerate().skip(skip) {
        writeln!(output, "{:5}  {entry}", index + 1)?;
    }

    Ok(())
}

pub(crate) fn do_exit(_console: &mut Console, _args: &str) -> CommandResult {
    Ok(Flow::Exit)
}

/// Runs `args` through the local shell, outside the emulated network
pub(crate) fn do_sh<'a>(console: &'a mut Console, args: &'a str) -> LocalBoxFuture<'a, CommandResult> {
    Box::pin(async move {
        if args.is_empty() {
            return Ok(Flow::Continue);
        }

        let output = tokio::process::Command::new(&console.local_shell)
            .arg("-c")
            .arg(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        debug!(cmd = args, status = %output.status, "local command finished");

        console.output.write_all(&output.stdout)?;
        console.output.write_all(&output.stderr)?;
        console.output.flush()?;
        Ok(Flow::Continue)
    })
}

/// Runs one console line and reports how long it took; never ends the console
pub(crate) fn do_time<'a>(console: &'a mut Console, args: &'a str) -> LocalBoxFuture<'a, CommandResult> {
    Box::pin(async move {
        let start = Instant::now();
        console.onecmd(args).await;
        let elapsed = start.elapsed();

        writeln!(
            console.output,
            "*** Elapsed time: {:.6} secs",
            elapsed.as_secs_f64()
        )?;
        Ok(Flow::Continue)
    })
}

pub(crate) fn do_noecho<'a>(console: &'a mut Console, args: &'a str) -> LocalBoxFuture<'a, CommandResult> {
    Box::pin(async move {
        let _echo_off = if console.tty {
            TerminalGuard::no_echo(libc::STDIN_FILENO)
                .inspect_err(|e| warn!("unable to turn off terminal echo: {e}"))
                .ok()
        } else {
            None
        };

        console.run_on_node(args).await
    })
}

/// Feeds every line of a file through the console, stopping early at `exit`
pub(crate) fn do_source<'a>(console: &'a mut Console, args: &'a str) -> LocalBoxFuture<'a, CommandResult> {
    Box::pin(async move {
        let tokens: Vec<&str> = args.split_whitespace().collect();
        let [path] = tokens.as_slice() else {
            return Err(ConsoleError::Usage("usage: source <file>".to_string()));
        };

        let file = tokio::fs::File::open(path).await.map_err(|e| {
            debug!(path, "unable to open source file: {e}");
            ConsoleError::SourceRead(path.to_string())
        })?;
        let mut lines = BufReader::new(file);

        loop {
            let mut line = String::new();
            let read = lines.read_line(&mut line).await.map_err(|e| {
                debug!(path, "unable to read source file: {e}");
                ConsoleError::SourceRead(path.to_string())
            })?;
            if read == 0 {
                break;
            }

            if console.onecmd(&line).await == Flow::Exit {
                debug!(path, "source file ended by exit");
                break;
            }
        }

        Ok(Flow::Continue)
    })
}

#[cfg(test)]
mod test {
    use crate::config::builtin::{self, BuiltinTopology};
    use crate::console::Flow;
    use crate::console::test_util::{TestConsole, console};
    use std::io::Write;

    fn minimal() -> TestConsole {
        console(
            builtin::network_spec(BuiltinTopology::Minimal, &Default::default()),
            b"",
        )
    }

    #[tokio::test]
    async fn test_help_lists_commands_and_node_usage() {
        let mut t = minimal();

        t.console.onecmd("help").await;
        let output = t.output.take();
        assert!(output.starts_with("\nDocumented commands (type help <topic>):\n====="));
        assert!(output.contains("addhost  addlink"));
        assert!(output.contains("  netconsole> h2 ping h3\n"));
        assert!(output.lines().all(|line| line.len() <= super::HELP_WIDTH));
    }

    #[tokio::test]
    async fn test_help_on_one_command() {
        let mut t = minimal();

        t.console.onecmd("help nodes").await;
        assert_eq!(t.output.take(), "List all nodes.\n");

        t.console.onecmd("? dump").await;
        assert_eq!(t.output.take(), "Dump node info.\n");

        t.console.onecmd("help frobnicate").await;
        assert_eq!(t.output.take(), "*** No help on frobnicate\n");
    }

    #[test]
    fn test_history_is_numbered_from_the_oldest_entry() {
        let entries = ["nodes", "pingall", "h1 ifconfig"].map(String::from);

        let mut output = Vec::new();
        super::write_history(&mut output, &entries, usize::MAX).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "    1  nodes\n    2  pingall\n    3  h1 ifconfig\n"
        );

        let mut output = Vec::new();
        super::write_history(&mut output, &entries, 2).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "    2  pingall\n    3  h1 ifconfig\n"
        );
    }

    #[tokio::test]
    async fn test_history_argument_errors() {
        let mut t = minimal();

        t.console.onecmd("history lots").await;
        t.console.onecmd("history 1 2").await;
        assert_eq!(
            t.output.take(),
            "Invalid value for count: lots\nusage: history [count]\n"
        );
    }

    #[tokio::test]
    async fn test_sh_runs_locally() {
        let mut t = minimal();

        t.console.onecmd("sh echo out; echo err >&2").await;
        assert_eq!(t.output.take(), "out\nerr\n");
        assert!(t.console.network().waiting_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_time_reports_elapsed_and_never_exits() {
        let mut t = minimal();

        assert_eq!(t.console.onecmd("time nodes").await, Flow::Continue);
        let output = t.output.take();
        assert!(output.starts_with("available nodes are: \nc0 h1 h2 s1\n*** Elapsed time: "));
        assert!(output.ends_with(" secs\n"));

        assert_eq!(t.console.onecmd("time exit").await, Flow::Continue);
    }

    #[tokio::test]
    async fn test_noecho_without_tty_runs_the_command() {
        let mut t = minimal();

        t.console.onecmd("noecho h1 echo quiet").await;
        assert_eq!(t.output.take(), "quiet\n");
    }

    #[tokio::test]
    async fn test_source_runs_each_line_until_exit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# a batch file").unwrap();
        writeln!(file, "nodes").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "h1 echo h2").unwrap();
        writeln!(file, "exit").unwrap();
        writeln!(file, "nodes").unwrap();
        let path = file.path().display().to_string();

        let mut t = minimal();
        let flow = t.console.onecmd(&format!("source {path}")).await;

        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            t.output.take(),
            "available nodes are: \nc0 h1 h2 s1\n10.0.0.2\n"
        );
    }

    #[tokio::test]
    async fn test_source_errors() {
        let mut t = minimal();

        t.console.onecmd("source").await;
        t.console.onecmd("source a b").await;
        t.console.onecmd("source /nonexistent/netconsole-script").await;
        assert_eq!(
            t.output.take(),
            "usage: source <file>\n\
             usage: source <file>\n\
             error reading file /nonexistent/netconsole-script\n"
        );
    }

    #[tokio::test]
    async fn test_nested_source() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner");
        let outer = dir.path().join("outer");
        std::fs::write(&inner, "addhost h3\nexit\n").unwrap();
        std::fs::write(&outer, format!("source {}\nnodes\n", inner.display())).unwrap();

        let mut t = minimal();
        t.console
            .onecmd(&format!("source {}", outer.display()))
            .await;

        assert!(t.output.take().ends_with("available nodes are: \nc0 h1 h2 h3 s1\n"));
    }
}
