//! Relays console input and node output while a node command runs in the foreground

use crate::console::ConsoleInput;
use crate::console::interrupt::Interrupts;
use crate::console::terminal::TerminalGuard;
use std::io::{self, Write};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use virtual_network::shell::NodeShell;

/// Runs until `shell` stops waiting
///
/// Console input is forwarded byte by byte, node output is written as soon as it arrives and
/// operator interrupts are passed on to the node. When the console input ends, the node's input
/// is closed and the node keeps running until it is done. Relay failures interrupt the node
/// instead of abandoning it while it is still waiting.
pub async fn run_session(
    shell: &mut dyn NodeShell,
    input: &mut ConsoleInput,
    output: &mut dyn Write,
    interrupts: &mut Interrupts,
    tty: bool,
) {
    let _terminal = if tty {
        TerminalGuard::char_at_a_time(libc::STDIN_FILENO)
            .inspect_err(|e| warn!("unable to switch terminal to character mode: {e}"))
            .ok()
    } else {
        None
    };

    let mut input_closed = false;
    while shell.waiting() {
        tokio::select! {
            biased;
            _ = interrupts.recv() => interrupt(shell),
            byte = input.read_u8(), if !input_closed => match byte {
                Ok(byte) => {
                    if let Err(e) = shell.write_input(&[byte]).await {
                        warn!("failed to forward input to node: {e}");
                        interrupt(shell);
                        shell.close_input();
                        input_closed = true;
                    }
                }
                Err(e) => {
                    if e.kind() != io::ErrorKind::UnexpectedEof {
                        warn!("failed to read console input: {e}");
                    }

                    debug!("console input closed");
                    shell.close_input();
                    input_closed = true;
                }
            },
            data = shell.read_output() => match data {
                Ok(data) => {
                    if let Err(e) = output.write_all(&data).and_then(|_| output.flush()) {
                        warn!("failed to write node output: {e}");
                        interrupt(shell);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    if let Err(write_error) = writeln!(output, "error reading node output: {e}") {
                        warn!("failed to report node output error ({e}): {write_error}");
                    }
                    interrupt(shell);
                }
            },
        }
    }
}

fn interrupt(shell: &mut dyn NodeShell) {
    if let Err(e) = shell.send_int() {
        warn!("failed to interrupt node: {e}");
    }
}
