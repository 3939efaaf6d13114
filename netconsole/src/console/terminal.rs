//! Temporary terminal mode changes, undone when the guard is dropped

use std::io;
use std::mem::MaybeUninit;
use std::os::fd::RawFd;
use tracing::warn;

pub fn is_tty(fd: RawFd) -> bool {
    // SAFETY: isatty accepts any descriptor and only inspects it
    unsafe { libc::isatty(fd) == 1 }
}

/// Restores the saved terminal attributes on drop
pub struct TerminalGuard {
    fd: RawFd,
    saved: libc::termios,
}

impl TerminalGuard {
    /// Delivers input byte by byte instead of line by line, so interactive programs on a node
    /// receive keystrokes as they are typed
    pub fn char_at_a_time(fd: RawFd) -> io::Result<Self> {
        Self::modify(fd, |attrs| {
            attrs.c_lflag &= !libc::ICANON;
            attrs.c_cc[libc::VMIN] = 1;
            attrs.c_cc[libc::VTIME] = 0;
        })
    }

    /// Stops the terminal from echoing typed characters
    pub fn no_echo(fd: RawFd) -> io::Result<Self> {
        Self::modify(fd, |attrs| {
            attrs.c_lflag &= !libc::ECHO;
        })
    }

    fn modify(fd: RawFd, change: impl FnOnce(&mut libc::termios)) -> io::Result<Self> {
        let saved = get_attrs(fd)?;
        let mut attrs = saved;
        change(&mut attrs);
        set_attrs(fd, &attrs)?;

        Ok(Self { fd, saved })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(e) = set_attrs(self.fd, &self.saved) {
            warn!("failed to restore terminal mode: {e}");
        }
    }
}

fn get_attrs(fd: RawFd) -> io::Result<libc::termios> {
    let mut attrs = MaybeUninit::<libc::termios>::uninit();

    // SAFETY: tcgetattr fully initializes `attrs` when it succeeds
    let result = unsafe { libc::tcgetattr(fd, attrs.as_mut_ptr()) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: checked for success above
    Ok(unsafe { attrs.assume_init() })
}

fn set_attrs(fd: RawFd, attrs: &libc::termios) -> io::Result<()> {
    // SAFETY: `attrs` points to a valid termios struct
    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, attrs) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}
