//! Process-wide history of interactive console lines
//!
//! The history is loaded at most once per process. It is written back exactly once, when the
//! guard returned by [`init`] is dropped.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once, OnceLock};
use tracing::debug;

pub const HISTORY_CAPACITY: usize = 1000;
const HISTORY_FILE_NAME: &str = ".netconsole_history";

static HISTORY: OnceLock<Mutex<History>> = OnceLock::new();
static PERSIST: Once = Once::new();

#[derive(Debug)]
pub struct History {
    path: PathBuf,
    entries: VecDeque<String>,
}

impl History {
    fn load(path: PathBuf) -> Self {
        let mut history = Self {
            path,
            entries: VecDeque::new(),
        };

        match std::fs::read_to_string(&history.path) {
            Ok(contents) => contents.lines().for_each(|line| history.push(line)),
            Err(e) => debug!(path = %history.path.display(), "no history loaded: {e}"),
        }

        history
    }

    fn push(&mut self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return;
        }

        if self.entries.len() == HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_string());
    }

    fn save(&self) {
        let mut contents = String::new();
        for entry in &self.entries {
            contents.push_str(entry);
            contents.push('\n');
        }

        if let Err(e) = std::fs::write(&self.path, contents) {
            debug!(path = %self.path.display(), "failed to save history: {e}");
        }
    }
}

/// Persists the history when dropped
#[must_use]
pub struct HistoryGuard {
    _private: (),
}

impl Drop for HistoryGuard {
    fn drop(&mut self) {
        PERSIST.call_once(|| {
            if let Some(history) = HISTORY.get() {
                match history.lock() {
                    Ok(history) => history.save(),
                    Err(poisoned) => poisoned.into_inner().save(),
                }
            }
        });
    }
}

/// Loads the history from `path`; only the first call in a process has any effect
pub fn init(path: &Path) -> Option<HistoryGuard> {
    let mut initialized = false;
    HISTORY.get_or_init(|| {
        initialized = true;
        Mutex::new(History::load(path.to_path_buf()))
    });

    initialized.then(|| HistoryGuard { _private: () })
}

/// Records an interactive line, if the history was initialized
pub fn record(line: &str) {
    if let Some(history) = HISTORY.get() {
        match history.lock() {
            Ok(mut history) => history.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }
}

pub fn entries() -> Vec<String> {
    HISTORY
        .get()
        .and_then(|history| history.lock().ok().map(|h| h.entries.iter().cloned().collect()))
        .unwrap_or_default()
}

/// `$HOME/.netconsole_history`, if the home directory is known
pub fn default_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(HISTORY_FILE_NAME))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_push_skips_blank_lines_and_caps_entries() {
        let mut history = History {
            path: PathBuf::new(),
            entries: VecDeque::new(),
        };

        history.push("   \n");
        assert!(history.entries.is_empty());

        for i in 0..HISTORY_CAPACITY + 5 {
            history.push(&format!("h1 echo {i}\n"));
        }

        assert_eq!(history.entries.len(), HISTORY_CAPACITY);
        assert_eq!(history.entries.front().unwrap(), "h1 echo 5");
    }

    // The history is process-wide, so its whole lifecycle is covered by a single test
    #[test]
    fn test_init_once_and_persist_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");
        std::fs::write(&path, "nodes\n").unwrap();

        let guard = init(&path).unwrap();
        assert!(init(&dir.path().join("other")).is_none());
        assert_eq!(entries(), ["nodes"]);

        record("pingall\n");
        drop(guard);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "nodes\npingall\n");

        // Later changes are not written again
        record("net\n");
        drop(HistoryGuard { _private: () });
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "nodes\npingall\n");
    }
}
