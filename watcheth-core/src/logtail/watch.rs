//! Per-file tail state and the refresh algorithm.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::tail::{decode_line, split_complete, tail_lines, DEFAULT_CHUNK_SIZE};

/// What a refresh changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    /// The file size matches the last read; nothing was read.
    Unchanged,
    /// The file grew. Holds the lines completed by the new bytes.
    ///
    /// May be empty when only an unterminated fragment was written; the
    /// window still changed in that case.
    Appended(Vec<String>),
    /// The window was rebuilt from the end of the file, either on first read,
    /// after the file shrank, or after it became readable again.
    Rebuilt(Vec<String>),
    /// The file could not be read. Holds the placeholder line now shown.
    Unreadable(String),
}

impl Refresh {
    /// True if the window changed.
    pub fn is_changed(&self) -> bool {
        !matches!(self, Refresh::Unchanged)
    }

    /// Lines this refresh produced.
    pub fn lines(&self) -> &[String] {
        match self {
            Refresh::Unchanged => &[],
            Refresh::Appended(lines) | Refresh::Rebuilt(lines) => lines,
            Refresh::Unreadable(line) => std::slice::from_ref(line),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Status {
    Unread,
    Tracking,
    Failed(String),
}

#[derive(Debug)]
struct State {
    /// File size at the last successful read.
    baseline: u64,
    lines: VecDeque<String>,
    /// Bytes after the last newline seen.
    partial: Vec<u8>,
    /// Whether `partial` is currently shown as the last window line.
    partial_shown: bool,
    status: Status,
}

/// One tailed log file.
///
/// All refreshes of the same file are serialized by the entry's own lock, so
/// refreshes of different files run in parallel. The file is opened on every
/// read and closed straight after, which lets log rotation and deletion
/// happen underneath without holding stale handles.
#[derive(Debug)]
pub(crate) struct LogWatch {
    path: PathBuf,
    watch_dir: PathBuf,
    window: usize,
    state: Mutex<State>,
}

impl LogWatch {
    pub(crate) fn new(path: PathBuf, window: usize) -> Self {
        let watch_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self {
            path,
            watch_dir,
            window: window.max(1),
            state: Mutex::new(State {
                baseline: 0,
                lines: VecDeque::new(),
                partial: Vec::new(),
                partial_shown: false,
                status: Status::Unread,
            }),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Directory to watch for changes to this file.
    pub(crate) fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// True if a filesystem event for `path` concerns this file.
    pub(crate) fn matches(&self, path: &Path) -> bool {
        path == self.path
            || (path.parent() == Some(self.watch_dir.as_path())
                && path.file_name() == self.path.file_name())
    }

    /// Current window, oldest line first.
    pub(crate) fn lines(&self) -> Vec<String> {
        self.state.lock().lines.iter().cloned().collect()
    }

    /// Bring the window up to date with the file.
    ///
    /// Returns the outcome and, if anything changed, a copy of the new window
    /// taken under the same lock.
    pub(crate) fn refresh(&self) -> (Refresh, Option<Vec<String>>) {
        let mut state = self.state.lock();
        let outcome = self.refresh_locked(&mut state);
        let window = outcome
            .is_changed()
            .then(|| state.lines.iter().cloned().collect());
        (outcome, window)
    }

    fn refresh_locked(&self, state: &mut State) -> Refresh {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) => return state.fail(&e),
        };

        // First read, recovering from a failure, or the file shrank.
        let result = if state.status != Status::Tracking || size < state.baseline {
            self.rebuild(state).map(Refresh::Rebuilt)
        } else if size == state.baseline {
            return Refresh::Unchanged;
        } else {
            self.read_appended(state, size).map(Refresh::Appended)
        };

        result.unwrap_or_else(|e| state.fail(&e))
    }

    fn rebuild(&self, state: &mut State) -> io::Result<Vec<String>> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        let tail = tail_lines(&mut file, len, self.window, DEFAULT_CHUNK_SIZE)?;

        state.baseline = len;
        state.partial_shown = decode_line(&tail.partial).is_some();
        state.partial = tail.partial;
        state.lines = tail.lines.iter().cloned().collect();
        state.status = Status::Tracking;
        Ok(tail.lines)
    }

    fn read_appended(&self, state: &mut State, size: u64) -> io::Result<Vec<String>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(state.baseline))?;
        let mut appended = Vec::new();
        file.take(size - state.baseline).read_to_end(&mut appended)?;

        // The file may have shrunk between the metadata call and the read.
        state.baseline += appended.len() as u64;

        let mut data = std::mem::take(&mut state.partial);
        data.extend_from_slice(&appended);

        if state.partial_shown {
            state.lines.pop_back();
            state.partial_shown = false;
        }

        let (completed, rest) = split_complete(&data);
        for line in &completed {
            self.push(state, line.clone());
        }
        if let Some(line) = decode_line(rest) {
            self.push(state, line);
            state.partial_shown = true;
        }
        state.partial = rest.to_vec();
        Ok(completed)
    }

    fn push(&self, state: &mut State, line: String) {
        state.lines.push_back(line);
        while state.lines.len() > self.window {
            state.lines.pop_front();
        }
    }
}

impl State {
    fn fail(&mut self, error: &io::Error) -> Refresh {
        let message = format!("[unable to read log file: {error}]");
        if self.status == Status::Failed(message.clone()) {
            return Refresh::Unchanged;
        }
        self.baseline = 0;
        self.partial.clear();
        self.partial_shown = false;
        self.lines = VecDeque::from([message.clone()]);
        self.status = Status::Failed(message.clone());
        Refresh::Unreadable(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, text: &str) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    fn numbered(range: std::ops::RangeInclusive<usize>) -> String {
        range.map(|i| format!("L{i}\n")).collect()
    }

    fn expected(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
        range.map(|i| format!("L{i}")).collect()
    }

    #[test]
    fn test_first_refresh_rebuilds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("beacon.log");
        append(&path, &numbered(1..=20));

        let watch = LogWatch::new(path, 15);
        let (outcome, window) = watch.refresh();
        assert_eq!(outcome, Refresh::Rebuilt(expected(6..=20)));
        assert_eq!(window, Some(expected(6..=20)));
    }

    #[test]
    fn unchanged_file_is_not_reread() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("beacon.log");
        append(&path, &numbered(1..=3));

        let watch = LogWatch::new(path, 15);
        watch.refresh();
        let (outcome, window) = watch.refresh();
        assert_eq!(outcome, Refresh::Unchanged);
        assert!(window.is_none());
    }

    #[test]
    fn growth_appends_and_evicts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("beacon.log");
        append(&path, &numbered(1..=20));

        let watch = LogWatch::new(path.clone(), 15);
        watch.refresh();
        append(&path, "L21\nL22\n");

        let (outcome, _) = watch.refresh();
        assert_eq!(outcome, Refresh::Appended(vec!["L21".into(), "L22".into()]));
        assert_eq!(watch.lines(), expected(8..=22));
    }

    #[test]
    fn one_line_at_a_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("geth.log");
        append(&path, "");

        let watch = LogWatch::new(path.clone(), 3);
        watch.refresh();
        for i in 1..=5 {
            append(&path, &format!("L{i}\n"));
            let (outcome, _) = watch.refresh();
            assert_eq!(outcome.lines(), [format!("L{i}")]);
        }
        assert_eq!(watch.lines(), expected(3..=5));
    }

    #[test]
    fn shrink_rebuilds_window() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("beacon.log");
        append(&path, &numbered(1..=20));

        let watch = LogWatch::new(path.clone(), 15);
        watch.refresh();

        fs::write(&path, "fresh\n").unwrap();
        let (outcome, _) = watch.refresh();
        assert_eq!(outcome, Refresh::Rebuilt(vec!["fresh".into()]));
        assert_eq!(watch.lines(), vec!["fresh"]);
    }

    #[test]
    fn partial_line_is_completed_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vouch.log");
        append(&path, "L1\nL2\nhal");

        let watch = LogWatch::new(path.clone(), 15);
        watch.refresh();
        assert_eq!(watch.lines(), vec!["L1", "L2", "hal"]);

        append(&path, "f done\nL4\n");
        let (outcome, _) = watch.refresh();
        assert_eq!(
            outcome,
            Refresh::Appended(vec!["half done".into(), "L4".into()])
        );
        assert_eq!(watch.lines(), vec!["L1", "L2", "half done", "L4"]);
    }

    #[test]
    fn fragment_only_growth_changes_window() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vouch.log");
        append(&path, "L1\n");

        let watch = LogWatch::new(path.clone(), 15);
        watch.refresh();
        append(&path, "par");

        let (outcome, window) = watch.refresh();
        assert_eq!(outcome, Refresh::Appended(Vec::new()));
        assert!(outcome.is_changed());
        assert_eq!(window, Some(vec!["L1".to_string(), "par".to_string()]));
    }

    #[test]
    fn missing_file_shows_placeholder_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.log");

        let watch = LogWatch::new(path.clone(), 15);
        let (outcome, _) = watch.refresh();
        let message = match outcome {
            Refresh::Unreadable(message) => message,
            other => panic!("expected unreadable, got {other:?}"),
        };
        assert!(message.starts_with("[unable to read log file:"));
        assert_eq!(watch.lines(), vec![message]);

        let (outcome, _) = watch.refresh();
        assert_eq!(outcome, Refresh::Unchanged);

        append(&path, "back\n");
        let (outcome, _) = watch.refresh();
        assert_eq!(outcome, Refresh::Rebuilt(vec!["back".into()]));
    }

    #[test]
    fn blank_appended_lines_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("beacon.log");
        append(&path, "L1\n");

        let watch = LogWatch::new(path.clone(), 15);
        watch.refresh();
        append(&path, "\n   \nL2\n\n");

        let (outcome, _) = watch.refresh();
        assert_eq!(outcome, Refresh::Appended(vec!["L2".into()]));
        assert_eq!(watch.lines(), vec!["L1", "L2"]);
    }

    #[test]
    fn event_path_matching() {
        let watch = LogWatch::new(PathBuf::from("beacon.log"), 15);
        assert_eq!(watch.watch_dir(), Path::new("."));
        assert!(watch.matches(Path::new("./beacon.log")));
        assert!(watch.matches(Path::new("beacon.log")));
        assert!(!watch.matches(Path::new("./geth.log")));
    }
}
