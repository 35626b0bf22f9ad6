//! `tracing` subscriber setup (ambient stack, spec §9 "Logging"). Level is
//! driven by `RUST_LOG`, defaulting to `info` so a plain `rcmd replay` run
//! prints record-level progress without drowning in pty chatter.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, Result};
use crate::rerr;

pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Per-session transcript logger: appends every send/expect exchange to
/// `<contents_root>/<session>.log`. Opened lazily on first write (grounded
/// on `ReplayerLogger` in `original_source/discovery/record3/logger.go`);
/// closed by `Drop` when the owning `Session` is removed from the map on
/// `close` (grounded on `SessionNode.Close` in `sessionnode.go`).
pub struct SessionLogger {
    path: PathBuf,
    fp: Option<std::fs::File>,
    send_count: u32,
}

impl SessionLogger {
    pub fn new(log_dir: &Path, session_name: &str) -> SessionLogger {
        SessionLogger { path: log_dir.join(format!("{}.log", session_name)), fp: None, send_count: 0 }
    }

    fn ensure_open(&mut self) -> Result<&mut std::fs::File> {
        if self.fp.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| rerr!(ErrorKind::IoError, "creating '{}': {}", parent.display(), e))?;
            }
            let fp = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| rerr!(ErrorKind::IoError, "opening session log '{}': {}", self.path.display(), e))?;
            self.fp = Some(fp);
        }
        Ok(self.fp.as_mut().unwrap())
    }

    /// Logs text sent to the session, numbered like the original's
    /// `SEND_%03d` prefix (`Expect.Do`, record3/Expect.go).
    pub fn log_send(&mut self, text: &str) -> Result<()> {
        self.send_count += 1;
        let prefix = format!("SEND_{:03}", self.send_count);
        let path = self.path.clone();
        let fp = self.ensure_open()?;
        writeln!(fp, "{:>10}|{}", prefix, text).map_err(|e| rerr!(ErrorKind::IoError, "writing session log '{}': {}", path.display(), e))
    }

    /// Logs one line of captured output.
    pub fn log_output(&mut self, line: &str) -> Result<()> {
        let path = self.path.clone();
        let fp = self.ensure_open()?;
        writeln!(fp, "{}", line).map_err(|e| rerr!(ErrorKind::IoError, "writing session log '{}': {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_lazily_and_appends_numbered_sends() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = SessionLogger::new(dir.path(), "s1");
        assert!(!dir.path().join("s1.log").exists());
        logger.log_send("echo hi").unwrap();
        logger.log_output("hi").unwrap();
        let contents = std::fs::read_to_string(dir.path().join("s1.log")).unwrap();
        assert!(contents.contains("SEND_001|echo hi"));
        assert!(contents.contains("hi"));
    }
}
