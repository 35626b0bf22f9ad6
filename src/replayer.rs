//! Replay-set driver (spec §4.11 "Replayer"): runs every record named in a
//! replay set, writes `results.json` and `incomplete.set` into the set's
//! output directory, and returns the process exit code.

use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, Result};
use crate::record::Record;
use crate::rerr;
use crate::result::ReplaySetResult;

pub struct ReplaySet {
    pub name: String,
    pub rids: Vec<String>,
}

impl ReplaySet {
    /// A replay set file lists one rid per line (blank lines and `#`
    /// comments ignored).
    pub fn load(path: &Path) -> Result<ReplaySet> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("set")
            .to_string();
        let text = std::fs::read_to_string(path).map_err(|e| rerr!(ErrorKind::IoError, "reading replay set '{}': {}", path.display(), e))?;
        let rids = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        Ok(ReplaySet { name, rids })
    }

    pub async fn run(&self, contents_root: &Path) -> ReplaySetResult {
        let mut results = Vec::with_capacity(self.rids.len());
        for (seq, rid) in self.rids.iter().enumerate() {
            let path = contents_root.join(format!("{}.rcmd", rid));
            let mut result = match Record::load(&path) {
                Ok(record) => record.run(contents_root.to_path_buf()).await,
                Err(e) => {
                    let mut result = crate::result::RecordResult::new(rid.clone());
                    result.push_terminating_error(&e, 0);
                    result.incomplete = true;
                    result
                }
            };
            result.seq = seq as u32;
            results.push(result);
        }
        ReplaySetResult::new(self.name.clone(), results)
    }
}

/// Writes `results.json` and `incomplete.set` into `out_dir`, creating it
/// if necessary (spec §6 "External Interfaces").
pub fn write_outputs(out_dir: &Path, result: &ReplaySetResult) -> Result<()> {
    std::fs::create_dir_all(out_dir).map_err(|e| rerr!(ErrorKind::IoError, "creating output dir '{}': {}", out_dir.display(), e))?;
    let results_path = out_dir.join("results.json");
    std::fs::write(&results_path, result.to_json()?).map_err(|e| rerr!(ErrorKind::IoError, "writing '{}': {}", results_path.display(), e))?;
    let incomplete_path = out_dir.join("incomplete.set");
    std::fs::write(&incomplete_path, result.incomplete_set()).map_err(|e| rerr!(ErrorKind::IoError, "writing '{}': {}", incomplete_path.display(), e))?;
    Ok(())
}

/// Runs a single record by rid, outside of any replay set — backs the
/// `rcmd check <path>` CLI subcommand (spec §6).
pub async fn run_single(path: &Path) -> Result<crate::result::RecordResult> {
    let record = Record::load(path)?;
    let root = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    Ok(record.run(root).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replay_set_runs_all_listed_records() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rcmd"), "check 1 == 1\n").unwrap();
        std::fs::write(dir.path().join("b.rcmd"), "check 1 == 2\n").unwrap();
        std::fs::write(dir.path().join("set1.set"), "a\nb\n").unwrap();
        let set = ReplaySet::load(&dir.path().join("set1.set")).unwrap();
        let result = set.run(dir.path()).await;
        assert_eq!(result.records.len(), 2);
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn missing_record_becomes_incomplete_without_aborting_set() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rcmd"), "check 1 == 1\n").unwrap();
        std::fs::write(dir.path().join("set1.set"), "a\nghost\n").unwrap();
        let set = ReplaySet::load(&dir.path().join("set1.set")).unwrap();
        let result = set.run(dir.path()).await;
        assert_eq!(result.records.len(), 2);
        assert!(result.records[1].incomplete);
    }
}
