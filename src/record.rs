//! A single `.rcmd` record: parsed statements plus the rid derived from
//! its filename (spec §3 "Record"). Records are read-only after parse and
//! may be executed multiple times (once per replay-set entry, plus once
//! more per `require` caller).

use std::path::{Path, PathBuf};

use crate::ast::Statement;
use crate::env::Env;
use crate::error::{ErrorKind, Result};
use crate::node::Environment;
use crate::rerr;
use crate::result::RecordResult;
use crate::session::SessionMap;
use crate::statements::{execute_block, run_defers, Ctx};

pub struct Record {
    pub rid: String,
    pub statements: Vec<Statement>,
}

impl Record {
    pub fn load(path: &Path) -> Result<Record> {
        let rid = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| rerr!(ErrorKind::InvalidArgument, "record path '{}' has no file stem", path.display()))?
            .to_string();
        let src = std::fs::read_to_string(path).map_err(|e| rerr!(ErrorKind::IoError, "reading record '{}': {}", path.display(), e))?;
        let statements = crate::parser::parse(&src)?;
        Ok(Record { rid, statements })
    }

    /// Runs this record to completion against a fresh `Env`/`SessionMap`,
    /// producing its `RecordResult`. Uncaught errors mark the record
    /// incomplete (spec §4.9) rather than propagating to the caller — the
    /// replay set keeps going so one bad record doesn't sink the others.
    pub async fn run(&self, contents_root: PathBuf) -> RecordResult {
        let started = std::time::Instant::now();
        let mut env = Env::new();
        let mut sessions = SessionMap::new();
        let mut environment: Option<Environment> = None;
        let mut defer_stack: Vec<Vec<Statement>> = Vec::new();
        let mut result = RecordResult::new(self.rid.clone());

        {
            let mut ctx = Ctx {
                env: &mut env,
                sessions: &mut sessions,
                environment: &mut environment,
                defer_stack: &mut defer_stack,
                result: &mut result,
                contents_root,
                depth: 0,
            };
            match execute_block(&mut ctx, &self.statements).await {
                Ok(_) => {}
                Err(e) => {
                    ctx.result.push_terminating_error(&e, 0);
                    ctx.result.incomplete = true;
                }
            }
            run_defers(&mut ctx).await;
        }

        result.run_time = started.elapsed().as_secs_f64();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_simple_check_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r1.rcmd");
        std::fs::write(&path, "set x 1\ncheck x == 1\n").unwrap();
        let record = Record::load(&path).unwrap();
        let result = record.run(dir.path().to_path_buf()).await;
        assert!(result.passed);
        assert!(!result.incomplete);
    }

    #[tokio::test]
    async fn uncaught_error_marks_record_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r2.rcmd");
        std::fs::write(&path, "error \"boom\"\n").unwrap();
        let record = Record::load(&path).unwrap();
        let result = record.run(dir.path().to_path_buf()).await;
        assert!(result.incomplete);
        assert!(!result.passed);
    }
}
