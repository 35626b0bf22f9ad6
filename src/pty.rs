//! PTY driver (component D, spec §4.5 "Session transport").
//!
//! Grounded on the `portable-pty` usage pattern in
//! `other_examples/.../stakpak-agent__...shell_session-local.rs.rs`: a
//! native pty pair, a `CommandBuilder`-spawned child, and a dedicated
//! reader thread that never blocks the tokio runtime, forwarding bytes
//! over an `mpsc` channel that the session polls.

use std::io::{Read, Write};
use std::sync::mpsc as std_mpsc;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use crate::error::{ErrorKind, Result};
use crate::rerr;

pub struct PtyHandle {
    writer: Box<dyn Write + Send>,
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    pub rx: std_mpsc::Receiver<Vec<u8>>,
    _reader_thread: std::thread::JoinHandle<()>,
}

impl PtyHandle {
    /// Spawns `program` with `args` inside a fresh pty, grounded on the
    /// reference example's `native_pty_system().openpty` + `CommandBuilder`
    /// shape. `cols`/`rows` follow the reference's 80x24 default when unset.
    pub fn spawn(program: &str, args: &[String], cwd: Option<&str>) -> Result<PtyHandle> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows: 24, cols: 80, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| rerr!(ErrorKind::ProcessError, "failed to allocate pty: {}", e))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| rerr!(ErrorKind::ProcessError, "failed to spawn '{}': {}", program, e))?;
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| rerr!(ErrorKind::ProcessError, "failed to clone pty reader: {}", e))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| rerr!(ErrorKind::ProcessError, "failed to take pty writer: {}", e))?;

        let (tx, rx) = std_mpsc::channel::<Vec<u8>>();
        let reader_thread = std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(PtyHandle {
            writer,
            master: pair.master,
            child,
            rx,
            _reader_thread: reader_thread,
        })
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data).map_err(|e| rerr!(ErrorKind::IoError, "pty write failed: {}", e))?;
        self.writer.flush().map_err(|e| rerr!(ErrorKind::IoError, "pty flush failed: {}", e))
    }

    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| rerr!(ErrorKind::IoError, "pty resize failed: {}", e))
    }

    /// Non-blocking drain of whatever bytes have arrived since the last
    /// poll; the session loop calls this on its 250ms step.
    pub fn try_recv(&self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(chunk) = self.rx.try_recv() {
            out.extend(chunk);
        }
        out
    }

    pub fn try_wait(&mut self) -> Option<i64> {
        self.child.try_wait().ok().flatten().map(|status| status.exit_code() as i64)
    }

    pub fn kill(&mut self) {
        let _ = self.child.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawns_true_and_observes_exit() {
        let mut pty = PtyHandle::spawn("/bin/echo", &["hello".to_string()], None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));
        let out = pty.try_recv();
        assert!(String::from_utf8_lossy(&out).contains("hello"));
        for _ in 0..20 {
            if pty.try_wait().is_some() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
    }
}
