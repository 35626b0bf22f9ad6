//! Named session registry: `connect`/`spawn`/`close` and the login
//! sequences for each node kind (spec §4.4/§4.5, component D).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::ast::Eol;
use crate::error::{ErrorKind, Result};
use crate::expect::{expect_with_charset, strip_ansi};
use crate::logging::SessionLogger;
use crate::node::{Node, NodeKind};
use crate::pty::PtyHandle;
use crate::rerr;
use crate::rest::RestClient;

pub enum SessionKind {
    Pty(PtyHandle),
    Rest(RestClient),
}

pub struct Session {
    pub node_name: String,
    pub kind: SessionKind,
    pub eol: Eol,
    pub bash_capable: bool,
    pub charset: String,
    pub log: SessionLogger,
}

impl Session {
    pub fn eol_bytes(&self) -> &'static [u8] {
        match self.eol {
            Eol::Lf => b"\n",
            Eol::Cr => b"\r",
            Eol::CrLf => b"\r\n",
        }
    }

    pub fn pty_mut(&mut self) -> Result<&mut PtyHandle> {
        match &mut self.kind {
            SessionKind::Pty(p) => Ok(p),
            SessionKind::Rest(_) => Err(rerr!(ErrorKind::InvalidState, "session is a REST client, not a terminal")),
        }
    }

    pub fn rest_mut(&mut self) -> Result<&mut RestClient> {
        match &mut self.kind {
            SessionKind::Rest(r) => Ok(r),
            SessionKind::Pty(_) => Err(rerr!(ErrorKind::InvalidState, "session is a terminal, not a REST client")),
        }
    }
}

#[derive(Default)]
pub struct SessionMap {
    sessions: HashMap<String, Session>,
}

const CONNECT_RETRIES: u32 = 3;
const CONNECT_BACKOFF: Duration = Duration::from_millis(300);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(120);

impl SessionMap {
    pub fn new() -> Self {
        SessionMap::default()
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Session> {
        self.sessions.get_mut(name).ok_or_else(|| rerr!(ErrorKind::UnknownName, "no such session '{}'", name))
    }

    /// Registers a session directly, used by `spawn` (which builds its own
    /// pty outside the `connect`/node-lookup path).
    pub fn insert(&mut self, name: String, session: Session) {
        self.sessions.insert(name, session);
    }

    pub fn close(&mut self, name: &str) -> Result<()> {
        if let Some(mut session) = self.sessions.remove(name) {
            if let SessionKind::Pty(pty) = &mut session.kind {
                pty.kill();
            }
        }
        Ok(())
    }

    /// Connects `session_name` to `node`, retrying transient failures with
    /// a fixed backoff (spec §4.5 "Connect retries transient failures").
    /// `log_dir` is where the session's transcript log is opened (spec §4.4
    /// "Session Multiplexer").
    pub async fn connect(&mut self, session_name: &str, node: &Node, password: Option<&str>, log_dir: &Path) -> Result<()> {
        let mut last_err = None;
        for attempt in 0..CONNECT_RETRIES {
            match self.connect_once(session_name, node, password, log_dir).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < CONNECT_RETRIES {
                        tokio::time::sleep(CONNECT_BACKOFF * (attempt + 1)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap().with_context(format!("connecting session '{}'", session_name)))
    }

    async fn connect_once(&mut self, session_name: &str, node: &Node, password: Option<&str>, log_dir: &Path) -> Result<()> {
        if node.kind == NodeKind::Rest {
            let client = RestClient::new(node)?;
            self.sessions.insert(
                session_name.to_string(),
                Session {
                    node_name: node.name.clone(),
                    kind: SessionKind::Rest(client),
                    eol: node.eol.clone(),
                    bash_capable: false,
                    charset: node.charset.clone(),
                    log: SessionLogger::new(log_dir, session_name),
                },
            );
            return Ok(());
        }

        let (program, args): (&str, Vec<String>) = match node.kind {
            NodeKind::Ssh => ("ssh", vec![format!("{}@{}", node.user.clone().unwrap_or_default(), node.host), "-p".into(), node.port.unwrap_or(22).to_string()]),
            NodeKind::Telnet => ("telnet", vec![node.host.clone(), node.port.unwrap_or(23).to_string()]),
            NodeKind::Linux => ("bash", vec!["--noprofile".into(), "--norc".into()]),
            NodeKind::Docker => ("docker", vec!["exec".into(), "-it".into(), node.container.clone().unwrap_or_default(), "bash".into()]),
            NodeKind::Cisco => ("ssh", vec![format!("{}@{}", node.user.clone().unwrap_or_default(), node.host)]),
            NodeKind::Rest => unreachable!(),
        };

        let mut pty = PtyHandle::spawn(program, &args, None)?;

        match node.kind {
            NodeKind::Ssh | NodeKind::Cisco => self.login_ssh(&mut pty, password, &node.charset).await?,
            NodeKind::Telnet => self.login_telnet(&mut pty, node, password).await?,
            NodeKind::Linux | NodeKind::Docker => {}
            NodeKind::Rest => unreachable!(),
        }

        self.sessions.insert(
            session_name.to_string(),
            Session {
                node_name: node.name.clone(),
                kind: SessionKind::Pty(pty),
                eol: node.eol.clone(),
                bash_capable: node.kind.is_bash_capable(),
                charset: node.charset.clone(),
                log: SessionLogger::new(log_dir, session_name),
            },
        );
        Ok(())
    }

    /// Host-key/password/shell-prompt sequence. `expect` answers the SSH
    /// "continue connecting" prompt on its own, so this only waits on the
    /// password and final prompts (spec §4.4 "ssh/cisco login").
    async fn login_ssh(&self, pty: &mut PtyHandle, password: Option<&str>, charset: &str) -> Result<()> {
        let password_re = regex::Regex::new("(?i)password:").unwrap();
        let prompt_re = regex::Regex::new(r"[#$>:]\s*$").unwrap();

        if let Some(pw) = password {
            expect_with_charset(pty, &password_re, LOGIN_TIMEOUT, charset).await?;
            pty.write_all(format!("{}\n", pw).as_bytes())?;
        }
        expect_with_charset(pty, &prompt_re, LOGIN_TIMEOUT, charset).await?;
        Ok(())
    }

    async fn login_telnet(&self, pty: &mut PtyHandle, node: &Node, password: Option<&str>) -> Result<()> {
        let login_re = regex::Regex::new("(?i)login:").unwrap();
        let password_re = regex::Regex::new("(?i)password:").unwrap();
        let prompt_re = regex::Regex::new(r"[#$>:]\s*$").unwrap();

        expect_with_charset(pty, &login_re, LOGIN_TIMEOUT, &node.charset).await?;
        pty.write_all(format!("{}\n", node.user.clone().unwrap_or_default()).as_bytes())?;
        if let Some(pw) = password {
            expect_with_charset(pty, &password_re, LOGIN_TIMEOUT, &node.charset).await?;
            pty.write_all(format!("{}\n", pw).as_bytes())?;
        }
        expect_with_charset(pty, &prompt_re, LOGIN_TIMEOUT, &node.charset).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_ansi_leaves_plain_prompt_intact() {
        assert_eq!(strip_ansi("user@host:~$ "), "user@host:~$ ");
    }
}
