//! Node definitions: the connection targets named in `connect` statements
//! (spec §4.4 "Node / Environment"). Loaded from an ini-format environment
//! file; field defaults vary by node kind (spec §9, grounded on
//! `original_source/discovery/record3/env.go`).

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::error::{ErrorKind, Result};
use crate::rerr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Ssh,
    Telnet,
    Linux,
    Docker,
    Cisco,
    Rest,
}

impl NodeKind {
    fn parse(s: &str) -> Result<NodeKind> {
        match s.to_lowercase().as_str() {
            "ssh" => Ok(NodeKind::Ssh),
            "telnet" => Ok(NodeKind::Telnet),
            "linux" => Ok(NodeKind::Linux),
            "docker" => Ok(NodeKind::Docker),
            "cisco" => Ok(NodeKind::Cisco),
            "rest" => Ok(NodeKind::Rest),
            other => Err(rerr!(ErrorKind::InvalidArgument, "unknown node kind '{}'", other)),
        }
    }

    /// Cisco sessions never run bash; everyone else does (spec §4.5
    /// "bash-capable detection", grounded on `termio.go`).
    pub fn is_bash_capable(&self) -> bool {
        !matches!(self, NodeKind::Cisco | NodeKind::Rest)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub host: String,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub eol: crate::ast::Eol,
    /// Pty-session character set (`utf8` or `euckr`), spec §9 supplemental
    /// detail from `env.go`; unused on REST nodes.
    pub charset: String,
    /// REST-only.
    pub protocol: Option<String>,
    pub api_path: Option<String>,
    /// REST-only: the API's own reported version, checked against a
    /// template's `version` constraint before the template is sent.
    pub version: Option<String>,
    /// Docker-only: container name/id to `docker exec` into.
    pub container: Option<String>,
}

impl Node {
    fn defaults_for(kind: NodeKind, name: String) -> Node {
        let eol = if kind == NodeKind::Cisco { crate::ast::Eol::Cr } else { crate::ast::Eol::Lf };
        Node {
            name,
            kind,
            host: String::new(),
            port: None,
            user: None,
            password: None,
            eol,
            charset: "utf8".to_string(),
            protocol: None,
            api_path: None,
            version: None,
            container: None,
        }
    }

    /// Stable hash of this node's connection-relevant fields, used to
    /// detect whether an `environment` reload actually changed anything
    /// live sessions care about (spec §4.4 "env_hash").
    pub fn env_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(format!("{:?}", self.kind).as_bytes());
        hasher.update(self.host.as_bytes());
        if let Some(p) = self.port {
            hasher.update(p.to_string().as_bytes());
        }
        if let Some(u) = &self.user {
            hasher.update(u.as_bytes());
        }
        hasher.update(self.charset.as_bytes());
        if let Some(proto) = &self.protocol {
            hasher.update(proto.as_bytes());
        }
        if let Some(api) = &self.api_path {
            hasher.update(api.as_bytes());
        }
        if let Some(v) = &self.version {
            hasher.update(v.as_bytes());
        }
        if let Some(c) = &self.container {
            hasher.update(c.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// The full set of nodes parsed from one `environment` ini file.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub nodes: HashMap<String, Node>,
    pub hash: String,
}

impl Environment {
    pub fn parse(ini_text: &str) -> Result<Environment> {
        let sections = crate::config::parse_ini(ini_text)?;
        let mut nodes = HashMap::new();
        for (name, fields) in sections {
            let kind_str = fields.get("kind").or_else(|| fields.get("type")).ok_or_else(|| {
                rerr!(ErrorKind::InvalidArgument, "node '{}' is missing a 'kind' field", name)
            })?;
            let kind = NodeKind::parse(kind_str)?;
            let mut node = Node::defaults_for(kind, name.clone());
            if let Some(h) = fields.get("host") {
                node.host = h.clone();
            }
            if let Some(p) = fields.get("port") {
                node.port = p.parse().ok();
            }
            if kind != NodeKind::Cisco {
                node.user = fields.get("user").cloned();
            }
            node.password = fields.get("password").cloned();
            if let Some(cs) = fields.get("charset") {
                node.charset = cs.clone();
            }
            if let Some(eol) = fields.get("eol") {
                node.eol = match eol.to_lowercase().as_str() {
                    "cr" => crate::ast::Eol::Cr,
                    "crlf" => crate::ast::Eol::CrLf,
                    _ => crate::ast::Eol::Lf,
                };
            }
            if kind == NodeKind::Rest {
                node.protocol = fields.get("protocol").cloned().or(Some("https".to_string()));
                node.api_path = fields.get("api_path").cloned();
                node.version = fields.get("version").cloned();
            }
            if kind == NodeKind::Docker {
                node.container = fields.get("container").cloned();
            }
            nodes.insert(name, node);
        }
        let mut env = Environment { nodes, hash: String::new() };
        env.hash = env.compute_hash();
        Ok(env)
    }

    fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let mut names: Vec<&String> = self.nodes.keys().collect();
        names.sort();
        for name in names {
            hasher.update(self.nodes[name].env_hash().as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, name: &str) -> Result<&Node> {
        self.nodes.get(name).ok_or_else(|| rerr!(ErrorKind::UnknownName, "no such node '{}'", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cisco_defaults_to_cr_eol_and_no_user() {
        let ini = "[r1]\nkind=cisco\nhost=10.0.0.1\nuser=ignored\n";
        let env = Environment::parse(ini).unwrap();
        let node = env.get("r1").unwrap();
        assert!(matches!(node.eol, crate::ast::Eol::Cr));
        assert!(node.user.is_none());
        assert!(!node.kind.is_bash_capable());
    }

    #[test]
    fn rest_node_has_protocol_and_api_path() {
        let ini = "[api]\nkind=rest\nhost=example.com\napi_path=/v1\n";
        let env = Environment::parse(ini).unwrap();
        let node = env.get("api").unwrap();
        assert_eq!(node.protocol.as_deref(), Some("https"));
        assert_eq!(node.api_path.as_deref(), Some("/v1"));
    }

    #[test]
    fn env_hash_is_stable_across_parses() {
        let ini = "[r1]\nkind=linux\nhost=10.0.0.1\n";
        let a = Environment::parse(ini).unwrap();
        let b = Environment::parse(ini).unwrap();
        assert_eq!(a.hash, b.hash);
    }
}
