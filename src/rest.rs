//! REST client module (spec §4.10): templated JSON bodies, a persistent
//! cookie jar, version-constraint gating, and download streaming. Reuses
//! the `send`/`expect` statement surface via `Session::Rest` rather than a
//! dedicated statement keyword (spec §9 open-question resolution).

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::cookie::Jar;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{ErrorKind, Result};
use crate::node::Node;
use crate::rerr;
use crate::value::{Value, ValueKey};

/// One `<api_path>/<command>.json` template (spec §4.10): the static shape
/// of a REST call, filled in from the caller's refmap variable before the
/// request goes out.
#[derive(Debug, Clone, Deserialize)]
pub struct RestTemplate {
    pub method: String,
    pub urn: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub downloadpath: Option<String>,
    /// Minimum (or exact/bounded, per [`version_satisfies`]) API version
    /// this template requires, checked against the node's own `version`.
    #[serde(default)]
    pub version: Option<String>,
}

impl RestTemplate {
    pub fn load(path: &std::path::Path) -> Result<RestTemplate> {
        let text = std::fs::read_to_string(path).map_err(|e| rerr!(ErrorKind::IoError, "reading REST template '{}': {}", path.display(), e))?;
        serde_json::from_str(&text).map_err(|e| rerr!(ErrorKind::ParseError, "parsing REST template '{}': {}", path.display(), e))
    }
}

pub struct RestClient {
    client: Client,
    base_url: String,
    node_version: Option<String>,
    pub last_response: Option<String>,
    pub last_status: Option<u16>,
}

impl RestClient {
    pub fn new(node: &Node) -> Result<RestClient> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| rerr!(ErrorKind::ProtocolError, "failed to build REST client: {}", e))?;
        let protocol = node.protocol.clone().unwrap_or_else(|| "https".to_string());
        let path = node.api_path.clone().unwrap_or_default();
        let base_url = format!("{}://{}{}", protocol, node.host, path);
        Ok(RestClient { client, base_url, node_version: node.version.clone(), last_response: None, last_status: None })
    }

    /// Substitutes `{ident}` placeholders in `template` with string values
    /// from `vars` (spec §4.10 "templated JSON request bodies"); under
    /// `urlencoded`, each substituted value is percent-encoded first.
    pub fn render_template(template: &str, vars: &IndexMap<ValueKey, Value>, urlencoded: bool) -> String {
        let mut out = template.to_string();
        for (k, v) in vars {
            let rendered = v.to_string();
            let rendered = if urlencoded {
                utf8_percent_encode(&rendered, NON_ALPHANUMERIC).to_string()
            } else {
                rendered
            };
            out = out.replace(&format!("{{{}}}", k), &rendered);
        }
        out
    }

    /// Renders and issues one templated REST call (spec §4.10). Gated by
    /// `tpl.version` against the node's own reported version when both are
    /// set; a 2xx response with `downloadpath` streams the body to that
    /// path instead of buffering it into `last_response`.
    pub async fn execute(&mut self, tpl: &RestTemplate, vars: &IndexMap<ValueKey, Value>) -> Result<()> {
        if let (Some(constraint), Some(actual)) = (&tpl.version, &self.node_version) {
            if !version_satisfies(constraint, actual) {
                return Err(rerr!(
                    ErrorKind::ProtocolError,
                    "REST template requires version {}, node reports {}",
                    constraint,
                    actual
                ));
            }
        }

        let urlencoded = tpl
            .headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("content-type") && v.to_lowercase().contains("urlencoded"));

        let urn = Self::render_template(&tpl.urn, vars, urlencoded);
        let url = format!("{}{}", self.base_url, urn);
        let method = tpl.method.parse::<reqwest::Method>().map_err(|_| rerr!(ErrorKind::InvalidArgument, "unknown HTTP method '{}'", tpl.method))?;

        let mut req = self.client.request(method, &url);
        for (k, v) in &tpl.headers {
            req = req.header(k.as_str(), Self::render_template(v, vars, false));
        }
        if let Some(payload) = &tpl.payload {
            req = req.body(Self::render_template(payload, vars, urlencoded));
        }

        let resp = req.send().await.map_err(|e| rerr!(ErrorKind::ProtocolError, "request to {} failed: {}", url, e))?;
        let status = resp.status();
        self.last_status = Some(status.as_u16());

        if status.is_success() {
            if let Some(dest) = &tpl.downloadpath {
                let bytes = resp.bytes().await.map_err(|e| rerr!(ErrorKind::ProtocolError, "reading download body failed: {}", e))?;
                tokio::fs::write(dest, &bytes).await.map_err(|e| rerr!(ErrorKind::IoError, "writing '{}': {}", dest, e))?;
                self.last_response = Some(String::new());
                return Ok(());
            }
        }
        self.last_response = Some(resp.text().await.map_err(|e| rerr!(ErrorKind::ProtocolError, "reading response body failed: {}", e))?);
        Ok(())
    }
}

/// Checks a semver-ish `constraint` (e.g. `">=2.1"`) against `actual` by
/// comparing dotted numeric components; used to gate REST calls behind a
/// minimum API version (spec §4.10 "version-constraint gating").
pub fn version_satisfies(constraint: &str, actual: &str) -> bool {
    let constraint = constraint.trim();
    let (op, ver) = if let Some(v) = constraint.strip_prefix(">=") {
        (">=", v.trim())
    } else if let Some(v) = constraint.strip_prefix("<=") {
        ("<=", v.trim())
    } else if let Some(v) = constraint.strip_prefix('>') {
        (">", v.trim())
    } else if let Some(v) = constraint.strip_prefix('<') {
        ("<", v.trim())
    } else if let Some(v) = constraint.strip_prefix('=') {
        ("=", v.trim())
    } else {
        ("=", constraint)
    };
    let parse = |s: &str| -> Vec<u32> { s.split('.').map(|p| p.parse().unwrap_or(0)).collect() };
    let a = parse(actual);
    let b = parse(ver);
    let ord = a.cmp(&b);
    match op {
        ">=" => ord != std::cmp::Ordering::Less,
        "<=" => ord != std::cmp::Ordering::Greater,
        ">" => ord == std::cmp::Ordering::Greater,
        "<" => ord == std::cmp::Ordering::Less,
        _ => ord == std::cmp::Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_constraint_gte() {
        assert!(version_satisfies(">=2.1", "2.5"));
        assert!(!version_satisfies(">=2.1", "1.9"));
    }

    #[test]
    fn version_constraint_exact() {
        assert!(version_satisfies("=1.0", "1.0"));
        assert!(!version_satisfies("=1.0", "1.1"));
    }

    #[test]
    fn template_substitutes_braces() {
        let mut vars = IndexMap::new();
        vars.insert(ValueKey::String("id".into()), Value::Number(42.0));
        let out = RestClient::render_template("{\"id\": {id}}", &vars, false);
        assert_eq!(out, "{\"id\": 42}");
    }

    #[test]
    fn template_urlencodes_substitutions_when_requested() {
        let mut vars = IndexMap::new();
        vars.insert(ValueKey::String("q".into()), Value::String("a b/c".into()));
        let out = RestClient::render_template("search?q={q}", &vars, true);
        assert_eq!(out, "search?q=a%20b%2Fc");
    }

    #[test]
    fn template_loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("create_user.json");
        std::fs::write(&path, r#"{"method":"POST","urn":"/users/{id}","headers":{"Content-Type":"application/json"},"payload":"{\"id\":{id}}"}"#).unwrap();
        let tpl = RestTemplate::load(&path).unwrap();
        assert_eq!(tpl.method, "POST");
        assert_eq!(tpl.urn, "/users/{id}");
        assert!(tpl.downloadpath.is_none());
    }
}
