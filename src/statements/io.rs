use std::path::PathBuf;
use std::time::Duration;

use crate::ast::Expr;
use crate::control::Flow;
use crate::error::{ErrorKind, Result};
use crate::eval::Evaluator;
use crate::expect::expect as expect_pattern;
use crate::rerr;
use crate::transfer;
use crate::value::Value;

use super::Ctx;

pub async fn exec_connect(ctx: &mut Ctx<'_>, session: &str, node_name: &str) -> Result<Flow> {
    let environment = ctx.environment.as_ref().ok_or_else(|| rerr!(ErrorKind::InvalidState, "connect requires a loaded environment"))?;
    let node = environment.get(node_name)?.clone();
    let password = node.password.clone();
    ctx.sessions.connect(session, &node, password.as_deref(), &ctx.contents_root).await?;
    Ok(Flow::Normal)
}

pub async fn exec_spawn(ctx: &mut Ctx<'_>, session: &str, command: &Expr) -> Result<Flow> {
    let cmd_val = Evaluator::new(ctx.env).eval(command)?;
    let cmd = cmd_val.as_str().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "spawn command must be a string"))?;
    let mut parts = cmd.split_whitespace();
    let program = parts.next().ok_or_else(|| rerr!(ErrorKind::InvalidArgument, "spawn requires a non-empty command"))?;
    let args: Vec<String> = parts.map(|s| s.to_string()).collect();
    let pty = crate::pty::PtyHandle::spawn(program, &args, None)?;
    let sess = crate::session::Session {
        node_name: format!("<spawned:{}>", program),
        kind: crate::session::SessionKind::Pty(pty),
        eol: crate::ast::Eol::Lf,
        bash_capable: true,
        charset: "utf8".to_string(),
        log: crate::logging::SessionLogger::new(&ctx.contents_root, session),
    };
    ctx.sessions.insert(session.to_string(), sess);
    Ok(Flow::Normal)
}

pub fn exec_close(ctx: &mut Ctx<'_>, session: &str) -> Result<Flow> {
    ctx.sessions.close(session)?;
    Ok(Flow::Normal)
}

pub async fn exec_send(ctx: &mut Ctx<'_>, text: &Expr, session: &str) -> Result<Flow> {
    let v = Evaluator::new(ctx.env).eval(text)?;
    let s = v.to_string();
    ctx.env.set("last_send", Value::String(s.clone()))?;

    let sess = ctx.sessions.get_mut(session)?;
    let eol = sess.eol_bytes();
    let is_pty = matches!(sess.kind, crate::session::SessionKind::Pty(_));

    if is_pty {
        let mut payload = crate::expect::encode_charset(&s, &sess.charset);
        // Raw Ctrl-C is sent as-is with no trailing EOL (spec §4.5): a
        // terminal never waits for a newline to act on an interrupt.
        if payload.first() != Some(&0x03) {
            payload.extend_from_slice(eol);
        }
        sess.pty_mut()?.write_all(&payload)?;
        sess.log.log_send(&s)?;
        return Ok(Flow::Normal);
    }

    // REST sessions treat `send` as "<command> [refmap-variable]" (spec §9
    // resolution): load `<api_path>/<command>.json`, substitute its
    // `{ident}` placeholders from the named map variable, and store the
    // response the same way a pty `expect` would.
    let node_name = sess.node_name.clone();
    let environment = ctx.environment.as_ref().ok_or_else(|| rerr!(ErrorKind::InvalidState, "REST send requires a loaded environment"))?;
    let node = environment.get(&node_name)?.clone();
    let api_path = node.api_path.clone().unwrap_or_default();

    let mut parts = s.splitn(2, ' ');
    let command = parts.next().unwrap_or("").trim().to_string();
    let var_name = parts.next().map(str::trim).filter(|p| !p.is_empty());
    let vars = match var_name.and_then(|name| ctx.env.get(name)).cloned() {
        Some(Value::Map(m)) => m,
        Some(other) => return Err(rerr!(ErrorKind::TypeMismatch, "REST refmap variable must be a map, got {}", other.type_name())),
        None => indexmap::IndexMap::new(),
    };

    let template_path = ctx.contents_root.join(api_path.trim_start_matches('/')).join(format!("{}.json", command));
    let tpl = crate::rest::RestTemplate::load(&template_path)?;

    let rest_sess = ctx.sessions.get_mut(session)?;
    let rest = rest_sess.rest_mut()?;
    rest.execute(&tpl, &vars).await?;
    let status = rest.last_status.unwrap_or(0);
    let response = rest.last_response.clone().unwrap_or_default();
    rest_sess.log.log_send(&s)?;
    for line in response.lines() {
        rest_sess.log.log_output(line)?;
    }

    let lines: Vec<Value> = response.lines().map(|l| Value::String(l.to_string())).collect();
    ctx.env.set("last_output", Value::List(lines))?;
    ctx.env.set("output_string", Value::String(response))?;
    ctx.env.set("exit_code", Value::Number(status as f64))?;
    Ok(Flow::Normal)
}

/// Prompt shape that marks a bash-capable session ready for the exit-code
/// probe (spec §4.5 "Exit-code probe": matched prompt ends with `# ` or `$ `).
fn looks_like_bash_prompt(line: &str) -> bool {
    let trimmed = line.trim_end_matches('\n');
    trimmed.ends_with("# ") || trimmed.ends_with("$ ")
}

pub async fn exec_expect(ctx: &mut Ctx<'_>, pattern: &Expr, timeout: &Expr, session: &str) -> Result<Flow> {
    // On a REST session, `send` already captured the response into
    // last_output/output_string/exit_code; `expect` is a no-op there (spec
    // §9 resolution) rather than failing on a pty that doesn't exist.
    if matches!(ctx.sessions.get_mut(session)?.kind, crate::session::SessionKind::Rest(_)) {
        return Ok(Flow::Normal);
    }

    let pattern_v = Evaluator::new(ctx.env).eval(pattern)?;
    let re = match pattern_v {
        Value::Regex(cr) => cr.re,
        Value::String(s) => std::sync::Arc::new(regex::Regex::new(&s).map_err(|e| rerr!(ErrorKind::ParseError, "invalid expect pattern '{}': {}", s, e))?),
        other => return Err(rerr!(ErrorKind::TypeMismatch, "expect pattern must be a string or regex, got {}", other.type_name())),
    };
    let timeout_v = Evaluator::new(ctx.env).eval(timeout)?;
    let secs = timeout_v.as_number().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "expect timeout must be a number"))?;
    let bash_capable = ctx.sessions.get_mut(session)?.bash_capable;
    let charset = ctx.sessions.get_mut(session)?.charset.clone();
    let pty = ctx.sessions.get_mut(session)?.pty_mut()?;
    let seen = crate::expect::expect_with_charset(pty, &re, Duration::from_secs_f64(secs.max(0.0)), &charset).await?;

    // Observable outputs maintained on the context after each Expect (spec §4.5).
    let last_prompt = seen.lines().last().unwrap_or("").to_string();
    let last_output: Vec<Value> = seen.lines().map(|l| Value::String(l.to_string())).collect();
    ctx.env.set("last_output", Value::List(last_output))?;
    ctx.env.set("output_string", Value::String(seen.clone()))?;
    ctx.env.set("last_prompt", Value::String(last_prompt.clone()))?;

    {
        let log = &mut ctx.sessions.get_mut(session)?.log;
        for line in seen.lines() {
            log.log_output(line)?;
        }
    }

    if bash_capable && looks_like_bash_prompt(&last_prompt) {
        let pty = ctx.sessions.get_mut(session)?.pty_mut()?;
        pty.write_all(b"echo $?\n")?;
        let prompt_re = regex::Regex::new(r"[#$>:]\s*$").unwrap();
        let exit_code = match expect_pattern(pty, &prompt_re, Duration::from_secs(60)).await {
            Ok(probe_out) => crate::expect::parse_exit_code(&probe_out),
            Err(_) => -1,
        };
        ctx.env.set("exit_code", Value::Number(exit_code as f64))?;
    }
    Ok(Flow::Normal)
}

pub fn exec_eol(ctx: &mut Ctx<'_>, eol: &crate::ast::Eol, session: &str) -> Result<Flow> {
    let sess = ctx.sessions.get_mut(session)?;
    sess.eol = eol.clone();
    Ok(Flow::Normal)
}

pub async fn exec_get(ctx: &mut Ctx<'_>, session: &str, remote: &Expr, local: &Expr, rename: Option<&Expr>) -> Result<Flow> {
    let remote_v = Evaluator::new(ctx.env).eval(remote)?;
    let remote_path = remote_v.as_str().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "get remote path must be a string"))?.to_string();
    let local_v = Evaluator::new(ctx.env).eval(local)?;
    let local_dir = local_v.as_str().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "get local path must be a string"))?.to_string();
    let rename_str = match rename {
        Some(e) => Some(Evaluator::new(ctx.env).eval(e)?.to_string()),
        None => None,
    };
    let filename = rename_str.unwrap_or_else(|| remote_path.rsplit('/').next().unwrap_or(&remote_path).to_string());
    let local_path = PathBuf::from(local_dir).join(filename);
    let sess = ctx.sessions.get_mut(session)?;
    transfer::get(sess, &remote_path, &local_path).await?;
    Ok(Flow::Normal)
}

pub async fn exec_put(ctx: &mut Ctx<'_>, session: &str, local: &Expr, remote: &Expr, rename: Option<&Expr>) -> Result<Flow> {
    let local_v = Evaluator::new(ctx.env).eval(local)?;
    let local_path = local_v.as_str().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "put local path must be a string"))?.to_string();
    let remote_v = Evaluator::new(ctx.env).eval(remote)?;
    let remote_dir = remote_v.as_str().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "put remote path must be a string"))?.to_string();
    let rename_str = match rename {
        Some(e) => Some(Evaluator::new(ctx.env).eval(e)?.to_string()),
        None => None,
    };
    let filename = rename_str.unwrap_or_else(|| local_path.rsplit('/').next().unwrap_or(&local_path).to_string());
    let remote_path = format!("{}/{}", remote_dir.trim_end_matches('/'), filename);
    let sess = ctx.sessions.get_mut(session)?;
    transfer::put(sess, &PathBuf::from(&local_path), &remote_path).await?;
    Ok(Flow::Normal)
}
