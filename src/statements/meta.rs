use crate::ast::{BpKind, Expr, Statement};
use crate::control::Flow;
use crate::error::{ErrorKind, Result};
use crate::eval::Evaluator;
use crate::node::Environment;
use crate::rerr;

use super::Ctx;

pub fn exec_version(_ctx: &mut Ctx, v: &str) -> Result<Flow> {
    tracing::info!(target: "rcmd::record", "record declares version {}", v);
    Ok(Flow::Normal)
}

pub fn exec_environment(ctx: &mut Ctx, path: &str) -> Result<Flow> {
    let full = ctx.contents_root.join(path);
    let text = std::fs::read_to_string(&full).map_err(|e| rerr!(ErrorKind::IoError, "reading environment file '{}': {}", full.display(), e))?;
    let env = Environment::parse(&text)?;
    *ctx.environment = Some(env);
    Ok(Flow::Normal)
}

pub fn exec_load(ctx: &mut Ctx, path: &str) -> Result<Flow> {
    let full = ctx.contents_root.join(path);
    let text = std::fs::read_to_string(&full).map_err(|e| rerr!(ErrorKind::IoError, "reading ini file '{}': {}", full.display(), e))?;
    let sections = crate::config::parse_ini(&text)?;
    for (name, fields) in sections {
        let mut map = indexmap::IndexMap::new();
        for (k, v) in fields {
            map.insert(crate::value::ValueKey::String(k), crate::value::Value::String(v));
        }
        ctx.env.set_load_protected(&name, crate::value::Value::Map(map));
    }
    Ok(Flow::Normal)
}

pub fn exec_unload(ctx: &mut Ctx, path: &str) -> Result<Flow> {
    let full = ctx.contents_root.join(path);
    let text = std::fs::read_to_string(&full).map_err(|e| rerr!(ErrorKind::IoError, "reading ini file '{}': {}", full.display(), e))?;
    let sections = crate::config::parse_ini(&text)?;
    for (name, _) in sections {
        ctx.env.del_with_load_path(&name);
    }
    Ok(Flow::Normal)
}

/// Runs a nested record to completion under a snapshot scope and its own
/// fresh `RecordResult` (spec §9 resolution): the child sees the caller's
/// variables but none of its own mutations leak back, and its finished
/// result hangs off the caller's step list as a whole `Step::Record` rather
/// than being merged statement-by-statement into the caller's steps.
/// Running the child through the normal `execute_block` path means any
/// `script ... checker` statements inside it still produce their
/// `Step::Checker` entries in the child's own result, exactly as they would
/// if the child were run as a top-level record.
pub async fn exec_require(ctx: &mut Ctx<'_>, rid_expr: &Expr) -> Result<Flow> {
    if ctx.depth >= super::MAX_REQUIRE_DEPTH {
        return Err(rerr!(ErrorKind::InvalidState, "require nesting exceeded {} levels", super::MAX_REQUIRE_DEPTH));
    }
    let rid_v = Evaluator::new(ctx.env).eval(rid_expr)?;
    let rid = rid_v.as_str().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "require argument must be a string rid"))?.to_string();
    if rid == ctx.result.rid {
        return Err(rerr!(ErrorKind::InvalidState, "record '{}' cannot require itself", rid));
    }
    let path = ctx.contents_root.join(format!("{}.rcmd", rid));
    let src = std::fs::read_to_string(&path).map_err(|e| rerr!(ErrorKind::IoError, "reading required record '{}': {}", path.display(), e))?;
    let stmts = crate::parser::parse(&src)?;

    // One sub-log directory per require call site, keyed off this record's
    // step count so repeated or nested requires never collide.
    let n = ctx.result.steps.len();
    let sub_log_dir = ctx.contents_root.join("_require_").join(n.to_string());
    std::fs::create_dir_all(&sub_log_dir).map_err(|e| rerr!(ErrorKind::IoError, "creating require log dir '{}': {}", sub_log_dir.display(), e))?;

    let started = std::time::Instant::now();
    let mut sub_result = crate::result::RecordResult::new(rid.clone());
    let mut sub_defer_stack: Vec<Vec<Statement>> = Vec::new();

    ctx.env.push_snapshot();
    let flow = {
        let mut sub_ctx = Ctx {
            env: &mut *ctx.env,
            sessions: &mut *ctx.sessions,
            environment: &mut *ctx.environment,
            defer_stack: &mut sub_defer_stack,
            result: &mut sub_result,
            contents_root: ctx.contents_root.clone(),
            depth: ctx.depth + 1,
        };
        let flow = super::execute_block(&mut sub_ctx, &stmts).await;
        if let Err(e) = &flow {
            sub_ctx.result.push_terminating_error(e, 0);
            sub_ctx.result.incomplete = true;
        }
        super::run_defers(&mut sub_ctx).await;
        flow
    };
    ctx.env.pop_snapshot();
    sub_result.run_time = started.elapsed().as_secs_f64();

    // A required record's own uncaught error is absorbed into its result
    // (same contract as a top-level record run) rather than aborting the
    // caller; the caller still sees it via `sub_result.passed`/`incomplete`.
    drop(flow);

    let log_line = format!("require {} -> passed={} incomplete={}\n", rid, sub_result.passed, sub_result.incomplete);
    let _ = std::fs::write(sub_log_dir.join("require.log"), log_line);

    ctx.result.push_required(sub_result);
    Ok(Flow::Normal)
}

/// Runs an external command in the record's contents directory (spec §4.1
/// "script"). Without `checker`, the exit code is unchecked and stdout is
/// captured into `var` if given; with `checker`, a `CheckerResult` step
/// records SUCCESS/FAIL from the process exit code, output captured either
/// way (grounded on `record3/Script.go` and `record3/Checker.go`).
pub async fn exec_script(ctx: &mut Ctx<'_>, path: &Expr, var: Option<&str>, checker: bool) -> Result<Flow> {
    let path_v = Evaluator::new(ctx.env).eval(path)?;
    let path_str = path_v.as_str().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "script path must be a string"))?.to_string();
    let output = tokio::process::Command::new(&path_str)
        .current_dir(&ctx.contents_root)
        .output()
        .await
        .map_err(|e| rerr!(ErrorKind::ProcessError, "running script '{}': {}", path_str, e))?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if let Some(v) = var {
        ctx.env.set(v, crate::value::Value::String(stdout.clone()))?;
    }
    if checker {
        let passed = output.status.success();
        ctx.result.push_checker(crate::result::CheckerResult {
            name: path_str,
            passed,
            steps: vec![crate::result::Step::Info { message: stdout }],
        });
    }
    Ok(Flow::Normal)
}

pub async fn exec_bashsetenv(ctx: &mut Ctx<'_>, path: &Expr) -> Result<Flow> {
    let path_v = Evaluator::new(ctx.env).eval(path)?;
    let path_str = path_v.as_str().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "bashsetenv path must be a string"))?.to_string();
    let full = ctx.contents_root.join(&path_str);
    let text = std::fs::read_to_string(&full).map_err(|e| rerr!(ErrorKind::IoError, "reading bashsetenv file '{}': {}", full.display(), e))?;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            ctx.env.set(k.trim(), crate::value::Value::String(v.trim().to_string()))?;
        }
    }
    Ok(Flow::Normal)
}

/// Breaking-point traffic-generator statements parse (AST completeness)
/// but are out of scope for this core (explicit Non-goal); executing one
/// surfaces a single `ErrorResult` step rather than generating traffic.
pub fn exec_bp(ctx: &mut Ctx, kind: &BpKind, _args: &[Expr]) -> Result<Flow> {
    let name = match kind {
        BpKind::Login => "login",
        BpKind::Normal => "normal",
        BpKind::Rfc2544 => "rfc2544",
        BpKind::Logout => "logout",
    };
    ctx.result.steps.push(crate::result::Step::Error(crate::result::ErrorResult {
        message: format!("bp {} is not implemented in this core", name),
        kind: "InvalidState".to_string(),
        line: 0,
        context: Vec::new(),
    }));
    Ok(Flow::Normal)
}
