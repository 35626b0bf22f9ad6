//! Statement executors (component C, spec §4.2 "Execution model").
//!
//! `Ctx` bundles everything a statement needs to run: the variable
//! environment, the session registry, the loaded node environment, the
//! defer stack, and the record currently accumulating its `RecordResult`.
//! `execute_block` walks a `Vec<Statement>` and threads `Flow` through
//! nested bodies so `break`/`continue`/`return` unwind correctly while
//! still letting enclosing `defer` blocks run.

mod io;
mod meta;
mod vars;

use std::path::PathBuf;

use crate::ast::{Expr, IfClause, Statement};
use crate::control::Flow;
use crate::env::Env;
use crate::error::Result;
use crate::eval::Evaluator;
use crate::node::Environment;
use crate::result::RecordResult;
use crate::session::SessionMap;

pub struct Ctx<'a> {
    pub env: &'a mut Env,
    pub sessions: &'a mut SessionMap,
    pub environment: &'a mut Option<Environment>,
    pub defer_stack: &'a mut Vec<Vec<Statement>>,
    pub result: &'a mut RecordResult,
    /// Directory holding `.rcmd` record files, for `require`/`script`
    /// path resolution relative to the replay set (spec §4.6).
    pub contents_root: PathBuf,
    pub depth: u32,
}

const MAX_REQUIRE_DEPTH: u32 = 64;

impl<'a> Ctx<'a> {
    fn eval(&mut self, e: &Expr) -> Result<crate::value::Value> {
        Evaluator::new(self.env).eval(e)
    }
}

pub fn execute_block<'a>(
    ctx: &'a mut Ctx<'_>,
    stmts: &'a [Statement],
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Flow>> + 'a>> {
    Box::pin(async move {
        for stmt in stmts {
            let flow = execute_statement(ctx, stmt).await?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    })
}

pub fn execute_statement<'a>(
    ctx: &'a mut Ctx<'_>,
    stmt: &'a Statement,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Flow>> + 'a>> {
    Box::pin(async move {
        match stmt {
            Statement::Comment { kind, text } => {
                ctx.result.push_comment(*kind, text.clone(), 0);
                Ok(Flow::Normal)
            }

            Statement::Set { name, index, value } => vars::exec_set(ctx, name, index.as_deref(), value),
            Statement::Seta { name, index, value } => vars::exec_seta(ctx, name, index, value),
            Statement::Unset { name, index } => vars::exec_unset(ctx, name, index.as_deref()),

            Statement::Check { expr, step } => {
                let text = format!("{:?}", expr);
                let v = ctx.eval(expr)?;
                let last_send = ctx.env.get("last_send").map(|v| v.to_string());
                let last_output = match ctx.env.get("last_output") {
                    Some(crate::value::Value::List(items)) => items.iter().map(|i| i.to_string()).collect(),
                    _ => Vec::new(),
                };
                let exit_code = ctx.env.get("exit_code").and_then(|v| v.as_number()).map(|n| n as i64).unwrap_or(-1);
                ctx.result.apply_check(text, v.is_truthy(), *step, last_send, last_output, exit_code, 0);
                Ok(Flow::Normal)
            }
            Statement::Log(e) => {
                let v = ctx.eval(e)?;
                tracing::info!(target: "rcmd::record", "{}", v);
                ctx.result.steps.push(crate::result::Step::Info { message: v.to_string() });
                Ok(Flow::Normal)
            }
            Statement::Debug(e) => {
                let v = ctx.eval(e)?;
                tracing::debug!(target: "rcmd::record", "{}", v);
                Ok(Flow::Normal)
            }
            Statement::Error(e) => {
                let v = ctx.eval(e)?;
                Err(crate::rerr!(crate::error::ErrorKind::UserError, "{}", v))
            }
            Statement::Sleep(e) => {
                let v = ctx.eval(e)?;
                let secs = v.as_number().ok_or_else(|| crate::rerr!(crate::error::ErrorKind::TypeMismatch, "sleep requires a number of seconds"))?;
                tokio::time::sleep(std::time::Duration::from_secs_f64(secs.max(0.0))).await;
                Ok(Flow::Normal)
            }

            Statement::If { clauses, else_body } => exec_if(ctx, clauses, else_body.as_deref()).await,
            Statement::ForIn { key, val, expr, body } => exec_for_in(ctx, key, val, expr, body).await,
            Statement::ForRange { var, start, end, step, body } => exec_for_range(ctx, var, start, end, step.as_ref(), body).await,
            Statement::TableCsv { path, body } => exec_table_csv(ctx, path, body).await,
            Statement::TableRow { var, path, body } => exec_table_row(ctx, var, path, body).await,

            Statement::Defer { body } => {
                ctx.defer_stack.push(body.clone());
                Ok(Flow::Normal)
            }
            Statement::Break(n) => Ok(Flow::Break(*n)),
            Statement::Continue(n) => Ok(Flow::Continue(*n)),
            Statement::Return => Ok(Flow::Return),

            Statement::Connect { session, node } => io::exec_connect(ctx, session, node).await,
            Statement::Spawn { session, command } => io::exec_spawn(ctx, session, command).await,
            Statement::Close { session } => io::exec_close(ctx, session),
            Statement::Send { text, session } => io::exec_send(ctx, text, session).await,
            Statement::Expect { pattern, timeout, session } => io::exec_expect(ctx, pattern, timeout, session).await,
            Statement::Eol { eol, session } => io::exec_eol(ctx, eol, session),
            Statement::Get { session, remote, local, rename } => io::exec_get(ctx, session, remote, local, rename.as_ref()).await,
            Statement::Put { session, local, remote, rename } => io::exec_put(ctx, session, local, remote, rename.as_ref()).await,

            Statement::Version(v) => meta::exec_version(ctx, v),
            Statement::Environment { path } => meta::exec_environment(ctx, path),
            Statement::Load { path, .. } => meta::exec_load(ctx, path),
            Statement::Unload { path, .. } => meta::exec_unload(ctx, path),
            Statement::Require { rid } => meta::exec_require(ctx, rid).await,
            Statement::Script { path, var, checker } => meta::exec_script(ctx, path, var.as_deref(), *checker).await,
            Statement::Bashsetenv { path } => meta::exec_bashsetenv(ctx, path).await,
            Statement::Bp { kind, args } => meta::exec_bp(ctx, kind, args),
        }
    })
}

async fn exec_if<'a>(ctx: &'a mut Ctx<'_>, clauses: &'a [IfClause], else_body: Option<&'a [Statement]>) -> Result<Flow> {
    for clause in clauses {
        let v = ctx.eval(&clause.cond)?;
        if v.is_truthy() {
            ctx.env.push_scope();
            let flow = execute_block(ctx, &clause.body).await;
            ctx.env.pop_scope();
            return flow;
        }
    }
    if let Some(body) = else_body {
        ctx.env.push_scope();
        let flow = execute_block(ctx, body).await;
        ctx.env.pop_scope();
        return flow;
    }
    Ok(Flow::Normal)
}

/// Runs one iteration of a For/Table body inside its own transparent scope
/// (spec §4.4): a `set` on a name new to this frame shadows the outer
/// scope and is dropped when the iteration ends.
async fn run_loop_body<'a>(ctx: &'a mut Ctx<'_>, body: &'a [Statement]) -> Result<(Flow, bool)> {
    ctx.env.push_scope();
    let flow = execute_block(ctx, body).await;
    ctx.env.pop_scope();
    let flow = flow?;
    if flow == Flow::Normal {
        return Ok((Flow::Normal, false));
    }
    let (next, stop) = flow.step_out_of_loop();
    Ok((next, stop))
}

async fn exec_for_in<'a>(ctx: &'a mut Ctx<'_>, key: &'a str, val: &'a str, expr: &'a Expr, body: &'a [Statement]) -> Result<Flow> {
    let collection = ctx.eval(expr)?;
    match collection {
        crate::value::Value::List(items) => {
            for (i, item) in items.into_iter().enumerate() {
                ctx.env.set(key, crate::value::Value::Number(i as f64))?;
                ctx.env.set(val, item)?;
                let (flow, stop) = run_loop_body(ctx, body).await?;
                if flow != Flow::Normal {
                    return Ok(flow);
                }
                if stop {
                    break;
                }
            }
        }
        crate::value::Value::Map(map) => {
            for (k, v) in map.into_iter() {
                ctx.env.set(key, k.to_value())?;
                ctx.env.set(val, v)?;
                let (flow, stop) = run_loop_body(ctx, body).await?;
                if flow != Flow::Normal {
                    return Ok(flow);
                }
                if stop {
                    break;
                }
            }
        }
        other => return Err(crate::rerr!(crate::error::ErrorKind::TypeMismatch, "for..in requires a list or map, got {}", other.type_name())),
    }
    Ok(Flow::Normal)
}

async fn exec_for_range<'a>(ctx: &'a mut Ctx<'_>, var: &'a str, start: &'a Expr, end: &'a Expr, step: Option<&'a Expr>, body: &'a [Statement]) -> Result<Flow> {
    let start_v = ctx.eval(start)?.as_number().ok_or_else(|| crate::rerr!(crate::error::ErrorKind::TypeMismatch, "for range start must be a number"))?;
    let end_v = ctx.eval(end)?.as_number().ok_or_else(|| crate::rerr!(crate::error::ErrorKind::TypeMismatch, "for range end must be a number"))?;
    let step_v = match step {
        Some(e) => ctx.eval(e)?.as_number().ok_or_else(|| crate::rerr!(crate::error::ErrorKind::TypeMismatch, "for range step must be a number"))?,
        None => 1.0,
    };
    if step_v == 0.0 {
        return Err(crate::rerr!(crate::error::ErrorKind::InvalidArgument, "for range step cannot be zero"));
    }
    let mut i = start_v;
    loop {
        if (step_v > 0.0 && i >= end_v) || (step_v < 0.0 && i <= end_v) {
            break;
        }
        ctx.env.set(var, crate::value::Value::Number(i))?;
        let (flow, stop) = run_loop_body(ctx, body).await?;
        if flow != Flow::Normal {
            return Ok(flow);
        }
        if stop {
            break;
        }
        i += step_v;
    }
    Ok(Flow::Normal)
}

async fn exec_table_csv<'a>(ctx: &'a mut Ctx<'_>, path: &'a Expr, body: &'a [Statement]) -> Result<Flow> {
    let path_v = ctx.eval(path)?;
    let path_str = path_v.as_str().ok_or_else(|| crate::rerr!(crate::error::ErrorKind::TypeMismatch, "table csv path must be a string"))?;
    let full = ctx.contents_root.join(path_str);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(&full)
        .map_err(|e| crate::rerr!(crate::error::ErrorKind::IoError, "reading csv '{}': {}", full.display(), e))?;
    let headers = rdr.headers().map_err(|e| crate::rerr!(crate::error::ErrorKind::IoError, "reading csv headers: {}", e))?.clone();
    // Column names become top-level variables, not a nested map (spec §4.7
    // "table csv" column-binding rule); embedded whitespace becomes `_`.
    let sanitized_headers: Vec<String> = headers.iter().map(|h| h.replace(' ', "_")).collect();
    let rows: Vec<csv::StringRecord> = rdr.records().collect::<std::result::Result<_, _>>().map_err(|e| crate::rerr!(crate::error::ErrorKind::IoError, "reading csv row: {}", e))?;
    for row in rows {
        for (h, v) in sanitized_headers.iter().zip(row.iter()) {
            ctx.env.set(h, crate::value::Value::String(v.to_string()))?;
        }
        let (flow, stop) = run_loop_body(ctx, body).await?;
        if flow != Flow::Normal {
            return Ok(flow);
        }
        if stop {
            break;
        }
    }
    Ok(Flow::Normal)
}

/// `table row`: binds the raw, unsplit text of each non-empty line to
/// `var` (spec §4.7 "table row" — unlike `table csv`, no column parsing
/// happens at all).
async fn exec_table_row<'a>(ctx: &'a mut Ctx<'_>, var: &'a str, path: &'a Expr, body: &'a [Statement]) -> Result<Flow> {
    let path_v = ctx.eval(path)?;
    let path_str = path_v.as_str().ok_or_else(|| crate::rerr!(crate::error::ErrorKind::TypeMismatch, "table row path must be a string"))?;
    let full = ctx.contents_root.join(path_str);
    let text = std::fs::read_to_string(&full).map_err(|e| crate::rerr!(crate::error::ErrorKind::IoError, "reading table row file '{}': {}", full.display(), e))?;
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        ctx.env.set(var, crate::value::Value::String(line.to_string()))?;
        let (flow, stop) = run_loop_body(ctx, body).await?;
        if flow != Flow::Normal {
            return Ok(flow);
        }
        if stop {
            break;
        }
    }
    Ok(Flow::Normal)
}

/// Runs any pending `defer` bodies, LIFO, swallowing (but logging) errors
/// raised inside them — a deferred cleanup failing must never mask the
/// primary result (spec §4.2 "Defer").
pub async fn run_defers(ctx: &mut Ctx<'_>) {
    while let Some(body) = ctx.defer_stack.pop() {
        ctx.env.push_scope();
        let result = execute_block(ctx, &body).await;
        ctx.env.pop_scope();
        if let Err(e) = result {
            tracing::warn!("defer block failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::node::Environment;
    use crate::result::RecordResult;
    use crate::session::SessionMap;

    async fn run(src: &str) -> (Env, RecordResult) {
        let mut env = Env::new();
        let mut sessions = SessionMap::new();
        let mut environment: Option<Environment> = None;
        let mut defer_stack: Vec<Vec<Statement>> = Vec::new();
        let mut result = RecordResult::new("t");
        let stmts = crate::parser::parse(src).unwrap();
        {
            let mut ctx = Ctx {
                env: &mut env,
                sessions: &mut sessions,
                environment: &mut environment,
                defer_stack: &mut defer_stack,
                result: &mut result,
                contents_root: std::path::PathBuf::from("."),
                depth: 0,
            };
            execute_block(&mut ctx, &stmts).await.unwrap();
        }
        (env, result)
    }

    #[tokio::test]
    async fn for_body_shadowing_does_not_leak_to_outer_scope() {
        let (env, _) = run("for i, v in [1, 2, 3]\n  set x 5\nendfor\n").await;
        assert_eq!(env.get("x"), None);
    }

    #[tokio::test]
    async fn for_body_mutating_a_preexisting_name_leaks_to_outer_scope() {
        let (env, _) = run("set x 0\nfor i, v in [1, 2, 3]\n  set x v\nendfor\n").await;
        assert_eq!(env.get("x"), Some(&crate::value::Value::Number(3.0)));
    }

    #[tokio::test]
    async fn if_body_shadowing_does_not_leak_to_outer_scope() {
        let (env, _) = run("if 1 == 1\n  set y 5\nendif\n").await;
        assert_eq!(env.get("y"), None);
    }
}
