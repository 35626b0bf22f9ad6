use crate::ast::{Expr, PrimParam};
use crate::control::Flow;
use crate::env::resolve_index_keys;
use crate::error::Result;
use crate::eval::Evaluator;

use super::Ctx;

pub fn exec_set(ctx: &mut Ctx, name: &str, index: Option<&[PrimParam]>, value: &Expr) -> Result<Flow> {
    match index {
        None => {
            let v = Evaluator::new(ctx.env).eval(value)?;
            ctx.env.set(name, v)?;
        }
        Some(path) => {
            let keys = resolve_index_keys(path, |e| Evaluator::new(ctx.env).eval(e))?;
            let v = Evaluator::new(ctx.env).eval(value)?;
            ctx.env.assign_indexed(name, &keys, v)?;
        }
    }
    Ok(Flow::Normal)
}

pub fn exec_seta(ctx: &mut Ctx, name: &str, index: &[PrimParam], value: &Expr) -> Result<Flow> {
    let keys = resolve_index_keys(index, |e| Evaluator::new(ctx.env).eval(e))?;
    let v = Evaluator::new(ctx.env).eval(value)?;
    ctx.env.assign_indexed(name, &keys, v)?;
    Ok(Flow::Normal)
}

pub fn exec_unset(ctx: &mut Ctx, name: &str, index: Option<&[PrimParam]>) -> Result<Flow> {
    match index {
        None => ctx.env.del(name)?,
        Some(path) => {
            let keys = resolve_index_keys(path, |e| Evaluator::new(ctx.env).eval(e))?;
            ctx.env.unset_indexed(name, &keys)?;
        }
    }
    Ok(Flow::Normal)
}
