//! Expression evaluator (component C, spec §4.3 "Expression semantics").
//!
//! Precedence (loosest to tightest): logical and/or, equality (`==` `!=`
//! `=~` `!~`), comparison, addition, multiplication, unary, primary+chain
//! — already encoded structurally by the parser, so evaluation here is a
//! straight tree walk.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::ast::{BinaryOp, Expr, PrimParam, StrPart, UnaryOp};
use crate::env::{normalize_index, Env};
use crate::error::{ErrorKind, Result};
use crate::rerr;
use crate::value::{CompiledRegex, Function, Value, ValueKey};

const BUILTINS: &[&str] = &[
    "len", "num", "str", "exist", "isdefined", "expr", "split", "join", "trim", "filter", "type", "append",
];

pub struct Evaluator<'a> {
    pub env: &'a mut Env,
}

impl<'a> Evaluator<'a> {
    pub fn new(env: &'a mut Env) -> Self {
        Evaluator { env }
    }

    pub fn eval(&mut self, e: &Expr) -> Result<Value> {
        match e {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(parts) => Ok(Value::String(self.render_parts(parts)?)),
            Expr::RStr(parts) => {
                let rendered = self.render_parts(parts)?;
                let re = regex::Regex::new(&rendered).map_err(|err| rerr!(ErrorKind::ParseError, "invalid regex '{}': {}", rendered, err))?;
                Ok(Value::Regex(CompiledRegex { source: rendered, re: Arc::new(re) }))
            }
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for it in items {
                    out.push(self.eval(it)?);
                }
                Ok(Value::List(out))
            }
            Expr::Map(pairs) => {
                let mut out = IndexMap::new();
                for (k, v) in pairs {
                    let key_val = self.eval(k)?;
                    let key = ValueKey::from_value(&key_val).ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "map key must be a scalar"))?;
                    out.insert(key, self.eval(v)?);
                }
                Ok(Value::Map(out))
            }
            Expr::Variable(name) => self.lookup(name),
            Expr::Unary { op, expr } => self.eval_unary(*op, expr),
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            Expr::Paren(inner) => self.eval(inner),
            Expr::Chain { base, ops } => self.eval_chain(base, ops),
        }
    }

    fn lookup(&mut self, name: &str) -> Result<Value> {
        if let Some(v) = self.env.get(name) {
            return Ok(v.clone());
        }
        if BUILTINS.contains(&name) {
            return Ok(Value::Function(Function { name: builtin_static_name(name) }));
        }
        Err(rerr!(ErrorKind::UnknownName, "undefined variable '{}'", name))
    }

    fn render_parts(&mut self, parts: &[StrPart]) -> Result<String> {
        let mut out = String::new();
        for p in parts {
            match p {
                StrPart::Lit(s) => out.push_str(s),
                StrPart::Interp(e) => {
                    let v = self.eval(e)?;
                    out.push_str(&v.to_string());
                }
            }
        }
        Ok(out)
    }

    fn eval_unary(&mut self, op: UnaryOp, expr: &Expr) -> Result<Value> {
        let v = self.eval(expr)?;
        match op {
            UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
            UnaryOp::Neg => {
                let n = v.as_number().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "cannot negate a {}", v.type_name()))?;
                Ok(Value::Number(-n))
            }
            UnaryOp::Pos => {
                let n = v.as_number().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "unary '+' requires a number, got {}", v.type_name()))?;
                Ok(Value::Number(n))
            }
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Value> {
        match op {
            BinaryOp::And => {
                let l = self.eval(lhs)?;
                if !l.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(rhs)?.is_truthy()))
            }
            BinaryOp::Or => {
                let l = self.eval(lhs)?;
                if l.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(rhs)?.is_truthy()))
            }
            _ => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                self.apply_binary(op, l, r)
            }
        }
    }

    fn apply_binary(&self, op: BinaryOp, l: Value, r: Value) -> Result<Value> {
        use BinaryOp::*;
        match op {
            // A List on the left makes `==`/`!=` existential: true when any
            // element equals the right side (spec §4.3).
            Eq => Ok(Value::Bool(existential_eq(&l, &r))),
            Ne => Ok(Value::Bool(!existential_eq(&l, &r))),
            Match | NotMatch => {
                let hit = match &l {
                    Value::List(items) => {
                        let mut any = false;
                        for item in items {
                            if scalar_match(&item.to_string(), &r)? {
                                any = true;
                                break;
                            }
                        }
                        any
                    }
                    other => scalar_match(&other.to_string(), &r)?,
                };
                Ok(Value::Bool(if op == Match { hit } else { !hit }))
            }
            // Number<->Number only (spec §4.3); strings are not ordered.
            Gt | Ge | Lt | Le => match (&l, &r) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(match op {
                    Gt => a > b,
                    Ge => a >= b,
                    Lt => a < b,
                    Le => a <= b,
                    _ => unreachable!(),
                })),
                _ => Err(rerr!(ErrorKind::TypeMismatch, "cannot compare {} and {}", l.type_name(), r.type_name())),
            },
            Add => match (&l, &r) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::List(a), Value::List(b)) => {
                    let mut out = a.clone();
                    out.extend(b.clone());
                    Ok(Value::List(out))
                }
                // List+scalar appends, scalar+List prepends (spec §4.3).
                (Value::List(a), _) => {
                    let mut out = a.clone();
                    out.push(r.clone());
                    Ok(Value::List(out))
                }
                (_, Value::List(b)) => {
                    let mut out = vec![l.clone()];
                    out.extend(b.clone());
                    Ok(Value::List(out))
                }
                _ if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) => {
                    Ok(Value::String(format!("{}{}", l, r)))
                }
                _ => Err(rerr!(ErrorKind::TypeMismatch, "cannot add {} and {}", l.type_name(), r.type_name())),
            },
            Sub => numeric_op(l, r, |a, b| a - b),
            Mul => numeric_op(l, r, |a, b| a * b),
            Div => {
                let (a, b) = numeric_pair(&l, &r)?;
                if b == 0.0 {
                    return Err(rerr!(ErrorKind::InvalidArgument, "division by zero"));
                }
                Ok(Value::Number(a / b))
            }
            // `%` coerces both operands to integer before doing modulo
            // (spec §4.3); Sub/Mul/Div stay floating point.
            Mod => {
                let (a, b) = numeric_pair(&l, &r)?;
                let (ai, bi) = (a.trunc() as i64, b.trunc() as i64);
                if bi == 0 {
                    return Err(rerr!(ErrorKind::InvalidArgument, "modulo by zero"));
                }
                Ok(Value::Number((ai % bi) as f64))
            }
            And | Or => unreachable!("short-circuited above"),
        }
    }

    fn eval_chain(&mut self, base: &Expr, ops: &[PrimParam]) -> Result<Value> {
        if let Expr::Variable(name) = base {
            if BUILTINS.contains(&name.as_str()) {
                if let Some(PrimParam::Call(args)) = ops.first() {
                    let result = self.call_builtin(name, args)?;
                    return self.apply_ops(result, &ops[1..]);
                }
            }
        }
        let base_val = self.eval(base)?;
        self.apply_ops(base_val, ops)
    }

    fn apply_ops(&mut self, mut val: Value, ops: &[PrimParam]) -> Result<Value> {
        for op in ops {
            val = match op {
                PrimParam::Index(idx) => {
                    let key = self.eval(idx)?;
                    self.do_index(&val, &key)?
                }
                PrimParam::Slice(a, b) => {
                    let start = a.as_ref().map(|e| self.eval(e)).transpose()?;
                    let end = b.as_ref().map(|e| self.eval(e)).transpose()?;
                    self.do_slice(&val, start, end)?
                }
                PrimParam::Call(args) => match &val {
                    Value::Function(f) => self.call_builtin(&f.name.to_string(), args)?,
                    other => return Err(rerr!(ErrorKind::TypeMismatch, "{} is not callable", other.type_name())),
                },
            };
        }
        Ok(val)
    }

    fn do_index(&self, val: &Value, key: &Value) -> Result<Value> {
        match val {
            Value::List(list) => {
                let i = key.as_number().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "list index must be a number"))? as i64;
                let idx = normalize_index(i, list.len())?;
                list.get(idx).cloned().ok_or_else(|| rerr!(ErrorKind::InvalidArgument, "index {} out of bounds", i))
            }
            Value::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = key.as_number().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "string index must be a number"))? as i64;
                let idx = normalize_index(i, chars.len())?;
                chars.get(idx).map(|c| Value::String(c.to_string())).ok_or_else(|| rerr!(ErrorKind::InvalidArgument, "index {} out of bounds", i))
            }
            Value::Map(map) => {
                let k = ValueKey::from_value(key).ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "invalid map key"))?;
                map.get(&k).cloned().ok_or_else(|| rerr!(ErrorKind::UnknownName, "no such key '{}' in map", k))
            }
            other => Err(rerr!(ErrorKind::TypeMismatch, "cannot index into a {}", other.type_name())),
        }
    }

    fn do_slice(&self, val: &Value, start: Option<Value>, end: Option<Value>) -> Result<Value> {
        let to_idx = |v: &Option<Value>, len: usize, default: usize| -> Result<usize> {
            match v {
                None => Ok(default),
                Some(v) => {
                    let n = v.as_number().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "slice bound must be a number"))? as i64;
                    let raw = if n < 0 { n + len as i64 } else { n };
                    Ok(raw.clamp(0, len as i64) as usize)
                }
            }
        };
        match val {
            Value::List(list) => {
                let s = to_idx(&start, list.len(), 0)?;
                let e = to_idx(&end, list.len(), list.len())?;
                Ok(Value::List(if s < e { list[s..e].to_vec() } else { Vec::new() }))
            }
            Value::String(string) => {
                let chars: Vec<char> = string.chars().collect();
                let s = to_idx(&start, chars.len(), 0)?;
                let e = to_idx(&end, chars.len(), chars.len())?;
                Ok(Value::String(if s < e { chars[s..e].iter().collect() } else { String::new() }))
            }
            other => Err(rerr!(ErrorKind::TypeMismatch, "cannot slice a {}", other.type_name())),
        }
    }

    /// `exist`/`isdefined` inspect a raw identifier rather than a value, so
    /// their argument is special-cased ahead of the normal evaluated-args path.
    fn call_builtin(&mut self, name: &str, args: &[Expr]) -> Result<Value> {
        match name {
            "exist" | "isdefined" => {
                let ident = match args.first() {
                    Some(Expr::Variable(n)) => n.clone(),
                    Some(other) => return Err(rerr!(ErrorKind::InvalidArgument, "{}() requires a bare variable name, got {:?}", name, other)),
                    None => return Err(rerr!(ErrorKind::InvalidArgument, "{}() requires one argument", name)),
                };
                Ok(Value::Bool(self.env.get(&ident).is_some()))
            }
            "expr" => {
                let s = self.eval_single(args, name)?.to_string();
                let parsed = crate::parser::parse_expr_public(&s)?;
                self.eval(&parsed)
            }
            "len" => {
                let v = self.eval_single(args, name)?;
                let n = match &v {
                    Value::String(s) => s.chars().count(),
                    Value::List(l) => l.len(),
                    Value::Map(m) => m.len(),
                    other => return Err(rerr!(ErrorKind::TypeMismatch, "len() does not apply to {}", other.type_name())),
                };
                Ok(Value::Number(n as f64))
            }
            "num" => {
                let v = self.eval_single(args, name)?;
                let n = match &v {
                    Value::Number(n) => *n,
                    Value::Bool(b) => if *b { 1.0 } else { 0.0 },
                    Value::String(s) => s.trim().parse::<f64>().map_err(|_| rerr!(ErrorKind::InvalidArgument, "cannot convert '{}' to a number", s))?,
                    other => return Err(rerr!(ErrorKind::TypeMismatch, "num() does not apply to {}", other.type_name())),
                };
                Ok(Value::Number(n))
            }
            "str" => {
                let v = self.eval_single(args, name)?;
                Ok(Value::String(v.to_string()))
            }
            "type" => {
                let v = self.eval_single(args, name)?;
                Ok(Value::String(v.type_name().to_string()))
            }
            "split" => {
                if args.len() < 2 {
                    return Err(rerr!(ErrorKind::InvalidArgument, "split() requires a value and a delimiter"));
                }
                let v = self.eval(&args[0])?;
                let delim = self.eval(&args[1])?;
                let limit = match args.get(2) {
                    Some(e) => {
                        let n = self.eval(e)?;
                        let n = n.as_number().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "split() limit must be a number, got {}", n.type_name()))?;
                        Some(n as usize)
                    }
                    None => None,
                };
                split_recursive(&v, &delim, limit)
            }
            "join" => {
                if args.len() < 2 {
                    return Err(rerr!(ErrorKind::InvalidArgument, "join() requires a list and a delimiter"));
                }
                let v = self.eval(&args[0])?;
                let delim = self.eval(&args[1])?.to_string();
                let list = v.as_list().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "join() requires a list, got {}", v.type_name()))?;
                let parts: Vec<String> = list.iter().map(|x| x.to_string()).collect();
                Ok(Value::String(parts.join(&delim)))
            }
            "trim" => {
                let v = self.eval_single(args, name)?;
                trim_recursive(&v)
            }
            "filter" => {
                if args.len() < 3 {
                    return Err(rerr!(ErrorKind::InvalidArgument, "filter() requires a container, an operator, and a value"));
                }
                let container = self.eval(&args[0])?;
                let op = self.eval(&args[1])?.to_string();
                let rhs = self.eval(&args[2])?;
                let key_mode = match args.get(3) {
                    Some(e) => self.eval(e)?.is_truthy(),
                    None => false,
                };
                filter_recursive(&container, &op, &rhs, key_mode)
            }
            "append" => {
                if args.len() < 2 {
                    return Err(rerr!(ErrorKind::InvalidArgument, "append() requires a list and a value"));
                }
                let v = self.eval(&args[0])?;
                let item = self.eval(&args[1])?;
                let mut list = v.as_list().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "append() requires a list, got {}", v.type_name()))?.to_vec();
                list.push(item);
                Ok(Value::List(list))
            }
            other => Err(rerr!(ErrorKind::UnknownName, "unknown function '{}'", other)),
        }
    }

    fn eval_single(&mut self, args: &[Expr], fname: &str) -> Result<Value> {
        args.first().ok_or_else(|| rerr!(ErrorKind::InvalidArgument, "{}() requires one argument", fname)).and_then(|e| self.eval(e))
    }
}

fn numeric_pair(l: &Value, r: &Value) -> Result<(f64, f64)> {
    let a = l.as_number().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "expected a number, got {}", l.type_name()))?;
    let b = r.as_number().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "expected a number, got {}", r.type_name()))?;
    Ok((a, b))
}

fn numeric_op(l: Value, r: Value, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
    let (a, b) = numeric_pair(&l, &r)?;
    Ok(Value::Number(f(a, b)))
}

/// `==`/`!=` are existential when the left side is a List (spec §4.3): true
/// as soon as any element equals the right side.
fn existential_eq(l: &Value, r: &Value) -> bool {
    match l {
        Value::List(items) => items.iter().any(|x| x == r),
        _ => l == r,
    }
}

/// `=~`/`!~` against a single (non-List) left side: a Regex right side
/// matches, a String right side is substring containment (spec §4.3 — the
/// right side is never compiled as a regex just because it's a string).
fn scalar_match(hay: &str, needle: &Value) -> Result<bool> {
    match needle {
        Value::Regex(cr) => Ok(cr.re.is_match(hay)),
        Value::String(s) => Ok(hay.contains(s.as_str())),
        other => Err(rerr!(ErrorKind::TypeMismatch, "right side of match must be a string or regex, got {}", other.type_name())),
    }
}

/// Splitting a list recurses into each element and flattens one level
/// (grounded on `original_source/discovery/record3/functions.go` FuncSplit,
/// which applies to list-of-strings inputs the same way as a single string).
/// `limit`, when given, caps the number of pieces produced from a single
/// string the way `strings.SplitN` does: the final piece keeps whatever
/// delimiter occurrences remain unsplit.
fn split_recursive(v: &Value, delim: &Value, limit: Option<usize>) -> Result<Value> {
    match v {
        Value::String(s) => {
            let parts: Vec<Value> = if let Value::Regex(cr) = delim {
                match limit {
                    Some(n) if n > 0 => cr.re.splitn(s, n).map(|p| Value::String(p.to_string())).collect(),
                    _ => cr.re.split(s).map(|p| Value::String(p.to_string())).collect(),
                }
            } else {
                let d = delim.to_string();
                if d.is_empty() {
                    s.chars().map(|c| Value::String(c.to_string())).collect()
                } else {
                    match limit {
                        Some(n) if n > 0 => s.splitn(n, d.as_str()).map(|p| Value::String(p.to_string())).collect(),
                        _ => s.split(d.as_str()).map(|p| Value::String(p.to_string())).collect(),
                    }
                }
            };
            Ok(Value::List(parts))
        }
        Value::List(items) => {
            let mut out = Vec::new();
            for item in items {
                match split_recursive(item, delim, limit)? {
                    Value::List(mut inner) => out.append(&mut inner),
                    other => out.push(other),
                }
            }
            Ok(Value::List(out))
        }
        other => Err(rerr!(ErrorKind::TypeMismatch, "split() does not apply to {}", other.type_name())),
    }
}

fn trim_recursive(v: &Value) -> Result<Value> {
    match v {
        Value::String(s) => Ok(Value::String(s.trim().to_string())),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(trim_recursive(item)?);
            }
            Ok(Value::List(out))
        }
        Value::Map(map) => {
            let mut out = IndexMap::new();
            for (k, val) in map {
                out.insert(k.clone(), trim_recursive(val)?);
            }
            Ok(Value::Map(out))
        }
        other => Err(rerr!(ErrorKind::TypeMismatch, "trim() does not apply to {}", other.type_name())),
    }
}

/// Tests one scalar value against `op`/`rhs`. `==`/`!=` use structural
/// equality; `=~`/`!~` follow [`scalar_match`]'s string-vs-regex rule;
/// ordering operators require both sides to be Numbers (spec §4.3, same
/// restriction as the `>`/`>=`/`<`/`<=` binary operators).
fn filter_matches(op: &str, lhs: &Value, rhs: &Value) -> Result<bool> {
    match op {
        "==" => Ok(lhs == rhs),
        "!=" => Ok(lhs != rhs),
        "=~" | "!~" => {
            let hay = lhs.to_string();
            let hit = scalar_match(&hay, rhs)?;
            Ok(if op == "=~" { hit } else { !hit })
        }
        ">" | ">=" | "<" | "<=" => {
            let a = lhs.as_number().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "filter() comparison requires a number, got {}", lhs.type_name()))?;
            let b = rhs.as_number().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "filter() comparison requires a number, got {}", rhs.type_name()))?;
            Ok(match op {
                ">" => a > b,
                ">=" => a >= b,
                "<" => a < b,
                "<=" => a <= b,
                _ => unreachable!(),
            })
        }
        other => Err(rerr!(ErrorKind::InvalidArgument, "unknown filter() operator '{}'", other)),
    }
}

/// Walks a List or Map, keeping elements whose value matches `op`/`rhs`
/// (spec §4.3 "filter"); nested Lists/Maps recurse instead of being tested
/// directly. With `key_mode` set, a Map's keys are tested (and kept) instead
/// of its values.
fn filter_recursive(v: &Value, op: &str, rhs: &Value, key_mode: bool) -> Result<Value> {
    match v {
        Value::List(items) => {
            let mut out = Vec::new();
            for item in items {
                match item {
                    Value::List(_) | Value::Map(_) => out.push(filter_recursive(item, op, rhs, key_mode)?),
                    scalar if filter_matches(op, scalar, rhs)? => out.push(scalar.clone()),
                    _ => {}
                }
            }
            Ok(Value::List(out))
        }
        Value::Map(map) => {
            let mut out = Vec::new();
            for (k, val) in map {
                match val {
                    Value::List(_) | Value::Map(_) => out.push(filter_recursive(val, op, rhs, key_mode)?),
                    scalar => {
                        let tested = if key_mode { k.to_value() } else { scalar.clone() };
                        if filter_matches(op, &tested, rhs)? {
                            out.push(tested);
                        }
                    }
                }
            }
            Ok(Value::List(out))
        }
        other => Err(rerr!(ErrorKind::TypeMismatch, "filter() requires a list or map, got {}", other.type_name())),
    }
}

fn builtin_static_name(name: &str) -> &'static str {
    match name {
        "len" => "len",
        "num" => "num",
        "str" => "str",
        "exist" => "exist",
        "isdefined" => "isdefined",
        "expr" => "expr",
        "split" => "split",
        "join" => "join",
        "trim" => "trim",
        "filter" => "filter",
        "type" => "type",
        "append" => "append",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn eval_stmt_expr(src: &str) -> Value {
        let stmts = parse(src).unwrap();
        let mut env = Env::new();
        let mut last = Value::Null;
        for s in stmts {
            if let crate::ast::Statement::Check { expr, .. } = s {
                last = Evaluator::new(&mut env).eval(&expr).unwrap();
            }
        }
        last
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(eval_stmt_expr("check 1 + 2 * 3\n"), Value::Number(7.0));
    }

    #[test]
    fn string_concatenation_via_plus() {
        assert_eq!(eval_stmt_expr("check \"a\" + \"b\"\n"), Value::String("ab".into()));
    }

    #[test]
    fn regex_match_operator() {
        let stmts = parse("check \"abc123\" =~ r\"[0-9]+\"\n").unwrap();
        let mut env = Env::new();
        for s in stmts {
            if let crate::ast::Statement::Check { expr, .. } = s {
                let v = Evaluator::new(&mut env).eval(&expr).unwrap();
                assert_eq!(v, Value::Bool(true));
            }
        }
    }

    #[test]
    fn negative_index_from_end() {
        let mut env = Env::new();
        env.set("l", Value::List(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)])).unwrap();
        let stmts = parse("check l[-1]\n").unwrap();
        for s in stmts {
            if let crate::ast::Statement::Check { expr, .. } = s {
                let v = Evaluator::new(&mut env).eval(&expr).unwrap();
                assert_eq!(v, Value::Number(3.0));
            }
        }
    }

    #[test]
    fn split_and_join_round_trip() {
        let mut env = Env::new();
        let stmts = parse("check join(split(\"a,b,c\", \",\"), \"-\")\n").unwrap();
        for s in stmts {
            if let crate::ast::Statement::Check { expr, .. } = s {
                let v = Evaluator::new(&mut env).eval(&expr).unwrap();
                assert_eq!(v, Value::String("a-b-c".into()));
            }
        }
    }

    #[test]
    fn exist_checks_identifier_without_evaluating() {
        let mut env = Env::new();
        let stmts = parse("check exist(undefined_var)\n").unwrap();
        for s in stmts {
            if let crate::ast::Statement::Check { expr, .. } = s {
                let v = Evaluator::new(&mut env).eval(&expr).unwrap();
                assert_eq!(v, Value::Bool(false));
            }
        }
    }

    #[test]
    fn eq_is_existential_over_a_list_left_side() {
        assert_eq!(eval_stmt_expr("check [\"a\", \"b\"] == \"a\"\n"), Value::Bool(true));
        assert_eq!(eval_stmt_expr("check [\"a\", \"b\"] == \"c\"\n"), Value::Bool(false));
        assert_eq!(eval_stmt_expr("check [\"a\", \"b\"] != \"c\"\n"), Value::Bool(true));
    }

    #[test]
    fn match_string_rhs_is_substring_not_regex() {
        assert_eq!(eval_stmt_expr("check \"abc.123\" =~ \"c.1\"\n"), Value::Bool(true));
        assert_eq!(eval_stmt_expr("check \"abcX123\" =~ \"c.1\"\n"), Value::Bool(false));
    }

    #[test]
    fn match_is_existential_over_a_list_left_side() {
        assert_eq!(eval_stmt_expr("check [\"abc\", \"xyz\"] =~ r\"a.*\"\n"), Value::Bool(true));
        assert_eq!(eval_stmt_expr("check [\"abc\", \"xyz\"] !~ r\"^q\"\n"), Value::Bool(true));
    }

    #[test]
    fn ordering_operators_reject_strings() {
        let stmts = parse("check \"a\" < \"b\"\n").unwrap();
        let mut env = Env::new();
        for s in stmts {
            if let crate::ast::Statement::Check { expr, .. } = s {
                assert!(Evaluator::new(&mut env).eval(&expr).is_err());
            }
        }
    }

    #[test]
    fn add_appends_and_prepends_around_a_list() {
        assert_eq!(eval_stmt_expr("check [1, 2] + 3\n"), Value::List(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]));
        assert_eq!(eval_stmt_expr("check 0 + [1, 2]\n"), Value::List(vec![Value::Number(0.0), Value::Number(1.0), Value::Number(2.0)]));
    }

    #[test]
    fn mod_truncates_to_integer_first() {
        assert_eq!(eval_stmt_expr("check 5.7 % 2\n"), Value::Number(1.0));
    }

    #[test]
    fn split_honors_a_limit_argument() {
        assert_eq!(
            eval_stmt_expr("check split(\"a,b,c\", \",\", 2)\n"),
            Value::List(vec![Value::String("a".into()), Value::String("b,c".into())])
        );
    }

    #[test]
    fn filter_keeps_elements_matching_an_operator() {
        assert_eq!(
            eval_stmt_expr("check filter([1, 2, 3, 4], \">\", 2)\n"),
            Value::List(vec![Value::Number(3.0), Value::Number(4.0)])
        );
        assert_eq!(
            eval_stmt_expr("check filter([\"ax\", \"by\", \"az\"], \"=~\", r\"^a\")\n"),
            Value::List(vec![Value::String("ax".into()), Value::String("az".into())])
        );
    }

    #[test]
    fn trim_recurses_into_maps() {
        let v = eval_stmt_expr("check trim({\"a\": \"  x  \"})\n");
        match v {
            Value::Map(m) => assert_eq!(m.get(&crate::value::ValueKey::String("a".into())), Some(&Value::String("x".into()))),
            other => panic!("expected a map, got {:?}", other),
        }
    }
}
