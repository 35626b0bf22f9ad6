//! Variable environment: a stack of lexical scopes (component C, spec §4.4
//! "Environment & scoping").
//!
//! `If`/`For`/`Table`/`Defer` bodies push a transparent frame: reads and
//! mutations of already-existing variables pass straight through to outer
//! scopes, but a variable `set` for the first time inside the frame is
//! local and vanishes when the frame pops (the for-body shadowing rule).
//! `require` pushes an opaque, flattened frame instead — seeded with a copy
//! of everything currently visible, so a required record can read the
//! caller's variables but none of its own mutations ever leak back once
//! popped (spec §9 "require scope snapshot semantics").

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::ast::{Expr, PrimParam};
use crate::error::{ErrorKind, Result};
use crate::rerr;
use crate::value::{Value, ValueKey};

#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: HashMap<String, Value>,
    /// Names set via a `load ini` file; `set`/`unset` on these are rejected
    /// unless routed through `del_with_load_path` (spec §4.6 "Load").
    load_protected: HashSet<String>,
    /// Marks a `require` snapshot frame: a scan for a name stops here
    /// instead of continuing into the caller's frames underneath.
    boundary: bool,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }
}

/// The live scope stack a record executes against.
pub struct Env {
    stack: Vec<Scope>,
}

impl Env {
    pub fn new() -> Self {
        Env { stack: vec![Scope::new()] }
    }

    /// The frames a name lookup may see right now: from the innermost frame
    /// down to and including the nearest `require` boundary, or down to the
    /// bottom of the stack if there is none.
    fn visible_indices(&self) -> Vec<usize> {
        let len = self.stack.len();
        let mut start = 0;
        for i in (0..len).rev() {
            if self.stack[i].boundary {
                start = i;
                break;
            }
        }
        (start..len).rev().collect()
    }

    /// Pushes a transparent block scope (spec §4.4: "new scopes are pushed
    /// at the start of If/For/Table/Defer body execution").
    pub fn push_scope(&mut self) {
        self.stack.push(Scope::new());
    }

    pub fn pop_scope(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Pushes an opaque frame seeded with a flattened snapshot of every
    /// variable currently visible (innermost binding wins).
    pub fn push_snapshot(&mut self) {
        let mut vars = HashMap::new();
        let mut load_protected = HashSet::new();
        for i in self.visible_indices() {
            for (k, v) in &self.stack[i].vars {
                vars.entry(k.clone()).or_insert_with(|| v.clone());
            }
            for k in &self.stack[i].load_protected {
                load_protected.insert(k.clone());
            }
        }
        self.stack.push(Scope { vars, load_protected, boundary: true });
    }

    pub fn pop_snapshot(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        for i in self.visible_indices() {
            if let Some(v) = self.stack[i].vars.get(name) {
                return Some(v);
            }
        }
        None
    }

    /// Mutates the nearest visible frame already holding `name`; otherwise
    /// creates it fresh in the innermost frame (spec §4.4's "mutate in the
    /// outer scope if the name already exists there, else create locally").
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        for i in self.visible_indices() {
            if self.stack[i].vars.contains_key(name) {
                if self.stack[i].load_protected.contains(name) {
                    return Err(rerr!(ErrorKind::InvalidState, "variable '{}' is load-protected; use unload first", name));
                }
                self.stack[i].vars.insert(name.to_string(), value);
                return Ok(());
            }
        }
        let top = self.stack.len() - 1;
        if self.stack[top].load_protected.contains(name) {
            return Err(rerr!(ErrorKind::InvalidState, "variable '{}' is load-protected; use unload first", name));
        }
        self.stack[top].vars.insert(name.to_string(), value);
        Ok(())
    }

    /// Used only by the `load` statement to populate protected bindings in
    /// the current innermost frame.
    pub fn set_load_protected(&mut self, name: &str, value: Value) {
        let top = self.stack.len() - 1;
        self.stack[top].vars.insert(name.to_string(), value);
        self.stack[top].load_protected.insert(name.to_string());
    }

    pub fn del(&mut self, name: &str) -> Result<()> {
        for i in self.visible_indices() {
            if self.stack[i].vars.contains_key(name) {
                if self.stack[i].load_protected.contains(name) {
                    return Err(rerr!(ErrorKind::InvalidState, "variable '{}' is load-protected; use unload first", name));
                }
                self.stack[i].vars.remove(name);
                return Ok(());
            }
        }
        Ok(())
    }

    /// Removes a load-protected binding wherever it's visible; only the
    /// `unload` statement calls this.
    pub fn del_with_load_path(&mut self, name: &str) {
        for i in self.visible_indices() {
            if self.stack[i].vars.contains_key(name) {
                self.stack[i].vars.remove(name);
                self.stack[i].load_protected.remove(name);
                return;
            }
        }
    }

    /// Walks an index chain to mutate a nested container in place (spec
    /// §4.2 "Seta"). `keys` must already be evaluated (callers resolve
    /// index expressions against `self` before borrowing it mutably here);
    /// every segment but the last must resolve to a List or Map.
    pub fn assign_indexed(&mut self, name: &str, keys: &[Value], value: Value) -> Result<()> {
        let mut root = self.get(name).cloned().unwrap_or(Value::Null);
        set_path(&mut root, keys, value)?;
        self.set(name, root)
    }

    pub fn unset_indexed(&mut self, name: &str, keys: &[Value]) -> Result<()> {
        let mut root = self.get(name).cloned().unwrap_or(Value::Null);
        remove_path(&mut root, keys)?;
        self.set(name, root)
    }
}

/// Resolves a `set`/`seta`/`unset` index chain (only bare `[expr]` segments
/// are assignable; slices and calls are rejected) into evaluated keys.
pub fn resolve_index_keys(path: &[PrimParam], mut eval_expr: impl FnMut(&Expr) -> Result<Value>) -> Result<Vec<Value>> {
    path.iter()
        .map(|seg| match seg {
            PrimParam::Index(e) => eval_expr(e),
            PrimParam::Slice(_, _) => Err(rerr!(ErrorKind::InvalidArgument, "cannot assign through a slice")),
            PrimParam::Call(_) => Err(rerr!(ErrorKind::InvalidArgument, "cannot assign through a call")),
        })
        .collect()
}

fn set_path(target: &mut Value, keys: &[Value], value: Value) -> Result<()> {
    let Some((key, rest)) = keys.split_first() else {
        *target = value;
        return Ok(());
    };
    match target {
        Value::List(list) => {
            let i = key.as_number().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "list index must be a number"))? as i64;
            let idx = normalize_index(i, list.len())?;
            if idx == list.len() {
                list.push(Value::Null);
            }
            set_path(&mut list[idx], rest, value)
        }
        Value::Map(map) => {
            let k = ValueKey::from_value(key).ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "invalid map key"))?;
            let entry = map.entry(k).or_insert(Value::Null);
            set_path(entry, rest, value)
        }
        Value::Null => {
            *target = Value::Map(IndexMap::new());
            set_path(target, keys, value)
        }
        other => Err(rerr!(ErrorKind::TypeMismatch, "cannot index into a {}", other.type_name())),
    }
}

fn remove_path(target: &mut Value, keys: &[Value]) -> Result<()> {
    let Some((key, rest)) = keys.split_first() else {
        *target = Value::Null;
        return Ok(());
    };
    if rest.is_empty() {
        return match target {
            Value::List(list) => {
                let i = key.as_number().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "list index must be a number"))? as i64;
                let idx = normalize_index(i, list.len())?;
                if idx < list.len() {
                    list.remove(idx);
                }
                Ok(())
            }
            Value::Map(map) => {
                let k = ValueKey::from_value(key).ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "invalid map key"))?;
                map.shift_remove(&k);
                Ok(())
            }
            other => Err(rerr!(ErrorKind::TypeMismatch, "cannot unset from a {}", other.type_name())),
        };
    }
    match target {
        Value::List(list) => {
            let i = key.as_number().ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "list index must be a number"))? as i64;
            let idx = normalize_index(i, list.len())?;
            remove_path(&mut list[idx], rest)
        }
        Value::Map(map) => {
            let k = ValueKey::from_value(key).ok_or_else(|| rerr!(ErrorKind::TypeMismatch, "invalid map key"))?;
            let entry = map.get_mut(&k).ok_or_else(|| rerr!(ErrorKind::UnknownName, "no such key"))?;
            remove_path(entry, rest)
        }
        other => Err(rerr!(ErrorKind::TypeMismatch, "cannot index into a {}", other.type_name())),
    }
}

/// Negative indices count from the end (spec §4.3 "Indexing"); one-past-end
/// is allowed for `seta` appends.
pub fn normalize_index(i: i64, len: usize) -> Result<usize> {
    let idx = if i < 0 { i + len as i64 } else { i };
    if idx < 0 || idx as usize > len {
        return Err(rerr!(ErrorKind::InvalidArgument, "index {} out of bounds for length {}", i, len));
    }
    Ok(idx as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_mutation_does_not_leak_back() {
        let mut env = Env::new();
        env.set("x", Value::Number(1.0)).unwrap();
        env.push_snapshot();
        env.set("x", Value::Number(2.0)).unwrap();
        env.pop_snapshot();
        assert_eq!(env.get("x"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn block_scope_set_on_new_name_does_not_leak_to_outer() {
        let mut env = Env::new();
        env.set("x", Value::Number(1.0)).unwrap();
        env.push_scope();
        env.set("y", Value::Number(5.0)).unwrap();
        assert_eq!(env.get("y"), Some(&Value::Number(5.0)));
        env.pop_scope();
        assert_eq!(env.get("y"), None);
        assert_eq!(env.get("x"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn block_scope_set_on_existing_name_mutates_outer() {
        let mut env = Env::new();
        env.set("x", Value::Number(1.0)).unwrap();
        env.push_scope();
        env.set("x", Value::Number(2.0)).unwrap();
        env.pop_scope();
        assert_eq!(env.get("x"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn snapshot_frame_does_not_see_through_new_names_set_after_it() {
        let mut env = Env::new();
        env.push_snapshot();
        env.set("inner_only", Value::Number(1.0)).unwrap();
        env.pop_snapshot();
        assert_eq!(env.get("inner_only"), None);
    }

    #[test]
    fn load_protected_rejects_plain_set() {
        let mut env = Env::new();
        env.set_load_protected("h", Value::String("v".into()));
        assert!(env.set("h", Value::String("x".into())).is_err());
        env.del_with_load_path("h");
        assert!(env.set("h", Value::String("x".into())).is_ok());
    }

    #[test]
    fn seta_appends_one_past_end() {
        let mut env = Env::new();
        env.set("list", Value::List(vec![Value::Number(1.0)])).unwrap();
        env.assign_indexed("list", &[Value::Number(1.0)], Value::Number(2.0)).unwrap();
        assert_eq!(env.get("list"), Some(&Value::List(vec![Value::Number(1.0), Value::Number(2.0)])));
    }
}
