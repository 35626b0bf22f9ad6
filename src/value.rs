//! The dynamic value domain the rcmd evaluator manipulates.
//!
//! Mirrors the tagged union described in spec §3: Null, Bool, Number,
//! String, Regex, List, Map, Function. Equality is structural; Map keys
//! are compared by value.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;

/// A built-in procedure reference (len, split, filter, ...).
#[derive(Clone)]
pub struct Function {
    pub name: &'static str,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.name)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// A compiled regex, carried alongside its source text so it can be
/// re-stringified (needed by the ToString-then-reparse property in §8).
#[derive(Clone)]
pub struct CompiledRegex {
    pub source: String,
    pub re: Arc<Regex>,
}

impl fmt::Debug for CompiledRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Regex({:?})", self.source)
    }
}

impl PartialEq for CompiledRegex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Regex(CompiledRegex),
    List(Vec<Value>),
    Map(IndexMap<ValueKey, Value>),
    Function(Function),
}

/// Map keys must be hashable/orderable; rcmd restricts keys to the scalar
/// variants (String, Number, Bool, Null) per spec §3 "Maps use
/// value-equality keys".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKey {
    Null,
    Bool(bool),
    /// Stored as bits so it can implement Eq/Hash; Number keys are rare but
    /// legal (e.g. `{1: "a"}`).
    Number(u64),
    String(String),
}

impl ValueKey {
    pub fn from_value(v: &Value) -> Option<ValueKey> {
        match v {
            Value::Null => Some(ValueKey::Null),
            Value::Bool(b) => Some(ValueKey::Bool(*b)),
            Value::Number(n) => Some(ValueKey::Number(n.to_bits())),
            Value::String(s) => Some(ValueKey::String(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ValueKey::Null => Value::Null,
            ValueKey::Bool(b) => Value::Bool(*b),
            ValueKey::Number(bits) => Value::Number(f64::from_bits(*bits)),
            ValueKey::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Regex(r) => write!(f, "{}", r.source),
            Value::List(_) | Value::Map(_) => write!(f, "{}", self.to_json_string()),
            Value::Function(fun) => write!(f, "<function {}>", fun.name),
        }
    }
}

/// Numbers print without trailing zeros per spec §4.3 "String interpolation".
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if n == (n as i64) as f64 && n.abs() < 1e18 {
        format!("{}", n as i64)
    } else {
        let s = format!("{}", n);
        s
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Regex(_) => "regex",
            Value::List(_) => "array",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
        }
    }

    /// Truthiness used by `if`/`elseif` conditions (spec §4.7).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n > 0.0,
            Value::List(l) => !l.is_empty(),
            Value::Regex(_) => true,
            Value::Null => false,
            Value::Map(m) => !m.is_empty(),
            Value::Function(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    fn escape_json_string(s: &str) -> String {
        let mut out = String::from("\"");
        for ch in s.chars() {
            match ch {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
        }
        out.push('"');
        out
    }

    /// Compact JSON serialization used by `results.json` evidence fields.
    pub fn to_json_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => Self::escape_json_string(s),
            Value::Regex(r) => Self::escape_json_string(&r.source),
            Value::Function(fun) => Self::escape_json_string(fun.name),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_json_string()).collect();
                format!("[{}]", parts.join(","))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}:{}", Self::escape_json_string(&k.to_string()), v.to_json_string()))
                    .collect();
                format!("{{{}}}", parts.join(","))
            }
        }
    }

    pub fn to_serde_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::json!(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Regex(r) => serde_json::Value::String(r.source.clone()),
            Value::Function(fun) => serde_json::Value::String(fun.name.to_string()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.to_serde_json()).collect())
            }
            Value::Map(map) => {
                let obj: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_serde_json()))
                    .collect();
                serde_json::Value::Object(obj)
            }
        }
    }

    pub fn from_serde_json(v: serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::List(arr.into_iter().map(Value::from_serde_json).collect())
            }
            serde_json::Value::Object(obj) => {
                let mut map = IndexMap::new();
                for (k, v) in obj {
                    map.insert(ValueKey::String(k), Value::from_serde_json(v));
                }
                Value::Map(map)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_spec() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::Number(0.5).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::String("x".into()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
    }

    #[test]
    fn number_formatting_has_no_trailing_zeros() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(3.5), "3.5");
    }

    #[test]
    fn structural_equality_for_maps() {
        let mut a = IndexMap::new();
        a.insert(ValueKey::String("k".into()), Value::Number(1.0));
        let mut b = IndexMap::new();
        b.insert(ValueKey::String("k".into()), Value::Number(1.0));
        assert_eq!(Value::Map(a), Value::Map(b));
    }
}
