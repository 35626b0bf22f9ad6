//! Minimal ini-format reader shared by `environment`/`load ini` statements
//! (spec §4.4, §4.6). Ambient glue, not domain logic — no crate in the
//! corpus parses this format, so it's hand-written rather than borrowed.

use std::collections::HashMap;

use crate::error::{ErrorKind, Result};
use crate::rerr;

/// Returns sections in file order as `(section_name, key -> value)`.
pub fn parse_ini(text: &str) -> Result<Vec<(String, HashMap<String, String>)>> {
    let mut sections: Vec<(String, HashMap<String, String>)> = Vec::new();
    for (lineno, raw_line) in text.lines().enumerate() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('[') {
            let name = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')).ok_or_else(|| {
                rerr!(ErrorKind::ParseError, "malformed section header at line {}: {}", lineno + 1, raw_line)
            })?;
            sections.push((name.trim().to_string(), HashMap::new()));
            continue;
        }
        let Some((key, val)) = line.split_once('=') else {
            return Err(rerr!(ErrorKind::ParseError, "expected 'key=value' at line {}: {}", lineno + 1, raw_line));
        };
        let Some((_, fields)) = sections.last_mut() else {
            return Err(rerr!(ErrorKind::ParseError, "key/value before any [section] at line {}", lineno + 1));
        };
        fields.insert(key.trim().to_string(), val.trim().to_string());
    }
    Ok(sections)
}

fn strip_comment(line: &str) -> &str {
    match line.find(';').or_else(|| line.find('#')) {
        Some(i) => &line[..i],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_sections_in_order() {
        let ini = "[a]\nkind=ssh\nhost=1.2.3.4\n\n[b]\nkind=linux\nhost=5.6.7.8\n";
        let sections = parse_ini(ini).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].0, "a");
        assert_eq!(sections[0].1.get("host").unwrap(), "1.2.3.4");
        assert_eq!(sections[1].0, "b");
    }

    #[test]
    fn rejects_key_before_section() {
        assert!(parse_ini("host=1.2.3.4\n").is_err());
    }

    #[test]
    fn strips_trailing_comments() {
        let sections = parse_ini("[a]\nhost=1.2.3.4 ; primary\n").unwrap();
        assert_eq!(sections[0].1.get("host").unwrap(), "1.2.3.4");
    }
}
