//! rcmd lexer (component B, spec §4.1).
//!
//! Line-oriented, single pass. Produces a flat token stream with explicit
//! `Newline` tokens marking statement boundaries; compound statements are
//! recognized by the parser reading lines until a terminator keyword line.

use crate::error::{Error, ErrorKind};
use crate::rerr;

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    Ident(String),
    Number(f64),
    Str(String),
    RStr(String),
    Op(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Comment(String),
    Newline,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokKind,
    pub line: u32,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer { src: src.as_bytes(), pos: 0, line: 1, at_line_start: true }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.src.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    pub fn tokenize(mut self) -> crate::error::Result<Vec<Token>> {
        let mut out = Vec::new();
        loop {
            // Skip spaces/tabs, never newlines.
            while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\r')) {
                self.pos += 1;
            }

            match self.peek() {
                None => {
                    out.push(Token { kind: TokKind::Eof, line: self.line });
                    break;
                }
                Some(b'\n') => {
                    self.pos += 1;
                    out.push(Token { kind: TokKind::Newline, line: self.line });
                    self.line += 1;
                    self.at_line_start = true;
                }
                Some(b'#') => {
                    // end-of-line comment, discarded entirely.
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                Some(b';') if self.at_line_start => {
                    self.pos += 1;
                    let start = self.pos;
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                    let text = String::from_utf8_lossy(&self.src[start..self.pos]).trim().to_string();
                    out.push(Token { kind: TokKind::Comment(text), line: self.line });
                    self.at_line_start = false;
                }
                Some(c) if c.is_ascii_digit() => {
                    self.at_line_start = false;
                    out.push(self.lex_number()?);
                }
                Some(b'"') | Some(b'\'') | Some(b'`') => {
                    self.at_line_start = false;
                    out.push(self.lex_string(false)?);
                }
                Some(b'r') if matches!(self.peek_at(1), Some(b'"') | Some(b'\'') | Some(b'`')) => {
                    self.at_line_start = false;
                    self.pos += 1;
                    out.push(self.lex_string(true)?);
                }
                Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                    self.at_line_start = false;
                    out.push(self.lex_ident());
                }
                Some(b'[') => { self.pos += 1; out.push(self.tok(TokKind::LBracket)); self.at_line_start = false; }
                Some(b']') => { self.pos += 1; out.push(self.tok(TokKind::RBracket)); self.at_line_start = false; }
                Some(b'{') => { self.pos += 1; out.push(self.tok(TokKind::LBrace)); self.at_line_start = false; }
                Some(b'}') => { self.pos += 1; out.push(self.tok(TokKind::RBrace)); self.at_line_start = false; }
                Some(b'(') => { self.pos += 1; out.push(self.tok(TokKind::LParen)); self.at_line_start = false; }
                Some(b')') => { self.pos += 1; out.push(self.tok(TokKind::RParen)); self.at_line_start = false; }
                Some(b',') => { self.pos += 1; out.push(self.tok(TokKind::Comma)); self.at_line_start = false; }
                Some(_) => {
                    self.at_line_start = false;
                    out.push(self.lex_operator()?);
                }
            }
        }
        Ok(out)
    }

    fn tok(&self, kind: TokKind) -> Token {
        Token { kind, line: self.line }
    }

    fn lex_number(&mut self) -> crate::error::Result<Token> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("0");
        let n: f64 = text.parse().map_err(|_| rerr!(ErrorKind::ParseError, "bad number literal '{}'", text))?;
        Ok(Token { kind: TokKind::Number(n), line: self.line })
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_' || c == b':') {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]).to_string();
        Token { kind: TokKind::Ident(text), line: self.line }
    }

    fn lex_string(&mut self, is_r: bool) -> crate::error::Result<Token> {
        let quote = self.bump().unwrap();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(rerr!(ErrorKind::ParseError, "unterminated string literal starting at line {}", self.line)),
                Some(b'\n') => return Err(rerr!(ErrorKind::ParseError, "unterminated string literal at line {}", self.line)),
                Some(b'\\') => match self.bump() {
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(b'r') => out.push('\r'),
                    Some(b'\\') => out.push('\\'),
                    Some(c) if c == quote => out.push(c as char),
                    Some(c) => { out.push('\\'); out.push(c as char); }
                    None => return Err(rerr!(ErrorKind::ParseError, "unterminated escape at line {}", self.line)),
                },
                Some(c) if c == quote => break,
                Some(c) => {
                    // Re-decode UTF-8 continuation bytes faithfully.
                    if c < 0x80 {
                        out.push(c as char);
                    } else {
                        let start = self.pos - 1;
                        let mut end = self.pos;
                        while matches!(self.src.get(end), Some(b) if b & 0xC0 == 0x80) {
                            end += 1;
                        }
                        out.push_str(&String::from_utf8_lossy(&self.src[start..end]));
                        self.pos = end;
                    }
                }
            }
        }
        Ok(Token { kind: if is_r { TokKind::RStr(out) } else { TokKind::Str(out) }, line: self.line })
    }

    fn lex_operator(&mut self) -> crate::error::Result<Token> {
        let two: Option<[u8; 2]> = match (self.peek(), self.peek_at(1)) {
            (Some(a), Some(b)) => Some([a, b]),
            _ => None,
        };
        let op = if let Some([a, b]) = two {
            match (a, b) {
                (b'=', b'=') | (b'!', b'=') | (b'=', b'~') | (b'!', b'~') | (b'>', b'=') | (b'<', b'=') => {
                    self.pos += 2;
                    String::from_utf8(vec![a, b]).unwrap()
                }
                _ => {
                    self.pos += 1;
                    (a as char).to_string()
                }
            }
        } else {
            let a = self.bump().ok_or_else(|| rerr!(ErrorKind::ParseError, "unexpected end of input"))?;
            (a as char).to_string()
        };
        if matches!(op.as_str(), "-" | "+" | "*" | "/" | "%" | "=" | "<" | ">" | "!" | "==" | "!=" | "=~" | "!~" | ">=" | "<=" | "." | ":" | ";") {
            Ok(Token { kind: TokKind::Op(op), line: self.line })
        } else {
            Err(rerr!(ErrorKind::ParseError, "unexpected character '{}' at line {}", op, self.line))
        }
    }
}

pub fn tokenize(src: &str) -> crate::error::Result<Vec<Token>> {
    Lexer::new(src).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_simple_set() {
        let toks = tokenize("set x 1 + 2\n").unwrap();
        assert!(matches!(toks[0].kind, TokKind::Ident(ref s) if s == "set"));
        assert!(matches!(toks[1].kind, TokKind::Ident(ref s) if s == "x"));
        assert!(matches!(toks[2].kind, TokKind::Number(n) if n == 1.0));
        assert!(matches!(toks[3].kind, TokKind::Op(ref s) if s == "+"));
    }

    #[test]
    fn semicolon_comment_at_line_start() {
        let toks = tokenize("; = section heading\n").unwrap();
        assert!(matches!(&toks[0].kind, TokKind::Comment(s) if s == "= section heading"));
    }

    #[test]
    fn unterminated_string_is_parse_error() {
        let err = tokenize("send \"abc\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParseError);
    }

    #[test]
    fn rstring_literal() {
        let toks = tokenize("r\"a.*\"\n").unwrap();
        assert!(matches!(&toks[0].kind, TokKind::RStr(s) if s == "a.*"));
    }

    #[test]
    fn hash_comment_discarded() {
        let toks = tokenize("set x 1 # trailing comment\n").unwrap();
        // set, x, 1, newline, eof -- no comment token.
        assert!(toks.iter().all(|t| !matches!(t.kind, TokKind::Comment(_))));
    }
}
