//! rcmd recursive-descent parser (component B, spec §4.1).
//!
//! Consumes the flat token stream from `lexer::tokenize` and produces a
//! `Vec<Statement>`. Lookahead is bounded (the grammar never needs more
//! than a handful of tokens to disambiguate a statement opener).

use crate::ast::*;
use crate::error::{Error, ErrorKind};
use crate::lexer::{tokenize, TokKind, Token};
use crate::rerr;
use crate::value::CompiledRegex;
use std::sync::Arc;

pub fn parse(src: &str) -> crate::error::Result<Vec<Statement>> {
    let tokens = tokenize(src)?;
    let mut p = Parser { toks: tokens, pos: 0 };
    let (body, term) = p.parse_block(&[])?;
    if term.is_some() {
        return Err(rerr!(ErrorKind::ParseError, "unexpected terminator at top level"));
    }
    Ok(body)
}

struct Parser {
    toks: Vec<Token>,
    pos: usize,
}

const TERMINATORS: &[&str] = &["endif", "endfor", "enddefer", "endtable"];

impl Parser {
    fn cur(&self) -> &Token {
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn cur_line(&self) -> u32 {
        self.cur().line
    }

    fn advance(&mut self) -> Token {
        let t = self.toks[self.pos.min(self.toks.len() - 1)].clone();
        if self.pos < self.toks.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn is_eof(&self) -> bool {
        matches!(self.cur().kind, TokKind::Eof)
    }

    fn skip_newlines(&mut self) {
        while matches!(self.cur().kind, TokKind::Newline) {
            self.advance();
        }
    }

    fn expect_newline_or_eof(&mut self) -> crate::error::Result<()> {
        match self.cur().kind {
            TokKind::Newline => { self.advance(); Ok(()) }
            TokKind::Eof => Ok(()),
            ref other => Err(rerr!(ErrorKind::ParseError, "expected end of line at line {}, found {:?}", self.cur_line(), other)),
        }
    }

    fn ident_eq(tok: &TokKind, word: &str) -> bool {
        matches!(tok, TokKind::Ident(s) if s.eq_ignore_ascii_case(word))
    }

    fn peek_ident(&self) -> Option<String> {
        match &self.cur().kind {
            TokKind::Ident(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Parses statements until EOF or one of `terminators` appears as a
    /// bare leading identifier on its own line; returns that terminator.
    fn parse_block(&mut self, terminators: &[&str]) -> crate::error::Result<(Vec<Statement>, Option<String>)> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.is_eof() {
                return Ok((stmts, None));
            }
            if let Some(word) = self.peek_ident() {
                if terminators.iter().any(|t| word.eq_ignore_ascii_case(t)) {
                    self.advance();
                    self.expect_newline_or_eof()?;
                    return Ok((stmts, Some(word.to_lowercase())));
                }
            }
            stmts.push(self.parse_statement()?);
        }
    }

    fn parse_statement(&mut self) -> crate::error::Result<Statement> {
        if let TokKind::Comment(text) = self.cur().kind.clone() {
            self.advance();
            self.expect_newline_or_eof()?;
            return Ok(Statement::Comment { kind: classify_comment(&text), text });
        }

        let word = self.peek_ident().ok_or_else(|| rerr!(ErrorKind::ParseError, "expected statement, found {:?} at line {}", self.cur().kind, self.cur_line()))?;
        let lw = word.to_lowercase();
        let stmt = match lw.as_str() {
            "version" => { self.advance(); let s = self.parse_raw_line_as_string()?; Statement::Version(s) }
            "environment" => { self.advance(); let s = self.parse_raw_line_as_string()?; Statement::Environment { path: s } }
            "load" => {
                self.advance();
                self.expect_ident("ini")?;
                let path = self.parse_raw_line_as_string()?;
                Statement::Load { kind: LoadKind::Ini, path }
            }
            "unload" => {
                self.advance();
                self.expect_ident("ini")?;
                let path = self.parse_raw_line_as_string()?;
                Statement::Unload { kind: LoadKind::Ini, path }
            }
            "set" => { self.advance(); self.parse_set(false)? }
            "seta" => { self.advance(); self.parse_set(true)? }
            "unset" => {
                self.advance();
                let name = self.expect_any_ident()?;
                let index = self.try_parse_index_chain()?;
                self.expect_newline_or_eof()?;
                Statement::Unset { name, index: if index.is_empty() { None } else { Some(index) } }
            }
            "connect" => {
                self.advance();
                let session = self.expect_any_ident()?;
                let node = self.expect_any_ident()?;
                self.expect_newline_or_eof()?;
                Statement::Connect { session, node }
            }
            "spawn" => {
                self.advance();
                let session = self.expect_any_ident()?;
                let command = self.parse_expr()?;
                self.expect_newline_or_eof()?;
                Statement::Spawn { session, command }
            }
            "close" => {
                self.advance();
                let session = self.expect_any_ident()?;
                self.expect_newline_or_eof()?;
                Statement::Close { session }
            }
            "send" => {
                self.advance();
                let text = self.parse_expr()?;
                let session = self.expect_any_ident()?;
                self.expect_newline_or_eof()?;
                Statement::Send { text, session }
            }
            "expect" => {
                self.advance();
                let pattern = self.parse_expr()?;
                let timeout = self.parse_expr()?;
                let session = self.expect_any_ident()?;
                self.expect_newline_or_eof()?;
                Statement::Expect { pattern, timeout, session }
            }
            "check" => {
                self.advance();
                let expr = self.parse_expr()?;
                let step = matches!(self.peek_ident(), Some(s) if s.eq_ignore_ascii_case("step"));
                if step {
                    self.advance();
                }
                self.expect_newline_or_eof()?;
                Statement::Check { expr, step }
            }
            "if" => self.parse_if()?,
            "for" => self.parse_for()?,
            "table" => self.parse_table()?,
            "defer" => {
                self.advance();
                self.expect_newline_or_eof()?;
                let (body, _) = self.parse_block(&["enddefer"])?;
                Statement::Defer { body }
            }
            "break" => { self.advance(); let n = self.try_parse_level()?; self.expect_newline_or_eof()?; Statement::Break(n) }
            "continue" => { self.advance(); let n = self.try_parse_level()?; self.expect_newline_or_eof()?; Statement::Continue(n) }
            "return" => { self.advance(); self.expect_newline_or_eof()?; Statement::Return }
            "sleep" => { self.advance(); let e = self.parse_expr()?; self.expect_newline_or_eof()?; Statement::Sleep(e) }
            "log" => { self.advance(); let e = self.parse_expr()?; self.expect_newline_or_eof()?; Statement::Log(e) }
            "eol" => {
                self.advance();
                let eol = match self.expect_any_ident()?.to_lowercase().as_str() {
                    "cr" => Eol::Cr,
                    "lf" => Eol::Lf,
                    "crlf" => Eol::CrLf,
                    other => return Err(rerr!(ErrorKind::ParseError, "unknown eol '{}' at line {}", other, self.cur_line())),
                };
                let session = self.expect_any_ident()?;
                self.expect_newline_or_eof()?;
                Statement::Eol { eol, session }
            }
            "get" => {
                self.advance();
                let session = self.expect_any_ident()?;
                let remote = self.parse_expr()?;
                let local = self.parse_expr()?;
                let rename = self.try_parse_trailing_expr()?;
                self.expect_newline_or_eof()?;
                Statement::Get { session, remote, local, rename }
            }
            "put" => {
                self.advance();
                let session = self.expect_any_ident()?;
                let local = self.parse_expr()?;
                let remote = self.parse_expr()?;
                let rename = self.try_parse_trailing_expr()?;
                self.expect_newline_or_eof()?;
                Statement::Put { session, local, remote, rename }
            }
            "script" => {
                self.advance();
                let path = self.parse_expr()?;
                let var = match self.peek_ident() {
                    Some(s) if !s.eq_ignore_ascii_case("checker") => { self.advance(); Some(s) }
                    _ => None,
                };
                let checker = matches!(self.peek_ident(), Some(s) if s.eq_ignore_ascii_case("checker"));
                if checker {
                    self.advance();
                }
                self.expect_newline_or_eof()?;
                Statement::Script { path, var, checker }
            }
            "require" => { self.advance(); let e = self.parse_expr()?; self.expect_newline_or_eof()?; Statement::Require { rid: e } }
            "error" => { self.advance(); let e = self.parse_expr()?; self.expect_newline_or_eof()?; Statement::Error(e) }
            "bashsetenv" => { self.advance(); let e = self.parse_expr()?; self.expect_newline_or_eof()?; Statement::Bashsetenv { path: e } }
            "debug" => { self.advance(); let e = self.parse_expr()?; self.expect_newline_or_eof()?; Statement::Debug(e) }
            "bp" => self.parse_bp()?,
            other => return Err(rerr!(ErrorKind::ParseError, "unknown statement '{}' at line {}", other, self.cur_line())),
        };
        Ok(stmt)
    }

    fn parse_bp(&mut self) -> crate::error::Result<Statement> {
        self.advance();
        let kind = match self.expect_any_ident()?.to_lowercase().as_str() {
            "login" => BpKind::Login,
            "normal" => BpKind::Normal,
            "rfc2544" => BpKind::Rfc2544,
            "logout" => BpKind::Logout,
            other => return Err(rerr!(ErrorKind::ParseError, "unknown bp subcommand '{}' at line {}", other, self.cur_line())),
        };
        let mut args = Vec::new();
        while !matches!(self.cur().kind, TokKind::Newline | TokKind::Eof) {
            args.push(self.parse_expr()?);
        }
        self.expect_newline_or_eof()?;
        Ok(Statement::Bp { kind, args })
    }

    fn parse_set(&mut self, must_index: bool) -> crate::error::Result<Statement> {
        let name = self.expect_any_ident()?;
        let index = self.try_parse_index_chain()?;
        if must_index && index.is_empty() {
            return Err(rerr!(ErrorKind::ParseError, "seta requires an indexed target at line {}", self.cur_line()));
        }
        let value = self.parse_expr()?;
        self.expect_newline_or_eof()?;
        if must_index {
            Ok(Statement::Seta { name, index, value })
        } else {
            Ok(Statement::Set { name, index: if index.is_empty() { None } else { Some(index) }, value })
        }
    }

    fn parse_if(&mut self) -> crate::error::Result<Statement> {
        self.advance();
        let mut clauses = Vec::new();
        let cond = self.parse_expr()?;
        self.expect_newline_or_eof()?;
        let (body, mut term) = self.parse_if_body()?;
        clauses.push(IfClause { cond, body });
        let mut else_body = None;
        loop {
            match term.as_deref() {
                Some("elseif") => {
                    let cond = self.parse_expr()?;
                    self.expect_newline_or_eof()?;
                    let (body, t) = self.parse_if_body()?;
                    clauses.push(IfClause { cond, body });
                    term = t;
                }
                Some("else") => {
                    self.expect_newline_or_eof()?;
                    let (body, t) = self.parse_if_body()?;
                    else_body = Some(body);
                    term = t;
                }
                Some("endif") | None => break,
                Some(other) => return Err(rerr!(ErrorKind::ParseError, "unexpected '{}' inside if at line {}", other, self.cur_line())),
            }
        }
        Ok(Statement::If { clauses, else_body })
    }

    /// Parses a block that may end on `elseif`, `else`, or `endif`.
    fn parse_if_body(&mut self) -> crate::error::Result<(Vec<Statement>, Option<String>)> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.is_eof() {
                return Err(rerr!(ErrorKind::ParseError, "unterminated if (missing endif)"));
            }
            if let Some(word) = self.peek_ident() {
                let lw = word.to_lowercase();
                if matches!(lw.as_str(), "elseif" | "else" | "endif") {
                    self.advance();
                    return Ok((stmts, Some(lw)));
                }
            }
            stmts.push(self.parse_statement()?);
        }
    }

    fn parse_for(&mut self) -> crate::error::Result<Statement> {
        self.advance();
        let first = self.expect_any_ident()?;
        if matches!(self.peek_ident(), Some(s) if s.eq_ignore_ascii_case("range")) {
            self.advance();
            let start = self.parse_expr()?;
            self.expect_op(",")?;
            let end = self.parse_expr()?;
            let step = if matches!(self.cur().kind, TokKind::Comma) {
                self.advance();
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect_newline_or_eof()?;
            let (body, _) = self.parse_block(&["endfor"])?;
            return Ok(Statement::ForRange { var: first, start, end, step, body });
        }
        self.expect_comma()?;
        let val = self.expect_any_ident()?;
        self.expect_ident("in")?;
        let expr = self.parse_expr()?;
        self.expect_newline_or_eof()?;
        let (body, _) = self.parse_block(&["endfor"])?;
        Ok(Statement::ForIn { key: first, val, expr, body })
    }

    fn parse_table(&mut self) -> crate::error::Result<Statement> {
        self.advance();
        let kind = self.expect_any_ident()?.to_lowercase();
        match kind.as_str() {
            "csv" => {
                let path = self.parse_expr()?;
                self.expect_newline_or_eof()?;
                let (body, _) = self.parse_block(&["endtable"])?;
                Ok(Statement::TableCsv { path, body })
            }
            "row" => {
                let var = self.expect_any_ident()?;
                let path = self.parse_expr()?;
                self.expect_newline_or_eof()?;
                let (body, _) = self.parse_block(&["endtable"])?;
                Ok(Statement::TableRow { var, path, body })
            }
            other => Err(rerr!(ErrorKind::ParseError, "unknown table kind '{}' at line {}", other, self.cur_line())),
        }
    }

    fn try_parse_level(&mut self) -> crate::error::Result<u32> {
        if let TokKind::Number(n) = self.cur().kind {
            self.advance();
            Ok(n as u32)
        } else {
            Ok(1)
        }
    }

    fn try_parse_trailing_expr(&mut self) -> crate::error::Result<Option<Expr>> {
        if matches!(self.cur().kind, TokKind::Newline | TokKind::Eof) {
            Ok(None)
        } else {
            Ok(Some(self.parse_expr()?))
        }
    }

    fn try_parse_index_chain(&mut self) -> crate::error::Result<Vec<PrimParam>> {
        let mut out = Vec::new();
        while matches!(self.cur().kind, TokKind::LBracket) {
            out.push(self.parse_bracket_param()?);
        }
        Ok(out)
    }

    fn expect_ident(&mut self, word: &str) -> crate::error::Result<()> {
        match &self.cur().kind {
            TokKind::Ident(s) if s.eq_ignore_ascii_case(word) => { self.advance(); Ok(()) }
            other => Err(rerr!(ErrorKind::ParseError, "expected '{}' at line {}, found {:?}", word, self.cur_line(), other)),
        }
    }

    fn expect_any_ident(&mut self) -> crate::error::Result<String> {
        match self.cur().kind.clone() {
            TokKind::Ident(s) => { self.advance(); Ok(s) }
            other => Err(rerr!(ErrorKind::ParseError, "expected identifier at line {}, found {:?}", self.cur_line(), other)),
        }
    }

    fn expect_op(&mut self, op: &str) -> crate::error::Result<()> {
        match &self.cur().kind {
            TokKind::Op(s) if s == op => { self.advance(); Ok(()) }
            other => Err(rerr!(ErrorKind::ParseError, "expected '{}' at line {}, found {:?}", op, self.cur_line(), other)),
        }
    }

    fn expect_comma(&mut self) -> crate::error::Result<()> {
        match &self.cur().kind {
            TokKind::Comma => { self.advance(); Ok(()) }
            other => Err(rerr!(ErrorKind::ParseError, "expected ',' at line {}, found {:?}", self.cur_line(), other)),
        }
    }

    /// Reads a bare path/token as a raw string for statements whose
    /// argument is conventionally a quoted path (`environment`, `load`).
    fn parse_raw_line_as_string(&mut self) -> crate::error::Result<String> {
        let e = self.parse_expr()?;
        self.expect_newline_or_eof()?;
        match e {
            Expr::Str(parts) => Ok(render_static_str(&parts)),
            Expr::Variable(name) => Ok(name),
            _ => Err(rerr!(ErrorKind::ParseError, "expected a path literal at line {}", self.cur_line())),
        }
    }

    // ---- expressions --------------------------------------------------

    fn parse_expr(&mut self) -> crate::error::Result<Expr> {
        self.parse_logical()
    }

    fn parse_logical(&mut self) -> crate::error::Result<Expr> {
        let mut lhs = self.parse_equality()?;
        loop {
            let op = match self.peek_ident() {
                Some(s) if s.eq_ignore_ascii_case("and") => BinaryOp::And,
                Some(s) if s.eq_ignore_ascii_case("or") => BinaryOp::Or,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> crate::error::Result<Expr> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match &self.cur().kind {
                TokKind::Op(s) if s == "==" => BinaryOp::Eq,
                TokKind::Op(s) if s == "!=" => BinaryOp::Ne,
                TokKind::Op(s) if s == "=~" => BinaryOp::Match,
                TokKind::Op(s) if s == "!~" => BinaryOp::NotMatch,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> crate::error::Result<Expr> {
        let mut lhs = self.parse_addition()?;
        loop {
            let op = match &self.cur().kind {
                TokKind::Op(s) if s == ">=" => BinaryOp::Ge,
                TokKind::Op(s) if s == "<=" => BinaryOp::Le,
                TokKind::Op(s) if s == ">" => BinaryOp::Gt,
                TokKind::Op(s) if s == "<" => BinaryOp::Lt,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_addition()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_addition(&mut self) -> crate::error::Result<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match &self.cur().kind {
                TokKind::Op(s) if s == "+" => BinaryOp::Add,
                TokKind::Op(s) if s == "-" => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> crate::error::Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match &self.cur().kind {
                TokKind::Op(s) if s == "*" => BinaryOp::Mul,
                TokKind::Op(s) if s == "/" => BinaryOp::Div,
                TokKind::Op(s) if s == "%" => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> crate::error::Result<Expr> {
        if matches!(&self.cur().kind, TokKind::Op(s) if s == "!") || matches!(self.peek_ident(), Some(s) if s.eq_ignore_ascii_case("not")) {
            self.advance();
            let e = self.parse_unary()?;
            return Ok(Expr::Unary { op: UnaryOp::Not, expr: Box::new(e) });
        }
        if matches!(&self.cur().kind, TokKind::Op(s) if s == "-") {
            self.advance();
            let e = self.parse_unary()?;
            return Ok(Expr::Unary { op: UnaryOp::Neg, expr: Box::new(e) });
        }
        if matches!(&self.cur().kind, TokKind::Op(s) if s == "+") {
            self.advance();
            let e = self.parse_unary()?;
            return Ok(Expr::Unary { op: UnaryOp::Pos, expr: Box::new(e) });
        }
        self.parse_chain()
    }

    fn parse_chain(&mut self) -> crate::error::Result<Expr> {
        let base = self.parse_primary()?;
        let mut ops = Vec::new();
        loop {
            match &self.cur().kind {
                TokKind::LBracket => ops.push(self.parse_bracket_param()?),
                TokKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if !matches!(self.cur().kind, TokKind::RParen) {
                        args.push(self.parse_expr()?);
                        while matches!(self.cur().kind, TokKind::Comma) {
                            self.advance();
                            args.push(self.parse_expr()?);
                        }
                    }
                    match &self.cur().kind {
                        TokKind::RParen => { self.advance(); }
                        other => return Err(rerr!(ErrorKind::ParseError, "expected ')' at line {}, found {:?}", self.cur_line(), other)),
                    }
                    ops.push(PrimParam::Call(args));
                }
                _ => break,
            }
        }
        if ops.is_empty() {
            Ok(base)
        } else {
            Ok(Expr::Chain { base: Box::new(base), ops })
        }
    }

    fn parse_bracket_param(&mut self) -> crate::error::Result<PrimParam> {
        self.advance(); // consume '['
        let first = if matches!(&self.cur().kind, TokKind::Op(s) if s == ":") {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        if matches!(&self.cur().kind, TokKind::Op(s) if s == ":") {
            self.advance();
            let second = if matches!(self.cur().kind, TokKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expr()?))
            };
            match &self.cur().kind {
                TokKind::RBracket => { self.advance(); }
                other => return Err(rerr!(ErrorKind::ParseError, "expected ']' at line {}, found {:?}", self.cur_line(), other)),
            }
            Ok(PrimParam::Slice(first, second))
        } else {
            match &self.cur().kind {
                TokKind::RBracket => { self.advance(); }
                other => return Err(rerr!(ErrorKind::ParseError, "expected ']' at line {}, found {:?}", self.cur_line(), other)),
            }
            Ok(PrimParam::Index(first.ok_or_else(|| rerr!(ErrorKind::ParseError, "empty index at line {}", self.cur_line()))?))
        }
    }

    fn parse_primary(&mut self) -> crate::error::Result<Expr> {
        match self.cur().kind.clone() {
            TokKind::Number(n) => { self.advance(); Ok(Expr::Number(n)) }
            TokKind::Str(s) => { self.advance(); Ok(Expr::Str(parse_interpolation(&s)?)) }
            TokKind::RStr(s) => { self.advance(); Ok(Expr::RStr(parse_interpolation(&s)?)) }
            TokKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !matches!(self.cur().kind, TokKind::RBracket) {
                    items.push(self.parse_expr()?);
                    while matches!(self.cur().kind, TokKind::Comma) {
                        self.advance();
                        items.push(self.parse_expr()?);
                    }
                }
                self.expect_rbracket()?;
                Ok(Expr::List(items))
            }
            TokKind::LBrace => {
                self.advance();
                let mut items = Vec::new();
                if !matches!(self.cur().kind, TokKind::RBrace) {
                    loop {
                        let key = self.parse_expr()?;
                        self.expect_op(":")?;
                        let val = self.parse_expr()?;
                        items.push((key, val));
                        if matches!(self.cur().kind, TokKind::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                match &self.cur().kind {
                    TokKind::RBrace => { self.advance(); }
                    other => return Err(rerr!(ErrorKind::ParseError, "expected '}}' at line {}, found {:?}", self.cur_line(), other)),
                }
                Ok(Expr::Map(items))
            }
            TokKind::LParen => {
                self.advance();
                let e = self.parse_expr()?;
                match &self.cur().kind {
                    TokKind::RParen => { self.advance(); }
                    other => return Err(rerr!(ErrorKind::ParseError, "expected ')' at line {}, found {:?}", self.cur_line(), other)),
                }
                Ok(Expr::Paren(Box::new(e)))
            }
            TokKind::Ident(s) => {
                self.advance();
                match s.to_lowercase().as_str() {
                    "true" => Ok(Expr::Bool(true)),
                    "false" => Ok(Expr::Bool(false)),
                    "null" | "nil" | "none" => Ok(Expr::Null),
                    _ => Ok(Expr::Variable(s)),
                }
            }
            ref other => Err(rerr!(ErrorKind::ParseError, "expected expression at line {}, found {:?}", self.cur_line(), other)),
        }
    }

    fn expect_rbracket(&mut self) -> crate::error::Result<()> {
        match &self.cur().kind {
            TokKind::RBracket => { self.advance(); Ok(()) }
            other => Err(rerr!(ErrorKind::ParseError, "expected ']' at line {}, found {:?}", self.cur_line(), other)),
        }
    }
}

fn classify_comment(text: &str) -> CommentKind {
    match text.chars().next() {
        Some('=') => CommentKind::Section1,
        Some('-') => CommentKind::Section2,
        Some('#') => CommentKind::Section3,
        Some('*') => CommentKind::CheckAnchor,
        Some('%') | Some('_') => CommentKind::Annotation,
        _ => CommentKind::Plain,
    }
}

fn render_static_str(parts: &[StrPart]) -> String {
    parts.iter().map(|p| match p {
        StrPart::Lit(s) => s.clone(),
        StrPart::Interp(_) => String::new(),
    }).collect()
}

/// Scans a lexed string body for `$<...>` interpolation sites, recursively
/// parsing each site's contents as a nested expression (spec §4.3 "String
/// interpolation"). Depth counting treats any `<`/`>` as balancing, which is
/// sufficient for the expressions this language allows inside `$<...>`.
fn parse_interpolation(s: &str) -> crate::error::Result<Vec<StrPart>> {
    let mut parts = Vec::new();
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    let mut lit = String::new();
    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() && chars[i + 1] == '<' {
            if !lit.is_empty() {
                parts.push(StrPart::Lit(std::mem::take(&mut lit)));
            }
            let mut depth = 1;
            let mut j = i + 2;
            let start = j;
            while j < chars.len() && depth > 0 {
                match chars[j] {
                    '<' => depth += 1,
                    '>' => depth -= 1,
                    _ => {}
                }
                if depth == 0 {
                    break;
                }
                j += 1;
            }
            if depth != 0 {
                return Err(rerr!(ErrorKind::ParseError, "unterminated '$<...>' interpolation"));
            }
            let inner: String = chars[start..j].iter().collect();
            let sub = parse_expr_standalone(&inner)?;
            parts.push(StrPart::Interp(Box::new(sub)));
            i = j + 1;
        } else {
            lit.push(chars[i]);
            i += 1;
        }
    }
    if !lit.is_empty() || parts.is_empty() {
        parts.push(StrPart::Lit(lit));
    }
    Ok(parts)
}

fn parse_expr_standalone(src: &str) -> crate::error::Result<Expr> {
    let tokens = tokenize(src)?;
    let mut p = Parser { toks: tokens, pos: 0 };
    let e = p.parse_expr()?;
    Ok(e)
}

/// Parses a single expression from source text, used by the `expr()`
/// builtin (spec §4.3) to evaluate a string as an expression at runtime.
pub fn parse_expr_public(src: &str) -> crate::error::Result<Expr> {
    parse_expr_standalone(src)
}

/// Compiles a literal (non-interpolated) `r"..."` into a ready Regex, used
/// by the evaluator when the rString has no `$<...>` sites.
pub fn compile_literal_regex(source: &str) -> crate::error::Result<CompiledRegex> {
    let re = regex::Regex::new(source).map_err(|e| rerr!(ErrorKind::ParseError, "invalid regex '{}': {}", source, e))?;
    Ok(CompiledRegex { source: source.to_string(), re: Arc::new(re) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_set_with_arithmetic() {
        let stmts = parse("set x 1 + 2\n").unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(matches!(&stmts[0], Statement::Set { name, .. } if name == "x"));
    }

    #[test]
    fn parses_if_elseif_else_endif() {
        let src = "if x == 1\nlog \"a\"\nelseif x == 2\nlog \"b\"\nelse\nlog \"c\"\nendif\n";
        let stmts = parse(src).unwrap();
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Statement::If { clauses, else_body } => {
                assert_eq!(clauses.len(), 2);
                assert!(else_body.is_some());
            }
            _ => panic!("expected if"),
        }
    }

    #[test]
    fn parses_for_range() {
        let stmts = parse("for i range 0, 3\nlog i\nendfor\n").unwrap();
        assert!(matches!(&stmts[0], Statement::ForRange { .. }));
    }

    #[test]
    fn parses_for_in() {
        let stmts = parse("for k, v in x\nlog v\nendfor\n").unwrap();
        assert!(matches!(&stmts[0], Statement::ForIn { .. }));
    }

    #[test]
    fn unknown_statement_is_parse_error() {
        let err = parse("frobnicate 1\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParseError);
    }

    #[test]
    fn string_interpolation_parses_nested_expression() {
        let stmts = parse("send \"echo $<i>\" S\n").unwrap();
        match &stmts[0] {
            Statement::Send { text: Expr::Str(parts), .. } => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[1], StrPart::Interp(_)));
            }
            _ => panic!("expected send with interpolated string"),
        }
    }

    #[test]
    fn check_anchor_comment_classified() {
        let stmts = parse("; * evidence\n").unwrap();
        assert!(matches!(&stmts[0], Statement::Comment { kind: CommentKind::CheckAnchor, .. }));
    }
}
