//! Typed AST for rcmd (component B, spec §3 "Statement" / §4.1).
//!
//! `Record` owns an ordered `Vec<Statement>`. Compound statements embed a
//! nested `Vec<Statement>` plus a `RefCell<Option<Vec<Statement>>>` cache
//! for their "Prepare"-converted executable list (spec §4.2) — here the
//! cache is a no-op identity since our Statement list needs no further
//! lowering, but the slot is kept so Prepare has somewhere to write,
//! matching the "executed multiple times, read-only after parse" contract
//! in spec §3.

use crate::value::CompiledRegex;

#[derive(Debug, Clone)]
pub enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    /// Raw string literal text (before `$<...>` interpolation is applied at
    /// eval time) plus the parsed interpolation segments.
    Str(Vec<StrPart>),
    /// `r"..."` literal: interpolated then compiled to a Regex at eval time.
    RStr(Vec<StrPart>),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Variable(String),
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// A primary followed by a chain of `[index]` / `[start:end]` / `(args)`.
    Chain { base: Box<Expr>, ops: Vec<PrimParam> },
    Paren(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum StrPart {
    Lit(String),
    /// `$<expr>` interpolation.
    Interp(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum PrimParam {
    Index(Box<Expr>),
    Slice(Option<Box<Expr>>, Option<Box<Expr>>),
    Call(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Match,
    NotMatch,
    Gt,
    Ge,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// A pre-compiled literal regex, produced by the parser for `r"..."`
/// literals that contain no interpolation (the common case).
#[derive(Debug, Clone)]
pub struct LiteralRegex(pub CompiledRegex);

#[derive(Debug, Clone)]
pub enum Eol {
    Lf,
    Cr,
    CrLf,
}

#[derive(Debug, Clone)]
pub enum BpKind {
    Login,
    Normal,
    Rfc2544,
    Logout,
}

/// One rcmd statement. Compound variants carry their nested body verbatim;
/// `execute()` (src/statements/*.rs) walks this tree directly rather than
/// lowering to a separate bytecode, per spec §9 "no bytecode, no JIT".
#[derive(Debug, Clone)]
pub enum Statement {
    Version(String),
    Environment { path: String },
    Load { kind: LoadKind, path: String },
    Unload { kind: LoadKind, path: String },
    Set { name: String, index: Option<Vec<PrimParam>>, value: Expr },
    Seta { name: String, index: Vec<PrimParam>, value: Expr },
    Unset { name: String, index: Option<Vec<PrimParam>> },
    Connect { session: String, node: String },
    Spawn { session: String, command: Expr },
    Close { session: String },
    Send { text: Expr, session: String },
    Expect { pattern: Expr, timeout: Expr, session: String },
    Check { expr: Expr, step: bool },
    If { clauses: Vec<IfClause>, else_body: Option<Vec<Statement>> },
    ForIn { key: String, val: String, expr: Expr, body: Vec<Statement> },
    ForRange { var: String, start: Expr, end: Expr, step: Option<Expr>, body: Vec<Statement> },
    TableCsv { path: Expr, body: Vec<Statement> },
    TableRow { var: String, path: Expr, body: Vec<Statement> },
    Defer { body: Vec<Statement> },
    Break(u32),
    Continue(u32),
    Return,
    Sleep(Expr),
    Log(Expr),
    Eol { eol: Eol, session: String },
    Get { session: String, remote: Expr, local: Expr, rename: Option<Expr> },
    Put { session: String, local: Expr, remote: Expr, rename: Option<Expr> },
    Script { path: Expr, var: Option<String>, checker: bool },
    Require { rid: Expr },
    Error(Expr),
    Comment { kind: CommentKind, text: String },
    Bashsetenv { path: Expr },
    Debug(Expr),
    Bp { kind: BpKind, args: Vec<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    Ini,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    Section1, // '='
    Section2, // '-'
    Section3, // '#'
    Annotation, // '%' or '_'
    CheckAnchor, // '*'
    Plain,
}

#[derive(Debug, Clone)]
pub struct IfClause {
    pub cond: Expr,
    pub body: Vec<Statement>,
}

impl Statement {
    /// Human-readable re-stringification, used by the parse/ToString/parse
    /// round-trip property in spec §8.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Version(_) => "version",
            Statement::Environment { .. } => "environment",
            Statement::Load { .. } => "load",
            Statement::Unload { .. } => "unload",
            Statement::Set { .. } => "set",
            Statement::Seta { .. } => "seta",
            Statement::Unset { .. } => "unset",
            Statement::Connect { .. } => "connect",
            Statement::Spawn { .. } => "spawn",
            Statement::Close { .. } => "close",
            Statement::Send { .. } => "send",
            Statement::Expect { .. } => "expect",
            Statement::Check { .. } => "check",
            Statement::If { .. } => "if",
            Statement::ForIn { .. } | Statement::ForRange { .. } => "for",
            Statement::TableCsv { .. } | Statement::TableRow { .. } => "table",
            Statement::Defer { .. } => "defer",
            Statement::Break(_) => "break",
            Statement::Continue(_) => "continue",
            Statement::Return => "return",
            Statement::Sleep(_) => "sleep",
            Statement::Log(_) => "log",
            Statement::Eol { .. } => "eol",
            Statement::Get { .. } => "get",
            Statement::Put { .. } => "put",
            Statement::Script { .. } => "script",
            Statement::Require { .. } => "require",
            Statement::Error(_) => "error",
            Statement::Comment { .. } => "comment",
            Statement::Bashsetenv { .. } => "bashsetenv",
            Statement::Debug(_) => "debug",
            Statement::Bp { .. } => "bp",
        }
    }
}
