//! Abstract syntax (`spec.md` §3 "AST node", §4.1).
//!
//! Every node is wrapped in [`Spanned`] so it carries a source range, as
//! required by `spec.md` §3. Shape follows the recursive-descent grammar
//! `n2o5`'s ninja parser walks (`cli/src/ninja/parser.rs`), generalized from
//! Ninja's flat `key = word...` statements to full expressions, control
//! flow, and function calls.

use smol_str::SmolStr;

use crate::error::{Location, Span};
use crate::scope::ScopeRef;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }

    pub fn location(&self) -> Location {
        self.span.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// A chunk of an interpolated string literal. `spec.md` §4.1: `$identifier`,
/// `${identifier}`, and `${expr}` all produce an embedded expression; a
/// `${expr}` chunk may itself contain arbitrary expressions.
#[derive(Debug, Clone)]
pub enum StringChunk {
    Literal(SmolStr),
    Var(SmolStr),
    Expr(Box<Spanned<Expr>>),
}

#[derive(Debug, Clone)]
pub enum Accessor {
    Field(SmolStr),
    Index(Box<Spanned<Expr>>),
}

#[derive(Debug, Clone)]
pub enum Expr {
    None,
    Integer(i64),
    Boolean(bool),
    StringLiteral(Vec<StringChunk>),
    List(Vec<Spanned<Expr>>),
    /// `{ ... }` evaluated as a fresh child scope, producing a `scope` value.
    ScopeLiteral(Block),
    Identifier(SmolStr),
    Unary {
        op: UnaryOp,
        operand: Box<Spanned<Expr>>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
    Accessor {
        base: Box<Spanned<Expr>>,
        accessor: Accessor,
    },
    Call {
        name: SmolStr,
        args: Vec<Spanned<Expr>>,
        /// The trailing `{ ... }` block some calls take, e.g.
        /// `executable("foo") { ... }` or `template("t") { ... }`.
        block: Option<Block>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Assign {
        target: SmolStr,
        target_location: Location,
        op: AssignOp,
        value: Spanned<Expr>,
    },
    /// A bare expression statement: almost always a function call
    /// (`print(x)`, `import(...)`, a target-declaring call with no captured
    /// return value).
    Expr(Spanned<Expr>),
    If {
        /// `(condition, body)` pairs for `if` and every `else if`.
        branches: Vec<(Spanned<Expr>, Block)>,
        else_branch: Option<Block>,
    },
    Foreach {
        binding: SmolStr,
        list: Spanned<Expr>,
        body: Block,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub statements: Vec<Spanned<Stmt>>,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub statements: Vec<Spanned<Stmt>>,
}

/// A captured closure (`spec.md` §3 "Template"): always takes exactly one
/// parameter, the instance name.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: SmolStr,
    pub body: Block,
    pub defining_scope: ScopeRef,
    pub location: Location,
}
