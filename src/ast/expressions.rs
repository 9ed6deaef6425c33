use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    ast::{BinOp, UnaryOperator},
    lexer::Position,
};

/// Untyped syntax tree node produced by the parser.
///
/// Names are not resolved yet; the binder turns this tree into a typed
/// [`crate::expr::Expr`]. Every node remembers where it started so binder
/// failures can point at the offending text.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub pos: Position,
}

impl Node {
    pub fn new(kind: NodeKind, pos: Position) -> Self {
        Node { kind, pos }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Literal value
    ///
    /// # Examples
    /// ```text
    /// 'whatever'
    /// 42
    /// guid'5d3c8b5e-5b1a-4c4c-9c1e-3a6a4d2f0b11'
    /// ```
    Literal(Literal),

    /// Bare name: a property of the root, a lambda parameter or `this`
    ///
    /// # Examples
    /// ```text
    /// name
    /// x
    /// ```
    Identifier(String),

    /// Member access
    ///
    /// # Examples
    /// ```text
    /// hat.hattype
    /// x.weapons
    /// ```
    Member { target: Box<Node>, name: String },

    /// Dictionary indexing
    ///
    /// # Example
    /// ```text
    /// attributes['color']
    /// ```
    Index { target: Box<Node>, key: Box<Node> },

    /// Binary operation
    Binary {
        op: BinOp,
        left: Box<Node>,
        right: Box<Node>,
    },

    /// Prefix operation
    Unary {
        op: UnaryOperator,
        operand: Box<Node>,
    },

    /// Function call, either `name(args)` or dot-call style `target.name(args)`
    ///
    /// # Examples
    /// ```text
    /// any(weapons, w:w.strength gt 3)
    /// weapons.select(w:w.strength)
    /// ```
    Call {
        name: String,
        target: Option<Box<Node>>,
        args: Vec<Node>,
    },

    /// Lambda mini-syntax for higher-order function arguments
    ///
    /// # Example
    /// ```text
    /// x:x.strength gt 3
    /// ```
    Lambda { param: String, body: Box<Node> },

    /// Bracketed array literal
    ///
    /// # Example
    /// ```text
    /// [1,2,3]
    /// ```
    Array(Vec<Node>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Long(i64),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Boolean(bool),
    Null,
    Guid(Uuid),
    DateTime(DateTime<Utc>),
    TypeName(String),
}
