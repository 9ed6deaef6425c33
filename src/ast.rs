//! # Filter Language - Abstract Syntax Tree
//!
//! Untyped syntax produced by the [`crate::parser`] for the OData-like filter
//! and select-list languages. The [`crate::binder`] resolves names against a
//! schema and turns this tree into typed [`crate::expr::Expr`] nodes.
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Syntax nodes (literals, member access, calls, lambdas)
//! - **[operators]** - Binary and unary operators
//! - **[query]** - Select-list entries
//!
//! ## Quick Start
//!
//! ```text
//! hat.hattype eq 'whatever' and any(weapons, w:w.strength gt 3)
//! ```
//!
//! ## Operator Precedence
//!
//! From loosest to tightest, all left-associative except the prefix operators:
//!
//! ```text
//! or
//! and
//! eq ne
//! gt ge lt le in
//! add sub
//! mul div mod
//! not -
//! . () []
//! ```
//!
//! ## Literals
//!
//! ```text
//! 'text'   42   42L   1.5   1.5m   true   null
//! guid'2f1f0ad4-2d6e-4a0c-9a3f-0b8c7a1e4d55'
//! datetime'2014-02-11T12:00:00Z'
//! t'MusicalCritter'
//! ```
//!
//! ## Select Lists
//!
//! ```text
//! name, hat.hattype as hat, count(weapons) as weaponCount
//! ```
pub mod expressions;
pub mod operators;
pub mod query;
pub mod tokens;

pub use expressions::{Literal, Node, NodeKind};
pub use operators::{BinOp, UnaryOperator};
pub use query::{SelectItem, SelectList};
pub use tokens::Token;
