use crate::{ast::Node, lexer::Position};

/// One entry of a select list: `propertyPath [as alias]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    /// Projected expression
    pub expr: Node,

    /// Explicit result column name
    pub alias: Option<String>,

    /// Where the entry starts
    pub pos: Position,
}

/// Parsed select list, in source order.
pub type SelectList = Vec<SelectItem>;
