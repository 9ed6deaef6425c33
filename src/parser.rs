use std::mem;

use crate::{
    ast::{BinOp, Literal, Node, NodeKind, SelectItem, SelectList, Token, UnaryOperator},
    error::QueryParseError,
    lexer::{Lexer, Position, Spanned},
};

pub type ParseError = QueryParseError;

/// Recursive-descent parser for filter expressions and select lists.
///
/// Keeps a two-token window: lambda arguments (`x:body`) are only
/// recognisable by looking one token past the identifier.
pub struct Parser {
    lexer: Lexer,
    current: Spanned,
    next: Spanned,
    /// End of the last consumed token.
    last_end: Position,
}

impl Parser {
    pub fn new(mut lexer: Lexer) -> Result<Self, ParseError> {
        let current = lexer.next_token()?;
        let next = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current,
            next,
            last_end: Position::start(),
        })
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        let upcoming = if self.next.token == Token::Eof {
            self.next.clone()
        } else {
            self.lexer.next_token()?
        };
        self.last_end = self.current.end;
        self.current = mem::replace(&mut self.next, upcoming);
        Ok(())
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        QueryParseError::new(self.lexer.source(), self.current.pos, message)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        self.error_here(format!(
            "unexpected {}, expected {}",
            self.current.token.describe(),
            expected
        ))
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if mem::discriminant(&self.current.token) != mem::discriminant(&expected) {
            return Err(self.unexpected(&expected.describe()));
        }
        self.advance()
    }

    fn check(&self, token: &Token) -> bool {
        mem::discriminant(&self.current.token) == mem::discriminant(token)
    }

    /// Parse primary expressions (atoms): literals, names, calls, `(`...`)`, `[`...`]`
    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        let pos = self.current.pos;
        let literal = |lit| Node::new(NodeKind::Literal(lit), pos);

        match mem::replace(&mut self.current.token, Token::Eof) {
            // Literals
            Token::Integer(n) => {
                self.advance()?;
                Ok(literal(integer_literal(n)))
            }
            Token::Long(n) => {
                self.advance()?;
                Ok(literal(Literal::Long(n)))
            }
            Token::Double(n) => {
                self.advance()?;
                Ok(literal(Literal::Double(n)))
            }
            Token::Decimal(n) => {
                self.advance()?;
                Ok(literal(Literal::Decimal(n)))
            }
            Token::String(s) => {
                self.advance()?;
                Ok(literal(Literal::String(s)))
            }
            Token::Boolean(b) => {
                self.advance()?;
                Ok(literal(Literal::Boolean(b)))
            }
            Token::Null => {
                self.advance()?;
                Ok(literal(Literal::Null))
            }
            Token::Guid(g) => {
                self.advance()?;
                Ok(literal(Literal::Guid(g)))
            }
            Token::DateTime(d) => {
                self.advance()?;
                Ok(literal(Literal::DateTime(d)))
            }
            Token::TypeName(t) => {
                self.advance()?;
                Ok(literal(Literal::TypeName(t)))
            }

            // Names and function calls
            Token::Identifier(name) => {
                self.advance()?;
                if self.check(&Token::LParen) {
                    self.advance()?;
                    let args = self.parse_arguments()?;
                    Ok(Node::new(
                        NodeKind::Call {
                            name,
                            target: None,
                            args,
                        },
                        pos,
                    ))
                } else {
                    Ok(Node::new(NodeKind::Identifier(name), pos))
                }
            }

            Token::LParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }

            // Array literals
            Token::LBracket => {
                self.advance()?;
                self.parse_array_literal(pos)
            }

            token => {
                self.current.token = token;
                Err(self.unexpected("an expression"))
            }
        }
    }

    fn parse_array_literal(&mut self, pos: Position) -> Result<Node, ParseError> {
        let mut elements = vec![];

        while !self.check(&Token::RBracket) {
            elements.push(self.parse_expression()?);

            if !self.check(&Token::RBracket) {
                self.expect(Token::Comma)?;
            }
        }

        self.expect(Token::RBracket)?;
        Ok(Node::new(NodeKind::Array(elements), pos))
    }

    /// Arguments after an opening parenthesis, up to and including `)`.
    fn parse_arguments(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut args = vec![];

        while !self.check(&Token::RParen) {
            args.push(self.parse_argument()?);

            if !self.check(&Token::RParen) {
                self.expect(Token::Comma)?;
            }
        }

        self.expect(Token::RParen)?;
        Ok(args)
    }

    /// An argument is an expression or a lambda `param:body`.
    fn parse_argument(&mut self) -> Result<Node, ParseError> {
        if let Token::Identifier(param) = &self.current.token
            && self.next.token == Token::Colon
        {
            let param = param.clone();
            let pos = self.current.pos;
            self.advance()?; // param
            self.advance()?; // ':'
            let body = self.parse_expression()?;
            return Ok(Node::new(
                NodeKind::Lambda {
                    param,
                    body: Box::new(body),
                },
                pos,
            ));
        }
        self.parse_expression()
    }

    /// Parse postfix chains: member access, dot-calls and indexing
    fn parse_postfix(&mut self) -> Result<Node, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.check(&Token::Dot) {
                self.advance()?; // consume '.'

                let pos = self.current.pos;
                let name = match &self.current.token {
                    Token::Identifier(n) => n.clone(),
                    _ => return Err(self.unexpected("a member name after '.'")),
                };
                self.advance()?;

                if self.check(&Token::LParen) {
                    self.advance()?;
                    let args = self.parse_arguments()?;
                    expr = Node::new(
                        NodeKind::Call {
                            name,
                            target: Some(Box::new(expr)),
                            args,
                        },
                        pos,
                    );
                } else {
                    expr = Node::new(
                        NodeKind::Member {
                            target: Box::new(expr),
                            name,
                        },
                        pos,
                    );
                }
            } else if self.check(&Token::LBracket) {
                let pos = self.current.pos;
                self.advance()?; // consume '['
                let key = self.parse_expression()?;
                self.expect(Token::RBracket)?;

                expr = Node::new(
                    NodeKind::Index {
                        target: Box::new(expr),
                        key: Box::new(key),
                    },
                    pos,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        let pos = self.current.pos;
        let op = match self.current.token {
            Token::Not => UnaryOperator::Not,
            Token::Minus => UnaryOperator::Negate,
            _ => return self.parse_postfix(),
        };
        self.advance()?;

        // The sign picks the width: -2147483648 is still an Int32
        if op == UnaryOperator::Negate
            && let Token::Integer(n) = self.current.token
        {
            self.advance()?;
            return Ok(Node::new(NodeKind::Literal(integer_literal(-n)), pos));
        }

        let operand = self.parse_unary()?; // Right-associative

        // Fold negative numeric literals
        if op == UnaryOperator::Negate
            && let NodeKind::Literal(lit) = &operand.kind
        {
            let folded = match lit {
                Literal::Integer(n) => Some(Literal::Integer(-n)),
                Literal::Long(n) => Some(Literal::Long(-n)),
                Literal::Double(n) => Some(Literal::Double(-n)),
                Literal::Decimal(n) => Some(Literal::Decimal(-*n)),
                _ => None,
            };
            if let Some(lit) = folded {
                return Ok(Node::new(NodeKind::Literal(lit), pos));
            }
        }

        Ok(Node::new(
            NodeKind::Unary {
                op,
                operand: Box::new(operand),
            },
            pos,
        ))
    }

    fn binary(op: BinOp, left: Node, right: Node) -> Node {
        let pos = left.pos;
        Node::new(
            NodeKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            pos,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match &self.current.token {
                Token::Mul => BinOp::Multiply,
                Token::Div => BinOp::Divide,
                Token::Mod => BinOp::Modulo,
                _ => break,
            };

            self.advance()?;
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match &self.current.token {
                Token::Add => BinOp::Add,
                Token::Sub => BinOp::Subtract,
                _ => break,
            };

            self.advance()?;
            let right = self.parse_multiplicative()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match &self.current.token {
                Token::Lt => BinOp::LessThan,
                Token::Gt => BinOp::GreaterThan,
                Token::Le => BinOp::LessEqual,
                Token::Ge => BinOp::GreaterEqual,
                Token::In => BinOp::In,
                _ => break,
            };

            self.advance()?;
            let right = self.parse_additive()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_relational()?;

        loop {
            let op = match &self.current.token {
                Token::Eq => BinOp::Equal,
                Token::Ne => BinOp::NotEqual,
                _ => break,
            };

            self.advance()?;
            let right = self.parse_relational()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_equality()?;

        while self.check(&Token::And) {
            self.advance()?;
            let right = self.parse_equality()?;
            left = Self::binary(BinOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_and()?;

        while self.check(&Token::Or) {
            self.advance()?;
            let right = self.parse_and()?;
            left = Self::binary(BinOp::Or, left, right);
        }
        Ok(left)
    }

    pub fn parse_expression(&mut self) -> Result<Node, ParseError> {
        self.parse_or()
    }

    /// Trailing input is reported on the character just before the
    /// unexpected token, so the diagram's `/` leans onto it. A token glued
    /// to the previous one or on a later line falls back to the end of the
    /// last consumed token.
    fn trailing(&self, expected: &str) -> ParseError {
        let at = self.current.pos;
        let position = if at.line == self.last_end.line && at.column > self.last_end.column {
            Position {
                line: at.line,
                column: at.column - 1,
                offset: at.offset.saturating_sub(1),
            }
        } else {
            self.last_end
        };
        QueryParseError::new(
            self.lexer.source(),
            position,
            format!("unexpected {}, expected {}", self.current.token.describe(), expected),
        )
    }

    /// Parse a complete filter expression.
    pub fn parse(&mut self) -> Result<Node, ParseError> {
        let expr = self.parse_expression()?;
        if !self.check(&Token::Eof) {
            return Err(self.trailing("an operator or end of query"));
        }
        Ok(expr)
    }

    /// Parse a comma-separated select list: `expr [as alias], ...`.
    pub fn parse_select_list(&mut self) -> Result<SelectList, ParseError> {
        let mut items = vec![];

        loop {
            let pos = self.current.pos;
            let expr = self.parse_expression()?;

            let alias = if self.check(&Token::As) {
                self.advance()?;
                match &self.current.token {
                    Token::Identifier(name) => {
                        let name = name.clone();
                        self.advance()?;
                        Some(name)
                    }
                    _ => return Err(self.unexpected("an alias name after 'as'")),
                }
            } else {
                None
            };

            items.push(SelectItem { expr, alias, pos });

            if self.check(&Token::Comma) {
                self.advance()?;
            } else {
                break;
            }
        }

        if !self.check(&Token::Eof) {
            return Err(self.trailing("',' or end of select list"));
        }
        Ok(items)
    }
}

/// Unsuffixed integers are Int32 when they fit, Int64 otherwise.
fn integer_literal(n: i64) -> Literal {
    if i32::try_from(n).is_ok() {
        Literal::Integer(n)
    } else {
        Literal::Long(n)
    }
}
