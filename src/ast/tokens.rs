use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    /// Unsuffixed integer literal; the parser picks Int32 or Int64 once
    /// any leading minus is known
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 3000000000
    /// ```
    Integer(i64),

    /// 64-bit integer literal, suffixed with `L`
    ///
    /// # Examples
    /// ```text
    /// 42L
    /// ```
    Long(i64),

    /// Floating point literal
    ///
    /// # Examples
    /// ```text
    /// 3.14
    /// 2f
    /// ```
    Double(f64),

    /// Decimal literal, suffixed with `m`
    ///
    /// # Examples
    /// ```text
    /// 19.99m
    /// ```
    Decimal(Decimal),

    /// String literal in single (or double) quotes; `''` escapes a quote
    ///
    /// # Examples
    /// ```text
    /// 'whatever'
    /// 'it''s'
    /// ```
    String(String),

    /// `guid'...'` literal
    Guid(Uuid),

    /// `datetime'...'` literal (ISO 8601)
    DateTime(DateTime<Utc>),

    /// `t'TypeName'` literal
    TypeName(String),

    /// `true` / `false`
    Boolean(bool),

    /// `null`
    Null,

    /// Property, parameter or function name
    ///
    /// # Examples
    /// ```text
    /// hat
    /// _this
    /// firstdefault
    /// ```
    Identifier(String),

    // Keyword operators
    /// `eq`
    Eq,
    /// `ne`
    Ne,
    /// `gt`
    Gt,
    /// `ge`
    Ge,
    /// `lt`
    Lt,
    /// `le`
    Le,
    /// `and`
    And,
    /// `or`
    Or,
    /// `not`
    Not,
    /// `add`
    Add,
    /// `sub`
    Sub,
    /// `mul`
    Mul,
    /// `div`
    Div,
    /// `mod`
    Mod,
    /// `in` (array membership)
    In,
    /// `as` (select-list alias)
    As,

    // Delimiters
    /// Unary minus sign
    Minus,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    /// Separates a lambda parameter from its body (`x:x.name eq 'a'`)
    Colon,
    Dot,

    /// End of input
    Eof,
}

impl Token {
    /// Short description for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Token::Integer(n) | Token::Long(n) => format!("number {}", n),
            Token::Double(n) => format!("number {}", n),
            Token::Decimal(n) => format!("number {}", n),
            Token::String(s) => format!("string '{}'", s),
            Token::Guid(g) => format!("guid '{}'", g),
            Token::DateTime(d) => format!("datetime '{}'", d.to_rfc3339()),
            Token::TypeName(t) => format!("type '{}'", t),
            Token::Boolean(b) => b.to_string(),
            Token::Null => "null".to_string(),
            Token::Identifier(name) => format!("'{}'", name),
            Token::Eq => "'eq'".to_string(),
            Token::Ne => "'ne'".to_string(),
            Token::Gt => "'gt'".to_string(),
            Token::Ge => "'ge'".to_string(),
            Token::Lt => "'lt'".to_string(),
            Token::Le => "'le'".to_string(),
            Token::And => "'and'".to_string(),
            Token::Or => "'or'".to_string(),
            Token::Not => "'not'".to_string(),
            Token::Add => "'add'".to_string(),
            Token::Sub => "'sub'".to_string(),
            Token::Mul => "'mul'".to_string(),
            Token::Div => "'div'".to_string(),
            Token::Mod => "'mod'".to_string(),
            Token::In => "'in'".to_string(),
            Token::As => "'as'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Eof => "end of query".to_string(),
        }
    }
}
