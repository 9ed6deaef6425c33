use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{ast::Token, error::QueryParseError};

/// Location of a token in the query text.
///
/// `line` and `column` are 1-based, `offset` is a 0-based char index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn start() -> Self {
        Position {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

/// A token, where it starts and where it ends (exclusive).
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: Position,
    pub end: Position,
}

pub type LexError = QueryParseError;

pub struct Lexer {
    source: String,
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            source: input.to_string(),
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// The full query text, used for error diagrams.
    pub fn source(&self) -> &str {
        &self.source
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn here(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: self.position,
        }
    }

    fn advance(&mut self) {
        if self.current_char() == Some('\n') {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.position += 1;
    }

    fn error(&self, pos: Position, message: impl Into<String>) -> LexError {
        QueryParseError::new(&self.source, pos, message)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn read_string(&mut self, quote: char) -> Result<String, LexError> {
        let start = self.here();
        let mut result = String::new();
        self.advance(); // Consume opening quote

        while let Some(ch) = self.current_char() {
            match ch {
                c if c == quote => {
                    // A doubled quote is an escaped quote
                    if self.peek_char(1) == Some(quote) {
                        result.push(quote);
                        self.advance();
                        self.advance();
                        continue;
                    }
                    self.advance();
                    return Ok(result);
                }
                '\\' => {
                    let escape_pos = self.here();
                    self.advance(); // Consume backslash
                    match self.current_char() {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some('r') => result.push('\r'),
                        Some('\'') => result.push('\''),
                        Some('"') => result.push('"'),
                        Some('\\') => result.push('\\'),
                        Some(ch) => {
                            return Err(
                                self.error(escape_pos, format!("invalid escape sequence \\{}", ch))
                            );
                        }
                        None => break,
                    }
                    self.advance();
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        Err(self.error(start, "unterminated string literal"))
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let start = self.here();
        let mut number = String::new();
        let mut is_float = false;

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else if ch == '.'
                && !is_float
                && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
            {
                is_float = true;
                number.push(ch);
                self.advance();
            } else if (ch == 'e' || ch == 'E')
                && (self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
                    || (matches!(self.peek_char(1), Some('-' | '+'))
                        && self.peek_char(2).is_some_and(|c| c.is_ascii_digit())))
            {
                is_float = true;
                number.push(ch);
                self.advance();
                if let Some(sign @ ('-' | '+')) = self.current_char() {
                    number.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }

        let invalid = |this: &Self| this.error(start, format!("invalid number '{}'", number));

        let suffix = self.current_char();
        let token = match suffix {
            Some('L' | 'l') if !is_float => {
                self.advance();
                Token::Long(number.parse::<i64>().map_err(|_| invalid(self))?)
            }
            Some('m' | 'M') => {
                self.advance();
                let parsed = if number.contains(['e', 'E']) {
                    Decimal::from_scientific(&number)
                } else {
                    Decimal::from_str(&number)
                };
                Token::Decimal(parsed.map_err(|_| invalid(self))?)
            }
            Some('f' | 'F' | 'd' | 'D') => {
                self.advance();
                Token::Double(number.parse::<f64>().map_err(|_| invalid(self))?)
            }
            _ if is_float => Token::Double(number.parse::<f64>().map_err(|_| invalid(self))?),
            _ => Token::Integer(number.parse::<i64>().map_err(|_| invalid(self))?),
        };

        if self
            .current_char()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            return Err(self.error(self.here(), "unexpected character after number"));
        }
        Ok(token)
    }

    /// `guid'..'`, `datetime'..'` and `t'..'` literals.
    fn read_prefixed_literal(&mut self, prefix: &str, start: Position) -> Result<Token, LexError> {
        let text = self.read_string('\'')?;
        match prefix {
            "guid" => Uuid::parse_str(&text)
                .map(Token::Guid)
                .map_err(|_| self.error(start, format!("invalid guid literal '{}'", text))),
            "datetime" => parse_datetime(&text)
                .map(Token::DateTime)
                .ok_or_else(|| self.error(start, format!("invalid datetime literal '{}'", text))),
            _ => {
                if text.is_empty() {
                    Err(self.error(start, "empty type name literal"))
                } else {
                    Ok(Token::TypeName(text))
                }
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Spanned, LexError> {
        self.skip_whitespace();
        let pos = self.here();

        let token = match self.current_char() {
            None => Token::Eof,
            Some('(') => {
                self.advance();
                Token::LParen
            }
            Some(')') => {
                self.advance();
                Token::RParen
            }
            Some('[') => {
                self.advance();
                Token::LBracket
            }
            Some(']') => {
                self.advance();
                Token::RBracket
            }
            Some(',') => {
                self.advance();
                Token::Comma
            }
            Some(':') => {
                self.advance();
                Token::Colon
            }
            Some('.') => {
                self.advance();
                Token::Dot
            }
            Some('-') => {
                self.advance();
                Token::Minus
            }
            Some('\'') => Token::String(self.read_string('\'')?),
            Some('"') => Token::String(self.read_string('"')?),
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let ident = self.read_identifier();

                if self.current_char() == Some('\'')
                    && matches!(ident.as_str(), "guid" | "datetime" | "t")
                {
                    self.read_prefixed_literal(&ident, pos)?
                } else {
                    match ident.as_str() {
                        "eq" => Token::Eq,
                        "ne" => Token::Ne,
                        "gt" => Token::Gt,
                        "ge" => Token::Ge,
                        "lt" => Token::Lt,
                        "le" => Token::Le,
                        "and" => Token::And,
                        "or" => Token::Or,
                        "not" => Token::Not,
                        "add" => Token::Add,
                        "sub" => Token::Sub,
                        "mul" => Token::Mul,
                        "div" => Token::Div,
                        "mod" => Token::Mod,
                        "in" => Token::In,
                        "as" => Token::As,
                        "true" => Token::Boolean(true),
                        "false" => Token::Boolean(false),
                        "null" => Token::Null,
                        _ => Token::Identifier(ident),
                    }
                }
            }
            Some(ch) if ch.is_ascii_digit() => self.read_number()?,
            Some(ch) => {
                return Err(self.error(pos, format!("unexpected character '{}'", ch)));
            }
        };

        Ok(Spanned {
            token,
            pos,
            end: self.here(),
        })
    }

    /// Lexes the whole input; mostly useful for tests and tooling.
    pub fn tokenize(mut self) -> Result<Vec<Spanned>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                return Ok(tokens);
            }
        }
    }
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[test]
fn test_keywords() {
    let mut lexer = Lexer::new("and or not true false null");
    assert_eq!(lexer.next_token().unwrap().token, Token::And);
    assert_eq!(lexer.next_token().unwrap().token, Token::Or);
    assert_eq!(lexer.next_token().unwrap().token, Token::Not);
    assert_eq!(lexer.next_token().unwrap().token, Token::Boolean(true));
    assert_eq!(lexer.next_token().unwrap().token, Token::Boolean(false));
    assert_eq!(lexer.next_token().unwrap().token, Token::Null);
}

#[test]
fn test_positions() {
    let mut lexer = Lexer::new("name eq\n  'x'");
    let name = lexer.next_token().unwrap();
    assert_eq!((name.pos.line, name.pos.column), (1, 1));
    let eq = lexer.next_token().unwrap();
    assert_eq!((eq.pos.line, eq.pos.column), (1, 6));
    let s = lexer.next_token().unwrap();
    assert_eq!((s.pos.line, s.pos.column, s.pos.offset), (2, 3, 10));
}
