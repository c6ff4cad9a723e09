use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CalcError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CalculationId(pub Ulid);

impl CalculationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for CalculationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CalculationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One persisted evaluation: the submitted expression, its numeric result,
/// and the moment it was computed. Immutable once appended to history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalculationRecord {
    pub id: CalculationId,
    pub expression: String,
    pub result: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl CalculationRecord {
    #[must_use]
    pub fn new(expression: String, result: f64) -> Self {
        Self {
            id: CalculationId::new(),
            expression,
            result,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Validate one history record before it is appended.
    ///
    /// # Errors
    /// Returns [`CalcError::Validation`] when the expression is blank or the
    /// result is not a finite number.
    pub fn validate(&self) -> Result<(), CalcError> {
        if self.expression.trim().is_empty() {
            return Err(CalcError::Validation(
                "expression MUST be non-empty".to_string(),
            ));
        }

        if !self.result.is_finite() {
            return Err(CalcError::Validation(
                "result MUST be a finite number".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
}

fn token_text(token: Token) -> String {
    match token {
        Token::Number(value) => value.to_string(),
        Token::Plus => "+".to_string(),
        Token::Minus => "-".to_string(),
        Token::Star => "*".to_string(),
        Token::Slash => "/".to_string(),
    }
}

fn tokenize(expression: &str) -> Result<Vec<Token>, CalcError> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some(&(index, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' => {
                tokens.push(Token::Plus);
                chars.next();
            }
            '-' => {
                tokens.push(Token::Minus);
                chars.next();
            }
            // `x` is what calculator keypads send for multiplication.
            '*' | 'x' => {
                tokens.push(Token::Star);
                chars.next();
            }
            '/' => {
                tokens.push(Token::Slash);
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal.parse::<f64>().map_err(|_| {
                    CalcError::Parse(format!("invalid number literal `{literal}`"))
                })?;
                tokens.push(Token::Number(value));
            }
            other => {
                return Err(CalcError::Parse(format!(
                    "unexpected character `{other}` at position {index}"
                )));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expression(&mut self) -> Result<f64, CalcError> {
        let mut value = self.parse_term()?;

        while let Some(token) = self.peek() {
            match token {
                Token::Plus => {
                    self.advance();
                    value += self.parse_term()?;
                }
                Token::Minus => {
                    self.advance();
                    value -= self.parse_term()?;
                }
                _ => break,
            }
        }

        Ok(value)
    }

    fn parse_term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.parse_factor()?;

        while let Some(token) = self.peek() {
            match token {
                Token::Star => {
                    self.advance();
                    value *= self.parse_factor()?;
                }
                Token::Slash => {
                    self.advance();
                    let divisor = self.parse_factor()?;
                    if divisor == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }

        Ok(value)
    }

    fn parse_factor(&mut self) -> Result<f64, CalcError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::Minus) => Ok(-self.parse_factor()?),
            Some(Token::Plus) => self.parse_factor(),
            Some(token) => Err(CalcError::Parse(format!(
                "expected a number, found `{}`",
                token_text(token)
            ))),
            None => Err(CalcError::Parse("unexpected end of expression".to_string())),
        }
    }
}

/// Evaluate a calculator expression with standard operator precedence:
/// `*` and `/` bind tighter than `+` and `-`, equal precedence associates
/// left to right. Accepts decimal numbers, optional unary sign, interior
/// whitespace, and `x` as an alias for `*`.
///
/// # Errors
/// Returns [`CalcError::Parse`] for malformed input, [`CalcError::DivisionByZero`]
/// when a divisor evaluates to zero, and [`CalcError::NonFinite`] when the
/// result leaves the finite `f64` range.
pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(CalcError::Parse("empty expression".to_string()));
    }

    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.parse_expression()?;

    if let Some(token) = parser.peek() {
        return Err(CalcError::Parse(format!(
            "unexpected token `{}` after expression",
            token_text(token)
        )));
    }

    if !value.is_finite() {
        return Err(CalcError::NonFinite);
    }

    Ok(value)
}
