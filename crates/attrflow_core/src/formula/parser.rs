//! Tokenizer and recursive-descent parser for the formula language.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | primary
//! primary := '$' digits | digits ('.' digits)? | '(' expr ')'
//! ```

use super::{BinaryOp, Expr, FormulaError, FormulaResult};
use crate::model::AttributeId;

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Reference(AttributeId),
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

/// Parses formula text into an expression tree.
///
/// Does not check that the formula references any attribute; see
/// [`super::parse_formula`].
pub fn parse_expression(text: &str) -> FormulaResult<Expr> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(FormulaError::syntax(0, "formula is empty"));
    }
    Parser {
        tokens,
        index: 0,
        end: text.len(),
    }
    .parse()
}

fn tokenize(text: &str) -> FormulaResult<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < bytes.len() {
        let current = bytes[index];
        let start = index;
        let kind = match current {
            _ if current.is_ascii_whitespace() || current == b'\x0b' => {
                index += 1;
                continue;
            }
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'$' => {
                let digits_end = scan_digits(bytes, index + 1);
                if digits_end == index + 1 {
                    return Err(FormulaError::syntax(
                        start,
                        "`$` must be followed by an attribute id",
                    ));
                }
                let id = text[index + 1..digits_end]
                    .parse::<AttributeId>()
                    .map_err(|_| FormulaError::syntax(start, "attribute id is out of range"))?;
                if id < 1 {
                    return Err(FormulaError::syntax(start, "attribute ids start at 1"));
                }
                index = digits_end;
                tokens.push(Token {
                    kind: TokenKind::Reference(id),
                    position: start,
                });
                continue;
            }
            b'0'..=b'9' => {
                let mut literal_end = scan_digits(bytes, index);
                if bytes.get(literal_end) == Some(&b'.') {
                    let fraction_end = scan_digits(bytes, literal_end + 1);
                    if fraction_end == literal_end + 1 {
                        return Err(FormulaError::syntax(
                            literal_end,
                            "decimal point must be followed by digits",
                        ));
                    }
                    literal_end = fraction_end;
                }
                let value = text[index..literal_end]
                    .parse::<f64>()
                    .map_err(|_| FormulaError::syntax(start, "invalid numeric literal"))?;
                if !value.is_finite() {
                    return Err(FormulaError::syntax(start, "numeric literal is out of range"));
                }
                index = literal_end;
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    position: start,
                });
                continue;
            }
            _ => {
                let unexpected = text[index..].chars().next().unwrap_or('?');
                if unexpected.is_whitespace() {
                    index += unexpected.len_utf8();
                    continue;
                }
                return Err(FormulaError::syntax(
                    start,
                    format!("unexpected character `{unexpected}`"),
                ));
            }
        };
        index += 1;
        tokens.push(Token {
            kind,
            position: start,
        });
    }

    Ok(tokens)
}

fn scan_digits(bytes: &[u8], from: usize) -> usize {
    let mut index = from;
    while index < bytes.len() && bytes[index].is_ascii_digit() {
        index += 1;
    }
    index
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    end: usize,
}

impl Parser {
    fn parse(mut self) -> FormulaResult<Expr> {
        let expr = self.parse_add_sub()?;
        if let Some(token) = self.peek() {
            return Err(FormulaError::syntax(
                token.position,
                unexpected_message(&token.kind),
            ));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|token| &token.kind)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn parse_add_sub(&mut self) -> FormulaResult<Expr> {
        let mut expr = self.parse_mul_div()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Subtract,
                _ => break,
            };
            let _ = self.consume();
            let rhs = self.parse_mul_div()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn parse_mul_div(&mut self) -> FormulaResult<Expr> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Multiply,
                Some(TokenKind::Slash) => BinaryOp::Divide,
                _ => break,
            };
            let _ = self.consume();
            let rhs = self.parse_unary()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> FormulaResult<Expr> {
        if matches!(self.peek_kind(), Some(TokenKind::Minus)) {
            let _ = self.consume();
            return Ok(Expr::Negate(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> FormulaResult<Expr> {
        let Some(token) = self.consume() else {
            return Err(FormulaError::syntax(self.end, "unexpected end of formula"));
        };
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Constant(value)),
            TokenKind::Reference(id) => Ok(Expr::Reference(id)),
            TokenKind::LParen => {
                let expr = self.parse_add_sub()?;
                match self.consume() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(expr),
                    Some(other) => Err(FormulaError::syntax(
                        other.position,
                        format!("expected `)` but found {}", describe(&other.kind)),
                    )),
                    None => Err(FormulaError::syntax(
                        token.position,
                        "unbalanced parentheses: `(` is never closed",
                    )),
                }
            }
            other => Err(FormulaError::syntax(
                token.position,
                unexpected_message(&other),
            )),
        }
    }
}

fn unexpected_message(kind: &TokenKind) -> String {
    match kind {
        TokenKind::RParen => "unbalanced parentheses: unexpected `)`".to_string(),
        other => format!("unexpected {}", describe(other)),
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Reference(id) => format!("reference `${id}`"),
        TokenKind::Number(value) => format!("number `{value}`"),
        TokenKind::Plus => "`+`".to_string(),
        TokenKind::Minus => "`-`".to_string(),
        TokenKind::Star => "`*`".to_string(),
        TokenKind::Slash => "`/`".to_string(),
        TokenKind::LParen => "`(`".to_string(),
        TokenKind::RParen => "`)`".to_string(),
    }
}
