//! Hand-rolled recursive descent parser for the condition DSL.
//!
//! The grammar is small enough (a handful of prefix function calls) that a
//! parser-combinator dependency would be overkill; this follows the same
//! manual small-parser idiom this workspace already uses for period
//! strings, just with an explicit tokenizer in front of it.

use qcp_common::{QcpError, QcpResult};

use super::ast::Condition;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    StringLit(String),
    Number(i64),
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> QcpResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => { tokens.push(Token::LParen); i += 1; }
            ')' => { tokens.push(Token::RParen); i += 1; }
            ',' => { tokens.push(Token::Comma); i += 1; }
            '"' => {
                let mut literal = String::new();
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    if chars[i] == '"' {
                        closed = true;
                        i += 1;
                        break;
                    }
                    literal.push(chars[i]);
                    i += 1;
                }
                if !closed {
                    return Err(QcpError::Validation("unterminated string literal in condition".to_string()));
                }
                tokens.push(Token::StringLit(literal));
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                while i < chars.len() && chars[i].is_ascii_digit() {
                    digits.push(chars[i]);
                    i += 1;
                }
                let n = digits
                    .parse()
                    .map_err(|_| QcpError::Validation(format!("invalid number literal '{digits}' in condition")))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphanumeric() || c == '-' || c == '_' => {
                let mut ident = String::new();
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '-' || chars[i] == '_') {
                    ident.push(chars[i]);
                    i += 1;
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(QcpError::Validation(format!("unexpected character '{other}' in condition")));
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
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token) -> QcpResult<()> {
        match self.advance() {
            Some(ref t) if t == expected => Ok(()),
            other => Err(QcpError::Validation(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    fn expect_string(&mut self) -> QcpResult<String> {
        match self.advance() {
            Some(Token::StringLit(s)) => Ok(s),
            other => Err(QcpError::Validation(format!("expected string literal, found {other:?}"))),
        }
    }

    fn expect_number(&mut self) -> QcpResult<i64> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(n),
            other => Err(QcpError::Validation(format!("expected number literal, found {other:?}"))),
        }
    }

    /// One or more comma-separated string literals, e.g. `belong-to`'s args.
    fn parse_string_list(&mut self) -> QcpResult<Vec<String>> {
        let mut strings = vec![self.expect_string()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.advance();
            strings.push(self.expect_string()?);
        }
        Ok(strings)
    }

    fn parse_expr(&mut self) -> QcpResult<Condition> {
        let name = match self.advance() {
            Some(Token::Ident(name)) => name,
            other => return Err(QcpError::Validation(format!("expected function name, found {other:?}"))),
        };
        self.expect(&Token::LParen)?;

        let condition = match name.as_str() {
            "true" => Condition::True,
            "is-vip" => Condition::IsVip(self.expect_number()?),
            "github-star" => Condition::GithubStar(self.expect_string()?),
            "belong-to" => Condition::BelongTo(self.parse_string_list()?),
            "attr" => {
                let key = self.expect_string()?;
                self.expect(&Token::Comma)?;
                let value = self.expect_string()?;
                Condition::Attr(key, value)
            }
            "not" => Condition::Not(Box::new(self.parse_expr()?)),
            "and" => Condition::And(self.parse_expr_list()?),
            "or" => Condition::Or(self.parse_expr_list()?),
            other => return Err(QcpError::Validation(format!("unknown condition function '{other}'"))),
        };

        self.expect(&Token::RParen)?;
        Ok(condition)
    }

    fn parse_expr_list(&mut self) -> QcpResult<Vec<Condition>> {
        let mut exprs = vec![self.parse_expr()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.advance();
            exprs.push(self.parse_expr()?);
        }
        if exprs.len() < 2 {
            return Err(QcpError::Validation("and()/or() require at least two conditions".to_string()));
        }
        Ok(exprs)
    }
}

/// Parse a condition expression from its source text.
pub fn parse(input: &str) -> QcpResult<Condition> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let condition = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(QcpError::Validation("trailing input after condition expression".to_string()));
    }
    Ok(condition)
}
