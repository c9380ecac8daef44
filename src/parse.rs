//! A parser for loop bounds written as integer literals or affine maps.
//!
//! Maps use the MLIR notation, e.g. `(d0, d1)[s0] -> (d0 + s0 * 4, d1 floordiv 2)`. Inputs may
//! be given any names; they are bound to dimensions and symbols by position.

use crate::expr::{AffineContext, AffineExpr};
use crate::loops::{AffineBound, AffineMap, Bound, OperandId};
use std::collections::HashMap;
use std::fmt;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("Integer literal {0} does not fit in 64 bits")]
    IntegerOutOfRange(String),
    #[error("Expected {expected}, found {found}")]
    Expected { expected: &'static str, found: String },
    #[error("Name {0} is not an input of the map")]
    UnknownName(String),
    #[error("Map input {0} is declared more than once")]
    DuplicateInput(String),
    #[error("Bound takes {expected} operands, but {given} were given")]
    OperandCount { expected: usize, given: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Int(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Plus,
    Minus,
    Star,
    Arrow,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(s) | Token::Ident(s) => write!(f, "{s:?}"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::LBracket => f.write_str("'['"),
            Token::RBracket => f.write_str("']'"),
            Token::Comma => f.write_str("','"),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Arrow => f.write_str("'->'"),
            Token::Eof => f.write_str("end of input"),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '+' => Token::Plus,
            '*' => Token::Star,
            '-' => {
                if chars.next_if(|&(_, c)| c == '>').is_some() {
                    Token::Arrow
                } else {
                    Token::Minus
                }
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::from(c);
                while let Some((_, d)) = chars.next_if(|(_, d)| d.is_ascii_digit()) {
                    digits.push(d);
                }
                Token::Int(digits)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::from(c);
                while let Some((_, d)) = chars.next_if(|(_, d)| d.is_alphanumeric() || *d == '_') {
                    name.push(d);
                }
                Token::Ident(name)
            }
            _ => return Err(ParseError::UnexpectedChar(c, offset)),
        };
        tokens.push(token);
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

struct Parser<'c> {
    ctx: &'c mut AffineContext,
    tokens: Vec<Token>,
    pos: usize,
    inputs: HashMap<String, AffineExpr>,
}

impl<'c> Parser<'c> {
    fn new(ctx: &'c mut AffineContext, text: &str) -> Result<Self, ParseError> {
        Ok(Parser {
            ctx,
            tokens: tokenize(text)?,
            pos: 0,
            inputs: HashMap::new(),
        })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if token != Token::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<(), ParseError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        ParseError::Expected {
            expected,
            found: self.peek().to_string(),
        }
    }

    fn parse_map(&mut self) -> Result<AffineMap, ParseError> {
        self.expect(Token::LParen, "'(' opening the dimension list")?;
        let num_dims = self.parse_inputs(Token::RParen, AffineContext::dim)?;
        let num_symbols = if self.eat(&Token::LBracket) {
            self.parse_inputs(Token::RBracket, AffineContext::symbol)?
        } else {
            0
        };
        self.expect(Token::Arrow, "'->'")?;
        self.expect(Token::LParen, "'(' opening the result list")?;
        let mut results = vec![self.parse_expr()?];
        while self.eat(&Token::Comma) {
            results.push(self.parse_expr()?);
        }
        self.expect(Token::RParen, "')' closing the result list")?;
        if *self.peek() != Token::Eof {
            return Err(self.unexpected("end of input"));
        }
        Ok(AffineMap::new(num_dims, num_symbols, results))
    }

    /// Parses a comma-separated list of input names up to `close`, binding the i-th name to
    /// `make(ctx, i)`.
    fn parse_inputs(
        &mut self,
        close: Token,
        make: fn(&mut AffineContext, u32) -> AffineExpr,
    ) -> Result<u32, ParseError> {
        let mut count = 0;
        if self.eat(&close) {
            return Ok(count);
        }
        loop {
            let Token::Ident(name) = self.peek().clone() else {
                return Err(self.unexpected("an input name"));
            };
            self.advance();
            let input = make(self.ctx, count);
            if self.inputs.insert(name.clone(), input).is_some() {
                return Err(ParseError::DuplicateInput(name));
            }
            count += 1;
            if self.eat(&close) {
                return Ok(count);
            }
            self.expect(Token::Comma, "',' between inputs")?;
        }
    }

    fn parse_expr(&mut self) -> Result<AffineExpr, ParseError> {
        let mut lhs = self.parse_term()?;
        loop {
            if self.eat(&Token::Plus) {
                let rhs = self.parse_term()?;
                lhs = self.ctx.add(lhs, rhs);
            } else if self.eat(&Token::Minus) {
                let rhs = self.parse_term()?;
                lhs = self.ctx.sub(lhs, rhs);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_term(&mut self) -> Result<AffineExpr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let build: fn(&mut AffineContext, AffineExpr, AffineExpr) -> AffineExpr =
                match self.peek() {
                    Token::Star => AffineContext::mul,
                    Token::Ident(kw) if kw == "floordiv" => AffineContext::floor_div,
                    Token::Ident(kw) if kw == "ceildiv" => AffineContext::ceil_div,
                    Token::Ident(kw) if kw == "mod" => AffineContext::modulo,
                    _ => return Ok(lhs),
                };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = build(self.ctx, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> Result<AffineExpr, ParseError> {
        if !self.eat(&Token::Minus) {
            return self.parse_primary();
        }
        if let Token::Int(digits) = self.peek() {
            let literal = format!("-{digits}");
            self.advance();
            return self.integer(literal);
        }
        let operand = self.parse_unary()?;
        let neg_one = self.ctx.constant(-1);
        Ok(self.ctx.mul(operand, neg_one))
    }

    fn parse_primary(&mut self) -> Result<AffineExpr, ParseError> {
        match self.peek().clone() {
            Token::Int(digits) => {
                self.advance();
                self.integer(digits)
            }
            Token::Ident(name) => {
                self.advance();
                self.inputs
                    .get(&name)
                    .copied()
                    .ok_or(ParseError::UnknownName(name))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn integer(&mut self, literal: String) -> Result<AffineExpr, ParseError> {
        match literal.parse::<i64>() {
            Ok(v) => Ok(self.ctx.constant(v)),
            Err(_) => Err(ParseError::IntegerOutOfRange(literal)),
        }
    }
}

/// Parses an affine map such as `(d0)[s0] -> (d0 + s0)`.
pub fn parse_affine_map(ctx: &mut AffineContext, text: &str) -> Result<AffineMap, ParseError> {
    Parser::new(ctx, text)?.parse_map()
}

/// Parses a loop bound: either an integer literal or an affine map applied to `operands`.
///
/// The number of operands must match the number of map inputs, and a literal takes none.
pub fn parse_bound(
    ctx: &mut AffineContext,
    text: &str,
    operands: &[OperandId],
) -> Result<Bound, ParseError> {
    if let Ok(value) = text.trim().parse::<i64>() {
        if !operands.is_empty() {
            return Err(ParseError::OperandCount {
                expected: 0,
                given: operands.len(),
            });
        }
        return Ok(Bound::Constant(value));
    }
    let map = parse_affine_map(ctx, text)?;
    if map.num_inputs() != operands.len() {
        return Err(ParseError::OperandCount {
            expected: map.num_inputs(),
            given: operands.len(),
        });
    }
    Ok(Bound::Affine(AffineBound::new(map, operands.iter().copied())))
}

#[cfg(test)]
mod tests {
    use super::{parse_affine_map, parse_bound, ParseError};
    use crate::expr::AffineContext;
    use crate::loops::{Bound, OperandId};

    fn roundtrip(text: &str) -> String {
        let mut ctx = AffineContext::new();
        let map = parse_affine_map(&mut ctx, text).unwrap();
        map.display(&ctx).to_string()
    }

    #[test]
    fn test_parse_simple_map() {
        let mut ctx = AffineContext::new();
        let map = parse_affine_map(&mut ctx, "(d0)[s0] -> (d0 + s0 * 4)").unwrap();
        assert_eq!(map.num_dims, 1);
        assert_eq!(map.num_symbols, 1);
        let d0 = ctx.dim(0);
        let s0 = ctx.symbol(0);
        let four = ctx.constant(4);
        let scaled = ctx.mul(s0, four);
        let expected = ctx.add(d0, scaled);
        assert_eq!(map.single_result(), Some(expected));
    }

    #[test]
    fn test_inputs_bind_by_position() {
        let mut ctx = AffineContext::new();
        let map = parse_affine_map(&mut ctx, "(i, j)[n] -> (j - i, n)").unwrap();
        assert_eq!(map.display(&ctx).to_string(), "(d0, d1)[s0] -> (d1 - d0, s0)");
    }

    #[test]
    fn test_precedence_and_keywords() {
        assert_eq!(
            roundtrip("(d0)[s0] -> ((d0 + s0 - 1) ceildiv 4)"),
            "(d0)[s0] -> ((d0 + s0 - 1) ceildiv 4)"
        );
        assert_eq!(
            roundtrip("(d0) -> (d0 - (d0 + 3) mod 2 floordiv 5)"),
            "(d0) -> (d0 - (d0 + 3) mod 2 floordiv 5)"
        );
        assert_eq!(roundtrip("() -> (-5, 3 * -2)"), "() -> (-5, 3 * -2)");
    }

    #[test]
    fn test_unary_minus_of_expression() {
        let mut ctx = AffineContext::new();
        let map = parse_affine_map(&mut ctx, "(d0) -> (-d0)").unwrap();
        let result = map.single_result().unwrap();
        assert_eq!(ctx.display(result).to_string(), "d0 * -1");
    }

    #[test]
    fn test_parse_errors() {
        let mut ctx = AffineContext::new();
        assert_eq!(
            parse_affine_map(&mut ctx, "(d0) -> (d1)"),
            Err(ParseError::UnknownName("d1".to_owned()))
        );
        assert_eq!(
            parse_affine_map(&mut ctx, "(d0, d0) -> (d0)"),
            Err(ParseError::DuplicateInput("d0".to_owned()))
        );
        assert_eq!(
            parse_affine_map(&mut ctx, "(d0) -> (d0 / 2)"),
            Err(ParseError::UnexpectedChar('/', 12))
        );
        assert!(matches!(
            parse_affine_map(&mut ctx, "(d0) -> (d0"),
            Err(ParseError::Expected { .. })
        ));
        assert!(matches!(
            parse_affine_map(&mut ctx, "(d0) -> (d0) d0"),
            Err(ParseError::Expected { .. })
        ));
        assert_eq!(
            parse_affine_map(&mut ctx, "() -> (99999999999999999999)"),
            Err(ParseError::IntegerOutOfRange(
                "99999999999999999999".to_owned()
            ))
        );
    }

    #[test]
    fn test_parse_bound() {
        let mut ctx = AffineContext::new();
        assert_eq!(parse_bound(&mut ctx, " -3 ", &[]), Ok(Bound::Constant(-3)));
        assert_eq!(
            parse_bound(&mut ctx, "7", &[OperandId(0)]),
            Err(ParseError::OperandCount {
                expected: 0,
                given: 1
            })
        );
        let bound = parse_bound(&mut ctx, "(d0)[s0] -> (d0 + s0)", &[OperandId(0), OperandId(1)])
            .unwrap();
        let Bound::Affine(affine) = bound else {
            panic!("expected an affine bound");
        };
        assert_eq!(affine.operands.as_slice(), &[OperandId(0), OperandId(1)]);
        assert_eq!(
            parse_bound(&mut ctx, "(d0)[s0] -> (d0 + s0)", &[OperandId(0)]),
            Err(ParseError::OperandCount {
                expected: 2,
                given: 1
            })
        );
    }

    #[test]
    fn test_single_constant_result_map_is_constant_bound() {
        let mut ctx = AffineContext::new();
        let bound = parse_bound(&mut ctx, "() -> (12)", &[]).unwrap();
        assert_eq!(bound.as_constant(&ctx), Some(12));
    }
}
