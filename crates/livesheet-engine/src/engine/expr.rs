//! Residual formula expressions.
//!
//! After references have been substituted, what remains of a formula is a
//! small expression language: number and string literals, `TRUE`/`FALSE`,
//! `+ - * /`, comparisons, parentheses and `NAME(args)` calls. This module
//! parses it into an [`Expr`] tree with a recursive descent parser. Nesting
//! is bounded by `max_depth`; exceeding it is an error, not a stack overflow.
//!
//! Precedence, loosest first: comparison, additive, multiplicative, unary.
//!
//! Operator chains such as `1+1+...+1` are not nesting: they build a long
//! left spine, which is dropped and evaluated without recursing along it.

use crate::error::{FormulaError, FormulaResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Move the direct children out, leaving cheap leaves behind.
    fn take_children(&mut self, out: &mut Vec<Expr>) {
        match self {
            Expr::Unary { operand, .. } => out.push(std::mem::replace(&mut **operand, Expr::Num(0.0))),
            Expr::BinOp { left, right, .. } => {
                out.push(std::mem::replace(&mut **left, Expr::Num(0.0)));
                out.push(std::mem::replace(&mut **right, Expr::Num(0.0)));
            }
            Expr::Call { args, .. } => out.append(args),
            Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) => {}
        }
    }
}

impl Drop for Expr {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.take_children(&mut pending);
        while let Some(mut expr) = pending.pop() {
            expr.take_children(&mut pending);
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn tokenize(input: &str) -> FormulaResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            '=' => Some(Token::Eq),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(token);
            i += 1;
            continue;
        }

        match c {
            '<' => {
                let (token, width) = match chars.get(i + 1) {
                    Some('=') => (Token::Le, 2),
                    Some('>') => (Token::Ne, 2),
                    _ => (Token::Lt, 1),
                };
                tokens.push(token);
                i += width;
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '"' => {
                let (text, next) = scan_string(&chars, i)?;
                tokens.push(Token::Str(text));
                i = next;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let (n, next) = scan_number(&chars, i)?;
                tokens.push(Token::Number(n));
                i = next;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(FormulaError::Parse(format!("unexpected character {:?}", other)));
            }
        }
    }

    Ok(tokens)
}

/// Scan a double-quoted literal starting at `start`; `\` escapes the next char.
fn scan_string(chars: &[char], start: usize) -> FormulaResult<(String, usize)> {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let Some(&escaped) = chars.get(i + 1) else {
                    break;
                };
                out.push(escaped);
                i += 2;
            }
            '"' => return Ok((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(FormulaError::Parse("unterminated string literal".to_string()))
}

fn scan_number(chars: &[char], start: usize) -> FormulaResult<(f64, usize)> {
    let mut i = start;
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
        i += 1;
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    let text: String = chars[start..i].iter().collect();
    let n = text
        .parse::<f64>()
        .map_err(|_| FormulaError::Parse(format!("invalid number {:?}", text)))?;
    Ok((n, i))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> FormulaResult<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(FormulaError::Parse(format!(
                "expected {:?}, found {:?}",
                expected, token
            ))),
            None => Err(FormulaError::Parse(format!(
                "expected {:?}, found end of formula",
                expected
            ))),
        }
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> FormulaResult<T>) -> FormulaResult<T> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(FormulaError::TooDeep(self.max_depth));
        }
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn parse_expression(&mut self) -> FormulaResult<Expr> {
        self.nested(Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> FormulaResult<Expr> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            _ => return self.parse_primary(),
        };
        self.pos += 1;
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_primary(&mut self) -> FormulaResult<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Num(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    return self.parse_call(name.to_ascii_uppercase());
                }
                if name.eq_ignore_ascii_case("true") {
                    Ok(Expr::Bool(true))
                } else if name.eq_ignore_ascii_case("false") {
                    Ok(Expr::Bool(false))
                } else {
                    Err(FormulaError::Parse(format!("unresolved name {:?}", name)))
                }
            }
            Some(token) => Err(FormulaError::Parse(format!("unexpected token {:?}", token))),
            None => Err(FormulaError::Parse("unexpected end of formula".to_string())),
        }
    }

    /// Parse call arguments; the opening parenthesis is already consumed.
    fn parse_call(&mut self, name: String) -> FormulaResult<Expr> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(Expr::Call { name, args });
        }
        loop {
            args.push(self.parse_expression()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                Some(token) => {
                    return Err(FormulaError::Parse(format!(
                        "expected ',' or ')' in call to {}, found {:?}",
                        name, token
                    )));
                }
                None => {
                    return Err(FormulaError::Parse(format!(
                        "unterminated call to {}",
                        name
                    )));
                }
            }
        }
        Ok(Expr::Call { name, args })
    }
}

/// Parse a residual expression. The whole input must be consumed.
pub fn parse_expression(input: &str, max_depth: usize) -> FormulaResult<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(FormulaError::Parse("empty formula".to_string()));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        max_depth,
    };
    let expr = parser.parse_expression()?;
    if let Some(token) = parser.peek() {
        return Err(FormulaError::Parse(format!(
            "unexpected {:?} after expression",
            token
        )));
    }
    Ok(expr)
}
