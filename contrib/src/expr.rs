//! Bin expressions: a small arithmetic language evaluated once per traced
//! ray to select which accumulator bin receives the contribution.
//!
//! Grammar (recursive descent):
//!   expr   := term (('+' | '-') term)*
//!   term   := factor (('*' | '/') factor)*
//!   factor := '-' factor | number | variable | func '(' expr ')' | '(' expr ')'
//!
//! Variables come from the hit context: `px py pz` (hit position),
//! `dx dy dz` (ray direction), `t` (ray parameter at the hit).

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{0}' in bin expression")]
    BadChar(char),
    #[error("unknown name '{0}' in bin expression")]
    UnknownName(String),
    #[error("malformed bin expression near '{0}'")]
    Malformed(String),
}

/// Values a bin expression can read, captured from one ray-surface hit.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinContext {
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub t: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Var {
    Px,
    Py,
    Pz,
    Dx,
    Dy,
    Dz,
    T,
}

impl Var {
    fn read(self, ctx: &BinContext) -> f64 {
        match self {
            Var::Px => ctx.px,
            Var::Py => ctx.py,
            Var::Pz => ctx.pz,
            Var::Dx => ctx.dx,
            Var::Dy => ctx.dy,
            Var::Dz => ctx.dz,
            Var::T => ctx.t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Func {
    Floor,
    Abs,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(Var),
    Neg(Box<Expr>),
    Bin(Op, Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
}

impl Expr {
    /// Parses the expression source, or the constant `0` for `None`
    /// (single-bin modifiers leave the expression unspecified).
    pub fn parse_or_zero(src: Option<&str>) -> Result<Expr, ExprError> {
        match src {
            None => Ok(Expr::Num(0.0)),
            Some(s) => parse(s),
        }
    }

    pub fn eval(&self, ctx: &BinContext) -> f64 {
        match self {
            Expr::Num(v) => *v,
            Expr::Var(var) => var.read(ctx),
            Expr::Neg(e) => -e.eval(ctx),
            Expr::Bin(op, a, b) => {
                let (a, b) = (a.eval(ctx), b.eval(ctx));
                match op {
                    Op::Add => a + b,
                    Op::Sub => a - b,
                    Op::Mul => a * b,
                    Op::Div => a / b,
                }
            }
            Expr::Call(f, e) => {
                let v = e.eval(ctx);
                match f {
                    Func::Floor => v.floor(),
                    Func::Abs => v.abs(),
                }
            }
        }
    }

    /// The expression's value if it reads no variables, `None` otherwise.
    pub fn constant(&self) -> Option<f64> {
        if self.reads_vars() {
            None
        } else {
            Some(self.eval(&BinContext::default()))
        }
    }

    fn reads_vars(&self) -> bool {
        match self {
            Expr::Num(_) => false,
            Expr::Var(_) => true,
            Expr::Neg(e) | Expr::Call(_, e) => e.reads_vars(),
            Expr::Bin(_, a, b) => a.reads_vars() || b.reads_vars(),
        }
    }
}

pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(malformed_at(&parser));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Name(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            _ if c.is_ascii_digit() || c == '.' => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::Malformed(text.clone()))?;
                tokens.push(Token::Num(value));
            }
            _ if c.is_ascii_alphabetic() => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Name(name));
            }
            _ => return Err(ExprError::BadChar(c)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn malformed_at(p: &Parser) -> ExprError {
    let near = p
        .tokens
        .get(p.pos)
        .map(|t| format!("{:?}", t))
        .unwrap_or_else(|| "end of input".to_string());
    ExprError::Malformed(near)
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }
    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }
    fn expect(&mut self, t: Token) -> Result<(), ExprError> {
        if self.bump() == Some(t) {
            Ok(())
        } else {
            self.pos = self.pos.saturating_sub(1);
            Err(malformed_at(self))
        }
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Op::Add,
                Some(Token::Minus) => Op::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.term()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Op::Mul,
                Some(Token::Slash) => Op::Div,
                _ => break,
            };
            self.bump();
            let rhs = self.factor()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, ExprError> {
        match self.bump() {
            Some(Token::Minus) => Ok(Expr::Neg(Box::new(self.factor()?))),
            Some(Token::Num(v)) => Ok(Expr::Num(v)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name(name)) => self.name(name),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(malformed_at(self))
            }
        }
    }

    fn name(&mut self, name: String) -> Result<Expr, ExprError> {
        let func = match name.as_str() {
            "px" => return Ok(Expr::Var(Var::Px)),
            "py" => return Ok(Expr::Var(Var::Py)),
            "pz" => return Ok(Expr::Var(Var::Pz)),
            "dx" => return Ok(Expr::Var(Var::Dx)),
            "dy" => return Ok(Expr::Var(Var::Dy)),
            "dz" => return Ok(Expr::Var(Var::Dz)),
            "t" => return Ok(Expr::Var(Var::T)),
            "floor" => Func::Floor,
            "abs" => Func::Abs,
            _ => return Err(ExprError::UnknownName(name)),
        };
        self.expect(Token::LParen)?;
        let arg = self.expr()?;
        self.expect(Token::RParen)?;
        Ok(Expr::Call(func, Box::new(arg)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> BinContext {
        BinContext {
            px: 1.0,
            py: 2.0,
            pz: 3.0,
            dx: 0.0,
            dy: 0.0,
            dz: -1.0,
            t: 4.5,
        }
    }

    #[test]
    fn precedence_and_parens() {
        let e = parse("1 + 2 * 3").unwrap();
        assert_eq!(e.eval(&ctx()), 7.0);
        let e = parse("(1 + 2) * 3").unwrap();
        assert_eq!(e.eval(&ctx()), 9.0);
        let e = parse("-2 * -3").unwrap();
        assert_eq!(e.eval(&ctx()), 6.0);
    }

    #[test]
    fn variables_and_functions() {
        let e = parse("floor(py / 2 + px)").unwrap();
        assert_eq!(e.eval(&ctx()), 2.0);
        let e = parse("abs(dz) * t").unwrap();
        assert_eq!(e.eval(&ctx()), 4.5);
    }

    #[test]
    fn constant_detection() {
        assert_eq!(parse("0").unwrap().constant(), Some(0.0));
        assert_eq!(parse("2 * 3 - 6").unwrap().constant(), Some(0.0));
        assert_eq!(parse("floor(dy)").unwrap().constant(), None);
        assert_eq!(Expr::parse_or_zero(None).unwrap().constant(), Some(0.0));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse("1 +"), Err(ExprError::Malformed(_))));
        assert!(matches!(parse("foo(1)"), Err(ExprError::UnknownName(_))));
        assert!(matches!(parse("1 $ 2"), Err(ExprError::BadChar('$'))));
        assert!(matches!(parse("(1"), Err(ExprError::Malformed(_))));
    }
}
