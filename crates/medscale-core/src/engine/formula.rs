//! Restricted arithmetic grammar for formula-based scales.
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary (('**' | '^') unary)?
//! primary := number | ident | ident '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! Functions: `ln`, `log` (base 10, or `log(x, base)`), `sqrt`, `exp`, `abs`,
//! `round` (half-to-even, optional digits), variadic `min`/`max`.
//! There are no assignments, comparisons or attribute access.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

/// Maximum nesting of unary operators and parentheses.
const MAX_DEPTH: usize = 64;

/// Maximum height of a parsed tree. Evaluation, display and drop recurse
/// once per level, so long operator chains are rejected while parsing.
const MAX_HEIGHT: usize = 128;

/// Formula errors. `expression` names the failing sub-expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("Empty expression")]
    Empty,

    #[error("Syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("{function}() takes {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("Division by zero in {expression}")]
    DivisionByZero { expression: String },

    #[error("Domain error in {expression}: {reason}")]
    Domain { expression: String, reason: String },

    #[error("Non-finite result in {expression}")]
    NonFinite { expression: String },
}

pub type FormulaResult<T> = Result<T, FormulaError>;

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Ln,
    Log,
    Sqrt,
    Exp,
    Abs,
    Round,
    Min,
    Max,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "ln" => Some(Self::Ln),
            "log" => Some(Self::Log),
            "sqrt" => Some(Self::Sqrt),
            "exp" => Some(Self::Exp),
            "abs" => Some(Self::Abs),
            "round" => Some(Self::Round),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Ln => "ln",
            Self::Log => "log",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Abs => "abs",
            Self::Round => "round",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    /// Accepted argument counts (inclusive; `None` = unbounded).
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Self::Ln | Self::Sqrt | Self::Exp | Self::Abs => (1, Some(1)),
            Self::Log | Self::Round => (1, Some(2)),
            Self::Min | Self::Max => (2, None),
        }
    }

    fn check_arity(self, found: usize) -> FormulaResult<()> {
        let (lo, hi) = self.arity();
        if found >= lo && hi.map_or(true, |hi| found <= hi) {
            return Ok(());
        }
        let expected = match hi {
            Some(hi) if hi == lo => lo.to_string(),
            Some(hi) => format!("{}-{}", lo, hi),
            None => format!("at least {}", lo),
        };
        Err(FormulaError::Arity {
            function: self.name().to_string(),
            expected,
            found,
        })
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn child(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
            match e {
                Expr::Binary { .. } | Expr::Neg(_) => write!(f, "({})", e),
                _ => write!(f, "{}", e),
            }
        }

        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Variable(name) => write!(f, "{}", name),
            Self::Neg(inner) => {
                write!(f, "-")?;
                child(f, inner)
            }
            Self::Binary { op, lhs, rhs } => {
                child(f, lhs)?;
                write!(f, " {} ", op.symbol())?;
                child(f, rhs)
            }
            Self::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Pow,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn tokenize(source: &str) -> FormulaResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let pos = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let leading_dot = c == '.' && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit());
        if c.is_ascii_digit() || leading_dot {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // Exponent only when digits follow
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text.parse::<f64>().map_err(|_| FormulaError::Syntax {
                position: start,
                message: format!("invalid number '{}'", text),
            })?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                pos,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident(chars[start..i].iter().collect()),
                pos,
            });
            continue;
        }

        let kind = match c {
            '+' => TokenKind::Plus,
            '-' | '−' => TokenKind::Minus,
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                TokenKind::Pow
            }
            '*' | '×' => TokenKind::Star,
            '/' | '÷' => TokenKind::Slash,
            '^' => TokenKind::Pow,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            other => {
                return Err(FormulaError::Syntax {
                    position: pos,
                    message: format!("unexpected character '{}'", other),
                })
            }
        };
        tokens.push(Token { kind, pos });
        i += 1;
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

/// A parsed subtree and its height.
struct Node {
    expr: Expr,
    height: usize,
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.index).map(|t| &t.kind)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.index).map_or(self.end, |t| t.pos)
    }

    fn advance(&mut self) -> Option<TokenKind> {
        let token = self.tokens.get(self.index).map(|t| t.kind.clone());
        self.index += 1;
        token
    }

    fn error<T>(&self, message: impl Into<String>) -> FormulaResult<T> {
        Err(FormulaError::Syntax {
            position: self.position(),
            message: message.into(),
        })
    }

    fn enter(&mut self) -> FormulaResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return self.error("expression nested too deeply");
        }
        Ok(())
    }

    /// Build a node one level above its children, within `MAX_HEIGHT`.
    fn node(&self, expr: Expr, child_height: usize) -> FormulaResult<Node> {
        let height = child_height + 1;
        if height > MAX_HEIGHT {
            return self.error("expression too long");
        }
        Ok(Node { expr, height })
    }

    fn binary(&self, op: BinaryOp, lhs: Node, rhs: Node) -> FormulaResult<Node> {
        let child_height = lhs.height.max(rhs.height);
        self.node(
            Expr::Binary {
                op,
                lhs: Box::new(lhs.expr),
                rhs: Box::new(rhs.expr),
            },
            child_height,
        )
    }

    fn expr(&mut self) -> FormulaResult<Node> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.term()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
    }

    fn term(&mut self) -> FormulaResult<Node> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
    }

    fn unary(&mut self) -> FormulaResult<Node> {
        match self.peek() {
            Some(TokenKind::Minus) => {
                self.advance();
                self.enter()?;
                let inner = self.unary()?;
                self.depth -= 1;
                self.node(Expr::Neg(Box::new(inner.expr)), inner.height)
            }
            Some(TokenKind::Plus) => {
                self.advance();
                self.enter()?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(inner)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> FormulaResult<Node> {
        let base = self.primary()?;
        if self.peek() == Some(&TokenKind::Pow) {
            self.advance();
            self.enter()?;
            let exponent = self.unary()?;
            self.depth -= 1;
            return self.binary(BinaryOp::Pow, base, exponent);
        }
        Ok(base)
    }

    fn primary(&mut self) -> FormulaResult<Node> {
        match self.advance() {
            Some(TokenKind::Number(n)) => self.node(Expr::Number(n), 0),
            Some(TokenKind::Ident(name)) => {
                if self.peek() == Some(&TokenKind::LParen) {
                    self.advance();
                    self.call(name)
                } else {
                    self.node(Expr::Variable(name), 0)
                }
            }
            Some(TokenKind::LParen) => {
                self.enter()?;
                let inner = self.expr()?;
                self.depth -= 1;
                match self.advance() {
                    Some(TokenKind::RParen) => Ok(inner),
                    _ => {
                        self.index -= 1;
                        self.error("expected ')'")
                    }
                }
            }
            Some(other) => {
                self.index -= 1;
                self.error(format!("unexpected token {:?}", other))
            }
            None => self.error("unexpected end of expression"),
        }
    }

    fn call(&mut self, name: String) -> FormulaResult<Node> {
        let function = Function::lookup(&name).ok_or(FormulaError::UnknownFunction(name))?;
        self.enter()?;
        let mut args = Vec::new();
        let mut child_height = 0;
        if self.peek() == Some(&TokenKind::RParen) {
            self.advance();
        } else {
            loop {
                let arg = self.expr()?;
                child_height = child_height.max(arg.height);
                args.push(arg.expr);
                match self.advance() {
                    Some(TokenKind::Comma) => continue,
                    Some(TokenKind::RParen) => break,
                    _ => {
                        self.index -= 1;
                        return self.error("expected ',' or ')'");
                    }
                }
            }
        }
        self.depth -= 1;
        function.check_arity(args.len())?;
        self.node(Expr::Call { function, args }, child_height)
    }
}

// ============================================================================
// Formula
// ============================================================================

/// A parsed formula ready for repeated evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    ast: Expr,
}

impl Formula {
    /// Parse an expression.
    pub fn parse(source: &str) -> FormulaResult<Self> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(FormulaError::Empty);
        }
        let mut parser = Parser {
            tokens,
            index: 0,
            depth: 0,
            end: source.chars().count(),
        };
        let ast = parser.expr()?.expr;
        if parser.index < parser.tokens.len() {
            return parser.error("unexpected trailing input");
        }
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Variable names referenced by the formula.
    pub fn identifiers(&self) -> BTreeSet<String> {
        fn collect(expr: &Expr, out: &mut BTreeSet<String>) {
            match expr {
                Expr::Number(_) => {}
                Expr::Variable(name) => {
                    out.insert(name.clone());
                }
                Expr::Neg(inner) => collect(inner, out),
                Expr::Binary { lhs, rhs, .. } => {
                    collect(lhs, out);
                    collect(rhs, out);
                }
                Expr::Call { args, .. } => args.iter().for_each(|a| collect(a, out)),
            }
        }

        let mut out = BTreeSet::new();
        collect(&self.ast, &mut out);
        out
    }

    /// Evaluate with a variable resolver.
    pub fn evaluate<F>(&self, resolve: F) -> FormulaResult<f64>
    where
        F: Fn(&str) -> f64,
    {
        eval(&self.ast, &resolve)
    }
}

fn domain(expr: &Expr, reason: &str) -> FormulaError {
    FormulaError::Domain {
        expression: expr.to_string(),
        reason: reason.to_string(),
    }
}

fn finite(expr: &Expr, value: f64) -> FormulaResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FormulaError::NonFinite {
            expression: expr.to_string(),
        })
    }
}

fn eval<F: Fn(&str) -> f64>(expr: &Expr, resolve: &F) -> FormulaResult<f64> {
    let value = match expr {
        Expr::Number(n) => *n,
        Expr::Variable(name) => resolve(name),
        Expr::Neg(inner) => -eval(inner, resolve)?,
        Expr::Binary { op, lhs, rhs } => {
            let a = eval(lhs, resolve)?;
            let b = eval(rhs, resolve)?;
            match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => {
                    if b == 0.0 {
                        return Err(FormulaError::DivisionByZero {
                            expression: expr.to_string(),
                        });
                    }
                    a / b
                }
                BinaryOp::Pow => {
                    if a == 0.0 && b < 0.0 {
                        return Err(FormulaError::DivisionByZero {
                            expression: expr.to_string(),
                        });
                    }
                    if a < 0.0 && b.fract() != 0.0 {
                        return Err(domain(expr, "negative base with fractional exponent"));
                    }
                    a.powf(b)
                }
            }
        }
        Expr::Call { function, args } => {
            let values = args
                .iter()
                .map(|a| eval(a, resolve))
                .collect::<FormulaResult<Vec<f64>>>()?;
            apply(expr, *function, &values)?
        }
    };
    finite(expr, value)
}

fn apply(expr: &Expr, function: Function, args: &[f64]) -> FormulaResult<f64> {
    let x = args.first().copied().unwrap_or(0.0);
    match function {
        Function::Ln => {
            if x <= 0.0 {
                return Err(domain(expr, "logarithm of a non-positive value"));
            }
            Ok(x.ln())
        }
        Function::Log => {
            if x <= 0.0 {
                return Err(domain(expr, "logarithm of a non-positive value"));
            }
            match args.get(1) {
                None => Ok(x.log10()),
                Some(&base) if base <= 0.0 || base == 1.0 => {
                    Err(domain(expr, "logarithm base must be positive and not 1"))
                }
                Some(&base) => Ok(x.ln() / base.ln()),
            }
        }
        Function::Sqrt => {
            if x < 0.0 {
                return Err(domain(expr, "square root of a negative value"));
            }
            Ok(x.sqrt())
        }
        Function::Exp => Ok(x.exp()),
        Function::Abs => Ok(x.abs()),
        Function::Round => match args.get(1) {
            None => Ok(x.round_ties_even()),
            Some(&digits) => {
                let factor = 10f64.powi(digits.round_ties_even() as i32);
                Ok((x * factor).round_ties_even() / factor)
            }
        },
        Function::Min => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
        Function::Max => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
    }
}
