use std::fmt::{self, Display, Formatter};

/// Possible tokens to find in the input string
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// An integer numeral
    Integer(i64),
    /// A floating point numeral
    FloatingPoint(f64),
    /// A numeral carrying the imaginary marker; the payload is the
    /// imaginary coefficient
    Complex(f64),
    /// A variable or function name, case preserved
    Identifier(String),
    /// An arithmetic operator
    Op(Op),
    /// Left parenthesis
    LParen,
    /// Right parenthesis
    RParen,
    /// Separator between function call arguments
    ArgumentSeparator,
}

/// A lexical unit of a formula, tagged with the byte position it
/// starts at in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

impl Token {
    pub fn new(kind: TokenKind, position: usize) -> Token {
        Token { kind, position }
    }
}

/// Allowed operators in a formula
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Plus,
    Minus,
    Mul,
    Div,
    Exp,
}

impl Display for Op {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        let symbol = match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Exp => "^",
        };
        write!(fmt, "{}", symbol)
    }
}

impl Display for TokenKind {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(fmt, "{}", value),
            Self::FloatingPoint(value) => write!(fmt, "{}", value),
            Self::Complex(value) => write!(fmt, "{}i", value),
            Self::Identifier(name) => write!(fmt, "{}", name),
            Self::Op(op) => write!(fmt, "{}", op),
            Self::LParen => write!(fmt, "("),
            Self::RParen => write!(fmt, ")"),
            Self::ArgumentSeparator => write!(fmt, ","),
        }
    }
}
