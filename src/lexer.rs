use crate::error::EvalError;
use crate::token::{Op, Token, TokenKind};
use std::iter::Peekable;
use std::str::CharIndices;

#[must_use]
/// Check if `name` is a valid identifier: a letter followed by letters
/// or digits.
///
/// # Examples
///
/// ```
/// # use formulex::is_identifier;
///
/// assert_eq!(is_identifier("var1"), true);
/// assert_eq!(is_identifier("1var"), false);
/// ```
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    if !chars.next().map_or(false, char::is_alphabetic) {
        return false;
    }
    chars.all(char::is_alphanumeric)
}

/// An helper struct for lexing the input
pub struct Lexer<'a> {
    input: Peekable<CharIndices<'a>>,
    decimal_separator: char,
    argument_separator: char,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `input`. Numerals use `decimal_separator`
    /// (`'.'` or `','`); with a decimal comma the argument separator
    /// becomes `';'`.
    pub fn new(input: &'a str, decimal_separator: char) -> Lexer<'a> {
        let argument_separator = if decimal_separator == ',' { ';' } else { ',' };
        Lexer {
            input: input.char_indices().peekable(),
            decimal_separator,
            argument_separator,
        }
    }

    /// Scan the whole input into a token sequence.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, EvalError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token(tokens.last())? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn next_token(&mut self, previous: Option<&Token>) -> Result<Option<Token>, EvalError> {
        while let Some(&(position, c)) = self.input.peek() {
            if c.is_whitespace() {
                self.input.next();
                continue;
            }

            let token = match c {
                c if c.is_ascii_digit() => self.scan_numeral(position, false)?,
                c if c.is_alphabetic() => self.scan_identifier(position),
                '-' => {
                    self.input.next();
                    // A '-' at the start of an operand position folds into
                    // the numeral that follows it; everywhere else it is
                    // the minus operator.
                    let next_is_digit = self
                        .input
                        .peek()
                        .map_or(false, |&(_, c)| c.is_ascii_digit());
                    if next_is_digit && negative_literal_position(previous) {
                        self.scan_numeral(position, true)?
                    } else {
                        Token::new(TokenKind::Op(Op::Minus), position)
                    }
                }
                '+' => self.single(TokenKind::Op(Op::Plus), position),
                '*' => self.single(TokenKind::Op(Op::Mul), position),
                '/' => self.single(TokenKind::Op(Op::Div), position),
                '^' => self.single(TokenKind::Op(Op::Exp), position),
                '(' => self.single(TokenKind::LParen, position),
                ')' => self.single(TokenKind::RParen, position),
                c if c == self.argument_separator => {
                    self.single(TokenKind::ArgumentSeparator, position)
                }
                other => {
                    return Err(EvalError::Lex {
                        position,
                        message: format!("unexpected character '{}' in formula", other),
                    });
                }
            };
            return Ok(Some(token));
        }
        Ok(None)
    }

    fn single(&mut self, kind: TokenKind, position: usize) -> Token {
        self.input.next();
        Token::new(kind, position)
    }

    fn scan_identifier(&mut self, position: usize) -> Token {
        let mut name = String::new();
        while let Some(&(_, c)) = self.input.peek() {
            if c.is_alphanumeric() {
                name.push(c);
                self.input.next();
            } else {
                break;
            }
        }
        Token::new(TokenKind::Identifier(name), position)
    }

    fn scan_numeral(&mut self, position: usize, negative: bool) -> Result<Token, EvalError> {
        let mut text = String::new();
        if negative {
            text.push('-');
        }
        let mut is_float = false;
        while let Some(&(_, c)) = self.input.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.input.next();
            } else if c == self.decimal_separator && !is_float {
                is_float = true;
                text.push('.');
                self.input.next();
            } else {
                break;
            }
        }

        let mut imaginary = false;
        if let Some(&(_, 'i')) = self.input.peek() {
            self.input.next();
            imaginary = true;
            // "3izzz" is a malformed numeral, not a numeral next to an
            // identifier.
            if let Some(&(_, c)) = self.input.peek() {
                if c.is_alphanumeric() {
                    return Err(EvalError::Lex {
                        position,
                        message: format!("malformed numeral \"{}i{}\"", text, c),
                    });
                }
            }
        }

        let kind = if imaginary {
            let value = parse_float(&text, position)?;
            TokenKind::Complex(value)
        } else if is_float {
            let value = parse_float(&text, position)?;
            TokenKind::FloatingPoint(value)
        } else {
            // Integer numerals too large for i64 degrade to floating point.
            match text.parse::<i64>() {
                Ok(value) => TokenKind::Integer(value),
                Err(_) => TokenKind::FloatingPoint(parse_float(&text, position)?),
            }
        };
        Ok(Token::new(kind, position))
    }
}

fn parse_float(text: &str, position: usize) -> Result<f64, EvalError> {
    text.parse().map_err(|_| EvalError::Lex {
        position,
        message: format!("malformed numeral \"{}\"", text),
    })
}

/// A '-' folds into the following numeral only when it sits where an
/// operand is expected: at the start of the formula, after an operator,
/// after '(' or after an argument separator.
fn negative_literal_position(previous: Option<&Token>) -> bool {
    match previous.map(|token| &token.kind) {
        None => true,
        Some(TokenKind::Op(_))
        | Some(TokenKind::LParen)
        | Some(TokenKind::ArgumentSeparator) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn kinds(input: &str) -> Result<Vec<TokenKind>, EvalError> {
        let tokens = Lexer::new(input, '.').tokenize()?;
        Ok(tokens.into_iter().map(|token| token.kind).collect())
    }

    #[test_case("2 + 2" => Ok(vec![TokenKind::Integer(2), TokenKind::Op(Op::Plus), TokenKind::Integer(2)]) ; "addition is scanned properly")]
    #[test_case("2+2" => Ok(vec![TokenKind::Integer(2), TokenKind::Op(Op::Plus), TokenKind::Integer(2)]) ; "spaces are optional")]
    #[test_case("5*-100" => Ok(vec![TokenKind::Integer(5), TokenKind::Op(Op::Mul), TokenKind::Integer(-100)]) ; "negative numeral folds after an operator")]
    #[test_case("5 - 3" => Ok(vec![TokenKind::Integer(5), TokenKind::Op(Op::Minus), TokenKind::Integer(3)]) ; "minus after an operand stays binary")]
    #[test_case("2^-3" => Ok(vec![TokenKind::Integer(2), TokenKind::Op(Op::Exp), TokenKind::Integer(-3)]) ; "negative exponent folds")]
    #[test_case("3.14" => Ok(vec![TokenKind::FloatingPoint(3.14)]) ; "floating point numeral")]
    #[test_case("3i" => Ok(vec![TokenKind::Complex(3.0)]) ; "imaginary marker")]
    #[test_case("-2.5i" => Ok(vec![TokenKind::Complex(-2.5)]) ; "negative imaginary numeral folds")]
    fn tokenize(input: &str) -> Result<Vec<TokenKind>, EvalError> {
        kinds(input)
    }

    #[test]
    fn unary_minus_is_not_folded_before_parenthesis() {
        let tokens = kinds("-(1*2)").unwrap();
        assert_eq!(tokens[0], TokenKind::Op(Op::Minus));
        assert_eq!(tokens[1], TokenKind::LParen);
    }

    #[test]
    fn positions() {
        let tokens = Lexer::new("2 + var1", '.').tokenize().unwrap();
        let positions: Vec<usize> = tokens.iter().map(|token| token.position).collect();
        assert_eq!(positions, vec![0, 2, 4]);
    }

    #[test]
    fn decimal_comma() {
        let tokens = kinds_with("2,5 + 0,5", ',');
        assert_eq!(
            tokens.unwrap(),
            vec![
                TokenKind::FloatingPoint(2.5),
                TokenKind::Op(Op::Plus),
                TokenKind::FloatingPoint(0.5),
            ]
        );

        let tokens = kinds_with("log(100; 10)", ',').unwrap();
        assert!(tokens.contains(&TokenKind::ArgumentSeparator));
    }

    fn kinds_with(input: &str, separator: char) -> Result<Vec<TokenKind>, EvalError> {
        let tokens = Lexer::new(input, separator).tokenize()?;
        Ok(tokens.into_iter().map(|token| token.kind).collect())
    }

    #[test]
    fn unexpected_character() {
        let error = kinds("2 @ 3").unwrap_err();
        assert_eq!(
            error,
            EvalError::Lex {
                position: 2,
                message: "unexpected character '@' in formula".into(),
            }
        );
    }

    #[test]
    fn malformed_imaginary_numeral() {
        assert!(matches!(kinds("3izz"), Err(EvalError::Lex { .. })));
    }

    #[test]
    fn identifiers() {
        let valid = ["a", "var1", "BlAbLa", "x2y3"];
        for name in &valid {
            assert!(is_identifier(name));
        }

        let invalid = ["", "1var", "a_b", "a.b", "a-b"];
        for name in &invalid {
            assert!(!is_identifier(name));
        }
    }
}
