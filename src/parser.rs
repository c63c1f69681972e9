use crate::ast::Operation;
use crate::error::EvalError;
use crate::registry::FunctionRegistry;
use crate::token::{Op, Token, TokenKind};
use num_complex::Complex64;

/// A recursive descent parser turning a token sequence into an
/// [`Operation`] tree.
///
/// Precedence, from loosest to tightest: `+ -`, `* /` (left associative),
/// unary minus, `^` (right associative), primary terms. Function calls are
/// resolved against the registry while parsing, so unknown names and arity
/// mismatches are reported before anything is evaluated or cached.
pub struct AstBuilder<'a> {
    tokens: &'a [Token],
    position: usize,
    functions: &'a FunctionRegistry,
}

impl<'a> AstBuilder<'a> {
    pub fn new(tokens: &'a [Token], functions: &'a FunctionRegistry) -> AstBuilder<'a> {
        AstBuilder {
            tokens,
            position: 0,
            functions,
        }
    }

    /// Parse the tokens into a single expression tree.
    pub fn build(mut self) -> Result<Operation, EvalError> {
        if self.tokens.is_empty() {
            return Err(EvalError::Parse("empty formula".into()));
        }

        let operation = self.parse_expression()?;
        if let Some(token) = self.peek() {
            return Err(EvalError::Parse(format!(
                "unexpected token '{}' at position {}",
                token.kind, token.position
            )));
        }
        Ok(operation)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if let Some(token) = self.peek() {
            if token.kind == TokenKind::Op(op) {
                self.position += 1;
                return true;
            }
        }
        false
    }

    fn parse_expression(&mut self) -> Result<Operation, EvalError> {
        let mut left = self.parse_term()?;
        loop {
            if self.eat_op(Op::Plus) {
                let right = self.parse_term()?;
                left = Operation::add(left, right);
            } else if self.eat_op(Op::Minus) {
                let right = self.parse_term()?;
                left = Operation::sub(left, right);
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_term(&mut self) -> Result<Operation, EvalError> {
        let mut left = self.parse_unary()?;
        loop {
            if self.eat_op(Op::Mul) {
                let right = self.parse_unary()?;
                left = Operation::mul(left, right);
            } else if self.eat_op(Op::Div) {
                let right = self.parse_unary()?;
                left = Operation::div(left, right);
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Operation, EvalError> {
        if self.eat_op(Op::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Operation::negate(operand));
        }
        self.parse_power()
    }

    // Exponentiation binds tighter than unary minus and associates to the
    // right; the exponent goes back through `parse_unary` so `2^-x` parses.
    fn parse_power(&mut self) -> Result<Operation, EvalError> {
        let base = self.parse_primary()?;
        if self.eat_op(Op::Exp) {
            let exponent = self.parse_unary()?;
            return Ok(Operation::pow(base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Operation, EvalError> {
        let token = match self.advance() {
            Some(token) => token,
            None => return Err(EvalError::Parse("unexpected end of formula".into())),
        };

        match token.kind {
            TokenKind::Integer(value) => Ok(Operation::IntegerConstant(value)),
            TokenKind::FloatingPoint(value) => Ok(Operation::FloatingPointConstant(value)),
            TokenKind::Complex(value) => {
                Ok(Operation::ComplexConstant(Complex64::new(0.0, value)))
            }
            TokenKind::Identifier(name) => {
                let name = name.to_lowercase();
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
                    self.parse_call(name)
                } else if self.functions.is_function_name(&name) {
                    Err(EvalError::Parse(format!(
                        "the function \"{}\" is used without an argument list at position {}",
                        name, token.position
                    )))
                } else {
                    Ok(Operation::Variable(name))
                }
            }
            TokenKind::LParen => {
                let operation = self.parse_expression()?;
                match self.advance().map(|t| t.kind) {
                    Some(TokenKind::RParen) => Ok(operation),
                    _ => Err(EvalError::Parse(format!(
                        "unbalanced parentheses: '(' at position {} is never closed",
                        token.position
                    ))),
                }
            }
            other => Err(EvalError::Parse(format!(
                "unexpected token '{}' at position {}",
                other, token.position
            ))),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Operation, EvalError> {
        let open = match self.advance() {
            Some(token) => token,
            None => return Err(EvalError::Parse("unexpected end of formula".into())),
        };

        let info = self.functions.get(&name).ok_or_else(|| {
            EvalError::Parse(format!("unknown function \"{}\"", name))
        })?;

        let mut arguments = Vec::new();
        if !matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
            loop {
                arguments.push(self.parse_expression()?);
                match self.peek().map(|t| &t.kind) {
                    Some(TokenKind::ArgumentSeparator) => {
                        self.position += 1;
                    }
                    Some(TokenKind::RParen) => break,
                    _ => {
                        return Err(EvalError::Parse(format!(
                            "unbalanced parentheses: '(' at position {} is never closed",
                            open.position
                        )));
                    }
                }
            }
        }
        self.position += 1; // the ')' just peeked

        if arguments.len() != info.arity() {
            return Err(EvalError::Parse(format!(
                "the function \"{}\" expects {} arguments, got {}",
                name,
                info.arity(),
                arguments.len()
            )));
        }
        Ok(Operation::function(name, arguments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::DataType;
    use crate::lexer::Lexer;

    fn parse(input: &str) -> Result<Operation, EvalError> {
        let registry = FunctionRegistry::with_defaults();
        let tokens = Lexer::new(input, '.').tokenize()?;
        AstBuilder::new(&tokens, &registry).build()
    }

    #[test]
    fn precedence() {
        let operation = parse("2+3*4").unwrap();
        assert_eq!(
            operation,
            Operation::add(
                Operation::IntegerConstant(2),
                Operation::mul(Operation::IntegerConstant(3), Operation::IntegerConstant(4)),
            )
        );
    }

    #[test]
    fn exponentiation_is_right_associative() {
        let operation = parse("2^3^2").unwrap();
        assert_eq!(
            operation,
            Operation::pow(
                Operation::IntegerConstant(2),
                Operation::pow(Operation::IntegerConstant(3), Operation::IntegerConstant(2)),
            )
        );
    }

    #[test]
    fn folded_negative_constant_shape() {
        // The lexer folds `-100` into the literal, so no unary minus node
        // appears here.
        let operation = parse("5*-100").unwrap();
        assert_eq!(
            operation,
            Operation::mul(
                Operation::IntegerConstant(5),
                Operation::IntegerConstant(-100),
            )
        );

        // With parentheses in between the unary minus node survives.
        let operation = parse("5*-(100)").unwrap();
        assert_eq!(
            operation,
            Operation::mul(
                Operation::IntegerConstant(5),
                Operation::negate(Operation::IntegerConstant(100)),
            )
        );
    }

    #[test]
    fn unary_minus_binds_looser_than_exponentiation() {
        let operation = parse("-(1*2)^3").unwrap();
        assert_eq!(
            operation,
            Operation::negate(Operation::pow(
                Operation::mul(Operation::IntegerConstant(1), Operation::IntegerConstant(2)),
                Operation::IntegerConstant(3),
            ))
        );

        let operation = parse("-x^2").unwrap();
        assert_eq!(
            operation,
            Operation::negate(Operation::pow(
                Operation::Variable("x".into()),
                Operation::IntegerConstant(2),
            ))
        );
    }

    #[test]
    fn variables_are_lower_cased() {
        assert_eq!(parse("BlAbLa").unwrap(), Operation::Variable("blabla".into()));
    }

    #[test]
    fn result_type_inference() {
        assert_eq!(parse("2+3").unwrap().data_type(), DataType::Integer);
        assert_eq!(parse("2+3.5").unwrap().data_type(), DataType::FloatingPoint);
        assert_eq!(parse("2*3i").unwrap().data_type(), DataType::Complex);
    }

    #[test]
    fn function_calls() {
        let operation = parse("log(2, 3)").unwrap();
        assert_eq!(
            operation,
            Operation::function(
                "log".into(),
                vec![Operation::IntegerConstant(2), Operation::IntegerConstant(3)],
            )
        );

        // Resolution is case-insensitive and arguments may be full
        // expressions.
        assert!(parse("SIN(1+2)").is_ok());
    }

    #[test]
    fn unknown_function() {
        let error = parse("foo(2)").unwrap_err();
        assert_eq!(error, EvalError::Parse("unknown function \"foo\"".into()));
    }

    #[test]
    fn wrong_arity() {
        let error = parse("log(2)").unwrap_err();
        assert_eq!(
            error,
            EvalError::Parse("the function \"log\" expects 2 arguments, got 1".into())
        );
    }

    #[test]
    fn function_name_without_argument_list() {
        assert!(matches!(parse("sin + 2"), Err(EvalError::Parse(_))));
    }

    #[test]
    fn unbalanced_parentheses() {
        assert!(matches!(parse("(2+3"), Err(EvalError::Parse(_))));
        assert!(matches!(parse("2+3)"), Err(EvalError::Parse(_))));
        assert!(matches!(parse("sin(2"), Err(EvalError::Parse(_))));
    }

    #[test]
    fn empty_and_trailing() {
        assert_eq!(parse("").unwrap_err(), EvalError::Parse("empty formula".into()));
        assert!(matches!(parse("   "), Err(EvalError::Parse(_))));
        assert!(matches!(parse("2 3"), Err(EvalError::Parse(_))));
        assert!(matches!(parse("2+"), Err(EvalError::Parse(_))));
    }
}
