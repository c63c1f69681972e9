use crate::ast::{DataType, Operation};
use crate::error::EvalError;
use crate::interpreter::Interpreter;
use crate::registry::FunctionRegistry;
use num_complex::Complex64;
use std::collections::HashMap;

/// Constant folding pass over the operation tree.
///
/// Folding delegates to the [`Interpreter`] with an empty binding set, so a
/// folded subtree evaluates to exactly the value the unfolded subtree would
/// have produced. The pass is idempotent.
pub struct Optimizer {
    interpreter: Interpreter,
}

impl Optimizer {
    pub fn new(interpreter: Interpreter) -> Optimizer {
        Optimizer { interpreter }
    }

    /// Replace every maximal variable-free subtree with a single constant
    /// node.
    pub fn optimize(
        &self,
        operation: Operation,
        functions: &FunctionRegistry,
    ) -> Result<Operation, EvalError> {
        if operation.value().is_none() && !operation.depends_on_variables() {
            let data_type = operation.data_type();
            let value = self
                .interpreter
                .execute(&operation, functions, &HashMap::new())?;
            log::trace!("folded constant subtree into {}", value);
            return Ok(fold(data_type, value));
        }

        Ok(match operation {
            Operation::IntegerConstant(_)
            | Operation::FloatingPointConstant(_)
            | Operation::ComplexConstant(_)
            | Operation::Variable(_) => operation,
            Operation::Add(_, left, right) => Operation::add(
                self.optimize(*left, functions)?,
                self.optimize(*right, functions)?,
            ),
            Operation::Sub(_, left, right) => Operation::sub(
                self.optimize(*left, functions)?,
                self.optimize(*right, functions)?,
            ),
            Operation::Mul(_, left, right) => Operation::mul(
                self.optimize(*left, functions)?,
                self.optimize(*right, functions)?,
            ),
            Operation::Div(_, left, right) => Operation::div(
                self.optimize(*left, functions)?,
                self.optimize(*right, functions)?,
            ),
            Operation::Pow(_, left, right) => Operation::pow(
                self.optimize(*left, functions)?,
                self.optimize(*right, functions)?,
            ),
            Operation::UnaryMinus(_, operand) => {
                Operation::negate(self.optimize(*operand, functions)?)
            }
            Operation::Function(_, name, arguments) => {
                let arguments = arguments
                    .into_iter()
                    .map(|argument| self.optimize(argument, functions))
                    .collect::<Result<Vec<_>, _>>()?;
                Operation::function(name, arguments)
            }
        })
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(Interpreter::new())
    }
}

/// Rebuild a folded value as the constant variant of the subtree's result
/// type. The value wins over the tag when they disagree (an integer-typed
/// `2^-1` is 0.5, a real-typed power can pick up a residual imaginary
/// part), so the fold stays semantically transparent.
fn fold(data_type: DataType, value: Complex64) -> Operation {
    if value.im != 0.0 {
        return Operation::ComplexConstant(value);
    }
    match data_type {
        DataType::Complex => Operation::ComplexConstant(value),
        DataType::Integer
            if value.re.fract() == 0.0
                && value.re >= i64::MIN as f64
                && value.re <= i64::MAX as f64 =>
        {
            Operation::IntegerConstant(value.re as i64)
        }
        _ => Operation::FloatingPointConstant(value.re),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::AstBuilder;

    fn parse(input: &str, registry: &FunctionRegistry) -> Operation {
        let tokens = Lexer::new(input, '.').tokenize().unwrap();
        AstBuilder::new(&tokens, registry).build().unwrap()
    }

    fn optimize(input: &str) -> Operation {
        let registry = FunctionRegistry::with_defaults();
        let operation = parse(input, &registry);
        Optimizer::default().optimize(operation, &registry).unwrap()
    }

    #[test]
    fn folds_whole_constant_trees() {
        assert_eq!(optimize("3 + 5"), Operation::IntegerConstant(8));
        assert_eq!(optimize("(3 + 5*5)*45"), Operation::IntegerConstant(1260));
    }

    #[test]
    fn folds_function_calls() {
        let folded = optimize("sqrt(9)");
        let value = folded.value().unwrap();
        assert!((value - Complex64::new(3.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn keeps_variable_subtrees() {
        // Only `2*3` is closed; the rest of the tree must survive.
        let folded = optimize("x + 2*3");
        assert_eq!(
            folded,
            Operation::add(
                Operation::Variable("x".into()),
                Operation::IntegerConstant(6),
            )
        );
    }

    #[test]
    fn value_wins_over_integer_tag() {
        // 2^-1 is integer-typed by promotion but evaluates to 0.5; the
        // folded constant must hold the value, not the tag.
        let folded = optimize("2^-1");
        match folded {
            Operation::FloatingPointConstant(value) => assert!((value - 0.5).abs() < 1e-12),
            other => panic!("expected a floating point constant, got {:?}", other),
        }
    }

    #[test]
    fn transparency() {
        let registry = FunctionRegistry::with_defaults();
        let interpreter = Interpreter::new();
        let optimizer = Optimizer::default();

        let mut variables = HashMap::new();
        variables.insert("x".to_string(), Complex64::new(1.25, -0.5));

        for formula in &[
            "2 + 3*4",
            "x + 2*3",
            "sin(1) * x",
            "2^3 + x",
            "-(2*3) + x/7",
            "3i*3i + x",
        ] {
            let operation = parse(formula, &registry);
            let expected = interpreter
                .execute(&operation, &registry, &variables)
                .unwrap();
            let optimized = optimizer.optimize(operation, &registry).unwrap();
            let actual = interpreter
                .execute(&optimized, &registry, &variables)
                .unwrap();
            assert_eq!(expected, actual, "optimizing {} changed the value", formula);
        }
    }

    #[test]
    fn idempotency() {
        let registry = FunctionRegistry::with_defaults();
        let optimizer = Optimizer::default();
        for formula in &["2 + 3*4", "x + 2*3", "sin(1) * cos(x)"] {
            let once = optimizer
                .optimize(parse(formula, &registry), &registry)
                .unwrap();
            let twice = optimizer.optimize(once.clone(), &registry).unwrap();
            assert_eq!(once, twice);
        }
    }
}
