use crate::ast::Operation;
use crate::error::EvalError;
use crate::registry::FunctionRegistry;
use num_complex::Complex64;
use std::collections::HashMap;

/// The tree walking evaluator.
///
/// This is the semantic reference: the compiled backend must return the
/// exact same value for every operation tree and binding set.
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Interpreter {
        Interpreter
    }

    /// Evaluate `operation` against `variables`. Variable names in the map
    /// must already be lower-cased; the engine prepares the map before
    /// calling in here.
    pub fn execute(
        &self,
        operation: &Operation,
        functions: &FunctionRegistry,
        variables: &HashMap<String, Complex64>,
    ) -> Result<Complex64, EvalError> {
        match operation {
            Operation::IntegerConstant(value) => Ok(Complex64::new(*value as f64, 0.0)),
            Operation::FloatingPointConstant(value) => Ok(Complex64::new(*value, 0.0)),
            Operation::ComplexConstant(value) => Ok(*value),
            Operation::Variable(name) => variables
                .get(name)
                .copied()
                .ok_or_else(|| EvalError::VariableNotDefined(name.clone())),
            Operation::Add(_, left, right) => {
                Ok(self.execute(left, functions, variables)?
                    + self.execute(right, functions, variables)?)
            }
            Operation::Sub(_, left, right) => {
                Ok(self.execute(left, functions, variables)?
                    - self.execute(right, functions, variables)?)
            }
            Operation::Mul(_, left, right) => {
                Ok(self.execute(left, functions, variables)?
                    * self.execute(right, functions, variables)?)
            }
            Operation::Div(_, left, right) => {
                Ok(self.execute(left, functions, variables)?
                    / self.execute(right, functions, variables)?)
            }
            Operation::Pow(_, base, exponent) => {
                let base = self.execute(base, functions, variables)?;
                let exponent = self.execute(exponent, functions, variables)?;
                Ok(base.powc(exponent))
            }
            Operation::UnaryMinus(_, operand) => {
                Ok(-self.execute(operand, functions, variables)?)
            }
            Operation::Function(_, name, arguments) => {
                // The parser already validated the call, but the registry
                // may have changed since: guard the lookup and the arity.
                let info = functions.lookup(name)?;
                if info.arity() != arguments.len() {
                    return Err(EvalError::Argument(format!(
                        "the function \"{}\" expects {} arguments, got {}",
                        name,
                        info.arity(),
                        arguments.len()
                    )));
                }
                let mut values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.execute(argument, functions, variables)?);
                }
                Ok(info.call(&values))
            }
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
