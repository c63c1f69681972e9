use crate::ast::DataType;
use crate::engine::{Engine, Formula};
use crate::error::EvalError;
use crate::lexer::is_identifier;
use num_complex::Complex64;
use std::collections::HashMap;
use std::sync::Arc;

/// Fluent facade mapping a formula plus an ordered parameter list onto a
/// positional callable.
///
/// The declared [`DataType`] documents the numeric kind of each
/// parameter; values are always passed as complex numbers.
///
/// # Example
///
/// ```
/// use formulex::{DataType, Engine};
/// use num_complex::Complex64;
///
/// let engine = Engine::new();
/// let formula = engine
///     .formula("var1+2*(3*age)")
///     .parameter("var1", DataType::Integer)
///     .parameter("age", DataType::FloatingPoint)
///     .build()
///     .unwrap();
///
/// let result = formula
///     .call(&[Complex64::new(2.0, 0.0), Complex64::new(4.0, 0.0)])
///     .unwrap();
/// assert_eq!(result, Complex64::new(26.0, 0.0));
/// ```
pub struct FormulaBuilder<'a> {
    engine: &'a Engine,
    formula_text: String,
    parameters: Vec<(String, DataType)>,
}

impl<'a> FormulaBuilder<'a> {
    pub(crate) fn new(engine: &'a Engine, formula_text: &str) -> FormulaBuilder<'a> {
        FormulaBuilder {
            engine,
            formula_text: formula_text.to_string(),
            parameters: Vec::new(),
        }
    }

    /// Declare the next positional parameter. Names are matched
    /// case-insensitively, like every other variable.
    pub fn parameter(mut self, name: &str, data_type: DataType) -> Self {
        self.parameters.push((name.to_lowercase(), data_type));
        self
    }

    /// Validate the parameter list and build the positional callable.
    /// All name problems are rejected here, before anything is evaluated.
    pub fn build(self) -> Result<PositionalFormula, EvalError> {
        for (index, (name, _)) in self.parameters.iter().enumerate() {
            if !is_identifier(name) {
                return Err(EvalError::Argument(format!(
                    "\"{}\" is not a valid parameter name",
                    name
                )));
            }
            if self.parameters[..index].iter().any(|(seen, _)| seen == name) {
                return Err(EvalError::Argument(format!(
                    "the parameter \"{}\" is defined more than once",
                    name
                )));
            }
            if self.engine.functions().is_function_name(name) {
                return Err(EvalError::Argument(format!(
                    "the name \"{}\" is a function name, parameters cannot have this name",
                    name
                )));
            }
            if let Some(constant) = self.engine.constants().get(name) {
                if !constant.is_overwritable() {
                    return Err(EvalError::Argument(format!(
                        "the name \"{}\" is a reserved variable name that cannot be overwritten",
                        name
                    )));
                }
            }
        }

        let formula = self.engine.build(&self.formula_text)?;
        Ok(PositionalFormula {
            parameters: self.parameters,
            formula,
        })
    }
}

/// A formula bound to an ordered parameter list, callable with positional
/// arguments.
pub struct PositionalFormula {
    parameters: Vec<(String, DataType)>,
    formula: Arc<Formula>,
}

impl std::fmt::Debug for PositionalFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionalFormula")
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl PositionalFormula {
    /// Invoke the formula with one value per declared parameter.
    pub fn call(&self, arguments: &[Complex64]) -> Result<Complex64, EvalError> {
        if arguments.len() != self.parameters.len() {
            return Err(EvalError::Argument(format!(
                "expected {} arguments, got {}",
                self.parameters.len(),
                arguments.len()
            )));
        }

        let mut variables = HashMap::with_capacity(arguments.len());
        for ((name, _), value) in self.parameters.iter().zip(arguments) {
            variables.insert(name.clone(), *value);
        }
        self.formula.evaluate(&variables)
    }

    /// The declared parameters, in call order.
    pub fn parameters(&self) -> &[(String, DataType)] {
        &self.parameters
    }
}
