use thiserror::Error;

/// Error type for the formulex crate.
///
/// Lexing, parsing and argument errors are raised before a formula enters
/// the cache; evaluation errors are raised per call and leave any cached
/// evaluator intact.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Unrecognized character or malformed numeral in the formula text.
    #[error("lex error at position {position}: {message}")]
    Lex { position: usize, message: String },

    /// Structural grammar violation, unbalanced parentheses, unknown
    /// function name or wrong function arity.
    #[error("parse error: {0}")]
    Parse(String),

    /// A function name was not found in the function registry at
    /// evaluation time.
    #[error("the function \"{0}\" is not supported")]
    UnsupportedFunction(String),

    /// A constant name was not found in the constant registry.
    #[error("the constant \"{0}\" is not supported")]
    UnsupportedConstant(String),

    /// A variable used in the formula has no binding.
    #[error("the variable \"{0}\" used is not defined")]
    VariableNotDefined(String),

    /// Invalid top-level call: empty formula text, reserved-name collision,
    /// duplicate builder parameter, invalid configuration value.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// The JIT module failed to build the formula.
    #[error("compilation failed: {0}")]
    Compile(String),
}
