use crate::ast::Operation;
use crate::builder::FormulaBuilder;
use crate::cache::FormulaCache;
use crate::error::EvalError;
use crate::interpreter::Interpreter;
use crate::jit::{CompiledFormula, Jit};
use crate::lexer::Lexer;
use crate::optimizer::Optimizer;
use crate::parser::AstBuilder;
use crate::registry::{ConstantRegistry, FunctionRegistry};
use log::debug;
use num_complex::Complex64;
use std::collections::HashMap;
use std::sync::Arc;

/// Which backend executes formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Walk the operation tree on every evaluation.
    Interpreted,
    /// Compile each formula to machine code once, then call it directly.
    Compiled,
}

/// Construction parameters for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub execution_mode: ExecutionMode,
    pub cache_enabled: bool,
    pub optimizer_enabled: bool,
    /// `'.'` or `','`. With a decimal comma, function arguments are
    /// separated by `';'`.
    pub decimal_separator: char,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            execution_mode: ExecutionMode::Compiled,
            cache_enabled: true,
            optimizer_enabled: true,
            decimal_separator: '.',
        }
    }
}

/// The main entry point: converts strings containing mathematical
/// formulas into callable evaluators and calculates their results.
///
/// One engine owns its function registry, constant registry and formula
/// cache, so independent engines have fully isolated symbol sets. A
/// single engine may be shared between threads; evaluation takes `&self`.
pub struct Engine {
    functions: Arc<FunctionRegistry>,
    constants: Arc<ConstantRegistry>,
    optimizer: Optimizer,
    cache: FormulaCache<Formula>,
    config: EngineConfig,
}

impl Engine {
    /// An engine with the default configuration: compiled execution,
    /// cache and optimizer enabled, decimal point.
    pub fn new() -> Engine {
        Self::assemble(EngineConfig::default())
    }

    /// An engine with an explicit configuration. Fails if the decimal
    /// separator is not `'.'` or `','`.
    pub fn with_config(config: EngineConfig) -> Result<Engine, EvalError> {
        if config.decimal_separator != '.' && config.decimal_separator != ',' {
            return Err(EvalError::Argument(format!(
                "invalid decimal separator '{}'",
                config.decimal_separator
            )));
        }
        Ok(Self::assemble(config))
    }

    fn assemble(config: EngineConfig) -> Engine {
        Engine {
            functions: Arc::new(FunctionRegistry::with_defaults()),
            constants: Arc::new(ConstantRegistry::with_defaults()),
            optimizer: Optimizer::new(Interpreter::new()),
            cache: FormulaCache::new(),
            config,
        }
    }

    /// Evaluate `formula_text` against `variables`.
    ///
    /// The caller's map is never touched: it is copied into a lower-cased
    /// map, checked against reserved names, and extended with the
    /// registered constants before evaluation.
    pub fn evaluate(
        &self,
        formula_text: &str,
        variables: &HashMap<String, Complex64>,
    ) -> Result<Complex64, EvalError> {
        if formula_text.is_empty() {
            return Err(EvalError::Argument("the formula text is empty".into()));
        }

        let prepared = prepare_variables(variables, &self.functions, &self.constants)?;
        let formula = self.cached_or_built(formula_text)?;
        formula.execute_prepared(&prepared)
    }

    /// Build a reusable evaluator for `formula_text` without invoking it.
    /// The result is shared with (and by) [`Engine::evaluate`] through the
    /// formula cache.
    pub fn build(&self, formula_text: &str) -> Result<Arc<Formula>, EvalError> {
        if formula_text.is_empty() {
            return Err(EvalError::Argument("the formula text is empty".into()));
        }
        self.cached_or_built(formula_text)
    }

    /// Start building a positional callable for `formula_text`.
    pub fn formula(&self, formula_text: &str) -> FormulaBuilder {
        FormulaBuilder::new(self, formula_text)
    }

    /// Register a complex-valued function of the given arity under
    /// `name`. User functions are overwritable; built-ins are not.
    pub fn add_function<F>(&self, name: &str, arity: usize, function: F) -> Result<(), EvalError>
    where
        F: Fn(&[Complex64]) -> Complex64 + Send + Sync + 'static,
    {
        self.functions.register(name, arity, function, true)
    }

    /// Register a constant under `name`. User constants are overwritable;
    /// `i`, `e` and `pi` are not.
    pub fn add_constant(&self, name: &str, value: Complex64) -> Result<(), EvalError> {
        self.constants.register(name, value, true)
    }

    pub(crate) fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub(crate) fn constants(&self) -> &ConstantRegistry {
        &self.constants
    }

    fn cached_or_built(&self, formula_text: &str) -> Result<Arc<Formula>, EvalError> {
        if !self.config.cache_enabled {
            return Ok(Arc::new(self.build_formula(formula_text)?));
        }
        self.cache
            .get_or_build(formula_text, || self.build_formula(formula_text))
    }

    fn build_formula(&self, formula_text: &str) -> Result<Formula, EvalError> {
        debug!("building {:?} evaluator for {:?}", self.config.execution_mode, formula_text);

        let tokens = Lexer::new(formula_text, self.config.decimal_separator).tokenize()?;
        let operation = AstBuilder::new(&tokens, &self.functions).build()?;
        let operation = if self.config.optimizer_enabled {
            self.optimizer.optimize(operation, &self.functions)?
        } else {
            operation
        };

        let backend = match self.config.execution_mode {
            ExecutionMode::Interpreted => Backend::Interpreted(operation),
            ExecutionMode::Compiled => Backend::Compiled(Jit::new().compile(&operation)?),
        };
        Ok(Formula {
            backend,
            functions: Arc::clone(&self.functions),
            constants: Arc::clone(&self.constants),
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// A formula built by an [`Engine`], reusable across binding sets.
pub struct Formula {
    backend: Backend,
    functions: Arc<FunctionRegistry>,
    constants: Arc<ConstantRegistry>,
}

enum Backend {
    Interpreted(Operation),
    Compiled(CompiledFormula),
}

impl Formula {
    /// Evaluate against `variables`, with the same binding preparation
    /// [`Engine::evaluate`] performs: the caller's map is copied
    /// lower-cased, verified against reserved names, and the registered
    /// constants are injected for names the caller left unbound.
    pub fn evaluate(&self, variables: &HashMap<String, Complex64>) -> Result<Complex64, EvalError> {
        let prepared = prepare_variables(variables, &self.functions, &self.constants)?;
        self.execute_prepared(&prepared)
    }

    /// The free variables of the formula, in evaluation order. Registered
    /// constants count as variables here; they are bound automatically at
    /// evaluation time.
    pub fn variables(&self) -> Vec<String> {
        match &self.backend {
            Backend::Interpreted(operation) => operation.variables(),
            Backend::Compiled(compiled) => compiled.variables().to_vec(),
        }
    }

    fn execute_prepared(
        &self,
        variables: &HashMap<String, Complex64>,
    ) -> Result<Complex64, EvalError> {
        match &self.backend {
            Backend::Interpreted(operation) => {
                Interpreter::new().execute(operation, &self.functions, variables)
            }
            Backend::Compiled(compiled) => compiled.evaluate(&self.functions, variables),
        }
    }
}

/// Copy the caller's bindings into a fresh lower-cased map, reject
/// reserved names, and bind every registered constant the caller did not
/// bind explicitly. Only overwritable constants can be shadowed; the
/// non-overwritable ones and all function names are rejected outright.
fn prepare_variables(
    variables: &HashMap<String, Complex64>,
    functions: &FunctionRegistry,
    constants: &ConstantRegistry,
) -> Result<HashMap<String, Complex64>, EvalError> {
    let mut prepared = HashMap::with_capacity(variables.len());
    for (name, value) in variables {
        prepared.insert(name.to_lowercase(), *value);
    }

    for name in prepared.keys() {
        if let Some(constant) = constants.get(name) {
            if !constant.is_overwritable() {
                return Err(EvalError::Argument(format!(
                    "the name \"{}\" is a reserved variable name that cannot be overwritten",
                    name
                )));
            }
        }
        if functions.is_function_name(name) {
            return Err(EvalError::Argument(format!(
                "the name \"{}\" is a function name, variables cannot use it",
                name
            )));
        }
    }

    for constant in constants.entries() {
        prepared
            .entry(constant.name().to_string())
            .or_insert_with(|| constant.value());
    }
    Ok(prepared)
}

/// Evaluate a single formula with a one-shot interpreted engine.
///
/// For repeated evaluation build an [`Engine`] once and keep it around;
/// this helper pays the full parse on every call.
///
/// # Example
///
/// ```
/// # use std::collections::HashMap;
/// use num_complex::Complex64;
///
/// assert_eq!(
///     formulex::eval("45 - 2*4", &HashMap::new()),
///     Ok(Complex64::new(37.0, 0.0))
/// );
/// ```
pub fn eval(
    formula_text: &str,
    variables: &HashMap<String, Complex64>,
) -> Result<Complex64, EvalError> {
    let engine = Engine::with_config(EngineConfig {
        execution_mode: ExecutionMode::Interpreted,
        cache_enabled: false,
        optimizer_enabled: true,
        decimal_separator: '.',
    })?;
    engine.evaluate(formula_text, variables)
}
