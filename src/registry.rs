use crate::error::EvalError;
use crate::util::{CONSTANTS, FUNCTIONS};
use num_complex::Complex64;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Largest argument count a registered function may declare.
pub const MAX_ARITY: usize = 6;

type FunctionImpl = Arc<dyn Fn(&[Complex64]) -> Complex64 + Send + Sync>;

/// A named, fixed-arity, complex-valued function known to the engine.
#[derive(Clone)]
pub struct FunctionInfo {
    name: String,
    arity: usize,
    function: FunctionImpl,
    is_overwritable: bool,
}

impl FunctionInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_overwritable(&self) -> bool {
        self.is_overwritable
    }

    /// Invoke the function. `arguments` must hold exactly `arity` values;
    /// the evaluators check this before calling.
    pub fn call(&self, arguments: &[Complex64]) -> Complex64 {
        (self.function)(arguments)
    }
}

impl fmt::Debug for FunctionInfo {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("FunctionInfo")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("is_overwritable", &self.is_overwritable)
            .finish()
    }
}

/// A named complex constant known to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantInfo {
    name: String,
    value: Complex64,
    is_overwritable: bool,
}

impl ConstantInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Complex64 {
        self.value
    }

    pub fn is_overwritable(&self) -> bool {
        self.is_overwritable
    }
}

/// Case-insensitive map from function names to [`FunctionInfo`].
///
/// Shared by the parser and both evaluators; mutated through `&self` so a
/// shared engine can keep registering functions after construction.
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, FunctionInfo>>,
}

impl FunctionRegistry {
    /// An empty registry, without the built-in functions.
    pub fn new() -> FunctionRegistry {
        FunctionRegistry {
            functions: RwLock::new(HashMap::new()),
        }
    }

    /// A registry seeded with the built-in functions, registered as
    /// non-overwritable.
    pub fn with_defaults() -> FunctionRegistry {
        let registry = FunctionRegistry::new();
        for (name, (arity, function)) in FUNCTIONS.iter() {
            registry
                .register(name, *arity, *function, false)
                .unwrap_or_else(|_| panic!("duplicate built-in function {}", name));
        }
        registry
    }

    /// Register `function` under `name`. Fails if `name` is already taken
    /// by a non-overwritable entry, or if `arity` is out of range.
    pub fn register<F>(
        &self,
        name: &str,
        arity: usize,
        function: F,
        is_overwritable: bool,
    ) -> Result<(), EvalError>
    where
        F: Fn(&[Complex64]) -> Complex64 + Send + Sync + 'static,
    {
        if arity > MAX_ARITY {
            return Err(EvalError::Argument(format!(
                "the function \"{}\" declares {} parameters, at most {} are supported",
                name, arity, MAX_ARITY
            )));
        }

        let key = name.to_lowercase();
        let mut functions = self.functions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = functions.get(&key) {
            if !existing.is_overwritable {
                return Err(EvalError::Argument(format!(
                    "the function \"{}\" cannot be overwritten",
                    name
                )));
            }
        }
        functions.insert(
            key.clone(),
            FunctionInfo {
                name: key,
                arity,
                function: Arc::new(function),
                is_overwritable,
            },
        );
        Ok(())
    }

    /// Look the function up by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<FunctionInfo> {
        let functions = self.functions.read().unwrap_or_else(|e| e.into_inner());
        functions.get(&name.to_lowercase()).cloned()
    }

    /// Like [`FunctionRegistry::get`], with a registry miss mapped to
    /// [`EvalError::UnsupportedFunction`].
    pub fn lookup(&self, name: &str) -> Result<FunctionInfo, EvalError> {
        self.get(name)
            .ok_or_else(|| EvalError::UnsupportedFunction(name.to_string()))
    }

    pub fn is_function_name(&self, name: &str) -> bool {
        let functions = self.functions.read().unwrap_or_else(|e| e.into_inner());
        functions.contains_key(&name.to_lowercase())
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Case-insensitive map from constant names to [`ConstantInfo`].
pub struct ConstantRegistry {
    constants: RwLock<HashMap<String, ConstantInfo>>,
}

impl ConstantRegistry {
    /// An empty registry, without the built-in constants.
    pub fn new() -> ConstantRegistry {
        ConstantRegistry {
            constants: RwLock::new(HashMap::new()),
        }
    }

    /// A registry seeded with `i`, `e` and `pi`, registered as
    /// non-overwritable.
    pub fn with_defaults() -> ConstantRegistry {
        let registry = ConstantRegistry::new();
        for (name, value) in CONSTANTS.iter() {
            registry
                .register(name, *value, false)
                .unwrap_or_else(|_| panic!("duplicate built-in constant {}", name));
        }
        registry
    }

    /// Register `value` under `name`. Fails if `name` is already taken by
    /// a non-overwritable entry.
    pub fn register(
        &self,
        name: &str,
        value: Complex64,
        is_overwritable: bool,
    ) -> Result<(), EvalError> {
        let key = name.to_lowercase();
        let mut constants = self.constants.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = constants.get(&key) {
            if !existing.is_overwritable {
                return Err(EvalError::Argument(format!(
                    "the constant \"{}\" cannot be overwritten",
                    name
                )));
            }
        }
        constants.insert(
            key.clone(),
            ConstantInfo {
                name: key,
                value,
                is_overwritable,
            },
        );
        Ok(())
    }

    /// Look the constant up by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<ConstantInfo> {
        let constants = self.constants.read().unwrap_or_else(|e| e.into_inner());
        constants.get(&name.to_lowercase()).cloned()
    }

    /// Like [`ConstantRegistry::get`], with a registry miss mapped to
    /// [`EvalError::UnsupportedConstant`].
    pub fn lookup(&self, name: &str) -> Result<ConstantInfo, EvalError> {
        self.get(name)
            .ok_or_else(|| EvalError::UnsupportedConstant(name.to_string()))
    }

    pub fn is_constant_name(&self, name: &str) -> bool {
        let constants = self.constants.read().unwrap_or_else(|e| e.into_inner());
        constants.contains_key(&name.to_lowercase())
    }

    /// Snapshot of every registered constant.
    pub fn entries(&self) -> Vec<ConstantInfo> {
        let constants = self.constants.read().unwrap_or_else(|e| e.into_inner());
        constants.values().cloned().collect()
    }
}

impl Default for ConstantRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
