#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(
    clippy::needless_return,
    clippy::missing_docs_in_private_items,
    clippy::module_name_repetitions
)]

//! Formulex, a crate for dynamic evaluation of complex-valued formulas.
//!
//! This crate provides run-time evaluation of mathematical formulas
//! embedded in strings. The easiest way to use it is the
//! [`eval`](fn.eval.html) function:
//!
//! ```
//! use std::collections::HashMap;
//! use num_complex::Complex64;
//!
//! let result = formulex::eval("3 + 5 * 2", &HashMap::new());
//! assert_eq!(result, Ok(Complex64::new(13.0, 0.0)));
//! ```
//!
//! The second argument is a `HashMap` defining variables:
//!
//! ```
//! use std::collections::HashMap;
//! use num_complex::Complex64;
//!
//! let mut context: HashMap<String, Complex64> = HashMap::new();
//! context.insert("a".into(), Complex64::new(3.5, 0.0));
//! assert_eq!(
//!     formulex::eval("2 * a", &context),
//!     Ok(Complex64::new(7.0, 0.0))
//! );
//! ```
//!
//! For repeated evaluation, create an [`Engine`](struct.Engine.html). The
//! engine compiles every distinct formula to machine code once, caches the
//! result, and evaluates it against fresh variable bindings on each call:
//!
//! ```
//! use std::collections::HashMap;
//! use formulex::Engine;
//! use num_complex::Complex64;
//!
//! let engine = Engine::new();
//!
//! let formula = engine.build("3 / c + b").unwrap();
//! let mut context: HashMap<String, Complex64> = HashMap::new();
//! context.insert("c".into(), Complex64::new(1.0, 0.0));
//! context.insert("b".into(), Complex64::new(5.0, 0.0));
//! assert_eq!(formula.evaluate(&context), Ok(Complex64::new(8.0, 0.0)));
//!
//! context.insert("b".into(), Complex64::new(10.0, 0.0));
//! assert_eq!(formula.evaluate(&context), Ok(Complex64::new(13.0, 0.0)));
//! ```
//!
//! # Language definition
//!
//! A formula can contain the following elements:
//!
//! - numeric literals: `42`, `-12.456`, `2.5i`. The decimal separator is
//!   configurable (`.` by default); a trailing `i` marks an imaginary
//!   value;
//! - left and right parenthesis;
//! - mathematical operators: `+` for addition, `-` for subtraction,
//!   `*` for multiplication, `/` for division and `^` for exponentiation.
//!   All arithmetic is complex-valued;
//! - variables. Variable names start with a letter and contain letters
//!   and digits, and are matched case-insensitively;
//! - function calls: `sin(a)`, `log(x, 10)`. The built-in functions are
//!   `sin`, `cos`, `asin`, `acos`, `tan`, `atan`, `ln`, `lg` (base 10),
//!   `log(a, b)` (base `b`), `sqrt` and `abs`, all complex-valued. Custom
//!   functions of up to six parameters can be registered with
//!   [`Engine::add_function`](struct.Engine.html#method.add_function);
//! - the constants `i`, `e` and `pi`, plus anything registered with
//!   [`Engine::add_constant`](struct.Engine.html#method.add_constant).
//!
//! Any other symbol is forbidden in the input.
//!
//! The mathematical operators obey the usual relations of associativity
//! and precedence, with `^` binding tighter than unary minus and
//! associating to the right. They carry the usual floating point
//! properties: addition is not commutative, `NaN` and infinities exist.
//!
//! # Technical details
//!
//! Formulas are parsed by recursive descent into a typed syntax tree and
//! constant-folded. Two execution backends share the tree: a tree walking
//! interpreter, and a [Cranelift](https://crates.io/crates/cranelift)
//! based JIT producing directly callable machine code. Both return
//! bit-identical results; the engine picks one through
//! [`EngineConfig`](struct.EngineConfig.html) and memoizes built
//! evaluators per formula text.

#[macro_use]
extern crate lazy_static;

mod ast;
mod builder;
mod cache;
mod engine;
mod error;
mod interpreter;
mod jit;
mod lexer;
mod optimizer;
mod parser;
mod registry;
mod token;
mod util;

pub use ast::{DataType, Operation};
pub use builder::{FormulaBuilder, PositionalFormula};
pub use cache::FormulaCache;
pub use engine::{eval, Engine, EngineConfig, ExecutionMode, Formula};
pub use error::EvalError;
pub use interpreter::Interpreter;
pub use jit::{CompiledFormula, Jit};
pub use lexer::{is_identifier, Lexer};
pub use optimizer::Optimizer;
pub use parser::AstBuilder;
pub use registry::{
    ConstantInfo, ConstantRegistry, FunctionInfo, FunctionRegistry, MAX_ARITY,
};
pub use token::{Op, Token, TokenKind};
pub use util::{BuiltinFunction, CONSTANTS, FUNCTIONS};
