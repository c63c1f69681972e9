use hashbrown::HashMap;

use crate::ast::Operation;
use crate::error::EvalError;
use crate::registry::{FunctionInfo, FunctionRegistry};
use cranelift::prelude::*;
use cranelift_codegen::ir::{StackSlot, StackSlotData, StackSlotKind};
use cranelift_module::{Linkage, Module};
use cranelift_simplejit::{SimpleJITBackend, SimpleJITBuilder};
use num_complex::Complex64;
use std::mem;

const CPOW: &str = "cpow";
const INVOKE: &str = "invoke_function";

/// Entry point of a jitted formula: an array of variable values in slot
/// order, an array of resolved function infos in call-site order, and the
/// result location.
type RawEval = unsafe extern "C" fn(*const Complex64, *const *const FunctionInfo, *mut Complex64);

/// Complex exponentiation helper, imported into every jitted module under
/// the `cpow` symbol. Funnels through the same `powc` the interpreter
/// uses, so both backends agree bit for bit.
unsafe extern "C" fn cpow(
    base_re: f64,
    base_im: f64,
    exp_re: f64,
    exp_im: f64,
    out: *mut Complex64,
) {
    *out = Complex64::new(base_re, base_im).powc(Complex64::new(exp_re, exp_im));
}

/// Trampoline from jitted code into a registered function. `args` points
/// at `info.arity()` staged values; the caller keeps the resolved frame
/// alive for the duration of the native call.
unsafe extern "C" fn invoke_function(
    info: *const FunctionInfo,
    args: *const Complex64,
    out: *mut Complex64,
) {
    let info = &*info;
    let arguments = std::slice::from_raw_parts(args, info.arity());
    *out = info.call(arguments);
}

/// The basic JIT class. One instance compiles one formula; the module
/// moves into the resulting [`CompiledFormula`] so the code it holds
/// stays mapped.
pub struct Jit {
    /// The function builder context, which is reused across multiple
    /// FunctionBuilder instances.
    builder_context: FunctionBuilderContext,

    /// The main Cranelift context, which holds the state for codegen.
    ctx: codegen::Context,

    /// The module, with the simplejit backend, which manages the jitted
    /// functions.
    module: Module<SimpleJITBackend>,
}

impl Default for Jit {
    fn default() -> Self {
        Self::new()
    }
}

impl Jit {
    /// Create a new `Jit` instance.
    pub fn new() -> Self {
        // Windows calling conventions are not supported yet.
        if cfg!(windows) {
            unimplemented!();
        }

        let mut builder = SimpleJITBuilder::new(cranelift_module::default_libcall_names());
        builder.symbol(CPOW, cpow as *const u8);
        builder.symbol(INVOKE, invoke_function as *const u8);
        let module = Module::new(builder);
        Self {
            builder_context: FunctionBuilderContext::new(),
            ctx: module.make_context(),
            module,
        }
    }

    /// Compile an operation tree into machine code.
    pub fn compile(mut self, operation: &Operation) -> Result<CompiledFormula, EvalError> {
        // Translate the operation tree into Cranelift IR.
        let layout = self.translate(operation);

        // Declare the function to simplejit. Functions must be declared
        // before they can be called, or defined.
        let id = self
            .module
            .declare_function("formula", Linkage::Export, &self.ctx.func.signature)
            .map_err(|e| EvalError::Compile(e.to_string()))?;

        // Define the function to simplejit. This finishes compilation.
        let mut trap_sink = cranelift_codegen::binemit::NullTrapSink {};
        self.module
            .define_function(id, &mut self.ctx, &mut trap_sink)
            .map_err(|e| EvalError::Compile(e.to_string()))?;

        // Now that compilation is finished, we can clear out the context
        // state.
        self.module.clear_context(&mut self.ctx);

        // Finalize the function, which resolves any outstanding
        // relocations (patching in addresses, now that they're available).
        self.module.finalize_definitions();

        // We can now retrieve a pointer to the machine code.
        let code = self.module.get_finalized_function(id);
        let entry = unsafe { mem::transmute::<*const u8, RawEval>(code) };

        Ok(CompiledFormula {
            entry,
            variables: layout.0,
            call_sites: layout.1,
            _module: self.module,
        })
    }

    // Translate the operation tree into Cranelift IR.
    fn translate(&mut self, operation: &Operation) -> (Vec<String>, Vec<(String, usize)>) {
        let pointer_type = self.module.target_config().pointer_type();

        // vars, funcs, out
        for _ in 0..3 {
            self.ctx
                .func
                .signature
                .params
                .push(AbiParam::new(pointer_type));
        }

        let mut builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_context);

        let entry_ebb = builder.create_block();
        builder.append_block_params_for_function_params(entry_ebb);
        builder.switch_to_block(entry_ebb);
        builder.seal_block(entry_ebb);

        let vars_ptr = builder.block_params(entry_ebb)[0];
        let funcs_ptr = builder.block_params(entry_ebb)[1];
        let out_ptr = builder.block_params(entry_ebb)[2];

        // One scratch slot holds staged call arguments, another receives
        // helper results; both are only live between the stores feeding a
        // call and the loads consuming its result, so single slots are
        // enough even for nested calls.
        let (any_helper, max_argc) = helper_shape(operation);
        let result_slot = if any_helper {
            Some(builder.func.create_stack_slot(StackSlotData::new(
                StackSlotKind::ExplicitSlot,
                16,
            )))
        } else {
            None
        };
        let argument_slot = if max_argc > 0 {
            Some(builder.func.create_stack_slot(StackSlotData::new(
                StackSlotKind::ExplicitSlot,
                16 * max_argc as u32,
            )))
        } else {
            None
        };

        let mut trans = FunctionTranslator {
            builder,
            module: &mut self.module,
            pointer_type,
            vars_ptr,
            funcs_ptr,
            result_slot,
            argument_slot,
            variable_slots: Vec::new(),
            variable_indices: HashMap::new(),
            call_sites: Vec::new(),
        };

        let (re, im) = trans.translate_operation(operation);
        trans.builder.ins().store(MemFlags::new(), re, out_ptr, 0);
        trans.builder.ins().store(MemFlags::new(), im, out_ptr, 8);
        trans.builder.ins().return_(&[]);

        // Tell the builder we're done with this function.
        trans.builder.finalize();

        (trans.variable_slots, trans.call_sites)
    }
}

/// Whether the tree needs the helper result slot, and the widest call
/// argument list in it.
fn helper_shape(operation: &Operation) -> (bool, usize) {
    match operation {
        Operation::IntegerConstant(_)
        | Operation::FloatingPointConstant(_)
        | Operation::ComplexConstant(_)
        | Operation::Variable(_) => (false, 0),
        Operation::Add(_, left, right)
        | Operation::Sub(_, left, right)
        | Operation::Mul(_, left, right)
        | Operation::Div(_, left, right) => {
            let (l, la) = helper_shape(left);
            let (r, ra) = helper_shape(right);
            (l || r, la.max(ra))
        }
        Operation::Pow(_, left, right) => {
            let (_, la) = helper_shape(left);
            let (_, ra) = helper_shape(right);
            (true, la.max(ra))
        }
        Operation::UnaryMinus(_, operand) => helper_shape(operand),
        Operation::Function(_, _, arguments) => {
            let mut max_argc = arguments.len();
            for argument in arguments {
                let (_, argc) = helper_shape(argument);
                max_argc = max_argc.max(argc);
            }
            (true, max_argc)
        }
    }
}

/// A collection of state used for translating from operation tree nodes
/// into Cranelift IR.
struct FunctionTranslator<'a> {
    builder: FunctionBuilder<'a>,
    module: &'a mut Module<SimpleJITBackend>,
    pointer_type: Type,
    vars_ptr: Value,
    funcs_ptr: Value,
    result_slot: Option<StackSlot>,
    argument_slot: Option<StackSlot>,
    /// Variable names in slot order (first use in evaluation order).
    variable_slots: Vec<String>,
    variable_indices: HashMap<String, usize>,
    /// Function name and argument count per call site, in emit order.
    call_sites: Vec<(String, usize)>,
}

impl<'a> FunctionTranslator<'a> {
    /// Emit the IR computing `operation`, returning the (re, im) value
    /// pair. The arithmetic mirrors `num_complex`'s operation order so the
    /// jitted code and the interpreter agree bit for bit.
    fn translate_operation(&mut self, operation: &Operation) -> (Value, Value) {
        match operation {
            Operation::IntegerConstant(value) => {
                let re = self
                    .builder
                    .ins()
                    .f64const(Ieee64::with_float(*value as f64));
                let im = self.builder.ins().f64const(Ieee64::with_float(0.0));
                (re, im)
            }
            Operation::FloatingPointConstant(value) => {
                let re = self.builder.ins().f64const(Ieee64::with_float(*value));
                let im = self.builder.ins().f64const(Ieee64::with_float(0.0));
                (re, im)
            }
            Operation::ComplexConstant(value) => {
                let re = self.builder.ins().f64const(Ieee64::with_float(value.re));
                let im = self.builder.ins().f64const(Ieee64::with_float(value.im));
                (re, im)
            }
            Operation::Variable(name) => {
                let index = self.variable_slot(name);
                let offset = (index * 16) as i32;
                let re =
                    self.builder
                        .ins()
                        .load(types::F64, MemFlags::new(), self.vars_ptr, offset);
                let im = self.builder.ins().load(
                    types::F64,
                    MemFlags::new(),
                    self.vars_ptr,
                    offset + 8,
                );
                (re, im)
            }
            Operation::Add(_, left, right) => {
                let (lr, li) = self.translate_operation(left);
                let (rr, ri) = self.translate_operation(right);
                let re = self.builder.ins().fadd(lr, rr);
                let im = self.builder.ins().fadd(li, ri);
                (re, im)
            }
            Operation::Sub(_, left, right) => {
                let (lr, li) = self.translate_operation(left);
                let (rr, ri) = self.translate_operation(right);
                let re = self.builder.ins().fsub(lr, rr);
                let im = self.builder.ins().fsub(li, ri);
                (re, im)
            }
            Operation::Mul(_, left, right) => {
                let (lr, li) = self.translate_operation(left);
                let (rr, ri) = self.translate_operation(right);
                // (a.re * b.re - a.im * b.im, a.re * b.im + a.im * b.re)
                let rere = self.builder.ins().fmul(lr, rr);
                let imim = self.builder.ins().fmul(li, ri);
                let re = self.builder.ins().fsub(rere, imim);
                let reim = self.builder.ins().fmul(lr, ri);
                let imre = self.builder.ins().fmul(li, rr);
                let im = self.builder.ins().fadd(reim, imre);
                (re, im)
            }
            Operation::Div(_, left, right) => {
                let (lr, li) = self.translate_operation(left);
                let (rr, ri) = self.translate_operation(right);
                // Same shape as num_complex: numerators over b's squared
                // norm.
                let rr2 = self.builder.ins().fmul(rr, rr);
                let ri2 = self.builder.ins().fmul(ri, ri);
                let norm_sqr = self.builder.ins().fadd(rr2, ri2);
                let rere = self.builder.ins().fmul(lr, rr);
                let imim = self.builder.ins().fmul(li, ri);
                let re_num = self.builder.ins().fadd(rere, imim);
                let imre = self.builder.ins().fmul(li, rr);
                let reim = self.builder.ins().fmul(lr, ri);
                let im_num = self.builder.ins().fsub(imre, reim);
                let re = self.builder.ins().fdiv(re_num, norm_sqr);
                let im = self.builder.ins().fdiv(im_num, norm_sqr);
                (re, im)
            }
            Operation::Pow(_, left, right) => {
                let (lr, li) = self.translate_operation(left);
                let (rr, ri) = self.translate_operation(right);
                let out = self.result_address();
                let params = [types::F64, types::F64, types::F64, types::F64, self.pointer_type];
                self.call_helper(CPOW, &params, &[lr, li, rr, ri, out]);
                self.load_result(out)
            }
            Operation::UnaryMinus(_, operand) => {
                let (re, im) = self.translate_operation(operand);
                let re = self.builder.ins().fneg(re);
                let im = self.builder.ins().fneg(im);
                (re, im)
            }
            Operation::Function(_, name, arguments) => {
                // Arguments are computed left to right before any of them
                // is staged, so a nested call can reuse the scratch slot.
                let mut staged = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    staged.push(self.translate_operation(argument));
                }

                let args = self.argument_address();
                for (index, (re, im)) in staged.iter().enumerate() {
                    let offset = (index * 16) as i32;
                    self.builder.ins().store(MemFlags::new(), *re, args, offset);
                    self.builder
                        .ins()
                        .store(MemFlags::new(), *im, args, offset + 8);
                }

                let site = self.call_sites.len();
                self.call_sites.push((name.clone(), arguments.len()));
                let info = self.builder.ins().load(
                    self.pointer_type,
                    MemFlags::new(),
                    self.funcs_ptr,
                    (site * self.pointer_type.bytes() as usize) as i32,
                );

                let out = self.result_address();
                let params = [self.pointer_type, self.pointer_type, self.pointer_type];
                self.call_helper(INVOKE, &params, &[info, args, out]);
                self.load_result(out)
            }
        }
    }

    fn variable_slot(&mut self, name: &str) -> usize {
        if let Some(&index) = self.variable_indices.get(name) {
            return index;
        }
        let index = self.variable_slots.len();
        self.variable_slots.push(name.to_string());
        self.variable_indices.insert(name.to_string(), index);
        index
    }

    fn result_address(&mut self) -> Value {
        let slot = self.result_slot.expect("helper result slot not allocated");
        self.builder.ins().stack_addr(self.pointer_type, slot, 0)
    }

    fn argument_address(&mut self) -> Value {
        // A zero-argument call only needs a well-aligned address that is
        // never read; the result slot serves.
        let slot = self
            .argument_slot
            .or(self.result_slot)
            .expect("argument slot not allocated");
        self.builder.ins().stack_addr(self.pointer_type, slot, 0)
    }

    fn load_result(&mut self, out: Value) -> (Value, Value) {
        let re = self.builder.ins().load(types::F64, MemFlags::new(), out, 0);
        let im = self.builder.ins().load(types::F64, MemFlags::new(), out, 8);
        (re, im)
    }

    fn call_helper(&mut self, name: &str, params: &[Type], args: &[Value]) {
        let mut sig = self.module.make_signature();
        for &param in params {
            sig.params.push(AbiParam::new(param));
        }

        let callee = self
            .module
            .declare_function(name, Linkage::Import, &sig)
            .expect("problem declaring helper function");
        let local_callee = self
            .module
            .declare_func_in_func(callee, &mut self.builder.func);
        self.builder.ins().call(local_callee, args);
    }
}

/// A formula compiled to machine code, with the layout information its
/// wrapper needs to stage variables and resolve functions per call.
pub struct CompiledFormula {
    entry: RawEval,
    /// Variable names in slot order (first use in evaluation order, so a
    /// missing variable is reported exactly as the interpreter would).
    variables: Vec<String>,
    /// Function name and argument count per call site.
    call_sites: Vec<(String, usize)>,
    /// Owns the executable memory `entry` points into.
    _module: Module<SimpleJITBackend>,
}

// The jitted code is never written again after `finalize_definitions`; the
// module is kept only so the mapping stays alive while `entry` is callable.
unsafe impl Send for CompiledFormula {}
unsafe impl Sync for CompiledFormula {}

impl CompiledFormula {
    /// Run the compiled code against `variables`. Names in the map must
    /// already be lower-cased. Function infos are resolved from the
    /// registry on every call, before any argument is evaluated, the same
    /// way the interpreter resolves them.
    pub fn evaluate(
        &self,
        functions: &FunctionRegistry,
        variables: &std::collections::HashMap<String, Complex64>,
    ) -> Result<Complex64, EvalError> {
        let mut frame = Vec::with_capacity(self.call_sites.len());
        for (name, argc) in &self.call_sites {
            let info = functions.lookup(name)?;
            if info.arity() != *argc {
                return Err(EvalError::Argument(format!(
                    "the function \"{}\" expects {} arguments, got {}",
                    name,
                    info.arity(),
                    argc
                )));
            }
            frame.push(info);
        }
        let infos: Vec<*const FunctionInfo> =
            frame.iter().map(|info| info as *const FunctionInfo).collect();

        let mut slots = Vec::with_capacity(self.variables.len());
        for name in &self.variables {
            let value = variables
                .get(name)
                .copied()
                .ok_or_else(|| EvalError::VariableNotDefined(name.clone()))?;
            slots.push(value);
        }

        let mut out = Complex64::new(0.0, 0.0);
        unsafe { (self.entry)(slots.as_ptr(), infos.as_ptr(), &mut out) };
        Ok(out)
    }

    /// The free variables of the compiled formula, in slot order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Interpreter;
    use crate::lexer::Lexer;
    use crate::parser::AstBuilder;
    use std::collections::HashMap;
    use test_case::test_case;

    fn parse(input: &str, registry: &FunctionRegistry) -> Operation {
        let tokens = Lexer::new(input, '.').tokenize().unwrap();
        AstBuilder::new(&tokens, registry).build().unwrap()
    }

    fn assert_identical(jitted: Complex64, interpreted: Complex64, formula: &str) {
        assert_eq!(
            jitted.re.to_bits(),
            interpreted.re.to_bits(),
            "re of {}",
            formula
        );
        assert_eq!(
            jitted.im.to_bits(),
            interpreted.im.to_bits(),
            "im of {}",
            formula
        );
    }

    #[test_case("3 + 5 * 2" ; "precedence")]
    #[test_case("45 - 2^3" ; "exponentiation")]
    #[test_case("2^3^2" ; "right associative exponentiation")]
    #[test_case("-(1+2+(3+4))" ; "unary minus")]
    #[test_case("(var1 + var2 * 3) / (2 + 3) - something" ; "variables")]
    #[test_case("sin(14) * cos(var1)" ; "builtin calls")]
    #[test_case("log(var2, 3) + sqrt(-1)" ; "two argument call")]
    #[test_case("var1 / var2 + var2^var1" ; "complex division and pow")]
    #[test_case("abs(var1 * 3i - var2)" ; "imaginary literals")]
    fn matches_the_interpreter(formula: &str) {
        let registry = FunctionRegistry::with_defaults();
        let operation = parse(formula, &registry);

        let mut variables = HashMap::new();
        variables.insert("var1".to_string(), Complex64::new(1.25, -3.0));
        variables.insert("var2".to_string(), Complex64::new(-0.75, 0.5));
        variables.insert("something".to_string(), Complex64::new(41.0, 0.0));

        let expected = Interpreter::new()
            .execute(&operation, &registry, &variables)
            .unwrap();
        let compiled = Jit::new().compile(&operation).unwrap();
        let jitted = compiled.evaluate(&registry, &variables).unwrap();

        assert_identical(jitted, expected, formula);
    }

    #[test]
    fn constant_formula() {
        let registry = FunctionRegistry::with_defaults();
        let operation = parse("3 + 5 * 2", &registry);
        let compiled = Jit::new().compile(&operation).unwrap();
        let result = compiled.evaluate(&registry, &HashMap::new()).unwrap();
        assert_eq!(result, Complex64::new(13.0, 0.0));
    }

    #[test]
    fn custom_functions() {
        let registry = FunctionRegistry::with_defaults();
        registry
            .register(
                "test",
                2,
                |args: &[Complex64]| args[0] + args[1],
                true,
            )
            .unwrap();
        registry
            .register("two", 0, |_: &[Complex64]| Complex64::new(2.0, 0.0), true)
            .unwrap();

        let operation = parse("test(2, 3) + two()", &registry);
        let compiled = Jit::new().compile(&operation).unwrap();
        let result = compiled.evaluate(&registry, &HashMap::new()).unwrap();
        assert_eq!(result, Complex64::new(7.0, 0.0));
    }

    #[test]
    fn nested_calls_share_the_scratch_slot() {
        let registry = FunctionRegistry::with_defaults();
        let operation = parse("log(sqrt(16), sin(2) + 3)", &registry);

        let expected = Interpreter::new()
            .execute(&operation, &registry, &HashMap::new())
            .unwrap();
        let compiled = Jit::new().compile(&operation).unwrap();
        let jitted = compiled.evaluate(&registry, &HashMap::new()).unwrap();
        assert_identical(jitted, expected, "nested calls");
    }

    #[test]
    fn undefined_variable() {
        let registry = FunctionRegistry::with_defaults();
        let operation = parse("var1 * var2", &registry);
        let compiled = Jit::new().compile(&operation).unwrap();

        let mut variables = HashMap::new();
        variables.insert("var1".to_string(), Complex64::new(2.5, 0.0));
        assert_eq!(
            compiled.evaluate(&registry, &variables),
            Err(EvalError::VariableNotDefined("var2".into()))
        );
    }

    #[test]
    fn function_resolution_happens_per_call() {
        let registry = FunctionRegistry::with_defaults();
        registry
            .register("offset", 0, |_: &[Complex64]| Complex64::new(1.0, 0.0), true)
            .unwrap();

        let operation = parse("offset() + 1", &registry);
        let compiled = Jit::new().compile(&operation).unwrap();
        let first = compiled.evaluate(&registry, &HashMap::new()).unwrap();
        assert_eq!(first, Complex64::new(2.0, 0.0));

        // Re-registering between calls is picked up without recompiling.
        registry
            .register("offset", 0, |_: &[Complex64]| Complex64::new(40.0, 0.0), true)
            .unwrap();
        let second = compiled.evaluate(&registry, &HashMap::new()).unwrap();
        assert_eq!(second, Complex64::new(41.0, 0.0));

        // And a registry without the function fails safely.
        let empty = FunctionRegistry::new();
        assert_eq!(
            compiled.evaluate(&empty, &HashMap::new()),
            Err(EvalError::UnsupportedFunction("offset".into()))
        );
    }
}
