use hashbrown::HashMap;
use num_complex::Complex64;

/// Signature shared by every built-in function.
pub type BuiltinFunction = fn(&[Complex64]) -> Complex64;

lazy_static! {
    /// The built-in functions, keyed by name, with their arity.
    pub static ref FUNCTIONS: HashMap<&'static str, (usize, BuiltinFunction)> = {
        let mut map = HashMap::<&'static str, (usize, BuiltinFunction)>::new();
        map.insert("sin", (1, sin));
        map.insert("cos", (1, cos));
        map.insert("asin", (1, asin));
        map.insert("acos", (1, acos));
        map.insert("tan", (1, tan));
        map.insert("atan", (1, atan));
        map.insert("ln", (1, ln));
        map.insert("lg", (1, lg));
        map.insert("log", (2, log));
        map.insert("sqrt", (1, sqrt));
        map.insert("abs", (1, abs));
        map.shrink_to_fit();
        map
    };

    /// The built-in constants.
    pub static ref CONSTANTS: Vec<(&'static str, Complex64)> = vec![
        ("i", Complex64::new(0.0, 1.0)),
        ("e", Complex64::new(std::f64::consts::E, 0.0)),
        ("pi", Complex64::new(std::f64::consts::PI, 0.0)),
    ];
}

fn sin(args: &[Complex64]) -> Complex64 {
    args[0].sin()
}

fn cos(args: &[Complex64]) -> Complex64 {
    args[0].cos()
}

fn asin(args: &[Complex64]) -> Complex64 {
    args[0].asin()
}

fn acos(args: &[Complex64]) -> Complex64 {
    args[0].acos()
}

fn tan(args: &[Complex64]) -> Complex64 {
    args[0].tan()
}

fn atan(args: &[Complex64]) -> Complex64 {
    args[0].atan()
}

fn ln(args: &[Complex64]) -> Complex64 {
    args[0].ln()
}

/// Logarithm base 10.
fn lg(args: &[Complex64]) -> Complex64 {
    args[0].log(10.0)
}

/// `log(a, b)` is the logarithm of `a` in base `b`.
fn log(args: &[Complex64]) -> Complex64 {
    args[0].ln() / args[1].ln()
}

fn sqrt(args: &[Complex64]) -> Complex64 {
    args[0].sqrt()
}

/// The modulus, as a real-valued complex number.
fn abs(args: &[Complex64]) -> Complex64 {
    Complex64::new(args[0].norm(), 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_arities() {
        for (name, (arity, _)) in FUNCTIONS.iter() {
            let expected = if *name == "log" { 2 } else { 1 };
            assert_eq!(*arity, expected, "arity of {}", name);
        }
    }

    #[test]
    fn log_of_matching_base_is_one() {
        let result = log(&[Complex64::new(100.0, 0.0), Complex64::new(100.0, 0.0)]);
        assert_eq!(result, Complex64::new(1.0, 0.0));
    }

    #[test]
    fn abs_of_imaginary_unit() {
        assert_eq!(
            abs(&[Complex64::new(0.0, 1.0)]),
            Complex64::new(1.0, 0.0)
        );
    }
}
