use num_complex::Complex64;

/// Inferred result type of an AST node.
///
/// The tag decides how the compiler embeds literal constants and how the
/// optimizer re-materializes folded subtrees; the arithmetic itself is
/// always complex-valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    FloatingPoint,
    Complex,
}

impl DataType {
    /// Combine the types of two operands: Complex wins over FloatingPoint,
    /// FloatingPoint wins over Integer.
    pub fn promote(left: DataType, right: DataType) -> DataType {
        if left == DataType::Complex || right == DataType::Complex {
            DataType::Complex
        } else if left == DataType::FloatingPoint || right == DataType::FloatingPoint {
            DataType::FloatingPoint
        } else {
            DataType::Integer
        }
    }
}

/// Ast nodes for the formulas
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// An integer literal
    IntegerConstant(i64),
    /// A floating point literal
    FloatingPointConstant(f64),
    /// A complex literal
    ComplexConstant(Complex64),
    /// A variable, resolved against the bindings at evaluation time.
    /// The name is stored lower-cased.
    Variable(String),
    /// <left> + <right>
    Add(DataType, Box<Operation>, Box<Operation>),
    /// <left> - <right>
    Sub(DataType, Box<Operation>, Box<Operation>),
    /// <left> * <right>
    Mul(DataType, Box<Operation>, Box<Operation>),
    /// <left> / <right>
    Div(DataType, Box<Operation>, Box<Operation>),
    /// <left> ^ <right>
    Pow(DataType, Box<Operation>, Box<Operation>),
    /// -<operand>
    UnaryMinus(DataType, Box<Operation>),
    /// name(<args>...), the name stored lower-cased
    Function(DataType, String, Vec<Operation>),
}

impl Operation {
    pub fn add(left: Operation, right: Operation) -> Operation {
        let data_type = DataType::promote(left.data_type(), right.data_type());
        Operation::Add(data_type, Box::new(left), Box::new(right))
    }

    pub fn sub(left: Operation, right: Operation) -> Operation {
        let data_type = DataType::promote(left.data_type(), right.data_type());
        Operation::Sub(data_type, Box::new(left), Box::new(right))
    }

    pub fn mul(left: Operation, right: Operation) -> Operation {
        let data_type = DataType::promote(left.data_type(), right.data_type());
        Operation::Mul(data_type, Box::new(left), Box::new(right))
    }

    pub fn div(left: Operation, right: Operation) -> Operation {
        let data_type = DataType::promote(left.data_type(), right.data_type());
        Operation::Div(data_type, Box::new(left), Box::new(right))
    }

    pub fn pow(left: Operation, right: Operation) -> Operation {
        let data_type = DataType::promote(left.data_type(), right.data_type());
        Operation::Pow(data_type, Box::new(left), Box::new(right))
    }

    pub fn negate(operand: Operation) -> Operation {
        let data_type = operand.data_type();
        Operation::UnaryMinus(data_type, Box::new(operand))
    }

    pub fn function(name: String, arguments: Vec<Operation>) -> Operation {
        Operation::Function(DataType::FloatingPoint, name, arguments)
    }

    /// The inferred result type of this node.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::IntegerConstant(_) => DataType::Integer,
            Self::FloatingPointConstant(_) => DataType::FloatingPoint,
            Self::ComplexConstant(_) => DataType::Complex,
            // Bindings always hold complex values, but variables keep the
            // floating point tag so constant folding never treats their
            // surroundings as integer arithmetic.
            Self::Variable(_) => DataType::FloatingPoint,
            Self::Add(data_type, _, _)
            | Self::Sub(data_type, _, _)
            | Self::Mul(data_type, _, _)
            | Self::Div(data_type, _, _)
            | Self::Pow(data_type, _, _)
            | Self::UnaryMinus(data_type, _)
            | Self::Function(data_type, _, _) => *data_type,
        }
    }

    /// If the AST node corresponds to a literal, get `Some(value)`. Else,
    /// get `None`
    pub fn value(&self) -> Option<Complex64> {
        match self {
            Self::IntegerConstant(value) => Some(Complex64::new(*value as f64, 0.0)),
            Self::FloatingPointConstant(value) => Some(Complex64::new(*value, 0.0)),
            Self::ComplexConstant(value) => Some(*value),
            _ => None,
        }
    }

    /// Check if any node of this subtree is a variable.
    pub fn depends_on_variables(&self) -> bool {
        match self {
            Self::IntegerConstant(_) | Self::FloatingPointConstant(_) | Self::ComplexConstant(_) => {
                false
            }
            Self::Variable(_) => true,
            Self::Add(_, left, right)
            | Self::Sub(_, left, right)
            | Self::Mul(_, left, right)
            | Self::Div(_, left, right)
            | Self::Pow(_, left, right) => {
                left.depends_on_variables() || right.depends_on_variables()
            }
            Self::UnaryMinus(_, operand) => operand.depends_on_variables(),
            Self::Function(_, _, arguments) => {
                arguments.iter().any(Operation::depends_on_variables)
            }
        }
    }

    /// The variables of this subtree, in evaluation order, each name once.
    pub fn variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut Vec<String>) {
        match self {
            Self::IntegerConstant(_) | Self::FloatingPointConstant(_) | Self::ComplexConstant(_) => {}
            Self::Variable(name) => {
                if !names.iter().any(|known| known == name) {
                    names.push(name.clone());
                }
            }
            Self::Add(_, left, right)
            | Self::Sub(_, left, right)
            | Self::Mul(_, left, right)
            | Self::Div(_, left, right)
            | Self::Pow(_, left, right) => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            Self::UnaryMinus(_, operand) => operand.collect_variables(names),
            Self::Function(_, _, arguments) => {
                for argument in arguments {
                    argument.collect_variables(names);
                }
            }
        }
    }
}
