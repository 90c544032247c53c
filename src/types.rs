//! Type system.
//!
//! Scalar types are plain enum variants, which makes them canonical by
//! construction: two `integer` types are always the same value. Composite
//! types are reference counted so that aliases declared in `type` sections
//! share the declaration that created them.

use std::{
    fmt::{self, Display},
    rc::Rc,
};

use crate::{
    lex::Identifier,
    ops::{Class, Operator},
    semantic::SemanticError,
    source::Located,
    symbols::SymbolTable,
};

/// Size of a string value, Pascal shortstring style.
pub const STRING_SIZE: u32 = 256;

/// Broad classification of types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Integer,
    Double,
    Char,
    String,
    Array,
    Record,
    Function,
    Nil,
}

impl Display for Category {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Integer => "Integer",
            Category::Double => "Double",
            Category::Char => "Char",
            Category::String => "String",
            Category::Array => "Array",
            Category::Record => "Record",
            Category::Function => "Function",
            Category::Nil => "Nil",
        };

        fmt.write_str(name)
    }
}

/// Largest storage, in bytes, a type or a frame may take.
pub const MAX_SIZE: u32 = 1 << 30;

#[derive(Clone, Debug)]
pub enum Type {
    Integer,
    Double,
    Char,
    String,
    Nil,
    Array(Rc<ArrayType>),
    Record(Rc<RecordType>),
    Function(Rc<Signature>),
}

#[derive(Debug)]
pub struct ArrayType {
    pub element: Type,
    pub low: i32,
    pub high: i32,
}

impl ArrayType {
    /// Number of elements.
    pub fn len(&self) -> u32 {
        (i64::from(self.high) - i64::from(self.low) + 1) as u32
    }
}

#[derive(Debug)]
pub struct RecordType {
    pub fields: SymbolTable,
}

/// Identifies a function within a program. The main program is always 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

impl FunctionId {
    pub const MAIN: FunctionId = FunctionId(0);
}

/// Everything a caller needs to know about a function.
#[derive(Debug)]
pub struct Signature {
    pub id: FunctionId,
    pub name: Located<Identifier>,
    pub parameters: SymbolTable,
    pub result: Type,
    /// Lexical level of the function's own locals.
    pub level: u32,
}

impl Type {
    /// Canonical type of a scalar category.
    pub fn simple(category: Category) -> Option<Type> {
        match category {
            Category::Integer => Some(Type::Integer),
            Category::Double => Some(Type::Double),
            Category::Char => Some(Type::Char),
            Category::String => Some(Type::String),
            Category::Nil => Some(Type::Nil),
            Category::Array | Category::Record | Category::Function => None,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Type::Integer => Category::Integer,
            Type::Double => Category::Double,
            Type::Char => Category::Char,
            Type::String => Category::String,
            Type::Nil => Category::Nil,
            Type::Array(_) => Category::Array,
            Type::Record(_) => Category::Record,
            Type::Function(_) => Category::Function,
        }
    }

    /// Storage size in bytes. Always a multiple of 4.
    pub fn size(&self) -> u32 {
        match self {
            Type::Integer | Type::Char => 4,
            Type::Double => 8,
            Type::String => STRING_SIZE,
            Type::Nil | Type::Function(_) => 0,
            Type::Array(array) => array.len() * array.element.size(),
            Type::Record(record) => record.fields.size(),
        }
    }

    /// `integer` or `char`.
    pub fn is_integer_like(&self) -> bool {
        matches!(self, Type::Integer | Type::Char)
    }

    /// `integer`, `char` or `double`.
    pub fn is_numeric(&self) -> bool {
        self.is_integer_like() || matches!(self, Type::Double)
    }

    /// `char` or `string`.
    pub fn is_textual(&self) -> bool {
        matches!(self, Type::Char | Type::String)
    }

    pub fn is_scalar(&self) -> bool {
        self.is_numeric() || matches!(self, Type::String)
    }

    /// Structural equality.
    pub fn same(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Array(a), Type::Array(b)) => {
                a.low == b.low && a.high == b.high && a.element.same(&b.element)
            }

            (Type::Record(a), Type::Record(b)) => {
                a.fields.len() == b.fields.len()
                    && a.fields.iter().zip(b.fields.iter()).all(|(a, b)| {
                        a.name.as_ref() == b.name.as_ref() && a.ty.same(&b.ty)
                    })
            }

            (Type::Function(a), Type::Function(b)) => Rc::ptr_eq(a, b),
            _ => self.category() == other.category() && Type::simple(self.category()).is_some(),
        }
    }
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Integer => fmt.write_str("integer"),
            Type::Double => fmt.write_str("double"),
            Type::Char => fmt.write_str("char"),
            Type::String => fmt.write_str("string"),
            Type::Nil => fmt.write_str("nil"),
            Type::Array(array) => {
                write!(fmt, "array[{}..{}] of {}", array.low, array.high, array.element)
            }

            Type::Record(record) => {
                fmt.write_str("record")?;
                for field in record.fields.iter() {
                    write!(fmt, " {}: {};", field.name.as_ref(), field.ty)?;
                }

                fmt.write_str(" end")
            }

            Type::Function(signature) => write!(fmt, "function {}", signature.name.as_ref()),
        }
    }
}

/// Checks whether a value of type `found` may be stored where `required` is
/// expected.
///
/// The relation is directed: `string` accepts `char` but not the other way
/// around. Composite types require structural equality.
pub fn compatibility(required: &Type, found: &Type) -> Result<(), SemanticError> {
    use Category::*;

    let compatible = match (required.category(), found.category()) {
        (Array | Record | Function, _) | (_, Array | Record | Function) => required.same(found),
        (required, found) if required == found => true,
        (String, Char) | (Double, Integer) | (Integer, Char) | (Char, Integer) => true,
        _ => false,
    };

    if compatible {
        Ok(())
    } else {
        Err(SemanticError::Incompatible {
            required: required.clone(),
            found: found.clone(),
        })
    }
}

/// Outcome of type checking a binary operation.
#[derive(Clone, Debug)]
pub struct Operation {
    /// Type both operands are converted to before evaluation.
    pub operands: Type,

    /// Type of the result.
    pub result: Type,
}

/// Computes operand and result types for a binary operation.
pub fn operation_result_type(
    left: &Type,
    right: &Type,
    operator: Operator,
) -> Result<Operation, SemanticError> {
    let both = |predicate: fn(&Type) -> bool| predicate(left) && predicate(right);
    let either_double = matches!(left, Type::Double) || matches!(right, Type::Double);
    let either_string = matches!(left, Type::String) || matches!(right, Type::String);

    let operands = match operator.class() {
        Class::Comparison if both(Type::is_integer_like) => Some(Type::Integer),

        Class::Comparison if both(Type::is_numeric) && either_double => Some(Type::Double),
        Class::Comparison if both(Type::is_textual) && either_string => Some(Type::String),

        Class::IntegerOnly if both(Type::is_integer_like) => Some(Type::Integer),

        Class::Arithmetic if both(Type::is_integer_like) => Some(Type::Integer),

        Class::Arithmetic if both(Type::is_numeric) => Some(Type::Double),
        Class::Arithmetic if both(Type::is_textual) && operator == Operator::Add => {
            Some(Type::String)
        }

        _ => None,
    };

    let operands = operands.ok_or_else(|| SemanticError::UnsupportedOperands {
        operator,
        left: left.category(),
        right: right.category(),
    })?;

    let result = match operator.class() {
        Class::Comparison => Type::Integer,
        _ => operands.clone(),
    };

    Ok(Operation { operands, result })
}
