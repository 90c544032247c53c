//! Semantic errors.
//!
//! Semantic analysis happens inline with parsing (see [`crate::parse`]),
//! so this module only describes what can go wrong while names are
//! resolved, types are checked and constants are folded.

use thiserror::Error;

use crate::{
    lex::Identifier,
    ops::Operator,
    source::Located,
    types::{Category, Type, MAX_SIZE},
};

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Duplication found `{0}`")]
    Duplicate(Identifier),

    #[error("Identifier not found `{0}`")]
    NotFound(Identifier),

    #[error("Incompatible types: required `{required}` but found `{found}`")]
    Incompatible { required: Type, found: Type },

    #[error("Unsupported operand types for `{operator}`: `{left}` and `{right}`")]
    UnsupportedOperands {
        operator: Operator,
        left: Category,
        right: Category,
    },

    #[error("Illegal type `{0}` for unary operator")]
    IllegalUnary(Category),

    #[error("Illegal expression")]
    IllegalExpression,

    #[error("Constant expression expected")]
    ExpectedConstant,

    #[error("`{0}` is not a type")]
    ExpectedType(Identifier),

    #[error("Illegal range: {low}..{high}")]
    BadRange { low: i32, high: i32 },

    #[error("Storage too large, at most {} bytes are allowed", MAX_SIZE)]
    TypeTooLarge,

    #[error("Index {index} out of range {low}..{high}")]
    IndexOutOfRange { index: i32, low: i32, high: i32 },

    #[error("Expected an array, found `{0}`")]
    NotAnArray(Type),

    #[error("Expected a record, found `{0}`")]
    NotARecord(Type),

    #[error("Unknown record field `{0}`")]
    FieldNotFound(Identifier),

    #[error("Illegal initialization order: expected field `{expected}`, found `{found}`")]
    IllegalInitializationOrder {
        expected: Identifier,
        found: Identifier,
    },

    #[error("Wrong number of elements in array constant: expected {expected}, found {found}")]
    ElementCount { expected: usize, found: usize },

    #[error("Parameters after a default value must also have defaults")]
    DefaultParameterOrder,

    #[error("`var` parameters can't have default values")]
    VarParameterDefault,

    #[error("`{0}` outside of a loop")]
    OutsideLoop(&'static str),

    #[error("Can't assign to `{0}`")]
    AssignToConstant(Identifier),

    #[error("Wrong number of arguments: expected {expected}, found {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("Argument for `var` parameter `{0}` must be a variable of the same type")]
    VarArgument(Identifier),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Illegal counter variable, an integer variable is required")]
    IllegalCounter,

    #[error("Procedure `{0}` has no result")]
    NoResult(Identifier),

    #[error("Type `{0}` can't be read")]
    Unreadable(Type),

    #[error("Type `{0}` can't be written")]
    Unwritable(Type),
}
