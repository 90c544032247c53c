//! Binary operators.
//!
//! Operators are grouped by precedence level the way the expression grammar
//! consumes them, and by [`Class`] the way the type system checks them.
//! Constant folding evaluates them here, on values that were already cast
//! to their common operand type.

use std::{
    cmp::Ordering,
    fmt::{self, Display},
};

use crate::{
    ast::Value,
    lex::{Keyword, Token},
    semantic::SemanticError,
    types::Type,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Divide,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

/// Type checking class of an operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Class {
    Comparison,
    IntegerOnly,
    Arithmetic,
}

impl Operator {
    pub fn class(self) -> Class {
        use Operator::*;

        match self {
            Equal | NotEqual | Less | LessOrEqual | Greater | GreaterOrEqual => Class::Comparison,
            Div | Mod | And | Or | Xor | Shl | Shr => Class::IntegerOnly,
            Add | Sub | Mul | Divide => Class::Arithmetic,
        }
    }

    /// Lowest precedence: `= <> < <= > >=`.
    pub fn relational(token: &Token) -> Option<Operator> {
        let operator = match token {
            Token::Equal => Operator::Equal,
            Token::NotEqual => Operator::NotEqual,
            Token::Less => Operator::Less,
            Token::LessOrEqual => Operator::LessOrEqual,
            Token::Greater => Operator::Greater,
            Token::GreaterOrEqual => Operator::GreaterOrEqual,
            _ => return None,
        };

        Some(operator)
    }

    /// `+ - or xor`.
    pub fn additive(token: &Token) -> Option<Operator> {
        let operator = match token {
            Token::Plus => Operator::Add,
            Token::Minus => Operator::Sub,
            Token::Keyword(Keyword::Or) => Operator::Or,
            Token::Keyword(Keyword::Xor) => Operator::Xor,
            _ => return None,
        };

        Some(operator)
    }

    /// Highest binary precedence: `* / div mod and shl shr`.
    pub fn multiplicative(token: &Token) -> Option<Operator> {
        let operator = match token {
            Token::Times => Operator::Mul,
            Token::Slash => Operator::Divide,
            Token::Keyword(Keyword::Div) => Operator::Div,
            Token::Keyword(Keyword::Mod) => Operator::Mod,
            Token::Keyword(Keyword::And) => Operator::And,
            Token::Keyword(Keyword::Shl) => Operator::Shl,
            Token::Keyword(Keyword::Shr) => Operator::Shr,
            _ => return None,
        };

        Some(operator)
    }

    /// Evaluates an operation over constants.
    ///
    /// Both values must already be of the `operands` type computed by
    /// [`crate::types::operation_result_type()`].
    pub fn eval(self, operands: &Type, left: &Value, right: &Value) -> Result<Value, SemanticError> {
        let unsupported = || SemanticError::UnsupportedOperands {
            operator: self,
            left: operands.category(),
            right: operands.category(),
        };

        match (left.integer(), right.integer()) {
            (Some(left), Some(right)) if operands.is_integer_like() => {
                return self.eval_integers(left, right).ok_or_else(unsupported)?;
            }

            _ => (),
        }

        match (left, right) {
            (Value::Double(left), Value::Double(right)) => {
                self.eval_doubles(*left, *right).ok_or_else(unsupported)?
            }

            (Value::String(left), Value::String(right)) => {
                self.eval_strings(left, right).ok_or_else(unsupported)
            }

            _ => Err(unsupported()),
        }
    }

    fn eval_integers(self, left: i32, right: i32) -> Option<Result<Value, SemanticError>> {
        use Operator::*;

        let value = match self {
            Add => left.wrapping_add(right),
            Sub => left.wrapping_sub(right),
            Mul => left.wrapping_mul(right),
            Divide | Div | Mod if right == 0 => return Some(Err(SemanticError::DivisionByZero)),
            Divide | Div => left.wrapping_div(right),
            Mod => left.wrapping_rem(right),
            And => left & right,
            Or => left | right,
            Xor => left ^ right,
            Shl => left.wrapping_shl(right as u32),
            Shr => (left as u32).wrapping_shr(right as u32) as i32,
            _ => return self.compare(left.cmp(&right)).map(Ok),
        };

        Some(Ok(Value::Integer(value)))
    }

    fn eval_doubles(self, left: f64, right: f64) -> Option<Result<Value, SemanticError>> {
        use Operator::*;

        let value = match self {
            Add => left + right,
            Sub => left - right,
            Mul => left * right,
            Divide if right == 0.0 => return Some(Err(SemanticError::DivisionByZero)),
            Divide => left / right,
            _ => return self.compare(left.partial_cmp(&right)?).map(Ok),
        };

        Some(Ok(Value::Double(value)))
    }

    fn eval_strings(self, left: &str, right: &str) -> Option<Value> {
        match self {
            Operator::Add => Some(Value::String(format!("{}{}", left, right))),
            _ => self.compare(left.cmp(right)),
        }
    }

    /// Booleans are integers, with -1 for true.
    fn compare(self, ordering: Ordering) -> Option<Value> {
        use Operator::*;

        let truth = match self {
            Equal => ordering == Ordering::Equal,
            NotEqual => ordering != Ordering::Equal,
            Less => ordering == Ordering::Less,
            LessOrEqual => ordering != Ordering::Greater,
            Greater => ordering == Ordering::Greater,
            GreaterOrEqual => ordering != Ordering::Less,
            _ => return None,
        };

        Some(Value::Integer(if truth { -1 } else { 0 }))
    }
}

impl Display for Operator {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Operator::*;

        let text = match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Divide => "/",
            Div => "div",
            Mod => "mod",
            And => "and",
            Or => "or",
            Xor => "xor",
            Shl => "shl",
            Shr => "shr",
            Equal => "=",
            NotEqual => "<>",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
        };

        fmt.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_folding() {
        let eval = |op: Operator, l, r| op.eval(&Type::Integer, &Value::Integer(l), &Value::Integer(r));

        assert!(matches!(eval(Operator::Add, 3, 4), Ok(Value::Integer(7))));
        assert!(matches!(eval(Operator::Div, 7, 2), Ok(Value::Integer(3))));
        assert!(matches!(eval(Operator::Mod, -7, 2), Ok(Value::Integer(-1))));
        assert!(matches!(eval(Operator::Shl, 1, 4), Ok(Value::Integer(16))));
        assert!(matches!(eval(Operator::Less, 1, 2), Ok(Value::Integer(-1))));
        assert!(matches!(eval(Operator::Greater, 1, 2), Ok(Value::Integer(0))));
        assert!(matches!(eval(Operator::Div, 1, 0), Err(SemanticError::DivisionByZero)));
    }

    #[test]
    fn double_and_string_folding() {
        let product = Operator::Mul.eval(&Type::Double, &Value::Double(2.0), &Value::Double(3.0));
        assert!(matches!(product, Ok(Value::Double(x)) if x == 6.0));

        let left = Value::String("ab".into());
        let right = Value::String("cd".into());

        match Operator::Add.eval(&Type::String, &left, &right) {
            Ok(Value::String(string)) => assert_eq!(string, "abcd"),
            other => panic!("unexpected result: {:?}", other),
        }

        let less = Operator::Less.eval(&Type::String, &left, &right);
        assert!(matches!(less, Ok(Value::Integer(-1))));
    }

    #[test]
    fn precedence_levels() {
        assert_eq!(Operator::relational(&Token::LessOrEqual), Some(Operator::LessOrEqual));
        assert_eq!(Operator::additive(&Token::Keyword(Keyword::Xor)), Some(Operator::Xor));
        assert_eq!(Operator::multiplicative(&Token::Keyword(Keyword::And)), Some(Operator::And));
        assert_eq!(Operator::additive(&Token::Times), None);
    }
}
