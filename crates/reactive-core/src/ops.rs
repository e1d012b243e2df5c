//! Binary and unary operator registries.
//!
//! Operators are unit structs behind small traits. The registry slices are
//! ordered: the parser tries symbols in registry order, so `>=` and `<=`
//! must come before `>` and `<`.

use std::fmt;

use crate::error::{CompileError, CompileResult};
use crate::value::Value;

/// A binary (or n-ary) operator over host values and JS fragments.
///
/// Value-level errors leave the `expr` field empty; the expression layer
/// fills it in via [`CompileError::with_expr_text`].
pub trait BinaryOperator: fmt::Debug + Sync {
    /// Check the argument count produced by the parser split.
    fn validate_arity(&self, symbol: &str, count: usize) -> CompileResult<()>;

    /// Apply the operator to evaluated values.
    fn eval_values(&self, values: &[Value]) -> CompileResult<Value>;

    /// Emit the JS expression over already-rendered argument fragments.
    fn eval_js(&self, parts: &[String]) -> String;
}

/// A unary prefix operator.
pub trait UnaryOperator: fmt::Debug + Sync {
    fn eval_value(&self, value: &Value) -> CompileResult<Value>;
    fn eval_js(&self, part: &str) -> String;
}

fn exactly_two(symbol: &str, count: usize) -> CompileResult<()> {
    if count == 2 {
        Ok(())
    } else {
        Err(CompileError::syntax(format!(
            "operator `{symbol}` takes exactly two operands, got {count}"
        )))
    }
}

fn expect_bool(value: &Value, symbol: &str) -> CompileResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(CompileError::type_mismatch(
            "",
            other.repr(),
            format!("operator `{symbol}` expects boolean operands"),
        )),
    }
}

fn expect_int(value: &Value, symbol: &str) -> CompileResult<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(CompileError::type_mismatch(
            "",
            other.repr(),
            format!("operator `{symbol}` expects integer operands"),
        )),
    }
}

/// Strict equality: primitives compare by value, composites are never
/// equal (identity comparison is meaningless after compilation).
fn strict_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        _ => false,
    }
}

#[derive(Debug)]
pub struct StrictEq;

impl BinaryOperator for StrictEq {
    fn validate_arity(&self, symbol: &str, count: usize) -> CompileResult<()> {
        exactly_two(symbol, count)
    }

    fn eval_values(&self, values: &[Value]) -> CompileResult<Value> {
        Ok(Value::Bool(strict_equal(&values[0], &values[1])))
    }

    fn eval_js(&self, parts: &[String]) -> String {
        format!("({}==={})", parts[0], parts[1])
    }
}

#[derive(Debug)]
pub struct StrictNe;

impl BinaryOperator for StrictNe {
    fn validate_arity(&self, symbol: &str, count: usize) -> CompileResult<()> {
        exactly_two(symbol, count)
    }

    fn eval_values(&self, values: &[Value]) -> CompileResult<Value> {
        Ok(Value::Bool(!strict_equal(&values[0], &values[1])))
    }

    fn eval_js(&self, parts: &[String]) -> String {
        format!("({}!=={})", parts[0], parts[1])
    }
}

#[derive(Debug)]
pub struct And;

impl BinaryOperator for And {
    fn validate_arity(&self, _symbol: &str, _count: usize) -> CompileResult<()> {
        Ok(())
    }

    fn eval_values(&self, values: &[Value]) -> CompileResult<Value> {
        let mut result = true;
        for value in values {
            result = result && expect_bool(value, "&&")?;
        }
        Ok(Value::Bool(result))
    }

    fn eval_js(&self, parts: &[String]) -> String {
        parts.join("&&")
    }
}

#[derive(Debug)]
pub struct Or;

impl BinaryOperator for Or {
    fn validate_arity(&self, _symbol: &str, _count: usize) -> CompileResult<()> {
        Ok(())
    }

    fn eval_values(&self, values: &[Value]) -> CompileResult<Value> {
        let mut result = false;
        for value in values {
            result = result || expect_bool(value, "||")?;
        }
        Ok(Value::Bool(result))
    }

    fn eval_js(&self, parts: &[String]) -> String {
        parts.join("||")
    }
}

macro_rules! relational {
    ($name:ident, $symbol:literal, $op:tt) => {
        #[derive(Debug)]
        pub struct $name;

        impl BinaryOperator for $name {
            fn validate_arity(&self, symbol: &str, count: usize) -> CompileResult<()> {
                exactly_two(symbol, count)
            }

            fn eval_values(&self, values: &[Value]) -> CompileResult<Value> {
                let left = expect_int(&values[0], $symbol)?;
                let right = expect_int(&values[1], $symbol)?;
                Ok(Value::Bool(left $op right))
            }

            fn eval_js(&self, parts: &[String]) -> String {
                format!(concat!("{}", $symbol, "{}"), parts[0], parts[1])
            }
        }
    };
}

relational!(Ge, ">=", >=);
relational!(Le, "<=", <=);
relational!(Gt, ">", >);
relational!(Lt, "<", <);

/// `+`: string concatenation when any operand is a string, otherwise
/// numeric addition, otherwise array concatenation.
pub fn sum_values(values: &[Value]) -> CompileResult<Value> {
    if values.iter().any(|v| matches!(v, Value::Str(_))) {
        let mut out = String::new();
        for value in values {
            out.push_str(&value.to_string());
        }
        return Ok(Value::Str(out));
    }
    if values.iter().all(|v| matches!(v, Value::Int(_))) {
        let mut sum = 0i64;
        for value in values {
            if let Value::Int(n) = value {
                sum += n;
            }
        }
        return Ok(Value::Int(sum));
    }
    if values
        .iter()
        .all(|v| matches!(v, Value::Int(_) | Value::Float(_)))
    {
        let mut sum = 0f64;
        for value in values {
            match value {
                Value::Int(n) => sum += *n as f64,
                Value::Float(f) => sum += f,
                _ => {}
            }
        }
        return Ok(Value::Float(sum));
    }
    if values.iter().all(|v| matches!(v, Value::Array(_))) {
        let mut out = Vec::new();
        for value in values {
            if let Value::Array(items) = value {
                out.extend(items.iter().cloned());
            }
        }
        return Ok(Value::Array(out));
    }
    let first_bad = values
        .iter()
        .find(|v| !matches!(v, Value::Int(_) | Value::Float(_) | Value::Array(_)))
        .map(|v| v.repr())
        .unwrap_or_default();
    Err(CompileError::type_mismatch(
        "",
        first_bad,
        "operator `+` expects strings, numbers or arrays",
    ))
}

#[derive(Debug)]
pub struct Sum;

impl BinaryOperator for Sum {
    fn validate_arity(&self, _symbol: &str, _count: usize) -> CompileResult<()> {
        Ok(())
    }

    fn eval_values(&self, values: &[Value]) -> CompileResult<Value> {
        sum_values(values)
    }

    fn eval_js(&self, parts: &[String]) -> String {
        parts.join("+")
    }
}

#[derive(Debug)]
pub struct Not;

impl UnaryOperator for Not {
    fn eval_value(&self, value: &Value) -> CompileResult<Value> {
        Ok(Value::Bool(!expect_bool(value, "!")?))
    }

    fn eval_js(&self, part: &str) -> String {
        format!("!{part}")
    }
}

/// Binary operators in parser precedence order.
pub static BINARY_OPERATORS: &[(&str, &dyn BinaryOperator)] = &[
    ("===", &StrictEq),
    ("!==", &StrictNe),
    ("&&", &And),
    ("||", &Or),
    (">=", &Ge),
    ("<=", &Le),
    (">", &Gt),
    ("<", &Lt),
    ("+", &Sum),
];

/// Unary prefix operators.
pub static UNARY_OPERATORS: &[(&str, &dyn UnaryOperator)] = &[("!", &Not)];

pub fn binary_operator(symbol: &str) -> Option<&'static dyn BinaryOperator> {
    BINARY_OPERATORS
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, op)| *op)
}

pub fn unary_operator(symbol: &str) -> Option<&'static dyn UnaryOperator> {
    UNARY_OPERATORS
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, op)| *op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_registry_order() {
        let symbols: Vec<&str> = BINARY_OPERATORS.iter().map(|(s, _)| *s).collect();
        let ge = symbols.iter().position(|s| *s == ">=").unwrap();
        let gt = symbols.iter().position(|s| *s == ">").unwrap();
        assert!(ge < gt, ">= must be tried before >");
        let le = symbols.iter().position(|s| *s == "<=").unwrap();
        let lt = symbols.iter().position(|s| *s == "<").unwrap();
        assert!(le < lt, "<= must be tried before <");
    }

    #[test]
    fn test_strict_equality() {
        let op = binary_operator("===").unwrap();
        assert_eq!(
            op.eval_values(&[Value::Int(3), Value::Int(3)]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            op.eval_values(&[Value::Int(3), Value::Str("3".into())])
                .unwrap(),
            Value::Bool(false)
        );
        // Composites never compare equal.
        assert_eq!(
            op.eval_values(&[Value::Array(vec![]), Value::Array(vec![])])
                .unwrap(),
            Value::Bool(false)
        );
        assert_eq!(op.eval_js(&["a".into(), "b".into()]), "(a===b)");
    }

    #[test]
    fn test_boolean_operators_reject_non_bools() {
        let op = binary_operator("&&").unwrap();
        let err = op
            .eval_values(&[Value::Bool(true), Value::Int(1)])
            .unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
        assert_eq!(
            op.eval_values(&[Value::Bool(true), Value::Bool(false)])
                .unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_relational() {
        let op = binary_operator(">=").unwrap();
        assert_eq!(
            op.eval_values(&[Value::Int(2), Value::Int(2)]).unwrap(),
            Value::Bool(true)
        );
        assert!(op
            .eval_values(&[Value::Str("a".into()), Value::Int(2)])
            .is_err());
        assert_eq!(op.eval_js(&["x".into(), "y".into()]), "x>=y");
    }

    #[test]
    fn test_sum_coercion() {
        assert_eq!(
            sum_values(&[Value::Int(1), Value::Str("a".into())]).unwrap(),
            Value::Str("1a".into())
        );
        assert_eq!(
            sum_values(&[Value::Int(1), Value::Int(2)]).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            sum_values(&[Value::Int(1), Value::Float(0.5)]).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            sum_values(&[
                Value::Array(vec![Value::Int(1)]),
                Value::Array(vec![Value::Int(2)])
            ])
            .unwrap(),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
        assert!(sum_values(&[Value::Bool(true), Value::Int(1)]).is_err());
    }

    #[test]
    fn test_not() {
        let op = unary_operator("!").unwrap();
        assert_eq!(op.eval_value(&Value::Bool(false)).unwrap(), Value::Bool(true));
        assert!(op.eval_value(&Value::Int(0)).is_err());
        assert_eq!(op.eval_js("(x.val)"), "!(x.val)");
    }
}
