//! Template function registry.
//!
//! Functions are looked up by name at parse time. The built-in set is
//! `present`, `len` and `matchKeyVal`; the compiler registers one extra
//! internal function for print cells.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::fmt;

use crate::error::{CompileError, CompileResult};
use crate::value::Value;

/// A callable usable inside template expressions.
pub trait ReactiveFunction: fmt::Debug + Sync {
    /// Registry name, also used in error messages.
    fn name(&self) -> &str;

    /// Check the parsed argument count.
    fn validate_arity(&self, count: usize) -> CompileResult<()>;

    /// Apply the function to evaluated argument values.
    fn eval_initial(&self, args: &[Value]) -> CompileResult<Value>;

    /// Emit the JS expression over rendered argument fragments.
    fn eval_js(&self, arg_js: &[String]) -> String;

    /// Whether a call contributes its arguments' cells to the dependency
    /// set. `present` reads a value without subscribing to it.
    fn tracks_dependencies(&self) -> bool {
        true
    }

    /// Whether argument fragments should be rendered in HTML-output form
    /// rather than plain value form.
    fn wants_html_args(&self) -> bool {
        false
    }
}

fn exactly(name: &str, expected: usize, count: usize) -> CompileResult<()> {
    if count == expected {
        Ok(())
    } else {
        Err(CompileError::syntax(format!(
            "function `{name}` takes exactly {expected} argument{}, got {count}",
            if expected == 1 { "" } else { "s" }
        )))
    }
}

/// `present(x)`: the value of `x`, without subscribing to changes of `x`.
#[derive(Debug)]
struct Present;

impl ReactiveFunction for Present {
    fn name(&self) -> &str {
        "present"
    }

    fn validate_arity(&self, count: usize) -> CompileResult<()> {
        exactly("present", 1, count)
    }

    fn eval_initial(&self, args: &[Value]) -> CompileResult<Value> {
        Ok(args[0].clone())
    }

    fn eval_js(&self, arg_js: &[String]) -> String {
        arg_js[0].clone()
    }

    fn tracks_dependencies(&self) -> bool {
        false
    }
}

/// `len(x)`: length of a string, array or object.
#[derive(Debug)]
struct Len;

impl ReactiveFunction for Len {
    fn name(&self) -> &str {
        "len"
    }

    fn validate_arity(&self, count: usize) -> CompileResult<()> {
        exactly("len", 1, count)
    }

    fn eval_initial(&self, args: &[Value]) -> CompileResult<Value> {
        let len = match &args[0] {
            Value::Str(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            Value::Dict(entries) => entries.len(),
            other => {
                return Err(CompileError::type_mismatch(
                    "",
                    other.repr(),
                    "function `len` expects a string, array or object",
                ))
            }
        };
        Ok(Value::Int(len as i64))
    }

    fn eval_js(&self, arg_js: &[String]) -> String {
        format!("({}).length", arg_js[0])
    }
}

/// `matchKeyVal(key, array)`: in an array of `{key, value}` records, the
/// `value` of the record whose `key` equals the first argument.
#[derive(Debug)]
struct MatchKeyVal;

impl ReactiveFunction for MatchKeyVal {
    fn name(&self) -> &str {
        "matchKeyVal"
    }

    fn validate_arity(&self, count: usize) -> CompileResult<()> {
        exactly("matchKeyVal", 2, count)
    }

    fn eval_initial(&self, args: &[Value]) -> CompileResult<Value> {
        let key = &args[0];
        let Value::Array(items) = &args[1] else {
            return Err(CompileError::type_mismatch(
                "",
                args[1].repr(),
                "second argument of `matchKeyVal` must be an array",
            ));
        };
        for item in items {
            let Value::Dict(entries) = item else {
                continue;
            };
            let matches = match (entries.get("key"), key) {
                (Some(Value::Str(a)), Value::Str(b)) => a == b,
                (Some(Value::Int(a)), Value::Int(b)) => a == b,
                (Some(Value::Bool(a)), Value::Bool(b)) => a == b,
                _ => false,
            };
            if matches {
                return entries.get("value").cloned().ok_or_else(|| {
                    CompileError::resolution("", "value", item.repr())
                });
            }
        }
        Err(CompileError::resolution("", key.repr(), args[1].repr()))
    }

    fn eval_js(&self, arg_js: &[String]) -> String {
        format!("__reactive_match({}, {})", arg_js[0], arg_js[1])
    }
}

static FUNCTIONS: Lazy<FxHashMap<&'static str, &'static dyn ReactiveFunction>> =
    Lazy::new(|| {
        let mut map: FxHashMap<&'static str, &'static dyn ReactiveFunction> =
            FxHashMap::default();
        map.insert("present", &Present);
        map.insert("len", &Len);
        map.insert("matchKeyVal", &MatchKeyVal);
        map
    });

/// Look up a registered function by name.
pub fn lookup_function(name: &str) -> Option<&'static dyn ReactiveFunction> {
    FUNCTIONS.get(name).copied()
}
