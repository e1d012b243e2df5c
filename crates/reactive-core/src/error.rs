//! Compilation error taxonomy.

use thiserror::Error;

/// Result alias used throughout the compiler.
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised while compiling a template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    /// The expression source text could not be parsed.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A construct was used in a place its scope rules forbid.
    #[error("scope error: {0}")]
    Scope(String),

    /// An operator or function received a value of the wrong type.
    #[error("type mismatch in `{expr}`: {message} (got {value})")]
    TypeMismatch {
        expr: String,
        value: String,
        message: String,
    },

    /// A property path or key lookup failed against the evaluated value.
    #[error("cannot resolve `{key}` in `{expr}`: current value is {value}")]
    Resolution {
        expr: String,
        key: String,
        value: String,
    },
}

impl CompileError {
    pub fn syntax(message: impl Into<String>) -> Self {
        CompileError::Syntax(message.into())
    }

    pub fn scope(message: impl Into<String>) -> Self {
        CompileError::Scope(message.into())
    }

    pub fn type_mismatch(
        expr: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CompileError::TypeMismatch {
            expr: expr.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    pub fn resolution(
        expr: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        CompileError::Resolution {
            expr: expr.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    /// Fill in the offending expression text when the error was produced
    /// below the level that knows it (operators and functions see values
    /// only).
    pub fn with_expr_text(mut self, text: &str) -> Self {
        match &mut self {
            CompileError::TypeMismatch { expr, .. } | CompileError::Resolution { expr, .. } => {
                if expr.is_empty() {
                    *expr = text.to_string();
                }
            }
            _ => {}
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = CompileError::syntax("cannot parse expression: `a ??`");
        assert_eq!(
            err.to_string(),
            "syntax error: cannot parse expression: `a ??`"
        );

        let err = CompileError::type_mismatch("a >= b", "'x'", "expected an integer");
        assert_eq!(
            err.to_string(),
            "type mismatch in `a >= b`: expected an integer (got 'x')"
        );
    }

    #[test]
    fn test_with_expr_text_fills_only_empty() {
        let err = CompileError::type_mismatch("", "1", "expected a boolean");
        let err = err.with_expr_text("!count");
        assert!(matches!(
            &err,
            CompileError::TypeMismatch { expr, .. } if expr == "!count"
        ));

        let err = CompileError::type_mismatch("already", "1", "expected a boolean");
        let err = err.with_expr_text("!count");
        assert!(matches!(
            &err,
            CompileError::TypeMismatch { expr, .. } if expr == "already"
        ));
    }
}
