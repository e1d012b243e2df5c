//! Core of the reactive template compiler: the expression language, the
//! host value model, and the scope/cell tree with its client-side data
//! protocol.
//!
//! The compiler crate layers template constructs on top of this; nothing
//! here knows about HTML.

pub mod error;
pub mod expr;
pub mod functions;
pub mod ops;
pub mod parse;
pub mod scope;
pub mod value;

pub use error::{CompileError, CompileResult};
pub use expr::{value_to_expr, Expr};
pub use functions::{lookup_function, ReactiveFunction};
pub use ops::{binary_operator, unary_operator, BinaryOperator, UnaryOperator};
pub use parse::{parse_expression, smart_split};
pub use scope::{CellId, DepSet, ReactiveCell, ScopeId, ScopeRef, ScopeTree};
pub use value::{Bindings, Value};
