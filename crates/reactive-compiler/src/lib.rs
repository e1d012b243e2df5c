//! Reactive template compilation.
//!
//! Takes a parsed template tree plus host bindings and produces the
//! page's initial HTML together with a self-contained update script. The
//! script re-renders exactly the regions whose reactive cells changed;
//! no virtual DOM and no client-side template parsing.
//!
//! ```
//! use reactive_compiler::{compile_template, Bindings, TemplateNode};
//!
//! let template: Vec<TemplateNode> = serde_json::from_str(
//!     r#"[{"kind": "element", "tag": "span",
//!          "children": [{"kind": "print", "value": "count + 1"}]}]"#,
//! )
//! .unwrap();
//! let compiled = compile_template(&template, &Bindings::default()).unwrap();
//! assert!(compiled.html.starts_with("<span"));
//! ```

mod compile;
mod conditional;
mod element;
mod looping;
mod nodes;
mod runtime;

pub use compile::{compile_template, CompiledTemplate};
pub use nodes::{AttributeNode, ClauseNode, TemplateNode};
pub use runtime::RUNTIME_JS;

pub use reactive_core::{Bindings, CompileError, CompileResult, Value};
