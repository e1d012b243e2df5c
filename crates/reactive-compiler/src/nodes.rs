//! The parsed template tree handed to the compiler.
//!
//! Nodes carry their expressions as source strings; the compiler parses
//! and reduces them against the host bindings during the build phase.
//! The JSON mapping is kind-tagged:
//!
//! ```json
//! {"kind": "element", "tag": "span", "children": [
//!     {"kind": "print", "value": "counter + 1"}
//! ]}
//! ```

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// One node of the template tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateNode {
    /// Literal output, spliced as-is.
    Text { text: String },
    /// A transparent grouping scope.
    Block {
        #[serde(default)]
        children: Vec<TemplateNode>,
    },
    /// Defines a reactive variable in the enclosing scope.
    Def { name: SmolStr, value: String },
    /// An HTML element with optionally reactive attributes.
    Element {
        tag: SmolStr,
        #[serde(default)]
        self_enclosed: bool,
        #[serde(default)]
        attributes: Vec<AttributeNode>,
        #[serde(default)]
        children: Vec<TemplateNode>,
    },
    /// Raw client script content; contributes nothing to the HTML and
    /// runs after the surrounding content is in place.
    Script {
        #[serde(default)]
        children: Vec<TemplateNode>,
    },
    /// A clause chain; the last clause may be an unconditional else.
    If { clauses: Vec<ClauseNode> },
    /// Iteration over an array expression, optionally keyed.
    For {
        var: SmolStr,
        iterable: String,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        children: Vec<TemplateNode>,
    },
    /// HTML-escaped reactive output of an expression.
    Print { value: String },
    /// Splices the JS expression reading a value (script bodies).
    Get { value: String },
    /// Emits the JS statement assigning a value (script bodies). The new
    /// value comes from `value`, or from the rendered body when absent.
    Set {
        target: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        children: Vec<TemplateNode>,
    },
    /// Emits the JS statement notifying a variable's subscribers.
    Notify { target: String },
    /// Wraps a script body in a procedure re-run whenever a value it
    /// reads changes.
    Redo {
        #[serde(default)]
        children: Vec<TemplateNode>,
    },
}

/// An attribute of an [`TemplateNode::Element`]. A `None` value renders
/// the HTML flag form ` name="name"`; a condition gates the whole
/// attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeNode {
    pub name: SmolStr,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// One clause of an [`TemplateNode::If`]. `condition: None` is the else
/// clause and is only valid in the last position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseNode {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub children: Vec<TemplateNode>,
}
