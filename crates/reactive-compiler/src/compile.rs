//! The three-walk compilation pipeline.
//!
//! A template is compiled by walking its reduced tree three times over a
//! shared scope tree:
//!
//! 1. the HTML walk renders the initial markup and registers every
//!    reactive cell with its initial value,
//! 2. after collecting `var` declarations and clearing the tree, the
//!    script walk emits the update script,
//! 3. inside re-renderable regions the JS walk (invoked by enclosing
//!    constructs) emits the expression rebuilding that region's HTML.
//!
//! Cell names only depend on scope labels, so a name emitted in one walk
//! refers to the same client-side variable in every other walk.

use indexmap::IndexMap;
use reactive_core::{
    parse_expression, CellId, CompileError, CompileResult, Expr, ReactiveFunction, ScopeId,
    ScopeTree, Value,
};
use reactive_core::{Bindings, DepSet};
use script_builder::{escape_html, js_string, Quote, ResourceScript};
use serde::Serialize;
use smol_str::SmolStr;

use crate::nodes::{AttributeNode, ClauseNode, TemplateNode};
use crate::runtime::RUNTIME_JS;

/// A reactive attribute: optional gating condition, optional value. A
/// missing value renders the flag form ` name="name"`.
#[derive(Debug, Clone)]
pub(crate) struct AttrData {
    pub condition: Option<Expr>,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone)]
pub(crate) struct ElementData {
    pub tag: SmolStr,
    pub self_enclosed: bool,
    pub attributes: IndexMap<SmolStr, AttrData>,
}

#[derive(Debug, Clone)]
pub(crate) struct ForData {
    pub var_name: SmolStr,
    pub iter: Expr,
    pub key: Option<Expr>,
}

/// A template construct bound to one scope, with its expressions parsed
/// and reduced against the host bindings.
#[derive(Debug, Clone)]
pub(crate) enum Construct {
    Block,
    Def { name: SmolStr, value: Expr },
    Element(ElementData),
    Script,
    If { clauses: Vec<ScopeId> },
    Clause { condition: Expr },
    For(ForData),
    Print { value: Expr },
    Get { value: Expr },
    Set { target: Expr, value: Option<Expr> },
    Notify { target: Expr },
    Redo,
}

impl Construct {
    fn name(&self) -> &'static str {
        match self {
            Construct::Block => "block",
            Construct::Def { .. } => "def",
            Construct::Element(_) => "element",
            Construct::Script => "script",
            Construct::If { .. } => "if",
            Construct::Clause { .. } => "clause",
            Construct::For(_) => "for",
            Construct::Print { .. } => "print",
            Construct::Get { .. } => "get",
            Construct::Set { .. } => "set",
            Construct::Notify { .. } => "notify",
            Construct::Redo => "redo",
        }
    }
}

/// The reduced template tree: literal text plus construct scopes. Leaf
/// constructs carry `None` children; an empty body is `Some(vec![])`.
#[derive(Debug, Clone)]
pub(crate) enum Reduced {
    Text(String),
    Scope(ScopeId, Option<Vec<Reduced>>),
}

/// The internal function backing print cells: stringify at compile time,
/// pass the HTML-rendered argument through at runtime.
#[derive(Debug)]
struct PrintHtml;

impl ReactiveFunction for PrintHtml {
    fn name(&self) -> &str {
        "render_html"
    }

    fn validate_arity(&self, count: usize) -> CompileResult<()> {
        if count == 1 {
            Ok(())
        } else {
            Err(CompileError::syntax(format!(
                "function `render_html` takes exactly 1 argument, got {count}"
            )))
        }
    }

    fn eval_initial(&self, args: &[Value]) -> CompileResult<Value> {
        Ok(Value::Str(args[0].to_string()))
    }

    fn eval_js(&self, arg_js: &[String]) -> String {
        arg_js[0].clone()
    }

    fn wants_html_args(&self) -> bool {
        true
    }
}

static PRINT_HTML: PrintHtml = PrintHtml;

pub(crate) struct Compiler {
    pub tree: ScopeTree,
    pub constructs: Vec<Construct>,
}

fn parse_reduced(source: &str, bindings: &Bindings) -> CompileResult<Expr> {
    Ok(parse_expression(source)?.reduce(bindings))
}

fn whitespace_text(node: &Reduced) -> bool {
    matches!(node, Reduced::Text(text) if text.trim().is_empty())
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            tree: ScopeTree::new(),
            constructs: Vec::new(),
        }
    }

    pub fn new_scope(
        &mut self,
        kind: &str,
        parent: Option<ScopeId>,
        construct: Construct,
    ) -> ScopeId {
        let id = self.tree.new_scope(kind, parent);
        debug_assert_eq!(id.index(), self.constructs.len());
        self.constructs.push(construct);
        id
    }

    pub(crate) fn construct(&self, scope: ScopeId) -> &Construct {
        &self.constructs[scope.index()]
    }

    // Build phase: parse and reduce expressions, allocate scopes.

    pub fn build_nodes(
        &mut self,
        parent: ScopeId,
        nodes: &[TemplateNode],
        bindings: &Bindings,
    ) -> CompileResult<Vec<Reduced>> {
        nodes
            .iter()
            .map(|node| self.build_node(parent, node, bindings))
            .collect()
    }

    fn build_node(
        &mut self,
        parent: ScopeId,
        node: &TemplateNode,
        bindings: &Bindings,
    ) -> CompileResult<Reduced> {
        match node {
            TemplateNode::Text { text } => Ok(Reduced::Text(text.clone())),
            TemplateNode::Block { children } => {
                let scope = self.new_scope("block", Some(parent), Construct::Block);
                let kids = self.build_nodes(scope, children, bindings)?;
                Ok(Reduced::Scope(scope, Some(kids)))
            }
            TemplateNode::Def { name, value } => {
                let value = parse_reduced(value, bindings)?;
                let scope = self.new_scope(
                    "def",
                    Some(parent),
                    Construct::Def {
                        name: name.clone(),
                        value,
                    },
                );
                Ok(Reduced::Scope(scope, None))
            }
            TemplateNode::Element {
                tag,
                self_enclosed,
                attributes,
                children,
            } => {
                if *self_enclosed && !children.is_empty() {
                    return Err(CompileError::syntax(format!(
                        "self-enclosed element `{tag}` cannot have children"
                    )));
                }
                let attributes = self.build_attributes(attributes, bindings)?;
                let scope = self.new_scope(
                    "element",
                    Some(parent),
                    Construct::Element(ElementData {
                        tag: tag.clone(),
                        self_enclosed: *self_enclosed,
                        attributes,
                    }),
                );
                let kids = if *self_enclosed {
                    None
                } else {
                    Some(self.build_nodes(scope, children, bindings)?)
                };
                Ok(Reduced::Scope(scope, kids))
            }
            TemplateNode::Script { children } => {
                let scope = self.new_scope("script", Some(parent), Construct::Script);
                let kids = self.build_nodes(scope, children, bindings)?;
                Ok(Reduced::Scope(scope, Some(kids)))
            }
            TemplateNode::If { clauses } => self.build_if(parent, clauses, bindings),
            TemplateNode::For {
                var,
                iterable,
                key,
                children,
            } => {
                let iter = parse_reduced(iterable, bindings)?;
                let key = key
                    .as_deref()
                    .map(|source| parse_reduced(source, bindings))
                    .transpose()?;
                let keyed = key.is_some();
                let scope = self.new_scope(
                    "for",
                    Some(parent),
                    Construct::For(ForData {
                        var_name: var.clone(),
                        iter,
                        key,
                    }),
                );
                let mut kids = self.build_nodes(scope, children, bindings)?;
                if keyed {
                    kids.retain(|kid| !whitespace_text(kid));
                    let only_element = kids.len() == 1
                        && matches!(
                            &kids[0],
                            Reduced::Scope(child, _)
                                if matches!(self.construct(*child), Construct::Element(_))
                        );
                    if !only_element {
                        return Err(CompileError::syntax(
                            "a keyed loop must have exactly one element child",
                        ));
                    }
                }
                Ok(Reduced::Scope(scope, Some(kids)))
            }
            TemplateNode::Print { value } => {
                let value = parse_reduced(value, bindings)?;
                let scope = self.new_scope("print", Some(parent), Construct::Print { value });
                Ok(Reduced::Scope(scope, None))
            }
            TemplateNode::Get { value } => {
                let value = parse_reduced(value, bindings)?;
                let scope = self.new_scope("get", Some(parent), Construct::Get { value });
                Ok(Reduced::Scope(scope, None))
            }
            TemplateNode::Set {
                target,
                value,
                children,
            } => {
                let target = parse_reduced(target, bindings)?;
                if !target.is_settable() {
                    return Err(CompileError::syntax(format!(
                        "expression `{target}` is not settable"
                    )));
                }
                let value = value
                    .as_deref()
                    .map(|source| parse_reduced(source, bindings))
                    .transpose()?;
                if value.is_some() && !children.is_empty() {
                    return Err(CompileError::syntax(
                        "a set statement takes either a value or a body, not both",
                    ));
                }
                let has_body = value.is_none();
                let scope = self.new_scope("set", Some(parent), Construct::Set { target, value });
                let kids = if has_body {
                    Some(self.build_nodes(scope, children, bindings)?)
                } else {
                    None
                };
                Ok(Reduced::Scope(scope, kids))
            }
            TemplateNode::Notify { target } => {
                let target = parse_reduced(target, bindings)?;
                if !target.is_settable() {
                    return Err(CompileError::syntax(format!(
                        "expression `{target}` is not notifiable"
                    )));
                }
                let scope = self.new_scope("notify", Some(parent), Construct::Notify { target });
                Ok(Reduced::Scope(scope, None))
            }
            TemplateNode::Redo { children } => {
                let scope = self.new_scope("script", Some(parent), Construct::Redo);
                let kids = self.build_nodes(scope, children, bindings)?;
                Ok(Reduced::Scope(scope, Some(kids)))
            }
        }
    }

    fn build_attributes(
        &self,
        attributes: &[AttributeNode],
        bindings: &Bindings,
    ) -> CompileResult<IndexMap<SmolStr, AttrData>> {
        let mut out = IndexMap::new();
        for attr in attributes {
            if attr.name == "id" {
                if attr.condition.is_some() {
                    return Err(CompileError::syntax("`id` attribute cannot be conditional"));
                }
                if attr.value.is_none() {
                    return Err(CompileError::syntax("`id` attribute must carry a value"));
                }
            }
            let condition = attr
                .condition
                .as_deref()
                .map(|source| parse_reduced(source, bindings))
                .transpose()?;
            let value = attr
                .value
                .as_deref()
                .map(|source| parse_reduced(source, bindings))
                .transpose()?;
            if out
                .insert(attr.name.clone(), AttrData { condition, value })
                .is_some()
            {
                return Err(CompileError::syntax(format!(
                    "attribute `{}` appears twice",
                    attr.name
                )));
            }
        }
        Ok(out)
    }

    fn build_if(
        &mut self,
        parent: ScopeId,
        clauses: &[ClauseNode],
        bindings: &Bindings,
    ) -> CompileResult<Reduced> {
        if clauses.is_empty() {
            return Err(CompileError::syntax("a conditional needs at least one clause"));
        }
        let scope = self.new_scope("if", Some(parent), Construct::If { clauses: vec![] });
        let mut clause_scopes = Vec::with_capacity(clauses.len());
        let mut kids = Vec::with_capacity(clauses.len());
        for (i, clause) in clauses.iter().enumerate() {
            let condition = match &clause.condition {
                Some(source) => parse_reduced(source, bindings)?,
                None if i + 1 == clauses.len() => Expr::Bool(true),
                None => {
                    return Err(CompileError::syntax(
                        "only the last clause of a conditional may omit its condition",
                    ))
                }
            };
            let clause_scope =
                self.new_scope("clause", Some(scope), Construct::Clause { condition });
            let clause_kids = self.build_nodes(clause_scope, &clause.children, bindings)?;
            clause_scopes.push(clause_scope);
            kids.push(Reduced::Scope(clause_scope, Some(clause_kids)));
        }
        self.constructs[scope.index()] = Construct::If {
            clauses: clause_scopes,
        };
        Ok(Reduced::Scope(scope, Some(kids)))
    }

    // Declaration collection.

    /// Cells this scope exposes to the enclosing declaration list. Loops
    /// keep their iteration cells local and expose only the control cell.
    pub(crate) fn declared_cells(&self, scope: ScopeId) -> Vec<CellId> {
        if let Construct::For(_) = self.construct(scope) {
            let control_name = format!("__react_control_{}", self.tree.scope_label(scope));
            return match self.tree.resolve(scope, &control_name) {
                Some(cell) => vec![cell],
                None => Vec::new(),
            };
        }
        self.declared_cells_inside(scope)
    }

    /// This scope's own cells plus its children's declared cells.
    pub(crate) fn declared_cells_inside(&self, scope: ScopeId) -> Vec<CellId> {
        let mut out: Vec<CellId> = self.tree.scope(scope).vars.values().copied().collect();
        for child in &self.tree.scope(scope).children {
            out.extend(self.declared_cells(*child));
        }
        out
    }

    /// The scope's contribution to auto-generated element ids. Loop
    /// scopes splice the per-iteration id so repeated elements stay
    /// distinct.
    pub(crate) fn id_prefix_expr(&self, scope: ScopeId) -> Expr {
        let label = self.tree.scope_label(scope);
        match self.construct(scope) {
            Construct::For(_) => Expr::sum(vec![
                Expr::Str(format!("{label}_iter_")),
                Expr::Var("__react_iter_id".into()),
            ]),
            _ => Expr::Str(label.to_string()),
        }
    }

    // Walk composition over reduced children.

    pub(crate) fn render_html_inside(&mut self, children: &[Reduced]) -> CompileResult<String> {
        let mut out = String::new();
        for child in children {
            match child {
                Reduced::Text(text) => out.push_str(text),
                Reduced::Scope(scope, kids) => {
                    out.push_str(&self.render_html(*scope, kids.as_deref())?);
                }
            }
        }
        Ok(out)
    }

    /// Join the children's JS fragments with `+`. Constructs that render
    /// nothing contribute no fragment but still contribute their cells.
    pub(crate) fn render_js_inside(
        &mut self,
        children: &[Reduced],
    ) -> CompileResult<(String, DepSet)> {
        let mut parts = Vec::new();
        let mut deps = DepSet::default();
        for child in children {
            match child {
                Reduced::Text(text) => parts.push(js_string(text, Quote::Single)),
                Reduced::Scope(scope, kids) => {
                    let (js, child_deps) = self.render_js(*scope, kids.as_deref())?;
                    deps.extend(child_deps);
                    if !js.is_empty() {
                        parts.push(js);
                    }
                }
            }
        }
        Ok((parts.join("+"), deps))
    }

    pub(crate) fn render_script_inside(
        &mut self,
        children: Option<&[Reduced]>,
    ) -> CompileResult<ResourceScript> {
        let Some(children) = children else {
            return Ok(ResourceScript::new());
        };
        let mut scripts = Vec::new();
        for child in children {
            if let Reduced::Scope(scope, kids) = child {
                scripts.push(self.render_script(*scope, kids.as_deref())?);
            }
        }
        Ok(ResourceScript::compose(&scripts))
    }

    // Per-construct dispatch.

    pub(crate) fn render_html(
        &mut self,
        scope: ScopeId,
        children: Option<&[Reduced]>,
    ) -> CompileResult<String> {
        match self.construct(scope).clone() {
            Construct::Block | Construct::Clause { .. } => {
                self.render_html_inside(children.unwrap_or(&[]))
            }
            Construct::Def { name, value } => {
                self.define_in_parent(scope, &name, value)?;
                Ok(String::new())
            }
            Construct::Element(data) => self.element_html(scope, &data, children),
            Construct::Script => Ok(String::new()),
            Construct::If { clauses } => self.if_html(scope, &clauses, children.unwrap_or(&[])),
            Construct::For(data) => self.for_html(scope, &data, children.unwrap_or(&[])),
            Construct::Print { value } => self.print_html(scope, &value),
            Construct::Get { value } => {
                let (js, _) = value.eval_script(Some(self.tree.at(scope)), Quote::Single)?;
                Ok(js)
            }
            Construct::Set { target, value } => {
                self.set_html(scope, &target, value.as_ref(), children)
            }
            Construct::Notify { target } => target.js_notify(Some(self.tree.at(scope))),
            Construct::Redo => self.redo_html(scope, children.unwrap_or(&[])),
        }
    }

    pub(crate) fn render_js(
        &mut self,
        scope: ScopeId,
        children: Option<&[Reduced]>,
    ) -> CompileResult<(String, DepSet)> {
        match self.construct(scope).clone() {
            Construct::Block | Construct::Clause { .. } => {
                self.render_js_inside(children.unwrap_or(&[]))
            }
            Construct::Def { name, value } => {
                self.define_in_parent(scope, &name, value)?;
                Ok((String::new(), DepSet::default()))
            }
            Construct::Element(data) => self.element_js(scope, &data, children),
            Construct::Script => Ok((String::new(), DepSet::default())),
            Construct::If { clauses } => self.if_js(scope, &clauses, children.unwrap_or(&[])),
            Construct::For(data) => self.for_js(scope, &data, children.unwrap_or(&[])),
            Construct::Print { value } => self.print_js(scope, &value),
            Construct::Get { value } => value.eval_script(Some(self.tree.at(scope)), Quote::Single),
            other @ (Construct::Set { .. } | Construct::Notify { .. } | Construct::Redo) => {
                Err(CompileError::scope(format!(
                    "`{}` statements cannot appear inside reactively re-rendered content",
                    other.name()
                )))
            }
        }
    }

    pub(crate) fn render_script(
        &mut self,
        scope: ScopeId,
        children: Option<&[Reduced]>,
    ) -> CompileResult<ResourceScript> {
        match self.construct(scope).clone() {
            Construct::Def { name, value } => {
                self.define_in_parent(scope, &name, value)?;
                Ok(ResourceScript::new())
            }
            Construct::Element(data) => self.element_script(scope, &data, children),
            Construct::Script => {
                let mut script = ResourceScript::new();
                script.initial_post_calc = self.render_html_inside(children.unwrap_or(&[]))?;
                Ok(script)
            }
            Construct::If { clauses } => self.if_script(scope, &clauses, children.unwrap_or(&[])),
            Construct::For(data) => self.for_script(scope, &data, children),
            _ => self.render_script_inside(children),
        }
    }

    // Leaf constructs.

    fn define_in_parent(
        &mut self,
        scope: ScopeId,
        name: &str,
        value: Expr,
    ) -> CompileResult<CellId> {
        let parent = self.tree.scope(scope).parent.ok_or_else(|| {
            CompileError::scope(format!(
                "variable `{name}` cannot be defined outside of a scope"
            ))
        })?;
        self.tree.add_cell(parent, name, Some(value))
    }

    fn make_print_vars(
        &mut self,
        scope: ScopeId,
        expr: &Expr,
    ) -> CompileResult<(CellId, CellId)> {
        let control =
            self.tree
                .add_cell(scope, "print_control", Some(Expr::Dict(IndexMap::new())))?;
        let var = self.tree.add_cell(
            scope,
            "print_var",
            Some(Expr::Call {
                name: "render_html".into(),
                func: &PRINT_HTML,
                args: vec![expr.clone()],
            }),
        )?;
        Ok((control, var))
    }

    fn print_html(&mut self, scope: ScopeId, expr: &Expr) -> CompileResult<String> {
        let value = expr.eval_initial(Some(self.tree.at(scope)))?;
        self.tree.set_compute_initial(scope, true);
        self.make_print_vars(scope, expr)?;
        Ok(match &value {
            Value::None | Value::Bool(_) => value.to_string(),
            other => escape_html(&other.to_string()),
        })
    }

    fn print_js(&mut self, scope: ScopeId, expr: &Expr) -> CompileResult<(String, DepSet)> {
        self.make_print_vars(scope, expr)?;
        let (unescaped, deps) = Expr::Var("print_var".into())
            .eval_script_html(Some(self.tree.at(scope)), Quote::Single)?;
        Ok((format!("__reactive_print_html({unescaped}, true)"), deps))
    }

    fn set_html(
        &mut self,
        scope: ScopeId,
        target: &Expr,
        value: Option<&Expr>,
        children: Option<&[Reduced]>,
    ) -> CompileResult<String> {
        let (value_js, deps) = match value {
            Some(expr) => expr.eval_script(Some(self.tree.at(scope)), Quote::Single)?,
            None => (
                self.render_html_inside(children.unwrap_or(&[]))?,
                DepSet::default(),
            ),
        };
        target.js_set(Some(self.tree.at(scope)), &value_js, &deps, Quote::Single)
    }

    fn redo_html(&mut self, scope: ScopeId, children: &[Reduced]) -> CompileResult<String> {
        let body = self.render_html_inside(children)?;
        let (_, hooks) = self.render_js_inside(children)?;
        let attaches: Vec<String> = hooks
            .iter()
            .map(|hook| format!("{};", self.tree.cell_js_attach(*hook, "proc", "false")))
            .collect();
        Ok(format!(
            "( () => {{ function proc() {{ {body} }} \n{}\n proc(); }} )();",
            attaches.join("\n")
        ))
    }
}

/// The output of [`compile_template`]: initial HTML plus the pieces of
/// the self-contained update script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledTemplate {
    /// The fully rendered initial markup.
    pub html: String,
    /// `var` declarations constructing every top-level reactive cell.
    pub var_defs: String,
    /// The script-walk post calc of the whole tree.
    pub post_calc: String,
}

impl CompiledTemplate {
    /// The update script: runtime, cell declarations, then the post
    /// calc, inside one shared block.
    pub fn script(&self) -> String {
        format!(
            "{{\n{}\n{}\n{}\n}}",
            RUNTIME_JS, self.var_defs, self.post_calc
        )
    }

    /// The full page: initial HTML followed by the update script in a
    /// `<script>` tag.
    pub fn render_page(&self) -> String {
        format!("{}<script>\n{}\n</script>", self.html, self.script())
    }
}

/// Compile a template tree against host bindings.
pub fn compile_template(
    nodes: &[TemplateNode],
    bindings: &Bindings,
) -> CompileResult<CompiledTemplate> {
    let mut compiler = Compiler::new();
    let root = compiler.new_scope("block", None, Construct::Block);
    let children = compiler.build_nodes(root, nodes, bindings)?;

    let html = compiler.render_html_inside(&children)?;

    let mut defs = Vec::new();
    for cell in compiler.declared_cells(root) {
        defs.push(format!(
            "var {} = {};",
            compiler.tree.cell_js(cell),
            compiler.tree.cell_initial_val_js(cell, false, Quote::Single)?
        ));
    }
    let var_defs = defs.join("\n");

    compiler.tree.clear(root);
    let script = compiler.render_script_inside(Some(&children))?;
    compiler.tree.destroy(root);

    Ok(CompiledTemplate {
        html,
        var_defs,
        post_calc: script.initial_post_calc,
    })
}
