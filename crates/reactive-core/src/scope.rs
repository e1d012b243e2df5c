//! Scope tree and reactive cells.
//!
//! Scopes form an arena-backed tree mirroring the template's construct
//! nesting. Each scope owns named cells; resolution walks from the scope
//! toward the root. The tree also owns the cell-side JS protocol: every
//! `__reactive_data*` call the compiler emits goes through here.

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;
use script_builder::Quote;
use smol_str::SmolStr;

use crate::error::{CompileError, CompileResult};
use crate::expr::{value_to_expr, Expr};
use crate::value::Value;

/// Index of a scope in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The root scope is always created first.
    pub const ROOT: ScopeId = ScopeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a cell in the tree arena. Cells are never reused: each
/// render walk registers fresh cells, and identity within a walk is what
/// dependency sets care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u32);

impl CellId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Ordered, deduplicated set of cells an expression depends on.
pub type DepSet = IndexSet<CellId>;

/// A reactive cell: a named slot whose client-side value tracks an
/// expression.
#[derive(Debug, Clone)]
pub struct ReactiveCell {
    pub name: SmolStr,
    pub expr: Option<Expr>,
    pub scope: ScopeId,
    /// Value captured at registration when the owning scope had
    /// `compute_initial` set. Later reads use it instead of re-evaluating,
    /// which is what freezes per-iteration loop values.
    pub saved_initial: Option<Value>,
}

/// One scope in the tree.
#[derive(Debug, Clone)]
pub struct ScopeRecord {
    /// Unique textual id, `kind_N`. Part of every cell's JS name.
    pub label: String,
    pub kind: SmolStr,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub vars: IndexMap<SmolStr, CellId>,
    /// Whether cell registration captures initial values immediately.
    pub compute_initial: bool,
    pub destroyed: bool,
}

/// The scope arena plus the cell JS protocol.
#[derive(Debug, Default)]
pub struct ScopeTree {
    scopes: Vec<ScopeRecord>,
    cells: Vec<ReactiveCell>,
    counters: FxHashMap<SmolStr, u32>,
}

/// A borrowed evaluation position: the tree plus the scope expressions
/// resolve names against.
#[derive(Clone, Copy)]
pub struct ScopeRef<'a> {
    pub tree: &'a ScopeTree,
    pub scope: ScopeId,
}

impl ScopeRef<'_> {
    /// Resolve a name by walking from this scope toward the root.
    pub fn resolve(&self, name: &str) -> Option<CellId> {
        self.tree.resolve(self.scope, name)
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope labeled `kind_N`, `N` counting per kind.
    pub fn new_scope(&mut self, kind: &str, parent: Option<ScopeId>) -> ScopeId {
        let counter = self.counters.entry(SmolStr::new(kind)).or_insert(0);
        let label = format!("{kind}_{counter}");
        *counter += 1;

        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(ScopeRecord {
            label,
            kind: SmolStr::new(kind),
            parent,
            children: Vec::new(),
            vars: IndexMap::new(),
            compute_initial: false,
            destroyed: false,
        });
        if let Some(parent) = parent {
            self.scopes[parent.index()].children.push(id);
        }
        id
    }

    pub fn scope(&self, id: ScopeId) -> &ScopeRecord {
        &self.scopes[id.index()]
    }

    pub fn scope_label(&self, id: ScopeId) -> &str {
        &self.scopes[id.index()].label
    }

    pub fn set_compute_initial(&mut self, id: ScopeId, compute: bool) {
        self.scopes[id.index()].compute_initial = compute;
    }

    pub fn at(&self, scope: ScopeId) -> ScopeRef<'_> {
        ScopeRef { tree: self, scope }
    }

    /// Register a cell in `scope`. When the scope has `compute_initial`
    /// set and the cell has an expression, its initial value is captured
    /// now.
    pub fn add_cell(
        &mut self,
        scope: ScopeId,
        name: &str,
        expr: Option<Expr>,
    ) -> CompileResult<CellId> {
        if self.scopes[scope.index()].vars.contains_key(name) {
            return Err(CompileError::scope(format!(
                "variable `{name}` is already defined in this scope"
            )));
        }

        let id = CellId(self.cells.len() as u32);
        self.cells.push(ReactiveCell {
            name: SmolStr::new(name),
            expr,
            scope,
            saved_initial: None,
        });
        self.scopes[scope.index()].vars.insert(SmolStr::new(name), id);

        if self.scopes[scope.index()].compute_initial {
            if let Some(expr) = self.cells[id.index()].expr.clone() {
                let value = expr.eval_initial(Some(self.at(scope)))?;
                self.cells[id.index()].saved_initial = Some(value);
            }
        }
        Ok(id)
    }

    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<CellId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let record = &self.scopes[id.index()];
            if let Some(cell) = record.vars.get(name) {
                return Some(*cell);
            }
            current = record.parent;
        }
        None
    }

    /// Drop this scope's registrations and those of its whole subtree, so
    /// the next walk re-registers from a clean slate. Cells themselves
    /// stay in the arena; snapshots taken earlier keep working.
    pub fn clear(&mut self, scope: ScopeId) {
        self.scopes[scope.index()].vars.clear();
        self.scopes[scope.index()].compute_initial = false;
        let children = self.scopes[scope.index()].children.clone();
        for child in children {
            self.clear(child);
        }
    }

    /// Tear the subtree down after the final walk.
    pub fn destroy(&mut self, scope: ScopeId) {
        let children = self.scopes[scope.index()].children.clone();
        for child in children {
            self.destroy(child);
        }
        let record = &mut self.scopes[scope.index()];
        record.vars.clear();
        record.destroyed = true;
    }

    /// All cells registered in this scope, then recursively in its
    /// children, in registration order.
    pub fn subtree_cells(&self, scope: ScopeId) -> Vec<CellId> {
        let mut out: Vec<CellId> = self.scopes[scope.index()].vars.values().copied().collect();
        for child in &self.scopes[scope.index()].children {
            out.extend(self.subtree_cells(*child));
        }
        out
    }

    pub fn cell(&self, id: CellId) -> &ReactiveCell {
        &self.cells[id.index()]
    }

    /// Overwrite the captured initial value (loop snapshots).
    pub fn set_cell_initial(&mut self, id: CellId, value: Value) {
        self.cells[id.index()].saved_initial = Some(value);
    }

    /// The cell's JS variable name: `{name}_{scope label}`.
    pub fn cell_js(&self, id: CellId) -> String {
        let cell = &self.cells[id.index()];
        format!("{}_{}", cell.name, self.scopes[cell.scope.index()].label)
    }

    /// JS expression reading the cell's current value.
    pub fn cell_js_get(&self, id: CellId) -> String {
        format!("({}.val)", self.cell_js(id))
    }

    /// The cell's initial host value: the captured snapshot if present,
    /// otherwise its expression evaluated in the owning scope.
    pub fn cell_eval_initial(&self, id: CellId) -> CompileResult<Value> {
        let cell = &self.cells[id.index()];
        if let Some(saved) = &cell.saved_initial {
            return Ok(saved.clone());
        }
        match &cell.expr {
            Some(expr) => expr.eval_initial(Some(self.at(cell.scope))),
            None => Err(CompileError::scope(format!(
                "cell `{}` has no initial value",
                self.cell_js(id)
            ))),
        }
    }

    /// The cell's expression rendered as JS in its owning scope, with the
    /// cells it depends on.
    pub fn cell_eval_script(&self, id: CellId, quote: Quote) -> CompileResult<(String, DepSet)> {
        let cell = &self.cells[id.index()];
        match &cell.expr {
            Some(expr) => expr.eval_script(Some(self.at(cell.scope)), quote),
            None => Err(CompileError::scope(format!(
                "cell `{}` has no expression",
                self.cell_js(id)
            ))),
        }
    }

    /// Render a host value as a JS expression. Cell references render as
    /// fresh `__reactive_data` constructions.
    pub fn value_js(&self, value: &Value, quote: Quote) -> CompileResult<String> {
        let expr = value_to_expr(value);
        let (js, _) = expr.eval_script(Some(self.at(ScopeId::ROOT)), quote)?;
        Ok(js)
    }

    /// `[a,b,...]` over cell JS names, or the shared empty array.
    pub fn hooks_js(&self, deps: &DepSet) -> String {
        if deps.is_empty() {
            "__reactive_empty_array".to_string()
        } else {
            let names: Vec<String> = deps.iter().map(|id| self.cell_js(*id)).collect();
            format!("[{}]", names.join(","))
        }
    }

    /// `__reactive_data(...)` carrying the precomputed initial value plus
    /// a recalc closure when the cell has dependencies.
    pub fn cell_initial_val_js(
        &self,
        id: CellId,
        clear_hooks: bool,
        quote: Quote,
    ) -> CompileResult<String> {
        let value = self.cell_eval_initial(id)?;
        let value_js = self.value_js(&value, quote)?;
        let (js, mut deps) = self.cell_eval_script(id, quote)?;
        if clear_hooks {
            deps = DepSet::default();
        }
        let hooks_js = self.hooks_js(&deps);
        let recalc = if deps.is_empty() {
            "undefined".to_string()
        } else {
            format!("function(){{return {js};}}")
        };
        Ok(format!("__reactive_data({value_js},{hooks_js},{recalc})"))
    }

    /// `__reactive_data(...)` computing its value client-side. With
    /// dependencies the value slot is `undefined` and the recalc closure
    /// carries the expression.
    pub fn cell_reactive_val_js(
        &self,
        id: CellId,
        other_expression: Option<&str>,
        clear_hooks: bool,
        quote: Quote,
    ) -> CompileResult<String> {
        let (js, deps) = match other_expression {
            Some(other) => (other.to_string(), DepSet::default()),
            None => self.cell_eval_script(id, quote)?,
        };
        let deps = if clear_hooks { DepSet::default() } else { deps };
        let hooks_js = self.hooks_js(&deps);
        let (js, recalc) = if deps.is_empty() {
            (js, "undefined".to_string())
        } else {
            ("undefined".to_string(), format!("function(){{return {js};}}"))
        };
        Ok(format!("__reactive_data({js},{hooks_js},{recalc})"))
    }

    /// Assignment statement. With dependencies the new value is carried
    /// by a recalc closure instead of an immediate expression.
    pub fn cell_js_set(
        &self,
        id: CellId,
        value_js: &str,
        deps: &DepSet,
        alt_js_name: Option<&str>,
    ) -> String {
        let target = match alt_js_name {
            Some(name) => name.to_string(),
            None => self.cell_js(id),
        };
        let hooks_js = self.hooks_js(deps);
        let (value_js, recalc) = if deps.is_empty() {
            (value_js.to_string(), "undefined".to_string())
        } else {
            (
                "undefined".to_string(),
                format!("function(){{return {value_js};}}"),
            )
        };
        format!("__reactive_data_set({target},{value_js},{hooks_js},{recalc});")
    }

    /// Attachment expression (no trailing semicolon; callers bind the
    /// result). `invoke_if` is a JS boolean expression.
    pub fn cell_js_attach(&self, id: CellId, js_callable: &str, invoke_if: &str) -> String {
        format!(
            "__reactive_data_attach({},{js_callable},{invoke_if})",
            self.cell_js(id)
        )
    }

    pub fn cell_js_detach(&self, id: CellId, js_attachment: &str) -> String {
        format!(
            "__reactive_data_detach({},{js_attachment});",
            self.cell_js(id)
        )
    }

    pub fn cell_js_notify(&self, id: CellId, alt_js_name: Option<&str>) -> String {
        let target = match alt_js_name {
            Some(name) => name.to_string(),
            None => self.cell_js(id),
        };
        format!("__reactive_data_notify({target});")
    }
}
