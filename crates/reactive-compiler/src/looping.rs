//! Loop rendering.
//!
//! Each iteration gets its own cells, snapshotted at registration so
//! per-iteration values stay frozen. Client-side, the iteration cells
//! live in the loop's control cell (`iters[i].vars`), and every script
//! re-binds them with `const` definitions inside its loop body. Keyed
//! loops additionally keep a `key_table` and reconcile existing DOM
//! nodes in place instead of re-rendering the whole section.

use indexmap::IndexMap;
use reactive_core::{
    value_to_expr, CellId, CompileError, CompileResult, DepSet, Expr, ScopeId, Value,
};
use script_builder::{Quote, ResourceScript};
use smol_str::SmolStr;

use crate::compile::{Compiler, Construct, ForData, Reduced};
use crate::element::set_attribute_js;

impl Compiler {
    fn for_control_name(&self, scope: ScopeId) -> String {
        format!("__react_control_{}", self.tree.scope_label(scope))
    }

    /// `const` definition re-binding one iteration cell inside a loop
    /// body, reading from the control cell unless overridden.
    fn for_var_def(
        &self,
        control_get: &str,
        var: CellId,
        other: Option<&str>,
        iteration: Option<&str>,
    ) -> String {
        let var_js = self.tree.cell_js(var);
        let val = match other {
            Some(other) => other.to_string(),
            None => {
                let iteration = iteration
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{control_get}.iters[i]"));
                format!("{iteration}.vars.{var_js}")
            }
        };
        format!("const {var_js} = {val};")
    }

    /// Expression of the iteration id cell during script walks. Unkeyed
    /// loops use the loop counter itself.
    fn iter_id_expr(data: &ForData) -> Expr {
        match &data.key {
            Some(key) => Expr::sum(vec![Expr::Str("key_".into()), key.clone()]),
            None => Expr::NativeVar("i".into()),
        }
    }

    pub(crate) fn for_html(
        &mut self,
        scope: ScopeId,
        data: &ForData,
        children: &[Reduced],
    ) -> CompileResult<String> {
        let items = match data.iter.eval_initial(Some(self.tree.at(scope)))? {
            Value::Array(items) => items,
            other => {
                return Err(CompileError::type_mismatch(
                    data.iter.to_string(),
                    other.repr(),
                    "cannot loop through a non-array value",
                ))
            }
        };

        let mut outputs = Vec::with_capacity(items.len());
        let mut iters = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            self.tree.set_compute_initial(scope, true);
            self.tree
                .add_cell(scope, &data.var_name, Some(value_to_expr(item)))?;
            let id_expr = match &data.key {
                Some(key) => Expr::sum(vec![Expr::Str("key_".into()), key.clone()]),
                None => Expr::Int(i as i64),
            };
            self.tree.add_cell(scope, "__react_iter_id", Some(id_expr))?;

            outputs.push(self.render_html_inside(children)?);

            let vars = self.declared_cells_inside(scope);
            let mut var_map = IndexMap::new();
            for var in vars {
                var_map.insert(SmolStr::new(self.tree.cell_js(var)), Value::Cell(var));
            }
            let mut iter_entry = IndexMap::new();
            iter_entry.insert(SmolStr::new("vars"), Value::Dict(var_map));
            iters.push(Value::Dict(iter_entry));

            // The last iteration's cells stay registered so later walks
            // and enclosing declarations can see the loop's locals.
            if i + 1 < items.len() {
                self.tree.clear(scope);
            }
        }

        let mut control_data = IndexMap::new();
        control_data.insert(SmolStr::new("iters"), Value::Array(iters));
        if data.key.is_some() {
            control_data.insert(SmolStr::new("key_table"), Value::Dict(IndexMap::new()));
        }
        let control_name = self.for_control_name(scope);
        self.tree.add_cell(
            scope,
            &control_name,
            Some(value_to_expr(&Value::Dict(control_data))),
        )?;

        Ok(outputs.concat())
    }

    pub(crate) fn for_js(
        &mut self,
        scope: ScopeId,
        data: &ForData,
        children: &[Reduced],
    ) -> CompileResult<(String, DepSet)> {
        let (iter_js, iter_deps) = data.iter.eval_script(Some(self.tree.at(scope)), Quote::Single)?;

        let iter_var = self.tree.add_cell(scope, &data.var_name, None)?;
        self.tree.add_cell(scope, "__react_iter_id", None)?;

        let (inner_js, inner_deps) = self.render_js_inside(children)?;

        let vars = self.declared_cells_inside(scope);

        let mut control_expr = IndexMap::new();
        control_expr.insert(SmolStr::new("iters"), Expr::Array(vec![]));
        let control_name = self.for_control_name(scope);
        let control = self
            .tree
            .add_cell(scope, &control_name, Some(Expr::Dict(control_expr)))?;
        let control_get = self.tree.cell_js_get(control);

        let js = if inner_js.is_empty() {
            String::new()
        } else {
            let defs: Vec<String> = vars
                .iter()
                .map(|var| self.for_var_def(&control_get, *var, None, None))
                .collect();
            format!(
                "(() => {{\n\
                 // For loop expression calc\n\
                 const react_iter = {iter_js}; var output = '';\
                 for (var i = 0; i < react_iter.length; ++i) {{{defs}\n\
                 \n output += {inner_js}; }}; return output; }})()",
                defs = defs.join("\n"),
            )
        };

        // Changes of the iterated array re-render the section; changes
        // of an individual iteration cell do not.
        let mut hooks = iter_deps;
        hooks.extend(inner_deps.iter().copied().filter(|hook| *hook != iter_var));
        let deps: DepSet = if data.key.is_some() {
            // Keyed loops reconcile through the control cell, which is
            // also notified when the loop grows from empty.
            let mut deps = DepSet::default();
            deps.insert(control);
            deps
        } else {
            hooks
                .iter()
                .copied()
                .filter(|hook| !vars.contains(hook))
                .collect()
        };
        Ok((js, deps))
    }

    pub(crate) fn for_script(
        &mut self,
        scope: ScopeId,
        data: &ForData,
        children: Option<&[Reduced]>,
    ) -> CompileResult<ResourceScript> {
        let kids = children.unwrap_or(&[]);

        self.tree.add_cell(scope, &data.var_name, None)?;
        self.tree
            .add_cell(scope, "__react_iter_id", Some(Self::iter_id_expr(data)))?;

        let script = self.render_script_inside(children)?;

        self.tree.clear(scope);

        let mut iter_var = self.tree.add_cell(scope, &data.var_name, None)?;
        let mut iter_id = self
            .tree
            .add_cell(scope, "__react_iter_id", Some(Self::iter_id_expr(data)))?;

        // Re-register the subtree's cells so the declaration list below
        // is complete; the rendered expression itself is unused here.
        let _ = self.render_js_inside(kids)?;

        let vars = self.declared_cells_inside(scope);
        let vars_but_iter: Vec<CellId> = vars.iter().copied().filter(|v| *v != iter_var).collect();

        let (iter_js, iter_hooks) = data.iter.eval_script(Some(self.tree.at(scope)), Quote::Single)?;

        let control_name = self.for_control_name(scope);
        let control = self.tree.add_cell(scope, &control_name, None)?;
        let control_get = self.tree.cell_js_get(control);

        let defs = vars
            .iter()
            .map(|var| self.for_var_def(&control_get, *var, None, None))
            .collect::<Vec<_>>()
            .join("\n");

        let update_for_code = if data.key.is_some() {
            let defs_but_iter_and_id = vars_but_iter
                .iter()
                .copied()
                .filter(|v| *v != iter_id)
                .map(|v| self.for_var_def(&control_get, v, None, Some("__reactive_iter_store")))
                .collect::<Vec<_>>()
                .join("\n");

            let Some(Reduced::Scope(tag_scope, tag_kids)) = kids.first() else {
                return Err(CompileError::scope(
                    "a keyed loop must have exactly one element child",
                ));
            };
            let Construct::Element(tag_data) = self.construct(*tag_scope).clone() else {
                return Err(CompileError::scope(
                    "a keyed loop must have exactly one element child",
                ));
            };
            let tag_attrs = self.element_attributes(*tag_scope, &tag_data);
            let tag_id_expr = tag_attrs
                .get("id")
                .and_then(|attr| attr.value.clone())
                .ok_or_else(|| CompileError::scope("element `id` attribute lost its value"))?;
            let (tag_id_js, _) = tag_id_expr.eval_script(Some(self.tree.at(scope)), Quote::Single)?;

            self.tree.clear(scope);

            iter_var = self.tree.add_cell(scope, &data.var_name, None)?;
            iter_id = self
                .tree
                .add_cell(scope, "__react_iter_id", Some(Self::iter_id_expr(data)))?;

            let (tag_inner_js, _) = self.render_js_inside(tag_kids.as_deref().unwrap_or(&[]))?;
            let tag_inner_js = if tag_inner_js.is_empty() {
                "''".to_string()
            } else {
                tag_inner_js
            };
            let tag_attr_js = self.element_attr_js(*tag_scope, &tag_attrs)?;

            let iter_var_js = self.tree.cell_js(iter_var);
            let iter_id_js = self.tree.cell_js(iter_id);
            let iter_id_get = self.tree.cell_js_get(iter_id);

            let mut store_entries = vec![format!("{iter_var_js}:{iter_var_js}")];
            for var in &vars_but_iter {
                store_entries.push(format!(
                    "{}:{}",
                    self.tree.cell_js(*var),
                    self.tree.cell_reactive_val_js(*var, None, false, Quote::Single)?
                ));
            }

            let mut set_new_attrs = Vec::with_capacity(tag_attr_js.len());
            for (attribute, cond_js, val_js, _) in &tag_attr_js {
                set_new_attrs.push(set_attribute_js(
                    "current_element",
                    attribute,
                    cond_js.as_deref(),
                    val_js.as_deref(),
                )?);
            }

            let stale_defs = vars
                .iter()
                .map(|var| self.for_var_def(&control_get, *var, None, Some("__reactive_old_iters[i]")))
                .collect::<Vec<_>>()
                .join("\n");
            let destroys = vars
                .iter()
                .rev()
                .map(|var| format!("__reactive_data_destroy({});", self.tree.cell_js(*var)))
                .collect::<Vec<_>>()
                .join("\n");

            let mut code = String::new();
            code.push_str(&format!("const react_iter = {iter_js};\n"));
            code.push_str(&format!(
                "const __reactive_old_iters = {control_get}.iters;\n"
            ));
            code.push_str(&format!("{control_get}.iters = [];\n"));
            code.push_str("var current_old_element = null;\n");
            code.push_str("var __reactive_need_work = true;\n");
            code.push_str("if (__reactive_old_iters.length === 0) {\n");
            code.push_str("if (react_iter.length !== 0) {\n");
            code.push_str(&format!("{}\n", self.tree.cell_js_notify(control, None)));
            code.push_str("__reactive_need_work = false;\n");
            code.push_str("}\n");
            code.push_str("} else {\n");
            code.push_str(&format!(
                "{}\n",
                self.for_var_def(&control_get, iter_var, None, Some("__reactive_old_iters[0]"))
            ));
            code.push_str(&format!(
                "const {iter_id_js} = {};\n",
                self.tree.cell_reactive_val_js(iter_id, None, true, Quote::Single)?
            ));
            code.push_str(&format!(
                "current_old_element = document.getElementById({tag_id_js});\n"
            ));
            code.push_str("}\n");
            code.push_str("if (__reactive_need_work) {\n");
            code.push_str("for (var i = 0; i < react_iter.length; ++i) {\n");
            code.push_str(&format!(
                "const {iter_var_js} = {};\n",
                self.tree
                    .cell_reactive_val_js(iter_var, Some("react_iter[i]"), false, Quote::Single)?
            ));
            code.push_str(&format!(
                "const {iter_id_js} = {};\n",
                self.tree.cell_reactive_val_js(iter_id, None, true, Quote::Single)?
            ));
            code.push_str(&format!(
                "var __reactive_iter_store = {control_get}.key_table[{iter_id_get}];\n"
            ));
            code.push_str("if (__reactive_iter_store) {\n");
            code.push_str(&format!(
                "const current_element = document.getElementById({tag_id_js});\n"
            ));
            code.push_str("if (current_element === null) {\n");
            code.push_str("throw 'current_element is null!';\n");
            code.push_str("}\n");
            code.push_str("if (current_element !== current_old_element) {\n");
            code.push_str(
                "current_old_element.parentNode.insertBefore(current_element, current_old_element);\n",
            );
            code.push_str("} else {\n");
            code.push_str("current_old_element = current_element.nextSibling;\n");
            code.push_str("}\n");
            code.push_str("__reactive_iter_store.keep = true;\n");
            code.push_str(&format!(
                "{}\n",
                self.tree.cell_js_set(
                    iter_var,
                    &self.tree.cell_js_get(iter_var),
                    &DepSet::default(),
                    Some(&format!("__reactive_iter_store.vars.{iter_var_js}")),
                )
            ));
            code.push_str("} else {\n");
            code.push_str(&format!(
                "__reactive_iter_store = {{ vars: {{{}}} }};\n",
                store_entries.join(",")
            ));
            code.push_str(&format!(
                "{control_get}.key_table[{iter_id_get}] = __reactive_iter_store;\n"
            ));
            code.push_str(&format!("{defs_but_iter_and_id}\n"));
            code.push_str(&format!("{}\n", script.initial_pre_calc));
            code.push_str(&format!(
                "const current_element = document.createElement('{}');\n",
                tag_data.tag
            ));
            code.push_str(&set_new_attrs.join("\n"));
            code.push('\n');
            code.push_str(&format!("current_element.innerHTML = {tag_inner_js};\n"));
            code.push_str(
                "current_old_element.parentNode.insertBefore(current_element, current_old_element);\n",
            );
            code.push_str(&format!("{}\n", script.initial_post_calc));
            code.push_str("}\n");
            code.push_str(&format!(
                "({control_get}).iters.push(__reactive_iter_store);\n"
            ));
            code.push_str("}\n");
            code.push_str("for (var i = 0; i < __reactive_old_iters.length; ++i)\n {");
            code.push_str("if (__reactive_old_iters[i].keep) {\n");
            code.push_str("__reactive_old_iters[i].keep = undefined;\n");
            code.push_str("} else {\n");
            code.push_str(&stale_defs);
            code.push_str(&script.destructor);
            code.push('\n');
            code.push_str(&format!(
                "const element = document.getElementById({tag_id_js});\n"
            ));
            code.push_str("element.parentNode.removeChild(element);\n");
            code.push_str(&format!(
                "delete {control_get}.key_table[{iter_id_get}];\n"
            ));
            code.push_str(&destroys);
            code.push('\n');
            code.push_str("}\n");
            code.push_str("}\n");
            code.push_str("}\n");
            Some(code)
        } else {
            None
        };

        let iter_var_js = self.tree.cell_js(iter_var);
        let reactive_defs_but_iter = {
            let mut lines = Vec::with_capacity(vars_but_iter.len());
            for var in &vars_but_iter {
                lines.push(format!(
                    "const {} = {};",
                    self.tree.cell_js(*var),
                    self.tree.cell_reactive_val_js(*var, None, false, Quote::Single)?
                ));
            }
            lines.join("\n")
        };
        let var_names_pairs = vars
            .iter()
            .map(|var| {
                let js = self.tree.cell_js(*var);
                format!("{js}:{js}")
            })
            .collect::<Vec<_>>()
            .join(",");
        let reassignments = vars
            .iter()
            .map(|var| {
                let js = self.tree.cell_js(*var);
                format!("{control_get}.iters[i].vars.{js} = {js};")
            })
            .collect::<Vec<_>>()
            .join("\n");

        let initial_pre_calc = format!(
            "( () => {{\n\
             // For loop initial pre calc\n\
             const react_iter = {iter_js};\n\
             const length_changed = ({control_get}.iters.length !== react_iter.length);\n\
             if (length_changed) {{\n\
             {control_get}.iters = [];\n\
             }}\n\
             for (var i = 0; i < react_iter.length; ++i) {{\n\
             const {iter_var_js} = {iter_reactive};\n\
             {reactive_defs_but_iter}\n\
             if (length_changed) {{\n\
             {control_get}.iters.push({{ vars: {{\n\
             {var_names_pairs}\n\
             }} }} ); }} else {{\n\
             {reassignments}\n\
             }}\n\
             {inner_pre}\n\
             }} }} )();",
            iter_reactive = self
                .tree
                .cell_reactive_val_js(iter_var, Some("react_iter[i]"), false, Quote::Single)?,
            inner_pre = script.initial_pre_calc,
        );

        let keyed_post = match &update_for_code {
            Some(code) => {
                let attaches = iter_hooks
                    .iter()
                    .map(|hook| {
                        format!(
                            "{control_get}.attachment_{} = {};",
                            self.tree.cell_js(*hook),
                            self.tree.cell_js_attach(*hook, "update_for", "false")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "{control_get}.key_table = {{}};\n\
                     function update_for() {{\n\
                     {code}\n\
                     }}\n\
                     {attaches}\n"
                )
            }
            None => String::new(),
        };
        let keyed_table_fill = if data.key.is_some() {
            format!(
                "{control_get}.key_table[{}] = {control_get}.iters[i];\n",
                self.tree.cell_js_get(iter_id)
            )
        } else {
            String::new()
        };

        let initial_post_calc = format!(
            "( () => {{\n\
             // For loop initial post calc\n\
             const react_iter = {iter_js};\n\
             {keyed_post}\
             for (var i = 0; i < react_iter.length; ++i) {{\n\
             {defs}\n\
             {keyed_table_fill}\
             {inner_post}}} }} )();",
            inner_post = script.initial_post_calc,
        );

        let keyed_detaches = if data.key.is_some() {
            let lines = iter_hooks
                .iter()
                .map(|hook| {
                    self.tree.cell_js_detach(
                        *hook,
                        &format!("{control_get}.attachment_{}", self.tree.cell_js(*hook)),
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!("{lines}\n")
        } else {
            String::new()
        };
        let destroys = vars
            .iter()
            .rev()
            .map(|var| format!("__reactive_data_destroy({});", self.tree.cell_js(*var)))
            .collect::<Vec<_>>()
            .join("\n");

        let destructor = format!(
            "( () => {{\n\
             // For loop destructor\n\
             {keyed_detaches}\
             for (var i = 0; i < {control_get}.iters.length; ++i) {{\n\
             {defs}\n\
             {inner_destructor}\n\
             {destroys}\n\
             }} }} )();",
            inner_destructor = script.destructor,
        );

        Ok(ResourceScript {
            initial_pre_calc,
            initial_post_calc,
            destructor,
        })
    }
}
