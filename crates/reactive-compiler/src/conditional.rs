//! Clause chains.
//!
//! A conditional registers a tracking cell holding the index of the
//! active clause (`-1` when none matches). The initial render picks by
//! that index; the script walk emits per-clause script arrays indexed by
//! it, and re-renders through the enclosing element's reset hook when
//! the index or a cell inside the active clause changes.

use reactive_core::{
    binary_operator, CellId, CompileError, CompileResult, DepSet, Expr, ScopeId, Value,
};
use script_builder::{Quote, ResourceScript};

use crate::compile::{Compiler, Construct, Reduced};

fn constant_condition(condition: &Expr) -> CompileResult<bool> {
    match condition.eval_initial(None)? {
        Value::Bool(b) => Ok(b),
        other => Err(CompileError::type_mismatch(
            condition.to_string(),
            other.repr(),
            "the value of a clause condition must be boolean",
        )),
    }
}

impl Compiler {
    /// Register the tracking cell. Its expression folds the clause
    /// conditions, innermost-else first, into a nested ternary producing
    /// the active clause index.
    fn make_tracking_var(&mut self, scope: ScopeId, clauses: &[ScopeId]) -> CompileResult<CellId> {
        let mut else_expr = Expr::Int(-1);
        for (i, clause) in clauses.iter().enumerate().rev() {
            let Construct::Clause { condition } = self.construct(*clause).clone() else {
                return Err(CompileError::scope("conditional child is not a clause"));
            };
            if condition.constant() {
                if constant_condition(&condition)? {
                    else_expr = Expr::Int(i as i64);
                }
            } else {
                else_expr = Expr::Ternary {
                    condition: Box::new(condition),
                    if_true: Box::new(Expr::Int(i as i64)),
                    if_false: Box::new(else_expr),
                };
            }
        }
        self.tree
            .add_cell(scope, "__reactive_current_clause", Some(else_expr))
    }

    pub(crate) fn if_html(
        &mut self,
        scope: ScopeId,
        clauses: &[ScopeId],
        children: &[Reduced],
    ) -> CompileResult<String> {
        // Every clause renders so its cells get registered; only the
        // active clause's output survives.
        let mut outputs = Vec::with_capacity(children.len());
        for child in children {
            let Reduced::Scope(clause, kids) = child else {
                continue;
            };
            outputs.push(self.render_html(*clause, kids.as_deref())?);
        }

        let tracking = self.make_tracking_var(scope, clauses)?;
        match self.tree.cell_eval_initial(tracking)? {
            Value::Int(-1) => Ok(String::new()),
            Value::Int(i) if (i as usize) < outputs.len() => Ok(outputs[i as usize].clone()),
            other => Err(CompileError::type_mismatch(
                "__reactive_current_clause",
                other.repr(),
                "the active clause index must be an integer",
            )),
        }
    }

    pub(crate) fn if_js(
        &mut self,
        scope: ScopeId,
        clauses: &[ScopeId],
        children: &[Reduced],
    ) -> CompileResult<(String, DepSet)> {
        let tracking = self.make_tracking_var(scope, clauses)?;
        let tracking_name = self.tree.cell(tracking).name.clone();
        let eq = binary_operator("===")
            .ok_or_else(|| CompileError::scope("strict equality operator is not registered"))?;

        let mut else_js = "''".to_string();
        let mut else_deps = DepSet::default();
        for (i, child) in children.iter().enumerate().rev() {
            let Reduced::Scope(clause, kids) = child else {
                continue;
            };
            let Construct::Clause { condition } = self.construct(*clause).clone() else {
                continue;
            };
            let (inner_js, inner_deps) = self.render_js_inside(kids.as_deref().unwrap_or(&[]))?;
            if condition.constant() {
                if constant_condition(&condition)? {
                    else_js = inner_js;
                    else_deps = inner_deps;
                }
                continue;
            }
            // The rendered condition reads the tracking cell instead of
            // re-evaluating the original, so both stay consistent.
            let alias = Expr::Binary {
                symbol: "===",
                op: eq,
                args: vec![Expr::Var(tracking_name.clone()), Expr::Int(i as i64)],
            };
            let (cond_js, mut deps) = alias.eval_script(Some(self.tree.at(*clause)), Quote::Single)?;
            deps.extend(inner_deps);
            deps.extend(else_deps.iter().copied());
            else_js = format!("(({cond_js})?({inner_js}):({else_js}))");
            else_deps = deps;
        }

        // Updates run through the tracking cell's attachments.
        Ok((else_js, DepSet::default()))
    }

    pub(crate) fn if_script(
        &mut self,
        scope: ScopeId,
        clauses: &[ScopeId],
        children: &[Reduced],
    ) -> CompileResult<ResourceScript> {
        let mut all_hooks: Vec<DepSet> = Vec::with_capacity(children.len());
        for child in children {
            let Reduced::Scope(_, kids) = child else {
                continue;
            };
            let (_, hooks) = self.render_js_inside(kids.as_deref().unwrap_or(&[]))?;
            all_hooks.push(hooks);
        }

        self.tree.clear(scope);

        let mut scripts = Vec::with_capacity(children.len());
        for child in children {
            let Reduced::Scope(clause, kids) = child else {
                continue;
            };
            scripts.push(self.render_script(*clause, kids.as_deref())?);
        }

        let tracking = self.make_tracking_var(scope, clauses)?;
        let track_js = self.tree.cell_js(tracking);
        let track_get = self.tree.cell_js_get(tracking);

        let fns = |part: fn(&ResourceScript) -> &str| -> String {
            scripts
                .iter()
                .map(|script| format!("function(){{{}}}", part(script)))
                .collect::<Vec<_>>()
                .join(",")
        };

        let initial_pre_calc = format!(
            "{{\n\
             const __reactive_clause_pre_scripts = [{pre_fns}];\n\
             if ({track_get} !== -1) {{\n\
             __reactive_clause_pre_scripts[{track_get}]();\n\
             }}\n\
             }}\n",
            pre_fns = fns(|script| &script.initial_pre_calc),
        );

        let mut attach_chain = String::new();
        let mut detach_chain = String::new();
        for (i, hooks) in all_hooks.iter().enumerate() {
            let guard = format!(
                "{}if ({track_js}.last_from_post == {i}) {{\n",
                if i > 0 { "else " } else { "" }
            );
            attach_chain.push_str(&guard);
            detach_chain.push_str(&guard);
            for hook in hooks {
                let slot = format!(
                    "{track_js}.attachment_{i}_var_{}",
                    self.tree.cell_js(*hook)
                );
                attach_chain.push_str(&format!(
                    "{slot} = {};\n",
                    self.tree
                        .cell_js_attach(*hook, "__reactive_reset_content", "!__reactive_had_reset")
                ));
                detach_chain.push_str(&format!("{}\n", self.tree.cell_js_detach(*hook, &slot)));
            }
            attach_chain.push_str("}\n");
            detach_chain.push_str("}\n");
        }

        let initial_post_calc = format!(
            "{{\n\
             // If post calc\n\
             const __reactive_clause_post_scripts = [{post_fns}];\n\
             {track_js}.last_from_post = {track_get};\n\
             {track_js}.attachment_main = {main_attach}\n\
             {attach_chain}\
             if ({track_js}.last_from_post !== -1) {{\n\
             __reactive_clause_post_scripts[{track_js}.last_from_post]();\n\
             }}\n\
             }}\n",
            post_fns = fns(|script| &script.initial_post_calc),
            main_attach = self.tree.cell_js_attach(
                tracking,
                "__reactive_reset_content",
                "!__reactive_had_reset"
            ),
        );

        let destructor = format!(
            "{{\n\
             // If destructor\n\
             const __reactive_clause_destructor_scripts = [{destructor_fns}];\n\
             if ({track_js}.last_from_post !== -1) {{\n\
             __reactive_clause_destructor_scripts[{track_js}.last_from_post]();\n\
             }}\n\
             {main_detach}\n\
             {detach_chain}\
             \n}}\n",
            destructor_fns = fns(|script| &script.destructor),
            main_detach = self
                .tree
                .cell_js_detach(tracking, &format!("{track_js}.attachment_main")),
        );

        Ok(ResourceScript {
            initial_pre_calc,
            initial_post_calc,
            destructor,
        })
    }
}
