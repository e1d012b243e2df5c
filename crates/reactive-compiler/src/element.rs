//! Element rendering: reactive attributes, generated ids, and the
//! content-reset script that re-renders an element's interior when a
//! cell it displays changes.

use indexmap::IndexMap;
use reactive_core::{CellId, CompileError, CompileResult, DepSet, Expr, ScopeId};
use script_builder::{js_string, Quote, ResourceScript};
use smol_str::SmolStr;

use crate::compile::{AttrData, Compiler, ElementData, Reduced};

/// Per-attribute script-walk rendering: condition JS, value JS, and the
/// cells either of them reads.
pub(crate) type AttrJs = (SmolStr, Option<String>, Option<String>, DepSet);

/// Emit the statement applying one attribute to `element_js`. Boolean
/// DOM state, `data-*` and event attributes go through
/// `setAttribute`/`removeAttribute`; everything else is a property
/// assignment.
pub(crate) fn set_attribute_js(
    element_js: &str,
    attribute: &str,
    cond_js: Option<&str>,
    val_js: Option<&str>,
) -> CompileResult<String> {
    let mut cond_js = cond_js.map(str::to_string);
    let mut val_js = val_js.map(str::to_string);

    if attribute == "checked" {
        if val_js.is_some() {
            return Err(CompileError::syntax(
                "`checked` attribute can have no value other than empty",
            ));
        }
        val_js = Some(cond_js.take().unwrap_or_else(|| "true".to_string()));
    }

    if cond_js.is_some() || val_js.is_none() || attribute.starts_with("data-") || attribute.starts_with("on")
    {
        let val = val_js.unwrap_or_else(|| format!("'{attribute}'"));
        return Ok(match cond_js {
            Some(cond) => format!(
                "if ({cond}) {{\n{element_js}.setAttribute('{attribute}', {val});}} else {{\n{element_js}.removeAttribute('{attribute}');}}\n"
            ),
            None => format!("{element_js}.setAttribute('{attribute}', {val});"),
        });
    }
    Ok(format!(
        "{element_js}.{attribute} = {};",
        val_js.unwrap_or_default()
    ))
}

/// JS identifiers cannot carry `-`, so attachment keys for attributes
/// like `data-state` swap it out.
fn attachment_attr_key(attribute: &str) -> String {
    attribute.replace('-', "_")
}

/// One expression rendering the whole attribute string, ` key="value"`
/// pairs concatenated, with conditional attributes collapsing to `''`.
fn attribute_expr(attrs: &IndexMap<SmolStr, AttrData>) -> Expr {
    let mut parts: Vec<Expr> = Vec::new();
    for (key, attr) in attrs {
        let set_parts = match &attr.value {
            Some(value) => vec![
                Expr::Str(format!(" {key}=\"")),
                Expr::Escaped {
                    inner: Box::new(value.clone()),
                    delimiter: '"',
                },
                Expr::Str("\"".into()),
            ],
            None => vec![Expr::Str(format!(" {key}=\"{key}\""))],
        };
        match &attr.condition {
            Some(condition) => parts.push(Expr::Ternary {
                condition: Box::new(condition.clone()),
                if_true: Box::new(Expr::sum(set_parts)),
                if_false: Box::new(Expr::Str(String::new())),
            }),
            None => parts.extend(set_parts),
        }
    }
    if parts.is_empty() {
        Expr::Str(String::new())
    } else {
        Expr::sum(parts)
    }
}

impl Compiler {
    /// The element's attributes with the generated `id` appended when the
    /// template gave none. The generated id chains every enclosing
    /// scope's prefix, so it is unique and stable across walks.
    pub(crate) fn element_attributes(
        &self,
        scope: ScopeId,
        data: &ElementData,
    ) -> IndexMap<SmolStr, AttrData> {
        let mut attrs = data.attributes.clone();
        if !attrs.contains_key("id") {
            let mut path = vec![self.id_prefix_expr(scope)];
            let mut current = self.tree.scope(scope).parent;
            while let Some(parent) = current {
                path.push(Expr::Str("_".into()));
                path.push(self.id_prefix_expr(parent));
                current = self.tree.scope(parent).parent;
            }
            path.push(Expr::Str("react_html_element_".into()));
            path.reverse();
            attrs.insert(
                "id".into(),
                AttrData {
                    condition: None,
                    value: Some(Expr::sum(path)),
                },
            );
        }
        attrs
    }

    fn element_id_js(
        &self,
        scope: ScopeId,
        attrs: &IndexMap<SmolStr, AttrData>,
    ) -> CompileResult<String> {
        let id = attrs
            .get("id")
            .and_then(|attr| attr.value.as_ref())
            .ok_or_else(|| CompileError::scope("element `id` attribute lost its value"))?;
        let (js, _) = id.eval_script(Some(self.tree.at(scope)), Quote::Single)?;
        Ok(js)
    }

    pub(crate) fn element_attr_js(
        &self,
        scope: ScopeId,
        attrs: &IndexMap<SmolStr, AttrData>,
    ) -> CompileResult<Vec<AttrJs>> {
        let mut out = Vec::with_capacity(attrs.len());
        for (key, attr) in attrs {
            let mut deps = DepSet::default();
            let cond = match &attr.condition {
                Some(condition) => {
                    let (js, cond_deps) =
                        condition.eval_script(Some(self.tree.at(scope)), Quote::Single)?;
                    deps.extend(cond_deps);
                    Some(js)
                }
                None => None,
            };
            let val = match &attr.value {
                Some(value) => {
                    let (js, val_deps) =
                        value.eval_script(Some(self.tree.at(scope)), Quote::Single)?;
                    deps.extend(val_deps);
                    Some(js)
                }
                None => None,
            };
            out.push((key.clone(), cond, val, deps));
        }
        Ok(out)
    }

    pub(crate) fn make_element_control_var(&mut self, scope: ScopeId) -> CompileResult<CellId> {
        let name = format!("__react_control_{}", self.tree.scope_label(scope));
        self.tree
            .add_cell(scope, &name, Some(Expr::Dict(IndexMap::new())))
    }

    pub(crate) fn element_html(
        &mut self,
        scope: ScopeId,
        data: &ElementData,
        children: Option<&[Reduced]>,
    ) -> CompileResult<String> {
        let attrs = self.element_attributes(scope, data);
        let attr_str = attribute_expr(&attrs)
            .eval_initial(Some(self.tree.at(scope)))?
            .to_string();
        let inner = match children {
            Some(kids) if !data.self_enclosed => self.render_html_inside(kids)?,
            _ => String::new(),
        };
        self.make_element_control_var(scope)?;

        Ok(if data.self_enclosed {
            format!("<{}{attr_str} />", data.tag)
        } else {
            format!("<{}{attr_str}>{inner}</{}>", data.tag, data.tag)
        })
    }

    pub(crate) fn element_js(
        &mut self,
        scope: ScopeId,
        data: &ElementData,
        children: Option<&[Reduced]>,
    ) -> CompileResult<(String, DepSet)> {
        let attrs = self.element_attributes(scope, data);
        let (attr_js, _) =
            attribute_expr(&attrs).eval_script(Some(self.tree.at(scope)), Quote::Single)?;
        let inner = match children {
            Some(kids) if !data.self_enclosed => Some(self.render_js_inside(kids)?.0),
            _ => None,
        };
        self.make_element_control_var(scope)?;

        let open = js_string(&format!("<{}", data.tag), Quote::Single);
        let js = match inner {
            None => format!("{open}+{attr_js}+' />'"),
            Some(inner_js) => {
                let inner_js = if inner_js.is_empty() {
                    "''".to_string()
                } else {
                    inner_js
                };
                format!(
                    "{open}+{attr_js}+'>'+{inner_js}+{}",
                    js_string(&format!("</{}>", data.tag), Quote::Single)
                )
            }
        };
        // Changes inside the element are handled by its own reset hooks.
        Ok((js, DepSet::default()))
    }

    pub(crate) fn element_script(
        &mut self,
        scope: ScopeId,
        data: &ElementData,
        children: Option<&[Reduced]>,
    ) -> CompileResult<ResourceScript> {
        let script = self.render_script_inside(children)?;

        self.tree.clear(scope);

        let attrs = self.element_attributes(scope, data);
        let id_js = self.element_id_js(scope, &attrs)?;
        let attr_js = self.element_attr_js(scope, &attrs)?;

        let (rerender_js, content_hooks) = match children {
            Some(kids) if !data.self_enclosed => self.render_js_inside(kids)?,
            _ => (String::new(), DepSet::default()),
        };
        let rerender_js = if rerender_js.is_empty() {
            "''".to_string()
        } else {
            rerender_js
        };

        let control = self.make_element_control_var(scope)?;
        let control_get = self.tree.cell_js_get(control);
        let element_js = format!("document.getElementById({id_js})");

        let mut attr_attach_lines = Vec::new();
        let mut attr_detach_lines = Vec::new();
        for (attribute, cond_js, val_js, hooks) in &attr_js {
            let change = format!(
                "() => {{ {} }}",
                set_attribute_js(&element_js, attribute, cond_js.as_deref(), val_js.as_deref())?
            );
            for hook in hooks {
                let slot = format!(
                    "{control_get}.attachment_attribute_{}_var_{}",
                    attachment_attr_key(attribute),
                    self.tree.cell_js(*hook)
                );
                attr_attach_lines.push(format!(
                    "{slot} = {};",
                    self.tree.cell_js_attach(*hook, &change, "true")
                ));
                attr_detach_lines.push(self.tree.cell_js_detach(*hook, &slot));
            }
        }

        let mut content_attach_lines = Vec::new();
        let mut content_detach_lines = Vec::new();
        for hook in &content_hooks {
            let slot = format!(
                "{control_get}.attachment_content_{}",
                self.tree.cell_js(*hook)
            );
            content_attach_lines.push(format!(
                "{slot} = {};",
                self.tree
                    .cell_js_attach(*hook, "__reactive_reset_content", "true")
            ));
            content_detach_lines.push(self.tree.cell_js_detach(*hook, &slot));
        }

        let innerhtml_line = if data.self_enclosed {
            String::new()
        } else {
            format!("document.getElementById({id_js}).innerHTML = {rerender_js};\n")
        };

        let post = format!(
            "( () => {{\n\
             // Element post calc\n\
             var __reactive_block_reset = true;\n\
             var __reactive_need_reset = false;\n\
             var __reactive_had_reset = false;\n\
             function __reactive_reset_content() {{\n\
             if (__reactive_block_reset) {{ __reactive_need_reset=true; return;}};\n\
             __reactive_block_reset = true;\n\
             __reactive_need_reset = false;\n\
             __reactive_had_reset = true;\n\
             {control_get}.inner_destructor();\n\
             {pre}\n\
             {innerhtml_line}\
             {control_get}.inner_post();\n\
             __reactive_block_reset = false;\n\
             if (__reactive_need_reset) {{ __reactive_reset_content();}};\n\
             ;}}\n\
             {control_get}.inner_post = function() {{\n{post}\n}};\n\
             {control_get}.inner_destructor = function() {{\n{destructor}\n}};\n\
             {attr_attaches}\n\
             {control_get}.inner_post();\n\
             __reactive_block_reset = false;\n\
             if (__reactive_need_reset) {{ __reactive_reset_content();}};\n\
             {content_attaches}\n\
             }})();",
            pre = script.initial_pre_calc,
            post = script.initial_post_calc,
            destructor = script.destructor,
            attr_attaches = attr_attach_lines.join("\n"),
            content_attaches = content_attach_lines.join("\n"),
        );

        let destructor = format!(
            "( () => {{\n\
             // Element destructor\n\
             {content_detaches}\n\
             {attr_detaches}\n\
             {control_get}.inner_destructor();\n\
             }} )();",
            content_detaches = content_detach_lines.join("\n"),
            attr_detaches = attr_detach_lines.join("\n"),
        );

        Ok(ResourceScript {
            initial_pre_calc: script.initial_pre_calc,
            initial_post_calc: post,
            destructor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_attribute_plain_value() {
        assert_eq!(
            set_attribute_js("el", "value", None, Some("(text_block_0.val)")).unwrap(),
            "el.value = (text_block_0.val);"
        );
    }

    #[test]
    fn test_set_attribute_flag_and_data() {
        assert_eq!(
            set_attribute_js("el", "disabled", None, None).unwrap(),
            "el.setAttribute('disabled', 'disabled');"
        );
        assert_eq!(
            set_attribute_js("el", "data-state", None, Some("'on'")).unwrap(),
            "el.setAttribute('data-state', 'on');"
        );
    }

    #[test]
    fn test_set_attribute_conditional() {
        assert_eq!(
            set_attribute_js("el", "hidden", Some("(done_block_0.val)"), None).unwrap(),
            "if ((done_block_0.val)) {\nel.setAttribute('hidden', 'hidden');} else {\nel.removeAttribute('hidden');}\n"
        );
    }

    #[test]
    fn test_set_attribute_checked() {
        assert_eq!(
            set_attribute_js("el", "checked", Some("(done_block_0.val)"), None).unwrap(),
            "el.checked = (done_block_0.val);"
        );
        assert_eq!(
            set_attribute_js("el", "checked", None, None).unwrap(),
            "el.checked = true;"
        );
        assert!(set_attribute_js("el", "checked", None, Some("'x'")).is_err());
    }

    #[test]
    fn test_attachment_attr_key() {
        assert_eq!(attachment_attr_key("data-state"), "data_state");
        assert_eq!(attachment_attr_key("value"), "value");
    }
}
