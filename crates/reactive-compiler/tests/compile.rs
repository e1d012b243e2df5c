use reactive_compiler::{compile_template, Bindings, TemplateNode, Value};

fn parse(template: &str) -> Vec<TemplateNode> {
    serde_json::from_str(template).unwrap()
}

fn bind(pairs: &[(&str, Value)]) -> Bindings {
    let mut bindings = Bindings::new();
    for (name, value) in pairs {
        bindings.insert(*name, value.clone());
    }
    bindings
}

#[test]
fn test_static_text_and_print() {
    let template = parse(
        r#"[{"kind": "text", "text": "Hello, "},
            {"kind": "print", "value": "name"}]"#,
    );
    let compiled =
        compile_template(&template, &bind(&[("name", Value::Str("world".into()))])).unwrap();

    assert_eq!(compiled.html, "Hello, world");
    assert_eq!(
        compiled.var_defs,
        "var print_control_print_0 = __reactive_data({},__reactive_empty_array,undefined);\n\
         var print_var_print_0 = __reactive_data('world',__reactive_empty_array,undefined);"
    );
    // A constant print contributes nothing to the update script.
    assert_eq!(compiled.post_calc, "{}");
}

#[test]
fn test_print_escapes_html() {
    let template = parse(r#"[{"kind": "print", "value": "snippet"}]"#);
    let compiled = compile_template(
        &template,
        &bind(&[("snippet", Value::Str("<i>x</i> & co".into()))]),
    )
    .unwrap();
    assert_eq!(compiled.html, "&lt;i&gt;x&lt;/i&gt; &amp; co");
}

#[test]
fn test_page_assembly() {
    let template = parse(r#"[{"kind": "text", "text": "static"}]"#);
    let compiled = compile_template(&template, &Bindings::new()).unwrap();
    let page = compiled.render_page();
    assert!(page.starts_with("static<script>\n{\n"));
    assert!(page.contains("function __reactive_data("));
    assert!(page.ends_with("\n</script>"));
}

#[test]
fn test_conditional_picks_initial_clause() {
    let source = r#"[
        {"kind": "def", "name": "flag", "value": "true"},
        {"kind": "if", "clauses": [
            {"condition": "flag", "children": [{"kind": "text", "text": "on"}]},
            {"children": [{"kind": "text", "text": "off"}]}
        ]}
    ]"#;
    let compiled = compile_template(&parse(source), &Bindings::new()).unwrap();

    assert_eq!(compiled.html, "on");
    assert_eq!(
        compiled.var_defs,
        "var flag_block_0 = __reactive_data(true,__reactive_empty_array,undefined);\n\
         var __reactive_current_clause_if_0 = __reactive_data(0,[flag_block_0],\
         function(){return ((flag_block_0.val)?0:1);});"
    );
    assert!(compiled.post_calc.contains("__reactive_clause_post_scripts"));
    assert!(compiled
        .post_calc
        .contains("__reactive_current_clause_if_0.attachment_main"));

    let off = parse(source.replacen("\"true\"", "\"false\"", 1).as_str());
    let compiled = compile_template(&off, &Bindings::new()).unwrap();
    assert_eq!(compiled.html, "off");
    assert!(compiled.var_defs.contains("__reactive_data(1,[flag_block_0]"));
}

#[test]
fn test_unkeyed_loop_renders_each_iteration() {
    let template = parse(
        r#"[{"kind": "for", "var": "x", "iterable": "items",
             "children": [{"kind": "print", "value": "x"}]}]"#,
    );
    let items = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    let compiled = compile_template(&template, &bind(&[("items", items)])).unwrap();

    assert_eq!(compiled.html, "123");
    // The loop declares only its control cell; iteration cells live in
    // the control's `iters` snapshots.
    assert!(compiled
        .var_defs
        .starts_with("var __react_control_for_0_for_0 = __reactive_data("));
    assert!(!compiled.var_defs.contains("var x_for_0"));
    assert!(compiled.var_defs.contains("iters:"));
    assert!(compiled.var_defs.contains("print_var_print_0:"));
    // One snapshot record per iteration.
    assert_eq!(compiled.var_defs.matches("__react_iter_id_for_0:").count(), 3);

    assert!(compiled.post_calc.contains("// For loop initial post calc"));
    assert!(compiled.post_calc.contains("const react_iter = [1,2,3];"));
    assert!(compiled
        .post_calc
        .contains("const x_for_0 = (__react_control_for_0_for_0.val).iters[i].vars.x_for_0;"));
}

#[test]
fn test_keyed_loop_reconciles_by_key() {
    let template = parse(
        r#"[{"kind": "for", "var": "item", "iterable": "items", "key": "item.id",
             "children": [{"kind": "element", "tag": "li",
                           "children": [{"kind": "print", "value": "item.label"}]}]}]"#,
    );
    let items: Value = serde_json::from_str(
        r#"[{"id": "a", "label": "A"}, {"id": "b", "label": "B"}]"#,
    )
    .unwrap();
    let compiled = compile_template(&template, &bind(&[("items", items)])).unwrap();

    insta::assert_snapshot!(
        compiled.html,
        @r#"<li id="react_html_element_block_0_for_0_iter_key_a_element_0">A</li><li id="react_html_element_block_0_for_0_iter_key_b_element_0">B</li>"#
    );
    assert!(compiled.post_calc.contains("function update_for()"));
    assert!(compiled.post_calc.contains(".key_table ="));
    assert!(compiled
        .post_calc
        .contains("document.createElement('li')"));
    assert!(compiled
        .post_calc
        .contains("current_old_element.parentNode.insertBefore(current_element, current_old_element);"));
}

#[test]
fn test_keyed_update_moves_creates_and_removes_rows() {
    let template = parse(
        r#"[{"kind": "for", "var": "item", "iterable": "items", "key": "item.id",
             "children": [{"kind": "element", "tag": "li",
                           "children": [{"kind": "print", "value": "item.label"}]}]}]"#,
    );
    let items: Value = serde_json::from_str(
        r#"[{"id": "a", "label": "A"}, {"id": "b", "label": "B"}, {"id": "c", "label": "C"}]"#,
    )
    .unwrap();
    let compiled = compile_template(&template, &bind(&[("items", items)])).unwrap();

    assert_eq!(
        compiled.html,
        "<li id=\"react_html_element_block_0_for_0_iter_key_a_element_0\">A</li>\
         <li id=\"react_html_element_block_0_for_0_iter_key_b_element_0\">B</li>\
         <li id=\"react_html_element_block_0_for_0_iter_key_c_element_0\">C</li>"
    );

    let body = &compiled.post_calc;

    // Growing from an empty list defers to a full notify instead of the
    // element-by-element pass.
    assert!(body.contains("if (__reactive_old_iters.length === 0) {"));
    assert!(body.contains("__reactive_data_notify(__react_control_for_0_for_0);"));

    // Known key out of place: move the row before the cursor; in place:
    // advance the cursor past it. Either way the row is marked kept and
    // its stored iteration var is refreshed.
    let insert =
        "current_old_element.parentNode.insertBefore(current_element, current_old_element);";
    let compare = body
        .find("if (current_element !== current_old_element) {")
        .unwrap();
    let move_before = body.find(insert).unwrap();
    let advance = body
        .find("current_old_element = current_element.nextSibling;")
        .unwrap();
    assert!(compare < move_before && move_before < advance);
    assert!(body.contains("__reactive_iter_store.keep = true;"));
    assert!(body.contains("__reactive_iter_store.vars.item_for_0"));

    // New key: register the store, build the row and splice it in at the
    // cursor.
    let register = body
        .find("key_table[(__react_iter_id_for_0.val)] = __reactive_iter_store;")
        .unwrap();
    let create = body.find("document.createElement('li')").unwrap();
    let fill = body.find("current_element.innerHTML = ").unwrap();
    let splice = body.rfind(insert).unwrap();
    assert_eq!(body.matches(insert).count(), 2);
    assert!(register < create && create < fill && fill < splice);

    // Stale key: rows not marked kept by the build pass are removed from
    // the document, forgotten in the key table and their cells destroyed
    // in reverse declaration order.
    let sweep = body.find("if (__reactive_old_iters[i].keep) {").unwrap();
    let remove = body.find("element.parentNode.removeChild(element);").unwrap();
    let forget = body
        .find("delete (__react_control_for_0_for_0.val).key_table[")
        .unwrap();
    let drop_id = body
        .find("__reactive_data_destroy(__react_iter_id_for_0);")
        .unwrap();
    let drop_var = body.find("__reactive_data_destroy(item_for_0);").unwrap();
    assert!(splice < sweep && sweep < remove && remove < forget);
    assert!(forget < drop_id && drop_id < drop_var);
}

#[test]
fn test_element_content_reset_script() {
    let template = parse(
        r#"[{"kind": "def", "name": "msg", "value": "'hi'"},
            {"kind": "element", "tag": "span",
             "children": [{"kind": "print", "value": "msg"}]}]"#,
    );
    let compiled = compile_template(&template, &Bindings::new()).unwrap();

    insta::assert_snapshot!(
        compiled.html,
        @r#"<span id="react_html_element_block_0_element_0">hi</span>"#
    );
    assert_eq!(
        compiled.var_defs,
        "var msg_block_0 = __reactive_data('hi',__reactive_empty_array,undefined);\n\
         var __react_control_element_0_element_0 = __reactive_data({},__reactive_empty_array,undefined);\n\
         var print_control_print_0 = __reactive_data({},__reactive_empty_array,undefined);\n\
         var print_var_print_0 = __reactive_data('hi',[msg_block_0],\
         function(){return __reactive_print_html((msg_block_0.val));});"
    );
    assert!(compiled.post_calc.contains("// Element post calc"));
    assert!(compiled.post_calc.contains(
        "document.getElementById('react_html_element_block_0_element_0').innerHTML = \
         __reactive_print_html(__reactive_print_html((print_var_print_0.val)), true);"
    ));
    assert!(compiled
        .post_calc
        .contains("attachment_content_print_var_print_0"));
}

#[test]
fn test_checked_attribute_follows_its_cell() {
    let template = parse(
        r#"[{"kind": "def", "name": "done", "value": "false"},
            {"kind": "element", "tag": "input", "self_enclosed": true,
             "attributes": [{"name": "checked", "condition": "done"}]}]"#,
    );
    let compiled = compile_template(&template, &Bindings::new()).unwrap();

    // The condition is false initially, so the attribute is absent.
    assert_eq!(
        compiled.html,
        r#"<input id="react_html_element_block_0_element_0" />"#
    );
    assert!(compiled.post_calc.contains(".checked = (done_block_0.val);"));
    assert!(compiled
        .post_calc
        .contains("attachment_attribute_checked_var_done_block_0"));
}

#[test]
fn test_script_body_set_get_notify() {
    let template = parse(
        r#"[{"kind": "def", "name": "count", "value": "0"},
            {"kind": "script", "children": [
                {"kind": "text", "text": "console.log("},
                {"kind": "get", "value": "count"},
                {"kind": "text", "text": ");"},
                {"kind": "set", "target": "count", "value": "count + 1"},
                {"kind": "notify", "target": "count"}
            ]}]"#,
    );
    let compiled = compile_template(&template, &Bindings::new()).unwrap();

    assert_eq!(compiled.html, "");
    assert_eq!(
        compiled.var_defs,
        "var count_block_0 = __reactive_data(0,__reactive_empty_array,undefined);"
    );
    assert!(compiled.post_calc.contains("console.log((count_block_0.val));"));
    assert!(compiled.post_calc.contains(
        "__reactive_data_set(count_block_0,undefined,[count_block_0],\
         function(){return (count_block_0.val)+1;});"
    ));
    assert!(compiled
        .post_calc
        .contains("__reactive_data_notify(count_block_0);"));
}

#[test]
fn test_redo_reruns_on_dependency_change() {
    let template = parse(
        r#"[{"kind": "def", "name": "count", "value": "0"},
            {"kind": "script", "children": [
                {"kind": "redo", "children": [
                    {"kind": "text", "text": "console.log("},
                    {"kind": "get", "value": "count"},
                    {"kind": "text", "text": ");"}
                ]}
            ]}]"#,
    );
    let compiled = compile_template(&template, &Bindings::new()).unwrap();

    assert!(compiled
        .post_calc
        .contains("function proc() { console.log((count_block_0.val)); }"));
    assert!(compiled
        .post_calc
        .contains("__reactive_data_attach(count_block_0,proc,false);"));
}

#[test]
fn test_set_inside_rerendered_content_rejected() {
    let template = parse(
        r#"[{"kind": "def", "name": "c", "value": "0"},
            {"kind": "element", "tag": "div",
             "children": [{"kind": "set", "target": "c", "value": "1"}]}]"#,
    );
    let err = compile_template(&template, &Bindings::new()).unwrap_err();
    assert!(err
        .to_string()
        .contains("cannot appear inside reactively re-rendered content"));
}

#[test]
fn test_loop_over_non_array_rejected() {
    let template = parse(
        r#"[{"kind": "for", "var": "x", "iterable": "total",
             "children": [{"kind": "print", "value": "x"}]}]"#,
    );
    let err = compile_template(&template, &bind(&[("total", Value::Int(5))])).unwrap_err();
    assert!(err.to_string().contains("non-array"));
}

#[test]
fn test_duplicate_definition_rejected() {
    let template = parse(
        r#"[{"kind": "def", "name": "x", "value": "1"},
            {"kind": "def", "name": "x", "value": "2"}]"#,
    );
    let err = compile_template(&template, &Bindings::new()).unwrap_err();
    assert!(err.to_string().contains("already defined"));
}

#[test]
fn test_keyed_loop_requires_single_element() {
    let template = parse(
        r#"[{"kind": "for", "var": "x", "iterable": "items", "key": "x",
             "children": [{"kind": "text", "text": "plain"}]}]"#,
    );
    let items = Value::Array(vec![Value::Int(1)]);
    let err = compile_template(&template, &bind(&[("items", items)])).unwrap_err();
    assert!(err.to_string().contains("exactly one element child"));
}

#[test]
fn test_set_takes_value_or_body_not_both() {
    let template = parse(
        r#"[{"kind": "def", "name": "c", "value": "0"},
            {"kind": "script", "children": [
                {"kind": "set", "target": "c", "value": "1",
                 "children": [{"kind": "text", "text": "2"}]}
            ]}]"#,
    );
    let err = compile_template(&template, &Bindings::new()).unwrap_err();
    assert!(err.to_string().contains("not both"));
}
