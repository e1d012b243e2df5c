//! Output formatting for compiled templates.

use reactive_compiler::CompiledTemplate;

use crate::cli::OutputFormat;

/// Render the compiled template in the requested format.
pub fn render(compiled: &CompiledTemplate, format: OutputFormat) -> String {
    match format {
        OutputFormat::Page => compiled.render_page(),
        OutputFormat::Html => compiled.html.clone(),
        OutputFormat::Script => compiled.script(),
        OutputFormat::Json => serde_json::json!({
            "html": compiled.html,
            "script": compiled.script(),
        })
        .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reactive_compiler::{compile_template, Bindings, TemplateNode};

    fn compiled() -> CompiledTemplate {
        let template: Vec<TemplateNode> =
            serde_json::from_str(r#"[{"kind": "text", "text": "hi"}]"#).unwrap();
        compile_template(&template, &Bindings::new()).unwrap()
    }

    #[test]
    fn test_html_format() {
        assert_eq!(render(&compiled(), OutputFormat::Html), "hi");
    }

    #[test]
    fn test_page_wraps_script() {
        let page = render(&compiled(), OutputFormat::Page);
        assert!(page.starts_with("hi<script>\n"));
        assert!(page.ends_with("\n</script>"));
    }

    #[test]
    fn test_json_format() {
        let out = render(&compiled(), OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["html"], "hi");
        assert!(parsed["script"]
            .as_str()
            .unwrap()
            .contains("__reactive_data"));
    }
}
