// ABOUTME: Instruction template rendering over the per-run Vars data.
// ABOUTME: Missing variables render empty; syntax errors are fatal config errors.

use handlebars::Handlebars;
use serde_json::Value;

use crate::error::SwarmError;

/// Render an instruction template against the template data.
pub fn render(template: &str, data: &Value) -> Result<String, SwarmError> {
    if template.is_empty() {
        return Ok(String::new());
    }
    let mut registry = Handlebars::new();
    registry.set_strict_mode(false);
    registry
        .render_template(template, data)
        .map_err(|e| SwarmError::Config(format!("instruction template error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn variables_expand_from_data() {
        let data = json!({"user": "sam", "os": "linux", "input": "2+2?"});
        let out = render("You are helping {{user}} on {{os}}.", &data).unwrap();
        assert_eq!(out, "You are helping sam on linux.");
    }

    #[test]
    fn missing_variables_render_empty() {
        let out = render("hello {{nobody}}!", &json!({})).unwrap();
        assert_eq!(out, "hello !");
    }

    #[test]
    fn syntax_errors_are_fatal() {
        let err = render("{{#if}}broken", &json!({})).unwrap_err();
        assert!(matches!(err, SwarmError::Config(_)));
        assert!(err.to_string().contains("template"));
    }

    #[test]
    fn empty_template_renders_empty() {
        assert_eq!(render("", &json!({})).unwrap(), "");
    }

    #[test]
    fn nested_extra_values_are_reachable() {
        let data = json!({"schema": {"tables": "users, posts"}});
        let out = render("Tables: {{schema.tables}}", &data).unwrap();
        assert_eq!(out, "Tables: users, posts");
    }
}
