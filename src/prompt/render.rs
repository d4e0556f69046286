//! Prompt Renderer - Render templates with context variables using Handlebars

use handlebars::Handlebars;
use serde::Serialize;

use super::templates::BUILTIN;
use crate::error::{Result, TelosError};

/// Renders prompt templates using Handlebars templating
pub struct PromptRenderer {
    handlebars: Handlebars<'static>,
}

impl PromptRenderer {
    /// Renderer with the built-in templates registered
    pub fn new() -> Result<Self> {
        let mut renderer = Self::empty();
        for (name, template) in BUILTIN {
            renderer.register_template(name, template)?;
        }
        Ok(renderer)
    }

    fn empty() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        // Prompts are markdown, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    /// Render a template string with any serializable context
    pub fn render_template<T: Serialize>(&self, template: &str, context: &T) -> Result<String> {
        self.handlebars
            .render_template(template, context)
            .map_err(|e| TelosError::Template(format!("Failed to render template: {}", e)))
    }

    /// Register a named template, replacing any existing one
    pub fn register_template(&mut self, name: &str, template: &str) -> Result<()> {
        self.handlebars
            .register_template_string(name, template)
            .map_err(|e| TelosError::Template(format!("Failed to register template '{}': {}", name, e)))
    }

    /// Render a previously registered template
    pub fn render<T: Serialize>(&self, name: &str, context: &T) -> Result<String> {
        self.handlebars
            .render(name, context)
            .map_err(|e| TelosError::Template(format!("Failed to render template '{}': {}", name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::templates::{DELEGATION, PLAN, PRDS, REVIEW};
    use serde_json::json;

    #[test]
    fn test_builtins_registered() {
        let renderer = PromptRenderer::new().unwrap();
        for name in [DELEGATION, REVIEW, PLAN, PRDS] {
            assert!(renderer.render(name, &json!({})).is_ok(), "{}", name);
        }
        assert!(matches!(
            PromptRenderer::empty().render(DELEGATION, &json!({})),
            Err(TelosError::Template(_))
        ));
    }

    #[test]
    fn test_no_html_escape() {
        let renderer = PromptRenderer::empty();
        let out = renderer
            .render_template("Marker: {{m}}", &json!({"m": "<promise>COMPLETE</promise>"}))
            .unwrap();
        assert_eq!(out, "Marker: <promise>COMPLETE</promise>");
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let renderer = PromptRenderer::empty();
        assert_eq!(renderer.render_template("Hello, {{name}}!", &json!({})).unwrap(), "Hello, !");
    }

    #[test]
    fn test_delegation_optional_sections() {
        let renderer = PromptRenderer::new().unwrap();
        let base = json!({
            "task": "Add login form",
            "item_ref": "01-auth.md item 2",
            "identity": "coder",
            "excerpt": "# Auth",
            "criteria": [{"number": 1, "text": "Add login form"}],
            "self_verify": true,
        });
        let plain = renderer.render(DELEGATION, &base).unwrap();
        assert!(plain.contains("1. Add login form"));
        assert!(plain.contains("run the tests, linter and type checker"));
        assert!(!plain.contains("Previous attempt was denied"));
        assert!(!plain.contains("ESCALATION"));

        let mut retry = base.clone();
        retry["prior_denial"] = json!("> form has no submit button");
        let retried = renderer.render(DELEGATION, &retry).unwrap();
        assert!(retried.contains("Previous attempt was denied"));
        assert!(retried.contains("> form has no submit button"));
    }

    #[test]
    fn test_bad_template_is_template_error() {
        let mut renderer = PromptRenderer::empty();
        assert!(matches!(
            renderer.register_template("broken", "{{#if x}}"),
            Err(TelosError::Template(_))
        ));
    }
}
