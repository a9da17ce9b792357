// Template rendering engine using Tera

use super::builtin::get_builtin_template;
use serde::Serialize;
use tera::{Context, Tera};

/// Render a built-in template with the given context.
///
/// Autoescaping is disabled: the output is a prompt, not HTML.
pub fn render_builtin<C: Serialize>(name: &str, context: &C) -> Result<String, String> {
    let template =
        get_builtin_template(name).ok_or_else(|| format!("Unknown template: {}", name))?;
    render_str(template, context)
}

/// Render an arbitrary template string
pub fn render_str<C: Serialize>(template: &str, context: &C) -> Result<String, String> {
    let ctx = Context::from_serialize(context)
        .map_err(|e| format!("Failed to build template context: {}", e))?;
    Tera::one_off(template, &ctx, false).map_err(|e| format!("Failed to render template: {}", e))
}
