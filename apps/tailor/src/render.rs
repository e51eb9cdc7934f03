//! LaTeX template rendering through minijinja.
//!
//! Undefined variables are errors, so a context missing a key fails the export instead
//! of producing a half-empty document. Output is never escaped.

use std::path::Path;

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;

use crate::errors::AppError;

pub fn render_template_str<S: Serialize>(source: &str, context: S) -> Result<String, AppError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_keep_trailing_newline(true);
    let template = env.template_from_str(source)?;
    Ok(template.render(context)?)
}

/// Renders the template at `path`. A missing file is `NotFound` carrying `role`.
pub fn render_template_file<S: Serialize>(
    path: &Path,
    role: &str,
    context: S,
) -> Result<String, AppError> {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(role.to_string()));
        }
        Err(e) => return Err(AppError::Io(e)),
    };
    render_template_str(&source, context)
}
