//! # template-lint-rules
//!
//! Built-in lint rules for template-lint.
//!
//! ## Available Rules
//!
//! | Name | Description |
//! |------|-------------|
//! | `attribute-usage` | Requires or disallows attributes per element selector |
//! | `element-nesting` | Restricts which elements and text an element may contain |
//! | `no-duplicate-requires` | Flags `<require>` elements importing the same file twice |
//! | `no-invalid-bindings` | Flags binding expressions with invalid syntax |
//! | `require-view-resources` | Flags elements, value converters and binding behaviors that are not in scope, and unused requires |
//! | `html-custom-element-compat` | Flags custom element names that are invalid in HTML |
//!
//! ## Usage
//!
//! ```ignore
//! use template_lint_core::{Config, Project};
//!
//! let registry = template_lint_rules::registry();
//! let config = Config::load("template-lint.toml", &registry)?;
//! let project = Project::create(config, &registry).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod attribute_usage;
pub mod element_nesting;
pub mod html_custom_element_compat;
pub mod no_duplicate_requires;
pub mod no_invalid_bindings;
pub mod require_view_resources;

#[cfg(test)]
mod test_support;

pub use attribute_usage::AttributeUsage;
pub use element_nesting::ElementNesting;
pub use html_custom_element_compat::HtmlCustomElementCompat;
pub use no_duplicate_requires::NoDuplicateRequires;
pub use no_invalid_bindings::NoInvalidBindings;
pub use require_view_resources::RequireViewResources;

/// Re-export core types for convenience.
pub use template_lint_core::{Rule, RuleModule, RuleRegistry, Severity};

use serde::Serialize;
use template_lint_core::{RuleError, Settings};

/// All built-in rule modules in registration order.
pub const BUILTIN_RULES: &[RuleModule] = &[
    attribute_usage::MODULE,
    element_nesting::MODULE,
    no_duplicate_requires::MODULE,
    no_invalid_bindings::MODULE,
    require_view_resources::MODULE,
    html_custom_element_compat::MODULE,
];

/// Returns a registry holding every built-in rule.
#[must_use]
pub fn registry() -> RuleRegistry {
    RuleRegistry::new(BUILTIN_RULES.iter().copied())
}

/// Serializes typed settings back into raw settings.
fn to_settings<T: Serialize>(value: &T) -> Result<Settings, RuleError> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(settings) => Ok(settings),
        other => Err(RuleError::Failed(format!(
            "settings must be an object, got {other}"
        ))),
    }
}
