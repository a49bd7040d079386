//! Rule requiring or disallowing attributes on selected elements.
//!
//! # Configuration
//!
//! ```toml
//! [rules.attribute-usage.elements.img]
//! require = ["alt"]
//!
//! [rules.attribute-usage.elements."nav/a"]
//! disallow = ["target"]
//! ```
//!
//! Binding commands are ignored when comparing names, so `alt.bind`
//! satisfies a required `alt`. Lists inherited through `extends` are
//! appended to the local lists.

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use template_lint_core::binding::parse_attribute_name;
use template_lint_core::{
    parse_settings, Config, MergeContext, Rule, RuleBox, RuleContext, RuleDiagnostic, RuleError,
    RuleModule, SelectorMap, Settings,
};

/// Rule name for attribute-usage.
pub const NAME: &str = "attribute-usage";

const DESCRIPTION: &str = "Requires or disallows attributes per element selector";

/// Registry entry for attribute-usage.
pub const MODULE: RuleModule = RuleModule {
    name: NAME,
    description: DESCRIPTION,
    create,
    merge_config: Some(merge_config),
};

/// Settings of attribute-usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeUsageConfig {
    /// Attribute lists keyed by element selector.
    #[serde(default)]
    pub elements: IndexMap<String, ElementAttributes>,
}

/// Attribute lists of one selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementAttributes {
    /// Attributes that must be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub require: Vec<String>,
    /// Attributes that must not be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disallow: Vec<String>,
}

fn create() -> RuleBox {
    Box::new(AttributeUsage::new())
}

/// Appends the `require` and `disallow` lists of parents to the local ones.
///
/// # Errors
///
/// Returns an error if any settings do not match [`AttributeUsageConfig`].
pub fn merge_config(ctx: MergeContext<'_>) -> Result<Settings, RuleError> {
    let mut config: AttributeUsageConfig = parse_settings(&ctx.settings)?;
    for parent in ctx.parents {
        let parent: AttributeUsageConfig = parse_settings(parent)?;
        for (selector, attributes) in parent.elements {
            let element = config.elements.entry(selector).or_default();
            element.require.extend(attributes.require);
            element.disallow.extend(attributes.disallow);
        }
    }
    crate::to_settings(&config)
}

#[derive(Debug, Clone, Default)]
struct ElementRule {
    require: IndexSet<String>,
    disallow: HashSet<String>,
}

/// Requires or disallows attributes on selected elements.
#[derive(Debug, Default)]
pub struct AttributeUsage {
    elements: SelectorMap<ElementRule>,
}

impl AttributeUsage {
    /// Creates an unconfigured rule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Rule for AttributeUsage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    async fn configure(&mut self, settings: &Settings, _config: &Config) -> Result<(), RuleError> {
        let config: AttributeUsageConfig = parse_settings(settings)?;
        for (selector, attributes) in config.elements {
            self.elements.insert(
                &selector,
                ElementRule {
                    require: attributes.require.into_iter().collect(),
                    disallow: attributes.disallow.into_iter().collect(),
                },
            );
        }
        Ok(())
    }

    fn evaluate(&self, ctx: &mut RuleContext<'_>) -> Result<(), RuleError> {
        if self.elements.is_empty() {
            return Ok(());
        }
        let file = ctx.file();
        file.traverse_elements(|element| {
            let Some(rule) = self.elements.get(&element) else {
                return true;
            };

            let mut missing = rule.require.clone();
            for attr in &element.data().attrs {
                let name = parse_attribute_name(&attr.name).name;
                missing.shift_remove(name);
                if rule.disallow.contains(name) {
                    ctx.emit(RuleDiagnostic::new(
                        format!("Attribute {name:?} is not allowed for this element."),
                        attr.span,
                    ));
                }
            }

            if !missing.is_empty() {
                let names: Vec<String> = missing.iter().map(|name| format!("{name:?}")).collect();
                ctx.emit(RuleDiagnostic::new(
                    format!("Attribute(s) {} are missing.", names.join(", ")),
                    element.data().start_tag,
                ));
            }
            true
        });
        Ok(())
    }
}
