//! Rule restricting which elements and text an element may contain.
//!
//! Elements can be grouped into categories which `allow` and `disallow`
//! lists reference as `@category`. An element with an `allow` list only
//! accepts the listed children; otherwise `disallow` names the rejected
//! ones. `<template>` and `<slot>` children are transparent, and `<let>`
//! plus every selector in `ignore` are never checked.
//!
//! ```toml
//! [rules.element-nesting.elements.div]
//! categories = ["flow"]
//!
//! [rules.element-nesting.elements.ul]
//! allow = ["li"]
//! allowText = false
//! ```

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use template_lint_core::markup::{Element, NodeId, NodeKind};
use template_lint_core::selector::selector_tag_name;
use template_lint_core::{
    parse_settings, Config, MergeContext, Rule, RuleBox, RuleContext, RuleDiagnostic, RuleError,
    RuleModule, SelectorMap, SelectorSet, Settings,
};
use tracing::warn;

/// Rule name for element-nesting.
pub const NAME: &str = "element-nesting";

const DESCRIPTION: &str = "Restricts which elements and text an element may contain";

/// Registry entry for element-nesting.
pub const MODULE: RuleModule = RuleModule {
    name: NAME,
    description: DESCRIPTION,
    create,
    merge_config: Some(merge_config),
};

/// Settings of element-nesting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementNestingConfig {
    /// Nesting settings keyed by element selector.
    #[serde(default)]
    pub elements: IndexMap<String, NestingConfig>,
    /// Selectors of children that are never checked.
    #[serde(default)]
    pub ignore: Vec<String>,
}

/// Nesting settings of one selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestingConfig {
    /// Categories the selected element belongs to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Only these children are accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<String>>,
    /// These children are rejected when there is no `allow` list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disallow: Option<Vec<String>>,
    /// Whether non-whitespace text is accepted. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_text: Option<bool>,
}

fn create() -> RuleBox {
    Box::new(ElementNesting::new())
}

/// Appends parent lists and inherits `allowText` when it is not set locally.
///
/// # Errors
///
/// Returns an error if any settings do not match [`ElementNestingConfig`].
pub fn merge_config(ctx: MergeContext<'_>) -> Result<Settings, RuleError> {
    let mut config: ElementNestingConfig = parse_settings(&ctx.settings)?;
    for parent in ctx.parents {
        let parent: ElementNestingConfig = parse_settings(parent)?;
        for (selector, inherited) in parent.elements {
            let element = config.elements.entry(selector).or_default();
            element.categories.extend(inherited.categories);
            if let Some(allow) = inherited.allow {
                element.allow.get_or_insert_with(Vec::new).extend(allow);
            }
            if let Some(disallow) = inherited.disallow {
                element.disallow.get_or_insert_with(Vec::new).extend(disallow);
            }
            if element.allow_text.is_none() {
                element.allow_text = inherited.allow_text;
            }
        }
        config.ignore.extend(parent.ignore);
    }
    crate::to_settings(&config)
}

#[derive(Debug, Clone)]
struct NestingRule {
    allow: Option<HashSet<String>>,
    disallow: Option<HashSet<String>>,
    allow_text: bool,
}

impl NestingRule {
    fn denies(&self, tag_name: &str) -> bool {
        match (&self.allow, &self.disallow) {
            (Some(allow), _) => !allow.contains(tag_name),
            (None, Some(disallow)) => disallow.contains(tag_name),
            (None, None) => false,
        }
    }
}

/// Restricts which elements and text an element may contain.
#[derive(Debug, Default)]
pub struct ElementNesting {
    elements: SelectorMap<NestingRule>,
    ignore: SelectorSet,
}

impl ElementNesting {
    /// Creates an unconfigured rule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check_children(
        &self,
        parent: Element<'_>,
        rule: &NestingRule,
        children: &[NodeId],
        ctx: &mut RuleContext<'_>,
    ) {
        let tree = parent.tree();
        for &id in children {
            match &tree.node(id).kind {
                NodeKind::Element(_) => {
                    let Some(child) = tree.element(id) else {
                        continue;
                    };
                    if child.name() == "template" || child.name() == "slot" {
                        if !self.ignore.matches(&child) {
                            self.check_children(parent, rule, child.child_nodes(), ctx);
                        }
                        continue;
                    }
                    if self.ignore.matches(&child) {
                        continue;
                    }
                    if rule.denies(child.name()) {
                        ctx.emit(RuleDiagnostic::new(
                            format!(
                                "{:?} element is not allowed in {:?}.",
                                child.name(),
                                parent.name()
                            ),
                            child.data().start_tag,
                        ));
                    }
                }
                NodeKind::Text { text, span } if !rule.allow_text && !text.trim().is_empty() => {
                    ctx.emit(RuleDiagnostic::new(
                        "Text content is not allowed in this element.",
                        *span,
                    ));
                }
                _ => {}
            }
        }
    }
}

/// Expands `@category` references into tag names.
fn expand(
    names: Option<Vec<String>>,
    categories: &HashMap<String, Vec<String>>,
) -> Option<HashSet<String>> {
    let names = names?;
    let mut set = HashSet::new();
    for name in names {
        match name.strip_prefix('@') {
            Some(category) => {
                if let Some(tags) = categories.get(category) {
                    set.extend(tags.iter().cloned());
                } else {
                    warn!(category, "Unknown element category has no members");
                }
            }
            None => {
                set.insert(name);
            }
        }
    }
    Some(set)
}

#[async_trait]
impl Rule for ElementNesting {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    async fn configure(&mut self, settings: &Settings, _config: &Config) -> Result<(), RuleError> {
        let config: ElementNestingConfig = parse_settings(settings)?;

        let mut categories: HashMap<String, Vec<String>> = HashMap::new();
        for (selector, element) in &config.elements {
            for category in &element.categories {
                categories
                    .entry(category.clone())
                    .or_default()
                    .push(selector_tag_name(selector).to_string());
            }
        }

        for (selector, element) in config.elements {
            self.elements.insert(
                &selector,
                NestingRule {
                    allow: expand(element.allow, &categories),
                    disallow: expand(element.disallow, &categories),
                    allow_text: element.allow_text.unwrap_or(true),
                },
            );
        }

        self.ignore.insert("let");
        self.ignore.extend(&config.ignore);
        Ok(())
    }

    fn evaluate(&self, ctx: &mut RuleContext<'_>) -> Result<(), RuleError> {
        if self.elements.is_empty() {
            return Ok(());
        }
        let file = ctx.file();
        file.traverse_elements(|element| {
            if let Some(rule) = self.elements.get(&element) {
                self.check_children(element, rule, element.child_nodes(), ctx);
            }
            true
        });
        Ok(())
    }
}
