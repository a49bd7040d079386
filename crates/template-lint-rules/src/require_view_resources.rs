//! Rule checking that view resources used by a template are in scope.
//!
//! Every element must either be a custom element in scope or be ignored.
//! Value converters and binding behaviors in attribute bindings and
//! interpolations must be in scope unless ignored. `<require>` elements
//! none of whose names are used are reported as unused.
//!
//! Built-in template elements (`template`, `require`, `let`, `slot`,
//! `compose`) are always ignored, as are the `throttle`, `debounce`,
//! `updateTrigger`, `signal`, `oneTime` and `self` binding behaviors.
//!
//! ```toml
//! [rules.require-view-resources]
//! ignoreElements = ["div", "span", "form/input"]
//! ignoreValueConverters = ["json"]
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use template_lint_core::binding::{is_binding_attribute, parse_attribute_name};
use template_lint_core::{
    parse_settings, BindingKind, Config, Expression, MergeContext, ResourceKind,
    ResourceNameTable, Rule, RuleBox, RuleContext, RuleDiagnostic, RuleError, RuleModule,
    SelectorSet, Settings, Span, WrapperKind,
};
use tracing::debug;

/// Rule name for require-view-resources.
pub const NAME: &str = "require-view-resources";

const DESCRIPTION: &str =
    "Flags elements, value converters and binding behaviors that are not in scope, and unused requires";

/// Elements provided by the template engine itself.
pub const BUILTIN_ELEMENTS: &[&str] = &["template", "require", "let", "slot", "compose"];

/// Binding behaviors provided by the template engine itself.
pub const BUILTIN_BINDING_BEHAVIORS: &[&str] =
    &["throttle", "debounce", "updateTrigger", "signal", "oneTime", "self"];

/// Registry entry for require-view-resources.
pub const MODULE: RuleModule = RuleModule {
    name: NAME,
    description: DESCRIPTION,
    create,
    merge_config: Some(merge_config),
};

/// Settings of require-view-resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequireViewResourcesConfig {
    /// Element selectors that need no require.
    #[serde(default)]
    pub ignore_elements: Vec<String>,
    /// Value converter names that need no require.
    #[serde(default)]
    pub ignore_value_converters: Vec<String>,
    /// Binding behavior names that need no require.
    #[serde(default)]
    pub ignore_binding_behaviors: Vec<String>,
}

fn create() -> RuleBox {
    Box::new(RequireViewResources::new())
}

/// Concatenates the ignore lists of the local settings and all parents.
///
/// # Errors
///
/// Returns an error if any settings do not match [`RequireViewResourcesConfig`].
pub fn merge_config(ctx: MergeContext<'_>) -> Result<Settings, RuleError> {
    let mut config: RequireViewResourcesConfig = parse_settings(&ctx.settings)?;
    for parent in ctx.parents {
        let parent: RequireViewResourcesConfig = parse_settings(parent)?;
        config.ignore_elements.extend(parent.ignore_elements);
        config
            .ignore_value_converters
            .extend(parent.ignore_value_converters);
        config
            .ignore_binding_behaviors
            .extend(parent.ignore_binding_behaviors);
    }
    crate::to_settings(&config)
}

/// Checks that used view resources are in scope and required resources are used.
#[derive(Debug)]
pub struct RequireViewResources {
    ignore_elements: SelectorSet,
    ignore_value_converters: HashSet<String>,
    ignore_binding_behaviors: HashSet<String>,
}

impl Default for RequireViewResources {
    fn default() -> Self {
        Self::new()
    }
}

impl RequireViewResources {
    /// Creates a rule ignoring only the built-in elements and behaviors.
    #[must_use]
    pub fn new() -> Self {
        let mut ignore_elements = SelectorSet::new();
        ignore_elements.extend(BUILTIN_ELEMENTS);
        Self {
            ignore_elements,
            ignore_value_converters: HashSet::new(),
            ignore_binding_behaviors: BUILTIN_BINDING_BEHAVIORS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Tracks requires whose names have not been used yet.
struct Usage<'a> {
    names: &'a ResourceNameTable,
    unused: BTreeMap<usize, Span>,
}

impl Usage<'_> {
    /// Marks a name as used, returning false if it is not in scope.
    fn use_name(&mut self, kind: ResourceKind, name: &str) -> bool {
        match self.names.declared_at(kind, name) {
            Some(declared_at) => {
                if let Some(span) = declared_at {
                    self.unused.remove(&span.start);
                }
                true
            }
            None => false,
        }
    }
}

impl RequireViewResources {
    /// Checks the converters and behaviors of one binding expression.
    ///
    /// Expressions that do not parse are left to `no-invalid-bindings`.
    fn check_expression(
        &self,
        expression: &str,
        span: Span,
        usage: &mut Usage<'_>,
        ctx: &mut RuleContext<'_>,
    ) {
        let expression = match Expression::parse(expression) {
            Ok(expression) => expression,
            Err(e) => {
                debug!(error = %e, "Skipping unparsable binding expression");
                return;
            }
        };
        for (kind, name) in expression.wrappers() {
            let (resource, ignored, label) = match kind {
                WrapperKind::BindingBehavior => (
                    ResourceKind::BindingBehavior,
                    &self.ignore_binding_behaviors,
                    "binding behavior",
                ),
                WrapperKind::ValueConverter => (
                    ResourceKind::ValueConverter,
                    &self.ignore_value_converters,
                    "value converter",
                ),
            };
            if !usage.use_name(resource, name) && !ignored.contains(name) {
                ctx.emit(RuleDiagnostic::new(
                    format!("Missing require for {label}: {name:?}"),
                    span,
                ));
            }
        }
    }
}

#[async_trait]
impl Rule for RequireViewResources {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    async fn configure(&mut self, settings: &Settings, _config: &Config) -> Result<(), RuleError> {
        let config: RequireViewResourcesConfig = parse_settings(settings)?;
        self.ignore_elements.extend(&config.ignore_elements);
        self.ignore_value_converters
            .extend(config.ignore_value_converters);
        self.ignore_binding_behaviors
            .extend(config.ignore_binding_behaviors);
        Ok(())
    }

    fn evaluate(&self, ctx: &mut RuleContext<'_>) -> Result<(), RuleError> {
        let file = ctx.file();
        let names = file.resource_names();
        let mut usage = Usage {
            names,
            unused: names.requires(),
        };

        file.traverse_elements(|element| {
            for attr in &element.data().attrs {
                if is_binding_attribute(&attr.name) {
                    let span = attr.value_span.unwrap_or(attr.span);
                    self.check_expression(&attr.value, span, &mut usage, ctx);
                }
                usage.use_name(ResourceKind::Attribute, parse_attribute_name(&attr.name).name);
            }

            if self.ignore_elements.matches(&element) {
                return true;
            }
            if !usage.use_name(ResourceKind::Element, element.name()) {
                ctx.emit(RuleDiagnostic::new(
                    format!(
                        "Element is not allowed or a <require> is missing: {:?}.",
                        element.name()
                    ),
                    element.data().start_tag,
                ));
            }
            true
        });

        for binding in file.bindings() {
            if binding.kind == BindingKind::Interpolation {
                self.check_expression(&binding.expression, binding.span, &mut usage, ctx);
            }
        }

        for span in usage.unused.into_values() {
            ctx.emit(RuleDiagnostic::new("Unused <require> element", span));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{configured, evaluate, located, StaticResolver};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::Path;

    fn pair(message: &str, text: &str) -> (String, String) {
        (message.to_string(), text.to_string())
    }

    fn resolver() -> StaticResolver {
        StaticResolver::new()
            .file("test", |names| {
                names.add_element("imported-element", None);
                names.add_value_converter("importedValueConverter", None);
                names.add_binding_behavior("importedBindingBehavior", None);
            })
            .file("unused", |names| names.add_element("never-used", None))
            .file("tooltip", |names| names.add_attribute("tooltip", None))
    }

    #[tokio::test]
    async fn test_missing_resources() {
        let rule = configured(
            MODULE,
            json!({
                "ignoreElements": ["ignored-element"],
                "ignoreValueConverters": ["ignoredValueConverter"],
                "ignoreBindingBehaviors": ["ignoredBindingBehavior"]
            }),
        )
        .await;
        let source = r#"<template>
  <require from="./test"></require>
  <unknown-element></unknown-element>
  <ignored-element value.bind="test | unknownValueConverter"></ignored-element>
  <ignored-element value.bind="test & unknownBindingBehavior"></ignored-element>
  <ignored-element value.bind="test | ignoredValueConverter"></ignored-element>
  <ignored-element value.bind="test & ignoredBindingBehavior & debounce:200"></ignored-element>
  <imported-element></imported-element>
  <imported-element value.bind="test | importedValueConverter"></imported-element>
  <imported-element value.bind="test & importedBindingBehavior"></imported-element>
</template>"#;
        let diagnostics = evaluate(rule.as_ref(), &resolver(), source).await;

        assert_eq!(
            located(source, &diagnostics),
            vec![
                pair(
                    r#"Element is not allowed or a <require> is missing: "unknown-element"."#,
                    "<unknown-element>"
                ),
                pair(
                    r#"Missing require for value converter: "unknownValueConverter""#,
                    "test | unknownValueConverter"
                ),
                pair(
                    r#"Missing require for binding behavior: "unknownBindingBehavior""#,
                    "test & unknownBindingBehavior"
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_unused_requires_and_interpolations() {
        let rule = configured(MODULE, json!({ "ignoreElements": ["p", "div"] })).await;
        let source = r#"<template>
  <require from="./test"></require>
  <require from="./unused"></require>
  <require from="./tooltip"></require>
  <p>${value | importedValueConverter} ${value | other}</p>
  <div title="${a & missing}" tooltip.bind="hint"></div>
  <p>${broken | }</p>
</template>"#;
        let diagnostics = evaluate(rule.as_ref(), &resolver(), source).await;

        assert_eq!(
            located(source, &diagnostics),
            vec![
                pair(r#"Missing require for value converter: "other""#, "value | other"),
                pair(r#"Missing require for binding behavior: "missing""#, "a & missing"),
                pair("Unused <require> element", r#"from="./unused""#),
            ]
        );
    }

    #[tokio::test]
    async fn test_nested_ignore_selectors() {
        let rule = configured(MODULE, json!({ "ignoreElements": ["form", "form/input"] })).await;
        let source = "<form><input></form><input>";
        let diagnostics = evaluate(rule.as_ref(), &StaticResolver::new(), source).await;

        assert_eq!(
            located(source, &diagnostics),
            vec![pair(
                r#"Element is not allowed or a <require> is missing: "input"."#,
                "<input>"
            )]
        );
        assert_eq!(diagnostics[0].position.unwrap().start, source.rfind("<input>").unwrap());
    }

    #[test]
    fn test_merge_concatenates_ignore_lists() {
        let settings = json!({ "ignoreElements": ["a"] });
        let parents = vec![json!({ "ignoreElements": ["b"], "ignoreValueConverters": ["c"] })
            .as_object()
            .cloned()
            .unwrap()];
        let merged = merge_config(MergeContext {
            settings: settings.as_object().cloned().unwrap(),
            parents: &parents,
            context: Path::new("/app"),
            is_root: true,
        })
        .unwrap();

        assert_eq!(
            serde_json::Value::Object(merged),
            json!({
                "ignoreElements": ["a", "b"],
                "ignoreValueConverters": ["c"],
                "ignoreBindingBehaviors": []
            })
        );
    }
}
