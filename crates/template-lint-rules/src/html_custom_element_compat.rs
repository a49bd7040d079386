//! Rule flagging custom element names that HTML does not accept.
//!
//! Only elements known as custom elements in the template's scope are
//! checked. The accepted character set is a simplified one that excludes
//! non-ASCII characters.

use regex::Regex;
use std::sync::LazyLock;
use template_lint_core::{
    ResourceKind, Rule, RuleBox, RuleContext, RuleDiagnostic, RuleError, RuleModule,
};

/// Rule name for html-custom-element-compat.
pub const NAME: &str = "html-custom-element-compat";

const DESCRIPTION: &str = "Flags custom element names that are invalid in HTML";

/// Registry entry for html-custom-element-compat.
pub const MODULE: RuleModule = RuleModule {
    name: NAME,
    description: DESCRIPTION,
    create,
    merge_config: None,
};

const DETAILS: &str = "See https://html.spec.whatwg.org/#valid-custom-element-name";

/// Names that match the custom element pattern but are reserved by SVG and MathML.
const RESERVED_NAMES: &[&str] = &[
    "annotation-xml",
    "color-profile",
    "font-face",
    "font-face-src",
    "font-face-uri",
    "font-face-format",
    "font-face-name",
    "missing-glyph",
];

static CUSTOM_ELEMENT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][-.0-9_a-z]*-[-.0-9_a-z]*$")
        .unwrap_or_else(|e| unreachable!("custom element pattern is valid: {e}"))
});

fn create() -> RuleBox {
    Box::new(HtmlCustomElementCompat)
}

/// Flags in-scope custom elements whose names are invalid or reserved in HTML.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlCustomElementCompat;

impl Rule for HtmlCustomElementCompat {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    fn evaluate(&self, ctx: &mut RuleContext<'_>) -> Result<(), RuleError> {
        let file = ctx.file();
        let names = file.resource_names();
        file.traverse_elements(|element| {
            let tag = element.name();
            if !names.contains(ResourceKind::Element, tag) {
                return true;
            }
            let message = if !CUSTOM_ELEMENT_NAME.is_match(tag) {
                format!("{tag:?} is not a valid html custom element name.")
            } else if RESERVED_NAMES.contains(&tag) {
                format!("{tag:?} is a reserved html custom element name.")
            } else {
                return true;
            };
            ctx.emit(
                RuleDiagnostic::new(message, element.data().start_tag).with_details(DETAILS),
            );
            true
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{evaluate, located, StaticResolver};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_invalid_and_reserved_names() {
        let resolver = StaticResolver::new().file("elements", |names| {
            names.add_element("Panel", None);
            names.add_element("FontFace", None);
            names.add_element("UserCard", None);
        });
        let source = r#"<template>
<require from="./elements"></require>
<panel></panel>
<font-face></font-face>
<user-card></user-card>
<div></div>
</template>"#;
        let diagnostics = evaluate(&HtmlCustomElementCompat, &resolver, source).await;

        assert_eq!(
            located(source, &diagnostics),
            vec![
                (
                    r#""panel" is not a valid html custom element name."#.to_string(),
                    "<panel>".to_string()
                ),
                (
                    r#""font-face" is a reserved html custom element name."#.to_string(),
                    "<font-face>".to_string()
                ),
            ]
        );
        assert!(diagnostics.iter().all(|d| d.details.as_deref() == Some(DETAILS)));
    }

    #[tokio::test]
    async fn test_unknown_elements_are_skipped() {
        let source = "<panel></panel><font-face></font-face>";
        assert!(evaluate(&HtmlCustomElementCompat, &StaticResolver::new(), source)
            .await
            .is_empty());
    }

    #[test]
    fn test_name_pattern() {
        for valid in ["a-b", "x-1.2_3", "my-", "font-face-x"] {
            assert!(CUSTOM_ELEMENT_NAME.is_match(valid), "{valid}");
        }
        for invalid in ["ab", "-ab", "1a-b", "a-B", "ä-b"] {
            assert!(!CUSTOM_ELEMENT_NAME.is_match(invalid), "{invalid}");
        }
    }
}
