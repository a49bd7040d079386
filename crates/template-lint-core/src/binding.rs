//! Extraction of attribute bindings and `${...}` interpolations.

use crate::markup::{NodeKind, Tree};
use crate::types::Span;

/// Attribute name suffixes that make the attribute value a binding expression.
pub const BINDING_SUFFIXES: &[&str] = &["bind", "one-time", "two-way", "from-view", "to-view"];

/// All binding commands recognized after the last `.` of an attribute name.
pub const BINDING_COMMANDS: &[&str] = &[
    "bind", "one-time", "two-way", "from-view", "to-view", "one-way", "trigger", "delegate",
    "capture", "call", "for", "ref",
];

/// Where a binding was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// The whole value of an attribute such as `value.bind`.
    Attribute,
    /// A `${...}` interpolation in an attribute value or text.
    Interpolation,
}

/// One binding expression with its absolute source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Binding kind.
    pub kind: BindingKind,
    /// Expression source text.
    pub expression: String,
    /// Span of the expression in the template source.
    pub span: Span,
}

/// An attribute name split into its base name and binding command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeName<'a> {
    /// Name without the command, e.g. `value` for `value.bind`.
    pub name: &'a str,
    /// Binding command, if the name ends with a known one.
    pub command: Option<&'a str>,
}

/// Splits a known binding command off an attribute name.
#[must_use]
pub fn parse_attribute_name(attr: &str) -> AttributeName<'_> {
    match attr.rsplit_once('.') {
        Some((name, command)) if BINDING_COMMANDS.contains(&command) => AttributeName {
            name,
            command: Some(command),
        },
        _ => AttributeName {
            name: attr,
            command: None,
        },
    }
}

/// Returns true if the attribute value is a binding expression.
#[must_use]
pub fn is_binding_attribute(attr: &str) -> bool {
    attr.rsplit_once('.')
        .is_some_and(|(name, suffix)| !name.is_empty() && BINDING_SUFFIXES.contains(&suffix))
}

/// Scans `text` for `${...}` interpolations.
///
/// Braces inside quotes are not counted, a backslash skips the next
/// character and nested braces are tracked. Unterminated interpolations
/// are ignored. Spans are shifted by `base` and cover the inner expression.
#[must_use]
pub fn scan_interpolations(text: &str, base: usize) -> Vec<Binding> {
    let bytes = text.as_bytes();
    let mut bindings = Vec::new();
    let mut pos = 0;

    while let Some(found) = text.get(pos..).and_then(|rest| rest.find("${")) {
        pos += found + 2;
        let mut quote: Option<u8> = None;
        let mut open = 0usize;
        let mut i = pos;
        while i < bytes.len() {
            let b = bytes[i];
            match b {
                b'\'' | b'"' => match quote {
                    None => quote = Some(b),
                    Some(q) if q == b => quote = None,
                    Some(_) => {}
                },
                b'\\' => i += 1,
                b'{' if quote.is_none() => open += 1,
                b'}' if quote.is_none() => {
                    if open == 0 {
                        bindings.push(Binding {
                            kind: BindingKind::Interpolation,
                            expression: text[pos..i].to_string(),
                            span: Span::new(base + pos, base + i),
                        });
                        pos = i + 1;
                        break;
                    }
                    open -= 1;
                }
                _ => {}
            }
            i += 1;
        }
    }
    bindings
}

/// Collects every binding of a tree in document order.
#[must_use]
pub fn extract_bindings(tree: &Tree) -> Vec<Binding> {
    let mut bindings = Vec::new();
    tree.traverse_nodes(|_, node| match &node.kind {
        NodeKind::Element(data) => {
            for attr in &data.attrs {
                let Some(value_span) = attr.value_span else {
                    continue;
                };
                if is_binding_attribute(&attr.name) {
                    bindings.push(Binding {
                        kind: BindingKind::Attribute,
                        expression: attr.value.clone(),
                        span: value_span,
                    });
                } else {
                    bindings.extend(scan_interpolations(&attr.value, value_span.start));
                }
            }
        }
        NodeKind::Text { text, span } if !text.trim().is_empty() => {
            bindings.extend(scan_interpolations(text, span.start));
        }
        _ => {}
    });
    bindings
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_interpolation_skips_quoted_braces() {
        let text = r#"${a.b} text ${c ? '}' : "}"} end"#;
        let bindings = scan_interpolations(text, 0);
        let expressions: Vec<&str> = bindings.iter().map(|b| b.expression.as_str()).collect();
        assert_eq!(expressions, vec!["a.b", r#"c ? '}' : "}""#]);
        assert_eq!(bindings[0].span, Span::new(2, 5));
        assert_eq!(&text[bindings[1].span.end..], "} end");
    }

    #[test]
    fn test_interpolation_nested_braces_and_escapes() {
        let bindings = scan_interpolations(r"${ {a: {b: 1}} } ${'\'}'}", 10);
        let expressions: Vec<&str> = bindings.iter().map(|b| b.expression.as_str()).collect();
        assert_eq!(expressions, vec![" {a: {b: 1}} ", r"'\'}'"]);
        assert_eq!(bindings[0].span.start, 12);
    }

    #[test]
    fn test_unterminated_interpolation_is_ignored() {
        assert!(scan_interpolations("${open", 0).is_empty());
        assert!(scan_interpolations("no bindings", 0).is_empty());
    }

    #[test]
    fn test_parse_attribute_name() {
        assert_eq!(
            parse_attribute_name("value.bind"),
            AttributeName {
                name: "value",
                command: Some("bind")
            }
        );
        assert_eq!(
            parse_attribute_name("click.delegate").command,
            Some("delegate")
        );
        assert_eq!(parse_attribute_name("data.x").name, "data.x");
        assert_eq!(parse_attribute_name("title").command, None);
    }

    #[test]
    fn test_extract_bindings_from_tree() {
        let source = r#"<input value.bind="name | upper" title="Hi ${user}"><p>${count} items</p>"#;
        let tree = Tree::parse(source).unwrap();
        let bindings = extract_bindings(&tree);

        let found: Vec<(BindingKind, &str)> = bindings
            .iter()
            .map(|b| (b.kind, b.span.slice(source).unwrap()))
            .collect();
        assert_eq!(
            found,
            vec![
                (BindingKind::Attribute, "name | upper"),
                (BindingKind::Interpolation, "user"),
                (BindingKind::Interpolation, "count"),
            ]
        );
    }

    #[test]
    fn test_is_binding_attribute() {
        assert!(is_binding_attribute("value.two-way"));
        assert!(!is_binding_attribute("click.delegate"));
        assert!(!is_binding_attribute(".bind"));
        assert!(!is_binding_attribute("bind"));
    }
}
