//! Tables of resource names exposed by templates and their companion sources.

use crate::types::Span;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Kind of a view resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A custom element, used as a tag.
    Element,
    /// A value converter, used after `|` in a binding.
    ValueConverter,
    /// A binding behavior, used after `&` in a binding.
    BindingBehavior,
    /// A custom attribute.
    Attribute,
}

/// Names of resources in scope of a template, each with an optional
/// declared-at span pointing at the `<require>` that imported it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceNameTable {
    elements: IndexMap<String, Option<Span>>,
    value_converters: IndexMap<String, Option<Span>>,
    binding_behaviors: IndexMap<String, Option<Span>>,
    attributes: IndexMap<String, Option<Span>>,
}

impl ResourceNameTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, kind: ResourceKind) -> &IndexMap<String, Option<Span>> {
        match kind {
            ResourceKind::Element => &self.elements,
            ResourceKind::ValueConverter => &self.value_converters,
            ResourceKind::BindingBehavior => &self.binding_behaviors,
            ResourceKind::Attribute => &self.attributes,
        }
    }

    fn map_mut(&mut self, kind: ResourceKind) -> &mut IndexMap<String, Option<Span>> {
        match kind {
            ResourceKind::Element => &mut self.elements,
            ResourceKind::ValueConverter => &mut self.value_converters,
            ResourceKind::BindingBehavior => &mut self.binding_behaviors,
            ResourceKind::Attribute => &mut self.attributes,
        }
    }

    /// Adds a name of the given kind, normalizing it for that kind.
    pub fn add(&mut self, kind: ResourceKind, name: &str, declared_at: Option<Span>) {
        let name = match kind {
            ResourceKind::Element | ResourceKind::Attribute => to_dash_case(name),
            ResourceKind::ValueConverter | ResourceKind::BindingBehavior => {
                to_lower_camel_case(name)
            }
        };
        self.map_mut(kind).insert(name, declared_at);
    }

    /// Adds a custom element name.
    pub fn add_element(&mut self, name: &str, declared_at: Option<Span>) {
        self.add(ResourceKind::Element, name, declared_at);
    }

    /// Adds a value converter name.
    pub fn add_value_converter(&mut self, name: &str, declared_at: Option<Span>) {
        self.add(ResourceKind::ValueConverter, name, declared_at);
    }

    /// Adds a binding behavior name.
    pub fn add_binding_behavior(&mut self, name: &str, declared_at: Option<Span>) {
        self.add(ResourceKind::BindingBehavior, name, declared_at);
    }

    /// Adds a custom attribute name.
    pub fn add_attribute(&mut self, name: &str, declared_at: Option<Span>) {
        self.add(ResourceKind::Attribute, name, declared_at);
    }

    /// Unions `other` into this table.
    ///
    /// With `override_at`, every merged entry's declared-at span is replaced.
    pub fn merge(&mut self, other: &Self, override_at: Option<Span>) {
        for kind in ResourceKind::ALL {
            let target = self.map_mut(kind);
            for (name, declared_at) in other.map(kind) {
                target.insert(name.clone(), override_at.or(*declared_at));
            }
        }
    }

    /// Returns true if a (normalized) name of the given kind is in scope.
    #[must_use]
    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.map(kind).contains_key(name)
    }

    /// Returns the declared-at span of a name, `Some(None)` if the name is
    /// in scope without one.
    #[must_use]
    pub fn declared_at(&self, kind: ResourceKind, name: &str) -> Option<Option<Span>> {
        self.map(kind).get(name).copied()
    }

    /// Iterates over names of one kind in insertion order.
    pub fn names(&self, kind: ResourceKind) -> impl Iterator<Item = &str> {
        self.map(kind).keys().map(String::as_str)
    }

    /// Returns true if the table holds no names at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        ResourceKind::ALL.iter().all(|&kind| self.map(kind).is_empty())
    }

    /// Declared-at spans of every entry, keyed by start offset.
    #[must_use]
    pub fn requires(&self) -> BTreeMap<usize, Span> {
        ResourceKind::ALL
            .iter()
            .flat_map(|&kind| self.map(kind).values())
            .filter_map(|span| span.map(|span| (span.start, span)))
            .collect()
    }
}

impl ResourceKind {
    /// All kinds.
    pub const ALL: [Self; 4] = [
        Self::Element,
        Self::ValueConverter,
        Self::BindingBehavior,
        Self::Attribute,
    ];
}

/// Converts `MyElement`, `myElement` or `my_element` to `my-element`.
///
/// Runs of capitals stay together: `HTMLInput` becomes `html-input`.
#[must_use]
pub fn to_dash_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == ' ' || c == '-' {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 && !out.is_empty() && !out.ends_with('-') {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                out.push('-');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Converts `date-format`, `DateFormat` or `date_format` to `dateFormat`.
///
/// A leading run of capitals is kept as is (`JSONFormat` stays `JSONFormat`).
#[must_use]
pub fn to_lower_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '-' || c == '_' || c == ' ' || c == '.' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }

    let mut chars = out.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if first.is_uppercase() && second.is_uppercase() => out,
        (Some(first), _) => first.to_lowercase().chain(out.chars().skip(1)).collect(),
        (None, _) => out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dash_case() {
        assert_eq!(to_dash_case("FooBar"), "foo-bar");
        assert_eq!(to_dash_case("fooBar"), "foo-bar");
        assert_eq!(to_dash_case("foo-bar"), "foo-bar");
        assert_eq!(to_dash_case("foo_bar"), "foo-bar");
        assert_eq!(to_dash_case("HTMLInput"), "html-input");
        assert_eq!(to_dash_case("MyHTML"), "my-html");
        assert_eq!(to_dash_case("Item2Row"), "item2-row");
        assert_eq!(to_dash_case("app"), "app");
    }

    #[test]
    fn test_lower_camel_case() {
        assert_eq!(to_lower_camel_case("DateFormat"), "dateFormat");
        assert_eq!(to_lower_camel_case("date-format"), "dateFormat");
        assert_eq!(to_lower_camel_case("date_format"), "dateFormat");
        assert_eq!(to_lower_camel_case("dateFormat"), "dateFormat");
        assert_eq!(to_lower_camel_case("JSONFormat"), "JSONFormat");
        assert_eq!(to_lower_camel_case("Debounce"), "debounce");
    }

    #[test]
    fn test_add_normalizes_by_kind() {
        let mut table = ResourceNameTable::new();
        table.add_element("UserCard", None);
        table.add_value_converter("date-format", None);
        table.add_binding_behavior("Throttle", None);
        table.add_attribute("TooltipText", None);

        assert!(table.contains(ResourceKind::Element, "user-card"));
        assert!(table.contains(ResourceKind::ValueConverter, "dateFormat"));
        assert!(table.contains(ResourceKind::BindingBehavior, "throttle"));
        assert!(table.contains(ResourceKind::Attribute, "tooltip-text"));
        assert!(!table.contains(ResourceKind::Element, "UserCard"));
    }

    #[test]
    fn test_merge_with_override() {
        let mut source = ResourceNameTable::new();
        source.add_element("foo", Some(Span::new(1, 2)));
        source.add_value_converter("bar", None);

        let mut table = ResourceNameTable::new();
        table.merge(&source, None);
        assert_eq!(
            table.declared_at(ResourceKind::Element, "foo"),
            Some(Some(Span::new(1, 2)))
        );
        assert_eq!(table.declared_at(ResourceKind::ValueConverter, "bar"), Some(None));

        let at = Span::new(10, 20);
        table.merge(&source, Some(at));
        assert_eq!(table.declared_at(ResourceKind::Element, "foo"), Some(Some(at)));
        assert_eq!(table.declared_at(ResourceKind::ValueConverter, "bar"), Some(Some(at)));
        assert_eq!(table.declared_at(ResourceKind::Element, "missing"), None);
    }

    #[test]
    fn test_requires_keyed_by_start() {
        let mut table = ResourceNameTable::new();
        table.add_element("a", Some(Span::new(5, 9)));
        table.add_binding_behavior("b", Some(Span::new(5, 9)));
        table.add_attribute("c", Some(Span::new(30, 40)));
        table.add_value_converter("d", None);

        let requires = table.requires();
        assert_eq!(requires.len(), 2);
        assert_eq!(requires.get(&5), Some(&Span::new(5, 9)));
        assert_eq!(requires.get(&30), Some(&Span::new(30, 40)));
    }
}
