//! Hierarchical tag-name selectors.
//!
//! A selector such as `"table/tr/td"` names an element `td` whose parent
//! element is `tr` whose parent element is `table`. Ancestors must be
//! contiguous; `"table/td"` never matches a `td` nested inside a `tr`.
//!
//! Matching starts at the element and climbs parent elements only while some
//! registered selector still ends with the accumulated path, so the cost is
//! bounded by the longest registered chain rather than the tree depth.

use std::collections::{HashMap, HashSet};

/// An element that can be matched against selectors.
pub trait SelectorTarget: Sized {
    /// Lower-case tag name of this element.
    fn tag_name(&self) -> &str;

    /// The parent element, or `None` if the parent is not an element.
    fn parent_element(&self) -> Option<Self>;
}

/// Returns the tag name a selector applies to (its last segment).
#[must_use]
pub fn selector_tag_name(selector: &str) -> &str {
    selector.rsplit('/').next().unwrap_or(selector)
}

/// Registry mapping selectors to values.
#[derive(Debug, Clone)]
pub struct SelectorMap<T> {
    selectors: HashMap<String, T>,
    continuations: HashSet<String>,
}

impl<T> Default for SelectorMap<T> {
    fn default() -> Self {
        Self {
            selectors: HashMap::new(),
            continuations: HashSet::new(),
        }
    }
}

impl<T> SelectorMap<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a selector, replacing any previous value for it.
    pub fn insert(&mut self, selector: &str, value: T) {
        let parts: Vec<&str> = selector.split('/').collect();
        for i in 1..parts.len() {
            self.continuations.insert(parts[i..].join("/"));
        }
        self.selectors.insert(selector.to_string(), value);
    }

    /// Returns true if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Finds the value of the first registered selector met while climbing
    /// from `element` through its parent elements.
    ///
    /// The element's own tag name is tried first, so `"b"` takes precedence
    /// over `"a/b"` when both are registered.
    pub fn get<E: SelectorTarget>(&self, element: &E) -> Option<&T> {
        let mut path = element.tag_name().to_string();
        if let Some(value) = self.selectors.get(&path) {
            return Some(value);
        }

        let mut current = element.parent_element();
        while self.continuations.contains(&path) {
            let parent = current?;
            path = format!("{}/{path}", parent.tag_name());
            if let Some(value) = self.selectors.get(&path) {
                return Some(value);
            }
            current = parent.parent_element();
        }
        None
    }
}

impl<T: Clone> SelectorMap<T> {
    /// Registers several selectors with the same value.
    pub fn insert_all<I, S>(&mut self, selectors: I, value: &T)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for selector in selectors {
            self.insert(selector.as_ref(), value.clone());
        }
    }
}

/// Registry answering whether any registered selector matches an element.
#[derive(Debug, Clone, Default)]
pub struct SelectorSet {
    inner: SelectorMap<()>,
}

impl SelectorSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a selector.
    pub fn insert(&mut self, selector: &str) {
        self.inner.insert(selector, ());
    }

    /// Registers several selectors.
    pub fn extend<I, S>(&mut self, selectors: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner.insert_all(selectors, &());
    }

    /// Returns true if any registered selector matches `element`.
    pub fn matches<E: SelectorTarget>(&self, element: &E) -> bool {
        self.inner.get(element).is_some()
    }
}
