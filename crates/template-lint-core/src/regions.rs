//! Comment-based suppression regions.
//!
//! Supports directives inside markup comments:
//! ```text
//! <!-- template-lint-disable rule-name -->
//! <!-- template-lint-enable rule-name -->
//! <!-- template-lint-disable-line rule-name optional free text -->
//! ```
//! A single comment may carry several directives.

use crate::position::{Position, PositionConverter};
use crate::types::Span;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Prefix shared by all suppression directives.
pub const DIRECTIVE_MARKER: &str = "template-lint";

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)template-lint-(disable-line|disable|enable)\s+(\S+)")
        .unwrap_or_else(|e| unreachable!("directive pattern is valid: {e}"))
});

/// Kind of a suppression directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    /// Suppress from the end of the comment until a matching `enable`.
    Disable,
    /// Close a region opened by `disable`.
    Enable,
    /// Suppress the line following the comment.
    DisableLine,
}

/// A directive found in a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Directive kind.
    pub kind: DirectiveKind,
    /// Name of the rule the directive applies to.
    pub rule: String,
}

/// Parses every directive in a comment's text, in order.
#[must_use]
pub fn parse_directives(comment: &str) -> Vec<Directive> {
    DIRECTIVE
        .captures_iter(comment)
        .map(|caps| {
            let kind = match &caps[1] {
                "disable-line" => DirectiveKind::DisableLine,
                "disable" => DirectiveKind::Disable,
                _ => DirectiveKind::Enable,
            };
            Directive {
                kind,
                rule: caps[2].to_string(),
            }
        })
        .collect()
}

/// Per-rule offset ranges in which diagnostics are suppressed.
#[derive(Debug, Clone, Default)]
pub struct DisabledRegions {
    ranges: HashMap<String, Vec<Span>>,
}

impl DisabledRegions {
    /// Creates an empty region registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a suppressed range `[start, end)` for a rule.
    pub fn add(&mut self, rule: impl Into<String>, start: usize, end: usize) {
        self.ranges
            .entry(rule.into())
            .or_default()
            .push(Span::new(start, end));
    }

    /// Returns true if diagnostics of `rule` starting at `offset` are suppressed.
    #[must_use]
    pub fn has(&self, rule: &str, offset: usize) -> bool {
        self.ranges
            .get(rule)
            .is_some_and(|ranges| ranges.iter().any(|r| r.start <= offset && offset < r.end))
    }

    /// Returns the ranges registered for a rule.
    #[must_use]
    pub fn ranges(&self, rule: &str) -> &[Span] {
        self.ranges.get(rule).map_or(&[], Vec::as_slice)
    }

    /// Returns true if no region has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Builds regions from comments given in document order.
    ///
    /// `comments` yields each comment's full span together with its text.
    /// A second `disable` for a rule that is already open replaces the open
    /// offset. Regions still open at the end extend to the end of the source.
    pub fn from_comments<'a>(
        comments: impl IntoIterator<Item = (Span, &'a str)>,
        converter: &PositionConverter,
        source_len: usize,
    ) -> Self {
        let mut regions = Self::new();
        let mut open: HashMap<String, usize> = HashMap::new();

        for (span, text) in comments {
            for directive in parse_directives(text) {
                match directive.kind {
                    DirectiveKind::DisableLine => {
                        let Some(comment_end) = converter.offset_to_position(span.end) else {
                            continue;
                        };
                        let line = comment_end.line + 1;
                        if let Some(start) = converter.position_to_offset(Position::new(line, 0)) {
                            let end = converter
                                .position_to_offset(Position::new(line + 1, 0))
                                .unwrap_or(source_len);
                            regions.add(directive.rule, start, end);
                        }
                    }
                    DirectiveKind::Disable => {
                        open.insert(directive.rule, span.end);
                    }
                    DirectiveKind::Enable => {
                        if let Some(start) = open.remove(&directive.rule) {
                            regions.add(directive.rule, start, span.start);
                        }
                    }
                }
            }
        }

        for (rule, start) in open {
            regions.add(rule, start, source_len);
        }
        regions
    }
}
