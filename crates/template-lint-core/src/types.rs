//! Core types for diagnostics and lint reports.

use crate::template_file::TemplateFile;
use indexmap::IndexMap;
use miette::{Diagnostic as MietteDiagnostic, NamedSource, SourceSpan};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Severity level for diagnostics.
///
/// Ordered `Info < Warn < Error`. An unset severity is modelled as
/// `Option<Severity>::None`, which sorts below every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message, does not fail lint.
    Info,
    /// Warning that should be addressed.
    #[serde(alias = "warning")]
    Warn,
    /// Error that must be fixed.
    Error,
}

impl Severity {
    /// Merges a local severity with the severities of parent configs.
    ///
    /// The local severity always wins. Otherwise the highest parent severity
    /// is used, with unset parents ranking lowest.
    #[must_use]
    pub fn merge(local: Option<Self>, parents: &[Option<Self>]) -> Option<Self> {
        local.or_else(|| parents.iter().copied().max().flatten())
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Half-open byte span `[start, end)` into a file's source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    /// Start offset (inclusive).
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Length of the span in bytes.
    #[must_use]
    pub const fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the span is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Returns the text covered by this span, if it lies within `source`.
    #[must_use]
    pub fn slice(self, source: &str) -> Option<&str> {
        source.get(self.start..self.end)
    }
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        SourceSpan::from((span.start, span.len()))
    }
}

/// A diagnostic emitted by a rule, before the engine attaches severity and rule name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDiagnostic {
    /// Human-readable message.
    pub message: String,
    /// Optional longer explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Source span, absent for file-level diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Span>,
}

impl RuleDiagnostic {
    /// Creates a new positioned diagnostic.
    #[must_use]
    pub fn new(message: impl Into<String>, position: Span) -> Self {
        Self {
            message: message.into(),
            details: None,
            position: Some(position),
        }
    }

    /// Creates a file-level diagnostic without a position.
    #[must_use]
    pub fn file_level(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
            position: None,
        }
    }

    /// Adds details to this diagnostic.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// A diagnostic as reported to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Name of the rule that produced this diagnostic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Severity of this diagnostic.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Optional longer explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Source span, absent for file-level diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Span>,
}

impl Diagnostic {
    /// Creates a file-level diagnostic that is not attributed to a rule.
    #[must_use]
    pub fn file_level(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule: None,
            severity,
            message: message.into(),
            details: None,
            position: None,
        }
    }

    /// Attaches a rule name and severity to a rule diagnostic.
    #[must_use]
    pub fn from_rule(rule: &str, severity: Severity, diagnostic: RuleDiagnostic) -> Self {
        Self {
            rule: Some(rule.to_string()),
            severity,
            message: diagnostic.message,
            details: diagnostic.details,
            position: diagnostic.position,
        }
    }

    /// Adds details to this diagnostic.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Adds a position to this diagnostic.
    #[must_use]
    pub fn with_position(mut self, position: Span) -> Self {
        self.position = Some(position);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(rule) = &self.rule {
            write!(f, " ({rule})")?;
        }
        Ok(())
    }
}

/// Converts a [`Diagnostic`] to a miette diagnostic for rich error display.
#[derive(Debug, thiserror::Error, MietteDiagnostic)]
#[error("{message}")]
pub struct DiagnosticReport {
    message: String,
    #[help]
    help: Option<String>,
    #[source_code]
    source_code: NamedSource<String>,
    #[label("{label_message}")]
    span: Option<SourceSpan>,
    label_message: String,
}

impl DiagnosticReport {
    /// Builds a report for a diagnostic of the given file.
    #[must_use]
    pub fn new(file: &TemplateFile, diagnostic: &Diagnostic) -> Self {
        Self {
            message: format!("{}: {}", diagnostic.severity, diagnostic.message),
            help: diagnostic.details.clone(),
            source_code: NamedSource::new(
                file.filename().display().to_string(),
                file.source().to_string(),
            ),
            span: diagnostic.position.map(SourceSpan::from),
            label_message: diagnostic.rule.clone().unwrap_or_default(),
        }
    }
}

/// Diagnostics produced for one template file.
#[derive(Debug, Clone)]
pub struct FileReport {
    /// The analyzed file.
    pub file: Arc<TemplateFile>,
    /// Diagnostics in emission order.
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of analyzing a set of files.
///
/// Files are kept in insertion order, which is discovery order for batch runs.
#[derive(Debug, Clone, Default)]
pub struct LintReport {
    /// Per-file diagnostics keyed by normalized filename.
    pub files: IndexMap<PathBuf, FileReport>,
}

impl LintReport {
    /// Creates a new empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the diagnostics of one file.
    pub fn insert(&mut self, file: Arc<TemplateFile>, diagnostics: Vec<Diagnostic>) {
        let filename = file.filename().to_path_buf();
        self.files.insert(filename, FileReport { file, diagnostics });
    }

    /// Number of files in this report.
    #[must_use]
    pub fn files_checked(&self) -> usize {
        self.files.len()
    }

    /// Iterates over all diagnostics of all files.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.files.values().flat_map(|report| report.diagnostics.iter())
    }

    /// Returns true if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics().any(|d| d.severity == Severity::Error)
    }

    /// Counts diagnostics by severity as `(errors, warnings, infos)`.
    #[must_use]
    pub fn count_by_severity(&self) -> (usize, usize, usize) {
        self.diagnostics()
            .fold((0, 0, 0), |(errors, warnings, infos), d| match d.severity {
                Severity::Error => (errors + 1, warnings, infos),
                Severity::Warn => (errors, warnings + 1, infos),
                Severity::Info => (errors, warnings, infos + 1),
            })
    }
}
