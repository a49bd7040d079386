//! # template-lint-core
//!
//! Core engine for linting component templates: HTML markup with embedded
//! data-binding expressions.
//!
//! This crate provides:
//!
//! - [`Config`] loading with `extends` inheritance and per-rule merging
//! - [`TemplateFile`], the parsed template with bindings, suppression
//!   regions and resource names in scope
//! - [`ProjectContext`] for cached cross-file `<require>` resolution
//! - [`Rule`] and [`RuleRegistry`], the plugin contract and lookup table
//! - [`Project`] for batch runs, single-document evaluation and watching
//! - [`SelectorMap`] and [`PositionConverter`] helpers shared by rules
//!
//! ## Example
//!
//! ```ignore
//! use template_lint_core::{Config, Project, RuleRegistry};
//!
//! let registry = RuleRegistry::new(my_rules());
//! let config = Config::load("template-lint.toml", &registry)?;
//! let project = Project::create(config, &registry).await?;
//!
//! let report = project.run().await?;
//! if report.has_errors() {
//!     std::process::exit(1);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod binding;
mod config;
pub mod context;
pub mod expression;
pub mod files;
pub mod markup;
pub mod position;
mod project;
pub mod regions;
pub mod resource_names;
mod rule;
pub mod selector;
mod template_file;
mod types;

/// Utility modules shared by the engine and rule implementations.
pub mod utils;

pub use binding::{Binding, BindingKind};
pub use config::{Config, ConfigError, RuleConfig, DEFAULT_INCLUDE, DEFAULT_SRC_ROOT};
pub use context::{ContextError, ProjectContext, ResourceResolver, SourceAnalyzer};
pub use expression::{Expression, ExpressionError, WrapperKind};
pub use files::{ChangeHandler, FileChanges, FileMatcher, WatchError, WatchHandle};
pub use markup::{Element, Tree};
pub use position::{Position, PositionConverter};
pub use project::{Project, ProjectError, RULE_FAILED_MESSAGE};
pub use resource_names::{ResourceKind, ResourceNameTable};
pub use rule::{
    is_valid_rule_name, parse_settings, MergeConfigFn, MergeContext, RegistryError, Rule, RuleBox,
    RuleContext, RuleError, RuleModule, RuleRegistry, Settings,
};
pub use selector::{SelectorMap, SelectorSet};
pub use template_file::{Require, TemplateFile};
pub use types::{
    Diagnostic, DiagnosticReport, FileReport, LintReport, RuleDiagnostic, Severity, Span,
};
