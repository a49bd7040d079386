//! Rule plugin contract and the rule registry.

use crate::config::Config;
use crate::template_file::TemplateFile;
use crate::types::RuleDiagnostic;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Raw per-rule settings as written in a config document.
pub type Settings = serde_json::Map<String, Value>;

/// Errors raised by rules.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The rule's settings do not match its schema.
    #[error("invalid settings: {0}")]
    InvalidSettings(#[from] serde_json::Error),

    /// The rule failed for another reason.
    #[error("{0}")]
    Failed(String),
}

/// Deserializes typed settings from raw settings.
///
/// # Errors
///
/// Returns [`RuleError::InvalidSettings`] if the settings do not match `T`.
pub fn parse_settings<T: DeserializeOwned>(settings: &Settings) -> Result<T, RuleError> {
    Ok(serde_json::from_value(Value::Object(settings.clone()))?)
}

/// Context passed to [`Rule::evaluate`].
///
/// Gives access to the file under evaluation and collects emitted diagnostics.
#[derive(Debug)]
pub struct RuleContext<'a> {
    file: &'a TemplateFile,
    diagnostics: Vec<RuleDiagnostic>,
}

impl<'a> RuleContext<'a> {
    /// Creates a context for one file.
    #[must_use]
    pub fn new(file: &'a TemplateFile) -> Self {
        Self {
            file,
            diagnostics: Vec::new(),
        }
    }

    /// The file under evaluation.
    #[must_use]
    pub fn file(&self) -> &'a TemplateFile {
        self.file
    }

    /// Reports a diagnostic.
    pub fn emit(&mut self, diagnostic: RuleDiagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Diagnostics emitted so far.
    #[must_use]
    pub fn diagnostics(&self) -> &[RuleDiagnostic] {
        &self.diagnostics
    }

    /// Consumes the context, returning the emitted diagnostics.
    #[must_use]
    pub fn into_diagnostics(self) -> Vec<RuleDiagnostic> {
        self.diagnostics
    }
}

/// A lint rule evaluated once per template file.
///
/// # Example
///
/// ```ignore
/// use template_lint_core::{Rule, RuleContext, RuleDiagnostic, RuleError};
///
/// pub struct NoMarquee;
///
/// #[async_trait::async_trait]
/// impl Rule for NoMarquee {
///     fn name(&self) -> &'static str { "no-marquee" }
///
///     fn evaluate(&self, ctx: &mut RuleContext<'_>) -> Result<(), RuleError> {
///         let mut found = Vec::new();
///         ctx.file().traverse_elements(|element| {
///             if element.name() == "marquee" {
///                 found.push(element.data().start_tag);
///             }
///             true
///         });
///         for span in found {
///             ctx.emit(RuleDiagnostic::new("Marquee is not allowed.", span));
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Rule: Send + Sync {
    /// Returns the kebab-case name of this rule (e.g., "attribute-usage").
    fn name(&self) -> &'static str;

    /// Returns a brief description of what this rule checks.
    fn description(&self) -> &'static str {
        ""
    }

    /// Applies the merged settings. Called once when the project is built.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid.
    async fn configure(&mut self, _settings: &Settings, _config: &Config) -> Result<(), RuleError> {
        Ok(())
    }

    /// Checks one file, reporting diagnostics through `ctx`.
    ///
    /// # Errors
    ///
    /// An error is reported as a single diagnostic for this rule; other
    /// rules still run.
    fn evaluate(&self, ctx: &mut RuleContext<'_>) -> Result<(), RuleError>;
}

/// Type alias for boxed Rule trait objects.
pub type RuleBox = Box<dyn Rule>;

/// Input of a rule module's settings merge function.
#[derive(Debug)]
pub struct MergeContext<'a> {
    /// Settings of the config being loaded.
    pub settings: Settings,
    /// Settings of the same rule in extended configs, in `extends` order.
    pub parents: &'a [Settings],
    /// Directory of the config being loaded.
    pub context: &'a Path,
    /// Whether the config is the one loaded directly rather than through `extends`.
    pub is_root: bool,
}

/// Merges a rule's settings with those inherited from extended configs.
pub type MergeConfigFn = fn(MergeContext<'_>) -> Result<Settings, RuleError>;

/// A registered rule: its name, a constructor and an optional settings merge.
#[derive(Clone, Copy)]
pub struct RuleModule {
    /// Rule name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Creates an unconfigured rule instance.
    pub create: fn() -> RuleBox,
    /// Merges settings across `extends`; settings pass through unchanged if absent.
    pub merge_config: Option<MergeConfigFn>,
}

impl std::fmt::Debug for RuleModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleModule")
            .field("name", &self.name)
            .field("merge_config", &self.merge_config.is_some())
            .finish_non_exhaustive()
    }
}

/// Errors raised when looking up a rule module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The name contains characters other than lowercase letters and `-`.
    #[error("invalid rule name {0:?}")]
    InvalidRuleName(String),

    /// No module is registered under this name.
    #[error("unknown rule {0:?}")]
    UnknownRule(String),
}

/// Returns true if `name` consists of lowercase ASCII letters and hyphens only.
#[must_use]
pub fn is_valid_rule_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_lowercase() || b == b'-')
}

/// Explicit table of available rule modules with memoized lookups.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    modules: Vec<RuleModule>,
    loaded: Mutex<HashMap<String, RuleModule>>,
}

impl RuleRegistry {
    /// Creates a registry over the given modules.
    #[must_use]
    pub fn new(modules: impl IntoIterator<Item = RuleModule>) -> Self {
        Self {
            modules: modules.into_iter().collect(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Looks up a rule module by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or unknown.
    pub fn get(&self, name: &str) -> Result<RuleModule, RegistryError> {
        if !is_valid_rule_name(name) {
            return Err(RegistryError::InvalidRuleName(name.to_string()));
        }
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(module) = loaded.get(name) {
            return Ok(*module);
        }
        let module = self
            .modules
            .iter()
            .find(|m| m.name == name)
            .copied()
            .ok_or_else(|| RegistryError::UnknownRule(name.to_string()))?;
        loaded.insert(name.to_string(), module);
        Ok(module)
    }

    /// All registered modules in registration order.
    pub fn modules(&self) -> impl Iterator<Item = &RuleModule> {
        self.modules.iter()
    }
}
