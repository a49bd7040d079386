//! Configuration loading with `extends` inheritance.
//!
//! A config document is TOML (`template-lint.toml`) or JSON5 (`.json`,
//! `.json5`):
//!
//! ```toml
//! srcRoot = "./src"
//! extends = ["../base/template-lint.toml"]
//! include = ["./src/**/*.html"]
//!
//! [rules]
//! no-duplicate-requires = "warn"
//! no-invalid-bindings = ["error", {}]
//!
//! [rules.attribute-usage.elements.img]
//! require = ["alt"]
//! ```
//!
//! Each rule entry is a severity, a `[severity, settings]` pair or a settings
//! object. Rules inherited through `extends` take the local severity or the
//! highest parent severity. Their settings are combined by the rule module's
//! merge function.

use crate::rule::{MergeContext, RegistryError, RuleError, RuleRegistry, Settings};
use crate::types::Severity;
use crate::utils::paths::{normalize_path, strip_dot_prefix};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Include pattern used when neither `include` nor `srcRoot` is set.
pub const DEFAULT_INCLUDE: &str = "./src/**/*.html";

/// Source root used when `srcRoot` is not set.
pub const DEFAULT_SRC_ROOT: &str = "./src";

/// A fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of the config file. Include patterns are relative to it.
    pub context: PathBuf,
    /// Absolute source root used as a resolution fallback.
    pub src_root: PathBuf,
    /// Glob patterns selecting template files.
    pub include: Vec<String>,
    /// Merged rule configurations in declaration order.
    pub rules: IndexMap<String, RuleConfig>,
}

/// Severity and settings of one rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleConfig {
    /// Configured severity, if any.
    pub severity: Option<Severity>,
    /// Rule-specific settings.
    pub settings: Settings,
}

/// Raw config document.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigDocument {
    #[serde(default)]
    src_root: Option<String>,
    #[serde(default)]
    extends: Vec<String>,
    #[serde(default)]
    include: Option<Vec<String>>,
    #[serde(default)]
    rules: IndexMap<String, Value>,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Parse error in config file.
    #[error("Failed to parse config {path}: {message}")]
    Parse {
        /// Path of the document.
        path: PathBuf,
        /// Parse error message.
        message: String,
    },

    /// A rule entry has an unsupported shape.
    #[error("Invalid config for rule {rule:?} in {path}: {message}")]
    InvalidRuleConfig {
        /// Path of the document.
        path: PathBuf,
        /// Rule name.
        rule: String,
        /// What is wrong.
        message: String,
    },

    /// A rule name is invalid or unknown.
    #[error("{path}: {source}")]
    Registry {
        /// Path of the document.
        path: PathBuf,
        /// Lookup error.
        source: RegistryError,
    },

    /// A rule's merge function failed.
    #[error("Rule {rule:?} ({file}) could not be merged: {source}")]
    RuleMerge {
        /// Path of the document.
        file: PathBuf,
        /// Rule name.
        rule: String,
        /// Merge error.
        source: RuleError,
    },

    /// The `extends` chain refers back to a config being loaded.
    #[error("Config extends itself: {chain}")]
    ExtendsCycle {
        /// The chain of config files forming the cycle.
        chain: String,
    },
}

impl Config {
    /// Loads a config file and everything it extends.
    ///
    /// # Errors
    ///
    /// Returns an error if a document cannot be read or parsed, a rule is
    /// unknown or malformed, a merge function fails or `extends` is cyclic.
    pub fn load(path: impl AsRef<Path>, registry: &RuleRegistry) -> Result<Self, ConfigError> {
        let mut loading = Vec::new();
        load_document(path.as_ref(), registry, true, &mut loading)
    }

    /// Builds a config without a file, rooted at `context`.
    #[must_use]
    pub fn with_context(context: impl Into<PathBuf>) -> Self {
        let context = normalize_path(&context.into());
        Self {
            src_root: context.join(strip_dot_prefix(DEFAULT_SRC_ROOT)),
            context,
            include: vec![DEFAULT_INCLUDE.to_string()],
            rules: IndexMap::new(),
        }
    }

    /// Adds or replaces a rule configuration.
    #[must_use]
    pub fn with_rule(mut self, name: impl Into<String>, rule: RuleConfig) -> Self {
        self.rules.insert(name.into(), rule);
        self
    }
}

fn load_document(
    path: &Path,
    registry: &RuleRegistry,
    is_root: bool,
    loading: &mut Vec<PathBuf>,
) -> Result<Config, ConfigError> {
    let filename = normalize_path(&std::path::absolute(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?);
    if loading.contains(&filename) {
        let chain = loading
            .iter()
            .chain(std::iter::once(&filename))
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(ConfigError::ExtendsCycle { chain });
    }

    debug!(config = %filename.display(), is_root, "Loading config");
    let context = filename
        .parent()
        .map_or_else(|| PathBuf::from("/"), Path::to_path_buf);
    let document = parse_document(&filename)?;

    let mut rules = IndexMap::new();
    for (name, value) in &document.rules {
        rules.insert(name.clone(), normalize_rule(&filename, name, value)?);
    }

    let mut parents: IndexMap<String, Vec<RuleConfig>> = IndexMap::new();
    loading.push(filename.clone());
    for extended in &document.extends {
        let parent = load_document(&context.join(extended), registry, false, loading)?;
        for (name, rule) in parent.rules {
            parents.entry(name).or_default().push(rule);
        }
    }
    loading.pop();

    let mut merged = IndexMap::new();
    for (name, local) in rules {
        let parent_rules = parents.shift_remove(&name).unwrap_or_default();
        let rule = merge_rule(&filename, &context, is_root, registry, &name, Some(local), &parent_rules)?;
        merged.insert(name, rule);
    }
    for (name, parent_rules) in parents {
        let rule = merge_rule(&filename, &context, is_root, registry, &name, None, &parent_rules)?;
        merged.insert(name, rule);
    }

    let include = document.include.unwrap_or_else(|| {
        vec![document.src_root.as_deref().map_or_else(
            || DEFAULT_INCLUDE.to_string(),
            |root| format!("{}/**/*.html", strip_dot_prefix(root).trim_end_matches('/')),
        )]
    });
    let src_root = normalize_path(&context.join(
        document
            .src_root
            .as_deref()
            .unwrap_or(DEFAULT_SRC_ROOT),
    ));

    Ok(Config {
        context,
        src_root,
        include,
        rules: merged,
    })
}

fn parse_document(filename: &Path) -> Result<ConfigDocument, ConfigError> {
    let text = std::fs::read_to_string(filename).map_err(|e| ConfigError::Io {
        path: filename.to_path_buf(),
        source: e,
    })?;
    let parse_error = |message: String| ConfigError::Parse {
        path: filename.to_path_buf(),
        message,
    };
    match filename.extension().and_then(|e| e.to_str()) {
        Some("json" | "json5") => json5::from_str(&text).map_err(|e| parse_error(e.to_string())),
        _ => toml::from_str(&text).map_err(|e| parse_error(e.to_string())),
    }
}

/// Normalizes the three accepted rule entry shapes.
fn normalize_rule(filename: &Path, name: &str, value: &Value) -> Result<RuleConfig, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidRuleConfig {
        path: filename.to_path_buf(),
        rule: name.to_string(),
        message: message.to_string(),
    };
    let severity = |value: &Value| -> Result<Option<Severity>, ConfigError> {
        match value {
            Value::Null => Ok(None),
            Value::String(_) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|_| invalid("expected one of \"info\", \"warn\", \"error\"")),
            _ => Err(invalid("severity must be a string")),
        }
    };

    match value {
        Value::String(_) => Ok(RuleConfig {
            severity: severity(value)?,
            settings: Settings::new(),
        }),
        Value::Array(items) => {
            let (first, rest) = items
                .split_first()
                .ok_or_else(|| invalid("expected [severity, settings]"))?;
            let settings = match rest {
                [] | [Value::Null] => Settings::new(),
                [Value::Object(settings)] => settings.clone(),
                _ => return Err(invalid("expected [severity, settings]")),
            };
            Ok(RuleConfig {
                severity: severity(first)?,
                settings,
            })
        }
        Value::Object(settings) => Ok(RuleConfig {
            severity: None,
            settings: settings.clone(),
        }),
        _ => Err(invalid("expected a severity, [severity, settings] or a settings object")),
    }
}

fn merge_rule(
    filename: &Path,
    context: &Path,
    is_root: bool,
    registry: &RuleRegistry,
    name: &str,
    local: Option<RuleConfig>,
    parents: &[RuleConfig],
) -> Result<RuleConfig, ConfigError> {
    let module = registry.get(name).map_err(|source| ConfigError::Registry {
        path: filename.to_path_buf(),
        source,
    })?;
    let local = local.unwrap_or_default();
    let parent_severities: Vec<Option<Severity>> = parents.iter().map(|p| p.severity).collect();
    let severity = Severity::merge(local.severity, &parent_severities);

    let settings = match module.merge_config {
        Some(merge) => {
            let parent_settings: Vec<Settings> = parents.iter().map(|p| p.settings.clone()).collect();
            merge(MergeContext {
                settings: local.settings,
                parents: &parent_settings,
                context,
                is_root,
            })
            .map_err(|source| ConfigError::RuleMerge {
                file: filename.to_path_buf(),
                rule: name.to_string(),
                source,
            })?
        }
        None => local.settings,
    };

    Ok(RuleConfig { severity, settings })
}
