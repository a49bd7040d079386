//! Check command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use template_lint_core::{Config, LintReport, Project, RuleConfig};
use template_lint_rules::{html_custom_element_compat, no_duplicate_requires, no_invalid_bindings};

use crate::config_resolver::ConfigSource;
use crate::OutputFormat;

/// Rules enabled when no configuration file is found.
pub const DEFAULT_RULES: &[&str] = &[
    no_invalid_bindings::NAME,
    no_duplicate_requires::NAME,
    html_custom_element_compat::NAME,
];

/// Options of the check command.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Output format.
    pub format: OutputFormat,
    /// Comma-separated rule names to keep.
    pub rules: Option<String>,
    /// Keep watching after the first run.
    pub watch: bool,
    /// Colorize text output.
    pub color: bool,
}

/// Runs the check command.
pub async fn run(path: &Path, source: &ConfigSource, options: CheckOptions) -> Result<()> {
    let registry = template_lint_rules::registry();
    let mut config = load_config(path, source, &registry)?;

    if let Some(filter) = &options.rules {
        let names: Vec<&str> = filter.split(',').map(str::trim).collect();
        filter_rules(&mut config, &names);
    }

    let project = Project::create(config, &registry)
        .await
        .context("Failed to create project")?;

    tracing::info!(
        "Checking {} with {} rules",
        project.config().context.display(),
        project.rule_names().count()
    );

    let report = project.run().await.context("Lint run failed")?;
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    super::output::print(&report, options.format, &cwd, options.color)?;

    if options.watch {
        return watch(Arc::new(project), options, cwd).await;
    }

    // Exit with error code if there are errors
    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

/// Loads the resolved config, or a default config rooted at `path`.
pub fn load_config(
    path: &Path,
    source: &ConfigSource,
    registry: &template_lint_core::RuleRegistry,
) -> Result<Config> {
    match source.path() {
        Some(p) => Config::load(p, registry)
            .with_context(|| format!("Failed to load config: {}", p.display())),
        None => {
            let context = std::path::absolute(path)
                .with_context(|| format!("Failed to resolve {}", path.display()))?;
            tracing::info!("No config found, using default rules");
            Ok(DEFAULT_RULES.iter().fold(Config::with_context(context), |config, name| {
                config.with_rule(*name, RuleConfig::default())
            }))
        }
    }
}

/// Keeps only the named rules, warning about names that are not configured.
fn filter_rules(config: &mut Config, names: &[&str]) {
    for name in names {
        if !config.rules.contains_key(*name) {
            tracing::warn!("Rule is not configured: {}", name);
        }
    }
    config.rules.retain(|name, _| names.contains(&name.as_str()));
}

async fn watch(project: Arc<Project>, options: CheckOptions, cwd: std::path::PathBuf) -> Result<()> {
    let format = options.format;
    let color = options.color;
    let handle = project
        .watch(move |report: LintReport| {
            if let Err(e) = super::output::print(&report, format, &cwd, color) {
                tracing::error!("Failed to print diagnostics: {e:#}");
            }
        })
        .context("Failed to start watching")?;

    tracing::info!("Watching for changes, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    handle.stop().await;
    Ok(())
}
