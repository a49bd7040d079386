//! Project orchestration: rule configuration, batch runs, single-file
//! evaluation and watching.

use crate::config::Config;
use crate::context::{ProjectContext, ResourceResolver};
use crate::files::{
    watch_files, ChangeHandler, FileChanges, FileMatcher, PatternError, WatchError, WatchHandle,
};
use crate::rule::{RegistryError, Rule, RuleBox, RuleContext, RuleError, RuleRegistry};
use crate::template_file::TemplateFile;
use crate::types::{Diagnostic, LintReport, RuleDiagnostic, Severity};
use async_trait::async_trait;
use futures::future::join_all;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Message of the diagnostic reported when a rule fails.
pub const RULE_FAILED_MESSAGE: &str = "rule failed to evaluate";

/// Errors that can occur while building or running a project.
#[derive(Debug, Error)]
pub enum ProjectError {
    /// A configured rule cannot be looked up.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A rule rejected its settings.
    #[error("Rule {rule:?} could not be configured: {source}")]
    Configure {
        /// Rule name.
        rule: String,
        /// Configure error.
        source: RuleError,
    },

    /// An include pattern is invalid.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// File discovery failed.
    #[error("Failed to discover files: {0}")]
    Discovery(#[from] walkdir::Error),
}

struct RuleInstance {
    name: String,
    rule: RuleBox,
    severity: Severity,
}

/// A configured set of rules bound to one project context.
pub struct Project {
    config: Config,
    resolver: Arc<dyn ResourceResolver>,
    rules: Vec<RuleInstance>,
    matcher: FileMatcher,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("context", &self.config.context)
            .field("rules", &self.rule_names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Project {
    /// Builds a project with a filesystem-backed [`ProjectContext`].
    ///
    /// # Errors
    ///
    /// Returns an error if a rule is unknown, rejects its settings, or an
    /// include pattern is invalid.
    pub async fn create(config: Config, registry: &RuleRegistry) -> Result<Self, ProjectError> {
        let context = ProjectContext::new(&config.src_root);
        Self::with_resolver(config, registry, Arc::new(context)).await
    }

    /// Builds a project that resolves resources through `resolver`.
    ///
    /// # Errors
    ///
    /// See [`Project::create`].
    pub async fn with_resolver(
        config: Config,
        registry: &RuleRegistry,
        resolver: Arc<dyn ResourceResolver>,
    ) -> Result<Self, ProjectError> {
        let matcher = FileMatcher::new(&config.context, config.include.as_slice())?;

        let mut rules = Vec::with_capacity(config.rules.len());
        for (name, rule_config) in &config.rules {
            let module = registry.get(name)?;
            let mut rule = (module.create)();
            rule.configure(&rule_config.settings, &config)
                .await
                .map_err(|source| ProjectError::Configure {
                    rule: name.clone(),
                    source,
                })?;
            rules.push(RuleInstance {
                name: name.clone(),
                rule,
                severity: rule_config.severity.unwrap_or(Severity::Error),
            });
        }

        info!(
            context = %config.context.display(),
            rules = rules.len(),
            "Project created"
        );

        Ok(Self {
            config,
            resolver,
            rules,
            matcher,
        })
    }

    /// The configuration this project was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Names of the configured rules in evaluation order.
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    /// Returns true if `filename` is selected by the include patterns.
    ///
    /// Relative filenames are taken relative to the config directory.
    #[must_use]
    pub fn includes(&self, filename: impl AsRef<Path>) -> bool {
        self.matcher.matches(filename.as_ref())
    }

    /// Forgets cached resource names of `filename`.
    pub fn invalidate_cache(&self, filename: impl AsRef<Path>) {
        self.resolver.invalidate_cache(filename.as_ref());
    }

    /// Evaluates all rules against an analyzed file.
    ///
    /// Creation errors replace rule evaluation. Otherwise unresolved-require
    /// notices come first, followed by rule diagnostics in rule order.
    /// Diagnostics inside a disabled region of their rule are dropped.
    #[must_use]
    pub fn evaluate_template(&self, file: &TemplateFile) -> Vec<Diagnostic> {
        if !file.creation_errors().is_empty() {
            return file.creation_errors().to_vec();
        }

        let mut diagnostics = file.notices().to_vec();
        for instance in &self.rules {
            let mut ctx = RuleContext::new(file);
            let outcome = catch_unwind(AssertUnwindSafe(|| instance.rule.evaluate(&mut ctx)));

            for diagnostic in ctx.into_diagnostics() {
                let offset = diagnostic.position.map_or(0, |p| p.start);
                if file.disabled_regions().has(&instance.name, offset) {
                    continue;
                }
                diagnostics.push(Diagnostic::from_rule(
                    &instance.name,
                    instance.severity,
                    diagnostic,
                ));
            }

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };
            if let Some(details) = failure {
                warn!(
                    rule = %instance.name,
                    file = %file.filename().display(),
                    error = %details,
                    "Rule failed"
                );
                diagnostics.push(Diagnostic::from_rule(
                    &instance.name,
                    Severity::Error,
                    RuleDiagnostic::file_level(RULE_FAILED_MESSAGE).with_details(details),
                ));
            }
        }
        diagnostics
    }

    /// Analyzes and evaluates a document that may not be on disk.
    pub async fn evaluate(
        &self,
        filename: impl AsRef<Path>,
        source: impl Into<String>,
    ) -> (Arc<TemplateFile>, Vec<Diagnostic>) {
        let filename = self.config.context.join(filename);
        let file = TemplateFile::create(self.resolver.as_ref(), filename, source).await;
        let diagnostics = self.evaluate_template(&file);
        (Arc::new(file), diagnostics)
    }

    /// Reads, analyzes and evaluates one file.
    pub async fn evaluate_file(
        &self,
        filename: impl AsRef<Path>,
    ) -> (Arc<TemplateFile>, Vec<Diagnostic>) {
        let filename = self.config.context.join(filename);
        let file = TemplateFile::read(self.resolver.as_ref(), &filename).await;
        debug!(file = %file.filename().display(), "Evaluating");
        let diagnostics = self.evaluate_template(&file);
        (Arc::new(file), diagnostics)
    }

    /// Discovers, analyzes and evaluates every included file.
    ///
    /// Files are analyzed concurrently; the report is in discovery order.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be read during discovery.
    pub async fn run(&self) -> Result<LintReport, ProjectError> {
        let files = self.matcher.find_files()?;
        info!(files = files.len(), "Discovered template files");

        let results = join_all(files.iter().map(|f| self.evaluate_file(f))).await;
        let mut report = LintReport::new();
        for (file, diagnostics) in results {
            report.insert(file, diagnostics);
        }
        Ok(report)
    }

    /// Re-evaluates included files as they change.
    ///
    /// `on_diagnostics` receives one report per debounced batch of updated
    /// files. Deleted and updated files are evicted from the resource cache
    /// first.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be started.
    pub fn watch<F>(self: &Arc<Self>, on_diagnostics: F) -> Result<WatchHandle, WatchError>
    where
        F: FnMut(LintReport) + Send + 'static,
    {
        let handler = ProjectChangeHandler {
            project: Arc::clone(self),
            on_diagnostics,
        };
        watch_files(self.matcher.clone(), handler)
    }

    async fn handle_changes(&self, changes: FileChanges) -> LintReport {
        for filename in changes.deleted.iter().chain(&changes.updated) {
            self.invalidate_cache(filename);
        }
        let results = join_all(changes.updated.iter().map(|f| self.evaluate_file(f))).await;
        let mut report = LintReport::new();
        for (file, diagnostics) in results {
            report.insert(file, diagnostics);
        }
        report
    }
}

struct ProjectChangeHandler<F> {
    project: Arc<Project>,
    on_diagnostics: F,
}

#[async_trait]
impl<F> ChangeHandler for ProjectChangeHandler<F>
where
    F: FnMut(LintReport) + Send + 'static,
{
    async fn on_change(&mut self, changes: FileChanges) -> Result<(), WatchError> {
        let report = self.project.handle_changes(changes).await;
        debug!(files = report.files_checked(), "Re-evaluated changed files");
        (self.on_diagnostics)(report);
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "rule panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConfig;
    use crate::rule::{RuleModule, Settings};
    use crate::types::Span;
    use pretty_assertions::assert_eq;

    struct FlagParagraphs;

    #[async_trait]
    impl Rule for FlagParagraphs {
        fn name(&self) -> &'static str {
            "flag-paragraphs"
        }

        fn evaluate(&self, ctx: &mut RuleContext<'_>) -> Result<(), RuleError> {
            let mut spans = Vec::new();
            ctx.file().traverse_elements(|element| {
                if element.name() == "p" {
                    spans.push(element.data().start_tag);
                }
                true
            });
            for span in spans {
                ctx.emit(RuleDiagnostic::new("Paragraph found.", span));
            }
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Rule for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn evaluate(&self, ctx: &mut RuleContext<'_>) -> Result<(), RuleError> {
            ctx.emit(RuleDiagnostic::file_level("before failure"));
            Err(RuleError::Failed("broken".into()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Rule for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn evaluate(&self, _ctx: &mut RuleContext<'_>) -> Result<(), RuleError> {
            panic!("boom");
        }
    }

    struct Picky;

    #[async_trait]
    impl Rule for Picky {
        fn name(&self) -> &'static str {
            "picky"
        }

        async fn configure(&mut self, settings: &Settings, _config: &Config) -> Result<(), RuleError> {
            if settings.contains_key("bad") {
                return Err(RuleError::Failed("bad setting".into()));
            }
            Ok(())
        }

        fn evaluate(&self, _ctx: &mut RuleContext<'_>) -> Result<(), RuleError> {
            Ok(())
        }
    }

    fn registry() -> RuleRegistry {
        fn module(name: &'static str, create: fn() -> RuleBox) -> RuleModule {
            RuleModule {
                name,
                description: "",
                create,
                merge_config: None,
            }
        }
        RuleRegistry::new([
            module("flag-paragraphs", || Box::new(FlagParagraphs) as RuleBox),
            module("failing", || Box::new(Failing) as RuleBox),
            module("panicking", || Box::new(Panicking) as RuleBox),
            module("picky", || Box::new(Picky) as RuleBox),
        ])
    }

    fn config(rules: &[(&str, Option<Severity>)]) -> Config {
        rules.iter().fold(Config::with_context("/app"), |config, (name, severity)| {
            config.with_rule(
                *name,
                RuleConfig {
                    severity: *severity,
                    settings: Settings::new(),
                },
            )
        })
    }

    #[tokio::test]
    async fn test_default_severity_and_order() {
        let project = Project::create(
            config(&[("flag-paragraphs", None), ("picky", Some(Severity::Info))]),
            &registry(),
        )
        .await
        .unwrap();
        assert_eq!(project.rule_names().collect::<Vec<_>>(), vec!["flag-paragraphs", "picky"]);

        let (_, diagnostics) = project.evaluate("src/view.html", "<p></p>").await;
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert_eq!(diagnostics[0].rule.as_deref(), Some("flag-paragraphs"));
        assert_eq!(diagnostics[0].position, Some(Span::new(0, 3)));
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let project = Project::create(
            config(&[
                ("failing", Some(Severity::Info)),
                ("panicking", None),
                ("flag-paragraphs", Some(Severity::Warn)),
            ]),
            &registry(),
        )
        .await
        .unwrap();

        let (_, diagnostics) = project.evaluate("src/view.html", "<p></p>").await;
        let summary: Vec<(Option<&str>, Severity, &str)> = diagnostics
            .iter()
            .map(|d| (d.rule.as_deref(), d.severity, d.message.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Some("failing"), Severity::Info, "before failure"),
                (Some("failing"), Severity::Error, RULE_FAILED_MESSAGE),
                (Some("panicking"), Severity::Error, RULE_FAILED_MESSAGE),
                (Some("flag-paragraphs"), Severity::Warn, "Paragraph found."),
            ]
        );
        assert_eq!(diagnostics[1].details.as_deref(), Some("broken"));
        assert_eq!(diagnostics[2].details.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_disabled_regions_filter_diagnostics() {
        let project = Project::create(config(&[("flag-paragraphs", None)]), &registry())
            .await
            .unwrap();
        let source = "<p>1</p>\n<!-- template-lint-disable-line flag-paragraphs -->\n<p>2</p>\n<p>3</p>\n\
                      <!-- template-lint-disable flag-paragraphs --><p>4</p>\n\
                      <!-- template-lint-enable flag-paragraphs --><p>5</p>";
        let (_, diagnostics) = project.evaluate("src/view.html", source).await;

        let lines: Vec<usize> = diagnostics
            .iter()
            .filter_map(|d| d.position)
            .map(|span| &source[span.end..span.end + 1])
            .map(|digit| digit.parse().unwrap())
            .collect();
        assert_eq!(lines, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_creation_errors_skip_rules() {
        let project = Project::create(config(&[("flag-paragraphs", None)]), &registry())
            .await
            .unwrap();
        let (_, diagnostics) = project.evaluate("src/view.html", "<p></p><!-- open").await;
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].rule, None);
        assert_eq!(diagnostics[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_configure_error() {
        let mut settings = Settings::new();
        settings.insert("bad".into(), true.into());
        let config = Config::with_context("/app").with_rule(
            "picky",
            RuleConfig {
                severity: None,
                settings,
            },
        );
        let error = Project::create(config, &registry()).await.unwrap_err();
        assert!(matches!(error, ProjectError::Configure { ref rule, .. } if rule == "picky"));
    }

    #[tokio::test]
    async fn test_includes() {
        let project = Project::create(config(&[]), &registry()).await.unwrap();
        assert!(project.includes("/app/src/a/b.html"));
        assert!(project.includes("src/c.html"));
        assert!(!project.includes("/app/lib/c.html"));
        assert!(!project.includes("/app/src/c.ts"));
    }
}
