//! Helpers for evaluating rules against in-memory templates.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use template_lint_core::utils::normalize_path;
use template_lint_core::{
    Config, ContextError, ResourceNameTable, ResourceResolver, RuleContext, RuleDiagnostic,
    RuleModule, Settings, TemplateFile,
};

/// Directory of the templates under test.
pub const APP_DIR: &str = "/app";

/// Resolves requests against source files registered by absolute path.
#[derive(Default)]
pub struct StaticResolver {
    files: HashMap<PathBuf, ResourceNameTable>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `/app/<name>.ts` with the names added by `build`.
    pub fn file(mut self, name: &str, build: impl FnOnce(&mut ResourceNameTable)) -> Self {
        let mut names = ResourceNameTable::new();
        build(&mut names);
        self.files
            .insert(Path::new(APP_DIR).join(format!("{name}.ts")), names);
        self
    }
}

#[async_trait]
impl ResourceResolver for StaticResolver {
    async fn resolve_source_path(
        &self,
        request: &str,
        from_dir: &Path,
    ) -> Result<Option<PathBuf>, ContextError> {
        let path = normalize_path(&from_dir.join(request));
        let candidate = path.with_file_name(format!(
            "{}.ts",
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        ));
        Ok(self.files.contains_key(&candidate).then_some(candidate))
    }

    async fn exported_resource_names(
        &self,
        filename: &Path,
    ) -> Result<Arc<ResourceNameTable>, ContextError> {
        Ok(Arc::new(self.files.get(filename).cloned().unwrap_or_default()))
    }
}

/// Creates and configures a rule from its module.
pub async fn configured(module: RuleModule, settings: serde_json::Value) -> template_lint_core::RuleBox {
    let settings: Settings = match settings {
        serde_json::Value::Object(map) => map,
        _ => Settings::new(),
    };
    let settings = match module.merge_config {
        Some(merge) => merge(template_lint_core::MergeContext {
            settings,
            parents: &[],
            context: Path::new(APP_DIR),
            is_root: true,
        })
        .unwrap(),
        None => settings,
    };
    let mut rule = (module.create)();
    rule.configure(&settings, &Config::with_context(APP_DIR))
        .await
        .unwrap();
    rule
}

/// Analyzes `source` as `/app/view.html` and evaluates one rule.
pub async fn evaluate(
    rule: &dyn template_lint_core::Rule,
    resolver: &StaticResolver,
    source: &str,
) -> Vec<RuleDiagnostic> {
    let file = TemplateFile::create(resolver, Path::new(APP_DIR).join("view.html"), source).await;
    assert!(file.creation_errors().is_empty(), "{:?}", file.creation_errors());
    let mut ctx = RuleContext::new(&file);
    rule.evaluate(&mut ctx).unwrap();
    ctx.into_diagnostics()
}

/// Pairs each diagnostic message with the source text it points at.
pub fn located(source: &str, diagnostics: &[RuleDiagnostic]) -> Vec<(String, String)> {
    diagnostics
        .iter()
        .map(|d| {
            let text = d
                .position
                .and_then(|span| span.slice(source))
                .unwrap_or_default();
            (d.message.clone(), text.to_string())
        })
        .collect()
}
