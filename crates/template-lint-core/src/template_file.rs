//! The analyzed representation of one template file.

use crate::binding::{extract_bindings, Binding};
use crate::context::{ContextError, ResourceResolver};
use crate::markup::{Element, Tree};
use crate::position::{Position, PositionConverter};
use crate::regions::DisabledRegions;
use crate::resource_names::ResourceNameTable;
use crate::types::{Diagnostic, Severity, Span};
use crate::utils::paths::normalize_path;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A `<require from="...">` element of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    /// The raw `from` value.
    pub request: String,
    /// Span of the `from` attribute.
    pub span: Span,
    /// The resolved file, if resolution succeeded.
    pub resolved: Option<PathBuf>,
}

/// A parsed and analyzed template file.
///
/// Created once per filename and source text and never modified afterwards.
#[derive(Debug)]
pub struct TemplateFile {
    filename: PathBuf,
    dirname: PathBuf,
    source: String,
    tree: Tree,
    converter: PositionConverter,
    disabled_regions: DisabledRegions,
    resource_names: ResourceNameTable,
    bindings: Vec<Binding>,
    requires: Vec<Require>,
    creation_errors: Vec<Diagnostic>,
    notices: Vec<Diagnostic>,
}

impl TemplateFile {
    /// Parses and analyzes a template.
    ///
    /// Never fails: parse and resolution errors are recorded as creation
    /// errors, unresolved requires as warning notices.
    pub async fn create(
        resolver: &dyn ResourceResolver,
        filename: impl AsRef<Path>,
        source: impl Into<String>,
    ) -> Self {
        let filename = normalize_path(filename.as_ref());
        let dirname = filename
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let source = source.into();
        let converter = PositionConverter::new(&source);
        let mut creation_errors = Vec::new();

        let tree = match Tree::parse(&source) {
            Ok(tree) => tree,
            Err(e) => {
                creation_errors.push(Diagnostic::file_level(
                    Severity::Error,
                    format!("Failed to parse template: {e}"),
                ));
                Tree::default()
            }
        };

        let disabled_regions = DisabledRegions::from_comments(tree.comments(), &converter, source.len());
        let bindings = extract_bindings(&tree);

        let mut require_elements = Vec::new();
        tree.traverse_elements(|element| {
            if element.name() == "require" {
                if let Some(from) = element.attr("from").filter(|a| !a.value.is_empty()) {
                    require_elements.push((from.value.clone(), from.span));
                }
            }
            true
        });

        let companion = resolve_companion(resolver, &filename, &dirname);
        let resolved_requires = join_all(require_elements.into_iter().map(|(request, span)| {
            let dirname = &dirname;
            async move {
                let outcome = resolve_require(resolver, &request, dirname).await;
                (request, span, outcome)
            }
        }));
        let (companion, resolved_requires) = futures::join!(companion, resolved_requires);

        let mut resource_names = ResourceNameTable::new();
        if let Some(names) = companion {
            resource_names.merge(&names, None);
        }

        let mut requires = Vec::new();
        let mut notices = Vec::new();
        for (request, span, outcome) in resolved_requires {
            let resolved = match outcome {
                Ok(Some((path, names))) => {
                    resource_names.merge(&names, Some(span));
                    Some(path)
                }
                Ok(None) => {
                    notices.push(
                        Diagnostic::file_level(
                            Severity::Warn,
                            format!("Unable to resolve require {request:?}."),
                        )
                        .with_position(span),
                    );
                    None
                }
                Err(e) => {
                    creation_errors.push(
                        Diagnostic::file_level(
                            Severity::Error,
                            format!("Failed to resolve require {request:?}."),
                        )
                        .with_details(e.to_string()),
                    );
                    None
                }
            };
            requires.push(Require {
                request,
                span,
                resolved,
            });
        }

        debug!(
            file = %filename.display(),
            bindings = bindings.len(),
            requires = requires.len(),
            errors = creation_errors.len(),
            "Created template file"
        );

        Self {
            filename,
            dirname,
            source,
            tree,
            converter,
            disabled_regions,
            resource_names,
            bindings,
            requires,
            creation_errors,
            notices,
        }
    }

    /// Reads and analyzes a template from disk.
    ///
    /// A read failure is recorded as a creation error of an empty file.
    pub async fn read(resolver: &dyn ResourceResolver, filename: impl AsRef<Path>) -> Self {
        let filename = filename.as_ref();
        match tokio::fs::read_to_string(filename).await {
            Ok(source) => Self::create(resolver, filename, source).await,
            Err(e) => {
                let mut file = Self::create(resolver, filename, String::new()).await;
                file.creation_errors.push(Diagnostic::file_level(
                    Severity::Error,
                    format!("Failed to read template: {e}"),
                ));
                file
            }
        }
    }

    /// Normalized filename.
    #[must_use]
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Directory containing the file.
    #[must_use]
    pub fn dirname(&self) -> &Path {
        &self.dirname
    }

    /// Source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parse tree. Empty if parsing failed.
    #[must_use]
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Offset to line/character conversion for this file.
    #[must_use]
    pub fn position_converter(&self) -> &PositionConverter {
        &self.converter
    }

    /// Converts an offset of this file to a position.
    #[must_use]
    pub fn position(&self, offset: usize) -> Option<Position> {
        self.converter.offset_to_position(offset)
    }

    /// Regions in which rules are suppressed.
    #[must_use]
    pub fn disabled_regions(&self) -> &DisabledRegions {
        &self.disabled_regions
    }

    /// Resource names in scope of this template.
    #[must_use]
    pub fn resource_names(&self) -> &ResourceNameTable {
        &self.resource_names
    }

    /// Bindings in document order.
    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// `<require>` elements in document order.
    #[must_use]
    pub fn requires(&self) -> &[Require] {
        &self.requires
    }

    /// Errors that prevent rule evaluation.
    #[must_use]
    pub fn creation_errors(&self) -> &[Diagnostic] {
        &self.creation_errors
    }

    /// Warnings about unresolved requires.
    #[must_use]
    pub fn notices(&self) -> &[Diagnostic] {
        &self.notices
    }

    /// Visits elements depth-first; returning `false` skips the subtree.
    pub fn traverse_elements<'a>(&'a self, visit: impl FnMut(Element<'a>) -> bool) {
        self.tree.traverse_elements(visit);
    }
}

/// Names exported by the file's own companion source, if any.
async fn resolve_companion(
    resolver: &dyn ResourceResolver,
    filename: &Path,
    dirname: &Path,
) -> Option<Arc<ResourceNameTable>> {
    let name = filename.file_name()?.to_str()?;
    let stem = name.strip_suffix(".html").unwrap_or(name);
    let path = resolver
        .resolve_source_path(&format!("./{stem}"), dirname)
        .await
        .ok()
        .flatten()?;
    match resolver.exported_resource_names(&path).await {
        Ok(names) => Some(names),
        Err(e) => {
            debug!(file = %path.display(), error = %e, "Ignoring companion source");
            None
        }
    }
}

async fn resolve_require(
    resolver: &dyn ResourceResolver,
    request: &str,
    dirname: &Path,
) -> Result<Option<(PathBuf, Arc<ResourceNameTable>)>, ContextError> {
    let Some(path) = resolver.resolve_source_path(request, dirname).await? else {
        return Ok(None);
    };
    let names = resolver.exported_resource_names(&path).await?;
    Ok(Some((path, names)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_names::ResourceKind;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// Resolves requests against a fixed name table.
    #[derive(Default)]
    struct StaticResolver {
        files: HashMap<String, ResourceNameTable>,
        failing: Vec<String>,
    }

    impl StaticResolver {
        fn with_element(mut self, request: &str, element: &str) -> Self {
            self.files
                .entry(request.to_string())
                .or_default()
                .add_element(element, None);
            self
        }

        fn failing(mut self, request: &str) -> Self {
            self.failing.push(request.to_string());
            self
        }
    }

    #[async_trait]
    impl ResourceResolver for StaticResolver {
        async fn resolve_source_path(
            &self,
            request: &str,
            _from_dir: &Path,
        ) -> Result<Option<PathBuf>, ContextError> {
            let request = request.strip_prefix("./").unwrap_or(request);
            if self.failing.iter().any(|f| f == request) {
                return Err(ContextError::Io {
                    path: PathBuf::from(request),
                    source: Arc::new(std::io::Error::other("boom")),
                });
            }
            Ok(self
                .files
                .contains_key(request)
                .then(|| PathBuf::from(request)))
        }

        async fn exported_resource_names(
            &self,
            filename: &Path,
        ) -> Result<Arc<ResourceNameTable>, ContextError> {
            let key = filename.to_string_lossy().to_string();
            Ok(Arc::new(self.files.get(&key).cloned().unwrap_or_default()))
        }
    }

    #[tokio::test]
    async fn test_companion_and_requires_are_merged() {
        let resolver = StaticResolver::default()
            .with_element("view", "view")
            .with_element("card", "user-card");
        let source = r#"<template><require from="./card"></require><user-card></user-card></template>"#;
        let file = TemplateFile::create(&resolver, "/app/view.html", source).await;

        assert!(file.creation_errors().is_empty());
        let names = file.resource_names();
        assert_eq!(names.declared_at(ResourceKind::Element, "view"), Some(None));

        let from = source.find("from=").unwrap();
        let span = Span::new(from, from + r#"from="./card""#.len());
        assert_eq!(names.declared_at(ResourceKind::Element, "user-card"), Some(Some(span)));
        assert_eq!(
            file.requires(),
            &[Require {
                request: "./card".into(),
                span,
                resolved: Some(PathBuf::from("card")),
            }]
        );
    }

    #[tokio::test]
    async fn test_unresolved_require_is_a_notice() {
        let resolver = StaticResolver::default();
        let file = TemplateFile::create(&resolver, "view.html", r#"<require from="./missing">"#).await;

        assert!(file.creation_errors().is_empty());
        assert_eq!(file.notices().len(), 1);
        assert_eq!(file.notices()[0].severity, Severity::Warn);
        assert_eq!(file.requires()[0].resolved, None);
    }

    #[tokio::test]
    async fn test_resolution_error_is_a_creation_error() {
        let resolver = StaticResolver::default().failing("broken");
        let file = TemplateFile::create(
            &resolver,
            "view.html",
            r#"<require from="./broken"></require><require from="./other"></require>"#,
        )
        .await;

        assert_eq!(file.creation_errors().len(), 1);
        assert_eq!(file.creation_errors()[0].severity, Severity::Error);
        assert_eq!(file.requires().len(), 2);
        assert_eq!(file.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_parse_error_is_a_creation_error() {
        let resolver = StaticResolver::default();
        let file = TemplateFile::create(&resolver, "view.html", "<div <!-- x").await;

        assert_eq!(file.creation_errors().len(), 1);
        assert!(file.creation_errors()[0].message.starts_with("Failed to parse template"));
        assert_eq!(file.creation_errors()[0].position, None);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_a_creation_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let resolver = StaticResolver::default();
        let file = TemplateFile::read(&resolver, dir.path().join("missing.html")).await;

        assert_eq!(file.creation_errors().len(), 1);
        assert!(file.creation_errors()[0].message.starts_with("Failed to read template"));
        assert_eq!(file.source(), "");
    }

    #[tokio::test]
    async fn test_regions_and_bindings() {
        let resolver = StaticResolver::default();
        let source = "<!-- template-lint-disable r -->\n<p title.bind=\"a\">${b}</p>";
        let file = TemplateFile::create(&resolver, "/x/../app/view.html", source).await;

        assert_eq!(file.filename(), Path::new("/app/view.html"));
        assert_eq!(file.dirname(), Path::new("/app"));
        assert!(file.disabled_regions().has("r", source.len() - 1));
        assert_eq!(file.bindings().len(), 2);
        assert_eq!(file.position(source.len()), Some(Position::new(1, 26)));
    }
}
