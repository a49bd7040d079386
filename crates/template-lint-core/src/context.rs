//! Cross-file resolution shared by all template files of a project.
//!
//! [`ProjectContext`] resolves `<require from="...">` requests to files and
//! extracts the resource names those files export. Both operations are
//! memoized and run under a concurrency limiter. Concurrent lookups of the
//! same key share one in-flight future.

use crate::resource_names::{ResourceKind, ResourceNameTable};
use crate::utils::paths::{is_relative_request, normalize_path};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

/// Extensions probed when a request does not name an existing file.
pub const SOURCE_EXTENSIONS: &[&str] = &["ts", "d.ts"];

/// Errors raised while resolving requests or reading companion sources.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A `package.json` could not be parsed.
    #[error("invalid package manifest {path}: {source}")]
    InvalidPackageManifest {
        /// The manifest path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: Arc<serde_json::Error>,
    },
}

impl ContextError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }
}

/// Extracts exported resource names from a companion source file.
pub trait SourceAnalyzer: Send + Sync {
    /// Returns the resource names declared by `source`.
    fn analyze(&self, filename: &Path, source: &str) -> ResourceNameTable;
}

/// Resolves requires and provides exported resource names.
///
/// [`ProjectContext`] is the filesystem-backed implementation; tests may
/// substitute an in-memory one.
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    /// Resolves `request` relative to `from_dir`.
    ///
    /// Returns `Ok(None)` if the request cannot be found.
    async fn resolve_source_path(
        &self,
        request: &str,
        from_dir: &Path,
    ) -> Result<Option<PathBuf>, ContextError>;

    /// Returns the resource names exported by `filename`.
    async fn exported_resource_names(
        &self,
        filename: &Path,
    ) -> Result<Arc<ResourceNameTable>, ContextError>;

    /// Forgets cached resource names of `filename`. No-op by default.
    fn invalidate_cache(&self, _filename: &Path) {}
}

type SharedResult<T> = Shared<BoxFuture<'static, Result<T, ContextError>>>;

/// Filesystem-backed, caching [`ResourceResolver`].
pub struct ProjectContext {
    src_root: PathBuf,
    limiter: Arc<Semaphore>,
    analyzer: Arc<dyn SourceAnalyzer>,
    resolve_cache: Mutex<HashMap<String, SharedResult<Option<PathBuf>>>>,
    names_cache: Mutex<HashMap<PathBuf, SharedResult<Arc<ResourceNameTable>>>>,
}

impl std::fmt::Debug for ProjectContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectContext")
            .field("src_root", &self.src_root)
            .field("permits", &self.limiter.available_permits())
            .finish_non_exhaustive()
    }
}

impl ProjectContext {
    /// Creates a context with the default analyzer and limiter.
    #[must_use]
    pub fn new(src_root: impl Into<PathBuf>) -> Self {
        Self::with_analyzer(src_root, Arc::new(ClassExportScanner))
    }

    /// Creates a context with a custom source analyzer.
    #[must_use]
    pub fn with_analyzer(src_root: impl Into<PathBuf>, analyzer: Arc<dyn SourceAnalyzer>) -> Self {
        let parallelism = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            src_root: normalize_path(&src_root.into()),
            limiter: Arc::new(Semaphore::new(parallelism.div_ceil(2))),
            analyzer,
            resolve_cache: Mutex::new(HashMap::new()),
            names_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the concurrency limit.
    #[must_use]
    pub fn with_io_limit(mut self, permits: usize) -> Self {
        self.limiter = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    /// Source root used for the last resolution fallback.
    #[must_use]
    pub fn src_root(&self) -> &Path {
        &self.src_root
    }

    /// Forgets the cached resource names of `filename`.
    ///
    /// Path resolutions are kept.
    pub fn invalidate_cache(&self, filename: &Path) {
        let key = normalize_path(filename);
        let mut cache = self.names_cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.remove(&key).is_some() {
            debug!(file = %key.display(), "Invalidated resource names");
        }
    }

    fn resolve_future(&self, request: &str, from_dir: &Path) -> SharedResult<Option<PathBuf>> {
        let limiter = Arc::clone(&self.limiter);
        let src_root = self.src_root.clone();
        let request = request.to_string();
        let from_dir = from_dir.to_path_buf();
        async move {
            let _permit = limiter.acquire().await;
            resolve_with_fallbacks(&request, &from_dir, &src_root).await
        }
        .boxed()
        .shared()
    }

    fn names_future(&self, filename: PathBuf) -> SharedResult<Arc<ResourceNameTable>> {
        let limiter = Arc::clone(&self.limiter);
        let analyzer = Arc::clone(&self.analyzer);
        async move {
            let _permit = limiter.acquire().await;
            if filename.extension().is_some_and(|ext| ext == "html") {
                let mut names = ResourceNameTable::new();
                if let Some(stem) = filename.file_stem().and_then(|s| s.to_str()) {
                    names.add_element(stem, None);
                }
                return Ok(Arc::new(names));
            }
            let source = tokio::fs::read_to_string(&filename)
                .await
                .map_err(|e| ContextError::io(&filename, e))?;
            Ok(Arc::new(analyzer.analyze(&filename, &source)))
        }
        .boxed()
        .shared()
    }
}

#[async_trait]
impl ResourceResolver for ProjectContext {
    async fn resolve_source_path(
        &self,
        request: &str,
        from_dir: &Path,
    ) -> Result<Option<PathBuf>, ContextError> {
        if request.starts_with('.') {
            return self.resolve_future(request, from_dir).await;
        }
        let future = {
            let mut cache = self.resolve_cache.lock().unwrap_or_else(PoisonError::into_inner);
            cache
                .entry(request.to_string())
                .or_insert_with(|| self.resolve_future(request, from_dir))
                .clone()
        };
        future.await
    }

    async fn exported_resource_names(
        &self,
        filename: &Path,
    ) -> Result<Arc<ResourceNameTable>, ContextError> {
        let key = normalize_path(filename);
        let future = {
            let mut cache = self.names_cache.lock().unwrap_or_else(PoisonError::into_inner);
            cache
                .entry(key.clone())
                .or_insert_with(|| self.names_future(key))
                .clone()
        };
        future.await
    }

    fn invalidate_cache(&self, filename: &Path) {
        ProjectContext::invalidate_cache(self, filename);
    }
}

/// Resolves a request, trying the `/src` and source-root fallbacks if the
/// direct resolution finds nothing.
async fn resolve_with_fallbacks(
    request: &str,
    from_dir: &Path,
    src_root: &Path,
) -> Result<Option<PathBuf>, ContextError> {
    if let Some(found) = resolve_module(request, from_dir).await? {
        return Ok(Some(found));
    }
    // Relative and absolute requests never get the `/src` or srcRoot fallbacks.
    if is_relative_request(request) {
        return Ok(None);
    }

    let candidates = [
        insert_src_segment(&UNSCOPED_PACKAGE, request),
        insert_src_segment(&SCOPED_PACKAGE, request),
        (!request.starts_with('.')).then(|| src_root.join(request).display().to_string()),
    ];
    for candidate in candidates.into_iter().flatten() {
        // Errors from fallbacks only mean the fallback does not apply.
        match resolve_module(&candidate, from_dir).await {
            Ok(Some(found)) => {
                debug!(request, resolved = %found.display(), "Resolved through fallback");
                return Ok(Some(found));
            }
            Ok(None) => {}
            Err(e) => debug!(request, candidate = %candidate, error = %e, "Fallback failed"),
        }
    }
    Ok(None)
}

static UNSCOPED_PACKAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^@./][^/]*)(/.+)?$")
        .unwrap_or_else(|e| unreachable!("package pattern is valid: {e}"))
});

static SCOPED_PACKAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(@[^/]+/[^/]+)(/.+)?$")
        .unwrap_or_else(|e| unreachable!("package pattern is valid: {e}"))
});

fn insert_src_segment(pattern: &Regex, request: &str) -> Option<String> {
    let caps = pattern.captures(request)?;
    let rest = caps.get(2).map_or("", |m| m.as_str());
    Some(format!("{}/src{rest}", &caps[1]))
}

/// Module resolution over `.ts`/`.d.ts` files, package manifests and
/// `node_modules` directories. Returns `Ok(None)` if nothing is found.
async fn resolve_module(request: &str, from_dir: &Path) -> Result<Option<PathBuf>, ContextError> {
    if is_relative_request(request) {
        let path = normalize_path(&from_dir.join(request));
        return resolve_path(&path).await;
    }
    for dir in from_dir.ancestors() {
        if dir.file_name().is_some_and(|name| name == "node_modules") {
            continue;
        }
        let path = normalize_path(&dir.join("node_modules").join(request));
        if let Some(found) = resolve_path(&path).await? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

async fn resolve_path(path: &Path) -> Result<Option<PathBuf>, ContextError> {
    if let Some(found) = resolve_file(path).await {
        return Ok(Some(found));
    }
    resolve_directory(path).await
}

async fn resolve_file(path: &Path) -> Option<PathBuf> {
    if is_file(path).await {
        return Some(path.to_path_buf());
    }
    let name = path.file_name()?.to_str()?;
    for ext in SOURCE_EXTENSIONS {
        let candidate = path.with_file_name(format!("{name}.{ext}"));
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }
    None
}

async fn resolve_directory(dir: &Path) -> Result<Option<PathBuf>, ContextError> {
    let manifest = dir.join("package.json");
    if is_file(&manifest).await {
        let text = tokio::fs::read_to_string(&manifest)
            .await
            .map_err(|e| ContextError::io(&manifest, e))?;
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| ContextError::InvalidPackageManifest {
                path: manifest.clone(),
                source: Arc::new(e),
            })?;
        for key in ["main", "types", "typings"] {
            let Some(entry) = value.get(key).and_then(serde_json::Value::as_str) else {
                continue;
            };
            let entry = normalize_path(&dir.join(entry));
            if let Some(found) = resolve_file(&entry).await {
                return Ok(Some(found));
            }
            if let Some(found) = resolve_index(&entry).await {
                return Ok(Some(found));
            }
        }
    }
    Ok(resolve_index(dir).await)
}

async fn resolve_index(dir: &Path) -> Option<PathBuf> {
    for ext in SOURCE_EXTENSIONS {
        let candidate = dir.join(format!("index.{ext}"));
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }
    None
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

const RESOURCE_SUFFIXES: &[(&str, ResourceKind)] = &[
    ("CustomElement", ResourceKind::Element),
    ("ValueConverter", ResourceKind::ValueConverter),
    ("BindingBehavior", ResourceKind::BindingBehavior),
    ("CustomAttribute", ResourceKind::Attribute),
];

static EXPORTED_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"((?:@[A-Za-z_$][\w$.]*\s*(?:\([^)]*\)\s*)?)*)export\s+(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)",
    )
    .unwrap_or_else(|e| unreachable!("class pattern is valid: {e}"))
});

static DECORATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"@(customElement|valueConverter|bindingBehavior|customAttribute)\s*\(\s*(?:"([^"]*)"|'([^']*)')"#,
    )
    .unwrap_or_else(|e| unreachable!("decorator pattern is valid: {e}"))
});

/// Default [`SourceAnalyzer`]: scans exported class declarations.
///
/// A class named `FooValueConverter` exports the value converter `foo`;
/// the suffixes `CustomElement`, `BindingBehavior` and `CustomAttribute`
/// work the same way and unsuffixed classes export an element. Decorators
/// such as `@customElement("x-foo")` directly before the class add an
/// explicitly named entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassExportScanner;

impl SourceAnalyzer for ClassExportScanner {
    fn analyze(&self, _filename: &Path, source: &str) -> ResourceNameTable {
        let mut names = ResourceNameTable::new();
        for caps in EXPORTED_CLASS.captures_iter(source) {
            let class = &caps[2];
            let (kind, name) = RESOURCE_SUFFIXES
                .iter()
                .find_map(|&(suffix, kind)| class.strip_suffix(suffix).map(|name| (kind, name)))
                .unwrap_or((ResourceKind::Element, class));
            if !name.is_empty() {
                names.add(kind, name, None);
            }

            for decorator in DECORATOR.captures_iter(&caps[1]) {
                let Some(value) = decorator.get(2).or_else(|| decorator.get(3)) else {
                    continue;
                };
                let kind = match &decorator[1] {
                    "customElement" => ResourceKind::Element,
                    "valueConverter" => ResourceKind::ValueConverter,
                    "bindingBehavior" => ResourceKind::BindingBehavior,
                    _ => ResourceKind::Attribute,
                };
                names.add(kind, value.as_str(), None);
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner_suffixes() {
        let source = r"
            export class UserCard {}
            export class DateFormatValueConverter {}
            export class ThrottleNowBindingBehavior {}
            export default class TooltipCustomAttribute {}
            export class ListCustomElement {}
            class Hidden {}
        ";
        let names = ClassExportScanner.analyze(Path::new("x.ts"), source);
        assert!(names.contains(ResourceKind::Element, "user-card"));
        assert!(names.contains(ResourceKind::Element, "list"));
        assert!(names.contains(ResourceKind::ValueConverter, "dateFormat"));
        assert!(names.contains(ResourceKind::BindingBehavior, "throttleNow"));
        assert!(names.contains(ResourceKind::Attribute, "tooltip"));
        assert!(!names.contains(ResourceKind::Element, "hidden"));
    }

    #[test]
    fn test_scanner_decorators() {
        let source = r#"
            @customElement("fancy-button")
            @inject(Foo)
            export class Button {}

            @valueConverter('money')
            export class Currency {}
        "#;
        let names = ClassExportScanner.analyze(Path::new("x.ts"), source);
        assert!(names.contains(ResourceKind::Element, "fancy-button"));
        assert!(names.contains(ResourceKind::Element, "button"));
        assert!(names.contains(ResourceKind::ValueConverter, "money"));
        assert!(names.contains(ResourceKind::Element, "currency"));
    }

    #[test]
    fn test_scanner_decorators_without_arguments() {
        let source = r#"
            @customElement("nav-bar")
            @autoinject
            @containerless()
            export class Navigation {}
        "#;
        let names = ClassExportScanner.analyze(Path::new("x.ts"), source);
        assert!(names.contains(ResourceKind::Element, "nav-bar"));
        assert!(names.contains(ResourceKind::Element, "navigation"));
    }

    #[test]
    fn test_insert_src_segment() {
        assert_eq!(
            insert_src_segment(&UNSCOPED_PACKAGE, "pkg/views/a").as_deref(),
            Some("pkg/src/views/a")
        );
        assert_eq!(insert_src_segment(&UNSCOPED_PACKAGE, "pkg").as_deref(), Some("pkg/src"));
        assert_eq!(insert_src_segment(&UNSCOPED_PACKAGE, "@s/pkg/a"), None);
        assert_eq!(
            insert_src_segment(&SCOPED_PACKAGE, "@s/pkg/a").as_deref(),
            Some("@s/pkg/src/a")
        );
        assert_eq!(insert_src_segment(&SCOPED_PACKAGE, "pkg/a"), None);
    }
}
