//! Init command implementation.

use anyhow::{bail, Context, Result};
use std::path::Path;

const CONFIG_NAME: &str = "template-lint.toml";

const DEFAULT_CONFIG: &str = r#"# template-lint configuration

# Directory used to resolve non-relative <require> requests.
srcRoot = "./src"

# Glob patterns selecting template files, relative to this file.
include = ["./src/**/*.html"]

# Inherit rules from other config files. Local settings are merged first.
# extends = ["./base-template-lint.toml"]

# Each rule is a severity ("info", "warn" or "error"), a
# [severity, settings] pair or a settings table.

[rules]
no-invalid-bindings = "error"
no-duplicate-requires = "warn"
html-custom-element-compat = "error"

[rules.require-view-resources]
ignoreElements = ["a", "button", "div", "form", "input", "label", "li", "p", "span", "ul"]

# [rules.attribute-usage.elements.img]
# require = ["alt"]

# [rules.element-nesting.elements.ul]
# allow = ["li"]
# allowText = false
"#;

/// Runs the init command in the current directory.
pub fn run(force: bool) -> Result<()> {
    let path = write_config(Path::new("."), force)?;

    println!("Created {}", path.display());
    println!("\nNext steps:");
    println!("  1. Edit {CONFIG_NAME} to configure rules");
    println!("  2. Run: template-lint check");

    Ok(())
}

/// Writes the starter config into `dir`.
fn write_config(dir: &Path, force: bool) -> Result<std::path::PathBuf> {
    let config_path = dir.join(CONFIG_NAME);

    if config_path.exists() && !force {
        bail!(
            "Configuration file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    Ok(config_path)
}
