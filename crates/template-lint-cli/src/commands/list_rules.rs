//! List rules command implementation.

use template_lint_rules::BUILTIN_RULES;

/// Runs the list-rules command.
pub fn run() {
    println!("Available rules:\n");
    println!("{:<28} Description", "Name");
    println!("{}", "-".repeat(80));

    for module in BUILTIN_RULES {
        let settings = if module.merge_config.is_some() {
            " (merges inherited settings)"
        } else {
            ""
        };
        println!("{:<28} {}{settings}", module.name, module.description);
    }

    println!("\nEnable rules in template-lint.toml, e.g.:");
    println!("  [rules]");
    println!("  no-invalid-bindings = \"error\"");
    println!("\nUse --rules to run a subset of the configured rules, e.g.:");
    println!("  template-lint check --rules no-invalid-bindings,no-duplicate-requires");
}
