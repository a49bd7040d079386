//! Rule flagging `<require>` elements that import an already imported file.
//!
//! Requires are grouped by their resolved file, so `./a` and `./lib/../a`
//! count as the same import. Unresolved requires are never reported.

use indexmap::IndexMap;
use std::path::Path;
use template_lint_core::{Rule, RuleBox, RuleContext, RuleDiagnostic, RuleError, RuleModule};
use tracing::trace;

/// Rule name for no-duplicate-requires.
pub const NAME: &str = "no-duplicate-requires";

const DESCRIPTION: &str = "Flags <require> elements importing the same file twice";

/// Registry entry for no-duplicate-requires.
pub const MODULE: RuleModule = RuleModule {
    name: NAME,
    description: DESCRIPTION,
    create,
    merge_config: None,
};

fn create() -> RuleBox {
    Box::new(NoDuplicateRequires)
}

/// Flags every require after the first one for the same resolved file.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDuplicateRequires;

impl Rule for NoDuplicateRequires {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    fn evaluate(&self, ctx: &mut RuleContext<'_>) -> Result<(), RuleError> {
        let mut by_file: IndexMap<&Path, Vec<_>> = IndexMap::new();
        for require in ctx.file().requires() {
            match &require.resolved {
                Some(resolved) => by_file.entry(resolved.as_path()).or_default().push(require.span),
                None => trace!(request = %require.request, "Unresolved require left to the engine"),
            }
        }

        for spans in by_file.values() {
            for &span in spans.iter().skip(1) {
                ctx.emit(RuleDiagnostic::new("Duplicate require can be removed.", span));
            }
        }
        Ok(())
    }
}
