//! Rule flagging binding expressions that do not parse.

use template_lint_core::{
    Expression, Rule, RuleBox, RuleContext, RuleDiagnostic, RuleError, RuleModule,
};

/// Rule name for no-invalid-bindings.
pub const NAME: &str = "no-invalid-bindings";

const DESCRIPTION: &str = "Flags binding expressions with invalid syntax";

/// Registry entry for no-invalid-bindings.
pub const MODULE: RuleModule = RuleModule {
    name: NAME,
    description: DESCRIPTION,
    create,
    merge_config: None,
};

fn create() -> RuleBox {
    Box::new(NoInvalidBindings)
}

/// Flags attribute and interpolation bindings with invalid syntax.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInvalidBindings;

impl Rule for NoInvalidBindings {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        DESCRIPTION
    }

    fn evaluate(&self, ctx: &mut RuleContext<'_>) -> Result<(), RuleError> {
        for binding in ctx.file().bindings() {
            if let Err(e) = Expression::parse(&binding.expression) {
                ctx.emit(
                    RuleDiagnostic::new("Binding contains invalid syntax", binding.span)
                        .with_details(e.to_string()),
                );
            }
        }
        Ok(())
    }
}
