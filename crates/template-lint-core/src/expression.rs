//! Binding-expression parsing.
//!
//! Expressions are parsed only as deep as linting needs: the chain of
//! binding behaviors (`& name:arg`) and value converters (`| name:arg`)
//! wrapping a core expression, plus a structural check of the core.

use thiserror::Error;

/// Errors raised for malformed binding expressions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// The expression or one of its parts is empty.
    #[error("empty expression")]
    Empty,

    /// A bracket is not closed or a closing bracket has no opener.
    #[error("unbalanced bracket at offset {offset}")]
    UnbalancedBracket {
        /// Offset of the offending bracket.
        offset: usize,
    },

    /// A string literal is not terminated.
    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString {
        /// Offset of the opening quote.
        offset: usize,
    },

    /// The expression ends with an operator.
    #[error("expression ends with operator {operator:?}")]
    TrailingOperator {
        /// The trailing operator character.
        operator: char,
    },

    /// A converter or behavior name is not an identifier.
    #[error("invalid name {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },
}

/// Kind of a wrapping expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperKind {
    /// `expr & name`.
    BindingBehavior,
    /// `expr | name`.
    ValueConverter,
}

/// A parsed binding expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// A value converter or binding behavior applied to an inner expression.
    Wrapped {
        /// Wrapper kind.
        kind: WrapperKind,
        /// Converter or behavior name.
        name: String,
        /// Raw argument expressions.
        args: Vec<String>,
        /// The wrapped expression.
        inner: Box<Expression>,
    },
    /// The core expression, kept as trimmed source text.
    Value(String),
}

impl Expression {
    /// Parses a binding expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is structurally invalid.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        check_structure(source)?;

        let mut behaviors = split_top_level(source, '&');
        let converted = behaviors.remove(0);
        let mut converters = split_top_level(converted, '|');
        let core = converters.remove(0);
        check_value(core)?;

        let mut expression = Self::Value(core.trim().to_string());
        for segment in converters {
            expression = wrap(WrapperKind::ValueConverter, segment, expression)?;
        }
        for segment in behaviors {
            expression = wrap(WrapperKind::BindingBehavior, segment, expression)?;
        }
        Ok(expression)
    }

    /// Iterates over wrappers from the outermost inward as `(kind, name)`.
    pub fn wrappers(&self) -> impl Iterator<Item = (WrapperKind, &str)> {
        let mut current = Some(self);
        std::iter::from_fn(move || match current? {
            Self::Wrapped {
                kind, name, inner, ..
            } => {
                current = Some(&**inner);
                Some((*kind, name.as_str()))
            }
            Self::Value(_) => {
                current = None;
                None
            }
        })
    }

    /// The innermost core expression text.
    #[must_use]
    pub fn core(&self) -> &str {
        match self {
            Self::Wrapped { inner, .. } => inner.core(),
            Self::Value(value) => value,
        }
    }
}

fn wrap(kind: WrapperKind, segment: &str, inner: Expression) -> Result<Expression, ExpressionError> {
    let mut parts = split_top_level(segment, ':').into_iter();
    let name = parts.next().unwrap_or_default().trim();
    let is_identifier = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if !is_identifier {
        return Err(if name.is_empty() {
            ExpressionError::Empty
        } else {
            ExpressionError::InvalidName {
                name: name.to_string(),
            }
        });
    }

    let args = parts
        .map(|arg| check_value(arg).map(|()| arg.trim().to_string()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Expression::Wrapped {
        kind,
        name: name.to_string(),
        args,
        inner: Box::new(inner),
    })
}

/// Splits at top-level occurrences of `separator`, ignoring doubled
/// separators (`&&`, `||`) and anything inside quotes or brackets.
fn split_top_level(source: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    let chars: Vec<(usize, char)> = source.char_indices().collect();

    for (i, &(offset, c)) in chars.iter().enumerate() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if c == separator && depth == 0 => {
                let prev = i.checked_sub(1).map(|j| chars[j].1);
                let next = chars.get(i + 1).map(|&(_, n)| n);
                let doubled = separator != ':' && (prev == Some(c) || next == Some(c));
                if !doubled {
                    parts.push(&source[start..offset]);
                    start = offset + c.len_utf8();
                }
            }
            _ => {}
        }
    }
    parts.push(&source[start..]);
    parts
}

/// Checks string termination and bracket balance over the whole source.
fn check_structure(source: &str) -> Result<(), ExpressionError> {
    let mut brackets: Vec<(char, usize)> = Vec::new();
    let mut quote: Option<(char, usize)> = None;
    let mut escaped = false;

    for (offset, c) in source.char_indices() {
        if let Some((q, _)) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some((c, offset)),
            '(' | '[' | '{' => brackets.push((c, offset)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match brackets.pop() {
                    Some((open, _)) if open == expected => {}
                    _ => return Err(ExpressionError::UnbalancedBracket { offset }),
                }
            }
            _ => {}
        }
    }

    if let Some((_, offset)) = quote {
        return Err(ExpressionError::UnterminatedString { offset });
    }
    if let Some(&(_, offset)) = brackets.last() {
        return Err(ExpressionError::UnbalancedBracket { offset });
    }
    Ok(())
}

fn check_value(value: &str) -> Result<(), ExpressionError> {
    let trimmed = value.trim();
    let Some(last) = trimmed.chars().last() else {
        return Err(ExpressionError::Empty);
    };
    if "+-*/%=<>!&|?:.,".contains(last) {
        return Err(ExpressionError::TrailingOperator { operator: last });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_value() {
        let expression = Expression::parse(" user.name ").unwrap();
        assert_eq!(expression, Expression::Value("user.name".into()));
        assert_eq!(expression.wrappers().count(), 0);
    }

    #[test]
    fn test_behaviors_wrap_converters() {
        let expression =
            Expression::parse("date | format:'YYYY' | upper & throttle:200 & signal:'x'").unwrap();
        let wrappers: Vec<_> = expression.wrappers().collect();
        assert_eq!(
            wrappers,
            vec![
                (WrapperKind::BindingBehavior, "signal"),
                (WrapperKind::BindingBehavior, "throttle"),
                (WrapperKind::ValueConverter, "upper"),
                (WrapperKind::ValueConverter, "format"),
            ]
        );
        assert_eq!(expression.core(), "date");

        let Expression::Wrapped { args, .. } = &expression else {
            panic!("expected wrapper");
        };
        assert_eq!(args, &vec!["'x'".to_string()]);
    }

    #[test]
    fn test_logical_operators_are_not_separators() {
        let expression = Expression::parse("a && b || c").unwrap();
        assert_eq!(expression, Expression::Value("a && b || c".into()));
    }

    #[test]
    fn test_separators_inside_strings_and_calls() {
        let expression = Expression::parse("join(a | b, '&') | trim").unwrap();
        assert_eq!(
            expression.wrappers().collect::<Vec<_>>(),
            vec![(WrapperKind::ValueConverter, "trim")]
        );
        assert_eq!(expression.core(), "join(a | b, '&')");
    }

    #[test]
    fn test_ternary_core_is_kept() {
        let expression = Expression::parse("a ? b : c").unwrap();
        assert_eq!(expression.core(), "a ? b : c");
    }

    #[test]
    fn test_invalid_expressions() {
        assert_eq!(Expression::parse("  "), Err(ExpressionError::Empty));
        assert_eq!(
            Expression::parse("a +"),
            Err(ExpressionError::TrailingOperator { operator: '+' })
        );
        assert_eq!(
            Expression::parse("foo(a"),
            Err(ExpressionError::UnbalancedBracket { offset: 3 })
        );
        assert_eq!(
            Expression::parse("a)"),
            Err(ExpressionError::UnbalancedBracket { offset: 1 })
        );
        assert_eq!(
            Expression::parse("'open"),
            Err(ExpressionError::UnterminatedString { offset: 0 })
        );
        assert_eq!(Expression::parse("a |"), Err(ExpressionError::Empty));
        assert_eq!(
            Expression::parse("a | 1x"),
            Err(ExpressionError::InvalidName { name: "1x".into() })
        );
        assert_eq!(
            Expression::parse("a | fmt:"),
            Err(ExpressionError::Empty)
        );
    }
}
