//! Server-side expressions and named placeholder scanning
//!
//! Expressions are kept as text. The only processing done here is lexical:
//! quoted strings and quoted identifiers are skipped, `:name` placeholders are
//! located, and unterminated quotes are reported. No SQL parsing happens.

use std::fmt::{self, Display};
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::builder::common::Bindings;
use crate::{Error, Result, Value};

/// An expression evaluated by the server, created with [`expr`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expression {
    data: String,
}

impl Expression {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    /// The text used to create this expression
    pub fn data(&self) -> &str {
        &self.data
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.data)
    }
}

/// Create a server-side expression
///
/// # Examples
/// ```
/// use xdevapi_core::expr;
///
/// let next_year = expr("age + 1");
/// assert_eq!(next_year.data(), "age + 1");
/// ```
pub fn expr(data: impl Into<String>) -> Expression {
    Expression::new(data)
}

/// Trait for arguments accepted as a filter or condition expression
pub trait IntoExpression {
    fn into_expression(self, context: &str) -> Result<String>;
}

impl IntoExpression for &str {
    fn into_expression(self, context: &str) -> Result<String> {
        self.to_string().into_expression(context)
    }
}

impl IntoExpression for &String {
    fn into_expression(self, context: &str) -> Result<String> {
        self.clone().into_expression(context)
    }
}

impl IntoExpression for String {
    fn into_expression(self, context: &str) -> Result<String> {
        if self.trim().is_empty() {
            return Err(Error::invalid_argument(context, "Expression can not be empty"));
        }
        Ok(self)
    }
}

impl IntoExpression for Expression {
    fn into_expression(self, context: &str) -> Result<String> {
        self.data.into_expression(context)
    }
}

impl IntoExpression for Value {
    fn into_expression(self, context: &str) -> Result<String> {
        match self {
            Value::String(s) => s.into_expression(context),
            Value::Expr(e) => e.into_expression(context),
            _ => Err(Error::invalid_argument(
                context,
                "Argument #1 is expected to be a string",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PlaceholderRef {
    name: String,
    span: Range<usize>,
}

/// Expression text with the location of every `:name` placeholder
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedExpr {
    text: String,
    placeholders: Vec<PlaceholderRef>,
}

impl ParsedExpr {
    /// Scan `text`, failing on unterminated quotes
    pub(crate) fn parse(context: &str, text: String) -> Result<Self> {
        let bytes = text.as_bytes();
        let mut placeholders = Vec::new();
        let mut pos = 0;

        while pos < bytes.len() {
            match bytes[pos] {
                quote @ (b'\'' | b'"') => {
                    pos = skip_quoted(bytes, pos, quote, true).ok_or_else(|| {
                        Error::invalid_argument(
                            context,
                            format!("Unterminated quoted string starting at position {}", pos + 1),
                        )
                    })?;
                }
                b'`' => {
                    pos = skip_quoted(bytes, pos, b'`', false).ok_or_else(|| {
                        Error::invalid_argument(
                            context,
                            format!(
                                "Unterminated quoted identifier starting at position {}",
                                pos + 1
                            ),
                        )
                    })?;
                }
                b':' if bytes.get(pos + 1).copied().is_some_and(is_name_byte) => {
                    let start = pos;
                    pos += 1;
                    while bytes.get(pos).copied().is_some_and(is_name_byte) {
                        pos += 1;
                    }
                    placeholders.push(PlaceholderRef {
                        name: text[start + 1..pos].to_string(),
                        span: start..pos,
                    });
                }
                _ => pos += 1,
            }
        }

        Ok(Self { text, placeholders })
    }

    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    /// Placeholder names in order of appearance, repeats included
    pub(crate) fn placeholder_names(&self) -> impl Iterator<Item = &str> {
        self.placeholders.iter().map(|p| p.name.as_str())
    }

    /// Append the expression to `sql`, replacing placeholders with `?` markers
    pub(crate) fn render(
        &self,
        context: &str,
        bindings: &Bindings,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) -> Result<()> {
        let mut cursor = 0;
        for placeholder in &self.placeholders {
            sql.push_str(&self.text[cursor..placeholder.span.start]);
            let value = bindings.get(&placeholder.name).ok_or_else(|| {
                Error::unbound_placeholders(context, vec![placeholder.name.clone()])
            })?;
            match value {
                Value::Expr(inner) => {
                    let inner = ParsedExpr::parse(context, inner.data().to_string())?;
                    if !inner.placeholders.is_empty() {
                        return Err(Error::invalid_argument(
                            context,
                            format!(
                                "Expression bound to placeholder '{}' can not contain placeholders",
                                placeholder.name
                            ),
                        ));
                    }
                    sql.push('(');
                    sql.push_str(inner.text());
                    sql.push(')');
                }
                other => {
                    sql.push('?');
                    params.push(other.clone());
                }
            }
            cursor = placeholder.span.end;
        }
        sql.push_str(&self.text[cursor..]);
        Ok(())
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Return the position just past the closing quote, or `None` if unterminated
fn skip_quoted(bytes: &[u8], start: usize, quote: u8, backslash_escapes: bool) -> Option<usize> {
    let mut pos = start + 1;
    while pos < bytes.len() {
        let b = bytes[pos];
        if backslash_escapes && b == b'\\' {
            pos += 2;
            continue;
        }
        if b == quote {
            // A doubled quote is an escaped quote
            if bytes.get(pos + 1) == Some(&quote) {
                pos += 2;
                continue;
            }
            return Some(pos + 1);
        }
        pos += 1;
    }
    None
}

/// Count `?` markers outside quotes, used by raw SQL statements
pub(crate) fn count_positional_markers(context: &str, sql: &str) -> Result<usize> {
    let bytes = sql.as_bytes();
    let mut count = 0;
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            quote @ (b'\'' | b'"' | b'`') => {
                pos = skip_quoted(bytes, pos, quote, quote != b'`').ok_or_else(|| {
                    Error::invalid_argument(
                        context,
                        format!("Unterminated quoted string starting at position {}", pos + 1),
                    )
                })?;
            }
            b'?' => {
                count += 1;
                pos += 1;
            }
            _ => pos += 1,
        }
    }
    Ok(count)
}
