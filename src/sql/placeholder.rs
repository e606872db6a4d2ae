//! Positional placeholder rewriting
//!
//! Query texts are emitted with `?` placeholders. PostgreSQL wants `$n`, and
//! array arguments bound to `IN (?)` must be spread over one parameter per
//! element.

use crate::error::{GridError, Result};

/// Rewrite `?` placeholders to `$n` and flatten array arguments
///
/// Placeholders inside single-quoted literals or double-quoted identifiers
/// are left alone. An empty array becomes `NULL`.
pub fn rewrite_placeholders(
    sql: &str,
    arguments: &[serde_json::Value],
) -> Result<(String, Vec<serde_json::Value>)> {
    let mut output = String::with_capacity(sql.len() + arguments.len() * 2);
    let mut params = Vec::with_capacity(arguments.len());
    let mut remaining = arguments.iter();
    let mut in_literal = false;
    let mut in_identifier = false;

    for c in sql.chars() {
        match c {
            '\'' if !in_identifier => {
                in_literal = !in_literal;
                output.push(c);
            }
            '"' if !in_literal => {
                in_identifier = !in_identifier;
                output.push(c);
            }
            '?' if !in_literal && !in_identifier => {
                let argument = remaining.next().ok_or_else(|| {
                    GridError::store(format!(
                        "Query has more placeholders than the {} arguments given",
                        arguments.len()
                    ))
                })?;
                match argument {
                    serde_json::Value::Array(values) if values.is_empty() => {
                        output.push_str("NULL");
                    }
                    serde_json::Value::Array(values) => {
                        let numbered: Vec<String> = values
                            .iter()
                            .map(|value| {
                                params.push(value.clone());
                                format!("${}", params.len())
                            })
                            .collect();
                        output.push_str(&numbered.join(", "));
                    }
                    value => {
                        params.push(value.clone());
                        output.push_str(&format!("${}", params.len()));
                    }
                }
            }
            _ => output.push(c),
        }
    }

    if remaining.next().is_some() {
        return Err(GridError::store(format!(
            "Query has fewer placeholders than the {} arguments given",
            arguments.len()
        )));
    }

    Ok((output, params))
}
