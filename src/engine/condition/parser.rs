// SPDX-License-Identifier: MIT

//! Condition expression parser
//!
//! Precedence from loosest to tightest: `or`, `and`, `not`, comparison.
//! Parentheses group. String literals take single or double quotes.

use super::ast::{CompareOp, Expression, Literal};
use crate::engine::error::ConditionError;

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, ConditionError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ConditionError("empty expression".to_string()));
    }

    if let Some(inner) = strip_outer_parens(input) {
        return parse(inner);
    }
    if let Some((left, right)) = split_top_level(input, " or ") {
        return Ok(Expression::Or(Box::new(parse(left)?), Box::new(parse(right)?)));
    }
    if let Some((left, right)) = split_top_level(input, " and ") {
        return Ok(Expression::And(
            Box::new(parse(left)?),
            Box::new(parse(right)?),
        ));
    }
    if let Some(rest) = input.strip_prefix("not ") {
        return Ok(Expression::Not(Box::new(parse(rest)?)));
    }

    match input {
        "true" => Ok(Expression::True),
        "false" => Ok(Expression::False),
        _ => parse_comparison(input),
    }
}

/// Scan `input` outside of quotes, calling `visit` with the byte offset and
/// paren depth of every position. Stops early when `visit` returns true.
fn scan(input: &str, mut visit: impl FnMut(usize, i32) -> bool) -> Result<(), ConditionError> {
    let mut depth = 0;
    let mut quote: Option<char> = None;

    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(ConditionError(format!("unbalanced ')' in: {}", input)));
                    }
                }
                _ => {
                    if visit(i, depth) {
                        return Ok(());
                    }
                }
            },
        }
    }

    if quote.is_some() {
        return Err(ConditionError(format!("unterminated string in: {}", input)));
    }
    Ok(())
}

fn split_top_level<'a>(input: &'a str, sep: &str) -> Option<(&'a str, &'a str)> {
    let mut found = None;
    scan(input, |i, depth| {
        if depth == 0 && input[i..].starts_with(sep) {
            found = Some(i);
            return true;
        }
        false
    })
    .ok()?;
    found.map(|i| (&input[..i], &input[i + sep.len()..]))
}

/// `( ... )` where the first paren closes at the very end
fn strip_outer_parens(input: &str) -> Option<&str> {
    if !input.starts_with('(') || !input.ends_with(')') {
        return None;
    }

    let mut depth = 0;
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return (i == input.len() - 1).then(|| &input[1..i]);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

fn parse_comparison(input: &str) -> Result<Expression, ConditionError> {
    // Longest operators first so `>=` is not read as `>`
    let operators = [
        ("!=", CompareOp::NotEq),
        (">=", CompareOp::Gte),
        ("<=", CompareOp::Lte),
        ("==", CompareOp::Eq),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
        (" contains ", CompareOp::Contains),
    ];

    for (op_str, op) in operators {
        if let Some((left, right)) = split_top_level(input, op_str) {
            let left = left.trim();
            if !is_path(left) {
                return Err(ConditionError(format!(
                    "expected a field path before '{}' in: {}",
                    op, input
                )));
            }
            let right = parse_literal(right)?;
            return Ok(Expression::Compare {
                left: left.to_string(),
                op,
                right,
            });
        }
    }

    Err(ConditionError(input.to_string()))
}

fn is_path(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

fn parse_literal(input: &str) -> Result<Literal, ConditionError> {
    let input = input.trim();

    match input {
        "null" => return Ok(Literal::Null),
        "true" => return Ok(Literal::Boolean(true)),
        "false" => return Ok(Literal::Boolean(false)),
        _ => {}
    }

    let quoted = input.len() >= 2
        && ((input.starts_with('\'') && input.ends_with('\''))
            || (input.starts_with('"') && input.ends_with('"')));
    if quoted {
        return Ok(Literal::String(input[1..input.len() - 1].to_string()));
    }

    input
        .parse::<f64>()
        .map(Literal::Number)
        .map_err(|_| ConditionError(format!("invalid literal: {}", input)))
}
