// SPDX-License-Identifier: MIT

//! Condition expression evaluator

use super::ast::{CompareOp, Expression, Literal};
use crate::engine::state::WorkflowState;
use serde_json::Value;

/// Evaluate a condition expression against workflow state.
///
/// A missing path compares equal to `null` and fails every ordering test.
pub fn evaluate(expr: &Expression, state: &WorkflowState) -> bool {
    match expr {
        Expression::True => true,
        Expression::False => false,
        Expression::Compare { left, op, right } => {
            let value = state.get_path(left);
            compare(value.as_ref(), *op, right)
        }
        Expression::And(left, right) => evaluate(left, state) && evaluate(right, state),
        Expression::Or(left, right) => evaluate(left, state) || evaluate(right, state),
        Expression::Not(inner) => !evaluate(inner, state),
    }
}

fn compare(left: Option<&Value>, op: CompareOp, right: &Literal) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::NotEq => !values_equal(left, right),
        CompareOp::Gt => compare_numbers(left, right, |a, b| a > b),
        CompareOp::Gte => compare_numbers(left, right, |a, b| a >= b),
        CompareOp::Lt => compare_numbers(left, right, |a, b| a < b),
        CompareOp::Lte => compare_numbers(left, right, |a, b| a <= b),
        CompareOp::Contains => contains(left, right),
    }
}

fn literal_matches(value: &Value, literal: &Literal) -> bool {
    match (value, literal) {
        (Value::Null, Literal::Null) => true,
        (Value::String(s), Literal::String(rs)) => s == rs,
        (Value::Number(n), Literal::Number(rn)) => n
            .as_f64()
            .map(|f| (f - rn).abs() < f64::EPSILON)
            .unwrap_or(false),
        (Value::Bool(b), Literal::Boolean(rb)) => b == rb,
        _ => false,
    }
}

fn values_equal(left: Option<&Value>, right: &Literal) -> bool {
    match left {
        None => matches!(right, Literal::Null),
        Some(value) => literal_matches(value, right),
    }
}

fn compare_numbers(left: Option<&Value>, right: &Literal, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (left.and_then(Value::as_f64), right) {
        (Some(l), Literal::Number(r)) => cmp(l, *r),
        _ => false,
    }
}

fn contains(left: Option<&Value>, right: &Literal) -> bool {
    match (left, right) {
        (Some(Value::String(s)), Literal::String(needle)) => s.contains(needle.as_str()),
        (Some(Value::Array(items)), literal) => items.iter().any(|v| literal_matches(v, literal)),
        (Some(Value::Object(map)), Literal::String(key)) => map.contains_key(key),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::condition::parse;
    use crate::engine::state::WorkflowStatus;
    use serde_json::json;

    fn state_with(pairs: Vec<(&str, Value)>) -> WorkflowState {
        let mut state = WorkflowState::new("go", "start");
        for (k, v) in pairs {
            state.update(k, v).unwrap();
        }
        state
    }

    fn check(condition: &str, state: &WorkflowState) -> bool {
        evaluate(&parse(condition).unwrap(), state)
    }

    #[test]
    fn test_string_equality() {
        let state = state_with(vec![("action", json!("send"))]);
        assert!(check("action == 'send'", &state));
        assert!(!check("action == 'skip'", &state));
        assert!(check("action != 'skip'", &state));
    }

    #[test]
    fn test_number_comparison() {
        let state = state_with(vec![("processed", json!(3))]);

        assert!(check("processed > 2", &state));
        assert!(!check("processed > 3", &state));
        assert!(check("processed >= 3", &state));
        assert!(check("processed < 3.5", &state));
        assert!(check("processed <= 3", &state));
        assert!(!check("processed < 1", &state));
    }

    #[test]
    fn test_boolean_and_null() {
        let state = state_with(vec![("confirmed", json!(false)), ("draft", json!(null))]);

        assert!(check("confirmed == false", &state));
        assert!(!check("confirmed == true", &state));
        assert!(check("draft == null", &state));
        assert!(check("missing == null", &state));
        assert!(!check("missing == 'value'", &state));
        assert!(!check("missing > 0", &state));
    }

    #[test]
    fn test_required_fields_are_addressable() {
        let mut state = WorkflowState::new("go", "start");
        assert!(check("status == 'running'", &state));
        assert!(check("current_step == 'start'", &state));
        assert!(check("error == null", &state));

        state.status = WorkflowStatus::Cancelled;
        state.error = Some("Login cancelled by user".to_string());
        assert!(check("status == 'cancelled'", &state));
        assert!(check("error contains 'Login'", &state));
    }

    #[test]
    fn test_contains() {
        let state = state_with(vec![
            ("message", json!("hello world")),
            ("tags", json!(["bug", 7, true])),
            ("meta", json!({"handle": "chef_ana"})),
        ]);

        assert!(check("message contains 'world'", &state));
        assert!(!check("message contains 'foo'", &state));
        assert!(check("tags contains 'bug'", &state));
        assert!(check("tags contains 7", &state));
        assert!(check("tags contains true", &state));
        assert!(!check("tags contains 'feature'", &state));
        assert!(check("meta contains 'handle'", &state));
    }

    #[test]
    fn test_boolean_composition() {
        let state = state_with(vec![("action", json!("edit")), ("attempts", json!(2))]);

        assert!(check("action == 'edit' and attempts < 3", &state));
        assert!(!check("action == 'edit' and attempts > 3", &state));
        assert!(check("action == 'send' or attempts == 2", &state));
        assert!(check("not action == 'send'", &state));
        assert!(!check("not (action == 'edit' or attempts > 9)", &state));
    }

    #[test]
    fn test_nested_path() {
        let state = state_with(vec![("profile", json!({"contact": {"method": "dm"}}))]);

        assert!(check("profile.contact.method == 'dm'", &state));
        assert!(check("profile.contact.email == null", &state));
    }
}
