// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for condition expressions

use std::fmt;

/// A condition expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Comparison expression: path op literal
    Compare {
        left: String,
        op: CompareOp,
        right: Literal,
    },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    True,
    False,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring for strings, membership for arrays
    Contains,
}

/// Literal values in expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Contains => "contains",
        };
        f.write_str(op)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "'{}'", s),
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Null => f.write_str("null"),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Compare { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Expression::And(l, r) => write!(f, "({} and {})", l, r),
            Expression::Or(l, r) => write!(f, "({} or {})", l, r),
            Expression::Not(inner) => write!(f, "not {}", inner),
            Expression::True => f.write_str("true"),
            Expression::False => f.write_str("false"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_op_display() {
        assert_eq!(CompareOp::Eq.to_string(), "==");
        assert_eq!(CompareOp::NotEq.to_string(), "!=");
        assert_eq!(CompareOp::Gte.to_string(), ">=");
        assert_eq!(CompareOp::Contains.to_string(), "contains");
    }

    #[test]
    fn test_expression_display() {
        let expr = Expression::Or(
            Box::new(Expression::Compare {
                left: "action".to_string(),
                op: CompareOp::Eq,
                right: Literal::String("send".to_string()),
            }),
            Box::new(Expression::Not(Box::new(Expression::Compare {
                left: "processed".to_string(),
                op: CompareOp::Lt,
                right: Literal::Number(3.0),
            }))),
        );
        assert_eq!(
            expr.to_string(),
            "(action == 'send' or not processed < 3)"
        );
    }
}
