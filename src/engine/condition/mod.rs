// SPDX-License-Identifier: MIT

//! Condition expressions for branch transitions
//!
//! Branch edges carry `when` conditions evaluated against the workflow
//! state in declaration order; the first one that holds picks the next
//! step. Conditions are simple expressions like:
//! - `confirmed == true`
//! - `processed >= max_profiles`
//! - `message_confirmed == 'edit' or not (status == 'running')`

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal};
pub use evaluator::evaluate;
pub use parser::parse;
