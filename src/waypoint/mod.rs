// SPDX-License-Identifier: MIT

//! Application tier: settings, YAML workflows, built-in workflows and the
//! HTTP server, all driving [`crate::engine`].

pub mod config;
pub mod error;
pub mod server;
pub mod workflow;
pub mod workflows;
