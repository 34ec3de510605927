//! Sandbox module containing the permission model, composition and execution.

pub mod artifact;
pub mod config;
pub mod directives;
pub mod executor;
pub mod permissions;
pub mod report;
pub mod script;
