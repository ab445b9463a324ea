//! Shared utilities for rebind.
//!
//! This crate provides the cross-cutting concerns used by all other rebind
//! crates: the unified error type, a handful of filesystem helpers and the
//! status lines commands print.

pub mod errors;
pub mod fs;
pub mod progress;
