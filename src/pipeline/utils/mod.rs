//! Shared utilities for pipeline stages.

pub mod cmd;
pub mod fs;
