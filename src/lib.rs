//! Named in-process caches with single-flight get-or-compute.

pub mod cache;
pub mod config;
pub mod infra;
