//! Binary-side plumbing: command-line options and the ray evaluation loop.
//! Exposed as a library so the loop can be driven by integration tests.

pub mod cli_options;
pub mod rayloop;
