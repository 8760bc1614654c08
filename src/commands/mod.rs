//! Command implementations for certpath

pub mod verify;

pub use verify::{build_engine, run_build, run_verify};
