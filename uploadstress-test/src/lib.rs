//! Test utilities for the upload stresstest.
//!
//! This crate provides an in-process upload server that records what it receives, and a tracing
//! setup for tests. See the modules for all available utilities.

pub mod server;
pub mod tracing;
