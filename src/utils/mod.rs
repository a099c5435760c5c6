//! Utility functions and helpers for the gem2openai bridge.
//!
//! This module provides cross-cutting concerns like structured logging,
//! secret sanitization, and bounded retry logic with backoff.
//!
//! # Submodules
//!
//! - `logging`: Tracing and logging initialization with security filters.
//! - `retry`: Retry helper used for cookie rotation and session scraping.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod logging;
pub mod retry;
