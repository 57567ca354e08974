//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Generational handles and ordered handle lists
//! - Logging utilities

pub mod collections;
pub mod logging;
