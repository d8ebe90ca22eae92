//! Shared primitives: identifiers, render parameters, the error type.

pub mod core;
pub mod error;
