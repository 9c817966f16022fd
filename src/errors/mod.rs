//! Error types and error handling for the compiler.
//!
//! This module defines the error types used by the binding and type
//! checking passes. It includes:
//!
//! - Error structures with source position information
//! - Specific error variants for each rejected condition
//! - The fatal/non-fatal severity split
//! - Helpful error messages and suggestions

pub mod errors;
