//! Name binding pass.
//!
//! Resolves every identifier and call to the declaration it refers to,
//! following lexical scoping with shadowing. Along the way it:
//!
//! - records the lexical depth of every declaration and use site
//! - marks variables referenced from a deeper depth as escaping
//! - collects each function's escaping declarations for frame layout
//! - assigns globally unique external names to user functions
//! - attaches every `break` to its innermost enclosing loop
//! - seeds the outermost scope with the runtime primitives

pub mod binder;
