//! Type checking pass.
//!
//! Runs after binding and assigns a type to every expression and
//! declaration, writing the result into the annotation slots of the tree.
//! The language has two value types, `int` and `string`; expressions
//! evaluated purely for effect are `void`. Function declarations are
//! checked on first use or first reach, so recursion and forward calls
//! within a declaration run type-check without a separate pass.

pub mod type_checker;
