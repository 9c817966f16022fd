//! AST (Abstract Syntax Tree) module.
//!
//! Contains all definitions related to the AST structure:
//!
//! - ast: node variants, declaration records, the arena holding them,
//!   and the constructor methods an upstream parser drives
//!
//! Nodes carry annotation slots (resolved declaration, computed type,
//! lexical depth, escape flag) that start out empty and are filled in
//! by the binder and the type checker.

pub mod ast;
