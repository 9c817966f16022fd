//! IR generation.
//!
//! Lowers the checked tree into a flat module of functions made of basic
//! blocks, ready for a machine-code backend:
//!
//! - ir: the IR data model (values, instructions, terminators, frame record
//!   types, functions, the module) with a textual dump and a structural
//!   verifier
//! - irgen: the lowering walk, which turns lexical capture into frame
//!   records chained through parent-frame pointers and `break` into a jump
//!   to the loop's exit block

pub mod ir;
pub mod irgen;

#[cfg(test)]
mod tests;
