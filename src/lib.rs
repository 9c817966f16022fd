#![allow(clippy::module_inception)]

//! Semantic analysis and IR generation core for a small expression-oriented,
//! statically-typed language with nested functions.
//!
//! The crate takes an abstract syntax tree produced by an upstream parser and
//! runs three passes over it, in order:
//!
//! - [`binder`]: resolves every identifier and call to its declaration,
//!   computes lexical depths and marks variables captured by inner functions,
//! - [`type_checker`]: assigns a type to every expression and declaration and
//!   rejects ill-typed programs,
//! - [`irgen`]: lowers the tree into flat functions made of basic blocks,
//!   turning lexical capture into explicit frame records chained through
//!   parent-frame pointers.
//!
//! Lexing/parsing, the machine-code backend and the runtime support library
//! are external collaborators; the crate only fixes their contracts.

use std::rc::Rc;

use crate::ast::ast::{ExprId, FunId, Program};
use crate::binder::binder::Binder;
use crate::errors::errors::Error;
use crate::irgen::ir::Module;
use crate::irgen::irgen::IRGenerator;
use crate::type_checker::type_checker::check_program;

pub mod ast;
pub mod binder;
pub mod errors;
pub mod irgen;
pub mod type_checker;

#[derive(Debug, Clone)]
pub struct Position(pub u32, pub Rc<String>);

impl Position {
    pub fn null() -> Self {
        Position(0, Rc::new(String::from("<null>")))
    }
}

#[derive(Debug, Clone)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn null() -> Self {
        Span {
            start: Position::null(),
            end: Position::null(),
        }
    }
}

/// Result of a successful run of the whole pipeline.
#[derive(Debug)]
pub struct CompileOutput {
    /// The lowered program, ready for a machine-code backend.
    pub module: Module,
    /// The synthesized top-level "main" function wrapping the program.
    pub main: FunId,
    /// Non-fatal diagnostics accumulated during binding, in source order.
    pub diagnostics: Vec<Error>,
}

/// Runs binding, type checking and IR generation over a parsed program.
///
/// `root` is the expression the parser produced for the whole source unit.
/// Fatal errors abort the pipeline; non-fatal ones are returned alongside
/// the generated module.
pub fn compile_ast(program: &mut Program, root: ExprId) -> Result<CompileOutput, Error> {
    let mut binder = Binder::new();
    let main = binder.analyze_program(program, root)?;
    check_program(program, main)?;
    let module = IRGenerator::new(program).generate_program(main);
    Ok(CompileOutput {
        module,
        main,
        diagnostics: binder.into_diagnostics(),
    })
}
