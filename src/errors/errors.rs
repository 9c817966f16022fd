use std::fmt::Display;

use thiserror::Error as ThisError;

use crate::ast::ast::{Operator, Type};
use crate::Position;

/// A diagnostic produced by the binder or the type checker.
///
/// Non-fatal errors are reported and the pass continues (only duplicate
/// declarations, so every clash in a scope surfaces in one run); fatal
/// errors abort compilation of the source unit, since continuing would
/// operate on inconsistent annotations.
#[derive(Debug, Clone)]
pub struct Error {
    internal_error: ErrorKind,
    position: Position,
}

impl Error {
    pub fn new(error_kind: ErrorKind, position: Position) -> Self {
        Error {
            internal_error: error_kind,
            position,
        }
    }

    pub fn get_position(&self) -> &Position {
        &self.position
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.internal_error
    }

    /// Only duplicate declarations are recoverable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.internal_error, ErrorKind::AlreadyDefined { .. })
    }

    pub fn get_error_name(&self) -> &str {
        match &self.internal_error {
            ErrorKind::AlreadyDefined { .. } => "AlreadyDefined",
            ErrorKind::UndeclaredName { .. } => "UndeclaredName",
            ErrorKind::NotAVariable { .. } => "NotAVariable",
            ErrorKind::NotAFunction { .. } => "NotAFunction",
            ErrorKind::BreakOutsideLoop => "BreakOutsideLoop",
            ErrorKind::BreakInDeclaration => "BreakInDeclaration",
            ErrorKind::AssignToReadOnly { .. } => "AssignToReadOnly",
            ErrorKind::MissingInitializer { .. } => "MissingInitializer",
            ErrorKind::VoidVariable { .. } => "VoidVariable",
            ErrorKind::UnknownType { .. } => "UnknownType",
            ErrorKind::DeclaredTypeMismatch { .. } => "DeclaredTypeMismatch",
            ErrorKind::ReturnTypeMismatch { .. } => "ReturnTypeMismatch",
            ErrorKind::ConditionNotInt { .. } => "ConditionNotInt",
            ErrorKind::BranchMismatch { .. } => "BranchMismatch",
            ErrorKind::OperandMismatch { .. } => "OperandMismatch",
            ErrorKind::InvalidOperand { .. } => "InvalidOperand",
            ErrorKind::AssignMismatch { .. } => "AssignMismatch",
            ErrorKind::LoopBodyNotVoid { .. } => "LoopBodyNotVoid",
            ErrorKind::LoopBoundNotInt { .. } => "LoopBoundNotInt",
            ErrorKind::UnexpectedArguments { .. } => "UnexpectedArguments",
            ErrorKind::MissingArguments { .. } => "MissingArguments",
            ErrorKind::ArgumentTypeMismatch { .. } => "ArgumentTypeMismatch",
        }
    }

    pub fn get_tip(&self) -> ErrorTip {
        match &self.internal_error {
            ErrorKind::AlreadyDefined { name, previous } => ErrorTip::Suggestion(format!(
                "`{}` is already defined in this scope, previous declaration was at offset {} in {}",
                name, previous.0, previous.1
            )),
            ErrorKind::UndeclaredName { name } => {
                ErrorTip::Suggestion(format!("`{}` cannot be found in this scope", name))
            }
            ErrorKind::NotAVariable { name } => {
                ErrorTip::Suggestion(format!("`{}` is a function, not a variable", name))
            }
            ErrorKind::NotAFunction { name } => {
                ErrorTip::Suggestion(format!("`{}` is a variable and cannot be called", name))
            }
            ErrorKind::BreakOutsideLoop => ErrorTip::None,
            ErrorKind::BreakInDeclaration => ErrorTip::Suggestion(String::from(
                "a variable initializer cannot break out of a loop surrounding its `let`",
            )),
            ErrorKind::AssignToReadOnly { name } => ErrorTip::Suggestion(format!(
                "`{}` is a loop induction variable and cannot be assigned",
                name
            )),
            ErrorKind::MissingInitializer { name } => ErrorTip::Suggestion(format!(
                "`{}` needs an initializer or an explicit type annotation",
                name
            )),
            ErrorKind::VoidVariable { name } => ErrorTip::Suggestion(format!(
                "the initializer of `{}` produces no value",
                name
            )),
            ErrorKind::UnknownType { type_name } => {
                ErrorTip::Suggestion(format!("unknown type `{}`, expected int or string", type_name))
            }
            ErrorKind::DeclaredTypeMismatch { expected, received } => ErrorTip::Suggestion(
                format!("declared as `{}` but initialized with `{}`", expected, received),
            ),
            ErrorKind::ReturnTypeMismatch { expected, received } => ErrorTip::Suggestion(format!(
                "function is declared to return `{}` but its body has type `{}`",
                expected, received
            )),
            ErrorKind::ConditionNotInt { received } => {
                ErrorTip::Suggestion(format!("conditions must be int, found `{}`", received))
            }
            ErrorKind::BranchMismatch {
                then_type,
                else_type,
            } => ErrorTip::Suggestion(format!(
                "then branch has type `{}` but else branch has type `{}`",
                then_type, else_type
            )),
            ErrorKind::OperandMismatch { left, right } => ErrorTip::Suggestion(format!(
                "operands have different types `{}` and `{}`",
                left, right
            )),
            ErrorKind::InvalidOperand { operator, operand } => ErrorTip::Suggestion(format!(
                "operator `{}` does not apply to operands of type `{}`",
                operator, operand
            )),
            ErrorKind::AssignMismatch { expected, received } => ErrorTip::Suggestion(format!(
                "cannot assign a `{}` to a variable of type `{}`",
                received, expected
            )),
            ErrorKind::LoopBodyNotVoid { received } => ErrorTip::Suggestion(format!(
                "loop bodies must not produce a value, found `{}`",
                received
            )),
            ErrorKind::LoopBoundNotInt { received } => {
                ErrorTip::Suggestion(format!("loop bounds must be int, found `{}`", received))
            }
            ErrorKind::UnexpectedArguments { expected, received } => ErrorTip::Suggestion(format!(
                "expected {} arguments, received {}",
                expected, received
            )),
            ErrorKind::MissingArguments { expected, received } => ErrorTip::Suggestion(format!(
                "expected {} arguments, received {}",
                expected, received
            )),
            ErrorKind::ArgumentTypeMismatch { expected, received } => ErrorTip::Suggestion(
                format!("expected argument type `{}`, received `{}`", expected, received),
            ),
        }
    }
}

pub enum ErrorTip {
    None,
    Suggestion(String),
}

impl Display for ErrorTip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorTip::None => write!(f, ""),
            ErrorTip::Suggestion(suggestion) => write!(f, "{}", suggestion),
        }
    }
}

#[derive(ThisError, Debug, Clone)]
pub enum ErrorKind {
    #[error("{name:?} is already defined in this scope")]
    AlreadyDefined { name: String, previous: Position },
    #[error("{name:?} cannot be found in this scope")]
    UndeclaredName { name: String },
    #[error("{name:?} is not a variable")]
    NotAVariable { name: String },
    #[error("{name:?} is not a function")]
    NotAFunction { name: String },
    #[error("break is not inside a loop")]
    BreakOutsideLoop,
    #[error("break is not allowed inside a declaration initializer")]
    BreakInDeclaration,
    #[error("{name:?} is not assignable")]
    AssignToReadOnly { name: String },
    #[error("{name:?} has neither an initializer nor a type annotation")]
    MissingInitializer { name: String },
    #[error("{name:?} cannot have type void")]
    VoidVariable { name: String },
    #[error("unknown type {type_name:?}")]
    UnknownType { type_name: String },
    #[error("declared type {expected} does not match initializer type {received}")]
    DeclaredTypeMismatch { expected: Type, received: Type },
    #[error("declared return type {expected} does not match body type {received}")]
    ReturnTypeMismatch { expected: Type, received: Type },
    #[error("condition is not of type int: {received}")]
    ConditionNotInt { received: Type },
    #[error("then and else parts have different types: {then_type} and {else_type}")]
    BranchMismatch { then_type: Type, else_type: Type },
    #[error("different types in binary operation: {left} and {right}")]
    OperandMismatch { left: Type, right: Type },
    #[error("operator {operator} is not applicable to type {operand}")]
    InvalidOperand { operator: Operator, operand: Type },
    #[error("type mismatch in assignment: {expected} and {received}")]
    AssignMismatch { expected: Type, received: Type },
    #[error("loop body should be of type void, found {received}")]
    LoopBodyNotVoid { received: Type },
    #[error("loop bound should be of type int, found {received}")]
    LoopBoundNotInt { received: Type },
    #[error("unexpected arguments: expected {expected:?}, received {received:?}")]
    UnexpectedArguments { expected: usize, received: usize },
    #[error("missing arguments: expected {expected:?}, received {received:?}")]
    MissingArguments { expected: usize, received: usize },
    #[error("argument types do not match: expected {expected}, received {received}")]
    ArgumentTypeMismatch { expected: Type, received: Type },
}
