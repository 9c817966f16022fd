use crate::ast::ast::{DeclRef, ExprId, ExprKind, FunId, Program, Type, VarId};
use crate::errors::errors::{Error, ErrorKind};
use crate::Span;

/// Type-checks a bound program starting from its synthesized entry point.
pub fn check_program(program: &mut Program, main: FunId) -> Result<(), Error> {
    check_fun_decl(program, main)
}

fn resolve_type_name(name: &str, span: &Span) -> Result<Type, Error> {
    match name {
        "int" => Ok(Type::Int),
        "string" => Ok(Type::String),
        _ => Err(Error::new(
            ErrorKind::UnknownType {
                type_name: name.to_string(),
            },
            span.start.clone(),
        )),
    }
}

/// Computes and records the type of `id`, returning it.
pub fn check_expr(program: &mut Program, id: ExprId) -> Result<Type, Error> {
    let kind = program.expr(id).kind.clone();
    let span = program.expr(id).span.clone();
    let ty = match kind {
        ExprKind::IntegerLiteral(_) => Type::Int,
        ExprKind::StringLiteral(_) => Type::String,
        ExprKind::BinaryOperator { op, left, right } => {
            let left_ty = check_expr(program, left)?;
            let right_ty = check_expr(program, right)?;
            if left_ty != right_ty {
                return Err(Error::new(
                    ErrorKind::OperandMismatch {
                        left: left_ty,
                        right: right_ty,
                    },
                    span.start.clone(),
                ));
            }
            // = and <> apply to any pair of equal types, the rest to int.
            if !op.is_equality() && left_ty != Type::Int {
                return Err(Error::new(
                    ErrorKind::InvalidOperand {
                        operator: op,
                        operand: left_ty,
                    },
                    span.start.clone(),
                ));
            }
            Type::Int
        }
        ExprKind::Sequence(exprs) => {
            let mut ty = Type::Void;
            for expr in exprs {
                ty = check_expr(program, expr)?;
            }
            ty
        }
        ExprKind::Let { decls, body } => {
            for decl in decls {
                match decl {
                    DeclRef::Var(var) => check_var_decl(program, var)?,
                    DeclRef::Fun(fun) => check_fun_decl(program, fun)?,
                }
            }
            check_expr(program, body)?
        }
        ExprKind::Identifier { decl, .. } => {
            let var = decl.expect("identifier not resolved by the binder");
            let ty = program.var(var).ty;
            assert_ne!(ty, Type::Undefined, "use before declaration was checked");
            ty
        }
        ExprKind::IfThenElse {
            condition,
            then_part,
            else_part,
        } => {
            let condition_ty = check_expr(program, condition)?;
            if condition_ty != Type::Int {
                return Err(Error::new(
                    ErrorKind::ConditionNotInt {
                        received: condition_ty,
                    },
                    program.expr(condition).span.start.clone(),
                ));
            }
            let then_ty = check_expr(program, then_part)?;
            let else_ty = check_expr(program, else_part)?;
            if then_ty != else_ty {
                return Err(Error::new(
                    ErrorKind::BranchMismatch {
                        then_type: then_ty,
                        else_type: else_ty,
                    },
                    span.start.clone(),
                ));
            }
            then_ty
        }
        ExprKind::While { condition, body } => {
            let condition_ty = check_expr(program, condition)?;
            if condition_ty != Type::Int {
                return Err(Error::new(
                    ErrorKind::ConditionNotInt {
                        received: condition_ty,
                    },
                    program.expr(condition).span.start.clone(),
                ));
            }
            let body_ty = check_expr(program, body)?;
            if body_ty != Type::Void {
                return Err(Error::new(
                    ErrorKind::LoopBodyNotVoid { received: body_ty },
                    program.expr(body).span.start.clone(),
                ));
            }
            Type::Void
        }
        ExprKind::For { var, high, body } => {
            let low = program
                .var(var)
                .init
                .expect("loop variable without a low bound");
            let low_ty = check_expr(program, low)?;
            if low_ty != Type::Int {
                return Err(Error::new(
                    ErrorKind::LoopBoundNotInt { received: low_ty },
                    program.expr(low).span.start.clone(),
                ));
            }
            program.var_mut(var).ty = Type::Int;
            let high_ty = check_expr(program, high)?;
            if high_ty != Type::Int {
                return Err(Error::new(
                    ErrorKind::LoopBoundNotInt { received: high_ty },
                    program.expr(high).span.start.clone(),
                ));
            }
            let body_ty = check_expr(program, body)?;
            if body_ty != Type::Void {
                return Err(Error::new(
                    ErrorKind::LoopBodyNotVoid { received: body_ty },
                    program.expr(body).span.start.clone(),
                ));
            }
            Type::Void
        }
        ExprKind::Break { .. } => Type::Void,
        ExprKind::Assign { lhs, rhs } => {
            let lhs_ty = check_expr(program, lhs)?;
            let rhs_ty = check_expr(program, rhs)?;
            if lhs_ty != rhs_ty {
                return Err(Error::new(
                    ErrorKind::AssignMismatch {
                        expected: lhs_ty,
                        received: rhs_ty,
                    },
                    span.start.clone(),
                ));
            }
            Type::Void
        }
        ExprKind::Call { args, decl, .. } => {
            let fun = decl.expect("call not resolved by the binder");
            // A forward call inside a recursion run reaches the callee
            // before the declaration walk does; check it on demand.
            if program.fun(fun).ty == Type::Undefined {
                check_fun_decl(program, fun)?;
            }
            let params = program.fun(fun).params.clone();
            if args.len() > params.len() {
                return Err(Error::new(
                    ErrorKind::UnexpectedArguments {
                        expected: params.len(),
                        received: args.len(),
                    },
                    span.start.clone(),
                ));
            }
            if args.len() < params.len() {
                return Err(Error::new(
                    ErrorKind::MissingArguments {
                        expected: params.len(),
                        received: args.len(),
                    },
                    span.start.clone(),
                ));
            }
            for (arg, param) in args.iter().zip(params.iter()) {
                let arg_ty = check_expr(program, *arg)?;
                let param_ty = program.var(*param).ty;
                if arg_ty != param_ty {
                    return Err(Error::new(
                        ErrorKind::ArgumentTypeMismatch {
                            expected: param_ty,
                            received: arg_ty,
                        },
                        program.expr(*arg).span.start.clone(),
                    ));
                }
            }
            program.fun(fun).ty
        }
    };
    program.expr_mut(id).ty = ty;
    Ok(ty)
}

pub fn check_var_decl(program: &mut Program, var: VarId) -> Result<(), Error> {
    let init = program.var(var).init;
    let type_name = program.var(var).type_name.clone();
    let span = program.var(var).span.clone();
    let ty = match (init, type_name) {
        (Some(init), None) => {
            let init_ty = check_expr(program, init)?;
            if init_ty == Type::Void {
                return Err(Error::new(
                    ErrorKind::VoidVariable {
                        name: program.var(var).name.clone(),
                    },
                    span.start.clone(),
                ));
            }
            init_ty
        }
        (Some(init), Some(type_name)) => {
            let declared = resolve_type_name(&type_name, &span)?;
            let init_ty = check_expr(program, init)?;
            if init_ty != declared {
                return Err(Error::new(
                    ErrorKind::DeclaredTypeMismatch {
                        expected: declared,
                        received: init_ty,
                    },
                    span.start.clone(),
                ));
            }
            declared
        }
        // Function parameters: annotation only.
        (None, Some(type_name)) => resolve_type_name(&type_name, &span)?,
        (None, None) => {
            return Err(Error::new(
                ErrorKind::MissingInitializer {
                    name: program.var(var).name.clone(),
                },
                span.start.clone(),
            ))
        }
    };
    program.var_mut(var).ty = ty;
    Ok(())
}

/// Checks a function declaration once; later reaches are no-ops.
///
/// The declared return type is recorded before the body is visited, so
/// recursive calls inside the body see the final signature.
pub fn check_fun_decl(program: &mut Program, fun: FunId) -> Result<(), Error> {
    if program.fun(fun).ty != Type::Undefined {
        return Ok(());
    }
    for param in program.fun(fun).params.clone() {
        check_var_decl(program, param)?;
    }
    let span = program.fun(fun).span.clone();
    let declared = match program.fun(fun).type_name.clone() {
        Some(type_name) => resolve_type_name(&type_name, &span)?,
        None => Type::Void,
    };
    program.fun_mut(fun).ty = declared;
    if let Some(body) = program.fun(fun).body {
        let body_ty = check_expr(program, body)?;
        if body_ty != declared {
            return Err(Error::new(
                ErrorKind::ReturnTypeMismatch {
                    expected: declared,
                    received: body_ty,
                },
                span.start.clone(),
            ));
        }
    }
    Ok(())
}
