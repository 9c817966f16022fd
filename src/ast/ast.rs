use std::fmt::Display;

use crate::Span;

/// The type of an expression or declaration.
///
/// Every node starts out as `Undefined`; the type checker writes the final
/// type exactly once. `Void` is the type of expressions evaluated purely for
/// effect (assignments, loops, `break`, empty sequences).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int,
    String,
    Void,
    Undefined,
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::String => write!(f, "string"),
            Type::Void => write!(f, "void"),
            Type::Undefined => write!(f, "undefined"),
        }
    }
}

/// Binary operators of the source language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
    Times,
    Divide,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    /// Equality and inequality, which apply to any two values of equal type.
    pub fn is_equality(self) -> bool {
        matches!(self, Operator::Eq | Operator::Neq)
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let repr = match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Times => "*",
            Operator::Divide => "/",
            Operator::Eq => "=",
            Operator::Neq => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        };
        write!(f, "{}", repr)
    }
}

/// Index of an expression node in [`Program::exprs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub usize);

/// Index of a variable declaration in [`Program::vars`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub usize);

/// Index of a function declaration in [`Program::funs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunId(pub usize);

/// A declaration as it appears in the declaration list of a `let`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclRef {
    Var(VarId),
    Fun(FunId),
}

/// An expression node: variant plus annotation slots.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    /// Written exactly once by the type checker.
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntegerLiteral(i32),
    StringLiteral(String),
    BinaryOperator {
        op: Operator,
        left: ExprId,
        right: ExprId,
    },
    /// Expressions evaluated in order; the value is the last one's.
    Sequence(Vec<ExprId>),
    Let {
        decls: Vec<DeclRef>,
        body: ExprId,
    },
    Identifier {
        name: String,
        /// Resolved by the binder.
        decl: Option<VarId>,
        /// Lexical depth at the point of use, set by the binder.
        depth: Option<u32>,
    },
    IfThenElse {
        condition: ExprId,
        then_part: ExprId,
        else_part: ExprId,
    },
    While {
        condition: ExprId,
        body: ExprId,
    },
    For {
        /// The read-only induction variable; its initializer is the low bound.
        var: VarId,
        high: ExprId,
        body: ExprId,
    },
    Break {
        /// The enclosing loop expression, set by the binder.
        loop_target: Option<ExprId>,
    },
    Assign {
        /// Always an `Identifier` in this language.
        lhs: ExprId,
        rhs: ExprId,
    },
    Call {
        name: String,
        args: Vec<ExprId>,
        /// Resolved by the binder.
        decl: Option<FunId>,
        /// Lexical depth at the call site, set by the binder.
        depth: Option<u32>,
    },
}

/// A variable declaration: `let` variable, function parameter or loop
/// induction variable.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    /// Explicit type annotation, if any.
    pub type_name: Option<String>,
    /// Absent for function parameters; the low bound for loop variables.
    pub init: Option<ExprId>,
    /// Lexical nesting level, set by the binder.
    pub depth: u32,
    pub ty: Type,
    /// True iff referenced from a strictly deeper lexical depth.
    pub escapes: bool,
    /// Loop induction variables cannot be assigned.
    pub read_only: bool,
    pub span: Span,
}

/// A function declaration, user-defined or primitive.
#[derive(Debug, Clone)]
pub struct FunDecl {
    pub name: String,
    pub params: Vec<VarId>,
    /// Absent for primitive/external functions.
    pub body: Option<ExprId>,
    /// Declared return type annotation, if any.
    pub type_name: Option<String>,
    pub depth: u32,
    pub ty: Type,
    /// Enclosing function, set by the binder; absent for the top level.
    pub parent: Option<FunId>,
    /// Globally unique linker-visible name, set by the binder.
    pub external_name: String,
    /// Variables declared in this function (directly or in nested non-function
    /// scopes) that escape into a nested function, in declaration order.
    pub escaping_decls: Vec<VarId>,
    pub is_external: bool,
    pub span: Span,
}

/// Arena owning every node of one source unit.
///
/// Cross-references between nodes are plain indices, so back-references
/// (parent function, resolved declaration, loop target) never imply
/// ownership. The tree is built once by the parser, annotated in place by
/// the binder and the type checker, then read by the IR generator.
#[derive(Debug, Default)]
pub struct Program {
    pub exprs: Vec<Expr>,
    pub vars: Vec<VarDecl>,
    pub funs: Vec<FunDecl>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.0]
    }

    pub fn var(&self, id: VarId) -> &VarDecl {
        &self.vars[id.0]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut VarDecl {
        &mut self.vars[id.0]
    }

    pub fn fun(&self, id: FunId) -> &FunDecl {
        &self.funs[id.0]
    }

    pub fn fun_mut(&mut self, id: FunId) -> &mut FunDecl {
        &mut self.funs[id.0]
    }

    fn add_expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.exprs.push(Expr {
            kind,
            span,
            ty: Type::Undefined,
        });
        ExprId(self.exprs.len() - 1)
    }

    // Constructors, in the shape an upstream parser drives them.

    pub fn int_lit(&mut self, value: i32, span: Span) -> ExprId {
        self.add_expr(ExprKind::IntegerLiteral(value), span)
    }

    pub fn string_lit(&mut self, value: impl Into<String>, span: Span) -> ExprId {
        self.add_expr(ExprKind::StringLiteral(value.into()), span)
    }

    pub fn binary(&mut self, op: Operator, left: ExprId, right: ExprId, span: Span) -> ExprId {
        self.add_expr(ExprKind::BinaryOperator { op, left, right }, span)
    }

    pub fn sequence(&mut self, exprs: Vec<ExprId>, span: Span) -> ExprId {
        self.add_expr(ExprKind::Sequence(exprs), span)
    }

    pub fn let_in(&mut self, decls: Vec<DeclRef>, body: ExprId, span: Span) -> ExprId {
        self.add_expr(ExprKind::Let { decls, body }, span)
    }

    pub fn identifier(&mut self, name: impl Into<String>, span: Span) -> ExprId {
        self.add_expr(
            ExprKind::Identifier {
                name: name.into(),
                decl: None,
                depth: None,
            },
            span,
        )
    }

    pub fn if_then_else(
        &mut self,
        condition: ExprId,
        then_part: ExprId,
        else_part: ExprId,
        span: Span,
    ) -> ExprId {
        self.add_expr(
            ExprKind::IfThenElse {
                condition,
                then_part,
                else_part,
            },
            span,
        )
    }

    pub fn while_loop(&mut self, condition: ExprId, body: ExprId, span: Span) -> ExprId {
        self.add_expr(ExprKind::While { condition, body }, span)
    }

    pub fn for_loop(&mut self, var: VarId, high: ExprId, body: ExprId, span: Span) -> ExprId {
        self.add_expr(ExprKind::For { var, high, body }, span)
    }

    pub fn break_expr(&mut self, span: Span) -> ExprId {
        self.add_expr(ExprKind::Break { loop_target: None }, span)
    }

    pub fn assign(&mut self, lhs: ExprId, rhs: ExprId, span: Span) -> ExprId {
        self.add_expr(ExprKind::Assign { lhs, rhs }, span)
    }

    pub fn call(&mut self, name: impl Into<String>, args: Vec<ExprId>, span: Span) -> ExprId {
        self.add_expr(
            ExprKind::Call {
                name: name.into(),
                args,
                decl: None,
                depth: None,
            },
            span,
        )
    }

    /// A `let` variable declaration.
    pub fn var_decl(
        &mut self,
        name: impl Into<String>,
        type_name: Option<&str>,
        init: ExprId,
        span: Span,
    ) -> VarId {
        self.add_var(name.into(), type_name.map(String::from), Some(init), false, span)
    }

    /// A function parameter: annotated, no initializer.
    pub fn param(&mut self, name: impl Into<String>, type_name: &str, span: Span) -> VarId {
        self.add_var(name.into(), Some(type_name.to_string()), None, false, span)
    }

    /// A loop induction variable: read-only, initialized to the low bound.
    pub fn loop_var(&mut self, name: impl Into<String>, low: ExprId, span: Span) -> VarId {
        self.add_var(name.into(), None, Some(low), true, span)
    }

    fn add_var(
        &mut self,
        name: String,
        type_name: Option<String>,
        init: Option<ExprId>,
        read_only: bool,
        span: Span,
    ) -> VarId {
        self.vars.push(VarDecl {
            name,
            type_name,
            init,
            depth: 0,
            ty: Type::Undefined,
            escapes: false,
            read_only,
            span,
        });
        VarId(self.vars.len() - 1)
    }

    pub fn fun_decl(
        &mut self,
        name: impl Into<String>,
        params: Vec<VarId>,
        type_name: Option<&str>,
        body: Option<ExprId>,
        span: Span,
    ) -> FunId {
        self.funs.push(FunDecl {
            name: name.into(),
            params,
            body,
            type_name: type_name.map(String::from),
            depth: 0,
            ty: Type::Undefined,
            parent: None,
            external_name: String::new(),
            escaping_decls: Vec::new(),
            is_external: false,
            span,
        });
        FunId(self.funs.len() - 1)
    }
}
