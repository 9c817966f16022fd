use std::collections::{HashMap, HashSet};
use std::mem;

use lazy_static::lazy_static;

use crate::ast::ast::{DeclRef, ExprId, ExprKind, FunId, Program, VarId};
use crate::errors::errors::{Error, ErrorKind};
use crate::Span;

lazy_static! {
    /// Runtime primitives, entered in the outermost scope before the user
    /// program is visited: name, return type annotation, parameter types.
    static ref PRIMITIVES: Vec<(&'static str, Option<&'static str>, &'static [&'static str])> = vec![
        ("print_err", None, &["string"][..]),
        ("print", None, &["string"][..]),
        ("print_int", None, &["int"][..]),
        ("flush", None, &[][..]),
        ("getchar", Some("string"), &[][..]),
        ("ord", Some("int"), &["string"][..]),
        ("chr", Some("string"), &["int"][..]),
        ("size", Some("int"), &["string"][..]),
        ("substring", Some("string"), &["string", "int", "int"][..]),
        ("concat", Some("string"), &["string", "string"][..]),
        ("strcmp", Some("int"), &["string", "string"][..]),
        ("streq", Some("int"), &["string", "string"][..]),
        ("not", Some("int"), &["int"][..]),
        ("exit", None, &["int"][..]),
    ];
}

/// Walks the tree once, resolving names against a stack of scopes.
///
/// A scope is pushed for the top level, for each function body, for each
/// `let`, and for each loop body. Scopes for loops let the induction
/// variable shadow without leaking, and give `while`/`for` bodies a depth
/// one deeper than their bounds, which is what makes the escape rule
/// (use depth strictly greater than declaration depth) line up with frame
/// placement later on.
pub struct Binder {
    scopes: Vec<HashMap<String, DeclRef>>,
    /// Stack of enclosing functions, innermost last.
    functions: Vec<FunId>,
    /// Stack of enclosing loop expressions, innermost last. Saved and
    /// cleared across function boundaries: a `break` inside a nested
    /// function body cannot target a loop of the enclosing function.
    loops: Vec<ExprId>,
    /// Variables declared in each enclosing function, for frame layout.
    declared_vars: Vec<Vec<VarId>>,
    external_names: HashSet<String>,
    current_depth: u32,
    /// True while visiting a variable initializer; `break` is rejected there.
    in_decl_init: bool,
    diagnostics: Vec<Error>,
}

impl Default for Binder {
    fn default() -> Self {
        Binder::new()
    }
}

impl Binder {
    pub fn new() -> Self {
        Binder {
            scopes: Vec::new(),
            functions: Vec::new(),
            loops: Vec::new(),
            declared_vars: Vec::new(),
            external_names: HashSet::new(),
            current_depth: 0,
            in_decl_init: false,
            diagnostics: Vec::new(),
        }
    }

    /// Binds a whole source unit.
    ///
    /// Wraps `root` in a synthesized `main` function returning `int` so every
    /// expression lives inside some function, then visits it. Returns the id
    /// of `main` on success; non-fatal diagnostics are accumulated and can be
    /// drained afterwards.
    pub fn analyze_program(&mut self, program: &mut Program, root: ExprId) -> Result<FunId, Error> {
        self.scopes.push(HashMap::new());
        for (name, type_name, param_types) in PRIMITIVES.iter() {
            let params = param_types
                .iter()
                .enumerate()
                .map(|(i, ty)| program.param(format!("a_{}", i), ty, Span::null()))
                .collect();
            let fun = program.fun_decl(*name, params, *type_name, None, Span::null());
            let external_name = format!("__{}", name);
            self.external_names.insert(external_name.clone());
            let decl = program.fun_mut(fun);
            decl.external_name = external_name;
            decl.is_external = true;
            self.enter(program, name, DeclRef::Fun(fun));
        }

        let zero = program.int_lit(0, Span::null());
        let body = program.sequence(vec![root, zero], Span::null());
        let main = program.fun_decl("main", Vec::new(), Some("int"), Some(body), Span::null());
        program.fun_mut(main).is_external = true;
        self.visit_fun_decl(program, main)?;

        self.scopes.pop();
        Ok(main)
    }

    /// Non-fatal diagnostics accumulated so far, in source order.
    pub fn diagnostics(&self) -> &[Error] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Error> {
        self.diagnostics
    }

    fn enter(&mut self, program: &Program, name: &str, decl: DeclRef) {
        let scope = self.scopes.last_mut().unwrap();
        if let Some(previous) = scope.get(name) {
            let previous_span = match previous {
                DeclRef::Var(v) => &program.var(*v).span,
                DeclRef::Fun(f) => &program.fun(*f).span,
            };
            let span = match decl {
                DeclRef::Var(v) => &program.var(v).span,
                DeclRef::Fun(f) => &program.fun(f).span,
            };
            self.diagnostics.push(Error::new(
                ErrorKind::AlreadyDefined {
                    name: name.to_string(),
                    previous: previous_span.start.clone(),
                },
                span.start.clone(),
            ));
        }
        // The later declaration wins, matching shadowing across scopes.
        self.scopes
            .last_mut()
            .unwrap()
            .insert(name.to_string(), decl);
    }

    fn find(&self, name: &str, span: &Span) -> Result<DeclRef, Error> {
        for scope in self.scopes.iter().rev() {
            if let Some(decl) = scope.get(name) {
                return Ok(*decl);
            }
        }
        Err(Error::new(
            ErrorKind::UndeclaredName {
                name: name.to_string(),
            },
            span.start.clone(),
        ))
    }

    fn visit_expr(&mut self, program: &mut Program, id: ExprId) -> Result<(), Error> {
        let kind = program.expr(id).kind.clone();
        match kind {
            ExprKind::IntegerLiteral(_) | ExprKind::StringLiteral(_) => Ok(()),
            ExprKind::BinaryOperator { left, right, .. } => {
                self.visit_expr(program, left)?;
                self.visit_expr(program, right)
            }
            ExprKind::Sequence(exprs) => {
                for expr in exprs {
                    self.visit_expr(program, expr)?;
                }
                Ok(())
            }
            ExprKind::Let { decls, body } => self.visit_let(program, decls, body),
            ExprKind::Identifier { name, .. } => {
                let span = program.expr(id).span.clone();
                let var = match self.find(&name, &span)? {
                    DeclRef::Var(var) => var,
                    DeclRef::Fun(_) => {
                        return Err(Error::new(
                            ErrorKind::NotAVariable { name },
                            span.start.clone(),
                        ))
                    }
                };
                if program.var(var).depth != self.current_depth {
                    program.var_mut(var).escapes = true;
                }
                let depth = self.current_depth;
                if let ExprKind::Identifier {
                    decl, depth: use_depth, ..
                } = &mut program.expr_mut(id).kind
                {
                    *decl = Some(var);
                    *use_depth = Some(depth);
                }
                Ok(())
            }
            ExprKind::IfThenElse {
                condition,
                then_part,
                else_part,
            } => {
                self.visit_expr(program, condition)?;
                self.visit_expr(program, then_part)?;
                self.visit_expr(program, else_part)
            }
            ExprKind::While { condition, body } => {
                // The condition belongs to the surrounding scope: a capture
                // there does not escape through the loop body's depth.
                self.visit_expr(program, condition)?;
                self.scopes.push(HashMap::new());
                self.current_depth += 1;
                self.loops.push(id);
                let result = self.visit_expr(program, body);
                self.loops.pop();
                self.current_depth -= 1;
                self.scopes.pop();
                result
            }
            ExprKind::For { var, high, body } => {
                self.visit_expr(program, high)?;
                self.scopes.push(HashMap::new());
                self.current_depth += 1;
                self.visit_var_decl(program, var)?;
                self.enter(program, &program.var(var).name.clone(), DeclRef::Var(var));
                self.loops.push(id);
                let result = self.visit_expr(program, body);
                self.loops.pop();
                self.current_depth -= 1;
                self.scopes.pop();
                result
            }
            ExprKind::Break { .. } => {
                let span = program.expr(id).span.clone();
                let target = match self.loops.last() {
                    Some(target) => *target,
                    None => {
                        return Err(Error::new(ErrorKind::BreakOutsideLoop, span.start.clone()))
                    }
                };
                if self.in_decl_init {
                    return Err(Error::new(
                        ErrorKind::BreakInDeclaration,
                        span.start.clone(),
                    ));
                }
                if let ExprKind::Break { loop_target } = &mut program.expr_mut(id).kind {
                    *loop_target = Some(target);
                }
                Ok(())
            }
            ExprKind::Assign { lhs, rhs } => {
                self.visit_expr(program, rhs)?;
                self.visit_expr(program, lhs)?;
                if let ExprKind::Identifier {
                    name,
                    decl: Some(var),
                    ..
                } = &program.expr(lhs).kind
                {
                    if program.var(*var).read_only {
                        return Err(Error::new(
                            ErrorKind::AssignToReadOnly { name: name.clone() },
                            program.expr(lhs).span.start.clone(),
                        ));
                    }
                }
                Ok(())
            }
            ExprKind::Call { name, args, .. } => {
                let span = program.expr(id).span.clone();
                let fun = match self.find(&name, &span)? {
                    DeclRef::Fun(fun) => fun,
                    DeclRef::Var(_) => {
                        return Err(Error::new(
                            ErrorKind::NotAFunction { name },
                            span.start.clone(),
                        ))
                    }
                };
                let depth = self.current_depth;
                if let ExprKind::Call {
                    decl,
                    depth: use_depth,
                    ..
                } = &mut program.expr_mut(id).kind
                {
                    *decl = Some(fun);
                    *use_depth = Some(depth);
                }
                for arg in args {
                    self.visit_expr(program, arg)?;
                }
                Ok(())
            }
        }
    }

    /// Consecutive function declarations see each other: each run of
    /// functions is entered in the scope first, then their bodies are
    /// visited, so mutual recursion works within a run. A variable
    /// declaration ends the run.
    fn visit_let(
        &mut self,
        program: &mut Program,
        decls: Vec<DeclRef>,
        body: ExprId,
    ) -> Result<(), Error> {
        self.scopes.push(HashMap::new());
        let mut run: Vec<FunId> = Vec::new();
        for decl in decls {
            match decl {
                DeclRef::Fun(fun) => {
                    self.enter(program, &program.fun(fun).name.clone(), DeclRef::Fun(fun));
                    run.push(fun);
                }
                DeclRef::Var(var) => {
                    for fun in mem::take(&mut run) {
                        self.visit_fun_decl(program, fun)?;
                    }
                    self.in_decl_init = true;
                    let result = self.visit_var_decl(program, var);
                    self.in_decl_init = false;
                    result?;
                    self.enter(program, &program.var(var).name.clone(), DeclRef::Var(var));
                }
            }
        }
        for fun in run {
            self.visit_fun_decl(program, fun)?;
        }
        let result = self.visit_expr(program, body);
        self.scopes.pop();
        result
    }

    fn visit_var_decl(&mut self, program: &mut Program, var: VarId) -> Result<(), Error> {
        program.var_mut(var).depth = self.current_depth;
        if let Some(tracker) = self.declared_vars.last_mut() {
            tracker.push(var);
        }
        if let Some(init) = program.var(var).init {
            self.visit_expr(program, init)?;
        }
        Ok(())
    }

    fn visit_fun_decl(&mut self, program: &mut Program, fun: FunId) -> Result<(), Error> {
        self.set_parent_and_external_name(program, fun);
        self.functions.push(fun);
        self.declared_vars.push(Vec::new());
        let saved_loops = mem::take(&mut self.loops);
        let saved_in_decl_init = mem::replace(&mut self.in_decl_init, false);

        self.scopes.push(HashMap::new());
        program.fun_mut(fun).depth = self.current_depth;
        self.current_depth += 1;
        for param in program.fun(fun).params.clone() {
            self.visit_var_decl(program, param)?;
            self.enter(
                program,
                &program.var(param).name.clone(),
                DeclRef::Var(param),
            );
        }
        let body = program
            .fun(fun)
            .body
            .unwrap_or_else(|| panic!("visiting a function without a body"));
        let result = self.visit_expr(program, body);
        self.current_depth -= 1;
        self.scopes.pop();

        let declared = self.declared_vars.pop().unwrap();
        program.fun_mut(fun).escaping_decls = declared
            .into_iter()
            .filter(|var| program.var(*var).escapes)
            .collect();
        self.functions.pop();
        self.loops = saved_loops;
        self.in_decl_init = saved_in_decl_init;
        result
    }

    /// External names are the dotted path of enclosing functions, with
    /// trailing underscores appended until the name is unique across the
    /// whole unit.
    fn set_parent_and_external_name(&mut self, program: &mut Program, fun: FunId) {
        let parent = self.functions.last().copied();
        let mut external_name = match parent {
            Some(parent) => format!(
                "{}.{}",
                program.fun(parent).external_name,
                program.fun(fun).name
            ),
            None => program.fun(fun).name.clone(),
        };
        while self.external_names.contains(&external_name) {
            external_name.push('_');
        }
        self.external_names.insert(external_name.clone());
        let decl = program.fun_mut(fun);
        decl.parent = parent;
        decl.external_name = external_name;
    }
}
