use std::collections::{HashMap, VecDeque};

use crate::ast::ast::{DeclRef, ExprId, ExprKind, FunId, Operator, Program, Type, VarId};
use crate::irgen::ir::{
    BasicBlock, BinOp, FrameType, Function, Instruction, IrType, Module, TempId, Terminator, Value,
};

fn ir_type(ty: Type) -> IrType {
    match ty {
        Type::Int => IrType::I32,
        Type::String => IrType::Ptr,
        Type::Void | Type::Undefined => panic!("no machine type for {}", ty),
    }
}

fn bin_op(op: Operator) -> BinOp {
    match op {
        Operator::Plus => BinOp::Add,
        Operator::Minus => BinOp::Sub,
        Operator::Times => BinOp::Mul,
        Operator::Divide => BinOp::Div,
        Operator::Eq => BinOp::CmpEq,
        Operator::Neq => BinOp::CmpNe,
        Operator::Lt => BinOp::CmpLt,
        Operator::Le => BinOp::CmpLe,
        Operator::Gt => BinOp::CmpGt,
        Operator::Ge => BinOp::CmpGe,
    }
}

/// Lowers a checked program into a [`Module`].
///
/// Functions are generated breadth-first: declaring a function registers
/// its signature and queues its body, so calls can be emitted before the
/// callee's blocks exist. Every non-external function takes its enclosing
/// function's frame pointer as a leading `static_link` argument; reading a
/// variable of an outer function walks that chain one hop per enclosing
/// function, however deep the loop scopes in between.
pub struct IRGenerator<'a> {
    program: &'a Program,
    module: Module,
    pending: VecDeque<FunId>,
    /// Frame slot of every escaping variable: owning function and index.
    frame_slots: HashMap<VarId, (FunId, usize)>,
    /// Frame type name of every function generated so far.
    frames: HashMap<FunId, String>,

    // Per-function state, reset by `generate_function`.
    current_fun: Option<FunId>,
    blocks: Vec<BasicBlock>,
    current: usize,
    temp_counter: u32,
    label_counter: u32,
    /// Stack slot of every non-escaping local of the current function.
    allocations: HashMap<VarId, Value>,
    /// Exit label of every loop currently in scope, keyed by the loop node.
    loop_exits: HashMap<ExprId, String>,
    frame_ptr: Value,
}

impl<'a> IRGenerator<'a> {
    pub fn new(program: &'a Program) -> Self {
        IRGenerator {
            program,
            module: Module::new(),
            pending: VecDeque::new(),
            frame_slots: HashMap::new(),
            frames: HashMap::new(),
            current_fun: None,
            blocks: Vec::new(),
            current: 0,
            temp_counter: 0,
            label_counter: 0,
            allocations: HashMap::new(),
            loop_exits: HashMap::new(),
            frame_ptr: Value::Const(0),
        }
    }

    pub fn generate_program(mut self, main: FunId) -> Module {
        self.declare_function(main);
        while let Some(fun) = self.pending.pop_front() {
            self.generate_function(fun);
        }
        if let Err(message) = self.module.verify() {
            panic!("generated an ill-formed module: {}", message);
        }
        self.module
    }

    /// Registers a function's signature in the module and queues its body.
    /// Safe to call repeatedly for the same function.
    fn declare_function(&mut self, fun: FunId) {
        let decl = self.program.fun(fun);
        if self.module.function(&decl.external_name).is_some() {
            return;
        }
        let mut params: Vec<(String, IrType)> = Vec::new();
        if !decl.is_external {
            params.push((String::from("static_link"), IrType::Ptr));
        }
        for param in &decl.params {
            let var = self.program.var(*param);
            params.push((var.name.clone(), ir_type(var.ty)));
        }
        let return_type = match decl.ty {
            Type::Void => None,
            ty => Some(ir_type(ty)),
        };
        self.module.functions.push(Function {
            name: decl.external_name.clone(),
            params,
            return_type,
            frame: None,
            blocks: Vec::new(),
            is_external: decl.is_external,
        });
        if decl.body.is_some() {
            self.pending.push_back(fun);
        }
    }

    /// Declares a runtime helper reached without a source-level call.
    fn declare_runtime(&mut self, name: &str, params: &[IrType], return_type: Option<IrType>) {
        if self.module.function(name).is_some() {
            return;
        }
        self.module.functions.push(Function {
            name: name.to_string(),
            params: params
                .iter()
                .enumerate()
                .map(|(i, ty)| (format!("a_{}", i), *ty))
                .collect(),
            return_type,
            frame: None,
            blocks: Vec::new(),
            is_external: true,
        });
    }

    fn generate_function(&mut self, fun: FunId) {
        let program = self.program;
        let decl = program.fun(fun);

        self.current_fun = Some(fun);
        self.blocks = vec![BasicBlock::new("entry"), BasicBlock::new("body")];
        self.current = 0;
        self.temp_counter = 0;
        self.label_counter = 0;
        self.allocations.clear();
        self.loop_exits.clear();

        // Frame allocation, the static link store and argument spills all
        // build in the entry block, ahead of any control flow.
        let frame_name = self.generate_frame(fun);

        if !decl.is_external {
            let addr = self.slot_addr(&frame_name, self.frame_ptr, 0);
            self.emit(Instruction::Store {
                addr,
                value: Value::Arg(0),
            });
        }

        let arg_base = if decl.is_external { 0 } else { 1 };
        for (i, param) in decl.params.iter().enumerate() {
            let storage = self.var_storage(*param);
            self.emit(Instruction::Store {
                addr: storage,
                value: Value::Arg(arg_base + i),
            });
        }
        self.current = 1;

        let body = decl.body.expect("generating a function without a body");
        let result = self.gen_expr(body);
        let terminator = match decl.ty {
            Type::Void => Terminator::Return(None),
            _ => Terminator::Return(Some(
                result.expect("non-void function body produced no value"),
            )),
        };
        self.seal(terminator);
        self.blocks[0].terminator = Some(Terminator::Jump(String::from("body")));

        let blocks = std::mem::take(&mut self.blocks);
        let function = self
            .module
            .function_mut(&decl.external_name)
            .expect("generating an undeclared function");
        function.frame = Some(frame_name);
        function.blocks = blocks;
    }

    /// Lays out the frame record: the parent pointer in slot 0 when the
    /// function is nested, then one slot per escaping declaration in
    /// declaration order. Emits the allocation into the entry block.
    fn generate_frame(&mut self, fun: FunId) -> String {
        let decl = self.program.fun(fun);
        let name = format!("ft_{}", decl.external_name);
        let parent = decl.parent.map(|p| self.frames[&p].clone());
        let base = if parent.is_some() { 1 } else { 0 };
        let mut slots = Vec::new();
        for (i, var) in decl.escaping_decls.iter().enumerate() {
            let var_decl = self.program.var(*var);
            slots.push((var_decl.name.clone(), ir_type(var_decl.ty)));
            self.frame_slots.insert(*var, (fun, base + i));
        }
        self.module.frames.push(FrameType {
            name: name.clone(),
            parent,
            slots,
        });
        self.frames.insert(fun, name.clone());

        let dest = self.new_temp();
        self.emit_in_entry(Instruction::AllocFrame {
            dest,
            frame: name.clone(),
        });
        self.frame_ptr = Value::Temp(dest);
        name
    }

    /// Walks the static chain from the current frame to `owner`'s frame,
    /// one load per enclosing function.
    fn frame_up_to(&mut self, owner: FunId) -> Value {
        let mut ptr = self.frame_ptr;
        let mut fun = self.current_fun.expect("no current function");
        while fun != owner {
            let frame = self.frames[&fun].clone();
            let addr = self.slot_addr(&frame, ptr, 0);
            let dest = self.new_temp();
            self.emit(Instruction::Load {
                dest,
                ty: IrType::Ptr,
                addr,
            });
            ptr = Value::Temp(dest);
            fun = self
                .program
                .fun(fun)
                .parent
                .expect("static chain does not reach the owner");
        }
        ptr
    }

    /// The address a variable lives at, from the current function's point
    /// of view.
    fn address_of(&mut self, var: VarId) -> Value {
        if self.program.var(var).escapes {
            let (owner, index) = self.frame_slots[&var];
            let base = self.frame_up_to(owner);
            let frame = self.frames[&owner].clone();
            self.slot_addr(&frame, base, index)
        } else {
            self.allocations[&var]
        }
    }

    /// Storage for a variable declared by the current function: its frame
    /// slot if it escapes, a fresh stack slot otherwise.
    fn var_storage(&mut self, var: VarId) -> Value {
        let decl = self.program.var(var);
        if decl.escapes {
            let (owner, index) = self.frame_slots[&var];
            let frame = self.frames[&owner].clone();
            self.slot_addr(&frame, self.frame_ptr, index)
        } else {
            let dest = self.new_temp();
            self.emit_in_entry(Instruction::Alloca {
                dest,
                ty: ir_type(decl.ty),
                name: decl.name.clone(),
            });
            let value = Value::Temp(dest);
            self.allocations.insert(var, value);
            value
        }
    }

    fn gen_expr(&mut self, id: ExprId) -> Option<Value> {
        let program = self.program;
        let kind = program.expr(id).kind.clone();
        match kind {
            ExprKind::IntegerLiteral(value) => Some(Value::Const(value)),
            ExprKind::StringLiteral(value) => {
                Some(Value::Str(self.module.intern_string(&value)))
            }
            ExprKind::BinaryOperator { op, left, right } => {
                let operand_ty = program.expr(left).ty;
                // Equal void values: nothing to evaluate, the answer is known.
                if operand_ty == Type::Void {
                    return Some(Value::Const(if op == Operator::Eq { 1 } else { 0 }));
                }
                let left_value = self.gen_expr(left).expect("operand has no value");
                let right_value = self.gen_expr(right).expect("operand has no value");
                let dest = self.new_temp();
                if operand_ty == Type::String && op.is_equality() {
                    // String equality defers to the runtime's three-way
                    // comparison, then tests its result against zero.
                    self.declare_runtime("__strcmp", &[IrType::Ptr, IrType::Ptr], Some(IrType::I32));
                    let compared = self.new_temp();
                    self.emit(Instruction::Call {
                        dest: Some(compared),
                        callee: String::from("__strcmp"),
                        args: vec![left_value, right_value],
                    });
                    self.emit(Instruction::Binary {
                        dest,
                        op: bin_op(op),
                        left: Value::Temp(compared),
                        right: Value::Const(0),
                    });
                } else {
                    self.emit(Instruction::Binary {
                        dest,
                        op: bin_op(op),
                        left: left_value,
                        right: right_value,
                    });
                }
                Some(Value::Temp(dest))
            }
            ExprKind::Sequence(exprs) => {
                let mut value = None;
                for expr in exprs {
                    value = self.gen_expr(expr);
                }
                value
            }
            ExprKind::Let { decls, body } => {
                for decl in decls {
                    match decl {
                        DeclRef::Var(var) => {
                            let init = program.var(var).init.expect("let variable without init");
                            let value = self.gen_expr(init).expect("initializer has no value");
                            let storage = self.var_storage(var);
                            self.emit(Instruction::Store {
                                addr: storage,
                                value,
                            });
                        }
                        DeclRef::Fun(fun) => self.declare_function(fun),
                    }
                }
                self.gen_expr(body)
            }
            ExprKind::Identifier { decl, .. } => {
                let var = decl.expect("identifier not resolved");
                let addr = self.address_of(var);
                let dest = self.new_temp();
                self.emit(Instruction::Load {
                    dest,
                    ty: ir_type(program.var(var).ty),
                    addr,
                });
                Some(Value::Temp(dest))
            }
            ExprKind::IfThenElse {
                condition,
                then_part,
                else_part,
            } => {
                let n = self.next_label_id();
                let then_label = format!("if_then_{}", n);
                let else_label = format!("if_else_{}", n);
                let end_label = format!("if_end_{}", n);

                let result_ty = program.expr(id).ty;
                let result_slot = if result_ty != Type::Void {
                    let dest = self.new_temp();
                    self.emit_in_entry(Instruction::Alloca {
                        dest,
                        ty: ir_type(result_ty),
                        name: String::from("if_result"),
                    });
                    Some(Value::Temp(dest))
                } else {
                    None
                };

                let cond = self.gen_expr(condition).expect("condition has no value");
                self.seal(Terminator::Branch {
                    cond,
                    then_label: then_label.clone(),
                    else_label: else_label.clone(),
                });

                self.start_block(then_label);
                let then_value = self.gen_expr(then_part);
                if let Some(slot) = result_slot {
                    self.emit(Instruction::Store {
                        addr: slot,
                        value: then_value.expect("branch has no value"),
                    });
                }
                self.seal(Terminator::Jump(end_label.clone()));

                self.start_block(else_label);
                let else_value = self.gen_expr(else_part);
                if let Some(slot) = result_slot {
                    self.emit(Instruction::Store {
                        addr: slot,
                        value: else_value.expect("branch has no value"),
                    });
                }
                self.seal(Terminator::Jump(end_label.clone()));

                self.start_block(end_label);
                result_slot.map(|slot| {
                    let dest = self.new_temp();
                    self.emit(Instruction::Load {
                        dest,
                        ty: ir_type(result_ty),
                        addr: slot,
                    });
                    Value::Temp(dest)
                })
            }
            ExprKind::While { condition, body } => {
                let n = self.next_label_id();
                let test_label = format!("loop_test_{}", n);
                let body_label = format!("loop_body_{}", n);
                let end_label = format!("loop_end_{}", n);
                self.loop_exits.insert(id, end_label.clone());

                self.seal(Terminator::Jump(test_label.clone()));
                self.start_block(test_label.clone());
                let cond = self.gen_expr(condition).expect("condition has no value");
                self.seal(Terminator::Branch {
                    cond,
                    then_label: body_label.clone(),
                    else_label: end_label.clone(),
                });

                self.start_block(body_label);
                self.gen_expr(body);
                self.seal(Terminator::Jump(test_label));

                self.start_block(end_label);
                None
            }
            ExprKind::For { var, high, body } => {
                let n = self.next_label_id();
                let test_label = format!("loop_test_{}", n);
                let body_label = format!("loop_body_{}", n);
                let end_label = format!("loop_end_{}", n);
                self.loop_exits.insert(id, end_label.clone());

                let low = program.var(var).init.expect("loop variable without low bound");
                let low_value = self.gen_expr(low).expect("bound has no value");
                let storage = self.var_storage(var);
                self.emit(Instruction::Store {
                    addr: storage,
                    value: low_value,
                });
                // The high bound is evaluated once, before the loop.
                let high_value = self.gen_expr(high).expect("bound has no value");

                self.seal(Terminator::Jump(test_label.clone()));
                self.start_block(test_label.clone());
                let addr = self.address_of(var);
                let current = self.new_temp();
                self.emit(Instruction::Load {
                    dest: current,
                    ty: IrType::I32,
                    addr,
                });
                let cond = self.new_temp();
                self.emit(Instruction::Binary {
                    dest: cond,
                    op: BinOp::CmpLe,
                    left: Value::Temp(current),
                    right: high_value,
                });
                self.seal(Terminator::Branch {
                    cond: Value::Temp(cond),
                    then_label: body_label.clone(),
                    else_label: end_label.clone(),
                });

                self.start_block(body_label);
                self.gen_expr(body);
                let addr = self.address_of(var);
                let current = self.new_temp();
                self.emit(Instruction::Load {
                    dest: current,
                    ty: IrType::I32,
                    addr,
                });
                let next = self.new_temp();
                self.emit(Instruction::Binary {
                    dest: next,
                    op: BinOp::Add,
                    left: Value::Temp(current),
                    right: Value::Const(1),
                });
                let addr = self.address_of(var);
                self.emit(Instruction::Store {
                    addr,
                    value: Value::Temp(next),
                });
                self.seal(Terminator::Jump(test_label));

                self.start_block(end_label);
                None
            }
            ExprKind::Break { loop_target } => {
                let target = loop_target.expect("break not attached to a loop");
                let exit = self.loop_exits[&target].clone();
                self.seal(Terminator::Jump(exit));
                // Anything emitted after a break is unreachable; give it a
                // block of its own so the builder stays well-formed.
                let label = format!("dead_{}", self.next_label_id());
                self.start_block(label);
                None
            }
            ExprKind::Assign { lhs, rhs } => {
                let value = self.gen_expr(rhs).expect("assigned value is void");
                let var = match &program.expr(lhs).kind {
                    ExprKind::Identifier { decl: Some(var), .. } => *var,
                    other => panic!("assignment target is not a variable: {:?}", other),
                };
                let addr = self.address_of(var);
                self.emit(Instruction::Store { addr, value });
                None
            }
            ExprKind::Call { args, decl, .. } => {
                let fun = decl.expect("call not resolved");
                self.declare_function(fun);
                let callee = program.fun(fun);

                let mut arg_values = Vec::with_capacity(args.len() + 1);
                if !callee.is_external {
                    let owner = callee.parent.expect("nested function without a parent");
                    arg_values.push(self.frame_up_to(owner));
                }
                for arg in &args {
                    arg_values.push(self.gen_expr(*arg).expect("argument has no value"));
                }

                let dest = match callee.ty {
                    Type::Void => None,
                    _ => Some(self.new_temp()),
                };
                self.emit(Instruction::Call {
                    dest,
                    callee: callee.external_name.clone(),
                    args: arg_values,
                });
                dest.map(Value::Temp)
            }
        }
    }

    // Block building.

    fn new_temp(&mut self) -> TempId {
        let temp = TempId(self.temp_counter);
        self.temp_counter += 1;
        temp
    }

    fn next_label_id(&mut self) -> u32 {
        let n = self.label_counter;
        self.label_counter += 1;
        n
    }

    fn emit(&mut self, instruction: Instruction) {
        self.blocks[self.current].instructions.push(instruction);
    }

    /// Allocations and frame setup live in the entry block, ahead of any
    /// control flow.
    fn emit_in_entry(&mut self, instruction: Instruction) {
        self.blocks[0].instructions.push(instruction);
    }

    fn seal(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current];
        if block.terminator.is_none() {
            block.terminator = Some(terminator);
        }
    }

    fn start_block(&mut self, label: String) {
        self.blocks.push(BasicBlock::new(label));
        self.current = self.blocks.len() - 1;
    }

    fn slot_addr(&mut self, frame: &str, base: Value, index: usize) -> Value {
        let dest = self.new_temp();
        self.emit(Instruction::SlotAddr {
            dest,
            frame: frame.to_string(),
            base,
            index,
        });
        Value::Temp(dest)
    }
}
