use crate::ast::ast::{DeclRef, FunId, Operator, Program};
use crate::binder::binder::Binder;
use crate::irgen::ir::{
    BasicBlock, Function, Instruction, IrType, Module, Terminator, Value,
};
use crate::irgen::irgen::IRGenerator;
use crate::type_checker::type_checker::check_program;
use crate::Span;

fn span() -> Span {
    Span::null()
}

fn lower(mut program: Program, root: crate::ast::ast::ExprId) -> (Program, FunId, Module) {
    let mut binder = Binder::new();
    let main = binder.analyze_program(&mut program, root).unwrap();
    check_program(&mut program, main).unwrap();
    let module = IRGenerator::new(&program).generate_program(main);
    (program, main, module)
}

#[test]
fn trivial_program_gets_an_empty_main_frame() {
    let mut program = Program::new();
    let root = program.int_lit(1, span());
    let (_, _, module) = lower(program, root);

    let main = module.function("main").unwrap();
    assert!(!main.blocks.is_empty());
    assert_eq!(main.return_type, Some(IrType::I32));
    assert_eq!(main.params.len(), 0);

    let frame = module.frame("ft_main").unwrap();
    assert!(frame.parent.is_none());
    assert!(frame.slots.is_empty());
}

#[test]
fn escaping_variable_gets_a_frame_slot() {
    // let var x := 1 function f():int = x in f() end
    let mut program = Program::new();
    let one = program.int_lit(1, span());
    let x = program.var_decl("x", None, one, span());
    let use_x = program.identifier("x", span());
    let f = program.fun_decl("f", vec![], Some("int"), Some(use_x), span());
    let call = program.call("f", vec![], span());
    let root = program.let_in(vec![DeclRef::Var(x), DeclRef::Fun(f)], call, span());

    let (_, _, module) = lower(program, root);

    let main_frame = module.frame("ft_main").unwrap();
    assert!(main_frame.parent.is_none());
    assert_eq!(main_frame.slots, vec![(String::from("x"), IrType::I32)]);

    // f allocates its own frame and chains it to main's.
    let f_frame = module.frame("ft_main.f").unwrap();
    assert_eq!(f_frame.parent.as_deref(), Some("ft_main"));

    // f takes the static link as its leading parameter.
    let f_fun = module.function("main.f").unwrap();
    assert_eq!(f_fun.params[0], (String::from("static_link"), IrType::Ptr));
    assert_eq!(f_fun.return_type, Some(IrType::I32));
}

#[test]
fn non_escaping_variable_stays_out_of_the_frame() {
    // let var x := 1 in x end
    let mut program = Program::new();
    let one = program.int_lit(1, span());
    let x = program.var_decl("x", None, one, span());
    let use_x = program.identifier("x", span());
    let root = program.let_in(vec![DeclRef::Var(x)], use_x, span());

    let (_, _, module) = lower(program, root);
    assert!(module.frame("ft_main").unwrap().slots.is_empty());

    // The variable lives in a named stack slot instead.
    let main = module.function("main").unwrap();
    let entry = &main.blocks[0];
    assert!(entry.instructions.iter().any(|i| matches!(
        i,
        Instruction::Alloca { name, .. } if name == "x"
    )));
}

#[test]
fn call_to_nested_function_passes_the_frame() {
    // let function f(x:int):int = x + 1 in f(41) end
    let mut program = Program::new();
    let x_param = program.param("x", "int", span());
    let use_x = program.identifier("x", span());
    let one = program.int_lit(1, span());
    let sum = program.binary(Operator::Plus, use_x, one, span());
    let f = program.fun_decl("f", vec![x_param], Some("int"), Some(sum), span());
    let forty_one = program.int_lit(41, span());
    let call = program.call("f", vec![forty_one], span());
    let root = program.let_in(vec![DeclRef::Fun(f)], call, span());

    let (_, _, module) = lower(program, root);
    let main = module.function("main").unwrap();

    let call = main
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .find_map(|i| match i {
            Instruction::Call { callee, args, .. } if callee == "main.f" => Some(args),
            _ => None,
        })
        .expect("main never calls main.f");
    assert_eq!(call.len(), 2);
    assert_eq!(call[1], Value::Const(41));
    assert!(matches!(call[0], Value::Temp(_)));
}

#[test]
fn primitive_calls_take_no_static_link() {
    // print_int(7)
    let mut program = Program::new();
    let seven = program.int_lit(7, span());
    let root = program.call("print_int", vec![seven], span());

    let (_, _, module) = lower(program, root);
    let declared = module.function("__print_int").unwrap();
    assert!(declared.is_external);
    assert!(declared.blocks.is_empty());
    assert_eq!(declared.params.len(), 1);

    let main = module.function("main").unwrap();
    let args = main
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .find_map(|i| match i {
            Instruction::Call { callee, args, .. } if callee == "__print_int" => Some(args),
            _ => None,
        })
        .expect("main never calls __print_int");
    assert_eq!(args, &vec![Value::Const(7)]);
}

#[test]
fn string_equality_lowers_to_strcmp() {
    // "a" = "b"  (as a condition, to keep the program well-typed)
    let mut program = Program::new();
    let a = program.string_lit("a", span());
    let b = program.string_lit("b", span());
    let eq = program.binary(Operator::Eq, a, b, span());
    let one = program.int_lit(1, span());
    let two = program.int_lit(2, span());
    let root = program.if_then_else(eq, one, two, span());

    let (_, _, module) = lower(program, root);
    assert!(module.function("__strcmp").is_some());

    let main = module.function("main").unwrap();
    assert!(main
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .any(|i| matches!(i, Instruction::Call { callee, .. } if callee == "__strcmp")));
}

#[test]
fn void_comparison_folds_to_a_constant() {
    // (if 1 then () else ()) = ()
    let mut program = Program::new();
    let cond = program.int_lit(1, span());
    let then_part = program.sequence(vec![], span());
    let else_part = program.sequence(vec![], span());
    let if_expr = program.if_then_else(cond, then_part, else_part, span());
    let unit = program.sequence(vec![], span());
    let root = program.binary(Operator::Eq, if_expr, unit, span());

    let (_, _, module) = lower(program, root);
    let main = module.function("main").unwrap();
    assert!(!main
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .any(|i| matches!(i, Instruction::Binary { .. })));
}

#[test]
fn string_literals_are_interned_once() {
    // (print("hi"); print("hi"))
    let mut program = Program::new();
    let first = program.string_lit("hi", span());
    let call_a = program.call("print", vec![first], span());
    let second = program.string_lit("hi", span());
    let call_b = program.call("print", vec![second], span());
    let root = program.sequence(vec![call_a, call_b], span());

    let (_, _, module) = lower(program, root);
    assert_eq!(module.strings, vec![String::from("hi")]);
}

#[test]
fn while_with_break_verifies() {
    // let var x := 1 in while 1 do (x := 0; break) end  (shape only)
    let mut program = Program::new();
    let one = program.int_lit(1, span());
    let x = program.var_decl("x", None, one, span());
    let cond = program.int_lit(1, span());
    let lhs = program.identifier("x", span());
    let zero = program.int_lit(0, span());
    let assign = program.assign(lhs, zero, span());
    let brk = program.break_expr(span());
    let body = program.sequence(vec![assign, brk], span());
    let while_loop = program.while_loop(cond, body, span());
    let root = program.let_in(vec![DeclRef::Var(x)], while_loop, span());

    // `lower` panics if the module fails verification.
    let (_, _, module) = lower(program, root);
    let main = module.function("main").unwrap();
    assert!(main
        .blocks
        .iter()
        .any(|b| b.label.starts_with("loop_end")));
}

#[test]
fn capture_through_a_loop_walks_one_hop_per_function() {
    // for i := 1 to 3 do (let function g():int = i in (g(); ()) end)
    // The loop body is lexically deeper than i's declaration, but g still
    // reaches main's frame in a single parent-pointer hop.
    let mut program = Program::new();
    let low = program.int_lit(1, span());
    let i = program.loop_var("i", low, span());
    let high = program.int_lit(3, span());
    let use_i = program.identifier("i", span());
    let g = program.fun_decl("g", vec![], Some("int"), Some(use_i), span());
    let call = program.call("g", vec![], span());
    let unit = program.sequence(vec![], span());
    let body_seq = program.sequence(vec![call, unit], span());
    let body = program.let_in(vec![DeclRef::Fun(g)], body_seq, span());
    let root = program.for_loop(i, high, body, span());

    let (_, _, module) = lower(program, root);

    assert_eq!(
        module.frame("ft_main").unwrap().slots,
        vec![(String::from("i"), IrType::I32)]
    );

    let g_fun = module.function("main.g").unwrap();
    // g loads its static link (slot 0 of its own frame) and then addresses
    // slot 0 of main's frame; no further hops appear.
    let loads_of_parent = g_fun
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter(|i| matches!(i, Instruction::Load { ty: IrType::Ptr, .. }))
        .count();
    assert_eq!(loads_of_parent, 1);
    assert!(g_fun
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .any(|i| matches!(
            i,
            Instruction::SlotAddr { frame, .. } if frame == "ft_main"
        )));
}

#[test]
fn verify_rejects_an_unterminated_block() {
    let mut module = Module::new();
    module.functions.push(Function {
        name: String::from("broken"),
        params: vec![],
        return_type: None,
        frame: None,
        blocks: vec![BasicBlock::new("entry")],
        is_external: false,
    });
    assert!(module.verify().is_err());
}

#[test]
fn verify_rejects_a_jump_to_nowhere() {
    let mut module = Module::new();
    let mut block = BasicBlock::new("entry");
    block.terminator = Some(Terminator::Jump(String::from("elsewhere")));
    module.functions.push(Function {
        name: String::from("broken"),
        params: vec![],
        return_type: None,
        frame: None,
        blocks: vec![block],
        is_external: false,
    });
    assert!(module.verify().is_err());
}

#[test]
fn verify_rejects_a_call_to_an_undeclared_function() {
    let mut module = Module::new();
    let mut block = BasicBlock::new("entry");
    block.instructions.push(Instruction::Call {
        dest: None,
        callee: String::from("phantom"),
        args: vec![],
    });
    block.terminator = Some(Terminator::Return(None));
    module.functions.push(Function {
        name: String::from("broken"),
        params: vec![],
        return_type: None,
        frame: None,
        blocks: vec![block],
        is_external: false,
    });
    assert!(module.verify().is_err());
}

#[test]
fn module_dump_is_readable() {
    let mut program = Program::new();
    let hi = program.string_lit("hi", span());
    let root = program.call("print", vec![hi], span());

    let (_, _, module) = lower(program, root);
    let dump = module.to_string();
    assert!(dump.contains("declare __print(ptr)"));
    assert!(dump.contains("function main() : i32 {"));
    assert!(dump.contains("@str.0 = \"hi\""));
    assert!(dump.contains("frame ft_main {"));
}
