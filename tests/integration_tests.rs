//! End-to-end runs of the whole pipeline: bind, check, lower, verify.

use tigerc::ast::ast::{DeclRef, Operator, Program};
use tigerc::compile_ast;
use tigerc::irgen::ir::{Instruction, IrType, Value};
use tigerc::Span;

fn span() -> Span {
    Span::null()
}

#[test]
fn add_one_program_compiles_end_to_end() {
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

    let output = compile_ast(&mut program, root).unwrap();
    assert!(output.diagnostics.is_empty());

    let f_fun = output.module.function("main.f").unwrap();
    assert_eq!(
        f_fun.params,
        vec![
            (String::from("static_link"), IrType::Ptr),
            (String::from("x"), IrType::I32),
        ]
    );
    assert_eq!(f_fun.return_type, Some(IrType::I32));

    let main = output.module.function("main").unwrap();
    let args = main
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .find_map(|i| match i {
            Instruction::Call { callee, args, .. } if callee == "main.f" => Some(args),
            _ => None,
        })
        .expect("main never calls main.f");
    assert_eq!(args.len(), 2);
    assert_eq!(args[1], Value::Const(41));
}

#[test]
fn shadowing_binds_to_the_nearest_declaration() {
    // let var x := 1 in let var x := "two" in print(x) end end
    let mut program = Program::new();
    let one = program.int_lit(1, span());
    let outer = program.var_decl("x", None, one, span());
    let two = program.string_lit("two", span());
    let inner = program.var_decl("x", None, two, span());
    let use_x = program.identifier("x", span());
    let print = program.call("print", vec![use_x], span());
    let inner_let = program.let_in(vec![DeclRef::Var(inner)], print, span());
    let root = program.let_in(vec![DeclRef::Var(outer)], inner_let, span());

    // Type-checks only because x resolves to the inner string variable.
    let output = compile_ast(&mut program, root).unwrap();
    assert!(output.diagnostics.is_empty());
    assert_eq!(output.module.strings, vec![String::from("two")]);
}

#[test]
fn duplicate_declarations_compile_with_a_diagnostic() {
    // let var x := 1 var x := 2 in x end
    let mut program = Program::new();
    let one = program.int_lit(1, span());
    let first = program.var_decl("x", None, one, span());
    let two = program.int_lit(2, span());
    let second = program.var_decl("x", None, two, span());
    let use_x = program.identifier("x", span());
    let root = program.let_in(
        vec![DeclRef::Var(first), DeclRef::Var(second)],
        use_x,
        span(),
    );

    let output = compile_ast(&mut program, root).unwrap();
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].get_error_name(), "AlreadyDefined");
}

#[test]
fn ill_typed_programs_do_not_reach_irgen() {
    // 1 + "a"
    let mut program = Program::new();
    let one = program.int_lit(1, span());
    let a = program.string_lit("a", span());
    let root = program.binary(Operator::Plus, one, a, span());

    let error = compile_ast(&mut program, root).unwrap_err();
    assert_eq!(error.get_error_name(), "OperandMismatch");
}

#[test]
fn loop_variable_captured_by_a_nested_function() {
    // for i := 1 to 3 do
    //   (let function g():int = i in (print_int(g()); ()) end)
    let mut program = Program::new();
    let low = program.int_lit(1, span());
    let i = program.loop_var("i", low, span());
    let high = program.int_lit(3, span());
    let use_i = program.identifier("i", span());
    let g = program.fun_decl("g", vec![], Some("int"), Some(use_i), span());
    let call_g = program.call("g", vec![], span());
    let print = program.call("print_int", vec![call_g], span());
    let unit = program.sequence(vec![], span());
    let seq = program.sequence(vec![print, unit], span());
    let body = program.let_in(vec![DeclRef::Fun(g)], seq, span());
    let root = program.for_loop(i, high, body, span());

    let output = compile_ast(&mut program, root).unwrap();

    // The loop variable lives in main's frame so g can reach it.
    let frame = output.module.frame("ft_main").unwrap();
    assert_eq!(frame.slots, vec![(String::from("i"), IrType::I32)]);

    let g_fun = output.module.function("main.g").unwrap();
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
fn mutually_recursive_functions_both_reach_the_module() {
    // let function even(n:int):int = if n then odd(n - 1) else 1
    //     function odd(n:int):int = if n then even(n - 1) else 0
    // in even(10) end
    let mut program = Program::new();

    let n_even = program.param("n", "int", span());
    let cond = program.identifier("n", span());
    let n_use = program.identifier("n", span());
    let one = program.int_lit(1, span());
    let sub = program.binary(Operator::Minus, n_use, one, span());
    let call_odd = program.call("odd", vec![sub], span());
    let base = program.int_lit(1, span());
    let even_body = program.if_then_else(cond, call_odd, base, span());
    let even = program.fun_decl("even", vec![n_even], Some("int"), Some(even_body), span());

    let n_odd = program.param("n", "int", span());
    let cond = program.identifier("n", span());
    let n_use = program.identifier("n", span());
    let one = program.int_lit(1, span());
    let sub = program.binary(Operator::Minus, n_use, one, span());
    let call_even = program.call("even", vec![sub], span());
    let base = program.int_lit(0, span());
    let odd_body = program.if_then_else(cond, call_even, base, span());
    let odd = program.fun_decl("odd", vec![n_odd], Some("int"), Some(odd_body), span());

    let ten = program.int_lit(10, span());
    let call = program.call("even", vec![ten], span());
    let root = program.let_in(vec![DeclRef::Fun(even), DeclRef::Fun(odd)], call, span());

    let output = compile_ast(&mut program, root).unwrap();
    assert!(output.module.function("main.even").is_some());
    assert!(output.module.function("main.odd").is_some());
    assert!(!output.module.function("main.even").unwrap().blocks.is_empty());
    assert!(!output.module.function("main.odd").unwrap().blocks.is_empty());
}

#[test]
fn textual_dump_lists_runtime_and_main() {
    // print(concat("a", "b"))
    let mut program = Program::new();
    let a = program.string_lit("a", span());
    let b = program.string_lit("b", span());
    let concat = program.call("concat", vec![a, b], span());
    let root = program.call("print", vec![concat], span());

    let output = compile_ast(&mut program, root).unwrap();
    let dump = output.module.to_string();
    assert!(dump.contains("declare __concat(ptr, ptr) : ptr"));
    assert!(dump.contains("declare __print(ptr)"));
    assert!(dump.contains("function main() : i32 {"));
}
