//! End-to-end tests: source text through parse, lowering, selection, and
//! allocation, checked at the dump boundaries.

use toyc::back;
use toyc::front::{dump_ast, parse};
use toyc::middle::{dump_ir, lower, LowerError};

/// Parse and lower, asserting no errors at either stage, and return the IR
/// dump.
fn compile_ir(source: &str) -> String {
    let parsed = parse("test.toy", source);
    assert!(
        parsed.errors.is_empty(),
        "Parse errors: {:?}",
        parsed.errors
    );
    let ir = lower(&parsed.unit).expect("lowering failed");
    dump_ir(&ir)
}

/// Run the whole pipeline and return the final assembly text.
fn compile_asm(source: &str) -> String {
    let parsed = parse("test.toy", source);
    assert!(
        parsed.errors.is_empty(),
        "Parse errors: {:?}",
        parsed.errors
    );
    let ir = lower(&parsed.unit).expect("lowering failed");
    let mut asm = back::code_gen(&ir);
    back::allocate(&mut asm);
    back::assign_frames(&mut asm);
    asm.asm_code()
}

fn lower_error(source: &str) -> LowerError {
    let parsed = parse("test.toy", source);
    lower(&parsed.unit).expect_err("lowering unexpectedly succeeded")
}

#[test]
fn identity_function() {
    let source = "func id(a: int) : int { return a; }";
    assert_eq!(
        compile_ir(source),
        "define @id(a) {\nBB_0:\n    %0 = load a\n    return %0\n}\n"
    );

    let asm = compile_asm(source);
    assert!(asm.starts_with("_id:\n\tstr x0, [sp, #0]\n"), "{asm}");
    assert!(asm.contains("\tmov x0, x8\n"), "{asm}");
    assert!(asm.ends_with(".Lid_epilogue:\n\tret\n\n"), "{asm}");
}

#[test]
fn addition() {
    let source = "func add(a: int, b: int) : int { return a + b; }";
    assert_eq!(
        compile_ir(source),
        "define @add(a, b) {\nBB_0:\n    %0 = load a\n    %1 = load b\n    %2 = add %0, %1\n    return %2\n}\n"
    );

    let asm = compile_asm(source);
    assert_eq!(asm.matches("\tstr x1, [sp, #8]\n").count(), 1, "{asm}");
    assert_eq!(asm.matches("\tadd x10, x8, x9\n").count(), 1, "{asm}");
}

#[test]
fn if_without_else() {
    let source = "func f(x: int) : int { if x { return 1; } return 0; }";
    assert_eq!(
        compile_ir(source),
        "define @f(x) {\n\
         BB_0:\n    %0 = load x\n    cjump %0, BB_1, BB_2\n\
         BB_1:\n    return $1\n    jump BB_2\n\
         BB_2:\n    return $0\n}\n"
    );
}

#[test]
fn while_loop() {
    let source = "func g(n: int) : int {\n\
                  \x20 var i: int = n;\n\
                  \x20 while i { i = i - 1; }\n\
                  \x20 return i;\n\
                  }";
    let ir = compile_ir(source);
    // entry -> cond -> {loop, final}; the loop closes back on the condition.
    assert!(ir.contains("    jump BB_1\nBB_1:\n"), "{ir}");
    assert!(ir.contains("    cjump %2, BB_2, BB_3\n"), "{ir}");
    assert!(ir.contains("    store %4, %0\n    jump BB_1\nBB_3:\n"), "{ir}");
}

#[test]
fn scoped_shadowing() {
    let source = "func s() : int { var x: int = 1; { var x: int = 2; } return x; }";
    assert_eq!(
        compile_ir(source),
        "define @s() {\n\
         BB_0:\n\
         \x20   %0 = alloca\n\
         \x20   store $1, %0\n\
         \x20   %1 = alloca\n\
         \x20   store $2, %1\n\
         \x20   %2 = load %0\n\
         \x20   return %2\n\
         }\n"
    );
}

#[test]
fn extern_and_call() {
    let source = "extern print(x: int);\nfunc main() : int { print(7); return 0; }";
    let ir = compile_ir(source);
    assert!(ir.starts_with("extern @print(x);\n"), "{ir}");
    assert!(ir.contains("    %0 = call @print($7)\n"), "{ir}");
    assert!(ir.contains("    return $0\n"), "{ir}");

    let asm = compile_asm(source);
    assert_eq!(asm.matches("\tbl _print\n").count(), 1, "{asm}");
}

#[test]
fn ast_dump_is_prepended_shapes() {
    let parsed = parse(
        "test.toy",
        "extern print(x: int);\nfunc main() : int { return 0; }",
    );
    assert!(parsed.errors.is_empty());
    let dump = dump_ast(&parsed.unit);
    assert!(dump.starts_with("Prototype\n    (int) : void\n"), "{dump}");
    assert!(dump.contains("Function\n    Prototype\n        () : int\n"), "{dump}");
}

#[test]
fn parse_errors_still_produce_a_unit() {
    let parsed = parse(
        "test.toy",
        "func broken( { }\nfunc ok() : int { return 1; }",
    );
    assert!(!parsed.errors.is_empty());
    assert_eq!(parsed.unit.funcs.len(), 1);

    let ir = lower(&parsed.unit).expect("the surviving function lowers");
    assert!(dump_ir(&ir).contains("define @ok()"));
}

#[test]
fn diagnostics_render_with_location() {
    let parsed = parse("demo.toy", "func f() { return 1 }");
    assert_eq!(parsed.errors.len(), 2);
    let rendered = parsed.errors[0].to_string();
    assert!(
        rendered.starts_with("demo.toy:1:"),
        "unexpected rendering: {rendered}"
    );
    assert!(rendered.contains("Expected [';']"), "{rendered}");
}

#[test]
fn semantic_errors_are_fatal_and_described() {
    assert_eq!(
        lower_error("func f() { g(); }").to_string(),
        "unknown function 'g'"
    );
    assert_eq!(
        lower_error("func f(a: int) : int { return a < 1; }").to_string(),
        "unknown binary operator '<'"
    );
}

#[test]
fn pipeline_is_deterministic() {
    let source = "extern print(x: int);\n\
                  func main() : int {\n\
                  \x20 var i: int = 10;\n\
                  \x20 while i { print(i * i); i = i - 1; }\n\
                  \x20 return 0;\n\
                  }";
    assert_eq!(compile_ir(source), compile_ir(source));
    assert_eq!(compile_asm(source), compile_asm(source));
}

/// Read a fixture program and run it through the whole pipeline.
fn compile_program(name: &str) -> (String, String) {
    let source = std::fs::read_to_string(format!("tests/programs/{name}"))
        .expect("failed to read test program");
    (compile_ir(&source), compile_asm(&source))
}

#[test]
fn countdown_program() {
    let (ir, asm) = compile_program("countdown.toy");

    assert!(ir.starts_with("extern @print(x);\ndefine @countdown(n) {"), "{ir}");
    assert!(ir.contains("    %0 = call @countdown($10)\n"), "{ir}");

    assert_eq!(asm.matches("\tbl _print\n").count(), 1, "{asm}");
    assert_eq!(asm.matches("\tbl _countdown\n").count(), 1, "{asm}");
    // One ret per defined procedure.
    assert_eq!(asm.matches("\tret\n").count(), 2, "{asm}");
}

#[test]
fn scopes_program() {
    let (ir, _) = compile_program("scopes.toy");
    // Three cells, and the final load reads the outermost one.
    assert_eq!(ir.matches("= alloca\n").count(), 3, "{ir}");
    assert!(ir.contains("    %5 = load %0\n    return %5\n"), "{ir}");
}

#[test]
fn calls_program() {
    let (ir, asm) = compile_program("calls.toy");

    // Forward reference from main to square resolves.
    assert!(ir.contains("%0 = call @square($7)"), "{ir}");
    assert!(ir.contains("%1 = call @print(%0)"), "{ir}");

    assert_eq!(asm.matches("\tbl _square\n").count(), 2, "{asm}");
    assert_eq!(asm.matches("\tbl _negate\n").count(), 1, "{asm}");
    assert_eq!(asm.matches("\tbl _print\n").count(), 1, "{asm}");
    for proc in ["_main:", "_square:", "_negate:"] {
        assert!(asm.contains(proc), "missing {proc} in:\n{asm}");
    }
}

#[test]
fn eight_parameters_are_accepted() {
    let source = "func f(a: int, b: int, c: int, d: int, e: int, g: int, h: int, i: int) : int {\n\
                  \x20 return a + i;\n\
                  }";
    let asm = compile_asm(source);
    assert!(asm.contains("\tstr x7, [sp, #56]\n"), "{asm}");
}
