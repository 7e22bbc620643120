use crate::language::gen::emit_program;
use crate::language::parser::parse;
use crate::language::printer::print_program;
use crate::language::sem::{analyse, SemanticError};

fn compile_source(source: &str) -> Result<String, Vec<SemanticError>> {
    let program = parse(source).expect("parse");
    let errors = analyse(&program);
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(emit_program(&program).expect("emit"))
}

#[test]
fn counter_program_compiles_end_to_end() {
    let asm = compile_source(
        "#include \"minic-stdlib.h\"\n\
         int inc(int x) { return x + 1; }\n\
         int main() {\n\
             int i;\n\
             i = 0;\n\
             while (i < 10) { i = inc(i); }\n\
             print_i(i);\n\
             return 0;\n\
         }",
    )
    .expect("clean program");

    assert!(asm.starts_with(".data"));
    assert!(asm.contains(".text"));
    assert!(asm.contains("jal func_inc_start"));
    assert!(asm.contains("li $v0, 1"));
    // every referenced label was defined, or emit_program would have panicked
    assert!(asm.contains("func_inc_epilogue:"));
}

#[test]
fn recursive_factorial_compiles() {
    let asm = compile_source(
        "int fact(int n) { if (n <= 1) { return 1; } return n * fact(n - 1); }\n\
         int main() { print_i(fact(5)); return 0; }",
    )
    .expect("clean program");
    assert!(asm.contains("jal func_fact_start"));
    assert!(asm.contains("sle"));
}

#[test]
fn struct_assignment_copies_field_by_field() {
    let asm = compile_source(
        "struct pair { int a; int b; };\n\
         int main() {\n\
             struct pair x;\n\
             struct pair y;\n\
             x.a = 1;\n\
             x.b = 2;\n\
             y = x;\n\
             return y.b;\n\
         }",
    )
    .expect("clean program");
    // one store per field rather than a single word store of the struct:
    // the source cursor walks the fields while the target offset advances
    assert!(asm.contains("lw $t8, 0($t7)"));
    assert!(asm.contains("sw $t8, 0($t9)"));
    assert!(asm.contains("sw $t8, 4($t9)"));
    assert!(asm.contains("add $t7, $t7, 4"));
}

#[test]
fn heap_and_pointer_round_trip_compiles() {
    let asm = compile_source(
        "int main() {\n\
             int* p;\n\
             p = (int*) mcmalloc(sizeof(int));\n\
             *p = 41;\n\
             return *p + 1;\n\
         }",
    )
    .expect("clean program");
    assert!(asm.contains("li $v0, 9"));
    assert!(asm.contains("li $t8, 4"));
}

#[test]
fn string_mismatch_is_refused_before_codegen() {
    let errors = compile_source("char* y; int main() { y = \"hi\"; return 0; }")
        .expect_err("should be rejected");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("cannot assign char[3] to char*"));
}

#[test]
fn printer_round_trips_through_the_parser() {
    let source = "int x; int main() { x = 1 + 2; return x; }";
    let program = parse(source).expect("parse");
    let printed = print_program(&program);
    assert!(printed.starts_with("Program("));
    assert!(printed.contains("FunDecl(INT,main"));
}
