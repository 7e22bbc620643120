use crate::language::ast::*;
use thiserror::Error;

mod builtins;
mod data;
mod label;
mod output;
mod regs;
mod text;

pub use label::{LabelRegistry, Labeller};
pub use output::Emitter;
pub use regs::{Reg, RegisterPool, TmpReg, SAVED_BANK_SIZE};

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("program has no 'main' function")]
    MissingMain,
}

/// Lowers an analysed program to MIPS assembly text. The program must have
/// passed name resolution and type checking with no errors; the generator
/// treats unresolved declarations or types as bugs and panics.
pub fn emit_program(program: &Program) -> Result<String, CodegenError> {
    if !program.functions.iter().any(|decl| decl.name == "main") {
        return Err(CodegenError::MissingMain);
    }
    Ok(CodeGenerator::new(program).emit(program))
}

struct CodeGenerator {
    out: Emitter,
    regs: RegisterPool,
    structs: StructTable,
    labels: LabelRegistry,
    str_labels: Labeller,
    global_labels: Labeller,
    func_labels: Labeller,
    binop_labels: Labeller,
    if_labels: Labeller,
    while_labels: Labeller,
    frame_offset: i32,
}

impl CodeGenerator {
    fn new(program: &Program) -> Self {
        let labels = LabelRegistry::default();
        Self {
            out: Emitter::new(),
            regs: RegisterPool::new(),
            structs: StructTable::of(program),
            str_labels: labels.labeller("str"),
            global_labels: labels.labeller("g"),
            func_labels: labels.labeller("func"),
            binop_labels: labels.labeller("binop"),
            if_labels: labels.labeller("if"),
            while_labels: labels.labeller("while"),
            labels,
            frame_offset: 0,
        }
    }

    fn emit(mut self, program: &Program) -> String {
        self.emit_data(program);

        // Every function gets its entry label before any body is lowered,
        // so forward calls and recursion resolve.
        for decl in &program.functions {
            decl.set_label(self.func_labels.named(format!("{}_start", decl.name)));
        }

        self.emit_text(program);
        self.out.finish()
    }

    fn aligned_size(&self, ty: &Type) -> i32 {
        align4(ty.size_of(&self.structs)) as i32
    }
}
