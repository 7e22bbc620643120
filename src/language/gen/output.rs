use super::regs::Reg;
use std::cell::Cell;
use std::collections::HashSet;
use std::fmt::Display;
use std::rc::Rc;

const INDENT_WIDTH: usize = 4;

/// Assembly text under construction. Tracks every label defined and every
/// label referenced so `finish` can refuse to hand back a program that
/// would not assemble.
pub struct Emitter {
    out: String,
    indent: Rc<Cell<usize>>,
    defined: HashSet<String>,
    referenced: HashSet<String>,
}

/// Deepens the indent for as long as it lives.
pub struct IndentGuard {
    indent: Rc<Cell<usize>>,
}

impl Drop for IndentGuard {
    fn drop(&mut self) {
        self.indent.set(self.indent.get() - 1);
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            indent: Rc::new(Cell::new(0)),
            defined: HashSet::new(),
            referenced: HashSet::new(),
        }
    }

    pub fn scope(&self) -> IndentGuard {
        self.indent.set(self.indent.get() + 1);
        IndentGuard {
            indent: Rc::clone(&self.indent),
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent.get() * INDENT_WIDTH {
            self.out.push(' ');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn reference(&mut self, label: &str) {
        self.referenced.insert(label.to_string());
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    pub fn comment(&mut self, text: impl Display) {
        self.line(&format!("# {}", text));
    }

    pub fn section(&mut self, name: &str) {
        self.line(&format!(".{}", name));
    }

    pub fn globl(&mut self, name: &str) {
        self.line(&format!(".globl {}", name));
    }

    /// Labels always sit at column zero.
    pub fn label(&mut self, name: &str) {
        if !self.defined.insert(name.to_string()) {
            panic!("label '{}' emitted twice", name);
        }
        self.out.push_str(name);
        self.out.push_str(":\n");
    }

    pub fn space(&mut self, bytes: usize) {
        self.line(&format!(".space {}", bytes));
    }

    pub fn asciiz(&mut self, text: &str) {
        self.line(&format!(".asciiz \"{}\"", escape(text)));
    }

    pub fn li(&mut self, dst: Reg, value: i32) {
        self.line(&format!("li {}, {}", dst, value));
    }

    pub fn la(&mut self, dst: Reg, label: &str) {
        self.reference(label);
        self.line(&format!("la {}, {}", dst, label));
    }

    pub fn lw(&mut self, dst: Reg, addr: Reg, offset: i32) {
        self.line(&format!("lw {}, {}({})", dst, offset, addr));
    }

    pub fn sw(&mut self, src: Reg, addr: Reg, offset: i32) {
        self.line(&format!("sw {}, {}({})", src, offset, addr));
    }

    pub fn lb(&mut self, dst: Reg, addr: Reg, offset: i32) {
        self.line(&format!("lb {}, {}({})", dst, offset, addr));
    }

    pub fn sb(&mut self, src: Reg, addr: Reg, offset: i32) {
        self.line(&format!("sb {}, {}({})", src, offset, addr));
    }

    pub fn mv(&mut self, dst: Reg, src: Reg) {
        self.line(&format!("move {}, {}", dst, src));
    }

    pub fn add(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.line(&format!("add {}, {}, {}", dst, lhs, rhs));
    }

    pub fn add_imm(&mut self, dst: Reg, src: Reg, value: i32) {
        self.line(&format!("add {}, {}, {}", dst, src, value));
    }

    pub fn sub_imm(&mut self, dst: Reg, src: Reg, value: i32) {
        self.line(&format!("sub {}, {}, {}", dst, src, value));
    }

    pub fn mul(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.line(&format!("mul {}, {}, {}", dst, lhs, rhs));
    }

    pub fn mul_imm(&mut self, dst: Reg, src: Reg, value: i32) {
        self.line(&format!("mul {}, {}, {}", dst, src, value));
    }

    pub fn div(&mut self, lhs: Reg, rhs: Reg) {
        self.line(&format!("div {}, {}", lhs, rhs));
    }

    pub fn mflo(&mut self, dst: Reg) {
        self.line(&format!("mflo {}", dst));
    }

    pub fn mfhi(&mut self, dst: Reg) {
        self.line(&format!("mfhi {}", dst));
    }

    /// Three-operand compare/arithmetic pseudo-instructions (`slt`, `seq`,
    /// `add`, ...) share one shape.
    pub fn op3(&mut self, mnemonic: &str, dst: Reg, lhs: Reg, rhs: Reg) {
        self.line(&format!("{} {}, {}, {}", mnemonic, dst, lhs, rhs));
    }

    pub fn beqz(&mut self, reg: Reg, label: &str) {
        self.reference(label);
        self.line(&format!("beqz {}, {}", reg, label));
    }

    pub fn bnez(&mut self, reg: Reg, label: &str) {
        self.reference(label);
        self.line(&format!("bnez {}, {}", reg, label));
    }

    pub fn bgtz(&mut self, reg: Reg, label: &str) {
        self.reference(label);
        self.line(&format!("bgtz {}, {}", reg, label));
    }

    pub fn b(&mut self, label: &str) {
        self.reference(label);
        self.line(&format!("b {}", label));
    }

    pub fn jal(&mut self, label: &str) {
        self.reference(label);
        self.line(&format!("jal {}", label));
    }

    pub fn jr(&mut self, reg: Reg) {
        self.line(&format!("jr {}", reg));
    }

    pub fn syscall(&mut self) {
        self.line("syscall");
    }

    pub fn nop(&mut self) {
        self.line("nop");
    }

    /// Returns the finished assembly, or panics if any referenced label was
    /// never defined.
    pub fn finish(self) -> String {
        let mut missing: Vec<&String> = self.referenced.difference(&self.defined).collect();
        missing.sort();
        if !missing.is_empty() {
            panic!("labels referenced but never defined: {:?}", missing);
        }
        self.out
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\u{8}' => escaped.push_str("\\b"),
            '\r' => escaped.push_str("\\r"),
            '\u{c}' => escaped.push_str("\\f"),
            '\0' => escaped.push_str("\\0"),
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_indented_instructions_under_flat_labels() {
        let mut out = Emitter::new();
        out.section("text");
        out.label("start");
        {
            let _scope = out.scope();
            out.li(Reg::V0, 10);
            out.syscall();
        }
        assert_eq!(out.finish(), ".text\nstart:\n    li $v0, 10\n    syscall\n");
    }

    #[test]
    fn escapes_string_data() {
        let mut out = Emitter::new();
        out.asciiz("a\n\"b\"");
        assert_eq!(out.finish(), ".asciiz \"a\\n\\\"b\\\"\"\n");
    }

    #[test]
    fn escapes_backspace_and_formfeed() {
        let mut out = Emitter::new();
        out.asciiz("a\u{8}\u{c}");
        assert_eq!(out.finish(), ".asciiz \"a\\b\\f\"\n");
    }

    #[test]
    fn branch_to_defined_label_passes_verification() {
        let mut out = Emitter::new();
        out.label("loop");
        out.b("loop");
        out.finish();
    }

    #[test]
    #[should_panic(expected = "never defined")]
    fn dangling_reference_fails_verification() {
        let mut out = Emitter::new();
        out.jal("nowhere");
        out.finish();
    }

    #[test]
    #[should_panic(expected = "emitted twice")]
    fn duplicate_label_definition_panics() {
        let mut out = Emitter::new();
        out.label("here");
        out.label("here");
    }
}
