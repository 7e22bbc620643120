use super::*;
use std::collections::HashMap;

/// Data-section pass: reserves space for globals, labels every string
/// literal occurrence and records storage on the declarations the text
/// pass will look up.
impl CodeGenerator {
    pub(super) fn emit_data(&mut self, program: &Program) {
        self.out.section("data");
        let _scope = self.out.scope();
        for decl in &program.globals {
            self.emit_global(decl);
        }
        for decl in &program.functions {
            self.label_strings_in_block(&decl.body);
        }
    }

    fn emit_global(&mut self, decl: &VarDecl) {
        if let Type::Struct(name) = &decl.ty {
            let struct_decl = self
                .structs
                .get(name)
                .unwrap_or_else(|| panic!("unresolved struct '{}'", name))
                .clone();

            self.out.comment(format!(
                "{} [size {}]",
                decl,
                decl.ty.size_of(&self.structs)
            ));
            let label = self.global_labels.named(&decl.name);
            self.out.label(&label);

            // Each field gets its own label so field accesses on this
            // global can address it directly.
            let field_labeller = self.labels.labeller(&format!("s_{}", decl.name));
            let mut field_labels = HashMap::new();
            for field in &struct_decl.fields {
                let field_label = field_labeller.named(&field.name);
                self.out.label(&field_label);
                self.out.space(align4(field.ty.size_of(&self.structs)));
                field_labels.insert(field.name.clone(), field_label);
            }

            decl.set_storage(Storage::Global {
                label,
                field_labels,
            });
            return;
        }

        let label = self.global_labels.named(&decl.name);
        self.out.label(&label);
        self.out.space(align4(decl.ty.size_of(&self.structs)));
        decl.set_storage(Storage::Global {
            label,
            field_labels: HashMap::new(),
        });
    }

    fn label_strings_in_block(&mut self, block: &Block) {
        for stmt in &block.stmts {
            self.label_strings_in_stmt(stmt);
        }
    }

    fn label_strings_in_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(block) => self.label_strings_in_block(block),
            Stmt::While { cond, body } => {
                self.label_strings_in_expr(cond);
                self.label_strings_in_stmt(body);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                self.label_strings_in_expr(cond);
                self.label_strings_in_stmt(then);
                if let Some(otherwise) = otherwise {
                    self.label_strings_in_stmt(otherwise);
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.label_strings_in_expr(value);
                }
            }
            Stmt::Expr(expr) => self.label_strings_in_expr(expr),
            Stmt::Assign { lhs, rhs } => {
                self.label_strings_in_expr(lhs);
                self.label_strings_in_expr(rhs);
            }
        }
    }

    /// Every occurrence gets its own label; identical literals are not
    /// pooled.
    fn label_strings_in_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::StrLit { value, label } => {
                let name = self.str_labels.numbered();
                self.out.label(&name);
                self.out.asciiz(value);
                if label.set(name).is_err() {
                    panic!("string literal labelled twice");
                }
            }
            ExprKind::IntLit(_) | ExprKind::ChrLit(_) | ExprKind::Var { .. } => {}
            ExprKind::Call { args, .. } => {
                for arg in args {
                    self.label_strings_in_expr(arg);
                }
            }
            ExprKind::BinOp { lhs, rhs, .. } => {
                self.label_strings_in_expr(lhs);
                self.label_strings_in_expr(rhs);
            }
            ExprKind::ArrayAccess { base, index } => {
                self.label_strings_in_expr(base);
                self.label_strings_in_expr(index);
            }
            ExprKind::FieldAccess { base, .. } => self.label_strings_in_expr(base),
            ExprKind::ValueAt(inner) => self.label_strings_in_expr(inner),
            ExprKind::SizeOf(_) => {}
            ExprKind::Cast { expr, .. } => self.label_strings_in_expr(expr),
        }
    }
}
