use super::*;

/// Text-section pass: the entry trampoline, one body per function, and the
/// expression lowering helpers they share.
impl CodeGenerator {
    pub(super) fn emit_text(&mut self, program: &Program) {
        self.out.blank();
        self.out.section("text");

        // Entry point: run main, hand its result to the exit syscall.
        let main = program
            .functions
            .iter()
            .find(|decl| decl.name == "main")
            .expect("checked before emission");
        self.out.label("main");
        self.out.globl("main");
        {
            let _scope = self.out.scope();
            self.out.jal(main.label());
            self.out.mv(Reg::A0, Reg::V0);
            self.out.li(Reg::V0, 17);
            self.out.syscall();
        }

        for decl in &program.functions {
            self.emit_function(decl);
        }
    }

    fn emit_function(&mut self, decl: &FunDecl) {
        self.out.blank();
        self.out.label(decl.label());
        self.out.comment(decl.name.clone());
        let epilogue = self.func_labels.named(format!("{}_epilogue", decl.name));

        // Parameters already sit below the saved bank, placed there by the
        // caller; they only need frame offsets, no stack adjustment.
        self.frame_offset = 0;
        let mut params_size = 0;
        for param in &decl.params {
            let size = self.aligned_size(&param.ty);
            self.frame_offset -= size;
            params_size += size;
            param.set_storage(Storage::Frame(self.frame_offset));
        }

        let _scope = self.out.scope();
        self.out.comment("prologue");
        self.out.sub_imm(Reg::Sp, Reg::Sp, SAVED_BANK_SIZE);
        for (i, reg) in Reg::SAVED.iter().enumerate() {
            self.out.sw(*reg, Reg::Sp, (i * 4) as i32);
        }
        self.out.mv(Reg::Fp, Reg::Sp);
        if params_size > 0 {
            self.out.sub_imm(Reg::Sp, Reg::Sp, params_size);
        }
        self.out.la(Reg::Ra, &epilogue);

        self.emit_block(&decl.body);
        self.out.li(Reg::V0, 0);

        self.out.label(&epilogue);
        self.out.mv(Reg::Sp, Reg::Fp);
        for (i, reg) in Reg::SAVED.iter().enumerate() {
            self.out.lw(*reg, Reg::Sp, (i * 4) as i32);
        }
        self.out.add_imm(Reg::Sp, Reg::Sp, SAVED_BANK_SIZE);
        self.out.jr(Reg::Ra);
    }

    fn emit_block(&mut self, block: &Block) {
        let outer_offset = self.frame_offset;

        let mut total = 0;
        for var in &block.vars {
            let size = self.aligned_size(&var.ty);
            self.frame_offset -= size;
            total += size;
            var.set_storage(Storage::Frame(self.frame_offset));
        }
        if total == 0 {
            self.out.nop();
        } else {
            self.out.sub_imm(Reg::Sp, Reg::Sp, total);
        }

        for stmt in &block.stmts {
            self.emit_stmt(stmt);
        }

        if total == 0 {
            self.out.nop();
        } else {
            self.out.add_imm(Reg::Sp, Reg::Sp, total);
        }
        self.frame_offset = outer_offset;
    }

    fn emit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(block) => self.emit_block(block),
            Stmt::While { cond, body } => {
                let begin = self.while_labels.numbered_with("begin");
                let end = self.while_labels.numbered_with("end");
                self.out.label(&begin);
                {
                    let should_continue = self.operand(cond);
                    self.out.beqz(*should_continue, &end);
                    self.emit_stmt(body);
                    self.out.b(&begin);
                }
                self.out.label(&end);
                self.out.nop();
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let end = self.if_labels.numbered_with("end");
                let else_label = otherwise
                    .as_ref()
                    .map(|_| self.if_labels.numbered_with("else"));
                {
                    let should_enter = self.operand(cond);
                    self.out
                        .beqz(*should_enter, else_label.as_deref().unwrap_or(&end));
                }
                self.emit_stmt(then);
                self.out.b(&end);
                if let (Some(label), Some(otherwise)) = (&else_label, otherwise) {
                    self.out.label(label);
                    self.emit_stmt(otherwise);
                }
                self.out.label(&end);
                self.out.nop();
            }
            Stmt::Return { value, .. } => {
                match value {
                    Some(value) => match self.value_of(value) {
                        Some(reg) => self.out.mv(Reg::V0, *reg),
                        None => self.out.li(Reg::V0, 0),
                    },
                    None => self.out.li(Reg::V0, 0),
                }
                // $ra was pointed at the epilogue in the prologue.
                self.out.jr(Reg::Ra);
            }
            Stmt::Expr(expr) => {
                let _ = self.value_of(expr);
            }
            Stmt::Assign { lhs, rhs } => {
                let target = self.address_of(lhs);
                let value = self.operand(rhs);
                self.store_value(&value, rhs.ty(), *target, 0);
            }
        }
    }

    /// Lowers an expression whose value is required; void calls are a bug
    /// here because the type checker keeps them out of value positions.
    pub(super) fn operand(&mut self, expr: &Expr) -> TmpReg {
        self.value_of(expr)
            .expect("void expression used as an operand")
    }

    fn value_of(&mut self, expr: &Expr) -> Option<TmpReg> {
        match &expr.kind {
            ExprKind::IntLit(value) => {
                let reg = self.regs.take();
                self.out.li(*reg, *value);
                Some(reg)
            }
            ExprKind::ChrLit(value) => {
                let reg = self.regs.take();
                self.out.li(*reg, *value as i32);
                Some(reg)
            }
            ExprKind::StrLit { label, .. } => {
                let reg = self.regs.take();
                let label = label.get().expect("data pass has run").clone();
                self.out.la(*reg, &label);
                Some(reg)
            }
            ExprKind::Var { .. }
            | ExprKind::ArrayAccess { .. }
            | ExprKind::FieldAccess { .. }
            | ExprKind::ValueAt(_) => {
                let addr = self.address_of(expr);
                Some(self.load_value(*addr, expr.ty()))
            }
            ExprKind::Call { args, target, .. } => {
                let target = target.get().expect("name resolution has run").clone();
                if target.is_builtin {
                    self.emit_builtin_call(&target, args)
                } else {
                    Some(self.emit_call(&target, args))
                }
            }
            ExprKind::BinOp { op, lhs, rhs } => Some(self.emit_binop(*op, lhs, rhs)),
            ExprKind::SizeOf(ty) => {
                let reg = self.regs.take();
                let size = ty.size_of(&self.structs) as i32;
                self.out.li(*reg, size);
                Some(reg)
            }
            // Casts are purely a typing construct; the value is unchanged.
            ExprKind::Cast { expr, .. } => self.value_of(expr),
        }
    }

    fn address_of(&mut self, expr: &Expr) -> TmpReg {
        match &expr.kind {
            ExprKind::Var { decl, .. } => {
                let decl = decl.get().expect("name resolution has run").clone();
                let reg = self.regs.take();
                if decl.is_global() {
                    let label = decl.global_label().to_string();
                    self.out.la(*reg, &label);
                } else {
                    self.out.add_imm(*reg, Reg::Fp, decl.frame_offset());
                }
                reg
            }
            ExprKind::ArrayAccess { base, index } => {
                let pointer = self.operand(base);
                let elem_size = expr.ty().size_of(&self.structs) as i32;
                {
                    let index = self.operand(index);
                    self.out.mul_imm(*index, *index, elem_size);
                    self.out.add(*pointer, *pointer, *index);
                }
                pointer
            }
            ExprKind::FieldAccess { base, field } => {
                // A global struct variable addresses its field by label.
                if let ExprKind::Var { decl, .. } = &base.kind {
                    let decl = decl.get().expect("name resolution has run").clone();
                    if decl.is_global() {
                        let label = decl.field_label(field).to_string();
                        let reg = self.regs.take();
                        self.out.la(*reg, &label);
                        return reg;
                    }
                }

                let addr = self.operand(base);
                let Type::Struct(name) = base.ty() else {
                    panic!("field access on non-struct at {:?}", base.span)
                };
                let struct_decl = self
                    .structs
                    .get(name)
                    .unwrap_or_else(|| panic!("unresolved struct '{}'", name))
                    .clone();
                let mut offset = 0;
                for candidate in &struct_decl.fields {
                    if candidate.name == *field {
                        break;
                    }
                    offset += self.aligned_size(&candidate.ty);
                }
                if offset > 0 {
                    self.out.add_imm(*addr, *addr, offset);
                }
                addr
            }
            // A pointer's value is the address being dereferenced.
            ExprKind::ValueAt(inner) => self.operand(inner),
            _ => panic!("expression has no address at {:?}", expr.span),
        }
    }

    /// Reads a value of the given type from the address in `addr` into a
    /// fresh temporary. Aggregates are represented by their address.
    fn load_value(&mut self, addr: Reg, ty: &Type) -> TmpReg {
        let reg = self.regs.take();
        match ty {
            Type::Char => self.out.lb(*reg, addr, 0),
            Type::Int | Type::Pointer(_) => self.out.lw(*reg, addr, 0),
            Type::Array(..) | Type::Struct(_) => self.out.mv(*reg, addr),
            Type::Void => self.out.nop(),
        }
        reg
    }

    /// Writes `source` to `target + offset`. Struct values are copied field
    /// by field; `source` holds the struct's address and is restored to it
    /// afterwards.
    pub(super) fn store_value(&mut self, source: &TmpReg, ty: &Type, target: Reg, offset: i32) {
        match ty {
            Type::Char => self.out.sb(**source, target, offset),
            Type::Int | Type::Pointer(_) | Type::Array(..) => {
                self.out.sw(**source, target, offset)
            }
            Type::Struct(name) => {
                let struct_decl = self
                    .structs
                    .get(name)
                    .unwrap_or_else(|| panic!("unresolved struct '{}'", name))
                    .clone();
                let mut advanced = 0;
                let mut offset = offset;
                for field in &struct_decl.fields {
                    {
                        let inner = self.load_value(**source, &field.ty);
                        self.store_value(&inner, &field.ty, target, offset);
                    }
                    let size = self.aligned_size(&field.ty);
                    self.out.add_imm(**source, **source, size);
                    offset += size;
                    advanced += size;
                }
                self.out.sub_imm(**source, **source, advanced);
            }
            Type::Void => self.out.nop(),
        }
    }

    fn emit_binop(&mut self, op: Op, lhs: &Expr, rhs: &Expr) -> TmpReg {
        match op {
            Op::And => {
                let lhs = self.operand(lhs);
                let result = self.regs.take();
                let false_label = self.binop_labels.numbered_with("and_false");
                let true_label = self.binop_labels.numbered_with("and_true");
                let finish = self.binop_labels.numbered_with("and_finish");

                self.out.beqz(*lhs, &false_label);
                {
                    let rhs = self.operand(rhs);
                    self.out.bgtz(*rhs, &true_label);
                }
                self.out.label(&false_label);
                self.out.li(*result, 0);
                self.out.b(&finish);
                self.out.label(&true_label);
                self.out.li(*result, 1);
                self.out.label(&finish);
                self.out.nop();
                result
            }
            Op::Or => {
                let lhs = self.operand(lhs);
                let result = self.regs.take();
                let true_label = self.binop_labels.numbered_with("or_true");
                let false_label = self.binop_labels.numbered_with("or_false");
                let finish = self.binop_labels.numbered_with("or_finish");

                self.out.bnez(*lhs, &true_label);
                {
                    let rhs = self.operand(rhs);
                    self.out.beqz(*rhs, &false_label);
                }
                self.out.label(&true_label);
                self.out.li(*result, 1);
                self.out.b(&finish);
                self.out.label(&false_label);
                self.out.li(*result, 0);
                self.out.label(&finish);
                self.out.nop();
                result
            }
            Op::Mul => {
                let lhs = self.operand(lhs);
                let rhs = self.operand(rhs);
                let result = self.regs.take();
                self.out.mul(*result, *lhs, *rhs);
                result
            }
            Op::Div | Op::Mod => {
                let lhs = self.operand(lhs);
                let rhs = self.operand(rhs);
                let result = self.regs.take();
                self.out.div(*lhs, *rhs);
                if op == Op::Div {
                    self.out.mflo(*result);
                } else {
                    self.out.mfhi(*result);
                }
                result
            }
            Op::Add | Op::Sub | Op::Eq | Op::Ne | Op::Lt | Op::Gt | Op::Le | Op::Ge => {
                let mnemonic = match op {
                    Op::Add => "add",
                    Op::Sub => "sub",
                    Op::Eq => "seq",
                    Op::Ne => "sne",
                    Op::Lt => "slt",
                    Op::Gt => "sgt",
                    Op::Le => "sle",
                    Op::Ge => "sge",
                    _ => unreachable!(),
                };
                let lhs = self.operand(lhs);
                let rhs = self.operand(rhs);
                let result = self.regs.take();
                self.out.op3(mnemonic, *result, *lhs, *rhs);
                result
            }
        }
    }

    /// The ordinary call sequence: spill `$ra`, lay the arguments out below
    /// the callee's saved-bank slot, jump, then recover `$ra` and the
    /// result.
    fn emit_call(&mut self, target: &FunDecl, args: &[Expr]) -> TmpReg {
        let result = self.regs.take();

        self.out.sub_imm(Reg::Sp, Reg::Sp, 4);
        self.out.sw(Reg::Ra, Reg::Sp, 0);
        self.out.sub_imm(Reg::Sp, Reg::Sp, SAVED_BANK_SIZE);

        let mut args_size = 0;
        for arg in args {
            let size = self.aligned_size(arg.ty());
            args_size += size;
            self.out.sub_imm(Reg::Sp, Reg::Sp, size);
            let value = self.operand(arg);
            self.store_value(&value, arg.ty(), Reg::Sp, 0);
        }

        self.out.add_imm(Reg::Sp, Reg::Sp, SAVED_BANK_SIZE + args_size);
        self.out.jal(target.label());

        self.out.lw(Reg::Ra, Reg::Sp, 0);
        self.out.add_imm(Reg::Sp, Reg::Sp, 4);
        self.out.mv(*result, Reg::V0);
        result
    }
}
