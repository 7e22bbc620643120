use super::*;

/// The built-in runtime functions bypass the ordinary call sequence and
/// lower straight to syscalls.
impl CodeGenerator {
    pub(super) fn emit_builtin_call(
        &mut self,
        target: &FunDecl,
        args: &[Expr],
    ) -> Option<TmpReg> {
        match target.name.as_str() {
            "print_i" => {
                self.load_arg_into_a0(&args[0]);
                self.out.li(Reg::V0, 1);
                self.out.syscall();
                None
            }
            "print_c" => {
                self.load_arg_into_a0(&args[0]);
                self.out.li(Reg::V0, 11);
                self.out.syscall();
                None
            }
            "print_s" => {
                {
                    let value = self.operand(&args[0]);
                    self.out.mv(Reg::A0, *value);
                }
                self.out.li(Reg::V0, 4);
                self.out.syscall();
                None
            }
            "read_i" => {
                self.out.li(Reg::V0, 5);
                self.out.syscall();
                Some(self.copy_of_v0())
            }
            "read_c" => {
                self.out.li(Reg::V0, 12);
                self.out.syscall();
                Some(self.copy_of_v0())
            }
            "mcmalloc" => {
                {
                    let bytes = self.operand(&args[0]);
                    self.out.mv(Reg::A0, *bytes);
                }
                self.out.li(Reg::V0, 9);
                self.out.syscall();
                Some(self.copy_of_v0())
            }
            other => panic!("unknown builtin '{}'", other),
        }
    }

    /// Literal arguments load `$a0` directly; anything else goes through a
    /// temporary.
    fn load_arg_into_a0(&mut self, arg: &Expr) {
        match &arg.kind {
            ExprKind::IntLit(value) => self.out.li(Reg::A0, *value),
            ExprKind::ChrLit(value) => self.out.li(Reg::A0, *value as i32),
            _ => {
                let value = self.operand(arg);
                self.out.mv(Reg::A0, *value);
            }
        }
    }

    /// `$v0` is clobbered by the next syscall or call, so results move into
    /// a pool register immediately.
    fn copy_of_v0(&mut self) -> TmpReg {
        let reg = self.regs.take();
        self.out.mv(*reg, Reg::V0);
        reg
    }
}
