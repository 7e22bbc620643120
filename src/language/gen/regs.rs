use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// The MIPS registers the generator touches. Everything outside
/// `TEMPORARIES` is reserved and never enters the allocation pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reg {
    V0,
    A0,
    A1,
    A2,
    A3,
    T0,
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
    T7,
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    T8,
    T9,
    Gp,
    Sp,
    Fp,
    Ra,
}

impl Reg {
    /// Scratch registers handed out by the pool, in pool order.
    pub const TEMPORARIES: [Reg; 18] = [
        Reg::T0,
        Reg::T1,
        Reg::T2,
        Reg::T3,
        Reg::T4,
        Reg::T5,
        Reg::T6,
        Reg::T7,
        Reg::S0,
        Reg::S1,
        Reg::S2,
        Reg::S3,
        Reg::S4,
        Reg::S5,
        Reg::S6,
        Reg::S7,
        Reg::T8,
        Reg::T9,
    ];

    /// The register bank every function saves in its prologue and restores
    /// in its epilogue: all temporaries plus the reserved registers the
    /// caller relies on. `$sp` and `$v0` are deliberately absent.
    pub const SAVED: [Reg; 25] = [
        Reg::T0,
        Reg::T1,
        Reg::T2,
        Reg::T3,
        Reg::T4,
        Reg::T5,
        Reg::T6,
        Reg::T7,
        Reg::S0,
        Reg::S1,
        Reg::S2,
        Reg::S3,
        Reg::S4,
        Reg::S5,
        Reg::S6,
        Reg::S7,
        Reg::T8,
        Reg::T9,
        Reg::A0,
        Reg::A1,
        Reg::A2,
        Reg::A3,
        Reg::Gp,
        Reg::Fp,
        Reg::Ra,
    ];

    pub fn is_temporary(self) -> bool {
        Reg::TEMPORARIES.contains(&self)
    }

    fn name(self) -> &'static str {
        match self {
            Reg::V0 => "v0",
            Reg::A0 => "a0",
            Reg::A1 => "a1",
            Reg::A2 => "a2",
            Reg::A3 => "a3",
            Reg::T0 => "t0",
            Reg::T1 => "t1",
            Reg::T2 => "t2",
            Reg::T3 => "t3",
            Reg::T4 => "t4",
            Reg::T5 => "t5",
            Reg::T6 => "t6",
            Reg::T7 => "t7",
            Reg::S0 => "s0",
            Reg::S1 => "s1",
            Reg::S2 => "s2",
            Reg::S3 => "s3",
            Reg::S4 => "s4",
            Reg::S5 => "s5",
            Reg::S6 => "s6",
            Reg::S7 => "s7",
            Reg::T8 => "t8",
            Reg::T9 => "t9",
            Reg::Gp => "gp",
            Reg::Sp => "sp",
            Reg::Fp => "fp",
            Reg::Ra => "ra",
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.name())
    }
}

/// Bytes the prologue reserves for the saved register bank.
pub const SAVED_BANK_SIZE: i32 = (Reg::SAVED.len() * 4) as i32;

/// LIFO allocator over the temporary registers. Cloning the pool shares the
/// same free list, so guards can outlive the borrow that created them.
#[derive(Clone)]
pub struct RegisterPool {
    free: Rc<RefCell<Vec<Reg>>>,
}

impl Default for RegisterPool {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterPool {
    pub fn new() -> Self {
        Self {
            free: Rc::new(RefCell::new(Reg::TEMPORARIES.to_vec())),
        }
    }

    /// Hands out the most recently freed temporary. Expression lowering
    /// holds at most a handful of values at once; running dry means a leak
    /// somewhere in the generator, so the pool does not try to recover.
    pub fn take(&self) -> TmpReg {
        let reg = self
            .free
            .borrow_mut()
            .pop()
            .unwrap_or_else(|| panic!("no free registers left"));
        TmpReg {
            reg,
            free: Rc::clone(&self.free),
        }
    }

    pub fn available(&self) -> usize {
        self.free.borrow().len()
    }
}

/// A temporary register on loan from the pool; returns itself on drop.
pub struct TmpReg {
    reg: Reg,
    free: Rc<RefCell<Vec<Reg>>>,
}

impl Deref for TmpReg {
    type Target = Reg;

    fn deref(&self) -> &Reg {
        &self.reg
    }
}

impl Drop for TmpReg {
    fn drop(&mut self) {
        if !self.reg.is_temporary() {
            panic!("released reserved register {}", self.reg);
        }
        self.free.borrow_mut().push(self.reg);
    }
}

impl fmt::Display for TmpReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.reg.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hands_out_t9_first() {
        let pool = RegisterPool::new();
        let first = pool.take();
        assert_eq!(*first, Reg::T9);
        let second = pool.take();
        assert_eq!(*second, Reg::T8);
    }

    #[test]
    fn freed_registers_are_reused_lifo() {
        let pool = RegisterPool::new();
        {
            let a = pool.take();
            assert_eq!(*a, Reg::T9);
        }
        let b = pool.take();
        assert_eq!(*b, Reg::T9);
    }

    #[test]
    fn drop_restores_availability() {
        let pool = RegisterPool::new();
        assert_eq!(pool.available(), 18);
        {
            let _a = pool.take();
            let _b = pool.take();
            assert_eq!(pool.available(), 16);
        }
        assert_eq!(pool.available(), 18);
    }

    #[test]
    #[should_panic(expected = "no free registers left")]
    fn exhaustion_is_a_fault() {
        let pool = RegisterPool::new();
        let mut held = Vec::new();
        for _ in 0..19 {
            held.push(pool.take());
        }
    }

    #[test]
    #[should_panic(expected = "released reserved register")]
    fn releasing_a_reserved_register_is_a_fault() {
        let pool = RegisterPool::new();
        let _bad = TmpReg {
            reg: Reg::Sp,
            free: Rc::clone(&pool.free),
        };
    }

    #[test]
    fn saved_bank_is_a_hundred_bytes() {
        assert_eq!(SAVED_BANK_SIZE, 100);
        assert!(!Reg::SAVED.contains(&Reg::Sp));
        assert!(!Reg::SAVED.contains(&Reg::V0));
    }
}
