//! Instruction set
//!
//! Each instruction is documented with its stack effect, written as
//! `before -- after` with the top of stack on the right.
use crate::{Arith, Cell, DeviceTable, FaultKind, UCell, Vm};

/// Number of defined opcodes
pub const COUNT: usize = 30;

/// Two-letter mnemonics, indexed by opcode
pub const NAMES: [&str; COUNT] = [
    "no", "li", "du", "dr", "sw", "pu", "po", "ju", "ca", "cc", "re", "eq",
    "ne", "lt", "gt", "fe", "st", "ad", "su", "mu", "di", "an", "or", "xo",
    "sh", "zr", "ha", "ie", "iq", "ii",
];

/// A single Nga instruction
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    /// No operation
    Nop = 0,
    /// Literal
    ///
    /// ```text
    /// li -- n
    /// ```
    ///
    /// Pushes the cell following the current bundle and skips over it.
    Lit,
    /// ```text
    /// du n -- n n
    /// ```
    Dup,
    /// ```text
    /// dr n --
    /// ```
    Drop,
    /// ```text
    /// sw a b -- b a
    /// ```
    Swap,
    /// Moves the top of the data stack to the address stack
    Push,
    /// Moves the top of the address stack to the data stack
    Pop,
    /// ```text
    /// ju a --
    /// ```
    Jump,
    /// ```text
    /// ca a --
    /// ```
    ///
    /// Pushes the current address onto the address stack, then jumps.
    Call,
    /// Conditional call
    ///
    /// ```text
    /// cc f a --
    /// ```
    ///
    /// Calls `a` if `f` is non-zero.
    CondCall,
    /// Returns to the address on top of the address stack
    Return,
    /// ```text
    /// eq a b -- f
    /// ```
    Eq,
    /// ```text
    /// ne a b -- f
    /// ```
    Neq,
    /// ```text
    /// lt a b -- f
    /// ```
    Lt,
    /// ```text
    /// gt a b -- f
    /// ```
    Gt,
    /// ```text
    /// fe a -- n
    /// ```
    ///
    /// Negative addresses `-1` through `-5` read the data depth, address
    /// depth, image size, and the minimum and maximum cell values.
    Fetch,
    /// ```text
    /// st n a --
    /// ```
    Store,
    /// ```text
    /// ad a b -- a+b
    /// ```
    Add,
    /// ```text
    /// su a b -- a-b
    /// ```
    Sub,
    /// ```text
    /// mu a b -- a*b
    /// ```
    Mul,
    /// ```text
    /// di a b -- a%b a/b
    /// ```
    DivMod,
    /// ```text
    /// an a b -- a&b
    /// ```
    And,
    /// ```text
    /// or a b -- a|b
    /// ```
    Or,
    /// ```text
    /// xo a b -- a^b
    /// ```
    Xor,
    /// Shift
    ///
    /// ```text
    /// sh a b -- c
    /// ```
    ///
    /// Negative `b` shifts left by `|b|`, otherwise shifts right.
    Shift,
    /// Zero-return
    ///
    /// ```text
    /// zr 0 --
    /// zr n -- n
    /// ```
    ///
    /// Drops the top of stack and returns if it is zero.
    ZeroRet,
    /// Halts the current core
    Halt,
    /// ```text
    /// ie -- n
    /// ```
    ///
    /// Pushes the number of attached devices.
    Enumerate,
    /// ```text
    /// iq d -- revision kind
    /// ```
    Query,
    /// ```text
    /// ii d --
    /// ```
    ///
    /// Hands control to device `d`, which pops its own arguments.
    Interact,
}

static_assertions::const_assert_eq!(Op::Interact as usize + 1, COUNT);

const OPS: [Op; COUNT] = [
    Op::Nop,
    Op::Lit,
    Op::Dup,
    Op::Drop,
    Op::Swap,
    Op::Push,
    Op::Pop,
    Op::Jump,
    Op::Call,
    Op::CondCall,
    Op::Return,
    Op::Eq,
    Op::Neq,
    Op::Lt,
    Op::Gt,
    Op::Fetch,
    Op::Store,
    Op::Add,
    Op::Sub,
    Op::Mul,
    Op::DivMod,
    Op::And,
    Op::Or,
    Op::Xor,
    Op::Shift,
    Op::ZeroRet,
    Op::Halt,
    Op::Enumerate,
    Op::Query,
    Op::Interact,
];

impl Op {
    /// Decodes a single lane, returning `None` for undefined opcodes
    #[inline]
    pub fn decode(b: u8) -> Option<Self> {
        OPS.get(usize::from(b)).copied()
    }

    /// Looks up an instruction by its two-letter mnemonic
    ///
    /// `..` is accepted as an alias for `no`.
    pub fn from_name(s: &str) -> Option<Self> {
        if s == ".." {
            return Some(Op::Nop);
        }
        NAMES.iter().position(|n| *n == s).map(|i| OPS[i])
    }

    /// Returns the two-letter mnemonic
    #[inline]
    pub fn name(self) -> &'static str {
        NAMES[self as usize]
    }

    /// Data stack cells consumed and produced
    ///
    /// These are checked before the instruction runs; the address stack is
    /// checked as it is used.
    pub fn arity(self) -> (usize, usize) {
        match self {
            Op::Nop | Op::Return | Op::Halt => (0, 0),
            Op::Lit | Op::Pop | Op::Enumerate => (0, 1),
            Op::Dup => (1, 2),
            Op::Drop | Op::Push | Op::Jump | Op::Call | Op::Interact => (1, 0),
            Op::Swap | Op::DivMod => (2, 2),
            Op::CondCall | Op::Store => (2, 0),
            Op::Fetch | Op::ZeroRet => (1, 1),
            Op::Query => (1, 2),
            Op::Eq
            | Op::Neq
            | Op::Lt
            | Op::Gt
            | Op::Add
            | Op::Sub
            | Op::Mul
            | Op::And
            | Op::Or
            | Op::Xor
            | Op::Shift => (2, 1),
        }
    }
}

impl core::fmt::Display for Op {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

fn flag(b: bool) -> Cell {
    if b { -1 } else { 0 }
}

impl Vm {
    /// Executes a single instruction on the active core
    pub(crate) fn op(
        &mut self,
        op: Op,
        devices: &mut DeviceTable,
    ) -> Result<(), FaultKind> {
        let (takes, makes) = op.arity();
        let data = &self.core().data;
        if data.len() < takes {
            return Err(FaultKind::DataUnderflow);
        } else if data.len() - takes + makes > data.capacity() {
            return Err(FaultKind::DataOverflow);
        }

        match op {
            Op::Nop => Ok(()),
            Op::Lit => self.lit(),
            Op::Dup => {
                let v = self.pop()?;
                self.push(v)?;
                self.push(v)
            }
            Op::Drop => self.pop().map(|_| ()),
            Op::Swap => {
                let a = self.pop()?;
                let b = self.pop()?;
                self.push(a)?;
                self.push(b)
            }
            Op::Push => {
                let v = self.pop()?;
                self.core_mut().address.push(v)
            }
            Op::Pop => {
                let v = self.core_mut().address.pop()?;
                self.push(v)
            }
            Op::Jump => {
                let a = self.pop()?;
                self.jump(a);
                Ok(())
            }
            Op::Call => {
                let a = self.pop()?;
                self.call(a)
            }
            Op::CondCall => {
                let a = self.pop()?;
                let f = self.pop()?;
                if f != 0 { self.call(a) } else { Ok(()) }
            }
            Op::Return => {
                let core = self.core_mut();
                core.ip = core.address.pop()?;
                Ok(())
            }
            Op::Eq => self.compare(|a, b| a == b, |a, b| a == b),
            Op::Neq => self.compare(|a, b| a != b, |a, b| a != b),
            Op::Lt => self.compare(|a, b| a < b, |a, b| a < b),
            Op::Gt => self.compare(|a, b| a > b, |a, b| a > b),
            Op::Fetch => self.fetch_op(),
            Op::Store => {
                let addr = self.pop()?;
                let v = self.pop()?;
                self.store(addr, v)
            }
            Op::Add => self.arith(Cell::wrapping_add, UCell::wrapping_add),
            Op::Sub => self.arith(Cell::wrapping_sub, UCell::wrapping_sub),
            Op::Mul => self.arith(Cell::wrapping_mul, UCell::wrapping_mul),
            Op::DivMod => self.divmod(),
            Op::And => self.bitwise(|a, b| a & b),
            Op::Or => self.bitwise(|a, b| a | b),
            Op::Xor => self.bitwise(|a, b| a ^ b),
            Op::Shift => self.shift(),
            Op::ZeroRet => {
                if self.core().data.peek() == Some(0) {
                    self.pop()?;
                    let core = self.core_mut();
                    core.ip = core.address.pop()?;
                }
                Ok(())
            }
            Op::Halt => {
                let size = self.image_size();
                let core = self.core_mut();
                core.ip = size;
                core.address.clear();
                Ok(())
            }
            Op::Enumerate => self.push(devices.len()),
            Op::Query => {
                let d = self.pop()?;
                let info = devices.query(d)?;
                self.push(info.revision)?;
                self.push(info.kind)
            }
            Op::Interact => {
                let d = self.pop()?;
                devices.invoke(d, self)
            }
        }
    }

    fn lit(&mut self) -> Result<(), FaultKind> {
        let ip = self.core().ip.wrapping_add(1);
        let v = self.fetch(ip)?;
        self.core_mut().ip = ip;
        self.push(v)
    }

    /// Control transfers land one cell early, since the loop always advances
    #[inline]
    fn jump(&mut self, target: Cell) {
        self.core_mut().ip = target.wrapping_sub(1);
    }

    fn call(&mut self, target: Cell) -> Result<(), FaultKind> {
        let core = self.core_mut();
        core.address.push(core.ip)?;
        self.jump(target);
        Ok(())
    }

    /// Pops `a b`, applies a comparison, and pushes the resulting flag
    fn compare(
        &mut self,
        signed: fn(Cell, Cell) -> bool,
        unsigned: fn(UCell, UCell) -> bool,
    ) -> Result<(), FaultKind> {
        let b = self.pop()?;
        let a = self.pop()?;
        let f = match self.core_mut().take_arith() {
            Arith::Signed => signed(a, b),
            Arith::Unsigned => unsigned(a as UCell, b as UCell),
        };
        self.push(flag(f))
    }

    fn arith(
        &mut self,
        signed: fn(Cell, Cell) -> Cell,
        unsigned: fn(UCell, UCell) -> UCell,
    ) -> Result<(), FaultKind> {
        let b = self.pop()?;
        let a = self.pop()?;
        let v = match self.core_mut().take_arith() {
            Arith::Signed => signed(a, b),
            Arith::Unsigned => unsigned(a as UCell, b as UCell) as Cell,
        };
        self.push(v)
    }

    /// Bitwise operations ignore (and leave armed) the unsigned latch
    fn bitwise(&mut self, f: fn(Cell, Cell) -> Cell) -> Result<(), FaultKind> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(f(a, b))
    }

    fn divmod(&mut self) -> Result<(), FaultKind> {
        if self.core().data.peek() == Some(0) {
            return Err(FaultKind::DivideByZero);
        }
        let b = self.pop()?;
        let a = self.pop()?;
        let (rem, quot) = match self.core_mut().take_arith() {
            Arith::Signed => (a.wrapping_rem(b), a.wrapping_div(b)),
            Arith::Unsigned => {
                let (a, b) = (a as UCell, b as UCell);
                ((a % b) as Cell, (a / b) as Cell)
            }
        };
        self.push(rem)?;
        self.push(quot)
    }

    fn shift(&mut self) -> Result<(), FaultKind> {
        let b = self.pop()?;
        let a = self.pop()?;
        let arith = self.core_mut().take_arith();
        let v = if b < 0 {
            u32::try_from(b.unsigned_abs())
                .ok()
                .and_then(|n| a.checked_shl(n))
                .unwrap_or(0)
        } else {
            let n = u32::try_from(b).ok();
            match arith {
                Arith::Signed => n
                    .and_then(|n| a.checked_shr(n))
                    .unwrap_or(if a < 0 { -1 } else { 0 }),
                Arith::Unsigned => n
                    .and_then(|n| (a as UCell).checked_shr(n))
                    .unwrap_or(0) as Cell,
            }
        };
        self.push(v)
    }

    fn fetch_op(&mut self) -> Result<(), FaultKind> {
        let addr = self.pop()?;
        let core = self.core();
        let v = match addr {
            -1 => core.data.len() as Cell,
            -2 => core.address.len() as Cell,
            -3 => self.image_size(),
            -4 => Cell::MIN,
            -5 => Cell::MAX,
            a => self.fetch(a)?,
        };
        self.push(v)
    }
}
