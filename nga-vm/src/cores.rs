use crate::{Cell, FaultKind, Stack};

/// Number of general-purpose registers on each core
pub const REGISTERS: usize = 24;

/// Scheduling state of a core
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CoreState {
    /// Never initialized; skipped by the scheduler
    #[default]
    Uninitialized,
    /// Runs one bundle per scheduler tick
    Active,
    /// Initialized but skipped by the scheduler
    Paused,
}

/// One-shot arithmetic mode
///
/// Setting [`Arith::Unsigned`] makes the next comparison, arithmetic, or
/// shift instruction treat its operands as unsigned; that instruction then
/// resets the mode to [`Arith::Signed`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Arith {
    /// Two's-complement semantics
    #[default]
    Signed,
    /// Unsigned semantics for exactly one instruction
    Unsigned,
}

/// Execution context: instruction pointer, stacks, and registers
#[derive(Clone, Debug)]
pub struct Core {
    pub(crate) ip: Cell,
    pub(crate) data: Stack,
    pub(crate) address: Stack,
    pub(crate) state: CoreState,
    pub(crate) arith: Arith,
    pub(crate) registers: [Cell; REGISTERS],
}

impl Core {
    pub(crate) fn new(data_depth: usize, address_depth: usize) -> Self {
        Self {
            ip: 0,
            data: Stack::data(data_depth),
            address: Stack::address(address_depth),
            state: CoreState::Uninitialized,
            arith: Arith::Signed,
            registers: [0; REGISTERS],
        }
    }

    /// Clears stacks, registers, and the instruction pointer
    ///
    /// The core's scheduling state is left unchanged.
    pub fn init(&mut self) {
        self.ip = 0;
        self.data.clear();
        self.address.clear();
        self.arith = Arith::Signed;
        self.registers = [0; REGISTERS];
    }

    /// Activates the core at `entry` with a single return sentinel
    ///
    /// Returning past the sentinel finishes the core.
    pub fn start(&mut self, entry: Cell) -> Result<(), FaultKind> {
        self.address.clear();
        self.address.push(0)?;
        self.ip = entry;
        self.state = CoreState::Active;
        Ok(())
    }

    /// Removes the core from scheduling
    pub fn pause(&mut self) {
        self.state = CoreState::Paused;
    }

    /// Returns the core to scheduling
    pub fn resume(&mut self) {
        self.state = CoreState::Active;
    }

    /// Current instruction pointer
    #[inline]
    pub fn ip(&self) -> Cell {
        self.ip
    }

    /// Sets the instruction pointer
    #[inline]
    pub fn set_ip(&mut self, ip: Cell) {
        self.ip = ip;
    }

    /// Data stack depth
    #[inline]
    pub fn sp(&self) -> usize {
        self.data.len()
    }

    /// Address stack depth
    #[inline]
    pub fn rp(&self) -> usize {
        self.address.len()
    }

    /// Shared borrow of the data stack
    #[inline]
    pub fn data(&self) -> &Stack {
        &self.data
    }

    /// Mutable borrow of the data stack
    #[inline]
    pub fn data_mut(&mut self) -> &mut Stack {
        &mut self.data
    }

    /// Shared borrow of the address stack
    #[inline]
    pub fn address(&self) -> &Stack {
        &self.address
    }

    /// Mutable borrow of the address stack
    #[inline]
    pub fn address_mut(&mut self) -> &mut Stack {
        &mut self.address
    }

    /// Scheduling state
    #[inline]
    pub fn state(&self) -> CoreState {
        self.state
    }

    /// Arms the one-shot unsigned latch
    #[inline]
    pub fn latch_unsigned(&mut self) {
        self.arith = Arith::Unsigned;
    }

    /// Current arithmetic mode, without consuming it
    #[inline]
    pub fn arith(&self) -> Arith {
        self.arith
    }

    /// Returns the arithmetic mode and resets it to signed
    #[inline]
    pub fn take_arith(&mut self) -> Arith {
        core::mem::take(&mut self.arith)
    }

    /// Reads a register
    pub fn register(&self, r: Cell) -> Result<Cell, FaultKind> {
        usize::try_from(r)
            .ok()
            .and_then(|i| self.registers.get(i))
            .copied()
            .ok_or(FaultKind::NoRegister(r))
    }

    /// Writes a register
    pub fn set_register(&mut self, r: Cell, v: Cell) -> Result<(), FaultKind> {
        let slot = usize::try_from(r)
            .ok()
            .and_then(|i| self.registers.get_mut(i))
            .ok_or(FaultKind::NoRegister(r))?;
        *slot = v;
        Ok(())
    }
}
