use crate::{Cell, FaultKind};
use alloc::{boxed::Box, vec};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Role {
    Data,
    Address,
}

/// Fixed-capacity stack of cells
///
/// Pushing onto a full stack or popping from an empty one returns the
/// matching [`FaultKind`], so the stack pointer never leaves `0..=capacity`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stack {
    data: Box<[Cell]>,

    /// Number of occupied slots, i.e. the index of the next free slot
    len: usize,

    role: Role,
}

impl Stack {
    /// Builds an empty data stack with room for `capacity` cells
    pub fn data(capacity: usize) -> Self {
        Self::new(capacity, Role::Data)
    }

    /// Builds an empty address (return) stack with room for `capacity` cells
    pub fn address(capacity: usize) -> Self {
        Self::new(capacity, Role::Address)
    }

    fn new(capacity: usize, role: Role) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            len: 0,
            role,
        }
    }

    fn underflow(&self) -> FaultKind {
        match self.role {
            Role::Data => FaultKind::DataUnderflow,
            Role::Address => FaultKind::AddressUnderflow,
        }
    }

    fn overflow(&self) -> FaultKind {
        match self.role {
            Role::Data => FaultKind::DataOverflow,
            Role::Address => FaultKind::AddressOverflow,
        }
    }

    /// Pushes a value, failing if the stack is full
    #[inline]
    pub fn push(&mut self, v: Cell) -> Result<(), FaultKind> {
        if self.len == self.data.len() {
            return Err(self.overflow());
        }
        self.data[self.len] = v;
        self.len += 1;
        Ok(())
    }

    /// Pops a value, failing if the stack is empty
    #[inline]
    pub fn pop(&mut self) -> Result<Cell, FaultKind> {
        if self.len == 0 {
            return Err(self.underflow());
        }
        self.len -= 1;
        Ok(core::mem::take(&mut self.data[self.len]))
    }

    /// Returns the top value without removing it
    #[inline]
    pub fn peek(&self) -> Option<Cell> {
        self.peek_at(0)
    }

    /// Returns the value `offset` slots below the top
    ///
    /// `peek_at(0)` is the top of stack, `peek_at(1)` the next-on-stack.
    #[inline]
    pub fn peek_at(&self, offset: usize) -> Option<Cell> {
        let i = self.len.checked_sub(offset + 1)?;
        Some(self.data[i])
    }

    /// Number of values currently on the stack
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Checks whether the stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of values the stack can hold
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Empties the stack, zeroing the vacated slots
    #[inline]
    pub fn clear(&mut self) {
        self.data[..self.len].fill(0);
        self.len = 0;
    }

    /// Occupied slots, bottom first
    #[inline]
    pub fn as_slice(&self) -> &[Cell] {
        &self.data[..self.len]
    }
}
