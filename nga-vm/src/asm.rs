//! Minimal assembler for building images by hand
//!
//! ```
//! use nga_vm::asm::Assembler;
//!
//! let mut a = Assembler::new();
//! a.inst("liliad..").unwrap().data(2).data(3);
//! a.inst("re......").unwrap();
//! let image = a.finish().unwrap();
//! assert_eq!(image.len(), 4);
//! ```
use crate::{Cell, bundle, dict, op::Op};
use alloc::{
    collections::BTreeMap,
    string::{String, ToString},
    vec::Vec,
};

/// Error type for the assembler
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AsmError {
    /// A mnemonic was not one of the two-letter instruction names
    #[error("unknown instruction `{0}`")]
    UnknownInstruction(String),
    /// More than four instructions in one bundle, or a dangling character
    #[error("`{0}` does not fit in a single bundle")]
    BadBundle(String),
    /// The same label was defined twice
    #[error("label `{0}` is already defined")]
    DuplicateLabel(String),
    /// A reference to a label that was never defined
    #[error("label `{0}` is not defined")]
    UndefinedLabel(String),
    /// `org` or `set` moved before already-emitted code
    #[error("address {0} is already in use")]
    Overlap(Cell),
}

/// Builds a memory image one cell at a time
///
/// Label references may appear before their definition; they are resolved
/// in [`Assembler::finish`].  If any dictionary headers were emitted, the
/// finished image has its dictionary head and heap pointer cells filled in.
#[derive(Default)]
pub struct Assembler {
    cells: Vec<Cell>,
    labels: BTreeMap<String, Cell>,
    fixups: Vec<(usize, String)>,
    latest: Option<Cell>,
}

impl Assembler {
    /// Builds an empty assembler, starting at address 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the next emitted cell
    pub fn here(&self) -> Cell {
        self.cells.len() as Cell
    }

    /// Emits a bundle from up to four concatenated mnemonics
    ///
    /// `..` (or `no`) is a no-op; missing lanes are padded with no-ops.
    pub fn inst(&mut self, s: &str) -> Result<&mut Self, AsmError> {
        if s.len() % 2 != 0 || s.len() > 2 * bundle::LANES {
            return Err(AsmError::BadBundle(s.to_string()));
        }
        let mut ops = [Op::Nop; bundle::LANES];
        for (i, op) in ops.iter_mut().enumerate().take(s.len() / 2) {
            let name = s
                .get(i * 2..i * 2 + 2)
                .ok_or_else(|| AsmError::BadBundle(s.to_string()))?;
            *op = Op::from_name(name)
                .ok_or_else(|| AsmError::UnknownInstruction(name.to_string()))?;
        }
        Ok(self.data(bundle::pack(ops)))
    }

    /// Emits a raw cell
    pub fn data(&mut self, v: Cell) -> &mut Self {
        self.cells.push(v);
        self
    }

    /// Emits the address of a label, which may be defined later
    pub fn reference(&mut self, label: &str) -> &mut Self {
        self.fixups.push((self.cells.len(), label.to_string()));
        self.data(0)
    }

    /// Emits a NUL-terminated string, one character per cell
    pub fn string(&mut self, s: &str) -> &mut Self {
        for c in s.chars() {
            self.data(c as Cell);
        }
        self.data(0)
    }

    /// Binds `name` to the current address
    pub fn label(&mut self, name: &str) -> Result<&mut Self, AsmError> {
        if self.labels.contains_key(name) {
            return Err(AsmError::DuplicateLabel(name.to_string()));
        }
        self.labels.insert(name.to_string(), self.here());
        Ok(self)
    }

    /// Pads with zeros up to `addr`
    ///
    /// Moving backwards is a no-op; see [`Assembler::set`] for patching.
    pub fn org(&mut self, addr: Cell) -> &mut Self {
        while self.here() < addr {
            self.data(0);
        }
        self
    }

    /// Overwrites an already-emitted cell
    pub fn set(&mut self, addr: Cell, v: Cell) -> Result<&mut Self, AsmError> {
        let slot = usize::try_from(addr)
            .ok()
            .and_then(|i| self.cells.get_mut(i))
            .ok_or(AsmError::Overlap(addr))?;
        *slot = v;
        Ok(self)
    }

    /// Emits a dictionary header with a literal execution token
    ///
    /// Returns the address of the header.
    pub fn header(&mut self, name: &str, xt: Cell, class: Cell) -> Cell {
        let addr = self.here();
        self.data(self.latest.unwrap_or(0)).data(xt).data(class).string(name);
        self.latest = Some(addr);
        addr
    }

    /// Emits a dictionary header whose execution token is a label
    pub fn header_ref(&mut self, name: &str, xt: &str, class: Cell) -> Cell {
        let addr = self.here();
        self.data(self.latest.unwrap_or(0))
            .reference(xt)
            .data(class)
            .string(name);
        self.latest = Some(addr);
        addr
    }

    /// Looks up a label that has already been defined
    pub fn address_of(&self, label: &str) -> Option<Cell> {
        self.labels.get(label).copied()
    }

    /// Resolves references and returns the finished image
    pub fn finish(&self) -> Result<Vec<Cell>, AsmError> {
        let mut out = self.cells.clone();
        for (i, name) in &self.fixups {
            out[*i] = self
                .address_of(name)
                .ok_or_else(|| AsmError::UndefinedLabel(name.clone()))?;
        }
        if let Some(latest) = self.latest {
            let heap = out.len() as Cell;
            for (addr, v) in [(dict::DICTIONARY, latest), (dict::HEAP, heap)] {
                let slot = out
                    .get_mut(addr as usize)
                    .ok_or(AsmError::Overlap(addr))?;
                *slot = v;
            }
        }
        Ok(out)
    }
}
