//! Dictionary and string access for images that follow the RETRO layout
//!
//! A dictionary is a linked list of headers in memory, newest first.  Each
//! header holds a link to the previous header, the execution token (xt), the
//! word class handler, and a NUL-terminated name with one character per
//! cell.
use crate::{Cell, FaultKind, Vm};
use alloc::string::String;

/// Offset of the link to the previous header
pub const D_LINK: Cell = 0;
/// Offset of the execution token
pub const D_XT: Cell = 1;
/// Offset of the class handler
pub const D_CLASS: Cell = 2;
/// Offset of the first name character
pub const D_NAME: Cell = 3;

/// Cell holding the most recent dictionary header
pub const DICTIONARY: Cell = 2;
/// Cell holding the heap pointer (first free cell)
pub const HEAP: Cell = 3;
/// Cell holding the image version
pub const VERSION: Cell = 4;
/// Cell holding the `interpret` entry point, for images without a header
pub const INTERPRET: Cell = 5;
/// Cell holding the not-found handler, for images without a header
pub const NOT_FOUND: Cell = 6;
/// Cell holding the address of the text input buffer
pub const TIB: Cell = 7;
/// Cell holding a word to run once the image is loaded, or 0
pub const STARTUP: Cell = 10;

/// Longest string read back from memory, in characters
pub const MAX_STRING: usize = 8192;

/// A single dictionary header
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Address of the header itself
    pub addr: Cell,
    /// Address of the previous header, or 0
    pub link: Cell,
    /// Execution token
    pub xt: Cell,
    /// Class handler
    pub class: Cell,
}

impl Entry {
    /// Address of the first character of the name
    pub fn name(&self) -> Cell {
        self.addr.wrapping_add(D_NAME)
    }
}

/// Iterator over dictionary headers, newest first
pub struct Entries<'a> {
    vm: &'a Vm,
    next: Cell,
    /// Remaining steps before giving up, in case the links form a cycle
    fuel: usize,
}

impl Iterator for Entries<'_> {
    type Item = Entry;
    fn next(&mut self) -> Option<Entry> {
        if self.next == 0 || self.fuel == 0 {
            return None;
        }
        self.fuel -= 1;
        let addr = self.next;
        let field = |offset| self.vm.fetch(addr.wrapping_add(offset)).ok();
        let (Some(link), Some(xt), Some(class)) =
            (field(D_LINK), field(D_XT), field(D_CLASS))
        else {
            self.next = 0;
            return None;
        };
        self.next = link;
        Some(Entry {
            addr,
            link,
            xt,
            class,
        })
    }
}

impl Vm {
    /// Current dictionary head, read from [`DICTIONARY`]
    pub fn dictionary(&self) -> Cell {
        self.fetch(DICTIONARY).unwrap_or(0)
    }

    /// Iterates over headers starting at `root`
    pub fn entries(&self, root: Cell) -> Entries<'_> {
        Entries {
            vm: self,
            next: root,
            fuel: self.memory().len(),
        }
    }

    /// Finds the newest header named `name`, walking from `root`
    ///
    /// Because the walk starts at the newest header, later definitions
    /// shadow earlier ones.
    pub fn lookup(&self, root: Cell, name: &str) -> Option<Entry> {
        self.entries(root).find(|e| self.string_eq(e.name(), name))
    }

    /// Returns the execution token of `name`
    pub fn xt_for(&self, root: Cell, name: &str) -> Option<Cell> {
        self.lookup(root, name).map(|e| e.xt)
    }

    /// Compares a string in memory against `s`, without allocating
    pub fn string_eq(&self, addr: Cell, s: &str) -> bool {
        let mut a = addr;
        for c in s.chars() {
            if self.fetch(a) != Ok(c as Cell) {
                return false;
            }
            a = a.wrapping_add(1);
        }
        self.fetch(a) == Ok(0)
    }

    /// Reads a NUL-terminated string starting at `addr`
    ///
    /// Reading stops at the terminator, at the end of memory, or after
    /// [`MAX_STRING`] characters.  Cells which are not valid characters are
    /// replaced with U+FFFD.
    pub fn extract_string(&self, addr: Cell) -> String {
        let mut out = String::new();
        let mut a = addr;
        for _ in 0..MAX_STRING {
            match self.fetch(a) {
                Ok(0) | Err(_) => break,
                Ok(c) => out.push(
                    u32::try_from(c)
                        .ok()
                        .and_then(char::from_u32)
                        .unwrap_or(char::REPLACEMENT_CHARACTER),
                ),
            }
            a = a.wrapping_add(1);
        }
        out
    }

    /// Writes `s` as a NUL-terminated string at `addr`
    ///
    /// Returns the address just past the terminator.
    pub fn inject_string(
        &mut self,
        s: &str,
        addr: Cell,
    ) -> Result<Cell, FaultKind> {
        let mut a = addr;
        for c in s.chars() {
            self.store(a, c as Cell)?;
            a = a.wrapping_add(1);
        }
        self.store(a, 0)?;
        Ok(a.wrapping_add(1))
    }
}
