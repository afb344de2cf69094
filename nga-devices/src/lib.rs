//! Standard Nga peripherals
//!
//! Each device pops a sub-operation code (where it has more than one) and
//! then its own arguments from the active core's data stack.  Use
//! [`standard`] to build the device table in the order that RETRO images
//! expect.
#![warn(missing_docs)]
use log::warn;
use nga::{Cell, DeviceTable, FaultKind};
use std::{
    cell::RefCell,
    io::{Read, Write},
    rc::Rc,
};

mod clock;
mod files;
mod image;
mod keyboard;
mod multicore;
mod output;
pub mod scripting;
mod unsigned;

pub use clock::Clock;
pub use files::Files;
pub use image::ImageSaver;
pub use keyboard::Keyboard;
pub use multicore::Multicore;
pub use output::Output;
pub use scripting::{Scripting, ScriptState};
pub use unsigned::Unsigned;

/// Device type tags reported by `iq`
pub mod kind {
    use nga::Cell;

    /// Character output
    pub const OUTPUT: Cell = 0;
    /// Character input
    pub const KEYBOARD: Cell = 1;
    /// File access
    pub const FILES: Cell = 4;
    /// Wall-clock time
    pub const CLOCK: Cell = 5;
    /// Access to the hosting shell
    pub const SCRIPTING: Cell = 9;
    /// Image saving
    pub const IMAGE: Cell = 1000;
    /// Core bank control
    pub const MULTICORE: Cell = 8000;
    /// Unsigned arithmetic helpers
    pub const UNSIGNED: Cell = 8101;
}

/// Builds the error for an unknown sub-operation
pub(crate) fn unknown_op(device: &str, op: Cell) -> FaultKind {
    warn!("unknown {device} operation {op}");
    FaultKind::Device(format!("unknown {device} operation {op}"))
}

/// Byte streams used by the character devices
pub struct Streams {
    /// Destination for the output device
    pub output: Box<dyn Write>,
    /// Source for the keyboard device
    pub input: Box<dyn Read>,
}

impl Streams {
    /// Uses the process's standard output and input
    pub fn stdio() -> Self {
        Self {
            output: Box::new(std::io::stdout()),
            input: Box::new(std::io::stdin()),
        }
    }
}

/// Builds the standard device table
///
/// Registration order is part of the image interface:
///
/// | Index | Device      |
/// |-------|-------------|
/// | 0     | output      |
/// | 1     | keyboard    |
/// | 2     | files       |
/// | 3     | image       |
/// | 4     | clock       |
/// | 5     | scripting   |
/// | 6     | multicore   |
/// | 7     | unsigned    |
pub fn standard(
    streams: Streams,
    script: Rc<RefCell<ScriptState>>,
) -> DeviceTable {
    let mut t = DeviceTable::new();
    t.register(Output::new(streams.output));
    t.register(Keyboard::new(streams.input));
    t.register(Files::new());
    t.register(ImageSaver);
    t.register(Clock);
    t.register(Scripting::new(script));
    t.register(Multicore);
    t.register(Unsigned);
    t
}

/// In-memory output sink whose contents can be read back
///
/// Clones share the same buffer, so one clone can be handed to a device
/// while another is kept to inspect what was written.
#[derive(Clone, Default)]
pub struct Capture(Rc<RefCell<Vec<u8>>>);

impl Capture {
    /// Builds an empty capture buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything written so far
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.borrow_mut())
    }

    /// Removes everything written so far, decoded as (lossy) UTF-8
    pub fn take_string(&self) -> String {
        String::from_utf8_lossy(&self.take()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
