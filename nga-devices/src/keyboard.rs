use crate::kind;
use nga::{Cell, Device, DeviceInfo, FaultKind, Vm};
use std::io::{ErrorKind, Read};

/// Reads one UTF-8 character per invocation
///
/// ```text
/// -- c
/// ```
///
/// Pushes 0 at end of input or on a malformed sequence.  DEL (127) is
/// reported as backspace (8).
pub struct Keyboard {
    input: Box<dyn Read>,
}

impl Keyboard {
    /// Builds a keyboard device reading from `input`
    pub fn new(input: Box<dyn Read>) -> Self {
        Self { input }
    }

    fn byte(&mut self) -> Result<Option<u8>, FaultKind> {
        let mut b = [0u8];
        loop {
            match self.input.read(&mut b) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(b[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => (),
                Err(e) => {
                    let msg = format!("keyboard failed: {e}");
                    return Err(FaultKind::Device(msg));
                }
            }
        }
    }

    /// Reads a single character, returning 0 if none is available
    fn read_char(&mut self) -> Result<Cell, FaultKind> {
        let Some(first) = self.byte()? else {
            return Ok(0);
        };
        let len = match first {
            0x00..=0x7f => 1,
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => return Ok(0),
        };
        let mut buf = [first, 0, 0, 0];
        for b in &mut buf[1..len] {
            let Some(next) = self.byte()? else {
                return Ok(0);
            };
            *b = next;
        }
        Ok(std::str::from_utf8(&buf[..len])
            .ok()
            .and_then(|s| s.chars().next())
            .map(|c| c as Cell)
            .unwrap_or(0))
    }
}

impl Device for Keyboard {
    fn query(&self) -> DeviceInfo {
        DeviceInfo {
            revision: 0,
            kind: kind::KEYBOARD,
        }
    }

    fn invoke(&mut self, vm: &mut Vm) -> Result<(), FaultKind> {
        let c = match self.read_char()? {
            127 => 8,
            c => c,
        };
        vm.push(c)
    }
}
