use crate::kind;
use log::trace;
use nga::{Device, DeviceInfo, FaultKind, Vm};
use std::io::Write;

/// Writes one character per invocation
///
/// ```text
/// c --
/// ```
///
/// The cell is treated as a Unicode scalar value and written as UTF-8;
/// invalid values are written as U+FFFD.  Output is flushed every time.
pub struct Output {
    out: Box<dyn Write>,
}

impl Output {
    /// Builds an output device writing to `out`
    pub fn new(out: Box<dyn Write>) -> Self {
        Self { out }
    }
}

impl Device for Output {
    fn query(&self) -> DeviceInfo {
        DeviceInfo {
            revision: 0,
            kind: kind::OUTPUT,
        }
    }

    fn invoke(&mut self, vm: &mut Vm) -> Result<(), FaultKind> {
        let c = vm.pop()?;
        let c = u32::try_from(c)
            .ok()
            .and_then(char::from_u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        trace!("output {c:?}");
        let mut buf = [0u8; 4];
        self.out
            .write_all(c.encode_utf8(&mut buf).as_bytes())
            .and_then(|_| self.out.flush())
            .map_err(|e| FaultKind::Device(format!("output failed: {e}")))
    }
}
