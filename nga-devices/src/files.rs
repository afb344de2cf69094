use crate::{kind, unknown_op};
use log::{trace, warn};
use nga::{Cell, Device, DeviceInfo, FaultKind, Vm};
use std::{
    fs::OpenOptions,
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
};

/// Number of usable handle slots; slot 0 is reserved to mean "failed"
pub const MAX_OPEN_FILES: usize = 32;

/// File access, one byte at a time
///
/// | Op | Stack effect        | Description                          |
/// |----|---------------------|--------------------------------------|
/// | 0  | `name mode -- h`    | open (`h` is 0 on failure)           |
/// | 1  | `h --`              | close                                |
/// | 2  | `h -- c`            | read a byte (0 at end of file)       |
/// | 3  | `c h --`            | write a byte                         |
/// | 4  | `h -- n`            | current position                     |
/// | 5  | `n h --`            | seek to an absolute position         |
/// | 6  | `h -- n`            | size in bytes (0 for directories)    |
/// | 7  | `name --`           | delete                               |
/// | 8  | `h --`              | flush                                |
///
/// Modes are 0 (read), 1 (write, truncating), 2 (append), and 3 (read and
/// write an existing file).
pub struct Files {
    handles: [Option<std::fs::File>; MAX_OPEN_FILES + 1],
}

impl Default for Files {
    fn default() -> Self {
        Self::new()
    }
}

fn io_error(what: &str, e: std::io::Error) -> FaultKind {
    FaultKind::Device(format!("{what} failed: {e}"))
}

impl Files {
    /// Builds a file device with no open handles
    pub fn new() -> Self {
        Self {
            handles: std::array::from_fn(|_| None),
        }
    }

    fn handle(&mut self, h: Cell) -> Result<&mut std::fs::File, FaultKind> {
        usize::try_from(h)
            .ok()
            .filter(|i| *i != 0)
            .and_then(|i| self.handles.get_mut(i))
            .and_then(|f| f.as_mut())
            .ok_or_else(|| {
                FaultKind::Device(format!("invalid file handle {h}"))
            })
    }

    fn open(&mut self, vm: &mut Vm) -> Result<(), FaultKind> {
        let mode = vm.pop()?;
        let addr = vm.pop()?;
        let name = vm.extract_string(addr);
        let mut opts = OpenOptions::new();
        match mode {
            0 => opts.read(true),
            1 => opts.write(true).create(true).truncate(true),
            2 => opts.append(true).create(true),
            3 => opts.read(true).write(true),
            m => {
                return Err(FaultKind::Device(format!("invalid file mode {m}")));
            }
        };
        let free = (1..=MAX_OPEN_FILES).find(|i| self.handles[*i].is_none());
        let Some(slot) = free else {
            warn!("no free file handles to open {name:?}");
            return vm.push(0);
        };
        match opts.open(&name) {
            Ok(f) => {
                trace!("opened {name:?} as handle {slot}");
                self.handles[slot] = Some(f);
                vm.push(slot as Cell)
            }
            Err(e) => {
                trace!("could not open {name:?}: {e}");
                vm.push(0)
            }
        }
    }

    fn read(&mut self, vm: &mut Vm) -> Result<(), FaultKind> {
        let h = vm.pop()?;
        let f = self.handle(h)?;
        let mut b = [0u8];
        let c = loop {
            match f.read(&mut b) {
                Ok(0) => break 0,
                Ok(_) => break Cell::from(b[0]),
                Err(e) if e.kind() == ErrorKind::Interrupted => (),
                Err(e) => return Err(io_error("file read", e)),
            }
        };
        vm.push(c)
    }

    fn write(&mut self, vm: &mut Vm) -> Result<(), FaultKind> {
        let h = vm.pop()?;
        let c = vm.pop()?;
        self.handle(h)?
            .write_all(&[c as u8])
            .map_err(|e| io_error("file write", e))
    }

    fn size(&mut self, vm: &mut Vm) -> Result<(), FaultKind> {
        let h = vm.pop()?;
        let meta = self
            .handle(h)?
            .metadata()
            .map_err(|e| io_error("file size", e))?;
        let size = if meta.is_dir() { 0 } else { meta.len() };
        vm.push(size as Cell)
    }
}

impl Device for Files {
    fn query(&self) -> DeviceInfo {
        DeviceInfo {
            revision: 0,
            kind: kind::FILES,
        }
    }

    fn invoke(&mut self, vm: &mut Vm) -> Result<(), FaultKind> {
        match vm.pop()? {
            0 => self.open(vm),
            1 => {
                let h = vm.pop()?;
                self.handle(h)?;
                self.handles[h as usize] = None;
                Ok(())
            }
            2 => self.read(vm),
            3 => self.write(vm),
            4 => {
                let h = vm.pop()?;
                let pos = self
                    .handle(h)?
                    .stream_position()
                    .map_err(|e| io_error("file tell", e))?;
                vm.push(pos as Cell)
            }
            5 => {
                let h = vm.pop()?;
                let pos = vm.pop()?;
                let pos = u64::try_from(pos).map_err(|_| {
                    FaultKind::Device(format!("invalid file position {pos}"))
                })?;
                self.handle(h)?
                    .seek(SeekFrom::Start(pos))
                    .map_err(|e| io_error("file seek", e))?;
                Ok(())
            }
            6 => self.size(vm),
            7 => {
                let addr = vm.pop()?;
                let name = vm.extract_string(addr);
                if let Err(e) = std::fs::remove_file(&name) {
                    warn!("could not delete {name:?}: {e}");
                }
                Ok(())
            }
            8 => {
                let h = vm.pop()?;
                self.handle(h)?
                    .flush()
                    .map_err(|e| io_error("file flush", e))
            }
            op => Err(unknown_op("file", op)),
        }
    }
}
