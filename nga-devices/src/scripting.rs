//! Access to the hosting shell
//!
//! The shell and the device share a [`ScriptState`]: the shell keeps the
//! source position up to date, and the device records requests (includes,
//! skipping input, aborting) that the shell carries out once the requesting
//! bundle has finished.
use crate::{kind, unknown_op};
use log::trace;
use nga::{Cell, Device, DeviceInfo, FaultKind, Vm};
use std::{cell::RefCell, rc::Rc};

/// Source name reported when no file is being included
pub const STDIN: &str = "/dev/stdin";

/// State shared between the shell and the scripting device
#[derive(Debug, Default)]
pub struct ScriptState {
    /// Name of the script file, if running one
    pub name: String,

    /// Arguments passed to the script
    pub args: Vec<String>,

    /// Files being included, innermost last
    pub sources: Vec<String>,

    /// Line number within the innermost source (1-based)
    pub line: Cell,

    /// Text of the current line
    pub line_text: String,

    /// Skip the remainder of the current line
    pub ignore_to_eol: bool,

    /// Stop reading the current source
    pub ignore_to_eof: bool,

    /// Abandon all nested sources and clear the stacks
    pub abort: bool,

    /// Files to include after the current token, in request order
    pub includes: Vec<String>,
}

impl ScriptState {
    /// Builds a new state for the given script name and arguments
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
            ..Self::default()
        }
    }

    /// Wraps the state for sharing with [`Scripting`]
    pub fn shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    /// Name of the innermost source
    pub fn source(&self) -> &str {
        self.sources.last().map(String::as_str).unwrap_or(STDIN)
    }

    /// Checks whether the shell has requests to act on before continuing
    pub fn pending(&self) -> bool {
        self.abort || !self.includes.is_empty()
    }

    /// Requests an abort, which also skips the rest of the line and file
    pub fn request_abort(&mut self) {
        self.ignore_to_eol = true;
        self.ignore_to_eof = true;
        self.abort = true;
    }
}

/// Scripting device
///
/// | Op | Stack effect      | Description                             |
/// |----|-------------------|-----------------------------------------|
/// | 0  | `-- n`            | number of script arguments              |
/// | 1  | `buf i -- buf`    | copy argument `i` into `buf`            |
/// | 2  | `s --`            | include the named file                  |
/// | 3  | `buf -- buf`      | copy the script name into `buf`         |
/// | 4  | `buf -- buf`      | copy the current source name into `buf` |
/// | 5  | `-- n`            | current line number                     |
/// | 6  | `--`              | ignore the rest of the line             |
/// | 7  | `--`              | ignore the rest of the file             |
/// | 8  | `--`              | abort                                   |
/// | 9  | `buf --`          | copy the current line into `buf`        |
pub struct Scripting {
    state: Rc<RefCell<ScriptState>>,
}

impl Scripting {
    /// Builds a scripting device around shared state
    pub fn new(state: Rc<RefCell<ScriptState>>) -> Self {
        Self { state }
    }

    /// Copies `s` into the buffer on top of the stack, leaving the buffer
    fn copy_to_buffer(vm: &mut Vm, s: &str) -> Result<(), FaultKind> {
        let buf = vm.pop()?;
        vm.inject_string(s, buf)?;
        vm.push(buf)
    }
}

impl Device for Scripting {
    fn query(&self) -> DeviceInfo {
        DeviceInfo {
            revision: 2,
            kind: kind::SCRIPTING,
        }
    }

    fn invoke(&mut self, vm: &mut Vm) -> Result<(), FaultKind> {
        let mut state = self.state.borrow_mut();
        match vm.pop()? {
            0 => vm.push(state.args.len() as Cell)?,
            1 => {
                let i = vm.pop()?;
                let arg = usize::try_from(i)
                    .ok()
                    .and_then(|i| state.args.get(i))
                    .ok_or_else(|| {
                        FaultKind::Device(format!("no script argument {i}"))
                    })?;
                Self::copy_to_buffer(vm, arg)?;
            }
            2 => {
                let addr = vm.pop()?;
                let name = vm.extract_string(addr);
                trace!("include requested: {name:?}");
                state.includes.push(name);
            }
            3 => Self::copy_to_buffer(vm, &state.name)?,
            4 => Self::copy_to_buffer(vm, state.source())?,
            5 => vm.push(state.line)?,
            6 => state.ignore_to_eol = true,
            7 => state.ignore_to_eof = true,
            8 => state.request_abort(),
            9 => {
                let buf = vm.pop()?;
                vm.inject_string(&state.line_text, buf)?;
            }
            op => return Err(unknown_op("scripting", op)),
        }
        Ok(())
    }
}
