use crate::source::{self, Fences};
use anyhow::{Context, Result};
use devices::ScriptState;
use log::{debug, trace, warn};
use nga::{Cell, DeviceTable, Exit, Vm, dict};
use std::{cell::RefCell, io::Write, ops::ControlFlow, path::Path, rc::Rc};

/// Addresses in the image that the shell talks to
///
/// These move as words are defined, so they are refreshed by
/// [`Shell::sync`] after every evaluated token.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Interface {
    /// Most recent dictionary header
    pub dictionary: Cell,
    /// Entry point of `interpret`, which takes a token address
    pub interpret: Cell,
    /// Entry point of the not-found handler
    pub not_found: Cell,
    /// Text input buffer
    pub tib: Cell,
}

/// Host for a RETRO image
///
/// The shell feeds tokens from literate source files to the image's own
/// `interpret` word, and services requests that the image makes through
/// the scripting device.
pub struct Shell {
    vm: Vm,
    devices: DeviceTable,
    script: Rc<RefCell<ScriptState>>,
    iface: Interface,
    fences: Fences,

    /// Destination for diagnostics and stack dumps
    out: Box<dyn Write>,
}

impl Shell {
    /// Builds a shell around a VM with an image already loaded
    ///
    /// `script` must be the same state that was given to the scripting
    /// device in `devices`.
    pub fn new(
        vm: Vm,
        devices: DeviceTable,
        script: Rc<RefCell<ScriptState>>,
        out: Box<dyn Write>,
    ) -> Self {
        let mut s = Self {
            vm,
            devices,
            script,
            iface: Interface::default(),
            fences: Fences::default(),
            out,
        };
        s.sync();
        s
    }

    /// Borrows the virtual machine
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// Mutably borrows the virtual machine
    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    /// Returns the addresses found by the most recent [`Shell::sync`]
    pub fn interface(&self) -> Interface {
        self.iface
    }

    /// Replaces the block fences used by [`Shell::include`]
    pub fn set_fences(&mut self, fences: Fences) {
        self.fences = fences;
    }

    /// Replaces memory with a new image, then resynchronizes
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<()> {
        let n = self.vm.load_image(bytes)?;
        debug!("loaded {n} cells");
        self.sync();
        Ok(())
    }

    /// Refreshes the cached interface addresses
    ///
    /// `interpret` and `err:notfound` are looked up by name; images without
    /// those headers provide their entry points in fixed cells instead.
    pub fn sync(&mut self) {
        let vm = &self.vm;
        let dictionary = vm.dictionary();
        let cell = |addr| vm.fetch(addr).unwrap_or(0);
        let iface = Interface {
            dictionary,
            interpret: vm
                .xt_for(dictionary, "interpret")
                .unwrap_or_else(|| cell(dict::INTERPRET)),
            not_found: vm
                .xt_for(dictionary, "err:notfound")
                .unwrap_or_else(|| cell(dict::NOT_FOUND)),
            tib: cell(dict::TIB),
        };
        if iface != self.iface {
            debug!("interface: {iface:?}");
        }
        self.iface = iface;
    }

    /// Runs the image's startup word, if it has one
    pub fn startup(&mut self) -> Result<()> {
        let entry = self.vm.fetch(dict::STARTUP)?;
        if entry != 0 {
            debug!("running startup word at {entry}");
            self.run(entry)?;
            self.sync();
        }
        Ok(())
    }

    /// Runs from `entry` until it returns, halts, or is aborted
    ///
    /// Execution pauses after any bundle that asks the shell to include a
    /// file; the file is processed with a fresh address stack, then
    /// execution resumes where it left off.
    pub fn run(&mut self, entry: Cell) -> Result<()> {
        let mut ip = entry;
        let mut token = self.iface.tib;
        loop {
            let iface = self.iface;
            let script = &self.script;
            let out = &mut self.out;
            let mut failed = None;
            let exit = self.vm.execute_with(&mut self.devices, ip, |vm, at| {
                if script.borrow().pending() {
                    return ControlFlow::Break(());
                }
                if at == iface.not_found {
                    let name = vm.extract_string(token);
                    let msg = format!("\nERROR: Word Not Found: `{name}`\n\n");
                    let r = out
                        .write_all(msg.as_bytes())
                        .and_then(|_| out.flush());
                    if let Err(e) = r {
                        failed = Some(e);
                        return ControlFlow::Break(());
                    }
                }
                if at == iface.interpret {
                    if let Some(t) = vm.core().data().peek() {
                        token = t;
                    }
                }
                ControlFlow::Continue(())
            })?;
            if let Some(e) = failed {
                return Err(e).context("failed to write diagnostic");
            }
            if self.script.borrow().abort {
                self.abort();
                return Ok(());
            }
            if exit != Exit::Interrupted {
                return Ok(());
            }
            ip = self.vm.core().ip();
            self.service()?;
        }
    }

    /// Clears the active core's stacks and parks it
    ///
    /// The request stays armed until every nested include has unwound.
    fn abort(&mut self) {
        trace!("aborting");
        let size = self.vm.image_size();
        let core = self.vm.core_mut();
        core.data_mut().clear();
        core.address_mut().clear();
        core.set_ip(size);

        let mut s = self.script.borrow_mut();
        if s.sources.is_empty() {
            s.abort = false;
            s.ignore_to_eol = false;
            s.ignore_to_eof = false;
            s.includes.clear();
        }
    }

    /// Handles include requests made by the running image
    fn service(&mut self) -> Result<()> {
        let saved = self.vm.core().address().as_slice().to_vec();
        self.vm.core_mut().address_mut().clear();
        loop {
            let next = {
                let mut s = self.script.borrow_mut();
                if s.abort || s.includes.is_empty() {
                    None
                } else {
                    Some(s.includes.remove(0))
                }
            };
            let Some(name) = next else { break };
            match self.include(Path::new(&name), false) {
                Err(e) if e.is::<std::io::Error>() => warn!("{e:#}"),
                r => r?,
            }
        }
        let stack = self.vm.core_mut().address_mut();
        stack.clear();
        for a in saved {
            stack.push(a)?;
        }
        Ok(())
    }

    /// Evaluates a single token with the image's `interpret` word
    pub fn evaluate(&mut self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Ok(());
        }
        let tib = self.iface.tib;
        self.vm.inject_string(token, tib)?;
        self.vm.push(tib)?;
        self.run(self.iface.interpret)?;
        self.sync();
        Ok(())
    }

    /// Evaluates the code blocks of a file, and its tests if `tests` is set
    pub fn include(&mut self, path: &Path, tests: bool) -> Result<()> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("file `{}` not found", path.display()))?;
        let text = String::from_utf8_lossy(&bytes);
        let name = path.display().to_string();
        trace!("including {name}");

        {
            let mut s = self.script.borrow_mut();
            s.sources.push(name.clone());
            s.ignore_to_eof = false;
        }
        let r = self.include_text(&text, tests);
        let mut s = self.script.borrow_mut();
        s.sources.pop();
        s.ignore_to_eof = false;
        s.ignore_to_eol = false;
        if s.abort && s.sources.is_empty() {
            s.abort = false;
            s.includes.clear();
        } else if s.abort {
            s.request_abort();
        }
        drop(s);

        if r.as_ref().is_ok_and(|blocks| *blocks == 0) {
            warn!("no code or test blocks found in {name}");
        }
        r.map(|_| ())
    }

    /// Evaluates `text` line by line, returning the number of blocks found
    fn include_text(&mut self, text: &str, tests: bool) -> Result<usize> {
        let mut in_block = false;
        let mut blocks = 0;
        for (i, line) in text.lines().enumerate() {
            {
                let mut s = self.script.borrow_mut();
                if s.ignore_to_eof {
                    break;
                }
                s.ignore_to_eol = false;
            }
            for raw in line.split_whitespace() {
                let token = source::clean(raw);
                if self.fences.is_boundary(&token, tests) {
                    if !in_block {
                        blocks += 1;
                    }
                    in_block = !in_block;
                } else if self.fences.is_test_start(&token) && blocks == 0 {
                    blocks = 1;
                } else if in_block {
                    {
                        let mut s = self.script.borrow_mut();
                        s.line = (i + 1) as Cell;
                        line.clone_into(&mut s.line_text);
                    }
                    self.evaluate(&token)?;
                }
                let s = self.script.borrow();
                if s.ignore_to_eol || s.ignore_to_eof {
                    break;
                }
            }
        }
        Ok(blocks)
    }

    /// Prints the active core's data stack, if it is not empty
    ///
    /// ```text
    /// Stack: 1 2 [ TOS: 3 ]
    /// ```
    pub fn dump_stack(&mut self) -> Result<()> {
        let data = self.vm.core().data().as_slice();
        let Some((tos, rest)) = data.split_last() else {
            return Ok(());
        };
        let mut line = String::from("\nStack: ");
        for v in rest {
            line += &format!("{v} ");
        }
        line += &format!("[ TOS: {tos} ]\n");
        self.out
            .write_all(line.as_bytes())
            .and_then(|_| self.out.flush())
            .context("failed to write stack")
    }
}
