//! Nga virtual machine
//!
//! Nga is a small stack machine: memory is a flat array of [`Cell`]s, and
//! each instruction cell packs four opcodes (see [`bundle`]).  The CPU owns
//! memory and one or more [`Core`]s; peripherals live in a separate
//! [`DeviceTable`] which is passed into [`Vm::execute`].
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

extern crate alloc;

use alloc::{boxed::Box, string::String, vec, vec::Vec};
use core::ops::ControlFlow;

pub mod asm;
pub mod bundle;
mod cores;
pub mod dict;
pub mod image;
pub mod op;
mod stack;

pub use cores::{Arith, Core, CoreState, REGISTERS};
pub use op::Op;
pub use stack::Stack;

/// Signed machine word
#[cfg(not(feature = "bit64"))]
pub type Cell = i32;

/// Unsigned companion of [`Cell`]
#[cfg(not(feature = "bit64"))]
pub type UCell = u32;

/// Signed machine word
#[cfg(feature = "bit64")]
pub type Cell = i64;

/// Unsigned companion of [`Cell`]
#[cfg(feature = "bit64")]
pub type UCell = u64;

static_assertions::assert_eq_size!(Cell, UCell);
static_assertions::const_assert!(core::mem::size_of::<Cell>() >= bundle::LANES);

/// Run-time sizing of a [`Vm`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmConfig {
    /// Addressable memory, in cells
    ///
    /// One extra cell is allocated past the end, so that `IMAGE_SIZE` itself
    /// is a legal (if unreachable) store target.
    pub image_size: usize,
    /// Data stack capacity per core
    pub stack_depth: usize,
    /// Address stack capacity per core
    pub address_depth: usize,
    /// Number of cores
    pub cores: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            image_size: 524288,
            stack_depth: 256,
            address_depth: 256,
            cores: 1,
        }
    }
}

/// Reason for a fault
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FaultKind {
    /// A bundle lane held an undefined opcode
    #[error("invalid instruction bundle")]
    InvalidBundle,
    /// An instruction needed more values than the data stack held
    #[error("data stack underflow")]
    DataUnderflow,
    /// An instruction would overfill the data stack
    #[error("data stack overflow")]
    DataOverflow,
    /// Returned or popped from an empty address stack
    #[error("address stack underflow")]
    AddressUnderflow,
    /// Too many nested calls
    #[error("address stack overflow")]
    AddressOverflow,
    /// Read or write outside of memory
    #[error("invalid memory address {0}")]
    BadAddress(Cell),
    /// `di` with a zero divisor
    #[error("division by zero")]
    DivideByZero,
    /// `iq` or `ii` named a device that is not attached
    #[error("no device at index {0}")]
    NoDevice(Cell),
    /// A core index outside of the core bank
    #[error("no core at index {0}")]
    NoCore(Cell),
    /// A register index outside of the register file
    #[error("no register at index {0}")]
    NoRegister(Cell),
    /// A device could not complete its operation
    #[error("device error: {0}")]
    Device(String),
}

/// Fatal execution error, with the context in which it happened
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at ip {ip} (bundle {bundle:#x}, core {core})")]
pub struct Fault {
    /// Address of the offending bundle
    pub ip: Cell,
    /// Raw bundle value
    pub bundle: Cell,
    /// Index of the core that was running
    pub core: usize,
    /// What went wrong
    pub kind: FaultKind,
}

impl Fault {
    /// Raw opcode lanes of the offending bundle
    pub fn lanes(&self) -> [u8; bundle::LANES] {
        bundle::lanes(self.bundle)
    }
}

/// Identity of a device, as reported by the `iq` instruction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Interface revision
    pub revision: Cell,
    /// Device type tag
    pub kind: Cell,
}

/// Trait for an Nga peripheral
pub trait Device {
    /// Reports the device identity for `iq`
    fn query(&self) -> DeviceInfo;

    /// Performs the `ii` operation
    ///
    /// The device index has already been popped; the device pops its own
    /// arguments (typically a sub-operation code first) and pushes results.
    fn invoke(&mut self, vm: &mut Vm) -> Result<(), FaultKind>;
}

/// Ordered list of attached devices
///
/// Indices are assigned in registration order and are part of the image
/// ABI, so they must not be reordered once an image depends on them.
#[derive(Default)]
pub struct DeviceTable {
    devices: Vec<Box<dyn Device>>,
}

impl DeviceTable {
    /// Builds an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a device, returning its index
    pub fn register<D: Device + 'static>(&mut self, dev: D) -> Cell {
        self.devices.push(Box::new(dev));
        self.len() - 1
    }

    /// Number of attached devices
    pub fn len(&self) -> Cell {
        self.devices.len() as Cell
    }

    /// Checks whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn get(&mut self, i: Cell) -> Result<&mut Box<dyn Device>, FaultKind> {
        usize::try_from(i)
            .ok()
            .and_then(|i| self.devices.get_mut(i))
            .ok_or(FaultKind::NoDevice(i))
    }

    /// Queries the device at index `i`
    pub fn query(&mut self, i: Cell) -> Result<DeviceInfo, FaultKind> {
        self.get(i).map(|d| d.query())
    }

    /// Invokes the device at index `i`
    pub fn invoke(&mut self, i: Cell, vm: &mut Vm) -> Result<(), FaultKind> {
        self.get(i)?.invoke(vm)
    }
}

/// Reason that [`Vm::execute_with`] returned
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Exit {
    /// The starting core returned past its sentinel or halted
    Completed,
    /// The step hook asked to stop
    Interrupted,
    /// Every core was paused, so nothing could make progress
    Idle,
}

/// The Nga CPU: memory plus a bank of cores
pub struct Vm {
    memory: Vec<Cell>,
    cores: Vec<Core>,
    active: usize,
    config: VmConfig,
}

impl Vm {
    /// Builds a new VM with zeroed memory and core 0 active
    pub fn new(config: VmConfig) -> Self {
        let cores = (0..config.cores.max(1))
            .map(|_| Core::new(config.stack_depth, config.address_depth))
            .collect();
        let mut out = Self {
            memory: vec![0; config.image_size + 1],
            cores,
            active: 0,
            config,
        };
        out.reset();
        out
    }

    /// Zeroes memory and returns every core to its initial state
    ///
    /// Core 0 is left active with empty stacks; the rest are uninitialized.
    pub fn reset(&mut self) {
        self.memory.fill(0);
        for c in &mut self.cores {
            c.init();
            c.state = CoreState::Uninitialized;
        }
        self.cores[0].state = CoreState::Active;
        self.active = 0;
    }

    /// Returns the configuration used to build this VM
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Addressable memory size, which is also the halt address
    #[inline]
    pub fn image_size(&self) -> Cell {
        self.config.image_size as Cell
    }

    /// Converts an address into a memory index below `limit`
    #[inline]
    fn index(addr: Cell, limit: usize) -> Result<usize, FaultKind> {
        usize::try_from(addr)
            .ok()
            .filter(|i| *i < limit)
            .ok_or(FaultKind::BadAddress(addr))
    }

    /// Reads a cell from memory, in the range `0..IMAGE_SIZE`
    #[inline]
    pub fn fetch(&self, addr: Cell) -> Result<Cell, FaultKind> {
        Self::index(addr, self.config.image_size).map(|i| self.memory[i])
    }

    /// Writes a cell to memory, in the range `0..=IMAGE_SIZE`
    #[inline]
    pub fn store(&mut self, addr: Cell, v: Cell) -> Result<(), FaultKind> {
        let i = Self::index(addr, self.memory.len())?;
        self.memory[i] = v;
        Ok(())
    }

    /// Shared borrow of all memory
    pub fn memory(&self) -> &[Cell] {
        &self.memory
    }

    /// Mutable borrow of all memory
    pub fn memory_mut(&mut self) -> &mut [Cell] {
        &mut self.memory
    }

    /// Index of the core that is currently executing
    #[inline]
    pub fn active_core(&self) -> usize {
        self.active
    }

    /// Shared borrow of the active core
    #[inline]
    pub fn core(&self) -> &Core {
        &self.cores[self.active]
    }

    /// Mutable borrow of the active core
    #[inline]
    pub fn core_mut(&mut self) -> &mut Core {
        &mut self.cores[self.active]
    }

    /// All cores in the bank
    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    /// Mutable borrow of a core by (VM-level) index
    pub fn core_at(&mut self, i: Cell) -> Result<&mut Core, FaultKind> {
        usize::try_from(i)
            .ok()
            .and_then(|n| self.cores.get_mut(n))
            .ok_or(FaultKind::NoCore(i))
    }

    /// Pushes onto the active core's data stack
    #[inline]
    pub fn push(&mut self, v: Cell) -> Result<(), FaultKind> {
        self.core_mut().data.push(v)
    }

    /// Pops from the active core's data stack
    #[inline]
    pub fn pop(&mut self) -> Result<Cell, FaultKind> {
        self.core_mut().data.pop()
    }

    /// Moves to the next active core, round-robin
    ///
    /// The current core is considered last.  Returns the new core index, or
    /// `None` if no core is active.
    pub fn switch_core(&mut self) -> Option<usize> {
        let n = self.cores.len();
        let next = (1..=n)
            .map(|step| (self.active + step) % n)
            .find(|i| self.cores[*i].state == CoreState::Active)?;
        self.active = next;
        Some(next)
    }

    /// Runs from `entry` on the active core until it finishes
    ///
    /// See [`Vm::execute_with`] for details.
    pub fn execute(
        &mut self,
        devices: &mut DeviceTable,
        entry: Cell,
    ) -> Result<Exit, Fault> {
        self.execute_with(devices, entry, |_, _| ControlFlow::Continue(()))
    }

    /// Runs from `entry` on the active core, calling `hook` before each bundle
    ///
    /// If the core's address stack is empty, a zero sentinel is pushed first,
    /// so that returning from `entry` finishes execution.  While this core
    /// runs, every other active core is interleaved one bundle per tick;
    /// secondary cores which run off the end of memory are paused.
    ///
    /// The hook receives the VM and the instruction pointer of the bundle
    /// that is about to run, on whichever core is scheduled.
    ///
    /// When this returns, the core that was active on entry is active again.
    pub fn execute_with<F>(
        &mut self,
        devices: &mut DeviceTable,
        entry: Cell,
        mut hook: F,
    ) -> Result<Exit, Fault>
    where
        F: FnMut(&mut Vm, Cell) -> ControlFlow<()>,
    {
        let origin = self.active;
        let size = self.image_size();
        {
            let core = &mut self.cores[origin];
            if core.address.is_empty() {
                core.address.push(0).map_err(|kind| Fault {
                    ip: entry,
                    bundle: 0,
                    core: origin,
                    kind,
                })?;
            }
            core.ip = entry;
            core.state = CoreState::Active;
        }

        let out = loop {
            let ip = self.core().ip;
            if ip >= size {
                if self.active == origin {
                    break Ok(Exit::Completed);
                }
                self.core_mut().pause();
            } else {
                if hook(self, ip).is_break() {
                    break Ok(Exit::Interrupted);
                }
                if let Err(e) = self.step(devices) {
                    break Err(e);
                }
            }
            if self.cores.len() > 1 && self.switch_core().is_none() {
                break Ok(Exit::Idle);
            }
        };
        self.active = origin;
        out
    }

    /// Executes one bundle on the active core
    ///
    /// After the bundle, the instruction pointer advances by one; if the
    /// address stack is then empty, the core's instruction pointer is moved
    /// to the halt address.
    pub fn step(&mut self, devices: &mut DeviceTable) -> Result<(), Fault> {
        let ip = self.core().ip;
        let fault = |vm: &Vm, bundle, kind| Fault {
            ip,
            bundle,
            core: vm.active,
            kind,
        };
        let word = match self.fetch(ip) {
            Ok(w) => w,
            Err(kind) => return Err(fault(self, 0, kind)),
        };
        self.process_bundle(word, devices)
            .map_err(|kind| fault(self, word, kind))?;

        let size = self.image_size();
        let core = self.core_mut();
        core.ip = core.ip.wrapping_add(1);
        if core.address.is_empty() {
            core.ip = size;
        }
        Ok(())
    }

    /// Validates and runs all four lanes of a bundle
    ///
    /// Undefined lanes are rejected before any lane executes.
    pub fn process_bundle(
        &mut self,
        word: Cell,
        devices: &mut DeviceTable,
    ) -> Result<(), FaultKind> {
        let ops = bundle::unpack(word).ok_or(FaultKind::InvalidBundle)?;
        for op in ops {
            self.op(op, devices)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::asm::Assembler;

    fn small() -> VmConfig {
        VmConfig {
            image_size: 1024,
            stack_depth: 16,
            address_depth: 16,
            cores: 1,
        }
    }

    /// Simple parser for textual opcode tests
    ///
    /// Numbers are pushed onto the data stack, and a single mnemonic is then
    /// run as a one-lane bundle; the data stack must match the parenthesized
    /// list afterwards.  A `u` prefix on the mnemonic arms the unsigned latch.
    fn parse_and_test(s: &str) {
        let mut vm = Vm::new(small());
        let mut dev = DeviceTable::new();
        let mut iter = s.split_whitespace();
        let mut op = None;
        while let Some(i) = iter.next() {
            if let Ok(v) = i.parse::<Cell>() {
                vm.push(v).unwrap();
            } else if i == "(" {
                let mut expected: Vec<Cell> = vec![];
                for s in iter.by_ref() {
                    if s == ")" {
                        break;
                    }
                    expected.push(s.parse().unwrap());
                }
                let (unsigned, op): (bool, Op) = op.unwrap();
                if unsigned {
                    vm.core_mut().latch_unsigned();
                }
                vm.op(op, &mut dev).unwrap();
                let actual = vm.core().data().as_slice().to_vec();
                if actual != expected {
                    panic!(
                        "failed to execute {:?}: got {actual:?}, \
                         expected {expected:?}",
                        s.trim()
                    );
                }
                break;
            } else {
                let (unsigned, name) = match i.strip_prefix('u') {
                    Some(rest) if rest.len() == 2 => (true, rest),
                    _ => (false, i),
                };
                op = Some((unsigned, Op::from_name(name).unwrap()));
            }
        }
    }

    #[cfg(not(feature = "bit64"))]
    #[test]
    fn opcodes() {
        const TEST_SUITE: &str = "
            1 2 no          ( 1 2 )
            5 du            ( 5 5 )
            5 6 dr          ( 5 )
            1 2 sw          ( 2 1 )
            3 3 eq          ( -1 )
            3 4 eq          ( 0 )
            3 4 ne          ( -1 )
            3 4 lt          ( -1 )
            4 3 lt          ( 0 )
            -1 1 lt         ( -1 )
            -1 1 ult        ( 0 )
            -1 1 ugt        ( -1 )
            4 3 gt          ( -1 )
            2 3 ad          ( 5 )
            5 3 su          ( 2 )
            3 5 su          ( -2 )
            6 7 mu          ( 42 )
            7 2 di          ( 1 3 )
            -7 2 di         ( -1 -3 )
            -7 2 udi        ( 1 2147483644 )
            12 10 an        ( 8 )
            12 10 or        ( 14 )
            12 10 xo        ( 6 )
            1 -4 sh         ( 16 )
            16 2 sh         ( 4 )
            -16 2 sh        ( -4 )
            -16 28 ush      ( 15 )
            -16 40 sh       ( -1 )
            16 40 sh        ( 0 )
            1 -40 sh        ( 0 )
            5 zr            ( 5 )
            -1 fe           ( 0 )
            7 8 -1 fe       ( 7 8 2 )
            -2 fe           ( 0 )
            -3 fe           ( 1024 )
            -4 fe           ( -2147483648 )
            -5 fe           ( 2147483647 )
            42 0 st         ( )
        ";
        for line in TEST_SUITE.lines().filter(|l| !l.trim().is_empty()) {
            parse_and_test(line);
        }
    }

    struct Quiet;

    impl Device for Quiet {
        fn query(&self) -> DeviceInfo {
            DeviceInfo {
                revision: 0,
                kind: 0,
            }
        }

        fn invoke(&mut self, _vm: &mut Vm) -> Result<(), FaultKind> {
            Ok(())
        }
    }

    #[test]
    fn stack_balance() {
        let mut dev = DeviceTable::new();
        dev.register(Quiet);
        dev.register(Quiet);

        // Ones are a valid address, divisor, device index and nonzero flag
        let setup = |depth: usize| {
            let mut vm = Vm::new(small());
            vm.core_mut().address_mut().push(1).unwrap();
            for _ in 0..depth {
                vm.push(1).unwrap();
            }
            vm
        };
        for op in (0..=u8::MAX).filter_map(Op::decode) {
            let (takes, makes) = op.arity();
            let mut vm = setup(takes);
            vm.op(op, &mut dev).unwrap();
            assert_eq!(vm.core().sp(), makes, "{op}");

            if takes > 0 {
                let mut vm = setup(takes - 1);
                assert_eq!(
                    vm.op(op, &mut dev),
                    Err(FaultKind::DataUnderflow),
                    "{op}"
                );
                assert_eq!(vm.core().sp(), takes - 1, "{op}");
            }
        }
    }

    #[test]
    fn wrapping_arithmetic() {
        let mut vm = Vm::new(small());
        let mut dev = DeviceTable::new();
        vm.push(Cell::MAX).unwrap();
        vm.push(1).unwrap();
        vm.op(Op::Add, &mut dev).unwrap();
        assert_eq!(vm.pop(), Ok(Cell::MIN));

        vm.push(Cell::MIN).unwrap();
        vm.push(-1).unwrap();
        vm.op(Op::DivMod, &mut dev).unwrap();
        assert_eq!(vm.core().data().as_slice(), &[0, Cell::MIN]);
    }

    #[test]
    fn latch_is_one_shot() {
        let mut vm = Vm::new(small());
        let mut dev = DeviceTable::new();
        vm.core_mut().latch_unsigned();

        // Bitwise operations leave the latch armed
        vm.push(1).unwrap();
        vm.push(1).unwrap();
        vm.op(Op::And, &mut dev).unwrap();
        assert_eq!(vm.core().arith(), Arith::Unsigned);

        vm.push(-1).unwrap();
        vm.op(Op::Lt, &mut dev).unwrap();
        assert_eq!(vm.pop(), Ok(-1));
        assert_eq!(vm.core().arith(), Arith::Signed);

        vm.push(1).unwrap();
        vm.push(-1).unwrap();
        vm.op(Op::Lt, &mut dev).unwrap();
        assert_eq!(vm.pop(), Ok(0));
    }

    #[test]
    fn guards() {
        let mut vm = Vm::new(small());
        let mut dev = DeviceTable::new();
        vm.push(1).unwrap();
        assert_eq!(vm.op(Op::Add, &mut dev), Err(FaultKind::DataUnderflow));
        // The guard runs before anything is popped
        assert_eq!(vm.core().data().as_slice(), &[1]);

        vm.push(0).unwrap();
        assert_eq!(vm.op(Op::DivMod, &mut dev), Err(FaultKind::DivideByZero));

        let mut vm = Vm::new(small());
        for i in 0..16 {
            vm.push(i).unwrap();
        }
        assert_eq!(vm.op(Op::Dup, &mut dev), Err(FaultKind::DataOverflow));
        assert_eq!(vm.op(Op::Lit, &mut dev), Err(FaultKind::DataOverflow));
        assert!(vm.op(Op::Add, &mut dev).is_ok());

        let mut vm = Vm::new(small());
        assert_eq!(
            vm.op(Op::Return, &mut dev),
            Err(FaultKind::AddressUnderflow)
        );
        assert_eq!(vm.op(Op::Pop, &mut dev), Err(FaultKind::AddressUnderflow));
        vm.push(3).unwrap();
        assert_eq!(vm.op(Op::Interact, &mut dev), Err(FaultKind::NoDevice(3)));
        vm.push(0).unwrap();
        assert_eq!(vm.op(Op::Enumerate, &mut dev), Ok(()));
        assert_eq!(vm.pop(), Ok(0));
    }

    #[test]
    fn memory_bounds() {
        let mut vm = Vm::new(small());
        let mut dev = DeviceTable::new();
        vm.push(9).unwrap();
        vm.push(1024).unwrap();
        vm.op(Op::Store, &mut dev).unwrap();
        assert_eq!(vm.memory()[1024], 9);
        // The spare cell at IMAGE_SIZE can be written but not read
        assert_eq!(vm.fetch(1024), Err(FaultKind::BadAddress(1024)));
        vm.push(1024).unwrap();
        assert_eq!(
            vm.op(Op::Fetch, &mut dev),
            Err(FaultKind::BadAddress(1024))
        );
        vm.push(1023).unwrap();
        vm.op(Op::Fetch, &mut dev).unwrap();
        assert_eq!(vm.pop(), Ok(0));

        vm.push(9).unwrap();
        vm.push(1025).unwrap();
        assert_eq!(
            vm.op(Op::Store, &mut dev),
            Err(FaultKind::BadAddress(1025))
        );
        vm.push(-6).unwrap();
        assert_eq!(vm.op(Op::Fetch, &mut dev), Err(FaultKind::BadAddress(-6)));
    }

    #[test]
    fn call_and_return() {
        // 0: li ca .. ..   1: 10    2: li re .. ..   3: 99
        // 10: li re .. ..  11: 7
        let mut a = Assembler::new();
        a.inst("lica....").unwrap().reference("sub");
        a.inst("lire....").unwrap().data(99);
        a.org(10).label("sub").unwrap();
        a.inst("lire....").unwrap().data(7);
        let image = a.finish().unwrap();

        let mut vm = Vm::new(small());
        vm.memory_mut()[..image.len()].copy_from_slice(&image);
        let mut dev = DeviceTable::new();
        assert_eq!(vm.execute(&mut dev, 0), Ok(Exit::Completed));
        assert_eq!(vm.core().data().as_slice(), &[7, 99]);
        assert_eq!(vm.core().rp(), 0);
    }

    #[test]
    fn return_to_empty_stack_halts() {
        let mut a = Assembler::new();
        a.org(10);
        a.inst("re......").unwrap();
        let image = a.finish().unwrap();

        let mut vm = Vm::new(small());
        vm.memory_mut()[..image.len()].copy_from_slice(&image);
        // Invalid bundles after the return are never reached
        vm.memory_mut()[11..20].fill(0x1e);
        let mut dev = DeviceTable::new();
        assert_eq!(vm.execute(&mut dev, 10), Ok(Exit::Completed));
        assert_eq!(vm.core().rp(), 0);
        assert!(vm.core().data().is_empty());
    }

    #[test]
    fn lanes_run_after_jump() {
        // `ju` in lane 1 still lets lane 2 run before the jump lands
        let mut a = Assembler::new();
        a.inst("lijudu..").unwrap().reference("end");
        a.inst("li......").unwrap().data(1);
        a.label("end").unwrap();
        a.inst("re......").unwrap();
        let image = a.finish().unwrap();

        let mut vm = Vm::new(small());
        vm.memory_mut()[..image.len()].copy_from_slice(&image);
        vm.push(5).unwrap();
        vm.execute(&mut DeviceTable::new(), 0).unwrap();
        assert_eq!(vm.core().data().as_slice(), &[5, 5]);
    }

    #[test]
    fn halt_and_invalid() {
        let mut a = Assembler::new();
        a.inst("liha....").unwrap().data(3);
        a.inst("li......").unwrap().data(4);
        let image = a.finish().unwrap();
        let mut vm = Vm::new(small());
        vm.memory_mut()[..image.len()].copy_from_slice(&image);
        let mut dev = DeviceTable::new();
        assert_eq!(vm.execute(&mut dev, 0), Ok(Exit::Completed));
        assert_eq!(vm.core().data().as_slice(), &[3]);

        vm.store(100, 0x1e).unwrap();
        let err = vm.execute(&mut dev, 100).unwrap_err();
        assert_eq!(err.kind, FaultKind::InvalidBundle);
        assert_eq!(err.ip, 100);
        assert_eq!(err.bundle, 0x1e);
        assert_eq!(err.lanes(), [30, 0, 0, 0]);
    }

    #[test]
    fn step_hook() {
        let mut a = Assembler::new();
        a.inst("li......").unwrap().data(1);
        a.inst("li......").unwrap().data(2);
        a.inst("adre....").unwrap();
        let image = a.finish().unwrap();
        let mut vm = Vm::new(small());
        vm.memory_mut()[..image.len()].copy_from_slice(&image);

        let mut seen = vec![];
        let r = vm.execute_with(&mut DeviceTable::new(), 0, |_, ip| {
            seen.push(ip);
            ControlFlow::Continue(())
        });
        assert_eq!(r, Ok(Exit::Completed));
        assert_eq!(seen, [0, 2, 4]);

        vm.core_mut().data_mut().clear();
        let r = vm.execute_with(&mut DeviceTable::new(), 0, |_, ip| {
            if ip == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(r, Ok(Exit::Interrupted));
        assert_eq!(vm.core().data().as_slice(), &[1]);
    }

    #[test]
    fn countdown_terminates() {
        let image = countdown();
        let mut vm = Vm::new(small());
        vm.memory_mut()[..image.len()].copy_from_slice(&image);
        vm.push(1000).unwrap();
        assert_eq!(vm.execute(&mut DeviceTable::new(), 0), Ok(Exit::Completed));
        assert!(vm.core().data().is_empty());
    }

    /// Counts the value on top of the stack down to zero
    fn countdown() -> Vec<Cell> {
        let mut a = Assembler::new();
        a.label("loop").unwrap();
        a.inst("lisuzr..").unwrap().data(1);
        a.inst("liju....").unwrap().reference("loop");
        a.finish().unwrap()
    }

    #[test]
    fn multicore_interleaving() {
        let mut a = Assembler::new();
        // Core 0: spin until cell 100 is non-zero
        a.label("wait").unwrap();
        a.inst("lifelieq").unwrap().data(100).data(0);
        // `zr` returns once the flag clears, before `dr` could underflow
        a.inst("zr......").unwrap();
        a.inst("drliju..").unwrap().reference("wait");
        // Core 1: store 1 into cell 100 and halt
        a.org(50);
        a.inst("lilist..").unwrap().data(1).data(100);
        a.inst("ha......").unwrap();
        let image = a.finish().unwrap();

        let mut vm = Vm::new(VmConfig { cores: 2, ..small() });
        vm.memory_mut()[..image.len()].copy_from_slice(&image);
        vm.core_at(1).unwrap().start(50).unwrap();

        let mut dev = DeviceTable::new();
        assert_eq!(vm.execute(&mut dev, 0), Ok(Exit::Completed));
        assert_eq!(vm.active_core(), 0);
        assert_eq!(vm.fetch(100), Ok(1));
        assert_eq!(vm.cores()[1].state(), CoreState::Paused);
    }

    #[test]
    fn switch_core_skips_inactive() {
        let mut vm = Vm::new(VmConfig { cores: 4, ..small() });
        assert_eq!(vm.switch_core(), Some(0));
        vm.core_at(2).unwrap().start(0).unwrap();
        assert_eq!(vm.switch_core(), Some(2));
        assert_eq!(vm.switch_core(), Some(0));
        vm.core_at(0).unwrap().pause();
        vm.core_at(2).unwrap().pause();
        assert_eq!(vm.switch_core(), None);
        assert!(vm.core_at(4).is_err());
    }
}
