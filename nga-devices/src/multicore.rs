use crate::{kind, unknown_op};
use log::trace;
use nga::{Device, DeviceInfo, FaultKind, Vm};

/// Core bank control
///
/// | Op | Stack effect   | Description                                |
/// |----|----------------|--------------------------------------------|
/// | 0  | `n --`         | initialize core `n`                        |
/// | 1  | `a n --`       | start core `n` at address `a`              |
/// | 2  | `n --`         | pause core `n`                             |
/// | 3  | `--`           | pause the current core                     |
/// | 4  | `n --`         | resume core `n`                            |
/// | 5  | `r -- v`       | read register `r` of the current core      |
/// | 6  | `v r --`       | write register `r` of the current core     |
pub struct Multicore;

impl Device for Multicore {
    fn query(&self) -> DeviceInfo {
        DeviceInfo {
            revision: 0,
            kind: kind::MULTICORE,
        }
    }

    fn invoke(&mut self, vm: &mut Vm) -> Result<(), FaultKind> {
        match vm.pop()? {
            0 => {
                let n = vm.pop()?;
                trace!("init core {n}");
                vm.core_at(n)?.init();
            }
            1 => {
                let n = vm.pop()?;
                let a = vm.pop()?;
                trace!("start core {n} at {a}");
                vm.core_at(n)?.start(a)?;
            }
            2 => {
                let n = vm.pop()?;
                vm.core_at(n)?.pause();
            }
            3 => vm.core_mut().pause(),
            4 => {
                let n = vm.pop()?;
                vm.core_at(n)?.resume();
            }
            5 => {
                let r = vm.pop()?;
                let v = vm.core().register(r)?;
                vm.push(v)?;
            }
            6 => {
                let r = vm.pop()?;
                let v = vm.pop()?;
                vm.core_mut().set_register(r, v)?;
            }
            op => return Err(unknown_op("multicore", op)),
        }
        Ok(())
    }
}
