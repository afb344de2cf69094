use crate::{kind, unknown_op};
use nga::{Arith, Cell, Device, DeviceInfo, FaultKind, UCell, Vm};

/// Unsigned arithmetic helpers
///
/// | Op | Stack effect          | Description                        |
/// |----|-----------------------|------------------------------------|
/// | 0  | `--`                  | arm the one-shot unsigned latch    |
/// | 1  | `x y z -- rem quot`   | `(x * y) /mod z`, without overflow |
///
/// Operation 1 computes the product at double width, honors and then
/// clears the latch.
pub struct Unsigned;

/// Double-width signed cell
#[cfg(not(feature = "bit64"))]
type Wide = i64;
#[cfg(feature = "bit64")]
type Wide = i128;

/// Double-width unsigned cell
#[cfg(not(feature = "bit64"))]
type UWide = u64;
#[cfg(feature = "bit64")]
type UWide = u128;

fn star_slash_mod(vm: &mut Vm) -> Result<(), FaultKind> {
    let z = vm.pop()?;
    let y = vm.pop()?;
    let x = vm.pop()?;
    if z == 0 {
        return Err(FaultKind::DivideByZero);
    }
    let (rem, quot) = match vm.core_mut().take_arith() {
        Arith::Signed => {
            let c = Wide::from(x) * Wide::from(y);
            let z = Wide::from(z);
            (c % z, c / z)
        }
        Arith::Unsigned => {
            let c = UWide::from(x as UCell) * UWide::from(y as UCell);
            let z = UWide::from(z as UCell);
            ((c % z) as Wide, (c / z) as Wide)
        }
    };
    vm.push(rem as Cell)?;
    vm.push(quot as Cell)
}

impl Device for Unsigned {
    fn query(&self) -> DeviceInfo {
        DeviceInfo {
            revision: 0,
            kind: kind::UNSIGNED,
        }
    }

    fn invoke(&mut self, vm: &mut Vm) -> Result<(), FaultKind> {
        match vm.pop()? {
            0 => {
                vm.core_mut().latch_unsigned();
                Ok(())
            }
            1 => star_slash_mod(vm),
            op => Err(unknown_op("unsigned", op)),
        }
    }
}
