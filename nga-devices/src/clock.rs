use crate::{kind, unknown_op};
use chrono::{DateTime, Datelike, TimeZone, Timelike};
use nga::{Cell, Device, DeviceInfo, FaultKind, Vm};

/// Wall-clock time
///
/// Every operation pushes a single value:
///
/// | Op | Value                    |
/// |----|--------------------------|
/// | 0  | seconds since the epoch  |
/// | 1  | day of month (local)     |
/// | 2  | month, 1-12 (local)      |
/// | 3  | year (local)             |
/// | 4  | hour (local)             |
/// | 5  | minute (local)           |
/// | 6  | second (local)           |
/// | 7  | day of month (UTC)       |
/// | 8  | month, 1-12 (UTC)        |
/// | 9  | year (UTC)               |
/// | 10 | hour (UTC)               |
/// | 11 | minute (UTC)             |
/// | 12 | second (UTC)             |
pub struct Clock;

/// Picks a calendar field, where `field` counts from 0 (day of month)
fn field<Tz: TimeZone>(t: &DateTime<Tz>, field: Cell) -> Option<Cell> {
    let v = match field {
        0 => t.day() as Cell,
        1 => t.month() as Cell,
        2 => t.year() as Cell,
        3 => t.hour() as Cell,
        4 => t.minute() as Cell,
        5 => t.second() as Cell,
        _ => return None,
    };
    Some(v)
}

impl Device for Clock {
    fn query(&self) -> DeviceInfo {
        DeviceInfo {
            revision: 0,
            kind: kind::CLOCK,
        }
    }

    fn invoke(&mut self, vm: &mut Vm) -> Result<(), FaultKind> {
        let op = vm.pop()?;
        let now = chrono::Utc::now();
        let v = match op {
            0 => Some(now.timestamp() as Cell),
            1..=6 => field(&now.with_timezone(&chrono::Local), op - 1),
            7..=12 => field(&now, op - 7),
            _ => None,
        };
        vm.push(v.ok_or_else(|| unknown_op("clock", op))?)
    }
}
