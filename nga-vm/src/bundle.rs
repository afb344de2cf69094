//! Packing and unpacking of instruction bundles
//!
//! A bundle is one cell holding four opcode lanes of 8 bits each, least
//! significant byte first.  Lanes always execute in order, so a control
//! transfer in an early lane is followed by the remaining lanes.
use crate::{Cell, op::Op};

/// Number of opcode lanes in a bundle
pub const LANES: usize = 4;

/// Packs four instructions into a bundle
pub fn pack(ops: [Op; LANES]) -> Cell {
    ops.iter()
        .rev()
        .fold(0, |acc, op| (acc << 8) | Cell::from(*op as u8))
}

/// Splits a bundle into its raw lane bytes
#[inline]
pub fn lanes(word: Cell) -> [u8; LANES] {
    core::array::from_fn(|i| (word >> (8 * i)) as u8)
}

/// Checks that every lane holds a defined opcode
///
/// Bits above the fourth lane (on 64-bit cells) are ignored.
pub fn validate(word: Cell) -> bool {
    lanes(word).into_iter().all(|b| Op::decode(b).is_some())
}

/// Decodes a bundle, returning `None` if any lane is undefined
pub fn unpack(word: Cell) -> Option<[Op; LANES]> {
    let mut out = [Op::Nop; LANES];
    for (op, b) in out.iter_mut().zip(lanes(word)) {
        *op = Op::decode(b)?;
    }
    Some(out)
}
