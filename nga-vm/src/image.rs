//! Image files: raw little-endian cells with no header
use crate::{Cell, FaultKind, Vm, dict};
use alloc::vec::Vec;
use zerocopy::{FromBytes, IntoBytes, LittleEndian};

#[cfg(not(feature = "bit64"))]
type LeCell = zerocopy::I32<LittleEndian>;

#[cfg(feature = "bit64")]
type LeCell = zerocopy::I64<LittleEndian>;

/// Size of one cell in an image file
pub const CELL_BYTES: usize = core::mem::size_of::<Cell>();

static_assertions::assert_eq_size!(LeCell, Cell);

/// Error type for image decoding
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    /// The byte count is not a whole number of cells
    #[error("image is {0} bytes, which is not a multiple of {CELL_BYTES}")]
    Truncated(usize),
    /// The image does not fit in memory
    #[error("image has {cells} cells, but memory only holds {capacity}")]
    TooLarge {
        /// Cells in the image
        cells: usize,
        /// Cells in memory
        capacity: usize,
    },
}

/// Decodes an image into cells
pub fn decode(bytes: &[u8]) -> Result<Vec<Cell>, ImageError> {
    let cells = <[LeCell]>::ref_from_bytes(bytes)
        .map_err(|_| ImageError::Truncated(bytes.len()))?;
    Ok(cells.iter().map(|c| c.get()).collect())
}

/// Encodes cells into an image
pub fn encode(cells: &[Cell]) -> Vec<u8> {
    let le: Vec<LeCell> = cells.iter().map(|c| LeCell::new(*c)).collect();
    le.as_bytes().to_vec()
}

impl Vm {
    /// Copies an image into the start of memory
    ///
    /// Cells past the end of the image are left untouched, so this is
    /// normally called right after [`Vm::reset`].  Returns the number of
    /// cells loaded.
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<usize, ImageError> {
        let cells = decode(bytes)?;
        let capacity = self.image_size() as usize;
        if cells.len() > capacity {
            return Err(ImageError::TooLarge {
                cells: cells.len(),
                capacity,
            });
        }
        self.memory_mut()[..cells.len()].copy_from_slice(&cells);
        Ok(cells.len())
    }

    /// Encodes memory up to and including the heap pointer cell
    pub fn save_image(&self) -> Result<Vec<u8>, FaultKind> {
        let heap = self.fetch(dict::HEAP)?;
        let end = usize::try_from(heap)
            .ok()
            .filter(|h| *h < self.memory().len())
            .ok_or(FaultKind::BadAddress(heap))?;
        Ok(encode(&self.memory()[..=end]))
    }
}
