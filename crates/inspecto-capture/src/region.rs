//! Row-wise access to mapped texture memory.

use std::{marker::PhantomData, slice};

use inspecto_types::Result;

use crate::capture_error;

/// A mapped subresource seen as `row_count` rows of exactly `row_len` bytes.
///
/// Drivers pad rows to their own alignment; implementations hide that pitch and
/// hand out only the meaningful prefix of each row.
pub trait MappedRegion {
    fn row_count(&self) -> usize;
    fn row_len(&self) -> usize;
    /// Bytes of row `y`, exactly `row_len` long; `None` past the last row.
    fn read_row(&self, y: usize) -> Option<&[u8]>;
}

/// Pitched rows over a borrowed byte slice.
#[derive(Debug, Clone, Copy)]
pub struct PitchedRows<'a> {
    bytes: &'a [u8],
    row_pitch: usize,
    row_len: usize,
    rows: usize,
}

impl<'a> PitchedRows<'a> {
    pub fn new(bytes: &'a [u8], row_pitch: usize, row_len: usize, rows: usize) -> Result<Self> {
        if row_pitch < row_len {
            return Err(capture_error(format!(
                "row pitch {row_pitch} is shorter than a {row_len}-byte row"
            )));
        }
        let required = required_len(row_pitch, row_len, rows);
        if bytes.len() < required {
            return Err(capture_error(format!(
                "mapped region holds {} bytes, {rows} rows need {required}",
                bytes.len()
            )));
        }
        Ok(Self {
            bytes,
            row_pitch,
            row_len,
            rows,
        })
    }
}

impl MappedRegion for PitchedRows<'_> {
    fn row_count(&self) -> usize {
        self.rows
    }

    fn row_len(&self) -> usize {
        self.row_len
    }

    fn read_row(&self, y: usize) -> Option<&[u8]> {
        if y >= self.rows {
            return None;
        }
        let start = y * self.row_pitch;
        self.bytes.get(start..start + self.row_len)
    }
}

/// Pitched rows over memory handed out by a driver's map call.
#[derive(Debug)]
pub struct RawRows<'a> {
    base: *const u8,
    row_pitch: usize,
    row_len: usize,
    rows: usize,
    _mapping: PhantomData<&'a [u8]>,
}

impl<'a> RawRows<'a> {
    /// # Safety
    ///
    /// `base` must be valid for reads of `row_pitch * (rows - 1) + row_len`
    /// bytes and stay mapped, unmodified, for the whole of `'a`.
    pub unsafe fn from_raw_parts(
        base: *const u8,
        row_pitch: usize,
        row_len: usize,
        rows: usize,
    ) -> Result<Self> {
        if base.is_null() && rows > 0 {
            return Err(capture_error("driver returned a null mapping"));
        }
        if row_pitch < row_len {
            return Err(capture_error(format!(
                "row pitch {row_pitch} is shorter than a {row_len}-byte row"
            )));
        }
        Ok(Self {
            base,
            row_pitch,
            row_len,
            rows,
            _mapping: PhantomData,
        })
    }
}

impl MappedRegion for RawRows<'_> {
    fn row_count(&self) -> usize {
        self.rows
    }

    fn row_len(&self) -> usize {
        self.row_len
    }

    fn read_row(&self, y: usize) -> Option<&[u8]> {
        if y >= self.rows {
            return None;
        }
        // SAFETY: the constructor's contract covers every row below `rows`.
        unsafe {
            Some(slice::from_raw_parts(
                self.base.add(y * self.row_pitch),
                self.row_len,
            ))
        }
    }
}

fn required_len(row_pitch: usize, row_len: usize, rows: usize) -> usize {
    match rows {
        0 => 0,
        n => row_pitch * (n - 1) + row_len,
    }
}

/// Copies every row of `region` into one tightly packed buffer.
pub fn copy_rows<R: MappedRegion + ?Sized>(region: &R) -> Result<Vec<u8>> {
    let row_len = region.row_len();
    let mut packed = Vec::with_capacity(row_len * region.row_count());
    for y in 0..region.row_count() {
        let row = region
            .read_row(y)
            .ok_or_else(|| capture_error(format!("mapped row {y} is not readable")))?;
        if row.len() != row_len {
            return Err(capture_error(format!(
                "mapped row {y} is {} bytes, expected {row_len}",
                row.len()
            )));
        }
        packed.extend_from_slice(row);
    }
    Ok(packed)
}
