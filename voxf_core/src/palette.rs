//! Palette indirection and bit packing.
//!
//! A [`Palette`] maps each distinct value of an encoding unit to a dense index
//! in first-seen order. Cells then store indices instead of values, packed at
//! the narrowest width that can address the palette.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{Error, Result};

/// Widest index the packer accepts.
pub const MAX_BIT_WIDTH: u8 = 32;

/// Minimal width needed to address `n` palette entries:
/// `ceil(log2(max(n, 1)))`, never less than one bit.
pub fn minimal_bit_width(n: usize) -> u8 {
    if n <= 1 {
        return 1;
    }
    (usize::BITS - (n - 1).leading_zeros()) as u8
}

/// Width actually used to store indices into a palette of `n` entries.
/// Palettes of zero or one entries store no index array at all.
pub fn storage_bit_width(n: usize) -> u8 {
    if n <= 1 {
        0
    } else {
        minimal_bit_width(n)
    }
}

/// Bytes produced by packing `count` entries at `bit_width` bits each.
pub fn packed_len(count: usize, bit_width: u8) -> usize {
    (count * bit_width as usize + 7) / 8
}

/// Pack `indices` into a continuous little-endian bitstream: entry `i`
/// occupies bits `i*w .. (i+1)*w`, low bits first, with no per-entry padding.
pub fn pack(indices: &[u32], bit_width: u8) -> Vec<u8> {
    debug_assert!(bit_width <= MAX_BIT_WIDTH);
    if bit_width == 0 {
        return Vec::new();
    }
    let mask = (1u64 << bit_width) - 1;
    let mut out = Vec::with_capacity(packed_len(indices.len(), bit_width));
    let mut acc = 0u64;
    let mut bits = 0u32;
    for &index in indices {
        acc |= (index as u64 & mask) << bits;
        bits += bit_width as u32;
        while bits >= 8 {
            out.push(acc as u8);
            acc >>= 8;
            bits -= 8;
        }
    }
    if bits > 0 {
        out.push(acc as u8);
    }
    out
}

/// Inverse of [`pack`]. Every decoded index must address one of
/// `palette_len` entries; a packed array of the wrong length is rejected
/// before any index is read.
pub fn unpack(packed: &[u8], bit_width: u8, count: usize, palette_len: usize) -> Result<Vec<u32>> {
    if bit_width > MAX_BIT_WIDTH {
        return Err(Error::malformed("index array", format!("bit width {bit_width} exceeds {MAX_BIT_WIDTH}")));
    }
    let expected = packed_len(count, bit_width);
    if packed.len() != expected {
        return Err(Error::malformed(
            "index array",
            format!(
                "{count} entries at {bit_width} bits need {expected} bytes, found {}",
                packed.len()
            ),
        ));
    }
    if bit_width == 0 {
        if count > 0 && palette_len == 0 {
            return Err(Error::PaletteIndexOutOfRange { index: 0, palette_len });
        }
        return Ok(vec![0; count]);
    }

    let mask = (1u64 << bit_width) - 1;
    let mut out = Vec::with_capacity(count);
    let mut bytes = packed.iter();
    let mut acc = 0u64;
    let mut bits = 0u32;
    for _ in 0..count {
        while bits < bit_width as u32 {
            // length was checked above, so the stream cannot run dry here
            let next = bytes.next().copied().unwrap_or(0);
            acc |= (next as u64) << bits;
            bits += 8;
        }
        let index = (acc & mask) as u32;
        acc >>= bit_width;
        bits -= bit_width as u32;
        if index as usize >= palette_len {
            return Err(Error::PaletteIndexOutOfRange { index, palette_len });
        }
        out.push(index);
    }
    Ok(out)
}

/// Ordered, deduplicated catalogue of values.
#[derive(Debug, Clone)]
pub struct Palette<T> {
    values: Vec<T>,
    lookup: HashMap<T, u32>,
}

impl<T> Default for Palette<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            lookup: HashMap::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> Palette<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalogue `values` in first-seen order.
    pub fn build<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mut palette = Self::new();
        for value in values {
            palette.insert(value);
        }
        palette
    }

    /// Index of `value`, appending it if it has not been seen yet.
    pub fn insert(&mut self, value: &T) -> u32 {
        if let Some(&index) = self.lookup.get(value) {
            return index;
        }
        let index = self.values.len() as u32;
        self.values.push(value.clone());
        self.lookup.insert(value.clone(), index);
        index
    }

    pub fn index_of(&self, value: &T) -> Option<u32> {
        self.lookup.get(value).copied()
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.values.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn bit_width(&self) -> u8 {
        minimal_bit_width(self.len())
    }

    pub fn storage_bit_width(&self) -> u8 {
        storage_bit_width(self.len())
    }

    /// Map every value to its index; all values must already be present.
    pub fn indices_of<'a, I>(&self, values: I) -> Result<Vec<u32>>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        values
            .into_iter()
            .map(|v| {
                self.index_of(v).ok_or_else(|| {
                    Error::Invalid("value missing from a palette that was built before encoding".into())
                })
            })
            .collect()
    }
}

/// Fixed-length cell array stored as a local palette plus one index per cell.
///
/// When every cell holds the same value the index array is dropped. Two
/// arrays compare equal when every cell resolves to the same value, however
/// their palettes happen to be laid out.
#[derive(Debug, Clone)]
pub struct PalettedArray<T> {
    palette: Palette<T>,
    indices: Vec<u32>,
    len: usize,
}

impl<T: Eq + Hash + Clone> PalettedArray<T> {
    pub fn filled(value: T, len: usize) -> Self {
        let mut palette = Palette::new();
        palette.insert(&value);
        Self {
            palette,
            indices: Vec::new(),
            len,
        }
    }

    /// Build from exactly `len` cell values.
    pub fn from_values<I>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
    {
        let mut palette = Palette::new();
        let indices: Vec<u32> = values.into_iter().map(|v| palette.insert(&v)).collect();
        let len = indices.len();
        if len == 0 {
            return Err(Error::Invalid("paletted array needs at least one cell".into()));
        }
        let mut array = Self { palette, indices, len };
        array.collapse_if_uniform();
        Ok(array)
    }

    /// Assemble from a decoded palette and its index array. Duplicate palette
    /// entries are merged and indices are range-checked.
    pub fn from_parts(values: Vec<T>, indices: Vec<u32>, len: usize) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::malformed("palette", "empty palette for a non-empty cell array"));
        }
        let mut palette = Palette::new();
        let remap: Vec<u32> = values.iter().map(|v| palette.insert(v)).collect();

        let indices = if indices.is_empty() {
            if values.len() != 1 {
                return Err(Error::malformed(
                    "palette",
                    format!("{} entries but no index array", values.len()),
                ));
            }
            Vec::new()
        } else {
            if indices.len() != len {
                return Err(Error::malformed(
                    "index array",
                    format!("expected {len} indices, found {}", indices.len()),
                ));
            }
            indices
                .into_iter()
                .map(|i| {
                    remap.get(i as usize).copied().ok_or(Error::PaletteIndexOutOfRange {
                        index: i,
                        palette_len: values.len(),
                    })
                })
                .collect::<Result<Vec<u32>>>()?
        };

        let mut array = Self { palette, indices, len };
        array.collapse_if_uniform();
        Ok(array)
    }

    fn collapse_if_uniform(&mut self) {
        if self.indices.is_empty() {
            return;
        }
        let first = self.indices[0];
        if self.indices.iter().all(|&i| i == first) {
            let value = self.palette.values[first as usize].clone();
            *self = Self::filled(value, self.len);
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn palette(&self) -> &Palette<T> {
        &self.palette
    }

    /// The single value held by every cell, if there is one.
    pub fn uniform_value(&self) -> Option<&T> {
        if self.indices.is_empty() {
            self.palette.values.first()
        } else {
            None
        }
    }

    /// Panics if `i` is out of bounds.
    pub fn get(&self, i: usize) -> &T {
        assert!(i < self.len, "cell {i} out of bounds for {} cells", self.len);
        let index = if self.indices.is_empty() { 0 } else { self.indices[i] };
        &self.palette.values[index as usize]
    }

    /// Panics if `i` is out of bounds.
    pub fn set(&mut self, i: usize, value: T) {
        assert!(i < self.len, "cell {i} out of bounds for {} cells", self.len);
        if self.indices.is_empty() {
            if self.palette.values[0] == value {
                return;
            }
            self.indices = vec![0; self.len];
        }
        let index = self.palette.insert(&value);
        self.indices[i] = index;
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    /// Palette indices per cell; empty when the array is uniform.
    pub fn raw_indices(&self) -> &[u32] {
        &self.indices
    }

    /// Drop palette entries no cell refers to and restore first-seen order.
    pub fn compact(&mut self) {
        if let Ok(rebuilt) = Self::from_values(self.iter().cloned().collect::<Vec<_>>()) {
            *self = rebuilt;
        }
    }
}

impl<T: Eq + Hash + Clone> PartialEq for PalettedArray<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<T: Eq + Hash + Clone> Eq for PalettedArray<T> {}
