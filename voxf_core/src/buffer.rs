//! Little-endian primitives shared by every codec layer.
//!
//! Writing goes straight into a `Vec<u8>` through [`BufMut`]. Reading goes
//! through [`ByteReader`], which checks every read against the bytes that
//! remain before touching them, so a corrupt length can never index past the
//! end of the input or trigger an oversized allocation.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

pub(crate) fn put_len(buf: &mut Vec<u8>, len: usize, what: &'static str) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| Error::Invalid(format!("{what} has {len} entries, more than a u32 can hold")))?;
    buf.put_u32_le(len);
    Ok(())
}

pub(crate) fn put_string(buf: &mut Vec<u8>, value: &str) -> Result<()> {
    put_len(buf, value.len(), "string")?;
    buf.put_slice(value.as_bytes());
    Ok(())
}

pub(crate) fn put_bytes(buf: &mut Vec<u8>, value: &[u8]) -> Result<()> {
    put_len(buf, value.len(), "byte array")?;
    buf.put_slice(value);
    Ok(())
}

pub(crate) fn put_i32s(buf: &mut Vec<u8>, values: &[i32]) -> Result<()> {
    put_len(buf, values.len(), "int array")?;
    for &v in values {
        buf.put_i32_le(v);
    }
    Ok(())
}

pub(crate) fn put_opt_string(buf: &mut Vec<u8>, value: Option<&str>) -> Result<()> {
    match value {
        Some(s) => {
            buf.put_u8(1);
            put_string(buf, s)
        }
        None => {
            buf.put_u8(0);
            Ok(())
        }
    }
}

/// Bounds-checked cursor over an in-memory payload.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if needed > self.buf.len() {
            return Err(Error::Truncated {
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.ensure(1)?;
        Ok(self.buf.get_i8())
    }

    pub fn read_bool(&mut self, what: &'static str) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::malformed(what, format!("expected a 0/1 flag, found {other}"))),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2)?;
        Ok(self.buf.get_i16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.buf.get_i64_le())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.ensure(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.buf.get_f64_le())
    }

    /// Read a `u32` element count and reject it if `count * elem_size`
    /// cannot possibly fit in what is left of the buffer.
    pub fn read_len(&mut self, elem_size: usize) -> Result<usize> {
        let len = self.read_u32()? as usize;
        let needed = len.saturating_mul(elem_size.max(1));
        if elem_size > 0 {
            self.ensure(needed)?;
        }
        Ok(len)
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len(1)?;
        self.take(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let raw = self.read_bytes()?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| Error::malformed("string", format!("invalid UTF-8: {e}")))
    }

    pub fn read_opt_string(&mut self) -> Result<Option<String>> {
        if self.read_bool("optional string flag")? {
            Ok(Some(self.read_string()?))
        } else {
            Ok(None)
        }
    }

    pub fn read_i32s(&mut self) -> Result<Vec<i32>> {
        let len = self.read_len(4)?;
        (0..len).map(|_| self.read_i32()).collect()
    }

    /// Fail unless every byte has been consumed.
    pub fn expect_end(&self, what: &'static str) -> Result<()> {
        if !self.buf.is_empty() {
            return Err(Error::malformed(
                what,
                format!("{} trailing bytes after the last field", self.buf.len()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_round_trip_through_the_reader() {
        let mut buf = Vec::new();
        put_string(&mut buf, "minecraft:stone").unwrap();
        put_opt_string(&mut buf, None).unwrap();
        put_i32s(&mut buf, &[-1, 7]).unwrap();

        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_string().unwrap(), "minecraft:stone");
        assert_eq!(r.read_opt_string().unwrap(), None);
        assert_eq!(r.read_i32s().unwrap(), vec![-1, 7]);
        r.expect_end("test").unwrap();
    }

    #[test]
    fn inflated_length_is_rejected_before_allocating() {
        let mut buf = Vec::new();
        buf.put_u32_le(u32::MAX);
        buf.put_slice(&[1, 2, 3]);

        let mut r = ByteReader::new(&buf);
        let err = r.read_i32s().unwrap_err();
        assert!(matches!(err, Error::Truncated { remaining: 3, .. }));
    }

    #[test]
    fn short_reads_report_what_was_missing() {
        let mut r = ByteReader::new(&[0xAA, 0xBB]);
        let err = r.read_u32().unwrap_err();
        assert!(matches!(err, Error::Truncated { needed: 4, remaining: 2 }));
    }
}
