use crate::error::{Result, SnapshotError};

/// Cursor over snapshot bytes. Every read is bounds checked; running off the
/// end is a [`SnapshotError::Format`], never a panic.
#[derive(Debug, Clone)]
pub struct SnapshotReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> SnapshotReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    /// True once every byte has been consumed.
    pub fn eos(&self) -> bool {
        self.position == self.bytes.len()
    }

    /// Fails with [`SnapshotError::TrailingBytes`] unless at the end.
    pub fn expect_eos(&self) -> Result<()> {
        if self.eos() {
            Ok(())
        } else {
            Err(SnapshotError::TrailingBytes(self.remaining()))
        }
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .bytes
            .get(self.position)
            .ok_or(SnapshotError::Format("unexpected end of snapshot"))?;
        self.position += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(SnapshotError::Format("unexpected end of snapshot"));
        }
        let slice = &self.bytes[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_cardinal(&mut self) -> Result<u64> {
        let mut input = &self.bytes[self.position..];
        let value = leb128::read::unsigned(&mut input).map_err(|error| match error {
            leb128::read::Error::Overflow => SnapshotError::Format("cardinal overflows 64 bits"),
            leb128::read::Error::IoError(_) => SnapshotError::Format("unexpected end of snapshot"),
        })?;
        self.position = self.bytes.len() - input.len();
        Ok(value)
    }

    /// A cardinal used as a count or index into memory.
    pub fn read_length(&mut self) -> Result<usize> {
        usize::try_from(self.read_cardinal()?)
            .map_err(|_| SnapshotError::Format("length does not fit the host"))
    }

    pub fn read_int(&mut self) -> Result<i64> {
        Ok(zigzag_decode(self.read_cardinal()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Reads a length prefix for a list whose elements take at least
    /// `element_size` bytes each, rejecting counts the input cannot hold.
    fn read_list_length(&mut self, element_size: usize) -> Result<usize> {
        let length = self.read_length()?;
        match length.checked_mul(element_size) {
            Some(bytes) if bytes <= self.remaining() => Ok(length),
            _ => Err(SnapshotError::Format("list length exceeds snapshot")),
        }
    }

    pub fn read_byte_list(&mut self) -> Result<&'a [u8]> {
        let length = self.read_list_length(1)?;
        self.read_bytes(length)
    }

    pub fn read_u16_list(&mut self) -> Result<Vec<u16>> {
        let length = self.read_list_length(2)?;
        let mut list = Vec::with_capacity(length);
        for _ in 0..length {
            list.push(u16::from_le_bytes(self.read_array()?));
        }
        Ok(list)
    }

    pub fn read_i32_list(&mut self) -> Result<Vec<i32>> {
        let length = self.read_list_length(4)?;
        let mut list = Vec::with_capacity(length);
        for _ in 0..length {
            list.push(i32::from_le_bytes(self.read_array()?));
        }
        Ok(list)
    }
}

pub(crate) fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}
