use crate::error::{Result, SaveError};

/// Fixed-size little-endian byte buffer with a read/write cursor.
///
/// The size is set at construction and never grows; every access past it
/// fails with [`SaveError::BufferOverflow`] and leaves the cursor where it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
    index: usize,
}

impl Buffer {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
            index: 0,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: bytes,
            index: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.index
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.index
    }

    pub fn at_end(&self) -> bool {
        self.index >= self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Zero the contents and rewind.
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.index = 0;
    }

    pub fn set(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(self.overflow("seek", position, 0));
        }
        self.index = position;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.check("skip", n)?;
        self.index += n;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>("read_u8")?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array("read_u16")?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array("read_i16")?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array("read_u32")?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array("read_i32")?))
    }

    /// Read an unsigned little-endian value of 1 to 8 bytes.
    pub fn read_uint(&mut self, width: usize) -> Result<u64> {
        let mut bytes = [0u8; 8];
        let width = width.min(8);
        self.read_raw(&mut bytes[..width])?;
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn read_raw(&mut self, dst: &mut [u8]) -> Result<()> {
        self.check("read_raw", dst.len())?;
        let end = self.index + dst.len();
        dst.copy_from_slice(&self.data[self.index..end]);
        self.index = end;
        Ok(())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; n];
        self.read_raw(&mut out)?;
        Ok(out)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_raw(&[value])
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write the low `width` bytes (1 to 8) of `value`, little-endian.
    pub fn write_uint(&mut self, value: u64, width: usize) -> Result<()> {
        let bytes = value.to_le_bytes();
        self.write_raw(&bytes[..width.min(8)])
    }

    pub fn write_raw(&mut self, src: &[u8]) -> Result<()> {
        self.check("write_raw", src.len())?;
        let end = self.index + src.len();
        self.data[self.index..end].copy_from_slice(src);
        self.index = end;
        Ok(())
    }

    fn read_array<const N: usize>(&mut self, op: &'static str) -> Result<[u8; N]> {
        self.check(op, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.index..self.index + N]);
        self.index += N;
        Ok(out)
    }

    fn check(&self, op: &'static str, width: usize) -> Result<()> {
        match self.index.checked_add(width) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(self.overflow(op, self.index, width)),
        }
    }

    fn overflow(&self, op: &'static str, position: usize, width: usize) -> SaveError {
        SaveError::BufferOverflow {
            op,
            position,
            width,
            size: self.data.len(),
        }
    }
}
