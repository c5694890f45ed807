use crate::error::SerdeErr;

/// A cursor over a borrowed byte slice.
pub struct StreamReader<'b> {
    buffer: &'b [u8],
    cursor: usize,
}

impl<'b> StreamReader<'b> {
    pub fn new(buffer: &'b [u8]) -> Self {
        Self { buffer, cursor: 0 }
    }

    pub fn read_byte(&mut self) -> Result<u8, SerdeErr> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'b [u8], SerdeErr> {
        let remaining = self.remaining();
        if count > remaining {
            return Err(SerdeErr::UnexpectedEnd {
                needed: count,
                remaining,
            });
        }
        let start = self.cursor;
        self.cursor += count;
        Ok(&self.buffer[start..self.cursor])
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], SerdeErr> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Reads an `i32` length prefix and the bytes it covers.
    pub fn read_sized(&mut self) -> Result<&'b [u8], SerdeErr> {
        let len = i32::from_le_bytes(self.read_array()?);
        if len < 0 {
            return Err(SerdeErr::NegativeLength(len));
        }
        self.read_bytes(len as usize)
    }

    /// The unread tail of the buffer.
    pub fn rest(&mut self) -> &'b [u8] {
        let start = self.cursor;
        self.cursor = self.buffer.len();
        &self.buffer[start..]
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}
