/// A growable byte sink. Multi-byte values are written little-endian.
pub struct StreamWriter {
    buffer: Vec<u8>,
}

impl StreamWriter {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64),
        }
    }

    pub fn write_byte(&mut self, byte: u8) {
        self.buffer.push(byte);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes an `i32` length prefix followed by `bytes`.
    pub fn write_sized(&mut self, bytes: &[u8]) {
        self.write_bytes(&(bytes.len() as i32).to_le_bytes());
        self.write_bytes(bytes);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn to_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for StreamWriter {
    fn default() -> Self {
        Self::new()
    }
}
