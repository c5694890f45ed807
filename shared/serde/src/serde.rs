use crate::{error::SerdeErr, stream_reader::StreamReader, stream_writer::StreamWriter};

/// A type that can be written to and read back from the wire
pub trait Serde: Sized {
    /// Appends the encoded value to `writer`
    fn ser(&self, writer: &mut StreamWriter);

    /// Decodes a value from the front of `reader`
    fn de(reader: &mut StreamReader) -> Result<Self, SerdeErr>;
}
