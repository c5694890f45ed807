//! Byte-stream serialization for the rd wire protocol.
//!
//! Every value is written little-endian into a growable [`StreamWriter`] and read back
//! through a borrowing [`StreamReader`]. Lengths and counts are `i32`, tags are `u8`.

mod error;
mod impls;
mod number;
mod serde;
mod stream_reader;
mod stream_writer;

pub use error::SerdeErr;
pub use serde::Serde;
pub use stream_reader::StreamReader;
pub use stream_writer::StreamWriter;

/// Serializes `value` into a fresh byte vector.
pub fn to_bytes<T: Serde>(value: &T) -> Vec<u8> {
    let mut writer = StreamWriter::new();
    value.ser(&mut writer);
    writer.to_bytes()
}

/// Deserializes a `T` that must occupy all of `bytes`.
pub fn from_bytes<T: Serde>(bytes: &[u8]) -> Result<T, SerdeErr> {
    let mut reader = StreamReader::new(bytes);
    let value = T::de(&mut reader)?;
    if !reader.is_empty() {
        return Err(SerdeErr::TrailingBytes {
            remaining: reader.remaining(),
        });
    }
    Ok(value)
}
