use crate::{error::SerdeErr, serde::Serde, stream_reader::StreamReader, stream_writer::StreamWriter};

macro_rules! impl_serde_for_number {
    ($($ty:ty),*) => {
        $(
            impl Serde for $ty {
                fn ser(&self, writer: &mut StreamWriter) {
                    writer.write_bytes(&self.to_le_bytes());
                }

                fn de(reader: &mut StreamReader) -> Result<Self, SerdeErr> {
                    Ok(<$ty>::from_le_bytes(reader.read_array()?))
                }
            }
        )*
    };
}

impl_serde_for_number!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl Serde for bool {
    fn ser(&self, writer: &mut StreamWriter) {
        writer.write_byte(u8::from(*self));
    }

    fn de(reader: &mut StreamReader) -> Result<Self, SerdeErr> {
        match reader.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(SerdeErr::InvalidTag {
                type_name: "bool",
                tag: tag as i64,
            }),
        }
    }
}
