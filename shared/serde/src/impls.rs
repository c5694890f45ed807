use crate::{error::SerdeErr, serde::Serde, stream_reader::StreamReader, stream_writer::StreamWriter};

impl Serde for () {
    fn ser(&self, _writer: &mut StreamWriter) {}

    fn de(_reader: &mut StreamReader) -> Result<Self, SerdeErr> {
        Ok(())
    }
}

impl Serde for String {
    fn ser(&self, writer: &mut StreamWriter) {
        writer.write_sized(self.as_bytes());
    }

    fn de(reader: &mut StreamReader) -> Result<Self, SerdeErr> {
        let bytes = reader.read_sized()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SerdeErr::InvalidUtf8)
    }
}

impl<T: Serde> Serde for Option<T> {
    fn ser(&self, writer: &mut StreamWriter) {
        match self {
            Some(value) => {
                true.ser(writer);
                value.ser(writer);
            }
            None => false.ser(writer),
        }
    }

    fn de(reader: &mut StreamReader) -> Result<Self, SerdeErr> {
        if bool::de(reader)? {
            Ok(Some(T::de(reader)?))
        } else {
            Ok(None)
        }
    }
}

impl<T: Serde> Serde for Vec<T> {
    fn ser(&self, writer: &mut StreamWriter) {
        (self.len() as i32).ser(writer);
        for item in self {
            item.ser(writer);
        }
    }

    fn de(reader: &mut StreamReader) -> Result<Self, SerdeErr> {
        let count = i32::de(reader)?;
        if count < 0 {
            return Err(SerdeErr::NegativeLength(count));
        }
        let mut output = Vec::with_capacity((count as usize).min(reader.remaining()));
        for _ in 0..count {
            output.push(T::de(reader)?);
        }
        Ok(output)
    }
}

impl<A: Serde, B: Serde> Serde for (A, B) {
    fn ser(&self, writer: &mut StreamWriter) {
        self.0.ser(writer);
        self.1.ser(writer);
    }

    fn de(reader: &mut StreamReader) -> Result<Self, SerdeErr> {
        Ok((A::de(reader)?, B::de(reader)?))
    }
}

impl<A: Serde, B: Serde, C: Serde> Serde for (A, B, C) {
    fn ser(&self, writer: &mut StreamWriter) {
        self.0.ser(writer);
        self.1.ser(writer);
        self.2.ser(writer);
    }

    fn de(reader: &mut StreamReader) -> Result<Self, SerdeErr> {
        Ok((A::de(reader)?, B::de(reader)?, C::de(reader)?))
    }
}
