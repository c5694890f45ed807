use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::Arc,
};

use log::trace;
use parking_lot::RwLock;

use rd_serde::{Serde, SerdeErr, StreamReader, StreamWriter};

use crate::identity::hash::{hash_str, DEFAULT_HASH_SEED};

use super::error::ProtocolError;

pub type PolymorphicValue = Arc<dyn Any + Send + Sync>;

type WriteFn = Box<dyn Fn(&(dyn Any + Send + Sync), &mut StreamWriter) + Send + Sync>;
type ReadFn = Box<dyn Fn(&mut StreamReader) -> Result<PolymorphicValue, SerdeErr> + Send + Sync>;

struct Marshaller {
    name: String,
    id: i64,
    rust_type: TypeId,
    write: WriteFn,
    read: ReadFn,
}

#[derive(Default)]
struct Registry {
    by_id: HashMap<i64, Arc<Marshaller>>,
    by_type: HashMap<TypeId, Arc<Marshaller>>,
}

/// Registry for values whose concrete type is only known at runtime. Each registered
/// type is identified on the wire by a 64-bit hash of its registered name.
///
/// Polymorphic frame: `[type id: i64][length: i32][bytes]`; a null value is type id 0.
#[derive(Default)]
pub struct Serializers {
    registry: RwLock<Registry>,
}

impl Serializers {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wire id of a type registered under `name`.
    pub fn type_id_of(name: &str) -> i64 {
        hash_str(DEFAULT_HASH_SEED, name)
    }

    /// Registers `T` under `name`. Registering the same type twice is a no-op.
    pub fn register<T: Serde + Send + Sync + 'static>(&self, name: &str) -> Result<(), ProtocolError> {
        let id = Self::type_id_of(name);
        let mut registry = self.registry.write();
        if let Some(existing) = registry.by_id.get(&id) {
            if existing.rust_type == TypeId::of::<T>() {
                return Ok(());
            }
            return Err(ProtocolError::DuplicateTypeId {
                id,
                existing: existing.name.clone(),
                new: name.to_string(),
            });
        }

        trace!("registering polymorphic type `{}`, id = {}", name, id);
        let marshaller = Arc::new(Marshaller {
            name: name.to_string(),
            id,
            rust_type: TypeId::of::<T>(),
            write: Box::new(|value, writer| {
                if let Some(value) = value.downcast_ref::<T>() {
                    value.ser(writer);
                }
            }),
            read: Box::new(|reader| Ok(Arc::new(T::de(reader)?) as PolymorphicValue)),
        });
        registry.by_id.insert(id, marshaller.clone());
        registry.by_type.insert(TypeId::of::<T>(), marshaller);
        Ok(())
    }

    pub fn is_registered<T: 'static>(&self) -> bool {
        self.registry.read().by_type.contains_key(&TypeId::of::<T>())
    }

    pub fn type_name(&self, id: i64) -> Option<String> {
        self.registry.read().by_id.get(&id).map(|marshaller| marshaller.name.clone())
    }

    pub fn write_polymorphic<T: Send + Sync + 'static>(
        &self,
        writer: &mut StreamWriter,
        value: &T,
    ) -> Result<(), ProtocolError> {
        self.write_polymorphic_dyn(writer, value)
    }

    pub fn write_polymorphic_dyn(
        &self,
        writer: &mut StreamWriter,
        value: &(dyn Any + Send + Sync),
    ) -> Result<(), ProtocolError> {
        let type_id = Any::type_id(value);
        let marshaller = self
            .registry
            .read()
            .by_type
            .get(&type_id)
            .cloned()
            .ok_or(ProtocolError::UnregisteredType("<unregistered>"))?;

        let mut inner = StreamWriter::new();
        (marshaller.write)(value, &mut inner);
        marshaller.id.ser(writer);
        writer.write_sized(&inner.to_bytes());
        Ok(())
    }

    pub fn write_polymorphic_nullable(
        &self,
        writer: &mut StreamWriter,
        value: Option<&(dyn Any + Send + Sync)>,
    ) -> Result<(), ProtocolError> {
        match value {
            Some(value) => self.write_polymorphic_dyn(writer, value),
            None => {
                0i64.ser(writer);
                Ok(())
            }
        }
    }

    pub fn read_polymorphic_nullable(
        &self,
        reader: &mut StreamReader,
    ) -> Result<Option<PolymorphicValue>, ProtocolError> {
        let id = i64::de(reader)?;
        if id == 0 {
            return Ok(None);
        }
        let bytes = reader.read_sized()?;
        let marshaller = self
            .registry
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(ProtocolError::UnknownTypeId(id))?;

        let mut inner = StreamReader::new(bytes);
        Ok(Some((marshaller.read)(&mut inner)?))
    }

    pub fn read_polymorphic(&self, reader: &mut StreamReader) -> Result<PolymorphicValue, ProtocolError> {
        self.read_polymorphic_nullable(reader)?
            .ok_or(ProtocolError::UnknownTypeId(0))
    }

    /// Reads a polymorphic value and checks that it is a `T`.
    pub fn read_polymorphic_as<T: Clone + 'static>(&self, reader: &mut StreamReader) -> Result<T, ProtocolError> {
        let value = self.read_polymorphic(reader)?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ProtocolError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                actual: "<other registered type>".to_string(),
            })
    }
}

/// A value entities can put on the wire. Plain [`Serde`] types encode themselves;
/// [`Polymorphic`] values go through the protocol's [`Serializers`].
pub trait WireValue: Sized + Send + Sync + 'static {
    fn write_value(&self, serializers: &Serializers, writer: &mut StreamWriter) -> Result<(), ProtocolError>;

    fn read_value(serializers: &Serializers, reader: &mut StreamReader) -> Result<Self, ProtocolError>;
}

impl<T: Serde + Send + Sync + 'static> WireValue for T {
    fn write_value(&self, _serializers: &Serializers, writer: &mut StreamWriter) -> Result<(), ProtocolError> {
        self.ser(writer);
        Ok(())
    }

    fn read_value(_serializers: &Serializers, reader: &mut StreamReader) -> Result<Self, ProtocolError> {
        Ok(T::de(reader)?)
    }
}

/// A value of any registered type. Two `Polymorphic`s are equal only if they share
/// the same allocation.
#[derive(Clone)]
pub struct Polymorphic(pub PolymorphicValue);

impl Polymorphic {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl PartialEq for Polymorphic {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Polymorphic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Polymorphic({:?})", Any::type_id(&*self.0))
    }
}

impl WireValue for Polymorphic {
    fn write_value(&self, serializers: &Serializers, writer: &mut StreamWriter) -> Result<(), ProtocolError> {
        serializers.write_polymorphic_dyn(writer, &*self.0)
    }

    fn read_value(serializers: &Serializers, reader: &mut StreamReader) -> Result<Self, ProtocolError> {
        Ok(Polymorphic(serializers.read_polymorphic(reader)?))
    }
}
