use std::fmt;

use rd_serde::{Serde, SerdeErr, StreamReader, StreamWriter};

use super::{
    error::IdentityError,
    hash::{hash_i64, hash_str},
};

/// A 64-bit routing key. Ids are derived from their parent's id and a name, so both
/// peers compute the same id for the same object without exchanging paths.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RdId(i64);

impl RdId {
    pub const NULL: RdId = RdId(0);
    pub const MAX_STATIC_ID: i64 = 1_000_000;

    pub const fn new(hash: i64) -> Self {
        Self(hash)
    }

    /// An id for a statically known root entity.
    pub fn try_static(id: i64) -> Result<Self, IdentityError> {
        if id <= 0 || id >= Self::MAX_STATIC_ID {
            return Err(IdentityError::StaticIdOutOfRange {
                id,
                max: Self::MAX_STATIC_ID,
            });
        }
        Ok(Self(id))
    }

    pub fn hash(&self) -> i64 {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    pub fn try_not_null(self) -> Result<Self, IdentityError> {
        if self.is_null() {
            Err(IdentityError::NullId)
        } else {
            Ok(self)
        }
    }

    /// Derives a child id. `id.mix(a).mix(b) == id.mix(a + b)`.
    pub fn mix(&self, tail: &str) -> RdId {
        RdId(hash_str(self.0, tail))
    }

    pub fn mix_i64(&self, tail: i64) -> RdId {
        RdId(hash_i64(self.0, tail))
    }
}

impl fmt::Display for RdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0 as u64)
    }
}

impl fmt::Debug for RdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RdId({})", self)
    }
}

impl Serde for RdId {
    fn ser(&self, writer: &mut StreamWriter) {
        self.0.ser(writer);
    }

    fn de(reader: &mut StreamReader) -> Result<Self, SerdeErr> {
        Ok(RdId(i64::de(reader)?))
    }
}
