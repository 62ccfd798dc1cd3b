use core::cmp::Ordering;
use core::fmt::{self, Debug, Display};
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

use crate::{Decode, DecodeError, Encode, EncodeError, Value};

/// Wire representation of a reference to no object
pub const NULL_REF: &str = "OpaqueRef:NULL";

/// Opaque server-assigned handle to a managed object of class `T`.
///
/// Equality is string equality, the class marker only exists at compile time.
#[repr(transparent)]
pub struct Ref<T: ?Sized> {
    repr: String,
    _ty: PhantomData<T>,
}

impl<T: ?Sized> Ref<T> {
    pub fn new(repr: impl Into<String>) -> Self {
        Self {
            repr: repr.into(),
            _ty: PhantomData,
        }
    }

    /// Reference to no object
    pub fn null() -> Self {
        Self::new(NULL_REF)
    }

    pub fn is_null(&self) -> bool {
        self.repr == NULL_REF
    }

    pub fn as_str(&self) -> &str {
        &self.repr
    }

    pub fn into_inner(self) -> String {
        self.repr
    }

    /// Reinterprets the handle as referring to class `U`
    pub fn cast<U: ?Sized>(self) -> Ref<U> {
        Ref::new(self.repr)
    }
}

impl<T: ?Sized> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self::new(self.repr.clone())
    }
}

impl<T: ?Sized> Default for Ref<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized> From<String> for Ref<T> {
    fn from(repr: String) -> Self {
        Self::new(repr)
    }
}

impl<T: ?Sized> From<&str> for Ref<T> {
    fn from(repr: &str) -> Self {
        Self::new(repr)
    }
}

impl<T: ?Sized> From<Ref<T>> for String {
    fn from(Ref { repr, .. }: Ref<T>) -> Self {
        repr
    }
}

impl<T: ?Sized> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.repr == other.repr
    }
}

impl<T: ?Sized> Eq for Ref<T> {}

impl<T: ?Sized> PartialOrd for Ref<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized> Ord for Ref<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.repr.cmp(&other.repr)
    }
}

impl<T: ?Sized> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.repr.hash(state);
    }
}

impl<T: ?Sized> AsRef<str> for Ref<T> {
    fn as_ref(&self) -> &str {
        &self.repr
    }
}

impl<T: ?Sized> Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref<{}>", self.repr)
    }
}

impl<T: ?Sized> Display for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl<T: ?Sized> Encode for Ref<T> {
    fn encode(&self) -> Result<Value, EncodeError> {
        Ok(Value::String(self.repr.clone()))
    }
}

impl<T: ?Sized> Decode for Ref<T> {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::String(repr) => Ok(Self::new(repr)),
            v => Err(DecodeError::mismatch("ref", &v)),
        }
    }
}
