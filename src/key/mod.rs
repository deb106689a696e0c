//! Cache keys - canonical identity values for cached rows.
//!
//! A [`Key`] is built from raw column values by [`KeyFactory`]. Keys are
//! value-typed: two keys built from structurally equal inputs compare equal
//! and hash identically, whatever allocations the inputs came from.
//!
//! - **Primitive keys** wrap a single bool, integer or text value.
//! - **Byte keys** compare and hash by content, never by reference.
//! - **Composite keys** wrap an ordered list of sub-keys; order matters.

mod factory;

pub use factory::KeyFactory;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// Identity of one cached row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Text(Arc<str>),
    /// Content-keyed byte sequence.
    Bytes(Bytes),
    /// Ordered list of sub-keys for multi-column primary keys.
    Composite(Arc<[Key]>),
}

impl Key {
    /// Build a composite key from already-canonical sub-keys.
    pub fn composite<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Key>,
    {
        Key::Composite(parts.into_iter().collect())
    }

    /// Sub-keys of a composite key, or `None` for a single-value key.
    pub fn parts(&self) -> Option<&[Key]> {
        match self {
            Key::Composite(parts) => Some(parts),
            _ => None,
        }
    }

    /// Check if this is a composite key.
    pub fn is_composite(&self) -> bool {
        matches!(self, Key::Composite(_))
    }

    /// Approximate memory footprint in bytes.
    pub fn approximate_size(&self) -> usize {
        let inline = std::mem::size_of::<Key>();
        match self {
            Key::Text(s) => inline + s.len(),
            Key::Bytes(b) => inline + b.len(),
            Key::Composite(parts) => {
                inline + parts.iter().map(Key::approximate_size).sum::<usize>()
            }
            _ => inline,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(v) => write!(f, "{}", v),
            Key::I8(v) => write!(f, "{}", v),
            Key::I16(v) => write!(f, "{}", v),
            Key::I32(v) => write!(f, "{}", v),
            Key::I64(v) => write!(f, "{}", v),
            Key::U8(v) => write!(f, "{}", v),
            Key::U16(v) => write!(f, "{}", v),
            Key::U32(v) => write!(f, "{}", v),
            Key::U64(v) => write!(f, "{}", v),
            Key::Text(v) => write!(f, "'{}'", v),
            Key::Bytes(v) => {
                write!(f, "0x")?;
                for b in v.iter() {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Key::Composite(parts) => {
                write!(f, "(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", part)?;
                }
                write!(f, ")")
            }
        }
    }
}

macro_rules! impl_key_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Key {
                fn from(v: $ty) -> Self {
                    Key::$variant(v)
                }
            }
        )*
    };
}

impl_key_from! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    Bytes => Bytes,
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Text(Arc::from(v))
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Text(Arc::from(v))
    }
}

impl From<&[u8]> for Key {
    fn from(v: &[u8]) -> Self {
        Key::Bytes(Bytes::copy_from_slice(v))
    }
}

impl From<Vec<u8>> for Key {
    fn from(v: Vec<u8>) -> Self {
        Key::Bytes(Bytes::from(v))
    }
}
