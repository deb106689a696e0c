//! KeyFactory - builds canonical keys from column values.

use crate::value::Value;
use crate::{Error, Result};

use super::Key;

/// Builds [`Key`]s from raw column values.
///
/// Enums are reduced to their underlying integer, byte sequences become
/// content-keyed, and every other supported shape becomes a primitive key.
/// Shapes without a sound equality (NULL, floats) are rejected instead of
/// falling back to some weaker notion of identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyFactory;

impl KeyFactory {
    /// Build a key from a single value.
    pub fn from_value(value: &Value) -> Result<Key> {
        let key = match value {
            Value::Bool(v) => Key::Bool(*v),
            Value::I8(v) => Key::I8(*v),
            Value::I16(v) => Key::I16(*v),
            Value::I32(v) => Key::I32(*v),
            Value::I64(v) => Key::I64(*v),
            Value::U8(v) => Key::U8(*v),
            Value::U16(v) => Key::U16(*v),
            Value::U32(v) => Key::U32(*v),
            Value::U64(v) => Key::U64(*v),
            Value::Text(v) => Key::Text(v.clone()),
            Value::Bytes(v) => Key::Bytes(v.clone()),
            Value::Enum { name, repr } => {
                if !repr.is_integer() {
                    return Err(Error::unsupported_key(format!(
                        "enum {} has non-integer representation ({})",
                        name,
                        repr.shape()
                    )));
                }
                Self::from_value(repr)?
            }
            Value::Null => {
                return Err(Error::unsupported_key("null cannot identify a row"));
            }
            Value::Float(v) => {
                return Err(Error::unsupported_key(format!(
                    "float {} has no exact equality",
                    v
                )));
            }
        };
        Ok(key)
    }

    /// Build a key from one or more values.
    ///
    /// A single value yields the same key as [`KeyFactory::from_value`];
    /// several values yield a composite key in the given order.
    pub fn from_values(values: &[Value]) -> Result<Key> {
        match values {
            [] => Err(Error::EmptyKey),
            [single] => Self::from_value(single),
            many => {
                let parts = many
                    .iter()
                    .map(Self::from_value)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Key::composite(parts))
            }
        }
    }
}
