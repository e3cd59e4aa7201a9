use std::fmt;
use std::hash::{Hash, Hasher};

use crate::lexer;

/// Literal payload carried by a tree node, and the default value of a heap variable.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    /// Reference to a host type by its Udon name.
    Type(String),
}

impl Value {
    /// Udon name of the runtime type a literal of this kind has.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "SystemObject",
            Value::Bool(_) => "SystemBoolean",
            Value::I8(_) => "SystemSByte",
            Value::U8(_) => "SystemByte",
            Value::I16(_) => "SystemInt16",
            Value::U16(_) => "SystemUInt16",
            Value::I32(_) => "SystemInt32",
            Value::U32(_) => "SystemUInt32",
            Value::I64(_) => "SystemInt64",
            Value::U64(_) => "SystemUInt64",
            Value::F32(_) => "SystemSingle",
            Value::F64(_) => "SystemDouble",
            Value::String(_) => "SystemString",
            Value::Type(_) => "SystemType",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            _ => None,
        }
    }

    /// Interprets an integer literal as an absolute code address.
    pub fn as_address(&self) -> Option<u32> {
        match *self {
            Value::I8(v) => u32::try_from(v).ok(),
            Value::U8(v) => Some(u32::from(v)),
            Value::I16(v) => u32::try_from(v).ok(),
            Value::U16(v) => Some(u32::from(v)),
            Value::I32(v) => u32::try_from(v).ok(),
            Value::U32(v) => Some(v),
            Value::I64(v) => u32::try_from(v).ok(),
            Value::U64(v) => u32::try_from(v).ok(),
            _ => None,
        }
    }

    /// Zero value for the primitive type with the given Udon name.
    pub fn default_for(type_name: &str) -> Option<Value> {
        let value = match type_name {
            "SystemBoolean" => Value::Bool(false),
            "SystemSByte" => Value::I8(0),
            "SystemByte" => Value::U8(0),
            "SystemInt16" => Value::I16(0),
            "SystemUInt16" => Value::U16(0),
            "SystemInt32" => Value::I32(0),
            "SystemUInt32" => Value::U32(0),
            "SystemInt64" => Value::I64(0),
            "SystemUInt64" => Value::U64(0),
            "SystemSingle" => Value::F32(0.0),
            "SystemDouble" => Value::F64(0.0),
            _ => return None,
        };
        Some(value)
    }

    fn discriminant(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::I8(_) => 2,
            Value::U8(_) => 3,
            Value::I16(_) => 4,
            Value::U16(_) => 5,
            Value::I32(_) => 6,
            Value::U32(_) => 7,
            Value::I64(_) => 8,
            Value::U64(_) => 9,
            Value::F32(_) => 10,
            Value::F64(_) => 11,
            Value::String(_) => 12,
            Value::Type(_) => 13,
        }
    }
}

// Floats compare by bit pattern so every literal, NaN included, has exactly one constant slot.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::U8(a), Value::U8(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::U16(a), Value::U16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::U32(a), Value::U32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.discriminant().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::I8(v) => v.hash(state),
            Value::U8(v) => v.hash(state),
            Value::I16(v) => v.hash(state),
            Value::U16(v) => v.hash(state),
            Value::I32(v) => v.hash(state),
            Value::U32(v) => v.hash(state),
            Value::I64(v) => v.hash(state),
            Value::U64(v) => v.hash(state),
            Value::F32(v) => v.to_bits().hash(state),
            Value::F64(v) => v.to_bits().hash(state),
            Value::String(v) | Value::Type(v) => v.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I32(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::U32(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

/// Canonical source spelling: the printed token reparses to an equal value of the same kind.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("nil"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}sb"),
            Value::U8(v) => write!(f, "{v}b"),
            Value::I16(v) => write!(f, "{v}s"),
            Value::U16(v) => write!(f, "{v}us"),
            Value::I32(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}u"),
            Value::I64(v) => write!(f, "{v}l"),
            Value::U64(v) => write!(f, "{v}ul"),
            Value::F32(v) if v.is_nan() => f.write_str("nanf"),
            Value::F32(v) if v.is_infinite() => {
                f.write_str(if *v > 0.0 { "infinityf" } else { "-infinityf" })
            }
            Value::F32(v) => write!(f, "{v:?}f"),
            Value::F64(v) if v.is_nan() => f.write_str("nan"),
            Value::F64(v) if v.is_infinite() => {
                f.write_str(if *v > 0.0 { "infinity" } else { "-infinity" })
            }
            Value::F64(v) => write!(f, "{v:?}"),
            Value::String(text) | Value::Type(text) => f.write_str(&lexer::quote_if_needed(text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn nan_literals_share_one_slot() {
        let mut set = HashSet::new();
        set.insert(Value::F64(f64::NAN));
        set.insert(Value::F64(f64::NAN));
        set.insert(Value::F32(f32::NAN));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn same_number_different_width_is_distinct() {
        assert_ne!(Value::I32(1), Value::U32(1));
        assert_ne!(Value::F32(1.0), Value::F64(1.0));
    }

    #[test]
    fn displays_with_width_suffixes() {
        assert_eq!(Value::U8(7).to_string(), "7b");
        assert_eq!(Value::I8(-7).to_string(), "-7sb");
        assert_eq!(Value::I16(3).to_string(), "3s");
        assert_eq!(Value::U16(3).to_string(), "3us");
        assert_eq!(Value::U64(10).to_string(), "10ul");
        assert_eq!(Value::F64(1.0).to_string(), "1.0");
        assert_eq!(Value::F32(2.5).to_string(), "2.5f");
        assert_eq!(Value::F32(f32::NEG_INFINITY).to_string(), "-infinityf");
    }

    #[test]
    fn addresses_reject_negative_values() {
        assert_eq!(Value::I32(16).as_address(), Some(16));
        assert_eq!(Value::I32(-1).as_address(), None);
        assert_eq!(Value::String("16".into()).as_address(), None);
    }
}
