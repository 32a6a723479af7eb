//! Dynamically typed keyword values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{PortError, Result};

/// Runtime value carried by SRI keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Char(i8),
    Octet(u8),
    Short(i16),
    UShort(u16),
    Long(i32),
    ULong(u32),
    LongLong(i64),
    ULongLong(u64),
    Float(f32),
    Double(f64),
    String(String),
    Sequence(Vec<Value>),
}

enum Number {
    Int(i128),
    Float(f64),
}

impl Value {
    /// Name of the variant's type, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Char(_) => "char",
            Value::Octet(_) => "octet",
            Value::Short(_) => "short",
            Value::UShort(_) => "ushort",
            Value::Long(_) => "long",
            Value::ULong(_) => "ulong",
            Value::LongLong(_) => "longlong",
            Value::ULongLong(_) => "ulonglong",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Sequence(_) => "sequence",
        }
    }

    fn number(&self, target: &'static str) -> Result<Number> {
        Ok(match self {
            Value::Bool(b) => Number::Int(i128::from(*b)),
            Value::Char(v) => Number::Int(i128::from(*v)),
            Value::Octet(v) => Number::Int(i128::from(*v)),
            Value::Short(v) => Number::Int(i128::from(*v)),
            Value::UShort(v) => Number::Int(i128::from(*v)),
            Value::Long(v) => Number::Int(i128::from(*v)),
            Value::ULong(v) => Number::Int(i128::from(*v)),
            Value::LongLong(v) => Number::Int(i128::from(*v)),
            Value::ULongLong(v) => Number::Int(i128::from(*v)),
            Value::Float(v) => Number::Float(f64::from(*v)),
            Value::Double(v) => Number::Float(*v),
            Value::String(text) => {
                let text = text.trim();
                if let Ok(int) = text.parse::<i128>() {
                    Number::Int(int)
                } else if let Ok(float) = text.parse::<f64>() {
                    Number::Float(float)
                } else {
                    return Err(PortError::Parse {
                        context: format!("{target} keyword value"),
                        details: format!("'{text}' is not a number"),
                    });
                }
            }
            Value::Sequence(_) => return Err(PortError::out_of_range(self, target)),
        })
    }
}

macro_rules! integer_conversion {
    ($($ty:ty => $name:literal),* $(,)?) => {$(
        impl TryFrom<&Value> for $ty {
            type Error = PortError;

            fn try_from(value: &Value) -> Result<$ty> {
                let int = match value.number($name)? {
                    Number::Int(int) => int,
                    Number::Float(float) if float.is_finite() => float.trunc() as i128,
                    Number::Float(_) => return Err(PortError::out_of_range(value, $name)),
                };
                <$ty>::try_from(int).map_err(|_| PortError::out_of_range(value, $name))
            }
        }
    )*};
}

integer_conversion! {
    i8 => "char",
    u8 => "octet",
    i16 => "short",
    u16 => "ushort",
    i32 => "long",
    u32 => "ulong",
    i64 => "longlong",
    u64 => "ulonglong",
}

impl TryFrom<&Value> for f32 {
    type Error = PortError;

    fn try_from(value: &Value) -> Result<f32> {
        match value.number("float")? {
            Number::Int(int) => Ok(int as f32),
            Number::Float(float) if float.is_finite() && float.abs() > f64::from(f32::MAX) => {
                Err(PortError::out_of_range(value, "float"))
            }
            Number::Float(float) => Ok(float as f32),
        }
    }
}

impl TryFrom<&Value> for f64 {
    type Error = PortError;

    fn try_from(value: &Value) -> Result<f64> {
        match value.number("double")? {
            Number::Int(int) => Ok(int as f64),
            Number::Float(float) => Ok(float),
        }
    }
}

impl TryFrom<&Value> for bool {
    type Error = PortError;

    fn try_from(value: &Value) -> Result<bool> {
        if let Value::String(text) = value {
            match text.trim() {
                "true" | "TRUE" | "True" => return Ok(true),
                "false" | "FALSE" | "False" => return Ok(false),
                _ => {}
            }
        }
        match value.number("boolean")? {
            Number::Int(int) => Ok(int != 0),
            Number::Float(float) => Ok(float != 0.0),
        }
    }
}

impl From<&Value> for String {
    fn from(value: &Value) -> String {
        match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::$variant(value)
            }
        }
    )*};
}

value_from! {
    bool => Bool,
    i8 => Char,
    u8 => Octet,
    i16 => Short,
    u16 => UShort,
    i32 => Long,
    u32 => ULong,
    i64 => LongLong,
    u64 => ULongLong,
    f32 => Float,
    f64 => Double,
    String => String,
    Vec<Value> => Sequence,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v}"),
            Value::Octet(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::UShort(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::ULong(v) => write!(f, "{v}"),
            Value::LongLong(v) => write!(f, "{v}"),
            Value::ULongLong(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Sequence(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}
