use std::fmt::Write;
use time::PrimitiveDateTime;

/// Runtime value of an attribute, both in memory and on its way to or from
/// storage. Every variant carries `Option` so an empty cell still knows its
/// type.
#[derive(Default, Debug, Clone, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    Int32(Option<i32>),
    UInt32(Option<u32>),
    Int64(Option<i64>),
    Text(Option<String>),
    Blob(Option<Box<[u8]>>),
    DateTime(Option<PrimitiveDateTime>),
    Json(Option<serde_json::Value>),
}

impl Value {
    /// True for `Null` and for any typed variant holding no value.
    pub fn is_none(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => v.is_none(),
            Value::Int32(v) => v.is_none(),
            Value::UInt32(v) => v.is_none(),
            Value::Int64(v) => v.is_none(),
            Value::Text(v) => v.is_none(),
            Value::Blob(v) => v.is_none(),
            Value::DateTime(v) => v.is_none(),
            Value::Json(v) => v.is_none(),
        }
    }

    pub fn same_type(&self, other: &Self) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }

    /// Canonical text form used for loose comparisons and for grouping
    /// fetched rows by key, so `Int32(1)`, `Int64(1)` and `Text("1")` all
    /// relate to the same key.
    pub fn literal(&self) -> String {
        let mut out = String::new();
        match self {
            Value::Null => out.push_str("NULL"),
            Value::Boolean(Some(v)) => out.push_str(if *v { "true" } else { "false" }),
            Value::Int32(Some(v)) => out.push_str(itoa::Buffer::new().format(*v)),
            Value::UInt32(Some(v)) => out.push_str(itoa::Buffer::new().format(*v)),
            Value::Int64(Some(v)) => out.push_str(itoa::Buffer::new().format(*v)),
            Value::Text(Some(v)) => out.push_str(v),
            Value::Blob(Some(v)) => out.push_str(&hex::encode(v)),
            Value::DateTime(Some(v)) => {
                let _ = write!(
                    out,
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    v.year(),
                    v.month() as u8,
                    v.day(),
                    v.hour(),
                    v.minute(),
                    v.second()
                );
            }
            Value::Json(Some(v)) => out.push_str(&v.to_string()),
            _ => out.push_str("NULL"),
        }
        out
    }

    /// Loose equality across numeric widths and their textual forms.
    pub fn loose_eq(&self, other: &Self) -> bool {
        self == other || (!self.is_none() && !other.is_none() && self.literal() == other.literal())
    }
}

pub trait AsValue {
    fn as_empty_value() -> Value;
    fn as_value(self) -> Value;
}

macro_rules! impl_as_value {
    ($source:ty, $into:path) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $into(None)
            }
            fn as_value(self) -> Value {
                $into(Some(self))
            }
        }
    };
}

impl_as_value!(bool, Value::Boolean);
impl_as_value!(i32, Value::Int32);
impl_as_value!(u32, Value::UInt32);
impl_as_value!(i64, Value::Int64);
impl_as_value!(String, Value::Text);
impl_as_value!(Box<[u8]>, Value::Blob);
impl_as_value!(PrimitiveDateTime, Value::DateTime);
impl_as_value!(serde_json::Value, Value::Json);

impl AsValue for &str {
    fn as_empty_value() -> Value {
        Value::Text(None)
    }
    fn as_value(self) -> Value {
        Value::Text(Some(self.to_owned()))
    }
}

impl<T: AsValue> AsValue for Option<T> {
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => T::as_empty_value(),
        }
    }
}

impl<T: AsValue> From<T> for Value {
    fn from(value: T) -> Self {
        value.as_value()
    }
}
