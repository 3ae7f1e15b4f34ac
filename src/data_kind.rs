use crate::{Error, MarrowError, Result, Value};
use anyhow::Context;
use std::fmt::Write;
use time::{PrimitiveDateTime, macros::format_description};

/// Abstract data kind of an attribute, mapping a declared property to its
/// native representation and to the SQL column type it renders as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataKind {
    Text,
    Varchar(u32),
    Integer { width: Option<u8>, unsigned: bool },
    BigInt,
    Boolean,
    DateTime,
    Binary,
    Json,
    /// Computed at read time, never persisted nor selected.
    Virtual,
}

impl DataKind {
    pub const DEFAULT_VARCHAR_WIDTH: u32 = 255;

    pub fn varchar() -> Self {
        DataKind::Varchar(Self::DEFAULT_VARCHAR_WIDTH)
    }

    pub fn integer() -> Self {
        DataKind::Integer {
            width: None,
            unsigned: false,
        }
    }

    /// Parses a declared type name, e.g. `VARCHAR(64)` or
    /// `INTEGER(2) UNSIGNED`. Unknown names fail here, at registration
    /// time, so configuration mistakes surface immediately.
    pub fn parse(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_uppercase();
        let (base, rest) = match normalized.find('(') {
            Some(i) => (&normalized[..i], &normalized[i..]),
            None => (normalized.as_str(), ""),
        };
        let width = |rest: &str| -> Result<Option<u32>> {
            let Some(inner) = rest
                .trim_start()
                .strip_prefix('(')
                .and_then(|v| v.split(')').next())
            else {
                return Ok(None);
            };
            Ok(Some(inner.trim().parse().with_context(|| {
                format!("Invalid type parameter in `{name}`")
            })?))
        };
        Ok(match base {
            "TEXT" => DataKind::Text,
            "VARCHAR" | "STRING" => {
                DataKind::Varchar(width(rest)?.unwrap_or(Self::DEFAULT_VARCHAR_WIDTH))
            }
            "INTEGER" | "INT" => {
                let unsigned = normalized.ends_with("UNSIGNED");
                DataKind::Integer {
                    width: width(rest)?.map(|v| v as u8),
                    unsigned,
                }
            }
            "BIGINT" => DataKind::BigInt,
            "BOOLEAN" | "TINYINT" => DataKind::Boolean,
            "DATETIME" => DataKind::DateTime,
            "BLOB" | "BINARY" => DataKind::Binary,
            "JSON" => DataKind::Json,
            "VIRTUAL" => DataKind::Virtual,
            _ => return Err(Error::msg(format!("Unknown data kind `{name}`"))),
        })
    }

    /// Canonical SQL column type. Virtual attributes never reach DDL, so
    /// asking for their rendering is a configuration error.
    pub fn render(&self) -> Result<String> {
        let mut out = String::with_capacity(12);
        match self {
            DataKind::Text => out.push_str("TEXT"),
            DataKind::Varchar(width) => {
                let _ = write!(out, "VARCHAR({width})");
            }
            DataKind::Integer { width, unsigned } => {
                out.push_str("INTEGER");
                if let Some(width) = width {
                    let _ = write!(out, "({width})");
                }
                if *unsigned {
                    out.push_str(" UNSIGNED");
                }
            }
            DataKind::BigInt => out.push_str("BIGINT"),
            DataKind::Boolean => out.push_str("TINYINT(1)"),
            DataKind::DateTime => out.push_str("DATETIME"),
            DataKind::Binary => out.push_str("BLOB"),
            DataKind::Json => out.push_str("JSON"),
            DataKind::Virtual => {
                return Err(Error::msg(
                    "Virtual attributes have no column type to render",
                ));
            }
        }
        Ok(out)
    }

    /// The empty cell of this kind's native representation.
    pub fn empty_value(&self) -> Value {
        match self {
            DataKind::Text | DataKind::Varchar(..) => Value::Text(None),
            DataKind::Integer { unsigned: true, .. } => Value::UInt32(None),
            DataKind::Integer { .. } => Value::Int32(None),
            DataKind::BigInt => Value::Int64(None),
            DataKind::Boolean => Value::Boolean(None),
            DataKind::DateTime => Value::DateTime(None),
            DataKind::Binary => Value::Blob(None),
            DataKind::Json => Value::Json(None),
            DataKind::Virtual => Value::Null,
        }
    }

    /// Converts a stored or input value into this kind's native
    /// representation. Total and deterministic over the kind set: either
    /// the conversion is defined or it is a coercion error, never a silent
    /// pass-through of a mistyped value.
    pub fn coerce(&self, attribute: &str, value: Value) -> Result<Value> {
        if value.is_none() {
            return Ok(self.empty_value());
        }
        let reject = |value: &Value| {
            Err(MarrowError::coercion(
                attribute,
                format!("{self:?}"),
                value.literal(),
            ))
        };
        Ok(match self {
            DataKind::Text | DataKind::Varchar(..) => match value {
                Value::Text(v) => Value::Text(v),
                Value::Int32(Some(v)) => Value::Text(Some(itoa::Buffer::new().format(v).into())),
                Value::UInt32(Some(v)) => Value::Text(Some(itoa::Buffer::new().format(v).into())),
                Value::Int64(Some(v)) => Value::Text(Some(itoa::Buffer::new().format(v).into())),
                v => return reject(&v),
            },
            DataKind::Integer { unsigned, .. } => match value {
                Value::Int32(v) if !*unsigned => Value::Int32(v),
                Value::UInt32(v) if *unsigned => Value::UInt32(v),
                Value::Int32(Some(v)) => match u32::try_from(v) {
                    Ok(v) => Value::UInt32(Some(v)),
                    Err(..) => return reject(&Value::Int32(Some(v))),
                },
                Value::UInt32(Some(v)) => match i32::try_from(v) {
                    Ok(v) => Value::Int32(Some(v)),
                    Err(..) => return reject(&Value::UInt32(Some(v))),
                },
                Value::Int64(Some(v)) => match i32::try_from(v) {
                    Ok(v) if !*unsigned => Value::Int32(Some(v)),
                    _ => match u32::try_from(v) {
                        Ok(v) if *unsigned => Value::UInt32(Some(v)),
                        _ => return reject(&Value::Int64(Some(v))),
                    },
                },
                Value::Boolean(Some(v)) => Value::Int32(Some(v as i32)),
                Value::Text(Some(v)) => match atoi::atoi::<i64>(v.as_bytes()) {
                    Some(parsed) if parsed.to_string() == v.trim() => {
                        return self.coerce(attribute, Value::Int64(Some(parsed)));
                    }
                    _ => return reject(&Value::Text(Some(v))),
                },
                v => return reject(&v),
            },
            DataKind::BigInt => match value {
                Value::Int64(v) => Value::Int64(v),
                Value::Int32(Some(v)) => Value::Int64(Some(v as i64)),
                Value::UInt32(Some(v)) => Value::Int64(Some(v as i64)),
                Value::Text(Some(v)) => match atoi::atoi::<i64>(v.as_bytes()) {
                    Some(parsed) if parsed.to_string() == v.trim() => Value::Int64(Some(parsed)),
                    _ => return reject(&Value::Text(Some(v))),
                },
                v => return reject(&v),
            },
            DataKind::Boolean => match value {
                Value::Boolean(v) => Value::Boolean(v),
                Value::Int32(Some(v)) => Value::Boolean(Some(v != 0)),
                Value::Int64(Some(v)) => Value::Boolean(Some(v != 0)),
                Value::Text(Some(v)) => match v.as_str() {
                    "1" | "true" | "TRUE" => Value::Boolean(Some(true)),
                    "0" | "false" | "FALSE" => Value::Boolean(Some(false)),
                    _ => return reject(&Value::Text(Some(v))),
                },
                v => return reject(&v),
            },
            DataKind::DateTime => match value {
                Value::DateTime(v) => Value::DateTime(v),
                Value::Text(Some(v)) => Value::DateTime(Some(parse_datetime(attribute, &v)?)),
                v => return reject(&v),
            },
            DataKind::Binary => match value {
                Value::Blob(v) => Value::Blob(v),
                Value::Text(Some(v)) => Value::Blob(Some(v.into_bytes().into())),
                v => return reject(&v),
            },
            DataKind::Json => match value {
                Value::Json(v) => Value::Json(v),
                Value::Text(Some(v)) => match serde_json::from_str(&v) {
                    Ok(parsed) => Value::Json(Some(parsed)),
                    Err(..) => return reject(&Value::Text(Some(v))),
                },
                v => return reject(&v),
            },
            // Virtual values only live in memory, whatever shape the getter
            // or setter gave them.
            DataKind::Virtual => value,
        })
    }
}

fn parse_datetime(attribute: &str, value: &str) -> Result<PrimitiveDateTime> {
    PrimitiveDateTime::parse(
        value,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .or(PrimitiveDateTime::parse(
        value,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ))
    .or(PrimitiveDateTime::parse(
        value,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    ))
    .map_err(|_| {
        MarrowError::coercion(attribute, "DateTime", value).context("Cannot parse datetime")
    })
}
