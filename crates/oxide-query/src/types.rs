//! Declared column types and the mapping from Rust types onto them.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::value::SqlValue;

/// Dialect-neutral column type. Each dialect renders it to a type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    /// Single-precision float.
    Real,
    /// Double-precision float.
    Double,
    Text,
    /// Length-bounded text.
    VarChar(u32),
    Blob,
    Date,
    DateTime,
}

impl SqlType {
    /// The value written into a new NOT NULL column that has no default.
    #[must_use]
    pub fn zero_value(self) -> SqlValue {
        match self {
            Self::Boolean => SqlValue::Bool(false),
            Self::SmallInt | Self::Integer | Self::BigInt => SqlValue::Int(0),
            Self::Real | Self::Double => SqlValue::Float(0.0),
            Self::Text | Self::VarChar(_) => SqlValue::Text(String::new()),
            Self::Blob => SqlValue::Blob(Vec::new()),
            Self::Date => SqlValue::Text(String::from("1970-01-01")),
            Self::DateTime => SqlValue::Text(String::from("1970-01-01 00:00:00")),
        }
    }
}

/// Maps a Rust type onto its declared SQL type.
///
/// `Option<T>` unwraps to `T`'s type and marks the column nullable.
pub trait SqlTyped {
    const SQL_TYPE: SqlType;
    const NULLABLE: bool = false;
}

macro_rules! impl_sql_typed {
    ($($ty:ty => $sql:expr),* $(,)?) => {
        $(
            impl SqlTyped for $ty {
                const SQL_TYPE: SqlType = $sql;
            }
        )*
    };
}

impl_sql_typed! {
    bool => SqlType::Boolean,
    i8 => SqlType::SmallInt,
    i16 => SqlType::SmallInt,
    u8 => SqlType::SmallInt,
    i32 => SqlType::Integer,
    u16 => SqlType::Integer,
    i64 => SqlType::BigInt,
    u32 => SqlType::BigInt,
    f32 => SqlType::Real,
    f64 => SqlType::Double,
    String => SqlType::Text,
    Vec<u8> => SqlType::Blob,
    NaiveDate => SqlType::Date,
    NaiveDateTime => SqlType::DateTime,
    DateTime<Utc> => SqlType::DateTime,
}

impl<T: SqlTyped> SqlTyped for Option<T> {
    const SQL_TYPE: SqlType = T::SQL_TYPE;
    const NULLABLE: bool = true;
}
