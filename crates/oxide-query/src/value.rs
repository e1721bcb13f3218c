//! SQL values, conversions into them, and coercions out of them.
//!
//! Values flow in two directions: [`ToSqlValue`] turns host values into
//! parameters, and [`FromSqlValue`] turns column values read back from a
//! row into host values, applying the widening and null-substitution rules
//! used by row materialization.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::ConversionError;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A SQL value that can be used as a parameter or read back from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary blob value.
    Blob(Vec<u8>),
    /// A sequence bound as a single array parameter.
    Array(Vec<SqlValue>),
}

impl SqlValue {
    /// Builds an array value from any iterator of convertible items.
    pub fn array<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToSqlValue,
    {
        Self::Array(items.into_iter().map(ToSqlValue::to_sql_value).collect())
    }

    /// Returns true for [`SqlValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true for [`SqlValue::Array`].
    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Array(_) => "array",
        }
    }

    /// Returns the SQL representation for inline use (escaped).
    ///
    /// **Warning**: Prefer using parameterized queries instead. Inline
    /// rendering is only used where the database cannot accept parameters,
    /// such as view bodies and column defaults.
    #[must_use]
    pub fn to_sql_inline(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Bool(b) => {
                if *b {
                    String::from("TRUE")
                } else {
                    String::from("FALSE")
                }
            }
            Self::Int(n) => format!("{n}"),
            Self::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    format!("{f}")
                }
            }
            Self::Text(s) => {
                // Escape single quotes by doubling them
                let escaped = s.replace('\'', "''");
                format!("'{escaped}'")
            }
            Self::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
            Self::Array(items) => {
                let inner: Vec<String> = items.iter().map(Self::to_sql_inline).collect();
                format!("({})", inner.join(", "))
            }
        }
    }
}

/// Trait for types that can be converted to SQL values.
pub trait ToSqlValue {
    /// Converts the value to a `SqlValue`.
    fn to_sql_value(self) -> SqlValue;
}

impl ToSqlValue for SqlValue {
    fn to_sql_value(self) -> SqlValue {
        self
    }
}

impl ToSqlValue for bool {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Bool(self)
    }
}

macro_rules! impl_to_sql_int {
    ($($ty:ty),*) => {
        $(
            impl ToSqlValue for $ty {
                fn to_sql_value(self) -> SqlValue {
                    SqlValue::Int(i64::from(self))
                }
            }
        )*
    };
}

impl_to_sql_int!(i8, i16, i32, i64, u8, u16, u32);

impl ToSqlValue for f32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(f64::from(self))
    }
}

impl ToSqlValue for f64 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(self)
    }
}

impl ToSqlValue for String {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self)
    }
}

impl ToSqlValue for &str {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(String::from(self))
    }
}

impl<T: ToSqlValue> ToSqlValue for Option<T> {
    fn to_sql_value(self) -> SqlValue {
        self.map_or(SqlValue::Null, ToSqlValue::to_sql_value)
    }
}

impl ToSqlValue for Vec<u8> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self)
    }
}

impl ToSqlValue for &[u8] {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self.to_vec())
    }
}

impl ToSqlValue for NaiveDate {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self.format(DATE_FORMAT).to_string())
    }
}

impl ToSqlValue for NaiveDateTime {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self.format(DATETIME_FORMAT).to_string())
    }
}

impl ToSqlValue for DateTime<Utc> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self.naive_utc().format(DATETIME_FORMAT).to_string())
    }
}

/// Trait for types that can be read back from a column value.
///
/// Implementations coerce rather than reject where the conversion is
/// lossless: integers widen into floats, booleans read from 0/1 integers,
/// and `NULL` becomes the type's default for non-optional targets.
pub trait FromSqlValue: Sized {
    /// Converts a column value into `Self`.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] when the value cannot represent `Self`.
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError>;
}

impl FromSqlValue for SqlValue {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Null => Ok(0),
            SqlValue::Int(n) => Ok(n),
            SqlValue::Bool(b) => Ok(Self::from(b)),
            #[allow(clippy::cast_possible_truncation)]
            SqlValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(f as Self),
            SqlValue::Text(ref s) => s
                .trim()
                .parse()
                .map_err(|_| ConversionError::new("integer", &value)),
            other => Err(ConversionError::new("integer", &other)),
        }
    }
}

macro_rules! impl_from_sql_narrow_int {
    ($($ty:ty),*) => {
        $(
            impl FromSqlValue for $ty {
                fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
                    let kind = value.kind();
                    let wide = i64::from_sql_value(value)?;
                    <$ty>::try_from(wide).map_err(|_| ConversionError {
                        expected: stringify!($ty),
                        found: kind,
                        column: None,
                    })
                }
            }
        )*
    };
}

impl_from_sql_narrow_int!(i8, i16, i32, u8, u16, u32);

impl FromSqlValue for f64 {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Null => Ok(0.0),
            SqlValue::Float(f) => Ok(f),
            #[allow(clippy::cast_precision_loss)]
            SqlValue::Int(n) => Ok(n as Self),
            SqlValue::Text(ref s) => s
                .trim()
                .parse()
                .map_err(|_| ConversionError::new("float", &value)),
            other => Err(ConversionError::new("float", &other)),
        }
    }
}

impl FromSqlValue for f32 {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        #[allow(clippy::cast_possible_truncation)]
        f64::from_sql_value(value).map(|f| f as Self)
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Null => Ok(false),
            SqlValue::Bool(b) => Ok(b),
            SqlValue::Int(n) => Ok(n != 0),
            other => Err(ConversionError::new("bool", &other)),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Null => Ok(Self::new()),
            SqlValue::Text(s) => Ok(s),
            SqlValue::Int(n) => Ok(n.to_string()),
            SqlValue::Float(f) => Ok(f.to_string()),
            SqlValue::Bool(b) => Ok(b.to_string()),
            other => Err(ConversionError::new("text", &other)),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Null => Ok(Self::new()),
            SqlValue::Blob(b) => Ok(b),
            SqlValue::Text(s) => Ok(s.into_bytes()),
            other => Err(ConversionError::new("blob", &other)),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

impl FromSqlValue for NaiveDate {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Null => Ok(Self::default()),
            SqlValue::Text(ref s) => {
                let date_part = s.get(..10).unwrap_or(s);
                Self::parse_from_str(date_part, DATE_FORMAT)
                    .map_err(|_| ConversionError::new("date", &value))
            }
            other => Err(ConversionError::new("date", &other)),
        }
    }
}

impl FromSqlValue for NaiveDateTime {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Null => Ok(Self::default()),
            SqlValue::Text(ref s) => parse_datetime(s)
                .ok_or_else(|| ConversionError::new("datetime", &value)),
            SqlValue::Int(secs) => DateTime::from_timestamp(secs, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| ConversionError::new("datetime", &value)),
            other => Err(ConversionError::new("datetime", &other)),
        }
    }
}

impl FromSqlValue for DateTime<Utc> {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        NaiveDateTime::from_sql_value(value).map(|naive| naive.and_utc())
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// Implements value conversions for a fieldless enum stored by ordinal.
///
/// `NULL` reads back as the first listed variant.
///
/// ```
/// use oxide_query::sql_enum;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Default)]
/// enum Status { #[default] Draft, Published }
///
/// sql_enum!(Status { Status::Draft = 0, Status::Published = 1 });
/// ```
#[macro_export]
macro_rules! sql_enum {
    ($ty:ty { $first:path = $first_ord:expr $(, $variant:path = $ord:expr)* $(,)? }) => {
        impl $crate::ToSqlValue for $ty {
            fn to_sql_value(self) -> $crate::SqlValue {
                match self {
                    $first => $crate::SqlValue::Int($first_ord),
                    $($variant => $crate::SqlValue::Int($ord),)*
                }
            }
        }

        impl $crate::FromSqlValue for $ty {
            fn from_sql_value(
                value: $crate::SqlValue,
            ) -> ::std::result::Result<Self, $crate::ConversionError> {
                match value {
                    $crate::SqlValue::Null => Ok($first),
                    $crate::SqlValue::Int(n) if n == $first_ord => Ok($first),
                    $($crate::SqlValue::Int(n) if n == $ord => Ok($variant),)*
                    other => Err($crate::ConversionError::new(stringify!($ty), &other)),
                }
            }
        }

        impl $crate::SqlTyped for $ty {
            const SQL_TYPE: $crate::SqlType = $crate::SqlType::Integer;
        }
    };
}
