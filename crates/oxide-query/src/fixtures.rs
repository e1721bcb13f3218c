//! Hand-written entities shared by unit tests.

use crate::entity::{ColumnDescriptor, Entity, EntityDescriptor};
use crate::error::ConversionError;
use crate::expr::Field;
use crate::types::SqlType;
use crate::value::{FromSqlValue, SqlValue, ToSqlValue};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    pub id: i64,
    pub integer: i64,
    pub single: f32,
    pub double: f64,
    pub string: String,
    pub note: Option<String>,
}

impl Sample {
    pub fn id() -> Field<Self, i64> {
        Field::new("id")
    }

    pub fn integer() -> Field<Self, i64> {
        Field::new("integer")
    }

    pub fn single() -> Field<Self, f32> {
        Field::new("single")
    }

    pub fn double() -> Field<Self, f64> {
        Field::new("double")
    }

    pub fn string() -> Field<Self, String> {
        Field::new("string")
    }

    pub fn note() -> Field<Self, Option<String>> {
        Field::new("note")
    }
}

impl Entity for Sample {
    fn describe() -> EntityDescriptor {
        EntityDescriptor::new("Sample", "sample")
            .column(
                ColumnDescriptor::new("id", "id", SqlType::BigInt)
                    .primary_key()
                    .autoincrement(),
            )
            .column(ColumnDescriptor::new("integer", "integer", SqlType::BigInt).not_null())
            .column(ColumnDescriptor::new("single", "single", SqlType::Real).not_null())
            .column(ColumnDescriptor::new("double", "double", SqlType::Double).not_null())
            .column(ColumnDescriptor::new("string", "string", SqlType::Text).not_null())
            .column(ColumnDescriptor::new("note", "note", SqlType::Text))
    }

    fn get(&self, property: &str) -> Option<SqlValue> {
        Some(match property {
            "id" => self.id.to_sql_value(),
            "integer" => self.integer.to_sql_value(),
            "single" => self.single.to_sql_value(),
            "double" => self.double.to_sql_value(),
            "string" => self.string.clone().to_sql_value(),
            "note" => self.note.clone().to_sql_value(),
            _ => return None,
        })
    }

    fn values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("id", self.id.to_sql_value()),
            ("integer", self.integer.to_sql_value()),
            ("single", self.single.to_sql_value()),
            ("double", self.double.to_sql_value()),
            ("string", self.string.clone().to_sql_value()),
            ("note", self.note.clone().to_sql_value()),
        ]
    }

    fn set(&mut self, property: &str, value: SqlValue) -> Result<bool, ConversionError> {
        match property {
            "id" => self.id = FromSqlValue::from_sql_value(value)?,
            "integer" => self.integer = FromSqlValue::from_sql_value(value)?,
            "single" => self.single = FromSqlValue::from_sql_value(value)?,
            "double" => self.double = FromSqlValue::from_sql_value(value)?,
            "string" => self.string = FromSqlValue::from_sql_value(value)?,
            "note" => self.note = FromSqlValue::from_sql_value(value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// Rows pointing at a [`Sample`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Other {
    pub id: i64,
    pub sample_id: i64,
    pub label: String,
}

impl Other {
    pub fn id() -> Field<Self, i64> {
        Field::new("id")
    }

    pub fn sample_id() -> Field<Self, i64> {
        Field::new("sample_id")
    }

    pub fn label() -> Field<Self, String> {
        Field::new("label")
    }
}

impl Entity for Other {
    fn describe() -> EntityDescriptor {
        EntityDescriptor::new("Other", "other")
            .column(
                ColumnDescriptor::new("id", "id", SqlType::BigInt)
                    .primary_key()
                    .autoincrement(),
            )
            .column(ColumnDescriptor::new("sample_id", "sample_id", SqlType::BigInt).not_null())
            .column(ColumnDescriptor::new("label", "label", SqlType::VarChar(40)).not_null())
            .unique(["sample_id", "label"])
            .index(["label"])
    }

    fn get(&self, property: &str) -> Option<SqlValue> {
        Some(match property {
            "id" => self.id.to_sql_value(),
            "sample_id" => self.sample_id.to_sql_value(),
            "label" => self.label.clone().to_sql_value(),
            _ => return None,
        })
    }

    fn values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("id", self.id.to_sql_value()),
            ("sample_id", self.sample_id.to_sql_value()),
            ("label", self.label.clone().to_sql_value()),
        ]
    }

    fn set(&mut self, property: &str, value: SqlValue) -> Result<bool, ConversionError> {
        match property {
            "id" => self.id = FromSqlValue::from_sql_value(value)?,
            "sample_id" => self.sample_id = FromSqlValue::from_sql_value(value)?,
            "label" => self.label = FromSqlValue::from_sql_value(value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}
