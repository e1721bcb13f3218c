//! Introspected state of a live table or view.
//!
//! Produced fresh by the dialect on every migration call and never cached:
//! a stale descriptor would produce a wrong diff.

use serde::{Deserialize, Serialize};

/// Whether a name refers to a table or a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Table,
    View,
}

impl ObjectKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
        }
    }
}

/// Snapshot of one table or view as the database reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub kind: ObjectKind,
    pub columns: Vec<LiveColumn>,
    pub uniques: Vec<LiveUnique>,
    pub indices: Vec<LiveIndex>,
    /// The stored query of a view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_sql: Option<String>,
}

impl TableDescriptor {
    /// A view with no column information.
    #[must_use]
    pub fn view(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ObjectKind::View,
            columns: Vec::new(),
            uniques: Vec::new(),
            indices: Vec::new(),
            view_sql: Some(sql.into()),
        }
    }

    /// Case-insensitive lookup by column name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&LiveColumn> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Unique groups from constraints and from unique indices.
    #[must_use]
    pub fn unique_groups(&self) -> Vec<UniqueSource<'_>> {
        self.uniques
            .iter()
            .map(UniqueSource::Constraint)
            .chain(
                self.indices
                    .iter()
                    .filter(|i| i.unique)
                    .map(UniqueSource::Index),
            )
            .collect()
    }
}

/// Where a live unique group comes from; decides how it is dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniqueSource<'a> {
    Constraint(&'a LiveUnique),
    Index(&'a LiveIndex),
}

impl UniqueSource<'_> {
    #[must_use]
    pub fn columns(&self) -> &[String] {
        match self {
            Self::Constraint(u) => &u.columns,
            Self::Index(i) => &i.columns,
        }
    }
}

/// A column as the database reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveColumn {
    pub name: String,
    /// The type text as stored, e.g. `VARCHAR(40)` or `character varying(40)`.
    pub raw_type: String,
    pub not_null: bool,
    pub primary_key: bool,
    pub autoincrement: bool,
    /// The default expression text as stored.
    pub default: Option<String>,
}

/// A unique constraint. Unnamed constraints come from column-level
/// `UNIQUE` in SQLite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveUnique {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// An index not backing a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveIndex {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_groups_include_unique_indices() {
        let t = TableDescriptor {
            name: String::from("t"),
            kind: ObjectKind::Table,
            columns: Vec::new(),
            uniques: vec![LiveUnique {
                name: None,
                columns: vec![String::from("a")],
            }],
            indices: vec![
                LiveIndex {
                    name: String::from("ix_t_b"),
                    columns: vec![String::from("b")],
                    unique: false,
                },
                LiveIndex {
                    name: String::from("ux_t_c"),
                    columns: vec![String::from("c")],
                    unique: true,
                },
            ],
            view_sql: None,
        };
        let groups: Vec<_> = t.unique_groups().iter().map(|g| g.columns().to_vec()).collect();
        assert_eq!(groups, vec![vec![String::from("a")], vec![String::from("c")]]);
    }

    #[test]
    fn test_descriptor_json_shape() {
        let view = TableDescriptor::view("v", "SELECT 1");
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["kind"], "view");
        assert_eq!(json["view_sql"], "SELECT 1");
    }
}
