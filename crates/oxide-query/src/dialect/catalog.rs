//! Assembly of live descriptors from information-schema style rows.
//!
//! Server dialects introspect with one query returning rows shaped
//! `(kind, name, detail, flag, extra, position)`:
//!
//! | kind      | name             | detail       | flag                   | extra   |
//! |-----------|------------------|--------------|------------------------|---------|
//! | `column`  | column name      | raw type     | 1 = not null, 2 = auto | default |
//! | `primary` | constraint name  | column name  |                        |         |
//! | `unique`  | constraint name  | column name  |                        |         |
//! | `index`   | index name       | column name  | 1 = unique             |         |
//! | `view`    | view name        | definition   |                        |         |
//!
//! `position` orders columns and the members of multi-column groups.

use std::collections::BTreeMap;

use super::{int_at, text_at};
use crate::error::MigrationError;
use crate::migrate::parse::view_body;
use crate::migrate::{LiveColumn, LiveIndex, LiveUnique, ObjectKind, TableDescriptor};
use crate::row::Row;

const NOT_NULL: i64 = 1;
const AUTOINCREMENT: i64 = 2;

pub(crate) fn assemble(table: &str, rows: &[Row]) -> Result<Option<TableDescriptor>, MigrationError> {
    let mut columns: Vec<(i64, LiveColumn)> = Vec::new();
    let mut primary: Vec<(i64, String)> = Vec::new();
    let mut uniques: BTreeMap<String, Vec<(i64, String)>> = BTreeMap::new();
    let mut indices: BTreeMap<String, (bool, Vec<(i64, String)>)> = BTreeMap::new();
    let mut view: Option<String> = None;

    for row in rows {
        let kind = text_at(row, "kind").unwrap_or_default();
        let name = text_at(row, "name").unwrap_or_default();
        let detail = text_at(row, "detail").unwrap_or_default();
        let flag = int_at(row, "flag");
        let position = int_at(row, "position");
        match kind.as_str() {
            "column" => {
                let autoincrement = flag & AUTOINCREMENT != 0;
                columns.push((
                    position,
                    LiveColumn {
                        name,
                        raw_type: detail,
                        not_null: flag & NOT_NULL != 0,
                        primary_key: false,
                        autoincrement,
                        // Sequence defaults are how autoincrement is stored.
                        default: if autoincrement {
                            None
                        } else {
                            text_at(row, "extra")
                        },
                    },
                ));
            }
            "primary" => primary.push((position, detail)),
            "unique" => uniques.entry(name).or_default().push((position, detail)),
            "index" => {
                let entry = indices.entry(name).or_default();
                entry.0 = flag != 0;
                entry.1.push((position, detail));
            }
            "view" => view = Some(detail),
            other => {
                return Err(MigrationError::Unparseable {
                    table: table.to_string(),
                    detail: format!("unexpected catalog row kind `{other}`"),
                });
            }
        }
    }

    if let Some(definition) = view {
        let body = if definition
            .trim_start()
            .get(..6)
            .is_some_and(|head| head.eq_ignore_ascii_case("CREATE"))
        {
            view_body(&definition).map_err(|e| MigrationError::Unparseable {
                table: table.to_string(),
                detail: e.to_string(),
            })?
        } else {
            definition.trim().trim_end_matches(';').trim().to_string()
        };
        return Ok(Some(TableDescriptor::view(table.to_string(), body)));
    }
    if columns.is_empty() {
        return Ok(None);
    }

    columns.sort_by_key(|(position, _)| *position);
    let mut columns: Vec<LiveColumn> = columns.into_iter().map(|(_, c)| c).collect();
    for (_, key) in &primary {
        if let Some(column) = columns.iter_mut().find(|c| c.name.eq_ignore_ascii_case(key)) {
            column.primary_key = true;
        }
    }

    Ok(Some(TableDescriptor {
        name: table.to_string(),
        kind: ObjectKind::Table,
        columns,
        uniques: uniques
            .into_iter()
            .map(|(name, members)| LiveUnique {
                name: Some(name),
                columns: ordered(members),
            })
            .collect(),
        indices: indices
            .into_iter()
            .map(|(name, (unique, members))| LiveIndex {
                name,
                columns: ordered(members),
                unique,
            })
            .collect(),
        view_sql: None,
    }))
}

fn ordered(mut members: Vec<(i64, String)>) -> Vec<String> {
    members.sort_by_key(|(position, _)| *position);
    members.into_iter().map(|(_, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::value::SqlValue;

    fn row(kind: &str, name: &str, detail: &str, flag: i64, extra: Option<&str>, position: i64) -> Row {
        Row::new(
            Arc::from(
                ["kind", "name", "detail", "flag", "extra", "position"]
                    .map(String::from)
                    .to_vec(),
            ),
            vec![
                SqlValue::Text(kind.to_string()),
                SqlValue::Text(name.to_string()),
                SqlValue::Text(detail.to_string()),
                SqlValue::Int(flag),
                extra.map_or(SqlValue::Null, |e| SqlValue::Text(e.to_string())),
                SqlValue::Int(position),
            ],
        )
    }

    #[test]
    fn test_assemble_table() {
        let rows = vec![
            row("column", "name", "text", 1, None, 2),
            row("column", "id", "bigint", 3, Some("nextval('t_id_seq'::regclass)"), 1),
            row("primary", "t_pkey", "id", 0, None, 1),
            row("unique", "uq_t_a_b", "b", 0, None, 2),
            row("unique", "uq_t_a_b", "a", 0, None, 1),
            row("index", "ix_t_name", "name", 0, None, 1),
        ];
        let live = assemble("t", &rows).unwrap().unwrap();
        assert_eq!(live.columns[0].name, "id");
        assert!(live.columns[0].primary_key && live.columns[0].autoincrement);
        assert_eq!(live.columns[0].default, None);
        assert!(live.columns[1].not_null);
        assert_eq!(live.uniques[0].columns, vec![String::from("a"), String::from("b")]);
        assert_eq!(live.indices[0].name, "ix_t_name");
        assert!(!live.indices[0].unique);
    }

    #[test]
    fn test_assemble_missing() {
        assert!(assemble("t", &[]).unwrap().is_none());
    }

    #[test]
    fn test_assemble_view_strips_create() {
        let rows = vec![row("view", "v", "CREATE VIEW [v] AS SELECT 1 AS x", 0, None, 0)];
        let live = assemble("v", &rows).unwrap().unwrap();
        assert_eq!(live.kind, ObjectKind::View);
        assert_eq!(live.view_sql.as_deref(), Some("SELECT 1 AS x"));
    }
}
