// ABOUTME: Typed data-correction statements and their idempotent SQL renderings.
// ABOUTME: Identifiers are validated; values are rendered as escaped SQL literals.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named data correction applied before services start.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Patch {
    pub name: String,
    #[serde(flatten)]
    pub statement: Statement,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    /// `ALTER TYPE .. ADD VALUE IF NOT EXISTS`.
    AddEnumValue {
        #[serde(rename = "type")]
        type_name: String,
        value: String,
    },
    /// Delete rows matching a predicate, optionally capped.
    Delete {
        table: String,
        #[serde(rename = "where")]
        predicate: String,
        #[serde(default)]
        max_rows: Option<u64>,
    },
    /// Insert rows that are not already present.
    Insert {
        table: String,
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
        /// Columns of a unique constraint to use with `ON CONFLICT`.
        #[serde(default)]
        conflict: Option<Vec<String>>,
    },
    /// Raw SQL the operator asserts is idempotent.
    Sql {
        statement: String,
        #[serde(default)]
        destructive: bool,
    },
}

/// A literal in an insert row.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl SqlValue {
    pub fn render(&self) -> String {
        match self {
            SqlValue::Bool(true) => "TRUE".to_string(),
            SqlValue::Bool(false) => "FALSE".to_string(),
            SqlValue::Int(n) => n.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Text(s) => quote_literal(s),
            SqlValue::Null => "NULL".to_string(),
        }
    }

    fn matches(&self, column: &str) -> String {
        match self {
            SqlValue::Null => format!("{} IS NULL", column),
            other => format!("{} = {}", column, other.render()),
        }
    }
}

/// `'text'` with embedded quotes doubled.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Check a (possibly schema-qualified) SQL identifier.
pub fn validate_identifier(ident: &str) -> Result<(), String> {
    let parts: Vec<&str> = ident.split('.').collect();
    if parts.len() > 2 {
        return Err(format!("identifier {:?} has too many parts", ident));
    }
    for part in parts {
        let mut chars = part.chars();
        let first_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid SQL identifier {:?}", ident));
        }
        if part.len() > 63 {
            return Err(format!("identifier {:?} exceeds 63 characters", ident));
        }
    }
    Ok(())
}

impl Statement {
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::AddEnumValue { .. } => "add_enum_value",
            Statement::Delete { .. } => "delete",
            Statement::Insert { .. } => "insert",
            Statement::Sql { .. } => "sql",
        }
    }

    /// Whether applying needs `--allow-destructive`.
    pub fn needs_permission(&self) -> bool {
        match self {
            Statement::Sql { destructive, .. } => *destructive,
            Statement::Delete { max_rows, .. } => max_rows.is_none(),
            _ => false,
        }
    }

    /// Structural checks run at config load.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Statement::AddEnumValue { type_name, value } => {
                validate_identifier(type_name)?;
                if value.is_empty() {
                    return Err("enum value must not be empty".to_string());
                }
                Ok(())
            }
            Statement::Delete {
                table, predicate, ..
            } => {
                validate_identifier(table)?;
                if predicate.trim().is_empty() {
                    return Err("delete requires a non-empty where predicate".to_string());
                }
                if predicate.contains(';') || predicate.contains('$') {
                    return Err("where predicate must be a single expression".to_string());
                }
                Ok(())
            }
            Statement::Insert {
                table,
                columns,
                rows,
                conflict,
            } => {
                validate_identifier(table)?;
                if columns.is_empty() {
                    return Err("insert requires at least one column".to_string());
                }
                for column in columns {
                    validate_identifier(column)?;
                }
                if rows.is_empty() {
                    return Err("insert requires at least one row".to_string());
                }
                if let Some(bad) = rows.iter().position(|r| r.len() != columns.len()) {
                    return Err(format!(
                        "row {} has {} values for {} columns",
                        bad + 1,
                        rows[bad].len(),
                        columns.len()
                    ));
                }
                if let Some(conflict) = conflict {
                    if conflict.is_empty() {
                        return Err("conflict must name at least one column".to_string());
                    }
                    if let Some(c) = conflict.iter().find(|c| !columns.contains(c)) {
                        return Err(format!("conflict column {} is not inserted", c));
                    }
                }
                Ok(())
            }
            Statement::Sql { statement, .. } => {
                if statement.trim().is_empty() {
                    Err("sql statement must not be empty".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }

    /// SQL to apply. Multiple statements run in one transaction.
    pub fn render(&self) -> Vec<String> {
        match self {
            Statement::AddEnumValue { type_name, value } => vec![format!(
                "ALTER TYPE {} ADD VALUE IF NOT EXISTS {}",
                type_name,
                quote_literal(value)
            )],
            Statement::Delete {
                table,
                predicate,
                max_rows: Some(max_rows),
            } => vec![bounded_delete(table, predicate, *max_rows)],
            Statement::Delete {
                table,
                predicate,
                max_rows: None,
            } => vec![format!("DELETE FROM {} WHERE {}", table, predicate)],
            Statement::Insert {
                table,
                columns,
                rows,
                conflict: Some(conflict),
            } => {
                let values: Vec<String> = rows.iter().map(|row| render_row(row)).collect();
                vec![format!(
                    "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) DO NOTHING",
                    table,
                    columns.join(", "),
                    values.join(", "),
                    conflict.join(", ")
                )]
            }
            Statement::Insert {
                table,
                columns,
                rows,
                conflict: None,
            } => rows
                .iter()
                .map(|row| {
                    let literals: Vec<String> = row.iter().map(SqlValue::render).collect();
                    format!(
                        "INSERT INTO {} ({}) SELECT {} WHERE NOT EXISTS (SELECT 1 FROM {} WHERE {})",
                        table,
                        columns.join(", "),
                        literals.join(", "),
                        table,
                        row_match(columns, row, columns)
                    )
                })
                .collect(),
            Statement::Sql { statement, .. } => {
                vec![statement.trim().trim_end_matches(';').to_string()]
            }
        }
    }

    /// Read-only queries estimating what `render` would change.
    ///
    /// Each query prints one line; see [`Estimate`] for how they are read.
    pub fn estimate(&self) -> Option<(Estimate, Vec<String>)> {
        match self {
            Statement::AddEnumValue { type_name, value } => {
                let bare = type_name.rsplit('.').next().unwrap_or(type_name);
                Some((
                    Estimate::MissingCount,
                    vec![format!(
                        "SELECT count(*) = 0 FROM pg_enum e JOIN pg_type t ON t.oid = e.enumtypid \
                         WHERE t.typname = {} AND e.enumlabel = {}",
                        quote_literal(bare),
                        quote_literal(value)
                    )],
                ))
            }
            Statement::Delete {
                table, predicate, ..
            } => Some((
                Estimate::RowCount,
                vec![count_query(table, predicate)],
            )),
            Statement::Insert {
                table,
                columns,
                rows,
                conflict,
            } => {
                let keys = conflict.as_deref().unwrap_or(columns);
                Some((
                    Estimate::MissingCount,
                    rows.iter()
                        .map(|row| {
                            format!(
                                "SELECT NOT EXISTS (SELECT 1 FROM {} WHERE {})",
                                table,
                                row_match(columns, row, keys)
                            )
                        })
                        .collect(),
                ))
            }
            Statement::Sql { .. } => None,
        }
    }
}

/// How to read the output of estimate queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimate {
    /// A single `count(*)`.
    RowCount,
    /// One boolean per query; each `t` is one row that would change.
    MissingCount,
}

const DELETED_NOTICE: &str = "deckhand deleted";
const OVER_CAP_ERROR: &str = "deckhand max_rows exceeded:";

/// Delete and count in one statement; raising rolls the delete back when the cap is exceeded.
fn bounded_delete(table: &str, predicate: &str, max_rows: u64) -> String {
    format!(
        "DO $deckhand$ DECLARE n bigint; BEGIN \
         DELETE FROM {table} WHERE {predicate}; \
         GET DIAGNOSTICS n = ROW_COUNT; \
         IF n > {max_rows} THEN RAISE EXCEPTION '{OVER_CAP_ERROR} % > %', n, {max_rows}; END IF; \
         RAISE NOTICE '{DELETED_NOTICE} %', n; \
         END $deckhand$"
    )
}

/// Rows removed by a bounded delete, read from its notice on stderr.
pub(crate) fn deleted_rows(stderr: &str) -> Option<u64> {
    stderr
        .lines()
        .find_map(|line| line.split_once(DELETED_NOTICE))
        .and_then(|(_, n)| n.trim().parse().ok())
}

/// `(matched, max_rows)` when a bounded delete aborted over its cap.
pub(crate) fn over_cap(stderr: &str) -> Option<(u64, u64)> {
    let (_, counts) = stderr
        .lines()
        .find_map(|line| line.split_once(OVER_CAP_ERROR))?;
    let (matched, max_rows) = counts.split_once('>')?;
    Some((matched.trim().parse().ok()?, max_rows.trim().parse().ok()?))
}

fn count_query(table: &str, predicate: &str) -> String {
    format!("SELECT count(*) FROM {} WHERE {}", table, predicate)
}

fn render_row(row: &[SqlValue]) -> String {
    let literals: Vec<String> = row.iter().map(SqlValue::render).collect();
    format!("({})", literals.join(", "))
}

fn row_match(columns: &[String], row: &[SqlValue], keys: &[String]) -> String {
    columns
        .iter()
        .zip(row)
        .filter(|(c, _)| keys.contains(c))
        .map(|(c, v)| v.matches(c))
        .collect::<Vec<_>>()
        .join(" AND ")
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::AddEnumValue { type_name, value } => {
                write!(f, "add {:?} to enum {}", value, type_name)
            }
            Statement::Delete {
                table, predicate, ..
            } => write!(f, "delete from {} where {}", table, predicate),
            Statement::Insert { table, rows, .. } => {
                write!(f, "insert {} row(s) into {}", rows.len(), table)
            }
            Statement::Sql { statement, .. } => write!(f, "sql: {}", statement.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_insert(conflict: Option<Vec<String>>) -> Statement {
        Statement::Insert {
            table: "plans".to_string(),
            columns: vec!["code".to_string(), "price".to_string()],
            rows: vec![
                vec![SqlValue::Text("basic".to_string()), SqlValue::Int(150000)],
                vec![SqlValue::Text("o'neil".to_string()), SqlValue::Null],
            ],
            conflict,
        }
    }

    #[test]
    fn enum_value_uses_if_not_exists() {
        let stmt = Statement::AddEnumValue {
            type_name: "order_status".to_string(),
            value: "refunded".to_string(),
        };
        assert_eq!(
            stmt.render(),
            vec!["ALTER TYPE order_status ADD VALUE IF NOT EXISTS 'refunded'"]
        );
    }

    #[test]
    fn insert_with_conflict_uses_on_conflict() {
        let sql = seed_insert(Some(vec!["code".to_string()])).render();
        assert_eq!(
            sql,
            vec![
                "INSERT INTO plans (code, price) VALUES ('basic', 150000), ('o''neil', NULL) \
                 ON CONFLICT (code) DO NOTHING"
            ]
        );
    }

    #[test]
    fn insert_without_conflict_guards_each_row() {
        let sql = seed_insert(None).render();
        assert_eq!(sql.len(), 2);
        assert_eq!(
            sql[1],
            "INSERT INTO plans (code, price) SELECT 'o''neil', NULL WHERE NOT EXISTS \
             (SELECT 1 FROM plans WHERE code = 'o''neil' AND price IS NULL)"
        );
    }

    #[test]
    fn insert_estimate_matches_on_conflict_keys() {
        let (kind, queries) = seed_insert(Some(vec!["code".to_string()]))
            .estimate()
            .unwrap();
        assert_eq!(kind, Estimate::MissingCount);
        assert_eq!(
            queries[0],
            "SELECT NOT EXISTS (SELECT 1 FROM plans WHERE code = 'basic')"
        );
    }

    #[test]
    fn bounded_delete_counts_inside_the_statement() {
        let stmt = Statement::Delete {
            table: "plans".to_string(),
            predicate: "price < 100000".to_string(),
            max_rows: Some(20),
        };
        let sql = stmt.render();
        assert_eq!(sql.len(), 1);
        assert!(sql[0].starts_with("DO $deckhand$"));
        assert!(sql[0].contains("DELETE FROM plans WHERE price < 100000;"));
        assert!(sql[0].contains("IF n > 20 THEN RAISE EXCEPTION"));
    }

    #[test]
    fn reads_bounded_delete_outcomes() {
        assert_eq!(deleted_rows("NOTICE:  deckhand deleted 3\n"), Some(3));
        assert_eq!(deleted_rows("DO\n"), None);
        let err = "ERROR:  deckhand max_rows exceeded: 40 > 10\n\
                   CONTEXT:  PL/pgSQL function inline_code_block line 1 at RAISE\n";
        assert_eq!(over_cap(err), Some((40, 10)));
        assert_eq!(over_cap("ERROR:  permission denied"), None);
    }

    #[test]
    fn predicate_cannot_close_the_block() {
        let stmt = Statement::Delete {
            table: "plans".to_string(),
            predicate: "true $deckhand$; DROP TABLE plans".to_string(),
            max_rows: Some(1),
        };
        assert!(stmt.validate().is_err());
    }

    #[test]
    fn identifiers_reject_injection() {
        assert!(validate_identifier("public.plans").is_ok());
        assert!(validate_identifier("plans; drop table x").is_err());
        assert!(validate_identifier("1plans").is_err());
        assert!(validate_identifier("a.b.c").is_err());
    }

    #[test]
    fn mismatched_row_width_is_rejected() {
        let stmt = Statement::Insert {
            table: "plans".to_string(),
            columns: vec!["code".to_string()],
            rows: vec![vec![SqlValue::Int(1), SqlValue::Int(2)]],
            conflict: None,
        };
        assert!(stmt.validate().unwrap_err().contains("row 1"));
    }

    #[test]
    fn unbounded_delete_needs_permission() {
        let bounded = Statement::Delete {
            table: "products".to_string(),
            predicate: "price < 100000".to_string(),
            max_rows: Some(20),
        };
        let unbounded = Statement::Delete {
            table: "products".to_string(),
            predicate: "price < 100000".to_string(),
            max_rows: None,
        };
        assert!(!bounded.needs_permission());
        assert!(unbounded.needs_permission());
    }

    #[test]
    fn parses_patch_list_from_yaml() {
        let yaml = r#"
- name: status-enum
  add_enum_value: { type: order_status, value: refunded }
- name: purge-bad-prices
  delete: { table: products, where: "price < 100000", max_rows: 50 }
- name: seed
  insert:
    table: plans
    columns: [code, active, price]
    rows:
      - [basic, true, 150000]
      - [trial, false, null]
"#;
        let patches: Vec<Patch> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(patches.len(), 3);
        assert_eq!(patches[0].statement.kind(), "add_enum_value");
        match &patches[2].statement {
            Statement::Insert { rows, .. } => {
                assert_eq!(rows[0][1], SqlValue::Bool(true));
                assert_eq!(rows[1][2], SqlValue::Null);
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }
}
