//! Read-only access to the two IDE state stores.

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;

/// Parse `storage.json` into its top-level object.
pub fn read_storage_json(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Error reading {}", path.display()))?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
    let value: Value = serde_json::from_str(content)
        .with_context(|| format!("JSON decode error in {}", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!(
            "Unexpected top-level JSON type in {}: {}",
            path.display(),
            json_type(&other)
        ),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// JSON falsiness: null, false, zero, and empty strings/arrays/objects.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Open `state.vscdb` read-only.
pub fn open_database(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Database error in {}", path.display()))
}

pub fn has_item_table(conn: &Connection) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='ItemTable'",
            [],
            |row| row.get(0),
        )
        .optional()
        .context("failed checking for ItemTable")?;
    Ok(found.is_some())
}

/// Up to `limit` `(key, value)` rows whose key is `LIKE pattern`.
///
/// Values are cast to text; SQL NULL comes back as `None`.
pub fn item_rows(
    conn: &Connection,
    pattern: &str,
    limit: usize,
) -> Result<Vec<(String, Option<String>)>> {
    let mut stmt = conn
        .prepare("SELECT key, CAST(value AS TEXT) FROM ItemTable WHERE key LIKE ?1 LIMIT ?2")
        .context("failed preparing ItemTable query")?;
    let rows = stmt
        .query_map(rusqlite::params![pattern, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })
        .context("failed querying ItemTable")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("failed decoding ItemTable row")?);
    }
    Ok(out)
}

/// Number of rows whose key is `LIKE pattern`, or 0 when `ItemTable` is absent.
pub fn count_matching(db_path: &Path, pattern: &str) -> Result<usize> {
    let conn = open_database(db_path)?;
    if !has_item_table(&conn)? {
        return Ok(0);
    }
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM ItemTable WHERE key LIKE ?1",
            [pattern],
            |row| row.get(0),
        )
        .context("failed counting ItemTable rows")?;
    Ok(count.max(0) as usize)
}

/// A stored value is treated as an empty token when missing, blank, or the
/// literal string `null`.
pub fn is_empty_value(value: Option<&str>) -> bool {
    matches!(value, None | Some("") | Some("null"))
}


#[cfg(test)]
mod tests {
    use super::test_support::write_item_table;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_storage_json_strips_bom() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "\u{feff}{\"a\": 1}").unwrap();
        let map = read_storage_json(&path).unwrap();
        assert_eq!(map["a"], 1);
    }

    #[test]
    fn test_read_storage_json_rejects_non_object() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        let err = read_storage_json(&path).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&Value::Null));
        assert!(is_blank(&Value::String(String::new())));
        assert!(is_blank(&serde_json::json!(0)));
        assert!(!is_blank(&serde_json::json!("tok")));
        assert!(!is_blank(&serde_json::json!({"a": 1})));
    }

    #[test]
    fn test_item_rows_and_count() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("state.vscdb");
        write_item_table(
            &db,
            &[
                ("cursorAuth/accessToken", Some("abc")),
                ("cursorAuth/refreshToken", None),
                ("workbench.theme", Some("dark")),
            ],
        );

        let conn = open_database(&db).unwrap();
        assert!(has_item_table(&conn).unwrap());
        let rows = item_rows(&conn, "%cursorAuth%", 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|(k, v)| k == "cursorAuth/refreshToken" && v.is_none()));
        assert_eq!(count_matching(&db, "%cursorAuth%").unwrap(), 2);
    }

    #[test]
    fn test_missing_item_table_counts_zero() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("state.vscdb");
        Connection::open(&db)
            .unwrap()
            .execute("CREATE TABLE other (x INTEGER)", [])
            .unwrap();
        assert_eq!(count_matching(&db, "%augment%").unwrap(), 0);
    }

    #[test]
    fn test_empty_value() {
        assert!(is_empty_value(None));
        assert!(is_empty_value(Some("")));
        assert!(is_empty_value(Some("null")));
        assert!(!is_empty_value(Some("x")));
    }
}
