//! Reflector (§4.2): populate a [`Table`] vector from a live connection's
//! system catalogs. One strategy per engine; dispatch is by [`EngineKind`].
//!
//! Grounded on the teacher's `SqlxRowRepository`/`fetch_column_types` pattern
//! for querying `information_schema` through `sqlx::AnyPool` and handling
//! MySQL's habit of returning introspection strings as `BLOB` to `AnyRow`.

mod mysql;
mod postgres;
mod sqlite;

use anyhow::Result;
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row, TypeInfo};

use crate::domain::schema::Table;
use crate::domain::value_objects::EngineKind;

#[async_trait::async_trait]
pub trait Reflector: Send + Sync {
    /// Reflect every user table (and its columns/indexes/constraints) from
    /// the current database/schema into the neutral [`Table`] model.
    async fn reflect(&self, pool: &AnyPool) -> Result<Vec<Table>>;
}

pub fn for_engine(kind: EngineKind) -> Box<dyn Reflector> {
    match kind {
        EngineKind::Mysql => Box::new(mysql::MysqlReflector),
        EngineKind::Postgres => Box::new(postgres::PostgresReflector),
        EngineKind::Sqlite => Box::new(sqlite::SqliteReflector),
    }
}

/// Read column `idx` as `String`, unwrapping MySQL's BLOB-for-introspection-
/// strings quirk (ground truth: teacher's `blob_or_string`).
pub(crate) fn get_string(row: &AnyRow, idx: usize) -> Result<String> {
    use sqlx::Column;
    let type_name = row.column(idx).type_info().name();
    if type_name == "BLOB" {
        let bytes: Vec<u8> = row.try_get(idx)?;
        Ok(String::from_utf8(bytes).unwrap_or_default())
    } else {
        Ok(row.try_get(idx)?)
    }
}

pub(crate) fn get_opt_string(row: &AnyRow, idx: usize) -> Result<Option<String>> {
    use sqlx::Column;
    let type_name = row.column(idx).type_info().name();
    if type_name == "BLOB" {
        let bytes: Option<Vec<u8>> = row.try_get(idx)?;
        Ok(bytes.map(|b| String::from_utf8(b).unwrap_or_default()))
    } else {
        Ok(row.try_get(idx)?)
    }
}

pub(crate) fn get_i64(row: &AnyRow, idx: usize) -> Result<i64> {
    Ok(row.try_get::<i64, _>(idx).unwrap_or_else(|_| {
        row.try_get::<i32, _>(idx).unwrap_or_default() as i64
    }))
}

/// Normalize a dialect-specific "now" default expression to a canonical
/// `CURRENT_TIMESTAMP` token, per §4.2's "defaults are normalised" rule.
/// SQLite's `julianday(...)`/`unixepoch(...)` forms are deliberately left
/// untouched (see DESIGN.md open-question resolution).
pub(crate) fn canonicalize_now_expression(expr: &str) -> String {
    let trimmed = expr.trim();
    let lower = trimmed.to_ascii_lowercase();
    match lower.as_str() {
        "now()" | "datetime('now')" | "current_timestamp()" | "current_timestamp" => {
            "CURRENT_TIMESTAMP".to_string()
        }
        "date('now')" | "curdate()" => "CURRENT_DATE".to_string(),
        _ => strip_redundant_quotes(trimmed),
    }
}

/// Strip a dialect's redundant outer+inner quoting from a default literal,
/// e.g. SQLite's triple-quoted string defaults (`'''x'''` -> `'x'`).
fn strip_redundant_quotes(s: &str) -> String {
    if s.len() >= 6 && s.starts_with("'''") && s.ends_with("'''") {
        format!("'{}'", &s[3..s.len() - 3])
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_maps_now_functions() {
        assert_eq!(canonicalize_now_expression("now()"), "CURRENT_TIMESTAMP");
        assert_eq!(
            canonicalize_now_expression("datetime('now')"),
            "CURRENT_TIMESTAMP"
        );
        assert_eq!(canonicalize_now_expression("date('now')"), "CURRENT_DATE");
    }

    #[test]
    fn canonicalize_preserves_julianday_and_unixepoch() {
        assert_eq!(
            canonicalize_now_expression("julianday('now')"),
            "julianday('now')"
        );
        assert_eq!(
            canonicalize_now_expression("unixepoch('now')"),
            "unixepoch('now')"
        );
    }

    #[test]
    fn strip_redundant_quotes_unwraps_triple_quoted_default() {
        assert_eq!(strip_redundant_quotes("'''hello'''"), "'hello'");
        assert_eq!(strip_redundant_quotes("'hello'"), "'hello'");
    }
}
