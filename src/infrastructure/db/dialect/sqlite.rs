use serde_json::Value;

use super::{quote_sql_string, AutoincrementPolicy, FeatureFlags, Platform};
use crate::domain::error::EngineError;
use crate::domain::schema::{Column, LogicalType};
use crate::domain::value_objects::EngineKind;

pub struct SqliteDialect;

impl Platform for SqliteDialect {
    fn engine_kind(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn schema_prefix(&self, _schema: &str) -> String {
        String::new()
    }

    fn quote_literal(&self, value: &Value, type_hint: &LogicalType) -> String {
        match (value, type_hint) {
            (Value::Null, _) => "NULL".to_string(),
            (Value::Bool(b), _) => if *b { "1" } else { "0" }.to_string(),
            (Value::Number(n), _) => n.to_string(),
            (Value::String(s), LogicalType::Blob) => {
                let hex: String = s.as_bytes().iter().map(|b| format!("{:02x}", b)).collect();
                format!("X'{}'", hex)
            }
            (Value::String(s), _) => quote_sql_string(s),
            (Value::Array(_) | Value::Object(_), _) => {
                let json_str = serde_json::to_string(value).unwrap_or_default().replace('\'', "''");
                format!("'{}'", json_str)
            }
        }
    }

    fn render_type(&self, column: &Column) -> Result<String, EngineError> {
        // §8 scenario 2: a single-column INTEGER PRIMARY KEY with
        // auto_increment must render as one inline clause, not a separate
        // PRIMARY KEY constraint plus a redundant NOT NULL.
        if column.auto_increment {
            return Ok("INTEGER".to_string());
        }
        let base = match &column.logical_type {
            LogicalType::TinyInt | LogicalType::SmallInt | LogicalType::Int | LogicalType::BigInt => {
                "INTEGER".to_string()
            }
            LogicalType::Decimal { .. } | LogicalType::Float | LogicalType::Double => "REAL".to_string(),
            LogicalType::Boolean => "BOOLEAN".to_string(),
            LogicalType::Char(n) => format!("CHARACTER({n})"),
            LogicalType::Varchar(n) => format!("VARCHAR({n})"),
            LogicalType::Text | LogicalType::Uuid | LogicalType::Enum(_) => "TEXT".to_string(),
            LogicalType::Blob => "BLOB".to_string(),
            LogicalType::Date | LogicalType::Time | LogicalType::DateTime | LogicalType::Timestamp => {
                "TEXT".to_string()
            }
            LogicalType::Json => "TEXT".to_string(),
            LogicalType::Array(_) => {
                return Err(EngineError::UnsupportedFeature(
                    "SQLite has no native array type".to_string(),
                ))
            }
            LogicalType::Other(raw) => raw.clone(),
        };
        Ok(base)
    }

    fn feature_flags(&self) -> FeatureFlags {
        FeatureFlags {
            supports_check_constraints: true,
            supports_deferrable_fks: true,
            supports_partial_indexes: true,
            supports_array_types: false,
            supports_strict_or_without_rowid: true,
            supports_inline_autoincrement_pk: true,
        }
    }

    fn autoincrement_policy(&self) -> AutoincrementPolicy {
        AutoincrementPolicy::InlineColumnAttribute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_identifier_uses_double_quotes() {
        let d = SqliteDialect;
        assert_eq!(d.quote_identifier("my_table"), "\"my_table\"");
    }

    #[test]
    fn schema_prefix_is_empty() {
        assert_eq!(SqliteDialect.schema_prefix("ignored"), "");
    }

    #[test]
    fn quote_literal_blob_uses_x_hex() {
        let d = SqliteDialect;
        let v = Value::String("AB".to_string());
        assert_eq!(d.quote_literal(&v, &LogicalType::Blob), "X'4142'");
    }

    #[test]
    fn render_type_autoincrement_is_bare_integer() {
        let d = SqliteDialect;
        let mut col = Column::new("id", LogicalType::Int);
        col.auto_increment = true;
        assert_eq!(d.render_type(&col).unwrap(), "INTEGER");
    }

    #[test]
    fn render_type_array_is_unsupported() {
        let d = SqliteDialect;
        let col = Column::new("tags", LogicalType::Array(Box::new(LogicalType::Text)));
        assert!(matches!(d.render_type(&col), Err(EngineError::UnsupportedFeature(_))));
    }
}
