use serde_json::Value;

use super::{quote_sql_string, AutoincrementPolicy, FeatureFlags, Platform};
use crate::domain::error::EngineError;
use crate::domain::schema::{Column, ColumnDefault, LogicalType};
use crate::domain::value_objects::EngineKind;

pub struct PostgresDialect;

impl Platform for PostgresDialect {
    fn engine_kind(&self) -> EngineKind {
        EngineKind::Postgres
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn quote_literal(&self, value: &Value, type_hint: &LogicalType) -> String {
        match (value, type_hint) {
            (Value::Null, _) => "NULL".to_string(),
            (Value::Bool(b), _) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            (Value::Number(n), _) => n.to_string(),
            (Value::String(s), LogicalType::Blob) => {
                // Postgres hex-escape byte string literal.
                let hex: String = s.as_bytes().iter().map(|b| format!("{:02x}", b)).collect();
                format!("'\\x{}'", hex)
            }
            (Value::String(s), _) => quote_sql_string(s),
            (Value::Array(items), LogicalType::Array(elem)) => {
                let rendered: Vec<String> = items.iter().map(|v| self.quote_literal(v, elem)).collect();
                format!("ARRAY[{}]", rendered.join(", "))
            }
            (Value::Array(_) | Value::Object(_), _) => {
                let json_str = serde_json::to_string(value).unwrap_or_default().replace('\'', "''");
                format!("'{}'::jsonb", json_str)
            }
        }
    }

    fn render_type(&self, column: &Column) -> Result<String, EngineError> {
        if column.auto_increment && self.uses_serial(column) {
            return Ok(match column.logical_type {
                LogicalType::SmallInt => "SMALLSERIAL".to_string(),
                LogicalType::BigInt => "BIGSERIAL".to_string(),
                LogicalType::Int => "SERIAL".to_string(),
                _ => "SERIAL".to_string(),
            });
        }
        let base = match &column.logical_type {
            LogicalType::TinyInt | LogicalType::SmallInt => "SMALLINT".to_string(),
            LogicalType::Int => "INTEGER".to_string(),
            LogicalType::BigInt => "BIGINT".to_string(),
            LogicalType::Decimal { precision, scale } => format!("NUMERIC({precision},{scale})"),
            LogicalType::Float => "REAL".to_string(),
            LogicalType::Double => "DOUBLE PRECISION".to_string(),
            LogicalType::Boolean => "BOOLEAN".to_string(),
            LogicalType::Char(n) => format!("CHAR({n})"),
            LogicalType::Varchar(n) => format!("VARCHAR({n})"),
            LogicalType::Text => "TEXT".to_string(),
            LogicalType::Blob => "BYTEA".to_string(),
            LogicalType::Date => "DATE".to_string(),
            LogicalType::Time => "TIME".to_string(),
            LogicalType::DateTime | LogicalType::Timestamp => "TIMESTAMP".to_string(),
            LogicalType::Json => "JSONB".to_string(),
            LogicalType::Uuid => "UUID".to_string(),
            LogicalType::Array(elem) => {
                let inner = self.render_type(&Column::new(&column.name.0, (**elem).clone()))?;
                format!("{inner}[]")
            }
            LogicalType::Enum(_) => {
                return Err(EngineError::UnsupportedFeature(
                    "native ENUM type requires a CREATE TYPE; render as TEXT with a CHECK constraint instead"
                        .to_string(),
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
            supports_array_types: true,
            supports_strict_or_without_rowid: false,
            supports_inline_autoincrement_pk: true,
        }
    }

    fn autoincrement_policy(&self) -> AutoincrementPolicy {
        AutoincrementPolicy::SerialPseudoType
    }
}

impl PostgresDialect {
    /// §8 scenario 3: a `nextval(...)` default on an integer column is
    /// rendered as `SERIAL`/`BIGSERIAL` rather than an explicit sequence DDL.
    fn uses_serial(&self, column: &Column) -> bool {
        matches!(&column.default, ColumnDefault::Expression(expr) if expr.starts_with("nextval("))
            || column.auto_increment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_identifier_doubles_quotes() {
        let d = PostgresDialect;
        assert_eq!(d.quote_identifier("my_table"), "\"my_table\"");
        assert_eq!(d.quote_identifier("ta\"ble"), "\"ta\"\"ble\"");
    }

    #[test]
    fn quote_literal_string_escapes() {
        let d = PostgresDialect;
        let v = Value::String("it's fine".to_string());
        assert_eq!(d.quote_literal(&v, &LogicalType::Text), "'it''s fine'");
    }

    #[test]
    fn quote_literal_array_renders_array_literal() {
        let d = PostgresDialect;
        let v = serde_json::json!([1, 2, 3]);
        let hint = LogicalType::Array(Box::new(LogicalType::Int));
        assert_eq!(d.quote_literal(&v, &hint), "ARRAY[1, 2, 3]");
    }

    #[test]
    fn render_type_serial_for_autoincrement_int() {
        let d = PostgresDialect;
        let mut col = Column::new("id", LogicalType::Int);
        col.auto_increment = true;
        col.nullable = false;
        assert_eq!(d.render_type(&col).unwrap(), "SERIAL");
    }

    #[test]
    fn render_type_bigserial_for_autoincrement_bigint() {
        let d = PostgresDialect;
        let mut col = Column::new("id", LogicalType::BigInt);
        col.auto_increment = true;
        col.nullable = false;
        assert_eq!(d.render_type(&col).unwrap(), "BIGSERIAL");
    }

    #[test]
    fn render_type_plain_varchar() {
        let d = PostgresDialect;
        let col = Column::new("name", LogicalType::Varchar(255));
        assert_eq!(d.render_type(&col).unwrap(), "VARCHAR(255)");
    }

    #[test]
    fn render_type_enum_is_unsupported() {
        let d = PostgresDialect;
        let col = Column::new("status", LogicalType::Enum(vec!["a".into(), "b".into()]));
        assert!(matches!(d.render_type(&col), Err(EngineError::UnsupportedFeature(_))));
    }
}
