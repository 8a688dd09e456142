use serde_json::Value;

use super::{quote_sql_string, AutoincrementPolicy, FeatureFlags, Platform};
use crate::domain::error::EngineError;
use crate::domain::schema::{Column, LogicalType};
use crate::domain::value_objects::EngineKind;

pub struct MysqlDialect;

impl Platform for MysqlDialect {
    fn engine_kind(&self) -> EngineKind {
        EngineKind::Mysql
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn quote_literal(&self, value: &Value, type_hint: &LogicalType) -> String {
        match (value, type_hint) {
            (Value::Null, _) => "NULL".to_string(),
            (Value::Bool(b), _) => if *b { "1" } else { "0" }.to_string(),
            (Value::Number(n), _) => n.to_string(),
            (Value::String(s), LogicalType::Blob) => {
                let hex: String = s.as_bytes().iter().map(|b| format!("{:02x}", b)).collect();
                format!("0x{}", hex)
            }
            (Value::String(s), _) => quote_sql_string(s),
            (Value::Array(_) | Value::Object(_), _) => {
                let json_str = serde_json::to_string(value).unwrap_or_default().replace('\'', "''");
                format!("'{}'", json_str)
            }
        }
    }

    fn render_type(&self, column: &Column) -> Result<String, EngineError> {
        let mut base = match &column.logical_type {
            LogicalType::TinyInt => "TINYINT".to_string(),
            LogicalType::SmallInt => "SMALLINT".to_string(),
            LogicalType::Int => "INT".to_string(),
            LogicalType::BigInt => "BIGINT".to_string(),
            LogicalType::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
            LogicalType::Float => "FLOAT".to_string(),
            LogicalType::Double => "DOUBLE".to_string(),
            LogicalType::Boolean => "TINYINT(1)".to_string(),
            LogicalType::Char(n) => format!("CHAR({n})"),
            LogicalType::Varchar(n) => format!("VARCHAR({n})"),
            LogicalType::Text => "TEXT".to_string(),
            LogicalType::Blob => "BLOB".to_string(),
            LogicalType::Date => "DATE".to_string(),
            LogicalType::Time => "TIME".to_string(),
            LogicalType::DateTime => "DATETIME".to_string(),
            LogicalType::Timestamp => "TIMESTAMP".to_string(),
            LogicalType::Json => "JSON".to_string(),
            LogicalType::Uuid => "CHAR(36)".to_string(),
            LogicalType::Array(_) => {
                return Err(EngineError::UnsupportedFeature(
                    "MySQL has no native array type".to_string(),
                ))
            }
            LogicalType::Enum(members) => {
                let quoted: Vec<String> = members.iter().map(|m| quote_sql_string(m)).collect();
                format!("ENUM({})", quoted.join(", "))
            }
            LogicalType::Other(raw) => raw.clone(),
        };
        if column.options.unsigned {
            base.push_str(" UNSIGNED");
        }
        if column.options.zerofill {
            base.push_str(" ZEROFILL");
        }
        if column.auto_increment {
            base.push_str(" AUTO_INCREMENT");
        }
        Ok(base)
    }

    fn feature_flags(&self) -> FeatureFlags {
        FeatureFlags {
            supports_check_constraints: true, // MySQL 8.0.16+
            supports_deferrable_fks: false,
            supports_partial_indexes: false,
            supports_array_types: false,
            supports_strict_or_without_rowid: false,
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
    fn quote_identifier_doubles_backticks() {
        let d = MysqlDialect;
        assert_eq!(d.quote_identifier("my_table"), "`my_table`");
        assert_eq!(d.quote_identifier("ta`ble"), "`ta``ble`");
    }

    #[test]
    fn quote_literal_bool_is_integer() {
        let d = MysqlDialect;
        assert_eq!(d.quote_literal(&Value::Bool(true), &LogicalType::Boolean), "1");
        assert_eq!(d.quote_literal(&Value::Bool(false), &LogicalType::Boolean), "0");
    }

    #[test]
    fn quote_literal_blob_uses_hex_escape() {
        let d = MysqlDialect;
        let v = Value::String("AB".to_string());
        assert_eq!(d.quote_literal(&v, &LogicalType::Blob), "0x4142");
    }

    #[test]
    fn render_type_autoincrement_appends_attribute() {
        let d = MysqlDialect;
        let mut col = Column::new("id", LogicalType::Int);
        col.auto_increment = true;
        assert_eq!(d.render_type(&col).unwrap(), "INT AUTO_INCREMENT");
    }

    #[test]
    fn render_type_unsigned_zerofill() {
        let d = MysqlDialect;
        let mut col = Column::new("count", LogicalType::Int);
        col.options.unsigned = true;
        col.options.zerofill = true;
        assert_eq!(d.render_type(&col).unwrap(), "INT UNSIGNED ZEROFILL");
    }

    #[test]
    fn render_type_enum_lists_members() {
        let d = MysqlDialect;
        let col = Column::new("status", LogicalType::Enum(vec!["a".into(), "b".into()]));
        assert_eq!(d.render_type(&col).unwrap(), "ENUM('a', 'b')");
    }

    #[test]
    fn render_type_array_is_unsupported() {
        let d = MysqlDialect;
        let col = Column::new("tags", LogicalType::Array(Box::new(LogicalType::Text)));
        assert!(matches!(d.render_type(&col), Err(EngineError::UnsupportedFeature(_))));
    }
}
