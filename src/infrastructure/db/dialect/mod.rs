//! Dialect Platform (§4.1): one `Platform` per supported engine — identifier
//! quoting, literal formatting, type rendering, feature flags, and the
//! autoincrement inlining policy. Pure string manipulation with no `sqlx`
//! dependency, generalized from the teacher's `QueryDialect`/`RowDecoder`
//! split so both the Reflector/Renderer (DDL side) and the row-streaming
//! query builders (data side) share one object per engine.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use serde_json::Value;

use crate::domain::error::EngineError;
use crate::domain::schema::Column;
use crate::domain::value_objects::EngineKind;

/// Per-engine capability booleans the Renderer and Parser branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub supports_check_constraints: bool,
    pub supports_deferrable_fks: bool,
    pub supports_partial_indexes: bool,
    pub supports_array_types: bool,
    pub supports_strict_or_without_rowid: bool,
    pub supports_inline_autoincrement_pk: bool,
}

/// How a single-column integer PK with `auto_increment` set is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoincrementPolicy {
    /// Column attribute inline, e.g. MySQL `AUTO_INCREMENT`, SQLite
    /// `INTEGER PRIMARY KEY AUTOINCREMENT`.
    InlineColumnAttribute,
    /// Pseudo-type substitution, e.g. Postgres `SERIAL`/`BIGSERIAL` in place
    /// of `INT`/`BIGINT` when the default is a `nextval(...)` on an owned sequence.
    SerialPseudoType,
}

pub trait Platform: Send + Sync {
    fn engine_kind(&self) -> EngineKind;

    /// Quote an identifier (table, column, schema, index, constraint).
    fn quote_identifier(&self, name: &str) -> String;

    /// Return the `schema.` prefix for a qualified table reference. SQLite
    /// has no schema namespace and returns `""`.
    fn schema_prefix(&self, schema: &str) -> String {
        format!("{}.", self.quote_identifier(schema))
    }

    /// Produce a SQL literal for `value`, disambiguated by `type_hint` where
    /// the JSON representation alone is not enough (byte strings, arrays).
    fn quote_literal(&self, value: &Value, type_hint: &crate::domain::schema::LogicalType) -> String;

    /// Map a column's logical type + parameters to this dialect's DDL syntax,
    /// synthesizing `SERIAL`/`BIGSERIAL` where the autoincrement policy calls
    /// for a pseudo-type substitution.
    fn render_type(&self, column: &Column) -> Result<String, EngineError>;

    fn feature_flags(&self) -> FeatureFlags;

    fn autoincrement_policy(&self) -> AutoincrementPolicy;
}

/// Resolve a `Platform` from an [`EngineKind`].
pub fn from_engine_kind(kind: EngineKind) -> Box<dyn Platform> {
    match kind {
        EngineKind::Mysql => Box::new(MysqlDialect),
        EngineKind::Sqlite => Box::new(SqliteDialect),
        EngineKind::Postgres => Box::new(PostgresDialect),
    }
}

/// Common literal-escaping helper shared by all three dialects: doubled
/// internal single quotes, used for every engine's plain string literal.
pub(crate) fn quote_sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_engine_kind_dispatches() {
        assert_eq!(from_engine_kind(EngineKind::Mysql).engine_kind(), EngineKind::Mysql);
        assert_eq!(from_engine_kind(EngineKind::Sqlite).engine_kind(), EngineKind::Sqlite);
        assert_eq!(from_engine_kind(EngineKind::Postgres).engine_kind(), EngineKind::Postgres);
    }

    #[test]
    fn quote_sql_string_doubles_internal_quotes() {
        assert_eq!(quote_sql_string("it's fine"), "'it''s fine'");
    }
}
