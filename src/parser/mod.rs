//! SQL script parser (§4.3): turns a dump script back into the shared
//! [`crate::domain::schema`] model, for restore-time validation and for the
//! test fixtures that replay INSERT data. Lower-level segmentation lives in
//! [`splitter`]; per-dialect grammars live in [`postgres`], [`mysql`], and
//! [`sqlite`].

pub mod common;
pub mod insert;
pub mod mysql;
pub mod postgres;
pub mod splitter;
pub mod sqlite;

use crate::domain::schema::Table;
use crate::domain::value_objects::EngineKind;
use splitter::StatementSplitter;

/// Coarse classification of a single statement, used to route it to the
/// right sub-parser before any dialect-specific grammar is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    CreateTable,
    AlterTable,
    CreateIndex,
    Insert,
    Other,
}

pub fn classify(stmt: &str) -> StatementKind {
    let upper = stmt.trim_start().to_ascii_uppercase();
    if upper.starts_with("CREATE TABLE") || upper.starts_with("CREATE TEMPORARY TABLE") {
        StatementKind::CreateTable
    } else if upper.starts_with("ALTER TABLE") {
        StatementKind::AlterTable
    } else if upper.starts_with("CREATE INDEX")
        || upper.starts_with("CREATE UNIQUE INDEX")
        || upper.starts_with("CREATE FULLTEXT INDEX")
    {
        StatementKind::CreateIndex
    } else if upper.starts_with("INSERT INTO") || upper.starts_with("INSERT IGNORE INTO") {
        StatementKind::Insert
    } else {
        StatementKind::Other
    }
}

/// What to do with a statement the sub-parser cannot handle (§4.3 error
/// policy: `strict` throws, default mode records a warning and moves on).
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Parsed,
    Skipped { warning: String },
    Fatal { error: String },
}

#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub tables: Vec<Table>,
    pub warnings: Vec<String>,
}

/// Parse an entire dump script into a [`ParseReport`]. `strict` mirrors the
/// `strict` option from §4.3: when true, any statement a sub-parser cannot
/// handle aborts the whole parse with an error; when false, it is recorded
/// as a warning and skipped.
pub fn parse_script(sql: &str, engine: EngineKind, strict: bool) -> anyhow::Result<ParseReport> {
    let splitter = StatementSplitter::new(engine);
    let statements = splitter.split(sql);

    match engine {
        EngineKind::Mysql => mysql::parse_statements(&statements, strict),
        EngineKind::Postgres => postgres::parse_statements(&statements, strict),
        EngineKind::Sqlite => sqlite::parse_statements(&statements, strict),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognizes_core_statement_kinds() {
        assert_eq!(classify("CREATE TABLE t (id INT)"), StatementKind::CreateTable);
        assert_eq!(classify("  alter table t add column x int"), StatementKind::AlterTable);
        assert_eq!(classify("CREATE INDEX idx ON t (x)"), StatementKind::CreateIndex);
        assert_eq!(classify("INSERT INTO t VALUES (1)"), StatementKind::Insert);
        assert_eq!(classify("COMMENT ON TABLE t IS 'x'"), StatementKind::Other);
    }
}
