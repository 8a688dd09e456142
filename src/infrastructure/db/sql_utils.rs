//! Query builders for the data-streaming phase (§4.6 phase 3), adapted from
//! the teacher's `build_select_query`/`build_typed_select_query`: the data
//! side of the split is a plain paged `SELECT`, ordered by the first column
//! so successive backups diff cleanly (§5).

use crate::domain::schema::Table;
use crate::infrastructure::db::dialect::Platform;

/// `SELECT * FROM <schema>.<table> ORDER BY 1 LIMIT <limit> OFFSET <offset>`.
pub fn build_paged_select(
    table: &Table,
    platform: &dyn Platform,
    limit: usize,
    offset: usize,
) -> String {
    let table_q = platform.quote_identifier(&table.name.0);
    let prefix = table
        .schema
        .as_deref()
        .map(|s| platform.schema_prefix(s))
        .unwrap_or_default();
    format!(
        "SELECT * FROM {prefix}{table_q} ORDER BY 1 LIMIT {limit} OFFSET {offset}"
    )
}

/// `SELECT COUNT(*) FROM <schema>.<table>` — used to gate progress reporting
/// (total row count informs percent-complete without a second full scan).
pub fn build_count_query(table: &Table, platform: &dyn Platform) -> String {
    let table_q = platform.quote_identifier(&table.name.0);
    let prefix = table
        .schema
        .as_deref()
        .map(|s| platform.schema_prefix(s))
        .unwrap_or_default();
    format!("SELECT COUNT(*) FROM {prefix}{table_q}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::dialect::{MysqlDialect, PostgresDialect, SqliteDialect};

    fn table(name: &str, schema: Option<&str>) -> Table {
        let mut t = Table::new(name);
        t.schema = schema.map(String::from);
        t
    }

    #[test]
    fn paged_select_postgres_with_schema() {
        let t = table("orders", Some("public"));
        let q = build_paged_select(&t, &PostgresDialect, 1000, 2000);
        assert_eq!(
            q,
            r#"SELECT * FROM "public"."orders" ORDER BY 1 LIMIT 1000 OFFSET 2000"#
        );
    }

    #[test]
    fn paged_select_mysql() {
        let t = table("orders", Some("shop"));
        let q = build_paged_select(&t, &MysqlDialect, 500, 0);
        assert_eq!(q, "SELECT * FROM `shop`.`orders` ORDER BY 1 LIMIT 500 OFFSET 0");
    }

    #[test]
    fn paged_select_sqlite_has_no_schema_prefix() {
        let t = table("orders", None);
        let q = build_paged_select(&t, &SqliteDialect, 500, 0);
        assert_eq!(q, r#"SELECT * FROM "orders" ORDER BY 1 LIMIT 500 OFFSET 0"#);
    }

    #[test]
    fn count_query_has_no_order_or_limit() {
        let t = table("orders", None);
        let q = build_count_query(&t, &SqliteDialect);
        assert_eq!(q, r#"SELECT COUNT(*) FROM "orders""#);
    }
}
