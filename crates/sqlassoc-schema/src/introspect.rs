//! Database introspection.
//!
//! Loads the table, column, primary key and foreign key metadata that
//! associations need from a live connection, for SQLite and PostgreSQL.

use crate::{DatabaseSchema, TableColumn, TableInfo};
use asupersync::{Cx, Outcome};
use sqlassoc_core::{Connection, Error, ForeignKeyInfo, Value, sanitize_identifier};
use std::collections::BTreeMap;

/// Supported database dialects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// SQLite
    #[default]
    Sqlite,
    /// PostgreSQL
    Postgres,
}

/// Database introspector.
pub struct Introspector {
    /// Database type for dialect-specific queries
    dialect: Dialect,
}

impl Introspector {
    /// Create a new introspector for the given dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// List all table names in the database.
    pub async fn table_names<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<Vec<String>, Error> {
        let sql = match self.dialect {
            Dialect::Sqlite => {
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
            Dialect::Postgres => {
                "SELECT table_name FROM information_schema.tables WHERE table_schema = 'public' ORDER BY table_name"
            }
        };

        let rows = match conn.query(cx, sql, &[]).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let names: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get(0).and_then(|v| v.as_str().map(String::from)))
            .collect();

        Outcome::Ok(names)
    }

    /// Get column, key and foreign key information about a table.
    pub async fn table_info<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<TableInfo, Error> {
        let (columns, primary_key) = match self.dialect {
            Dialect::Sqlite => match self.sqlite_columns(cx, conn, table_name).await {
                Outcome::Ok(cols) => cols,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            },
            Dialect::Postgres => match self.postgres_columns(cx, conn, table_name).await {
                Outcome::Ok(cols) => cols,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            },
        };

        let foreign_keys = match self.dialect {
            Dialect::Sqlite => self.sqlite_foreign_keys(cx, conn, table_name).await,
            Dialect::Postgres => self.postgres_foreign_keys(cx, conn, table_name).await,
        };
        let foreign_keys = match foreign_keys {
            Outcome::Ok(fks) => fks,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        tracing::debug!(
            table = table_name,
            columns = columns.len(),
            foreign_keys = foreign_keys.len(),
            "Introspected table"
        );

        Outcome::Ok(TableInfo {
            name: table_name.to_string(),
            columns,
            primary_key,
            foreign_keys,
        })
    }

    /// Introspect the entire database schema.
    #[tracing::instrument(level = "debug", skip(self, cx, conn))]
    pub async fn introspect_all<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
    ) -> Outcome<DatabaseSchema, Error> {
        let table_names = match self.table_names(cx, conn).await {
            Outcome::Ok(names) => names,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut schema = DatabaseSchema::new();

        for name in table_names {
            let info = match self.table_info(cx, conn, &name).await {
                Outcome::Ok(info) => info,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            schema.add_table(info);
        }

        Outcome::Ok(schema)
    }

    async fn sqlite_columns<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<(Vec<TableColumn>, Vec<String>), Error> {
        let sql = format!("PRAGMA table_info({})", sanitize_identifier(table_name));
        let rows = match conn.query(cx, &sql, &[]).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        // pk is the 1-based position within the primary key, 0 when not part of it.
        let mut keyed: Vec<(i64, String)> = Vec::new();
        let columns: Vec<TableColumn> = rows
            .iter()
            .filter_map(|row| {
                let name = row.get_named::<String>("name").ok()?;
                let sql_type = row.get_named::<String>("type").ok().unwrap_or_default();
                let notnull = row.get_named::<i64>("notnull").ok().unwrap_or(0);
                let pk = row.get_named::<i64>("pk").ok().unwrap_or(0);
                if pk > 0 {
                    keyed.push((pk, name.clone()));
                }
                Some(TableColumn {
                    name,
                    sql_type,
                    nullable: notnull == 0 && pk == 0,
                })
            })
            .collect();

        keyed.sort();
        let primary_key = keyed.into_iter().map(|(_, name)| name).collect();

        Outcome::Ok((columns, primary_key))
    }

    async fn postgres_columns<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<(Vec<TableColumn>, Vec<String>), Error> {
        let sql = "SELECT column_name, data_type, is_nullable
                   FROM information_schema.columns
                   WHERE table_name = $1 AND table_schema = 'public'
                   ORDER BY ordinal_position";
        let params = [Value::Text(table_name.to_string())];
        let rows = match conn.query(cx, sql, &params).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let columns = rows
            .iter()
            .filter_map(|row| {
                Some(TableColumn {
                    name: row.get_named::<String>("column_name").ok()?,
                    sql_type: row.get_named::<String>("data_type").ok().unwrap_or_default(),
                    nullable: row
                        .get_named::<String>("is_nullable")
                        .is_ok_and(|s| s == "YES"),
                })
            })
            .collect();

        let pk_sql = "SELECT kcu.column_name
                      FROM information_schema.table_constraints AS tc
                      JOIN information_schema.key_column_usage AS kcu
                          ON tc.constraint_name = kcu.constraint_name
                          AND tc.table_schema = kcu.table_schema
                      WHERE tc.constraint_type = 'PRIMARY KEY'
                          AND tc.table_name = $1
                          AND tc.table_schema = 'public'
                      ORDER BY kcu.ordinal_position";
        let rows = match conn.query(cx, pk_sql, &params).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        let primary_key = rows
            .iter()
            .filter_map(|row| row.get_named::<String>("column_name").ok())
            .collect();

        Outcome::Ok((columns, primary_key))
    }

    async fn sqlite_foreign_keys<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<Vec<ForeignKeyInfo>, Error> {
        let sql = format!(
            "PRAGMA foreign_key_list({})",
            sanitize_identifier(table_name)
        );
        let rows = match conn.query(cx, &sql, &[]).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        // Composite keys come back as one row per column sharing an `id`,
        // ordered by `seq`.
        let mut grouped: BTreeMap<i64, Vec<(i64, String, String, String)>> = BTreeMap::new();
        for row in &rows {
            let (Ok(table), Ok(from)) = (
                row.get_named::<String>("table"),
                row.get_named::<String>("from"),
            ) else {
                continue;
            };
            // `to` is NULL when the constraint targets the implicit primary key.
            let to = row
                .get_named::<Option<String>>("to")
                .ok()
                .flatten()
                .unwrap_or_default();
            let id = row.get_named::<i64>("id").unwrap_or(0);
            let seq = row.get_named::<i64>("seq").unwrap_or(0);
            grouped.entry(id).or_default().push((seq, table, from, to));
        }

        let fks = grouped
            .into_values()
            .filter_map(|mut parts| {
                parts.sort_by_key(|(seq, ..)| *seq);
                let foreign_table = parts.first()?.1.clone();
                Some(ForeignKeyInfo {
                    name: None,
                    table: table_name.to_string(),
                    columns: parts.iter().map(|(_, _, from, _)| from.clone()).collect(),
                    foreign_table,
                    foreign_columns: parts.into_iter().map(|(_, _, _, to)| to).collect(),
                })
            })
            .collect();

        Outcome::Ok(fks)
    }

    async fn postgres_foreign_keys<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        table_name: &str,
    ) -> Outcome<Vec<ForeignKeyInfo>, Error> {
        let sql = "SELECT
                       tc.constraint_name,
                       kcu.column_name,
                       ccu.table_name AS foreign_table_name,
                       ccu.column_name AS foreign_column_name
                   FROM information_schema.table_constraints AS tc
                   JOIN information_schema.key_column_usage AS kcu
                       ON tc.constraint_name = kcu.constraint_name
                       AND tc.table_schema = kcu.table_schema
                   JOIN information_schema.constraint_column_usage AS ccu
                       ON ccu.constraint_name = tc.constraint_name
                       AND ccu.table_schema = tc.table_schema
                   WHERE tc.constraint_type = 'FOREIGN KEY'
                       AND tc.table_name = $1
                       AND tc.table_schema = 'public'
                   ORDER BY tc.constraint_name, kcu.ordinal_position";

        let rows = match conn
            .query(cx, sql, &[Value::Text(table_name.to_string())])
            .await
        {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        let mut fks: Vec<ForeignKeyInfo> = Vec::new();
        for row in &rows {
            let Ok(name) = row.get_named::<String>("constraint_name") else {
                continue;
            };
            let (Ok(column), Ok(foreign_table), Ok(foreign_column)) = (
                row.get_named::<String>("column_name"),
                row.get_named::<String>("foreign_table_name"),
                row.get_named::<String>("foreign_column_name"),
            ) else {
                continue;
            };
            match fks.last_mut() {
                Some(fk) if fk.name.as_deref() == Some(name.as_str()) => {
                    fk.columns.push(column);
                    fk.foreign_columns.push(foreign_column);
                }
                _ => fks.push(
                    ForeignKeyInfo::new(table_name, column, foreign_table, foreign_column)
                        .named(name),
                ),
            }
        }

        Outcome::Ok(fks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use sqlassoc_core::{Row, SchemaIntrospector};
    use std::future::Future;

    /// Answers PRAGMA queries for a two-table SQLite database.
    struct PragmaConnection;

    fn row(names: &[&str], values: Vec<Value>) -> Row {
        Row::new(names.iter().map(|s| (*s).to_string()).collect(), values)
    }

    fn table_info_row(name: &str, notnull: i64, pk: i64) -> Row {
        row(
            &["cid", "name", "type", "notnull", "dflt_value", "pk"],
            vec![
                Value::BigInt(0),
                Value::Text(name.to_string()),
                Value::Text("INTEGER".to_string()),
                Value::BigInt(notnull),
                Value::Null,
                Value::BigInt(pk),
            ],
        )
    }

    fn fk_row(id: i64, seq: i64, table: &str, from: &str, to: Value) -> Row {
        row(
            &["id", "seq", "table", "from", "to"],
            vec![
                Value::BigInt(id),
                Value::BigInt(seq),
                Value::Text(table.to_string()),
                Value::Text(from.to_string()),
                to,
            ],
        )
    }

    impl Connection for PragmaConnection {
        fn query(
            &self,
            _cx: &Cx,
            sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
            let rows = match sql {
                s if s.starts_with("SELECT name FROM sqlite_master") => vec![
                    row(&["name"], vec![Value::Text("authors".to_string())]),
                    row(&["name"], vec![Value::Text("books".to_string())]),
                ],
                "PRAGMA table_info(authors)" => vec![
                    table_info_row("id", 1, 1),
                    table_info_row("name", 0, 0),
                ],
                "PRAGMA table_info(books)" => vec![
                    table_info_row("id", 1, 1),
                    table_info_row("authorId", 0, 0),
                    table_info_row("editorId", 0, 0),
                ],
                "PRAGMA foreign_key_list(books)" => vec![
                    fk_row(0, 0, "authors", "authorId", Value::Text("id".to_string())),
                    fk_row(1, 0, "authors", "editorId", Value::Null),
                ],
                _ => Vec::new(),
            };
            async move { Outcome::Ok(rows) }
        }
    }

    #[test]
    fn test_sqlite_introspect_all() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let introspector = Introspector::new(Dialect::Sqlite);
            let Outcome::Ok(schema) = introspector.introspect_all(&cx, &PragmaConnection).await
            else {
                panic!("introspection failed");
            };

            assert_eq!(schema.table_names(), vec!["authors", "books"]);
            assert_eq!(schema.primary_key("books").unwrap(), vec!["id"]);
            assert_eq!(
                schema.columns("books").unwrap(),
                vec!["id", "authorId", "editorId"]
            );

            let fks = schema.foreign_keys("books", "authors").unwrap();
            assert_eq!(fks.len(), 2);
            assert_eq!(fks[0].columns, vec!["authorId"]);
            assert_eq!(fks[0].foreign_columns, vec!["id"]);
            // NULL `to` means the referenced primary key; resolved by the schema.
            assert_eq!(fks[1].foreign_columns, vec!["id"]);
        });
    }

    #[test]
    fn test_sqlite_composite_foreign_key_is_grouped() {
        struct Composite;
        impl Connection for Composite {
            fn query(
                &self,
                _cx: &Cx,
                _sql: &str,
                _params: &[Value],
            ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
                let rows = vec![
                    fk_row(3, 1, "editions", "edition_no", Value::Text("no".to_string())),
                    fk_row(3, 0, "editions", "book_id", Value::Text("book_id".to_string())),
                ];
                async move { Outcome::Ok(rows) }
            }
        }

        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();

        rt.block_on(async {
            let introspector = Introspector::new(Dialect::Sqlite);
            let Outcome::Ok(fks) = introspector
                .sqlite_foreign_keys(&cx, &Composite, "reviews")
                .await
            else {
                panic!("introspection failed");
            };
            assert_eq!(fks.len(), 1);
            assert_eq!(fks[0].columns, vec!["book_id", "edition_no"]);
            assert_eq!(fks[0].foreign_columns, vec!["book_id", "no"]);
        });
    }
}
