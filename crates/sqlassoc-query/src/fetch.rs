//! Running compiled queries on a connection.

use crate::compiler::{CompiledQuery, CompiledStatement, PrefetchPlan};
use crate::decoder::{DecodedRow, RowScopeTree, pair};
use sqlassoc_core::{Connection, Cx, Error, Outcome};
use std::future::Future;
use std::pin::Pin;

/// Decoded rows of a compiled query, and every statement that ran.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub rows: Vec<DecodedRow>,
    /// Statements in execution order
    pub statements: Vec<CompiledStatement>,
}

async fn run<C: Connection>(
    cx: &Cx,
    conn: &C,
    statement: &CompiledStatement,
) -> Outcome<Vec<DecodedRow>, Error> {
    tracing::trace!(sql = %statement.sql, params = statement.params.len(), "Executing statement");
    let rows = match conn.query(cx, &statement.sql, &statement.params).await {
        Outcome::Ok(rows) => rows,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    match RowScopeTree::new(std::sync::Arc::clone(&statement.layout)).decode_all(rows) {
        Ok(decoded) => Outcome::Ok(decoded),
        Err(e) => Outcome::Err(e),
    }
}

/// Execute a compiled query and decode its rows.
///
/// The root statement runs first; each prefetch statement then runs with the
/// keys of the rows its parent statement returned, and its rows are paired
/// onto those parents. Statements run one at a time on `conn`. A prefetch
/// whose parents yield no key is skipped, and the parents get empty lists.
#[tracing::instrument(level = "debug", skip_all, fields(statements = query.statement_count()))]
pub async fn fetch_all<C: Connection>(
    cx: &Cx,
    conn: &C,
    query: &CompiledQuery,
) -> Outcome<Fetched, Error> {
    let mut rows = match run(cx, conn, &query.root).await {
        Outcome::Ok(rows) => rows,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    let mut statements = vec![query.root.clone()];

    match prefetch(cx, conn, &query.prefetches, &mut rows, &mut statements).await {
        Outcome::Ok(()) => {}
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    }

    tracing::debug!(
        rows = rows.len(),
        executed = statements.len(),
        "Fetched association request"
    );
    Outcome::Ok(Fetched { rows, statements })
}

fn prefetch<'a, C: Connection>(
    cx: &'a Cx,
    conn: &'a C,
    plans: &'a [PrefetchPlan],
    parents: &'a mut [DecodedRow],
    statements: &'a mut Vec<CompiledStatement>,
) -> Pin<Box<dyn Future<Output = Outcome<(), Error>> + Send + 'a>> {
    Box::pin(async move {
        for plan in plans {
            let keys = plan.parent_keys(parents);
            let mut children = if keys.is_empty() {
                tracing::debug!(name = %plan.name(), "No parent keys, skipping prefetch");
                Vec::new()
            } else {
                let statement = match plan.render(&keys) {
                    Ok(statement) => statement,
                    Err(e) => return Outcome::Err(e),
                };
                let children = match run(cx, conn, &statement).await {
                    Outcome::Ok(rows) => rows,
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                };
                statements.push(statement);
                children
            };

            match prefetch(cx, conn, plan.children(), &mut children, statements).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }

            pair(
                parents,
                plan.parent_scope(),
                plan.name(),
                plan.parent_key_columns(),
                children,
            );
        }
        Outcome::Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::AssociationSpec;
    use crate::chain::Request;
    use crate::clause::OrderBy;
    use asupersync::runtime::RuntimeBuilder;
    use sqlassoc_core::{Row, Value};
    use sqlassoc_schema::{DatabaseSchema, TableInfo};
    use std::sync::Mutex;

    /// Answers each statement with the next canned result set.
    struct Scripted {
        results: Mutex<Vec<Vec<Row>>>,
        seen: Mutex<Vec<String>>,
    }

    impl Connection for Scripted {
        fn query(
            &self,
            _cx: &Cx,
            sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
            self.seen.lock().unwrap().push(sql.to_string());
            let mut results = self.results.lock().unwrap();
            let rows = if results.is_empty() {
                Vec::new()
            } else {
                results.remove(0)
            };
            async move { Outcome::Ok(rows) }
        }
    }

    fn schema() -> DatabaseSchema {
        DatabaseSchema::new()
            .with_table(TableInfo::new("authors", ["id", "name"]).primary_key(["id"]))
            .with_table(
                TableInfo::new("books", ["id", "authorId", "title"])
                    .primary_key(["id"])
                    .foreign_key("authorId", "authors", "id"),
            )
    }

    fn author(id: i64, name: &str) -> Row {
        Row::new(
            vec!["id".into(), "name".into()],
            vec![Value::BigInt(id), Value::Text(name.into())],
        )
    }

    fn book(id: i64, author_id: i64, title: &str) -> Row {
        Row::new(
            vec![
                "id".into(),
                "authorId".into(),
                "title".into(),
                "__sqlassoc_key_0".into(),
            ],
            vec![
                Value::BigInt(id),
                Value::BigInt(author_id),
                Value::Text(title.into()),
                Value::BigInt(author_id),
            ],
        )
    }

    fn query() -> CompiledQuery {
        let schema = schema();
        let books = AssociationSpec::has_many("books", "authors", "books")
            .build(&schema)
            .unwrap()
            .order_by(OrderBy::asc("title"));
        Request::introspect(&schema, "authors")
            .unwrap()
            .including_optional(books)
            .compile()
            .unwrap()
    }

    #[test]
    fn test_fetch_pairs_children() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let conn = Scripted {
            results: Mutex::new(vec![
                vec![author(1, "Herbert"), author(2, "Le Guin"), author(3, "Banks")],
                vec![book(10, 1, "Dune"), book(11, 2, "Earthsea"), book(12, 1, "Dune Messiah")],
            ]),
            seen: Mutex::new(Vec::new()),
        };
        let query = query();

        rt.block_on(async {
            let Outcome::Ok(fetched) = fetch_all(&cx, &conn, &query).await else {
                panic!("fetch failed");
            };
            assert_eq!(fetched.statements.len(), 2);
            assert_eq!(
                fetched.statements[1].params,
                vec![Value::BigInt(1), Value::BigInt(2), Value::BigInt(3)]
            );
            let herbert = fetched.rows[0].prefetched("books").unwrap();
            assert_eq!(herbert.len(), 2);
            assert_eq!(herbert[1].get_named::<String>("title").unwrap(), "Dune Messiah");
            assert!(fetched.rows[2].prefetched("books").unwrap().is_empty());
        });
    }

    #[test]
    fn test_empty_parent_set_skips_prefetch() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let conn = Scripted {
            results: Mutex::new(vec![Vec::new()]),
            seen: Mutex::new(Vec::new()),
        };
        let query = query();

        rt.block_on(async {
            let Outcome::Ok(fetched) = fetch_all(&cx, &conn, &query).await else {
                panic!("fetch failed");
            };
            assert!(fetched.rows.is_empty());
            assert_eq!(fetched.statements.len(), 1);
        });
        assert_eq!(conn.seen.lock().unwrap().len(), 1);
    }
}
