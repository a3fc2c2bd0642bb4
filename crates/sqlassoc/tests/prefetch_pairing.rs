mod support;

use asupersync::runtime::RuntimeBuilder;
use sqlassoc::prelude::*;
use support::{
    RecordingConnection, author, books, chapters, library, request, row, unwrap_outcome,
};

fn sqlite() -> QueryCompiler {
    QueryCompiler::new(CompilerConfig::new(Dialect::Sqlite))
}

fn author_row(id: i64, name: &str) -> Row {
    row(&[
        ("id", Value::BigInt(id)),
        ("name", Value::Text(name.into())),
        ("birthYear", Value::Null),
    ])
}

fn book_row(id: i64, author_id: i64, title: &str) -> Row {
    row(&[
        ("id", Value::BigInt(id)),
        ("authorId", Value::BigInt(author_id)),
        ("title", Value::Text(title.into())),
        ("year", Value::Null),
        ("__sqlassoc_key_0", Value::BigInt(author_id)),
    ])
}

fn chapter_row(id: i64, book_id: i64, position: i64) -> Row {
    row(&[
        ("id", Value::BigInt(id)),
        ("bookId", Value::BigInt(book_id)),
        ("position", Value::BigInt(position)),
        ("__sqlassoc_key_0", Value::BigInt(book_id)),
    ])
}

#[test]
fn has_many_include_runs_one_statement_per_level() {
    let schema = library();
    let query = sqlite()
        .compile(&request(&schema, "authors").including_optional(books().order_by(OrderBy::asc("title"))))
        .unwrap();
    assert_eq!(query.sql(), "SELECT \"authors\".* FROM \"authors\"");
    assert_eq!(query.statement_count(), 2);

    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = RecordingConnection::new(vec![
        vec![author_row(1, "Herbert"), author_row(2, "Le Guin"), author_row(1, "Herbert")],
        vec![
            book_row(10, 1, "Children of Dune"),
            book_row(11, 2, "Earthsea"),
            book_row(12, 1, "Dune"),
        ],
    ]);

    rt.block_on(async {
        let fetched = unwrap_outcome(fetch_all(&cx, &conn, &query).await);
        assert_eq!(fetched.rows.len(), 3);

        let herbert = fetched.rows[0].prefetched("books").unwrap();
        let titles: Vec<String> = herbert
            .iter()
            .map(|b| b.get_named::<String>("title").unwrap())
            .collect();
        assert_eq!(titles, vec!["Children of Dune", "Dune"]);
        assert_eq!(fetched.rows[1].prefetched("books").unwrap().len(), 1);
        assert_eq!(fetched.rows[2].prefetched("books").unwrap().len(), 2);
    });

    let executed = conn.executed();
    assert_eq!(executed.len(), 2);
    assert_eq!(
        executed[1].0,
        "SELECT \"books\".*, \"books\".\"authorId\" AS \"__sqlassoc_key_0\" FROM \"books\" WHERE \"books\".\"authorId\" IN (?1, ?2) ORDER BY \"books\".\"title\" ASC"
    );
    assert_eq!(executed[1].1, vec![Value::BigInt(1), Value::BigInt(2)]);
}

#[test]
fn nested_prefetch_uses_keys_of_prefetched_rows() {
    let schema = library();
    let query = sqlite()
        .compile(
            &request(&schema, "authors")
                .including_optional(ChainNode::from(books()).including_optional(chapters())),
        )
        .unwrap();
    assert_eq!(query.statement_count(), 3);

    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = RecordingConnection::new(vec![
        vec![author_row(1, "Herbert")],
        vec![book_row(10, 1, "Dune"), book_row(12, 1, "Dune Messiah")],
        vec![chapter_row(100, 12, 1), chapter_row(101, 10, 1), chapter_row(102, 10, 2)],
    ]);

    rt.block_on(async {
        let fetched = unwrap_outcome(fetch_all(&cx, &conn, &query).await);
        assert_eq!(fetched.statements.len(), 3);
        let books = fetched.rows[0].prefetched("books").unwrap();
        let dune = books[0].prefetched("chapters").unwrap();
        assert_eq!(dune.len(), 2);
        assert_eq!(dune[0].get_named::<i64>("id").unwrap(), 101);
        assert_eq!(books[1].prefetched("chapters").unwrap().len(), 1);
    });

    let executed = conn.executed();
    assert_eq!(
        executed[2].0,
        "SELECT \"chapters\".*, \"chapters\".\"bookId\" AS \"__sqlassoc_key_0\" FROM \"chapters\" WHERE \"chapters\".\"bookId\" IN (?1, ?2)"
    );
    assert_eq!(executed[2].1, vec![Value::BigInt(10), Value::BigInt(12)]);
}

#[test]
fn prefetch_below_joined_scope_pairs_onto_that_scope() {
    let schema = library();
    let query = sqlite()
        .compile(
            &request(&schema, "books")
                .including_required(ChainNode::from(author()).including_optional(books().named("bibliography"))),
        )
        .unwrap();
    assert_eq!(
        query.sql(),
        "SELECT \"books\".*, \"authors\".* FROM \"books\" JOIN \"authors\" ON \"authors\".\"id\" = \"books\".\"authorId\""
    );
    assert_eq!(query.prefetches[0].parent_key_columns(), &[4]);

    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let joined = |book: i64, author: i64| {
        row(&[
            ("id", Value::BigInt(book)),
            ("authorId", Value::BigInt(author)),
            ("title", Value::Null),
            ("year", Value::Null),
            ("id", Value::BigInt(author)),
            ("name", Value::Null),
            ("birthYear", Value::Null),
        ])
    };
    let conn = RecordingConnection::new(vec![
        vec![joined(10, 1), joined(11, 2)],
        vec![book_row(10, 1, "Dune"), book_row(12, 1, "Dune Messiah")],
    ]);

    rt.block_on(async {
        let fetched = unwrap_outcome(fetch_all(&cx, &conn, &query).await);
        let first = fetched.rows[0].scoped("author").unwrap();
        assert_eq!(first.prefetched("bibliography").unwrap().len(), 2);
        let second = fetched.rows[1].scoped("author").unwrap();
        assert!(second.prefetched("bibliography").unwrap().is_empty());
        assert!(fetched.rows[0].prefetched("bibliography").is_none());
    });
}

#[test]
fn required_has_many_filters_parents_with_exists() {
    let schema = library();
    let query = sqlite()
        .compile(&request(&schema, "authors").including_required(books().filter(Expr::col("year").lt(1970))))
        .unwrap();
    assert_eq!(
        query.sql(),
        "SELECT \"authors\".* FROM \"authors\" WHERE EXISTS (SELECT 1 FROM \"books\" WHERE \"books\".\"authorId\" = \"authors\".\"id\" AND \"books\".\"year\" < ?1)"
    );
    assert_eq!(query.params(), &[Value::Int(1970)]);

    let stmt = query.prefetches[0].render(&[vec![Value::BigInt(3)]]).unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT \"books\".*, \"books\".\"authorId\" AS \"__sqlassoc_key_0\" FROM \"books\" WHERE \"books\".\"authorId\" IN (?1) AND \"books\".\"year\" < ?2"
    );
}

#[test]
fn no_parent_keys_skips_the_prefetch_statement() {
    let schema = library();
    let query = sqlite()
        .compile(&request(&schema, "authors").including_optional(books()))
        .unwrap();

    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let conn = RecordingConnection::new(vec![Vec::new()]);

    rt.block_on(async {
        let fetched = unwrap_outcome(fetch_all(&cx, &conn, &query).await);
        assert!(fetched.rows.is_empty());
        assert_eq!(fetched.statements.len(), 1);
    });
    assert_eq!(conn.executed().len(), 1);
}
