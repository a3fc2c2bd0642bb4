#![allow(dead_code)]

use sqlassoc::prelude::*;
use sqlassoc::SchemaIntrospector;
use std::future::Future;
use std::sync::Mutex;

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// authors, books, chapters, persons.
pub fn library() -> DatabaseSchema {
    DatabaseSchema::new()
        .with_table(TableInfo::new("authors", ["id", "name", "birthYear"]).primary_key(["id"]))
        .with_table(
            TableInfo::new("books", ["id", "authorId", "title", "year"])
                .primary_key(["id"])
                .foreign_key("authorId", "authors", "id"),
        )
        .with_table(
            TableInfo::new("chapters", ["id", "bookId", "position"])
                .primary_key(["id"])
                .foreign_key("bookId", "books", "id"),
        )
        .with_table(
            TableInfo::new("persons", ["id", "parentId"])
                .primary_key(["id"])
                .foreign_key("parentId", "persons", "id"),
        )
}

pub fn request(schema: &dyn SchemaIntrospector, table: &str) -> Request {
    Request::introspect(schema, table).expect("table exists")
}

pub fn author() -> AssociationSpec {
    AssociationSpec::belongs_to("author", "books", "authors")
        .foreign_key("authorId")
        .build(&library())
        .expect("books.authorId references authors")
}

pub fn books() -> AssociationSpec {
    AssociationSpec::has_many("books", "authors", "books")
        .build(&library())
        .expect("books.authorId references authors")
}

pub fn chapters() -> AssociationSpec {
    AssociationSpec::has_many("chapters", "books", "chapters")
        .build(&library())
        .expect("chapters.bookId references books")
}

pub fn book() -> AssociationSpec {
    AssociationSpec::belongs_to("book", "chapters", "books")
        .build(&library())
        .expect("chapters.bookId references books")
}

pub fn parent() -> AssociationSpec {
    AssociationSpec::belongs_to("parent", "persons", "persons")
        .build(&library())
        .expect("persons.parentId references persons")
}

/// Build a row from `(column, value)` pairs.
pub fn row(columns: &[(&str, Value)]) -> Row {
    Row::new(
        columns.iter().map(|(c, _)| (*c).to_string()).collect(),
        columns.iter().map(|(_, v)| v.clone()).collect(),
    )
}

/// A connection that answers each statement with the next scripted result
/// set and records what it was asked to run.
#[derive(Default)]
pub struct RecordingConnection {
    results: Mutex<Vec<Vec<Row>>>,
    executed: Mutex<Vec<(String, Vec<Value>)>>,
}

impl RecordingConnection {
    pub fn new(results: Vec<Vec<Row>>) -> Self {
        Self {
            results: Mutex::new(results),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<(String, Vec<Value>)> {
        self.executed.lock().expect("lock").clone()
    }
}

impl Connection for RecordingConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.executed
            .lock()
            .expect("lock")
            .push((sql.to_string(), params.to_vec()));
        let mut results = self.results.lock().expect("lock");
        let rows = if results.is_empty() {
            Vec::new()
        } else {
            results.remove(0)
        };
        async move { Outcome::Ok(rows) }
    }
}
