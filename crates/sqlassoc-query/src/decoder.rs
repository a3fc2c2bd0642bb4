//! Decoding flat result rows into nested scopes.
//!
//! A [`RowScopeTree`] slices each row of a compiled statement according to
//! its [`ColumnLayout`]. Rows of prefetch statements are paired onto their
//! parent rows by key and exposed through [`ScopedRow::prefetched`].

use crate::layout::ColumnLayout;
use sqlassoc_core::{ColumnInfo, Error, FromValue, Result, Row, TypeError, Value, ValueKey};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug)]
struct Shared {
    layout: Arc<ColumnLayout>,
    /// Column names of each scope, indexed like the layout's scopes
    columns: Vec<Arc<ColumnInfo>>,
}

/// Decodes the rows of one compiled statement.
#[derive(Debug, Clone)]
pub struct RowScopeTree {
    layout: Arc<ColumnLayout>,
}

impl RowScopeTree {
    pub fn new(layout: Arc<ColumnLayout>) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Arc<ColumnLayout> {
        &self.layout
    }

    fn check_width(&self, row: &Row) -> Result<()> {
        if row.len() == self.layout.width() {
            return Ok(());
        }
        Err(Error::Type(TypeError {
            expected: "row matching the compiled column layout",
            actual: format!("{} columns, expected {}", row.len(), self.layout.width()),
            column: None,
        }))
    }

    fn shared(&self, row: &Row) -> Arc<Shared> {
        let info = row.column_info();
        Arc::new(Shared {
            layout: Arc::clone(&self.layout),
            columns: self
                .layout
                .scopes()
                .iter()
                .map(|s| Arc::new(info.slice(s.range.clone())))
                .collect(),
        })
    }

    /// Decode one row.
    pub fn decode(&self, row: Row) -> Result<DecodedRow> {
        self.check_width(&row)?;
        Ok(DecodedRow {
            shared: self.shared(&row),
            row,
            prefetched: BTreeMap::new(),
        })
    }

    /// Decode every row of a result set.
    ///
    /// Column names are sliced once, from the first row.
    pub fn decode_all(&self, rows: Vec<Row>) -> Result<Vec<DecodedRow>> {
        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };
        let shared = self.shared(first);
        rows.into_iter()
            .map(|row| {
                self.check_width(&row)?;
                Ok(DecodedRow {
                    shared: Arc::clone(&shared),
                    row,
                    prefetched: BTreeMap::new(),
                })
            })
            .collect()
    }
}

/// One decoded result row, with any prefetched child rows attached.
#[derive(Debug, Clone)]
pub struct DecodedRow {
    row: Row,
    shared: Arc<Shared>,
    prefetched: BTreeMap<(usize, String), Vec<DecodedRow>>,
}

impl DecodedRow {
    /// The raw row, every column included.
    pub fn row(&self) -> &Row {
        &self.row
    }

    pub fn layout(&self) -> &Arc<ColumnLayout> {
        &self.shared.layout
    }

    /// View on the root scope.
    pub fn root(&self) -> ScopedRow<'_> {
        ScopedRow {
            decoded: self,
            scope: 0,
        }
    }

    /// The root scope's own columns.
    pub fn unscoped(&self) -> Row {
        self.root().unscoped()
    }

    pub fn scope_names(&self) -> Vec<&str> {
        self.root().scope_names()
    }

    pub fn scoped(&self, name: &str) -> Option<ScopedRow<'_>> {
        self.root().scoped(name)
    }

    /// Look up a scope by dotted path, e.g. `"book.author"`.
    pub fn scoped_path(&self, path: &str) -> Option<ScopedRow<'_>> {
        path.split('.')
            .try_fold(self.root(), |scope, name| scope.scoped(name))
    }

    pub fn prefetched(&self, name: &str) -> Option<&[DecodedRow]> {
        self.root().prefetched(name)
    }

    pub fn get_named<T: FromValue>(&self, column: &str) -> Result<T> {
        self.root().get_named(column)
    }
}

/// A view on one scope of a [`DecodedRow`].
#[derive(Debug, Clone, Copy)]
pub struct ScopedRow<'a> {
    decoded: &'a DecodedRow,
    scope: usize,
}

impl<'a> ScopedRow<'a> {
    fn layout(&self) -> &'a ColumnLayout {
        &self.decoded.shared.layout
    }

    /// Scope name; empty for the root.
    pub fn name(&self) -> &'a str {
        self.layout().scopes()[self.scope].name.as_str()
    }

    /// Dotted path from the root.
    pub fn path(&self) -> &'a str {
        self.layout().scopes()[self.scope].path.as_str()
    }

    /// Values of this scope's own columns.
    pub fn values(&self) -> &'a [Value] {
        let range = self.layout().scopes()[self.scope].range.clone();
        self.decoded.row.values_in(range)
    }

    /// This scope's own columns, without any child scope.
    pub fn unscoped(&self) -> Row {
        let range = self.layout().scopes()[self.scope].range.clone();
        self.decoded
            .row
            .project(Arc::clone(&self.decoded.shared.columns[self.scope]), range)
    }

    /// Read a column of this scope by name.
    pub fn get_named<T: FromValue>(&self, column: &str) -> Result<T> {
        self.unscoped().get_named(column)
    }

    /// Are all of this scope's values NULL?
    pub fn is_null(&self) -> bool {
        self.values().iter().all(|v| matches!(v, Value::Null))
    }

    /// Names of direct child scopes, in column order.
    pub fn scope_names(&self) -> Vec<&'a str> {
        let layout = self.layout();
        layout.scopes()[self.scope]
            .children
            .iter()
            .map(|&c| layout.scopes()[c].name.as_str())
            .collect()
    }

    /// A child scope.
    ///
    /// Returns `None` for an unknown name, and for a LEFT-joined scope whose
    /// columns are all NULL. A real associated row whose every column is NULL
    /// is indistinguishable from a missing one and is reported the same way.
    pub fn scoped(&self, name: &str) -> Option<ScopedRow<'a>> {
        let layout = self.layout();
        let child = layout.child(self.scope, name)?;
        let scoped = ScopedRow {
            decoded: self.decoded,
            scope: child,
        };
        if layout.scopes()[child].nullable && scoped.is_null() {
            return None;
        }
        Some(scoped)
    }

    /// Rows of a to-many include paired onto this scope.
    ///
    /// `None` until the prefetch statement has run.
    pub fn prefetched(&self, name: &str) -> Option<&'a [DecodedRow]> {
        self.decoded
            .prefetched
            .get(&(self.scope, name.to_string()))
            .map(Vec::as_slice)
    }
}

/// Attach `children` to `parents` under `(scope, name)`, matching each
/// child's pairing columns against the parent's key columns.
///
/// Children keep their statement order. Parents with a NULL key or no match
/// get an empty list.
pub(crate) fn pair(
    parents: &mut [DecodedRow],
    scope: usize,
    name: &str,
    key_columns: &[usize],
    children: Vec<DecodedRow>,
) {
    let mut groups: HashMap<Vec<ValueKey>, Vec<DecodedRow>> = HashMap::new();
    for child in children {
        let Some(range) = child.shared.layout.pairing() else {
            continue;
        };
        let key = child
            .row
            .values_in(range)
            .iter()
            .map(Value::key)
            .collect::<Option<Vec<_>>>();
        if let Some(key) = key {
            groups.entry(key).or_default().push(child);
        }
    }

    let paired = groups.values().map(Vec::len).sum::<usize>();
    tracing::trace!(name, parents = parents.len(), paired, "Pairing prefetched rows");

    for parent in parents {
        let key = key_columns
            .iter()
            .map(|&i| parent.row.get(i).and_then(Value::key))
            .collect::<Option<Vec<_>>>();
        let matched = key
            .and_then(|k| groups.get(&k))
            .cloned()
            .unwrap_or_default();
        parent.prefetched.insert((scope, name.to_string()), matched);
    }
}
