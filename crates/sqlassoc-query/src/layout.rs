//! Column layouts of compiled statements.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One named scope of a statement's result rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeLayout {
    /// Dotted path from the root; empty for the root
    pub path: String,
    /// Scope key; empty for the root
    pub name: String,
    /// Columns owned by this scope, excluding its children
    pub range: Range<usize>,
    /// Reached through a LEFT JOIN
    pub nullable: bool,
    pub parent: Option<usize>,
    /// Indexes of direct child scopes, in emission order
    pub children: Vec<usize>,
    /// Names of to-many includes paired onto this scope by later statements
    pub prefetched: Vec<String>,
}

/// How a statement's columns partition into scopes.
///
/// Scopes are listed depth-first, root first, which is also the order their
/// column ranges appear in the `SELECT` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    scopes: Vec<ScopeLayout>,
    pairing: Option<Range<usize>>,
    width: usize,
}

impl ColumnLayout {
    /// A layout with only a root scope of `width` columns.
    pub(crate) fn new(width: usize) -> Self {
        Self {
            scopes: vec![ScopeLayout {
                path: String::new(),
                name: String::new(),
                range: 0..width,
                nullable: false,
                parent: None,
                children: Vec::new(),
                prefetched: Vec::new(),
            }],
            pairing: None,
            width,
        }
    }

    /// Append a child scope of `width` columns after every existing column.
    pub(crate) fn push_scope(
        &mut self,
        parent: usize,
        name: &str,
        width: usize,
        nullable: bool,
    ) -> usize {
        let path = match self.scopes[parent].path.as_str() {
            "" => name.to_string(),
            parent_path => format!("{parent_path}.{name}"),
        };
        let index = self.scopes.len();
        self.scopes.push(ScopeLayout {
            path,
            name: name.to_string(),
            range: self.width..self.width + width,
            nullable,
            parent: Some(parent),
            children: Vec::new(),
            prefetched: Vec::new(),
        });
        self.scopes[parent].children.push(index);
        self.width += width;
        index
    }

    pub(crate) fn push_prefetched(&mut self, scope: usize, name: &str) {
        self.scopes[scope].prefetched.push(name.to_string());
    }

    /// Append the hidden pairing-key columns.
    pub(crate) fn push_pairing(&mut self, width: usize) {
        self.pairing = Some(self.width..self.width + width);
        self.width += width;
    }

    pub fn root(&self) -> &ScopeLayout {
        &self.scopes[0]
    }

    pub fn scopes(&self) -> &[ScopeLayout] {
        &self.scopes
    }

    pub fn scope(&self, index: usize) -> Option<&ScopeLayout> {
        self.scopes.get(index)
    }

    /// Find a scope by dotted path (`""` is the root).
    pub fn find(&self, path: &str) -> Option<usize> {
        self.scopes.iter().position(|s| s.path == path)
    }

    /// Find a direct child scope by name.
    pub fn child(&self, scope: usize, name: &str) -> Option<usize> {
        self.scopes
            .get(scope)?
            .children
            .iter()
            .copied()
            .find(|&c| self.scopes[c].name == name)
    }

    /// `(scope path, column range)` pairs in emission order.
    pub fn ranges(&self) -> Vec<(&str, Range<usize>)> {
        self.scopes
            .iter()
            .map(|s| (s.path.as_str(), s.range.clone()))
            .collect()
    }

    /// Columns holding the pairing key of a prefetch statement.
    pub fn pairing(&self) -> Option<Range<usize>> {
        self.pairing.clone()
    }

    /// Total number of columns a row of this statement has.
    pub fn width(&self) -> usize {
        self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_are_contiguous() {
        let mut layout = ColumnLayout::new(4);
        let b = layout.push_scope(0, "b", 2, false);
        let c = layout.push_scope(b, "c", 3, true);
        layout.push_pairing(1);
        assert_eq!(
            layout.ranges(),
            vec![("", 0..4), ("b", 4..6), ("b.c", 6..9)]
        );
        assert_eq!(layout.find("b.c"), Some(c));
        assert_eq!(layout.child(0, "b"), Some(b));
        assert_eq!(layout.child(0, "c"), None);
        assert_eq!(layout.pairing(), Some(9..10));
        assert_eq!(layout.width(), 10);
    }

    #[test]
    fn test_layout_serializes() {
        let mut layout = ColumnLayout::new(2);
        layout.push_scope(0, "author", 3, true);
        let json = serde_json::to_string(&layout).unwrap();
        let back: ColumnLayout = serde_json::from_str(&json).unwrap();
        assert_eq!(back, layout);
    }
}
