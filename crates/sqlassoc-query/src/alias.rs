//! Table aliases and per-statement alias allocation.

use crate::expr::Expr;
use crate::expr::TableRef;
use serde::{Deserialize, Serialize};
use sqlassoc_core::{AssociationError, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A handle on one table instance within a compiled statement.
///
/// Cloned handles are the same alias: attach a handle to a request or chain
/// node and use [`TableAlias::col`] to reference that table from filters and
/// orderings anywhere else in the request. A handle created with
/// [`TableAlias::named`] is *locked* and renders verbatim; an unnamed handle
/// gets whatever name the [`AliasAllocator`] derives for its table.
#[derive(Clone, Default)]
pub struct TableAlias {
    inner: Arc<AliasInner>,
}

#[derive(Default)]
struct AliasInner {
    name: Option<String>,
}

impl TableAlias {
    /// An unlocked alias: its name is derived from the table at compile time.
    pub fn new() -> Self {
        Self::default()
    }

    /// A locked alias with an explicit SQL name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(AliasInner {
                name: Some(name.into()),
            }),
        }
    }

    /// The locked name, if any.
    pub fn locked_name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Is this alias locked to an explicit name?
    pub fn is_locked(&self) -> bool {
        self.inner.name.is_some()
    }

    /// Reference a column of the aliased table.
    pub fn col(&self, name: impl Into<String>) -> Expr {
        Expr::Column {
            table: TableRef::Alias(self.clone()),
            name: name.into(),
        }
    }

    /// Identity key; equal for clones of the same handle.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl PartialEq for TableAlias {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for TableAlias {}

impl fmt::Debug for TableAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.name {
            Some(name) => write!(f, "TableAlias({name:?})"),
            None => write!(f, "TableAlias(#{:x})", self.id()),
        }
    }
}

/// How unlocked instances of a repeated table are numbered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AliasNumbering {
    /// The first free instance keeps the bare table name; later ones get the
    /// smallest unused suffix: `persons`, `persons1`, `persons2`.
    #[default]
    KeepFirst,
    /// When a table's bare name is ambiguous within the statement, every
    /// unlocked instance is numbered from 1: `persons1`, `persons2`.
    NumberAll,
}

/// A table instance registered with an [`AliasAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Assigns unique aliases to the table instances of one statement.
///
/// Slots are added in traversal order (root, then depth-first children).
/// Handles are attached in registration order, descendants before their
/// ancestors and the base request last; when two locked names collide, the
/// one registered later is reported.
#[derive(Debug)]
pub struct AliasAllocator {
    numbering: AliasNumbering,
    tables: Vec<String>,
    registrations: Vec<(SlotId, TableAlias)>,
}

/// The aliases chosen for one statement.
#[derive(Debug, Clone)]
pub struct AliasMap {
    names: Vec<String>,
    handles: HashMap<usize, SlotId>,
}

impl AliasAllocator {
    pub fn new(numbering: AliasNumbering) -> Self {
        Self {
            numbering,
            tables: Vec::new(),
            registrations: Vec::new(),
        }
    }

    /// Register a table instance. Call in traversal order.
    pub fn add_slot(&mut self, table: &str) -> SlotId {
        self.tables.push(table.to_string());
        SlotId(self.tables.len() - 1)
    }

    /// Bind a handle to a slot. Call in registration order.
    pub fn attach(&mut self, slot: SlotId, alias: &TableAlias) {
        self.registrations.push((slot, alias.clone()));
    }

    /// Number of registered slots.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Resolve every slot to a unique name.
    pub fn allocate(self) -> Result<AliasMap> {
        let mut locked: Vec<Option<String>> = vec![None; self.tables.len()];
        let mut handles: HashMap<usize, SlotId> = HashMap::new();
        let mut taken: HashSet<String> = HashSet::new();

        // Pass 1: locked names, in registration order.
        for (slot, alias) in &self.registrations {
            if let Some(previous) = handles.insert(alias.id(), *slot) {
                if previous != *slot {
                    let shown = alias
                        .locked_name()
                        .unwrap_or(self.tables[slot.0].as_str());
                    return Err(AssociationError::alias_conflict(shown).into());
                }
                continue;
            }
            let Some(name) = alias.locked_name() else {
                continue;
            };
            match &locked[slot.0] {
                Some(existing) if existing == name => continue,
                Some(_) => return Err(AssociationError::alias_conflict(name).into()),
                None => {}
            }
            if !taken.insert(name.to_lowercase()) {
                return Err(AssociationError::alias_conflict(name).into());
            }
            locked[slot.0] = Some(name.to_string());
        }

        // Pass 2: derived names, in traversal order.
        let mut unlocked_count: HashMap<String, usize> = HashMap::new();
        for (table, name) in self.tables.iter().zip(&locked) {
            if name.is_none() {
                *unlocked_count.entry(table.to_lowercase()).or_default() += 1;
            }
        }

        let mut names = Vec::with_capacity(self.tables.len());
        for (table, name) in self.tables.iter().zip(locked) {
            if let Some(name) = name {
                names.push(name);
                continue;
            }
            let lower = table.to_lowercase();
            let ambiguous = unlocked_count.get(&lower).copied().unwrap_or(0) > 1
                || taken.contains(&lower);
            let bare_allowed = match self.numbering {
                AliasNumbering::KeepFirst => !taken.contains(&lower),
                AliasNumbering::NumberAll => !ambiguous,
            };
            let derived = if bare_allowed {
                table.clone()
            } else {
                let mut n = 1usize;
                loop {
                    let candidate = format!("{table}{n}");
                    if !taken.contains(&candidate.to_lowercase()) {
                        break candidate;
                    }
                    n += 1;
                }
            };
            taken.insert(derived.to_lowercase());
            names.push(derived);
        }

        tracing::trace!(aliases = ?names, "Allocated table aliases");

        Ok(AliasMap { names, handles })
    }
}

impl AliasMap {
    /// The alias of a slot.
    pub fn name(&self, slot: SlotId) -> &str {
        &self.names[slot.0]
    }

    /// The slot a handle is attached to, if it belongs to this statement.
    pub fn slot_of(&self, alias: &TableAlias) -> Option<SlotId> {
        self.handles.get(&alias.id()).copied()
    }

    /// The alias a handle resolves to, if it belongs to this statement.
    pub fn resolve(&self, alias: &TableAlias) -> Option<&str> {
        self.slot_of(alias).map(|slot| self.name(slot))
    }

    /// All aliases in slot order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}
