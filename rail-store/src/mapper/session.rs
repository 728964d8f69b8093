//! Batch session bookkeeping shared by every mapper and selector.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::driver::Value;
use crate::query::{Filter, Select, Statement};

use super::error::MapperError;

/// How a select session resolves its registered keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectStrategy {
    /// One `WHERE key IN (...)` query over exactly the registered keys.
    #[default]
    MultiKey,
    /// One unconditional scan; rows are matched against the registered
    /// keys client side and the rest are discarded.
    All,
}

/// Which buffered operation a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Select,
    Update,
    Delete,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Select => f.write_str("select"),
            SessionKind::Update => f.write_str("update"),
            SessionKind::Delete => f.write_str("delete"),
        }
    }
}

/// At most one open session of one kind.
#[derive(Debug)]
pub(crate) struct SessionSlot<T> {
    kind: SessionKind,
    open: Option<T>,
}

impl<T> SessionSlot<T> {
    pub(crate) fn new(kind: SessionKind) -> Self {
        Self { kind, open: None }
    }

    pub(crate) fn begin(&mut self, session: T) -> Result<(), MapperError> {
        if self.open.is_some() {
            return Err(MapperError::SessionAlreadyOpen(self.kind));
        }
        self.open = Some(session);
        Ok(())
    }

    pub(crate) fn end(&mut self) -> Result<T, MapperError> {
        self.open.take().ok_or(MapperError::NoSession(self.kind))
    }

    pub(crate) fn get_mut(&mut self) -> Option<&mut T> {
        self.open.as_mut()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.is_some()
    }
}

/// Registrations awaiting resolution, in registration order.
#[derive(Debug)]
pub(crate) struct Pending<K, T> {
    order: Vec<K>,
    entries: HashMap<K, T>,
}

impl<K: Clone + Eq + Hash + fmt::Debug, T> Pending<K, T> {
    pub(crate) fn new() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    pub(crate) fn single(key: K, item: T) -> Self {
        let mut pending = Self::new();
        pending.order.push(key.clone());
        pending.entries.insert(key, item);
        pending
    }

    /// Register `item` under `key`.
    ///
    /// Registering the same item again is a no-op; a different item for a
    /// pending key is rejected.
    pub(crate) fn register(
        &mut self,
        key: K,
        item: T,
        same: impl Fn(&T, &T) -> bool,
    ) -> Result<(), MapperError> {
        match self.entries.get(&key) {
            Some(existing) if same(existing, &item) => Ok(()),
            Some(_) => Err(MapperError::DuplicateRegistration {
                key: format!("{key:?}"),
            }),
            None => {
                self.order.push(key.clone());
                self.entries.insert(key, item);
                Ok(())
            }
        }
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.order
    }

    pub(crate) fn get(&self, key: &K) -> Option<&T> {
        self.entries.get(key)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|k| self.entries.get(k))
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// An open select session.
#[derive(Debug)]
pub(crate) struct SelectSession<K, T> {
    pub(crate) strategy: SelectStrategy,
    pub(crate) pending: Pending<K, T>,
}

impl<K: Clone + Eq + Hash + fmt::Debug, T> SelectSession<K, T> {
    pub(crate) fn new(strategy: SelectStrategy) -> Self {
        Self {
            strategy,
            pending: Pending::new(),
        }
    }
}

/// Statement and bound values resolving a batch of keys on `column`.
pub(crate) fn batch_statement(
    base: &Select,
    strategy: SelectStrategy,
    column: &str,
    keys: Vec<Value>,
) -> (Statement, Vec<Value>) {
    match strategy {
        SelectStrategy::MultiKey => (base.clone().where_in(column, keys.len()).build(), keys),
        SelectStrategy::All => (base.build(), Vec::new()),
    }
}
