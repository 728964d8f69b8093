//! Identity cache with named secondary indexes.
//!
//! Every mapper owns (or is handed) a `CacheContainer`. It holds the
//! primary identity map, so each key resolves to exactly one shared
//! instance, and any number of secondary caches keyed by alternate keys.
//! Whenever an entity is freshly filled the mapper calls
//! [`CacheContainer::on_update`], which re-indexes the entity in every
//! secondary cache. That keeps alternate-key lookups coherent no matter
//! which mapper or selector populated the row.
//!
//! The container is a cheap handle: clones share the same state.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::entity::{Entity, Shared};
use crate::mapper::MapperError;

/// Address of a shared entity, used to recognise it across caches.
fn identity_of<E>(entity: &Shared<E>) -> usize {
    Rc::as_ptr(entity) as *const () as usize
}

/// Alternate-key index over entities of one type.
#[derive(Debug)]
pub struct SecondaryCache<B, E> {
    entries: HashMap<B, Shared<E>>,
    by_entity: HashMap<usize, B>,
}

impl<B: Clone + Eq + Hash, E> SecondaryCache<B, E> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            by_entity: HashMap::new(),
        }
    }

    pub fn get(&self, key: &B) -> Option<Shared<E>> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &B) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point `key` at `entity`, dropping the entity's previous entry if its
    /// alternate key changed.
    fn index(&mut self, key: Option<B>, entity: &Shared<E>) {
        let id = identity_of(entity);
        if let Some(old) = self.by_entity.get(&id)
            && key.as_ref() != Some(old)
        {
            let old = old.clone();
            self.remove_entry(&old, entity);
            self.by_entity.remove(&id);
        }
        if let Some(key) = key {
            self.entries.insert(key.clone(), Rc::clone(entity));
            self.by_entity.insert(id, key);
        }
    }

    fn evict(&mut self, entity: &Shared<E>) {
        if let Some(key) = self.by_entity.remove(&identity_of(entity)) {
            self.remove_entry(&key, entity);
        }
    }

    /// Drop the entry for `key`, e.g. after the store stopped returning it.
    pub(crate) fn forget(&mut self, key: &B) {
        if let Some(entity) = self.entries.remove(key) {
            self.by_entity.remove(&identity_of(&entity));
        }
    }

    fn remove_entry(&mut self, key: &B, entity: &Shared<E>) {
        if self
            .entries
            .get(key)
            .is_some_and(|held| Rc::ptr_eq(held, entity))
        {
            self.entries.remove(key);
        }
    }
}

/// Shared handle to a registered secondary cache.
pub type SecondaryHandle<B, E> = Rc<RefCell<SecondaryCache<B, E>>>;

type Callback<E> = Box<dyn Fn(&Shared<E>)>;

struct Registration<E> {
    name: String,
    cache: Rc<dyn Any>,
    reindex: Callback<E>,
    evict: Callback<E>,
}

struct CacheState<K, E> {
    identity: HashMap<K, Shared<E>>,
    unsaved: Vec<Shared<E>>,
    secondary: Vec<Registration<E>>,
    evict_listeners: Vec<Callback<E>>,
}

/// Per-mapper identity cache.
pub struct CacheContainer<K, E> {
    inner: Rc<RefCell<CacheState<K, E>>>,
}

impl<K, E> Clone for CacheContainer<K, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K, E> fmt::Debug for CacheContainer<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("CacheContainer")
            .field("entities", &state.identity.len())
            .field("unsaved", &state.unsaved.len())
            .field(
                "secondary",
                &state.secondary.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<K, E> Default for CacheContainer<K, E>
where
    K: Clone + Eq + Hash + fmt::Debug + 'static,
    E: Entity<Key = K>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E> CacheContainer<K, E>
where
    K: Clone + Eq + Hash + fmt::Debug + 'static,
    E: Entity<Key = K>,
{
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(CacheState {
                identity: HashMap::new(),
                unsaved: Vec::new(),
                secondary: Vec::new(),
                evict_listeners: Vec::new(),
            })),
        }
    }

    /// Cached instance for `key`.
    pub fn get(&self, key: &K) -> Option<Shared<E>> {
        self.inner.borrow().identity.get(key).cloned()
    }

    /// Cached instance for `key`, creating an unfilled placeholder if
    /// absent. The flag is true when the instance already existed.
    pub fn get_or_create(&self, key: K) -> (Shared<E>, bool) {
        let mut state = self.inner.borrow_mut();
        if let Some(entity) = state.identity.get(&key) {
            return (Rc::clone(entity), true);
        }
        let entity = Rc::new(RefCell::new(E::placeholder(key.clone())));
        state.identity.insert(key, Rc::clone(&entity));
        (entity, false)
    }

    /// Adopt a caller-constructed entity.
    ///
    /// Records without a key are kept on the unsaved list until written.
    /// A persisted key that is already cached under another instance is an
    /// identity conflict.
    pub fn track(&self, entity: &Shared<E>) -> Result<(), MapperError> {
        let key = entity.borrow().key().persisted().cloned();
        let mut state = self.inner.borrow_mut();
        match key {
            None => {
                if !state.unsaved.iter().any(|e| Rc::ptr_eq(e, entity)) {
                    state.unsaved.push(Rc::clone(entity));
                }
                Ok(())
            }
            Some(key) => match state.identity.get(&key) {
                Some(held) if !Rc::ptr_eq(held, entity) => Err(MapperError::IdentityConflict {
                    key: format!("{key:?}"),
                }),
                Some(_) => Ok(()),
                None => {
                    state.identity.insert(key, Rc::clone(entity));
                    Ok(())
                }
            },
        }
    }

    /// Move a just-inserted entity from the unsaved list into the identity
    /// map under `key`.
    pub(crate) fn promote(&self, key: K, entity: &Shared<E>) {
        let mut state = self.inner.borrow_mut();
        state.unsaved.retain(|e| !Rc::ptr_eq(e, entity));
        state.identity.insert(key, Rc::clone(entity));
    }

    /// Drop an entity from the unsaved list without caching it.
    pub(crate) fn forget_unsaved(&self, entity: &Shared<E>) {
        self.inner
            .borrow_mut()
            .unsaved
            .retain(|e| !Rc::ptr_eq(e, entity));
    }

    /// Remove `key` from the identity map and every secondary cache.
    pub fn evict(&self, key: &K) -> Option<Shared<E>> {
        let mut state = self.inner.borrow_mut();
        let entity = state.identity.remove(key)?;
        for registration in &state.secondary {
            (registration.evict)(&entity);
        }
        for listener in &state.evict_listeners {
            listener(&entity);
        }
        Some(entity)
    }

    /// Call `listener` with every entity evicted from now on.
    ///
    /// Listeners run while the cache is borrowed and must not call back
    /// into it.
    pub fn on_evict(&self, listener: impl Fn(&Shared<E>) + 'static) {
        self.inner.borrow_mut().evict_listeners.push(Box::new(listener));
    }

    /// Every cached entity, unsaved ones included. Order is unspecified.
    pub fn entities(&self) -> Vec<Shared<E>> {
        let state = self.inner.borrow();
        state
            .identity
            .values()
            .chain(state.unsaved.iter())
            .cloned()
            .collect()
    }

    /// Number of keyed entities.
    pub fn len(&self) -> usize {
        self.inner.borrow().identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().identity.is_empty()
    }

    /// Number of tracked entities that have no key yet.
    pub fn unsaved_len(&self) -> usize {
        self.inner.borrow().unsaved.len()
    }

    /// Register a named secondary cache, or return the existing one.
    ///
    /// `key_of` derives the alternate key from an entity; `None` leaves
    /// the entity unindexed. Entities already filled are indexed
    /// immediately.
    pub fn request_cache<B, F>(&self, name: &str, key_of: F) -> Result<SecondaryHandle<B, E>, MapperError>
    where
        B: Clone + Eq + Hash + 'static,
        F: Fn(&E) -> Option<B> + 'static,
    {
        let mut state = self.inner.borrow_mut();
        if let Some(existing) = state.secondary.iter().find(|r| r.name == name) {
            return Rc::clone(&existing.cache)
                .downcast::<RefCell<SecondaryCache<B, E>>>()
                .map_err(|_| MapperError::CacheTypeMismatch {
                    name: name.to_string(),
                });
        }

        let cache: SecondaryHandle<B, E> = Rc::new(RefCell::new(SecondaryCache::new()));
        for entity in state.identity.values() {
            let key = {
                let e = entity.borrow();
                if !e.is_filled() {
                    continue;
                }
                key_of(&e)
            };
            cache.borrow_mut().index(key, entity);
        }

        let reindex_cache = Rc::clone(&cache);
        let evict_cache = Rc::clone(&cache);
        state.secondary.push(Registration {
            name: name.to_string(),
            cache: Rc::clone(&cache) as Rc<dyn Any>,
            reindex: Box::new(move |entity: &Shared<E>| {
                let key = key_of(&entity.borrow());
                reindex_cache.borrow_mut().index(key, entity);
            }),
            evict: Box::new(move |entity: &Shared<E>| evict_cache.borrow_mut().evict(entity)),
        });
        Ok(cache)
    }

    /// Broadcast that `entity` was freshly filled.
    pub fn on_update(&self, entity: &Shared<E>) {
        let state = self.inner.borrow();
        for registration in &state.secondary {
            (registration.reindex)(entity);
        }
    }
}
