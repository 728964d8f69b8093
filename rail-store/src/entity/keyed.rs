//! Key/value holder for aggregate lookups.

/// An immutable key with a mutable value slot.
///
/// Used where the loaded "record" is a derived scalar, such as the highest
/// stop ordinal of a train. `None` means the aggregate produced no row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedValue<K, V> {
    key: K,
    value: Option<V>,
}

impl<K, V> KeyedValue<K, V> {
    pub fn new(key: K) -> Self {
        Self { key, value: None }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn set(&mut self, value: V) {
        self.value = Some(value);
    }

    pub fn clear(&mut self) {
        self.value = None;
    }
}
