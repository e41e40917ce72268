//! Injected storage interface for the backend service stubs.
//!
//! Business logic only sees this trait, so the in-memory map can be replaced
//! by any persistent store without touching the handlers.

use dashmap::DashMap;

/// Keyed entity storage.
pub trait EntityStore<T: Clone>: Send + Sync {
    fn get(&self, id: &str) -> Option<T>;
    fn put(&self, id: &str, value: T);
    fn remove(&self, id: &str) -> Option<T>;
    fn list(&self) -> Vec<T>;

    fn len(&self) -> usize {
        self.list().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Concurrent in-memory store.
#[derive(Default)]
pub struct MemoryStore<T> {
    entries: DashMap<String, T>,
}

impl<T: Clone> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T: Clone + Send + Sync> EntityStore<T> for MemoryStore<T> {
    fn get(&self, id: &str) -> Option<T> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    fn put(&self, id: &str, value: T) {
        self.entries.insert(id.to_string(), value);
    }

    fn remove(&self, id: &str) -> Option<T> {
        self.entries.remove(id).map(|(_, value)| value)
    }

    fn list(&self) -> Vec<T> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
