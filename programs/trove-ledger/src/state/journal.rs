use std::{collections::BTreeMap, ops::Deref};

/// Undo log behind [`Ledger::transact`](super::Ledger::transact). Checkpoints do not nest.
pub trait Journal {
    fn checkpoint(&mut self);
    /// Keeps every write made since the checkpoint.
    fn commit(&mut self);
    /// Puts back the state as of the checkpoint.
    fn rollback(&mut self);
}

/// Map that records the first prior value of each key it writes while a checkpoint is open.
/// Reads go through `Deref`.
#[derive(Clone, Debug)]
pub struct JournaledMap<K, V> {
    entries: BTreeMap<K, V>,
    // `None` value: the key was absent
    undo: Option<BTreeMap<K, Option<V>>>,
}

impl<K, V> Default for JournaledMap<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            undo: None,
        }
    }
}

impl<K: Ord + Clone, V: Clone> JournaledMap<K, V> {
    fn record(&mut self, key: &K) {
        if let Some(undo) = self.undo.as_mut() {
            if !undo.contains_key(key) {
                undo.insert(key.clone(), self.entries.get(key).cloned());
            }
        }
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.record(key);
        self.entries.get_mut(key)
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.record(&key);
        self.entries.insert(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.record(key);
        self.entries.remove(key)
    }

    pub fn entry_or_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.record(&key);
        self.entries.entry(key).or_default()
    }

    /// Number of keys the open checkpoint would restore.
    pub fn touched(&self) -> usize {
        self.undo.as_ref().map_or(0, BTreeMap::len)
    }
}

impl<K, V> Deref for JournaledMap<K, V> {
    type Target = BTreeMap<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl<K: Ord + Clone, V: Clone> Journal for JournaledMap<K, V> {
    fn checkpoint(&mut self) {
        self.undo = Some(BTreeMap::new());
    }

    fn commit(&mut self) {
        self.undo = None;
    }

    fn rollback(&mut self) {
        for (key, value) in self.undo.take().unwrap_or_default() {
            match value {
                Some(value) => self.entries.insert(key, value),
                None => self.entries.remove(&key),
            };
        }
    }
}

/// Vector limited to `push` and `swap_remove`, journaled the same way as [`JournaledMap`].
#[derive(Clone, Debug)]
pub struct JournaledVec<T> {
    items: Vec<T>,
    // length at the checkpoint, prior value of every slot below it that was overwritten or popped
    undo: Option<(usize, BTreeMap<usize, T>)>,
}

impl<T> Default for JournaledVec<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            undo: None,
        }
    }
}

impl<T: Clone> JournaledVec<T> {
    fn record(&mut self, index: usize) {
        if let Some((len, saved)) = self.undo.as_mut() {
            if index < *len && !saved.contains_key(&index) {
                if let Some(item) = self.items.get(index) {
                    saved.insert(index, item.clone());
                }
            }
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Panics if `index` is out of bounds, like [`Vec::swap_remove`].
    pub fn swap_remove(&mut self, index: usize) -> T {
        self.record(index);
        if let Some(last) = self.items.len().checked_sub(1) {
            self.record(last);
        }
        self.items.swap_remove(index)
    }
}

impl<T> Deref for JournaledVec<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl<T: PartialEq> PartialEq<Vec<T>> for JournaledVec<T> {
    fn eq(&self, other: &Vec<T>) -> bool {
        &self.items == other
    }
}

impl<T: Clone> Journal for JournaledVec<T> {
    fn checkpoint(&mut self) {
        self.undo = Some((self.items.len(), BTreeMap::new()));
    }

    fn commit(&mut self) {
        self.undo = None;
    }

    fn rollback(&mut self) {
        let (len, saved) = match self.undo.take() {
            Some(undo) => undo,
            None => return,
        };
        self.items.truncate(len);
        // slots at or past the current length were all popped, so they come back in order
        for (index, item) in saved {
            if index < self.items.len() {
                self.items[index] = item;
            } else {
                self.items.push(item);
            }
        }
    }
}
