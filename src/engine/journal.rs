use std::{collections::HashMap, hash::Hash};

/// Hash map that can record its own mutations and undo them.
///
/// While recording, every insert and remove logs the previous entry of the
/// key. `rollback` replays the log backwards, `commit` forgets it.
#[derive(Debug, Clone)]
pub struct JournaledMap<K, V> {
    current: HashMap<K, V>,
    undo: Vec<(K, Option<V>)>,
    recording: bool,
}

impl<K, V> Default for JournaledMap<K, V> {
    fn default() -> Self {
        Self {
            current: HashMap::new(),
            undo: Vec::new(),
            recording: false,
        }
    }
}

impl<K, V> JournaledMap<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.current.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.current.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.current.iter()
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.current.insert(key.clone(), value);

        if self.recording {
            self.undo.push((key, previous.clone()));
        }

        previous
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let previous = self.current.remove(key);

        if self.recording && previous.is_some() {
            self.undo.push((key.clone(), previous.clone()));
        }

        previous
    }

    pub fn begin(&mut self) {
        self.undo.clear();
        self.recording = true;
    }

    pub fn commit(&mut self) {
        self.undo.clear();
        self.recording = false;
    }

    pub fn rollback(&mut self) {
        self.recording = false;

        while let Some((key, previous)) = self.undo.pop() {
            match previous {
                Some(value) => self.current.insert(key, value),
                None => self.current.remove(&key),
            };
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Replaces all entries, dropping any pending journal.
    pub fn reset<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.undo.clear();
        self.recording = false;
        self.current = entries.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_restores_inserted_and_removed_keys() {
        let mut m = JournaledMap::<u32, &str>::new();
        m.insert(1, "a");
        m.insert(2, "b");

        m.begin();
        m.insert(1, "x");
        m.insert(3, "c");
        m.remove(&2);
        m.insert(1, "y");
        m.rollback();

        assert_eq!(m.get(&1), Some(&"a"));
        assert_eq!(m.get(&2), Some(&"b"));
        assert_eq!(m.get(&3), None);
        assert_eq!(m.len(), 2);
        assert!(!m.is_recording());
    }

    #[test]
    fn commit_keeps_changes() {
        let mut m = JournaledMap::<u32, u32>::new();

        m.begin();
        m.insert(7, 1);
        m.commit();
        m.rollback();

        assert_eq!(m.get(&7), Some(&1));
    }

    #[test]
    fn mutations_outside_a_transaction_are_not_logged() {
        let mut m = JournaledMap::<u32, u32>::new();

        m.insert(1, 1);
        m.rollback();

        assert_eq!(m.get(&1), Some(&1));
    }
}
