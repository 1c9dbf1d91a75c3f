//! Recency index: slab-backed intrusive doubly linked list plus a hash index.
//!
//! The head of the list is the most-recently-used entry, the tail the least.
//! Lookup, promote-to-front, push and pop-back are all O(1). Freed slots are
//! recycled so a long-lived cache does not grow its slab without bound.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Recency-ordered map.
#[derive(Debug, Clone)]
pub struct LruIndex<K, V> {
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    map: HashMap<K, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K, V> Default for LruIndex<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> LruIndex<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            map: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Read without changing recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let slot = *self.map.get(key)?;
        self.node(slot).map(|n| &n.value)
    }

    /// Read and promote to most-recently-used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let slot = *self.map.get(key)?;
        self.move_to_front(slot);
        self.node(slot).map(|n| &n.value)
    }

    /// Promote to most-recently-used. Returns false when the key is absent.
    pub fn touch(&mut self, key: &K) -> bool {
        match self.map.get(key).copied() {
            Some(slot) => {
                self.move_to_front(slot);
                true
            }
            None => false,
        }
    }

    /// Insert as most-recently-used, returning the replaced value if the key
    /// was already present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&slot) = self.map.get(&key) {
            self.move_to_front(slot);
            return self
                .slots
                .get_mut(slot)
                .and_then(|s| s.as_mut())
                .map(|n| std::mem::replace(&mut n.value, value));
        }

        let node = Node {
            key: key.clone(),
            value,
            prev: None,
            next: self.head,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        if let Some(old_head) = self.head {
            if let Some(n) = self.node_mut(old_head) {
                n.prev = Some(slot);
            }
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
        self.map.insert(key, slot);
        None
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.map.remove(key)?;
        self.unlink(slot);
        let node = self.slots.get_mut(slot)?.take()?;
        self.free.push(slot);
        Some(node.value)
    }

    /// Key of the least-recently-used entry.
    pub fn peek_lru(&self) -> Option<&K> {
        self.tail.and_then(|slot| self.node(slot)).map(|n| &n.key)
    }

    /// Remove and return the least-recently-used entry.
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        let key = self.peek_lru()?.clone();
        let value = self.remove(&key)?;
        Some((key, value))
    }

    /// Entries from most- to least-recently-used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            index: self,
            cursor: self.head,
        }
    }

    /// Keys from least- to most-recently-used (the order a reload must
    /// re-insert them in to reproduce the same recency).
    pub fn keys_lru_first(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.iter().map(|(k, _)| k.clone()).collect();
        keys.reverse();
        keys
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.map.clear();
        self.head = None;
        self.tail = None;
    }

    fn node(&self, slot: usize) -> Option<&Node<K, V>> {
        self.slots.get(slot).and_then(|s| s.as_ref())
    }

    fn node_mut(&mut self, slot: usize) -> Option<&mut Node<K, V>> {
        self.slots.get_mut(slot).and_then(|s| s.as_mut())
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = match self.node(slot) {
            Some(n) => (n.prev, n.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(n) = self.node_mut(p) {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(nx) => {
                if let Some(n) = self.node_mut(nx) {
                    n.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(n) = self.node_mut(slot) {
            n.prev = None;
            n.next = None;
        }
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);
        let old_head = self.head;
        if let Some(n) = self.node_mut(slot) {
            n.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(n) = self.node_mut(h) {
                n.prev = Some(slot);
            }
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }
}

pub struct Iter<'a, K, V> {
    index: &'a LruIndex<K, V>,
    cursor: Option<usize>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Eq + Hash + Clone,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.index.node(self.cursor?)?;
        self.cursor = node.next;
        Some((&node.key, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(index: &LruIndex<&'static str, u32>) -> Vec<&'static str> {
        index.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn insert_orders_most_recent_first() {
        let mut index = LruIndex::new();
        index.insert("a", 1);
        index.insert("b", 2);
        index.insert("c", 3);
        assert_eq!(keys(&index), vec!["c", "b", "a"]);
        assert_eq!(index.peek_lru(), Some(&"a"));
    }

    #[test]
    fn get_promotes() {
        let mut index = LruIndex::new();
        index.insert("a", 1);
        index.insert("b", 2);
        index.insert("c", 3);
        assert_eq!(index.get(&"a"), Some(&1));
        assert_eq!(keys(&index), vec!["a", "c", "b"]);
        assert_eq!(index.pop_lru(), Some(("b", 2)));
    }

    #[test]
    fn peek_does_not_promote() {
        let mut index = LruIndex::new();
        index.insert("a", 1);
        index.insert("b", 2);
        assert_eq!(index.peek(&"a"), Some(&1));
        assert_eq!(index.peek_lru(), Some(&"a"));
    }

    #[test]
    fn reinsert_replaces_and_promotes() {
        let mut index = LruIndex::new();
        index.insert("a", 1);
        index.insert("b", 2);
        assert_eq!(index.insert("a", 10), Some(1));
        assert_eq!(index.len(), 2);
        assert_eq!(keys(&index), vec!["a", "b"]);
        assert_eq!(index.peek(&"a"), Some(&10));
    }

    #[test]
    fn remove_middle_keeps_links() {
        let mut index = LruIndex::new();
        index.insert("a", 1);
        index.insert("b", 2);
        index.insert("c", 3);
        assert_eq!(index.remove(&"b"), Some(2));
        assert_eq!(keys(&index), vec!["c", "a"]);
        assert_eq!(index.remove(&"b"), None);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut index = LruIndex::new();
        for i in 0..100u32 {
            index.insert(if i % 2 == 0 { "x" } else { "y" }, i);
            index.remove(&"x");
        }
        assert!(index.slots.len() <= 2);
    }

    #[test]
    fn pop_until_empty() {
        let mut index = LruIndex::new();
        index.insert("a", 1);
        index.insert("b", 2);
        assert_eq!(index.pop_lru(), Some(("a", 1)));
        assert_eq!(index.pop_lru(), Some(("b", 2)));
        assert_eq!(index.pop_lru(), None);
        assert!(index.is_empty());
        assert_eq!(index.peek_lru(), None);
    }

    #[test]
    fn keys_lru_first_reverses_iteration() {
        let mut index = LruIndex::new();
        index.insert("a", 1);
        index.insert("b", 2);
        index.touch(&"a");
        assert_eq!(index.keys_lru_first(), vec!["b", "a"]);
    }
}
