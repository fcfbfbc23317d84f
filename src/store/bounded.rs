//! Capacity-limited, observable record store.
//!
//! # Responsibilities
//! - Keep at most `capacity` records in append order
//! - Evict the oldest record when an append overflows (strict FIFO)
//! - Update records in place by id or at the tail
//! - Broadcast a `StoreEvent` for every change
//!
//! # Design Decisions
//! - Contents live behind `Mutex<Arc<VecDeque<T>>>`; a snapshot is a clone
//!   of the `Arc`, writers copy only while a snapshot is still alive
//! - Notifications are sent after the lock is released
//! - Eviction is the only deletion path besides `clear`
//! - An update for an id that is no longer present is a no-op

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use crate::observability::metrics;
use crate::store::id::EventId;

/// Default number of records kept per store.
pub const DEFAULT_CAPACITY: usize = 1000;

const EVENT_CHANNEL_SIZE: usize = 256;

/// A record that can live in a `BoundedEventStore`.
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> &EventId;
}

/// Change notification emitted by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A record was added at the end.
    Appended(EventId),
    /// An existing record was modified in place.
    Updated(EventId),
    /// The oldest record was dropped to make room.
    Evicted(EventId),
    /// The store was emptied.
    Cleared,
}

struct Inner<T> {
    name: &'static str,
    capacity: usize,
    items: Mutex<Arc<VecDeque<T>>>,
    events: broadcast::Sender<StoreEvent>,
}

/// Append-only, capacity-limited sequence of records.
///
/// Cloning yields another handle to the same store.
pub struct BoundedEventStore<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BoundedEventStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Record> BoundedEventStore<T> {
    /// Create a store. A capacity of zero is raised to one.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(Inner {
                name,
                capacity: capacity.max(1),
                items: Mutex::new(Arc::new(VecDeque::new())),
                events,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Add a record at the end, evicting the oldest one on overflow.
    pub fn append(&self, item: T) {
        let id = item.id().clone();
        let (evicted, len) = {
            let mut guard = self.items();
            let items = Arc::make_mut(&mut *guard);
            items.push_back(item);
            let evicted = if items.len() > self.inner.capacity {
                items.pop_front().map(|old| old.id().clone())
            } else {
                None
            };
            (evicted, items.len())
        };

        metrics::record_append(self.inner.name);
        metrics::record_store_size(self.inner.name, len);
        self.notify(StoreEvent::Appended(id));
        if let Some(old) = evicted {
            metrics::record_eviction(self.inner.name);
            self.notify(StoreEvent::Evicted(old));
        }
    }

    /// Offer `item` to the current last record first.
    ///
    /// `merge` receives the last record and the candidate; when it returns
    /// true the last record is kept (and possibly modified) and `item` is
    /// dropped. Otherwise `item` is appended. The check and the append happen
    /// under a single lock. Returns true when the item was merged.
    pub fn append_or_merge<F>(&self, item: T, merge: F) -> bool
    where
        F: FnOnce(&mut T, &T) -> bool,
    {
        let merged = {
            let mut guard = self.items();
            let merged_into = if guard.is_empty() {
                None
            } else {
                let items = Arc::make_mut(&mut *guard);
                match items.back_mut() {
                    Some(last) => merge(last, &item).then(|| last.id().clone()),
                    None => None,
                }
            };
            match merged_into {
                Some(id) => Ok(id),
                None => Err(item),
            }
        };

        match merged {
            Ok(id) => {
                self.notify(StoreEvent::Updated(id));
                true
            }
            Err(item) => {
                self.append(item);
                false
            }
        }
    }

    /// Apply `updater` to the last record if it satisfies `predicate`.
    ///
    /// Only the tail is inspected. Returns true when an update happened.
    pub fn mutate_last<P, U>(&self, predicate: P, updater: U) -> bool
    where
        P: FnOnce(&T) -> bool,
        U: FnOnce(&mut T),
    {
        let updated = {
            let mut guard = self.items();
            if guard.back().map_or(false, predicate) {
                let items = Arc::make_mut(&mut *guard);
                items.back_mut().map(|last| {
                    updater(last);
                    last.id().clone()
                })
            } else {
                None
            }
        };

        match updated {
            Some(id) => {
                self.notify(StoreEvent::Updated(id));
                true
            }
            None => false,
        }
    }

    /// Apply `updater` to the record with the given id.
    ///
    /// Returns false when no such record exists (never added, evicted or
    /// cleared).
    pub fn mutate_by_id<U>(&self, id: &EventId, updater: U) -> bool
    where
        U: FnOnce(&mut T),
    {
        let found = {
            let mut guard = self.items();
            match guard.iter().position(|item| item.id() == id) {
                Some(index) => {
                    let items = Arc::make_mut(&mut *guard);
                    if let Some(item) = items.get_mut(index) {
                        updater(item);
                    }
                    true
                }
                None => false,
            }
        };

        if found {
            self.notify(StoreEvent::Updated(id.clone()));
        }
        found
    }

    /// Remove every record.
    pub fn clear(&self) {
        {
            let mut guard = self.items();
            *guard = Arc::new(VecDeque::new());
        }
        metrics::record_store_size(self.inner.name, 0);
        self.notify(StoreEvent::Cleared);
    }

    /// Read-only view of the current contents in insertion order.
    ///
    /// Later changes to the store are not visible through the snapshot.
    pub fn snapshot(&self) -> Snapshot<T> {
        Snapshot {
            items: self.items().clone(),
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Read handle for rendering layers.
    pub fn handle(&self) -> StoreHandle<T> {
        StoreHandle {
            store: self.clone(),
        }
    }

    fn items(&self) -> MutexGuard<'_, Arc<VecDeque<T>>> {
        self.inner
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: StoreEvent) {
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }
}

/// Immutable view of a store's contents at one point in time.
///
/// Iterating does not copy; the view can be iterated any number of times.
#[derive(Debug)]
pub struct Snapshot<T> {
    items: Arc<VecDeque<T>>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T> Snapshot<T> {
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn first(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.iter().cloned().collect()
    }
}

impl<'a, T> IntoIterator for &'a Snapshot<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Read side of a store handed to rendering layers.
///
/// Besides `clear` it offers no way to change the store.
pub struct StoreHandle<T> {
    store: BoundedEventStore<T>,
}

impl<T> Clone for StoreHandle<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T: Record> StoreHandle<T> {
    pub fn snapshot(&self) -> Snapshot<T> {
        self.store.snapshot()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    pub fn clear(&self) {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: EventId,
        value: u32,
    }

    impl Item {
        fn new(n: u32) -> Self {
            Self {
                id: EventId::from(format!("id-{}", n).as_str()),
                value: n,
            }
        }
    }

    impl Record for Item {
        fn id(&self) -> &EventId {
            &self.id
        }
    }

    fn values(store: &BoundedEventStore<Item>) -> Vec<u32> {
        store.snapshot().iter().map(|i| i.value).collect()
    }

    #[test]
    fn test_eviction_keeps_last_capacity_items_in_order() {
        let store = BoundedEventStore::new("test", 3);
        for n in 1..=10 {
            store.append(Item::new(n));
            assert!(store.len() <= 3);
        }
        assert_eq!(store.len(), 3);
        assert_eq!(values(&store), vec![8, 9, 10]);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let store = BoundedEventStore::new("test", 0);
        store.append(Item::new(1));
        store.append(Item::new(2));
        assert_eq!(store.capacity(), 1);
        assert_eq!(values(&store), vec![2]);
    }

    #[test]
    fn test_mutate_by_id() {
        let store = BoundedEventStore::new("test", 10);
        store.append(Item::new(1));
        store.append(Item::new(2));

        assert!(store.mutate_by_id(&EventId::from("id-1"), |i| i.value = 100));
        assert_eq!(values(&store), vec![100, 2]);

        // Unknown id is a no-op
        assert!(!store.mutate_by_id(&EventId::from("missing"), |i| i.value = 0));
        assert_eq!(values(&store), vec![100, 2]);
    }

    #[test]
    fn test_mutate_by_id_after_eviction_is_noop() {
        let store = BoundedEventStore::new("test", 2);
        store.append(Item::new(1));
        store.append(Item::new(2));
        store.append(Item::new(3));

        assert!(!store.mutate_by_id(&EventId::from("id-1"), |i| i.value = 100));
        assert_eq!(values(&store), vec![2, 3]);
    }

    #[test]
    fn test_mutate_last_only_inspects_tail() {
        let store = BoundedEventStore::new("test", 10);
        store.append(Item::new(1));
        store.append(Item::new(2));

        assert!(!store.mutate_last(|i| i.value == 1, |i| i.value = 50));
        assert!(store.mutate_last(|i| i.value == 2, |i| i.value = 20));
        assert_eq!(values(&store), vec![1, 20]);

        let empty: BoundedEventStore<Item> = BoundedEventStore::new("empty", 10);
        assert!(!empty.mutate_last(|_| true, |i| i.value = 0));
    }

    #[test]
    fn test_append_or_merge() {
        let store = BoundedEventStore::new("test", 10);
        let same_value = |last: &mut Item, new: &Item| last.value == new.value;

        assert!(!store.append_or_merge(Item::new(1), same_value));
        let mut dup = Item::new(1);
        dup.id = EventId::from("other");
        assert!(store.append_or_merge(dup, same_value));
        assert!(!store.append_or_merge(Item::new(2), same_value));

        assert_eq!(values(&store), vec![1, 2]);
        assert_eq!(store.snapshot().first().unwrap().id, EventId::from("id-1"));
    }

    #[test]
    fn test_append_or_merge_mutates_tail() {
        let store = BoundedEventStore::new("test", 10);
        let mut rx = store.subscribe();
        let fold = |last: &mut Item, new: &Item| {
            if last.value / 10 == new.value / 10 {
                last.value += 1;
                true
            } else {
                false
            }
        };

        assert!(!store.append_or_merge(Item::new(10), fold));
        assert!(store.append_or_merge(Item::new(12), fold));
        assert!(store.append_or_merge(Item::new(15), fold));
        assert!(!store.append_or_merge(Item::new(20), fold));

        assert_eq!(values(&store), vec![12, 20]);
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Appended(EventId::from("id-10")));
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Updated(EventId::from("id-10")));
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Updated(EventId::from("id-10")));
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Appended(EventId::from("id-20")));
    }

    #[test]
    fn test_snapshot_is_stable_and_restartable() {
        let store = BoundedEventStore::new("test", 2);
        store.append(Item::new(1));
        store.append(Item::new(2));

        let snapshot = store.snapshot();
        store.append(Item::new(3));
        store.mutate_by_id(&EventId::from("id-2"), |i| i.value = 99);

        let first: Vec<u32> = snapshot.iter().map(|i| i.value).collect();
        let second: Vec<u32> = (&snapshot).into_iter().map(|i| i.value).collect();
        assert_eq!(first, vec![1, 2]);
        assert_eq!(first, second);
        assert_eq!(values(&store), vec![99, 3]);
    }

    #[test]
    fn test_clear() {
        let store = BoundedEventStore::new("test", 5);
        store.append(Item::new(1));
        let handle = store.handle();
        handle.clear();
        assert!(store.is_empty());
        assert!(handle.snapshot().is_empty());
    }

    #[test]
    fn test_notifications() {
        let store = BoundedEventStore::new("test", 1);
        let mut rx = store.subscribe();

        store.append(Item::new(1));
        store.append(Item::new(2));
        store.mutate_by_id(&EventId::from("id-2"), |i| i.value = 3);
        store.mutate_by_id(&EventId::from("id-1"), |i| i.value = 3);
        store.clear();

        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Appended(EventId::from("id-1")));
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Appended(EventId::from("id-2")));
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Evicted(EventId::from("id-1")));
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Updated(EventId::from("id-2")));
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Cleared);
        assert!(rx.try_recv().is_err());
    }
}
