// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Opaque handle table.
//
// Maps integer handles to exclusively owned values. The table lock is held only
// for the insert/remove/lookup step; every entry carries its own mutex, so a
// long mutation on one handle never stalls work on another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use dokwerk_core::error::{DokwerkError, Result};
use tracing::{trace, warn};

/// Process-wide handle allocator shared by every table. Starts at 1 so that 0
/// stays the failure sentinel, and only ever counts upwards: a removed handle
/// is never handed out again while the process lives.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Reserve a fresh, never-before-issued handle value.
pub fn allocate_handle() -> u64 {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

/// One table entry. `None` once the value has been moved out by `remove`.
type Slot<T> = Arc<Mutex<Option<T>>>;

/// Thread-safe mapping from opaque integer handles to owned values.
pub struct HandleTable<T> {
    entries: RwLock<HashMap<u64, Slot<T>>>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    // -- Lifetime -------------------------------------------------------------

    /// Take ownership of `value` and return its fresh non-zero handle.
    pub fn insert(&self, value: T) -> u64 {
        let handle = allocate_handle();
        let slot = Arc::new(Mutex::new(Some(value)));
        self.write_entries().insert(handle, slot);
        trace!(handle, "handle inserted");
        handle
    }

    /// Erase the entry and transfer ownership of its value to the caller.
    ///
    /// Waits for an in-flight `read`/`mutate` on the same handle to finish.
    /// Exactly one caller ever receives the value; every later call (and every
    /// operation that raced the removal) sees `HandleNotFound`.
    pub fn remove(&self, handle: u64) -> Result<T> {
        let slot = self
            .write_entries()
            .remove(&handle)
            .ok_or(DokwerkError::HandleNotFound(handle))?;
        let value = lock_slot(&slot, handle)
            .take()
            .ok_or(DokwerkError::HandleNotFound(handle))?;
        trace!(handle, "handle removed");
        Ok(value)
    }

    // -- Access ---------------------------------------------------------------

    /// Run `f` with shared access to the value behind `handle`.
    pub fn read<R>(&self, handle: u64, f: impl FnOnce(&T) -> R) -> Result<R> {
        let slot = self.slot(handle)?;
        let guard = lock_slot(&slot, handle);
        guard
            .as_ref()
            .map(f)
            .ok_or(DokwerkError::HandleNotFound(handle))
    }

    /// Run `f` with exclusive access to the value behind `handle`.
    ///
    /// Mutators of the same handle are serialised; other handles are not
    /// affected.
    pub fn mutate<R>(&self, handle: u64, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let slot = self.slot(handle)?;
        let mut guard = lock_slot(&slot, handle);
        guard
            .as_mut()
            .map(f)
            .ok_or(DokwerkError::HandleNotFound(handle))
    }

    /// Clone the value behind `handle` out of the table.
    pub fn get(&self, handle: u64) -> Result<T>
    where
        T: Clone,
    {
        self.read(handle, T::clone)
    }

    // -- Inspection -----------------------------------------------------------

    pub fn contains(&self, handle: u64) -> bool {
        self.read_entries().contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the live handles, in ascending order.
    pub fn handles(&self) -> Vec<u64> {
        let mut handles: Vec<u64> = self.read_entries().keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    // -- Helpers --------------------------------------------------------------

    fn slot(&self, handle: u64) -> Result<Slot<T>> {
        self.read_entries()
            .get(&handle)
            .cloned()
            .ok_or(DokwerkError::HandleNotFound(handle))
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<u64, Slot<T>>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!("handle table lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<u64, Slot<T>>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!("handle table lock poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

/// A mutator that panicked leaves the value as it was when the panic hit; the
/// entry stays usable rather than turning every later call into a panic.
fn lock_slot<T>(slot: &Mutex<Option<T>>, handle: u64) -> MutexGuard<'_, Option<T>> {
    slot.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
        warn!(handle, "entry lock poisoned; recovering");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn handles_are_non_zero_and_distinct() {
        let table = HandleTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_ne!(a, 0);
        assert_ne!(b, 0);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn unknown_handle_reports_not_found() {
        let table: HandleTable<String> = HandleTable::new();
        let err = table.read(9_999_999, |s| s.len()).expect_err("unknown");
        assert!(matches!(err, DokwerkError::HandleNotFound(9_999_999)));
        assert!(table.mutate(0, |s| s.push('x')).is_err());
        assert!(table.remove(0).is_err());
    }

    #[test]
    fn remove_transfers_ownership_once() {
        let table = HandleTable::new();
        let handle = table.insert(vec![1u8, 2, 3]);
        let value = table.remove(handle).expect("first remove");
        assert_eq!(value, vec![1, 2, 3]);
        assert!(matches!(
            table.remove(handle),
            Err(DokwerkError::HandleNotFound(h)) if h == handle
        ));
        assert!(!table.contains(handle));
        assert!(table.is_empty());
    }

    #[test]
    fn removed_handles_are_never_reissued() {
        let table = HandleTable::new();
        let mut seen = HashSet::new();
        for i in 0..500 {
            let handle = table.insert(i);
            assert!(seen.insert(handle), "handle {handle} reissued");
            table.remove(handle).expect("remove");
        }
    }

    #[test]
    fn handles_are_unique_across_tables() {
        let numbers = HandleTable::new();
        let words = HandleTable::new();
        let n = numbers.insert(1);
        let w = words.insert("one");
        assert_ne!(n, w);
        assert!(!numbers.contains(w));
        assert!(!words.contains(n));
    }

    #[test]
    fn mutate_is_visible_to_later_reads() {
        let table = HandleTable::new();
        let handle = table.insert(String::from("dok"));
        table.mutate(handle, |s| s.push_str("werk")).expect("mutate");
        assert_eq!(table.get(handle).expect("get"), "dokwerk");
    }

    #[test]
    fn concurrent_mutators_never_lose_updates() {
        let table = HandleTable::new();
        let handle = table.insert(Vec::<usize>::new());
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let table = &table;
                scope.spawn(move || {
                    for i in 0..100 {
                        table
                            .mutate(handle, |v| v.push(worker * 1000 + i))
                            .expect("mutate");
                    }
                });
            }
        });
        let values = table.get(handle).expect("get");
        assert_eq!(values.len(), 800);
        let unique: HashSet<_> = values.iter().collect();
        assert_eq!(unique.len(), 800);
    }

    #[test]
    fn slow_mutation_does_not_block_other_handles() {
        let table = HandleTable::new();
        let slow = table.insert(0u32);
        let fast = table.insert(0u32);
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        std::thread::scope(|scope| {
            let table = &table;
            scope.spawn(move || {
                table
                    .mutate(slow, |v| {
                        started_tx.send(()).expect("signal start");
                        release_rx.recv().expect("wait for release");
                        *v += 1;
                    })
                    .expect("slow mutate");
            });

            started_rx.recv().expect("slow mutation started");
            // The slow handle is still locked; the other one must be free.
            table.mutate(fast, |v| *v += 1).expect("fast mutate");
            assert!(table.insert(7u32) > 0);
            release_tx.send(()).expect("release");
        });

        assert_eq!(table.get(slow).expect("slow"), 1);
        assert_eq!(table.get(fast).expect("fast"), 1);
    }

    #[test]
    fn racing_removals_release_exactly_once() {
        let table = HandleTable::new();
        let handle = table.insert(String::from("payload"));
        let winners = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    if table.remove(handle).is_ok() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
