//! Client-side view of ordered lists with optimistic updates.
//!
//! A reorder or removal is shown immediately and remembered together with a snapshot of
//! what was shown before. When the server answers, the newest change for that scope either
//! adopts the server's list or puts the snapshot back. Answers to older changes are ignored,
//! so a slow response can never overwrite something the user did after it was sent.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::{Todo, TodoDetail, TodoWithDetails};

/// An item with an identity and a place in its list.
pub trait Sequenced: Clone {
    fn id(&self) -> i64;
    fn set_order(&mut self, order: i64);
}

impl Sequenced for Todo {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_order(&mut self, order: i64) {
        self.position = order;
    }
}

impl Sequenced for TodoDetail {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_order(&mut self, order: i64) {
        self.position = order;
    }
}

impl Sequenced for TodoWithDetails {
    fn id(&self) -> i64 {
        self.todo.id
    }

    fn set_order(&mut self, order: i64) {
        self.todo.position = order;
    }
}

/// Identifies one optimistic change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    scope: K,
    serial: u64,
}

impl<K> Ticket<K> {
    pub fn scope(&self) -> &K {
        &self.scope
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The ticket was the newest change for its scope and the cache now reflects the outcome.
    Applied,
    /// A later change or load superseded the ticket; the cache was left alone.
    Stale,
}

#[derive(Debug)]
struct ScopeState<T> {
    items: Vec<T>,
    latest: u64,
    snapshot: Option<Vec<T>>,
}

impl<T> Default for ScopeState<T> {
    fn default() -> Self {
        ScopeState {
            items: Vec::new(),
            latest: 0,
            snapshot: None,
        }
    }
}

#[derive(Debug)]
struct Inner<K, T> {
    next_serial: u64,
    scopes: HashMap<K, ScopeState<T>>,
}

#[derive(Debug)]
pub struct OptimisticCache<K, T> {
    inner: Mutex<Inner<K, T>>,
}

impl<K, T> Default for OptimisticCache<K, T> {
    fn default() -> Self {
        OptimisticCache {
            inner: Mutex::new(Inner {
                next_serial: 1,
                scopes: HashMap::new(),
            }),
        }
    }
}

impl<K, T> OptimisticCache<K, T>
where
    K: Clone + Eq + Hash,
    T: Sequenced,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the scope with freshly fetched server state. Changes still in flight
    /// become stale.
    pub fn load(&self, scope: K, items: Vec<T>) {
        let mut inner = self.lock();
        let serial = inner.next_serial;
        inner.next_serial += 1;

        let state = inner.scopes.entry(scope).or_default();
        state.items = items;
        state.latest = serial;
        state.snapshot = None;
    }

    pub fn get(&self, scope: &K) -> Option<Vec<T>> {
        self.lock().scopes.get(scope).map(|state| state.items.clone())
    }

    /// Shows `ids` in the given order right away. Cached items the list does not mention
    /// keep their relative order behind the mentioned ones; unknown ids are skipped.
    pub fn apply_reorder(&self, scope: K, ids: &[i64]) -> Ticket<K> {
        self.apply(scope, |items| {
            let mut remaining = std::mem::take(items);
            for id in ids {
                if let Some(index) = remaining.iter().position(|item| item.id() == *id) {
                    items.push(remaining.remove(index));
                }
            }
            items.append(&mut remaining);
            for (index, item) in items.iter_mut().enumerate() {
                item.set_order(index as i64 + 1);
            }
        })
    }

    /// Hides the item `id` right away.
    pub fn apply_removal(&self, scope: K, id: i64) -> Ticket<K> {
        self.apply(scope, |items| items.retain(|item| item.id() != id))
    }

    fn apply(&self, scope: K, change: impl FnOnce(&mut Vec<T>)) -> Ticket<K> {
        let mut inner = self.lock();
        let serial = inner.next_serial;
        inner.next_serial += 1;

        let state = inner.scopes.entry(scope.clone()).or_default();
        state.snapshot = Some(state.items.clone());
        state.latest = serial;
        change(&mut state.items);

        Ticket { scope, serial }
    }

    /// Adopts the server's canonical list for the ticket's scope.
    pub fn commit(&self, ticket: &Ticket<K>, canonical: Vec<T>) -> Reconciliation {
        let mut inner = self.lock();
        match inner.scopes.get_mut(&ticket.scope) {
            Some(state) if state.latest == ticket.serial && state.snapshot.is_some() => {
                state.items = canonical;
                state.snapshot = None;
                Reconciliation::Applied
            }
            _ => Reconciliation::Stale,
        }
    }

    /// Puts back exactly what was shown before the ticket's change.
    pub fn rollback(&self, ticket: &Ticket<K>) -> Reconciliation {
        let mut inner = self.lock();
        match inner.scopes.get_mut(&ticket.scope) {
            Some(state) if state.latest == ticket.serial => match state.snapshot.take() {
                Some(snapshot) => {
                    state.items = snapshot;
                    Reconciliation::Applied
                }
                None => Reconciliation::Stale,
            },
            _ => Reconciliation::Stale,
        }
    }

    /// Waits for the server's answer to the ticket's change and reconciles with it.
    /// A failure rolls back and is handed to the caller unchanged; nothing is retried.
    pub async fn settle<Fut, E>(
        &self,
        ticket: Ticket<K>,
        response: Fut,
    ) -> Result<Reconciliation, E>
    where
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        match response.await {
            Ok(canonical) => Ok(self.commit(&ticket, canonical)),
            Err(err) => {
                self.rollback(&ticket);
                Err(err)
            }
        }
    }

    /// Reorders optimistically, then sends `ids` through `send` and reconciles.
    pub async fn reorder<F, Fut, E>(
        &self,
        scope: K,
        ids: Vec<i64>,
        send: F,
    ) -> Result<Reconciliation, E>
    where
        F: FnOnce(Vec<i64>) -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        let ticket = self.apply_reorder(scope, &ids);
        self.settle(ticket, send(ids)).await
    }
}
