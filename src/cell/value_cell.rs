// Copyright (c) 2025 - Cowboy AI, Inc.
//! ValueCell - single-assignment deferred values

use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::errors::{CompositionError, CompositionResult};

/// Settlement state of a cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellState<T> {
    Unresolved,
    Resolved(T),
    Failed(CompositionError),
}

impl<T> CellState<T> {
    pub fn is_settled(&self) -> bool {
        !matches!(self, CellState::Unresolved)
    }
}

type Subscriber<T> = Box<dyn FnOnce(&CellState<T>) + Send>;

struct Inner<T> {
    state: CellState<T>,
    subscribers: Vec<Subscriber<T>>,
}

/// Shared handle to a single-assignment value
///
/// Cloning the handle shares the cell. Reads of a settled cell are safe from
/// any number of threads; settlement is serialized by the internal lock.
pub struct ValueCell<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("ValueCell")
            .field("state", &inner.state)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Default for ValueCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

// A panicking subscriber must not wedge every other reader of the cell.
fn lock<T>(inner: &Mutex<Inner<T>>) -> MutexGuard<'_, Inner<T>> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Clone + Send + 'static> ValueCell<T> {
    /// Create an unresolved cell
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: CellState::Unresolved,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Create a cell that is already resolved
    pub fn resolved(value: T) -> Self {
        let cell = Self::new();
        lock(&cell.inner).state = CellState::Resolved(value);
        cell
    }

    /// Create a cell that has already failed
    pub fn failed(error: CompositionError) -> Self {
        let cell = Self::new();
        lock(&cell.inner).state = CellState::Failed(error);
        cell
    }

    /// Resolve the cell and notify subscribers
    ///
    /// Fails with `AlreadyResolved` if the cell is already settled; the
    /// first value stays observable.
    pub fn resolve(&self, value: T) -> CompositionResult<()> {
        self.settle(CellState::Resolved(value))
    }

    /// Fail the cell and notify subscribers
    pub fn fail(&self, error: CompositionError) -> CompositionResult<()> {
        self.settle(CellState::Failed(error))
    }

    fn settle(&self, next: CellState<T>) -> CompositionResult<()> {
        let (state, subscribers) = {
            let mut inner = lock(&self.inner);
            if inner.state.is_settled() {
                return Err(CompositionError::AlreadyResolved);
            }
            inner.state = next;
            (inner.state.clone(), std::mem::take(&mut inner.subscribers))
        };

        // Callbacks run outside the lock so they may read or derive from this cell.
        for subscriber in subscribers {
            subscriber(&state);
        }
        Ok(())
    }

    /// Register a callback for settlement
    ///
    /// Runs immediately if the cell is already settled.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: FnOnce(&CellState<T>) + Send + 'static,
    {
        let settled = {
            let mut inner = lock(&self.inner);
            if inner.state.is_settled() {
                inner.state.clone()
            } else {
                inner.subscribers.push(Box::new(callback));
                return;
            }
        };
        callback(&settled);
    }

    /// Cell holding `f(value)` once this cell resolves
    ///
    /// Failure of the source propagates unchanged.
    pub fn derive<U, F>(&self, f: F) -> ValueCell<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.try_derive(move |value| Ok(f(value)))
    }

    /// Like [`derive`](Self::derive) with a fallible function
    pub fn try_derive<U, F>(&self, f: F) -> ValueCell<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> CompositionResult<U> + Send + 'static,
    {
        let derived = ValueCell::new();
        let target = derived.clone();
        self.subscribe(move |state| {
            let outcome = match state {
                CellState::Resolved(value) => f(value.clone()),
                CellState::Failed(error) => Err(error.clone()),
                CellState::Unresolved => return,
            };
            // `target` is private to this subscription, it cannot be settled twice.
            let _ = match outcome {
                Ok(value) => target.resolve(value),
                Err(error) => target.fail(error),
            };
        });
        derived
    }

    /// Snapshot of the current state
    pub fn state(&self) -> CellState<T> {
        lock(&self.inner).state.clone()
    }

    /// Resolved value, if any
    pub fn value(&self) -> Option<T> {
        match &lock(&self.inner).state {
            CellState::Resolved(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Failure, if any
    pub fn error(&self) -> Option<CompositionError> {
        match &lock(&self.inner).state {
            CellState::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        lock(&self.inner).state.is_settled()
    }

    pub fn is_resolved(&self) -> bool {
        matches!(lock(&self.inner).state, CellState::Resolved(_))
    }

    /// Wait until the cell settles and return the value or the failure
    pub async fn settled(&self) -> CompositionResult<T> {
        let (tx, rx) = oneshot::channel();
        self.subscribe(move |state| {
            let _ = tx.send(state.clone());
        });
        match rx.await {
            Ok(CellState::Resolved(value)) => Ok(value),
            Ok(CellState::Failed(error)) => Err(error),
            // Subscribers only fire on settlement and are never dropped unsent.
            Ok(CellState::Unresolved) | Err(_) => Err(CompositionError::Cancelled),
        }
    }

    /// Whether both handles share the same cell
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
