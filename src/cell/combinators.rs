// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cell Combinators
//!
//! - `zip` - pair two cells, settles once both resolve or either fails
//! - `all` - collect many cells of one type, in input order
//!
//! Both fail as soon as any source fails, with that source's error.

use std::sync::{Arc, Mutex};

use super::value_cell::{CellState, ValueCell};

/// Pair two cells
pub fn zip<A, B>(a: &ValueCell<A>, b: &ValueCell<B>) -> ValueCell<(A, B)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
{
    let out = ValueCell::new();
    let slots: Arc<Mutex<(Option<A>, Option<B>)>> = Arc::new(Mutex::new((None, None)));

    {
        let out = out.clone();
        let slots = slots.clone();
        a.subscribe(move |state| match state {
            CellState::Resolved(value) => {
                let ready = {
                    let mut guard = slots.lock().unwrap_or_else(|p| p.into_inner());
                    guard.0 = Some(value.clone());
                    guard.1.clone().map(|b| (value.clone(), b))
                };
                if let Some(pair) = ready {
                    let _ = out.resolve(pair);
                }
            }
            CellState::Failed(error) => {
                let _ = out.fail(error.clone());
            }
            CellState::Unresolved => {}
        });
    }

    {
        let out = out.clone();
        b.subscribe(move |state| match state {
            CellState::Resolved(value) => {
                let ready = {
                    let mut guard = slots.lock().unwrap_or_else(|p| p.into_inner());
                    guard.1 = Some(value.clone());
                    guard.0.clone().map(|a| (a, value.clone()))
                };
                if let Some(pair) = ready {
                    let _ = out.resolve(pair);
                }
            }
            CellState::Failed(error) => {
                let _ = out.fail(error.clone());
            }
            CellState::Unresolved => {}
        });
    }

    out
}

/// Collect cells into one cell of a vector
///
/// An empty input resolves immediately to an empty vector.
pub fn all<T>(cells: &[ValueCell<T>]) -> ValueCell<Vec<T>>
where
    T: Clone + Send + 'static,
{
    if cells.is_empty() {
        return ValueCell::resolved(Vec::new());
    }

    let out = ValueCell::new();
    let slots: Arc<Mutex<(Vec<Option<T>>, usize)>> =
        Arc::new(Mutex::new((vec![None; cells.len()], cells.len())));

    for (index, cell) in cells.iter().enumerate() {
        let out = out.clone();
        let slots = slots.clone();
        cell.subscribe(move |state| match state {
            CellState::Resolved(value) => {
                let ready = {
                    let mut guard = slots.lock().unwrap_or_else(|p| p.into_inner());
                    let (values, remaining) = &mut *guard;
                    if values[index].is_none() {
                        values[index] = Some(value.clone());
                        *remaining -= 1;
                    }
                    if *remaining == 0 {
                        Some(values.iter().flatten().cloned().collect::<Vec<T>>())
                    } else {
                        None
                    }
                };
                if let Some(values) = ready {
                    let _ = out.resolve(values);
                }
            }
            CellState::Failed(error) => {
                let _ = out.fail(error.clone());
            }
            CellState::Unresolved => {}
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CompositionError;

    #[test]
    fn test_zip_waits_for_both() {
        let host = ValueCell::new();
        let port = ValueCell::new();
        let pair = zip(&host, &port);

        host.resolve("cache.local".to_string()).unwrap();
        assert!(!pair.is_settled());

        port.resolve(6380u16).unwrap();
        assert_eq!(pair.value(), Some(("cache.local".to_string(), 6380)));
    }

    #[test]
    fn test_zip_fails_fast() {
        let a: ValueCell<i32> = ValueCell::new();
        let b: ValueCell<i32> = ValueCell::new();
        let pair = zip(&a, &b);

        b.fail(CompositionError::Cancelled).unwrap();
        assert_eq!(pair.error(), Some(CompositionError::Cancelled));

        // Late resolution of the other side does not disturb the failure.
        a.resolve(1).unwrap();
        assert_eq!(pair.error(), Some(CompositionError::Cancelled));
    }

    #[test]
    fn test_all_preserves_input_order() {
        let cells: Vec<ValueCell<u32>> = (0..3).map(|_| ValueCell::new()).collect();
        let collected = all(&cells);

        cells[2].resolve(30).unwrap();
        cells[0].resolve(10).unwrap();
        assert!(!collected.is_settled());
        cells[1].resolve(20).unwrap();

        assert_eq!(collected.value(), Some(vec![10, 20, 30]));
    }

    #[test]
    fn test_all_of_nothing_is_resolved() {
        let collected = all::<u8>(&[]);
        assert_eq!(collected.value(), Some(vec![]));
    }
}
