// Copyright (c) 2025 - Cowboy AI, Inc.
//! Single-Assignment Value Cells
//!
//! A [`ValueCell<T>`] is the deferred value behind every resource output. It
//! starts `Unresolved` and settles exactly once, either to `Resolved(value)` or
//! to `Failed(error)`.
//!
//! ```text
//! Unresolved ──resolve(v)──→ Resolved(v)
//!     │
//!     └──────fail(e)───────→ Failed(e)
//! ```
//!
//! # Subscription
//!
//! Subscribers are plain callbacks registered with [`ValueCell::subscribe`].
//! They run synchronously, in registration order, on the thread that settles
//! the cell. Subscribing to a settled cell runs the callback immediately.
//! There is no hidden executor: derivation chains are just subscriptions.
//!
//! ```rust,ignore
//! use cim_composition::cell::ValueCell;
//!
//! let host: ValueCell<String> = ValueCell::new();
//! let url = host.derive(|h| format!("https://{}", h));
//!
//! host.resolve("app.example.net".to_string())?;
//! assert_eq!(url.value(), Some("https://app.example.net".to_string()));
//! ```

pub mod combinators;
pub mod value_cell;

pub use combinators::{all, zip};
pub use value_cell::{CellState, ValueCell};
