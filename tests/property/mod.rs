// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! Graphs are generated from a hidden ranking of their nodes: an edge only
//! ever points from a lower rank to a higher one, so the generated graph is
//! acyclic no matter which direction it was declared in.

mod graph_order;
