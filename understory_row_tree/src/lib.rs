// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_row_tree --heading-base-level=0

//! Understory Row Tree: augmented red-black trees for virtualized, hierarchical row lists.
//!
//! A tree or outline view that shows millions of rows cannot lay every row out. It needs to
//! answer two questions quickly, and keep answering them while rows are inserted, removed,
//! resized, expanded, and collapsed:
//!
//! - Which row is at vertical offset `y`? ([`RowTree::find_node_by_offset`])
//! - At which offset does this row start? ([`RowTree::node_offset_within_ancestor`])
//!
//! This crate keeps each level of the hierarchy in its own red-black tree. Every row caches the
//! total height, the row counts, and the row-count parity of its subtree, nested rows included,
//! so both questions (and their index-based twins) are answered in O(log n) per level.
//!
//! ## Levels and nesting
//!
//! - A [`RowTree`] owns every row and every level.
//! - Levels are addressed by [`TreeId`] and rows by [`NodeId`]. Both are generational handles:
//!   a handle to a removed row or level is detected instead of silently aliasing a new one.
//! - Expanding a row attaches a level under it ([`RowTree::attach_children`]); collapsing it
//!   detaches the level in O(log n) without losing its rows ([`RowTree::detach_children`]).
//! - Growth and shrinkage of a nested level are propagated to every enclosing level.
//!
//! Rows also carry caller flags ([`RowFlags`]) that the tree never interprets, and a
//! measurement state ([`Validity`]) that lets a host find the next row it has to measure with
//! [`RowTree::first_invalid`].
//!
//! ## Not a view
//!
//! This crate does not own model data, render anything, or measure rows. Hosts feed it row
//! heights, and read back positions and visible ranges.
//!
//! ## Minimal example
//!
//! ```rust
//! use understory_row_tree::RowTree;
//!
//! let mut rows = RowTree::new();
//! let top = rows.root_tree();
//!
//! let mut last = None;
//! for height in [10, 20, 5, 15, 8] {
//!     last = Some(rows.insert_after(top, last, height));
//! }
//! assert_eq!(rows.total_offset(top), 58);
//!
//! // Offset 33 falls 3 units into the third row.
//! let hit = rows.find_node_by_offset(top, 33).unwrap();
//! assert_eq!(rows.height(hit.node), Some(5));
//! assert_eq!(hit.offset_in_node, 3);
//!
//! // Expand that row with two nested rows.
//! let nested = rows.new_tree();
//! let a = rows.insert_after(nested, None, 3);
//! let b = rows.insert_after(nested, Some(a), 4);
//! rows.attach_children(top, hit.node, nested);
//!
//! assert_eq!(rows.total_offset(top), 65);
//! assert_eq!(rows.node_offset_within_ancestor(nested, b), 38);
//! assert_eq!(rows.node_index_within_ancestor(nested, b), 4);
//! ```
//!
//! ## Features
//!
//! - `debug_checks` *(off by default)*: validate the whole container with
//!   [`RowTree::check_invariants`] after every mutation, and panic on the first broken
//!   invariant. The offending levels are logged at `trace` level first.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod balance;
mod check;
mod mutate;
mod node;
mod query;
mod tree;
mod types;
mod validity;

pub use check::InvariantViolation;
pub use query::FullIter;
pub use tree::RowTree;
pub use types::{Color, NodeId, OffsetHit, RowFlags, TraverseOrder, TreeId, Validity};
