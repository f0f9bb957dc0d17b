// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the row tree: handles, colors, flags, and query results.

/// Identifier for a row (a node of one level) in a [`RowTree`](crate::RowTree).
///
/// Handles are generational: removing a row bumps the generation of its slot,
/// so a stale `NodeId` is never mistaken for the row that later reuses the slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(pub(crate) u32, pub(crate) u32);

impl NodeId {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "NodeId uses 32-bit indices by design."
    )]
    pub(crate) const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Identifier for one level of the hierarchy: the top-level list, or the
/// nested rows of one expanded row.
///
/// Like [`NodeId`], this handle is generational.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TreeId(pub(crate) u32, pub(crate) u32);

impl TreeId {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "TreeId uses 32-bit indices by design."
    )]
    pub(crate) const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Red-black color of a row.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Color {
    /// Freshly inserted rows start red.
    Red,
    /// The root of every level, and the sentinel, are black.
    Black,
}

bitflags::bitflags! {
    /// Opaque per-row bits owned by the caller.
    ///
    /// The tree never interprets these. They travel with the row through
    /// rebalancing and with the payload through [`RowTree::reorder`](crate::RowTree::reorder).
    /// Bits outside the named constants are retained, so hosts may define
    /// their own via [`RowFlags::from_bits_retain`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RowFlags: u32 {
        /// The row has (or may have) child rows in the model.
        const IS_PARENT = 0b0000_0001;
        /// The row is selected.
        const SELECTED  = 0b0000_0010;
        /// The row is under the pointer.
        const PRELIT    = 0b0000_0100;

        const _ = !0;
    }
}

bitflags::bitflags! {
    /// Measurement state of a row, maintained by the tree.
    ///
    /// [`Validity::INVALID`] and [`Validity::COLUMN_INVALID`] belong to the row
    /// itself. [`Validity::DESCENDANTS_INVALID`] is derived: it is set exactly
    /// when the row, anything below it in its level, or any nested row is
    /// invalid. See [`RowTree::first_invalid`](crate::RowTree::first_invalid).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Validity: u8 {
        /// The row must be measured again.
        const INVALID             = 0b0000_0001;
        /// At least one column of the row must be measured again.
        const COLUMN_INVALID      = 0b0000_0010;
        /// Some row in this subtree (nested rows included) is invalid.
        const DESCENDANTS_INVALID = 0b0000_0100;
    }
}

impl Default for RowFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl Default for Validity {
    fn default() -> Self {
        Self::empty()
    }
}

impl Validity {
    /// The bits owned by the row itself, as opposed to derived ones.
    pub(crate) const OWN: Self = Self::INVALID.union(Self::COLUMN_INVALID);
}

/// Visiting order for [`RowTree::traverse`](crate::RowTree::traverse).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TraverseOrder {
    /// Each row before its in-level children.
    PreOrder,
    /// Each row after its in-level children.
    PostOrder,
}

/// Result of [`RowTree::find_node_by_offset`](crate::RowTree::find_node_by_offset).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OffsetHit {
    /// The level containing the hit row.
    pub tree: TreeId,
    /// The row occupying the queried offset.
    pub node: NodeId,
    /// Distance from the row's top edge to the queried offset.
    pub offset_in_node: i64,
}
