// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Full-structure validation and debug dumps.

use alloc::string::String;
use core::fmt::Write;

use hashbrown::HashSet;
use thiserror::Error;

use crate::node::{NIL, ParentLink};
use crate::tree::RowTree;
use crate::types::{Color, NodeId, TreeId, Validity};

/// A broken structural invariant, reported by [`RowTree::check_invariants`].
///
/// Any of these means the container is corrupt.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The root of a level is red.
    #[error("root of {0:?} is red")]
    RootNotBlack(TreeId),
    /// The root of a level has an in-level parent.
    #[error("root of {0:?} has a parent")]
    RootHasParent(TreeId),
    /// A red row has a red child.
    #[error("{0:?} is red with a red child")]
    RedRed(NodeId),
    /// The two subtrees of a row have different black heights.
    #[error("black heights differ below {0:?}")]
    BlackHeight(NodeId),
    /// A child's parent link does not point back at its parent.
    #[error("child of {0:?} does not link back to it")]
    BrokenLink(NodeId),
    /// A row records a different level than the one it was found in.
    #[error("{0:?} records the wrong level")]
    WrongTree(NodeId),
    /// A row has a negative height.
    #[error("{0:?} has a negative height")]
    NegativeHeight(NodeId),
    /// The cached in-level count is wrong.
    #[error("{node:?} counts {actual} rows, expected {expected}")]
    Count {
        /// Offending row.
        node: NodeId,
        /// Value derived from the children.
        expected: usize,
        /// Cached value.
        actual: usize,
    },
    /// The cached total count is wrong.
    #[error("{node:?} counts {actual} rows in total, expected {expected}")]
    TotalCount {
        /// Offending row.
        node: NodeId,
        /// Value derived from the children.
        expected: usize,
        /// Cached value.
        actual: usize,
    },
    /// The cached subtree offset is wrong.
    #[error("{node:?} has offset {actual}, expected {expected}")]
    Offset {
        /// Offending row.
        node: NodeId,
        /// Value derived from the children.
        expected: i64,
        /// Cached value.
        actual: i64,
    },
    /// The cached parity disagrees with the total count.
    #[error("{0:?} has the wrong parity")]
    Parity(NodeId),
    /// A nested level does not link back to the row that owns it.
    #[error("{0:?} does not link back to its owning row")]
    NestedLink(TreeId),
    /// [`Validity::DESCENDANTS_INVALID`] disagrees with the subtree.
    #[error("{0:?} has a stale descendants-invalid bit")]
    Validity(NodeId),
    /// A row was reached twice.
    #[error("{0:?} is reachable more than once")]
    Revisited(NodeId),
    /// Some live rows are not reachable from any top-level tree.
    #[error("{live} live rows, but only {reached} reachable")]
    Unreachable {
        /// Rows allocated in the arena.
        live: usize,
        /// Rows reached from top-level trees.
        reached: usize,
    },
}

impl RowTree {
    /// Validate every live level and row.
    ///
    /// Checks the red-black properties, every cached aggregate, link
    /// symmetry within and across levels, the derived validity bit, and that
    /// every live row is reachable exactly once. This walks the whole
    /// container; it is meant for tests and debugging.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut visited = HashSet::new();
        for t in self.top_levels() {
            self.check_level(t, &mut visited)?;
        }
        let live = self.live_node_count();
        if visited.len() != live {
            return Err(InvariantViolation::Unreachable {
                live,
                reached: visited.len(),
            });
        }
        Ok(())
    }

    fn check_level(
        &self,
        t: usize,
        visited: &mut HashSet<usize>,
    ) -> Result<(), InvariantViolation> {
        let root = self.lv(t).root;
        if root == NIL {
            return Ok(());
        }
        if self.n(root).color != Color::Black {
            return Err(InvariantViolation::RootNotBlack(self.tree_id(t)));
        }
        if self.n(root).parent != NIL {
            return Err(InvariantViolation::RootHasParent(self.tree_id(t)));
        }
        self.check_subtree(t, root, visited).map(|_| ())
    }

    /// Returns the black height of the subtree rooted at `ix`.
    fn check_subtree(
        &self,
        t: usize,
        ix: usize,
        visited: &mut HashSet<usize>,
    ) -> Result<usize, InvariantViolation> {
        if ix == NIL {
            return Ok(1);
        }
        let id = self.node_id(ix);
        if !visited.insert(ix) {
            return Err(InvariantViolation::Revisited(id));
        }

        let n = self.n(ix);
        if n.tree != t {
            return Err(InvariantViolation::WrongTree(id));
        }
        if n.height < 0 {
            return Err(InvariantViolation::NegativeHeight(id));
        }
        for child in [n.left, n.right] {
            if child != NIL && self.n(child).parent != ix {
                return Err(InvariantViolation::BrokenLink(id));
            }
        }
        if n.is_red() && (self.n(n.left).is_red() || self.n(n.right).is_red()) {
            return Err(InvariantViolation::RedRed(id));
        }

        let left_bh = self.check_subtree(t, n.left, visited)?;
        let right_bh = self.check_subtree(t, n.right, visited)?;
        if left_bh != right_bh {
            return Err(InvariantViolation::BlackHeight(id));
        }

        if let Some(c) = n.children {
            if self.lv(c).parent != Some(ParentLink { tree: t, node: ix }) {
                return Err(InvariantViolation::NestedLink(self.tree_id(c)));
            }
            self.check_level(c, visited)?;
        }

        let (l, r, c) = (self.n(n.left), self.n(n.right), self.n(self.children_root(ix)));
        let count = 1 + l.count + r.count;
        if n.count != count {
            return Err(InvariantViolation::Count {
                node: id,
                expected: count,
                actual: n.count,
            });
        }
        let total_count = 1 + l.total_count + r.total_count + c.total_count;
        if n.total_count != total_count {
            return Err(InvariantViolation::TotalCount {
                node: id,
                expected: total_count,
                actual: n.total_count,
            });
        }
        let offset = n.height + l.offset + r.offset + c.offset;
        if n.offset != offset {
            return Err(InvariantViolation::Offset {
                node: id,
                expected: offset,
                actual: n.offset,
            });
        }
        if n.parity != (n.total_count % 2 == 1) {
            return Err(InvariantViolation::Parity(id));
        }

        let dirty = n.validity.intersects(Validity::OWN)
            || [l, r, c]
                .iter()
                .any(|m| m.validity.contains(Validity::DESCENDANTS_INVALID));
        if n.validity.contains(Validity::DESCENDANTS_INVALID) != dirty {
            return Err(InvariantViolation::Validity(id));
        }

        Ok(left_bh + usize::from(n.color == Color::Black))
    }

    /// Render `tree` and its nested levels, one row per line in flattened
    /// order.
    ///
    /// Each line shows the in-level depth, color, handle, own height and the
    /// cached aggregates. Nested levels are indented under their owner.
    pub fn debug_dump(&self, tree: TreeId) -> String {
        let t = self.tree_ix(tree);
        let mut out = String::new();
        // Writing to a `String` cannot fail.
        writeln!(
            out,
            "{tree:?}: {} rows, {} total, offset {}",
            self.n(self.lv(t).root).count,
            self.n(self.lv(t).root).total_count,
            self.n(self.lv(t).root).offset,
        )
        .ok();
        self.dump_level(t, 1, &mut out);
        out
    }

    fn dump_level(&self, t: usize, indent: usize, out: &mut String) {
        for ix in self.in_order(t) {
            let n = self.n(ix);
            let mut depth = 0;
            let mut p = n.parent;
            while p != NIL {
                depth += 1;
                p = self.n(p).parent;
            }
            let color = if n.is_red() { 'R' } else { 'B' };
            writeln!(
                out,
                "{:width$}{depth} {color} {:?} height {} offset {} count {}/{} parity {} {:?}",
                "",
                self.node_id(ix),
                n.height,
                n.offset,
                n.count,
                n.total_count,
                u8::from(n.parity),
                n.validity,
                width = indent * 2,
            )
            .ok();
            if let Some(c) = n.children {
                self.dump_level(c, indent + 1, out);
            }
        }
    }

    /// Validate after a public mutation when `debug_checks` is enabled.
    #[cfg(feature = "debug_checks")]
    pub(crate) fn debug_check(&self, op: &str) {
        if let Err(err) = self.check_invariants() {
            for t in self.top_levels() {
                log::trace!("{}", self.debug_dump(self.tree_id(t)));
            }
            panic!("{op} left the row tree inconsistent: {err}");
        }
    }

    #[cfg(not(feature = "debug_checks"))]
    #[inline(always)]
    pub(crate) fn debug_check(&self, _op: &str) {}
}

#[cfg(test)]
mod tests {
    use crate::{InvariantViolation, RowTree};

    #[test]
    fn empty_container_is_valid() {
        let mut rows = RowTree::new();
        assert_eq!(rows.check_invariants(), Ok(()));
        rows.new_tree();
        assert_eq!(rows.check_invariants(), Ok(()));
    }

    #[test]
    fn detects_corrupted_offset() {
        let mut rows = RowTree::new();
        let top = rows.root_tree();
        let a = rows.insert_after(top, None, 10);
        rows.insert_after(top, Some(a), 5);
        let root = rows.root_node(top).unwrap();

        rows.n_mut(root.idx()).offset += 1;
        assert_eq!(
            rows.check_invariants(),
            Err(InvariantViolation::Offset {
                node: root,
                expected: 15,
                actual: 16,
            })
        );
    }

    #[test]
    fn detects_red_root_and_stale_validity() {
        let mut rows = RowTree::new();
        let top = rows.root_tree();
        let a = rows.insert_after(top, None, 1);

        rows.n_mut(a.idx()).color = crate::Color::Red;
        assert_eq!(
            rows.check_invariants(),
            Err(InvariantViolation::RootNotBlack(top))
        );
        rows.n_mut(a.idx()).color = crate::Color::Black;

        rows.n_mut(a.idx()).validity = crate::Validity::INVALID;
        assert_eq!(rows.check_invariants(), Err(InvariantViolation::Validity(a)));
    }

    #[test]
    fn dump_lists_nested_rows_indented() {
        let mut rows = RowTree::new();
        let top = rows.root_tree();
        let a = rows.insert_after(top, None, 10);
        let nested = rows.new_tree();
        rows.insert_after(nested, None, 3);
        rows.attach_children(top, a, nested);

        let dump = rows.debug_dump(top);
        let lines: alloc::vec::Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("1 rows, 2 total, offset 13"), "{dump}");
        assert!(lines[1].starts_with("  0 B "), "{dump}");
        assert!(lines[2].starts_with("    0 B "), "{dump}");
    }

    #[test]
    fn dump_of_empty_tree_is_a_header_line() {
        let rows = RowTree::new();
        let top = rows.root_tree();
        let dump = rows.debug_dump(top);
        assert_eq!(dump, alloc::format!("{top:?}: 0 rows, 0 total, offset 0\n"));
    }
}
