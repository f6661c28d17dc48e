//! Cost families of the B+tree variants.
//!
//! A family decides how a node is searched (binary search over a sorted node,
//! linear scan over an unsorted one) and what gets written when entries or
//! nodes are added and removed. Inner-level work is free for families whose
//! inner nodes live in DRAM.

use std::fmt;

use crate::{
    pcm::Pcm,
    util::{
        system_info::FLAG_SIZE,
        types::{Bytes, Seconds, Size},
    },
};

use super::shape::{Geometry, StructureDiff};

///CB-trees let a leaf overflow this much before really splitting it
pub const CBTREE_WAIT_FOR_SPLIT: f64 = 1.5;

///Layout of the entries inside one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOrder {
    Sorted,
    Unsorted,
    TwoSection, //sorted half written by bulkload, unsorted half appended by inserts
}

impl NodeOrder {
    ///Read cost of locating a key inside one node
    fn search_cost(self, geometry: &Geometry, pcm: &Pcm) -> Seconds {
        let node = geometry.node_size;
        match self {
            NodeOrder::Sorted => pcm.read(node / 2),
            NodeOrder::Unsorted => pcm.read(node),
            NodeOrder::TwoSection => pcm.read(node / 4) + pcm.read(node / 2),
        }
    }
}

///Structure changes a family can postpone behind a split counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDeferral {
    None,
    Leaves,
    LeavesAndInners,
}

impl SplitDeferral {
    ///(deferred, paid now)
    pub fn partition(self, diff: StructureDiff) -> (StructureDiff, StructureDiff) {
        match self {
            SplitDeferral::None => (StructureDiff::default(), diff),
            SplitDeferral::Leaves => (
                StructureDiff::new(diff.leaves, 0),
                StructureDiff::new(0, diff.inners),
            ),
            SplitDeferral::LeavesAndInners => (diff, StructureDiff::default()),
        }
    }
}

///Capability set every B+tree variant implements. `diff` arguments count nodes created
/// (or, for deletes, removed) by a single operation
pub trait NodeLayout: fmt::Debug {
    ///Root to leaf descent of a tree with `height` levels
    fn find_node_cost(&self, geometry: &Geometry, height: Size, pcm: &Pcm) -> Seconds;

    ///Placing one entry in its leaf, without structure change
    fn insert_entry_cost(&self, geometry: &Geometry, pcm: &mut Pcm) -> Seconds;

    fn delete_entry_cost(&self, geometry: &Geometry, pcm: &mut Pcm) -> Seconds;

    ///Leaf and inner splits
    fn insert_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds;

    ///Leaf and inner merges, the mirror image of splitting
    fn delete_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        self.insert_structural_cost(geometry, pcm, diff)
    }

    ///Linking freshly written leaves (and the inners they need) into the tree
    fn bulkload_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds;

    fn split_deferral(&self) -> SplitDeferral {
        SplitDeferral::None
    }

    ///Leaves hold fully sorted, materialized entries
    fn is_sorted(&self) -> bool;

    fn skips_cost(&self) -> bool {
        false
    }
}

///Where inner nodes live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InnerLevels {
    in_memory: bool,
}

impl InnerLevels {
    fn search_order(self, order: NodeOrder) -> Option<NodeOrder> {
        (!self.in_memory).then_some(order)
    }

    fn write_each(self, pcm: &mut Pcm, bytes: Bytes, count: usize) -> Seconds {
        if self.in_memory {
            return 0.0;
        }
        pcm.write_each(bytes, count)
    }

    ///Opening a gap in a sorted inner node and writing key + pointer into it
    fn sorted_link(self, geometry: &Geometry, pcm: &mut Pcm, count: usize) -> Seconds {
        self.write_each(pcm, geometry.half_node(), count)
            + self.write_each(pcm, geometry.key_pointer(), count)
    }
}

fn descend_cost(
    inner: Option<NodeOrder>,
    leaf: NodeOrder,
    geometry: &Geometry,
    height: Size,
    pcm: &Pcm,
) -> Seconds {
    if height == 0 {
        return 0.0;
    }
    let inner_cost = inner.map_or(0.0, |order| order.search_cost(geometry, pcm));
    (height - 1) as Seconds * inner_cost + leaf.search_cost(geometry, pcm)
}

///Appending into an unsorted area: the entry plus its bitmap bit
fn append_entry(geometry: &Geometry, pcm: &mut Pcm) -> Seconds {
    pcm.write(geometry.entry_size) + pcm.write(FLAG_SIZE)
}

///Moving half a leaf into a new one and setting its bitmap
fn split_unsorted_leaves(geometry: &Geometry, pcm: &mut Pcm, count: usize) -> Seconds {
    merge_unsorted_leaves(geometry, pcm, count) + pcm.write_each(FLAG_SIZE, count)
}

///Moving the survivors of an emptied leaf into its neighbour, the bitmap is left alone
fn merge_unsorted_leaves(geometry: &Geometry, pcm: &mut Pcm, count: usize) -> Seconds {
    pcm.write_each(geometry.half_node(), count)
}

///Bulkloaded leaves each need a separator, extra inners only once they outnumber the leaves
fn bulkload_links(diff: StructureDiff) -> usize {
    diff.leaves.max(diff.inners)
}

///Classic B+tree, sorted inners and sorted leaves
#[derive(Debug, Clone, Copy)]
pub struct SortedTree {
    inners: InnerLevels,
}

impl SortedTree {
    pub fn new(inners_in_memory: bool) -> Self {
        Self {
            inners: InnerLevels {
                in_memory: inners_in_memory,
            },
        }
    }
}

impl NodeLayout for SortedTree {
    fn find_node_cost(&self, geometry: &Geometry, height: Size, pcm: &Pcm) -> Seconds {
        let inner = self.inners.search_order(NodeOrder::Sorted);
        descend_cost(inner, NodeOrder::Sorted, geometry, height, pcm)
    }

    fn insert_entry_cost(&self, geometry: &Geometry, pcm: &mut Pcm) -> Seconds {
        //make room in the sorted leaf, on average half of it moves
        pcm.write(geometry.half_node()) + pcm.write(geometry.entry_size)
    }

    fn delete_entry_cost(&self, geometry: &Geometry, pcm: &mut Pcm) -> Seconds {
        pcm.write(geometry.half_node())
    }

    fn insert_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        pcm.write_each(geometry.half_node(), diff.leaves)
            + self.inners.write_each(pcm, geometry.key_pointer(), diff.leaves)
            + self.inners.sorted_link(geometry, pcm, diff.inners)
    }

    fn bulkload_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        self.inners
            .sorted_link(geometry, pcm, bulkload_links(diff))
    }

    fn is_sorted(&self) -> bool {
        true
    }
}

///Sorted inners over unsorted, append-only leaves with a validity bitmap
#[derive(Debug, Clone, Copy)]
pub struct UnsortedLeavesTree {
    inners: InnerLevels,
}

impl UnsortedLeavesTree {
    pub fn new(inners_in_memory: bool) -> Self {
        Self {
            inners: InnerLevels {
                in_memory: inners_in_memory,
            },
        }
    }
}

impl NodeLayout for UnsortedLeavesTree {
    fn find_node_cost(&self, geometry: &Geometry, height: Size, pcm: &Pcm) -> Seconds {
        let inner = self.inners.search_order(NodeOrder::Sorted);
        descend_cost(inner, NodeOrder::Unsorted, geometry, height, pcm)
    }

    fn insert_entry_cost(&self, geometry: &Geometry, pcm: &mut Pcm) -> Seconds {
        append_entry(geometry, pcm)
    }

    fn delete_entry_cost(&self, _geometry: &Geometry, pcm: &mut Pcm) -> Seconds {
        pcm.write(FLAG_SIZE)
    }

    fn insert_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        split_unsorted_leaves(geometry, pcm, diff.leaves)
            + self
                .inners
                .sorted_link(geometry, pcm, diff.leaves + diff.inners)
    }

    fn delete_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        merge_unsorted_leaves(geometry, pcm, diff.leaves)
            + self
                .inners
                .sorted_link(geometry, pcm, diff.leaves + diff.inners)
    }

    fn bulkload_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        pcm.write_each(FLAG_SIZE, diff.leaves)
            + self
                .inners
                .sorted_link(geometry, pcm, bulkload_links(diff))
    }

    fn is_sorted(&self) -> bool {
        false
    }
}

///Every node unsorted, keys and pointers are appended and tracked by a bitmap
#[derive(Debug, Clone, Copy)]
pub struct UnsortedTree;

impl UnsortedTree {
    fn append_pointer(geometry: &Geometry, pcm: &mut Pcm, count: usize) -> Seconds {
        pcm.write_each(geometry.key_pointer(), count) + pcm.write_each(FLAG_SIZE, count)
    }

    fn move_inners(geometry: &Geometry, pcm: &mut Pcm, count: usize) -> Seconds {
        pcm.write_each(geometry.half_node(), count) + Self::append_pointer(geometry, pcm, count)
    }
}

impl NodeLayout for UnsortedTree {
    fn find_node_cost(&self, geometry: &Geometry, height: Size, pcm: &Pcm) -> Seconds {
        descend_cost(
            Some(NodeOrder::Unsorted),
            NodeOrder::Unsorted,
            geometry,
            height,
            pcm,
        )
    }

    fn insert_entry_cost(&self, geometry: &Geometry, pcm: &mut Pcm) -> Seconds {
        append_entry(geometry, pcm)
    }

    fn delete_entry_cost(&self, _geometry: &Geometry, pcm: &mut Pcm) -> Seconds {
        pcm.write(FLAG_SIZE)
    }

    fn insert_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        split_unsorted_leaves(geometry, pcm, diff.leaves)
            + Self::append_pointer(geometry, pcm, diff.leaves)
            + Self::move_inners(geometry, pcm, diff.inners)
    }

    fn delete_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        merge_unsorted_leaves(geometry, pcm, diff.leaves)
            + Self::move_inners(geometry, pcm, diff.inners)
    }

    fn bulkload_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        Self::append_pointer(geometry, pcm, diff.leaves)
            + Self::move_inners(geometry, pcm, diff.inners)
    }

    fn is_sorted(&self) -> bool {
        false
    }
}

///CB-tree: sorted nodes, each leaf with an overflow buffer so inserts append and splits
/// wait. The optimized variant also postpones inner splits
#[derive(Debug, Clone, Copy)]
pub struct CbTree {
    optimized: bool,
}

impl CbTree {
    pub fn new(optimized: bool) -> Self {
        Self { optimized }
    }

    fn delayed(count: usize) -> usize {
        (count as f64 / CBTREE_WAIT_FOR_SPLIT) as usize
    }
}

impl NodeLayout for CbTree {
    fn find_node_cost(&self, geometry: &Geometry, height: Size, pcm: &Pcm) -> Seconds {
        descend_cost(
            Some(NodeOrder::Sorted),
            NodeOrder::Sorted,
            geometry,
            height,
            pcm,
        )
    }

    fn insert_entry_cost(&self, geometry: &Geometry, pcm: &mut Pcm) -> Seconds {
        append_entry(geometry, pcm) //into the overflow buffer
    }

    fn delete_entry_cost(&self, _geometry: &Geometry, pcm: &mut Pcm) -> Seconds {
        pcm.write(FLAG_SIZE)
    }

    fn insert_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        let inners = InnerLevels { in_memory: false };
        split_unsorted_leaves(geometry, pcm, diff.leaves)
            + inners.sorted_link(geometry, pcm, diff.leaves + diff.inners)
    }

    fn delete_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        let inners = InnerLevels { in_memory: false };
        merge_unsorted_leaves(geometry, pcm, diff.leaves)
            + inners.sorted_link(geometry, pcm, diff.leaves + diff.inners)
    }

    fn bulkload_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        let inners = InnerLevels { in_memory: false };
        //inners beyond one per leaf, the optimized tree lets those overflow as well
        let extra_inners = diff.inners.saturating_sub(diff.leaves);
        let extra_inners = if self.optimized {
            Self::delayed(extra_inners)
        } else {
            extra_inners
        };
        inners.sorted_link(geometry, pcm, Self::delayed(diff.leaves) + extra_inners)
    }

    fn split_deferral(&self) -> SplitDeferral {
        if self.optimized {
            SplitDeferral::LeavesAndInners
        } else {
            SplitDeferral::Leaves
        }
    }

    fn is_sorted(&self) -> bool {
        true
    }
}

///Leaves split into a sorted section (bulkloaded) and an unsorted section (inserts)
#[derive(Debug, Clone, Copy)]
pub struct TwoSectionTree {
    inners: InnerLevels,
}

impl TwoSectionTree {
    pub fn new(inners_in_memory: bool) -> Self {
        Self {
            inners: InnerLevels {
                in_memory: inners_in_memory,
            },
        }
    }
}

impl NodeLayout for TwoSectionTree {
    fn find_node_cost(&self, geometry: &Geometry, height: Size, pcm: &Pcm) -> Seconds {
        let inner = self.inners.search_order(NodeOrder::Sorted);
        descend_cost(inner, NodeOrder::TwoSection, geometry, height, pcm)
    }

    fn insert_entry_cost(&self, geometry: &Geometry, pcm: &mut Pcm) -> Seconds {
        append_entry(geometry, pcm)
    }

    fn delete_entry_cost(&self, _geometry: &Geometry, pcm: &mut Pcm) -> Seconds {
        pcm.write(FLAG_SIZE)
    }

    fn insert_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        split_unsorted_leaves(geometry, pcm, diff.leaves)
            + self
                .inners
                .sorted_link(geometry, pcm, diff.leaves + diff.inners)
    }

    fn delete_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        merge_unsorted_leaves(geometry, pcm, diff.leaves)
            + self
                .inners
                .sorted_link(geometry, pcm, diff.leaves + diff.inners)
    }

    fn bulkload_structural_cost(
        &self,
        geometry: &Geometry,
        pcm: &mut Pcm,
        diff: StructureDiff,
    ) -> Seconds {
        self.inners
            .sorted_link(geometry, pcm, bulkload_links(diff))
    }

    fn is_sorted(&self) -> bool {
        false
    }
}

///Charges nothing, lets experiments isolate the remaining costs
#[derive(Debug, Clone, Copy)]
pub struct SkipCost;

impl NodeLayout for SkipCost {
    fn find_node_cost(&self, _geometry: &Geometry, _height: Size, _pcm: &Pcm) -> Seconds {
        0.0
    }

    fn insert_entry_cost(&self, _geometry: &Geometry, _pcm: &mut Pcm) -> Seconds {
        0.0
    }

    fn delete_entry_cost(&self, _geometry: &Geometry, _pcm: &mut Pcm) -> Seconds {
        0.0
    }

    fn insert_structural_cost(
        &self,
        _geometry: &Geometry,
        _pcm: &mut Pcm,
        _diff: StructureDiff,
    ) -> Seconds {
        0.0
    }

    fn bulkload_structural_cost(
        &self,
        _geometry: &Geometry,
        _pcm: &mut Pcm,
        _diff: StructureDiff,
    ) -> Seconds {
        0.0
    }

    fn is_sorted(&self) -> bool {
        false
    }

    fn skips_cost(&self) -> bool {
        true
    }
}
