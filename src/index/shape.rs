use serde::{Deserialize, Serialize};

use crate::{
    ceil_div,
    error::{ensure_positive, Result, SimError},
    util::{
        system_info::POINTER_SIZE,
        types::{Bytes, Size},
    },
};

///Byte sizes describing one B+tree. Every structural number is a pure function of these and the entry count
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub key_size: Bytes,
    pub entry_size: Bytes,
    pub node_size: Bytes,
    pub node_factor: f64, //fraction of a node usable after bookkeeping
}

///Leaves and inner nodes of a tree (or the difference between two trees)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StructureDiff {
    pub leaves: Size,
    pub inners: Size,
}

impl StructureDiff {
    pub fn new(leaves: Size, inners: Size) -> Self {
        Self { leaves, inners }
    }

    pub fn is_empty(&self) -> bool {
        self.leaves == 0 && self.inners == 0
    }

    ///Nodes gained going from `before` to `self`, for growing trees
    pub fn grown_from(&self, before: &StructureDiff) -> StructureDiff {
        StructureDiff::new(
            self.leaves.saturating_sub(before.leaves),
            self.inners.saturating_sub(before.inners),
        )
    }

    pub fn accumulate(&mut self, other: StructureDiff) {
        self.leaves += other.leaves;
        self.inners += other.inners;
    }
}

impl Geometry {
    pub fn new(key_size: Bytes, entry_size: Bytes, node_size: Bytes, node_factor: f64) -> Result<Self> {
        ensure_positive("key_size", key_size)?;
        ensure_positive("entry_size", entry_size)?;
        ensure_positive("node_size", node_size)?;
        if !(node_factor > 0.0 && node_factor <= 1.0) {
            return Err(SimError::invalid(
                "node_factor",
                format!("{node_factor} is outside of (0, 1]"),
            ));
        }

        let geometry = Self {
            key_size,
            entry_size,
            node_size,
            node_factor,
        };
        if geometry.node_bytes() == 0 {
            return Err(SimError::invalid("node_size", "node holds no usable bytes"));
        }
        //a fanout of 1 never shrinks the node count, the tree would have no root
        if geometry.keys_per_node() < 2 {
            return Err(SimError::invalid(
                "node_size",
                format!("{node_size}B node cannot hold 2 keys of {key_size}B"),
            ));
        }
        Ok(geometry)
    }

    ///Usable bytes in a node
    pub fn node_bytes(&self) -> Bytes {
        (self.node_size as f64 * self.node_factor) as Bytes
    }

    ///Average amount of data shifted when making room in (or splitting) a sorted node
    pub fn half_node(&self) -> Bytes {
        self.node_bytes() / 2
    }

    ///One key with its child pointer, the unit written into an inner node
    pub fn key_pointer(&self) -> Bytes {
        self.key_size + POINTER_SIZE
    }

    ///Fanout of inner nodes
    pub fn keys_per_node(&self) -> Size {
        (self.node_size as f64 * self.node_factor / self.key_pointer() as f64).ceil() as Size
    }

    pub fn leaves_for(&self, num_entries: Size) -> Size {
        ceil_div!(num_entries * self.entry_size, self.node_bytes())
    }

    ///Every inner level above the leaves, summed
    pub fn inners_for(&self, num_entries: Size) -> Size {
        let fanout = self.keys_per_node();
        let mut nodes = self.leaves_for(num_entries);
        let mut inners = 0;
        while nodes > 1 {
            nodes = ceil_div!(nodes, fanout);
            inners += nodes;
        }
        inners
    }

    ///Levels visited from the root down to (and including) a leaf, 0 for an empty tree
    pub fn height_for(&self, num_entries: Size) -> Size {
        let leaves = self.leaves_for(num_entries);
        if leaves == 0 {
            return 0;
        }
        //ceil(log_fanout(leaves)) without float rounding at exact powers
        let fanout = self.keys_per_node();
        let mut inner_levels = 0;
        let mut reach: Size = 1;
        while reach < leaves {
            reach = reach.saturating_mul(fanout);
            inner_levels += 1;
        }
        inner_levels + 1
    }

    pub fn structure_for(&self, num_entries: Size) -> StructureDiff {
        StructureDiff::new(self.leaves_for(num_entries), self.inners_for(num_entries))
    }
}
