use crate::util::types::Size;

use super::shape::StructureDiff;

///Operations a buffered tree keeps in DRAM before one bulkload flush
pub const BUFFERED_TREE_FLUSH_THRESHOLD: Size = 1000;

///Flushing the DRAM buffer merges into a live tree, it costs more than a plain bulkload
pub const BUFFERED_TREE_FLUSH_COST_FACTOR: f64 = 2.0;

///Structure changes a CB-tree postpones before paying for them
pub const CBTREE_SPLIT_FLUSH_THRESHOLD: Size = 10;

///Counter of postponed operations with a flush threshold. Buffered trees check the
/// threshold on insertions only, deletes just add to the count until the next insertion
/// or an explicit flush pays for them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpBuffer {
    pending: Size,
    threshold: Size,
}

impl OpBuffer {
    pub fn new(threshold: Size) -> Self {
        Self {
            pending: 0,
            threshold,
        }
    }

    pub fn pending(&self) -> Size {
        self.pending
    }

    pub fn record(&mut self, count: Size) {
        self.pending += count;
    }

    ///Empties the buffer once it reached its threshold, returns how many operations were flushed
    pub fn maybe_flush(&mut self) -> Option<Size> {
        if self.pending == 0 || self.pending < self.threshold {
            return None;
        }
        Some(self.drain())
    }

    pub fn drain(&mut self) -> Size {
        std::mem::take(&mut self.pending)
    }
}

///Splits and merges waiting to be paid for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitBuffer {
    splits: StructureDiff,
    merges: StructureDiff,
    counter: OpBuffer,
}

impl SplitBuffer {
    pub fn new(threshold: Size) -> Self {
        Self {
            splits: StructureDiff::default(),
            merges: StructureDiff::default(),
            counter: OpBuffer::new(threshold),
        }
    }

    pub fn pending(&self) -> Size {
        self.counter.pending()
    }

    pub fn record_splits(&mut self, diff: StructureDiff) {
        self.splits.accumulate(diff);
        self.counter.record(diff.leaves + diff.inners);
    }

    pub fn record_merges(&mut self, diff: StructureDiff) {
        self.merges.accumulate(diff);
        self.counter.record(diff.leaves + diff.inners);
    }

    ///(splits, merges) to pay for, once enough of them piled up
    pub fn maybe_flush(&mut self) -> Option<(StructureDiff, StructureDiff)> {
        self.counter.maybe_flush()?;
        Some(self.take())
    }

    pub fn drain(&mut self) -> (StructureDiff, StructureDiff) {
        self.counter.drain();
        self.take()
    }

    fn take(&mut self) -> (StructureDiff, StructureDiff) {
        (
            std::mem::take(&mut self.splits),
            std::mem::take(&mut self.merges),
        )
    }
}
