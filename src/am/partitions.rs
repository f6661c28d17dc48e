use tracing::debug;

use crate::{
    ceil_div,
    pcm::Pcm,
    util::{
        system_info::{BITS_PER_BYTE, FLAG_SIZE},
        types::{Bytes, InvalidationPolicy, Seconds, Size},
    },
};

///Sorted runs not merged into the index yet. Only counts are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPool {
    num_entries: Size,
    num_partitions: Size,
    invalidation: InvalidationPolicy,
}

impl PartitionPool {
    pub fn new(invalidation: InvalidationPolicy) -> Self {
        Self {
            num_entries: 0,
            num_partitions: 0,
            invalidation,
        }
    }

    pub fn num_entries(&self) -> Size {
        self.num_entries
    }
    pub fn num_partitions(&self) -> Size {
        self.num_partitions
    }
    pub fn invalidation(&self) -> InvalidationPolicy {
        self.invalidation
    }
    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    ///Sorts `entries` into runs of one sort buffer each
    pub fn create(&mut self, entries: Size, entry_size: Bytes, sort_buffer_size: Bytes) {
        self.num_entries += entries;
        self.num_partitions = ceil_div!(self.num_entries * entry_size, sort_buffer_size);
        debug!(
            entries = self.num_entries,
            partitions = self.num_partitions,
            "created partitions"
        );
    }

    ///The tail fits in one sort pass and can go to the index at once
    pub fn fits_in(&self, entry_size: Bytes, sort_buffer_size: Bytes) -> bool {
        self.num_entries * entry_size <= sort_buffer_size
    }

    ///Empties the pool, returns how many entries were left
    pub fn drain(&mut self) -> Size {
        self.num_partitions = 0;
        std::mem::take(&mut self.num_entries)
    }

    pub fn take(&mut self, entries: Size) {
        self.num_entries -= entries.min(self.num_entries);
    }

    ///Binary search in every partition touched, one entry read per probe
    pub fn seek_cost(&self, entry_size: Bytes, pcm: &Pcm) -> Seconds {
        if self.num_partitions == 0 {
            return 0.0;
        }
        let per_partition = ceil_div!(self.num_entries, self.num_partitions);
        let probes = probes_for(per_partition);

        //a journal is merged on the fly, so only half of the runs need a seek
        let seeked = match self.invalidation {
            InvalidationPolicy::Journal => ceil_div!(self.num_partitions, 2),
            _ => self.num_partitions,
        };
        (seeked * probes) as Seconds * pcm.read(entry_size)
    }

    ///Marks `entries` as merged. Called before they are taken out of the pool
    pub fn invalidate(&self, entries: Size, key_size: Bytes, pcm: &mut Pcm) -> Seconds {
        if entries == 0 {
            return 0.0;
        }
        match self.invalidation {
            InvalidationPolicy::Flag => pcm.write_each(FLAG_SIZE, entries),
            InvalidationPolicy::Bitmap => {
                let partitions = self.num_partitions.max(1);
                let per_partition = ceil_div!(entries, partitions);
                pcm.write_each(ceil_div!(per_partition, BITS_PER_BYTE), partitions)
            }
            InvalidationPolicy::Journal => pcm.write(2 * key_size),
            InvalidationPolicy::Overwrite => pcm.write(self.num_entries / 8),
            InvalidationPolicy::Skip => 0.0,
        }
    }
}

///ceil(log2(entries))
fn probes_for(entries: Size) -> Size {
    if entries <= 1 {
        return 0;
    }
    (usize::BITS - (entries - 1).leading_zeros()) as Size
}
