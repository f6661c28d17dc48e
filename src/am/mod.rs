//! Adaptive merging: the index is built lazily, one query at a time.
//!
//! The first search reads the table, bulkloads what it asked for and sorts the
//! rest into partitions. Every later search takes part of its entries from the
//! index and the rest from the partitions, which are then invalidated and
//! merged into the index, until the partitions are gone.

pub mod partitions;

use std::rc::Rc;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, trace, warn};

use crate::{
    config::AmConfig,
    error::Result,
    index::{BTreeKind, DbIndex},
    pcm::SharedPcm,
    stats::{Category, DbStat},
    util::types::{Bytes, InvalidationPolicy, QueryKind, Seconds, Size},
};

use self::partitions::PartitionPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmState {
    ///Table not read yet, the first search builds the partitions
    Uninitialized,
    Active,
    ///Every entry lives in the index
    Merged,
}

#[derive(Debug)]
pub struct AdaptiveMerging {
    num_entries: Size, //index + partitions once initialized
    entry_size: Bytes,
    sort_buffer_size: Bytes,
    initialized: bool,
    partitions: PartitionPool,
    index: DbIndex,
    deletion_index: Option<DbIndex>, //deletes from partitions land here instead of rewriting them
    pcm: SharedPcm,
    rng: StdRng,
}

impl AdaptiveMerging {
    pub fn new(pcm: SharedPcm, config: AmConfig) -> Result<Self> {
        config.validate()?;
        let index = config.index_config().build(Rc::clone(&pcm))?;
        Ok(Self {
            num_entries: config.num_entries(),
            entry_size: config.entry_size(),
            sort_buffer_size: config.sort_buffer_size(),
            initialized: false,
            partitions: PartitionPool::new(config.invalidation()),
            index,
            deletion_index: None,
            pcm,
            rng: StdRng::seed_from_u64(config.seed()),
        })
    }

    ///Same engine, with deletes from partitions redirected into a second index
    pub fn with_deletion_index(pcm: SharedPcm, config: AmConfig) -> Result<Self> {
        let deletion_index = config.index_config().build(Rc::clone(&pcm))?;
        let mut am = Self::new(pcm, config)?;
        am.deletion_index = Some(deletion_index);
        Ok(am)
    }

    //GETTERS (start)
    pub fn num_entries(&self) -> Size {
        self.num_entries
    }
    pub fn partition_entries(&self) -> Size {
        self.partitions.num_entries()
    }
    pub fn num_partitions(&self) -> Size {
        self.partitions.num_partitions()
    }
    pub fn partitions(&self) -> &PartitionPool {
        &self.partitions
    }
    pub fn index(&self) -> &DbIndex {
        &self.index
    }
    pub fn deletion_index(&self) -> Option<&DbIndex> {
        self.deletion_index.as_ref()
    }
    pub fn pcm(&self) -> &SharedPcm {
        &self.pcm
    }
    //GETTERS (end)

    pub fn state(&self) -> AmState {
        if !self.initialized {
            AmState::Uninitialized
        } else if self.partitions.is_empty() {
            AmState::Merged
        } else {
            AmState::Active
        }
    }

    ///Loop exit condition for drivers
    pub fn is_merged(&self) -> bool {
        self.state() == AmState::Merged
    }

    fn key_size(&self) -> Bytes {
        self.index.key_size()
    }

    ///Writing partitions is free when the measurement isolates another cost
    fn skips_partition_write(&self) -> bool {
        self.index.kind() == BTreeKind::SkipCost
            || self.partitions.invalidation() == InvalidationPolicy::Skip
    }

    ///Reads the whole table, bulkloads what the first query asked for and partitions the rest
    fn init(&mut self, entries: Size, stats: &mut DbStat) -> Seconds {
        //entries inserted before the first search are already in the index
        let raw_entries = self.num_entries - self.index.num_entries();
        let to_index = entries.min(raw_entries);
        let to_partitions = raw_entries - to_index;
        debug!(raw_entries, to_index, to_partitions, "initializing adaptive merging");

        let read = self.pcm.borrow().read(raw_entries * self.entry_size);
        stats.report(Category::Misc, read);
        let mut time = read;

        time += self.index.bulkload(to_index, stats);

        self.partitions
            .create(to_partitions, self.entry_size, self.sort_buffer_size);
        if !self.skips_partition_write() {
            let write = self
                .pcm
                .borrow_mut()
                .write(to_partitions * self.entry_size);
            stats.report(Category::Misc, write);
            time += write;
        }

        self.initialized = true;
        time
    }

    ///Monte Carlo split: how many of `entries` random picks over the whole table hit the index
    fn random_from_index(&mut self, entries: Size) -> Size {
        if self.num_entries == 0 {
            return 0;
        }
        let partition_entries = self.partitions.num_entries();
        (0..entries)
            .filter(|_| self.rng.gen_range(0..self.num_entries) >= partition_entries)
            .count()
    }

    ///Entries of a query served by the index, the rest comes from partitions
    fn entries_from_index(&mut self, query: QueryKind, entries: Size) -> Size {
        let partition_entries = self.partitions.num_entries();
        let from_index = match query {
            QueryKind::Random => self.random_from_index(entries),
            QueryKind::AlwaysNew => entries.saturating_sub(partition_entries),
            QueryKind::SequentialPattern => {
                if self.index.num_entries() == self.num_entries {
                    entries
                } else {
                    entries / 2
                }
            }
        };

        //neither side can give more than it holds
        from_index
            .min(self.index.num_entries())
            .max(entries.saturating_sub(partition_entries))
    }

    ///Requests larger than the table are served with the whole table
    fn clamp_request(&self, entries: Size, operation: &str) -> Size {
        let available = self.index.num_entries() + self.partitions.num_entries();
        if entries > available {
            warn!(
                operation,
                requested = entries,
                available,
                "request clamped to table size"
            );
            return available;
        }
        entries
    }

    pub fn search(&mut self, query: QueryKind, entries: Size, stats: &mut DbStat) -> Seconds {
        trace!(?query, entries, "adaptive merging search");
        if !self.initialized {
            return self.init(entries, stats);
        }

        let entries = self.clamp_request(entries, "search");
        let from_index = self.entries_from_index(query, entries);
        let from_partitions = entries - from_index;

        let mut time = 0.0;
        if from_index > 0 {
            time += self.index.range_search(from_index, stats);
        }
        time += self.load_from_partitions(from_partitions, true, stats);
        if from_partitions > 0 {
            time += self.index.bulkload(from_partitions, stats);
        }

        if !self.partitions.is_empty()
            && self
                .partitions
                .fits_in(self.entry_size, self.sort_buffer_size)
        {
            let rest = self.partitions.drain();
            debug!(rest, "last partitions merged into the index");
            time += self.index.bulkload(rest, stats);
        }
        time
    }

    ///Seek and invalidate `entries` in the partitions, reading them when the caller needs the data
    fn load_from_partitions(&mut self, entries: Size, read: bool, stats: &mut DbStat) -> Seconds {
        if entries == 0 {
            return 0.0;
        }
        let key_size = self.key_size();
        let mut pcm = self.pcm.borrow_mut();

        let mut misc = self.partitions.seek_cost(self.entry_size, &pcm);
        if read {
            misc += pcm.read(entries * self.entry_size);
        }
        stats.report(Category::Misc, misc);

        let invalidation = self.partitions.invalidate(entries, key_size, &mut pcm);
        stats.report(Category::Invalidation, invalidation);

        self.partitions.take(entries);
        misc + invalidation
    }

    ///New entries always go to the index
    pub fn insert(&mut self, entries: Size, stats: &mut DbStat) -> Seconds {
        trace!(entries, "adaptive merging insert");
        self.num_entries += entries;
        self.index.insert(entries, stats)
    }

    ///Pays the work both indexes still buffer, for the end of a workload
    pub fn flush(&mut self, stats: &mut DbStat) -> Seconds {
        trace!("adaptive merging flush");
        let deletions = self
            .deletion_index
            .as_mut()
            .map_or(0.0, |index| index.flush(stats));
        self.index.flush(stats) + deletions
    }

    pub fn delete(&mut self, entries: Size, stats: &mut DbStat) -> Seconds {
        trace!(entries, "adaptive merging delete");
        if !self.initialized {
            //still a raw table, nothing indexed to maintain
            let removed = entries.min(self.num_entries - self.index.num_entries());
            debug!(removed, "delete before initialization");
            self.num_entries -= removed;
            return 0.0;
        }

        let entries = self.clamp_request(entries, "delete");
        let from_index = self.entries_from_index(QueryKind::Random, entries);
        let from_partitions = entries - from_index;

        let mut time = 0.0;
        if from_index > 0 {
            time += self.index.delete(from_index, stats);
        }
        if from_partitions > 0 {
            time += self.delete_from_partitions(from_partitions, stats);
        }
        self.num_entries -= entries;
        time
    }

    fn delete_from_partitions(&mut self, entries: Size, stats: &mut DbStat) -> Seconds {
        let redirect = self.index.is_sorted() && self.deletion_index.is_some();
        if !redirect {
            return self.load_from_partitions(entries, false, stats);
        }

        //pay for finding the entries once, then remember them as deleted
        let misc = {
            let pcm = self.pcm.borrow();
            self.partitions.seek_cost(self.entry_size, &pcm) + pcm.read(entries * self.entry_size)
        };
        stats.report(Category::Misc, misc);
        self.partitions.take(entries);

        let deleted = self
            .deletion_index
            .as_mut()
            .map_or(0.0, |index| index.insert(entries, stats));
        misc + deleted
    }
}
