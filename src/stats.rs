use std::fmt;

use tracing::trace;

use crate::util::types::Seconds;

///What a reported time delta was spent on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Invalidation, //marking partition entries as merged
    Index,        //index search / insert / delete
    Misc,
}

///Time spent per category, in seconds
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub invalidation_time: Seconds,
    pub index_time: Seconds,
    pub misc_time: Seconds,
}

impl Snapshot {
    pub fn time(&self) -> Seconds {
        self.index_time + self.invalidation_time + self.misc_time
    }

    fn add(&mut self, category: Category, seconds: Seconds) {
        match category {
            Category::Invalidation => self.invalidation_time += seconds,
            Category::Index => self.index_time += seconds,
            Category::Misc => self.misc_time += seconds,
        }
    }

    fn merge(&mut self, other: &Snapshot) {
        self.invalidation_time += other.invalidation_time;
        self.index_time += other.index_time;
        self.misc_time += other.misc_time;
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\tINVALIDATION  TIME     = {:.6}s", self.invalidation_time)?;
        writeln!(f, "\tINDEX         TIME     = {:.6}s", self.index_time)?;
        writeln!(f, "\tMISC          TIME     = {:.6}s", self.misc_time)?;
        writeln!(f, "\tTOTAL         TIME     = {:.6}s", self.time())
    }
}

///Statistics sink owned by the driver and lent to every engine call.
/// Engines only report into it, reading it back is the driver's business
#[derive(Debug, Default, Clone)]
pub struct DbStat {
    current: Snapshot,
    total: Snapshot,
}

impl DbStat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, category: Category, seconds: Seconds) {
        self.current.add(category, seconds);
    }

    ///Reset both current query and running total
    pub fn reset(&mut self) {
        trace!("resetting db statistics");
        *self = Self::default();
    }

    pub fn reset_query(&mut self) {
        self.current = Snapshot::default();
    }

    pub fn start_query(&mut self) {
        self.reset_query();
    }

    ///Adds the current query into the running total
    pub fn finish_query(&mut self) {
        self.total.merge(&self.current);
    }

    pub fn current(&self) -> &Snapshot {
        &self.current
    }
    pub fn total(&self) -> &Snapshot {
        &self.total
    }
    pub fn current_time(&self) -> Seconds {
        self.current.time()
    }
    pub fn total_time(&self) -> Seconds {
        self.total.time()
    }
}

impl fmt::Display for DbStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CURRENT QUERY\n")?;
        write!(f, "{}", self.current)?;
        writeln!(f, "TOTAL\n")?;
        write!(f, "{}", self.total)
    }
}
