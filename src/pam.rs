use tracing::trace;

use crate::{
    am::{AdaptiveMerging, AmState},
    config::AmConfig,
    error::Result,
    pcm::SharedPcm,
    stats::DbStat,
    util::types::{InvalidationPolicy, QueryKind, Seconds, Size},
};

///PCM-aware adaptive merging: a journal instead of rewriting partitions, and a deletion
/// index so deletes never touch them either
#[derive(Debug)]
pub struct DbPam {
    am: AdaptiveMerging,
}

impl DbPam {
    ///The invalidation policy of `config` is ignored
    pub fn new(pcm: SharedPcm, config: AmConfig) -> Result<Self> {
        let config = config.set_invalidation(InvalidationPolicy::Journal);
        Ok(Self {
            am: AdaptiveMerging::with_deletion_index(pcm, config)?,
        })
    }

    pub fn am(&self) -> &AdaptiveMerging {
        &self.am
    }

    pub fn state(&self) -> AmState {
        self.am.state()
    }

    pub fn is_merged(&self) -> bool {
        self.am.is_merged()
    }

    pub fn search(&mut self, query: QueryKind, entries: Size, stats: &mut DbStat) -> Seconds {
        trace!(?query, entries, "pam search");
        self.am.search(query, entries, stats)
    }

    pub fn insert(&mut self, entries: Size, stats: &mut DbStat) -> Seconds {
        trace!(entries, "pam insert");
        self.am.insert(entries, stats)
    }

    pub fn delete(&mut self, entries: Size, stats: &mut DbStat) -> Seconds {
        trace!(entries, "pam delete");
        self.am.delete(entries, stats)
    }

    pub fn flush(&mut self, stats: &mut DbStat) -> Seconds {
        trace!("pam flush");
        self.am.flush(stats)
    }
}
