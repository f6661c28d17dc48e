use pcm_am_sim::{
    util::types::{QueryKind, Seconds, Size},
    AdaptiveMerging, Category, DbPam, DbStat, SharedPcm, StressBatch,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

///Safety net for query loops, a merge never needs this many queries at sane selectivities
const MAX_QUERIES: usize = 1_000_000;

///What the benchmarker drives: adaptive merging with or without PAM tweaks
pub trait MergingEngine {
    fn search(&mut self, query: QueryKind, entries: Size, stats: &mut DbStat) -> Seconds;
    fn insert(&mut self, entries: Size, stats: &mut DbStat) -> Seconds;
    fn delete(&mut self, entries: Size, stats: &mut DbStat) -> Seconds;
    fn flush(&mut self, stats: &mut DbStat) -> Seconds;
    fn is_merged(&self) -> bool;
    fn indexed_entries(&self) -> Size;
    fn total_entries(&self) -> Size;
}

impl MergingEngine for AdaptiveMerging {
    fn search(&mut self, query: QueryKind, entries: Size, stats: &mut DbStat) -> Seconds {
        AdaptiveMerging::search(self, query, entries, stats)
    }
    fn insert(&mut self, entries: Size, stats: &mut DbStat) -> Seconds {
        AdaptiveMerging::insert(self, entries, stats)
    }
    fn delete(&mut self, entries: Size, stats: &mut DbStat) -> Seconds {
        AdaptiveMerging::delete(self, entries, stats)
    }
    fn flush(&mut self, stats: &mut DbStat) -> Seconds {
        AdaptiveMerging::flush(self, stats)
    }
    fn is_merged(&self) -> bool {
        AdaptiveMerging::is_merged(self)
    }
    fn indexed_entries(&self) -> Size {
        self.index().num_entries()
    }
    fn total_entries(&self) -> Size {
        self.num_entries()
    }
}

impl MergingEngine for DbPam {
    fn search(&mut self, query: QueryKind, entries: Size, stats: &mut DbStat) -> Seconds {
        DbPam::search(self, query, entries, stats)
    }
    fn insert(&mut self, entries: Size, stats: &mut DbStat) -> Seconds {
        DbPam::insert(self, entries, stats)
    }
    fn delete(&mut self, entries: Size, stats: &mut DbStat) -> Seconds {
        DbPam::delete(self, entries, stats)
    }
    fn flush(&mut self, stats: &mut DbStat) -> Seconds {
        DbPam::flush(self, stats)
    }
    fn is_merged(&self) -> bool {
        DbPam::is_merged(self)
    }
    fn indexed_entries(&self) -> Size {
        self.am().index().num_entries()
    }
    fn total_entries(&self) -> Size {
        self.am().num_entries()
    }
}

///One engine under test, on its own device and with its own statistics
pub struct Contender {
    pub name: &'static str,
    engine: Box<dyn MergingEngine>,
    pcm: SharedPcm,
    stats: DbStat,
}

impl Contender {
    pub fn new(name: &'static str, engine: Box<dyn MergingEngine>, pcm: SharedPcm) -> Self {
        Self {
            name,
            engine,
            pcm,
            stats: DbStat::new(),
        }
    }

    pub fn wearout(&self) -> usize {
        self.pcm.borrow().wearout()
    }

    pub fn stats(&self) -> &DbStat {
        &self.stats
    }

    pub fn total_time(&self) -> Seconds {
        self.stats.total_time()
    }

    pub fn total_of(&self, category: Category) -> Seconds {
        let total = self.stats.total();
        match category {
            Category::Invalidation => total.invalidation_time,
            Category::Index => total.index_time,
            Category::Misc => total.misc_time,
        }
    }

    fn measure(&mut self, op: impl FnOnce(&mut dyn MergingEngine, &mut DbStat)) -> Seconds {
        self.stats.start_query();
        op(self.engine.as_mut(), &mut self.stats);
        self.stats.finish_query();
        self.stats.current_time()
    }
}

///Runs the same workload over several contenders, query by query
pub struct Benchmarker {
    contenders: Vec<Contender>,
}

impl Benchmarker {
    pub fn new() -> Self {
        Self {
            contenders: Vec::new(),
        }
    }

    pub fn add(mut self, contender: Contender) -> Self {
        self.contenders.push(contender);
        self
    }

    pub fn contenders(&self) -> &[Contender] {
        &self.contenders
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.contenders.iter().map(|c| c.name).collect()
    }

    ///Initializes every engine with a one entry query, then forgets what it cost
    pub fn skip_init(&mut self, query: QueryKind) {
        for contender in self.contenders.iter_mut() {
            contender.engine.search(query, 1, &mut contender.stats);
            contender.pcm.borrow_mut().reset_wearout();
            contender.stats.reset();
        }
    }

    pub fn all_merged(&self) -> bool {
        self.contenders.iter().all(|c| c.engine.is_merged())
    }

    ///One search on every contender, returns the time each one took
    pub fn run_query(&mut self, query: QueryKind, entries: Size) -> Vec<Seconds> {
        self.contenders
            .iter_mut()
            .map(|contender| {
                contender.measure(|engine, stats| {
                    engine.search(query, entries, stats);
                })
            })
            .collect()
    }

    ///Searches until every contender merged all its partitions, calls `on_query` after each round
    pub fn run_until_merged(
        &mut self,
        query: QueryKind,
        entries: Size,
        mut on_query: impl FnMut(usize, &[Seconds], &Self) -> pcm_am_sim::Result<()>,
    ) -> pcm_am_sim::Result<usize> {
        let mut queries = 0;
        while !self.all_merged() {
            if queries == MAX_QUERIES {
                warn!(queries, "stopping before every engine merged");
                break;
            }
            let times = self.run_query(query, entries);
            queries += 1;
            on_query(queries, &times, self)?;
        }
        info!(queries, "all partitions merged");
        Ok(queries)
    }

    ///Random searches, then single entry inserts and deletes, as one measured query per contender
    pub fn run_batch(&mut self, batch: &StressBatch, search_entries: Size) -> Vec<Seconds> {
        self.contenders
            .iter_mut()
            .map(|contender| {
                contender.measure(|engine, stats| {
                    for _ in 0..batch.rsearches {
                        engine.search(QueryKind::Random, search_entries, stats);
                    }
                    for _ in 0..batch.inserts {
                        engine.insert(1, stats);
                    }
                    for _ in 0..batch.deletes {
                        engine.delete(1, stats);
                    }
                })
            })
            .collect()
    }

    ///Pays what the engines still buffer, as one more measured query. Call before reading totals
    pub fn settle(&mut self) -> Vec<Seconds> {
        self.contenders
            .iter_mut()
            .map(|contender| {
                contender.measure(|engine, stats| {
                    engine.flush(stats);
                })
            })
            .collect()
    }

    pub fn progress(&self) -> String {
        self.contenders
            .iter()
            .map(|c| {
                format!(
                    "{} ({}/{})",
                    c.name,
                    c.engine.indexed_entries(),
                    c.engine.total_entries()
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

///Tab separated report file
pub struct TsvReport {
    path: PathBuf,
    writer: csv::Writer<fs::File>,
}

impl TsvReport {
    pub fn create(out_dir: &Path, name: &str, header: &[&str]) -> pcm_am_sim::Result<Self> {
        let path = out_dir.join(format!("{name}.tsv"));
        let writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(&path)?;
        let mut report = Self { path, writer };
        report.row(header)?;
        Ok(report)
    }

    pub fn row<S: AsRef<str>>(&mut self, cells: &[S]) -> pcm_am_sim::Result<()> {
        self.writer
            .write_record(cells.iter().map(|cell| cell.as_ref()))?;
        Ok(())
    }

    pub fn finish(mut self) -> pcm_am_sim::Result<PathBuf> {
        self.writer.flush()?;
        info!(path = %self.path.display(), "report written");
        Ok(self.path)
    }
}

pub fn seconds(value: Seconds) -> String {
    format!("{value:.6}")
}

///`value / base`, 0 when there is nothing to compare to
pub fn normalized(value: f64, base: f64) -> String {
    if base == 0.0 {
        return seconds(0.0);
    }
    seconds(value / base)
}
