use pcm_am_sim::{
    util::types::{Bytes, InvalidationPolicy, QueryKind, Size},
    AdaptiveMerging, AmConfig, BTreeKind, Category, DbPam, DbStat, IndexConfig, Pcm, StressBatch,
};
use std::{path::PathBuf, rc::Rc};
use tracing::{debug, info};

use crate::benchmarker::{normalized, seconds, Benchmarker, Contender, TsvReport};

///Nodes used by the comparison scenarios, small enough for PCM lines to matter
const NODE_MAX_SIZE: Bytes = 512;
///Nodes used when isolating invalidation and split costs
const NODE_LARGE_SIZE: Bytes = 4000;

///Parameters shared by every scenario
#[derive(Debug, Clone)]
pub struct Workload {
    pub entries: Size,
    pub key_size: Bytes,
    pub entry_size: Bytes,
    pub out_dir: PathBuf,
    pub seed: u64,
    pub query: QueryKind,
    pub selectivity: f64,
    pub batches: usize,
}

impl Workload {
    ///Entries returned by one search at `selectivity`
    fn query_entries(&self, selectivity: f64) -> Size {
        ((self.entries as f64 * selectivity) as Size).max(1)
    }

    ///1% of the table
    fn small_sort_buffer(&self) -> Bytes {
        ((0.01 * self.entries as f64 * self.entry_size as f64) as Bytes).max(1)
    }

    fn am_config(&self) -> AmConfig {
        AmConfig::new()
            .set_num_entries(self.entries)
            .set_key_size(self.key_size)
            .set_entry_size(self.entry_size)
            .set_node_size(NODE_MAX_SIZE)
            .set_seed(self.seed)
    }

    ///Classic adaptive merging: sorted index, partitions rewritten
    fn am(&self) -> AmConfig {
        self.am_config()
            .set_invalidation(InvalidationPolicy::Overwrite)
            .set_kind(BTreeKind::NormalInnersInMemory)
    }

    ///Adaptive merging tuned for PCM without a journal
    fn eam(&self) -> AmConfig {
        self.am_config()
            .set_invalidation(InvalidationPolicy::Bitmap)
            .set_kind(BTreeKind::UnsortedLeavesInnersInMemory)
    }

    fn pam(&self, kind: BTreeKind) -> AmConfig {
        self.am_config().set_kind(kind)
    }

    fn save_config(&self, scenario: &str, name: &str, config: &AmConfig) -> pcm_am_sim::Result<()> {
        let name = name.replace(['+', ' '], "");
        config.write_to(self.out_dir.join(format!("{scenario}_{name}.config")))
    }
}

fn am_contender(
    w: &Workload,
    scenario: &str,
    name: &'static str,
    config: AmConfig,
) -> pcm_am_sim::Result<Contender> {
    w.save_config(scenario, name, &config)?;
    let pcm = Pcm::default_model().into_shared();
    let am = AdaptiveMerging::new(Rc::clone(&pcm), config)?;
    Ok(Contender::new(name, Box::new(am), pcm))
}

fn pam_contender(
    w: &Workload,
    scenario: &str,
    name: &'static str,
    config: AmConfig,
) -> pcm_am_sim::Result<Contender> {
    w.save_config(scenario, name, &config)?;
    let pcm = Pcm::default_model().into_shared();
    let pam = DbPam::new(Rc::clone(&pcm), config)?;
    Ok(Contender::new(name, Box::new(pam), pcm))
}

fn log_progress(queries: usize, bm: &Benchmarker) {
    debug!(queries, progress = %bm.progress(), "query done");
}

///Cost of each invalidation policy, with index costs switched off
pub fn invalidation(w: &Workload) -> pcm_am_sim::Result<()> {
    let policies = [
        ("Flag", InvalidationPolicy::Flag),
        ("Bitmap", InvalidationPolicy::Bitmap),
        ("Journal", InvalidationPolicy::Journal),
        ("Overwrite", InvalidationPolicy::Overwrite),
    ];
    let mut report = TsvReport::create(&w.out_dir, "invalidation", &["TYPE", "Time", "PCM Wear-out"])?;

    for (name, policy) in policies {
        let config = w
            .am_config()
            .set_sort_buffer_size(w.small_sort_buffer())
            .set_node_size(NODE_LARGE_SIZE)
            .set_invalidation(policy)
            .set_kind(BTreeKind::SkipCost);
        let mut bm = Benchmarker::new().add(am_contender(w, "invalidation", name, config)?);

        let queries = bm.run_until_merged(w.query, w.query_entries(w.selectivity), |q, _, bm| {
            log_progress(q, bm);
            Ok(())
        })?;
        bm.settle();

        let contender = &bm.contenders()[0];
        info!(policy = name, queries, "merged\n{}", contender.stats());
        report.row(&[
            name.to_string(),
            seconds(contender.total_of(Category::Invalidation)),
            contender.wearout().to_string(),
        ])?;
    }
    report.finish()?;
    Ok(())
}

///Cost of splits in each sorted tree variant, with invalidation switched off
pub fn btree(w: &Workload) -> pcm_am_sim::Result<()> {
    let kinds = [
        ("B+-tree", BTreeKind::Normal),
        ("CB+-tree", BTreeKind::CbTree),
        ("OCB+-tree", BTreeKind::OcbTree),
    ];
    let mut report = TsvReport::create(&w.out_dir, "btree", &["TYPE", "Time", "PCM Wear-out"])?;

    for (name, kind) in kinds {
        let config = w
            .am_config()
            .set_sort_buffer_size(w.small_sort_buffer())
            .set_node_size(NODE_LARGE_SIZE)
            .set_invalidation(InvalidationPolicy::Skip)
            .set_kind(kind);
        let mut bm = Benchmarker::new().add(am_contender(w, "btree", name, config)?);

        let queries = bm.run_until_merged(w.query, w.query_entries(w.selectivity), |q, _, bm| {
            log_progress(q, bm);
            Ok(())
        })?;
        bm.settle();

        let contender = &bm.contenders()[0];
        info!(tree = name, queries, "merged\n{}", contender.stats());
        report.row(&[
            name.to_string(),
            seconds(contender.total_of(Category::Index)),
            contender.wearout().to_string(),
        ])?;
    }
    report.finish()?;
    Ok(())
}

///Search time of a fully built index, the lower bound every merging engine converges to
fn index_reference(w: &Workload, entries: Size) -> pcm_am_sim::Result<f64> {
    let pcm = Pcm::default_model().into_shared();
    let mut index = IndexConfig::new()
        .set_key_size(w.key_size)
        .set_entry_size(w.entry_size)
        .set_node_size(NODE_MAX_SIZE)
        .build(pcm)?;

    let mut stats = DbStat::new();
    index.bulkload(w.entries, &mut stats);

    stats.reset();
    stats.start_query();
    index.range_search(entries, &mut stats);
    stats.finish_query();
    Ok(stats.current_time())
}

///Per query search time until every engine merged, then totals
fn per_query_and_totals(
    w: &Workload,
    scenario: &str,
    mut bm: Benchmarker,
    reference: Option<f64>,
) -> pcm_am_sim::Result<()> {
    let entries = w.query_entries(w.selectivity);
    bm.skip_init(w.query);

    let mut header = vec!["Query"];
    if reference.is_some() {
        header.push("Index");
    }
    header.extend(bm.names());
    let mut per_query = TsvReport::create(&w.out_dir, &format!("{scenario}_per_query"), &header)?;

    bm.run_until_merged(w.query, entries, |query, times, bm| {
        log_progress(query, bm);
        let mut row = vec![query.to_string()];
        row.extend(reference.map(seconds));
        row.extend(times.iter().copied().map(seconds));
        per_query.row(&row)
    })?;
    per_query.finish()?;
    let flushes = bm.settle();
    debug!(?flushes, "buffered work paid");

    let mut totals = TsvReport::create(
        &w.out_dir,
        &format!("{scenario}_total"),
        &["Type", "Time", "PCM Wear-out"],
    )?;
    for contender in bm.contenders() {
        info!(engine = contender.name, "totals\n{}", contender.stats());
        totals.row(&[
            contender.name.to_string(),
            seconds(contender.total_time()),
            contender.wearout().to_string(),
        ])?;
    }
    totals.finish()?;
    Ok(())
}

///Plain index against AM, eAM and PAM
pub fn compare(w: &Workload) -> pcm_am_sim::Result<()> {
    let reference = index_reference(w, w.query_entries(w.selectivity))?;
    let bm = Benchmarker::new()
        .add(pam_contender(w, "compare", "PAM", w.pam(BTreeKind::BufferedTree))?)
        .add(am_contender(w, "compare", "AM", w.am())?)
        .add(am_contender(w, "compare", "eAM", w.eam())?);
    per_query_and_totals(w, "compare", bm, Some(reference))
}

///PAM over each PCM friendly tree
pub fn pam_variants(w: &Workload) -> pcm_am_sim::Result<()> {
    let scenario = "pam_variants";
    let bm = Benchmarker::new()
        .add(am_contender(w, scenario, "eAM", w.eam())?)
        .add(pam_contender(
            w,
            scenario,
            "PAM UB+tree",
            w.pam(BTreeKind::UnsortedLeavesInnersInMemory),
        )?)
        .add(pam_contender(
            w,
            scenario,
            "PAM SB+tree",
            w.pam(BTreeKind::TwoSectionNodeInnersInMemory),
        )?)
        .add(pam_contender(
            w,
            scenario,
            "PAM BB+tree",
            w.pam(BTreeKind::BufferedTree),
        )?);
    per_query_and_totals(w, scenario, bm, None)
}

///Mixed batches of searches, inserts and deletes at growing selectivity
pub fn stress(w: &Workload, batch: &StressBatch) -> pcm_am_sim::Result<()> {
    let names = ["PAM", "eAM", "AM"];
    let header: Vec<&str> = std::iter::once("Selectivity").chain(names).collect();
    let mut time_total = TsvReport::create(&w.out_dir, "stress_time_total", &header)?;
    let mut time_norma = TsvReport::create(&w.out_dir, "stress_time_total_norma", &header)?;
    let mut wear_total = TsvReport::create(&w.out_dir, "stress_wearout_total", &header)?;
    let mut wear_norma = TsvReport::create(&w.out_dir, "stress_wearout_total_norma", &header)?;

    for selectivity in batch.selectivities() {
        let mut bm = Benchmarker::new()
            .add(pam_contender(w, "stress", "PAM", w.pam(BTreeKind::BufferedTree))?)
            .add(am_contender(w, "stress", "eAM", w.eam())?)
            .add(am_contender(w, "stress", "AM", w.am())?);
        bm.skip_init(QueryKind::Random);

        let entries = w.query_entries(selectivity);
        for b in 0..w.batches {
            let times = bm.run_batch(batch, entries);
            debug!(selectivity, batch = b + 1, ?times, "batch done");
        }
        bm.settle();

        let times: Vec<f64> = bm.contenders().iter().map(|c| c.total_time()).collect();
        let wearouts: Vec<f64> = bm.contenders().iter().map(|c| c.wearout() as f64).collect();
        info!(selectivity, ?times, ?wearouts, "selectivity done");

        let label = format!("{selectivity:.4}");
        let row = |values: &[f64], format: &dyn Fn(f64) -> String| -> Vec<String> {
            std::iter::once(label.clone())
                .chain(values.iter().map(|v| format(*v)))
                .collect()
        };
        time_total.row(&row(&times, &seconds))?;
        time_norma.row(&row(&times, &|v: f64| normalized(v, times[0])))?;
        wear_total.row(&row(&wearouts, &|v: f64| format!("{v:.0}")))?;
        wear_norma.row(&row(&wearouts, &|v: f64| normalized(v, wearouts[0])))?;
    }

    for report in [time_total, time_norma, wear_total, wear_norma] {
        report.finish()?;
    }
    Ok(())
}

///Inserts, point searches and deletes over the PCM friendly trees on their own
pub fn index(w: &Workload, batch: &StressBatch) -> pcm_am_sim::Result<()> {
    let kinds = [
        ("UB+-tree", BTreeKind::UnsortedLeavesInnersInMemory),
        ("SB+-tree", BTreeKind::TwoSectionNodeInnersInMemory),
        ("BB+-tree", BTreeKind::BufferedTree),
    ];
    let mut report = TsvReport::create(&w.out_dir, "index", &["TYPE", "Time", "PCM Wear-out"])?;

    for (name, kind) in kinds {
        let config = IndexConfig::new()
            .set_key_size(w.key_size)
            .set_entry_size(w.entry_size)
            .set_node_size(NODE_MAX_SIZE)
            .set_kind(kind);
        config.write_to(w.out_dir.join(format!("index_{}.config", name.replace('+', ""))))?;

        let pcm = Pcm::default_model().into_shared();
        let mut index = config.build(Rc::clone(&pcm))?;
        let mut stats = DbStat::new();

        //skip cost of init
        index.bulkload(w.entries, &mut stats);
        index.flush(&mut stats);
        pcm.borrow_mut().reset_wearout();
        stats.reset();

        stats.start_query();
        for b in 0..w.batches {
            for _ in 0..batch.inserts {
                index.insert(1, &mut stats);
            }
            for _ in 0..batch.psearches {
                index.point_search(1, &mut stats);
            }
            for _ in 0..batch.deletes {
                index.delete(1, &mut stats);
            }
            debug!(tree = name, batch = b + 1, "batch done");
        }
        index.flush(&mut stats);
        stats.finish_query();

        info!(tree = name, "totals\n{}", stats);
        report.row(&[
            name.to_string(),
            seconds(stats.total_time()),
            pcm.borrow().wearout().to_string(),
        ])?;
    }
    report.finish()?;
    Ok(())
}
