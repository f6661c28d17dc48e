use clap::{Parser, Subcommand};
use pcm_am_sim::{util::types::QueryKind, StressBatch};
use std::{fs, path::PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::experiment::Workload;

mod benchmarker;
mod experiment;

///Cost experiments for adaptive merging on Phase Change Memory
#[derive(Parser, Debug)]
#[command(name = "experiments")]
#[command(version)]
struct Cli {
    ///Entries in the simulated table
    #[arg(long, default_value_t = 1_000_000, global = true)]
    entries: usize,

    #[arg(long, default_value_t = 4, global = true)]
    key_size: usize,

    #[arg(long, default_value_t = 140, global = true)]
    entry_size: usize,

    ///Directory for the reports and configuration snapshots
    #[arg(long, default_value = "results", global = true)]
    out_dir: PathBuf,

    ///Seed of the random split between index and partitions
    #[arg(long, default_value_t = 0, global = true)]
    seed: u64,

    #[arg(long, value_enum, default_value_t = QueryKind::Random, global = true)]
    query: QueryKind,

    ///Fraction of the table returned by one search
    #[arg(long, default_value_t = 0.001, global = true)]
    selectivity: f64,

    #[arg(long, default_value_t = 10, global = true)]
    batches: usize,

    ///Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    scenario: Scenario,
}

#[derive(Subcommand, Debug)]
enum Scenario {
    ///Invalidation policies with index costs switched off
    Invalidation,
    ///Sorted tree variants with invalidation switched off
    Btree,
    ///Index, AM, eAM and PAM query by query until merged
    Compare,
    ///PAM over unsorted leaf, two section and buffered trees
    PamVariants,
    ///Batches of searches, inserts and deletes over a range of selectivities
    Stress {
        #[arg(long, default_value_t = 10)]
        rsearches: usize,
        #[arg(long, default_value_t = 1000)]
        inserts: usize,
        #[arg(long, default_value_t = 1000)]
        deletes: usize,
        #[arg(long, default_value_t = 0.001)]
        selectivity_max: f64,
        #[arg(long, default_value_t = 0.001)]
        selectivity_step: f64,
    },
    ///Inserts, point searches and deletes on PCM friendly trees
    Index {
        #[arg(long, default_value_t = 1000)]
        inserts: usize,
        #[arg(long, default_value_t = 1000)]
        psearches: usize,
        #[arg(long, default_value_t = 1000)]
        deletes: usize,
    },
}

fn main() -> pcm_am_sim::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    fs::create_dir_all(&cli.out_dir)?;
    let workload = Workload {
        entries: cli.entries,
        key_size: cli.key_size,
        entry_size: cli.entry_size,
        out_dir: cli.out_dir.clone(),
        seed: cli.seed,
        query: cli.query,
        selectivity: cli.selectivity,
        batches: cli.batches,
    };
    info!(?workload, scenario = ?cli.scenario, "running experiment");

    match cli.scenario {
        Scenario::Invalidation => experiment::invalidation(&workload),
        Scenario::Btree => experiment::btree(&workload),
        Scenario::Compare => experiment::compare(&workload),
        Scenario::PamVariants => experiment::pam_variants(&workload),
        Scenario::Stress {
            rsearches,
            inserts,
            deletes,
            selectivity_max,
            selectivity_step,
        } => {
            let batch = StressBatch::new(rsearches, 0, inserts, deletes).set_selectivity(
                cli.selectivity,
                selectivity_max.max(cli.selectivity),
                selectivity_step,
            )?;
            experiment::stress(&workload, &batch)
        }
        Scenario::Index {
            inserts,
            psearches,
            deletes,
        } => {
            let batch = StressBatch::new(0, psearches, inserts, deletes);
            experiment::index(&workload, &batch)
        }
    }
}
