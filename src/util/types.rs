use serde::{Deserialize, Serialize};

pub type Size = usize; //for entry counts and capacities
pub type Bytes = usize;
pub type Seconds = f64; //simulated elapsed time, never wall clock

///How the entries requested by a query are distributed over the key space
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum QueryKind {
    Random,
    AlwaysNew,
    SequentialPattern,
}

///How entries moved out of a partition get marked as already merged
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InvalidationPolicy {
    Flag,
    Bitmap,
    Journal,
    Overwrite,
    Skip,
}
