//! Cost simulator for database access methods on Phase Change Memory.
//!
//! Nothing is stored: every engine keeps only entry counts, and every
//! operation turns the reads and writes it would do into simulated time and
//! memory wear-out on a [`pcm::Pcm`] device.

pub mod am;
pub mod config;
pub mod error;
pub mod index;
pub mod pam;
pub mod pcm;
pub mod stats;
pub mod util;

pub use am::{AdaptiveMerging, AmState};
pub use config::{AmConfig, IndexConfig, StressBatch};
pub use error::{Result, SimError};
pub use index::{BTreeKind, DbIndex};
pub use pam::DbPam;
pub use pcm::{Pcm, SharedPcm};
pub use stats::{Category, DbStat, Snapshot};
