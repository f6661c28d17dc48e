use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fs, path::Path};

use crate::{
    error::{ensure_positive, Result, SimError},
    index::{BTreeKind, DbIndex},
    pcm::SharedPcm,
    util::types::{Bytes, InvalidationPolicy, Size},
};

///Share of a node usable after bookkeeping when the caller does not choose one
pub const DEFAULT_NODE_FACTOR: f64 = 0.8;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct IndexConfig {
    key_size: Bytes,
    entry_size: Bytes,
    node_size: Bytes,
    node_factor: f64,
    kind: BTreeKind,
}

impl IndexConfig {
    pub fn new() -> Self {
        Self {
            key_size: 4,
            entry_size: 140,
            node_size: 512,
            node_factor: DEFAULT_NODE_FACTOR,
            kind: BTreeKind::Normal,
        }
    }

    //GETTERS AND SETTERS (start)
    pub fn key_size(&self) -> Bytes {
        self.key_size
    }
    pub fn set_key_size(mut self, key_size: Bytes) -> Self {
        self.key_size = key_size;
        self
    }
    pub fn entry_size(&self) -> Bytes {
        self.entry_size
    }
    pub fn set_entry_size(mut self, entry_size: Bytes) -> Self {
        self.entry_size = entry_size;
        self
    }
    pub fn node_size(&self) -> Bytes {
        self.node_size
    }
    pub fn set_node_size(mut self, node_size: Bytes) -> Self {
        self.node_size = node_size;
        self
    }
    pub fn node_factor(&self) -> f64 {
        self.node_factor
    }
    pub fn set_node_factor(mut self, node_factor: f64) -> Self {
        self.node_factor = node_factor;
        self
    }
    pub fn kind(&self) -> BTreeKind {
        self.kind
    }
    pub fn set_kind(mut self, kind: BTreeKind) -> Self {
        self.kind = kind;
        self
    }
    //GETTERS AND SETTERS (end)

    pub fn build(&self, pcm: SharedPcm) -> Result<DbIndex> {
        DbIndex::new(
            pcm,
            self.key_size,
            self.entry_size,
            self.node_size,
            self.node_factor,
            self.kind,
        )
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        write_bincode(path.as_ref(), self)
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        read_bincode(path.as_ref())
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::new()
    }
}

///Adaptive merging setup. The index it builds uses `node_size` and the default node factor
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmConfig {
    num_entries: Size, //entries in the table at creation
    key_size: Bytes,
    entry_size: Bytes,
    sort_buffer_size: Bytes, //DRAM available to sort one partition
    node_size: Bytes,
    invalidation: InvalidationPolicy,
    kind: BTreeKind,
    seed: u64, //for the random split of queries between index and partitions
}

impl AmConfig {
    pub const DEFAULT_SORT_BUFFER_SIZE: Bytes = 512 * 1000;

    pub fn new() -> Self {
        Self {
            num_entries: 1_000_000,
            key_size: 4,
            entry_size: 140,
            sort_buffer_size: Self::DEFAULT_SORT_BUFFER_SIZE,
            node_size: 512,
            invalidation: InvalidationPolicy::Bitmap,
            kind: BTreeKind::Normal,
            seed: 0,
        }
    }

    //GETTERS AND SETTERS (start)
    pub fn num_entries(&self) -> Size {
        self.num_entries
    }
    pub fn set_num_entries(mut self, num_entries: Size) -> Self {
        self.num_entries = num_entries;
        self
    }
    pub fn key_size(&self) -> Bytes {
        self.key_size
    }
    pub fn set_key_size(mut self, key_size: Bytes) -> Self {
        self.key_size = key_size;
        self
    }
    pub fn entry_size(&self) -> Bytes {
        self.entry_size
    }
    pub fn set_entry_size(mut self, entry_size: Bytes) -> Self {
        self.entry_size = entry_size;
        self
    }
    pub fn sort_buffer_size(&self) -> Bytes {
        self.sort_buffer_size
    }
    pub fn set_sort_buffer_size(mut self, sort_buffer_size: Bytes) -> Self {
        self.sort_buffer_size = sort_buffer_size;
        self
    }
    pub fn node_size(&self) -> Bytes {
        self.node_size
    }
    pub fn set_node_size(mut self, node_size: Bytes) -> Self {
        self.node_size = node_size;
        self
    }
    pub fn invalidation(&self) -> InvalidationPolicy {
        self.invalidation
    }
    pub fn set_invalidation(mut self, invalidation: InvalidationPolicy) -> Self {
        self.invalidation = invalidation;
        self
    }
    pub fn kind(&self) -> BTreeKind {
        self.kind
    }
    pub fn set_kind(mut self, kind: BTreeKind) -> Self {
        self.kind = kind;
        self
    }
    pub fn seed(&self) -> u64 {
        self.seed
    }
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
    //GETTERS AND SETTERS (end)

    ///Configuration of the index(es) the engine owns
    pub fn index_config(&self) -> IndexConfig {
        IndexConfig::new()
            .set_key_size(self.key_size)
            .set_entry_size(self.entry_size)
            .set_node_size(self.node_size)
            .set_kind(self.kind)
    }

    ///Sizes the engine itself needs, the index validates the rest
    pub fn validate(&self) -> Result<()> {
        ensure_positive("entry_size", self.entry_size)?;
        ensure_positive("sort_buffer_size", self.sort_buffer_size)?;
        ensure_positive("key_size", self.key_size)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        write_bincode(path.as_ref(), self)
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        read_bincode(path.as_ref())
    }
}

impl Default for AmConfig {
    fn default() -> Self {
        Self::new()
    }
}

///One batch of a stress workload: random searches, point searches, single entry inserts and
/// deletes. Selectivities are fractions of the table returned by one search
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct StressBatch {
    pub rsearches: Size,
    pub psearches: Size,
    pub inserts: Size,
    pub deletes: Size,
    pub selectivity_min: f64,
    pub selectivity_max: f64,
    pub selectivity_step: f64,
}

impl StressBatch {
    pub fn new(rsearches: Size, psearches: Size, inserts: Size, deletes: Size) -> Self {
        Self {
            rsearches,
            psearches,
            inserts,
            deletes,
            selectivity_min: 0.001,
            selectivity_max: 0.001,
            selectivity_step: 0.001,
        }
    }

    pub fn set_selectivity(mut self, min: f64, max: f64, step: f64) -> Result<Self> {
        let valid = |s: f64| s.is_finite() && s > 0.0 && s <= 1.0;
        if !(valid(min) && valid(max) && min <= max) {
            return Err(SimError::invalid(
                "selectivity",
                format!("[{min}, {max}] is not a range inside (0, 1]"),
            ));
        }
        if !(step.is_finite() && step > 0.0) {
            return Err(SimError::invalid("selectivity_step", format!("{step} must be positive")));
        }
        self.selectivity_min = min;
        self.selectivity_max = max;
        self.selectivity_step = step;
        Ok(self)
    }

    ///Every selectivity from min to max (inclusive, with a small tolerance for float steps)
    pub fn selectivities(&self) -> Vec<f64> {
        let mut selectivities = Vec::new();
        let mut step = 0;
        loop {
            let selectivity = self.selectivity_min + step as f64 * self.selectivity_step;
            if selectivity > self.selectivity_max + self.selectivity_step / 100.0 {
                break;
            }
            selectivities.push(selectivity);
            step += 1;
        }
        selectivities
    }
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut file = fs::File::create(path)?;
    bincode::serialize_into(&mut file, value)?;
    Ok(())
}

fn read_bincode<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = fs::File::open(path)?;
    Ok(bincode::deserialize_from(file)?)
}

#[cfg(test)]
mod tests {
    use crate::pcm::Pcm;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = AmConfig::new();
        assert_eq!(config.num_entries(), 1_000_000);
        assert_eq!(config.sort_buffer_size(), 512_000);
        assert_eq!(config.invalidation(), InvalidationPolicy::Bitmap);
        assert_eq!(config.kind(), BTreeKind::Normal);

        let index = config.index_config();
        assert_eq!(index.node_size(), 512);
        assert_eq!(index.node_factor(), DEFAULT_NODE_FACTOR);
    }

    #[test]
    fn test_build_index() {
        let pcm = Pcm::default_model().into_shared();
        let index = IndexConfig::new()
            .set_node_size(4000)
            .set_kind(BTreeKind::CbTree)
            .build(pcm)
            .unwrap();
        assert_eq!(index.kind(), BTreeKind::CbTree);
        assert_eq!(index.geometry().node_size, 4000);

        let pcm = Pcm::default_model().into_shared();
        assert!(IndexConfig::new().set_node_factor(2.0).build(pcm).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(AmConfig::new().validate().is_ok());
        assert!(AmConfig::new().set_sort_buffer_size(0).validate().is_err());
        assert!(AmConfig::new().set_entry_size(0).validate().is_err());
    }

    #[test]
    fn test_persist_config() {
        let dir = std::env::temp_dir().join(format!("pcm_am_sim_config_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let am = AmConfig::new()
            .set_invalidation(InvalidationPolicy::Journal)
            .set_kind(BTreeKind::BufferedTree)
            .set_seed(42);
        am.write_to(dir.join("am.config")).unwrap();
        assert_eq!(AmConfig::read_from(dir.join("am.config")).unwrap(), am);

        let index = IndexConfig::new().set_node_factor(0.5);
        index.write_to(dir.join("index.config")).unwrap();
        assert_eq!(IndexConfig::read_from(dir.join("index.config")).unwrap(), index);

        assert!(matches!(
            AmConfig::read_from(dir.join("missing.config")),
            Err(SimError::Io(_))
        ));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_selectivities() {
        let batch = StressBatch::new(10, 0, 5, 5)
            .set_selectivity(0.001, 0.005, 0.001)
            .unwrap();
        assert_eq!(batch.selectivities().len(), 5);
        assert_eq!(StressBatch::new(1, 0, 0, 0).selectivities(), vec![0.001]);

        assert!(StressBatch::new(1, 0, 0, 0).set_selectivity(0.5, 0.1, 0.1).is_err());
        assert!(StressBatch::new(1, 0, 0, 0).set_selectivity(0.1, 0.5, 0.0).is_err());
    }
}
