//! Property-based tests using proptest
//!
//! Invariants of the cost model that must hold for every tree shape, variant
//! and workload in the domain.

use pcm_am_sim::{
    index::shape::Geometry,
    util::types::{InvalidationPolicy, QueryKind},
    AdaptiveMerging, AmConfig, BTreeKind, DbIndex, DbStat, Pcm,
};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn kind_strategy() -> impl Strategy<Value = BTreeKind> {
    prop::sample::select(BTreeKind::ALL.to_vec())
}

fn policy_strategy() -> impl Strategy<Value = InvalidationPolicy> {
    prop::sample::select(vec![
        InvalidationPolicy::Flag,
        InvalidationPolicy::Bitmap,
        InvalidationPolicy::Journal,
        InvalidationPolicy::Overwrite,
        InvalidationPolicy::Skip,
    ])
}

fn query_strategy() -> impl Strategy<Value = QueryKind> {
    prop::sample::select(vec![
        QueryKind::Random,
        QueryKind::AlwaysNew,
        QueryKind::SequentialPattern,
    ])
}

// Node sizes big enough for a fanout of at least 2 with the largest keys
fn geometry_strategy() -> impl Strategy<Value = Geometry> {
    (1usize..64, 1usize..512, 256usize..8192, 0.5f64..=1.0)
        .prop_map(|(key, entry, node, factor)| Geometry::new(key, entry, node, factor).unwrap())
}

fn index(kind: BTreeKind) -> DbIndex {
    DbIndex::new(Pcm::default_model().into_shared(), 4, 140, 512, 0.8, kind).unwrap()
}

// ============================================================================
// Tree shape
// ============================================================================

proptest! {
    // Property: more entries never make a tree shorter
    #[test]
    fn test_height_monotonic(
        geometry in geometry_strategy(),
        n in 0usize..5_000_000,
        extra in 0usize..1_000_000
    ) {
        prop_assert!(geometry.height_for(n) <= geometry.height_for(n + extra));
        prop_assert!(geometry.leaves_for(n) <= geometry.leaves_for(n + extra));
    }

    // Property: a tree of height h has room for all its leaves, and h - 1 levels don't
    #[test]
    fn test_height_fits_leaves(geometry in geometry_strategy(), n in 1usize..5_000_000) {
        let height = geometry.height_for(n) as u32;
        let fanout = geometry.keys_per_node();
        let leaves = geometry.leaves_for(n);
        prop_assert!(height >= 1);
        prop_assert!(fanout.saturating_pow(height - 1) >= leaves);
        if height > 1 {
            prop_assert!(fanout.pow(height - 2) < leaves);
        }
    }
}

// ============================================================================
// Index operations
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Property: inserting then deleting leaves the count (and height) where it was
    #[test]
    fn test_count_invariant(
        kind in kind_strategy(),
        bulk in 0usize..20_000,
        inserted in 0usize..2_000,
        deleted in 0usize..30_000
    ) {
        let mut stats = DbStat::new();
        let mut index = index(kind);
        index.bulkload(bulk, &mut stats);
        index.insert(inserted, &mut stats);
        index.delete(deleted, &mut stats);

        let expected = (bulk + inserted).saturating_sub(deleted);
        prop_assert_eq!(index.num_entries(), expected);
        prop_assert_eq!(index.height(), index.geometry().height_for(expected));
    }

    // Property: update costs exactly a delete plus an insert, for every variant
    #[test]
    fn test_update_additive(
        kind in kind_strategy(),
        bulk in 0usize..20_000,
        updated in 0usize..2_000
    ) {
        let mut stats = DbStat::new();
        let mut by_update = index(kind);
        let mut by_parts = index(kind);
        by_update.bulkload(bulk, &mut stats);
        by_parts.bulkload(bulk, &mut stats);

        let update = by_update.update(updated, &mut stats);
        let delete = by_parts.delete(updated, &mut stats);
        let insert = by_parts.insert(updated, &mut stats);
        prop_assert_eq!(update, delete + insert);
        prop_assert_eq!(by_update.num_entries(), by_parts.num_entries());
    }

    // Property: operation times are finite and never negative
    #[test]
    fn test_times_non_negative(kind in kind_strategy(), n in 0usize..5_000) {
        let mut stats = DbStat::new();
        let mut index = index(kind);
        let times = [
            index.bulkload(n, &mut stats),
            index.insert(n / 2, &mut stats),
            index.point_search(n / 4, &mut stats),
            index.range_search(n, &mut stats),
            index.delete(n / 3, &mut stats),
            index.flush(&mut stats),
        ];
        for time in times {
            prop_assert!(time.is_finite() && time >= 0.0);
        }
    }
}

// ============================================================================
// Device
// ============================================================================

proptest! {
    // Property: a write adds exactly its bytes to wear-out, a read adds nothing
    #[test]
    fn test_wearout_laws(
        mem_line in 1usize..4096,
        writes in prop::collection::vec(0usize..100_000, 0..32),
        read in 0usize..1_000_000
    ) {
        let mut pcm = Pcm::new(mem_line, 1e-9, 1e-6).unwrap();
        let mut expected = 0;
        for bytes in writes {
            pcm.write(bytes);
            expected += bytes;
            prop_assert_eq!(pcm.wearout(), expected);
        }
        pcm.read(read);
        prop_assert_eq!(pcm.wearout(), expected);
    }

    // Property: cost is charged per started line
    #[test]
    fn test_line_granularity(mem_line in 1usize..4096, bytes in 1usize..1_000_000) {
        let pcm = Pcm::new(mem_line, 1.0, 1.0).unwrap();
        let lines = pcm.read(bytes);
        prop_assert_eq!(lines, ((bytes + mem_line - 1) / mem_line) as f64);
    }
}

// ============================================================================
// Adaptive merging
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // Property: every entry is either indexed or partitioned, after every search
    #[test]
    fn test_am_entry_invariant(
        policy in policy_strategy(),
        kind in kind_strategy(),
        query in query_strategy(),
        searches in prop::collection::vec(1usize..3_000, 1..20),
        seed in any::<u64>()
    ) {
        let config = AmConfig::new()
            .set_num_entries(20_000)
            .set_sort_buffer_size(140 * 200)
            .set_invalidation(policy)
            .set_kind(kind)
            .set_seed(seed);
        let mut am = AdaptiveMerging::new(Pcm::default_model().into_shared(), config).unwrap();
        let mut stats = DbStat::new();

        am.search(query, searches[0], &mut stats);
        let after_init = am.partition_entries();
        for entries in searches {
            am.search(query, entries, &mut stats);
            prop_assert_eq!(
                am.index().num_entries() + am.partition_entries(),
                am.num_entries()
            );
            prop_assert!(am.partition_entries() <= after_init);
        }
    }
}
