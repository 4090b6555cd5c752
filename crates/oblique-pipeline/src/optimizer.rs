//! TBDR batch optimization: merge, split, reorder.
//!
//! Raw batches out of the builder are correct but plentiful. This stage
//! folds compatible batches together, splits batches whose tile coverage is
//! too wide for TBDR tile memory, and orders the final list so consecutive
//! draw calls touch nearby GPU tiles.
//!
//! The three passes run in a loop until none of them changes anything.
//! Splits can expose new folds (the shrunken bounds unblock merges that a
//! wide batch was vetoing) and merges never create over-wide coverage, so
//! the loop terminates: merges strictly reduce the batch count and every
//! split half is sealed against re-merging. A second call on the output
//! finds all passes at their fixpoint, which is what makes the optimizer
//! idempotent.

use oblique_core::alloc::AHashMap;

use crate::batch::Batch;
use crate::config::PipelineConfig;
use crate::tile_mask::ScreenTileMask;

/// Pluggable predicate deciding whether two batches are close enough on
/// screen to share a draw call.
pub trait TileCompatibility {
    fn compatible(&self, a: &ScreenTileMask, b: &ScreenTileMask) -> bool;
}

/// Default predicate: masks overlap or touch (one bucket of dilation).
pub struct OverlapOrAdjacent;

impl TileCompatibility for OverlapOrAdjacent {
    #[inline]
    fn compatible(&self, a: &ScreenTileMask, b: &ScreenTileMask) -> bool {
        a.overlaps(b) || a.expanded().overlaps(b)
    }
}

/// Strict predicate: masks must share a bucket. Useful when tile memory
/// pressure matters more than draw-call count.
pub struct OverlapOnly;

impl TileCompatibility for OverlapOnly {
    #[inline]
    fn compatible(&self, a: &ScreenTileMask, b: &ScreenTileMask) -> bool {
        a.overlaps(b)
    }
}

/// Counters reported by the optimizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizerOutcome {
    /// Batches folded into another batch.
    pub merges: u32,
    /// Batches halved for coverage.
    pub splits: u32,
    /// True when the final count still exceeds the draw-call ceiling.
    /// Objects are never dropped for this; the caller decides what to do.
    pub ceiling_exceeded: bool,
}

/// Candidate folds look back at most this many earlier batches of the same
/// state key; spatially mergeable batches are created close together in
/// paint order, so a bounded window loses almost nothing and keeps the
/// sweep linear.
const MERGE_LOOKBACK: usize = 32;

/// Folds across more than this many intervening batches are not attempted
/// (the paint-safety scan over the span would dominate otherwise).
const MERGE_SPAN: usize = 256;

/// Optimize the batch list in place.
pub fn optimize(
    batches: &mut Vec<Batch>,
    config: &PipelineConfig,
    compat: &dyn TileCompatibility,
) -> OptimizerOutcome {
    let mut outcome = OptimizerOutcome::default();

    loop {
        let merges = merge_pass(batches, config, compat);
        let splits = split_pass(batches, config);
        reorder(batches);

        outcome.merges += merges;
        outcome.splits += splits;
        if merges == 0 && splits == 0 {
            break;
        }
    }

    outcome.ceiling_exceeded = batches.len() > config.draw_call_ceiling;
    outcome
}

/// Fold compatible batches until no fold applies, then compact the holes
/// by swapping the tail batch in. The reorder pass afterwards restores
/// paint-safe ordering.
fn merge_pass(
    batches: &mut Vec<Batch>,
    config: &PipelineConfig,
    compat: &dyn TileCompatibility,
) -> u32 {
    let mut merges = 0;
    loop {
        let folded = merge_sweep(batches, config, compat);
        if folded == 0 {
            break;
        }
        merges += folded;
    }

    let mut i = 0;
    while i < batches.len() {
        if batches[i].is_empty() {
            batches.swap_remove(i);
        } else {
            i += 1;
        }
    }

    merges
}

/// One sort-and-sweep pass: group by state key, try to fold each batch
/// into a nearby earlier batch of the same key.
fn merge_sweep(
    batches: &mut [Batch],
    config: &PipelineConfig,
    compat: &dyn TileCompatibility,
) -> u32 {
    let mut groups: AHashMap<_, Vec<usize>> = AHashMap::new();
    for (i, b) in batches.iter().enumerate() {
        if b.is_empty() || b.sealed {
            continue;
        }
        groups.entry(b.key()).or_default().push(i);
    }

    let mut folded = 0;
    for positions in groups.values() {
        for w in 1..positions.len() {
            let j = positions[w];
            if batches[j].is_empty() {
                continue;
            }
            for v in (w.saturating_sub(MERGE_LOOKBACK)..w).rev() {
                let i = positions[v];
                if batches[i].is_empty() {
                    continue;
                }
                if !can_fold(batches, i, j, config, compat) {
                    continue;
                }
                fold(batches, i, j);
                folded += 1;
                break;
            }
        }
    }
    folded
}

/// Whether batch `j` may be folded into the earlier batch `i`.
fn can_fold(
    batches: &[Batch],
    i: usize,
    j: usize,
    config: &PipelineConfig,
    compat: &dyn TileCompatibility,
) -> bool {
    let (a, b) = (&batches[i], &batches[j]);

    if a.member_count() + b.member_count() > config.max_batch_size {
        return false;
    }
    if !compat.compatible(&a.mask, &b.mask) {
        return false;
    }
    if a.mask.union(&b.mask).coverage() > config.max_coverage_buckets {
        return false;
    }
    if j - i > MERGE_SPAN {
        return false;
    }

    // Folding moves j's members to i's position in the draw sequence. Any
    // batch currently drawn between them whose pixels intersect j's would
    // then composite over pixels it used to composite under.
    !batches[i + 1..j]
        .iter()
        .any(|k| k.intersects_rect(b.bounds_min, b.bounds_max))
}

/// Move all members of batch `j` into batch `i`, leaving `j` empty.
fn fold(batches: &mut [Batch], i: usize, j: usize) {
    debug_assert!(i < j);
    let (head, tail) = batches.split_at_mut(j);
    let dst = &mut head[i];
    let src = &mut tail[0];

    dst.members.append(&mut src.members);
    dst.mask = dst.mask.union(&src.mask);
    dst.bounds_min = dst.bounds_min.min(src.bounds_min);
    dst.bounds_max = dst.bounds_max.max(src.bounds_max);
    dst.instances += src.instances;

    src.recompute_totals();
}

/// Halve batches whose tile coverage exceeds the configured cap, while
/// there is headroom under the draw-call ceiling.
///
/// The half split keeps paint order (the child holds the back half of the
/// member list and is inserted immediately after its parent). Both halves
/// are sealed so the merge pass cannot glue them back together.
fn split_pass(batches: &mut Vec<Batch>, config: &PipelineConfig) -> u32 {
    let mut splits = 0;

    while batches.len() < config.draw_call_ceiling {
        let candidate = batches
            .iter()
            .enumerate()
            .filter(|(_, b)| {
                b.member_count() >= 2 && b.mask.coverage() > config.max_coverage_buckets
            })
            .max_by_key(|(_, b)| b.mask.coverage())
            .map(|(i, _)| i);

        let Some(pos) = candidate else {
            break;
        };

        let child = halve(&mut batches[pos]);
        batches.insert(pos + 1, child);
        splits += 1;
    }

    splits
}

fn halve(parent: &mut Batch) -> Batch {
    let mid = parent.member_count() / 2;
    let mut child = Batch::new(parent.texture, parent.blend, parent.order);
    child.members = parent.members.split_off(mid);
    child.sealed = true;
    child.recompute_totals();

    parent.sealed = true;
    parent.recompute_totals();

    child
}

/// Order batches for tile locality without breaking compositing.
///
/// Bubble passes over adjacent pairs: two batches that intersect on screen
/// must keep their creation order (that IS paint order); two disjoint
/// batches are free to trade places and do so by ascending lowest-bucket
/// key. Runs to a fixpoint, which also repairs the arbitrary order left by
/// swap-compaction in the merge pass.
fn reorder(batches: &mut [Batch]) {
    let n = batches.len();
    if n < 2 {
        return;
    }

    for _ in 0..n {
        let mut swapped = false;
        for i in 1..n {
            let a = &batches[i - 1];
            let b = &batches[i];
            let out_of_order = if a.intersects(b) {
                a.order > b.order
            } else {
                (a.mask.lowest_bucket(), a.order) > (b.mask.lowest_bucket(), b.order)
            };
            if out_of_order {
                batches.swap(i - 1, i);
                swapped = true;
            }
        }
        if !swapped {
            break;
        }
    }
}
