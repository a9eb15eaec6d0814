//! Ordered, non-overlapping partition of a 1-D index space.

use smallvec::SmallVec;

use std::fmt::Debug;
use std::ops::Range;

use hzt::strict_assert;

use super::{AccessState, BufferRangeQuery, DoubleState};

/// One cell of the partition. Covers `[start, next cell's start)`, or up
/// to the track extent for the last cell.
#[derive(Clone, Debug, PartialEq)]
struct RangeEntry<I> {
    start: I,
    state: DoubleState,
}

/// Tracks a [`DoubleState`] per sub-range of the index space
/// `[0, extent)`.
///
/// The entries always cover the whole space: entry 0 sits at index 0 and
/// the last entry implicitly extends to `extent`. Assignments split cells
/// at the range boundaries first, so a cell is never partially covered
/// when its state is touched. Most resources are only ever accessed
/// whole, so the backing vector keeps its single initial cell inline.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeTrack<I> {
    extent: I,
    entries: SmallVec<[RangeEntry<I>; 1]>,
}

impl<I: Copy + Ord + Default + Debug> RangeTrack<I> {
    /// A track over `[0, extent)`, uniformly in `initial` state.
    pub fn new(extent: I, initial: DoubleState) -> Self {
        strict_assert!(extent > I::default(), "zero-extent track");
        Self {
            extent,
            entries: smallvec::smallvec![RangeEntry {
                start: I::default(),
                state: initial,
            }],
        }
    }

    /// Upper bound of the tracked index space.
    pub fn extent(&self) -> I {
        self.extent
    }

    fn cell_end(&self, index: usize) -> I {
        match self.entries.get(index + 1) {
            Some(next) => next.start,
            None => self.extent,
        }
    }

    fn check_range(&self, range: &Range<I>) {
        strict_assert!(range.start < range.end, "empty or inverted range");
        strict_assert!(range.end <= self.extent, "range past the track extent");
    }

    /// Splits the cell containing `pos` so that a cell boundary exists at
    /// `pos`. No-op when `pos` already is a boundary.
    fn split_at(&mut self, pos: I) {
        if pos >= self.extent {
            return;
        }
        let index = self
            .entries
            .partition_point(|entry| entry.start <= pos)
            .wrapping_sub(1);
        // partition_point is at least 1: entry 0 starts at 0.
        let entry = &self.entries[index];
        if entry.start == pos {
            return;
        }
        let state = entry.state;
        self.entries.insert(index + 1, RangeEntry { start: pos, state });
    }

    /// Folds `next` into every cell overlapping `range`.
    ///
    /// Boundaries are split first so that only fully covered cells are
    /// touched: a read-only `next` ORs into the cells' read unions, any
    /// other access replaces the write state and clears the union.
    pub fn assign(&mut self, range: Range<I>, next: AccessState) {
        self.check_range(&range);
        self.split_at(range.start);
        self.split_at(range.end);
        for entry in &mut self.entries {
            if entry.start >= range.end {
                break;
            }
            if entry.start >= range.start {
                entry.state.apply(next);
            }
        }
        self.assert_sane();
    }

    /// Conservative summary of every cell overlapping `range`: the OR and
    /// AND folds of their states (see [`BufferRangeQuery`]).
    pub fn query(&self, range: Range<I>) -> BufferRangeQuery {
        self.check_range(&range);
        let mut result: Option<BufferRangeQuery> = None;
        for (_, state) in self.overlapping(range) {
            result = Some(match result {
                None => BufferRangeQuery {
                    any: *state,
                    all: *state,
                },
                Some(acc) => BufferRangeQuery {
                    any: DoubleState {
                        write: acc.any.write.union(state.write),
                        read_union: acc.any.read_union.union(state.read_union),
                    },
                    all: DoubleState {
                        write: acc.all.write.intersect(state.write),
                        read_union: acc.all.read_union.intersect(state.read_union),
                    },
                },
            });
        }
        // The partition covers the whole space, so a valid range always
        // overlaps at least one cell.
        result.unwrap()
    }

    /// Iterates the cells overlapping `range`, clipped to it.
    pub(crate) fn overlapping(
        &self,
        range: Range<I>,
    ) -> impl Iterator<Item = (Range<I>, &DoubleState)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(move |(index, entry)| {
                let end = self.cell_end(index);
                if entry.start >= range.end || end <= range.start {
                    None
                } else {
                    Some((entry.start.max(range.start)..end.min(range.end), &entry.state))
                }
            })
    }

    /// Merges neighboring cells with identical state. Purely an
    /// efficiency pass; queries are unaffected.
    pub fn coalesce(&mut self) {
        let mut read = 1;
        let mut write = 0;
        while read < self.entries.len() {
            if self.entries[read].state != self.entries[write].state {
                write += 1;
                if write != read {
                    self.entries[write] = self.entries[read].clone();
                }
            }
            read += 1;
        }
        self.entries.truncate(write + 1);
        self.assert_sane();
    }

    fn assert_sane(&self) {
        strict_assert!(!self.entries.is_empty());
        strict_assert!(self.entries[0].start == I::default());
        for pair in self.entries.windows(2) {
            strict_assert!(pair[0].start < pair[1].start, "entries out of order");
        }
        strict_assert!(self.entries.last().unwrap().start < self.extent);
    }

    #[cfg(test)]
    fn cells(&self) -> Vec<(Range<I>, DoubleState)> {
        (0..self.entries.len())
            .map(|i| (self.entries[i].start..self.cell_end(i), self.entries[i].state))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hzt::{AccessFlags, ImageLayout, StageFlags};

    fn read(access: AccessFlags) -> AccessState {
        AccessState {
            access,
            stage: StageFlags::FRAGMENT_SHADER,
            layout: ImageLayout::Undefined,
        }
    }

    fn write(access: AccessFlags) -> AccessState {
        AccessState {
            access,
            stage: StageFlags::TRANSFER,
            layout: ImageLayout::Undefined,
        }
    }

    fn track100() -> RangeTrack<u64> {
        RangeTrack::new(100, DoubleState::initial(ImageLayout::Undefined))
    }

    #[test]
    fn starts_as_one_cell() {
        let track = track100();
        assert_eq!(track.cells().len(), 1);
        assert_eq!(track.cells()[0].0, 0..100);
    }

    #[test]
    fn interior_assign_splits_into_three() {
        let mut track = track100();
        let a = write(AccessFlags::TRANSFER_WRITE);
        let b = write(AccessFlags::SHADER_STORAGE_WRITE);
        track.assign(0..100, a);
        track.assign(30..60, b);

        let cells = track.cells();
        assert_eq!(
            cells.iter().map(|(r, _)| r.clone()).collect::<Vec<_>>(),
            vec![0..30, 30..60, 60..100]
        );
        assert_eq!(track.query(0..30).any.write, a);
        assert_eq!(track.query(30..60).any.write, b);
        // The tail keeps the original state, not the new one.
        assert_eq!(track.query(60..100).any.write, a);
    }

    #[test]
    fn assign_aligned_to_existing_boundaries_does_not_split() {
        let mut track = track100();
        track.assign(30..60, write(AccessFlags::TRANSFER_WRITE));
        assert_eq!(track.cells().len(), 3);
        track.assign(30..60, write(AccessFlags::SHADER_STORAGE_WRITE));
        assert_eq!(track.cells().len(), 3);
        track.assign(0..100, write(AccessFlags::TRANSFER_WRITE));
        assert_eq!(track.query(0..100).all.write.access, AccessFlags::TRANSFER_WRITE);
    }

    #[test]
    fn reads_accumulate_without_touching_the_write() {
        let mut track = track100();
        let w = write(AccessFlags::TRANSFER_WRITE);
        track.assign(0..50, w);
        track.assign(0..50, read(AccessFlags::SHADER_SAMPLED_READ));
        track.assign(0..50, read(AccessFlags::UNIFORM_READ));

        let q = track.query(0..50);
        assert_eq!(q.any.write, w);
        assert_eq!(
            q.any.read_union.access,
            AccessFlags::SHADER_SAMPLED_READ | AccessFlags::UNIFORM_READ
        );
        // Single homogeneous cell: both folds agree.
        assert_eq!(q.any, q.all);
    }

    #[test]
    fn repeated_read_assign_needs_no_further_barrier() {
        let mut track = track100();
        let s = read(AccessFlags::SHADER_SAMPLED_READ);
        track.assign(10..90, s);
        track.assign(10..90, s);
        let q = track.query(10..90);
        assert!(q.all.read_union.covers(&s));
        assert!(!crate::track::needs_barrier(&q.all.read_union, &s, false));
    }

    #[test]
    fn write_clears_the_read_union() {
        let mut track = track100();
        track.assign(0..100, read(AccessFlags::SHADER_SAMPLED_READ));
        track.assign(0..100, write(AccessFlags::TRANSFER_WRITE));
        assert_eq!(track.query(0..100).any.read_union.access, AccessFlags::empty());
    }

    #[test]
    fn query_folds_disagreeing_cells_both_ways() {
        let mut track = track100();
        track.assign(0..50, read(AccessFlags::SHADER_SAMPLED_READ));
        track.assign(50..100, read(AccessFlags::UNIFORM_READ));

        let q = track.query(0..100);
        assert_eq!(
            q.any.read_union.access,
            AccessFlags::SHADER_SAMPLED_READ | AccessFlags::UNIFORM_READ
        );
        // No read is visible on *every* cell.
        assert_eq!(q.all.read_union.access, AccessFlags::empty());
    }

    #[test]
    fn coalesce_restores_one_cell_and_preserves_queries() {
        let mut track = track100();
        let w = write(AccessFlags::TRANSFER_WRITE);
        track.assign(30..60, w);
        track.assign(0..30, w);
        track.assign(60..100, w);
        let before = track.query(0..100);
        assert_eq!(track.cells().len(), 3);

        track.coalesce();
        assert_eq!(track.cells().len(), 1);
        assert_eq!(track.query(0..100), before);
    }

    #[test]
    fn overlapping_clips_to_the_requested_range() {
        let mut track = track100();
        track.assign(30..60, write(AccessFlags::TRANSFER_WRITE));
        let clipped: Vec<_> = track.overlapping(40..80).map(|(r, _)| r).collect();
        assert_eq!(clipped, vec![40..60, 60..80]);
    }
}
