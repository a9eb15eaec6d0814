/*! Resource State Trackers
 *
 * These structures record, for every independently addressable sub-range
 * of every buffer and image, what access last wrote it and which
 * read-only accesses have been made visible since, and decide what
 * synchronization a new access requires.
 *
 * ## Representation
 *
 * The unit of bookkeeping is a [`DoubleState`]: the last write access and
 * the union of read-only accesses that followed it. Keeping the read
 * union separate is what lets N consecutive readers share one barrier:
 * a new read only needs synchronization against the last write if its
 * access and stage bits are not already contained in the union.
 *
 * Sub-ranges are kept in a [`range::RangeTrack`]: an ordered,
 * non-overlapping partition of a 1-D index space. Buffers use a single
 * track over byte addresses; images use one track over array layers per
 * mip level, with a vertical merge pass collapsing adjacent mips whose
 * layer partitions agree (see [`image`]).
 *
 * ## Contexts
 *
 * All state is namespaced by [`ContextId`](crate::id::ContextId). Each
 * resource lazily grows one track per context it is touched from,
 * starting from the resource's creation-time default. The trackers
 * assume a single writer per context; ordering *between* contexts is the
 * submission layer's business and deliberately out of scope.
 *
 * ## Conservatism
 *
 * Every decision in this module errs towards "barrier required": a
 * spurious barrier costs throughput, a missing one corrupts results.
 */

pub(crate) mod context;
pub mod range;

pub mod buffer;
pub mod image;

use hzt::{AccessFlags, ImageLayout, StageFlags};

/// One use of a resource sub-range: what kind of access, at which
/// execution stages, and, for images, in which layout.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessState {
    /// Kinds of memory access performed.
    pub access: AccessFlags,
    /// Pipeline stages the access executes at.
    pub stage: StageFlags,
    /// Image layout the access requires. Ignored for buffers.
    pub layout: ImageLayout,
}

impl AccessState {
    /// No access at all, `Undefined` layout.
    pub const NONE: Self = Self {
        access: AccessFlags::empty(),
        stage: StageFlags::empty(),
        layout: ImageLayout::Undefined,
    };

    /// ORs access and stage masks. The layout stays `self`'s: the caller
    /// puts the side whose layout must win on the left.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            access: self.access | other.access,
            stage: self.stage | other.stage,
            layout: self.layout,
        }
    }

    /// ANDs access and stage masks, keeping `self`'s layout.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        Self {
            access: self.access & other.access,
            stage: self.stage & other.stage,
            layout: self.layout,
        }
    }

    /// Returns true if the access reads and never writes.
    pub fn is_read_only(&self) -> bool {
        self.access.is_read_only()
    }

    /// Returns true if `requested`'s access and stage bits are all
    /// already contained in `self`. Used to test whether a read has
    /// already been made visible by an earlier barrier.
    pub fn covers(&self, requested: &Self) -> bool {
        self.access.contains(requested.access) && self.stage.contains(requested.stage)
    }
}

/// Per-cell tracking payload: the last write plus the union of read-only
/// accesses made visible since that write.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DoubleState {
    /// The last write access.
    pub write: AccessState,
    /// Union of read-only accesses since the last write. Its layout is
    /// the layout of the most recent reader (equal to the write layout
    /// right after a write).
    pub read_union: AccessState,
}

impl DoubleState {
    /// The creation-time default of a resource: never accessed, in its
    /// initial layout.
    pub fn initial(layout: ImageLayout) -> Self {
        let state = AccessState {
            access: AccessFlags::empty(),
            stage: StageFlags::empty(),
            layout,
        };
        Self {
            write: state,
            read_union: state,
        }
    }

    /// Everything a new write must be ordered against: the last write and
    /// every read since. Carries the current layout.
    #[must_use]
    pub fn flush_source(&self) -> AccessState {
        self.read_union.union(self.write)
    }

    /// Folds one access into the cell. Read-only accesses accumulate into
    /// the read union (taking the newest reader's layout); anything else
    /// becomes the new write and invalidates the union's visibility.
    pub fn apply(&mut self, next: AccessState) {
        if next.is_read_only() {
            self.read_union = next.union(self.read_union);
        } else {
            self.write = next;
            self.read_union = AccessState {
                access: AccessFlags::empty(),
                stage: StageFlags::empty(),
                layout: next.layout,
            };
        }
    }
}

/// Result of querying a byte range of a buffer.
///
/// A range can span cells whose states disagree, and the two consumers of
/// a query need opposite folds: barrier *sources* must cover every
/// overlapped cell (`any`, bitwise OR), while read-subsumption must hold
/// on every overlapped cell to be skippable at all (`all`, bitwise AND).
/// Testing subsumption against the OR would treat a read as visible on a
/// cell it never touched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufferRangeQuery {
    /// Bitwise OR of every overlapped cell's state.
    pub any: DoubleState,
    /// Bitwise AND of every overlapped cell's state.
    pub all: DoubleState,
}

/// Returns true if a layout transition separates the two states.
pub fn layout_transition_required(prev: &AccessState, next: &AccessState) -> bool {
    prev.layout != next.layout
}

/// The conservative barrier predicate: a barrier is required unless both
/// accesses are reads, and, for images, additionally whenever the
/// layout changes.
///
/// Under-returning `true` here races on the GPU; over-returning only
/// costs throughput, so every ambiguity resolves to `true`.
pub fn needs_barrier(prev: &AccessState, next: &AccessState, is_image: bool) -> bool {
    !(prev.access.is_read() && next.access.is_read())
        || (is_image && layout_transition_required(prev, next))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(access: AccessFlags, stage: StageFlags) -> AccessState {
        AccessState {
            access,
            stage,
            layout: ImageLayout::ShaderReadOnly,
        }
    }

    fn write(access: AccessFlags, stage: StageFlags) -> AccessState {
        AccessState {
            access,
            stage,
            layout: ImageLayout::General,
        }
    }

    #[test]
    fn union_keeps_left_layout() {
        let a = read(AccessFlags::SHADER_SAMPLED_READ, StageFlags::FRAGMENT_SHADER);
        let b = write(AccessFlags::SHADER_STORAGE_WRITE, StageFlags::COMPUTE_SHADER);
        let u = a.union(b);
        assert_eq!(u.layout, ImageLayout::ShaderReadOnly);
        assert!(u.access.contains(AccessFlags::SHADER_SAMPLED_READ | AccessFlags::SHADER_STORAGE_WRITE));
        assert!(u.stage.contains(StageFlags::FRAGMENT_SHADER | StageFlags::COMPUTE_SHADER));
    }

    #[test]
    fn read_read_skips_barrier() {
        let a = read(AccessFlags::SHADER_SAMPLED_READ, StageFlags::FRAGMENT_SHADER);
        let b = read(AccessFlags::UNIFORM_READ, StageFlags::VERTEX_SHADER);
        assert!(!needs_barrier(&a, &b, false));
        // Same masks, image, same layout: still no barrier.
        assert!(!needs_barrier(&a, &a, true));
    }

    #[test]
    fn layout_change_forces_barrier_on_images_only() {
        let a = read(AccessFlags::SHADER_SAMPLED_READ, StageFlags::FRAGMENT_SHADER);
        let b = AccessState {
            layout: ImageLayout::TransferSrc,
            ..a
        };
        assert!(needs_barrier(&a, &b, true));
        assert!(!needs_barrier(&a, &b, false));
    }

    #[test]
    fn writes_always_need_barriers() {
        let w = write(AccessFlags::SHADER_STORAGE_WRITE, StageFlags::COMPUTE_SHADER);
        let r = read(AccessFlags::SHADER_SAMPLED_READ, StageFlags::FRAGMENT_SHADER);
        assert!(needs_barrier(&w, &r, false));
        assert!(needs_barrier(&r, &w, false));
        assert!(needs_barrier(&w, &w, true));
        // A never-accessed state is not a read; the first real access
        // must be ordered against it.
        assert!(needs_barrier(&AccessState::NONE, &r, false));
    }

    #[test]
    fn apply_accumulates_reads_and_resets_on_write() {
        let mut cell = DoubleState::initial(ImageLayout::Undefined);
        let r1 = read(AccessFlags::SHADER_SAMPLED_READ, StageFlags::FRAGMENT_SHADER);
        let r2 = read(AccessFlags::UNIFORM_READ, StageFlags::VERTEX_SHADER);
        cell.apply(r1);
        cell.apply(r2);
        assert!(cell.read_union.covers(&r1));
        assert!(cell.read_union.covers(&r2));
        // The newest reader's layout wins.
        assert_eq!(cell.read_union.layout, ImageLayout::ShaderReadOnly);

        let w = write(AccessFlags::TRANSFER_WRITE, StageFlags::TRANSFER);
        cell.apply(w);
        assert_eq!(cell.write, w);
        assert_eq!(cell.read_union.access, AccessFlags::empty());
        assert_eq!(cell.read_union.layout, ImageLayout::General);
    }

    #[test]
    fn read_modify_write_counts_as_write() {
        let mut cell = DoubleState::initial(ImageLayout::General);
        let rmw = AccessState {
            access: AccessFlags::SHADER_STORAGE_READ | AccessFlags::SHADER_STORAGE_WRITE,
            stage: StageFlags::COMPUTE_SHADER,
            layout: ImageLayout::General,
        };
        cell.apply(rmw);
        assert_eq!(cell.write, rmw);
        assert_eq!(cell.read_union.access, AccessFlags::empty());
    }
}
