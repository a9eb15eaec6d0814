//! Barrier synthesis for one batch of operations.
//!
//! The recording layer declares, per operation, the resources it is
//! about to touch and the access it requires. The [`BarrierEncoder`]
//! queries the tracked state, decides per sub-range whether
//! synchronization is needed, and emits the accumulated barriers as one
//! batched [`CommandSink::pipeline_barrier`] call. Batching many
//! logical edges into one command keeps the pipeline-flush overhead per
//! batch constant instead of per resource.
//!
//! The phases form a typestate chain:
//! collect usages on the encoder, `record` it into a sink, `commit` the
//! returned [`RecordedBarriers`]. Committing without recording does not
//! type-check, so the table can only go stale by dropping
//! [`RecordedBarriers`] on the floor, which the compiler flags through
//! `#[must_use]`.

use std::ops::Range;
use std::sync::Arc;

use hzt::{BufferAddress, BufferRange, ImageSubresourceRange};

use crate::id::ContextId;
use crate::resource::{Buffer, Image};
use crate::track::{AccessState, BufferRangeQuery, DoubleState};

/// Orders the accesses in `usage.start` before those in `usage.end` on
/// the given byte range.
#[derive(Clone, Debug)]
pub struct BufferBarrier {
    /// The buffer transitioned.
    pub buffer: Arc<Buffer>,
    /// Byte range covered, resolved against the real buffer size.
    pub range: Range<BufferAddress>,
    /// Source and destination access.
    pub usage: Range<AccessState>,
}

/// Orders the accesses in `usage.start` before those in `usage.end` on
/// the given image sub-range, transitioning the layout when the two
/// sides disagree.
#[derive(Clone, Debug)]
pub struct ImageBarrier {
    /// The image transitioned.
    pub image: Arc<Image>,
    /// Sub-range covered, with concrete counts.
    pub range: ImageSubresourceRange,
    /// Source and destination access; layouts ride along.
    pub usage: Range<AccessState>,
}

/// Where batched barriers are recorded: a command stream provided by the
/// recording layer, able to carry any number of buffer and image
/// barriers in a single call.
pub trait CommandSink {
    /// Records one batched pipeline barrier. Never called with both
    /// slices empty.
    fn pipeline_barrier(
        &mut self,
        buffer_barriers: &[BufferBarrier],
        image_barriers: &[ImageBarrier],
    );
}

/// Returns true if `requested`'s access and stage bits have already been
/// made visible by the barriers summarized in `read_union`.
fn read_already_visible(requested: &AccessState, read_union: &AccessState) -> bool {
    read_union.covers(requested)
}

/// Decides whether an access to a buffer range needs a barrier, and from
/// which source state. `None` means the access is already ordered.
///
/// Read subsumption tests the AND fold: skipping is only sound if every
/// overlapped cell has the requested bits in its read union. Sources
/// come from the OR fold so that every cell's accesses are covered.
fn buffer_barrier_source(prev: &BufferRangeQuery, requested: &AccessState) -> Option<AccessState> {
    if requested.is_read_only() {
        if read_already_visible(requested, &prev.all.read_union) {
            None
        } else {
            Some(prev.any.write)
        }
    } else {
        Some(prev.any.flush_source())
    }
}

/// Decides whether an access to one uniform image sub-range needs a
/// barrier, and from which source state. `None` means already ordered.
///
/// Unlike buffers, a layout mismatch forces a barrier even between pure
/// reads, and the source must then also wait on the accumulated readers:
/// they observed the old layout.
fn image_barrier_source(prev: &DoubleState, requested: &AccessState) -> Option<AccessState> {
    if requested.is_read_only() {
        let same_layout = requested.layout == prev.read_union.layout;
        if same_layout && read_already_visible(requested, &prev.read_union) {
            None
        } else {
            let mut source = prev.write;
            if !same_layout {
                source = source.union(prev.read_union);
            }
            source.layout = prev.read_union.layout;
            Some(source)
        }
    } else {
        Some(prev.flush_source())
    }
}

enum PendingCommit {
    Buffer {
        buffer: Arc<Buffer>,
        range: BufferRange,
        end: AccessState,
    },
    Image {
        image: Arc<Image>,
        range: ImageSubresourceRange,
        end: AccessState,
    },
}

/// Collects the resource usages of one operation batch and the barriers
/// they require. See the module docs for the phase contract.
///
/// The encoder clones the `Arc` of every resource it touches, keeping
/// them alive through the batch.
pub struct BarrierEncoder {
    context: ContextId,
    buffer_barriers: Vec<BufferBarrier>,
    image_barriers: Vec<ImageBarrier>,
    commits: Vec<PendingCommit>,
}

impl BarrierEncoder {
    /// An empty batch recording under `context`.
    pub fn new(context: ContextId) -> Self {
        Self {
            context,
            buffer_barriers: Vec::new(),
            image_barriers: Vec::new(),
            commits: Vec::new(),
        }
    }

    /// The tracking context this batch records under.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Declares one use of a buffer range.
    ///
    /// `end_state` overrides the state written back at commit, e.g. a
    /// write that leaves the range usable read-only afterwards; the
    /// requested state is written back otherwise.
    pub fn buffer_usage(
        &mut self,
        buffer: &Arc<Buffer>,
        range: BufferRange,
        state: AccessState,
        end_state: Option<AccessState>,
    ) {
        let prev = buffer.query(self.context, range);
        if let Some(source) = buffer_barrier_source(&prev, &state) {
            log::trace!(
                "\tbuf {:?} ({:?}): barrier {:?} -> {:?}",
                buffer.unique_id(),
                buffer.label(),
                source,
                state
            );
            self.buffer_barriers.push(BufferBarrier {
                buffer: Arc::clone(buffer),
                range: range.resolve(buffer.size()),
                usage: source..state,
            });
        }
        self.commits.push(PendingCommit::Buffer {
            buffer: Arc::clone(buffer),
            range,
            end: end_state.unwrap_or(state),
        });
    }

    /// Declares one use of an image sub-range.
    ///
    /// One barrier is appended per reported uniform sub-range that is
    /// not already ordered, so a mip chain in a uniform state costs a
    /// single barrier.
    pub fn image_usage(
        &mut self,
        image: &Arc<Image>,
        range: ImageSubresourceRange,
        state: AccessState,
        end_state: Option<AccessState>,
    ) {
        for prev in image.query(self.context, &range) {
            if let Some(source) = image_barrier_source(&prev.state, &state) {
                log::trace!(
                    "\timg {:?} ({:?}) {:?}: barrier {:?} -> {:?}",
                    image.unique_id(),
                    image.label(),
                    prev.range,
                    source,
                    state
                );
                self.image_barriers.push(ImageBarrier {
                    image: Arc::clone(image),
                    range: prev.range,
                    usage: source..state,
                });
            }
        }
        self.commits.push(PendingCommit::Image {
            image: Arc::clone(image),
            range,
            end: end_state.unwrap_or(state),
        });
    }

    /// True if the collected usages require no synchronization at all.
    pub fn is_empty(&self) -> bool {
        self.buffer_barriers.is_empty() && self.image_barriers.is_empty()
    }

    /// Emits the collected barriers as one batched call into `sink`; a
    /// batch with nothing to synchronize emits no call at all.
    #[must_use = "commit the returned barriers or the state table goes stale"]
    pub fn record(self, sink: &mut dyn CommandSink) -> RecordedBarriers {
        profiling::scope!("BarrierEncoder::record");
        if !self.is_empty() {
            sink.pipeline_barrier(&self.buffer_barriers, &self.image_barriers);
        }
        RecordedBarriers {
            context: self.context,
            commits: self.commits,
        }
    }
}

/// A recorded batch whose end states still have to be written back.
///
/// Dropping this without calling [`commit`](Self::commit) leaves the
/// state table stale and corrupts every later barrier decision on the
/// touched ranges.
#[must_use = "commit the recorded barriers or the state table goes stale"]
pub struct RecordedBarriers {
    context: ContextId,
    commits: Vec<PendingCommit>,
}

impl RecordedBarriers {
    /// Writes every usage's end state back to the tracks.
    pub fn commit(self) {
        profiling::scope!("RecordedBarriers::commit");
        for commit in &self.commits {
            match commit {
                PendingCommit::Buffer { buffer, range, end } => {
                    buffer.assign(self.context, *range, *end);
                }
                PendingCommit::Image { image, range, end } => {
                    image.assign(self.context, range, *end);
                }
            }
        }
    }
}

/// Synchronizes a single buffer range in one call: collect, record,
/// commit. Returns true if a barrier was emitted.
pub fn sync_buffer(
    sink: &mut dyn CommandSink,
    context: ContextId,
    buffer: &Arc<Buffer>,
    range: BufferRange,
    state: AccessState,
    end_state: Option<AccessState>,
) -> bool {
    let mut encoder = BarrierEncoder::new(context);
    encoder.buffer_usage(buffer, range, state, end_state);
    let emitted = !encoder.is_empty();
    encoder.record(sink).commit();
    emitted
}

/// Synchronizes a single image sub-range in one call: collect, record,
/// commit. Returns true if a barrier was emitted.
pub fn sync_image(
    sink: &mut dyn CommandSink,
    context: ContextId,
    image: &Arc<Image>,
    range: ImageSubresourceRange,
    state: AccessState,
    end_state: Option<AccessState>,
) -> bool {
    let mut encoder = BarrierEncoder::new(context);
    encoder.image_usage(image, range, state, end_state);
    let emitted = !encoder.is_empty();
    encoder.record(sink).commit();
    emitted
}
