//! Byte-granularity state tracks for buffers.
//!
//! One [`RangeTrack`] over byte addresses per tracking context, created
//! lazily. Byte granularity keeps large, partially bound buffers cheap:
//! disjoint ranges never synchronize against each other.

use std::ops::Range;

use hzt::{strict_assert, BufferAddress, ImageLayout};

use super::context::ContextStates;
use super::range::RangeTrack;
use super::{AccessState, BufferRangeQuery, DoubleState};
use crate::id::ContextId;

/// The track of one buffer under one context.
pub type BufferTrack = RangeTrack<BufferAddress>;

/// All per-context tracks of one buffer.
#[derive(Debug)]
pub struct BufferTracks {
    size: BufferAddress,
    contexts: ContextStates<BufferTrack>,
}

impl BufferTracks {
    pub(crate) fn new(size: BufferAddress) -> Self {
        strict_assert!(size > 0, "zero-sized buffer");
        Self {
            size,
            contexts: ContextStates::new(),
        }
    }

    /// Size in bytes of the tracked buffer.
    pub fn size(&self) -> BufferAddress {
        self.size
    }

    fn track(&mut self, context: ContextId) -> &mut BufferTrack {
        let size = self.size;
        self.contexts.get_or_init(context, || {
            BufferTrack::new(size, DoubleState::initial(ImageLayout::Undefined))
        })
    }

    /// Conservative state summary of `range` under `context`.
    ///
    /// A never-touched context lazily starts from the creation default
    /// (no access, no stage); the query itself never faults.
    pub fn query(&mut self, context: ContextId, range: Range<BufferAddress>) -> BufferRangeQuery {
        self.track(context).query(range)
    }

    /// Like [`query`](Self::query), but without initializing state for a
    /// context that never touched the buffer.
    pub fn try_query(
        &self,
        context: ContextId,
        range: Range<BufferAddress>,
    ) -> Option<BufferRangeQuery> {
        self.contexts
            .try_get(context)
            .map(|track| track.query(range))
    }

    /// Folds one access into `range` under `context`.
    pub fn assign(&mut self, context: ContextId, range: Range<BufferAddress>, state: AccessState) {
        self.track(context).assign(range, state);
    }

    /// Merges equal-state neighbor cells in every context's track.
    pub fn coalesce(&mut self) {
        self.contexts.for_each(|track| track.coalesce());
    }
}
