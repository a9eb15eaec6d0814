//! Per-subresource state tracks for images.
//!
//! An image's state space is the (mip level, array layer) grid. Each mip
//! level owns an independent [`RangeTrack`] over array layers; a query
//! reports the clipped cells of every requested mip, then collapses
//! adjacent mips whose layer partitions agree element for element into a
//! single reported range. That vertical merge is what lets the barrier
//! layer emit one barrier for a whole mip chain instead of one per mip,
//! the dominant source of redundant synchronization when omitted.

use std::ops::Range;

use arrayvec::ArrayVec;
use smallvec::SmallVec;

use hzt::{strict_assert, ImageAspects, ImageLayout, ImageSubresourceRange};

use super::context::ContextStates;
use super::range::RangeTrack;
use super::{AccessState, DoubleState};
use crate::id::ContextId;

/// Highest mip level count an image track supports. 16 levels cover a
/// 32768² base extent.
pub const MAX_MIP_LEVELS: usize = 16;

/// One layer track per mip level.
type MipTracks = ArrayVec<RangeTrack<u32>, MAX_MIP_LEVELS>;

/// The state of one reported sub-range of an image: a rectangle of
/// (mips × layers) over which the tracked state is uniform.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageRangeState {
    /// The sub-range covered, with concrete counts.
    pub range: ImageSubresourceRange,
    /// The uniform state over that sub-range.
    pub state: DoubleState,
}

/// All per-context tracks of one image.
#[derive(Debug)]
pub struct ImageTracks {
    mip_level_count: u32,
    array_layer_count: u32,
    aspects: ImageAspects,
    initial_layout: ImageLayout,
    contexts: ContextStates<MipTracks>,
}

impl ImageTracks {
    pub(crate) fn new(
        mip_level_count: u32,
        array_layer_count: u32,
        aspects: ImageAspects,
        initial_layout: ImageLayout,
    ) -> Self {
        strict_assert!(mip_level_count > 0, "image without mip levels");
        strict_assert!(mip_level_count as usize <= MAX_MIP_LEVELS);
        strict_assert!(array_layer_count > 0, "image without array layers");
        Self {
            mip_level_count,
            array_layer_count,
            aspects,
            initial_layout,
            contexts: ContextStates::new(),
        }
    }

    /// Number of mip levels of the tracked image.
    pub fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }

    /// Number of array layers of the tracked image.
    pub fn array_layer_count(&self) -> u32 {
        self.array_layer_count
    }

    fn resolve(&self, range: &ImageSubresourceRange) -> (Range<u32>, Range<u32>) {
        let mips = range.mip_range(self.mip_level_count);
        let layers = range.layer_range(self.array_layer_count);
        strict_assert!(
            self.aspects.contains(range.aspects),
            "sub-range addresses planes the image does not have"
        );
        strict_assert!(mips.start < mips.end && mips.end <= self.mip_level_count);
        strict_assert!(layers.start < layers.end && layers.end <= self.array_layer_count);
        (mips, layers)
    }

    fn tracks(&mut self, context: ContextId) -> &mut MipTracks {
        let mip_level_count = self.mip_level_count;
        let array_layer_count = self.array_layer_count;
        let initial = DoubleState::initial(self.initial_layout);
        self.contexts.get_or_init(context, || {
            (0..mip_level_count)
                .map(|_| RangeTrack::new(array_layer_count, initial))
                .collect()
        })
    }

    /// Folds one access into every addressed (mip, layer) cell.
    pub fn assign(&mut self, context: ContextId, range: &ImageSubresourceRange, state: AccessState) {
        let (mips, layers) = self.resolve(range);
        let tracks = self.tracks(context);
        for mip in mips {
            tracks[mip as usize].assign(layers.clone(), state);
        }
    }

    /// Reports the distinct states over the addressed sub-range, merged
    /// vertically where adjacent mips carry identical layer partitions.
    ///
    /// A never-touched context lazily starts every cell from the
    /// creation default (no access, initial layout); a fresh full-range
    /// query therefore reports exactly one merged entry.
    pub fn query(
        &mut self,
        context: ContextId,
        range: &ImageSubresourceRange,
    ) -> SmallVec<[ImageRangeState; 4]> {
        let (mips, layers) = self.resolve(range);
        let aspects = range.aspects;
        merge_mips(self.tracks(context), aspects, mips, layers)
    }

    /// Like [`query`](Self::query), but without initializing state for a
    /// context that never touched the image.
    pub fn try_query(
        &self,
        context: ContextId,
        range: &ImageSubresourceRange,
    ) -> Option<SmallVec<[ImageRangeState; 4]>> {
        let (mips, layers) = self.resolve(range);
        self.contexts
            .try_get(context)
            .map(|tracks| merge_mips(tracks, range.aspects, mips, layers))
    }

    /// Merges equal-state neighbor cells in every context's tracks.
    pub fn coalesce(&mut self) {
        self.contexts
            .for_each(|tracks| tracks.iter_mut().for_each(|track| track.coalesce()));
    }
}

/// Clips every requested mip's cells to the layer interval, then
/// collapses each run of adjacent mips whose clipped cell lists are
/// element-for-element identical. Adjacent runs only; equal but
/// non-adjacent mips stay separate entries.
fn merge_mips(
    tracks: &MipTracks,
    aspects: ImageAspects,
    mips: Range<u32>,
    layers: Range<u32>,
) -> SmallVec<[ImageRangeState; 4]> {
    let per_mip: SmallVec<[SmallVec<[(Range<u32>, DoubleState); 4]>; MAX_MIP_LEVELS]> = mips
        .clone()
        .map(|mip| {
            tracks[mip as usize]
                .overlapping(layers.clone())
                .map(|(range, state)| (range, *state))
                .collect()
        })
        .collect();

    let mut result = SmallVec::new();
    let mut run_start = 0;
    for index in 1..=per_mip.len() {
        if index < per_mip.len() && per_mip[index] == per_mip[run_start] {
            continue;
        }
        let base_mip_level = mips.start + run_start as u32;
        let mip_level_count = (index - run_start) as u32;
        for (layer_range, state) in &per_mip[run_start] {
            result.push(ImageRangeState {
                range: ImageSubresourceRange {
                    aspects,
                    base_mip_level,
                    mip_level_count: Some(mip_level_count),
                    base_array_layer: layer_range.start,
                    array_layer_count: Some(layer_range.end - layer_range.start),
                },
                state: *state,
            });
        }
        run_start = index;
    }
    result
}
