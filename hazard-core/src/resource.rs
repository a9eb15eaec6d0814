//! Buffer and image instances and their tracked state.
//!
//! An instance owns its per-context state tables; dropping it frees them
//! and fires the registered destruction callbacks. Anything that caches
//! an instance's identity holds a weak [`BufferKey`]/[`ImageKey`] and
//! re-resolves it through the [`registry`](crate::registry) instead of
//! assuming liveness.
//!
//! The interior mutex is not a synchronization protocol: the tracker
//! assumes one writer per tracking context, and the lock only makes the
//! `Arc`-shared mutation sound. Cross-context ordering is established by
//! the submission layer.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use hzt::{
    BufferAddress, BufferDescriptor, BufferRange, ImageDescriptor, ImageLayout,
    ImageSubresourceRange,
};

use crate::id::{BufferId, ContextId, ImageId};
use crate::track::buffer::BufferTracks;
use crate::track::image::{ImageRangeState, ImageTracks};
use crate::track::{AccessState, BufferRangeQuery};
use crate::Label;

/// Weak reference to a byte range of a buffer: survives the buffer's
/// destruction, resolvable while it lives.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferKey {
    /// Identity of the buffer.
    pub id: BufferId,
    /// Byte range addressed.
    pub range: BufferRange,
}

/// Weak reference to a sub-range of an image.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageKey {
    /// Identity of the image.
    pub id: ImageId,
    /// Sub-range addressed.
    pub range: ImageSubresourceRange,
}

struct DestructionCallback {
    owner: usize,
    callback: Box<dyn FnOnce() + Send>,
}

#[derive(Default)]
struct DestructionCallbacks {
    callbacks: Vec<DestructionCallback>,
}

impl DestructionCallbacks {
    fn add(&mut self, owner: usize, callback: impl FnOnce() + Send + 'static) {
        self.callbacks.push(DestructionCallback {
            owner,
            callback: Box::new(callback),
        });
    }

    fn remove(&mut self, owner: usize) {
        self.callbacks.retain(|cb| cb.owner != owner);
    }

    fn fire(&mut self) {
        for cb in self.callbacks.drain(..) {
            (cb.callback)();
        }
    }
}

/// A tracked buffer instance.
pub struct Buffer {
    id: BufferId,
    label: Option<String>,
    size: BufferAddress,
    tracks: Mutex<BufferTracks>,
    destruction_callbacks: Mutex<DestructionCallbacks>,
}

impl Buffer {
    /// Creates a buffer instance with a fresh process-unique id.
    pub fn new(desc: &BufferDescriptor<Label>) -> Arc<Self> {
        let id = BufferId::next();
        let label = desc.label.as_ref().map(|cow| cow.to_string());
        log::trace!(
            "create {:?} ({:?}), {} bytes",
            id,
            label.as_deref().unwrap_or(""),
            desc.size
        );
        Arc::new(Self {
            id,
            label,
            size: desc.size,
            tracks: Mutex::new(BufferTracks::new(desc.size)),
            destruction_callbacks: Mutex::new(DestructionCallbacks::default()),
        })
    }

    /// The process-unique identity of this instance.
    pub fn unique_id(&self) -> BufferId {
        self.id
    }

    /// Debug label, empty if none was given.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("")
    }

    /// Size in bytes.
    pub fn size(&self) -> BufferAddress {
        self.size
    }

    /// A key addressing the given range of this buffer.
    pub fn key(&self, range: BufferRange) -> BufferKey {
        BufferKey { id: self.id, range }
    }

    /// Conservative state summary of `range` under `context`, lazily
    /// initializing a never-touched context to the creation default.
    pub fn query(&self, context: ContextId, range: BufferRange) -> BufferRangeQuery {
        self.tracks.lock().query(context, range.resolve(self.size))
    }

    /// Like [`query`](Self::query) without faulting in new contexts.
    pub fn try_query(&self, context: ContextId, range: BufferRange) -> Option<BufferRangeQuery> {
        self.tracks
            .lock()
            .try_query(context, range.resolve(self.size))
    }

    /// Folds one access into `range` under `context`.
    pub fn assign(&self, context: ContextId, range: BufferRange, state: AccessState) {
        self.tracks
            .lock()
            .assign(context, range.resolve(self.size), state);
    }

    /// Merges equal-state neighbor cells in every context's track.
    pub fn coalesce_tracks(&self) {
        self.tracks.lock().coalesce();
    }

    /// Runs `callback` when this instance is destroyed. `owner` is an
    /// opaque token for [`remove_destruction_callbacks`](Self::remove_destruction_callbacks).
    pub fn add_destruction_callback(&self, owner: usize, callback: impl FnOnce() + Send + 'static) {
        self.destruction_callbacks.lock().add(owner, callback);
    }

    /// Removes every callback registered under `owner`.
    pub fn remove_destruction_callbacks(&self, owner: usize) {
        self.destruction_callbacks.lock().remove(owner);
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        log::trace!("destroy {:?} ({:?})", self.id, self.label());
        self.destruction_callbacks.get_mut().fire();
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("label", &self.label())
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// A tracked image instance.
pub struct Image {
    id: ImageId,
    desc: ImageDescriptor<Option<String>>,
    tracks: Mutex<ImageTracks>,
    destruction_callbacks: Mutex<DestructionCallbacks>,
}

impl Image {
    /// Creates an image instance with a fresh process-unique id.
    pub fn new(desc: &ImageDescriptor<Label>) -> Arc<Self> {
        let id = ImageId::next();
        let desc = desc.map_label(|label| label.as_ref().map(|cow| cow.to_string()));
        log::trace!(
            "create {:?} ({:?}), {} mips x {} layers, initial layout {:?}",
            id,
            desc.label.as_deref().unwrap_or(""),
            desc.mip_level_count,
            desc.array_layer_count,
            desc.initial_layout
        );
        Arc::new(Self {
            id,
            tracks: Mutex::new(ImageTracks::new(
                desc.mip_level_count,
                desc.array_layer_count,
                desc.aspects,
                desc.initial_layout,
            )),
            desc,
            destruction_callbacks: Mutex::new(DestructionCallbacks::default()),
        })
    }

    /// The process-unique identity of this instance.
    pub fn unique_id(&self) -> ImageId {
        self.id
    }

    /// Debug label, empty if none was given.
    pub fn label(&self) -> &str {
        self.desc.label.as_deref().unwrap_or("")
    }

    /// Number of mip levels.
    pub fn mip_level_count(&self) -> u32 {
        self.desc.mip_level_count
    }

    /// Number of array layers.
    pub fn array_layer_count(&self) -> u32 {
        self.desc.array_layer_count
    }

    /// Layout the image was created in.
    pub fn initial_layout(&self) -> ImageLayout {
        self.desc.initial_layout
    }

    /// The sub-range addressing every subresource of this image.
    pub fn full_range(&self) -> ImageSubresourceRange {
        ImageSubresourceRange {
            aspects: self.desc.aspects,
            base_mip_level: 0,
            mip_level_count: None,
            base_array_layer: 0,
            array_layer_count: None,
        }
    }

    /// A key addressing the given sub-range of this image.
    pub fn key(&self, range: ImageSubresourceRange) -> ImageKey {
        ImageKey { id: self.id, range }
    }

    /// Reports the distinct states over `range` under `context`,
    /// vertically merged (see [`ImageTracks::query`]). Lazily initializes
    /// a never-touched context.
    pub fn query(
        &self,
        context: ContextId,
        range: &ImageSubresourceRange,
    ) -> SmallVec<[ImageRangeState; 4]> {
        self.tracks.lock().query(context, range)
    }

    /// Like [`query`](Self::query) without faulting in new contexts.
    pub fn try_query(
        &self,
        context: ContextId,
        range: &ImageSubresourceRange,
    ) -> Option<SmallVec<[ImageRangeState; 4]>> {
        self.tracks.lock().try_query(context, range)
    }

    /// Folds one access into `range` under `context`.
    pub fn assign(&self, context: ContextId, range: &ImageSubresourceRange, state: AccessState) {
        self.tracks.lock().assign(context, range, state);
    }

    /// Merges equal-state neighbor cells in every context's tracks.
    pub fn coalesce_tracks(&self) {
        self.tracks.lock().coalesce();
    }

    /// Runs `callback` when this instance is destroyed.
    pub fn add_destruction_callback(&self, owner: usize, callback: impl FnOnce() + Send + 'static) {
        self.destruction_callbacks.lock().add(owner, callback);
    }

    /// Removes every callback registered under `owner`.
    pub fn remove_destruction_callbacks(&self, owner: usize) {
        self.destruction_callbacks.lock().remove(owner);
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        log::trace!("destroy {:?} ({:?})", self.id, self.label());
        self.destruction_callbacks.get_mut().fire();
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("id", &self.id)
            .field("label", &self.label())
            .field("mip_level_count", &self.desc.mip_level_count)
            .field("array_layer_count", &self.desc.array_layer_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hzt::{AccessFlags, StageFlags};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn buffer(size: BufferAddress) -> Arc<Buffer> {
        Buffer::new(&BufferDescriptor {
            label: Some("test".into()),
            size,
        })
    }

    #[test]
    fn destruction_callbacks_fire_once_on_drop() {
        static FIRED: AtomicUsize = AtomicUsize::new(0);
        let buf = buffer(64);
        buf.add_destruction_callback(1, || {
            FIRED.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(FIRED.load(Ordering::SeqCst), 0);
        drop(buf);
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_callbacks_do_not_fire() {
        static FIRED: AtomicUsize = AtomicUsize::new(0);
        let buf = buffer(64);
        buf.add_destruction_callback(1, || {
            FIRED.fetch_add(1, Ordering::SeqCst);
        });
        buf.add_destruction_callback(2, || {
            FIRED.fetch_add(10, Ordering::SeqCst);
        });
        buf.remove_destruction_callbacks(1);
        drop(buf);
        assert_eq!(FIRED.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn sentinel_ranges_resolve_against_the_real_size() {
        let buf = buffer(256);
        let ctx = ContextId(0);
        buf.assign(
            ctx,
            BufferRange { offset: 128, size: None },
            AccessState {
                access: AccessFlags::TRANSFER_WRITE,
                stage: StageFlags::TRANSFER,
                layout: ImageLayout::Undefined,
            },
        );
        let head = buf.query(ctx, BufferRange::sized(0, 128));
        assert_eq!(head.any.write.access, AccessFlags::empty());
        let tail = buf.query(ctx, BufferRange { offset: 128, size: None });
        assert_eq!(tail.all.write.access, AccessFlags::TRANSFER_WRITE);
    }
}
