//! Weak-key re-resolution of resource identities.
//!
//! Dependents that outlive a resource never hold it alive and never
//! dereference a dangling handle: they keep `(id, sub-range)` keys and
//! resolve them here on every use. Entries unregister themselves through
//! the resources' destruction callbacks, so a lookup after destruction
//! reports [`InvalidId`] instead of resurrecting anything.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use thiserror::Error;

use crate::id::{BufferId, ContextId, ImageId};
use crate::resource::{Buffer, BufferKey, Image, ImageKey};
use crate::track::image::ImageRangeState;
use crate::track::{AccessState, BufferRangeQuery};
use crate::FastHashMap;

use smallvec::SmallVec;

/// A key referred to a resource that is destroyed or was never
/// registered.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum InvalidId {
    /// No live buffer carries this id.
    #[error("buffer {0:?} is destroyed or was never registered")]
    Buffer(BufferId),
    /// No live image carries this id.
    #[error("image {0:?} is destroyed or was never registered")]
    Image(ImageId),
}

/// Maps resource ids to weak handles of the live instances.
pub struct Registry {
    buffers: Mutex<FastHashMap<BufferId, Weak<Buffer>>>,
    images: Mutex<FastHashMap<ImageId, Weak<Image>>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            buffers: Mutex::new(FastHashMap::default()),
            images: Mutex::new(FastHashMap::default()),
        })
    }

    fn owner_token(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }

    /// Registers a buffer. Its entry is removed automatically when the
    /// buffer is destroyed.
    pub fn register_buffer(self: &Arc<Self>, buffer: &Arc<Buffer>) {
        let id = buffer.unique_id();
        self.buffers.lock().insert(id, Arc::downgrade(buffer));

        let registry = Arc::downgrade(self);
        buffer.add_destruction_callback(self.owner_token(), move || {
            if let Some(registry) = registry.upgrade() {
                registry.buffers.lock().remove(&id);
            }
        });
    }

    /// Registers an image. Its entry is removed automatically when the
    /// image is destroyed.
    pub fn register_image(self: &Arc<Self>, image: &Arc<Image>) {
        let id = image.unique_id();
        self.images.lock().insert(id, Arc::downgrade(image));

        let registry = Arc::downgrade(self);
        image.add_destruction_callback(self.owner_token(), move || {
            if let Some(registry) = registry.upgrade() {
                registry.images.lock().remove(&id);
            }
        });
    }

    /// Resolves a buffer id to the live instance.
    pub fn buffer(&self, id: BufferId) -> Result<Arc<Buffer>, InvalidId> {
        self.buffers
            .lock()
            .get(&id)
            .and_then(Weak::upgrade)
            .ok_or(InvalidId::Buffer(id))
    }

    /// Resolves an image id to the live instance.
    pub fn image(&self, id: ImageId) -> Result<Arc<Image>, InvalidId> {
        self.images
            .lock()
            .get(&id)
            .and_then(Weak::upgrade)
            .ok_or(InvalidId::Image(id))
    }

    /// Queries the range a buffer key addresses, re-resolving the key.
    pub fn query_buffer(
        &self,
        context: ContextId,
        key: &BufferKey,
    ) -> Result<BufferRangeQuery, InvalidId> {
        Ok(self.buffer(key.id)?.query(context, key.range))
    }

    /// Assigns to the range a buffer key addresses, re-resolving the key.
    pub fn assign_buffer(
        &self,
        context: ContextId,
        key: &BufferKey,
        state: AccessState,
    ) -> Result<(), InvalidId> {
        self.buffer(key.id)?.assign(context, key.range, state);
        Ok(())
    }

    /// Queries the sub-range an image key addresses, re-resolving the key.
    pub fn query_image(
        &self,
        context: ContextId,
        key: &ImageKey,
    ) -> Result<SmallVec<[ImageRangeState; 4]>, InvalidId> {
        Ok(self.image(key.id)?.query(context, &key.range))
    }

    /// Assigns to the sub-range an image key addresses, re-resolving the key.
    pub fn assign_image(
        &self,
        context: ContextId,
        key: &ImageKey,
        state: AccessState,
    ) -> Result<(), InvalidId> {
        self.image(key.id)?.assign(context, &key.range, state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hzt::{BufferDescriptor, BufferRange};

    #[test]
    fn keys_resolve_while_alive_and_report_afterwards() {
        let registry = Registry::new();
        let buffer = Buffer::new(&BufferDescriptor {
            label: None,
            size: 64,
        });
        registry.register_buffer(&buffer);

        let key = buffer.key(BufferRange::FULL);
        assert!(registry.query_buffer(ContextId(0), &key).is_ok());

        drop(buffer);
        assert_eq!(
            registry.query_buffer(ContextId(0), &key),
            Err(InvalidId::Buffer(key.id))
        );
    }

    #[test]
    fn dropping_the_registry_first_is_harmless() {
        let registry = Registry::new();
        let buffer = Buffer::new(&BufferDescriptor {
            label: None,
            size: 64,
        });
        registry.register_buffer(&buffer);
        drop(registry);
        // The destruction callback upgrades a dead weak and does nothing.
        drop(buffer);
    }
}
