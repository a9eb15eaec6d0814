//! End-to-end checks of the tracker through the public surface only:
//! resources, registry, encoder and sink, the way a recording layer
//! drives them.

use std::sync::Arc;

use hazard_core::id::ContextId;
use hazard_core::registry::{InvalidId, Registry};
use hazard_core::resource::{Buffer, Image};
use hazard_core::sync::{BarrierEncoder, BufferBarrier, CommandSink, ImageBarrier};
use hazard_core::track::AccessState;
use hzt::{
    AccessFlags, BufferDescriptor, BufferRange, ImageAspects, ImageDescriptor, ImageLayout,
    ImageSubresourceRange, StageFlags,
};

#[derive(Default)]
struct CountingSink {
    calls: usize,
    buffer_barriers: usize,
    image_barriers: usize,
    last_image_usage: Option<(AccessState, AccessState)>,
}

impl CommandSink for CountingSink {
    fn pipeline_barrier(&mut self, buffers: &[BufferBarrier], images: &[ImageBarrier]) {
        self.calls += 1;
        self.buffer_barriers += buffers.len();
        self.image_barriers += images.len();
        if let Some(barrier) = images.last() {
            self.last_image_usage = Some((barrier.usage.start, barrier.usage.end));
        }
    }
}

fn storage_image() -> Arc<Image> {
    Image::new(&ImageDescriptor {
        label: Some("gbuffer".into()),
        mip_level_count: 4,
        array_layer_count: 1,
        aspects: ImageAspects::COLOR,
        initial_layout: ImageLayout::Undefined,
    })
}

fn general_write() -> AccessState {
    AccessState {
        access: AccessFlags::SHADER_STORAGE_WRITE,
        stage: StageFlags::COMPUTE_SHADER,
        layout: ImageLayout::General,
    }
}

fn sampled_read() -> AccessState {
    AccessState {
        access: AccessFlags::SHADER_SAMPLED_READ,
        stage: StageFlags::FRAGMENT_SHADER,
        layout: ImageLayout::ShaderReadOnly,
    }
}

#[test]
fn write_then_sampled_read_then_stable() {
    let mut sink = CountingSink::default();
    let image = storage_image();
    let ctx = ContextId(0);
    let mip0 = ImageSubresourceRange {
        mip_level_count: Some(1),
        array_layer_count: Some(1),
        ..image.full_range()
    };

    // Compute pass writes mip 0 in general layout.
    let mut encoder = BarrierEncoder::new(ctx);
    encoder.image_usage(&image, mip0, general_write(), None);
    encoder.record(&mut sink).commit();

    // Later draw samples the same subresource: layout change, barrier.
    let calls_before = sink.calls;
    let mut encoder = BarrierEncoder::new(ctx);
    encoder.image_usage(&image, mip0, sampled_read(), None);
    encoder.record(&mut sink).commit();
    assert_eq!(sink.calls, calls_before + 1);
    let (src, dst) = sink.last_image_usage.unwrap();
    assert_eq!(src.layout, ImageLayout::General);
    assert_eq!(dst.layout, ImageLayout::ShaderReadOnly);

    // A further same-layout sampled read is already ordered: no call.
    let calls_before = sink.calls;
    let mut encoder = BarrierEncoder::new(ctx);
    encoder.image_usage(&image, mip0, sampled_read(), None);
    assert!(encoder.is_empty());
    encoder.record(&mut sink).commit();
    assert_eq!(sink.calls, calls_before);
}

#[test]
fn one_batch_one_call_many_resources() {
    let mut sink = CountingSink::default();
    let ctx = ContextId(0);
    let image = storage_image();
    let vertices = Buffer::new(&BufferDescriptor {
        label: Some("vertices".into()),
        size: 4096,
    });
    let indices = Buffer::new(&BufferDescriptor {
        label: Some("indices".into()),
        size: 1024,
    });

    let mut encoder = BarrierEncoder::new(ctx);
    encoder.buffer_usage(
        &vertices,
        BufferRange::FULL,
        AccessState {
            access: AccessFlags::VERTEX_ATTRIBUTE_READ,
            stage: StageFlags::VERTEX_INPUT,
            layout: ImageLayout::Undefined,
        },
        None,
    );
    encoder.buffer_usage(
        &indices,
        BufferRange::FULL,
        AccessState {
            access: AccessFlags::INDEX_READ,
            stage: StageFlags::VERTEX_INPUT,
            layout: ImageLayout::Undefined,
        },
        None,
    );
    encoder.image_usage(&image, image.full_range(), sampled_read(), None);
    encoder.record(&mut sink).commit();

    // Three resources, four mips, exactly one batched command.
    assert_eq!(sink.calls, 1);
    assert_eq!(sink.buffer_barriers, 2);
    assert_eq!(sink.image_barriers, 1);
}

#[test]
fn registry_survives_resource_destruction() {
    let registry = Registry::new();
    let buffer = Buffer::new(&BufferDescriptor {
        label: None,
        size: 128,
    });
    registry.register_buffer(&buffer);
    let key = buffer.key(BufferRange::FULL);
    let id = buffer.unique_id();

    assert!(registry.query_buffer(ContextId(0), &key).is_ok());
    drop(buffer);
    assert_eq!(
        registry.buffer(id).err(),
        Some(InvalidId::Buffer(id)),
    );

    // A new buffer never reuses the id.
    let other = Buffer::new(&BufferDescriptor {
        label: None,
        size: 128,
    });
    assert_ne!(other.unique_id(), id);

    let image = storage_image();
    registry.register_image(&image);
    assert!(registry.image(image.unique_id()).is_ok());
}

#[test]
fn per_frame_contexts_stay_isolated() {
    let mut sink = CountingSink::default();
    let image = storage_image();
    let frame_a = ContextId(0);
    let frame_b = ContextId(1);

    let mut encoder = BarrierEncoder::new(frame_a);
    encoder.image_usage(&image, image.full_range(), general_write(), None);
    encoder.record(&mut sink).commit();

    // Frame B reports the lazily-initialized creation state.
    let states = image.query(frame_b, &image.full_range());
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].state.write.layout, ImageLayout::Undefined);
    assert_eq!(states[0].state.write.access, AccessFlags::empty());
}
