/*! This library describes the accesses, execution stages and sub-ranges
 *  that the hazard tracker reasons about, agnostic of any tracking logic
 *  or backend.
 */

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![allow(
    // We don't use syntax sugar where it's not necessary.
    clippy::match_like_matches_macro,
)]
#![warn(missing_docs, unsafe_op_in_unsafe_fn)]

use std::num::NonZeroU64;
use std::ops::Range;

pub mod assertions;

// Plainly deriving Serialize/Deserialize on a bitflags type would go
// through the struct wrapper; serializing the raw bits keeps the format
// stable and lets unknown bits round-trip instead of failing to parse.
macro_rules! impl_bitflags {
    ($name:ident) => {
        #[cfg(feature = "serde")]
        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.bits().serialize(serializer)
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<$name, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value = <_ as serde::Deserialize<'de>>::deserialize(deserializer)?;
                Ok($name::from_bits_retain(value))
            }
        }

        impl $name {
            /// Returns true if the bitflags contains bits that are not part of
            /// the bitflags definition.
            pub fn contains_invalid_bits(&self) -> bool {
                let all = Self::all().bits();
                (self.bits() | all) != all
            }
        }
    };
}

/// Integer type used for byte addresses and byte sizes of buffers.
pub type BufferAddress = u64;
/// Integer type used for non-zero buffer sizes.
pub type BufferSize = NonZeroU64;

bitflags::bitflags! {
    /// The kinds of memory access an operation performs on a resource.
    ///
    /// A single value may combine several accesses; it may also be both a
    /// read and a write (e.g. `SHADER_STORAGE_READ | SHADER_STORAGE_WRITE`
    /// for a read-modify-write storage binding).
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u64 {
        /// Read of an indirect command structure during an indirect
        /// draw/dispatch.
        const INDIRECT_COMMAND_READ = 1 << 0;
        /// Index buffer read during an indexed draw.
        const INDEX_READ = 1 << 1;
        /// Vertex buffer read during a draw.
        const VERTEX_ATTRIBUTE_READ = 1 << 2;
        /// Uniform buffer read in any shader stage.
        const UNIFORM_READ = 1 << 3;
        /// Input attachment read within a render pass.
        const INPUT_ATTACHMENT_READ = 1 << 4;
        /// Sampled image read in any shader stage.
        const SHADER_SAMPLED_READ = 1 << 5;
        /// Storage buffer/image read in any shader stage.
        const SHADER_STORAGE_READ = 1 << 6;
        /// Color attachment read (blending, logic ops).
        const COLOR_ATTACHMENT_READ = 1 << 7;
        /// Depth/stencil attachment read (depth/stencil tests).
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 8;
        /// Source of a copy/blit/resolve operation.
        const TRANSFER_READ = 1 << 9;
        /// Host read through mapped memory.
        const HOST_READ = 1 << 10;
        /// Catch-all read access.
        const MEMORY_READ = 1 << 11;

        /// Storage buffer/image write in any shader stage.
        const SHADER_STORAGE_WRITE = 1 << 16;
        /// Color attachment write.
        const COLOR_ATTACHMENT_WRITE = 1 << 17;
        /// Depth/stencil attachment write.
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 18;
        /// Destination of a copy/blit/resolve/fill operation.
        const TRANSFER_WRITE = 1 << 19;
        /// Host write through mapped memory.
        const HOST_WRITE = 1 << 20;
        /// Catch-all write access.
        const MEMORY_WRITE = 1 << 21;

        /// The set of accesses classified as reads.
        const READ_ALL = Self::INDIRECT_COMMAND_READ.bits()
            | Self::INDEX_READ.bits()
            | Self::VERTEX_ATTRIBUTE_READ.bits()
            | Self::UNIFORM_READ.bits()
            | Self::INPUT_ATTACHMENT_READ.bits()
            | Self::SHADER_SAMPLED_READ.bits()
            | Self::SHADER_STORAGE_READ.bits()
            | Self::COLOR_ATTACHMENT_READ.bits()
            | Self::DEPTH_STENCIL_ATTACHMENT_READ.bits()
            | Self::TRANSFER_READ.bits()
            | Self::HOST_READ.bits()
            | Self::MEMORY_READ.bits();

        /// The set of accesses classified as writes.
        const WRITE_ALL = Self::SHADER_STORAGE_WRITE.bits()
            | Self::COLOR_ATTACHMENT_WRITE.bits()
            | Self::DEPTH_STENCIL_ATTACHMENT_WRITE.bits()
            | Self::TRANSFER_WRITE.bits()
            | Self::HOST_WRITE.bits()
            | Self::MEMORY_WRITE.bits();
    }
}

impl_bitflags!(AccessFlags);

impl AccessFlags {
    /// Returns true if any of the accesses is a read.
    pub fn is_read(self) -> bool {
        self.intersects(Self::READ_ALL)
    }

    /// Returns true if any of the accesses is a write.
    pub fn is_write(self) -> bool {
        self.intersects(Self::WRITE_ALL)
    }

    /// Returns true if the accesses read and never write.
    ///
    /// An empty value is not read-only: it carries no visibility at all.
    pub fn is_read_only(self) -> bool {
        self.is_read() && !self.is_write()
    }
}

bitflags::bitflags! {
    /// The pipeline execution stages an access happens at.
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct StageFlags: u64 {
        /// Indirect command fetch.
        const DRAW_INDIRECT = 1 << 0;
        /// Index/vertex buffer fetch.
        const VERTEX_INPUT = 1 << 1;
        /// Vertex shader execution.
        const VERTEX_SHADER = 1 << 2;
        /// Fragment shader execution.
        const FRAGMENT_SHADER = 1 << 3;
        /// Depth/stencil tests before fragment shading.
        const EARLY_FRAGMENT_TESTS = 1 << 4;
        /// Depth/stencil tests after fragment shading.
        const LATE_FRAGMENT_TESTS = 1 << 5;
        /// Color attachment output, including blending.
        const COLOR_ATTACHMENT_OUTPUT = 1 << 6;
        /// Compute shader execution.
        const COMPUTE_SHADER = 1 << 7;
        /// Copy/blit/resolve/fill execution.
        const TRANSFER = 1 << 8;
        /// Host access to mapped memory.
        const HOST = 1 << 9;
        /// All graphics stages.
        const ALL_GRAPHICS = 1 << 10;
        /// Every stage of the pipeline.
        const ALL_COMMANDS = 1 << 11;
    }
}

impl_bitflags!(StageFlags);

/// The arrangement tag of an image's memory.
///
/// Some access kinds require a specific layout; any change of layout
/// forces a barrier carrying the transition.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ImageLayout {
    /// Contents undefined; transitioning away discards them.
    #[default]
    Undefined,
    /// Host-written initial contents, preserved by the first transition.
    Preinitialized,
    /// Usable by every access kind, never optimal.
    General,
    /// Color attachment output.
    ColorAttachment,
    /// Depth/stencil attachment output.
    DepthStencilAttachment,
    /// Depth/stencil reads (tests and shader sampling).
    DepthStencilReadOnly,
    /// Sampled/input-attachment reads.
    ShaderReadOnly,
    /// Source of a transfer operation.
    TransferSrc,
    /// Destination of a transfer operation.
    TransferDst,
    /// Handed to the presentation engine.
    Present,
}

bitflags::bitflags! {
    /// The planes of an image that a sub-range addresses.
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ImageAspects: u32 {
        /// The color plane.
        const COLOR = 1 << 0;
        /// The depth plane.
        const DEPTH = 1 << 1;
        /// The stencil plane.
        const STENCIL = 1 << 2;
    }
}

impl_bitflags!(ImageAspects);

impl Default for ImageAspects {
    fn default() -> Self {
        Self::COLOR
    }
}

/// A byte range of a buffer.
///
/// `size == None` addresses everything from `offset` to the end of the
/// buffer; the tracker resolves it against the real buffer size before
/// any bookkeeping happens.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferRange {
    /// First byte addressed.
    pub offset: BufferAddress,
    /// Number of bytes addressed, or `None` for the rest of the buffer.
    pub size: Option<BufferSize>,
}

impl BufferRange {
    /// The whole buffer.
    pub const FULL: Self = Self {
        offset: 0,
        size: None,
    };

    /// A range of `size` bytes starting at `offset`.
    pub fn sized(offset: BufferAddress, size: BufferAddress) -> Self {
        Self {
            offset,
            size: BufferSize::new(size),
        }
    }

    /// Resolves the range against the real size of the buffer.
    ///
    /// The caller must guarantee `offset <= buffer_size` and that a
    /// concrete `size` does not reach past the end.
    pub fn resolve(&self, buffer_size: BufferAddress) -> Range<BufferAddress> {
        let end = match self.size {
            Some(size) => self.offset + size.get(),
            None => buffer_size,
        };
        self.offset..end
    }
}

/// A sub-rectangle of an image's (mip level, array layer) state space.
///
/// `None` counts address everything from the base to the end of the
/// respective axis, resolved against the real image before bookkeeping.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageSubresourceRange {
    /// Planes addressed.
    pub aspects: ImageAspects,
    /// First mip level addressed.
    pub base_mip_level: u32,
    /// Number of mip levels addressed, or `None` for the rest of the chain.
    pub mip_level_count: Option<u32>,
    /// First array layer addressed.
    pub base_array_layer: u32,
    /// Number of array layers addressed, or `None` for the rest of the array.
    pub array_layer_count: Option<u32>,
}

impl Default for ImageSubresourceRange {
    fn default() -> Self {
        Self {
            aspects: ImageAspects::COLOR,
            base_mip_level: 0,
            mip_level_count: None,
            base_array_layer: 0,
            array_layer_count: None,
        }
    }
}

impl ImageSubresourceRange {
    /// Returns the mip level interval addressed, given the image's real
    /// mip level count.
    pub fn mip_range(&self, mip_level_count: u32) -> Range<u32> {
        let end = match self.mip_level_count {
            Some(count) => self.base_mip_level + count,
            None => mip_level_count,
        };
        self.base_mip_level..end
    }

    /// Returns the array layer interval addressed, given the image's real
    /// array layer count.
    pub fn layer_range(&self, array_layer_count: u32) -> Range<u32> {
        let end = match self.array_layer_count {
            Some(count) => self.base_array_layer + count,
            None => array_layer_count,
        };
        self.base_array_layer..end
    }
}

/// Describes a buffer whose accesses are tracked.
#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferDescriptor<L> {
    /// Debug label, shown in logs and graphics debuggers.
    pub label: L,
    /// Size in bytes.
    pub size: BufferAddress,
}

impl<L> BufferDescriptor<L> {
    /// Takes a closure and maps the label of the buffer descriptor into another.
    pub fn map_label<K>(&self, fun: impl FnOnce(&L) -> K) -> BufferDescriptor<K> {
        BufferDescriptor {
            label: fun(&self.label),
            size: self.size,
        }
    }
}

/// Describes an image whose accesses are tracked.
#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageDescriptor<L> {
    /// Debug label, shown in logs and graphics debuggers.
    pub label: L,
    /// Number of mip levels.
    pub mip_level_count: u32,
    /// Number of array layers.
    pub array_layer_count: u32,
    /// Planes the image carries.
    pub aspects: ImageAspects,
    /// Layout the image memory is created in.
    pub initial_layout: ImageLayout,
}

impl<L> ImageDescriptor<L> {
    /// Takes a closure and maps the label of the image descriptor into another.
    pub fn map_label<K>(&self, fun: impl FnOnce(&L) -> K) -> ImageDescriptor<K> {
        ImageDescriptor {
            label: fun(&self.label),
            mip_level_count: self.mip_level_count,
            array_layer_count: self.array_layer_count,
            aspects: self.aspects,
            initial_layout: self.initial_layout,
        }
    }
}
