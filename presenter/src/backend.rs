//! Traits and types for the native graphics services a [`Presenter`](crate::Presenter)
//! drives.
//!
//! A backend bundles the device/factory, the single shared command queue, the command list
//! recorded on it and the window system. The presenter never creates any of these itself.

use crate::{
    window::{PhysicalSize, WindowSystem},
    Result,
};
use bitflags::bitflags;
use derive_more::Display;
use std::fmt;

#[cfg(target_os = "windows")]
pub mod d3d12;
pub mod software;

/// Buffer count of every swap chain created for a surface.
pub const SWAP_CHAIN_BUFFER_COUNT: u32 = 2;

pub trait Backend: 'static + Sized {
    /// Opaque OS window reference, owned by the caller.
    type Window: Copy + fmt::Debug;
    type SwapChain: SwapChain<Self>;
    /// A GPU resource. Dropping it releases the reference.
    type Resource: fmt::Debug;
    type DescriptorHeap: fmt::Debug;
    type Device: Device<Self>;
    type Queue: CommandQueue<Self>;
    type CommandList: CommandList<Self>;
    type WindowSystem: WindowSystem<Self>;
}

/// The device/factory and view creation services.
pub trait Device<B: Backend> {
    /// Create a non shader-visible descriptor heap holding `capacity` descriptors of `kind`.
    fn create_descriptor_heap(&self, kind: DescriptorKind, capacity: u32)
        -> Result<B::DescriptorHeap>;

    /// CPU location of the first descriptor in `heap`.
    fn descriptor_heap_start(&self, heap: &B::DescriptorHeap) -> CpuDescriptor;

    /// Distance in bytes between two descriptors of `kind`.
    fn descriptor_stride(&self, kind: DescriptorKind) -> u32;

    /// Create a swap chain for `window` presenting from `queue`.
    fn create_swap_chain(
        &self,
        queue: &B::Queue,
        window: B::Window,
        desc: &SwapChainDesc,
    ) -> Result<B::SwapChain>;

    /// Describe a two-dimensional texture resource.
    fn texture_desc(&self, resource: &B::Resource) -> Result<TextureDesc>;

    /// Create a committed texture in device-local memory.
    fn create_texture(&self, desc: &TextureDesc, initial_state: ResourceState)
        -> Result<B::Resource>;

    /// Write a render-target view of `resource` into `location`.
    fn create_render_target_view(
        &self,
        resource: &B::Resource,
        location: CpuDescriptor,
    ) -> Result<()>;

    /// Write a depth-stencil view of `resource` into `location`.
    fn create_depth_stencil_view(
        &self,
        resource: &B::Resource,
        location: CpuDescriptor,
    ) -> Result<()>;
}

pub trait SwapChain<B: Backend> {
    /// Get a new reference to buffer `index`.
    fn buffer(&self, index: u32) -> Result<B::Resource>;

    /// Resize every buffer in place, keeping buffer count, format and flags.
    ///
    /// Fails while any buffer reference obtained through [`SwapChain::buffer`] is alive.
    fn resize_buffers(&mut self, size: PhysicalSize<u32>) -> Result<()>;

    /// Present the current back buffer with no sync interval and no flags.
    fn present(&mut self) -> Result<()>;
}

/// The single shared queue with its one reusable allocator/list pair.
pub trait CommandQueue<B: Backend> {
    /// Reset the allocator and the command list and return the list, open for recording.
    fn begin(&mut self) -> Result<&mut B::CommandList>;

    /// Close the command list and execute it.
    fn submit(&mut self) -> Result<()>;

    /// Block until all work submitted to the queue has completed.
    fn wait_idle(&mut self) -> Result<()>;
}

/// Recording methods of a command list. Recording errors surface from
/// [`CommandQueue::submit`].
pub trait CommandList<B: Backend> {
    fn clear_render_target(&mut self, view: CpuDescriptor, rgba: [f32; 4]);

    /// Clear both the depth and stencil aspects of `view`.
    fn clear_depth_stencil(&mut self, view: CpuDescriptor, depth: f32, stencil: u8);

    /// Record a batch of resource-state transitions.
    fn barrier(&mut self, transitions: &[Transition<'_, B>]);

    /// Resolve multisampled `src` into `dst`, interpreting both as `format`.
    fn resolve(&mut self, dst: &B::Resource, src: &B::Resource, format: Format);

    fn copy(&mut self, dst: &B::Resource, src: &B::Resource);
}

#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash)]
#[must_use]
pub enum DescriptorKind {
    #[display(fmt = "render target")]
    RenderTarget,
    #[display(fmt = "depth stencil")]
    DepthStencil,
}

/// A CPU descriptor location, heap start plus `slot * stride`.
#[derive(Default, Debug, Display, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display(fmt = "{:#x}", _0)]
#[must_use]
pub struct CpuDescriptor(pub usize);

impl CpuDescriptor {
    #[inline]
    pub const fn offset(self, bytes: usize) -> Self {
        Self(self.0 + bytes)
    }
}

#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash)]
#[must_use]
pub enum Format {
    #[display(fmt = "R8G8B8A8_UNORM")]
    Rgba8Unorm,
    #[display(fmt = "R8G8B8A8_UNORM_SRGB")]
    Rgba8UnormSrgb,
    #[display(fmt = "D24_UNORM_S8_UINT")]
    D24UnormS8Uint,
}

impl Format {
    #[inline]
    #[must_use]
    pub const fn is_depth_stencil(self) -> bool {
        matches!(self, Self::D24UnormS8Uint)
    }

    /// Whether `self` and `other` share a memory layout and may be reinterpreted as each other.
    #[inline]
    #[must_use]
    pub const fn is_compatible(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Rgba8Unorm | Self::Rgba8UnormSrgb, Self::Rgba8Unorm | Self::Rgba8UnormSrgb)
                | (Self::D24UnormS8Uint, Self::D24UnormS8Uint)
        )
    }
}

bitflags! {
    /// Resource usage states. Bit values match the native state bits.
    #[derive(Default)]
    pub struct ResourceState: u32 {
        const COMMON = 0;
        const PRESENT = 0;
        const RENDER_TARGET = 0x4;
        const DEPTH_WRITE = 0x10;
        const DEPTH_READ = 0x20;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
        const RESOLVE_DEST = 0x1000;
        const RESOLVE_SOURCE = 0x2000;
    }
}

bitflags! {
    #[derive(Default)]
    pub struct TextureUsage: u32 {
        const RENDER_TARGET = 0x1;
        const DEPTH_STENCIL = 0x2;
    }
}

/// Description of a two-dimensional, single mip, single layer texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[must_use]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub sample_count: u32,
    pub usage: TextureUsage,
}

impl TextureDesc {
    #[inline]
    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.width, self.height)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[must_use]
pub enum SwapEffect {
    /// Flip-model presentation, previous contents discarded.
    FlipDiscard,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[must_use]
pub struct SwapChainDesc {
    pub size: PhysicalSize<u32>,
    pub format: Format,
    pub buffer_count: u32,
    pub sample_count: u32,
    pub swap_effect: SwapEffect,
    pub windowed: bool,
    pub flags: u32,
}

impl SwapChainDesc {
    /// The swap chain every surface is created with: double-buffered 8-bit RGBA, single-sampled,
    /// windowed, flip-discard.
    pub fn surface(size: PhysicalSize<u32>) -> Self {
        Self {
            size,
            format: Format::Rgba8Unorm,
            buffer_count: SWAP_CHAIN_BUFFER_COUNT,
            sample_count: 1,
            swap_effect: SwapEffect::FlipDiscard,
            windowed: true,
            flags: 0,
        }
    }
}

/// A resource-state transition of one whole resource.
pub struct Transition<'a, B: Backend> {
    pub resource: &'a B::Resource,
    pub before: ResourceState,
    pub after: ResourceState,
}

impl<'a, B: Backend> Transition<'a, B> {
    #[inline]
    pub fn new(resource: &'a B::Resource, before: ResourceState, after: ResourceState) -> Self {
        Self {
            resource,
            before,
            after,
        }
    }

    /// The transition restoring the `before` state.
    #[inline]
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            resource: self.resource,
            before: self.after,
            after: self.before,
        }
    }
}

impl<B: Backend> Clone for Transition<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for Transition<'_, B> {}

impl<B: Backend> fmt::Debug for Transition<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("resource", self.resource)
            .field("before", &self.before)
            .field("after", &self.after)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_compatibility() {
        assert!(Format::Rgba8Unorm.is_compatible(Format::Rgba8UnormSrgb));
        assert!(Format::Rgba8UnormSrgb.is_compatible(Format::Rgba8Unorm));
        assert!(!Format::Rgba8Unorm.is_compatible(Format::D24UnormS8Uint));
        assert!(Format::D24UnormS8Uint.is_depth_stencil());
    }

    #[test]
    fn surface_swap_chain_desc() {
        let desc = SwapChainDesc::surface(PhysicalSize::new(800, 600));
        assert_eq!(desc.buffer_count, 2);
        assert_eq!(desc.format, Format::Rgba8Unorm);
        assert_eq!(desc.sample_count, 1);
        assert_eq!(desc.swap_effect, SwapEffect::FlipDiscard);
        assert_eq!(desc.flags, 0);
    }

    #[test]
    fn resource_state_bits() {
        assert_eq!(ResourceState::PRESENT.bits(), 0);
        assert_eq!(
            (ResourceState::DEPTH_WRITE | ResourceState::DEPTH_READ).bits(),
            0x30
        );
    }
}
