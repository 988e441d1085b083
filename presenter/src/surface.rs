//! Presentation surfaces.

use crate::{
    backend::{Backend, CpuDescriptor},
    descriptor::Slot,
    window::PhysicalSize,
};
use derive_more::{Display, From, Into};
use std::fmt;

/// Identifies a surface. [`SurfaceId::NULL`] never refers to a surface.
#[derive(Default, Debug, Display, From, Into, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct SurfaceId(u64);

impl SurfaceId {
    /// Denotes "no surface" and is returned by a failed create.
    pub const NULL: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// A window's presentation state: swap chain, its two buffers and the attachments rendered
/// into before each flip.
///
/// Fields are declared in release order, so dropping a surface releases the buffers, then the
/// attachments, then the swap chain.
#[must_use]
pub(crate) struct Surface<B: Backend> {
    pub(crate) buffers: [Option<B::Resource>; 2],
    pub(crate) color: Option<B::Resource>,
    pub(crate) depth: Option<B::Resource>,
    pub(crate) swap_chain: Option<B::SwapChain>,
    pub(crate) window: B::Window,
    pub(crate) color_slot: Slot,
    pub(crate) color_view: CpuDescriptor,
    pub(crate) depth_slot: Option<Slot>,
    pub(crate) depth_view: Option<CpuDescriptor>,
    pub(crate) size: PhysicalSize<u32>,
    pub(crate) flip_index: usize,
}

impl<B: Backend> Surface<B> {
    #[inline]
    pub(crate) fn depth_enabled(&self) -> bool {
        self.depth_view.is_some()
    }

    /// The buffer the next flip presents.
    #[inline]
    pub(crate) fn back_buffer(&self) -> Option<&B::Resource> {
        self.buffers[self.flip_index].as_ref()
    }

    #[inline]
    pub(crate) fn release_buffers(&mut self) {
        self.buffers = [None, None];
    }

    /// Release every owned native resource, buffers first and the swap chain last.
    pub(crate) fn release(&mut self) {
        self.release_buffers();
        self.color = None;
        self.depth = None;
        self.swap_chain = None;
    }

    pub(crate) fn info(&self, id: SurfaceId) -> SurfaceInfo {
        SurfaceInfo {
            id,
            size: self.size,
            flip_index: self.flip_index,
            has_swap_chain: self.swap_chain.is_some(),
            has_back_buffer: self.back_buffer().is_some(),
            has_color: self.color.is_some(),
            has_depth: self.depth.is_some(),
            depth_enabled: self.depth_enabled(),
            color_slot: self.color_slot,
            color_view: self.color_view,
            depth_slot: self.depth_slot,
            depth_view: self.depth_view,
        }
    }
}

impl<B: Backend> Drop for Surface<B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<B: Backend> fmt::Debug for Surface<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("window", &self.window)
            .field("size", &self.size)
            .field("flip_index", &self.flip_index)
            .field("color_slot", &self.color_slot)
            .field("depth_slot", &self.depth_slot)
            .finish_non_exhaustive()
    }
}

/// A snapshot of a surface's state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub struct SurfaceInfo {
    pub id: SurfaceId,
    pub size: PhysicalSize<u32>,
    pub flip_index: usize,
    pub has_swap_chain: bool,
    pub has_back_buffer: bool,
    pub has_color: bool,
    pub has_depth: bool,
    /// Whether the surface was created with a depth-stencil attachment.
    pub depth_enabled: bool,
    pub color_slot: Slot,
    pub color_view: CpuDescriptor,
    pub depth_slot: Option<Slot>,
    pub depth_view: Option<CpuDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_id() {
        assert!(SurfaceId::NULL.is_null());
        assert!(SurfaceId::default().is_null());
        assert!(!SurfaceId::from(1).is_null());
        assert_eq!(u64::from(SurfaceId::from(7)), 7);
    }
}
