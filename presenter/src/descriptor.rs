//! Descriptor slots and the heaps they address.

use crate::{
    backend::{Backend, CpuDescriptor, DescriptorKind, Device},
    config::Config,
    Error, Result,
};
use derive_more::{Display, Into};
use std::fmt;

/// Index of a descriptor inside one of the presenter's heaps.
#[derive(Debug, Display, Into, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct Slot(u32);

impl Slot {
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// A capacity-bounded, monotonically increasing pool of slots. Slots are never recycled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub(crate) struct SlotPool {
    kind: DescriptorKind,
    next: u32,
    capacity: u32,
}

impl SlotPool {
    pub(crate) const fn new(kind: DescriptorKind, capacity: u32) -> Self {
        Self {
            kind,
            next: 0,
            capacity,
        }
    }

    pub(crate) fn allocate(&mut self) -> Result<Slot> {
        self.ensure_available()?;
        let slot = Slot(self.next);
        self.next += 1;
        Ok(slot)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.next >= self.capacity {
            return Err(Error::SlotsExhausted {
                kind: self.kind,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    #[inline]
    pub(crate) const fn allocated(&self) -> u32 {
        self.next
    }
}

/// Hands out render-target and depth-stencil slots from two separate pools.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub(crate) struct DescriptorSlots {
    color: SlotPool,
    depth: SlotPool,
}

impl DescriptorSlots {
    pub(crate) const fn new(color_capacity: u32, depth_capacity: u32) -> Self {
        Self {
            color: SlotPool::new(DescriptorKind::RenderTarget, color_capacity),
            depth: SlotPool::new(DescriptorKind::DepthStencil, depth_capacity),
        }
    }

    pub(crate) fn from_config(config: &Config) -> Self {
        Self::new(config.color_slots, config.depth_slots)
    }

    pub(crate) fn allocate(&mut self, kind: DescriptorKind) -> Result<Slot> {
        self.pool_mut(kind).allocate()
    }

    /// Allocate a color slot and, if `depth`, a depth slot. Nothing is consumed unless every
    /// requested slot is available.
    pub(crate) fn allocate_surface(&mut self, depth: bool) -> Result<(Slot, Option<Slot>)> {
        if depth {
            self.depth.ensure_available()?;
        }
        let color = self.allocate(DescriptorKind::RenderTarget)?;
        let depth = depth
            .then(|| self.allocate(DescriptorKind::DepthStencil))
            .transpose()?;
        Ok((color, depth))
    }

    /// Number of slots handed out so far from the `kind` pool.
    pub(crate) const fn allocated(&self, kind: DescriptorKind) -> u32 {
        match kind {
            DescriptorKind::RenderTarget => self.color.allocated(),
            DescriptorKind::DepthStencil => self.depth.allocated(),
        }
    }

    fn pool_mut(&mut self, kind: DescriptorKind) -> &mut SlotPool {
        match kind {
            DescriptorKind::RenderTarget => &mut self.color,
            DescriptorKind::DepthStencil => &mut self.depth,
        }
    }
}

/// A native descriptor heap together with the values needed to address a slot inside it.
pub(crate) struct DescriptorHeap<B: Backend> {
    kind: DescriptorKind,
    start: CpuDescriptor,
    stride: u32,
    _heap: B::DescriptorHeap,
}

impl<B: Backend> DescriptorHeap<B> {
    pub(crate) fn create(device: &B::Device, kind: DescriptorKind, capacity: u32) -> Result<Self> {
        tracing::debug!("creating {kind} descriptor heap, capacity: {capacity}");

        let heap = device.create_descriptor_heap(kind, capacity)?;
        let start = device.descriptor_heap_start(&heap);
        let stride = device.descriptor_stride(kind);

        tracing::debug!("created {kind} descriptor heap successfully, start: {start}, stride: {stride}");

        Ok(Self {
            kind,
            start,
            stride,
            _heap: heap,
        })
    }

    /// The location of `slot` inside this heap.
    #[inline]
    pub(crate) fn location(&self, slot: Slot) -> CpuDescriptor {
        self.start
            .offset(slot.index() as usize * self.stride as usize)
    }
}

impl<B: Backend> fmt::Debug for DescriptorHeap<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorHeap")
            .field("kind", &self.kind)
            .field("start", &self.start)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::{Software, SoftwareDevice};

    #[test]
    fn slots_are_monotonic_per_pool() {
        let mut slots = DescriptorSlots::new(4, 2);
        let color = [DescriptorKind::RenderTarget; 3]
            .map(|kind| slots.allocate(kind).expect("valid color slot").index());
        let depth = slots
            .allocate(DescriptorKind::DepthStencil)
            .expect("valid depth slot");
        assert_eq!(color, [0, 1, 2]);
        assert_eq!(depth.index(), 0);
        assert_eq!(slots.allocated(DescriptorKind::RenderTarget), 3);
        assert_eq!(slots.allocated(DescriptorKind::DepthStencil), 1);
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut slots = DescriptorSlots::new(1, 1);
        slots
            .allocate(DescriptorKind::DepthStencil)
            .expect("valid depth slot");
        let err = slots
            .allocate(DescriptorKind::DepthStencil)
            .expect_err("depth pool is exhausted");
        assert!(matches!(
            err,
            Error::SlotsExhausted {
                kind: DescriptorKind::DepthStencil,
                capacity: 1
            }
        ));
        // The other pool is unaffected.
        slots
            .allocate(DescriptorKind::RenderTarget)
            .expect("valid color slot");
    }

    #[test]
    fn surface_allocation_is_all_or_nothing() {
        let mut slots = DescriptorSlots::new(3, 1);
        let (color, depth) = slots.allocate_surface(true).expect("valid slots");
        assert_eq!((color.index(), depth.map(Slot::index)), (0, Some(0)));

        slots
            .allocate_surface(true)
            .expect_err("depth pool is exhausted");
        assert_eq!(slots.allocated(DescriptorKind::RenderTarget), 1);

        let (color, depth) = slots.allocate_surface(false).expect("valid slots");
        assert_eq!((color.index(), depth), (1, None));
    }

    #[test]
    fn location_is_slot_times_stride() {
        let device = SoftwareDevice::new();
        let heap = DescriptorHeap::<Software>::create(&device, DescriptorKind::RenderTarget, 8)
            .expect("valid heap");
        let stride = device.descriptor_stride(DescriptorKind::RenderTarget) as usize;
        let start = device.descriptor_heap_start(&heap._heap);
        assert_eq!(heap.location(Slot(0)), start);
        assert_eq!(heap.location(Slot(5)), start.offset(5 * stride));
    }
}
