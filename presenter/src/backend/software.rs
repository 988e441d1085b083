//! A CPU model of the native presentation API.
//!
//! The software backend runs everywhere and checks the rules the native runtime enforces for
//! the calls a [`Presenter`](crate::Presenter) makes: resource states named by a barrier must
//! match the resource, copies and resolves must agree on size, sample count and format,
//! clears need a live view in a heap of the right kind, swap chains cannot be resized while
//! buffer references are held or work is in flight, and a command allocator cannot be reset
//! before the GPU is idle. Failures carry native-style status codes.
//!
//! Every created object is counted and every release is journaled, which makes the backend
//! suitable for asserting ownership and ordering in tests. [`SoftwareDevice::fail_next`]
//! injects a failure into the next matching call.

use crate::{
    backend::{
        Backend, CpuDescriptor, DescriptorKind, Device, Format, ResourceState, SwapChainDesc,
        SwapEffect, TextureDesc, TextureUsage,
    },
    window::PhysicalSize,
    Error, Result,
};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::{
    fmt,
    sync::{Arc, Weak},
};

mod queue;
mod resource;
mod swap_chain;
mod window;

pub use self::{
    queue::{SoftwareCommandList, SoftwareQueue},
    resource::{SoftwareHeap, SoftwareResource},
    swap_chain::SoftwareSwapChain,
    window::{SoftwareWindow, SoftwareWindows},
};

use self::resource::Image;

pub const DXGI_ERROR_INVALID_CALL: u32 = 0x887A_0001;
pub const DXGI_ERROR_DEVICE_REMOVED: u32 = 0x887A_0005;
pub const E_INVALIDARG: u32 = 0x8007_0057;
pub const E_OUTOFMEMORY: u32 = 0x8007_000E;

const RENDER_TARGET_STRIDE: u32 = 32;
const DEPTH_STENCIL_STRIDE: u32 = 8;
const HEAP_SPACING: usize = 0x0100_0000;
const SUPPORTED_SAMPLE_COUNTS: [u32; 4] = [1, 2, 4, 8];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Software {}

impl Backend for Software {
    type Window = SoftwareWindow;
    type SwapChain = SoftwareSwapChain;
    type Resource = SoftwareResource;
    type DescriptorHeap = SoftwareHeap;
    type Device = SoftwareDevice;
    type Queue = SoftwareQueue;
    type CommandList = SoftwareCommandList;
    type WindowSystem = SoftwareWindows;
}

/// A call that can be made to fail with [`SoftwareDevice::fail_next`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    CreateSwapChain,
    CreateTexture,
    CreateView,
    ResizeBuffers,
    Submit,
    Present,
}

/// Contents of an image, tracked as the last value written to the whole image.
#[derive(Default, Debug, Copy, Clone, PartialEq)]
pub enum Contents {
    #[default]
    Undefined,
    Color([f32; 4]),
    DepthStencil {
        depth: f32,
        stencil: u8,
    },
}

/// A journaled release of a reference to a native object.
#[allow(variant_size_differences)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Released {
    /// A reference to swap-chain buffer `n`.
    BackBuffer(u32),
    /// A committed texture of the given format.
    Texture(Format),
    SwapChain,
}

/// A buffer handed to the window by a successful present.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PresentedFrame {
    pub window: SoftwareWindow,
    pub buffer_index: u32,
    pub contents: Contents,
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub struct Stats {
    pub heaps_created: u32,
    pub live_heaps: u32,
    pub swap_chains_created: u32,
    pub live_swap_chains: u32,
    pub textures_created: u32,
    pub live_textures: u32,
    /// Buffer references handed out by swap chains and not yet dropped.
    pub live_buffer_refs: u32,
    pub submissions: u64,
    pub waits: u64,
    pub presents: u64,
}

/// Counters and logs. Nothing else is locked while the journal is held.
#[derive(Default)]
struct Journal {
    stats: Stats,
    releases: Vec<Released>,
    presented: Vec<PresentedFrame>,
}

struct HeapTable {
    kind: DescriptorKind,
    base: usize,
    capacity: u32,
    views: FnvHashMap<u32, Weak<Mutex<Image>>>,
}

impl HeapTable {
    /// Index of the descriptor at `location`, if it lies on a descriptor boundary in this heap.
    fn index_of(&self, location: CpuDescriptor) -> Option<u32> {
        let stride = stride(self.kind) as usize;
        let offset = location.0.checked_sub(self.base)?;
        let index = u32::try_from(offset / stride).ok()?;
        (offset % stride == 0 && index < self.capacity).then_some(index)
    }
}

#[derive(Debug, Copy, Clone)]
struct WindowState {
    size: PhysicalSize<u32>,
    visible: bool,
}

#[derive(Default)]
struct State {
    heaps: FnvHashMap<u64, HeapTable>,
    next_heap: u64,
    windows: FnvHashMap<u64, WindowState>,
    next_window: u64,
    faults: Vec<Fault>,
    in_flight: bool,
}

/// State shared by every object created from one device. Locks are taken in the order
/// state, image, journal.
#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    journal: Mutex<Journal>,
}

impl Shared {
    fn take_fault(&self, fault: Fault) -> bool {
        let mut state = self.state.lock();
        match state.faults.iter().position(|&pending| pending == fault) {
            Some(index) => {
                state.faults.remove(index);
                true
            }
            None => false,
        }
    }

    fn window(&self, window: SoftwareWindow) -> Option<WindowState> {
        self.state.lock().windows.get(&window.id()).copied()
    }

    fn in_flight(&self) -> bool {
        self.state.lock().in_flight
    }

    fn journal<T>(&self, f: impl FnOnce(&mut Journal) -> T) -> T {
        f(&mut self.journal.lock())
    }

    /// Resolve a descriptor location to the image whose view was last written there.
    fn view(&self, kind: DescriptorKind, location: CpuDescriptor) -> Result<Arc<Mutex<Image>>> {
        let state = self.state.lock();
        state
            .heaps
            .values()
            .filter(|table| table.kind == kind)
            .find_map(|table| {
                let index = table.index_of(location)?;
                table.views.get(&index).and_then(Weak::upgrade)
            })
            .ok_or(status("descriptor does not hold a live view", E_INVALIDARG))
    }
}

#[inline]
const fn status(context: &'static str, status: u32) -> Error {
    Error::Status { context, status }
}

const fn stride(kind: DescriptorKind) -> u32 {
    match kind {
        DescriptorKind::RenderTarget => RENDER_TARGET_STRIDE,
        DescriptorKind::DepthStencil => DEPTH_STENCIL_STRIDE,
    }
}

/// The device/factory of the software backend. Clones share the same device.
#[derive(Default, Clone)]
#[must_use]
pub struct SoftwareDevice {
    shared: Arc<Shared>,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the direct queue work for this device is submitted to.
    pub fn queue(&self) -> SoftwareQueue {
        SoftwareQueue::new(Arc::clone(&self.shared))
    }

    /// The window system windows for this device are opened on.
    pub fn windows(&self) -> SoftwareWindows {
        SoftwareWindows::new(Arc::clone(&self.shared))
    }

    /// Make the next call matching `fault` fail.
    pub fn fail_next(&self, fault: Fault) {
        self.shared.state.lock().faults.push(fault);
    }

    pub fn stats(&self) -> Stats {
        self.shared.journal(|journal| journal.stats)
    }

    /// Drain the release journal, oldest first.
    pub fn take_releases(&self) -> Vec<Released> {
        self.shared
            .journal(|journal| std::mem::take(&mut journal.releases))
    }

    /// Every frame presented so far, oldest first.
    #[must_use]
    pub fn presented(&self) -> Vec<PresentedFrame> {
        self.shared.journal(|journal| journal.presented.clone())
    }

    /// Number of descriptors of `kind` currently holding a view of a live resource.
    #[must_use]
    pub fn live_views(&self, kind: DescriptorKind) -> usize {
        let state = self.shared.state.lock();
        state
            .heaps
            .values()
            .filter(|table| table.kind == kind)
            .flat_map(|table| table.views.values())
            .filter(|view| view.strong_count() > 0)
            .count()
    }

    fn create_view(
        &self,
        kind: DescriptorKind,
        resource: &SoftwareResource,
        location: CpuDescriptor,
    ) -> Result<()> {
        if self.shared.take_fault(Fault::CreateView) {
            return Err(status("failed to create view", E_INVALIDARG));
        }

        let desc = resource.desc();
        let viewable = match kind {
            DescriptorKind::RenderTarget => {
                desc.usage.contains(TextureUsage::RENDER_TARGET) && !desc.format.is_depth_stencil()
            }
            DescriptorKind::DepthStencil => {
                desc.usage.contains(TextureUsage::DEPTH_STENCIL) && desc.format.is_depth_stencil()
            }
        };
        if !viewable {
            return Err(status("resource does not allow this view", E_INVALIDARG));
        }

        let mut state = self.shared.state.lock();
        let (index, table) = state
            .heaps
            .values_mut()
            .filter(|table| table.kind == kind)
            .find_map(|table| Some((table.index_of(location)?, table)))
            .ok_or(status("descriptor location outside every heap", E_INVALIDARG))?;
        table.views.insert(index, resource.downgrade());
        Ok(())
    }
}

impl Device<Software> for SoftwareDevice {
    fn create_descriptor_heap(&self, kind: DescriptorKind, capacity: u32) -> Result<SoftwareHeap> {
        if capacity == 0 {
            return Err(status("descriptor heap capacity must be non-zero", E_INVALIDARG));
        }

        let (id, base) = {
            let mut state = self.shared.state.lock();
            let id = state.next_heap;
            state.next_heap += 1;
            let base = HEAP_SPACING * (id as usize + 1);
            state.heaps.insert(
                id,
                HeapTable {
                    kind,
                    base,
                    capacity,
                    views: FnvHashMap::default(),
                },
            );
            (id, base)
        };
        self.shared.journal(|journal| {
            journal.stats.heaps_created += 1;
            journal.stats.live_heaps += 1;
        });

        Ok(SoftwareHeap::new(
            Arc::clone(&self.shared),
            id,
            kind,
            CpuDescriptor(base),
        ))
    }

    fn descriptor_heap_start(&self, heap: &SoftwareHeap) -> CpuDescriptor {
        heap.start()
    }

    fn descriptor_stride(&self, kind: DescriptorKind) -> u32 {
        stride(kind)
    }

    fn create_swap_chain(
        &self,
        queue: &SoftwareQueue,
        window: SoftwareWindow,
        desc: &SwapChainDesc,
    ) -> Result<SoftwareSwapChain> {
        if !queue.belongs_to(&self.shared) {
            return Err(status("queue belongs to another device", E_INVALIDARG));
        }
        if self.shared.take_fault(Fault::CreateSwapChain) {
            return Err(status("failed to create swap chain", DXGI_ERROR_INVALID_CALL));
        }
        if self.shared.window(window).is_none() {
            return Err(status("window handle is invalid", DXGI_ERROR_INVALID_CALL));
        }
        if desc.size.is_degenerate() {
            return Err(status("swap chain size is zero", DXGI_ERROR_INVALID_CALL));
        }
        if desc.swap_effect == SwapEffect::FlipDiscard
            && (desc.buffer_count < 2 || desc.sample_count != 1)
        {
            return Err(status(
                "flip model needs two single-sampled buffers",
                DXGI_ERROR_INVALID_CALL,
            ));
        }
        if desc.format.is_depth_stencil() {
            return Err(status("swap chain format is not displayable", E_INVALIDARG));
        }

        Ok(SoftwareSwapChain::new(Arc::clone(&self.shared), window, *desc))
    }

    fn texture_desc(&self, resource: &SoftwareResource) -> Result<TextureDesc> {
        Ok(resource.desc())
    }

    fn create_texture(
        &self,
        desc: &TextureDesc,
        initial_state: ResourceState,
    ) -> Result<SoftwareResource> {
        if self.shared.take_fault(Fault::CreateTexture) {
            return Err(status("failed to allocate texture", E_OUTOFMEMORY));
        }
        if desc.size().is_degenerate() {
            return Err(status("texture size is zero", E_INVALIDARG));
        }
        if !SUPPORTED_SAMPLE_COUNTS.contains(&desc.sample_count) {
            return Err(status("unsupported sample count", E_INVALIDARG));
        }
        if desc.format.is_depth_stencil() != desc.usage.contains(TextureUsage::DEPTH_STENCIL) {
            return Err(status("usage does not match format", E_INVALIDARG));
        }

        Ok(SoftwareResource::texture(
            Arc::clone(&self.shared),
            *desc,
            initial_state,
        ))
    }

    fn create_render_target_view(
        &self,
        resource: &SoftwareResource,
        location: CpuDescriptor,
    ) -> Result<()> {
        self.create_view(DescriptorKind::RenderTarget, resource, location)
    }

    fn create_depth_stencil_view(
        &self,
        resource: &SoftwareResource,
        location: CpuDescriptor,
    ) -> Result<()> {
        self.create_view(DescriptorKind::DepthStencil, resource, location)
    }
}

impl fmt::Debug for SoftwareDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareDevice")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CommandList, CommandQueue, SwapChain, Transition};

    fn texture(device: &SoftwareDevice, format: Format, samples: u32) -> SoftwareResource {
        let usage = if format.is_depth_stencil() {
            TextureUsage::DEPTH_STENCIL
        } else {
            TextureUsage::RENDER_TARGET
        };
        let desc = TextureDesc {
            width: 64,
            height: 32,
            format,
            sample_count: samples,
            usage,
        };
        device
            .create_texture(&desc, ResourceState::RENDER_TARGET)
            .expect("valid texture")
    }

    #[test]
    fn heaps_are_disjoint() {
        let device = SoftwareDevice::new();
        let rtv = device
            .create_descriptor_heap(DescriptorKind::RenderTarget, 4)
            .expect("valid heap");
        let dsv = device
            .create_descriptor_heap(DescriptorKind::DepthStencil, 4)
            .expect("valid heap");
        assert_ne!(
            device.descriptor_heap_start(&rtv),
            device.descriptor_heap_start(&dsv)
        );
        assert_eq!(device.stats().live_heaps, 2);
        drop(rtv);
        assert_eq!(device.stats().live_heaps, 1);
        let err = device
            .create_descriptor_heap(DescriptorKind::RenderTarget, 0)
            .expect_err("zero capacity");
        assert_eq!(err.status(), Some(E_INVALIDARG));
    }

    #[test]
    fn views_must_land_in_a_heap_of_the_right_kind() {
        let device = SoftwareDevice::new();
        let rtv = device
            .create_descriptor_heap(DescriptorKind::RenderTarget, 2)
            .expect("valid heap");
        let start = device.descriptor_heap_start(&rtv);
        let color = texture(&device, Format::Rgba8Unorm, 1);

        device
            .create_render_target_view(&color, start.offset(RENDER_TARGET_STRIDE as usize))
            .expect("valid view");
        assert_eq!(device.live_views(DescriptorKind::RenderTarget), 1);

        for location in [
            start.offset(1),
            start.offset(2 * RENDER_TARGET_STRIDE as usize),
        ] {
            let err = device
                .create_render_target_view(&color, location)
                .expect_err("invalid location");
            assert_eq!(err.status(), Some(E_INVALIDARG));
        }
        device
            .create_depth_stencil_view(&color, start)
            .expect_err("no depth stencil heap");

        drop(color);
        assert_eq!(device.live_views(DescriptorKind::RenderTarget), 0);
    }

    #[test]
    fn texture_validation() {
        let device = SoftwareDevice::new();
        let mut desc = TextureDesc {
            width: 8,
            height: 8,
            format: Format::D24UnormS8Uint,
            sample_count: 4,
            usage: TextureUsage::RENDER_TARGET,
        };
        assert!(device
            .create_texture(&desc, ResourceState::DEPTH_WRITE)
            .is_err());
        desc.usage = TextureUsage::DEPTH_STENCIL;
        desc.sample_count = 3;
        assert!(device
            .create_texture(&desc, ResourceState::DEPTH_WRITE)
            .is_err());
        desc.sample_count = 4;
        let depth = device
            .create_texture(&desc, ResourceState::DEPTH_WRITE)
            .expect("valid depth texture");
        assert_eq!(device.stats().live_textures, 1);

        device.fail_next(Fault::CreateTexture);
        let err = device
            .create_texture(&desc, ResourceState::DEPTH_WRITE)
            .expect_err("injected failure");
        assert_eq!(err.status(), Some(E_OUTOFMEMORY));

        drop(depth);
        assert_eq!(device.stats().live_textures, 0);
        assert_eq!(
            device.take_releases(),
            [Released::Texture(Format::D24UnormS8Uint)]
        );
    }

    #[test]
    fn swap_chain_rejects_zero_size_and_closed_windows() {
        let device = SoftwareDevice::new();
        let queue = device.queue();
        let windows = device.windows();
        let window = windows.open(PhysicalSize::new(0, 0));
        let desc = SwapChainDesc::surface(PhysicalSize::new(0, 0));
        let err = device
            .create_swap_chain(&queue, window, &desc)
            .expect_err("zero size");
        assert_eq!(err.status(), Some(DXGI_ERROR_INVALID_CALL));

        windows.close(window);
        let desc = SwapChainDesc::surface(PhysicalSize::new(4, 4));
        assert!(device.create_swap_chain(&queue, window, &desc).is_err());

        let other = SoftwareDevice::new();
        let window = windows.open(PhysicalSize::new(4, 4));
        let err = device
            .create_swap_chain(&other.queue(), window, &desc)
            .expect_err("foreign queue");
        assert_eq!(err.status(), Some(E_INVALIDARG));
        assert_eq!(device.stats().swap_chains_created, 0);
    }

    #[test]
    fn resolve_requires_matching_states_and_samples() {
        let device = SoftwareDevice::new();
        let mut queue = device.queue();
        let src = texture(&device, Format::Rgba8Unorm, 4);
        let dst = texture(&device, Format::Rgba8Unorm, 1);

        // Both resources are still render targets.
        let list = queue.begin().expect("valid list");
        list.resolve(&dst, &src, Format::Rgba8UnormSrgb);
        let err = queue.submit().expect_err("wrong states");
        assert_eq!(err.status(), Some(E_INVALIDARG));

        let transitions: [Transition<'_, Software>; 2] = [
            Transition::new(&src, ResourceState::RENDER_TARGET, ResourceState::RESOLVE_SOURCE),
            Transition::new(&dst, ResourceState::RENDER_TARGET, ResourceState::RESOLVE_DEST),
        ];
        let list = queue.begin().expect("valid list");
        list.barrier(&transitions);
        list.resolve(&dst, &src, Format::Rgba8UnormSrgb);
        list.barrier(&transitions.map(|transition| transition.inverse()));
        queue.submit().expect("valid resolve");
        queue.wait_idle().expect("idle");
        assert_eq!(src.state(), ResourceState::RENDER_TARGET);

        // A copy between different sample counts is invalid.
        let list = queue.begin().expect("valid list");
        list.barrier(&[
            Transition::new(&src, ResourceState::RENDER_TARGET, ResourceState::COPY_SOURCE),
            Transition::new(&dst, ResourceState::RENDER_TARGET, ResourceState::COPY_DEST),
        ]);
        list.copy(&dst, &src);
        assert!(queue.submit().is_err());
    }

    #[test]
    fn allocator_reset_waits_for_idle() {
        let device = SoftwareDevice::new();
        let mut queue = device.queue();
        queue.begin().expect("valid list");
        queue.submit().expect("valid submit");
        let err = queue.begin().expect_err("work in flight");
        assert_eq!(err.status(), Some(DXGI_ERROR_INVALID_CALL));
        queue.wait_idle().expect("idle");
        queue.begin().expect("valid list");

        let stats = device.stats();
        assert_eq!(stats.submissions, 1);
        assert_eq!(stats.waits, 1);
    }

    #[test]
    fn resize_needs_released_buffers() {
        let device = SoftwareDevice::new();
        let queue = device.queue();
        let window = device.windows().open(PhysicalSize::new(8, 8));
        let mut swap_chain = device
            .create_swap_chain(&queue, window, &SwapChainDesc::surface(PhysicalSize::new(8, 8)))
            .expect("valid swap chain");

        let buffer = swap_chain.buffer(1).expect("valid buffer");
        assert_eq!(device.stats().live_buffer_refs, 1);
        assert!(swap_chain.resize_buffers(PhysicalSize::new(16, 16)).is_err());
        drop(buffer);

        swap_chain
            .resize_buffers(PhysicalSize::new(16, 16))
            .expect("valid resize");
        let buffer = swap_chain.buffer(0).expect("valid buffer");
        assert_eq!(buffer.desc().size(), PhysicalSize::new(16, 16));
        assert_eq!(buffer.state(), ResourceState::PRESENT);
        assert!(swap_chain.buffer(2).is_err());
    }
}
