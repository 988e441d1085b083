//! The presentation pipeline: surface lifecycle, clears and flips.

use crate::{
    attachment::{self, Built},
    backend::{
        Backend, CommandList, DescriptorKind, Device, Format, ResourceState, SwapChain,
        SwapChainDesc, Transition, SWAP_CHAIN_BUFFER_COUNT,
    },
    config::Config,
    descriptor::{DescriptorHeap, DescriptorSlots},
    presenter_bail,
    registry::SurfaceRegistry,
    submit::Submitter,
    surface::{Surface, SurfaceId, SurfaceInfo},
    window::{PhysicalSize, WindowSystem},
    Result,
};
use anyhow::Context;
use std::fmt;

/// Format the multisampled color attachment is resolved as when presenting.
const RESOLVE_FORMAT: Format = Format::Rgba8UnormSrgb;

/// The render size selected by the last [`Presenter::bind`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub struct ActiveTarget {
    pub surface: SurfaceId,
    pub size: PhysicalSize<u32>,
    /// Whether depth was requested and the surface has a depth attachment.
    pub depth: bool,
}

/// Manages on-screen presentation surfaces for a wrapped device.
///
/// Every operation taking a [`SurfaceId`] is a no-op for [`SurfaceId::NULL`] and for ids that
/// are not registered. Failures are logged and reported through the return value; nothing is
/// retried.
///
/// Clears and flips record on the single shared queue and block until the GPU is idle, so
/// calls must be serialized by the caller. `&mut self` enforces this within a thread.
pub struct Presenter<B: Backend> {
    config: Config,
    surfaces: SurfaceRegistry<B>,
    rtv_heap: DescriptorHeap<B>,
    dsv_heap: DescriptorHeap<B>,
    slots: DescriptorSlots,
    active: Option<ActiveTarget>,
    submitter: Submitter<B>,
    windows: B::WindowSystem,
    device: B::Device,
}

impl<B: Backend> Presenter<B> {
    /// Create the render-target and depth-stencil descriptor heaps surfaces are addressed in.
    pub fn new(
        device: B::Device,
        queue: B::Queue,
        windows: B::WindowSystem,
        config: Config,
    ) -> Result<Self> {
        tracing::debug!(
            "creating presenter, color slots: {}, depth slots: {}",
            config.color_slots,
            config.depth_slots
        );

        let rtv_heap =
            DescriptorHeap::create(&device, DescriptorKind::RenderTarget, config.color_slots)
                .context("failed to create render target descriptor heap")?;
        let dsv_heap =
            DescriptorHeap::create(&device, DescriptorKind::DepthStencil, config.depth_slots)
                .context("failed to create depth stencil descriptor heap")?;
        let slots = DescriptorSlots::from_config(&config);

        tracing::debug!("created presenter successfully");

        Ok(Self {
            config,
            surfaces: SurfaceRegistry::default(),
            rtv_heap,
            dsv_heap,
            slots,
            active: None,
            submitter: Submitter::new(queue),
            windows,
            device,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    #[inline]
    pub fn windows(&self) -> &B::WindowSystem {
        &self.windows
    }

    /// Create a surface presenting to `window`, with a depth-stencil attachment if
    /// `want_depth`. Returns [`SurfaceId::NULL`] on failure.
    pub fn create_surface(&mut self, window: B::Window, want_depth: bool) -> SurfaceId {
        match self.try_create_surface(window, want_depth) {
            Ok(id) => id,
            Err(err) => {
                tracing::error!("failed to create surface for window {window:?}: {err:#}");
                SurfaceId::NULL
            }
        }
    }

    fn try_create_surface(&mut self, window: B::Window, want_depth: bool) -> Result<SurfaceId> {
        let Some(size) = self.windows.client_size(window) else {
            presenter_bail!("{window:?} does not refer to a window");
        };
        tracing::debug!(
            "creating {}x{} surface for window {window:?}, depth: {want_depth}",
            size.width,
            size.height
        );

        let swap_chain = self
            .device
            .create_swap_chain(self.submitter.queue(), window, &SwapChainDesc::surface(size))
            .context("failed to create swap chain")?;
        let buffers = [
            Some(swap_chain.buffer(0).context("failed to get buffer 0")?),
            Some(swap_chain.buffer(1).context("failed to get buffer 1")?),
        ];

        let (color_slot, depth_slot) = self.slots.allocate_surface(want_depth)?;

        let mut surface = Surface {
            buffers,
            color: None,
            depth: None,
            swap_chain: Some(swap_chain),
            window,
            color_slot,
            color_view: self.rtv_heap.location(color_slot),
            depth_slot,
            depth_view: depth_slot.map(|slot| self.dsv_heap.location(slot)),
            size,
            flip_index: 0,
        };
        if attachment::build_all(&self.device, &mut surface) == Built::Released {
            presenter_bail!("failed to create attachment views");
        }

        let id = self.surfaces.insert(surface);
        tracing::debug!(
            "created surface {id} successfully, slots in use: {} color, {} depth",
            self.slots.allocated(DescriptorKind::RenderTarget),
            self.slots.allocated(DescriptorKind::DepthStencil)
        );
        Ok(id)
    }

    /// Release every resource owned by surface `id` and forget it.
    pub fn destroy_surface(&mut self, id: SurfaceId) {
        let Some(surface) = self.surfaces.get_mut(id) else {
            tracing::trace!("destroy: no surface {id}");
            return;
        };
        tracing::debug!("destroying surface {id}");
        surface.release();
        self.surfaces.remove(id);
        if self.active.map_or(false, |active| active.surface == id) {
            self.active = None;
        }
    }

    /// Destroy every surface, in creation order.
    pub fn destroy_all(&mut self) {
        tracing::debug!("destroying {} surfaces", self.surfaces.len());
        self.surfaces.clear();
        self.active = None;
    }

    /// Resize the swap chain and attachments of surface `id` if its window's client area
    /// changed. Returns whether a change was detected, even if rebuilding then failed.
    ///
    /// A zero-sized client area, e.g. a minimized window, is recorded but nothing is rebuilt
    /// until the window has a non-zero size again.
    pub fn resize_if_needed(&mut self, id: SurfaceId) -> bool {
        let Some(surface) = self.surfaces.get_mut(id) else {
            tracing::trace!("resize: no surface {id}");
            return false;
        };
        if surface.swap_chain.is_none() {
            return false;
        }
        let Some(size) = self.windows.client_size(surface.window) else {
            tracing::trace!("resize: surface {id} has no window");
            return false;
        };
        if size == surface.size {
            return false;
        }

        tracing::debug!(
            "surface {id} resized from {}x{} to {}x{}",
            surface.size.width,
            surface.size.height,
            size.width,
            size.height
        );
        surface.size = size;

        if let Err(err) = self.submitter.wait_idle() {
            tracing::error!("failed to wait for GPU idle before resizing surface {id}: {err:#}");
            return true;
        }
        if size.is_degenerate() {
            tracing::warn!("surface {id} has a degenerate size, skipping rebuild");
            return true;
        }
        if let Err(err) = Self::rebuild(&self.device, surface, size) {
            tracing::error!("failed to resize surface {id}: {err:#}");
        }
        true
    }

    fn rebuild(device: &B::Device, surface: &mut Surface<B>, size: PhysicalSize<u32>) -> Result<()> {
        surface.release_buffers();

        let swap_chain = surface
            .swap_chain
            .as_mut()
            .context("surface has no swap chain")?;
        swap_chain
            .resize_buffers(size)
            .context("failed to resize swap chain buffers")?;
        surface.buffers = [
            Some(swap_chain.buffer(0).context("failed to get buffer 0")?),
            Some(swap_chain.buffer(1).context("failed to get buffer 1")?),
        ];
        surface.flip_index = 0;

        if attachment::build_all(device, surface) == Built::Released {
            presenter_bail!("failed to recreate attachment views");
        }
        Ok(())
    }

    /// The last known client-area size of surface `id`.
    #[must_use]
    pub fn dimensions(&self, id: SurfaceId) -> Option<PhysicalSize<u32>> {
        self.surfaces.get(id).map(|surface| surface.size)
    }

    /// Whether the window of surface `id` is visible. `false` for unknown ids.
    #[must_use]
    pub fn is_visible(&self, id: SurfaceId) -> bool {
        self.surfaces
            .get(id)
            .map_or(false, |surface| self.windows.is_visible(surface.window))
    }

    /// Clear the color attachment of surface `id` to `rgba` and wait for the GPU.
    pub fn clear_color(&mut self, id: SurfaceId, rgba: [f32; 4]) {
        let Some(surface) = self.surfaces.get(id) else {
            tracing::trace!("clear color: no surface {id}");
            return;
        };
        if surface.color.is_none() {
            tracing::trace!("clear color: surface {id} has no color attachment");
            return;
        }
        let view = surface.color_view;

        if let Err(err) = self
            .submitter
            .run_and_wait("clear color", |list| list.clear_render_target(view, rgba))
        {
            tracing::error!("failed to clear color of surface {id}: {err:#}");
        }
    }

    /// Clear the depth and stencil of surface `id` and wait for the GPU.
    pub fn clear_depth_stencil(&mut self, id: SurfaceId, depth: f32, stencil: u8) {
        let Some(surface) = self.surfaces.get(id) else {
            tracing::trace!("clear depth stencil: no surface {id}");
            return;
        };
        let (Some(_), Some(view)) = (&surface.depth, surface.depth_view) else {
            tracing::trace!("clear depth stencil: surface {id} has no depth attachment");
            return;
        };

        if let Err(err) = self.submitter.run_and_wait("clear depth stencil", |list| {
            list.clear_depth_stencil(view, depth, stencil);
        }) {
            tracing::error!("failed to clear depth stencil of surface {id}: {err:#}");
        }
    }

    /// Select surface `id` as the render target size for subsequent drawing.
    pub fn bind(&mut self, id: SurfaceId, want_depth: bool) {
        let Some(surface) = self.surfaces.get(id) else {
            tracing::trace!("bind: no surface {id}");
            return;
        };
        if surface.buffers[0].is_none() {
            tracing::trace!("bind: surface {id} has no buffers");
            return;
        }
        self.active = Some(ActiveTarget {
            surface: id,
            size: surface.size,
            depth: want_depth && surface.depth.is_some(),
        });
    }

    #[inline]
    pub fn active_target(&self) -> Option<ActiveTarget> {
        self.active
    }

    /// Present the color attachment of surface `id`.
    ///
    /// The color attachment is resolved into the current back buffer if the surface has depth,
    /// since it is multisampled then, and copied otherwise. Both resources are returned to
    /// their render-target and present states in the same submission. The flip index advances
    /// only when the present succeeds.
    pub fn flip(&mut self, id: SurfaceId) {
        let Some(surface) = self.surfaces.get_mut(id) else {
            tracing::trace!("flip: no surface {id}");
            return;
        };
        let (Some(color), Some(buffer)) = (surface.color.as_ref(), surface.back_buffer()) else {
            tracing::trace!("flip: surface {id} has nothing to present");
            return;
        };

        let resolve = surface.depth_enabled();
        let (src_state, dst_state) = if resolve {
            (ResourceState::RESOLVE_SOURCE, ResourceState::RESOLVE_DEST)
        } else {
            (ResourceState::COPY_SOURCE, ResourceState::COPY_DEST)
        };
        let to_transfer: [Transition<'_, B>; 2] = [
            Transition::new(color, ResourceState::RENDER_TARGET, src_state),
            Transition::new(buffer, ResourceState::PRESENT, dst_state),
        ];
        let to_steady = to_transfer.map(|transition| transition.inverse());

        let recorded = self.submitter.run_and_wait("flip", |list| {
            list.barrier(&to_transfer);
            if resolve {
                list.resolve(buffer, color, RESOLVE_FORMAT);
            } else {
                list.copy(buffer, color);
            }
            list.barrier(&to_steady);
        });
        if let Err(err) = recorded {
            tracing::error!("failed to submit flip of surface {id}: {err:#}");
            return;
        }

        let Some(swap_chain) = surface.swap_chain.as_mut() else {
            return;
        };
        match swap_chain.present() {
            Ok(()) => {
                surface.flip_index = (surface.flip_index + 1) % SWAP_CHAIN_BUFFER_COUNT as usize;
            }
            Err(err) => tracing::error!("failed to present surface {id}: {err:#}"),
        }
    }

    /// A snapshot of surface `id`.
    pub fn surface(&self, id: SurfaceId) -> Option<SurfaceInfo> {
        self.surfaces.get(id).map(|surface| surface.info(id))
    }

    /// Ids of every registered surface, in creation order.
    #[must_use]
    pub fn surface_ids(&self) -> Vec<SurfaceId> {
        let mut ids = self.surfaces.ids();
        ids.sort_unstable();
        ids
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of command lists submitted so far.
    #[inline]
    #[must_use]
    pub fn submissions(&self) -> u64 {
        self.submitter.submissions()
    }
}

impl<B: Backend> Drop for Presenter<B> {
    fn drop(&mut self) {
        tracing::debug!("destroying presenter");

        if let Err(err) = self.submitter.wait_idle() {
            tracing::error!("failed to wait for GPU idle: {err:#}");
        }
        // Surfaces before heaps, heaps before the device.
        self.destroy_all();
    }
}

impl<B: Backend> fmt::Debug for Presenter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Presenter")
            .field("config", &self.config)
            .field("surfaces", &self.surfaces)
            .field("rtv_heap", &self.rtv_heap)
            .field("dsv_heap", &self.dsv_heap)
            .field("slots", &self.slots)
            .field("active", &self.active)
            .field("submitter", &self.submitter)
            .finish_non_exhaustive()
    }
}
