//! Color and depth-stencil attachments rendered into before each flip.

use crate::{
    backend::{Backend, Device, Format, ResourceState, TextureDesc, TextureUsage},
    surface::Surface,
    Result,
};
use anyhow::Context;

/// Sample count of a multisampled color attachment and of every depth attachment.
pub(crate) const MULTISAMPLE_COUNT: u32 = 4;
pub(crate) const DEPTH_FORMAT: Format = Format::D24UnormS8Uint;

/// What a build left behind on the surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub(crate) enum Built {
    /// The attachment and its view were created.
    Attached,
    /// The attachment could not be created and is left empty. The surface is otherwise intact.
    Missing,
    /// The view could not be written. Every resource the surface owned has been released.
    Released,
}

/// Recreate the color attachment of `surface` from the description of its first buffer.
pub(crate) fn build_color<B: Backend>(
    device: &B::Device,
    surface: &mut Surface<B>,
    multisampled: bool,
) -> Built {
    surface.color = None;

    let samples = if multisampled { MULTISAMPLE_COUNT } else { 1 };
    let color = match buffer_desc(device, surface).and_then(|desc| {
        let desc = TextureDesc {
            sample_count: samples,
            usage: TextureUsage::RENDER_TARGET,
            ..desc
        };
        tracing::debug!(
            "creating {}x{} color attachment, samples: {samples}",
            desc.width,
            desc.height
        );
        device.create_texture(&desc, ResourceState::RENDER_TARGET)
    }) {
        Ok(color) => color,
        Err(err) => {
            tracing::error!("failed to create color attachment: {err:#}");
            return Built::Missing;
        }
    };

    if let Err(err) = device.create_render_target_view(&color, surface.color_view) {
        tracing::error!(
            "failed to create render target view at {}: {err:#}",
            surface.color_view
        );
        drop(color);
        surface.release();
        return Built::Released;
    }
    surface.color = Some(color);

    tracing::debug!("created color attachment successfully, slot: {}", surface.color_slot);
    Built::Attached
}

/// Recreate the depth-stencil attachment of `surface`. Does nothing for surfaces created
/// without depth.
pub(crate) fn build_depth<B: Backend>(device: &B::Device, surface: &mut Surface<B>) -> Built {
    surface.depth = None;

    let Some(view) = surface.depth_view else {
        return Built::Missing;
    };

    let depth = match buffer_desc(device, surface).and_then(|desc| {
        let desc = TextureDesc {
            format: DEPTH_FORMAT,
            sample_count: MULTISAMPLE_COUNT,
            usage: TextureUsage::DEPTH_STENCIL,
            ..desc
        };
        tracing::debug!("creating {}x{} depth attachment", desc.width, desc.height);
        device.create_texture(&desc, ResourceState::DEPTH_WRITE | ResourceState::DEPTH_READ)
    }) {
        Ok(depth) => depth,
        Err(err) => {
            tracing::error!("failed to create depth attachment: {err:#}");
            return Built::Missing;
        }
    };

    if let Err(err) = device.create_depth_stencil_view(&depth, view) {
        tracing::error!("failed to create depth stencil view at {view}: {err:#}");
        drop(depth);
        surface.release();
        return Built::Released;
    }
    surface.depth = Some(depth);

    tracing::debug!("created depth attachment successfully");
    Built::Attached
}

/// Build the color attachment and, for depth-enabled surfaces, the depth attachment. A
/// depth-enabled surface renders multisampled and resolves on flip.
pub(crate) fn build_all<B: Backend>(device: &B::Device, surface: &mut Surface<B>) -> Built {
    let multisampled = surface.depth_enabled();
    let color = build_color(device, surface, multisampled);
    if color == Built::Released || !multisampled {
        return color;
    }
    match build_depth(device, surface) {
        Built::Attached => color,
        depth => depth,
    }
}

fn buffer_desc<B: Backend>(device: &B::Device, surface: &Surface<B>) -> Result<TextureDesc> {
    let buffer = surface.buffers[0]
        .as_ref()
        .context("surface has no presentable buffer")?;
    device.texture_desc(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{
            software::{Fault, Released, Software, SoftwareDevice},
            DescriptorKind, SwapChain, SwapChainDesc,
        },
        descriptor::{DescriptorHeap, DescriptorSlots},
        window::PhysicalSize,
    };

    struct Fixture {
        device: SoftwareDevice,
        _rtv: DescriptorHeap<Software>,
        _dsv: DescriptorHeap<Software>,
        surface: Surface<Software>,
    }

    fn fixture(depth: bool) -> Fixture {
        let device = SoftwareDevice::new();
        let queue = device.queue();
        let windows = device.windows();
        let window = windows.open(PhysicalSize::new(320, 240));
        let rtv = DescriptorHeap::create(&device, DescriptorKind::RenderTarget, 4)
            .expect("valid rtv heap");
        let dsv = DescriptorHeap::create(&device, DescriptorKind::DepthStencil, 4)
            .expect("valid dsv heap");
        let mut slots = DescriptorSlots::new(4, 4);
        let swap_chain = device
            .create_swap_chain(
                &queue,
                window,
                &SwapChainDesc::surface(PhysicalSize::new(320, 240)),
            )
            .expect("valid swap chain");
        let buffers = [0, 1].map(|index| Some(swap_chain.buffer(index).expect("valid buffer")));
        let color_slot = slots
            .allocate(DescriptorKind::RenderTarget)
            .expect("valid color slot");
        let depth_slot = depth.then(|| {
            slots
                .allocate(DescriptorKind::DepthStencil)
                .expect("valid depth slot")
        });
        let surface = Surface {
            buffers,
            color: None,
            depth: None,
            swap_chain: Some(swap_chain),
            window,
            color_slot,
            color_view: rtv.location(color_slot),
            depth_slot,
            depth_view: depth_slot.map(|slot| dsv.location(slot)),
            size: PhysicalSize::new(320, 240),
            flip_index: 0,
        };
        Fixture {
            device,
            _rtv: rtv,
            _dsv: dsv,
            surface,
        }
    }

    #[test]
    fn color_matches_buffer() {
        let Fixture {
            device,
            mut surface,
            _rtv,
            _dsv,
        } = fixture(false);

        assert_eq!(build_color(&device, &mut surface, false), Built::Attached);
        let desc = surface.color.as_ref().expect("valid color").desc();
        assert_eq!(desc.size(), PhysicalSize::new(320, 240));
        assert_eq!(desc.format, Format::Rgba8Unorm);
        assert_eq!(desc.sample_count, 1);

        assert_eq!(build_color(&device, &mut surface, true), Built::Attached);
        let color = surface.color.as_ref().expect("valid color");
        assert_eq!(color.desc().sample_count, MULTISAMPLE_COUNT);
        assert_eq!(color.state(), ResourceState::RENDER_TARGET);
        // The first attachment was released when it was replaced.
        assert_eq!(device.stats().live_textures, 1);
    }

    #[test]
    fn depth_is_multisampled_d24s8() {
        let Fixture {
            device,
            mut surface,
            _rtv,
            _dsv,
        } = fixture(true);

        assert_eq!(build_all(&device, &mut surface), Built::Attached);
        let depth = surface.depth.as_ref().expect("valid depth");
        assert_eq!(depth.desc().format, DEPTH_FORMAT);
        assert_eq!(depth.desc().sample_count, MULTISAMPLE_COUNT);
        assert_eq!(
            depth.state(),
            ResourceState::DEPTH_WRITE | ResourceState::DEPTH_READ
        );
        let color = surface.color.as_ref().expect("valid color");
        assert_eq!(color.desc().sample_count, MULTISAMPLE_COUNT);
    }

    #[test]
    fn no_depth_without_view() {
        let Fixture {
            device,
            mut surface,
            _rtv,
            _dsv,
        } = fixture(false);

        assert_eq!(build_depth(&device, &mut surface), Built::Missing);
        assert!(surface.depth.is_none());
        assert_eq!(build_all(&device, &mut surface), Built::Attached);
        assert!(surface.depth.is_none());
    }

    #[test]
    fn allocation_failure_leaves_surface() {
        let Fixture {
            device,
            mut surface,
            _rtv,
            _dsv,
        } = fixture(true);

        device.fail_next(Fault::CreateTexture);
        assert_eq!(build_color(&device, &mut surface, true), Built::Missing);
        assert!(surface.color.is_none());
        assert!(surface.swap_chain.is_some());
        assert!(surface.buffers.iter().all(Option::is_some));
    }

    #[test]
    fn view_failure_releases_everything() {
        let Fixture {
            device,
            mut surface,
            _rtv,
            _dsv,
        } = fixture(true);

        assert_eq!(build_all(&device, &mut surface), Built::Attached);
        device.take_releases();
        device.fail_next(Fault::CreateView);
        assert_eq!(build_depth(&device, &mut surface), Built::Released);
        assert!(surface.swap_chain.is_none());
        assert!(surface.buffers.iter().all(Option::is_none));
        assert!(surface.color.is_none());
        assert!(surface.depth.is_none());
        assert_eq!(
            device.take_releases(),
            [
                // The previous attachment, dropped before the rebuild.
                Released::Texture(DEPTH_FORMAT),
                // The replacement whose view failed.
                Released::Texture(DEPTH_FORMAT),
                Released::BackBuffer(0),
                Released::BackBuffer(1),
                Released::Texture(Format::Rgba8Unorm),
                Released::SwapChain,
            ]
        );
        let stats = device.stats();
        assert_eq!(stats.live_textures, 0);
        assert_eq!(stats.live_swap_chains, 0);
        assert_eq!(stats.live_buffer_refs, 0);
    }

    #[test]
    fn missing_buffer_is_reported() {
        let Fixture {
            device,
            mut surface,
            _rtv,
            _dsv,
        } = fixture(false);

        surface.release_buffers();
        assert_eq!(build_color(&device, &mut surface, false), Built::Missing);
        assert!(surface.color.is_none());
        assert_eq!(device.stats().textures_created, 0);
    }
}
