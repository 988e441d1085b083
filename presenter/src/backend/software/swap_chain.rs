use super::{
    resource::Image, status, Fault, PresentedFrame, Released, Shared, Software, SoftwareResource,
    SoftwareWindow, DXGI_ERROR_DEVICE_REMOVED, DXGI_ERROR_INVALID_CALL,
};
use crate::{
    backend::{ResourceState, SwapChain, SwapChainDesc, TextureDesc, TextureUsage},
    window::PhysicalSize,
    Result,
};
use parking_lot::Mutex;
use std::{fmt, sync::Arc};

#[must_use]
pub struct SoftwareSwapChain {
    shared: Arc<Shared>,
    window: SoftwareWindow,
    desc: SwapChainDesc,
    images: Vec<Arc<Mutex<Image>>>,
    current: u32,
}

impl SoftwareSwapChain {
    pub(super) fn new(shared: Arc<Shared>, window: SoftwareWindow, desc: SwapChainDesc) -> Self {
        shared.journal(|journal| {
            journal.stats.swap_chains_created += 1;
            journal.stats.live_swap_chains += 1;
        });
        let mut swap_chain = Self {
            shared,
            window,
            desc,
            images: Vec::new(),
            current: 0,
        };
        swap_chain.allocate_images();
        swap_chain
    }

    /// Index of the buffer the next present shows.
    #[inline]
    #[must_use]
    pub fn current_buffer_index(&self) -> u32 {
        self.current
    }

    fn allocate_images(&mut self) {
        let desc = TextureDesc {
            width: self.desc.size.width,
            height: self.desc.size.height,
            format: self.desc.format,
            sample_count: self.desc.sample_count,
            usage: TextureUsage::RENDER_TARGET,
        };
        self.images = (0..self.desc.buffer_count)
            .map(|index| {
                Arc::new(Mutex::new(Image::back_buffer(
                    Arc::clone(&self.shared),
                    index,
                    desc,
                )))
            })
            .collect();
        self.current = 0;
    }
}

impl SwapChain<Software> for SoftwareSwapChain {
    fn buffer(&self, index: u32) -> Result<SoftwareResource> {
        let image = self
            .images
            .get(index as usize)
            .ok_or(status("buffer index out of range", DXGI_ERROR_INVALID_CALL))?;
        Ok(SoftwareResource::buffer(
            Arc::clone(&self.shared),
            index,
            Arc::clone(image),
        ))
    }

    fn resize_buffers(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        if self.shared.take_fault(Fault::ResizeBuffers) {
            return Err(status("failed to resize buffers", DXGI_ERROR_INVALID_CALL));
        }
        if self.shared.in_flight() {
            return Err(status(
                "buffers are referenced by in-flight work",
                DXGI_ERROR_INVALID_CALL,
            ));
        }
        if self.images.iter().any(|image| Arc::strong_count(image) > 1) {
            return Err(status(
                "buffer references are still held",
                DXGI_ERROR_INVALID_CALL,
            ));
        }
        if size.is_degenerate() {
            return Err(status("swap chain size is zero", DXGI_ERROR_INVALID_CALL));
        }

        self.desc.size = size;
        self.allocate_images();
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        if self.shared.take_fault(Fault::Present) {
            return Err(status("failed to present", DXGI_ERROR_DEVICE_REMOVED));
        }
        if self.shared.window(self.window).is_none() {
            return Err(status("window was destroyed", DXGI_ERROR_INVALID_CALL));
        }

        let contents = {
            let image = self.images[self.current as usize].lock();
            if image.state != ResourceState::PRESENT {
                return Err(status(
                    "back buffer is not in the present state",
                    DXGI_ERROR_INVALID_CALL,
                ));
            }
            image.contents
        };
        let frame = PresentedFrame {
            window: self.window,
            buffer_index: self.current,
            contents,
        };
        self.shared.journal(|journal| {
            journal.stats.presents += 1;
            journal.presented.push(frame);
        });

        self.current = (self.current + 1) % self.desc.buffer_count;
        Ok(())
    }
}

impl Drop for SoftwareSwapChain {
    fn drop(&mut self) {
        self.shared.journal(|journal| {
            journal.stats.live_swap_chains -= 1;
            journal.releases.push(Released::SwapChain);
        });
    }
}

impl fmt::Debug for SoftwareSwapChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareSwapChain")
            .field("window", &self.window)
            .field("size", &self.desc.size)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
