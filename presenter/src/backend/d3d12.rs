//! Direct3D 12 and DXGI backend.
//!
//! Wraps a caller-provided `ID3D12Device` and direct `ID3D12CommandQueue`. Surfaces are flip-model
//! swap chains created with `IDXGIFactory4::CreateSwapChainForHwnd`.

use crate::{
    backend::{
        Backend, CpuDescriptor, DescriptorKind, Device, Format, ResourceState, SwapChain,
        SwapChainDesc, SwapEffect, TextureDesc, TextureUsage,
    },
    window::PhysicalSize,
    Error, Result,
};
use std::fmt;
use windows::{
    core::Interface,
    Win32::{
        Foundation::{E_INVALIDARG, E_POINTER, HWND},
        Graphics::{
            Direct3D::D3D_FEATURE_LEVEL_11_0,
            Direct3D12::{
                D3D12CreateDevice, ID3D12CommandQueue, ID3D12DescriptorHeap, ID3D12Device,
                ID3D12Resource, D3D12_CLEAR_VALUE, D3D12_CLEAR_VALUE_0,
                D3D12_COMMAND_LIST_TYPE_DIRECT, D3D12_COMMAND_QUEUE_DESC,
                D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_DEPTH_STENCIL_VALUE,
                D3D12_DESCRIPTOR_HEAP_DESC, D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
                D3D12_DESCRIPTOR_HEAP_TYPE, D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
                D3D12_DESCRIPTOR_HEAP_TYPE_RTV, D3D12_HEAP_FLAG_NONE, D3D12_HEAP_PROPERTIES,
                D3D12_HEAP_TYPE_DEFAULT, D3D12_RESOURCE_DESC, D3D12_RESOURCE_DIMENSION_TEXTURE2D,
                D3D12_RESOURCE_FLAGS, D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL,
                D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET, D3D12_RESOURCE_FLAG_NONE,
                D3D12_RESOURCE_STATES, D3D12_TEXTURE_LAYOUT_UNKNOWN,
            },
            Dxgi::{
                Common::{
                    DXGI_FORMAT, DXGI_FORMAT_D24_UNORM_S8_UINT, DXGI_FORMAT_R8G8B8A8_UNORM,
                    DXGI_FORMAT_R8G8B8A8_UNORM_SRGB, DXGI_SAMPLE_DESC,
                },
                CreateDXGIFactory1, IDXGIFactory4, IDXGISwapChain1, IDXGISwapChain3,
                DXGI_SWAP_CHAIN_DESC1, DXGI_SWAP_EFFECT, DXGI_SWAP_EFFECT_FLIP_DISCARD,
                DXGI_USAGE_RENDER_TARGET_OUTPUT,
            },
        },
    },
};

mod queue;
mod window;

pub use self::{
    queue::{D3d12CommandList, D3d12Queue},
    window::{window_handle, Win32Windows},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum D3d12 {}

impl Backend for D3d12 {
    type Window = HWND;
    type SwapChain = D3d12SwapChain;
    type Resource = ID3D12Resource;
    type DescriptorHeap = ID3D12DescriptorHeap;
    type Device = D3d12Device;
    type Queue = D3d12Queue;
    type CommandList = D3d12CommandList;
    type WindowSystem = Win32Windows;
}

/// Map a failed call to a status error carrying its `HRESULT`.
#[inline]
fn status(context: &'static str) -> impl FnOnce(windows::core::Error) -> Error {
    move |err| Error::Status {
        context,
        status: err.code().0 as u32,
    }
}

const fn heap_type(kind: DescriptorKind) -> D3D12_DESCRIPTOR_HEAP_TYPE {
    match kind {
        DescriptorKind::RenderTarget => D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
        DescriptorKind::DepthStencil => D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
    }
}

pub(crate) const fn dxgi_format(format: Format) -> DXGI_FORMAT {
    match format {
        Format::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        Format::Rgba8UnormSrgb => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
        Format::D24UnormS8Uint => DXGI_FORMAT_D24_UNORM_S8_UINT,
    }
}

fn from_dxgi_format(format: DXGI_FORMAT) -> Option<Format> {
    match format {
        DXGI_FORMAT_R8G8B8A8_UNORM => Some(Format::Rgba8Unorm),
        DXGI_FORMAT_R8G8B8A8_UNORM_SRGB => Some(Format::Rgba8UnormSrgb),
        DXGI_FORMAT_D24_UNORM_S8_UINT => Some(Format::D24UnormS8Uint),
        _ => None,
    }
}

#[inline]
pub(crate) const fn resource_states(state: ResourceState) -> D3D12_RESOURCE_STATES {
    D3D12_RESOURCE_STATES(state.bits() as i32)
}

const fn swap_effect(effect: SwapEffect) -> DXGI_SWAP_EFFECT {
    match effect {
        SwapEffect::FlipDiscard => DXGI_SWAP_EFFECT_FLIP_DISCARD,
    }
}

fn resource_flags(usage: TextureUsage) -> D3D12_RESOURCE_FLAGS {
    let mut flags = D3D12_RESOURCE_FLAG_NONE;
    if usage.contains(TextureUsage::RENDER_TARGET) {
        flags |= D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET;
    }
    if usage.contains(TextureUsage::DEPTH_STENCIL) {
        flags |= D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL;
    }
    flags
}

/// A wrapped `ID3D12Device` and the DXGI factory swap chains are created from.
#[derive(Clone)]
#[must_use]
pub struct D3d12Device {
    device: ID3D12Device,
    factory: IDXGIFactory4,
}

impl D3d12Device {
    /// Wrap an existing device.
    pub fn new(device: ID3D12Device) -> Result<Self> {
        let factory: IDXGIFactory4 =
            unsafe { CreateDXGIFactory1() }.map_err(status("failed to create DXGI factory"))?;
        Ok(Self { device, factory })
    }

    /// Create a device on the first hardware adapter supporting feature level 11.0.
    pub fn create_default() -> Result<Self> {
        let factory: IDXGIFactory4 =
            unsafe { CreateDXGIFactory1() }.map_err(status("failed to create DXGI factory"))?;

        let mut index = 0;
        let device = loop {
            let adapter = unsafe { factory.EnumAdapters1(index) }
                .map_err(status("no adapter supports Direct3D 12"))?;
            index += 1;

            let mut device: Option<ID3D12Device> = None;
            if unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device) }.is_ok()
            {
                if let Some(device) = device {
                    break device;
                }
            }
        };
        tracing::debug!("created Direct3D 12 device on adapter {}", index - 1);

        Ok(Self { device, factory })
    }

    /// Create a direct queue on this device.
    pub fn create_queue(&self) -> Result<D3d12Queue> {
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
            ..Default::default()
        };
        let queue: ID3D12CommandQueue = unsafe { self.device.CreateCommandQueue(&desc) }
            .map_err(status("failed to create command queue"))?;
        D3d12Queue::new(&self.device, queue)
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> &ID3D12Device {
        &self.device
    }
}

impl Device<D3d12> for D3d12Device {
    fn create_descriptor_heap(
        &self,
        kind: DescriptorKind,
        capacity: u32,
    ) -> Result<ID3D12DescriptorHeap> {
        let desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: heap_type(kind),
            NumDescriptors: capacity,
            Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
            NodeMask: 0,
        };
        unsafe { self.device.CreateDescriptorHeap(&desc) }
            .map_err(status("failed to create descriptor heap"))
    }

    fn descriptor_heap_start(&self, heap: &ID3D12DescriptorHeap) -> CpuDescriptor {
        CpuDescriptor(unsafe { heap.GetCPUDescriptorHandleForHeapStart() }.ptr)
    }

    fn descriptor_stride(&self, kind: DescriptorKind) -> u32 {
        unsafe { self.device.GetDescriptorHandleIncrementSize(heap_type(kind)) }
    }

    fn create_swap_chain(
        &self,
        queue: &D3d12Queue,
        window: HWND,
        desc: &SwapChainDesc,
    ) -> Result<D3d12SwapChain> {
        let native = DXGI_SWAP_CHAIN_DESC1 {
            Width: desc.size.width,
            Height: desc.size.height,
            Format: dxgi_format(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: desc.sample_count,
                Quality: 0,
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: desc.buffer_count,
            SwapEffect: swap_effect(desc.swap_effect),
            Flags: desc.flags,
            ..Default::default()
        };
        // Without a fullscreen description the swap chain is windowed.
        let swap_chain: IDXGISwapChain1 = unsafe {
            self.factory
                .CreateSwapChainForHwnd(queue.handle(), window, &native, None, None)
        }
        .map_err(status("failed to create swap chain"))?;
        let swap_chain: IDXGISwapChain3 = swap_chain
            .cast()
            .map_err(status("swap chain does not support IDXGISwapChain3"))?;

        Ok(D3d12SwapChain {
            swap_chain,
            desc: *desc,
        })
    }

    fn texture_desc(&self, resource: &ID3D12Resource) -> Result<TextureDesc> {
        let desc = unsafe { resource.GetDesc() };
        if desc.Dimension != D3D12_RESOURCE_DIMENSION_TEXTURE2D {
            return Err(Error::Status {
                context: "resource is not a two-dimensional texture",
                status: E_INVALIDARG.0 as u32,
            });
        }
        let format = from_dxgi_format(desc.Format).ok_or(Error::Status {
            context: "unsupported resource format",
            status: E_INVALIDARG.0 as u32,
        })?;

        let mut usage = TextureUsage::empty();
        if desc.Flags.0 & D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET.0 != 0 {
            usage |= TextureUsage::RENDER_TARGET;
        }
        if desc.Flags.0 & D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL.0 != 0 {
            usage |= TextureUsage::DEPTH_STENCIL;
        }

        Ok(TextureDesc {
            width: u32::try_from(desc.Width).map_err(anyhow::Error::from)?,
            height: desc.Height,
            format,
            sample_count: desc.SampleDesc.Count,
            usage,
        })
    }

    fn create_texture(
        &self,
        desc: &TextureDesc,
        initial_state: ResourceState,
    ) -> Result<ID3D12Resource> {
        let heap = D3D12_HEAP_PROPERTIES {
            Type: D3D12_HEAP_TYPE_DEFAULT,
            ..Default::default()
        };
        let native = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
            Alignment: 0,
            Width: u64::from(desc.width),
            Height: desc.height,
            DepthOrArraySize: 1,
            MipLevels: 1,
            Format: dxgi_format(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: desc.sample_count,
                Quality: 0,
            },
            Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
            Flags: resource_flags(desc.usage),
        };
        let clear_value = desc.format.is_depth_stencil().then(|| D3D12_CLEAR_VALUE {
            Format: native.Format,
            Anonymous: D3D12_CLEAR_VALUE_0 {
                DepthStencil: D3D12_DEPTH_STENCIL_VALUE {
                    Depth: 1.0,
                    Stencil: 0,
                },
            },
        });

        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.device.CreateCommittedResource(
                &heap,
                D3D12_HEAP_FLAG_NONE,
                &native,
                resource_states(initial_state),
                clear_value
                    .as_ref()
                    .map(|value| -> *const D3D12_CLEAR_VALUE { value }),
                &mut resource,
            )
        }
        .map_err(status("failed to create committed texture"))?;
        resource.ok_or(Error::Status {
            context: "committed texture was not returned",
            status: E_POINTER.0 as u32,
        })
    }

    fn create_render_target_view(
        &self,
        resource: &ID3D12Resource,
        location: CpuDescriptor,
    ) -> Result<()> {
        unsafe {
            self.device.CreateRenderTargetView(
                resource,
                None,
                D3D12_CPU_DESCRIPTOR_HANDLE { ptr: location.0 },
            );
        }
        Ok(())
    }

    fn create_depth_stencil_view(
        &self,
        resource: &ID3D12Resource,
        location: CpuDescriptor,
    ) -> Result<()> {
        unsafe {
            self.device.CreateDepthStencilView(
                resource,
                None,
                D3D12_CPU_DESCRIPTOR_HANDLE { ptr: location.0 },
            );
        }
        Ok(())
    }
}

impl fmt::Debug for D3d12Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("D3d12Device").finish_non_exhaustive()
    }
}

/// A flip-model swap chain and the description it was created with.
#[must_use]
pub struct D3d12SwapChain {
    swap_chain: IDXGISwapChain3,
    desc: SwapChainDesc,
}

impl SwapChain<D3d12> for D3d12SwapChain {
    fn buffer(&self, index: u32) -> Result<ID3D12Resource> {
        unsafe { self.swap_chain.GetBuffer(index) }.map_err(status("failed to get swap chain buffer"))
    }

    fn resize_buffers(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        unsafe {
            self.swap_chain.ResizeBuffers(
                self.desc.buffer_count,
                size.width,
                size.height,
                dxgi_format(self.desc.format),
                self.desc.flags,
            )
        }
        .map_err(status("failed to resize swap chain buffers"))?;
        self.desc.size = size;
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        unsafe { self.swap_chain.Present(0, 0) }
            .ok()
            .map_err(status("failed to present"))
    }
}

impl fmt::Debug for D3d12SwapChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("D3d12SwapChain")
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_bits_match_native() {
        use windows::Win32::Graphics::Direct3D12::{
            D3D12_RESOURCE_STATE_COPY_DEST, D3D12_RESOURCE_STATE_COPY_SOURCE,
            D3D12_RESOURCE_STATE_DEPTH_READ, D3D12_RESOURCE_STATE_DEPTH_WRITE,
            D3D12_RESOURCE_STATE_PRESENT, D3D12_RESOURCE_STATE_RENDER_TARGET,
            D3D12_RESOURCE_STATE_RESOLVE_DEST, D3D12_RESOURCE_STATE_RESOLVE_SOURCE,
        };

        let pairs = [
            (ResourceState::PRESENT, D3D12_RESOURCE_STATE_PRESENT),
            (ResourceState::RENDER_TARGET, D3D12_RESOURCE_STATE_RENDER_TARGET),
            (ResourceState::DEPTH_WRITE, D3D12_RESOURCE_STATE_DEPTH_WRITE),
            (ResourceState::DEPTH_READ, D3D12_RESOURCE_STATE_DEPTH_READ),
            (ResourceState::COPY_DEST, D3D12_RESOURCE_STATE_COPY_DEST),
            (ResourceState::COPY_SOURCE, D3D12_RESOURCE_STATE_COPY_SOURCE),
            (ResourceState::RESOLVE_DEST, D3D12_RESOURCE_STATE_RESOLVE_DEST),
            (ResourceState::RESOLVE_SOURCE, D3D12_RESOURCE_STATE_RESOLVE_SOURCE),
        ];
        for (state, native) in pairs {
            assert_eq!(resource_states(state), native, "{state:?}");
        }
    }

    #[test]
    fn formats_round_trip() {
        for format in [
            Format::Rgba8Unorm,
            Format::Rgba8UnormSrgb,
            Format::D24UnormS8Uint,
        ] {
            assert_eq!(from_dxgi_format(dxgi_format(format)), Some(format));
        }
    }
}
