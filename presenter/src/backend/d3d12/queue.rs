use super::{dxgi_format, resource_states, status, D3d12};
use crate::{
    backend::{CommandList, CommandQueue, CpuDescriptor, Format, Transition},
    Result,
};
use std::{fmt, mem::ManuallyDrop};
use windows::{
    core::{Interface, PCSTR},
    Win32::{
        Foundation::{CloseHandle, HANDLE},
        Graphics::Direct3D12::{
            ID3D12CommandAllocator, ID3D12CommandList, ID3D12CommandQueue, ID3D12Device,
            ID3D12Fence, ID3D12GraphicsCommandList, ID3D12Resource,
            D3D12_CLEAR_FLAG_DEPTH, D3D12_CLEAR_FLAG_STENCIL, D3D12_COMMAND_LIST_TYPE_DIRECT,
            D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_FENCE_FLAG_NONE, D3D12_RESOURCE_BARRIER,
            D3D12_RESOURCE_BARRIER_0, D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
            D3D12_RESOURCE_BARRIER_FLAG_NONE, D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
            D3D12_RESOURCE_TRANSITION_BARRIER,
        },
        System::Threading::{CreateEventA, WaitForSingleObject, INFINITE},
    },
};

#[inline]
const fn descriptor(view: CpuDescriptor) -> D3D12_CPU_DESCRIPTOR_HANDLE {
    D3D12_CPU_DESCRIPTOR_HANDLE { ptr: view.0 }
}

/// A transition barrier borrowing `resource`. The barrier never releases its reference.
fn transition_barrier(transition: &Transition<'_, D3d12>) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                // SAFETY: copies the interface pointer without AddRef; `ManuallyDrop` skips the
                // matching Release.
                pResource: unsafe { std::mem::transmute_copy(transition.resource) },
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: resource_states(transition.before),
                StateAfter: resource_states(transition.after),
            }),
        },
    }
}

/// The graphics command list of a [`D3d12Queue`].
#[must_use]
pub struct D3d12CommandList {
    list: ID3D12GraphicsCommandList,
}

impl CommandList<D3d12> for D3d12CommandList {
    fn clear_render_target(&mut self, view: CpuDescriptor, rgba: [f32; 4]) {
        unsafe {
            self.list
                .ClearRenderTargetView(descriptor(view), &rgba, None);
        }
    }

    fn clear_depth_stencil(&mut self, view: CpuDescriptor, depth: f32, stencil: u8) {
        unsafe {
            self.list.ClearDepthStencilView(
                descriptor(view),
                D3D12_CLEAR_FLAG_DEPTH | D3D12_CLEAR_FLAG_STENCIL,
                depth,
                stencil,
                &[],
            );
        }
    }

    fn barrier(&mut self, transitions: &[Transition<'_, D3d12>]) {
        let barriers = transitions
            .iter()
            .map(transition_barrier)
            .collect::<Vec<_>>();
        unsafe { self.list.ResourceBarrier(&barriers) };
    }

    fn resolve(&mut self, dst: &ID3D12Resource, src: &ID3D12Resource, format: Format) {
        unsafe {
            self.list
                .ResolveSubresource(dst, 0, src, 0, dxgi_format(format));
        }
    }

    fn copy(&mut self, dst: &ID3D12Resource, src: &ID3D12Resource) {
        unsafe { self.list.CopyResource(dst, src) };
    }
}

impl fmt::Debug for D3d12CommandList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("D3d12CommandList").finish_non_exhaustive()
    }
}

/// A wrapped direct queue with one allocator/list pair and a fence for blocking waits.
#[must_use]
pub struct D3d12Queue {
    queue: ID3D12CommandQueue,
    allocator: ID3D12CommandAllocator,
    list: D3d12CommandList,
    fence: ID3D12Fence,
    fence_value: u64,
    event: HANDLE,
}

impl D3d12Queue {
    /// Wrap `queue`, a direct queue created on `device`.
    pub fn new(device: &ID3D12Device, queue: ID3D12CommandQueue) -> Result<Self> {
        let allocator: ID3D12CommandAllocator =
            unsafe { device.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT) }
                .map_err(status("failed to create command allocator"))?;
        let list: ID3D12GraphicsCommandList = unsafe {
            device.CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, &allocator, None)
        }
        .map_err(status("failed to create command list"))?;
        // Lists are created open; `begin` expects a closed one.
        unsafe { list.Close() }.map_err(status("failed to close command list"))?;

        let fence: ID3D12Fence = unsafe { device.CreateFence(0, D3D12_FENCE_FLAG_NONE) }
            .map_err(status("failed to create fence"))?;
        let event = unsafe { CreateEventA(None, false, false, PCSTR::null()) }
            .map_err(status("failed to create fence event"))?;

        Ok(Self {
            queue,
            allocator,
            list: D3d12CommandList { list },
            fence,
            fence_value: 0,
            event,
        })
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> &ID3D12CommandQueue {
        &self.queue
    }
}

impl CommandQueue<D3d12> for D3d12Queue {
    fn begin(&mut self) -> Result<&mut D3d12CommandList> {
        // Every submission is waited on before the next `begin`.
        unsafe { self.allocator.Reset() }.map_err(status("failed to reset command allocator"))?;
        unsafe { self.list.list.Reset(&self.allocator, None) }
            .map_err(status("failed to reset command list"))?;
        Ok(&mut self.list)
    }

    fn submit(&mut self) -> Result<()> {
        unsafe { self.list.list.Close() }.map_err(status("failed to close command list"))?;
        let list: ID3D12CommandList = self
            .list
            .list
            .cast()
            .map_err(status("failed to cast command list"))?;
        unsafe { self.queue.ExecuteCommandLists(&[Some(list)]) };
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.fence_value += 1;
        unsafe { self.queue.Signal(&self.fence, self.fence_value) }
            .map_err(status("failed to signal fence"))?;
        unsafe {
            if self.fence.GetCompletedValue() < self.fence_value {
                self.fence
                    .SetEventOnCompletion(self.fence_value, self.event)
                    .map_err(status("failed to set fence event"))?;
                WaitForSingleObject(self.event, INFINITE);
            }
        }
        Ok(())
    }
}

impl Drop for D3d12Queue {
    fn drop(&mut self) {
        if let Err(err) = unsafe { CloseHandle(self.event) } {
            tracing::error!("failed to close fence event: {err}");
        }
    }
}

impl fmt::Debug for D3d12Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("D3d12Queue")
            .field("fence_value", &self.fence_value)
            .finish_non_exhaustive()
    }
}
