use super::{
    resource::Image, status, Contents, Fault, Shared, Software, SoftwareResource,
    DXGI_ERROR_DEVICE_REMOVED, DXGI_ERROR_INVALID_CALL, E_INVALIDARG,
};
use crate::{
    backend::{
        CommandList, CommandQueue, CpuDescriptor, DescriptorKind, Format, ResourceState,
        TextureDesc, Transition,
    },
    Result,
};
use parking_lot::Mutex;
use std::{fmt, mem, sync::Arc};

type ImageRef = Arc<Mutex<Image>>;

enum Command {
    ClearRenderTarget {
        view: CpuDescriptor,
        rgba: [f32; 4],
    },
    ClearDepthStencil {
        view: CpuDescriptor,
        depth: f32,
        stencil: u8,
    },
    Barrier(Vec<(ImageRef, ResourceState, ResourceState)>),
    Resolve {
        dst: ImageRef,
        src: ImageRef,
        format: Format,
    },
    Copy {
        dst: ImageRef,
        src: ImageRef,
    },
}

/// Commands recorded since the last [`CommandQueue::begin`]. Validation happens when the list is
/// executed.
#[derive(Default)]
pub struct SoftwareCommandList {
    commands: Vec<Command>,
}

impl CommandList<Software> for SoftwareCommandList {
    fn clear_render_target(&mut self, view: CpuDescriptor, rgba: [f32; 4]) {
        self.commands
            .push(Command::ClearRenderTarget { view, rgba });
    }

    fn clear_depth_stencil(&mut self, view: CpuDescriptor, depth: f32, stencil: u8) {
        self.commands.push(Command::ClearDepthStencil {
            view,
            depth,
            stencil,
        });
    }

    fn barrier(&mut self, transitions: &[Transition<'_, Software>]) {
        let barriers = transitions
            .iter()
            .map(|transition| {
                (
                    transition.resource.image(),
                    transition.before,
                    transition.after,
                )
            })
            .collect();
        self.commands.push(Command::Barrier(barriers));
    }

    fn resolve(&mut self, dst: &SoftwareResource, src: &SoftwareResource, format: Format) {
        self.commands.push(Command::Resolve {
            dst: dst.image(),
            src: src.image(),
            format,
        });
    }

    fn copy(&mut self, dst: &SoftwareResource, src: &SoftwareResource) {
        self.commands.push(Command::Copy {
            dst: dst.image(),
            src: src.image(),
        });
    }
}

impl fmt::Debug for SoftwareCommandList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareCommandList")
            .field("commands", &self.commands.len())
            .finish()
    }
}

/// The direct queue with its single allocator/list pair. Submitted work completes when the
/// queue is waited on.
#[must_use]
pub struct SoftwareQueue {
    shared: Arc<Shared>,
    list: SoftwareCommandList,
    recording: bool,
}

impl SoftwareQueue {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            list: SoftwareCommandList::default(),
            recording: false,
        }
    }

    pub(super) fn belongs_to(&self, shared: &Arc<Shared>) -> bool {
        Arc::ptr_eq(&self.shared, shared)
    }

    fn execute(&self, commands: &[Command]) -> Result<()> {
        for command in commands {
            match command {
                Command::ClearRenderTarget { view, rgba } => {
                    let image = self.shared.view(DescriptorKind::RenderTarget, *view)?;
                    let mut image = image.lock();
                    if image.state != ResourceState::RENDER_TARGET {
                        return Err(status(
                            "render target cleared outside the render target state",
                            E_INVALIDARG,
                        ));
                    }
                    image.contents = Contents::Color(*rgba);
                }
                Command::ClearDepthStencil {
                    view,
                    depth,
                    stencil,
                } => {
                    let image = self.shared.view(DescriptorKind::DepthStencil, *view)?;
                    let mut image = image.lock();
                    if !image.state.contains(ResourceState::DEPTH_WRITE) {
                        return Err(status(
                            "depth stencil cleared outside the depth write state",
                            E_INVALIDARG,
                        ));
                    }
                    image.contents = Contents::DepthStencil {
                        depth: *depth,
                        stencil: *stencil,
                    };
                }
                Command::Barrier(barriers) => {
                    for (image, before, after) in barriers {
                        let mut image = image.lock();
                        if image.state != *before {
                            return Err(status(
                                "barrier state does not match the resource",
                                E_INVALIDARG,
                            ));
                        }
                        image.state = *after;
                    }
                }
                Command::Resolve { dst, src, format } => {
                    transfer(dst, src, |src, dst| {
                        src.state == ResourceState::RESOLVE_SOURCE
                            && dst.state == ResourceState::RESOLVE_DEST
                            && src.desc.sample_count > 1
                            && dst.desc.sample_count == 1
                            && src.desc.format.is_compatible(*format)
                            && dst.desc.format.is_compatible(*format)
                    })?;
                }
                Command::Copy { dst, src } => {
                    transfer(dst, src, |src, dst| {
                        src.state == ResourceState::COPY_SOURCE
                            && dst.state == ResourceState::COPY_DEST
                            && src.desc.sample_count == dst.desc.sample_count
                            && src.desc.format.is_compatible(dst.desc.format)
                    })?;
                }
            }
        }
        Ok(())
    }
}

/// Move the contents of `src` into `dst` if both have the same size and `valid` accepts them.
fn transfer(
    dst: &ImageRef,
    src: &ImageRef,
    valid: impl FnOnce(&Snapshot, &Snapshot) -> bool,
) -> Result<()> {
    if Arc::ptr_eq(dst, src) {
        return Err(status("source and destination are the same", E_INVALIDARG));
    }
    let source = Snapshot::of(&src.lock());
    let mut dst = dst.lock();
    if source.desc.size() != dst.desc.size() || !valid(&source, &Snapshot::of(&dst)) {
        return Err(status("invalid transfer", E_INVALIDARG));
    }
    dst.contents = source.contents;
    Ok(())
}

struct Snapshot {
    desc: TextureDesc,
    state: ResourceState,
    contents: Contents,
}

impl Snapshot {
    fn of(image: &Image) -> Self {
        Self {
            desc: image.desc,
            state: image.state,
            contents: image.contents,
        }
    }
}

impl CommandQueue<Software> for SoftwareQueue {
    fn begin(&mut self) -> Result<&mut SoftwareCommandList> {
        if self.recording {
            return Err(status("command list is already open", DXGI_ERROR_INVALID_CALL));
        }
        if self.shared.in_flight() {
            return Err(status(
                "command allocator reset while its commands are executing",
                DXGI_ERROR_INVALID_CALL,
            ));
        }
        self.list.commands.clear();
        self.recording = true;
        Ok(&mut self.list)
    }

    fn submit(&mut self) -> Result<()> {
        if !self.recording {
            return Err(status("command list is not open", DXGI_ERROR_INVALID_CALL));
        }
        self.recording = false;

        let commands = mem::take(&mut self.list.commands);
        if self.shared.take_fault(Fault::Submit) {
            return Err(status("failed to execute command list", DXGI_ERROR_DEVICE_REMOVED));
        }
        // Commands before a failing one keep their effect.
        self.execute(&commands)?;
        drop(commands);

        self.shared.state.lock().in_flight = true;
        self.shared
            .journal(|journal| journal.stats.submissions += 1);
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.shared.state.lock().in_flight = false;
        self.shared.journal(|journal| journal.stats.waits += 1);
        Ok(())
    }
}

impl fmt::Debug for SoftwareQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareQueue")
            .field("recording", &self.recording)
            .field("list", &self.list)
            .finish_non_exhaustive()
    }
}
