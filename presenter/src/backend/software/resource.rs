use super::{Contents, Released, Shared};
use crate::backend::{CpuDescriptor, DescriptorKind, Format, ResourceState, TextureDesc};
use parking_lot::Mutex;
use std::{
    fmt,
    sync::{Arc, Weak},
};

#[allow(variant_size_differences)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) enum Origin {
    BackBuffer(u32),
    Texture(Format),
}

/// The storage behind a resource. Swap chains own their buffer images; committed textures are
/// owned by the handles referring to them.
pub(super) struct Image {
    pub(super) desc: TextureDesc,
    pub(super) state: ResourceState,
    pub(super) contents: Contents,
    origin: Origin,
    shared: Arc<Shared>,
}

impl Image {
    pub(super) fn back_buffer(shared: Arc<Shared>, index: u32, desc: TextureDesc) -> Self {
        Self {
            desc,
            state: ResourceState::PRESENT,
            contents: Contents::Undefined,
            origin: Origin::BackBuffer(index),
            shared,
        }
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if let Origin::Texture(_) = self.origin {
            self.shared
                .journal(|journal| journal.stats.live_textures -= 1);
        }
    }
}

/// A counted reference to a buffer or texture.
#[must_use]
pub struct SoftwareResource {
    image: Arc<Mutex<Image>>,
    origin: Origin,
    shared: Arc<Shared>,
}

impl SoftwareResource {
    pub(super) fn texture(shared: Arc<Shared>, desc: TextureDesc, state: ResourceState) -> Self {
        let origin = Origin::Texture(desc.format);
        let image = Image {
            desc,
            state,
            contents: Contents::Undefined,
            origin,
            shared: Arc::clone(&shared),
        };
        shared.journal(|journal| {
            journal.stats.textures_created += 1;
            journal.stats.live_textures += 1;
        });
        Self {
            image: Arc::new(Mutex::new(image)),
            origin,
            shared,
        }
    }

    /// A new reference to swap-chain buffer `index`.
    pub(super) fn buffer(shared: Arc<Shared>, index: u32, image: Arc<Mutex<Image>>) -> Self {
        shared.journal(|journal| journal.stats.live_buffer_refs += 1);
        Self {
            image,
            origin: Origin::BackBuffer(index),
            shared,
        }
    }

    pub fn desc(&self) -> TextureDesc {
        self.image.lock().desc
    }

    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.image.lock().state
    }

    #[must_use]
    pub fn contents(&self) -> Contents {
        self.image.lock().contents
    }

    /// Whether `self` and `other` refer to the same image.
    #[must_use]
    pub fn same_image(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }

    pub(super) fn image(&self) -> Arc<Mutex<Image>> {
        Arc::clone(&self.image)
    }

    pub(super) fn downgrade(&self) -> Weak<Mutex<Image>> {
        Arc::downgrade(&self.image)
    }
}

impl Drop for SoftwareResource {
    fn drop(&mut self) {
        self.shared.journal(|journal| match self.origin {
            Origin::BackBuffer(index) => {
                journal.stats.live_buffer_refs -= 1;
                journal.releases.push(Released::BackBuffer(index));
            }
            Origin::Texture(format) => journal.releases.push(Released::Texture(format)),
        });
    }
}

impl fmt::Debug for SoftwareResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            Origin::BackBuffer(index) => write!(f, "SoftwareResource(buffer {index})"),
            Origin::Texture(format) => write!(f, "SoftwareResource({format} texture)"),
        }
    }
}

/// A descriptor heap. Dropping it forgets every view written into it.
#[must_use]
pub struct SoftwareHeap {
    shared: Arc<Shared>,
    id: u64,
    kind: DescriptorKind,
    start: CpuDescriptor,
}

impl SoftwareHeap {
    pub(super) fn new(shared: Arc<Shared>, id: u64, kind: DescriptorKind, start: CpuDescriptor) -> Self {
        Self {
            shared,
            id,
            kind,
            start,
        }
    }

    #[inline]
    pub fn start(&self) -> CpuDescriptor {
        self.start
    }
}

impl Drop for SoftwareHeap {
    fn drop(&mut self) {
        let table = self.shared.state.lock().heaps.remove(&self.id);
        drop(table);
        self.shared
            .journal(|journal| journal.stats.live_heaps -= 1);
    }
}

impl fmt::Debug for SoftwareHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareHeap")
            .field("kind", &self.kind)
            .field("start", &self.start)
            .finish_non_exhaustive()
    }
}
