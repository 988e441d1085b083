//! Surface registry keyed by [`SurfaceId`].

use crate::{
    backend::Backend,
    surface::{Surface, SurfaceId},
};
use fnv::FnvHashMap;
use std::fmt;

/// Owns every live surface. Ids are minted monotonically starting at 1 and never reused.
pub(crate) struct SurfaceRegistry<B: Backend> {
    surfaces: FnvHashMap<SurfaceId, Surface<B>>,
    next_id: u64,
}

impl<B: Backend> Default for SurfaceRegistry<B> {
    fn default() -> Self {
        Self {
            surfaces: FnvHashMap::default(),
            next_id: 1,
        }
    }
}

impl<B: Backend> SurfaceRegistry<B> {
    /// Store a fully built surface under a fresh id.
    pub(crate) fn insert(&mut self, surface: Surface<B>) -> SurfaceId {
        let id = SurfaceId::from(self.next_id);
        self.next_id += 1;
        self.surfaces.insert(id, surface);
        id
    }

    #[inline]
    pub(crate) fn get(&self, id: SurfaceId) -> Option<&Surface<B>> {
        if id.is_null() {
            return None;
        }
        self.surfaces.get(&id)
    }

    /// The only way to mutate a surface. Unknown and null ids yield `None`.
    #[inline]
    pub(crate) fn get_mut(&mut self, id: SurfaceId) -> Option<&mut Surface<B>> {
        if id.is_null() {
            return None;
        }
        self.surfaces.get_mut(&id)
    }

    pub(crate) fn remove(&mut self, id: SurfaceId) -> Option<Surface<B>> {
        if id.is_null() {
            return None;
        }
        self.surfaces.remove(&id)
    }

    /// Remove every surface, releasing them in id order.
    pub(crate) fn clear(&mut self) {
        let mut ids = self.ids();
        ids.sort_unstable();
        for id in ids {
            self.surfaces.remove(&id);
        }
    }

    pub(crate) fn ids(&self) -> Vec<SurfaceId> {
        self.surfaces.keys().copied().collect()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.surfaces.len()
    }
}

impl<B: Backend> fmt::Debug for SurfaceRegistry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceRegistry")
            .field("surfaces", &self.surfaces.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{
            software::{Software, SoftwareDevice, SoftwareWindows},
            CpuDescriptor, DescriptorKind,
        },
        descriptor::DescriptorSlots,
        window::PhysicalSize,
    };

    fn surface(windows: &SoftwareWindows, slots: &mut DescriptorSlots) -> Surface<Software> {
        Surface {
            buffers: [None, None],
            color: None,
            depth: None,
            swap_chain: None,
            window: windows.open(PhysicalSize::new(1, 1)),
            color_slot: slots
                .allocate(DescriptorKind::RenderTarget)
                .expect("valid slot"),
            color_view: CpuDescriptor::default(),
            depth_slot: None,
            depth_view: None,
            size: PhysicalSize::new(1, 1),
            flip_index: 0,
        }
    }

    #[test]
    fn null_id_is_never_stored() {
        let windows = SoftwareDevice::new().windows();
        let mut slots = DescriptorSlots::new(16, 0);
        let mut registry = SurfaceRegistry::default();
        let ids = [(); 2].map(|_| registry.insert(surface(&windows, &mut slots)));

        assert_eq!(ids, [SurfaceId::from(1), SurfaceId::from(2)]);
        assert!(registry.get(SurfaceId::NULL).is_none());
        assert!(registry.get_mut(SurfaceId::NULL).is_none());
        assert!(registry.remove(SurfaceId::NULL).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn removed_ids_stay_retired() {
        let windows = SoftwareDevice::new().windows();
        let mut slots = DescriptorSlots::new(16, 0);
        let mut registry = SurfaceRegistry::default();
        let ids = [(); 3].map(|_| registry.insert(surface(&windows, &mut slots)));

        assert!(registry.remove(ids[2]).is_some());
        assert!(registry.remove(ids[2]).is_none());
        assert!(registry.get_mut(ids[2]).is_none());

        let next = registry.insert(surface(&windows, &mut slots));
        assert_eq!(next, SurfaceId::from(4));

        registry.clear();
        assert_eq!(registry.len(), 0);
        assert!(registry.ids().is_empty());
    }
}
