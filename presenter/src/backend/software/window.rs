use super::{Shared, Software, WindowState};
use crate::window::{PhysicalSize, WindowSystem};
use std::{fmt, sync::Arc};

/// Handle of a window opened on [`SoftwareWindows`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SoftwareWindow(u64);

impl SoftwareWindow {
    #[inline]
    pub(super) const fn id(self) -> u64 {
        self.0
    }
}

/// Host-driven windows. The host opens, resizes, hides and closes them; the presenter only
/// queries them.
#[derive(Clone)]
#[must_use]
pub struct SoftwareWindows {
    shared: Arc<Shared>,
}

impl SoftwareWindows {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Open a visible window with a client area of `size`.
    pub fn open(&self, size: PhysicalSize<u32>) -> SoftwareWindow {
        let mut state = self.shared.state.lock();
        state.next_window += 1;
        let id = state.next_window;
        state.windows.insert(
            id,
            WindowState {
                size,
                visible: true,
            },
        );
        SoftwareWindow(id)
    }

    pub fn set_size(&self, window: SoftwareWindow, size: PhysicalSize<u32>) {
        if let Some(state) = self.shared.state.lock().windows.get_mut(&window.id()) {
            state.size = size;
        }
    }

    pub fn set_visible(&self, window: SoftwareWindow, visible: bool) {
        if let Some(state) = self.shared.state.lock().windows.get_mut(&window.id()) {
            state.visible = visible;
        }
    }

    /// Destroy `window`. Its handle stops referring to a window.
    pub fn close(&self, window: SoftwareWindow) {
        self.shared.state.lock().windows.remove(&window.id());
    }
}

impl WindowSystem<Software> for SoftwareWindows {
    fn client_size(&self, window: SoftwareWindow) -> Option<PhysicalSize<u32>> {
        self.shared.window(window).map(|state| state.size)
    }

    fn is_visible(&self, window: SoftwareWindow) -> bool {
        self.shared
            .window(window)
            .map_or(false, |state| state.visible)
    }
}

impl fmt::Debug for SoftwareWindows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareWindows")
            .field("open", &self.shared.state.lock().windows.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareDevice;

    #[test]
    fn host_driven_windows() {
        let windows = SoftwareDevice::new().windows();
        let window = windows.open(PhysicalSize::new(800, 600));
        assert_eq!(windows.client_size(window), Some(PhysicalSize::new(800, 600)));
        assert!(windows.is_visible(window));

        windows.set_size(window, PhysicalSize::new(0, 0));
        windows.set_visible(window, false);
        assert_eq!(windows.client_size(window), Some(PhysicalSize::new(0, 0)));
        assert!(!windows.is_visible(window));

        windows.close(window);
        assert_eq!(windows.client_size(window), None);
        assert!(!windows.is_visible(window));
    }
}
