//! Window system queries.

use crate::backend::Backend;
use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[must_use]
pub struct PhysicalSize<T> {
    pub width: T,
    pub height: T,
}

impl<T> PhysicalSize<T> {
    #[inline]
    pub const fn new(width: T, height: T) -> Self {
        Self { width, height }
    }
}

impl PhysicalSize<u32> {
    /// Whether either dimension is zero, e.g. a minimized window.
    #[inline]
    #[must_use]
    pub const fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl<T> From<(T, T)> for PhysicalSize<T> {
    fn from((width, height): (T, T)) -> Self {
        Self { width, height }
    }
}

impl<T> From<PhysicalSize<T>> for (T, T) {
    fn from(size: PhysicalSize<T>) -> Self {
        (size.width, size.height)
    }
}

/// OS window queries for the opaque window handles surfaces are created against.
pub trait WindowSystem<B: Backend> {
    /// Current client-area size in pixels, or `None` if the handle no longer refers to a window.
    fn client_size(&self, window: B::Window) -> Option<PhysicalSize<u32>>;

    /// Whether the window is currently visible.
    fn is_visible(&self, window: B::Window) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate() {
        assert!(PhysicalSize::new(0, 600).is_degenerate());
        assert!(PhysicalSize::new(800, 0).is_degenerate());
        assert!(!PhysicalSize::new(800, 600).is_degenerate());
    }
}
