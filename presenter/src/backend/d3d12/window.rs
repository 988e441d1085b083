use super::D3d12;
use crate::window::{PhysicalSize, WindowSystem};
use windows::Win32::{
    Foundation::{HWND, RECT},
    UI::WindowsAndMessaging::{GetClientRect, IsWindow, IsWindowVisible},
};

/// Wrap a raw `HWND` value, e.g. the one `winit` reports for its windows.
#[inline]
pub fn window_handle(hwnd: isize) -> HWND {
    HWND(hwnd)
}

/// Window queries through the Win32 API.
#[derive(Default, Debug, Copy, Clone)]
pub struct Win32Windows;

impl WindowSystem<D3d12> for Win32Windows {
    fn client_size(&self, window: HWND) -> Option<PhysicalSize<u32>> {
        if !unsafe { IsWindow(window) }.as_bool() {
            return None;
        }
        let mut rect = RECT::default();
        unsafe { GetClientRect(window, &mut rect) }.ok()?;
        Some(PhysicalSize::new(
            u32::try_from(rect.right - rect.left).unwrap_or(0),
            u32::try_from(rect.bottom - rect.top).unwrap_or(0),
        ))
    }

    fn is_visible(&self, window: HWND) -> bool {
        unsafe { IsWindowVisible(window) }.as_bool()
    }
}
