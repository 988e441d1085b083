//! Opens a window and presents an animated clear color to it every frame.
//!
//! Uses the Direct3D 12 backend on Windows and the software backend elsewhere.

#![warn(
    anonymous_parameters,
    bare_trait_objects,
    clippy::branches_sharing_code,
    clippy::map_unwrap_or,
    clippy::match_wildcard_for_single_variants,
    clippy::must_use_candidate,
    clippy::needless_for_each,
    clippy::redundant_closure_for_method_calls,
    clippy::semicolon_if_nothing_returned,
    clippy::unreadable_literal,
    clippy::unwrap_used,
    clippy::expect_used,
    deprecated_in_future,
    ellipsis_inclusive_range_patterns,
    future_incompatible,
    missing_copy_implementations,
    missing_debug_implementations,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2018_idioms,
    rust_2021_compatibility,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused,
    variant_size_differences
)]

use anyhow::{Context, Result};
use presenter::{prelude::*, trace};
use std::time::Instant;
use winit::{
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::EventLoop,
    window::{Window, WindowBuilder},
};

const APPLICATION_NAME: &str = "Presenter Viewer";
const WINDOW_WIDTH: u32 = 1024;
const WINDOW_HEIGHT: u32 = 768;

fn main() -> Result<()> {
    let config = Config::new();
    let _trace = trace::initialize(&config);

    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title(APPLICATION_NAME)
        .with_inner_size(winit::dpi::PhysicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT))
        .build(&event_loop)
        .context("failed to create window")?;

    run(event_loop, window, config)
}

#[cfg(target_os = "windows")]
fn run(event_loop: EventLoop<()>, window: Window, config: Config) -> Result<()> {
    use presenter::backend::d3d12::{window_handle, D3d12, D3d12Device, Win32Windows};
    use winit::platform::windows::WindowExtWindows;

    let device = D3d12Device::create_default()?;
    let queue = device.create_queue()?;
    let handle = window_handle(window.hwnd());
    let presenter = Presenter::<D3d12>::new(device, queue, Win32Windows, config)?;
    drive(event_loop, window, presenter, handle, |_| {})
}

#[cfg(not(target_os = "windows"))]
fn run(event_loop: EventLoop<()>, window: Window, config: Config) -> Result<()> {
    use presenter::backend::software::{Software, SoftwareDevice};

    let device = SoftwareDevice::new();
    let windows = device.windows();
    let size = window.inner_size();
    let handle = windows.open(PhysicalSize::new(size.width, size.height));

    // The software window mirrors the size winit reports.
    let host = windows.clone();
    let presenter =
        Presenter::<Software>::new(device.clone(), device.queue(), windows, config)?;
    drive(event_loop, window, presenter, handle, move |size| {
        host.set_size(handle, size);
    })
}

fn drive<B: Backend>(
    event_loop: EventLoop<()>,
    window: Window,
    mut presenter: Presenter<B>,
    handle: B::Window,
    mut on_resized: impl FnMut(PhysicalSize<u32>) + 'static,
) -> Result<()> {
    let surface = presenter.create_surface(handle, true);
    if surface.is_null() {
        anyhow::bail!("failed to create a surface for the viewer window");
    }
    tracing::info!("created surface {surface}");

    let start = Instant::now();
    let mut presenter = Some(presenter);
    event_loop.run(move |event, _window_target, control_flow| {
        control_flow.set_poll();

        if let Event::LoopDestroyed = event {
            tracing::info!("shutting down...");
            drop(presenter.take());
            return;
        }
        let Some(presenter) = presenter.as_mut() else {
            return;
        };

        match event {
            Event::MainEventsCleared => window.request_redraw(),
            Event::RedrawRequested(_) => {
                presenter.resize_if_needed(surface);
                if !presenter.is_visible(surface) {
                    return;
                }
                let t = start.elapsed().as_secs_f32();
                presenter.bind(surface, true);
                presenter.clear_color(
                    surface,
                    [
                        0.5 + 0.5 * t.sin(),
                        0.5 + 0.5 * (t * 0.7).sin(),
                        0.5 + 0.5 * (t * 1.3).sin(),
                        1.0,
                    ],
                );
                presenter.clear_depth_stencil(surface, 1.0, 0);
                presenter.flip(surface);
            }
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::Resized(size) => {
                    on_resized(PhysicalSize::new(size.width, size.height));
                }
                WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            virtual_keycode: Some(VirtualKeyCode::Escape),
                            state: ElementState::Pressed,
                            ..
                        },
                    ..
                }
                | WindowEvent::CloseRequested
                | WindowEvent::Destroyed => {
                    tracing::debug!("window closed or destroyed");
                    control_flow.set_exit();
                }
                _ => (),
            },
            _ => (),
        }
    })
}
