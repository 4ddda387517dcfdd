// SPDX-License-Identifier: CEPL-1.0
//! winit window and the event pump the frame scheduler polls during a
//! swapchain rebuild.

use std::time::Duration;

use anyhow::{anyhow, Result};
use swapframe_render::{FramebufferSource, RenderSize};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::error::OsError;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowAttributes, WindowId};

pub use winit;

/// Window-side state updated from winit callbacks.
pub struct WindowState {
    attributes: WindowAttributes,
    window: Option<Window>,
    resized: bool,
    close_requested: bool,
    vsync_toggled: bool,
    create_error: Option<OsError>,
}

impl WindowState {
    fn new(attributes: WindowAttributes) -> Self {
        Self {
            attributes,
            window: None,
            resized: false,
            close_requested: false,
            vsync_toggled: false,
            create_error: None,
        }
    }

    /// Zero while minimized, also once a close has been requested.
    fn framebuffer_size(&self) -> RenderSize {
        let size = self.window.as_ref().map(Window::inner_size).unwrap_or_default();
        RenderSize::new(size.width, size.height)
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                let size = window.inner_size();
                info!("window created: {}x{}", size.width, size.height);
                self.window = Some(window);
            }
            Err(e) => {
                error!("create_window failed: {e}");
                self.create_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                debug!("Resized → {}x{}", size.width, size.height);
                self.resized = true;
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match logical_key.as_ref() {
                Key::Named(NamedKey::Escape) => self.close_requested = true,
                Key::Character(c) if c.eq_ignore_ascii_case("v") => self.vsync_toggled = true,
                _ => {}
            },
            _ => {}
        }
    }
}

/// The event loop and its single window.
pub struct Platform {
    event_loop: EventLoop<()>,
    state: WindowState,
}

impl Platform {
    /// Open a window and pump events until it exists.
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        let attributes = Window::default_attributes()
            .with_title(title)
            .with_inner_size(LogicalSize::new(width, height));
        let mut platform = Self {
            event_loop,
            state: WindowState::new(attributes),
        };

        while platform.state.window.is_none() {
            let status = platform
                .event_loop
                .pump_app_events(Some(Duration::from_millis(16)), &mut platform.state);
            if let Some(e) = platform.state.create_error.take() {
                return Err(e.into());
            }
            if let PumpStatus::Exit(code) = status {
                return Err(anyhow!("event loop exited with {code} before a window appeared"));
            }
        }
        Ok(platform)
    }

    pub fn window(&self) -> Option<&Window> {
        self.state.window.as_ref()
    }

    pub fn framebuffer_size(&self) -> RenderSize {
        self.state.framebuffer_size()
    }

    /// Handle pending events without blocking. False once the window should
    /// close.
    pub fn pump(&mut self) -> bool {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);
        !matches!(status, PumpStatus::Exit(_)) && !self.state.close_requested
    }

    /// Whether V was pressed since the last call.
    pub fn take_vsync_toggle(&mut self) -> bool {
        std::mem::take(&mut self.state.vsync_toggled)
    }

    /// The [`FramebufferSource`] for this window.
    pub fn events(&mut self) -> WindowPump<'_> {
        WindowPump {
            event_loop: &mut self.event_loop,
            state: &mut self.state,
        }
    }
}

/// Borrowed view of the platform handed to the frame scheduler.
pub struct WindowPump<'a> {
    event_loop: &'a mut EventLoop<()>,
    state: &'a mut WindowState,
}

impl FramebufferSource for WindowPump<'_> {
    fn framebuffer_size(&mut self) -> RenderSize {
        self.state.framebuffer_size()
    }

    fn wait_events(&mut self) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(None, &mut *self.state) {
            debug!("event loop exited with {code} while waiting");
            self.state.close_requested = true;
        }
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.state.resized)
    }

    fn close_requested(&self) -> bool {
        self.state.close_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windowless_state_reports_an_empty_framebuffer() {
        let mut state = WindowState::new(WindowAttributes::default());
        assert!(state.framebuffer_size().is_zero());
        state.close_requested = true;
        // no stand-in size while closing; the scheduler checks the close flag
        assert!(state.framebuffer_size().is_zero());
    }
}
