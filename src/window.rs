//! # Window Module
//!
//! The `window` module uses [`winit`] to create the application window and poll events from the
//! user and OS. The window owns the [`Renderer`], creating it once the event loop resumes and
//! dropping it before the window itself goes away.

use anyhow::Context;
use log::{debug, info};
use thiserror::Error;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    error::OsError,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    keyboard::PhysicalKey,
    window::{Window as WinitWindow, WindowId},
};

use crate::config::AppConfig;
use crate::input::Input;
use crate::vulkan::Renderer;

/// Custom error types for winit.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum WindowError {
    /// Caller attempted to reference the winit window before it was created.
    #[error("Window has not been created yet.")]
    NotInitialized,

    /// The platform refused to create the window.
    #[error("Failed to create window: {0}")]
    Creation(#[from] OsError),
}

pub struct Window {
    config: AppConfig,
    input: Input,
    /// Declared before `inner` so the surface is destroyed before the window it was made from.
    renderer: Option<Renderer>,
    /// The winit window object
    inner: Option<WinitWindow>,
    /// The failure that stopped the event loop, if any.
    error: Option<anyhow::Error>,
}

impl Window {
    pub fn new(config: AppConfig) -> Self {
        Self {
            input: Input::new(config.close_keys.clone()),
            config,
            renderer: None,
            inner: None,
            error: None,
        }
    }

    /// Gets a reference to the winit window object.
    ///
    /// # Errors
    ///
    /// - [`WindowError::NotInitialized`]
    pub fn window(&self) -> Result<&WinitWindow, WindowError> {
        self.inner.as_ref().ok_or(WindowError::NotInitialized)
    }

    /// Takes the error that ended the event loop, if it ended because of one.
    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let attributes = WinitWindow::default_attributes()
            .with_title(self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(false);

        let window = event_loop
            .create_window(attributes)
            .map_err(WindowError::from)?;
        debug!("Window created.");

        let renderer =
            Renderer::new(&window, &self.config).context("failed to initialize Vulkan")?;

        self.inner = Some(window);
        self.renderer = Some(renderer);

        Ok(())
    }

    fn redraw(&mut self) -> anyhow::Result<()> {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.render().context("failed to draw frame")?;
        }

        Ok(())
    }

    /// Keeps the error for `main` to report and stops the event loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        self.error = Some(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for Window {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.inner.is_some() {
            return;
        }

        if let Err(error) = self.init(event_loop) {
            self.fail(event_loop, error);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("The close button was pressed; stopping");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.input.key_changed(key, event.state);
                }

                if self.input.close_requested() {
                    info!("Close keys were pressed; stopping");
                    event_loop.exit();
                }
            }
            WindowEvent::Focused(false) => self.input.clear(),
            WindowEvent::RedrawRequested => {
                if let Err(error) = self.redraw() {
                    self.fail(event_loop, error);
                }
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Ok(window) = self.window() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Waits for the device to go idle and releases every Vulkan object.
        self.renderer.take();
    }
}
