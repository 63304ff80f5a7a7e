//! # Vulka
//!
//! This binary uses [`winit`] for cross-platform window management, and [`vulkanalia`] for FFI
//! to the Vulkan API. It picks the most capable GPU that can present to the window, negotiates a
//! swapchain with the surface and draws a single hardcoded triangle until the window is closed.
//!
//! Logging goes through [`log`]; set `RUST_LOG` (defaults to `info`) to see more, e.g.
//! `RUST_LOG=debug` for device scores and `RUST_LOG=validation=trace` for every validation layer
//! message.

mod config;
mod input;
mod vulkan;
mod window;

use std::process::ExitCode;

use log::{error, info};
use window::Window;
use winit::event_loop::{ControlFlow, EventLoop};

use config::AppConfig;

fn init_logging() {
    pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();
}

fn run() -> anyhow::Result<()> {
    let mut window = Window::new(AppConfig::default());
    let event_loop = EventLoop::new()?;

    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop.run_app(&mut window)?;

    match window.take_error() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    init_logging();

    info!("Vulka is warming up.");

    match run() {
        Ok(()) => {
            info!("Vulka is offline.");
            ExitCode::SUCCESS
        }
        Err(error) => {
            error!("Vulka stopped: {error:#}");
            ExitCode::FAILURE
        }
    }
}
