//! # Config Module
//!
//! Fixed startup settings for the application. Nothing here is read from the command line or a
//! file; the log filter is the only runtime knob and comes from `RUST_LOG`.

use vulkanalia::vk;
use winit::keyboard::KeyCode;

/// Device extensions every candidate GPU must expose.
pub const DEVICE_EXTENSIONS: &[vk::ExtensionName] = &[vk::KHR_SWAPCHAIN_EXTENSION.name];

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

pub const WINDOW_TITLE: &str = "Vulka!";
pub const WINDOW_WIDTH: u32 = 1024;
pub const WINDOW_HEIGHT: u32 = 768;

/// Application name and version reported to the driver.
pub const APP_NAME: &[u8] = b"Vulka\0";
pub const APP_VERSION: (u32, u32, u32) = (0, 1, 0);

/// What a physical device has to support to be considered at all.
#[derive(Clone, Debug)]
pub struct DeviceRequirements {
    pub extensions: &'static [vk::ExtensionName],
    pub geometry_shader: bool,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            extensions: DEVICE_EXTENSIONS,
            geometry_shader: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub title: &'static str,
    /// Requested window size in physical pixels.
    pub width: u32,
    pub height: u32,
    /// Enables `VK_LAYER_KHRONOS_validation` and the debug messenger.
    pub validation: bool,
    /// All of these keys held at once close the window. Empty disables the chord.
    pub close_keys: Vec<KeyCode>,
    pub device: DeviceRequirements,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: WINDOW_TITLE,
            width: WINDOW_WIDTH,
            height: WINDOW_HEIGHT,
            validation: cfg!(debug_assertions),
            close_keys: vec![KeyCode::Escape],
            device: DeviceRequirements::default(),
        }
    }
}

