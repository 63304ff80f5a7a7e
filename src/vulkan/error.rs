//! # Vulkan Errors
//!
//! Every failure the renderer can hit during startup or while drawing. None of them are
//! recoverable: the application logs the error and shuts down.

use thiserror::Error;
use vulkanalia::vk;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum VulkanError {
    /// Validation was requested but the layer is not installed.
    #[error("validation layer `{0}` requested but not available")]
    MissingValidationLayer(vk::ExtensionName),

    /// The instance enumerated zero physical devices.
    #[error("failed to find GPUs with Vulkan support")]
    NoDevices,

    /// Every physical device was disqualified, or the best one scored zero.
    #[error("failed to find a GPU suitable for rendering")]
    NoSuitableDevice,

    /// A Vulkan call returned a non-success code.
    #[error("{context}: {code}")]
    Platform {
        context: &'static str,
        code: vk::ErrorCode,
    },

    /// The Vulkan loader library could not be opened or initialized.
    #[error("failed to load Vulkan: {0}")]
    Loader(String),

    /// Embedded SPIR-V failed validation before module creation.
    #[error("invalid shader bytecode: {0}")]
    Bytecode(String),
}

pub type Result<T> = std::result::Result<T, VulkanError>;

/// Attaches a static call-site description to a failed Vulkan call.
pub trait PlatformContext<T> {
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T> PlatformContext<T> for std::result::Result<T, vk::ErrorCode> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|code| VulkanError::Platform { context, code })
    }
}
