//! # Instance Module
//!
//! Creates the Vulkan instance and, when validation is on, the debug messenger that forwards
//! validation layer output to [`log`].

use std::collections::HashSet;
use std::ffi::{CStr, c_void};

use log::{debug, error, trace, warn};
use vulkanalia::Version;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::ExtDebugUtilsExtension;
use vulkanalia::window as vk_window;
use winit::window::Window as WinitWindow;

use super::error::{PlatformContext, Result, VulkanError};
use crate::config::{APP_NAME, APP_VERSION};

pub const VALIDATION_LAYER: vk::ExtensionName =
    vk::ExtensionName::from_bytes(b"VK_LAYER_KHRONOS_validation");

/// First SDK version on macOS that hides portability drivers unless asked for them.
pub const PORTABILITY_MACOS_VERSION: Version = Version::new(1, 3, 216);

/// Log target for messages coming out of the validation layers.
const VALIDATION_TARGET: &str = "validation";

/// Fails with [`VulkanError::MissingValidationLayer`] when the loader does not know the layer.
fn check_validation_support(entry: &Entry) -> Result<()> {
    let available = unsafe { entry.enumerate_instance_layer_properties() }
        .context("failed to enumerate instance layers")?
        .iter()
        .map(|layer| layer.layer_name)
        .collect::<HashSet<_>>();

    if available.contains(&VALIDATION_LAYER) {
        Ok(())
    } else {
        Err(VulkanError::MissingValidationLayer(VALIDATION_LAYER))
    }
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXTBuilder<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .user_callback(Some(debug_callback))
}

/// Creates the instance with the extensions the window needs. Returns the debug messenger too
/// when `validation` is set.
pub fn create_instance(
    entry: &Entry,
    window: &WinitWindow,
    validation: bool,
) -> Result<(Instance, Option<vk::DebugUtilsMessengerEXT>)> {
    if validation {
        check_validation_support(entry)?;
    }

    let (major, minor, patch) = APP_VERSION;
    let application_info = vk::ApplicationInfo::builder()
        .application_name(APP_NAME)
        .application_version(vk::make_version(major, minor, patch))
        .engine_name(b"No Engine\0")
        .engine_version(vk::make_version(1, 0, 0))
        .api_version(vk::make_version(1, 1, 0));

    let layers = if validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let mut extensions = vk_window::get_required_instance_extensions(window)
        .iter()
        .map(|name| name.as_ptr())
        .collect::<Vec<_>>();

    let version = unsafe { entry.version() }.context("failed to query Vulkan version")?;
    let flags = if cfg!(target_os = "macos") && version >= PORTABILITY_MACOS_VERSION {
        extensions.push(vk::KHR_GET_PHYSICAL_DEVICE_PROPERTIES2_EXTENSION.name.as_ptr());
        extensions.push(vk::KHR_PORTABILITY_ENUMERATION_EXTENSION.name.as_ptr());
        vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
    } else {
        vk::InstanceCreateFlags::empty()
    };

    if validation {
        extensions.push(vk::EXT_DEBUG_UTILS_EXTENSION.name.as_ptr());
    }

    let mut info = vk::InstanceCreateInfo::builder()
        .application_info(&application_info)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions)
        .flags(flags);

    // Chained so instance creation and destruction are covered by the messenger as well.
    let mut messenger_info = debug_messenger_info();
    if validation {
        info = info.push_next(&mut messenger_info);
    }

    let instance = match unsafe { entry.create_instance(&info, None) } {
        Ok(instance) => instance,
        Err(vk::ErrorCode::INCOMPATIBLE_DRIVER) => {
            return Err(VulkanError::Platform {
                context: "Vulkan drivers not found or graphics card is incompatible with Vulkan",
                code: vk::ErrorCode::INCOMPATIBLE_DRIVER,
            });
        }
        Err(code) => {
            return Err(VulkanError::Platform {
                context: "failed to create Vulkan instance",
                code,
            });
        }
    };

    debug!("Vulkan instance created.");

    let messenger = if validation {
        let messenger = unsafe { instance.create_debug_utils_messenger_ext(&messenger_info, None) }
            .context("failed to set up debug messenger")
            .inspect_err(|_| unsafe { instance.destroy_instance(None) })?;
        debug!("Validation layer callbacks set up.");
        Some(messenger)
    } else {
        None
    };

    Ok((instance, messenger))
}

extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    type_: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _: *mut c_void,
) -> vk::Bool32 {
    let data = unsafe { *data };
    let message = unsafe { CStr::from_ptr(data.message) }.to_string_lossy();

    if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        error!(target: VALIDATION_TARGET, "({type_:?}) {message}");
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        warn!(target: VALIDATION_TARGET, "({type_:?}) {message}");
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        debug!(target: VALIDATION_TARGET, "({type_:?}) {message}");
    } else {
        trace!(target: VALIDATION_TARGET, "({type_:?}) {message}");
    }

    vk::FALSE
}
