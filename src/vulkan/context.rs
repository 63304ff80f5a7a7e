//! # Context Module
//!
//! [`VulkanContext`] owns the handles every other part of the renderer is built on: the loader
//! entry, instance, debug messenger, window surface, chosen physical device, logical device and
//! its queues. Everything downstream receives what it needs from here explicitly.

use log::{debug, info, warn};
use vulkanalia::loader::{LIBRARY, LibloadingLoader};
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::{ExtDebugUtilsExtension, KhrSurfaceExtension};
use vulkanalia::window as vk_window;
use winit::window::Window as WinitWindow;

use super::device::{self, QueueFamilies};
use super::error::{PlatformContext, Result, VulkanError};
use super::instance;
use super::rollback::Rollback;
use crate::config::AppConfig;

pub struct VulkanContext {
    /// Keeps the loader library alive for as long as the instance exists.
    #[allow(dead_code)]
    pub entry: Entry,
    pub instance: Instance,
    pub messenger: Option<vk::DebugUtilsMessengerEXT>,
    pub surface: vk::SurfaceKHR,
    pub physical_device: vk::PhysicalDevice,
    pub device: Device,
    pub queue_families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

impl VulkanContext {
    /// Loads Vulkan and walks through instance, surface, device selection and logical device
    /// creation in that order.
    pub fn new(window: &WinitWindow, config: &AppConfig) -> Result<Self> {
        let loader = unsafe { LibloadingLoader::new(LIBRARY) }
            .map_err(|e| VulkanError::Loader(e.to_string()))?;
        let entry =
            unsafe { Entry::new(loader) }.map_err(|e| VulkanError::Loader(e.to_string()))?;

        let (instance, messenger) = instance::create_instance(&entry, window, config.validation)?;

        let mut rollback = Rollback::default();
        rollback.push(|| unsafe { destroy_instance(&instance, messenger) });

        let surface = unsafe { vk_window::create_surface(&instance, window, window) }
            .context("failed to create window surface")?;
        rollback.push({
            let instance = &instance;
            move || unsafe { instance.destroy_surface_khr(surface, None) }
        });
        debug!("Window surface created.");

        let (physical_device, queue_families) =
            device::pick_physical_device(&instance, surface, &config.device)?;

        let (device, graphics_queue, present_queue) = device::create_logical_device(
            &entry,
            &instance,
            physical_device,
            queue_families,
            &config.device,
            config.validation,
        )?;

        rollback.commit();
        info!("Vulkan context ready.");

        Ok(Self {
            entry,
            instance,
            messenger,
            surface,
            physical_device,
            device,
            queue_families,
            graphics_queue,
            present_queue,
        })
    }
}

/// Destroys the logical device, debug messenger, surface and instance, in that order. Every
/// object created from the device must already be gone.
impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            if let Err(code) = self.device.device_wait_idle() {
                warn!("Device did not reach idle before it was destroyed: {code}");
            }
            self.device.destroy_device(None);

            if let Some(messenger) = self.messenger.take() {
                self.instance.destroy_debug_utils_messenger_ext(messenger, None);
            }

            self.instance.destroy_surface_khr(self.surface, None);
            self.instance.destroy_instance(None);
        }
        debug!("Vulkan context destroyed.");
    }
}

/// Undoes [`instance::create_instance`].
unsafe fn destroy_instance(instance: &Instance, messenger: Option<vk::DebugUtilsMessengerEXT>) {
    unsafe {
        if let Some(messenger) = messenger {
            instance.destroy_debug_utils_messenger_ext(messenger, None);
        }
        instance.destroy_instance(None);
    }
}
