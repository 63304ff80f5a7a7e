//! # Renderer Module
//!
//! Ties the context, swapchain, pipeline, command buffers and sync objects together and drives
//! one frame per [`Renderer::render`] call. Dropping the renderer waits for the GPU to go idle
//! and releases everything in the reverse order it was created.

use log::{info, warn};
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::KhrSwapchainExtension;
use winit::window::Window as WinitWindow;

use super::commands::{self, Commands};
use super::context::VulkanContext;
use super::error::{PlatformContext, Result};
use super::pipeline::TrianglePipeline;
use super::rollback::Rollback;
use super::swapchain::Swapchain;
use super::sync::FrameSync;
use crate::config::{AppConfig, MAX_FRAMES_IN_FLIGHT};

pub struct Renderer {
    context: VulkanContext,
    swapchain: Swapchain,
    pipeline: TrianglePipeline,
    framebuffers: Vec<vk::Framebuffer>,
    commands: Commands,
    sync: FrameSync,
}

impl Renderer {
    pub fn new(window: &WinitWindow, config: &AppConfig) -> Result<Self> {
        let context = VulkanContext::new(window, config)?;

        let size = window.inner_size();
        let requested = vk::Extent2D {
            width: size.width,
            height: size.height,
        };

        let swapchain = Swapchain::create(
            &context.instance,
            &context.device,
            context.physical_device,
            context.surface,
            context.queue_families,
            requested,
        )?;

        let format = swapchain.config.surface_format.format;
        let extent = swapchain.config.extent;
        let device = &context.device;

        // Dropped before `context` if a later step fails.
        let mut rollback = Rollback::default();
        rollback.push(|| swapchain.destroy(device));

        let pipeline = TrianglePipeline::create(device, format, extent)?;
        rollback.push(move || pipeline.destroy(device));

        let framebuffers = commands::create_framebuffers(
            device,
            pipeline.render_pass,
            &swapchain.image_views,
            extent,
        )?;
        rollback.push({
            let framebuffers = framebuffers.clone();
            move || commands::destroy_framebuffers(device, &framebuffers)
        });

        let commands = Commands::create(
            device,
            context.queue_families.graphics,
            &pipeline,
            &framebuffers,
            extent,
        )?;
        let pool = commands.pool;
        rollback.push(move || unsafe { device.destroy_command_pool(pool, None) });

        let sync = FrameSync::create(device, MAX_FRAMES_IN_FLIGHT, swapchain.images.len())?;

        rollback.commit();
        info!("Renderer initialized.");

        Ok(Self {
            context,
            swapchain,
            pipeline,
            framebuffers,
            commands,
            sync,
        })
    }

    /// Waits for the current frame slot, then submits and presents the next swapchain image.
    pub fn render(&mut self) -> Result<()> {
        let device = &self.context.device;
        let frame = self.sync.counter.current();
        let in_flight = self.sync.in_flight[frame];

        unsafe { device.wait_for_fences(&[in_flight], true, u64::MAX) }
            .context("failed to wait for in-flight fence")?;

        let image_index = unsafe {
            device.acquire_next_image_khr(
                self.swapchain.handle,
                u64::MAX,
                self.sync.image_available[frame],
                vk::Fence::null(),
            )
        }
        .context("failed to acquire swap chain image")?
        .0 as usize;

        // An earlier frame slot may still be rendering into this image.
        let image_fence = self.sync.images_in_flight[image_index];
        if !image_fence.is_null() {
            unsafe { device.wait_for_fences(&[image_fence], true, u64::MAX) }
                .context("failed to wait for swap chain image fence")?;
        }
        self.sync.images_in_flight[image_index] = in_flight;

        let wait_semaphores = &[self.sync.image_available[frame]];
        let wait_stages = &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = &[self.commands.buffers[image_index]];
        let signal_semaphores = &[self.sync.render_finished[frame]];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);

        unsafe {
            device
                .reset_fences(&[in_flight])
                .context("failed to reset in-flight fence")?;
            device
                .queue_submit(self.context.graphics_queue, &[submit_info], in_flight)
                .context("failed to submit draw command buffer")?;
        }

        let swapchains = &[self.swapchain.handle];
        let image_indices = &[image_index as u32];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(signal_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);

        unsafe { device.queue_present_khr(self.context.present_queue, &present_info) }
            .context("failed to present swap chain image")?;

        self.sync.counter.advance();

        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let device = &self.context.device;

        if let Err(code) = unsafe { device.device_wait_idle() } {
            warn!("Device did not reach idle before shutdown: {code}");
        }

        self.sync.destroy(device);
        self.commands.destroy(device);
        commands::destroy_framebuffers(device, &self.framebuffers);
        self.pipeline.destroy(device);
        self.swapchain.destroy(device);

        // `context` is dropped after this and destroys the device and everything above it.
        info!("Cleanup complete.");
    }
}
