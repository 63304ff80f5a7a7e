//! # Commands Module
//!
//! Framebuffers for every swapchain image and the command buffers that draw into them. The
//! scene never changes, so each buffer is recorded once at startup and resubmitted every frame.

use log::debug;
use vulkanalia::prelude::v1_0::*;

use super::error::{PlatformContext, Result};
use super::pipeline::TrianglePipeline;
use super::rollback::Rollback;

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

pub fn create_framebuffers(
    device: &Device,
    render_pass: vk::RenderPass,
    image_views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut rollback = Rollback::default();
    let mut framebuffers = Vec::with_capacity(image_views.len());

    for &view in image_views {
        let attachments = &[view];
        let info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&info, None) }
            .context("failed to create framebuffer")?;
        rollback.push(move || unsafe { device.destroy_framebuffer(framebuffer, None) });
        framebuffers.push(framebuffer);
    }

    rollback.commit();
    debug!("Framebuffers created.");

    Ok(framebuffers)
}

pub fn destroy_framebuffers(device: &Device, framebuffers: &[vk::Framebuffer]) {
    for &framebuffer in framebuffers {
        unsafe { device.destroy_framebuffer(framebuffer, None) };
    }
}

/// The command pool on the graphics family and one pre-recorded buffer per framebuffer.
pub struct Commands {
    pub pool: vk::CommandPool,
    pub buffers: Vec<vk::CommandBuffer>,
}

impl Commands {
    pub fn create(
        device: &Device,
        graphics_family: u32,
        pipeline: &TrianglePipeline,
        framebuffers: &[vk::Framebuffer],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::empty())
            .queue_family_index(graphics_family);

        let pool = unsafe { device.create_command_pool(&pool_info, None) }
            .context("failed to create command pool")?;
        let mut rollback = Rollback::default();
        rollback.push(move || unsafe { device.destroy_command_pool(pool, None) });

        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(framebuffers.len() as u32);

        let buffers = unsafe { device.allocate_command_buffers(&allocate_info) }
            .context("failed to allocate command buffers")?;

        for (&buffer, &framebuffer) in buffers.iter().zip(framebuffers) {
            record(device, buffer, framebuffer, pipeline, extent)?;
        }

        rollback.commit();
        debug!("Command buffers recorded.");

        Ok(Self { pool, buffers })
    }

    /// Destroying the pool frees its buffers as well.
    pub fn destroy(&self, device: &Device) {
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

fn record(
    device: &Device,
    buffer: vk::CommandBuffer,
    framebuffer: vk::Framebuffer,
    pipeline: &TrianglePipeline,
    extent: vk::Extent2D,
) -> Result<()> {
    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);

    unsafe { device.begin_command_buffer(buffer, &begin_info) }
        .context("failed to begin recording a command buffer")?;

    let render_area = vk::Rect2D::builder()
        .offset(vk::Offset2D::default())
        .extent(extent);

    let clear_values = &[vk::ClearValue {
        color: vk::ClearColorValue {
            float32: CLEAR_COLOR,
        },
    }];

    let render_pass_info = vk::RenderPassBeginInfo::builder()
        .render_pass(pipeline.render_pass)
        .framebuffer(framebuffer)
        .render_area(render_area)
        .clear_values(clear_values);

    unsafe {
        device.cmd_begin_render_pass(buffer, &render_pass_info, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(buffer, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
        device.cmd_draw(buffer, 3, 1, 0, 0);
        device.cmd_end_render_pass(buffer);
    }

    unsafe { device.end_command_buffer(buffer) }.context("failed to record a command buffer")
}
