//! # Sync Module
//!
//! Semaphores and fences that bound how many frames are in flight at once.

use log::debug;
use vulkanalia::prelude::v1_0::*;

use super::error::{PlatformContext, Result};
use super::rollback::Rollback;

/// Index of the frame slot in use. Wraps around after `len` frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameCounter {
    current: usize,
    len: usize,
}

impl FrameCounter {
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "frame counter needs at least one slot");
        Self { current: 0, len }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.len;
    }
}

/// Per-slot synchronization objects plus the fence each swapchain image was last submitted with.
pub struct FrameSync {
    pub image_available: Vec<vk::Semaphore>,
    pub render_finished: Vec<vk::Semaphore>,
    pub in_flight: Vec<vk::Fence>,
    /// Null until the image is first used.
    pub images_in_flight: Vec<vk::Fence>,
    pub counter: FrameCounter,
}

impl FrameSync {
    pub fn create(device: &Device, frames_in_flight: usize, image_count: usize) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Signaled so the first wait on each slot returns immediately.
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let mut sync = Self {
            image_available: Vec::with_capacity(frames_in_flight),
            render_finished: Vec::with_capacity(frames_in_flight),
            in_flight: Vec::with_capacity(frames_in_flight),
            images_in_flight: vec![vk::Fence::null(); image_count],
            counter: FrameCounter::new(frames_in_flight),
        };

        let mut rollback = Rollback::default();

        for _ in 0..frames_in_flight {
            let image_available = unsafe { device.create_semaphore(&semaphore_info, None) }
                .context("failed to create a semaphore")?;
            rollback.push(move || unsafe { device.destroy_semaphore(image_available, None) });

            let render_finished = unsafe { device.create_semaphore(&semaphore_info, None) }
                .context("failed to create a semaphore")?;
            rollback.push(move || unsafe { device.destroy_semaphore(render_finished, None) });

            let in_flight = unsafe { device.create_fence(&fence_info, None) }
                .context("failed to create a fence")?;
            rollback.push(move || unsafe { device.destroy_fence(in_flight, None) });

            sync.image_available.push(image_available);
            sync.render_finished.push(render_finished);
            sync.in_flight.push(in_flight);
        }

        rollback.commit();
        debug!("Synchronization objects created for {frames_in_flight} frames in flight.");

        Ok(sync)
    }

    pub fn destroy(&self, device: &Device) {
        unsafe {
            for &semaphore in self.image_available.iter().chain(&self.render_finished) {
                device.destroy_semaphore(semaphore, None);
            }
            for &fence in &self.in_flight {
                device.destroy_fence(fence, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_wraps_modulo_pool_size() {
        let mut counter = FrameCounter::new(2);
        let mut seen = Vec::new();

        for _ in 0..5 {
            seen.push(counter.current());
            counter.advance();
        }

        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn single_slot_counter_stays_put() {
        let mut counter = FrameCounter::new(1);
        counter.advance();
        counter.advance();
        assert_eq!(counter.current(), 0);
    }

    #[test]
    #[should_panic(expected = "at least one slot")]
    fn empty_pool_is_rejected() {
        FrameCounter::new(0);
    }
}
