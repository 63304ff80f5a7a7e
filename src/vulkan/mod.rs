//! # Vulkan Module
//!
//! Everything between the window and the GPU. Startup runs strictly in order: instance and
//! debug messenger, surface, physical device selection, logical device, swapchain, pipeline,
//! framebuffers, command buffers and sync objects. All of it lives in a [`Renderer`], which tears
//! it down again in reverse when dropped.

pub mod commands;
pub mod context;
pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod renderer;
pub mod rollback;
pub mod swapchain;
pub mod sync;

pub use renderer::Renderer;
