//! # Swapchain Module
//!
//! Negotiates the swapchain configuration from what the surface supports and creates the
//! swapchain, its images and one view per image.

use log::debug;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::{KhrSurfaceExtension, KhrSwapchainExtension};

use super::device::QueueFamilies;
use super::error::{PlatformContext, Result};
use super::rollback::Rollback;

/// Used whenever the surface does not insist on a format of its own.
pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// What a device supports when presenting to a particular surface.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                capabilities: instance
                    .get_physical_device_surface_capabilities_khr(physical_device, surface)
                    .context("failed to query surface capabilities")?,
                formats: instance
                    .get_physical_device_surface_formats_khr(physical_device, surface)
                    .context("failed to query surface formats")?,
                present_modes: instance
                    .get_physical_device_surface_present_modes_khr(physical_device, surface)
                    .context("failed to query surface present modes")?,
            })
        }
    }
}

fn same_format(a: &vk::SurfaceFormatKHR, b: &vk::SurfaceFormatKHR) -> bool {
    a.format == b.format && a.color_space == b.color_space
}

/// A lone `UNDEFINED` entry means the surface takes anything, so we get [`PREFERRED_FORMAT`].
/// Otherwise the preferred format if listed, else whatever the surface lists first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return PREFERRED_FORMAT;
        }
    }

    formats
        .iter()
        .find(|format| same_format(format, &PREFERRED_FORMAT))
        .or_else(|| formats.first())
        .copied()
        .unwrap_or(PREFERRED_FORMAT)
}

/// Mailbox if available, then immediate, then FIFO, which every surface supports.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    let mut best = vk::PresentModeKHR::FIFO;

    for &mode in present_modes {
        if mode == vk::PresentModeKHR::MAILBOX {
            return mode;
        } else if mode == vk::PresentModeKHR::IMMEDIATE {
            best = mode;
        }
    }

    best
}

/// Uses the surface's current extent unless it is the `u32::MAX` sentinel, in which case the
/// requested size is clamped into the supported range. The minimum wins if the bounds cross.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;

    vk::Extent2D {
        width: requested.width.min(max.width).max(min.width),
        height: requested.height.min(max.height).max(min.height),
    }
}

/// One image more than the minimum so we are not left waiting on the driver. A maximum of zero
/// means unbounded.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count.saturating_add(1);

    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        count
    }
}

/// How swapchain images are shared between the graphics and present queues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SharingMode {
    Exclusive,
    Concurrent([u32; 2]),
}

impl SharingMode {
    pub fn for_families(families: QueueFamilies) -> Self {
        if families.graphics == families.present {
            Self::Exclusive
        } else {
            Self::Concurrent([families.graphics, families.present])
        }
    }

    pub fn mode(&self) -> vk::SharingMode {
        match self {
            Self::Exclusive => vk::SharingMode::EXCLUSIVE,
            Self::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    /// Family indices to attach to the create info. Empty for exclusive sharing.
    pub fn queue_family_indices(&self) -> &[u32] {
        match self {
            Self::Exclusive => &[],
            Self::Concurrent(indices) => indices,
        }
    }
}

/// The negotiated swapchain parameters.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing: SharingMode,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainConfig {
    pub fn negotiate(
        support: &SurfaceSupport,
        requested: vk::Extent2D,
        families: QueueFamilies,
    ) -> Self {
        Self {
            surface_format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, requested),
            image_count: choose_image_count(&support.capabilities),
            sharing: SharingMode::for_families(families),
            pre_transform: support.capabilities.current_transform,
        }
    }
}

/// The swapchain and the per-image views the framebuffers are built on.
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub config: SwapchainConfig,
}

impl Swapchain {
    pub fn create(
        instance: &Instance,
        device: &Device,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        families: QueueFamilies,
        requested: vk::Extent2D,
    ) -> Result<Self> {
        // Queried again rather than reused from selection.
        let support = SurfaceSupport::query(instance, physical_device, surface)?;
        let config = SwapchainConfig::negotiate(&support, requested, families);

        debug!(
            "Swapchain negotiated: {:?} / {:?}, {:?}, {}x{}, {} images, {:?} sharing.",
            config.surface_format.format,
            config.surface_format.color_space,
            config.present_mode,
            config.extent.width,
            config.extent.height,
            config.image_count,
            config.sharing.mode(),
        );

        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(config.sharing.mode())
            .queue_family_indices(config.sharing.queue_family_indices())
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let handle = unsafe { device.create_swapchain_khr(&info, None) }
            .context("failed to create swap chain")?;

        let mut rollback = Rollback::default();
        rollback.push(move || unsafe { device.destroy_swapchain_khr(handle, None) });

        // The driver may have created more images than we asked for.
        let images = unsafe { device.get_swapchain_images_khr(handle) }
            .context("failed to get swap chain images")?;

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view = create_image_view(device, image, config.surface_format.format)?;
            rollback.push(move || unsafe { device.destroy_image_view(view, None) });
            image_views.push(view);
        }

        rollback.commit();

        debug!("Swapchain created with {} images.", images.len());

        Ok(Self {
            handle,
            images,
            image_views,
            config,
        })
    }

    /// Destroys the image views, then the swapchain itself.
    pub fn destroy(&self, device: &Device) {
        unsafe {
            for &view in &self.image_views {
                device.destroy_image_view(view, None);
            }
            device.destroy_swapchain_khr(self.handle, None);
        }
    }
}

fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let components = vk::ComponentMapping::builder()
        .r(vk::ComponentSwizzle::IDENTITY)
        .g(vk::ComponentSwizzle::IDENTITY)
        .b(vk::ComponentSwizzle::IDENTITY)
        .a(vk::ComponentSwizzle::IDENTITY);

    let subresource_range = vk::ImageSubresourceRange::builder()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1);

    let info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::_2D)
        .format(format)
        .components(components)
        .subresource_range(subresource_range);

    unsafe { device.create_image_view(&info, None) }.context("failed to create an image view")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn capabilities(current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: current,
            min_image_extent: extent(800, 600),
            max_image_extent: extent(2000, 1500),
            ..Default::default()
        }
    }

    fn assert_extent(actual: vk::Extent2D, width: u32, height: u32) {
        assert_eq!((actual.width, actual.height), (width, height));
    }

    #[test]
    fn undefined_format_becomes_preferred_default() {
        let chosen = choose_surface_format(&[format(
            vk::Format::UNDEFINED,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )]);

        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn preferred_format_wins_over_list_order() {
        let formats = [
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let chosen = choose_surface_format(&formats);
        assert!(same_format(&chosen, &PREFERRED_FORMAT));
    }

    #[test]
    fn unmatched_formats_fall_back_to_first() {
        let formats = [
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT);
    }

    #[test]
    fn mailbox_beats_immediate_in_any_order() {
        use vk::PresentModeKHR as Mode;

        assert_eq!(choose_present_mode(&[Mode::IMMEDIATE, Mode::MAILBOX]), Mode::MAILBOX);
        assert_eq!(choose_present_mode(&[Mode::MAILBOX, Mode::IMMEDIATE]), Mode::MAILBOX);
        assert_eq!(
            choose_present_mode(&[Mode::FIFO, Mode::IMMEDIATE, Mode::FIFO_RELAXED, Mode::MAILBOX]),
            Mode::MAILBOX
        );
    }

    #[test]
    fn immediate_beats_fifo() {
        use vk::PresentModeKHR as Mode;

        assert_eq!(choose_present_mode(&[Mode::FIFO, Mode::IMMEDIATE]), Mode::IMMEDIATE);
        assert_eq!(choose_present_mode(&[Mode::IMMEDIATE, Mode::FIFO]), Mode::IMMEDIATE);
    }

    #[test]
    fn fifo_is_the_default() {
        use vk::PresentModeKHR as Mode;

        assert_eq!(choose_present_mode(&[Mode::FIFO]), Mode::FIFO);
        assert_eq!(choose_present_mode(&[Mode::FIFO_RELAXED, Mode::FIFO]), Mode::FIFO);
        assert_eq!(choose_present_mode(&[]), Mode::FIFO);
    }

    #[test]
    fn current_extent_is_used_verbatim() {
        let caps = capabilities(extent(1024, 768));
        assert_extent(choose_extent(&caps, extent(1024, 768)), 1024, 768);

        // The platform dictates the size even when it differs from the window.
        assert_extent(choose_extent(&caps, extent(50, 50)), 1024, 768);
    }

    #[test]
    fn sentinel_extent_clamps_requested_size() {
        let caps = capabilities(extent(u32::MAX, u32::MAX));

        assert_extent(choose_extent(&caps, extent(50, 50)), 800, 600);
        assert_extent(choose_extent(&caps, extent(4096, 4096)), 2000, 1500);
        assert_extent(choose_extent(&caps, extent(1024, 768)), 1024, 768);
        assert_extent(choose_extent(&caps, extent(50, 4096)), 800, 1500);
    }

    #[test]
    fn inverted_extent_bounds_resolve_to_minimum() {
        let mut caps = capabilities(extent(u32::MAX, u32::MAX));
        caps.min_image_extent = extent(800, 600);
        caps.max_image_extent = extent(640, 480);

        assert_extent(choose_extent(&caps, extent(1024, 768)), 800, 600);
        assert_extent(choose_extent(&caps, extent(50, 50)), 800, 600);
    }

    #[test]
    fn image_count_clamps_to_nonzero_maximum() {
        let mut caps = capabilities(extent(1024, 768));
        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);

        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn image_count_saturates_at_driver_minimum() {
        let mut caps = capabilities(extent(1024, 768));
        caps.min_image_count = u32::MAX;

        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps), u32::MAX);

        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 8);
    }

    #[test]
    fn sharing_mode_follows_queue_families() {
        let shared = SharingMode::for_families(QueueFamilies {
            graphics: 0,
            present: 0,
        });
        assert_eq!(shared, SharingMode::Exclusive);
        assert_eq!(shared.mode(), vk::SharingMode::EXCLUSIVE);
        assert!(shared.queue_family_indices().is_empty());

        let split = SharingMode::for_families(QueueFamilies {
            graphics: 0,
            present: 2,
        });
        assert_eq!(split.mode(), vk::SharingMode::CONCURRENT);
        assert_eq!(split.queue_family_indices(), &[0, 2]);
    }

    #[test]
    fn negotiate_combines_every_choice() {
        let mut caps = capabilities(extent(u32::MAX, u32::MAX));
        caps.current_transform = vk::SurfaceTransformFlagsKHR::IDENTITY;

        let support = SurfaceSupport {
            capabilities: caps,
            formats: vec![format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE],
        };
        let families = QueueFamilies {
            graphics: 1,
            present: 1,
        };

        let config = SwapchainConfig::negotiate(&support, extent(1024, 768), families);

        assert!(same_format(&config.surface_format, &PREFERRED_FORMAT));
        assert_eq!(config.present_mode, vk::PresentModeKHR::IMMEDIATE);
        assert_extent(config.extent, 1024, 768);
        assert_eq!(config.image_count, 3);
        assert_eq!(config.sharing, SharingMode::Exclusive);
        assert_eq!(config.pre_transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
    }
}
