//! # Device Module
//!
//! Picks the physical device to render with and creates the logical device on top of it.
//!
//! Selection is split in two halves so the decision itself can be tested without a GPU:
//! [`query_candidates`] asks the driver about every physical device and snapshots the answers into
//! [`CandidateDevice`] values, and [`select_device`] filters and scores those snapshots.

use std::collections::HashSet;
use std::fmt;

use log::{debug, info};
use vulkanalia::Version;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::KhrSurfaceExtension;

use super::error::{PlatformContext, Result, VulkanError};
use super::instance::{PORTABILITY_MACOS_VERSION, VALIDATION_LAYER};
use super::swapchain::SurfaceSupport;
use crate::config::DeviceRequirements;

/// Flat bonus for discrete GPUs, on top of the maximum texture size.
pub const DISCRETE_GPU_BONUS: u32 = 1000;

/// One queue family as reported by the driver, plus whether it can present to our surface.
#[derive(Clone, Copy, Debug)]
pub struct QueueFamily {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    pub present: bool,
}

/// Everything selection needs to know about a physical device, queried once up front.
#[derive(Clone, Debug)]
pub struct CandidateDevice {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub extensions: HashSet<vk::ExtensionName>,
    pub queue_families: Vec<QueueFamily>,
    pub geometry_shader: bool,
    /// Surface details for this device and the window surface.
    pub surface: SurfaceSupport,
}

/// Queue family indices found so far while scanning a device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scans families in index order, keeping the first graphics-capable family and the first
    /// family that can present. Families without queues are ignored.
    pub fn find(families: &[QueueFamily]) -> Self {
        let mut indices = Self::default();

        for (index, family) in (0u32..).zip(families) {
            if family.queue_count == 0 {
                continue;
            }

            if indices.graphics.is_none() && family.flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }

            if indices.present.is_none() && family.present {
                indices.present = Some(index);
            }

            if indices.is_complete() {
                break;
            }
        }

        indices
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Converts to [`QueueFamilies`] once both indices are known.
    pub fn complete(self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// The graphics and present families of the selected device. They may be the same family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// The distinct family indices, graphics first. One queue is created per entry.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Why a candidate was dropped before scoring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disqualified {
    IncompleteQueueFamilies(QueueFamilyIndices),
    MissingExtension(vk::ExtensionName),
    NoSurfaceFormats,
    NoPresentModes,
    NoGeometryShader,
}

impl fmt::Display for Disqualified {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompleteQueueFamilies(indices) => write!(
                f,
                "no graphics and present queue families (graphics: {:?}, present: {:?})",
                indices.graphics, indices.present
            ),
            Self::MissingExtension(name) => write!(f, "missing device extension `{name}`"),
            Self::NoSurfaceFormats => f.write_str("surface reports no formats"),
            Self::NoPresentModes => f.write_str("surface reports no present modes"),
            Self::NoGeometryShader => f.write_str("no geometry shader support"),
        }
    }
}

/// Checks every requirement, then scores the device. Larger is better.
pub fn rate_device(
    candidate: &CandidateDevice,
    requirements: &DeviceRequirements,
) -> std::result::Result<(u32, QueueFamilies), Disqualified> {
    let indices = QueueFamilyIndices::find(&candidate.queue_families);
    let queue_families = indices
        .complete()
        .ok_or(Disqualified::IncompleteQueueFamilies(indices))?;

    if let Some(missing) = requirements
        .extensions
        .iter()
        .find(|name| !candidate.extensions.contains(*name))
    {
        return Err(Disqualified::MissingExtension(*missing));
    }

    if candidate.surface.formats.is_empty() {
        return Err(Disqualified::NoSurfaceFormats);
    }

    if candidate.surface.present_modes.is_empty() {
        return Err(Disqualified::NoPresentModes);
    }

    if requirements.geometry_shader && !candidate.geometry_shader {
        return Err(Disqualified::NoGeometryShader);
    }

    let mut score = 0u32;

    if candidate.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += DISCRETE_GPU_BONUS;
    }

    // Bigger textures, better pictures.
    score = score.saturating_add(candidate.max_image_dimension_2d);

    Ok((score, queue_families))
}

/// The winning candidate and the queue families it will be driven with.
#[derive(Clone, Copy, Debug)]
pub struct Selection<'a> {
    pub device: &'a CandidateDevice,
    pub queue_families: QueueFamilies,
    pub score: u32,
}

/// Returns the highest scoring suitable candidate. When several share the best score the one
/// enumerated first wins.
///
/// # Errors
///
/// - [`VulkanError::NoDevices`] when `candidates` is empty.
/// - [`VulkanError::NoSuitableDevice`] when nothing survives the requirements or the best score
///   is zero.
pub fn select_device<'a>(
    candidates: &'a [CandidateDevice],
    requirements: &DeviceRequirements,
) -> Result<Selection<'a>> {
    if candidates.is_empty() {
        return Err(VulkanError::NoDevices);
    }

    let mut best: Option<Selection<'a>> = None;

    for candidate in candidates {
        match rate_device(candidate, requirements) {
            Ok((score, queue_families)) => {
                debug!(
                    "Physical device `{}` ({:?}) scored {score}.",
                    candidate.name, candidate.device_type
                );

                if best.is_none_or(|current| score > current.score) {
                    best = Some(Selection {
                        device: candidate,
                        queue_families,
                        score,
                    });
                }
            }
            Err(reason) => {
                debug!("Skipping physical device `{}`: {reason}.", candidate.name);
            }
        }
    }

    best.filter(|selection| selection.score > 0)
        .ok_or(VulkanError::NoSuitableDevice)
}

/// Snapshots every physical device the instance can see, as seen from `surface`.
pub fn query_candidates(
    instance: &Instance,
    surface: vk::SurfaceKHR,
) -> Result<Vec<CandidateDevice>> {
    let handles = unsafe { instance.enumerate_physical_devices() }
        .context("failed to enumerate physical devices")?;

    handles
        .into_iter()
        .map(|handle| query_candidate(instance, handle, surface))
        .collect()
}

fn query_candidate(
    instance: &Instance,
    handle: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<CandidateDevice> {
    let properties = unsafe { instance.get_physical_device_properties(handle) };
    let features = unsafe { instance.get_physical_device_features(handle) };
    let family_properties = unsafe { instance.get_physical_device_queue_family_properties(handle) };

    let extensions = unsafe { instance.enumerate_device_extension_properties(handle, None) }
        .context("failed to enumerate device extensions")?
        .iter()
        .map(|extension| extension.extension_name)
        .collect();

    let queue_families = (0u32..)
        .zip(&family_properties)
        .map(|(index, family)| {
            let present =
                unsafe { instance.get_physical_device_surface_support_khr(handle, index, surface) }
                    .context("failed to query surface presentation support")?;

            Ok(QueueFamily {
                flags: family.queue_flags,
                queue_count: family.queue_count,
                present,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CandidateDevice {
        handle,
        name: properties.device_name.to_string(),
        device_type: properties.device_type,
        max_image_dimension_2d: properties.limits.max_image_dimension_2d,
        extensions,
        queue_families,
        geometry_shader: features.geometry_shader == vk::TRUE,
        surface: SurfaceSupport::query(instance, handle, surface)?,
    })
}

/// Queries the instance's devices and returns the best one for `surface`.
pub fn pick_physical_device(
    instance: &Instance,
    surface: vk::SurfaceKHR,
    requirements: &DeviceRequirements,
) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
    let candidates = query_candidates(instance, surface)?;
    let selection = select_device(&candidates, requirements)?;

    info!(
        "Selected physical device `{}` (score {}, graphics family {}, present family {}).",
        selection.device.name,
        selection.score,
        selection.queue_families.graphics,
        selection.queue_families.present
    );

    Ok((selection.device.handle, selection.queue_families))
}

/// Creates the logical device with one queue per unique family and returns it together with the
/// graphics and present queues.
pub fn create_logical_device(
    entry: &Entry,
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    families: QueueFamilies,
    requirements: &DeviceRequirements,
    validation: bool,
) -> Result<(Device, vk::Queue, vk::Queue)> {
    let queue_priorities = &[1.0];
    let queue_infos = families
        .unique()
        .into_iter()
        .map(|index| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(index)
                .queue_priorities(queue_priorities)
        })
        .collect::<Vec<_>>();

    let layers = if validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let mut extensions = requirements
        .extensions
        .iter()
        .map(|name| name.as_ptr())
        .collect::<Vec<_>>();

    // Portability drivers on macOS must have the subset extension enabled explicitly.
    let version: Version = unsafe { entry.version() }.context("failed to query Vulkan version")?;
    if cfg!(target_os = "macos") && version >= PORTABILITY_MACOS_VERSION {
        extensions.push(vk::KHR_PORTABILITY_SUBSET_EXTENSION.name.as_ptr());
    }

    let features =
        vk::PhysicalDeviceFeatures::builder().geometry_shader(requirements.geometry_shader);

    let info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_infos)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions)
        .enabled_features(&features);

    let device = unsafe { instance.create_device(physical_device, &info, None) }
        .context("failed to create logical device")?;

    let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
    let present_queue = unsafe { device.get_device_queue(families.present, 0) };

    debug!("Logical device created.");

    Ok((device, graphics_queue, present_queue))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTRA_EXTENSION: vk::ExtensionName = vk::ExtensionName::from_bytes(b"VK_EXT_test_only");

    fn family(flags: vk::QueueFlags, present: bool) -> QueueFamily {
        QueueFamily {
            flags,
            queue_count: 1,
            present,
        }
    }

    fn surface_support() -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    fn candidate(
        name: &str,
        device_type: vk::PhysicalDeviceType,
        dimension: u32,
    ) -> CandidateDevice {
        CandidateDevice {
            handle: vk::PhysicalDevice::default(),
            name: name.to_string(),
            device_type,
            max_image_dimension_2d: dimension,
            extensions: [vk::KHR_SWAPCHAIN_EXTENSION.name].into_iter().collect(),
            queue_families: vec![family(vk::QueueFlags::GRAPHICS, true)],
            geometry_shader: true,
            surface: surface_support(),
        }
    }

    fn selected(candidates: &[CandidateDevice]) -> &str {
        let device = select_device(candidates, &DeviceRequirements::default())
            .unwrap()
            .device;
        &device.name
    }

    #[test]
    fn queue_scan_picks_first_graphics_and_first_present() {
        let families = [
            family(vk::QueueFlags::TRANSFER, false),
            family(vk::QueueFlags::GRAPHICS, false),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true),
            family(vk::QueueFlags::GRAPHICS, true),
        ];

        let indices = QueueFamilyIndices::find(&families);
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(2));
    }

    #[test]
    fn queue_scan_shares_a_single_family() {
        let families = [family(vk::QueueFlags::GRAPHICS, true)];

        let families = QueueFamilyIndices::find(&families).complete().unwrap();
        assert_eq!(families, QueueFamilies { graphics: 0, present: 0 });
        assert_eq!(families.unique(), vec![0]);
    }

    #[test]
    fn queue_scan_ignores_empty_families() {
        let families = [
            QueueFamily {
                flags: vk::QueueFlags::GRAPHICS,
                queue_count: 0,
                present: true,
            },
            family(vk::QueueFlags::COMPUTE, true),
            family(vk::QueueFlags::GRAPHICS, false),
        ];

        let families = QueueFamilyIndices::find(&families).complete().unwrap();
        assert_eq!(families, QueueFamilies { graphics: 2, present: 1 });
        assert_eq!(families.unique(), vec![2, 1]);
    }

    #[test]
    fn missing_present_family_is_never_selected() {
        let mut headless = candidate("headless", vk::PhysicalDeviceType::DISCRETE_GPU, 32768);
        headless.queue_families = vec![family(vk::QueueFlags::GRAPHICS, false)];
        let weak = candidate("weak", vk::PhysicalDeviceType::INTEGRATED_GPU, 4096);

        assert_eq!(
            rate_device(&headless, &DeviceRequirements::default()),
            Err(Disqualified::IncompleteQueueFamilies(QueueFamilyIndices {
                graphics: Some(0),
                present: None,
            }))
        );
        assert_eq!(selected(&[headless, weak]), "weak");
    }

    #[test]
    fn missing_extension_is_never_selected() {
        let mut bare = candidate("bare", vk::PhysicalDeviceType::DISCRETE_GPU, 32768);
        bare.extensions.clear();
        bare.extensions.insert(EXTRA_EXTENSION);

        assert_eq!(
            rate_device(&bare, &DeviceRequirements::default()),
            Err(Disqualified::MissingExtension(vk::KHR_SWAPCHAIN_EXTENSION.name))
        );

        let candidates = [bare];
        let result = select_device(&candidates, &DeviceRequirements::default());
        assert!(matches!(result, Err(VulkanError::NoSuitableDevice)));
    }

    #[test]
    fn empty_surface_lists_are_never_selected() {
        let mut no_formats = candidate("no formats", vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        no_formats.surface.formats.clear();
        let mut no_modes = candidate("no modes", vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        no_modes.surface.present_modes.clear();
        let fallback = candidate("fallback", vk::PhysicalDeviceType::CPU, 2048);

        let requirements = DeviceRequirements::default();
        assert_eq!(rate_device(&no_formats, &requirements), Err(Disqualified::NoSurfaceFormats));
        assert_eq!(rate_device(&no_modes, &requirements), Err(Disqualified::NoPresentModes));
        assert_eq!(selected(&[no_formats, no_modes, fallback]), "fallback");
    }

    #[test]
    fn geometry_shader_only_matters_when_required() {
        let mut device = candidate("no geometry", vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        device.geometry_shader = false;

        let strict = DeviceRequirements::default();
        assert_eq!(rate_device(&device, &strict), Err(Disqualified::NoGeometryShader));

        let relaxed = DeviceRequirements {
            geometry_shader: false,
            ..DeviceRequirements::default()
        };
        assert_eq!(rate_device(&device, &relaxed).map(|(score, _)| score), Ok(17384));
    }

    #[test]
    fn larger_textures_score_higher() {
        let small = candidate("small", vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        let large = candidate("large", vk::PhysicalDeviceType::DISCRETE_GPU, 16384);

        assert_eq!(selected(&[small.clone(), large.clone()]), "large");
        assert_eq!(selected(&[large, small]), "large");
    }

    #[test]
    fn discrete_bonus_outweighs_small_texture_gap() {
        let integrated = candidate("integrated", vk::PhysicalDeviceType::INTEGRATED_GPU, 16384);
        let discrete = candidate("discrete", vk::PhysicalDeviceType::DISCRETE_GPU, 15872);

        let requirements = DeviceRequirements::default();
        assert_eq!(rate_device(&integrated, &requirements).unwrap().0, 16384);
        assert_eq!(rate_device(&discrete, &requirements).unwrap().0, 16872);
        assert_eq!(selected(&[integrated, discrete]), "discrete");
    }

    #[test]
    fn selection_is_deterministic_and_ties_go_to_first_seen() {
        let candidates = [
            candidate("first", vk::PhysicalDeviceType::DISCRETE_GPU, 16384),
            candidate("second", vk::PhysicalDeviceType::DISCRETE_GPU, 16384),
            candidate("third", vk::PhysicalDeviceType::INTEGRATED_GPU, 8192),
        ];

        for _ in 0..8 {
            assert_eq!(selected(&candidates), "first");
        }
    }

    #[test]
    fn no_devices_fails_before_scoring() {
        let result = select_device(&[], &DeviceRequirements::default());
        assert!(matches!(result, Err(VulkanError::NoDevices)));
    }

    #[test]
    fn zero_score_is_not_suitable() {
        let useless = candidate("useless", vk::PhysicalDeviceType::OTHER, 0);

        let candidates = [useless];
        let result = select_device(&candidates, &DeviceRequirements::default());
        assert!(matches!(result, Err(VulkanError::NoSuitableDevice)));
    }
}
