//! Physical device (GPU) selection.
//!
//! Selection works with or without a presentation surface. Without one
//! (headless transfers, tests) only a graphics queue family is required.
//! With one, the device must also expose a presenting queue family, the
//! swapchain extension and at least one surface format and present mode.
//!
//! # Example
//!
//! ```no_run
//! use forge_rhi::instance::Instance;
//! use forge_rhi::physical_device::select_physical_device;
//!
//! let instance = Instance::new(false, &[]).expect("Failed to create instance");
//! let device_info = select_physical_device(instance.handle(), None)
//!     .expect("Failed to select physical device");
//!
//! println!("Selected GPU: {:?}", device_info.device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;
use crate::swapchain::SwapchainSupportDetails;

/// A surface to check presentation support against.
#[derive(Clone, Copy)]
pub struct PresentTarget<'a> {
    pub surface: vk::SurfaceKHR,
    pub loader: &'a ash::khr::surface::Instance,
}

/// Queue family indices discovered on a physical device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// First queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// First queue family that can present to the surface, if one was supplied.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks the families required for the given use.
    #[inline]
    pub fn is_complete(&self, needs_present: bool) -> bool {
        self.graphics_family.is_some() && (!needs_present || self.present_family.is_some())
    }

    /// Returns the unique queue family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }

    /// Picks graphics and present families from per-family flags and support bits.
    ///
    /// `present_support[i]` is whether family `i` can present; an empty slice
    /// means no surface was supplied.
    pub fn from_properties(families: &[vk::QueueFamilyProperties], present_support: &[bool]) -> Self {
        let mut indices = Self::default();

        for (i, family) in families.iter().enumerate() {
            if family.queue_count == 0 {
                continue;
            }
            let i_u32 = i as u32;

            if indices.graphics_family.is_none()
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.graphics_family = Some(i_u32);
            }
            if indices.present_family.is_none() && present_support.get(i).copied().unwrap_or(false)
            {
                indices.present_family = Some(i_u32);
            }
        }

        indices
    }
}

/// Information about a physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for different operations.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    pub fn supports_anisotropy(&self) -> bool {
        self.features.sampler_anisotropy == vk::TRUE
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the most suitable physical device.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no candidate meets the requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    target: Option<PresentTarget<'_>>,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut best: Option<(PhysicalDeviceInfo, u32)> = None;

    for device in devices {
        if let Some(info) = check_device_suitability(instance, device, target) {
            let score = rate_device(&info.properties);
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            if best.as_ref().is_none_or(|(_, best_score)| score > *best_score) {
                best = Some((info, score));
            }
        }
    }

    let Some((selected, score)) = best else {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, Score: {}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
        score
    );

    Ok(selected)
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    target: Option<PresentTarget<'_>>,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let device_name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown")
    };

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let present_support: Vec<bool> = match target {
        Some(target) => (0..families.len() as u32)
            .map(|i| unsafe {
                target
                    .loader
                    .get_physical_device_surface_support(device, i, target.surface)
                    .unwrap_or(false)
            })
            .collect(),
        None => Vec::new(),
    };
    let queue_families = QueueFamilyIndices::from_properties(&families, &present_support);

    if !queue_families.is_complete(target.is_some()) {
        debug!(
            "GPU '{}' skipped: missing required queue families (graphics={}, present={})",
            device_name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return None;
    }

    if let Some(target) = target {
        if !supports_swapchain_extension(instance, device) {
            debug!("GPU '{}' skipped: swapchain extension missing", device_name);
            return None;
        }

        let adequate = SwapchainSupportDetails::query(device, target.surface, target.loader)
            .map(|details| details.is_adequate())
            .unwrap_or(false);
        if !adequate {
            debug!("GPU '{}' skipped: inadequate surface support", device_name);
            return None;
        }
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
    })
}

fn supports_swapchain_extension(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let Ok(extensions) = (unsafe { instance.enumerate_device_extension_properties(device) }) else {
        return false;
    };

    extensions.iter().any(|ext| {
        let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        name == ash::khr::swapchain::NAME
    })
}

/// Rates a physical device; higher is better.
fn rate_device(properties: &vk::PhysicalDeviceProperties) -> u32 {
    let type_score = match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    type_score + properties.limits.max_image_dimension2_d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(indices.graphics_family.is_none());
        assert!(indices.present_family.is_none());
        assert!(!indices.is_complete(false));
    }

    #[test]
    fn test_headless_needs_only_graphics() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: None,
        };
        assert!(indices.is_complete(false));
        assert!(!indices.is_complete(true));
    }

    #[test]
    fn test_unique_families_with_duplicates() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(indices.unique_families(), vec![0]);

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(split.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_first_graphics_and_first_present_family_win() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 0),
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::GRAPHICS, 4),
        ];
        let present = [false, true, false, true];

        let indices = QueueFamilyIndices::from_properties(&families, &present);
        // Family 1 has no queues, so it is skipped for both roles.
        assert_eq!(indices.graphics_family, Some(2));
        assert_eq!(indices.present_family, Some(3));
    }

    #[test]
    fn test_no_surface_means_no_present_family() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];
        let indices = QueueFamilyIndices::from_properties(&families, &[]);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, None);
    }

    #[test]
    fn test_rate_prefers_discrete() {
        let discrete = vk::PhysicalDeviceProperties {
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            ..Default::default()
        };
        let integrated = vk::PhysicalDeviceProperties {
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            ..Default::default()
        };
        assert!(rate_device(&discrete) > rate_device(&integrated));
    }
}
