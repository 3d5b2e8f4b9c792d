//! Swapchain: presentable images, their views and the shared depth image.
//!
//! The swapchain's image count N is fixed at construction and sizes every
//! per-frame array elsewhere. Format and present mode are the first ones the
//! surface enumerates. Recreation after a resize is not supported: stale
//! results are reported as [`AcquireStatus::OutOfDate`] /
//! [`PresentStatus::OutOfDate`] and left to the caller.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{DEPTH_FORMAT_CANDIDATES, Image, ImageBuilder, create_image_view, select_depth_format};
use crate::instance::Instance;

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Result of acquiring a presentable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireStatus {
    /// An image was acquired; `suboptimal` means the surface no longer
    /// matches exactly but the image is still usable.
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; nothing was acquired.
    OutOfDate,
}

/// Result of presenting an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

/// Swapchain with per-image views and one depth image shared by all frames.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    /// Swapchain images (owned by the swapchain)
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth: Image,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    present_queue: vk::Queue,
}

impl Swapchain {
    /// Creates the swapchain, its image views and the depth image.
    ///
    /// # Errors
    ///
    /// Returns an error if the device has no present queue, the surface
    /// support is inadequate, no depth format is usable, or any object
    /// creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        width: u32,
        height: u32,
    ) -> Result<Self, RhiError> {
        let present_queue = device.present_queue().ok_or_else(|| {
            RhiError::SwapchainError("Device was created without a present queue".to_string())
        })?;

        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, surface_loader)?;

        let surface_format = choose_surface_format(&support.formats).ok_or_else(|| {
            RhiError::SwapchainError("Surface reports no formats".to_string())
        })?;
        let present_mode = choose_present_mode(&support.present_modes).ok_or_else(|| {
            RhiError::SwapchainError("Surface reports no present modes".to_string())
        })?;
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images requested",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        let queue_families = device.queue_families();
        let graphics_family = queue_families.graphics_family.unwrap_or_default();
        let present_family = queue_families.present_family.unwrap_or(graphics_family);
        let queue_family_indices = [graphics_family, present_family];

        let (sharing_mode, queue_family_indices_slice) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_family_indices_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        // From here on, partial state is released by the guard on error.
        let mut partial = PartialSwapchain {
            device: &device,
            loader: &swapchain_loader,
            swapchain,
            views: Vec::new(),
        };

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };
        for &image in &images {
            let view = create_image_view(
                device.handle(),
                image,
                vk::ImageViewType::TYPE_2D,
                surface_format.format,
                vk::ImageAspectFlags::COLOR,
                1,
            )?;
            partial.views.push(view);
        }

        let depth_format = select_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| unsafe {
            instance
                .handle()
                .get_physical_device_format_properties(device.physical_device(), format)
        })
        .ok_or_else(|| RhiError::SwapchainError("No supported depth format".to_string()))?;
        let depth = ImageBuilder::depth_image_2d(extent, depth_format).build(&device)?;

        let image_views = partial.disarm();
        info!(
            "Swapchain created with {} images, depth {:?}",
            images.len(),
            depth_format
        );

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            depth,
            format: surface_format.format,
            extent,
            present_mode,
            present_queue,
        })
    }

    /// Requests the next presentable image, signaling `semaphore` when it is ready.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<AcquireStatus> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    warn!("Swapchain is suboptimal (acquire)");
                }
                Ok(AcquireStatus::Acquired {
                    image_index,
                    suboptimal,
                })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                warn!("Swapchain is out of date (acquire); recreation is not supported");
                Ok(AcquireStatus::OutOfDate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Queues `image_index` for presentation after `wait_semaphore` is signaled.
    pub fn present(&self, image_index: u32, wait_semaphore: vk::Semaphore) -> RhiResult<PresentStatus> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.present_queue, &present_info)
        };

        match result {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => {
                warn!("Swapchain is suboptimal (present)");
                Ok(PresentStatus::Suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                warn!("Swapchain is out of date (present); recreation is not supported");
                Ok(PresentStatus::OutOfDate)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Number of presentable images (N).
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    #[inline]
    pub fn depth(&self) -> &Image {
        &self.depth
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        for &view in &self.image_views {
            unsafe { self.device.handle().destroy_image_view(view, None) };
        }

        // Images belong to the swapchain and go with it
        unsafe {
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Releases a half-built swapchain unless disarmed.
struct PartialSwapchain<'a> {
    device: &'a Device,
    loader: &'a ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    views: Vec<vk::ImageView>,
}

impl PartialSwapchain<'_> {
    fn disarm(mut self) -> Vec<vk::ImageView> {
        self.swapchain = vk::SwapchainKHR::null();
        std::mem::take(&mut self.views)
    }
}

impl Drop for PartialSwapchain<'_> {
    fn drop(&mut self) {
        for &view in &self.views {
            unsafe { self.device.handle().destroy_image_view(view, None) };
        }
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
        }
    }
}

/// First enumerated surface format.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats.first().copied()
}

/// First enumerated present mode.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> Option<vk::PresentModeKHR> {
    present_modes.first().copied()
}

/// Uses the surface's current extent, or clamps the window size when the
/// surface leaves it undefined (`u32::MAX`).
fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// `min(min_image_count + 1, max_image_count)`, where a max of 0 means no limit.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_surface_format_is_chosen() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_first_present_mode_is_chosen() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&modes),
            Some(vk::PresentModeKHR::IMMEDIATE)
        );
        assert!(choose_present_mode(&[]).is_none());
    }

    #[test]
    fn test_choose_extent_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 1080);
    }

    #[test]
    fn test_choose_extent_clamped() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 1000,
                height: 1000,
            },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, 50, 5000);
        assert_eq!(extent.width, 100);
        assert_eq!(extent.height, 1000);
    }

    #[test]
    fn test_image_count_capped_by_max() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 2);

        let roomy = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&roomy), 3);
    }

    #[test]
    fn test_image_count_unlimited_max() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 4);
    }
}
