//! GPU images, their views and layout transitions.
//!
//! [`ImageBuilder`] follows the same discipline as the buffer builder:
//! create the handle, query requirements, allocate, bind, then create the
//! view. Every step that fails releases what the earlier steps produced.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::Buffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Access and stage masks for one image layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier masks for the supported `(old, new)` layout pairs.
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> Option<TransitionMasks> {
    let masks = match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            }
        }
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
            TransitionMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            }
        }
        _ => return None,
    };
    Some(masks)
}

/// Aspect flags implied by a format.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Picks the first candidate whose optimal-tiling features allow depth attachments.
pub fn select_depth_format<F>(candidates: &[vk::Format], format_properties: F) -> Option<vk::Format>
where
    F: Fn(vk::Format) -> vk::FormatProperties,
{
    candidates.iter().copied().find(|&format| {
        format_properties(format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

/// Image configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageBuilder {
    pub image_type: vk::ImageType,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub properties: vk::MemoryPropertyFlags,
    pub sharing_mode: vk::SharingMode,
    pub initial_layout: vk::ImageLayout,
    pub aspect: vk::ImageAspectFlags,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self {
            image_type: vk::ImageType::TYPE_2D,
            format: vk::Format::UNDEFINED,
            extent: vk::Extent3D {
                width: 0,
                height: 0,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::empty(),
            properties: vk::MemoryPropertyFlags::empty(),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device-local 2D image with a single mip level.
    pub fn image_2d(
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            usage,
            properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            aspect: aspect_for_format(format),
            ..Self::default()
        }
    }

    /// Depth attachment sized to a render target.
    pub fn depth_image_2d(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self::image_2d(
            extent,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    /// Sampled image filled through a buffer copy.
    pub fn sampled_image_2d(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self::image_2d(
            extent,
            format,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )
    }

    pub fn format(mut self, format: vk::Format) -> Self {
        self.format = format;
        self
    }

    pub fn extent(mut self, width: u32, height: u32, depth: u32) -> Self {
        self.extent = vk::Extent3D {
            width,
            height,
            depth,
        };
        self
    }

    pub fn tiling(mut self, tiling: vk::ImageTiling) -> Self {
        self.tiling = tiling;
        self
    }

    pub fn usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    pub fn properties(mut self, properties: vk::MemoryPropertyFlags) -> Self {
        self.properties = properties;
        self
    }

    pub fn aspect(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect;
        self
    }

    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    /// Resets every field to its default.
    pub fn restart(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    fn validate(&self) -> RhiResult<()> {
        if self.format == vk::Format::UNDEFINED {
            return Err(RhiError::InvalidConfig("Image format is not set".to_string()));
        }
        if self.extent.width == 0 || self.extent.height == 0 || self.extent.depth == 0 {
            return Err(RhiError::InvalidConfig(format!(
                "Image extent {}x{}x{} has a zero dimension",
                self.extent.width, self.extent.height, self.extent.depth
            )));
        }
        if self.usage.is_empty() {
            return Err(RhiError::InvalidConfig("Image has no usage flags".to_string()));
        }
        Ok(())
    }

    fn view_type(&self) -> vk::ImageViewType {
        match self.image_type {
            vk::ImageType::TYPE_1D => vk::ImageViewType::TYPE_1D,
            vk::ImageType::TYPE_3D => vk::ImageViewType::TYPE_3D,
            _ => vk::ImageViewType::TYPE_2D,
        }
    }

    /// Creates the image, binds dedicated memory and creates its view.
    pub fn build(&self, device: &Arc<Device>) -> RhiResult<Image> {
        self.validate()?;

        let image_info = vk::ImageCreateInfo::default()
            .image_type(self.image_type)
            .format(self.format)
            .extent(self.extent)
            .mip_levels(self.mip_levels)
            .array_layers(self.array_layers)
            .samples(self.samples)
            .tiling(self.tiling)
            .usage(self.usage)
            .sharing_mode(self.sharing_mode)
            .initial_layout(self.initial_layout);

        let raw = device.handle();
        let image = unsafe { raw.create_image(&image_info, None)? };

        let requirements = unsafe { raw.get_image_memory_requirements(image) };
        let memory = match memory::allocate(device, requirements, self.properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { raw.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { raw.bind_image_memory(image, memory, 0) } {
            unsafe {
                raw.free_memory(memory, None);
                raw.destroy_image(image, None);
            }
            return Err(e.into());
        }

        let view = match create_image_view(
            raw,
            image,
            self.view_type(),
            self.format,
            self.aspect,
            self.mip_levels,
        ) {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    raw.free_memory(memory, None);
                    raw.destroy_image(image, None);
                }
                return Err(e);
            }
        };

        debug!(
            "Created image {}x{} {:?} ({:?})",
            self.extent.width, self.extent.height, self.format, self.usage
        );

        Ok(Image {
            device: device.clone(),
            image,
            memory,
            view,
            format: self.format,
            extent: self.extent,
            aspect: self.aspect,
            mip_levels: self.mip_levels,
        })
    }
}

/// Creates a view covering every mip level of the first array layer.
pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    view_type: vk::ImageViewType,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
) -> RhiResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(mip_levels)
                .base_array_layer(0)
                .layer_count(1),
        );

    Ok(unsafe { device.create_image_view(&create_info, None)? })
}

/// Image with its own memory and a default view.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent3D,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
}

impl Image {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    /// Records and runs a layout transition barrier, waiting for completion.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidConfig`] for pairs without a known mask set.
    pub fn transition_layout(&self, old: vk::ImageLayout, new: vk::ImageLayout) -> RhiResult<()> {
        let masks = transition_masks(old, new).ok_or_else(|| {
            RhiError::InvalidConfig(format!(
                "Unsupported layout transition {:?} -> {:?}",
                old, new
            ))
        })?;

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(self.aspect)
                    .base_mip_level(0)
                    .level_count(self.mip_levels)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        self.device.submit_one_time(|cmd| {
            cmd.pipeline_barrier(
                masks.src_stage,
                masks.dst_stage,
                std::slice::from_ref(&barrier),
            );
        })
    }

    /// Copies tightly packed pixel data from `buffer` into mip level 0.
    ///
    /// The image must be in `TRANSFER_DST_OPTIMAL`.
    pub fn copy_from_buffer(&self, buffer: &Buffer) -> RhiResult<()> {
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(self.aspect)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_offset(vk::Offset3D::default())
            .image_extent(self.extent);

        self.device.submit_one_time(|cmd| {
            cmd.copy_buffer_to_image(
                buffer.handle(),
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
            );
        })
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        let raw = self.device.handle();
        unsafe {
            raw.destroy_image_view(self.view, None);
            raw.free_memory(self.memory, None);
            raw.destroy_image(self.image, None);
        }
        debug!("Destroyed image {:?}", self.format);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_dst_transition() {
        let masks = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::empty());
        assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn test_shader_read_transition() {
        let masks = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_depth_transition() {
        let masks = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
        .unwrap();
        assert_eq!(
            masks.dst_access,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
    }

    #[test]
    fn test_unknown_transition_is_none() {
        assert!(
            transition_masks(
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )
            .is_none()
        );
        assert!(
            transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR)
                .is_none()
        );
    }

    #[test]
    fn test_aspect_for_format() {
        assert_eq!(
            aspect_for_format(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_for_format(vk::Format::R8G8B8A8_SRGB),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_select_depth_format_skips_unsupported() {
        let chosen = select_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            if format == vk::Format::D32_SFLOAT {
                vk::FormatProperties::default()
            } else {
                vk::FormatProperties {
                    optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                    ..Default::default()
                }
            }
        });
        assert_eq!(chosen, Some(vk::Format::D32_SFLOAT_S8_UINT));

        let none = select_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| vk::FormatProperties::default());
        assert_eq!(none, None);
    }

    #[test]
    fn test_directors_and_restart() {
        let extent = vk::Extent2D {
            width: 640,
            height: 480,
        };

        let depth = ImageBuilder::depth_image_2d(extent, vk::Format::D32_SFLOAT);
        assert_eq!(depth.usage, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        assert_eq!(depth.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(depth.properties, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert_eq!(depth.extent.depth, 1);

        let mut sampled = ImageBuilder::sampled_image_2d(extent, vk::Format::R8G8B8A8_SRGB);
        assert!(sampled.usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert!(sampled.usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
        assert_eq!(sampled.tiling, vk::ImageTiling::OPTIMAL);

        sampled.restart();
        assert_eq!(sampled, ImageBuilder::default());
        assert!(matches!(sampled.validate(), Err(RhiError::InvalidConfig(_))));
    }
}
