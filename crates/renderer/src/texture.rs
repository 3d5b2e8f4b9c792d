//! Sampled RGBA8 textures.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use forge_rhi::buffer::BufferBuilder;
use forge_rhi::descriptor::sampled_image_info;
use forge_rhi::device::Device;
use forge_rhi::image::{Image, ImageBuilder};
use forge_rhi::sampler::{Sampler, SamplerBuilder};
use forge_rhi::{RhiError, RhiResult};

/// Texel format for decoded color images.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Decoded pixels: `width * height` RGBA8 texels, row-major, top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl PixelData {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> RhiResult<Self> {
        let pixels = Self {
            width,
            height,
            rgba,
        };
        pixels.validate()?;
        Ok(pixels)
    }

    /// Two-color checkerboard with square cells of `cell` texels.
    pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let rgba = (0..size)
            .flat_map(|y| (0..size).map(move |x| (x, y)))
            .flat_map(|(x, y)| if (x / cell + y / cell) % 2 == 0 { a } else { b })
            .collect();
        Self {
            width: size,
            height: size,
            rgba,
        }
    }

    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    pub fn validate(&self) -> RhiResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RhiError::InvalidConfig(format!(
                "Texture extent {}x{} is empty",
                self.width, self.height
            )));
        }
        let expected = Self::expected_len(self.width, self.height);
        if self.rgba.len() != expected {
            return Err(RhiError::InvalidConfig(format!(
                "Texture {}x{} needs {} bytes, got {}",
                self.width,
                self.height,
                expected,
                self.rgba.len()
            )));
        }
        Ok(())
    }
}

/// Device-local sRGB image plus the sampler used to read it.
pub struct Texture {
    sampler: Sampler,
    image: Image,
}

impl Texture {
    /// Uploads `pixels` through a staging buffer and leaves the image in
    /// `SHADER_READ_ONLY_OPTIMAL`. Sampling uses nearest filtering.
    pub fn from_pixels(device: &Arc<Device>, pixels: &PixelData) -> RhiResult<Self> {
        pixels.validate()?;

        let mut staging = BufferBuilder::staging(pixels.rgba.len() as vk::DeviceSize)
            .label("texture staging")
            .build(device)?;
        staging.write(0, &pixels.rgba)?;

        let extent = vk::Extent2D {
            width: pixels.width,
            height: pixels.height,
        };
        let image = ImageBuilder::sampled_image_2d(extent, TEXTURE_FORMAT).build(device)?;

        image.transition_layout(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        image.copy_from_buffer(&staging)?;
        image.transition_layout(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        let sampler = SamplerBuilder::with_filter(vk::Filter::NEAREST).build(device)?;

        info!("Uploaded {}x{} texture", pixels.width, pixels.height);

        Ok(Self { sampler, image })
    }

    pub fn from_rgba8(device: &Arc<Device>, width: u32, height: u32, rgba: &[u8]) -> RhiResult<Self> {
        let pixels = PixelData::new(width, height, rgba.to_vec())?;
        Self::from_pixels(device, &pixels)
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Descriptor info for binding 1 of the uniform-plus-texture set.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        sampled_image_info(self.sampler.handle(), self.image.view())
    }
}
