//! Texture samplers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Sampler configuration: repeat addressing, linear mipmaps, compare ALWAYS.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerBuilder {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    pub mipmap_mode: vk::SamplerMipmapMode,
    /// Requested anisotropy; applied only when the device enabled the feature.
    pub max_anisotropy: Option<f32>,
}

impl Default for SamplerBuilder {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            max_anisotropy: Some(16.0),
        }
    }
}

impl SamplerBuilder {
    /// Same filter for magnification and minification.
    pub fn with_filter(filter: vk::Filter) -> Self {
        Self {
            mag_filter: filter,
            min_filter: filter,
            ..Self::default()
        }
    }

    pub fn restart(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    /// Anisotropy actually used: the request clamped to the device limit, or
    /// `None` when the feature is disabled.
    pub fn effective_anisotropy(&self, feature_enabled: bool, device_limit: f32) -> Option<f32> {
        if !feature_enabled {
            return None;
        }
        self.max_anisotropy.map(|requested| requested.min(device_limit))
    }

    pub fn build(&self, device: &Arc<Device>) -> RhiResult<Sampler> {
        let anisotropy = self.effective_anisotropy(
            device.anisotropy_enabled(),
            device.limits().max_sampler_anisotropy,
        );

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(self.mag_filter)
            .min_filter(self.min_filter)
            .mipmap_mode(self.mipmap_mode)
            .address_mode_u(self.address_mode)
            .address_mode_v(self.address_mode)
            .address_mode_w(self.address_mode)
            .mip_lod_bias(0.0)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(0.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);

        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
        debug!("Created sampler ({:?}, anisotropy {:?})", self.mag_filter, anisotropy);

        Ok(Sampler {
            device: device.clone(),
            sampler,
        })
    }
}

pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_sampler(self.sampler, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anisotropy_disabled_without_feature() {
        let builder = SamplerBuilder::default();
        assert_eq!(builder.effective_anisotropy(false, 16.0), None);
    }

    #[test]
    fn test_anisotropy_clamped_to_limit() {
        let builder = SamplerBuilder::default();
        assert_eq!(builder.effective_anisotropy(true, 8.0), Some(8.0));
        assert_eq!(builder.effective_anisotropy(true, 16.0), Some(16.0));
    }

    #[test]
    fn test_with_filter_and_restart() {
        let mut builder = SamplerBuilder::with_filter(vk::Filter::NEAREST);
        assert_eq!(builder.mag_filter, vk::Filter::NEAREST);
        assert_eq!(builder.min_filter, vk::Filter::NEAREST);
        assert_eq!(builder.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
        assert_eq!(builder.address_mode, vk::SamplerAddressMode::REPEAT);

        builder.restart();
        assert_eq!(builder, SamplerBuilder::default());
    }
}
