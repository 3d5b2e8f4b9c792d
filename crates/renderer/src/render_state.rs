//! Per-drawable GPU binding state.
//!
//! A [`RenderState`] ties one mesh (and optionally one texture) to a shared
//! [`Pipeline`]. It owns one persistently mapped uniform buffer and one
//! descriptor set per swapchain image; both arrays are indexed by the image
//! index returned from acquire.

use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use tracing::{debug, info};

use forge_rhi::command::CommandBuffer;
use forge_rhi::descriptor::{
    DescriptorPool, buffer_info, write_uniform_sampler_set, write_uniform_set,
};
use forge_rhi::device::Device;
use forge_rhi::pipeline::Pipeline;
use forge_rhi::{RhiError, RhiResult};

use crate::mesh::Mesh;
use crate::texture::Texture;
use crate::ubo::{MvpUniform, UniformRing};

/// Checks `image_index` against a per-image array of `count` slots.
pub fn image_slot(image_index: u32, count: usize) -> RhiResult<usize> {
    let slot = image_index as usize;
    if slot < count {
        Ok(slot)
    } else {
        Err(RhiError::InvalidConfig(format!(
            "Image index {} out of range for {} per-image slots",
            image_index, count
        )))
    }
}

/// Configuration for a [`RenderState`].
#[derive(Clone, Default)]
pub struct RenderStateBuilder {
    pub pipeline: Option<Arc<Pipeline>>,
    pub mesh: Option<Arc<Mesh>>,
    pub texture: Option<Arc<Texture>>,
    pub model: Mat4,
    pub image_count: usize,
}

impl RenderStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Textured mesh drawn with `pipeline`, one slot per swapchain image.
    pub fn textured_mesh(
        pipeline: Arc<Pipeline>,
        mesh: Arc<Mesh>,
        texture: Arc<Texture>,
        image_count: usize,
    ) -> Self {
        Self::new()
            .pipeline(pipeline)
            .mesh(mesh)
            .texture(texture)
            .image_count(image_count)
    }

    pub fn pipeline(mut self, pipeline: Arc<Pipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn mesh(mut self, mesh: Arc<Mesh>) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn texture(mut self, texture: Arc<Texture>) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn model(mut self, model: Mat4) -> Self {
        self.model = model;
        self
    }

    pub fn image_count(mut self, count: usize) -> Self {
        self.image_count = count;
        self
    }

    pub fn restart(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    pub fn validate(&self) -> RhiResult<(Arc<Pipeline>, Arc<Mesh>)> {
        let pipeline = self
            .pipeline
            .clone()
            .ok_or_else(|| RhiError::InvalidConfig("Render state needs a pipeline".to_string()))?;
        let mesh = self
            .mesh
            .clone()
            .ok_or_else(|| RhiError::InvalidConfig("Render state needs a mesh".to_string()))?;
        if self.image_count == 0 {
            return Err(RhiError::InvalidConfig(
                "Render state needs at least one image slot".to_string(),
            ));
        }
        Ok((pipeline, mesh))
    }

    pub fn build(&self, device: &Arc<Device>) -> RhiResult<RenderState> {
        let (pipeline, mesh) = self.validate()?;
        let count = self.image_count as u32;

        let descriptor_pool = DescriptorPool::uniform_sampler(device.clone(), count)?;
        let descriptor_sets = descriptor_pool.allocate(pipeline.set_layout(), count)?;

        let uniforms = UniformRing::new(
            device,
            self.image_count,
            &MvpUniform::new(self.model, Mat4::IDENTITY, Mat4::IDENTITY),
        )?;

        for (&set, uniform) in descriptor_sets.iter().zip(uniforms.buffers()) {
            let uniform_info =
                buffer_info(uniform.handle(), 0, MvpUniform::SIZE as vk::DeviceSize);
            match &self.texture {
                Some(texture) => {
                    write_uniform_sampler_set(device, set, uniform_info, texture.descriptor_info())
                }
                None => write_uniform_set(device, set, uniform_info),
            }
        }

        info!(
            "Render state created: {} image slot(s), {} indices, textured={}",
            count,
            mesh.index_count(),
            self.texture.is_some()
        );

        Ok(RenderState {
            descriptor_pool,
            descriptor_sets,
            uniforms,
            pipeline,
            mesh,
            texture: self.texture.clone(),
            model: self.model,
        })
    }
}

/// One registered drawable.
pub struct RenderState {
    descriptor_pool: DescriptorPool,
    descriptor_sets: Vec<vk::DescriptorSet>,
    uniforms: UniformRing,
    pipeline: Arc<Pipeline>,
    mesh: Arc<Mesh>,
    texture: Option<Arc<Texture>>,
    model: Mat4,
}

impl RenderState {
    /// Number of per-image slots.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.uniforms.len()
    }

    #[inline]
    pub fn model(&self) -> Mat4 {
        self.model
    }

    pub fn set_model(&mut self, model: Mat4) {
        self.model = model;
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn texture(&self) -> Option<&Arc<Texture>> {
        self.texture.as_ref()
    }

    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.descriptor_pool
    }

    /// Writes model/view/projection into the uniform slot of `image_index`.
    pub fn update_uniforms(&mut self, image_index: u32, view: Mat4, proj: Mat4) -> RhiResult<()> {
        let block = MvpUniform::new(self.model, view, proj);
        self.uniforms.write(image_index, &block)
    }

    /// Reads back the uniform block of `image_index`.
    pub fn read_uniforms(&mut self, image_index: u32) -> RhiResult<MvpUniform> {
        self.uniforms.read(image_index)
    }

    /// Binds pipeline, descriptor set `image_index` and geometry, then draws.
    pub fn record_draw(&self, cmd: &CommandBuffer, image_index: u32) -> RhiResult<()> {
        let slot = image_slot(image_index, self.descriptor_sets.len())?;
        self.pipeline.record_bind(cmd);
        self.pipeline
            .record_bind_descriptor_set(cmd, self.descriptor_sets[slot]);
        self.mesh.record_draw(cmd);
        Ok(())
    }
}

impl Drop for RenderState {
    fn drop(&mut self) {
        debug!(
            "Render state destroyed ({} image slot(s))",
            self.uniforms.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_slot_in_range() {
        assert_eq!(image_slot(0, 2).unwrap(), 0);
        assert_eq!(image_slot(1, 2).unwrap(), 1);
    }

    #[test]
    fn test_image_slot_out_of_range() {
        assert!(matches!(image_slot(2, 2), Err(RhiError::InvalidConfig(_))));
        assert!(image_slot(0, 0).is_err());
    }

    #[test]
    fn test_builder_requires_pipeline_and_mesh() {
        let builder = RenderStateBuilder::new().image_count(2);
        assert!(matches!(
            builder.validate(),
            Err(RhiError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_builder_restart_clears_configuration() {
        let mut builder = RenderStateBuilder::new()
            .image_count(3)
            .model(Mat4::from_scale(glam::Vec3::splat(2.0)));
        builder.restart();
        assert_eq!(builder.image_count, 0);
        assert_eq!(builder.model, Mat4::IDENTITY);
        assert!(builder.pipeline.is_none());
    }
}
